//! `.proto` file generation
//!
//! Renders file units as `.proto` source, keeping the relative type names
//! the compiler produced, and writes them below an output directory.
//!
//! A relative name is printed fully qualified when protoc would resolve its
//! first segment to an enclosing package instead, e.g. `b.B` inside package
//! `a.b`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::method_options::IdempotencyLevel;
use prost_types::{
    DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, MethodDescriptorProto,
    ServiceDescriptorProto,
};
use synapse_entproto::FileUnit;
use tracing::info;

/// First line of every generated file
pub const HEADER: &str = "// Code generated by synapse-proto-gen. DO NOT EDIT.";

/// Error writing generated files
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// File or directory could not be written
    #[error("failed to write {path}: {source}")]
    Io {
        /// Offending path
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Some entities failed and partial output was not allowed
    #[error("{count} schema(s) failed to compile: {summary}")]
    EntitiesFailed {
        /// Number of failed entities
        count: usize,
        /// `Entity: error` list
        summary: String,
    },
}

#[derive(Default)]
struct ProtoWriter {
    out: String,
    indent: usize,
}

impl ProtoWriter {
    fn line(&mut self, text: &str) {
        if !text.is_empty() {
            for _ in 0..self.indent {
                self.out.push_str("  ");
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    fn open(&mut self, text: &str) {
        self.line(&format!("{} {{", text));
        self.indent += 1;
    }

    fn close(&mut self) {
        self.indent = self.indent.saturating_sub(1);
        self.line("}");
    }
}

/// Package namespaces visible to protoc while resolving names
#[derive(Debug, Default)]
pub struct Namespaces {
    names: HashSet<String>,
}

impl Namespaces {
    /// Namespaces declared by `units`, plus `google.protobuf`
    pub fn new<'a>(units: impl IntoIterator<Item = &'a FileUnit>) -> Self {
        let mut names = HashSet::new();
        let packages = units
            .into_iter()
            .map(|unit| unit.package.as_str())
            .chain(["google.protobuf"]);
        for package in packages {
            let mut prefix = String::new();
            for segment in package.split('.') {
                if !prefix.is_empty() {
                    prefix.push('.');
                }
                prefix.push_str(segment);
                names.insert(prefix.clone());
            }
        }
        Self { names }
    }

    /// `type_name` as written inside `package`
    fn spell(&self, package: &str, type_name: &str) -> String {
        let name = type_name.trim_start_matches('.');
        let Some((first, _)) = name.split_once('.') else {
            return name.to_string();
        };
        let mut scope = String::new();
        let shadowed = package.split('.').any(|segment| {
            if !scope.is_empty() {
                scope.push('.');
            }
            scope.push_str(segment);
            self.names.contains(&format!("{}.{}", scope, first))
        });
        if shadowed {
            format!(".{}", name)
        } else {
            name.to_string()
        }
    }
}

struct Renderer<'a> {
    w: ProtoWriter,
    package: &'a str,
    namespaces: &'a Namespaces,
}

/// Render `unit` as `.proto` source
///
/// `namespaces` should cover every unit of the compilation.
pub fn render(unit: &FileUnit, namespaces: &Namespaces) -> String {
    let mut r = Renderer {
        w: ProtoWriter::default(),
        package: &unit.package,
        namespaces,
    };
    r.w.line(HEADER);
    r.w.line("syntax = \"proto3\";");
    r.w.line("");
    r.w.line(&format!("package {};", unit.package));

    if !unit.dependencies.is_empty() {
        r.w.line("");
        for dependency in &unit.dependencies {
            r.w.line(&format!("import \"{}\";", dependency));
        }
    }

    for message in &unit.messages {
        r.w.line("");
        r.message(message);
    }
    for service in &unit.services {
        r.w.line("");
        r.service(service);
    }
    r.w.out
}

impl Renderer<'_> {
    fn type_name(&self, type_name: &str) -> String {
        self.namespaces.spell(self.package, type_name)
    }

    fn message(&mut self, message: &DescriptorProto) {
        self.w.open(&format!("message {}", message.name()));
        for field in &message.field {
            let line = self.field(field);
            self.w.line(&line);
        }
        for enumeration in &message.enum_type {
            self.w.line("");
            self.enumeration(enumeration);
        }
        for nested in &message.nested_type {
            self.w.line("");
            self.message(nested);
        }
        self.w.close();
    }

    fn field(&self, field: &FieldDescriptorProto) -> String {
        let type_name = match field.r#type() {
            Type::Message | Type::Enum => self.type_name(field.type_name()),
            scalar => scalar
                .as_str_name()
                .trim_start_matches("TYPE_")
                .to_ascii_lowercase(),
        };
        let label = if field.label() == Label::Repeated {
            "repeated "
        } else {
            ""
        };
        format!("{}{} {} = {};", label, type_name, field.name(), field.number())
    }

    fn enumeration(&mut self, enumeration: &EnumDescriptorProto) {
        self.w.open(&format!("enum {}", enumeration.name()));
        for value in &enumeration.value {
            self.w.line(&format!("{} = {};", value.name(), value.number()));
        }
        self.w.close();
    }

    fn service(&mut self, service: &ServiceDescriptorProto) {
        self.w.open(&format!("service {}", service.name()));
        for method in &service.method {
            self.method(method);
        }
        self.w.close();
    }

    fn method(&mut self, method: &MethodDescriptorProto) {
        let signature = format!(
            "rpc {}({}) returns ({})",
            method.name(),
            self.type_name(method.input_type()),
            self.type_name(method.output_type())
        );
        let no_side_effects = method
            .options
            .as_ref()
            .is_some_and(|o| o.idempotency_level() == IdempotencyLevel::NoSideEffects);
        if no_side_effects {
            self.w.open(&signature);
            self.w.line("option idempotency_level = NO_SIDE_EFFECTS;");
            self.w.close();
        } else {
            self.w.line(&format!("{};", signature));
        }
    }
}

/// Write every unit below `output`, returning the written paths
pub fn write_units<'a>(
    units: impl IntoIterator<Item = &'a FileUnit> + Clone,
    output: &Path,
) -> Result<Vec<PathBuf>, GenerateError> {
    let namespaces = Namespaces::new(units.clone());
    let mut written = Vec::new();
    for unit in units {
        let path = output.join(&unit.path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| GenerateError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&path, render(unit, &namespaces)).map_err(|source| GenerateError::Io {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), messages = unit.messages.len(), "wrote proto file");
        written.push(path);
    }
    Ok(written)
}

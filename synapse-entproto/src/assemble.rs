//! Descriptor assembly
//!
//! Turns file units into one cross-validated descriptor set:
//! - the well-known-type files (timestamp, empty, wrappers, struct) are pulled
//!   from the global descriptor pool and added once
//! - relative type names are resolved with protobuf scoping rules
//! - every reference must live in the file itself or in one of its imports
//! - imports between units must not form a cycle
//!
//! The resulting set is then built into a [`DescriptorPool`], which performs
//! the final validation.

use indexmap::{IndexMap, IndexSet};
use prost_reflect::{DescriptorPool, FileDescriptor};
use prost_types::field_descriptor_proto::Type;
use prost_types::{
    DescriptorProto, EnumDescriptorProto, FileDescriptorProto, FileDescriptorSet,
};

use crate::deps::WELL_KNOWN_TYPES;
use crate::error::CompileError;
use crate::package::FileUnit;

/// Fully built output of a compilation
#[derive(Debug, Clone)]
pub struct Assembled {
    /// Canonical descriptor set: well-known files, then units with imports
    /// ahead of their importers
    pub descriptor_set: FileDescriptorSet,
    /// Built file descriptors of the units, by path
    pub files: IndexMap<String, FileDescriptor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SymbolKind {
    Message,
    Enum,
}

#[derive(Debug, Clone)]
struct Symbol {
    kind: SymbolKind,
    file: String,
}

#[derive(Default)]
struct SymbolTable {
    symbols: IndexMap<String, Symbol>,
}

impl SymbolTable {
    fn add_file(&mut self, file: &FileDescriptorProto) -> Result<(), CompileError> {
        let path = file.name().to_string();
        self.add_scope(&path, file.package(), &file.message_type, &file.enum_type)
    }

    fn add_scope(
        &mut self,
        path: &str,
        scope: &str,
        messages: &[DescriptorProto],
        enums: &[EnumDescriptorProto],
    ) -> Result<(), CompileError> {
        for message in messages {
            let full_name = qualify(scope, message.name());
            self.insert(path, &full_name, SymbolKind::Message)?;
            self.add_scope(path, &full_name, &message.nested_type, &message.enum_type)?;
        }
        for enumeration in enums {
            self.insert(path, &qualify(scope, enumeration.name()), SymbolKind::Enum)?;
        }
        Ok(())
    }

    fn insert(&mut self, path: &str, full_name: &str, kind: SymbolKind) -> Result<(), CompileError> {
        let symbol = Symbol {
            kind,
            file: path.to_string(),
        };
        if let Some(previous) = self.symbols.insert(full_name.to_string(), symbol) {
            return Err(CompileError::AssemblyFailure {
                file: path.to_string(),
                reason: format!("{} is already defined in {}", full_name, previous.file),
            });
        }
        Ok(())
    }

    /// Resolve `name` as written inside `scope`, innermost scope first
    fn resolve(&self, scope: &str, name: &str) -> Option<(&str, &Symbol)> {
        if let Some(absolute) = name.strip_prefix('.') {
            return self
                .symbols
                .get_key_value(absolute)
                .map(|(k, v)| (k.as_str(), v));
        }
        let mut scope = scope;
        loop {
            let candidate = qualify(scope, name);
            if let Some((full_name, symbol)) = self.symbols.get_key_value(candidate.as_str()) {
                return Some((full_name.as_str(), symbol));
            }
            if scope.is_empty() {
                return None;
            }
            scope = scope.rsplit_once('.').map(|(parent, _)| parent).unwrap_or("");
        }
    }
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", scope, name)
    }
}

/// Build and validate the descriptor set of `units`
pub fn assemble(units: &IndexMap<String, FileUnit>) -> Result<Assembled, CompileError> {
    let unit_paths: IndexSet<&str> = units.values().map(|u| u.path.as_str()).collect();
    let well_known_paths: IndexSet<&str> = WELL_KNOWN_TYPES.values().copied().collect();

    for unit in units.values() {
        for dependency in &unit.dependencies {
            if !well_known_paths.contains(dependency.as_str())
                && !unit_paths.contains(dependency.as_str())
            {
                return Err(CompileError::AssemblyFailure {
                    file: unit.path.clone(),
                    reason: format!("imports unknown file {:?}", dependency),
                });
            }
        }
    }

    let order = import_order(units)?;

    // Every well-known file joins a non-empty set once, imported or not
    let well_known: Vec<&str> = if units.is_empty() {
        Vec::new()
    } else {
        well_known_paths.into_iter().collect()
    };

    let global = DescriptorPool::global();
    let mut files = Vec::with_capacity(well_known.len() + units.len());
    for path in &well_known {
        let file = global
            .get_file_by_name(path)
            .ok_or_else(|| CompileError::AssemblyFailure {
                file: path.to_string(),
                reason: "well-known file is not available in the global descriptor pool"
                    .to_string(),
            })?;
        files.push(file.file_descriptor_proto().clone());
    }

    let relative: Vec<FileDescriptorProto> = order
        .iter()
        .filter_map(|path| units.values().find(|u| u.path == *path))
        .map(FileUnit::to_file_descriptor_proto)
        .collect();

    let mut table = SymbolTable::default();
    for file in files.iter().chain(relative.iter()) {
        table.add_file(file)?;
    }
    for mut file in relative {
        canonicalize_file(&table, &mut file)?;
        files.push(file);
    }

    let descriptor_set = FileDescriptorSet { file: files };
    let pool = DescriptorPool::from_file_descriptor_set(descriptor_set.clone()).map_err(|err| {
        CompileError::AssemblyFailure {
            file: "descriptor set".to_string(),
            reason: err.to_string(),
        }
    })?;

    let mut built = IndexMap::with_capacity(units.len());
    for unit in units.values() {
        let file = pool
            .get_file_by_name(&unit.path)
            .ok_or_else(|| CompileError::AssemblyFailure {
                file: unit.path.clone(),
                reason: "file missing from the built descriptor pool".to_string(),
            })?;
        built.insert(unit.path.clone(), file);
    }

    Ok(Assembled {
        descriptor_set,
        files: built,
    })
}

/// Unit paths with every import ahead of its importer; fails on a cycle
fn import_order(units: &IndexMap<String, FileUnit>) -> Result<Vec<&str>, CompileError> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Visiting,
        Done,
    }

    struct Walk<'a> {
        by_path: IndexMap<&'a str, &'a FileUnit>,
        marks: IndexMap<&'a str, Mark>,
        stack: Vec<&'a str>,
        order: Vec<&'a str>,
    }

    impl<'a> Walk<'a> {
        fn visit(&mut self, path: &'a str) -> Result<(), CompileError> {
            match self.marks.get(path) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    self.stack.push(path);
                    return Err(CompileError::AssemblyFailure {
                        file: path.to_string(),
                        reason: format!("import cycle: {}", self.stack.join(" -> ")),
                    });
                }
                None => {}
            }
            let Some(unit) = self.by_path.get(path).copied() else {
                return Ok(());
            };
            self.marks.insert(path, Mark::Visiting);
            self.stack.push(path);
            for dependency in &unit.dependencies {
                if self.by_path.contains_key(dependency.as_str()) {
                    self.visit(dependency.as_str())?;
                }
            }
            self.stack.pop();
            self.marks.insert(path, Mark::Done);
            self.order.push(path);
            Ok(())
        }
    }

    let mut walk = Walk {
        by_path: units.values().map(|u| (u.path.as_str(), u)).collect(),
        marks: IndexMap::new(),
        stack: Vec::new(),
        order: Vec::with_capacity(units.len()),
    };
    for unit in units.values() {
        walk.stack.clear();
        walk.visit(unit.path.as_str())?;
    }
    Ok(walk.order)
}

fn canonicalize_file(table: &SymbolTable, file: &mut FileDescriptorProto) -> Result<(), CompileError> {
    let path = file.name().to_string();
    let package = file.package().to_string();
    let mut visible: IndexSet<String> = file.dependency.iter().cloned().collect();
    visible.insert(path.clone());

    let lookup = |scope: &str, name: &str, expected: SymbolKind| -> Result<String, CompileError> {
        let failure = |reason: String| CompileError::AssemblyFailure {
            file: path.clone(),
            reason,
        };
        let (full_name, symbol) = table
            .resolve(scope, name)
            .ok_or_else(|| failure(format!("{:?} referenced from {} is not defined", name, scope)))?;
        if symbol.kind != expected {
            return Err(failure(format!(
                "{:?} referenced from {} is not a{}",
                name,
                scope,
                if expected == SymbolKind::Enum { "n enum" } else { " message" }
            )));
        }
        if !visible.contains(&symbol.file) {
            return Err(failure(format!(
                "{} is defined in {} which is not imported",
                full_name, symbol.file
            )));
        }
        Ok(format!(".{}", full_name))
    };

    for message in &mut file.message_type {
        canonicalize_message(&lookup, &package, message)?;
    }
    for service in &mut file.service {
        for method in &mut service.method {
            method.input_type = Some(lookup(&package, method.input_type(), SymbolKind::Message)?);
            method.output_type = Some(lookup(&package, method.output_type(), SymbolKind::Message)?);
        }
    }
    Ok(())
}

fn canonicalize_message<F>(
    lookup: &F,
    scope: &str,
    message: &mut DescriptorProto,
) -> Result<(), CompileError>
where
    F: Fn(&str, &str, SymbolKind) -> Result<String, CompileError>,
{
    let full_name = qualify(scope, message.name());
    for field in &mut message.field {
        let Some(type_name) = field.type_name.as_deref() else {
            continue;
        };
        let expected = if field.r#type() == Type::Enum {
            SymbolKind::Enum
        } else {
            SymbolKind::Message
        };
        field.type_name = Some(lookup(&full_name, type_name, expected)?);
    }
    for nested in &mut message.nested_type {
        canonicalize_message(lookup, &full_name, nested)?;
    }
    Ok(())
}

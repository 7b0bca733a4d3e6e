//! Import resolution
//!
//! Every type reference in an entity's messages and methods is classified as
//! a well-known type (imported from its `google/protobuf/*.proto` file), a
//! name local to the entity, or another entity's message (imported from that
//! entity's file when it lives in a different package).

use indexmap::{IndexMap, IndexSet};
use once_cell::sync::Lazy;
use prost_types::field_descriptor_proto::Type;
use prost_types::{DescriptorProto, ServiceDescriptorProto};

use crate::error::EntityError;

/// Well-known message → defining file
pub static WELL_KNOWN_TYPES: Lazy<IndexMap<&'static str, &'static str>> = Lazy::new(|| {
    IndexMap::from([
        ("google.protobuf.Timestamp", "google/protobuf/timestamp.proto"),
        ("google.protobuf.Empty", "google/protobuf/empty.proto"),
        ("google.protobuf.DoubleValue", "google/protobuf/wrappers.proto"),
        ("google.protobuf.FloatValue", "google/protobuf/wrappers.proto"),
        ("google.protobuf.Int64Value", "google/protobuf/wrappers.proto"),
        ("google.protobuf.UInt64Value", "google/protobuf/wrappers.proto"),
        ("google.protobuf.Int32Value", "google/protobuf/wrappers.proto"),
        ("google.protobuf.UInt32Value", "google/protobuf/wrappers.proto"),
        ("google.protobuf.BoolValue", "google/protobuf/wrappers.proto"),
        ("google.protobuf.StringValue", "google/protobuf/wrappers.proto"),
        ("google.protobuf.BytesValue", "google/protobuf/wrappers.proto"),
        ("google.protobuf.Struct", "google/protobuf/struct.proto"),
        ("google.protobuf.Value", "google/protobuf/struct.proto"),
        ("google.protobuf.ListValue", "google/protobuf/struct.proto"),
    ])
});

/// Where a generated entity lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityLocation {
    /// Protobuf package
    pub package: String,
    /// File path of the package's unit
    pub path: String,
}

/// Imports and cross-entity references of one entity's output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    /// Import paths, in first-use order
    pub imports: IndexSet<String>,
    /// Other entities whose messages are referenced
    pub entities: IndexSet<String>,
}

/// Resolves type references for one entity
pub struct DependencyResolver<'a> {
    entity: &'a str,
    package: &'a str,
    locations: &'a IndexMap<String, EntityLocation>,
    local_messages: IndexSet<String>,
    local_enums: IndexSet<String>,
}

impl<'a> DependencyResolver<'a> {
    /// Resolver for `entity` in `package`
    ///
    /// `messages` are the entity's own messages; they and their nested enums
    /// resolve without an import.
    pub fn new(
        entity: &'a str,
        package: &'a str,
        messages: &[DescriptorProto],
        locations: &'a IndexMap<String, EntityLocation>,
    ) -> Self {
        let mut local_messages = IndexSet::new();
        let mut local_enums = IndexSet::new();
        for message in messages {
            local_messages.insert(message.name().to_string());
            for nested in &message.enum_type {
                local_enums.insert(format!("{}.{}", message.name(), nested.name()));
                if message.name() == entity {
                    // Bare enum names are in scope inside the entity message
                    local_enums.insert(nested.name().to_string());
                }
            }
        }
        Self {
            entity,
            package,
            locations,
            local_messages,
            local_enums,
        }
    }

    /// Collect the dependencies of `messages` and `services`
    pub fn resolve(
        &self,
        messages: &[DescriptorProto],
        services: &[ServiceDescriptorProto],
    ) -> Result<Dependencies, EntityError> {
        let mut deps = Dependencies::default();
        for message in messages {
            for field in &message.field {
                if let Some(type_name) = &field.type_name {
                    let element = format!("{}.{}", message.name(), field.name());
                    let wants_enum = field.r#type() == Type::Enum;
                    self.reference(&element, type_name, wants_enum, &mut deps)?;
                }
            }
        }
        for service in services {
            for method in &service.method {
                let element = format!("{}.{}", service.name(), method.name());
                self.reference(&element, method.input_type(), false, &mut deps)?;
                self.reference(&element, method.output_type(), false, &mut deps)?;
            }
        }
        Ok(deps)
    }

    fn reference(
        &self,
        element: &str,
        type_name: &str,
        wants_enum: bool,
        deps: &mut Dependencies,
    ) -> Result<(), EntityError> {
        let name = type_name.trim_start_matches('.');
        let unresolved = |reason: &str| EntityError::UnresolvedReference {
            source_element: element.to_string(),
            target: type_name.to_string(),
            reason: reason.to_string(),
        };

        if self.local_enums.contains(name) {
            return if wants_enum {
                Ok(())
            } else {
                Err(unresolved("enum used where a message is expected"))
            };
        }
        if wants_enum {
            return Err(
                if self.local_messages.contains(name) || WELL_KNOWN_TYPES.contains_key(name) {
                    unresolved("message used where an enum is expected")
                } else {
                    unresolved("enum is not defined by the entity")
                },
            );
        }

        if let Some(path) = WELL_KNOWN_TYPES.get(name) {
            deps.imports.insert(path.to_string());
            return Ok(());
        }
        if self.local_messages.contains(name) {
            return Ok(());
        }

        let (package, message) = match name.rsplit_once('.') {
            Some((package, message)) => (package, message),
            None => (self.package, name),
        };
        match self.locations.get(message) {
            Some(location) if location.package == package => {
                if message != self.entity {
                    deps.entities.insert(message.to_string());
                }
                if location.package != self.package {
                    deps.imports.insert(location.path.clone());
                }
                Ok(())
            }
            _ => Err(unresolved("type is neither well-known nor a generated entity")),
        }
    }
}

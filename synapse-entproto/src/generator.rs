//! Compilation pass
//!
//! A single pass over the schema graph in input order:
//!
//! 1. decide which entities generate, and in which package
//! 2. build every entity's messages, service and imports independently
//! 3. reject message and service names already claimed in the package
//! 4. fail entities that reference failed entities, until nothing changes
//! 5. group the survivors into file units and assemble the descriptor set
//!
//! Steps 2 to 4 only ever record errors against single entities. Only the
//! final assembly can fail the whole compilation.

use indexmap::{IndexMap, IndexSet};
use prost::Message;
use prost_reflect::{FileDescriptor, MessageDescriptor};
use prost_types::{DescriptorProto, FileDescriptorSet, ServiceDescriptorProto};
use tracing::{debug, info, warn};

use crate::assemble::assemble;
use crate::deps::{Dependencies, DependencyResolver, EntityLocation};
use crate::error::{CompileError, EntityError};
use crate::message::build_messages;
use crate::options::CompilerOptions;
use crate::package::{rel_file_name, FileUnit};
use crate::schema::{SchemaGraph, SchemaNode};
use crate::service::build_service;

/// Outcome of compiling one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityStatus {
    /// Output is part of the file at `path`
    Generated {
        /// Protobuf package
        package: String,
        /// File path
        path: String,
    },
    /// Not annotated for generation
    Skipped,
    /// Compilation of this entity failed
    Failed(EntityError),
}

/// Result of a successful compilation
///
/// Holds the built descriptors and the outcome of every entity. Entities
/// that failed are absent from the descriptors but their errors can be
/// queried.
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    units: IndexMap<String, FileUnit>,
    files: IndexMap<String, FileDescriptor>,
    descriptor_set: FileDescriptorSet,
    entities: IndexMap<String, EntityStatus>,
}

impl CompiledSchema {
    /// Built file descriptors, by path
    pub fn files(&self) -> &IndexMap<String, FileDescriptor> {
        &self.files
    }

    /// File units, by package
    pub fn units(&self) -> &IndexMap<String, FileUnit> {
        &self.units
    }

    /// File unit of `package`
    pub fn unit(&self, package: &str) -> Option<&FileUnit> {
        self.units.get(package)
    }

    /// Canonical descriptor set, well-known files included
    pub fn descriptor_set(&self) -> &FileDescriptorSet {
        &self.descriptor_set
    }

    /// Wire encoding of the descriptor set, as written by `protoc -o`
    pub fn encode_descriptor_set(&self) -> Vec<u8> {
        self.descriptor_set.encode_to_vec()
    }

    /// Outcome of every entity, in input order
    pub fn entities(&self) -> &IndexMap<String, EntityStatus> {
        &self.entities
    }

    /// Outcome of `entity`
    pub fn status(&self, entity: &str) -> Option<&EntityStatus> {
        self.entities.get(entity)
    }

    /// Entities that failed, with their errors
    pub fn errors(&self) -> IndexMap<&str, &EntityError> {
        self.entities
            .iter()
            .filter_map(|(name, status)| match status {
                EntityStatus::Failed(err) => Some((name.as_str(), err)),
                _ => None,
            })
            .collect()
    }

    /// Entities not annotated for generation
    pub fn skipped(&self) -> Vec<&str> {
        self.entities
            .iter()
            .filter(|(_, status)| matches!(status, EntityStatus::Skipped))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// File descriptor holding `entity`'s message, or the reason there is none
    pub fn file_descriptor(&self, entity: &str) -> Result<&FileDescriptor, EntityError> {
        match self.entities.get(entity) {
            Some(EntityStatus::Generated { path, .. }) => {
                self.files
                    .get(path)
                    .ok_or_else(|| EntityError::UnresolvedReference {
                        source_element: entity.to_string(),
                        target: path.clone(),
                        reason: "file was not built".to_string(),
                    })
            }
            Some(EntityStatus::Skipped) => Err(EntityError::SchemaSkipped {
                entity: entity.to_string(),
            }),
            Some(EntityStatus::Failed(err)) => Err(err.clone()),
            None => Err(EntityError::UnresolvedReference {
                source_element: entity.to_string(),
                target: entity.to_string(),
                reason: "entity is not defined".to_string(),
            }),
        }
    }

    /// Message descriptor of `entity`, or the reason there is none
    pub fn message_descriptor(&self, entity: &str) -> Result<MessageDescriptor, EntityError> {
        let file = self.file_descriptor(entity)?;
        let full_name = format!("{}.{}", file.package_name(), entity);
        file.parent_pool()
            .get_message_by_name(&full_name)
            .ok_or_else(|| EntityError::UnresolvedReference {
                source_element: entity.to_string(),
                target: full_name,
                reason: "message was not built".to_string(),
            })
    }
}

/// Everything one entity contributes to its unit
#[derive(Debug, Clone)]
struct EntityOutput {
    package: String,
    messages: Vec<DescriptorProto>,
    services: Vec<ServiceDescriptorProto>,
    dependencies: Dependencies,
}

impl EntityOutput {
    fn names(&self) -> impl Iterator<Item = &str> {
        self.messages
            .iter()
            .map(|m| m.name())
            .chain(self.services.iter().map(|s| s.name()))
    }
}

/// Compile `graph` into a descriptor set
pub fn compile(
    graph: &SchemaGraph,
    options: &CompilerOptions,
) -> Result<CompiledSchema, CompileError> {
    let mut locations: IndexMap<String, EntityLocation> = IndexMap::new();
    for node in graph.nodes() {
        let Some(message) = node.annotations.message.as_ref().filter(|m| m.generate) else {
            debug!(entity = %node.name, "schema is not annotated for message generation");
            continue;
        };
        let package = message
            .package
            .clone()
            .unwrap_or_else(|| options.default_package.clone());
        locations.insert(
            node.name.clone(),
            EntityLocation {
                path: rel_file_name(&package),
                package,
            },
        );
    }
    let packages: IndexMap<String, String> = locations
        .iter()
        .map(|(name, location)| (name.clone(), location.package.clone()))
        .collect();

    let mut outputs: IndexMap<String, Result<EntityOutput, EntityError>> = IndexMap::new();
    for node in graph.nodes() {
        let Some(location) = locations.get(&node.name) else {
            continue;
        };
        debug!(entity = %node.name, package = %location.package, "compiling entity");
        let output = build_entity(node, &location.package, graph, &packages, &locations);
        outputs.insert(node.name.clone(), output);
    }

    claim_names(&mut outputs);
    propagate_failures(&mut outputs);

    let mut units: IndexMap<String, FileUnit> = IndexMap::new();
    for (name, output) in &outputs {
        match output {
            Ok(output) => {
                let unit = units.entry(output.package.clone()).or_insert_with(|| {
                    debug!(package = %output.package, "creating file unit");
                    FileUnit::new(&output.package)
                });
                unit.messages.extend(output.messages.iter().cloned());
                unit.services.extend(output.services.iter().cloned());
                unit.dependencies
                    .extend(output.dependencies.imports.iter().cloned());
                unit.entities.push(name.clone());
            }
            Err(err) => {
                warn!(entity = %name, error = %err, "skipping schema");
            }
        }
    }

    let mut entities = IndexMap::with_capacity(graph.len());
    for node in graph.nodes() {
        let status = match outputs.get(&node.name) {
            None => EntityStatus::Skipped,
            Some(Err(err)) => EntityStatus::Failed(err.clone()),
            Some(Ok(output)) => EntityStatus::Generated {
                package: output.package.clone(),
                path: rel_file_name(&output.package),
            },
        };
        entities.insert(node.name.clone(), status);
    }

    let assembled = assemble(&units)?;
    info!(
        files = assembled.files.len(),
        entities = entities.len(),
        failed = outputs.values().filter(|o| o.is_err()).count(),
        "assembled descriptor set"
    );

    Ok(CompiledSchema {
        units,
        files: assembled.files,
        descriptor_set: assembled.descriptor_set,
        entities,
    })
}

fn build_entity(
    node: &SchemaNode,
    package: &str,
    graph: &SchemaGraph,
    packages: &IndexMap<String, String>,
    locations: &IndexMap<String, EntityLocation>,
) -> Result<EntityOutput, EntityError> {
    let mut messages = build_messages(node, package, graph, packages)?;
    let mut services = Vec::new();
    if let Some(annotation) = node.annotations.service.filter(|s| s.generate) {
        let output = build_service(node, &annotation)?;
        messages.extend(output.messages);
        services.push(output.service);
    }

    let resolver = DependencyResolver::new(&node.name, package, &messages, locations);
    let dependencies = resolver.resolve(&messages, &services)?;

    Ok(EntityOutput {
        package: package.to_string(),
        messages,
        services,
        dependencies,
    })
}

/// Fail entities whose message or service names are taken in their package
fn claim_names(outputs: &mut IndexMap<String, Result<EntityOutput, EntityError>>) {
    let mut claimed: IndexMap<String, IndexSet<String>> = IndexMap::new();
    for output in outputs.values_mut() {
        let Ok(entity) = output else {
            continue;
        };
        let taken = claimed.entry(entity.package.clone()).or_default();

        let mut own = IndexSet::new();
        let clash = entity
            .names()
            .find(|name| taken.contains(*name) || !own.insert(*name))
            .map(str::to_string);
        if let Some(name) = clash {
            *output = Err(EntityError::NameConflict {
                scope: entity.package.clone(),
                name,
            });
            continue;
        }
        taken.extend(entity.names().map(str::to_string));
    }
}

/// Fail entities referencing failed entities, until a fixed point
fn propagate_failures(outputs: &mut IndexMap<String, Result<EntityOutput, EntityError>>) {
    loop {
        let failed: IndexSet<String> = outputs
            .iter()
            .filter(|(_, output)| output.is_err())
            .map(|(name, _)| name.clone())
            .collect();

        let mut changed = false;
        for (name, output) in outputs.iter_mut() {
            let Ok(entity) = output else {
                continue;
            };
            let broken = entity
                .dependencies
                .entities
                .iter()
                .find(|target| failed.contains(*target))
                .cloned();
            if let Some(target) = broken {
                *output = Err(EntityError::UnresolvedReference {
                    source_element: name.clone(),
                    target,
                    reason: "referenced entity failed to compile".to_string(),
                });
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
entities:
  - name: User
    annotations:
      message: {}
      service: { methods: [get] }
    fields:
      - name: name
        type: string
        annotations: { field: { number: 2 } }
    edges:
      - name: team
        target: Team
        unique: true
        annotations: { field: { number: 3 } }
  - name: Team
    annotations: { message: {} }
    fields:
      - name: blob
        type: other
        annotations: { field: { number: 2 } }
  - name: Audit
"#;

    #[test]
    fn test_failures_propagate_through_edges() {
        let graph = SchemaGraph::from_yaml(DOC).unwrap();
        let compiled = compile(&graph, &CompilerOptions::default()).unwrap();

        assert!(matches!(
            compiled.status("Team"),
            Some(EntityStatus::Failed(EntityError::UnsupportedType { .. }))
        ));
        assert!(matches!(
            compiled.status("User"),
            Some(EntityStatus::Failed(EntityError::UnresolvedReference { target, .. })) if target == "Team"
        ));
        assert_eq!(compiled.skipped(), vec!["Audit"]);
        assert_eq!(compiled.errors().len(), 2);
        assert!(compiled.files().is_empty());
        assert!(compiled.descriptor_set().file.is_empty());
    }

    #[test]
    fn test_lookups() {
        let doc = DOC.replace("type: other", "type: string");
        let graph = SchemaGraph::from_yaml(&doc).unwrap();
        let compiled = compile(&graph, &CompilerOptions::default()).unwrap();

        let user = compiled.message_descriptor("User").unwrap();
        assert_eq!(user.full_name(), "entpb.User");
        assert_eq!(user.fields().count(), 3);

        assert_eq!(
            compiled.file_descriptor("Audit").unwrap_err(),
            EntityError::SchemaSkipped {
                entity: "Audit".to_string()
            }
        );
        assert!(compiled.file_descriptor("Nobody").is_err());

        let unit = compiled.unit("entpb").unwrap();
        assert_eq!(unit.entities, vec!["User", "Team"]);
        assert!(unit.has_service("UserService"));
    }

    #[test]
    fn test_message_name_claimed_by_earlier_entity() {
        let doc = r#"
entities:
  - name: User
    annotations:
      message: {}
      service: { methods: [list] }
  - name: ListUserRequest
    annotations: { message: {} }
"#;
        let graph = SchemaGraph::from_yaml(doc).unwrap();
        let compiled = compile(&graph, &CompilerOptions::default()).unwrap();
        assert!(matches!(
            compiled.status("ListUserRequest"),
            Some(EntityStatus::Failed(EntityError::NameConflict { name, .. })) if name == "ListUserRequest"
        ));
        assert!(compiled.message_descriptor("User").is_ok());
    }

    #[test]
    fn test_default_package_option() {
        let doc = "entities:\n  - name: Tag\n    annotations: { message: {} }\n";
        let graph = SchemaGraph::from_yaml(doc).unwrap();
        let options = CompilerOptions::default().with_default_package("acme.tags");
        let compiled = compile(&graph, &options).unwrap();
        assert!(compiled.files().contains_key("acme/tags/tags.proto"));
    }
}

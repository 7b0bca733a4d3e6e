//! Edge resolution
//!
//! An edge becomes a message-typed field on the source entity: singular for
//! unique edges, repeated otherwise. Targets in another package are
//! referenced by `<package>.<Message>`.

use indexmap::IndexMap;
use prost_types::FieldDescriptorProto;

use crate::error::EntityError;
use crate::message::check_number;
use crate::schema::{EdgeSpec, SchemaGraph};
use crate::types::MappedType;

/// Type name of `target` as referenced from `package`
pub fn qualified_type_name(package: &str, target: &str, target_package: &str) -> String {
    if package == target_package {
        target.to_string()
    } else {
        format!("{}.{}", target_package, target)
    }
}

/// Resolve `edge` of `entity` into a field descriptor
///
/// `packages` holds the package of every entity that generates a message.
pub fn resolve_edge(
    entity: &str,
    package: &str,
    edge: &EdgeSpec,
    graph: &SchemaGraph,
    packages: &IndexMap<String, String>,
) -> Result<FieldDescriptorProto, EntityError> {
    let source_element = format!("{}.{}", entity, edge.name);
    let unresolved = |reason: &str| EntityError::UnresolvedReference {
        source_element: source_element.clone(),
        target: edge.target.clone(),
        reason: reason.to_string(),
    };

    let annotation = edge
        .annotations
        .field
        .as_ref()
        .ok_or_else(|| EntityError::InvalidAnnotation {
            element: source_element.clone(),
            reason: "edge has no field annotation".to_string(),
        })?;
    let number = check_number(entity, &edge.name, annotation.number, false)?;

    if graph.node(&edge.target).is_none() {
        return Err(unresolved("entity is not defined"));
    }
    let target_package = packages
        .get(&edge.target)
        .ok_or_else(|| unresolved("message is not generated"))?;

    let mut mapped = MappedType::message(qualified_type_name(package, &edge.target, target_package));
    if !edge.unique {
        mapped = mapped.repeated();
    }
    Ok(mapped.into_field(&edge.name, number))
}

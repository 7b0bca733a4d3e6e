//! Message building
//!
//! Each generated entity yields one primary message named after the entity,
//! followed by one wrapper message per enum field. Field order is the
//! identifier, then the non-skipped fields, then the non-skipped edges.

use indexmap::{IndexMap, IndexSet};
use prost_types::{DescriptorProto, FieldDescriptorProto};

use crate::edge::resolve_edge;
use crate::enum_gen::{build_enum, build_enum_wrapper};
use crate::error::EntityError;
use crate::schema::{FieldKind, FieldSpec, SchemaGraph, SchemaNode};
use crate::types::map_field;

/// Largest valid protobuf field number
pub const MAX_FIELD_NUMBER: i64 = 536_870_911;

/// Field numbers reserved by the protobuf implementation
pub const RESERVED_FIELD_NUMBERS: std::ops::RangeInclusive<i64> = 19_000..=19_999;

/// Number given to an identifier without a field annotation
pub const IDENTIFIER_FIELD_NUMBER: i32 = 1;

/// Validate a single field number of `message`
pub fn check_number(
    message: &str,
    field: &str,
    number: i64,
    is_identifier: bool,
) -> Result<i32, EntityError> {
    let conflict = |reason: String| EntityError::NumberConflict {
        message: message.to_string(),
        reason,
    };
    if !(1..=MAX_FIELD_NUMBER).contains(&number) {
        return Err(conflict(format!(
            "field {:?} number {} is outside 1..={}",
            field, number, MAX_FIELD_NUMBER
        )));
    }
    if RESERVED_FIELD_NUMBERS.contains(&number) {
        return Err(conflict(format!(
            "field {:?} number {} is reserved by protobuf",
            field, number
        )));
    }
    if number == 1 && !is_identifier {
        return Err(conflict(format!(
            "field {:?} has number 1 which is reserved for the identifier",
            field
        )));
    }
    // Range checked above
    Ok(number as i32)
}

/// Reject duplicate field numbers and names within one message
pub fn verify_unique_fields(message: &DescriptorProto) -> Result<(), EntityError> {
    let mut numbers: IndexMap<i32, &str> = IndexMap::new();
    let mut names: IndexSet<&str> = IndexSet::new();
    for field in &message.field {
        if numbers.insert(field.number(), field.name()).is_some() {
            return Err(EntityError::NumberConflict {
                message: message.name().to_string(),
                reason: format!("field {} already defined", field.number()),
            });
        }
        if !names.insert(field.name()) {
            return Err(EntityError::NameConflict {
                scope: message.name().to_string(),
                name: field.name().to_string(),
            });
        }
    }
    Ok(())
}

/// Build the primary message and enum wrappers of `node`
///
/// `packages` maps every entity that generates a message to its package.
pub fn build_messages(
    node: &SchemaNode,
    package: &str,
    graph: &SchemaGraph,
    packages: &IndexMap<String, String>,
) -> Result<Vec<DescriptorProto>, EntityError> {
    let mut primary = DescriptorProto {
        name: Some(node.name.clone()),
        ..Default::default()
    };
    let mut wrappers = Vec::new();

    if node.id.is_skipped() {
        return Err(EntityError::InvalidAnnotation {
            element: format!("{}.{}", node.name, node.id.name),
            reason: "the identifier cannot be skipped".to_string(),
        });
    }
    let id_number = match &node.id.annotations.field {
        Some(annotation) => check_number(&node.name, &node.id.name, annotation.number, true)?,
        None => IDENTIFIER_FIELD_NUMBER,
    };
    push_field(node, &node.id, id_number, &mut primary, &mut wrappers)?;

    for field in node.fields.iter().filter(|f| !f.is_skipped()) {
        let annotation =
            field
                .annotations
                .field
                .as_ref()
                .ok_or_else(|| EntityError::InvalidAnnotation {
                    element: format!("{}.{}", node.name, field.name),
                    reason: "field has no field annotation".to_string(),
                })?;
        let number = check_number(&node.name, &field.name, annotation.number, false)?;
        push_field(node, field, number, &mut primary, &mut wrappers)?;
    }

    for edge in node.edges.iter().filter(|e| !e.annotations.skip) {
        let descriptor = resolve_edge(&node.name, package, edge, graph, packages)?;
        primary.field.push(descriptor);
    }

    verify_unique_fields(&primary)?;

    let mut messages = Vec::with_capacity(wrappers.len() + 1);
    messages.push(primary);
    messages.extend(wrappers);
    Ok(messages)
}

fn push_field(
    node: &SchemaNode,
    field: &FieldSpec,
    number: i32,
    primary: &mut DescriptorProto,
    wrappers: &mut Vec<DescriptorProto>,
) -> Result<(), EntityError> {
    let descriptor: FieldDescriptorProto = map_field(&node.name, field)?.into_field(&field.name, number);
    if field.kind == FieldKind::Enum {
        let enum_desc = build_enum(&node.name, field)?;
        if primary.enum_type.iter().any(|e| e.name() == enum_desc.name()) {
            return Err(EntityError::NameConflict {
                scope: node.name.clone(),
                name: enum_desc.name().to_string(),
            });
        }
        // Enum values share the scope of the enclosing message
        for value in &enum_desc.value {
            let clash = primary
                .enum_type
                .iter()
                .flat_map(|e| e.value.iter())
                .any(|existing| existing.name() == value.name());
            if clash {
                return Err(EntityError::NameConflict {
                    scope: node.name.clone(),
                    name: value.name().to_string(),
                });
            }
        }
        primary.enum_type.push(enum_desc);
        wrappers.push(build_enum_wrapper(&node.name, field));
    }
    primary.field.push(descriptor);
    Ok(())
}

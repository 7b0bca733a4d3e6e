//! List method messages
//!
//! Generates, for an entity exposing `List`:
//! - `List<Entity>Filter` with one field per requested filter mode
//! - `List<Entity>Request` with pagination, ordering and the filter
//! - `List<Entity>Response` with the page of items and the total count

use heck::ToSnakeCase;
use indexmap::IndexSet;
use prost_types::field_descriptor_proto::Type;
use prost_types::{DescriptorProto, FieldDescriptorProto};

use crate::annotations::FilterMode;
use crate::error::EntityError;
use crate::schema::{FieldKind, FieldSpec, SchemaNode};
use crate::types::{enum_type_name, map_kind, optional_wrapper, MappedType, INT32_VALUE, STRING_VALUE};

/// `List<Entity>Filter`
pub fn filter_message_name(entity: &str) -> String {
    format!("List{}Filter", entity)
}

/// `List<Entity>Request`
pub fn request_message_name(entity: &str) -> String {
    format!("List{}Request", entity)
}

/// `List<Entity>Response`
pub fn response_message_name(entity: &str) -> String {
    format!("List{}Response", entity)
}

/// Whether `kind` can identify rows of a paginated listing
pub fn supports_listing(kind: FieldKind) -> bool {
    kind.is_integer() || matches!(kind, FieldKind::String | FieldKind::Uuid)
}

/// Filter, request and response messages for `node`, in that order
pub fn build_list_messages(node: &SchemaNode) -> Result<Vec<DescriptorProto>, EntityError> {
    if !supports_listing(node.id.kind) {
        return Err(EntityError::IdentifierTypeUnsupported {
            entity: node.name.clone(),
            id_type: node.id.kind.to_string(),
        });
    }

    let filter = build_filter(node)?;
    let request = build_request(&node.name);
    let response = build_response(&node.name);
    Ok(vec![filter, request, response])
}

fn build_filter(node: &SchemaNode) -> Result<DescriptorProto, EntityError> {
    let message_name = filter_message_name(&node.name);
    let mut fields: Vec<FieldDescriptorProto> = Vec::new();
    let mut names = IndexSet::new();
    let mut push = |name: String, mapped: MappedType| -> Result<(), EntityError> {
        if !names.insert(name.clone()) {
            return Err(EntityError::NameConflict {
                scope: message_name.clone(),
                name,
            });
        }
        // Numbered by position
        let number = fields.len() as i32 + 1;
        fields.push(mapped.into_field(&name, number));
        Ok(())
    };

    let filtered = std::iter::once(&node.id)
        .chain(node.fields.iter())
        .filter(|field| !field.is_skipped());
    for field in filtered {
        let Some(annotation) = field.annotations.filter else {
            continue;
        };
        let base = field.name.to_snake_case();

        if annotation.mode.has(FilterMode::EQ) {
            push(base.clone(), filter_type(&node.name, field, true)?)?;
        }
        if annotation.mode.has(FilterMode::CONTAINS) {
            if field.kind != FieldKind::String {
                return Err(EntityError::FilterModeMismatch {
                    entity: node.name.clone(),
                    field: field.name.clone(),
                    field_type: field.kind.to_string(),
                });
            }
            push(format!("{}_contains", base), MappedType::message(STRING_VALUE))?;
        }
        if annotation.mode.has(FilterMode::IN) {
            push(format!("{}_in", base), filter_type(&node.name, field, false)?.repeated())?;
        }
    }

    if let Some(extra) = &node.annotations.extra_filter {
        for (name, &kind) in &extra.fields {
            let wrapper = optional_wrapper(kind).ok_or_else(|| EntityError::UnsupportedType {
                field: name.clone(),
                field_type: format!("optional {}", kind),
            })?;
            push(name.to_snake_case(), MappedType::message(wrapper))?;
        }
    }

    Ok(DescriptorProto {
        name: Some(filter_message_name(&node.name)),
        field: fields,
        ..Default::default()
    })
}

/// Type of a filter field; enums reference the entity's nested enum directly
fn filter_type(entity: &str, field: &FieldSpec, optional: bool) -> Result<MappedType, EntityError> {
    match field.kind {
        FieldKind::Enum => Ok(MappedType::enumeration(format!(
            "{}.{}",
            entity,
            enum_type_name(&field.name)
        ))),
        FieldKind::Json | FieldKind::Other => Err(EntityError::UnsupportedType {
            field: field.name.clone(),
            field_type: field.kind.to_string(),
        }),
        kind => map_kind(&field.name, kind, optional),
    }
}

fn build_request(entity: &str) -> DescriptorProto {
    DescriptorProto {
        name: Some(request_message_name(entity)),
        field: vec![
            MappedType::message(INT32_VALUE).into_field("offset", 1),
            MappedType::message(INT32_VALUE).into_field("limit", 2),
            MappedType::message(STRING_VALUE).into_field("order", 3),
            MappedType::scalar(Type::Bool).into_field("descending", 4),
            MappedType::message(filter_message_name(entity)).into_field("filter", 5),
            MappedType::scalar(Type::Bool).into_field("no_limit", 6),
        ],
        ..Default::default()
    }
}

fn build_response(entity: &str) -> DescriptorProto {
    DescriptorProto {
        name: Some(response_message_name(entity)),
        field: vec![
            MappedType::message(entity).repeated().into_field("items", 1),
            MappedType::scalar(Type::Int32).into_field("total", 2),
        ],
        ..Default::default()
    }
}

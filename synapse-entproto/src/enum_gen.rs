//! Enum translation
//!
//! An enum field becomes an enum nested in the entity message. Numbers come
//! from the field's `enum` annotation and are never assigned automatically.
//! Without a declared default, `<FIELD>_UNSPECIFIED = 0` is prepended.

use heck::ToShoutySnakeCase;
use indexmap::{IndexMap, IndexSet};
use prost_types::{DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto};

use crate::annotations::EnumAnnotation;
use crate::error::EntityError;
use crate::schema::FieldSpec;
use crate::types::{enum_type_name, enum_wrapper_name, MappedType};

/// Replace every run of characters outside `[A-Za-z0-9_]` with `_`
pub fn normalize_identifier(value: &str) -> String {
    let mut normalized = String::with_capacity(value.len());
    let mut in_run = false;
    for c in value.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            normalized.push(c);
            in_run = false;
        } else if !in_run {
            normalized.push('_');
            in_run = true;
        }
    }
    normalized
}

/// Protobuf value identifier for an enum value
fn value_identifier(value: &str) -> String {
    normalize_identifier(value).to_shouty_snake_case()
}

/// Check the enum annotation against the field's values
pub fn verify(
    element: &str,
    field: &FieldSpec,
    annotation: &EnumAnnotation,
) -> Result<(), EntityError> {
    let invalid = |reason: String| EntityError::InvalidAnnotation {
        element: element.to_string(),
        reason,
    };

    for value in &field.values {
        if !annotation.options.contains_key(value) {
            return Err(invalid(format!("enum value {:?} is missing an option number", value)));
        }
    }
    for key in annotation.options.keys() {
        if !field.values.contains(key) {
            return Err(invalid(format!("enum option {:?} is not a value of the field", key)));
        }
    }

    let mut identifiers: IndexMap<String, &str> = IndexMap::new();
    for value in &field.values {
        let identifier = value_identifier(value);
        if let Some(previous) = identifiers.insert(identifier.clone(), value) {
            return Err(invalid(format!(
                "enum values {:?} and {:?} both normalize to {}",
                previous, value, identifier
            )));
        }
    }

    let mut numbers: IndexMap<i32, &str> = IndexMap::new();
    for (value, &number) in &annotation.options {
        if let Some(previous) = numbers.insert(number, value) {
            return Err(invalid(format!(
                "enum values {:?} and {:?} share number {}",
                previous, value, number
            )));
        }
    }

    match field.default.as_deref() {
        Some(default) => {
            if !field.values.iter().any(|value| value == default) {
                return Err(invalid(format!("default {:?} is not an enum value", default)));
            }
            if annotation.options.get(default) != Some(&0) {
                return Err(invalid(format!("default enum value {:?} must be number 0", default)));
            }
        }
        None => {
            if let Some(value) = numbers.get(&0) {
                return Err(invalid(format!(
                    "enum value {:?} uses number 0, reserved for the unspecified value",
                    value
                )));
            }
        }
    }

    Ok(())
}

/// Build the enum nested in `entity`'s message for `field`
pub fn build_enum(entity: &str, field: &FieldSpec) -> Result<EnumDescriptorProto, EntityError> {
    let element = format!("{}.{}", entity, field.name);
    let annotation =
        field
            .annotations
            .enum_options
            .as_ref()
            .ok_or_else(|| EntityError::InvalidAnnotation {
                element: element.clone(),
                reason: "enum field has no enum annotation".to_string(),
            })?;
    verify(&element, field, annotation)?;

    let field_prefix = field.name.to_shouty_snake_case();
    let mut values = Vec::with_capacity(field.values.len() + 1);
    if field.default.is_none() {
        values.push(enum_value(format!("{}_UNSPECIFIED", field_prefix), 0));
    }

    // proto3 requires the zero value first, so the default leads
    let ordered = field
        .default
        .iter()
        .chain(field.values.iter().filter(|v| Some(*v) != field.default.as_ref()));
    for value in ordered {
        let identifier = value_identifier(value);
        let name = if annotation.omit_field_prefix {
            identifier
        } else {
            format!("{}_{}", field_prefix, identifier)
        };
        let number = annotation.options.get(value).copied().unwrap_or_default();
        values.push(enum_value(name, number));
    }

    let mut names = IndexSet::with_capacity(values.len());
    for value in &values {
        if !names.insert(value.name().to_string()) {
            return Err(EntityError::NameConflict {
                scope: format!("{}.{}", entity, enum_type_name(&field.name)),
                name: value.name().to_string(),
            });
        }
    }

    Ok(EnumDescriptorProto {
        name: Some(enum_type_name(&field.name)),
        value: values,
        ..Default::default()
    })
}

/// `<Entity><Field>EnumValue { <Entity>.<Enum> value = 1; }`
pub fn build_enum_wrapper(entity: &str, field: &FieldSpec) -> DescriptorProto {
    let enum_ref = format!("{}.{}", entity, enum_type_name(&field.name));
    DescriptorProto {
        name: Some(enum_wrapper_name(entity, &field.name)),
        field: vec![MappedType::enumeration(enum_ref).into_field("value", 1)],
        ..Default::default()
    }
}

fn enum_value(name: String, number: i32) -> EnumValueDescriptorProto {
    EnumValueDescriptorProto {
        name: Some(name),
        number: Some(number),
        options: None,
    }
}

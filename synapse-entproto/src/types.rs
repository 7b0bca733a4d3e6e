//! Type mapping from schema field types to protobuf types
//!
//! Non-optional primitives map to scalars, optional primitives map to the
//! `google.protobuf` wrapper messages. Type names produced here are relative
//! (`google.protobuf.Int64Value`, `Status`, `UserStatusEnumValue`); they are
//! canonicalized when the descriptor set is assembled.

use heck::ToUpperCamelCase;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::FieldDescriptorProto;

use crate::error::EntityError;
use crate::schema::{FieldKind, FieldSpec, JsonShape};

/// `google.protobuf.Timestamp`
pub const TIMESTAMP: &str = "google.protobuf.Timestamp";
/// `google.protobuf.Empty`
pub const EMPTY: &str = "google.protobuf.Empty";
/// `google.protobuf.Value`
pub const VALUE: &str = "google.protobuf.Value";
/// `google.protobuf.Int32Value`
pub const INT32_VALUE: &str = "google.protobuf.Int32Value";
/// `google.protobuf.StringValue`
pub const STRING_VALUE: &str = "google.protobuf.StringValue";

/// A protobuf field type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedType {
    /// Scalar or message/enum type
    pub proto_type: Type,
    /// Referenced message or enum, for `TYPE_MESSAGE` and `TYPE_ENUM`
    pub type_name: Option<String>,
    /// Repeated label
    pub repeated: bool,
}

impl MappedType {
    /// Scalar type
    pub fn scalar(proto_type: Type) -> Self {
        Self {
            proto_type,
            type_name: None,
            repeated: false,
        }
    }

    /// Message type
    pub fn message(type_name: impl Into<String>) -> Self {
        Self {
            proto_type: Type::Message,
            type_name: Some(type_name.into()),
            repeated: false,
        }
    }

    /// Enum type
    pub fn enumeration(type_name: impl Into<String>) -> Self {
        Self {
            proto_type: Type::Enum,
            type_name: Some(type_name.into()),
            repeated: false,
        }
    }

    /// Same type with the repeated label
    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }

    /// Field descriptor carrying this type
    pub fn into_field(self, name: &str, number: i32) -> FieldDescriptorProto {
        let label = if self.repeated {
            Label::Repeated
        } else {
            Label::Optional
        };
        FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            label: Some(label as i32),
            r#type: Some(self.proto_type as i32),
            type_name: self.type_name,
            json_name: None,
            ..Default::default()
        }
    }
}

/// Scalar type of a non-optional primitive
pub fn scalar_type(kind: FieldKind) -> Option<Type> {
    let proto_type = match kind {
        FieldKind::Bool => Type::Bool,
        FieldKind::Int | FieldKind::Int8 | FieldKind::Int16 | FieldKind::Int32 => Type::Int32,
        FieldKind::Int64 => Type::Int64,
        FieldKind::Uint | FieldKind::Uint8 | FieldKind::Uint16 | FieldKind::Uint32 => {
            Type::Uint32
        }
        FieldKind::Uint64 => Type::Uint64,
        FieldKind::Float32 => Type::Float,
        FieldKind::Float64 => Type::Double,
        FieldKind::String => Type::String,
        FieldKind::Uuid | FieldKind::Bytes => Type::Bytes,
        _ => return None,
    };
    Some(proto_type)
}

/// Message standing in for an optional value of `kind`
///
/// Time is always a timestamp. Enum, JSON and `other` have no wrapper.
pub fn optional_wrapper(kind: FieldKind) -> Option<&'static str> {
    let wrapper = match kind {
        FieldKind::Bool => "google.protobuf.BoolValue",
        FieldKind::Int | FieldKind::Int8 | FieldKind::Int16 | FieldKind::Int32 => INT32_VALUE,
        FieldKind::Int64 => "google.protobuf.Int64Value",
        FieldKind::Uint | FieldKind::Uint8 | FieldKind::Uint16 | FieldKind::Uint32 => {
            "google.protobuf.UInt32Value"
        }
        FieldKind::Uint64 => "google.protobuf.UInt64Value",
        FieldKind::Float32 => "google.protobuf.FloatValue",
        FieldKind::Float64 => "google.protobuf.DoubleValue",
        FieldKind::String => STRING_VALUE,
        FieldKind::Uuid | FieldKind::Bytes => "google.protobuf.BytesValue",
        FieldKind::Time => TIMESTAMP,
        FieldKind::Json | FieldKind::Enum | FieldKind::Other => return None,
    };
    Some(wrapper)
}

/// Map a primitive kind, ignoring enums and JSON
pub fn map_kind(field: &str, kind: FieldKind, optional: bool) -> Result<MappedType, EntityError> {
    if kind == FieldKind::Time {
        return Ok(MappedType::message(TIMESTAMP));
    }
    let mapped = if optional {
        optional_wrapper(kind).map(MappedType::message)
    } else {
        scalar_type(kind).map(MappedType::scalar)
    };
    mapped.ok_or_else(|| unsupported(field, kind, optional))
}

/// Map a field of `entity` to its protobuf type
pub fn map_field(entity: &str, field: &FieldSpec) -> Result<MappedType, EntityError> {
    if let Some(annotation) = &field.annotations.field {
        if let Some(type_override) = annotation.type_override {
            // Overrides are taken verbatim, optionality included
            return check_override(entity, field, type_override.0, annotation.type_name.as_deref());
        }
    }

    match field.kind {
        FieldKind::Enum if field.optional => Ok(MappedType::message(enum_wrapper_name(
            entity,
            &field.name,
        ))),
        FieldKind::Enum => Ok(MappedType::enumeration(enum_type_name(&field.name))),
        FieldKind::Json => Ok(map_json(field.json.unwrap_or_default())),
        kind => map_kind(&field.name, kind, field.optional),
    }
}

fn check_override(
    entity: &str,
    field: &FieldSpec,
    proto_type: Type,
    type_name: Option<&str>,
) -> Result<MappedType, EntityError> {
    let invalid = |reason: String| EntityError::InvalidAnnotation {
        element: format!("{}.{}", entity, field.name),
        reason,
    };
    let type_name = type_name.filter(|name| !name.is_empty());
    match (proto_type, type_name) {
        (Type::Group, _) => Err(invalid("group fields are not allowed in proto3".to_string())),
        (Type::Message | Type::Enum, None) => Err(invalid(format!(
            "type override {} requires a type_name",
            proto_type.as_str_name()
        ))),
        (Type::Message | Type::Enum, Some(name)) => Ok(MappedType {
            proto_type,
            type_name: Some(name.to_string()),
            repeated: false,
        }),
        (scalar, Some(name)) => Err(invalid(format!(
            "scalar type override {} cannot name a type ({})",
            scalar.as_str_name(),
            name
        ))),
        (scalar, None) => Ok(MappedType::scalar(scalar)),
    }
}

fn map_json(shape: JsonShape) -> MappedType {
    match shape {
        JsonShape::StringList => MappedType::scalar(Type::String).repeated(),
        JsonShape::Int32List => MappedType::scalar(Type::Int32).repeated(),
        JsonShape::Int64List => MappedType::scalar(Type::Int64).repeated(),
        JsonShape::Uint32List => MappedType::scalar(Type::Uint32).repeated(),
        JsonShape::Uint64List => MappedType::scalar(Type::Uint64).repeated(),
        JsonShape::Any => MappedType::message(VALUE),
    }
}

fn unsupported(field: &str, kind: FieldKind, optional: bool) -> EntityError {
    let field_type = if optional {
        format!("optional {}", kind)
    } else {
        kind.to_string()
    };
    EntityError::UnsupportedType {
        field: field.to_string(),
        field_type,
    }
}

/// Name of the enum nested in the entity message for `field`
pub fn enum_type_name(field: &str) -> String {
    field.to_upper_camel_case()
}

/// Name of the message wrapping an optional enum value
pub fn enum_wrapper_name(entity: &str, field: &str) -> String {
    format!("{}_{}_enum_value", entity, field).to_upper_camel_case()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{FieldAnnotation, ProtoType};

    #[test]
    fn test_primitive_types() {
        let mapped = map_kind("age", FieldKind::Int8, false).unwrap();
        assert_eq!(mapped, MappedType::scalar(Type::Int32));
        assert_eq!(map_kind("n", FieldKind::Uint, false).unwrap().proto_type, Type::Uint32);
        assert_eq!(map_kind("f", FieldKind::Float32, false).unwrap().proto_type, Type::Float);
        assert_eq!(map_kind("id", FieldKind::Uuid, false).unwrap().proto_type, Type::Bytes);
    }

    #[test]
    fn test_optional_uses_wrapper() {
        let cases = [
            (FieldKind::Int32, "google.protobuf.Int32Value"),
            (FieldKind::Int64, "google.protobuf.Int64Value"),
            (FieldKind::Uint16, "google.protobuf.UInt32Value"),
            (FieldKind::Float64, "google.protobuf.DoubleValue"),
            (FieldKind::String, "google.protobuf.StringValue"),
            (FieldKind::Uuid, "google.protobuf.BytesValue"),
            (FieldKind::Bool, "google.protobuf.BoolValue"),
        ];
        for (kind, wrapper) in cases {
            let optional = map_kind("f", kind, true).unwrap();
            assert_eq!(optional.type_name.as_deref(), Some(wrapper));
            let required = map_kind("f", kind, false).unwrap();
            assert_eq!(required.type_name, None, "{} must not be wrapped", kind);
        }
    }

    #[test]
    fn test_time_is_always_timestamp() {
        for optional in [false, true] {
            let mapped = map_kind("created_at", FieldKind::Time, optional).unwrap();
            assert_eq!(mapped, MappedType::message(TIMESTAMP));
        }
    }

    #[test]
    fn test_json_shapes() {
        let mut field = FieldSpec::new("tags", FieldKind::Json);
        field.json = Some(JsonShape::StringList);
        assert_eq!(
            map_field("User", &field).unwrap(),
            MappedType::scalar(Type::String).repeated()
        );

        field.json = None;
        assert_eq!(map_field("User", &field).unwrap(), MappedType::message(VALUE));
    }

    #[test]
    fn test_enum_fields() {
        let mut field = FieldSpec::new("status", FieldKind::Enum);
        assert_eq!(
            map_field("User", &field).unwrap(),
            MappedType::enumeration("Status")
        );

        field.optional = true;
        assert_eq!(
            map_field("User", &field).unwrap(),
            MappedType::message("UserStatusEnumValue")
        );
    }

    #[test]
    fn test_override_bypasses_optionality() {
        let mut field = FieldSpec::new("balance", FieldKind::Other);
        field.optional = true;
        field.annotations.field = Some(FieldAnnotation {
            number: 4,
            type_override: Some(ProtoType(Type::Sint64)),
            type_name: None,
        });
        assert_eq!(map_field("Account", &field).unwrap(), MappedType::scalar(Type::Sint64));
    }

    #[test]
    fn test_malformed_overrides_rejected() {
        let cases = [
            (Type::Message, None),
            (Type::Enum, None),
            (Type::Group, Some("Legacy")),
            (Type::Int64, Some("google.protobuf.Int64Value")),
        ];
        for (proto_type, type_name) in cases {
            let mut field = FieldSpec::new("balance", FieldKind::Other);
            field.annotations.field = Some(FieldAnnotation {
                number: 4,
                type_override: Some(ProtoType(proto_type)),
                type_name: type_name.map(str::to_string),
            });
            let err = map_field("Account", &field).unwrap_err();
            assert!(
                matches!(&err, EntityError::InvalidAnnotation { element, .. } if element == "Account.balance"),
                "{:?} / {:?} gave {:?}",
                proto_type,
                type_name,
                err
            );
        }
    }

    #[test]
    fn test_message_override_keeps_type_name() {
        let mut field = FieldSpec::new("payload", FieldKind::Other);
        field.annotations.field = Some(FieldAnnotation {
            number: 5,
            type_override: Some(ProtoType(Type::Message)),
            type_name: Some("google.protobuf.Struct".to_string()),
        });
        assert_eq!(
            map_field("Event", &field).unwrap(),
            MappedType::message("google.protobuf.Struct")
        );
    }

    #[test]
    fn test_other_is_unsupported() {
        let field = FieldSpec::new("blob", FieldKind::Other);
        let err = map_field("User", &field).unwrap_err();
        assert!(matches!(err, EntityError::UnsupportedType { field, .. } if field == "blob"));
    }

    #[test]
    fn test_into_field_labels() {
        let repeated = MappedType::scalar(Type::Int64).repeated().into_field("ids", 3);
        assert_eq!(repeated.label, Some(Label::Repeated as i32));
        assert_eq!(repeated.number, Some(3));

        let single = MappedType::message(TIMESTAMP).into_field("at", 2);
        assert_eq!(single.label, Some(Label::Optional as i32));
        assert_eq!(single.type_name.as_deref(), Some(TIMESTAMP));
    }
}

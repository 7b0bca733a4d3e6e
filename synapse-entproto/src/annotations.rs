//! Typed schema annotations
//!
//! Every annotation an entity, field or edge can carry is one of the structs
//! below. They are decoded together with the schema document, so an unknown
//! key or a malformed mask is rejected at ingestion instead of at each use
//! site.

use indexmap::IndexMap;
use prost_types::field_descriptor_proto::Type;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::fmt;
use std::ops::BitOr;

use crate::schema::FieldKind;

/// Package used when a message annotation does not name one
pub const DEFAULT_PACKAGE: &str = "entpb";

fn default_true() -> bool {
    true
}

/// `message` annotation: opts an entity into generation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageAnnotation {
    /// Whether a message is generated for the entity
    #[serde(default = "default_true")]
    pub generate: bool,
    /// Target protobuf package
    #[serde(default)]
    pub package: Option<String>,
}

impl Default for MessageAnnotation {
    fn default() -> Self {
        Self {
            generate: true,
            package: None,
        }
    }
}

/// `field` annotation on fields and edges
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldAnnotation {
    /// Protobuf field number
    pub number: i64,
    /// Explicit protobuf type, bypasses type inference
    #[serde(default, rename = "type")]
    pub type_override: Option<ProtoType>,
    /// Type name for message or enum overrides
    #[serde(default)]
    pub type_name: Option<String>,
}

impl FieldAnnotation {
    /// Annotation carrying only a field number
    pub fn number(number: i64) -> Self {
        Self {
            number,
            type_override: None,
            type_name: None,
        }
    }
}

/// A protobuf field type named in a schema document
///
/// Accepts the descriptor spelling (`TYPE_UINT64`) as well as the `.proto`
/// keyword (`uint64`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtoType(pub Type);

impl ProtoType {
    /// Parse a descriptor or keyword spelling
    pub fn parse(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        let full = if upper.starts_with("TYPE_") {
            upper
        } else {
            format!("TYPE_{}", upper)
        };
        Type::from_str_name(&full).map(ProtoType)
    }
}

impl<'de> Deserialize<'de> for ProtoType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ProtoType::parse(&raw)
            .ok_or_else(|| de::Error::custom(format!("unknown protobuf type {:?}", raw)))
    }
}

/// `enum` annotation: explicit numbering for enum values
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnumAnnotation {
    /// Enum value → protobuf number
    #[serde(default)]
    pub options: IndexMap<String, i32>,
    /// Emit `ACTIVE` instead of `STATUS_ACTIVE`
    #[serde(default)]
    pub omit_field_prefix: bool,
}

/// Bitmask of filter modes
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterMode(u8);

impl FilterMode {
    /// `<field>` equality filter
    pub const EQ: FilterMode = FilterMode(1);
    /// `<field>_contains` substring filter
    pub const CONTAINS: FilterMode = FilterMode(1 << 1);
    /// `<field>_in` membership filter
    pub const IN: FilterMode = FilterMode(1 << 2);

    /// Raw bits
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Whether any bit of `other` is set
    pub fn has(self, other: FilterMode) -> bool {
        self.0 & other.0 != 0
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "eq" => Some(Self::EQ),
            "contains" => Some(Self::CONTAINS),
            "in" => Some(Self::IN),
            _ => None,
        }
    }
}

impl Default for FilterMode {
    fn default() -> Self {
        Self::EQ
    }
}

impl BitOr for FilterMode {
    type Output = FilterMode;

    fn bitor(self, rhs: Self) -> Self::Output {
        FilterMode(self.0 | rhs.0)
    }
}

impl fmt::Debug for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [(Self::EQ, "EQ"), (Self::CONTAINS, "CONTAINS"), (Self::IN, "IN")]
            .into_iter()
            .filter(|(mode, _)| self.has(*mode))
            .map(|(_, name)| name)
            .collect();
        write!(f, "FilterMode({})", names.join("|"))
    }
}

impl<'de> Deserialize<'de> for FilterMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = deserialize_mask(deserializer, "filter mode", 0b111, FilterMode::from_name)?;
        Ok(FilterMode(bits))
    }
}

/// `filter` annotation on a field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterAnnotation {
    /// Which filter fields to synthesize
    #[serde(default)]
    pub mode: FilterMode,
}

/// `extra_filter` annotation: filter fields not backed by an entity field
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtraFilterAnnotation {
    /// Filter field name → primitive kind
    #[serde(default)]
    pub fields: IndexMap<String, FieldKind>,
}

/// A single service method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Create an entity
    Create,
    /// Fetch an entity by identifier
    Get,
    /// Replace an entity
    Update,
    /// Delete an entity by identifier
    Delete,
    /// List entities page by page
    List,
}

impl Method {
    /// Every method, in emission order
    pub const ALL: [Method; 5] = [
        Method::Create,
        Method::Get,
        Method::Update,
        Method::Delete,
        Method::List,
    ];

    /// Method name as it appears in the service
    pub fn name(self) -> &'static str {
        match self {
            Method::Create => "Create",
            Method::Get => "Get",
            Method::Update => "Update",
            Method::Delete => "Delete",
            Method::List => "List",
        }
    }

    /// Mask with only this method set
    pub fn mask(self) -> Methods {
        match self {
            Method::Create => Methods::CREATE,
            Method::Get => Methods::GET,
            Method::Update => Methods::UPDATE,
            Method::Delete => Methods::DELETE,
            Method::List => Methods::LIST,
        }
    }
}

/// Bitmask of service methods
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Methods(u8);

impl Methods {
    /// Create method
    pub const CREATE: Methods = Methods(1);
    /// Get method
    pub const GET: Methods = Methods(1 << 1);
    /// Update method
    pub const UPDATE: Methods = Methods(1 << 2);
    /// Delete method
    pub const DELETE: Methods = Methods(1 << 3);
    /// List method
    pub const LIST: Methods = Methods(1 << 4);
    /// Every method
    pub const ALL: Methods = Methods(0b1_1111);

    /// Raw bits
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Whether any bit of `other` is set
    pub fn has(self, other: Methods) -> bool {
        self.0 & other.0 != 0
    }

    /// Methods in emission order
    pub fn iter(self) -> impl Iterator<Item = Method> {
        Method::ALL
            .into_iter()
            .filter(move |method| self.has(method.mask()))
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "create" => Some(Self::CREATE),
            "get" => Some(Self::GET),
            "update" => Some(Self::UPDATE),
            "delete" => Some(Self::DELETE),
            "list" => Some(Self::LIST),
            "all" => Some(Self::ALL),
            _ => None,
        }
    }
}

impl Default for Methods {
    fn default() -> Self {
        Self::ALL
    }
}

impl BitOr for Methods {
    type Output = Methods;

    fn bitor(self, rhs: Self) -> Self::Output {
        Methods(self.0 | rhs.0)
    }
}

impl fmt::Debug for Methods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(Method::name).collect();
        write!(f, "Methods({})", names.join("|"))
    }
}

impl<'de> Deserialize<'de> for Methods {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = deserialize_mask(deserializer, "service method", 0b1_1111, Methods::from_name)?;
        // An empty mask means "everything"
        if bits == 0 {
            return Ok(Methods::ALL);
        }
        Ok(Methods(bits))
    }
}

/// `service` annotation: opts an entity into service generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceAnnotation {
    /// Whether the service is generated
    #[serde(default = "default_true")]
    pub generate: bool,
    /// Methods to generate
    #[serde(default)]
    pub methods: Methods,
}

impl Default for ServiceAnnotation {
    fn default() -> Self {
        Self {
            generate: true,
            methods: Methods::ALL,
        }
    }
}

/// Masks can be written as a number, a `|`-separated string or a list of names
#[derive(Deserialize)]
#[serde(untagged)]
enum RawMask {
    Bits(u8),
    Joined(String),
    Names(Vec<String>),
}

trait MaskBits {
    fn mask_bits(self) -> u8;
}

impl MaskBits for FilterMode {
    fn mask_bits(self) -> u8 {
        self.0
    }
}

impl MaskBits for Methods {
    fn mask_bits(self) -> u8 {
        self.0
    }
}

fn deserialize_mask<'de, D, T>(
    deserializer: D,
    what: &str,
    valid: u8,
    from_name: fn(&str) -> Option<T>,
) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
    T: MaskBits,
{
    let names: Vec<String> = match RawMask::deserialize(deserializer)? {
        RawMask::Bits(bits) => {
            if bits & !valid != 0 {
                return Err(de::Error::custom(format!("invalid {} mask {:#b}", what, bits)));
            }
            return Ok(bits);
        }
        RawMask::Joined(joined) => joined
            .split('|')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        RawMask::Names(names) => names,
    };

    let mut bits = 0u8;
    for name in &names {
        let flag = from_name(name)
            .ok_or_else(|| de::Error::custom(format!("unknown {} {:?}", what, name)))?;
        bits |= flag.mask_bits();
    }
    Ok(bits)
}

/// Annotations on an entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeAnnotations {
    /// Message generation
    #[serde(default)]
    pub message: Option<MessageAnnotation>,
    /// Service generation
    #[serde(default)]
    pub service: Option<ServiceAnnotation>,
    /// Extra filter fields for List
    #[serde(default)]
    pub extra_filter: Option<ExtraFilterAnnotation>,
}

/// Annotations on a field
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldAnnotations {
    /// Field number and type override
    #[serde(default)]
    pub field: Option<FieldAnnotation>,
    /// Enum numbering
    #[serde(default, rename = "enum")]
    pub enum_options: Option<EnumAnnotation>,
    /// Filter modes
    #[serde(default)]
    pub filter: Option<FilterAnnotation>,
    /// Exclude the field from all output
    #[serde(default)]
    pub skip: bool,
}

/// Annotations on an edge
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdgeAnnotations {
    /// Field number of the edge
    #[serde(default)]
    pub field: Option<FieldAnnotation>,
    /// Exclude the edge from all output
    #[serde(default)]
    pub skip: bool,
}

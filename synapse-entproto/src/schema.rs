//! Entity schema model
//!
//! The schema graph is the compiler's input: an ordered list of entities,
//! each with typed fields, edges to other entities and typed annotations.
//! It is read-only during compilation and indexed by entity name once, at
//! construction.

use indexmap::IndexMap;
use serde::Deserialize;
use std::fmt;

use crate::annotations::{EdgeAnnotations, FieldAnnotations, NodeAnnotations};
use crate::error::{CompileError, SchemaError};

/// Type tag of a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Boolean
    Bool,
    /// Platform integer, treated as 32 bits
    Int,
    /// 8-bit integer
    Int8,
    /// 16-bit integer
    Int16,
    /// 32-bit integer
    Int32,
    /// 64-bit integer
    Int64,
    /// Platform unsigned integer, treated as 32 bits
    Uint,
    /// 8-bit unsigned integer
    Uint8,
    /// 16-bit unsigned integer
    Uint16,
    /// 32-bit unsigned integer
    Uint32,
    /// 64-bit unsigned integer
    Uint64,
    /// Single precision float
    Float32,
    /// Double precision float
    Float64,
    /// UTF-8 string
    String,
    /// UUID
    Uuid,
    /// Raw bytes
    Bytes,
    /// Timestamp
    Time,
    /// JSON value, shaped by [`JsonShape`]
    Json,
    /// Enumeration, values listed on the field
    Enum,
    /// Anything without a protobuf mapping
    Other,
}

impl FieldKind {
    /// Signed or unsigned integer of any width
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            FieldKind::Int
                | FieldKind::Int8
                | FieldKind::Int16
                | FieldKind::Int32
                | FieldKind::Int64
                | FieldKind::Uint
                | FieldKind::Uint8
                | FieldKind::Uint16
                | FieldKind::Uint32
                | FieldKind::Uint64
        )
    }

    /// Name as written in schema documents
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Bool => "bool",
            FieldKind::Int => "int",
            FieldKind::Int8 => "int8",
            FieldKind::Int16 => "int16",
            FieldKind::Int32 => "int32",
            FieldKind::Int64 => "int64",
            FieldKind::Uint => "uint",
            FieldKind::Uint8 => "uint8",
            FieldKind::Uint16 => "uint16",
            FieldKind::Uint32 => "uint32",
            FieldKind::Uint64 => "uint64",
            FieldKind::Float32 => "float32",
            FieldKind::Float64 => "float64",
            FieldKind::String => "string",
            FieldKind::Uuid => "uuid",
            FieldKind::Bytes => "bytes",
            FieldKind::Time => "time",
            FieldKind::Json => "json",
            FieldKind::Enum => "enum",
            FieldKind::Other => "other",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of a JSON field's value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonShape {
    /// List of strings
    StringList,
    /// List of 32-bit integers
    Int32List,
    /// List of 64-bit integers
    Int64List,
    /// List of 32-bit unsigned integers
    Uint32List,
    /// List of 64-bit unsigned integers
    Uint64List,
    /// Arbitrary JSON
    #[default]
    Any,
}

/// A field of an entity
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    /// Field name
    pub name: String,

    /// Type tag
    #[serde(rename = "type")]
    pub kind: FieldKind,

    /// Nullable field
    #[serde(default)]
    pub optional: bool,

    /// Enum values, in declaration order
    #[serde(default)]
    pub values: Vec<String>,

    /// Default enum value
    #[serde(default)]
    pub default: Option<String>,

    /// Value shape for JSON fields
    #[serde(default)]
    pub json: Option<JsonShape>,

    /// Field annotations
    #[serde(default)]
    pub annotations: FieldAnnotations,
}

impl FieldSpec {
    /// Field with no annotations
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            optional: false,
            values: Vec::new(),
            default: None,
            json: None,
            annotations: FieldAnnotations::default(),
        }
    }

    /// Whether the field is excluded from output
    pub fn is_skipped(&self) -> bool {
        self.annotations.skip
    }
}

fn default_identifier() -> FieldSpec {
    FieldSpec::new("id", FieldKind::Int)
}

/// A relation to another entity
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdgeSpec {
    /// Edge name, becomes the field name
    pub name: String,

    /// Target entity name
    pub target: String,

    /// To-one relation
    #[serde(default)]
    pub unique: bool,

    /// Edge annotations
    #[serde(default)]
    pub annotations: EdgeAnnotations,
}

/// One entity of the schema
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaNode {
    /// Entity name, unique in the graph
    pub name: String,

    /// Identifier field
    #[serde(default = "default_identifier")]
    pub id: FieldSpec,

    /// Fields, in declaration order
    #[serde(default)]
    pub fields: Vec<FieldSpec>,

    /// Edges, in declaration order
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,

    /// Entity annotations
    #[serde(default)]
    pub annotations: NodeAnnotations,
}

impl SchemaNode {
    /// Whether a message is generated for this entity
    pub fn generates_message(&self) -> bool {
        self.annotations
            .message
            .as_ref()
            .is_some_and(|message| message.generate)
    }
}

/// Top level of a schema document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaDocument {
    /// Entities, in declaration order
    #[serde(default)]
    pub entities: Vec<SchemaNode>,
}

impl SchemaDocument {
    /// Decode a YAML document
    pub fn from_yaml(source: &str) -> Result<Self, SchemaError> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// Decode a JSON document
    pub fn from_json(source: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(source)?)
    }
}

/// Entity graph, indexed by name
#[derive(Debug, Clone, Default)]
pub struct SchemaGraph {
    nodes: Vec<SchemaNode>,
    index: IndexMap<String, usize>,
}

impl SchemaGraph {
    /// Build a graph, rejecting duplicate entity names
    pub fn new(nodes: Vec<SchemaNode>) -> Result<Self, CompileError> {
        let mut index = IndexMap::with_capacity(nodes.len());
        for (position, node) in nodes.iter().enumerate() {
            if index.insert(node.name.clone(), position).is_some() {
                return Err(CompileError::DuplicateEntity(node.name.clone()));
            }
        }
        Ok(Self { nodes, index })
    }

    /// Merge several documents into one graph
    pub fn from_documents(
        documents: impl IntoIterator<Item = SchemaDocument>,
    ) -> Result<Self, CompileError> {
        let nodes = documents
            .into_iter()
            .flat_map(|document| document.entities)
            .collect();
        Self::new(nodes)
    }

    /// Build a graph from a YAML document
    pub fn from_yaml(source: &str) -> Result<Self, SchemaError> {
        Ok(Self::from_documents([SchemaDocument::from_yaml(source)?])?)
    }

    /// Build a graph from a JSON document
    pub fn from_json(source: &str) -> Result<Self, SchemaError> {
        Ok(Self::from_documents([SchemaDocument::from_json(source)?])?)
    }

    /// Look up an entity by name
    pub fn node(&self, name: &str) -> Option<&SchemaNode> {
        self.index.get(name).map(|&position| &self.nodes[position])
    }

    /// Entities in input order
    pub fn nodes(&self) -> &[SchemaNode] {
        &self.nodes
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no entities
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

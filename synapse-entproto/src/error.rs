//! Error types for schema compilation
//!
//! Two tiers of errors exist. [`EntityError`] is recorded against a single
//! entity and never stops the compilation of the others. [`CompileError`] is
//! fatal: it is returned when the schema cannot be ingested or when the
//! assembled descriptor set does not hold together.

/// Failure (or deliberate exclusion) of a single entity
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntityError {
    /// Entity is not annotated for generation
    #[error("schema {entity:?} is not annotated with message generation")]
    SchemaSkipped {
        /// Entity name
        entity: String,
    },

    /// Field type has no protobuf mapping
    #[error("field {field:?}: unsupported field type {field_type}")]
    UnsupportedType {
        /// Field name
        field: String,
        /// Description of the rejected type
        field_type: String,
    },

    /// Field number is duplicated, reserved or out of range
    #[error("message {message:?}: {reason}")]
    NumberConflict {
        /// Message the field belongs to
        message: String,
        /// What is wrong with the number
        reason: String,
    },

    /// An edge or type reference points at an entity that is not generated
    #[error("{source_element:?} references {target:?}: {reason}")]
    UnresolvedReference {
        /// Element holding the reference (`Entity.edge`)
        source_element: String,
        /// Referenced entity or type
        target: String,
        /// Why the reference cannot be resolved
        reason: String,
    },

    /// A contains filter was requested on a non-string field
    #[error(
        "contains filter mode is only supported for string fields, schema {entity:?} field {field:?} has type {field_type}"
    )]
    FilterModeMismatch {
        /// Entity name
        entity: String,
        /// Field name
        field: String,
        /// Declared field type
        field_type: String,
    },

    /// List requested on an entity whose identifier cannot be paginated
    #[error("list method does not support schema {entity:?} id type {id_type}")]
    IdentifierTypeUnsupported {
        /// Entity name
        entity: String,
        /// Declared identifier type
        id_type: String,
    },

    /// An annotation is missing or inconsistent with the element it decorates
    #[error("{element:?}: {reason}")]
    InvalidAnnotation {
        /// Annotated element (`Entity` or `Entity.field`)
        element: String,
        /// What is wrong with it
        reason: String,
    },

    /// Two generated elements share a name within one scope
    #[error("name {name:?} is already defined in {scope:?}")]
    NameConflict {
        /// Scope of the clash (message or package)
        scope: String,
        /// Clashing name
        name: String,
    },
}

impl EntityError {
    /// Whether this is the deliberate-exclusion signal rather than a failure
    pub fn is_skipped(&self) -> bool {
        matches!(self, EntityError::SchemaSkipped { .. })
    }
}

/// Fatal compilation error
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// Two nodes in the graph share a name
    #[error("entity {0:?} is defined more than once")]
    DuplicateEntity(String),

    /// The assembled descriptor set failed cross-referential validation
    #[error("failed assembling {file:?}: {reason}")]
    AssemblyFailure {
        /// File (or well-known file) that could not be built
        file: String,
        /// Cause reported by the resolver or the descriptor pool
        reason: String,
    },
}

/// Error raised while ingesting a schema document
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// YAML document could not be decoded into the schema model
    #[error("invalid YAML schema: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON document could not be decoded into the schema model
    #[error("invalid JSON schema: {0}")]
    Json(#[from] serde_json::Error),

    /// The decoded graph is inconsistent
    #[error(transparent)]
    Graph(#[from] CompileError),
}

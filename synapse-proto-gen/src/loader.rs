//! Schema document loading
//!
//! Reads YAML or JSON schema documents and merges them into one graph.
//! Files ending in `.json` are decoded as JSON, everything else as YAML.

use std::path::{Path, PathBuf};

use synapse_entproto::{CompileError, SchemaDocument, SchemaError, SchemaGraph};
use tracing::debug;

/// Error loading schema documents
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// File could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// Offending file
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// File is not a valid schema document
    #[error("failed to parse {path}: {source}")]
    Schema {
        /// Offending file
        path: PathBuf,
        /// Decoding error
        source: SchemaError,
    },

    /// Documents do not merge into a valid graph
    #[error(transparent)]
    Graph(#[from] CompileError),
}

/// Load and merge every document in `paths`
pub fn load_schema(paths: &[PathBuf]) -> Result<SchemaGraph, LoadError> {
    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let document = load_document(path)?;
        debug!(path = %path.display(), entities = document.entities.len(), "loaded schema document");
        documents.push(document);
    }
    Ok(SchemaGraph::from_documents(documents)?)
}

fn load_document(path: &Path) -> Result<SchemaDocument, LoadError> {
    let source = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let document = if is_json {
        SchemaDocument::from_json(&source)
    } else {
        SchemaDocument::from_yaml(&source)
    };
    document.map_err(|source| LoadError::Schema {
        path: path.to_path_buf(),
        source,
    })
}

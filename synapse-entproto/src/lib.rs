//! synapse-entproto
//!
//! Compiles a typed entity schema into protobuf descriptors: one message per
//! entity with nested enums, cross-package imports, and `<Entity>Service`
//! definitions with Create/Get/Update/Delete/List methods and list filters.
//!
//! ```no_run
//! use synapse_entproto::{compile, CompilerOptions, SchemaGraph};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let graph = SchemaGraph::from_yaml(&std::fs::read_to_string("schema.yaml")?)?;
//! let compiled = compile(&graph, &CompilerOptions::default())?;
//! for (path, file) in compiled.files() {
//!     println!("{}: {} messages", path, file.messages().count());
//! }
//! for (entity, err) in compiled.errors() {
//!     eprintln!("{}: {}", entity, err);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod annotations;
pub mod assemble;
pub mod deps;
pub mod edge;
pub mod enum_gen;
mod error;
pub mod filter;
pub mod generator;
pub mod message;
pub mod options;
pub mod package;
pub mod schema;
pub mod service;
pub mod types;

pub use error::{CompileError, EntityError, SchemaError};
pub use generator::{compile, CompiledSchema, EntityStatus};
pub use options::CompilerOptions;
pub use package::FileUnit;
pub use schema::{SchemaDocument, SchemaGraph};

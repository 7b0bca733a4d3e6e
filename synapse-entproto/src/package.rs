//! File units
//!
//! All generated output of one package is grouped into a single file unit
//! whose path is derived from the package name.

use indexmap::IndexSet;
use prost_types::{DescriptorProto, FileDescriptorProto, ServiceDescriptorProto};

/// Path of the file holding `package`: `a.b.c` → `a/b/c/c.proto`
pub fn rel_file_name(package: &str) -> String {
    let last = package.rsplit('.').next().unwrap_or(package);
    format!("{}/{}.proto", package.replace('.', "/"), last)
}

/// Messages and services of one package
///
/// Type names inside a unit are relative, the way they would be written in
/// `.proto` source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileUnit {
    /// Protobuf package
    pub package: String,
    /// File path, see [`rel_file_name`]
    pub path: String,
    /// Messages, in entity order
    pub messages: Vec<DescriptorProto>,
    /// Services, in entity order
    pub services: Vec<ServiceDescriptorProto>,
    /// Import paths, in first-use order
    pub dependencies: IndexSet<String>,
    /// Entities whose output lives here
    pub entities: Vec<String>,
}

impl FileUnit {
    /// Empty unit for `package`
    pub fn new(package: &str) -> Self {
        Self {
            package: package.to_string(),
            path: rel_file_name(package),
            ..Default::default()
        }
    }

    /// Whether a top-level message named `name` exists
    pub fn has_message(&self, name: &str) -> bool {
        self.messages.iter().any(|m| m.name() == name)
    }

    /// Whether a service named `name` exists
    pub fn has_service(&self, name: &str) -> bool {
        self.services.iter().any(|s| s.name() == name)
    }

    /// Descriptor proto of this unit, type names left relative
    pub fn to_file_descriptor_proto(&self) -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some(self.path.clone()),
            package: Some(self.package.clone()),
            dependency: self.dependencies.iter().cloned().collect(),
            message_type: self.messages.clone(),
            service: self.services.clone(),
            syntax: Some("proto3".to_string()),
            ..Default::default()
        }
    }
}

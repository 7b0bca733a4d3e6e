//! Compiler options

use crate::annotations::DEFAULT_PACKAGE;

/// Options shared by a whole compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Package for entities whose message annotation names none
    pub default_package: String,
}

impl CompilerOptions {
    /// Override the default package
    pub fn with_default_package(mut self, package: impl Into<String>) -> Self {
        self.default_package = package.into();
        self
    }
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            default_package: DEFAULT_PACKAGE.to_string(),
        }
    }
}

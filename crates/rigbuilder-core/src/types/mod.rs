//! # Core Type Definitions
//!
//! This module contains the identifiers and error types shared by every part
//! of the module model:
//! - Arena identifiers (`ModuleId`, `AttrRef`)
//! - Reference lookup policy (`UpdateSource`)
//! - Error types (`RigError`)

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// ARENA IDENTIFIERS
// =============================================================================

/// Identifier of a module inside a [`crate::ModuleTree`] arena.
///
/// Ids are never reused within one tree; a deleted module's id stays invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleId(pub u64);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reference to an attribute: the owning module plus the attribute's position
/// in that module's attribute list.
///
/// The reference is positional, so it is only valid until the owning module's
/// attribute list is edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttrRef {
    /// The module owning the attribute.
    pub module: ModuleId,
    /// Position in the module's attribute list.
    pub index: usize,
}

impl AttrRef {
    /// Create a new attribute reference.
    #[must_use]
    pub const fn new(module: ModuleId, index: usize) -> Self {
        Self { module, index }
    }
}

impl fmt::Display for AttrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.module, self.index)
    }
}

// =============================================================================
// REFERENCE POLICY
// =============================================================================

/// Which UID cache `update()` consults to find a module's reference file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateSource {
    /// Local cache first, then the server cache.
    #[default]
    All,
    /// Server cache only.
    Server,
    /// Local cache only.
    Local,
    /// Ignore the caches and use the module's own file path.
    File,
}

impl std::str::FromStr for UpdateSource {
    type Err = RigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "server" => Ok(Self::Server),
            "local" => Ok(Self::Local),
            "file" | "" => Ok(Self::File),
            other => Err(RigError::Deserialization(format!(
                "unknown update source '{}' (expected all, server, local or file)",
                other
            ))),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the module model.
///
/// - No silent failures: an operation either completes or returns one of these
/// - The CORE never panics on stale ids or malformed input
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RigError {
    /// A value that is not JSON-compatible was stored into attribute data.
    #[error("Cannot set non-JSON data (got {0})")]
    Copy(String),

    /// A connection or attribute path could not be walked.
    #[error("Cannot resolve '{path}' from module '{module}': {reason}")]
    ConnectionResolution {
        path: String,
        module: String,
        reason: String,
    },

    /// Pull/push recursion through connections went deeper than the limit.
    #[error("Connection chain from '{attribute}' exceeds {limit} hops")]
    ConnectionDepth { attribute: String, limit: usize },

    /// An attribute expression failed to execute.
    #[error("Invalid expression on attribute '{attribute}': {reason}")]
    Expression { attribute: String, reason: String },

    /// No module file matched a name, path or UID.
    #[error("Module '{0}' not found")]
    ModuleNotFound(String),

    /// A module's run code failed.
    #[error("Module '{module}': {reason}")]
    ModuleRuntime { module: String, reason: String },

    /// The module id does not exist in the tree.
    #[error("Unknown module: {0}")]
    UnknownModule(ModuleId),

    /// The attribute reference does not point to an attribute.
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(AttrRef),

    /// A structural edit would break the tree (cycles, foreign children).
    #[error("Invalid hierarchy: {0}")]
    InvalidHierarchy(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for RigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================

//! # rigbuilder-core
//!
//! The module model and execution engine of RigBuilder.
//!
//! A rig is a tree of **modules**. Each module owns named, JSON-valued
//! **attributes**, a run-code script and its children. Attributes may be
//! **connected** to attributes of sibling subtrees by path and may carry an
//! **expression** that recomputes their value. Running a module resolves its
//! attributes, executes its script and then descends into unmuted children.
//!
//! ## Architectural Constraints
//!
//! - Pure Rust: no async, no network dependencies
//! - One logical owner mutates a [`ModuleTree`] at a time
//! - Script execution goes through the [`ScriptEngine`] trait; [`RigScript`]
//!   is the built-in engine
//! - Every fallible operation returns [`RigError`]; nothing panics on stale
//!   ids or malformed input

// =============================================================================
// MODULES
// =============================================================================

pub mod api;
pub mod attribute;
pub mod connection;
pub mod curve;
pub mod formats;
pub mod json;
pub mod library;
pub mod module;
pub mod path;
pub mod primitives;
pub mod runtime;
pub mod script;
pub mod storage;
pub mod tree;
pub mod types;
pub mod validation;

// =============================================================================
// RE-EXPORTS: Model
// =============================================================================

pub use attribute::Attribute;
pub use module::Module;
pub use tree::ModuleTree;
pub use types::{AttrRef, ModuleId, RigError, UpdateSource};

// =============================================================================
// RE-EXPORTS: Execution
// =============================================================================

pub use api::{Api, ApiFn, HostReporter, TracingReporter};
pub use json::{copy_json, from_smart_conversion, smart_conversion};
pub use runtime::{Runtime, TreeHost, rewrite_attribute_tokens};
pub use script::{
    Binding, Context, DetachedHost, HostRef, RigScript, ScriptEngine, ScriptError, ScriptHost,
};

// =============================================================================
// RE-EXPORTS: Persistence
// =============================================================================

pub use formats::{ConnectionPolicy, module_from_xml, module_to_xml};
pub use library::{ModuleLibrary, UidCache};
pub use storage::{find_uids, list_modules, load_from_file, save_to_file, uid_from_file};
pub use validation::{Issue, validate};

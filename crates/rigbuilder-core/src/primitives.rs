//! # Innate Primitives
//!
//! Fixed naming conventions and limits for the RigBuilder CORE.
//!
//! These constants tie together three layers that must agree on spelling:
//! the execution context bindings, the persisted module format and the
//! attribute data shape contract.

/// Prefix of the per-attribute value binding (`attr_<name>`).
///
/// `@name` tokens in run code are rewritten to this form before execution.
pub const ATTR_PREFIX: &str = "attr_";

/// Prefix of the per-attribute setter binding (`attr_set_<name>`).
pub const ATTR_SETTER_PREFIX: &str = "attr_set_";

/// Suffix of the per-attribute data accessor binding (`attr_<name>_data`).
pub const ATTR_DATA_SUFFIX: &str = "_data";

/// Data key naming which other key holds the attribute's current value.
pub const DEFAULT_KEY: &str = "default";

/// Reserved data key carrying an attribute's expression in the persisted format.
///
/// Folded into the JSON blob on save and stripped back out on load.
pub const EXPRESSION_KEY: &str = "_expression";

/// File extension of persisted modules.
pub const MODULE_FILE_EXTENSION: &str = "xml";

/// Maximum number of hops a pull or push may follow through connections.
///
/// - Connections are not checked for cycles.
/// - A cycle therefore fails with `RigError::ConnectionDepth` once this is hit.
pub const MAX_CONNECTION_DEPTH: usize = 256;

/// Number of trailing path components kept by `relative_path_string`.
pub const MAX_DISPLAY_PATH_ITEMS: usize = 3;

/// Binding names every module context carries.
pub const MODULE_BINDING: &str = "module";
pub const CH_BINDING: &str = "ch";
pub const CHDATA_BINDING: &str = "chdata";
pub const CHSET_BINDING: &str = "chset";

/// Host-served function running a button attribute's command by label.
pub const RUN_BUTTON_COMMAND: &str = "runButtonCommand";

/// Attribute templates that carry a button command.
pub const BUTTON_TEMPLATE: &str = "button";
pub const LINE_EDIT_BUTTON_TEMPLATE: &str = "lineEditAndButton";

/// Binding names of an attribute expression context.
pub const EXPR_DATA_BINDING: &str = "data";
pub const EXPR_VALUE_BINDING: &str = "value";

//! # Script Execution
//!
//! The pluggable capability behind module run code and attribute expressions.
//!
//! A script runs against a [`Context`]: an ordered map of names to
//! [`Binding`]s. Plain data is held as JSON values; everything that needs the
//! module tree (API functions, `module`, `ch`, attribute setters...) is a
//! [`HostRef`] the engine hands back to a [`ScriptHost`] when the script
//! calls, indexes or reads a field of it.
//!
//! The built-in engine is [`RigScript`]. Hosts may plug in any other
//! [`ScriptEngine`].

pub mod ast;
pub mod interpreter;
pub mod lexer;
pub mod ops;
pub mod parser;

pub use interpreter::RigScript;

use crate::types::{AttrRef, ModuleId};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// =============================================================================
// BINDINGS
// =============================================================================

/// Script execution environment: name -> binding, ordered by name.
pub type Context = BTreeMap<String, Binding>;

/// A value visible to a script.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// JSON-compatible data.
    Value(Value),
    /// An object living in the host.
    Host(HostRef),
}

impl Binding {
    /// The JSON value, if this binding is plain data.
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Host(_) => None,
        }
    }

    /// Consume the binding, returning its JSON value if it is plain data.
    #[must_use]
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Host(_) => None,
        }
    }
}

impl From<Value> for Binding {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

impl From<HostRef> for Binding {
    fn from(h: HostRef) -> Self {
        Self::Host(h)
    }
}

/// Host objects a script can hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostRef {
    /// A function of the API table, by name.
    Function(String),
    /// A module handle (`module`, `module.root()`, `module.child(0)`...).
    Module(ModuleId),
    /// `ch(path, key=None)` bound to a module.
    Ch(ModuleId),
    /// `chdata(path)` bound to a module.
    ChData(ModuleId),
    /// `chset(path, value, key=None)` bound to a module.
    ChSet(ModuleId),
    /// `attr_set_<name>(value, key=None)`.
    SetAttribute(AttrRef),
    /// `attr_<name>_data[key]` accessor.
    AttributeData(AttrRef),
    /// `module.attr`: attribute access by field name.
    Attributes(ModuleId),
    /// `module.attr.<name>`: a handle on one attribute.
    Attribute(AttrRef),
    /// `module.glob`: memory shared by every module of a tree.
    Glob,
}

impl HostRef {
    /// Whether values read through this object are the stored values
    /// themselves rather than copies.
    ///
    /// In-place edits of such values are written back to the host.
    #[must_use]
    pub fn is_live_container(&self) -> bool {
        matches!(self, Self::Glob)
    }
}

impl fmt::Display for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(name) => write!(f, "<function {}>", name),
            Self::Module(id) => write!(f, "<module {}>", id),
            Self::Ch(_) => write!(f, "<function ch>"),
            Self::ChData(_) => write!(f, "<function chdata>"),
            Self::ChSet(_) => write!(f, "<function chset>"),
            Self::SetAttribute(a) => write!(f, "<attribute setter {}>", a),
            Self::AttributeData(a) => write!(f, "<attribute data {}>", a),
            Self::Attributes(id) => write!(f, "<attributes of {}>", id),
            Self::Attribute(a) => write!(f, "<attribute {}>", a),
            Self::Glob => write!(f, "<glob>"),
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Failures raised while executing a script.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    /// Intentional early termination of the current module's script.
    #[error("exit module")]
    Exit,

    #[error("SyntaxError (line {line}): {message}")]
    Syntax { line: usize, message: String },

    #[error("NameError: name '{0}' is not defined")]
    Name(String),

    #[error("TypeError: {0}")]
    Type(String),

    #[error("RuntimeError: {0}")]
    Runtime(String),

    /// Raised explicitly by the script (`error("...")`).
    #[error("{0}")]
    Raised(String),

    /// A failure reported by the host while serving a script request.
    #[error("{0}")]
    Host(String),
}

impl From<crate::types::RigError> for ScriptError {
    fn from(e: crate::types::RigError) -> Self {
        Self::Host(e.to_string())
    }
}

// =============================================================================
// ENGINE / HOST TRAITS
// =============================================================================

/// Executes script text against a context.
///
/// Implementations must leave every top-level assignment of the script in
/// `context` when they return, successfully or not.
pub trait ScriptEngine: Send + Sync {
    /// Run `code`, reading and writing bindings in `context`.
    fn execute(
        &self,
        code: &str,
        context: &mut Context,
        host: &mut dyn ScriptHost,
    ) -> Result<(), ScriptError>;
}

/// The tree side of script execution.
pub trait ScriptHost {
    /// `target(args...)`
    fn call(&mut self, target: &HostRef, args: Vec<Binding>) -> Result<Binding, ScriptError>;

    /// `target.method(args...)`
    fn call_method(
        &mut self,
        target: &HostRef,
        method: &str,
        args: Vec<Binding>,
    ) -> Result<Binding, ScriptError>;

    /// `target.name`
    fn field(&mut self, target: &HostRef, name: &str) -> Result<Binding, ScriptError>;

    /// `target.name = value`
    fn set_field(
        &mut self,
        target: &HostRef,
        name: &str,
        value: Value,
    ) -> Result<(), ScriptError>;

    /// `target[key]`
    fn index(&mut self, target: &HostRef, key: &Value) -> Result<Binding, ScriptError>;

    /// `target[key] = value`
    fn set_index(
        &mut self,
        target: &HostRef,
        key: &Value,
        value: Value,
    ) -> Result<(), ScriptError>;
}

/// A host with no tree behind it: every host request fails.
///
/// Useful for evaluating pure scripts.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedHost;

impl DetachedHost {
    fn unavailable(target: &HostRef) -> ScriptError {
        ScriptError::Type(format!("{} is not available without a module tree", target))
    }
}

impl ScriptHost for DetachedHost {
    fn call(&mut self, target: &HostRef, _args: Vec<Binding>) -> Result<Binding, ScriptError> {
        Err(Self::unavailable(target))
    }

    fn call_method(
        &mut self,
        target: &HostRef,
        _method: &str,
        _args: Vec<Binding>,
    ) -> Result<Binding, ScriptError> {
        Err(Self::unavailable(target))
    }

    fn field(&mut self, target: &HostRef, _name: &str) -> Result<Binding, ScriptError> {
        Err(Self::unavailable(target))
    }

    fn set_field(
        &mut self,
        target: &HostRef,
        _name: &str,
        _value: Value,
    ) -> Result<(), ScriptError> {
        Err(Self::unavailable(target))
    }

    fn index(&mut self, target: &HostRef, _key: &Value) -> Result<Binding, ScriptError> {
        Err(Self::unavailable(target))
    }

    fn set_index(
        &mut self,
        target: &HostRef,
        _key: &Value,
        _value: Value,
    ) -> Result<(), ScriptError> {
        Err(Self::unavailable(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn binding_exposes_plain_values_only() {
        let b = Binding::from(json!(3));
        assert_eq!(b.as_value(), Some(&json!(3)));
        let h = Binding::from(HostRef::Glob);
        assert_eq!(h.as_value(), None);
        assert_eq!(h.into_value(), None);
    }

    #[test]
    fn only_glob_hands_out_live_values() {
        assert!(HostRef::Glob.is_live_container());
        let attr = AttrRef::new(ModuleId(0), 0);
        assert!(!HostRef::AttributeData(attr).is_live_container());
        assert!(!HostRef::Attribute(attr).is_live_container());
        assert!(!HostRef::Attributes(ModuleId(0)).is_live_container());
    }

    #[test]
    fn detached_host_refuses_requests() {
        let mut host = DetachedHost;
        let err = host
            .call(&HostRef::Function("warning".to_string()), Vec::new())
            .expect_err("detached host has no functions");
        assert!(matches!(err, ScriptError::Type(_)));
    }

    #[test]
    fn rig_errors_become_host_errors() {
        let err: ScriptError = crate::types::RigError::ModuleNotFound("arm".to_string()).into();
        assert_eq!(err, ScriptError::Host("Module 'arm' not found".to_string()));
    }
}

//! # Attribute
//!
//! A named JSON-valued slot on a module.
//!
//! The attribute's data is a JSON object whose `"default"` key names the key
//! holding the current value: `{"value": 10, "default": "value"}`. Without a
//! `"default"` key the attribute has no current value; reading it yields
//! `null` and writing it is a no-op.
//!
//! Every setter flags the attribute as modified when (and only when) it
//! changes something. Connection and expression resolution live on the tree
//! and runtime; this type only owns its data.

use crate::primitives::DEFAULT_KEY;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attribute {
    name: String,
    category: String,
    template: String,
    /// Path to the connection source, relative to the owning module's parent.
    connect: String,
    expression: String,
    data: Map<String, Value>,
    modified: bool,
}

impl Attribute {
    /// Create an empty attribute with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder: widget template.
    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Builder: presentation category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Builder: raw data object.
    #[must_use]
    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    /// Builder: `{"value": value, "default": "value"}` data.
    #[must_use]
    pub fn with_value(mut self, value: Value) -> Self {
        self.data.insert("value".to_string(), value);
        self.data
            .insert(DEFAULT_KEY.to_string(), Value::String("value".to_string()));
        self
    }

    /// Builder: connection path.
    #[must_use]
    pub fn with_connect(mut self, connect: impl Into<String>) -> Self {
        self.connect = connect.into();
        self
    }

    /// Builder: expression code.
    #[must_use]
    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = expression.into();
        self
    }

    // =========================================================================
    // PROPERTIES
    // =========================================================================

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if name != self.name {
            self.name = name;
            self.modified = true;
        }
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn set_category(&mut self, category: impl Into<String>) {
        let category = category.into();
        if category != self.category {
            self.category = category;
            self.modified = true;
        }
    }

    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn set_template(&mut self, template: impl Into<String>) {
        let template = template.into();
        if template != self.template {
            self.template = template;
            self.modified = true;
        }
    }

    #[must_use]
    pub fn connect(&self) -> &str {
        &self.connect
    }

    pub fn set_connect(&mut self, connect: impl Into<String>) {
        let connect = connect.into();
        if connect != self.connect {
            self.connect = connect;
            self.modified = true;
        }
    }

    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn set_expression(&mut self, expression: impl Into<String>) {
        let expression = expression.into();
        if expression != self.expression {
            self.expression = expression;
            self.modified = true;
        }
    }

    #[must_use]
    pub fn modified(&self) -> bool {
        self.modified
    }

    pub(crate) fn clear_modified(&mut self) {
        self.modified = false;
    }

    // =========================================================================
    // DATA
    // =========================================================================

    /// The key named by `"default"`, if present and a string.
    #[must_use]
    pub fn default_key(&self) -> Option<&str> {
        self.data.get(DEFAULT_KEY).and_then(Value::as_str)
    }

    /// Copy of the current value; `null` when there is none.
    #[must_use]
    pub fn default_value(&self) -> Value {
        self.default_key()
            .and_then(|key| self.data.get(key))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Write the current value. No-op without a `"default"` key.
    ///
    /// Returns whether the data changed.
    pub(crate) fn set_default_value(&mut self, value: Value) -> bool {
        let Some(key) = self.default_key().map(str::to_string) else {
            return false;
        };
        if self.data.get(&key) == Some(&value) {
            return false;
        }
        self.data.insert(key, value);
        self.modified = true;
        true
    }

    /// Copy of `data[key]`; `null` when absent. Never resolves connections.
    #[must_use]
    pub fn get_key(&self, key: &str) -> Value {
        self.data.get(key).cloned().unwrap_or(Value::Null)
    }

    /// Write `data[key]`. Returns whether the data changed.
    pub(crate) fn set_key(&mut self, key: &str, value: Value) -> bool {
        if self.data.get(key) == Some(&value) {
            return false;
        }
        self.data.insert(key.to_string(), value);
        self.modified = true;
        true
    }

    /// Borrow the raw data without resolving connections.
    #[must_use]
    pub fn raw_data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Copy of the raw data without resolving connections.
    #[must_use]
    pub fn local_data(&self) -> Map<String, Value> {
        self.data.clone()
    }

    /// Replace the raw data without pushing to a connection source.
    ///
    /// Returns whether the data changed.
    pub fn set_local_data(&mut self, data: Map<String, Value>) -> bool {
        if data == self.data {
            return false;
        }
        self.data = data;
        self.modified = true;
        true
    }
}

//! # Module
//!
//! A node of the module tree: attributes, a run-code body, mute state and
//! reference identity (UID + file path).
//!
//! Structure (parent and children) is owned by [`crate::ModuleTree`]; a
//! `Module` only exposes it read-only so the parent back-reference invariant
//! cannot be broken from outside the tree.

use crate::attribute::Attribute;
use crate::types::ModuleId;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub(crate) name: String,
    /// Empty until first save.
    pub(crate) uid: String,
    pub(crate) run_code: String,
    pub(crate) muted: bool,
    /// `None` for embedded (never persisted) modules.
    pub(crate) file_path: Option<PathBuf>,
    pub(crate) modified: bool,
    pub(crate) parent: Option<ModuleId>,
    pub(crate) children: Vec<ModuleId>,
    pub(crate) attributes: Vec<Attribute>,
}

impl Module {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[must_use]
    pub fn uid(&self) -> &str {
        &self.uid
    }

    #[must_use]
    pub fn run_code(&self) -> &str {
        &self.run_code
    }

    pub fn set_run_code(&mut self, code: impl Into<String>) {
        self.run_code = code.into();
        self.modified = true;
    }

    #[must_use]
    pub fn muted(&self) -> bool {
        self.muted
    }

    pub fn mute(&mut self) {
        self.muted = true;
    }

    pub fn unmute(&mut self) {
        self.muted = false;
    }

    #[must_use]
    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    #[must_use]
    pub fn modified(&self) -> bool {
        self.modified
    }

    #[must_use]
    pub fn parent(&self) -> Option<ModuleId> {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> &[ModuleId] {
        &self.children
    }

    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Mutable access to the attribute list entries (not the list itself).
    pub fn attributes_mut(&mut self) -> &mut [Attribute] {
        &mut self.attributes
    }

    /// Position of the first attribute called `name`.
    #[must_use]
    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name() == name)
    }

    /// First attribute called `name`.
    #[must_use]
    pub fn find_attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name() == name)
    }

    /// Whether any attribute of this module carries unsaved changes.
    #[must_use]
    pub fn has_modified_attributes(&self) -> bool {
        self.attributes.iter().any(Attribute::modified)
    }
}

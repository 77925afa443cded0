//! # Module Tree
//!
//! Arena storage for modules.
//!
//! Modules live in a flat `BTreeMap<ModuleId, Module>`; children are ids and
//! the parent is an `Option<ModuleId>`. The arena may hold several roots at
//! once (loaded files, detached copies). Every structural edit goes through
//! this type so that a child's `parent` always names the module listing it in
//! `children`. The one deliberate exception is [`ModuleTree::copy_module`],
//! whose result points at the original's parent without being listed there
//! until it is inserted.

use crate::attribute::Attribute;
use crate::module::Module;
use crate::types::{AttrRef, ModuleId, RigError};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct ModuleTree {
    /// Module storage: ModuleId -> Module
    modules: BTreeMap<ModuleId, Module>,

    /// Next available ModuleId
    next_module_id: u64,

    /// Memory shared by every module's scripts (`module.glob`).
    glob: Map<String, Value>,
}

impl ModuleTree {
    /// Create an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of modules in the arena.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: ModuleId) -> bool {
        self.modules.contains_key(&id)
    }

    /// Add a detached module to the arena and return its id.
    pub fn insert_module(&mut self, module: Module) -> ModuleId {
        let id = ModuleId(self.next_module_id);
        self.next_module_id = self.next_module_id.saturating_add(1);
        let mut module = module;
        module.parent = None;
        module.children.clear();
        self.modules.insert(id, module);
        id
    }

    /// Create an empty detached module.
    pub fn create_module(&mut self, name: impl Into<String>) -> ModuleId {
        self.insert_module(Module::new(name))
    }

    pub fn module(&self, id: ModuleId) -> Result<&Module, RigError> {
        self.modules.get(&id).ok_or(RigError::UnknownModule(id))
    }

    pub fn module_mut(&mut self, id: ModuleId) -> Result<&mut Module, RigError> {
        self.modules.get_mut(&id).ok_or(RigError::UnknownModule(id))
    }

    pub fn attribute(&self, attr: AttrRef) -> Result<&Attribute, RigError> {
        self.module(attr.module)?
            .attributes
            .get(attr.index)
            .ok_or(RigError::UnknownAttribute(attr))
    }

    pub fn attribute_mut(&mut self, attr: AttrRef) -> Result<&mut Attribute, RigError> {
        self.module_mut(attr.module)?
            .attributes
            .get_mut(attr.index)
            .ok_or(RigError::UnknownAttribute(attr))
    }

    /// References to every attribute of a module, in order.
    pub fn attribute_refs(&self, id: ModuleId) -> Result<Vec<AttrRef>, RigError> {
        let count = self.module(id)?.attributes.len();
        Ok((0..count).map(|index| AttrRef::new(id, index)).collect())
    }

    /// Memory shared by every module's scripts.
    #[must_use]
    pub fn glob(&self) -> &Map<String, Value> {
        &self.glob
    }

    pub fn glob_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.glob
    }

    /// Ids of every module without a parent, in id order.
    #[must_use]
    pub fn roots(&self) -> Vec<ModuleId> {
        self.modules
            .iter()
            .filter(|(_, m)| m.parent.is_none())
            .map(|(id, _)| *id)
            .collect()
    }

    // =========================================================================
    // HIERARCHY QUERIES
    // =========================================================================

    /// Topmost ancestor of `id` (itself when it has no parent).
    pub fn root(&self, id: ModuleId) -> Result<ModuleId, RigError> {
        let mut current = id;
        let mut hops = 0usize;
        while let Some(parent) = self.module(current)?.parent {
            current = parent;
            hops += 1;
            if hops > self.modules.len() {
                return Err(RigError::InvalidHierarchy(format!(
                    "parent chain of {} does not end",
                    id
                )));
            }
        }
        Ok(current)
    }

    /// Slash-joined names from the root down to `id`.
    pub fn path(&self, id: ModuleId) -> Result<String, RigError> {
        let mut names = vec![self.module(id)?.name.clone()];
        let mut current = id;
        while let Some(parent) = self.module(current)?.parent {
            names.push(self.module(parent)?.name.clone());
            current = parent;
            if names.len() > self.modules.len() {
                return Err(RigError::InvalidHierarchy(format!(
                    "parent chain of {} does not end",
                    id
                )));
            }
        }
        names.reverse();
        Ok(names.join("/"))
    }

    /// Whether `ancestor` is `id` or one of its ancestors.
    pub fn is_ancestor(&self, ancestor: ModuleId, id: ModuleId) -> Result<bool, RigError> {
        let mut current = Some(id);
        let mut hops = 0usize;
        while let Some(c) = current {
            if c == ancestor {
                return Ok(true);
            }
            current = self.module(c)?.parent;
            hops += 1;
            if hops > self.modules.len() {
                break;
            }
        }
        Ok(false)
    }

    /// `id` and all its descendants, depth-first in child order.
    pub fn descendants(&self, id: ModuleId) -> Result<Vec<ModuleId>, RigError> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let module = self.module(current)?;
            out.push(current);
            stack.extend(module.children.iter().rev().copied());
        }
        Ok(out)
    }

    /// Child at `index`.
    pub fn child(&self, id: ModuleId, index: usize) -> Result<Option<ModuleId>, RigError> {
        Ok(self.module(id)?.children.get(index).copied())
    }

    /// First child called `name`.
    pub fn find_child(&self, id: ModuleId, name: &str) -> Result<Option<ModuleId>, RigError> {
        let module = self.module(id)?;
        for child in &module.children {
            if self.module(*child)?.name == name {
                return Ok(Some(*child));
            }
        }
        Ok(None)
    }

    /// First attribute called `name`.
    pub fn find_attribute(&self, id: ModuleId, name: &str) -> Result<Option<AttrRef>, RigError> {
        Ok(self
            .module(id)?
            .attribute_index(name)
            .map(|index| AttrRef::new(id, index)))
    }

    // =========================================================================
    // STRUCTURAL EDITS
    // =========================================================================

    /// Insert `child` into `parent`'s children at `index` (clamped).
    ///
    /// A child still listed under another module is moved.
    pub fn insert_child(
        &mut self,
        parent: ModuleId,
        index: usize,
        child: ModuleId,
    ) -> Result<(), RigError> {
        self.module(parent)?;
        self.module(child)?;
        if self.is_ancestor(child, parent)? {
            return Err(RigError::InvalidHierarchy(format!(
                "cannot insert {} under its own descendant {}",
                child, parent
            )));
        }

        if let Some(old_parent) = self.module(child)?.parent {
            let old = self.module_mut(old_parent)?;
            old.children.retain(|c| *c != child);
        }

        let p = self.module_mut(parent)?;
        let index = index.min(p.children.len());
        p.children.insert(index, child);
        p.modified = true;
        self.module_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Append `child` to `parent`'s children.
    pub fn add_child(&mut self, parent: ModuleId, child: ModuleId) -> Result<(), RigError> {
        let len = self.module(parent)?.children.len();
        self.insert_child(parent, len, child)
    }

    /// Detach `child` from `parent`. The child stays in the arena.
    pub fn remove_child(&mut self, parent: ModuleId, child: ModuleId) -> Result<(), RigError> {
        let p = self.module_mut(parent)?;
        let Some(pos) = p.children.iter().position(|c| *c == child) else {
            return Err(RigError::InvalidHierarchy(format!(
                "{} is not a child of {}",
                child, parent
            )));
        };
        p.children.remove(pos);
        p.modified = true;
        self.module_mut(child)?.parent = None;
        Ok(())
    }

    /// Detach every child of `parent`, returning them in order.
    pub fn remove_children(&mut self, parent: ModuleId) -> Result<Vec<ModuleId>, RigError> {
        let p = self.module_mut(parent)?;
        let children = std::mem::take(&mut p.children);
        p.modified = true;
        for child in &children {
            self.module_mut(*child)?.parent = None;
        }
        Ok(children)
    }

    /// Remove `id` and its whole subtree from the arena.
    pub fn delete(&mut self, id: ModuleId) -> Result<(), RigError> {
        if let Some(parent) = self.module(id)?.parent {
            let listed = self
                .modules
                .get(&parent)
                .is_some_and(|p| p.children.contains(&id));
            if listed {
                self.remove_child(parent, id)?;
            }
        }
        for m in self.descendants(id)? {
            self.modules.remove(&m);
        }
        Ok(())
    }

    /// Deep copy of `id`'s subtree.
    ///
    /// The copy keeps the original's parent link but is not listed among that
    /// parent's children; insert it to attach it.
    pub fn copy_module(&mut self, id: ModuleId) -> Result<ModuleId, RigError> {
        let parent = self.module(id)?.parent;
        let copy = self.copy_subtree(id)?;
        self.module_mut(copy)?.parent = parent;
        Ok(copy)
    }

    fn copy_subtree(&mut self, id: ModuleId) -> Result<ModuleId, RigError> {
        let original = self.module(id)?.clone();
        let modified = original.modified;
        let children = original.children.clone();
        let copy = self.insert_module(original);
        for child in children {
            let child_copy = self.copy_subtree(child)?;
            self.add_child(copy, child_copy)?;
        }
        self.module_mut(copy)?.modified = modified;
        Ok(copy)
    }

    // =========================================================================
    // ATTRIBUTE LIST EDITS
    // =========================================================================

    /// Insert an attribute at `index` (clamped).
    pub fn insert_attribute(
        &mut self,
        id: ModuleId,
        index: usize,
        attribute: Attribute,
    ) -> Result<AttrRef, RigError> {
        let module = self.module_mut(id)?;
        let index = index.min(module.attributes.len());
        module.attributes.insert(index, attribute);
        module.modified = true;
        Ok(AttrRef::new(id, index))
    }

    /// Append an attribute.
    pub fn add_attribute(&mut self, id: ModuleId, attribute: Attribute) -> Result<AttrRef, RigError> {
        let len = self.module(id)?.attributes.len();
        self.insert_attribute(id, len, attribute)
    }

    /// Remove an attribute, returning it.
    pub fn remove_attribute(&mut self, attr: AttrRef) -> Result<Attribute, RigError> {
        self.attribute(attr)?;
        let module = self.module_mut(attr.module)?;
        module.modified = true;
        Ok(module.attributes.remove(attr.index))
    }

    /// Remove every attribute, returning them in order.
    pub fn remove_attributes(&mut self, id: ModuleId) -> Result<Vec<Attribute>, RigError> {
        let module = self.module_mut(id)?;
        module.modified = true;
        Ok(std::mem::take(&mut module.attributes))
    }

    // =========================================================================
    // REFERENCE STATE
    // =========================================================================

    /// Sever the module's link to its reference file. One-way.
    pub fn embed(&mut self, id: ModuleId) -> Result<(), RigError> {
        let module = self.module_mut(id)?;
        module.uid.clear();
        module.file_path = None;
        module.modified = true;
        Ok(())
    }

    /// Clear modification flags after a save or update.
    ///
    /// Attribute flags are cleared in the whole subtree. Module flags are
    /// cleared for `id` and descendants reached without crossing a module that
    /// carries its own UID; such a module keeps its own flag and shields its
    /// subtree's module flags.
    pub fn clear_modification_flags(&mut self, id: ModuleId) -> Result<(), RigError> {
        self.clear_flags(id, true)
    }

    fn clear_flags(&mut self, id: ModuleId, modules: bool) -> Result<(), RigError> {
        let module = self.module_mut(id)?;
        if modules {
            module.modified = false;
        }
        for attr in &mut module.attributes {
            attr.clear_modified();
        }
        let children = module.children.clone();
        for child in children {
            let owns_uid = !self.module(child)?.uid.is_empty();
            self.clear_flags(child, modules && !owns_uid)?;
        }
        Ok(())
    }

    /// Whether the subtree holds unsaved changes (module or attribute flags).
    pub fn is_modified(&self, id: ModuleId) -> Result<bool, RigError> {
        for m in self.descendants(id)? {
            let module = self.module(m)?;
            if module.modified || module.has_modified_attributes() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub(crate) fn set_identity(
        &mut self,
        id: ModuleId,
        uid: Option<String>,
        file_path: Option<std::path::PathBuf>,
    ) -> Result<(), RigError> {
        let module = self.module_mut(id)?;
        if let Some(uid) = uid {
            module.uid = uid;
        }
        if file_path.is_some() {
            module.file_path = file_path;
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

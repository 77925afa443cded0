//! # Connection Resolver
//!
//! Path lookup and value push across the module tree.
//!
//! A connection is resolved from the requesting attribute's module's
//! **parent**: a module exposes its attributes to its siblings, and a root
//! module's attributes cannot be connected. Pull needs the script runtime
//! (expressions run along the way) and lives in [`crate::runtime`]; push only
//! moves data and lives here.

use crate::path::{AttributePath, Segment};
use crate::primitives::MAX_CONNECTION_DEPTH;
use crate::tree::ModuleTree;
use crate::types::{AttrRef, ModuleId, RigError};
use serde_json::{Map, Value};

impl ModuleTree {
    /// Walk `path` from module `from` to an attribute.
    pub fn find_attribute_by_path(&self, from: ModuleId, path: &str) -> Result<AttrRef, RigError> {
        let fail = |reason: &str| -> Result<RigError, RigError> {
            Ok(RigError::ConnectionResolution {
                path: path.to_string(),
                module: self.module(from)?.name().to_string(),
                reason: reason.to_string(),
            })
        };

        let parsed = AttributePath::parse(path);
        let mut current = from;
        for segment in parsed.modules {
            current = match segment {
                Segment::Parent => match self.module(current)?.parent() {
                    Some(parent) => parent,
                    None => return Err(fail("no parent above the root module")?),
                },
                Segment::Child(name) => match self.find_child(current, name)? {
                    Some(child) => child,
                    None => return Err(fail(&format!("no child module '{}'", name))?),
                },
            };
        }

        match self.find_attribute(current, parsed.attribute)? {
            Some(attr) => Ok(attr),
            None => Err(fail(&format!("no attribute '{}'", parsed.attribute))?),
        }
    }

    /// The attribute `attr` is connected to.
    ///
    /// `Ok(None)` when the attribute has no connection or its module has no
    /// parent to resolve against. A connection that is set but cannot be
    /// walked is an error naming the requesting module.
    pub fn find_connection_source(&self, attr: AttrRef) -> Result<Option<AttrRef>, RigError> {
        let connect = self.attribute(attr)?.connect();
        if connect.is_empty() {
            return Ok(None);
        }
        let module = self.module(attr.module)?;
        let Some(parent) = module.parent() else {
            return Ok(None);
        };
        match self.find_attribute_by_path(parent, connect) {
            Ok(source) => Ok(Some(source)),
            Err(RigError::ConnectionResolution { path, reason, .. }) => {
                Err(RigError::ConnectionResolution {
                    path,
                    module: module.name().to_string(),
                    reason,
                })
            }
            Err(other) => Err(other),
        }
    }

    /// Every attribute elsewhere in the tree whose connection resolves to `attr`.
    ///
    /// Scans from the root down, skipping `attr`'s own module. Unresolvable
    /// connections met during the scan are reported as errors.
    pub fn list_connections(&self, attr: AttrRef) -> Result<Vec<AttrRef>, RigError> {
        self.attribute(attr)?;
        let root = self.root(attr.module)?;
        let mut found = Vec::new();
        for module in self.descendants(root)? {
            if module == root || module == attr.module {
                continue;
            }
            for candidate in self.attribute_refs(module)? {
                if self.find_connection_source(candidate)? == Some(attr) {
                    found.push(candidate);
                }
            }
        }
        Ok(found)
    }

    // =========================================================================
    // WRITE + PUSH
    // =========================================================================

    /// Copy `attr`'s current value up into its connection source, recursively.
    pub fn push(&mut self, attr: AttrRef) -> Result<(), RigError> {
        self.push_at(attr, 0)
    }

    fn push_at(&mut self, attr: AttrRef, depth: usize) -> Result<(), RigError> {
        if depth > MAX_CONNECTION_DEPTH {
            return Err(RigError::ConnectionDepth {
                attribute: self.attribute(attr)?.name().to_string(),
                limit: MAX_CONNECTION_DEPTH,
            });
        }
        let Some(source) = self.find_connection_source(attr)? else {
            return Ok(());
        };
        let value = self.attribute(attr)?.default_value();
        tracing::trace!(from = %attr, to = %source, "push");
        self.attribute_mut(source)?.set_default_value(value);
        self.push_at(source, depth + 1)
    }

    /// Write the current value (`key == None`) or `data[key]`, then push.
    ///
    /// A keyed write pushes only when it changed the data.
    pub fn set(&mut self, attr: AttrRef, value: Value, key: Option<&str>) -> Result<(), RigError> {
        match key {
            None | Some("") => {
                self.attribute_mut(attr)?.set_default_value(value);
                self.push(attr)
            }
            Some(key) => {
                if self.attribute_mut(attr)?.set_key(key, value) {
                    self.push(attr)?;
                }
                Ok(())
            }
        }
    }

    /// Replace the attribute's whole data object, then push.
    pub fn set_data(&mut self, attr: AttrRef, data: Map<String, Value>) -> Result<(), RigError> {
        self.attribute_mut(attr)?.set_local_data(data);
        self.push(attr)
    }

    /// `data[key]` without resolving connections or expressions.
    pub fn get_key(&self, attr: AttrRef, key: &str) -> Result<Value, RigError> {
        Ok(self.attribute(attr)?.get_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Attribute;
    use serde_json::json;

    /// root
    /// ├── a   (attrs: out=1)
    /// └── b   (attrs: in -> /a/out)
    ///     └── c (attrs: deep -> ../in)
    struct Rig {
        tree: ModuleTree,
        root: ModuleId,
        a: ModuleId,
        b: ModuleId,
        c: ModuleId,
    }

    fn rig() -> Rig {
        let mut tree = ModuleTree::new();
        let root = tree.create_module("root");
        let a = tree.create_module("a");
        let b = tree.create_module("b");
        let c = tree.create_module("c");
        tree.add_child(root, a).expect("a");
        tree.add_child(root, b).expect("b");
        tree.add_child(b, c).expect("c");
        tree.add_attribute(a, Attribute::new("out").with_value(json!(1)))
            .expect("out");
        tree.add_attribute(
            b,
            Attribute::new("in").with_value(json!(0)).with_connect("/a/out"),
        )
        .expect("in");
        tree.add_attribute(
            c,
            Attribute::new("deep").with_value(json!(0)).with_connect("../in"),
        )
        .expect("deep");
        Rig {
            tree,
            root,
            a,
            b,
            c,
        }
    }

    #[test]
    fn path_resolution_edge_cases() {
        let r = rig();
        assert_eq!(
            r.tree.find_attribute_by_path(r.a, "/out").expect("own attr"),
            AttrRef::new(r.a, 0)
        );
        assert!(matches!(
            r.tree.find_attribute_by_path(r.root, "/missing/out"),
            Err(RigError::ConnectionResolution { .. })
        ));
        assert_eq!(
            r.tree.find_attribute_by_path(r.c, "../in").expect("parent attr"),
            AttrRef::new(r.b, 0)
        );
        assert!(r.tree.find_attribute_by_path(r.root, "../x").is_err());
        assert!(r.tree.find_attribute_by_path(r.root, "/a/nope").is_err());
    }

    #[test]
    fn connection_source_is_resolved_from_parent() {
        let r = rig();
        assert_eq!(
            r.tree.find_connection_source(AttrRef::new(r.b, 0)).expect("src"),
            Some(AttrRef::new(r.a, 0))
        );
        assert_eq!(
            r.tree.find_connection_source(AttrRef::new(r.a, 0)).expect("src"),
            None
        );
    }

    #[test]
    fn root_attributes_cannot_connect() {
        let mut r = rig();
        let attr = r
            .tree
            .add_attribute(r.root, Attribute::new("x").with_connect("/a/out"))
            .expect("x");
        assert_eq!(r.tree.find_connection_source(attr).expect("src"), None);
    }

    #[test]
    fn broken_connection_names_requesting_module() {
        let mut r = rig();
        r.tree
            .attribute_mut(AttrRef::new(r.b, 0))
            .expect("in")
            .set_connect("/gone/out");
        let err = r
            .tree
            .find_connection_source(AttrRef::new(r.b, 0))
            .expect_err("broken");
        match err {
            RigError::ConnectionResolution { path, module, .. } => {
                assert_eq!(path, "/gone/out");
                assert_eq!(module, "b");
            }
            other => unreachable!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn set_pushes_up_the_chain() {
        let mut r = rig();
        r.tree
            .set(AttrRef::new(r.c, 0), json!(42), None)
            .expect("set");
        assert_eq!(r.tree.attribute(AttrRef::new(r.b, 0)).expect("in").default_value(), json!(42));
        assert_eq!(r.tree.attribute(AttrRef::new(r.a, 0)).expect("out").default_value(), json!(42));
    }

    #[test]
    fn keyed_set_pushes_only_on_change() {
        let mut r = rig();
        let deep = AttrRef::new(r.c, 0);
        r.tree.set(deep, json!(7), Some("value")).expect("set key");
        assert_eq!(r.tree.get_key(AttrRef::new(r.a, 0), "value").expect("out"), json!(7));

        r.tree.set(AttrRef::new(r.a, 0), json!(1), None).expect("reset a");
        r.tree.set(deep, json!(7), Some("value")).expect("same value");
        assert_eq!(r.tree.get_key(AttrRef::new(r.a, 0), "value").expect("out"), json!(1));
    }

    #[test]
    fn list_connections_finds_dependents() {
        let r = rig();
        assert_eq!(
            r.tree.list_connections(AttrRef::new(r.a, 0)).expect("list"),
            vec![AttrRef::new(r.b, 0)]
        );
        assert_eq!(
            r.tree.list_connections(AttrRef::new(r.b, 0)).expect("list"),
            vec![AttrRef::new(r.c, 0)]
        );
    }

    #[test]
    fn connection_cycle_hits_depth_limit() {
        let mut tree = ModuleTree::new();
        let root = tree.create_module("root");
        let a = tree.create_module("a");
        let b = tree.create_module("b");
        tree.add_child(root, a).expect("a");
        tree.add_child(root, b).expect("b");
        let x = tree
            .add_attribute(a, Attribute::new("x").with_value(json!(0)).with_connect("/b/y"))
            .expect("x");
        tree.add_attribute(b, Attribute::new("y").with_value(json!(0)).with_connect("/a/x"))
            .expect("y");
        let err = tree.set(x, json!(1), None).expect_err("cycle");
        assert!(matches!(err, RigError::ConnectionDepth { .. }));
    }
}

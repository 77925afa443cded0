//! # Behavior Tier Tests (T0-T4)
//!
//! End-to-end behavior of the module model through the public API.
//!
//! ## Tiers
//! - T0: Attribute Data
//! - T1: Connections
//! - T2: Expressions
//! - T3: Execution
//! - T4: Persistence and Update

use rigbuilder_core::{
    AttrRef, Attribute, Binding, ModuleId, ModuleTree, RigError, Runtime, copy_json,
};
use serde_json::{Value, json};

fn bound(ctx: &rigbuilder_core::Context, name: &str) -> Option<Value> {
    ctx.get(name).and_then(Binding::as_value).cloned()
}

/// root
/// ├── a (value: 1)
/// └── b (linked -> /a/value)
fn linked_pair() -> (ModuleTree, ModuleId, AttrRef, AttrRef) {
    let mut tree = ModuleTree::new();
    let root = tree.create_module("root");
    let a = tree.create_module("a");
    let b = tree.create_module("b");
    tree.add_child(root, a).expect("a");
    tree.add_child(root, b).expect("b");
    let source = tree
        .add_attribute(a, Attribute::new("value").with_value(json!(1)))
        .expect("source");
    let linked = tree
        .add_attribute(
            b,
            Attribute::new("linked")
                .with_value(json!(0))
                .with_connect("/a/value"),
        )
        .expect("linked");
    (tree, root, source, linked)
}

// =============================================================================
// TIER T0: ATTRIBUTE DATA
// =============================================================================

mod t0_attribute_data {
    use super::*;

    /// T0.1: The default key names the current value.
    #[test]
    fn default_key_selects_value() {
        let data = json!({"items": ["a"], "current": "a", "default": "current"});
        let attr = Attribute::new("kind").with_data(data.as_object().cloned().unwrap_or_default());
        assert_eq!(attr.default_value(), json!("a"));
        assert_eq!(attr.get_key("items"), json!(["a"]));
    }

    /// T0.2: copyJson deep-copies data and refuses host objects.
    #[test]
    fn copy_json_is_deep() {
        let original = json!({"list": [1, {"k": 2}]});
        let copy = copy_json(&Binding::Value(original.clone())).expect("copy");
        assert_eq!(copy, original);

        let host = Binding::Host(rigbuilder_core::HostRef::Glob);
        assert!(matches!(copy_json(&host), Err(RigError::Copy(_))));
    }

    /// T0.3: Setters flag modification only on change.
    #[test]
    fn modification_tracking() {
        let (mut tree, _, source, _) = linked_pair();
        tree.set(source, json!(1), None).expect("same value");
        assert!(!tree.attribute(source).expect("attr").modified());
        tree.set(source, json!(2), None).expect("new value");
        assert!(tree.attribute(source).expect("attr").modified());
    }
}

// =============================================================================
// TIER T1: CONNECTIONS
// =============================================================================

mod t1_connections {
    use super::*;

    /// T1.1: set pushes up; pull brings source changes back down.
    #[test]
    fn pull_push_symmetry() {
        let (mut tree, _, source, linked) = linked_pair();
        let rt = Runtime::default();

        tree.set(linked, json!(42), None).expect("set");
        rt.pull(&mut tree, linked).expect("pull");
        assert_eq!(rt.get(&mut tree, linked, None).expect("linked"), json!(42));
        assert_eq!(rt.get(&mut tree, source, None).expect("source"), json!(42));

        tree.set(source, json!(7), None).expect("set source");
        rt.pull(&mut tree, linked).expect("pull");
        assert_eq!(
            rt.get(&mut tree, linked, None).expect("linked"),
            rt.get(&mut tree, source, None).expect("source")
        );
    }

    /// T1.2: Chains flow C -> B -> A on pull.
    #[test]
    fn transitive_pull() {
        let mut tree = ModuleTree::new();
        let root = tree.create_module("root");
        let a = tree.create_module("a");
        let b = tree.create_module("b");
        let c = tree.create_module("c");
        for m in [a, b, c] {
            tree.add_child(root, m).expect("child");
        }
        tree.add_attribute(c, Attribute::new("x").with_value(json!("from c")))
            .expect("c.x");
        tree.add_attribute(b, Attribute::new("x").with_value(json!(0)).with_connect("/c/x"))
            .expect("b.x");
        let ax = tree
            .add_attribute(a, Attribute::new("x").with_value(json!(0)).with_connect("/b/x"))
            .expect("a.x");
        let value = Runtime::default().get(&mut tree, ax, None).expect("pull");
        assert_eq!(value, json!("from c"));
    }

    /// T1.3: An unresolvable connection fails at the point of use.
    #[test]
    fn broken_connection_is_an_error() {
        let (mut tree, _, _, linked) = linked_pair();
        tree.attribute_mut(linked)
            .expect("linked")
            .set_connect("/nowhere/value");
        let err = Runtime::default()
            .get(&mut tree, linked, None)
            .expect_err("broken");
        assert!(matches!(err, RigError::ConnectionResolution { module, .. } if module == "b"));
    }

    /// T1.4: Reading a data key never pulls; reading the value does.
    #[test]
    fn keyed_get_does_not_pull() {
        let (mut tree, _, source, linked) = linked_pair();
        let rt = Runtime::default();
        tree.set(source, json!(9), None).expect("set source");

        assert_eq!(rt.get(&mut tree, linked, Some("value")).expect("stale"), json!(0));
        assert_eq!(rt.get(&mut tree, linked, None).expect("pulled"), json!(9));
        assert_eq!(rt.get(&mut tree, linked, Some("value")).expect("fresh"), json!(9));
    }

    /// T1.5: Dependents of an attribute are listed.
    #[test]
    fn list_connections() {
        let (tree, _, source, linked) = linked_pair();
        assert_eq!(tree.list_connections(source).expect("list"), vec![linked]);
    }
}

// =============================================================================
// TIER T2: EXPRESSIONS
// =============================================================================

mod t2_expressions {
    use super::*;

    /// T2.1: Expressions see the module context.
    #[test]
    fn expression_uses_module_context() {
        let (mut tree, _, source, linked) = linked_pair();
        tree.attribute_mut(linked)
            .expect("linked")
            .set_expression("value = value + ch('/value', None) * 0 + 100");
        tree.add_attribute(source.module, Attribute::new("unused"))
            .expect("unused");
        // `ch` resolves from the module owning the attribute: b has no
        // attribute `value`, so this fails with a resolution error.
        let err = Runtime::default()
            .get(&mut tree, linked, None)
            .expect_err("b has no value attribute");
        assert!(matches!(err, RigError::Expression { .. }));

        tree.attribute_mut(linked)
            .expect("linked")
            .set_expression("value = value + 100");
        assert_eq!(
            Runtime::default().get(&mut tree, linked, None).expect("get"),
            json!(101)
        );
    }

    /// T2.2: Data mutations inside an expression persist.
    #[test]
    fn expression_can_edit_data() {
        let mut tree = ModuleTree::new();
        let m = tree.create_module("m");
        let attr = tree
            .add_attribute(
                m,
                Attribute::new("list")
                    .with_value(json!([]))
                    .with_expression("data['value'].append(len(data['value']))\nvalue = data['value']"),
            )
            .expect("list");
        let rt = Runtime::default();
        assert_eq!(rt.get(&mut tree, attr, None).expect("first"), json!([0]));
        assert_eq!(rt.get(&mut tree, attr, None).expect("second"), json!([0, 1]));
    }
}

// =============================================================================
// TIER T3: EXECUTION
// =============================================================================

mod t3_execution {
    use super::*;

    /// T3.1: `result = @value + 1` yields 2.
    #[test]
    fn end_to_end_scenario() {
        let mut tree = ModuleTree::new();
        let root = tree.create_module("root");
        let a = tree.create_module("A");
        tree.add_child(root, a).expect("A");
        tree.add_attribute(a, Attribute::new("value").with_value(json!(1)))
            .expect("value");
        tree.module_mut(a)
            .expect("A")
            .set_run_code("result = @value + 1");

        let ctx = Runtime::default().run(&mut tree, a).expect("run");
        assert_eq!(bound(&ctx, "attr_value"), Some(json!(1)));
        assert_eq!(bound(&ctx, "result"), Some(json!(2)));
    }

    /// T3.2: exit() stops only the current module's script.
    #[test]
    fn exit_signal_scenario() {
        let mut tree = ModuleTree::new();
        let root = tree.create_module("root");
        let child = tree.create_module("child");
        tree.add_child(root, child).expect("child");
        tree.module_mut(root)
            .expect("root")
            .set_run_code("before = 1\nmodule.glob.root_ran = True\nexit()\nafter = 1");
        tree.module_mut(child)
            .expect("child")
            .set_run_code("module.glob.child_ran = True");

        let ctx = Runtime::default().run(&mut tree, root).expect("run");
        assert_eq!(bound(&ctx, "before"), Some(json!(1)));
        assert_eq!(bound(&ctx, "after"), None);
        assert_eq!(tree.glob().get("child_ran"), Some(&json!(true)));
    }

    /// T3.3: A muted module and its subtree never execute.
    #[test]
    fn mute_gate() {
        let mut tree = ModuleTree::new();
        let root = tree.create_module("root");
        let muted = tree.create_module("muted");
        let inner = tree.create_module("inner");
        tree.add_child(root, muted).expect("muted");
        tree.add_child(muted, inner).expect("inner");
        tree.add_attribute(muted, Attribute::new("hidden").with_value(json!(1)))
            .expect("hidden");
        tree.module_mut(muted).expect("muted").mute();
        tree.module_mut(muted)
            .expect("muted")
            .set_run_code("module.glob.muted_ran = True");
        tree.module_mut(inner)
            .expect("inner")
            .set_run_code("module.glob.inner_ran = True");

        let ctx = Runtime::default().run(&mut tree, root).expect("run");
        assert!(ctx.keys().all(|k| !k.contains("hidden")));
        assert!(tree.glob().is_empty());
    }

    /// T3.4: A failing child aborts the walk and names the module.
    #[test]
    fn child_failure_aborts_siblings() {
        let mut tree = ModuleTree::new();
        let root = tree.create_module("root");
        let bad = tree.create_module("bad");
        let later = tree.create_module("later");
        tree.add_child(root, bad).expect("bad");
        tree.add_child(root, later).expect("later");
        tree.module_mut(bad)
            .expect("bad")
            .set_run_code("error('rig is broken')");
        tree.module_mut(later)
            .expect("later")
            .set_run_code("module.glob.later_ran = True");

        let err = Runtime::default().run(&mut tree, root).expect_err("fails");
        assert_eq!(
            err,
            RigError::ModuleRuntime {
                module: "bad".to_string(),
                reason: "rig is broken".to_string()
            }
        );
        assert!(tree.glob().get("later_ran").is_none());
    }

    /// T3.5: Run code drives attributes through setters and `ch`.
    #[test]
    fn run_code_sets_connected_attributes() {
        let (mut tree, root, source, linked) = linked_pair();
        tree.module_mut(linked.module)
            .expect("b")
            .set_run_code("@set_linked(@linked * 10)");
        Runtime::default().run(&mut tree, root).expect("run");
        assert_eq!(tree.attribute(source).expect("source").default_value(), json!(10));
    }
}

// =============================================================================
// TIER T4: PERSISTENCE AND UPDATE
// =============================================================================

mod t4_persistence {
    use super::*;
    use rigbuilder_core::{ModuleLibrary, load_from_file, save_to_file};
    use tempfile::TempDir;

    /// T4.0: copy keeps identity, code, mute and flags across the subtree.
    #[test]
    fn copy_preserves_module_state() {
        let dir = TempDir::new().expect("tempdir");
        let mut tree = ModuleTree::new();
        let root = tree.create_module("rig");
        let arm = tree.create_module("arm");
        tree.add_attribute(arm, Attribute::new("side").with_value(json!("L")))
            .expect("side");
        tree.module_mut(arm).expect("arm").set_run_code("x = @side");
        save_to_file(&mut tree, arm, &dir.path().join("arm.xml"), false).expect("save arm");
        tree.module_mut(arm).expect("arm").mute();
        let hand = tree.create_module("hand");
        tree.module_mut(hand).expect("hand").set_run_code("y = 1");
        tree.add_child(arm, hand).expect("hand");
        tree.add_child(root, arm).expect("arm");

        let copy = tree.copy_module(root).expect("copy");
        let originals = tree.descendants(root).expect("originals");
        let copies = tree.descendants(copy).expect("copies");
        assert_eq!(originals.len(), 3);
        assert_eq!(copies.len(), 3);
        for (original, copied) in originals.iter().zip(&copies) {
            assert_ne!(original, copied);
            let a = tree.module(*original).expect("original");
            let b = tree.module(*copied).expect("copy");
            assert_eq!(a.name(), b.name());
            assert_eq!(a.uid(), b.uid());
            assert_eq!(a.run_code(), b.run_code());
            assert_eq!(a.muted(), b.muted());
            assert_eq!(a.file_path(), b.file_path());
            assert_eq!(a.modified(), b.modified());
            assert_eq!(a.attributes(), b.attributes());
        }

        let arm_copy = tree.find_child(copy, "arm").expect("find").expect("arm copy");
        let arm_module = tree.module(arm_copy).expect("arm copy");
        assert!(!arm_module.uid().is_empty());
        assert!(arm_module.muted());
        assert!(arm_module.file_path().is_some());
    }

    /// T4.1: update keeps x = 5 and adds y from the file.
    #[test]
    fn update_preserves_matching_attributes() {
        let dir = TempDir::new().expect("tempdir");
        let server = dir.path().join("server");
        let local = dir.path().join("local");
        let path = local.join("limb.xml");

        let mut disk = ModuleTree::new();
        let d = disk.create_module("limb");
        disk.add_attribute(d, Attribute::new("x").with_template("lineEdit").with_value(json!(1)))
            .expect("x");
        save_to_file(&mut disk, d, &path, false).expect("save");

        let mut lib = ModuleLibrary::new(&server, &local);
        lib.refresh();
        let mut tree = ModuleTree::new();
        let m = lib.load_module(&mut tree, "limb").expect("load");
        tree.set(AttrRef::new(m, 0), json!(5), None).expect("edit");

        disk.add_attribute(d, Attribute::new("y").with_template("lineEdit").with_value(json!(3)))
            .expect("y");
        save_to_file(&mut disk, d, &path, false).expect("save changed");

        lib.update(&mut tree, m).expect("update");
        let module = tree.module(m).expect("m");
        assert_eq!(module.find_attribute("x").expect("x").default_value(), json!(5));
        assert_eq!(module.find_attribute("y").expect("y").default_value(), json!(3));
    }

    /// T4.2: update reloads new children from their own reference files.
    #[test]
    fn update_recurses_into_referenced_children() {
        let dir = TempDir::new().expect("tempdir");
        let server = dir.path().join("server");
        let local = dir.path().join("local");
        let leaf_path = local.join("leaf.xml");
        let rig_path = local.join("rig.xml");

        let mut disk = ModuleTree::new();
        let leaf = disk.create_module("leaf");
        disk.add_attribute(leaf, Attribute::new("v").with_template("lineEdit").with_value(json!(1)))
            .expect("v");
        save_to_file(&mut disk, leaf, &leaf_path, false).expect("save leaf");
        let rig = disk.create_module("rig");
        disk.add_child(rig, leaf).expect("child");
        save_to_file(&mut disk, rig, &rig_path, false).expect("save rig");

        // The leaf's own file moves on after the rig embedded a copy of it.
        disk.remove_child(rig, leaf).expect("detach");
        disk.add_attribute(leaf, Attribute::new("w").with_template("lineEdit").with_value(json!(2)))
            .expect("w");
        disk.module_mut(leaf).expect("leaf").set_run_code("done = True");
        save_to_file(&mut disk, leaf, &leaf_path, false).expect("save newer leaf");

        let mut lib = ModuleLibrary::new(&server, &local);
        lib.refresh();
        let mut tree = ModuleTree::new();
        let m = lib.load_module(&mut tree, "rig").expect("load rig");

        let child = tree.find_child(m, "leaf").expect("find").expect("leaf");
        let module = tree.module(child).expect("leaf");
        assert_eq!(module.run_code(), "done = True");
        assert_eq!(module.find_attribute("v").expect("v").default_value(), json!(1));
        assert_eq!(module.find_attribute("w").expect("w").default_value(), json!(2));
        assert_eq!(module.file_path(), Some(leaf_path.as_path()));
    }

    /// T4.3: save strips external connections but keeps internal ones.
    #[test]
    fn save_strips_external_connections() {
        let dir = TempDir::new().expect("tempdir");
        let (mut tree, root, _, linked) = linked_pair();
        let path = dir.path().join("b.xml");
        save_to_file(&mut tree, linked.module, &path, false).expect("save b");
        // In memory the connection is untouched.
        assert_eq!(tree.attribute(linked).expect("linked").connect(), "/a/value");

        let mut loaded = ModuleTree::new();
        let b = load_from_file(&mut loaded, &path).expect("load b");
        assert_eq!(loaded.attribute(AttrRef::new(b, 0)).expect("linked").connect(), "");

        let root_path = dir.path().join("root.xml");
        save_to_file(&mut tree, root, &root_path, false).expect("save root");
        let r = load_from_file(&mut loaded, &root_path).expect("load root");
        let b2 = loaded.find_child(r, "b").expect("find").expect("b");
        assert_eq!(
            loaded.attribute(AttrRef::new(b2, 0)).expect("linked").connect(),
            "/a/value"
        );
    }

    /// T4.4: embed severs the reference.
    #[test]
    fn embed_is_one_way() {
        let dir = TempDir::new().expect("tempdir");
        let (mut tree, root, _, _) = linked_pair();
        save_to_file(&mut tree, root, &dir.path().join("r.xml"), false).expect("save");
        tree.embed(root).expect("embed");
        let module = tree.module(root).expect("root");
        assert!(module.uid().is_empty());
        assert!(module.file_path().is_none());

        let lib = ModuleLibrary::new(dir.path(), dir.path());
        assert_eq!(lib.reference_file(&tree, root).expect("reference"), None);
    }
}

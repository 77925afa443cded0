//! The [`ScriptHost`] that serves script requests from a module tree.

use super::Runtime;
use crate::json::{copy_json, smart_conversion};
use crate::primitives::{
    BUTTON_TEMPLATE, EXPR_VALUE_BINDING, LINE_EDIT_BUTTON_TEMPLATE, RUN_BUTTON_COMMAND,
};
use crate::script::{Binding, HostRef, ScriptError, ScriptHost};
use crate::script::ops::{to_display, type_name};
use crate::tree::ModuleTree;
use crate::types::{AttrRef, ModuleId};
use serde_json::{Map, Value};

/// Serves host objects of one module's context.
pub struct TreeHost<'a> {
    runtime: &'a Runtime,
    tree: &'a mut ModuleTree,
    module: ModuleId,
}

impl<'a> TreeHost<'a> {
    pub fn new(runtime: &'a Runtime, tree: &'a mut ModuleTree, module: ModuleId) -> Self {
        Self {
            runtime,
            tree,
            module,
        }
    }

    /// The module whose context is being served.
    #[must_use]
    pub fn module(&self) -> ModuleId {
        self.module
    }

    fn attribute_named(&self, module: ModuleId, name: &str) -> Result<AttrRef, ScriptError> {
        match self.tree.find_attribute(module, name)? {
            Some(attr) => Ok(attr),
            None => Err(ScriptError::Runtime(format!(
                "module '{}' has no attribute '{}'",
                self.tree.module(module)?.name(),
                name
            ))),
        }
    }

    fn get(&mut self, attr: AttrRef, key: Option<&str>) -> Result<Binding, ScriptError> {
        Ok(Binding::Value(self.runtime.get(self.tree, attr, key)?))
    }

    fn set(&mut self, attr: AttrRef, value: Value, key: Option<&str>) -> Result<Binding, ScriptError> {
        self.tree.set(attr, value, key)?;
        Ok(Binding::Value(Value::Null))
    }

    fn module_method(
        &mut self,
        id: ModuleId,
        method: &str,
        args: &[Value],
    ) -> Result<Binding, ScriptError> {
        let module = self.tree.module(id)?;
        let result = match method {
            "name" => Value::String(module.name().to_string()),
            "uid" => Value::String(module.uid().to_string()),
            "muted" => Value::Bool(module.muted()),
            "filePath" => Value::String(
                module
                    .file_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            ),
            "path" => Value::String(self.tree.path(id)?),
            "root" => return Ok(HostRef::Module(self.tree.root(id)?).into()),
            "parent" => {
                return Ok(match module.parent() {
                    Some(parent) => HostRef::Module(parent).into(),
                    None => Binding::Value(Value::Null),
                });
            }
            "child" => {
                let found = match args.first() {
                    Some(Value::String(name)) => self.tree.find_child(id, name)?,
                    Some(Value::Number(n)) => match n.as_u64() {
                        Some(index) => self.tree.child(id, index as usize)?,
                        None => None,
                    },
                    _ => {
                        return Err(ScriptError::Type(
                            "child() expects an index or a name".to_string(),
                        ));
                    }
                };
                return Ok(match found {
                    Some(child) => HostRef::Module(child).into(),
                    None => Binding::Value(Value::Null),
                });
            }
            "childCount" => Value::from(module.children().len() as u64),
            other => {
                return Err(ScriptError::Type(format!(
                    "module has no method '{}'",
                    other
                )));
            }
        };
        Ok(Binding::Value(result))
    }

    fn attribute_method(
        &mut self,
        attr: AttrRef,
        method: &str,
        args: &[Value],
    ) -> Result<Binding, ScriptError> {
        let result = match method {
            "get" => return self.get(attr, key_arg(args, 0).as_deref()),
            "set" => {
                let value = value_arg(args, 0, "set")?;
                return self.set(attr, value, key_arg(args, 1).as_deref());
            }
            "data" => Value::Object(self.runtime.data(self.tree, attr)?),
            "localData" => Value::Object(self.tree.attribute(attr)?.local_data()),
            "pull" => {
                self.runtime.pull(self.tree, attr)?;
                Value::Null
            }
            "push" => {
                self.tree.push(attr)?;
                Value::Null
            }
            "name" => Value::String(self.tree.attribute(attr)?.name().to_string()),
            "template" => Value::String(self.tree.attribute(attr)?.template().to_string()),
            "category" => Value::String(self.tree.attribute(attr)?.category().to_string()),
            "connect" => Value::String(self.tree.attribute(attr)?.connect().to_string()),
            "expression" => Value::String(self.tree.attribute(attr)?.expression().to_string()),
            other => {
                return Err(ScriptError::Type(format!(
                    "attribute has no method '{}'",
                    other
                )));
            }
        };
        Ok(Binding::Value(result))
    }

    /// `runButtonCommand(module, label)`: run the command of the first button
    /// attribute labelled `label` in that module's context.
    ///
    /// A `lineEditAndButton` command sees the edited text as `value`, and the
    /// value it leaves behind is stored back (with push). Returns the plain
    /// data bindings of the command's context.
    fn run_button_command(&mut self, args: &[Binding]) -> Result<Binding, ScriptError> {
        let id = match args.first() {
            Some(Binding::Host(HostRef::Module(id))) => *id,
            _ => {
                return Err(ScriptError::Type(format!(
                    "{}() expects a module as first argument",
                    RUN_BUTTON_COMMAND
                )));
            }
        };
        let label = match args.get(1) {
            Some(Binding::Value(Value::String(label))) => label.clone(),
            _ => {
                return Err(ScriptError::Type(format!(
                    "{}() expects a button label",
                    RUN_BUTTON_COMMAND
                )));
            }
        };

        for attr in self.tree.attribute_refs(id)? {
            let attribute = self.tree.attribute(attr)?;
            let line_edit = attribute.template() == LINE_EDIT_BUTTON_TEMPLATE;
            if !line_edit && attribute.template() != BUTTON_TEMPLATE {
                continue;
            }
            let mut data = attribute.local_data();
            let wanted = Value::String(label.clone());
            if data.get("buttonLabel") != Some(&wanted) && data.get("label") != Some(&wanted) {
                continue;
            }
            let command = ["buttonCommand", "command"]
                .iter()
                .filter_map(|key| data.get(*key).and_then(Value::as_str))
                .find(|c| !c.is_empty())
                .unwrap_or_default()
                .to_string();
            if command.is_empty() {
                continue;
            }

            let mut ctx = self.runtime.context(self.tree, id)?;
            let old_value = data.get("value").cloned().unwrap_or_default();
            if line_edit {
                let value = match &old_value {
                    Value::String(text) => smart_conversion(text),
                    Value::Null => Value::String(String::new()),
                    other => other.clone(),
                };
                ctx.insert(EXPR_VALUE_BINDING.to_string(), value.into());
            }

            self.runtime.execute(self.tree, id, &command, &mut ctx)?;

            if line_edit {
                let value = match ctx.get(EXPR_VALUE_BINDING) {
                    Some(binding) => copy_json(binding)?,
                    None => old_value,
                };
                data.insert("value".to_string(), value);
                self.tree.set_data(attr, data)?;
            }

            let bindings: Map<String, Value> = ctx
                .into_iter()
                .filter_map(|(name, binding)| binding.into_value().map(|v| (name, v)))
                .collect();
            return Ok(Binding::Value(Value::Object(bindings)));
        }

        Err(ScriptError::Runtime(format!(
            "button with label '{}' not found in module '{}'",
            label,
            self.tree.module(id)?.name()
        )))
    }
}

fn values(args: Vec<Binding>) -> Result<Vec<Value>, ScriptError> {
    args.iter()
        .map(|a| copy_json(a).map_err(ScriptError::from))
        .collect()
}

fn path_arg<'v>(args: &'v [Value], function: &str) -> Result<&'v str, ScriptError> {
    match args.first() {
        Some(Value::String(path)) => Ok(path),
        Some(other) => Err(ScriptError::Type(format!(
            "{}() path must be a string, not '{}'",
            function,
            type_name(other)
        ))),
        None => Err(ScriptError::Type(format!("{}() missing path", function))),
    }
}

fn value_arg(args: &[Value], index: usize, function: &str) -> Result<Value, ScriptError> {
    args.get(index)
        .cloned()
        .ok_or_else(|| ScriptError::Type(format!("{}() missing value", function)))
}

/// Optional data key; `None`, `null` and `""` all mean the current value.
fn key_arg(args: &[Value], index: usize) -> Option<String> {
    match args.get(index) {
        None | Some(Value::Null) => None,
        Some(v) => Some(to_display(v)).filter(|k| !k.is_empty()),
    }
}

fn key_text(key: &Value) -> String {
    to_display(key)
}

fn not_callable(target: &HostRef) -> ScriptError {
    ScriptError::Type(format!("{} is not callable", target))
}

impl ScriptHost for TreeHost<'_> {
    fn call(&mut self, target: &HostRef, args: Vec<Binding>) -> Result<Binding, ScriptError> {
        if matches!(target, HostRef::Function(name) if name == RUN_BUTTON_COMMAND) {
            return self.run_button_command(&args);
        }
        let args = values(args)?;
        match target {
            HostRef::Function(name) => {
                Ok(Binding::Value(self.runtime.api().call(name, &args)?))
            }
            HostRef::Ch(from) => {
                let attr = self.tree.find_attribute_by_path(*from, path_arg(&args, "ch")?)?;
                self.get(attr, key_arg(&args, 1).as_deref())
            }
            HostRef::ChData(from) => {
                let attr = self
                    .tree
                    .find_attribute_by_path(*from, path_arg(&args, "chdata")?)?;
                let data = self.runtime.data(self.tree, attr)?;
                Ok(Binding::Value(Value::Object(data)))
            }
            HostRef::ChSet(from) => {
                let attr = self
                    .tree
                    .find_attribute_by_path(*from, path_arg(&args, "chset")?)?;
                let value = value_arg(&args, 1, "chset")?;
                self.set(attr, value, key_arg(&args, 2).as_deref())
            }
            HostRef::SetAttribute(attr) => {
                let value = value_arg(&args, 0, "set")?;
                self.set(*attr, value, key_arg(&args, 1).as_deref())
            }
            other => Err(not_callable(other)),
        }
    }

    fn call_method(
        &mut self,
        target: &HostRef,
        method: &str,
        args: Vec<Binding>,
    ) -> Result<Binding, ScriptError> {
        let args = values(args)?;
        match target {
            HostRef::Module(id) => self.module_method(*id, method, &args),
            HostRef::Attribute(attr) => self.attribute_method(*attr, method, &args),
            HostRef::AttributeData(attr) => match method {
                "get" => self.get(*attr, key_arg(&args, 0).as_deref()),
                "set" => {
                    let value = value_arg(&args, 0, "set")?;
                    self.set(*attr, value, key_arg(&args, 1).as_deref())
                }
                other => Err(ScriptError::Type(format!(
                    "attribute data has no method '{}'",
                    other
                ))),
            },
            other => Err(ScriptError::Type(format!(
                "{} has no method '{}'",
                other, method
            ))),
        }
    }

    fn field(&mut self, target: &HostRef, name: &str) -> Result<Binding, ScriptError> {
        match target {
            HostRef::Module(id) => match name {
                "glob" => Ok(HostRef::Glob.into()),
                "attr" => Ok(HostRef::Attributes(*id).into()),
                other => Err(ScriptError::Type(format!("module has no field '{}'", other))),
            },
            HostRef::Attributes(id) => {
                let attr = self.attribute_named(*id, name)?;
                Ok(HostRef::Attribute(attr).into())
            }
            HostRef::Glob => Ok(Binding::Value(
                self.tree.glob().get(name).cloned().unwrap_or_default(),
            )),
            other => Err(ScriptError::Type(format!("{} has no field '{}'", other, name))),
        }
    }

    fn set_field(&mut self, target: &HostRef, name: &str, value: Value) -> Result<(), ScriptError> {
        match target {
            HostRef::Attributes(id) => {
                let attr = self.attribute_named(*id, name)?;
                self.set(attr, value, None).map(|_| ())
            }
            HostRef::Glob => {
                self.tree.glob_mut().insert(name.to_string(), value);
                Ok(())
            }
            other => Err(ScriptError::Type(format!(
                "cannot assign field '{}' of {}",
                name, other
            ))),
        }
    }

    fn index(&mut self, target: &HostRef, key: &Value) -> Result<Binding, ScriptError> {
        let key = key_text(key);
        match target {
            HostRef::AttributeData(attr) => self.get(*attr, Some(&key)),
            HostRef::Glob | HostRef::Attributes(_) => self.field(target, &key),
            other => Err(ScriptError::Type(format!("{} is not subscriptable", other))),
        }
    }

    fn set_index(&mut self, target: &HostRef, key: &Value, value: Value) -> Result<(), ScriptError> {
        let key = key_text(key);
        match target {
            HostRef::AttributeData(attr) => {
                if key.is_empty() {
                    return Err(ScriptError::Runtime("empty data key".to_string()));
                }
                self.set(*attr, value, Some(&key)).map(|_| ())
            }
            HostRef::Glob | HostRef::Attributes(_) => self.set_field(target, &key, value),
            other => Err(ScriptError::Type(format!(
                "{} does not support item assignment",
                other
            ))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::attribute::Attribute;
    use crate::script::Context;
    use serde_json::json;

    struct Rig {
        tree: ModuleTree,
        root: ModuleId,
        a: ModuleId,
        b: ModuleId,
    }

    fn rig() -> Rig {
        let mut tree = ModuleTree::new();
        let root = tree.create_module("root");
        let a = tree.create_module("a");
        let b = tree.create_module("b");
        tree.add_child(root, a).expect("a");
        tree.add_child(root, b).expect("b");
        tree.add_attribute(
            a,
            Attribute::new("items")
                .with_data(
                    json!({"items": ["x", "y"], "selected": [1], "default": "items"})
                        .as_object()
                        .cloned()
                        .unwrap(),
                ),
        )
        .expect("items");
        tree.add_attribute(b, Attribute::new("count").with_value(json!(3)))
            .expect("count");
        Rig { tree, root, a, b }
    }

    fn exec(rt: &Runtime, tree: &mut ModuleTree, id: ModuleId, code: &str) -> Context {
        let mut ctx = rt.context(tree, id).expect("context");
        rt.execute(tree, id, code, &mut ctx).expect("script runs");
        ctx
    }

    fn value(ctx: &Context, name: &str) -> Value {
        ctx.get(name).and_then(Binding::as_value).cloned().unwrap()
    }

    #[test]
    fn ch_chdata_chset_resolve_from_module() {
        let mut r = rig();
        let rt = Runtime::default();
        let ctx = exec(
            &rt,
            &mut r.tree,
            r.root,
            "n = ch('/b/count')\nsel = chdata('/a/items')['selected']\nchset('/b/count', 9)",
        );
        assert_eq!(value(&ctx, "n"), json!(3));
        assert_eq!(value(&ctx, "sel"), json!([1]));
        assert_eq!(
            r.tree.get_key(AttrRef::new(r.b, 0), "value").expect("count"),
            json!(9)
        );
    }

    #[test]
    fn module_handle_methods() {
        let mut r = rig();
        let rt = Runtime::default();
        let ctx = exec(
            &rt,
            &mut r.tree,
            r.b,
            "n = module.name()\np = module.path()\nr = module.root().name()\nfirst = module.parent().child(0).name()\nnone = module.child(5)",
        );
        assert_eq!(value(&ctx, "n"), json!("b"));
        assert_eq!(value(&ctx, "p"), json!("root/b"));
        assert_eq!(value(&ctx, "r"), json!("root"));
        assert_eq!(value(&ctx, "first"), json!("a"));
        assert_eq!(value(&ctx, "none"), Value::Null);
    }

    #[test]
    fn glob_is_shared_across_modules() {
        let mut r = rig();
        let rt = Runtime::default();
        exec(&rt, &mut r.tree, r.a, "module.glob.counter = 1\nmodule.glob['names'] = ['a']");
        let ctx = exec(
            &rt,
            &mut r.tree,
            r.b,
            "module.glob.counter += 1\nc = module.glob.counter\nn = module.glob['names']",
        );
        assert_eq!(value(&ctx, "c"), json!(2));
        assert_eq!(value(&ctx, "n"), json!(["a"]));
        assert_eq!(r.tree.glob().get("counter"), Some(&json!(2)));
    }

    #[test]
    fn glob_reads_missing_keys_as_none() {
        let mut r = rig();
        let rt = Runtime::default();
        let ctx = exec(
            &rt,
            &mut r.tree,
            r.a,
            "x = module.glob.missing\nif not module.glob.initialized { module.glob.initialized = True }",
        );
        assert_eq!(value(&ctx, "x"), Value::Null);
        assert_eq!(r.tree.glob().get("initialized"), Some(&json!(true)));
    }

    #[test]
    fn glob_values_are_shared_not_copied() {
        let mut r = rig();
        let rt = Runtime::default();
        exec(
            &rt,
            &mut r.tree,
            r.a,
            "module.glob.names = []\nmodule.glob.names.append('a')\nmodule.glob['names'].append('b')",
        );
        assert_eq!(r.tree.glob().get("names"), Some(&json!(["a", "b"])));
    }

    #[test]
    fn attribute_wrapper_returns_handles() {
        let mut r = rig();
        let rt = Runtime::default();
        let ctx = exec(
            &rt,
            &mut r.tree,
            r.b,
            "before = module.attr.count.get()\nn = module.attr.count.name()\nmodule.attr.count.set(5)\nafter = module.attr['count'].get()\nmodule.attr.count = 4",
        );
        assert_eq!(value(&ctx, "before"), json!(3));
        assert_eq!(value(&ctx, "n"), json!("count"));
        assert_eq!(value(&ctx, "after"), json!(5));
        assert_eq!(
            r.tree.get_key(AttrRef::new(r.b, 0), "value").expect("count"),
            json!(4)
        );
    }

    #[test]
    fn attribute_handle_is_not_data() {
        let mut r = rig();
        let rt = Runtime::default();
        let mut ctx = rt.context(&r.tree, r.b).expect("context");
        let err = rt
            .execute(&mut r.tree, r.b, "x = module.attr.count + 1", &mut ctx)
            .expect_err("handle is not a value");
        assert!(matches!(err, ScriptError::Type(_)));
    }

    #[test]
    fn data_accessor_proxies_keys() {
        let mut r = rig();
        let rt = Runtime::default();
        let mut ctx = rt.context(&r.tree, r.a).expect("context");
        ctx.insert(
            "attr_items_data".to_string(),
            HostRef::AttributeData(AttrRef::new(r.a, 0)).into(),
        );
        rt.execute(
            &mut r.tree,
            r.a,
            "attr_items_data['selected'] = [0]\nsel = attr_items_data['selected']",
            &mut ctx,
        )
        .expect("script runs");
        assert_eq!(value(&ctx, "sel"), json!([0]));
        assert_eq!(
            r.tree.get_key(AttrRef::new(r.a, 0), "selected").expect("selected"),
            json!([0])
        );
    }

    #[test]
    fn data_accessor_reads_are_copies() {
        let mut r = rig();
        let rt = Runtime::default();
        let mut ctx = rt.context(&r.tree, r.a).expect("context");
        ctx.insert(
            "attr_items_data".to_string(),
            HostRef::AttributeData(AttrRef::new(r.a, 0)).into(),
        );
        rt.execute(
            &mut r.tree,
            r.a,
            "attr_items_data['items'].append('z')\nattr_items_data['items'][0] = 'q'\nlocal = attr_items_data['items']\nlocal.append('w')",
            &mut ctx,
        )
        .expect("script runs");
        assert_eq!(value(&ctx, "local"), json!(["x", "y", "w"]));
        assert_eq!(
            r.tree.get_key(AttrRef::new(r.a, 0), "items").expect("items"),
            json!(["x", "y"])
        );
    }

    fn button_rig() -> (ModuleTree, ModuleId) {
        let mut tree = ModuleTree::new();
        let m = tree.create_module("tools");
        tree.add_attribute(m, Attribute::new("count").with_value(json!(1)))
            .expect("count");
        tree.add_attribute(
            m,
            Attribute::new("bump")
                .with_template("button")
                .with_data(
                    json!({"label": "Bump", "command": "chset('/count', ch('/count') + 1)\nrunCount = 1"})
                        .as_object()
                        .cloned()
                        .unwrap(),
                ),
        )
        .expect("bump");
        tree.add_attribute(
            m,
            Attribute::new("scale")
                .with_template("lineEditAndButton")
                .with_data(
                    json!({"buttonLabel": "Double", "buttonCommand": "value = value * 2", "value": "21"})
                        .as_object()
                        .cloned()
                        .unwrap(),
                ),
        )
        .expect("scale");
        (tree, m)
    }

    #[test]
    fn run_button_command_executes_in_module_context() {
        let (mut tree, m) = button_rig();
        let rt = Runtime::default();
        let ctx = exec(&rt, &mut tree, m, "env = runButtonCommand(module, 'Bump')");
        assert_eq!(value(&ctx, "env")["runCount"], json!(1));
        assert_eq!(tree.get_key(AttrRef::new(m, 0), "value").expect("count"), json!(2));
    }

    #[test]
    fn run_button_command_writes_line_edit_value_back() {
        let (mut tree, m) = button_rig();
        let rt = Runtime::default();
        exec(&rt, &mut tree, m, "runButtonCommand(module, 'Double')");
        assert_eq!(tree.get_key(AttrRef::new(m, 2), "value").expect("scale"), json!(42));
    }

    #[test]
    fn run_button_command_unknown_label_fails() {
        let (mut tree, m) = button_rig();
        let rt = Runtime::default();
        let mut ctx = rt.context(&tree, m).expect("context");
        let err = rt
            .execute(&mut tree, m, "runButtonCommand(module, 'Nope')", &mut ctx)
            .expect_err("no such button");
        assert!(err.to_string().contains("Nope"));
    }

    #[test]
    fn host_objects_cannot_be_stored() {
        let mut r = rig();
        let rt = Runtime::default();
        let mut ctx = rt.context(&r.tree, r.root).expect("context");
        let err = rt
            .execute(&mut r.tree, r.root, "chset('/b/count', module)", &mut ctx)
            .expect_err("module is not data");
        assert!(err.to_string().contains("non-JSON"));
    }

    #[test]
    fn missing_path_is_a_host_error() {
        let mut r = rig();
        let rt = Runtime::default();
        let mut ctx = rt.context(&r.tree, r.root).expect("context");
        let err = rt
            .execute(&mut r.tree, r.root, "ch('/nope/x')", &mut ctx)
            .expect_err("missing");
        assert!(matches!(err, ScriptError::Host(_)));
    }
}

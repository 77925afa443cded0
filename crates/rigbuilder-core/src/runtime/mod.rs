//! # Execution Engine
//!
//! Everything that needs to run script code against the tree: attribute pull
//! (connections + expressions), expression evaluation and the recursive
//! module `run`.
//!
//! ## Run order
//!
//! 1. A muted module returns an empty context: no resolution, no callback,
//!    no children.
//! 2. The context is built (API table, `module`, `ch`, `chdata`, `chset`,
//!    `runButtonCommand`) and every attribute is pulled in stored order and
//!    bound as `attr_<name>`, `attr_set_<name>` and `attr_<name>_data`.
//! 3. The callback sees the module, then the run code (with `@name` tokens
//!    rewritten) executes. `exit()` ends this module's code only.
//! 4. Unmuted children run in child order. Any error aborts the walk.

pub mod host;
pub mod rewrite;

pub use host::TreeHost;
pub use rewrite::rewrite_attribute_tokens;

use crate::api::{Api, HostReporter, TracingReporter};
use crate::primitives::{
    ATTR_DATA_SUFFIX, ATTR_PREFIX, ATTR_SETTER_PREFIX, CH_BINDING, CHDATA_BINDING, CHSET_BINDING,
    EXPR_DATA_BINDING, EXPR_VALUE_BINDING, MAX_CONNECTION_DEPTH, MODULE_BINDING,
    RUN_BUTTON_COMMAND,
};
use crate::script::{Binding, Context, HostRef, RigScript, ScriptEngine, ScriptError};
use crate::tree::ModuleTree;
use crate::types::{AttrRef, ModuleId, RigError};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Script engine plus API table; drives pull, expressions and `run`.
pub struct Runtime {
    engine: Box<dyn ScriptEngine>,
    api: Api,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::with_reporter(Arc::new(TracingReporter))
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime").field("api", &self.api).finish()
    }
}

impl Runtime {
    #[must_use]
    pub fn new(engine: Box<dyn ScriptEngine>, api: Api) -> Self {
        Self { engine, api }
    }

    /// Built-in engine and standard API, reporting to `reporter`.
    #[must_use]
    pub fn with_reporter(reporter: Arc<dyn HostReporter>) -> Self {
        Self::new(Box::new(RigScript::new()), Api::standard(reporter))
    }

    #[must_use]
    pub fn api(&self) -> &Api {
        &self.api
    }

    pub fn api_mut(&mut self) -> &mut Api {
        &mut self.api
    }

    // =========================================================================
    // CONTEXT
    // =========================================================================

    /// The base execution context of module `id`.
    pub fn context(&self, tree: &ModuleTree, id: ModuleId) -> Result<Context, RigError> {
        tree.module(id)?;
        let mut ctx: Context = self
            .api
            .names()
            .map(|name| {
                (
                    name.to_string(),
                    Binding::Host(HostRef::Function(name.to_string())),
                )
            })
            .collect();
        ctx.insert(MODULE_BINDING.to_string(), HostRef::Module(id).into());
        ctx.insert(CH_BINDING.to_string(), HostRef::Ch(id).into());
        ctx.insert(CHDATA_BINDING.to_string(), HostRef::ChData(id).into());
        ctx.insert(CHSET_BINDING.to_string(), HostRef::ChSet(id).into());
        ctx.insert(
            RUN_BUTTON_COMMAND.to_string(),
            HostRef::Function(RUN_BUTTON_COMMAND.to_string()).into(),
        );
        Ok(ctx)
    }

    /// Execute `code` in `context` on behalf of module `module`.
    pub fn execute(
        &self,
        tree: &mut ModuleTree,
        module: ModuleId,
        code: &str,
        context: &mut Context,
    ) -> Result<(), ScriptError> {
        let mut host = TreeHost::new(self, tree, module);
        self.engine.execute(code, context, &mut host)
    }

    // =========================================================================
    // ATTRIBUTE RESOLUTION
    // =========================================================================

    /// Current value (`key == None`, pulls first) or `data[key]` (no pull).
    pub fn get(
        &self,
        tree: &mut ModuleTree,
        attr: AttrRef,
        key: Option<&str>,
    ) -> Result<Value, RigError> {
        match key {
            None | Some("") => {
                self.pull(tree, attr)?;
                Ok(tree.attribute(attr)?.default_value())
            }
            Some(key) => tree.get_key(attr, key),
        }
    }

    /// Copy of the whole data object after a pull.
    pub fn data(&self, tree: &mut ModuleTree, attr: AttrRef) -> Result<Map<String, Value>, RigError> {
        self.pull(tree, attr)?;
        Ok(tree.attribute(attr)?.local_data())
    }

    /// Recompute the attribute from its connection source and expression.
    ///
    /// The source is pulled first, then its expression runs once more before
    /// its value is copied over. The attribute's own expression runs last,
    /// connected or not.
    pub fn pull(&self, tree: &mut ModuleTree, attr: AttrRef) -> Result<(), RigError> {
        self.pull_at(tree, attr, 0)
    }

    fn pull_at(&self, tree: &mut ModuleTree, attr: AttrRef, depth: usize) -> Result<(), RigError> {
        if depth > MAX_CONNECTION_DEPTH {
            return Err(RigError::ConnectionDepth {
                attribute: tree.attribute(attr)?.name().to_string(),
                limit: MAX_CONNECTION_DEPTH,
            });
        }
        if let Some(source) = tree.find_connection_source(attr)? {
            tracing::trace!(to = %attr, from = %source, "pull");
            self.pull_at(tree, source, depth + 1)?;
            self.execute_expression(tree, source)?;
            let value = tree.attribute(source)?.default_value();
            tree.attribute_mut(attr)?.set_default_value(value);
        }
        self.execute_expression(tree, attr)
    }

    /// Run the attribute's expression and store the resulting `value`.
    ///
    /// The expression sees the module context plus `data` (the raw data) and
    /// `value` (the current value). Changes to `data` are kept; `value` is
    /// then written as the current value.
    pub fn execute_expression(&self, tree: &mut ModuleTree, attr: AttrRef) -> Result<(), RigError> {
        let attribute = tree.attribute(attr)?;
        if attribute.expression().is_empty() {
            return Ok(());
        }
        let name = attribute.name().to_string();
        let expression = attribute.expression().to_string();
        let data = attribute.local_data();
        let value = attribute.default_value();

        let mut ctx = self.context(tree, attr.module)?;
        ctx.insert(EXPR_DATA_BINDING.to_string(), Value::Object(data).into());
        ctx.insert(EXPR_VALUE_BINDING.to_string(), value.into());

        let fail = |reason: String| RigError::Expression {
            attribute: name.clone(),
            reason,
        };
        self.execute(tree, attr.module, &expression, &mut ctx)
            .map_err(|e| fail(e.to_string()))?;

        if let Some(Binding::Value(Value::Object(data))) = ctx.remove(EXPR_DATA_BINDING) {
            tree.attribute_mut(attr)?.set_local_data(data);
        }
        match ctx.remove(EXPR_VALUE_BINDING) {
            Some(Binding::Value(value)) => {
                tree.attribute_mut(attr)?.set_default_value(value);
                Ok(())
            }
            Some(Binding::Host(h)) => Err(fail(RigError::Copy(h.to_string()).to_string())),
            None => Err(fail("'value' was deleted".to_string())),
        }
    }

    // =========================================================================
    // RUN
    // =========================================================================

    /// Run module `id` and its unmuted descendants; returns `id`'s context.
    pub fn run(&self, tree: &mut ModuleTree, id: ModuleId) -> Result<Context, RigError> {
        self.run_with(tree, id, &mut |_, _| {})
    }

    /// [`Runtime::run`] with a callback invoked for each module right before
    /// its code executes.
    pub fn run_with(
        &self,
        tree: &mut ModuleTree,
        id: ModuleId,
        callback: &mut dyn FnMut(&ModuleTree, ModuleId),
    ) -> Result<Context, RigError> {
        let module = tree.module(id)?;
        if module.muted() {
            tracing::debug!(module = %module.name(), "skipping muted module");
            return Ok(Context::new());
        }
        let module_name = module.name().to_string();

        let mut ctx = self.context(tree, id)?;
        for attr in tree.attribute_refs(id)? {
            let value = self.get(tree, attr, None)?;
            let name = tree.attribute(attr)?.name().to_string();
            ctx.insert(format!("{}{}", ATTR_PREFIX, name), value.into());
            ctx.insert(
                format!("{}{}", ATTR_SETTER_PREFIX, name),
                HostRef::SetAttribute(attr).into(),
            );
            ctx.insert(
                format!("{}{}{}", ATTR_PREFIX, name, ATTR_DATA_SUFFIX),
                HostRef::AttributeData(attr).into(),
            );
        }

        callback(tree, id);

        let code = rewrite_attribute_tokens(tree.module(id)?.run_code()).into_owned();
        tracing::debug!(module = %module_name, "run");
        match self.execute(tree, id, &code, &mut ctx) {
            Ok(()) => {}
            Err(ScriptError::Exit) => {
                tracing::debug!(module = %module_name, "exit");
            }
            Err(e) => {
                return Err(RigError::ModuleRuntime {
                    module: module_name,
                    reason: e.to_string(),
                });
            }
        }

        let children = tree.module(id)?.children().to_vec();
        for child in children {
            if tree.module(child)?.muted() {
                continue;
            }
            self.run_with(tree, child, callback)?;
        }
        Ok(ctx)
    }
}

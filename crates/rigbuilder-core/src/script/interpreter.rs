//! # RigScript Interpreter
//!
//! Tree-walking evaluation of parsed RigScript against a [`Context`].
//!
//! Assignments to names write straight into the context, so every top-level
//! binding a script creates is visible to the caller afterwards. Indexed and
//! field assignments are read-modify-write: the container is fetched, changed
//! and stored back into the place it came from, which lets `data["x"] = 1`,
//! `module.glob["k"] = v` and `attr_points_data["items"] = [...]` share one
//! code path.
//!
//! Values read through a host object are copies unless the object reports
//! [`super::HostRef::is_live_container`]. Nested edits and mutating methods on such a
//! copy (`attr_points_data["items"].append(x)`) stay local to the expression.

use super::ast::{Block, Expr, LogicalOp, Stmt, UnaryOp};
use super::ops::{self, truthy};
use super::parser::parse;
use super::{Binding, Context, ScriptEngine, ScriptError, ScriptHost};
use serde_json::{Map, Value};

/// The built-in script engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct RigScript;

impl RigScript {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ScriptEngine for RigScript {
    fn execute(
        &self,
        code: &str,
        context: &mut Context,
        host: &mut dyn ScriptHost,
    ) -> Result<(), ScriptError> {
        let program = parse(code)?;
        let mut interpreter = Interpreter { context, host };
        match interpreter.exec_block(&program)? {
            Flow::Normal => Ok(()),
            Flow::Break | Flow::Continue => Err(ScriptError::Syntax {
                line: 0,
                message: "'break' or 'continue' outside loop".to_string(),
            }),
        }
    }
}

// =============================================================================
// INTERPRETER
// =============================================================================

enum Flow {
    Normal,
    Break,
    Continue,
}

struct Interpreter<'a, 'h> {
    context: &'a mut Context,
    host: &'a mut (dyn ScriptHost + 'h),
}

fn binding_truthy(binding: &Binding) -> bool {
    match binding {
        Binding::Value(v) => truthy(v),
        Binding::Host(_) => true,
    }
}

fn require_value(binding: Binding) -> Result<Value, ScriptError> {
    match binding {
        Binding::Value(v) => Ok(v),
        Binding::Host(h) => Err(ScriptError::Type(format!("{} cannot be used as data", h))),
    }
}

impl Interpreter<'_, '_> {
    // -------------------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------------------

    fn exec_block(&mut self, block: &Block) -> Result<Flow, ScriptError> {
        for line in block {
            match self.exec(&line.stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Flow, ScriptError> {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr)?;
            }
            Stmt::Assign {
                target,
                op: None,
                value,
            } => {
                let value = self.eval(value)?;
                self.assign(target, value)?;
            }
            Stmt::Assign {
                target,
                op: Some(op),
                value,
            } => {
                let current = self.eval_value(target)?;
                let rhs = self.eval_value(value)?;
                let updated = ops::binary(*op, &current, &rhs)?;
                self.assign(target, Binding::Value(updated))?;
            }
            Stmt::If {
                branches,
                otherwise,
            } => {
                for (cond, body) in branches {
                    let test = self.eval(cond)?;
                    if binding_truthy(&test) {
                        return self.exec_block(body);
                    }
                }
                return self.exec_block(otherwise);
            }
            Stmt::While { cond, body } => loop {
                let test = self.eval(cond)?;
                if !binding_truthy(&test) {
                    break;
                }
                if let Flow::Break = self.exec_block(body)? {
                    break;
                }
            },
            Stmt::For { var, iter, body } => {
                let items = ops::iterate(&self.eval_value(iter)?)?;
                for item in items {
                    self.context.insert(var.clone(), Binding::Value(item));
                    if let Flow::Break = self.exec_block(body)? {
                        break;
                    }
                }
            }
            Stmt::Break => return Ok(Flow::Break),
            Stmt::Continue => return Ok(Flow::Continue),
            Stmt::Pass => {}
        }
        Ok(Flow::Normal)
    }

    /// Store `value` into the place `target` denotes.
    fn assign(&mut self, target: &Expr, value: Binding) -> Result<(), ScriptError> {
        match target {
            Expr::Name(name) => {
                self.context.insert(name.clone(), value);
                Ok(())
            }
            Expr::Index(base, index) => {
                let key = self.eval_value(index)?;
                let value = require_value(value)?;
                match self.eval(base)? {
                    Binding::Host(h) => self.host.set_index(&h, &key, value),
                    Binding::Value(mut container) => {
                        ops::set_index(&mut container, &key, value)?;
                        self.write_back(base, container)
                    }
                }
            }
            Expr::Field(base, name) => {
                let value = require_value(value)?;
                match self.eval(base)? {
                    Binding::Host(h) => self.host.set_field(&h, name, value),
                    Binding::Value(v) => Err(read_only_field(&v, name)),
                }
            }
            _ => Err(ScriptError::Type("cannot assign to expression".to_string())),
        }
    }

    /// Store a changed container back into the place it was read from.
    ///
    /// Stops silently at a host object that hands out copies, and at
    /// expressions that are not places at all.
    fn write_back(&mut self, place: &Expr, container: Value) -> Result<(), ScriptError> {
        match place {
            Expr::Name(name) => {
                self.context.insert(name.clone(), Binding::Value(container));
                Ok(())
            }
            Expr::Index(base, index) => {
                let key = self.eval_value(index)?;
                match self.eval(base)? {
                    Binding::Host(h) if h.is_live_container() => {
                        self.host.set_index(&h, &key, container)
                    }
                    Binding::Host(_) => Ok(()),
                    Binding::Value(mut outer) => {
                        ops::set_index(&mut outer, &key, container)?;
                        self.write_back(base, outer)
                    }
                }
            }
            Expr::Field(base, name) => match self.eval(base)? {
                Binding::Host(h) if h.is_live_container() => {
                    self.host.set_field(&h, name, container)
                }
                Binding::Host(_) => Ok(()),
                Binding::Value(v) => Err(read_only_field(&v, name)),
            },
            _ => Ok(()),
        }
    }

    // -------------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------------

    fn eval_value(&mut self, expr: &Expr) -> Result<Value, ScriptError> {
        let binding = self.eval(expr)?;
        require_value(binding)
    }

    fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<Binding>, ScriptError> {
        args.iter().map(|a| self.eval(a)).collect()
    }

    fn eval(&mut self, expr: &Expr) -> Result<Binding, ScriptError> {
        let binding = match expr {
            Expr::Literal(v) => Binding::Value(v.clone()),
            Expr::Name(name) => self
                .context
                .get(name)
                .cloned()
                .ok_or_else(|| ScriptError::Name(name.clone()))?,
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|e| self.eval_value(e))
                    .collect::<Result<Vec<_>, _>>()?;
                Binding::Value(Value::Array(values))
            }
            Expr::Map(entries) => {
                let mut map = Map::new();
                for (k, v) in entries {
                    let key = match self.eval_value(k)? {
                        Value::String(s) => s,
                        other => {
                            return Err(ScriptError::Type(format!(
                                "map keys must be strings, not {}",
                                ops::type_name(&other)
                            )));
                        }
                    };
                    let value = self.eval_value(v)?;
                    map.insert(key, value);
                }
                Binding::Value(Value::Object(map))
            }
            Expr::Unary(op, inner) => {
                let v = self.eval(inner)?;
                match op {
                    UnaryOp::Not => Binding::Value(Value::Bool(!binding_truthy(&v))),
                    UnaryOp::Neg => Binding::Value(ops::negate(&require_value(v)?)?),
                    UnaryOp::Pos => {
                        let v = require_value(v)?;
                        if ops::as_num(&v).is_none() {
                            return Err(ScriptError::Type(format!(
                                "bad operand type for unary +: '{}'",
                                ops::type_name(&v)
                            )));
                        }
                        Binding::Value(v)
                    }
                }
            }
            Expr::Binary(op, left, right) => {
                let a = self.eval_value(left)?;
                let b = self.eval_value(right)?;
                Binding::Value(ops::binary(*op, &a, &b)?)
            }
            Expr::Logical(op, left, right) => {
                let l = self.eval(left)?;
                let short_circuit = match op {
                    LogicalOp::And => !binding_truthy(&l),
                    LogicalOp::Or => binding_truthy(&l),
                };
                if short_circuit { l } else { self.eval(right)? }
            }
            Expr::Call(callee, args) => {
                let target = self.eval(callee)?;
                let args = self.eval_args(args)?;
                match target {
                    Binding::Host(h) => self.host.call(&h, args)?,
                    Binding::Value(v) => {
                        return Err(ScriptError::Type(format!(
                            "'{}' object is not callable",
                            ops::type_name(&v)
                        )));
                    }
                }
            }
            Expr::MethodCall(receiver, method, args) => {
                let target = self.eval(receiver)?;
                let args = self.eval_args(args)?;
                match target {
                    Binding::Host(h) => self.host.call_method(&h, method, args)?,
                    Binding::Value(mut v) => {
                        let args = args
                            .into_iter()
                            .map(require_value)
                            .collect::<Result<Vec<_>, _>>()?;
                        let result = ops::call_method(&mut v, method, args)?;
                        if ops::is_mutating(method) {
                            self.write_back(receiver, v)?;
                        }
                        Binding::Value(result)
                    }
                }
            }
            Expr::Field(base, name) => match self.eval(base)? {
                Binding::Host(h) => self.host.field(&h, name)?,
                Binding::Value(v) => {
                    return Err(ScriptError::Type(format!(
                        "'{}' object has no attribute '{}'",
                        ops::type_name(&v),
                        name
                    )));
                }
            },
            Expr::Index(base, index) => {
                let target = self.eval(base)?;
                let key = self.eval_value(index)?;
                match target {
                    Binding::Host(h) => self.host.index(&h, &key)?,
                    Binding::Value(v) => Binding::Value(ops::get_index(&v, &key)?),
                }
            }
        };
        Ok(binding)
    }
}

fn read_only_field(value: &Value, name: &str) -> ScriptError {
    ScriptError::Type(format!(
        "'{}' object attribute '{}' is read-only",
        ops::type_name(value),
        name
    ))
}

/// Evaluate a script that needs no host objects and return its context.
pub fn run_detached(code: &str, context: Context) -> Result<Context, ScriptError> {
    let mut context = context;
    RigScript.execute(code, &mut context, &mut super::DetachedHost)?;
    Ok(context)
}

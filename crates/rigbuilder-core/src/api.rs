//! # Script API
//!
//! The flat table of named functions injected into every module context.
//!
//! Functions are registered by name and receive plain JSON arguments. Hosts
//! extend the table with [`Api::register`]; the standard table covers data
//! coercion, widget data helpers, curve evaluation, progress reporting and a
//! handful of Python-flavoured builtins (`len`, `str`, `range`...).
//!
//! Output that reaches the user (`print`, `warning`, progress) goes through a
//! [`HostReporter`], so a GUI, a CLI and a test can each decide where it ends up.

use crate::curve;
use crate::json::{from_smart_conversion, smart_conversion};
use crate::script::ScriptError;
use crate::script::ops::{self, Num, as_num, compare, float, to_display, type_name};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Epsilon of `curve_evaluateFromX`.
const CURVE_EPSILON: f64 = 1e-3;

/// Largest list `range()` may build.
const MAX_RANGE_LEN: i64 = 10_000_000;

// =============================================================================
// HOST REPORTER
// =============================================================================

/// Where user-facing script output goes.
pub trait HostReporter: Send + Sync {
    fn print(&self, text: &str);

    fn warning(&self, text: &str);

    fn begin_progress(&self, _text: &str, _total: u64) {}

    fn step_progress(&self, _step: u64, _text: &str) {}

    fn end_progress(&self) {}
}

/// Reports through `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl HostReporter for TracingReporter {
    fn print(&self, text: &str) {
        tracing::info!(target: "rigbuilder::script", "{}", text);
    }

    fn warning(&self, text: &str) {
        tracing::warn!(target: "rigbuilder::script", "Warning: {}", text);
    }

    fn begin_progress(&self, text: &str, total: u64) {
        tracing::debug!(target: "rigbuilder::script", total, "{}", text);
    }

    fn step_progress(&self, step: u64, text: &str) {
        tracing::debug!(target: "rigbuilder::script", step, "{}", text);
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// A script-callable function.
pub type ApiFn = Arc<dyn Fn(&[Value]) -> Result<Value, ScriptError> + Send + Sync>;

/// Registry of script API functions.
#[derive(Clone, Default)]
pub struct Api {
    functions: BTreeMap<String, ApiFn>,
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Api {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a function.
    pub fn register<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&[Value]) -> Result<Value, ScriptError> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Call a function by name.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, ScriptError> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| ScriptError::Name(name.to_string()))?;
        function(args)
    }

    /// The standard table.
    #[must_use]
    pub fn standard(reporter: Arc<dyn HostReporter>) -> Self {
        let mut api = Self::new();

        // Flow and reporting
        api.register("exit", |_| Err(ScriptError::Exit));
        api.register("error", |args| {
            Err(ScriptError::Raised(text_arg(args, 0).unwrap_or_default()))
        });
        let r = Arc::clone(&reporter);
        api.register("warning", move |args| {
            r.warning(&text_arg(args, 0).unwrap_or_default());
            Ok(Value::Null)
        });
        let r = Arc::clone(&reporter);
        api.register("print", move |args| {
            let parts: Vec<String> = args.iter().map(to_display).collect();
            r.print(&parts.join(" "));
            Ok(Value::Null)
        });
        let r = Arc::clone(&reporter);
        api.register("beginProgress", move |args| {
            let total = args.get(1).and_then(Value::as_u64).unwrap_or(0);
            r.begin_progress(&text_arg(args, 0).unwrap_or_default(), total);
            Ok(Value::Null)
        });
        let r = Arc::clone(&reporter);
        api.register("stepProgress", move |args| {
            let step = args.first().and_then(Value::as_u64).unwrap_or(1);
            r.step_progress(step, &text_arg(args, 1).unwrap_or_default());
            Ok(Value::Null)
        });
        let r = reporter;
        api.register("endProgress", move |_| {
            r.end_progress();
            Ok(Value::Null)
        });

        // Data coercion
        api.register("copyJson", |args| Ok(arg(args, 0, "copyJson")?.clone()));
        api.register("smartConversion", |args| {
            Ok(match arg(args, 0, "smartConversion")? {
                Value::String(s) => smart_conversion(s),
                other => other.clone(),
            })
        });
        api.register("fromSmartConversion", |args| {
            Ok(Value::String(from_smart_conversion(arg(
                args,
                0,
                "fromSmartConversion",
            )?)))
        });
        api.register("clamp", |args| {
            let value = arg(args, 0, "clamp")?;
            let low = arg(args, 1, "clamp")?;
            let high = arg(args, 2, "clamp")?;
            let capped = if compare(high, value)? == Ordering::Less {
                high
            } else {
                value
            };
            let clamped = if compare(low, capped)? == Ordering::Greater {
                low
            } else {
                capped
            };
            Ok(clamped.clone())
        });
        api.register("listLerp", |args| {
            let a = floats_arg(arg(args, 0, "listLerp")?, "listLerp")?;
            let b = floats_arg(arg(args, 1, "listLerp")?, "listLerp")?;
            let w = number_arg(arg(args, 2, "listLerp")?, "listLerp")?;
            floats_value(&curve::list_lerp(&a, &b, w))
        });

        // Widget data helpers
        api.register("curve_evaluate", |args| {
            let cvs = curve_points(arg(args, 0, "curve_evaluate")?)?;
            let param = number_arg(arg(args, 1, "curve_evaluate")?, "curve_evaluate")?;
            let point = curve::evaluate_curve(&cvs, param).ok_or_else(short_curve)?;
            floats_value(&point)
        });
        api.register("curve_evaluateFromX", |args| {
            let cvs = curve_points(arg(args, 0, "curve_evaluateFromX")?)?;
            let x = number_arg(arg(args, 1, "curve_evaluateFromX")?, "curve_evaluateFromX")?;
            let point =
                curve::evaluate_curve_from_x(&cvs, x, CURVE_EPSILON).ok_or_else(short_curve)?;
            floats_value(&point)
        });
        api.register("listBox_selected", |args| {
            let data = object_arg(arg(args, 0, "listBox_selected")?, "listBox_selected")?;
            let items = data.get("items").and_then(Value::as_array);
            let selected = data.get("selected").and_then(Value::as_array);
            let (Some(items), Some(selected)) = (items, selected) else {
                return Ok(Value::Array(Vec::new()));
            };
            let picked = selected
                .iter()
                .filter_map(Value::as_u64)
                .filter_map(|i| items.get(usize::try_from(i).ok()?).cloned())
                .collect();
            Ok(Value::Array(picked))
        });
        api.register("listBox_setSelected", |args| {
            let mut data =
                object_arg(arg(args, 0, "listBox_setSelected")?, "listBox_setSelected")?.clone();
            data.insert(
                "selected".to_string(),
                arg(args, 1, "listBox_setSelected")?.clone(),
            );
            Ok(Value::Object(data))
        });
        api.register("comboBox_items", |args| {
            let data = object_arg(arg(args, 0, "comboBox_items")?, "comboBox_items")?;
            Ok(data
                .get("items")
                .cloned()
                .unwrap_or_else(|| Value::Array(Vec::new())))
        });
        api.register("comboBox_setItems", |args| {
            let mut data =
                object_arg(arg(args, 0, "comboBox_setItems")?, "comboBox_setItems")?.clone();
            data.insert(
                "items".to_string(),
                arg(args, 1, "comboBox_setItems")?.clone(),
            );
            Ok(Value::Object(data))
        });

        register_builtins(&mut api);
        api
    }
}

// =============================================================================
// BUILTINS
// =============================================================================

fn register_builtins(api: &mut Api) {
    api.register("len", |args| {
        let n = match arg(args, 0, "len")? {
            Value::String(s) => s.chars().count(),
            Value::Array(a) => a.len(),
            Value::Object(o) => o.len(),
            other => {
                return Err(ScriptError::Type(format!(
                    "object of type '{}' has no len()",
                    type_name(other)
                )));
            }
        };
        Ok(Value::from(n as u64))
    });
    api.register("str", |args| {
        Ok(Value::String(
            args.first().map(to_display).unwrap_or_default(),
        ))
    });
    api.register("bool", |args| {
        Ok(Value::Bool(args.first().is_some_and(ops::truthy)))
    });
    api.register("int", |args| {
        let Some(v) = args.first() else {
            return Ok(Value::from(0));
        };
        match (v, as_num(v)) {
            (_, Some(Num::Int(i))) => Ok(Value::from(i)),
            (_, Some(Num::Float(f))) => {
                if f.is_finite() && f.abs() < 9.2e18 {
                    Ok(Value::from(f.trunc() as i64))
                } else {
                    Err(ScriptError::Runtime(format!("cannot convert {} to int", f)))
                }
            }
            (Value::String(s), _) => s.trim().parse::<i64>().map(Value::from).map_err(|_| {
                ScriptError::Runtime(format!("invalid literal for int(): '{}'", s))
            }),
            (other, _) => Err(ScriptError::Type(format!(
                "int() argument must be a string or a number, not '{}'",
                type_name(other)
            ))),
        }
    });
    api.register("float", |args| {
        let Some(v) = args.first() else {
            return float(0.0);
        };
        match (v, as_num(v)) {
            (_, Some(n)) => float(n.as_f64()),
            (Value::String(s), _) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| {
                    ScriptError::Runtime(format!("could not convert string to float: '{}'", s))
                })
                .and_then(float),
            (other, _) => Err(ScriptError::Type(format!(
                "float() argument must be a string or a number, not '{}'",
                type_name(other)
            ))),
        }
    });
    api.register("abs", |args| match as_num(arg(args, 0, "abs")?) {
        Some(Num::Int(i)) => i
            .checked_abs()
            .map(Value::from)
            .ok_or_else(|| ScriptError::Runtime("integer overflow".to_string())),
        Some(Num::Float(f)) => float(f.abs()),
        None => Err(ScriptError::Type("bad operand type for abs()".to_string())),
    });
    api.register("round", |args| {
        let x = number_arg(arg(args, 0, "round")?, "round")?;
        match args.get(1).and_then(Value::as_i64) {
            None => {
                let r = x.round_ties_even();
                if r.is_finite() && r.abs() < 9.2e18 {
                    Ok(Value::from(r as i64))
                } else {
                    Err(ScriptError::Runtime(format!("cannot round {}", x)))
                }
            }
            Some(digits) => {
                let factor = 10f64.powi(digits.clamp(-300, 300) as i32);
                float((x * factor).round_ties_even() / factor)
            }
        }
    });
    api.register("min", |args| extreme(args, "min", Ordering::Less));
    api.register("max", |args| extreme(args, "max", Ordering::Greater));
    api.register("range", |args| {
        let ints: Vec<i64> = args
            .iter()
            .map(|a| match as_num(a) {
                Some(Num::Int(i)) => Ok(i),
                _ => Err(ScriptError::Type(format!(
                    "range() arguments must be integers, not '{}'",
                    type_name(a)
                ))),
            })
            .collect::<Result<_, _>>()?;
        let (start, stop, step) = match ints.as_slice() {
            [stop] => (0, *stop, 1),
            [start, stop] => (*start, *stop, 1),
            [start, stop, step] => (*start, *stop, *step),
            _ => {
                return Err(ScriptError::Type(
                    "range expected 1 to 3 arguments".to_string(),
                ));
            }
        };
        if step == 0 {
            return Err(ScriptError::Runtime("range() arg 3 must not be zero".to_string()));
        }
        let span = if step > 0 {
            stop.saturating_sub(start)
        } else {
            start.saturating_sub(stop)
        };
        let count = if span <= 0 {
            0
        } else {
            (span - 1) / step.saturating_abs() + 1
        };
        if count > MAX_RANGE_LEN {
            return Err(ScriptError::Runtime(format!(
                "range() of {} items is too large",
                count
            )));
        }
        let items = (0..count)
            .map(|i| Value::from(start + i * step))
            .collect();
        Ok(Value::Array(items))
    });
}

fn extreme(args: &[Value], name: &str, wanted: Ordering) -> Result<Value, ScriptError> {
    let candidates: Vec<Value> = match args {
        [Value::Array(items)] => items.clone(),
        [single] => ops::iterate(single)?,
        many => many.to_vec(),
    };
    let mut best: Option<Value> = None;
    for candidate in candidates {
        best = Some(match best {
            None => candidate,
            Some(current) => {
                if compare(&candidate, &current)? == wanted {
                    candidate
                } else {
                    current
                }
            }
        });
    }
    best.ok_or_else(|| ScriptError::Runtime(format!("{}() arg is an empty sequence", name)))
}

// =============================================================================
// ARGUMENT HELPERS
// =============================================================================

fn arg<'a>(args: &'a [Value], index: usize, function: &str) -> Result<&'a Value, ScriptError> {
    args.get(index).ok_or_else(|| {
        ScriptError::Type(format!(
            "{}() missing required argument {}",
            function,
            index + 1
        ))
    })
}

fn text_arg(args: &[Value], index: usize) -> Option<String> {
    args.get(index).map(to_display)
}

fn number_arg(value: &Value, function: &str) -> Result<f64, ScriptError> {
    as_num(value).map(Num::as_f64).ok_or_else(|| {
        ScriptError::Type(format!(
            "{}() expected a number, got '{}'",
            function,
            type_name(value)
        ))
    })
}

fn floats_arg(value: &Value, function: &str) -> Result<Vec<f64>, ScriptError> {
    match value {
        Value::Array(items) => items.iter().map(|v| number_arg(v, function)).collect(),
        other => Err(ScriptError::Type(format!(
            "{}() expected a list of numbers, got '{}'",
            function,
            type_name(other)
        ))),
    }
}

fn object_arg<'a>(value: &'a Value, function: &str) -> Result<&'a Map<String, Value>, ScriptError> {
    value.as_object().ok_or_else(|| {
        ScriptError::Type(format!(
            "{}() expected attribute data, got '{}'",
            function,
            type_name(value)
        ))
    })
}

fn floats_value(values: &[f64]) -> Result<Value, ScriptError> {
    values
        .iter()
        .map(|f| float(*f))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn curve_points(data: &Value) -> Result<Vec<Vec<f64>>, ScriptError> {
    let data = object_arg(data, "curve")?;
    match data.get("cvs") {
        Some(Value::Array(points)) => points.iter().map(|p| floats_arg(p, "curve")).collect(),
        _ => Err(ScriptError::Type("curve data has no 'cvs' list".to_string())),
    }
}

fn short_curve() -> ScriptError {
    ScriptError::Runtime("curve needs at least four control points".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        lines: Mutex<Vec<String>>,
    }

    impl HostReporter for Recorder {
        fn print(&self, text: &str) {
            if let Ok(mut lines) = self.lines.lock() {
                lines.push(text.to_string());
            }
        }

        fn warning(&self, text: &str) {
            if let Ok(mut lines) = self.lines.lock() {
                lines.push(format!("warning: {}", text));
            }
        }
    }

    fn api() -> Api {
        Api::standard(Arc::new(TracingReporter))
    }

    #[test]
    fn standard_table_has_core_names() {
        let api = api();
        for name in [
            "copyJson",
            "exit",
            "error",
            "warning",
            "clamp",
            "listLerp",
            "smartConversion",
            "fromSmartConversion",
            "curve_evaluate",
            "curve_evaluateFromX",
            "listBox_selected",
            "listBox_setSelected",
            "comboBox_items",
            "comboBox_setItems",
            "beginProgress",
            "stepProgress",
            "endProgress",
        ] {
            assert!(api.contains(name), "missing {}", name);
        }
    }

    #[test]
    fn exit_and_error_signal() {
        let api = api();
        assert_eq!(api.call("exit", &[]), Err(ScriptError::Exit));
        assert_eq!(
            api.call("error", &[json!("bad rig")]),
            Err(ScriptError::Raised("bad rig".to_string()))
        );
    }

    #[test]
    fn clamp_orders_like_max_of_min() {
        let api = api();
        assert_eq!(api.call("clamp", &[json!(5), json!(0), json!(3)]), Ok(json!(3)));
        assert_eq!(api.call("clamp", &[json!(-1), json!(0), json!(3)]), Ok(json!(0)));
        assert_eq!(api.call("clamp", &[json!(1.5), json!(0), json!(3)]), Ok(json!(1.5)));
    }

    #[test]
    fn list_box_helpers() {
        let api = api();
        let data = json!({"items": ["a", "b", "c"], "selected": [0, 2, 9]});
        assert_eq!(api.call("listBox_selected", &[data.clone()]), Ok(json!(["a", "c"])));
        let updated = api
            .call("listBox_setSelected", &[data, json!([1])])
            .expect("set");
        assert_eq!(updated["selected"], json!([1]));
    }

    #[test]
    fn combo_box_helpers() {
        let api = api();
        let data = json!({"items": ["x"], "current": "x", "default": "current"});
        assert_eq!(api.call("comboBox_items", &[data.clone()]), Ok(json!(["x"])));
        let updated = api
            .call("comboBox_setItems", &[data, json!(["y", "z"])])
            .expect("set");
        assert_eq!(updated["items"], json!(["y", "z"]));
        assert_eq!(updated["current"], json!("x"));
    }

    #[test]
    fn curve_helpers_read_cvs() {
        let api = api();
        let data = json!({"cvs": [[0, 0], [0.25, 0.25], [0.75, 0.75], [1, 1]]});
        let p = api
            .call("curve_evaluate", &[data.clone(), json!(1)])
            .expect("evaluate");
        assert_eq!(p, json!([1.0, 1.0]));
        assert!(api.call("curve_evaluateFromX", &[data, json!(0.5)]).is_ok());
        assert!(api.call("curve_evaluate", &[json!({}), json!(0)]).is_err());
    }

    #[test]
    fn builtins() {
        let api = api();
        assert_eq!(api.call("len", &[json!([1, 2])]), Ok(json!(2)));
        assert_eq!(api.call("str", &[json!(1.0)]), Ok(json!("1.0")));
        assert_eq!(api.call("int", &[json!("42")]), Ok(json!(42)));
        assert_eq!(api.call("int", &[json!(-2.7)]), Ok(json!(-2)));
        assert_eq!(api.call("float", &[json!(2)]), Ok(json!(2.0)));
        assert_eq!(api.call("round", &[json!(2.5)]), Ok(json!(2)));
        assert_eq!(api.call("min", &[json!([3, 1, 2])]), Ok(json!(1)));
        assert_eq!(api.call("max", &[json!(3), json!(7)]), Ok(json!(7)));
        assert_eq!(api.call("range", &[json!(3)]), Ok(json!([0, 1, 2])));
        assert_eq!(api.call("range", &[json!(5), json!(0), json!(-2)]), Ok(json!([5, 3, 1])));
        assert!(api.call("range", &[json!(0), json!(1), json!(0)]).is_err());
    }

    #[test]
    fn print_and_warning_go_to_reporter() {
        let recorder = Arc::new(Recorder::default());
        let api = Api::standard(recorder.clone());
        api.call("print", &[json!("a"), json!(1)]).expect("print");
        api.call("warning", &[json!("careful")]).expect("warning");
        let lines = recorder.lines.lock().expect("lock").clone();
        assert_eq!(lines, vec!["a 1".to_string(), "warning: careful".to_string()]);
    }

    #[test]
    fn hosts_can_register_functions() {
        let mut api = Api::new();
        api.register("double", |args| {
            let n = args.first().and_then(Value::as_i64).unwrap_or(0);
            Ok(json!(n * 2))
        });
        assert_eq!(api.call("double", &[json!(4)]), Ok(json!(8)));
        assert_eq!(
            api.call("missing", &[]),
            Err(ScriptError::Name("missing".to_string()))
        );
        assert_eq!(api.names().collect::<Vec<_>>(), vec!["double"]);
    }
}

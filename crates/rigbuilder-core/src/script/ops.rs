//! # Value Operations
//!
//! Arithmetic, comparison, truthiness and built-in methods over JSON values.
//!
//! Integers stay integers (`i64`, checked); `/` always yields a float.
//! Booleans take part in arithmetic as 0/1. Every float result must be
//! finite because JSON cannot carry NaN or infinity.

use super::ScriptError;
use super::ast::BinOp;
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

// =============================================================================
// NUMBERS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }
}

/// Numeric view of a value; booleans count as 0/1.
#[must_use]
pub fn as_num(value: &Value) -> Option<Num> {
    match value {
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        Value::Number(n) => n
            .as_i64()
            .map(Num::Int)
            .or_else(|| n.as_f64().map(Num::Float)),
        _ => None,
    }
}

/// Wrap a float, rejecting NaN and infinities.
pub fn float(f: f64) -> Result<Value, ScriptError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| ScriptError::Runtime(format!("float result {} is not finite", f)))
}

fn num_value(n: Num) -> Result<Value, ScriptError> {
    match n {
        Num::Int(i) => Ok(Value::from(i)),
        Num::Float(f) => float(f),
    }
}

fn overflow() -> ScriptError {
    ScriptError::Runtime("integer overflow".to_string())
}

fn zero_division() -> ScriptError {
    ScriptError::Runtime("division by zero".to_string())
}

/// Python-style type name, used in error messages.
#[must_use]
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

#[must_use]
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

// =============================================================================
// BINARY OPERATORS
// =============================================================================

fn unsupported(op: BinOp, a: &Value, b: &Value) -> ScriptError {
    ScriptError::Type(format!(
        "unsupported operand types for {:?}: '{}' and '{}'",
        op,
        type_name(a),
        type_name(b)
    ))
}

fn repeat<T: Clone>(items: &[T], times: i64) -> Vec<T> {
    let times = usize::try_from(times).unwrap_or(0);
    let mut out = Vec::with_capacity(items.len().saturating_mul(times));
    for _ in 0..times {
        out.extend_from_slice(items);
    }
    out
}

fn floor_div_int(a: i64, b: i64) -> Result<i64, ScriptError> {
    if b == 0 {
        return Err(zero_division());
    }
    let q = a.checked_div(b).ok_or_else(overflow)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

fn mod_int(a: i64, b: i64) -> Result<i64, ScriptError> {
    if b == 0 {
        return Err(zero_division());
    }
    let r = a.checked_rem(b).ok_or_else(overflow)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

fn arithmetic(op: BinOp, x: Num, y: Num) -> Result<Num, ScriptError> {
    use Num::{Float, Int};
    let result = match (op, x, y) {
        (BinOp::Add, Int(a), Int(b)) => Int(a.checked_add(b).ok_or_else(overflow)?),
        (BinOp::Sub, Int(a), Int(b)) => Int(a.checked_sub(b).ok_or_else(overflow)?),
        (BinOp::Mul, Int(a), Int(b)) => Int(a.checked_mul(b).ok_or_else(overflow)?),
        (BinOp::FloorDiv, Int(a), Int(b)) => Int(floor_div_int(a, b)?),
        (BinOp::Mod, Int(a), Int(b)) => Int(mod_int(a, b)?),
        (BinOp::Pow, Int(a), Int(b)) if b >= 0 => {
            let exp = u32::try_from(b).map_err(|_| overflow())?;
            Int(a.checked_pow(exp).ok_or_else(overflow)?)
        }
        (BinOp::Div, _, _) => {
            let d = y.as_f64();
            if d == 0.0 {
                return Err(zero_division());
            }
            Float(x.as_f64() / d)
        }
        (op, x, y) => {
            let (a, b) = (x.as_f64(), y.as_f64());
            match op {
                BinOp::Add => Float(a + b),
                BinOp::Sub => Float(a - b),
                BinOp::Mul => Float(a * b),
                BinOp::Pow => Float(a.powf(b)),
                BinOp::FloorDiv => {
                    if b == 0.0 {
                        return Err(zero_division());
                    }
                    Float((a / b).floor())
                }
                BinOp::Mod => {
                    if b == 0.0 {
                        return Err(zero_division());
                    }
                    Float(a - b * (a / b).floor())
                }
                _ => {
                    return Err(ScriptError::Type(format!(
                        "{:?} is not an arithmetic operator",
                        op
                    )));
                }
            }
        }
    };
    Ok(result)
}

/// Apply a non-logical binary operator.
pub fn binary(op: BinOp, a: &Value, b: &Value) -> Result<Value, ScriptError> {
    match op {
        BinOp::Eq => return Ok(Value::Bool(values_equal(a, b))),
        BinOp::NotEq => return Ok(Value::Bool(!values_equal(a, b))),
        BinOp::Lt => return Ok(Value::Bool(compare(a, b)? == Ordering::Less)),
        BinOp::Le => return Ok(Value::Bool(compare(a, b)? != Ordering::Greater)),
        BinOp::Gt => return Ok(Value::Bool(compare(a, b)? == Ordering::Greater)),
        BinOp::Ge => return Ok(Value::Bool(compare(a, b)? != Ordering::Less)),
        BinOp::In => return Ok(Value::Bool(contains(b, a)?)),
        BinOp::NotIn => return Ok(Value::Bool(!contains(b, a)?)),
        _ => {}
    }

    if let (Some(x), Some(y)) = (as_num(a), as_num(b)) {
        return num_value(arithmetic(op, x, y)?);
    }

    match (op, a, b) {
        (BinOp::Add, Value::String(x), Value::String(y)) => Ok(Value::String(format!("{}{}", x, y))),
        (BinOp::Add, Value::Array(x), Value::Array(y)) => {
            let mut out = x.clone();
            out.extend(y.iter().cloned());
            Ok(Value::Array(out))
        }
        (BinOp::Mul, Value::String(s), n) | (BinOp::Mul, n, Value::String(s)) => match as_num(n) {
            Some(Num::Int(times)) => Ok(Value::String(s.repeat(usize::try_from(times).unwrap_or(0)))),
            _ => Err(unsupported(op, a, b)),
        },
        (BinOp::Mul, Value::Array(items), n) | (BinOp::Mul, n, Value::Array(items)) => {
            match as_num(n) {
                Some(Num::Int(times)) => Ok(Value::Array(repeat(items, times))),
                _ => Err(unsupported(op, a, b)),
            }
        }
        (BinOp::Mod, Value::String(fmt), arg) => Ok(Value::String(percent_format(fmt, arg))),
        _ => Err(unsupported(op, a, b)),
    }
}

/// Minimal `%` string formatting: each `%s`/`%d`/`%f` takes the next argument.
fn percent_format(fmt: &str, arg: &Value) -> String {
    let args: Vec<&Value> = match arg {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    let mut args = args.into_iter();
    let mut out = String::new();
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s' | 'd' | 'f' | 'r') => {
                if let Some(v) = args.next() {
                    out.push_str(&to_display(v));
                }
            }
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}

/// Equality with `1 == 1.0` and `True == 1` semantics, recursively.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(p, q)| values_equal(p, q))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).map(|w| values_equal(v, w)).unwrap_or(false))
        }
        _ => match (as_num(a), as_num(b)) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => x == y,
            (Some(x), Some(y)) => x.as_f64() == y.as_f64(),
            _ => a == b,
        },
    }
}

/// Ordering for `<`, `<=`, `>`, `>=`, `min`, `max`.
pub fn compare(a: &Value, b: &Value) -> Result<Ordering, ScriptError> {
    if let (Some(x), Some(y)) = (as_num(a), as_num(b)) {
        return match (x, y) {
            (Num::Int(p), Num::Int(q)) => Ok(p.cmp(&q)),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .ok_or_else(|| ScriptError::Runtime("cannot order NaN".to_string())),
        };
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (Value::Array(x), Value::Array(y)) => {
            for (p, q) in x.iter().zip(y) {
                let ord = compare(p, q)?;
                if ord != Ordering::Equal {
                    return Ok(ord);
                }
            }
            Ok(x.len().cmp(&y.len()))
        }
        _ => Err(ScriptError::Type(format!(
            "'<' not supported between '{}' and '{}'",
            type_name(a),
            type_name(b)
        ))),
    }
}

/// `item in container`
pub fn contains(container: &Value, item: &Value) -> Result<bool, ScriptError> {
    match container {
        Value::Array(items) => Ok(items.iter().any(|v| values_equal(v, item))),
        Value::Object(map) => match item {
            Value::String(key) => Ok(map.contains_key(key)),
            _ => Ok(false),
        },
        Value::String(s) => match item {
            Value::String(sub) => Ok(s.contains(sub.as_str())),
            _ => Err(ScriptError::Type(format!(
                "'in <string>' requires string as left operand, not {}",
                type_name(item)
            ))),
        },
        _ => Err(ScriptError::Type(format!(
            "argument of type '{}' is not iterable",
            type_name(container)
        ))),
    }
}

/// Unary minus.
pub fn negate(value: &Value) -> Result<Value, ScriptError> {
    match as_num(value) {
        Some(Num::Int(i)) => Ok(Value::from(i.checked_neg().ok_or_else(overflow)?)),
        Some(Num::Float(f)) => float(-f),
        None => Err(ScriptError::Type(format!(
            "bad operand type for unary -: '{}'",
            type_name(value)
        ))),
    }
}

// =============================================================================
// INDEXING
// =============================================================================

fn list_position(len: usize, index: &Value) -> Result<usize, ScriptError> {
    let Some(Num::Int(i)) = as_num(index) else {
        return Err(ScriptError::Type(format!(
            "list indices must be integers, not {}",
            type_name(index)
        )));
    };
    let len_i = i64::try_from(len).map_err(|_| overflow())?;
    let pos = if i < 0 { i + len_i } else { i };
    if pos < 0 || pos >= len_i {
        return Err(ScriptError::Runtime("list index out of range".to_string()));
    }
    usize::try_from(pos).map_err(|_| overflow())
}

fn map_key(index: &Value) -> Result<&str, ScriptError> {
    index.as_str().ok_or_else(|| {
        ScriptError::Type(format!("dict keys must be strings, not {}", type_name(index)))
    })
}

/// `container[index]`
pub fn get_index(container: &Value, index: &Value) -> Result<Value, ScriptError> {
    match container {
        Value::Array(items) => Ok(items[list_position(items.len(), index)?].clone()),
        Value::Object(map) => {
            let key = map_key(index)?;
            map.get(key)
                .cloned()
                .ok_or_else(|| ScriptError::Runtime(format!("KeyError: '{}'", key)))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let pos = list_position(chars.len(), index)?;
            Ok(Value::String(chars[pos].to_string()))
        }
        other => Err(ScriptError::Type(format!(
            "'{}' object is not subscriptable",
            type_name(other)
        ))),
    }
}

/// `container[index] = value`
pub fn set_index(container: &mut Value, index: &Value, value: Value) -> Result<(), ScriptError> {
    match container {
        Value::Array(items) => {
            let pos = list_position(items.len(), index)?;
            items[pos] = value;
            Ok(())
        }
        Value::Object(map) => {
            let key = map_key(index)?;
            map.insert(key.to_string(), value);
            Ok(())
        }
        other => Err(ScriptError::Type(format!(
            "'{}' object does not support item assignment",
            type_name(other)
        ))),
    }
}

/// Iterate a value with `for`: list items, map keys or string characters.
pub fn iterate(value: &Value) -> Result<Vec<Value>, ScriptError> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::Object(map) => Ok(map.keys().map(|k| Value::String(k.clone())).collect()),
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        other => Err(ScriptError::Type(format!(
            "'{}' object is not iterable",
            type_name(other)
        ))),
    }
}

// =============================================================================
// DISPLAY
// =============================================================================

fn float_repr(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

/// `repr()`-style text: strings are quoted.
#[must_use]
pub fn repr(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        other => to_display(other),
    }
}

/// `str()`-style text.
#[must_use]
pub fn to_display(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => n
                .as_f64()
                .map(float_repr)
                .unwrap_or_else(|| n.to_string()),
        },
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(repr).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Object(map) => {
            let inner: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("'{}': {}", k, repr(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}

// =============================================================================
// VALUE METHODS
// =============================================================================

/// Whether `method` changes its receiver (so the receiver must be stored back).
#[must_use]
pub fn is_mutating(method: &str) -> bool {
    matches!(method, "append" | "extend" | "insert" | "pop" | "update")
}

fn arity(method: &str, args: &[Value], min: usize, max: usize) -> Result<(), ScriptError> {
    if args.len() < min || args.len() > max {
        return Err(ScriptError::Type(format!(
            "{}() takes {} to {} arguments ({} given)",
            method,
            min,
            max,
            args.len()
        )));
    }
    Ok(())
}

fn str_arg<'a>(method: &str, value: &'a Value) -> Result<&'a str, ScriptError> {
    value.as_str().ok_or_else(|| {
        ScriptError::Type(format!(
            "{}() argument must be str, not {}",
            method,
            type_name(value)
        ))
    })
}

fn no_method(receiver: &Value, method: &str) -> ScriptError {
    ScriptError::Type(format!(
        "'{}' object has no method '{}'",
        type_name(receiver),
        method
    ))
}

/// Call a built-in method on a value. Mutating methods change `receiver`.
pub fn call_method(
    receiver: &mut Value,
    method: &str,
    args: Vec<Value>,
) -> Result<Value, ScriptError> {
    match receiver {
        Value::Array(items) => list_method(items, method, args),
        Value::Object(map) => map_method(map, method, args),
        Value::String(s) => string_method(s, method, args),
        other => Err(no_method(other, method)),
    }
}

fn list_method(items: &mut Vec<Value>, method: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
    match method {
        "append" => {
            arity(method, &args, 1, 1)?;
            items.extend(args);
            Ok(Value::Null)
        }
        "extend" => {
            arity(method, &args, 1, 1)?;
            let extra = iterate(&args[0])?;
            items.extend(extra);
            Ok(Value::Null)
        }
        "insert" => {
            arity(method, &args, 2, 2)?;
            let Some(Num::Int(i)) = as_num(&args[0]) else {
                return Err(ScriptError::Type("insert() index must be an integer".to_string()));
            };
            let len = i64::try_from(items.len()).map_err(|_| overflow())?;
            let pos = if i < 0 { (i + len).max(0) } else { i.min(len) };
            let pos = usize::try_from(pos).map_err(|_| overflow())?;
            items.insert(pos, args[1].clone());
            Ok(Value::Null)
        }
        "pop" => {
            arity(method, &args, 0, 1)?;
            if items.is_empty() {
                return Err(ScriptError::Runtime("pop from empty list".to_string()));
            }
            let pos = match args.first() {
                Some(index) => list_position(items.len(), index)?,
                None => items.len() - 1,
            };
            Ok(items.remove(pos))
        }
        "index" => {
            arity(method, &args, 1, 1)?;
            items
                .iter()
                .position(|v| values_equal(v, &args[0]))
                .map(|p| Value::from(p as u64))
                .ok_or_else(|| {
                    ScriptError::Runtime(format!("{} is not in list", repr(&args[0])))
                })
        }
        _ => Err(no_method(&Value::Array(Vec::new()), method)),
    }
}

fn map_method(
    map: &mut Map<String, Value>,
    method: &str,
    args: Vec<Value>,
) -> Result<Value, ScriptError> {
    match method {
        "keys" => {
            arity(method, &args, 0, 0)?;
            Ok(Value::Array(map.keys().map(|k| Value::String(k.clone())).collect()))
        }
        "values" => {
            arity(method, &args, 0, 0)?;
            Ok(Value::Array(map.values().cloned().collect()))
        }
        "items" => {
            arity(method, &args, 0, 0)?;
            Ok(Value::Array(
                map.iter()
                    .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.clone()]))
                    .collect(),
            ))
        }
        "get" => {
            arity(method, &args, 1, 2)?;
            let key = str_arg(method, &args[0])?;
            Ok(map
                .get(key)
                .cloned()
                .or_else(|| args.get(1).cloned())
                .unwrap_or(Value::Null))
        }
        "update" => {
            arity(method, &args, 1, 1)?;
            match &args[0] {
                Value::Object(other) => {
                    for (k, v) in other {
                        map.insert(k.clone(), v.clone());
                    }
                    Ok(Value::Null)
                }
                other => Err(ScriptError::Type(format!(
                    "update() argument must be dict, not {}",
                    type_name(other)
                ))),
            }
        }
        _ => Err(no_method(&Value::Object(Map::new()), method)),
    }
}

fn string_method(s: &mut String, method: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
    let out = match method {
        "upper" => Value::String(s.to_uppercase()),
        "lower" => Value::String(s.to_lowercase()),
        "strip" => Value::String(s.trim().to_string()),
        "split" => {
            arity(method, &args, 0, 1)?;
            let parts: Vec<Value> = match args.first() {
                Some(sep) => {
                    let sep = str_arg(method, sep)?;
                    if sep.is_empty() {
                        return Err(ScriptError::Runtime("empty separator".to_string()));
                    }
                    s.split(sep).map(|p| Value::String(p.to_string())).collect()
                }
                None => s
                    .split_whitespace()
                    .map(|p| Value::String(p.to_string()))
                    .collect(),
            };
            Value::Array(parts)
        }
        "startswith" => {
            arity(method, &args, 1, 1)?;
            Value::Bool(s.starts_with(str_arg(method, &args[0])?))
        }
        "endswith" => {
            arity(method, &args, 1, 1)?;
            Value::Bool(s.ends_with(str_arg(method, &args[0])?))
        }
        "replace" => {
            arity(method, &args, 2, 2)?;
            let from = str_arg(method, &args[0])?;
            let to = str_arg(method, &args[1])?;
            Value::String(s.replace(from, to))
        }
        "join" => {
            arity(method, &args, 1, 1)?;
            let parts = iterate(&args[0])?;
            let texts: Vec<String> = parts.iter().map(to_display).collect();
            Value::String(texts.join(s.as_str()))
        }
        _ => return Err(no_method(&Value::String(String::new()), method)),
    };
    Ok(out)
}

/*
 * value.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Runtime values and the variable bindings a template is rendered against.
//!
//! The engine does not know anything about the host program's object model.
//! Host data enters either as plain [`Value`]s (strings, integers, lists,
//! maps, ...) or as [`HostObject`]s, whose members are reached through a
//! [`MemberResolver`](crate::resolver::MemberResolver).

use indexmap::IndexMap;
use std::any::Any;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// An opaque value owned by the host program.
///
/// The engine only needs a type name (used to pick the descriptor table that
/// resolves members), a textual rendering, and downcasting for invokers.
pub trait HostObject: Any + fmt::Debug + fmt::Display + Send + Sync {
    /// Name of the host type; descriptor tables are registered under it.
    fn type_name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;

    /// Same-type equality. Objects are always equal to themselves.
    fn equals(&self, _other: &dyn HostObject) -> bool {
        false
    }
}

/// Primitive kinds taking part in argument widening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveType {
    /// Position in the numeric widening order, if numeric.
    fn numeric_rank(self) -> Option<u8> {
        match self {
            PrimitiveType::Byte => Some(0),
            PrimitiveType::Short => Some(1),
            PrimitiveType::Int => Some(2),
            PrimitiveType::Long => Some(3),
            PrimitiveType::Float => Some(4),
            PrimitiveType::Double => Some(5),
            PrimitiveType::Boolean | PrimitiveType::Char => None,
        }
    }

    /// Whether a value of type `from` may be passed where `self` is expected.
    ///
    /// Identity is always allowed. `char` widens to `int` and anything wider;
    /// the numeric kinds widen along byte, short, int, long, float, double.
    pub fn is_assignable_from(self, from: PrimitiveType) -> bool {
        if self == from {
            return true;
        }
        let Some(to_rank) = self.numeric_rank() else {
            return false;
        };
        if from == PrimitiveType::Char {
            return to_rank >= 2;
        }
        match from.numeric_rank() {
            Some(from_rank) => to_rank >= from_rank,
            None => false,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Byte => "byte",
            PrimitiveType::Short => "short",
            PrimitiveType::Char => "char",
            PrimitiveType::Int => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
        }
    }
}

/// A value that can be used in template evaluation.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// A null value (distinct from an undefined variable).
    #[default]
    Null,
    Bool(bool),
    Char(char),
    Byte(i8),
    Short(i16),
    /// Integer literals and all template arithmetic use this kind.
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    List(Vec<Value>),
    /// A mapping; iteration follows insertion order.
    Map(IndexMap<String, Value>),
    Object(Arc<dyn HostObject>),
}

impl Value {
    /// Wrap a host object.
    pub fn object<T: HostObject>(object: T) -> Self {
        Value::Object(Arc::new(object))
    }

    /// Runtime type name, used for descriptor lookup and diagnostics.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "Boolean",
            Value::Char(_) => "Character",
            Value::Byte(_) => "Byte",
            Value::Short(_) => "Short",
            Value::Int(_) => "Integer",
            Value::Long(_) => "Long",
            Value::Float(_) => "Float",
            Value::Double(_) => "Double",
            Value::String(_) => "String",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Object(object) => object.type_name(),
        }
    }

    /// The primitive kind of a boxed primitive value.
    pub fn primitive_type(&self) -> Option<PrimitiveType> {
        match self {
            Value::Bool(_) => Some(PrimitiveType::Boolean),
            Value::Char(_) => Some(PrimitiveType::Char),
            Value::Byte(_) => Some(PrimitiveType::Byte),
            Value::Short(_) => Some(PrimitiveType::Short),
            Value::Int(_) => Some(PrimitiveType::Int),
            Value::Long(_) => Some(PrimitiveType::Long),
            Value::Float(_) => Some(PrimitiveType::Float),
            Value::Double(_) => Some(PrimitiveType::Double),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value is "truthy" for conditional evaluation.
    ///
    /// Falsy values are null, `false`, the empty string, and empty lists
    /// and maps. Everything else, including the integer 0, is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(m) => !m.is_empty(),
            _ => true,
        }
    }

    fn same_runtime_type(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => a.type_name() == b.type_name(),
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }

    /// Template `==`.
    ///
    /// Values of the same runtime type compare structurally. Values of
    /// different types are equal when their textual renderings are, so
    /// `123 == "123"` holds. The relation is not transitive.
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            _ if self.same_runtime_type(other) => self == other,
            _ => self.to_string() == other.to_string(),
        }
    }

    /// Template `<`. Only values of the same comparable type can be ordered.
    pub fn less_than(&self, other: &Value) -> Result<bool, String> {
        let ordering = match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Char(a), Value::Char(b)) => a.cmp(b),
            (Value::Byte(a), Value::Byte(b)) => a.cmp(b),
            (Value::Short(a), Value::Short(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Long(a), Value::Long(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Null, _) | (Value::List(_), _) | (Value::Map(_), _) | (Value::Object(_), _) => {
                return Err(format!("Not comparable: {}", self.describe()));
            }
            _ => {
                return Err(format!(
                    "Cannot compare objects not of same class: {} versus {}",
                    self.describe(),
                    other.describe()
                ));
            }
        };
        Ok(ordering == Ordering::Less)
    }

    /// Rendering used in diagnostics: the value followed by its type.
    pub fn describe(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            _ => format!("{} (a {})", self, self.type_name()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Short(a), Value::Short(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => {
                Arc::ptr_eq(a, b) || (a.type_name() == b.type_name() && a.equals(b.as_ref()))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Char(c) => write!(f, "{c}"),
            Value::Byte(n) => write!(f, "{n}"),
            Value::Short(n) => write!(f, "{n}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Long(n) => write!(f, "{n}"),
            Value::Float(n) => write_floating(f, f64::from(*n), &format!("{n:e}")),
            Value::Double(n) => write_floating(f, *n, &format!("{n:e}")),
            Value::String(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}={value}")?;
                }
                f.write_str("}")
            }
            Value::Object(object) => write!(f, "{object}"),
        }
    }
}

/// Render a floating-point number the way the JVM's `toString` does: plain
/// decimals with at least one fractional digit when `1e-3 <= |x| < 1e7`,
/// otherwise `d.dddE<exp>`. `scientific` is the shortest `{:e}` rendering of
/// the value at its own precision.
fn write_floating(f: &mut fmt::Formatter<'_>, value: f64, scientific: &str) -> fmt::Result {
    if value.is_nan() {
        return f.write_str("NaN");
    }
    if value.is_infinite() {
        return f.write_str(if value > 0.0 { "Infinity" } else { "-Infinity" });
    }
    if value == 0.0 {
        return f.write_str(if value.is_sign_negative() { "-0.0" } else { "0.0" });
    }

    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let fraction_or_zero = |fraction: &str| {
        if fraction.is_empty() { "0".to_string() } else { fraction.to_string() }
    };

    if !(1e-3..1e7).contains(&value.abs()) {
        let (first, rest) = digits.split_at(digits.len().min(1));
        return write!(f, "{sign}{first}.{}E{exponent}", fraction_or_zero(rest));
    }
    match usize::try_from(exponent) {
        Ok(point) => {
            let point = point + 1;
            let (whole, fraction) = digits.split_at(digits.len().min(point));
            write!(f, "{sign}{whole:0<point$}.{}", fraction_or_zero(fraction))
        }
        Err(_) => {
            let zeros = "0".repeat(usize::try_from(-exponent - 1).unwrap_or(0));
            write!(f, "{sign}0.{zeros}{digits}")
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Char(c)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(entries: IndexMap<String, Value>) -> Self {
        Value::Map(entries)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    i32::try_from(i).map_or(Value::Long(i), Value::Int)
                } else {
                    n.as_f64().map_or(Value::Null, Value::Double)
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// The caller-supplied variables a template is rendered against.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: HashMap<String, Value>,
}

impl Variables {
    /// Create a new empty set of variables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a variable.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Build variables from a JSON object. Non-object JSON yields no variables.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Object(entries) => entries
                .into_iter()
                .map(|(k, v)| (k, Value::from(v)))
                .collect(),
            _ => Self::new(),
        }
    }

    pub(crate) fn to_map(&self) -> HashMap<String, Value> {
        self.values.clone()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Variables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl From<HashMap<String, Value>> for Variables {
    fn from(values: HashMap<String, Value>) -> Self {
        Self { values }
    }
}

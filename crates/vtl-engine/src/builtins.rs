/*
 * builtins.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Descriptor tables for the built-in value types.
//!
//! Method names and overloads follow the familiar `java.lang.String`,
//! `java.util.List` and `java.util.Map` surface that templates written for
//! Velocity expect (`$s.length()`, `$list.size()`, `$map.containsKey("k")`).
//! String positions count characters.

use crate::resolver::{TypeDescriptor, TypeRegistry, ValueType, map_key};
use crate::value::{PrimitiveType, Value};

const BOOLEAN: ValueType = ValueType::Primitive(PrimitiveType::Boolean);
const CHAR: ValueType = ValueType::Primitive(PrimitiveType::Char);
const INT: ValueType = ValueType::Primitive(PrimitiveType::Int);

/// Add the `String`, `List` and `Map` tables to `registry`.
pub fn register_standard(registry: &mut TypeRegistry) {
    registry
        .register(string_type())
        .register(list_type())
        .register(map_type());
}

fn string_type() -> TypeDescriptor {
    TypeDescriptor::new("String")
        .method("length", vec![], INT, |s, _| Ok(len(str_of(s)?).into()))
        .method("isEmpty", vec![], BOOLEAN, |s, _| {
            Ok(str_of(s)?.is_empty().into())
        })
        .method("charAt", vec![INT], CHAR, |s, args| {
            let s = str_of(s)?;
            let i = int_arg(args, 0)?;
            usize::try_from(i)
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map(Value::Char)
                .ok_or_else(|| format!("String index out of range: {i}"))
        })
        .method("indexOf", vec![ValueType::String], INT, |s, args| {
            Ok(index_of(str_of(s)?, str_arg(args, 0)?, 0).into())
        })
        .method("indexOf", vec![ValueType::String, INT], INT, |s, args| {
            Ok(index_of(str_of(s)?, str_arg(args, 0)?, int_arg(args, 1)?).into())
        })
        .method("substring", vec![INT], ValueType::String, |s, args| {
            let s = str_of(s)?;
            substring(s, int_arg(args, 0)?, len(s))
        })
        .method("substring", vec![INT, INT], ValueType::String, |s, args| {
            substring(str_of(s)?, int_arg(args, 0)?, int_arg(args, 1)?)
        })
        .method("startsWith", vec![ValueType::String], BOOLEAN, |s, args| {
            Ok(str_of(s)?.starts_with(str_arg(args, 0)?).into())
        })
        .method("endsWith", vec![ValueType::String], BOOLEAN, |s, args| {
            Ok(str_of(s)?.ends_with(str_arg(args, 0)?).into())
        })
        .method("contains", vec![ValueType::String], BOOLEAN, |s, args| {
            Ok(str_of(s)?.contains(str_arg(args, 0)?).into())
        })
        .method("toUpperCase", vec![], ValueType::String, |s, _| {
            Ok(str_of(s)?.to_uppercase().into())
        })
        .method("toLowerCase", vec![], ValueType::String, |s, _| {
            Ok(str_of(s)?.to_lowercase().into())
        })
        .method("trim", vec![], ValueType::String, |s, _| {
            Ok(str_of(s)?.trim().into())
        })
        .method(
            "replace",
            vec![ValueType::String, ValueType::String],
            ValueType::String,
            |s, args| Ok(str_of(s)?.replace(str_arg(args, 0)?, str_arg(args, 1)?).into()),
        )
        .method("equals", vec![ValueType::Any], BOOLEAN, |s, args| {
            Ok(matches!(args.first(), Some(Value::String(other)) if other == str_of(s)?).into())
        })
}

fn list_type() -> TypeDescriptor {
    TypeDescriptor::new("List")
        .method("size", vec![], INT, |l, _| Ok(len_of(list_of(l)?.len()).into()))
        .method("isEmpty", vec![], BOOLEAN, |l, _| {
            Ok(list_of(l)?.is_empty().into())
        })
        .method("get", vec![INT], ValueType::Any, |l, args| {
            let items = list_of(l)?;
            let i = int_arg(args, 0)?;
            usize::try_from(i)
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .ok_or_else(|| format!("Index {i} out of bounds for length {}", items.len()))
        })
        .method("contains", vec![ValueType::Any], BOOLEAN, |l, args| {
            let needle = arg(args, 0)?;
            Ok(list_of(l)?.contains(needle).into())
        })
        .method("indexOf", vec![ValueType::Any], INT, |l, args| {
            let needle = arg(args, 0)?;
            let position = list_of(l)?.iter().position(|item| item == needle);
            Ok(position.map_or(-1, len_of).into())
        })
}

fn map_type() -> TypeDescriptor {
    TypeDescriptor::new("Map")
        .method("size", vec![], INT, |m, _| Ok(len_of(map_of(m)?.len()).into()))
        .method("isEmpty", vec![], BOOLEAN, |m, _| {
            Ok(map_of(m)?.is_empty().into())
        })
        .method("get", vec![ValueType::Any], ValueType::Any, |m, args| {
            let key = map_key(arg(args, 0)?);
            Ok(map_of(m)?.get(&key).cloned().unwrap_or_default())
        })
        .method("containsKey", vec![ValueType::Any], BOOLEAN, |m, args| {
            let key = map_key(arg(args, 0)?);
            Ok(map_of(m)?.contains_key(&key).into())
        })
        .method("keySet", vec![], ValueType::List, |m, _| {
            Ok(Value::List(
                map_of(m)?.keys().map(|k| Value::from(k.as_str())).collect(),
            ))
        })
        .method("values", vec![], ValueType::List, |m, _| {
            Ok(Value::List(map_of(m)?.values().cloned().collect()))
        })
}

// ============================================================================
// Receiver and argument access
// ============================================================================

fn str_of(receiver: &Value) -> Result<&str, String> {
    match receiver {
        Value::String(s) => Ok(s),
        other => Err(format!("Expected a String receiver, got {}", other.describe())),
    }
}

fn list_of(receiver: &Value) -> Result<&Vec<Value>, String> {
    match receiver {
        Value::List(items) => Ok(items),
        other => Err(format!("Expected a List receiver, got {}", other.describe())),
    }
}

fn map_of(receiver: &Value) -> Result<&indexmap::IndexMap<String, Value>, String> {
    match receiver {
        Value::Map(map) => Ok(map),
        other => Err(format!("Expected a Map receiver, got {}", other.describe())),
    }
}

fn arg(args: &[Value], i: usize) -> Result<&Value, String> {
    args.get(i).ok_or_else(|| format!("Missing argument {i}"))
}

fn str_arg(args: &[Value], i: usize) -> Result<&str, String> {
    str_of(arg(args, i)?)
}

/// An `int` parameter: anything that widens to `int`.
fn int_arg(args: &[Value], i: usize) -> Result<i32, String> {
    match arg(args, i)? {
        Value::Int(n) => Ok(*n),
        Value::Short(n) => Ok(i32::from(*n)),
        Value::Byte(n) => Ok(i32::from(*n)),
        Value::Char(c) => i32::try_from(u32::from(*c)).map_err(|e| e.to_string()),
        other => Err(format!("Expected an int argument, got {}", other.describe())),
    }
}

/// Lengths and positions are `int`s; saturate rather than wrap.
fn len_of(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

fn len(s: &str) -> i32 {
    len_of(s.chars().count())
}

/// Character position of `needle` in `s` at or after `from`, or -1.
fn index_of(s: &str, needle: &str, from: i32) -> i32 {
    let from = usize::try_from(from).unwrap_or(0);
    let Some((start, _)) = s.char_indices().nth(from).or_else(|| {
        // Searching from the very end can still find the empty string.
        (from == s.chars().count()).then_some((s.len(), ' '))
    }) else {
        return -1;
    };
    match s[start..].find(needle) {
        Some(byte_offset) => len_of(from + s[start..start + byte_offset].chars().count()),
        None => -1,
    }
}

fn substring(s: &str, begin: i32, end: i32) -> Result<Value, String> {
    let out_of_range = || format!("begin {begin}, end {end}, length {}", len(s));
    let (Ok(b), Ok(e)) = (usize::try_from(begin), usize::try_from(end)) else {
        return Err(out_of_range());
    };
    if b > e || end > len(s) {
        return Err(out_of_range());
    }
    Ok(s.chars().skip(b).take(e - b).collect::<String>().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{MemberResolver, Resolution};
    use indexmap::IndexMap;

    fn call(receiver: impl Into<Value>, method: &str, args: &[Value]) -> Resolution {
        TypeRegistry::standard().resolve_method(&receiver.into(), method, args)
    }

    fn found(value: impl Into<Value>) -> Resolution {
        Resolution::Found(value.into())
    }

    // ========================================================================
    // String
    // ========================================================================

    #[test]
    fn test_string_basics() {
        assert_eq!(call("héllo", "length", &[]), found(5));
        assert_eq!(call("", "isEmpty", &[]), found(true));
        assert_eq!(call("abc", "charAt", &[Value::Int(1)]), found('b'));
        assert_eq!(call("  x ", "trim", &[]), found("x"));
        assert_eq!(call("aBc", "toUpperCase", &[]), found("ABC"));
        assert_eq!(call("aBc", "toLowerCase", &[]), found("abc"));
    }

    #[test]
    fn test_string_char_widens_to_int() {
        // 'b' is 98, past the end of the string
        assert_eq!(
            call("abc", "charAt", &[Value::Char('b')]),
            Resolution::Failed("String index out of range: 98".to_string())
        );
    }

    #[test]
    fn test_string_index_of() {
        assert_eq!(call("banana", "indexOf", &["an".into()]), found(1));
        assert_eq!(
            call("banana", "indexOf", &["an".into(), Value::Int(2)]),
            found(3)
        );
        assert_eq!(call("banana", "indexOf", &["x".into()]), found(-1));
        assert_eq!(call("héllo", "indexOf", &["l".into()]), found(2));
        assert_eq!(call("ab", "indexOf", &["".into(), Value::Int(2)]), found(2));
        assert_eq!(call("ab", "indexOf", &["a".into(), Value::Int(9)]), found(-1));
    }

    #[test]
    fn test_string_substring() {
        assert_eq!(call("hello", "substring", &[Value::Int(1)]), found("ello"));
        assert_eq!(
            call("hello", "substring", &[Value::Int(1), Value::Int(3)]),
            found("el")
        );
        assert_eq!(
            call("hello", "substring", &[Value::Int(3), Value::Int(1)]),
            Resolution::Failed("begin 3, end 1, length 5".to_string())
        );
        assert_eq!(
            call("hello", "substring", &[Value::Int(6)]),
            Resolution::Failed("begin 6, end 5, length 5".to_string())
        );
    }

    #[test]
    fn test_string_predicates_and_replace() {
        assert_eq!(call("hello", "startsWith", &["he".into()]), found(true));
        assert_eq!(call("hello", "endsWith", &["he".into()]), found(false));
        assert_eq!(call("hello", "contains", &["ll".into()]), found(true));
        assert_eq!(
            call("a-b-c", "replace", &["-".into(), "+".into()]),
            found("a+b+c")
        );
    }

    #[test]
    fn test_string_equals_is_strict() {
        assert_eq!(call("123", "equals", &["123".into()]), found(true));
        assert_eq!(call("123", "equals", &[Value::Int(123)]), found(false));
    }

    // ========================================================================
    // List and Map
    // ========================================================================

    #[test]
    fn test_list_methods() {
        let list = || Value::from(vec![1, 2, 3]);
        assert_eq!(call(list(), "size", &[]), found(3));
        assert_eq!(call(list(), "isEmpty", &[]), found(false));
        assert_eq!(call(list(), "get", &[Value::Int(2)]), found(3));
        assert_eq!(call(list(), "contains", &[Value::Int(2)]), found(true));
        assert_eq!(call(list(), "contains", &["2".into()]), found(false));
        assert_eq!(call(list(), "indexOf", &[Value::Int(3)]), found(2));
        assert_eq!(
            call(list(), "get", &[Value::Int(3)]),
            Resolution::Failed("Index 3 out of bounds for length 3".to_string())
        );
    }

    #[test]
    fn test_map_methods() {
        let map = || {
            let mut map = IndexMap::new();
            map.insert("b".to_string(), Value::Int(2));
            map.insert("a".to_string(), Value::Int(1));
            Value::Map(map)
        };
        assert_eq!(call(map(), "size", &[]), found(2));
        assert_eq!(call(map(), "get", &["a".into()]), found(1));
        assert_eq!(call(map(), "get", &["z".into()]), found(Value::Null));
        assert_eq!(call(map(), "containsKey", &["b".into()]), found(true));
        assert_eq!(call(map(), "keySet", &[]), found(vec!["b", "a"]));
        assert_eq!(call(map(), "values", &[]), found(vec![2, 1]));
    }

    #[test]
    fn test_list_get_rejects_non_int() {
        assert_eq!(
            call(vec![1], "get", &[Value::Long(0)]),
            Resolution::NotFound
        );
    }
}

/*
 * resolver.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Member, method and index resolution.
//!
//! The evaluator never inspects receivers itself: `$x.name`, `$x.name(args)`
//! and `$x[i]` are all delegated to a [`MemberResolver`]. [`TypeRegistry`]
//! is the standard implementation, driven by descriptor tables registered
//! per runtime type name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::builtins;
use crate::value::{PrimitiveType, Value};

/// Outcome of a resolution request.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found(Value),
    /// No member, method or index applies to the receiver.
    NotFound,
    /// More than one overload accepts the arguments. Carries their signatures.
    Ambiguous(Vec<String>),
    /// The accessor was found but failed when invoked.
    Failed(String),
}

/// Trait for looking up members of runtime values.
///
/// Implementations must be total: every request yields a [`Resolution`],
/// never a panic. Receivers are never [`Value::Null`]; the evaluator reports
/// null receivers itself.
pub trait MemberResolver: Send + Sync {
    /// Property access, `$x.name`.
    fn resolve_member(&self, receiver: &Value, name: &str) -> Resolution;

    /// Method invocation, `$x.name(args...)`.
    fn resolve_method(&self, receiver: &Value, name: &str, args: &[Value]) -> Resolution;

    /// Indexing, `$x[index]`.
    fn resolve_index(&self, receiver: &Value, index: &Value) -> Resolution;
}

/// Declared type of a method parameter or return value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    Primitive(PrimitiveType),
    String,
    List,
    Map,
    /// A host object registered under this type name.
    Object(String),
    /// Any non-null value.
    Any,
}

impl ValueType {
    /// Whether `arg` may be passed for a parameter of this type. Null is
    /// never accepted; primitives accept anything they widen from.
    pub fn accepts(&self, arg: &Value) -> bool {
        match (self, arg) {
            (_, Value::Null) => false,
            (ValueType::Primitive(to), arg) => arg
                .primitive_type()
                .is_some_and(|from| to.is_assignable_from(from)),
            (ValueType::String, Value::String(_))
            | (ValueType::List, Value::List(_))
            | (ValueType::Map, Value::Map(_))
            | (ValueType::Any, _) => true,
            (ValueType::Object(name), Value::Object(object)) => object.type_name() == name,
            _ => false,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ValueType::Primitive(p) => p.name(),
            ValueType::String => "String",
            ValueType::List => "List",
            ValueType::Map => "Map",
            ValueType::Object(name) => name,
            ValueType::Any => "Object",
        }
    }
}

/// Host function behind a [`MethodDescriptor`]. Receives the receiver and
/// the already type-checked arguments.
pub type Invoker = Arc<dyn Fn(&Value, &[Value]) -> Result<Value, String> + Send + Sync>;

/// One invocable method of a type.
#[derive(Clone)]
pub struct MethodDescriptor {
    pub name: String,
    pub params: Vec<ValueType>,
    pub returns: ValueType,
    invoker: Invoker,
}

impl MethodDescriptor {
    pub fn new(
        name: impl Into<String>,
        params: Vec<ValueType>,
        returns: ValueType,
        invoker: impl Fn(&Value, &[Value]) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            returns,
            invoker: Arc::new(invoker),
        }
    }

    /// Whether the method can be called with these arguments.
    pub fn accepts(&self, args: &[Value]) -> bool {
        self.params.len() == args.len()
            && self
                .params
                .iter()
                .zip(args)
                .all(|(param, arg)| param.accepts(arg))
    }

    pub fn invoke(&self, receiver: &Value, args: &[Value]) -> Resolution {
        match (self.invoker)(receiver, args) {
            Ok(value) => Resolution::Found(value),
            Err(message) => Resolution::Failed(message),
        }
    }

    /// E.g. `indexOf(String, int)`.
    pub fn signature(&self) -> String {
        let params: Vec<&str> = self.params.iter().map(ValueType::name).collect();
        format!("{}({})", self.name, params.join(", "))
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.signature(), self.returns.name())
    }
}

/// The methods of one runtime type.
#[derive(Debug, Clone, Default)]
pub struct TypeDescriptor {
    pub name: String,
    pub methods: Vec<MethodDescriptor>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// Add a method.
    pub fn method(
        mut self,
        name: &str,
        params: Vec<ValueType>,
        returns: ValueType,
        invoker: impl Fn(&Value, &[Value]) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        self.methods
            .push(MethodDescriptor::new(name, params, returns, invoker));
        self
    }

    /// Methods called `name`. The items borrow only the descriptor.
    pub fn methods_named<'a>(
        &'a self,
        name: &str,
    ) -> impl Iterator<Item = &'a MethodDescriptor> + use<'a> {
        let name = name.to_owned();
        self.methods.iter().filter(move |m| m.name == name)
    }

    fn getter(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods_named(name).find(|m| m.params.is_empty())
    }
}

/// Descriptor-table implementation of [`MemberResolver`].
///
/// Properties resolve through zero-argument getters: `$x.name` tries
/// `getname`, `getName`, then `isname`, `isName` (the initial letter's case
/// flipped on the second try of each prefix), and `is` getters only count
/// when they return `boolean`. Map receivers look the name up as a key first.
///
/// Methods resolve by name, then by arity and argument compatibility
/// (primitive widening included), and exactly one candidate must survive.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, TypeDescriptor>,
}

impl TypeRegistry {
    /// An empty registry. Only map keys and list/map indexing resolve.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in `String`, `List` and `Map` methods.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        builtins::register_standard(&mut registry);
        registry
    }

    /// Register a type's methods. Methods for an already known type name
    /// are added to the existing table.
    pub fn register(&mut self, descriptor: TypeDescriptor) -> &mut Self {
        match self.types.get_mut(&descriptor.name) {
            Some(existing) => existing.methods.extend(descriptor.methods),
            None => {
                self.types.insert(descriptor.name.clone(), descriptor);
            }
        }
        self
    }

    pub fn get(&self, type_name: &str) -> Option<&TypeDescriptor> {
        self.types.get(type_name)
    }

    fn resolve_getter(&self, receiver: &Value, name: &str) -> Resolution {
        let Some(descriptor) = self.get(receiver.type_name()) else {
            return Resolution::NotFound;
        };
        let flipped = change_initial_case(name);
        for prefix in ["get", "is"] {
            for base in [name, flipped.as_str()] {
                let method_name = format!("{prefix}{base}");
                if let Some(method) = descriptor.getter(&method_name)
                    && (prefix == "get"
                        || method.returns == ValueType::Primitive(PrimitiveType::Boolean))
                {
                    return method.invoke(receiver, &[]);
                }
            }
        }
        Resolution::NotFound
    }
}

impl MemberResolver for TypeRegistry {
    fn resolve_member(&self, receiver: &Value, name: &str) -> Resolution {
        if let Value::Map(map) = receiver
            && let Some(value) = map.get(name)
        {
            return Resolution::Found(value.clone());
        }
        self.resolve_getter(receiver, name)
    }

    fn resolve_method(&self, receiver: &Value, name: &str, args: &[Value]) -> Resolution {
        let Some(descriptor) = self.get(receiver.type_name()) else {
            return Resolution::NotFound;
        };
        let compatible: Vec<&MethodDescriptor> = descriptor
            .methods_named(name)
            .filter(|m| m.accepts(args))
            .collect();
        match compatible.as_slice() {
            [] => Resolution::NotFound,
            [method] => method.invoke(receiver, args),
            candidates => Resolution::Ambiguous(
                candidates
                    .iter()
                    .map(|m| format!("{}.{}", descriptor.name, m.signature()))
                    .collect(),
            ),
        }
    }

    fn resolve_index(&self, receiver: &Value, index: &Value) -> Resolution {
        match receiver {
            Value::List(items) => {
                let Value::Int(i) = index else {
                    return Resolution::Failed(format!("List index is not an integer: {index}"));
                };
                match usize::try_from(*i).ok().and_then(|i| items.get(i)) {
                    Some(item) => Resolution::Found(item.clone()),
                    None => Resolution::Failed(format!(
                        "List index {i} is not valid for list of size {}",
                        items.len()
                    )),
                }
            }
            Value::Map(map) => Resolution::Found(
                map.get(&map_key(index)).cloned().unwrap_or_default(),
            ),
            Value::Object(_) => self.resolve_method(receiver, "get", std::slice::from_ref(index)),
            _ => Resolution::NotFound,
        }
    }
}

/// Key under which a value is looked up in a [`Value::Map`].
pub(crate) fn map_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `name` with its first character's case flipped.
fn change_initial_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_uppercase() => first.to_lowercase().chain(chars).collect(),
        Some(first) if first.is_lowercase() => first.to_uppercase().chain(chars).collect(),
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::HostObject;
    use indexmap::IndexMap;
    use std::any::Any;

    #[derive(Debug)]
    struct Person {
        name: String,
        admin: bool,
    }

    impl fmt::Display for Person {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "Person({})", self.name)
        }
    }

    impl HostObject for Person {
        fn type_name(&self) -> &str {
            "Person"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn person(receiver: &Value) -> Result<&Person, String> {
        match receiver {
            Value::Object(object) => object
                .as_any()
                .downcast_ref::<Person>()
                .ok_or_else(|| "not a Person".to_string()),
            other => Err(format!("not a Person: {other}")),
        }
    }

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::standard();
        registry.register(
            TypeDescriptor::new("Person")
                .method("getName", vec![], ValueType::String, |r, _| {
                    Ok(person(r)?.name.clone().into())
                })
                .method(
                    "isAdmin",
                    vec![],
                    ValueType::Primitive(PrimitiveType::Boolean),
                    |r, _| Ok(person(r)?.admin.into()),
                )
                .method("isTall", vec![], ValueType::String, |_, _| Ok("no".into()))
                .method(
                    "greet",
                    vec![ValueType::Primitive(PrimitiveType::Long)],
                    ValueType::String,
                    |_, args| Ok(format!("long {}", args[0]).into()),
                )
                .method(
                    "greet",
                    vec![ValueType::String],
                    ValueType::String,
                    |_, args| Ok(format!("string {}", args[0]).into()),
                )
                .method(
                    "pick",
                    vec![ValueType::Primitive(PrimitiveType::Long)],
                    ValueType::String,
                    |_, _| Ok("long".into()),
                )
                .method(
                    "pick",
                    vec![ValueType::Primitive(PrimitiveType::Double)],
                    ValueType::String,
                    |_, _| Ok("double".into()),
                )
                .method("fail", vec![], ValueType::Any, |_, _| {
                    Err("boom".to_string())
                }),
        );
        registry
    }

    fn alice() -> Value {
        Value::object(Person {
            name: "Alice".to_string(),
            admin: true,
        })
    }

    // ========================================================================
    // Properties
    // ========================================================================

    #[test]
    fn test_getter_with_case_flip() {
        let registry = registry();
        assert_eq!(
            registry.resolve_member(&alice(), "name"),
            Resolution::Found("Alice".into())
        );
        assert_eq!(
            registry.resolve_member(&alice(), "Name"),
            Resolution::Found("Alice".into())
        );
    }

    #[test]
    fn test_is_getter_requires_boolean() {
        let registry = registry();
        assert_eq!(
            registry.resolve_member(&alice(), "admin"),
            Resolution::Found(true.into())
        );
        assert_eq!(registry.resolve_member(&alice(), "tall"), Resolution::NotFound);
    }

    #[test]
    fn test_map_key_before_getter() {
        let registry = registry();
        let mut map = IndexMap::new();
        map.insert("size".to_string(), Value::from("big"));
        let map = Value::Map(map);
        assert_eq!(
            registry.resolve_member(&map, "size"),
            Resolution::Found("big".into())
        );
        assert_eq!(
            registry.resolve_member(&map, "empty"),
            Resolution::Found(false.into())
        );
    }

    #[test]
    fn test_getter_failure_is_reported() {
        let registry = registry();
        assert_eq!(
            registry.resolve_method(&alice(), "fail", &[]),
            Resolution::Failed("boom".to_string())
        );
    }

    // ========================================================================
    // Overloads
    // ========================================================================

    #[test]
    fn test_overload_by_argument_type() {
        let registry = registry();
        assert_eq!(
            registry.resolve_method(&alice(), "greet", &[Value::Int(3)]),
            Resolution::Found("long 3".into())
        );
        assert_eq!(
            registry.resolve_method(&alice(), "greet", &["x".into()]),
            Resolution::Found("string x".into())
        );
    }

    #[test]
    fn test_no_compatible_overload() {
        let registry = registry();
        assert_eq!(
            registry.resolve_method(&alice(), "greet", &[Value::Bool(true)]),
            Resolution::NotFound
        );
        assert_eq!(
            registry.resolve_method(&alice(), "greet", &[]),
            Resolution::NotFound
        );
        assert_eq!(
            registry.resolve_method(&alice(), "greet", &[Value::Null]),
            Resolution::NotFound
        );
    }

    #[test]
    fn test_ambiguous_overload() {
        let registry = registry();
        assert_eq!(
            registry.resolve_method(&alice(), "pick", &[Value::Int(1)]),
            Resolution::Ambiguous(vec![
                "Person.pick(long)".to_string(),
                "Person.pick(double)".to_string()
            ])
        );
        // Only the double overload accepts a float
        assert_eq!(
            registry.resolve_method(&alice(), "pick", &[Value::Float(1.5)]),
            Resolution::Found("double".into())
        );
    }

    #[test]
    fn test_every_parameter_is_checked() {
        let mut registry = TypeRegistry::new();
        registry.register(TypeDescriptor::new("String").method(
            "two",
            vec![
                ValueType::Primitive(PrimitiveType::Int),
                ValueType::Primitive(PrimitiveType::Int),
            ],
            ValueType::Any,
            |_, _| Ok(Value::Null),
        ));
        assert_eq!(
            registry.resolve_method(&"s".into(), "two", &[Value::Int(1), "x".into()]),
            Resolution::NotFound
        );
    }

    #[test]
    fn test_methods_named_outlive_the_name() {
        let registry = registry();
        let Some(descriptor) = registry.get("Person") else {
            panic!("Person is registered");
        };
        let found: Vec<&MethodDescriptor> = {
            let name = format!("pi{}", "ck");
            descriptor.methods_named(&name).collect()
        };
        let signatures: Vec<String> = found.iter().map(|m| m.signature()).collect();
        assert_eq!(signatures, vec!["pick(long)", "pick(double)"]);
    }

    #[test]
    fn test_unknown_type() {
        assert_eq!(
            TypeRegistry::new().resolve_method(&Value::Int(1), "foo", &[]),
            Resolution::NotFound
        );
    }

    // ========================================================================
    // Indexing
    // ========================================================================

    #[test]
    fn test_list_index() {
        let registry = registry();
        let list = Value::from(vec!["a", "b"]);
        assert_eq!(
            registry.resolve_index(&list, &Value::Int(1)),
            Resolution::Found("b".into())
        );
        assert_eq!(
            registry.resolve_index(&list, &Value::Int(2)),
            Resolution::Failed("List index 2 is not valid for list of size 2".to_string())
        );
        assert_eq!(
            registry.resolve_index(&list, &Value::Int(-1)),
            Resolution::Failed("List index -1 is not valid for list of size 2".to_string())
        );
        assert_eq!(
            registry.resolve_index(&list, &"0".into()),
            Resolution::Failed("List index is not an integer: 0".to_string())
        );
    }

    #[test]
    fn test_map_index_missing_key_is_null() {
        let registry = registry();
        let mut map = IndexMap::new();
        map.insert("1".to_string(), Value::from("one"));
        let map = Value::Map(map);
        assert_eq!(
            registry.resolve_index(&map, &Value::Int(1)),
            Resolution::Found("one".into())
        );
        assert_eq!(
            registry.resolve_index(&map, &"2".into()),
            Resolution::Found(Value::Null)
        );
    }

    #[test]
    fn test_index_unindexable() {
        assert_eq!(
            registry().resolve_index(&Value::Int(3), &Value::Int(0)),
            Resolution::NotFound
        );
        assert_eq!(
            registry().resolve_index(&alice(), &Value::Int(0)),
            Resolution::NotFound
        );
    }

    #[test]
    fn test_change_initial_case() {
        assert_eq!(change_initial_case("name"), "Name");
        assert_eq!(change_initial_case("URL"), "uRL");
        assert_eq!(change_initial_case("9x"), "9x");
        assert_eq!(change_initial_case(""), "");
    }
}

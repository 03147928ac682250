/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! A template engine for a subset of the Velocity Template Language.
//!
//! Supported syntax:
//!
//! - References: `$name`, `${name}`, `$x.member`, `$x.method(args)`, `$x[index]`
//! - Assignment: `#set ($x = expr)`
//! - Conditionals: `#if (cond) ... #elseif (cond) ... #else ... #end`
//! - Loops: `#foreach ($x in $list) ... #end`, with `$foreach.hasNext`
//! - Macros: `#macro (name $p1 $p2) ... #end`, invoked as `#name(a b)`
//! - Comments: `## to end of line` and `#* block *#`
//! - Expressions: `|| && == != < <= > >= + - * / % !`, integer, string and
//!   boolean literals, `[a, b]` lists and `[a..b]` ranges
//!
//! # Architecture
//!
//! Parsing runs in two phases. The [`parser`] turns text into a flat token
//! sequence in which expressions are already complete; the [`reparser`]
//! matches directive tokens into a tree and lifts macro definitions into a
//! table, so macros may be called before their definition.
//!
//! Rendering walks the tree with an [`EvaluationContext`]. Members, methods
//! and indexes of values are looked up through a [`MemberResolver`]; the
//! standard [`TypeRegistry`] covers strings, lists and maps, and hosts
//! register descriptor tables for their own [`HostObject`] types.
//!
//! # Example
//!
//! ```
//! use vtl_engine::{Template, Variables};
//!
//! let template = Template::parse("Hello, $name!#if ($admin) (admin)#end")?;
//!
//! let mut vars = Variables::new();
//! vars.insert("name", "World").insert("admin", true);
//!
//! assert_eq!(template.render(&vars)?, "Hello, World! (admin)");
//! # Ok::<(), vtl_engine::TemplateError>(())
//! ```

pub mod ast;
pub mod builtins;
pub mod error;
pub mod eval_context;
pub mod evaluator;
pub mod parser;
pub mod reparser;
pub mod resolver;
pub mod scanner;
pub mod template;
pub mod value;

// Re-export main types at crate root
pub use ast::{Expr, Macro, MacroTable, Node};
pub use error::{
    EvalResult, EvaluationError, ParseError, ParseResult, TemplateError, TemplateResult,
};
pub use eval_context::{EvaluationContext, RenderOptions};
pub use resolver::{
    MemberResolver, MethodDescriptor, Resolution, TypeDescriptor, TypeRegistry, ValueType,
};
pub use template::{Template, parse};
pub use value::{HostObject, PrimitiveType, Value, Variables};

/*
 * eval_context.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Evaluation context for template rendering.
//!
//! This module provides [`EvaluationContext`], which is threaded through all
//! evaluation functions to support:
//!
//! 1. **Variables**: the mutable binding table, with undo actions so every
//!    scoped binding can be reverted exactly, including back to "undefined"
//! 2. **State tracking**: nesting depth for recursion protection
//! 3. **Configuration**: [`RenderOptions`]

use std::collections::HashMap;

use serde::Deserialize;

use crate::ast::{Macro, MacroTable};
use crate::error::{EvalResult, EvaluationError};
use crate::resolver::MemberResolver;
use crate::value::Value;

/// Default limit on nested macro calls and loop bodies.
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Default limit on the number of elements a `[from..to]` range may produce.
pub const DEFAULT_MAX_RANGE: usize = 100_000;

/// Options for a render call.
///
/// Deserializable so hosts can embed it in their own configuration; missing
/// fields take their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Maximum nesting of macro calls and `#foreach` bodies.
    pub max_depth: usize,
    /// Maximum number of elements in a `[from..to]` range.
    pub max_range: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_range: DEFAULT_MAX_RANGE,
        }
    }
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum nesting depth.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set the largest range that may be materialized.
    pub fn with_max_range(mut self, elements: usize) -> Self {
        self.max_range = elements;
        self
    }
}

/// Reverts one variable binding.
#[derive(Debug, Clone, PartialEq)]
pub enum Undo {
    /// The variable had this value before.
    Restore { name: String, value: Value },
    /// The variable was undefined before.
    Remove { name: String },
}

impl Undo {
    /// The variable this action reverts.
    pub fn name(&self) -> &str {
        match self {
            Undo::Restore { name, .. } | Undo::Remove { name } => name,
        }
    }
}

/// Context for template evaluation.
///
/// One context exists per render call, so a parsed template can be rendered
/// from several threads at once.
pub struct EvaluationContext<'a> {
    vars: HashMap<String, Value>,

    /// Macros of the template being rendered.
    pub macros: &'a MacroTable,

    /// Member, method and index lookup.
    pub resolver: &'a dyn MemberResolver,

    pub options: RenderOptions,

    /// Current nesting of macro calls and loop bodies.
    depth: usize,

    /// Undo actions recorded by `#set` and macro parameters, one frame per
    /// active macro call.
    frames: Vec<Vec<Undo>>,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(
        vars: HashMap<String, Value>,
        macros: &'a MacroTable,
        resolver: &'a dyn MemberResolver,
    ) -> Self {
        Self {
            vars,
            macros,
            resolver,
            options: RenderOptions::default(),
            depth: 0,
            frames: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn get_var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn get_macro(&self, name: &str) -> Option<&'a Macro> {
        self.macros.get(name)
    }

    /// Bind `name`, returning the action that reverts the binding.
    pub fn set_var(&mut self, name: impl Into<String>, value: Value) -> Undo {
        let name = name.into();
        match self.vars.insert(name.clone(), value) {
            Some(previous) => Undo::Restore {
                name,
                value: previous,
            },
            None => Undo::Remove { name },
        }
    }

    pub fn undo(&mut self, undo: Undo) {
        match undo {
            Undo::Restore { name, value } => {
                self.vars.insert(name, value);
            }
            Undo::Remove { name } => {
                self.vars.remove(&name);
            }
        }
    }

    /// Bind `name` in the innermost scope: the binding is reverted when the
    /// enclosing macro call returns, or kept for the rest of the render at
    /// top level.
    pub fn assign(&mut self, name: impl Into<String>, value: Value) {
        let undo = self.set_var(name, value);
        if let Some(frame) = self.frames.last_mut() {
            frame.push(undo);
        }
    }

    /// Open a scope whose [`assign`](Self::assign)ments are reverted by the
    /// matching [`pop_frame`](Self::pop_frame).
    pub fn push_frame(&mut self) {
        self.frames.push(Vec::new());
    }

    /// Close the innermost scope, reverting its bindings newest first.
    pub fn pop_frame(&mut self) {
        if let Some(frame) = self.frames.pop() {
            for undo in frame.into_iter().rev() {
                self.undo(undo);
            }
        }
    }

    /// Number of undo actions in the innermost scope, for use with
    /// [`forget_since`](Self::forget_since).
    pub fn frame_mark(&self) -> usize {
        self.frames.last().map_or(0, Vec::len)
    }

    /// Drop the innermost scope's undo actions for `name` recorded after
    /// `mark`. Used when a construct restores `name` itself, so a later
    /// frame pop does not resurrect a value from inside the construct.
    pub fn forget_since(&mut self, mark: usize, name: &str) {
        if let Some(frame) = self.frames.last_mut()
            && mark < frame.len()
        {
            let mut i = mark;
            frame.retain(|undo| {
                let keep = i < mark || undo.name() != name;
                i += 1;
                keep
            });
        }
    }

    /// Enter a nested macro call or loop body.
    pub fn enter(&mut self, line: usize) -> EvalResult<()> {
        if self.depth >= self.options.max_depth {
            return Err(EvaluationError::DepthExceeded {
                max_depth: self.options.max_depth,
                line,
            });
        }
        self.depth += 1;
        Ok(())
    }

    pub fn exit(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

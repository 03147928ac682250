/*
 * evaluator.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template evaluation engine.
//!
//! This module walks a parsed tree against an [`EvaluationContext`],
//! appending output text as it goes. The tree itself is never modified.

use crate::ast::{BinaryOp, Expr, ExprKind, ForEach, MacroCall, Node, Reference, ReferenceKind};
use crate::error::{EvalResult, EvaluationError};
use crate::eval_context::EvaluationContext;
use crate::resolver::Resolution;
use crate::value::Value;
use indexmap::IndexMap;

/// Name of the loop status variable bound inside `#foreach`.
pub const FOREACH_VAR: &str = "foreach";

/// Evaluate a tree to its output text.
pub fn render(node: &Node, ctx: &mut EvaluationContext) -> EvalResult<String> {
    let mut out = String::new();
    render_node(node, ctx, &mut out)?;
    Ok(out)
}

/// Evaluate a single node, appending its output to `out`.
pub fn render_node(node: &Node, ctx: &mut EvaluationContext, out: &mut String) -> EvalResult<()> {
    match node {
        Node::Empty { .. } => Ok(()),
        Node::Text(text) => {
            out.push_str(&text.text);
            Ok(())
        }
        Node::Expression(expr) => {
            let value = evaluate_expr(expr, ctx)?;
            out.push_str(&value.to_string());
            Ok(())
        }
        Node::Concat(concat) => {
            for node in &concat.nodes {
                render_node(node, ctx, out)?;
            }
            Ok(())
        }
        Node::If(node) => {
            let branch = if evaluate_expr(&node.condition, ctx)?.is_truthy() {
                &node.then_branch
            } else {
                &node.else_branch
            };
            render_node(branch, ctx, out)
        }
        Node::ForEach(node) => render_foreach(node, ctx, out),
        Node::Set(set) => {
            let value = evaluate_expr(&set.value, ctx)?;
            ctx.assign(set.var.as_str(), value);
            Ok(())
        }
        Node::MacroCall(call) => render_macro_call(call, ctx, out),
    }
}

/// Loop status exposed as `$foreach` during iteration `index` of `count`.
fn loop_status(index: usize, count: usize) -> Value {
    let mut status = IndexMap::new();
    status.insert("hasNext".to_string(), Value::Bool(index + 1 < count));
    status.insert("index".to_string(), int_value(index));
    status.insert("count".to_string(), int_value(index + 1));
    status.insert("first".to_string(), Value::Bool(index == 0));
    status.insert("last".to_string(), Value::Bool(index + 1 == count));
    Value::Map(status)
}

fn int_value(n: usize) -> Value {
    Value::Int(i32::try_from(n).unwrap_or(i32::MAX))
}

fn render_foreach(node: &ForEach, ctx: &mut EvaluationContext, out: &mut String) -> EvalResult<()> {
    let items = match evaluate_expr(&node.collection, ctx)? {
        Value::List(items) => items,
        Value::Map(map) => map.into_values().collect(),
        other => {
            return Err(EvaluationError::NotIterable {
                value: other.to_string(),
                line: node.line,
            });
        }
    };
    tracing::trace!(var = %node.var, items = items.len(), line = node.line, "foreach");

    ctx.enter(node.line)?;
    let mark = ctx.frame_mark();
    let undo_var = ctx.set_var(node.var.as_str(), Value::Null);
    let undo_status = ctx.set_var(FOREACH_VAR, loop_status(0, items.len()));

    let result = render_iterations(node, items, ctx, out);

    ctx.forget_since(mark, FOREACH_VAR);
    ctx.forget_since(mark, &node.var);
    ctx.undo(undo_status);
    ctx.undo(undo_var);
    ctx.exit();
    result
}

fn render_iterations(
    node: &ForEach,
    items: Vec<Value>,
    ctx: &mut EvaluationContext,
    out: &mut String,
) -> EvalResult<()> {
    let count = items.len();
    for (index, item) in items.into_iter().enumerate() {
        // Rebinding; the bindings made before the loop are what gets undone.
        ctx.set_var(FOREACH_VAR, loop_status(index, count));
        ctx.set_var(node.var.as_str(), item);
        render_node(&node.body, ctx, out)?;
    }
    Ok(())
}

fn render_macro_call(
    call: &MacroCall,
    ctx: &mut EvaluationContext,
    out: &mut String,
) -> EvalResult<()> {
    let Some(definition) = ctx.get_macro(&call.name) else {
        return Err(EvaluationError::UndefinedMacro {
            name: call.name.clone(),
            line: call.line,
        });
    };
    if call.args.len() != definition.parameters.len() {
        return Err(EvaluationError::WrongArgumentCount {
            name: call.name.clone(),
            expected: definition.parameters.len(),
            actual: call.args.len(),
            line: call.line,
        });
    }
    let args = call
        .args
        .iter()
        .map(|arg| evaluate_expr(arg, ctx))
        .collect::<EvalResult<Vec<_>>>()?;

    ctx.enter(call.line)?;
    tracing::trace!(name = %call.name, line = call.line, depth = ctx.depth(), "macro call");
    ctx.push_frame();
    for (parameter, value) in definition.parameters.iter().zip(args) {
        ctx.assign(parameter.as_str(), value);
    }
    let result = render_node(&definition.body, ctx, out);
    ctx.pop_frame();
    ctx.exit();

    result.map_err(|source| EvaluationError::InMacro {
        name: definition.name.clone(),
        line: definition.line,
        source: Box::new(source),
    })
}

// ============================================================================
// Expressions
// ============================================================================

/// Evaluate an expression to a value.
pub fn evaluate_expr(expr: &Expr, ctx: &mut EvaluationContext) -> EvalResult<Value> {
    match &expr.kind {
        ExprKind::Constant(value) => Ok(value.clone()),
        ExprKind::Reference(reference) => evaluate_reference(reference, ctx),
        ExprKind::List(items) => Ok(Value::List(
            items
                .iter()
                .map(|item| evaluate_expr(item, ctx))
                .collect::<EvalResult<_>>()?,
        )),
        ExprKind::Range(from, to) => {
            let from = integer_operand(evaluate_expr(from, ctx)?, expr.line)?;
            let to = integer_operand(evaluate_expr(to, ctx)?, expr.line)?;
            let max = ctx.options.max_range;
            if (i64::from(from) - i64::from(to)).unsigned_abs() >= max as u64 {
                return Err(EvaluationError::RangeTooLarge {
                    from,
                    to,
                    max,
                    line: expr.line,
                });
            }
            let items: Vec<Value> = if from <= to {
                (from..=to).map(Value::Int).collect()
            } else {
                (to..=from).rev().map(Value::Int).collect()
            };
            Ok(Value::List(items))
        }
        ExprKind::Binary { op, lhs, rhs } => evaluate_binary(*op, lhs, rhs, expr.line, ctx),
        ExprKind::Not(operand) => Ok(Value::Bool(!evaluate_expr(operand, ctx)?.is_truthy())),
        ExprKind::Negate(operand) => {
            let n = integer_operand(evaluate_expr(operand, ctx)?, expr.line)?;
            Ok(Value::Int(n.wrapping_neg()))
        }
    }
}

fn evaluate_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    line: usize,
    ctx: &mut EvaluationContext,
) -> EvalResult<Value> {
    match op {
        BinaryOp::Or => {
            let value =
                evaluate_expr(lhs, ctx)?.is_truthy() || evaluate_expr(rhs, ctx)?.is_truthy();
            return Ok(Value::Bool(value));
        }
        BinaryOp::And => {
            let value =
                evaluate_expr(lhs, ctx)?.is_truthy() && evaluate_expr(rhs, ctx)?.is_truthy();
            return Ok(Value::Bool(value));
        }
        _ => {}
    }

    let lhs = evaluate_expr(lhs, ctx)?;
    let rhs = evaluate_expr(rhs, ctx)?;
    match op {
        BinaryOp::Equals => Ok(Value::Bool(lhs.loose_equals(&rhs))),
        BinaryOp::Less => lhs
            .less_than(&rhs)
            .map(Value::Bool)
            .map_err(|message| EvaluationError::TypeMismatch { message, line }),
        _ => {
            let a = integer_operand(lhs, line)?;
            let b = integer_operand(rhs, line)?;
            let n = match op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Subtract => a.wrapping_sub(b),
                BinaryOp::Multiply => a.wrapping_mul(b),
                BinaryOp::Divide | BinaryOp::Remainder if b == 0 => {
                    return Err(EvaluationError::DivisionByZero { line });
                }
                BinaryOp::Divide => a.wrapping_div(b),
                // Remainder
                _ => a.wrapping_rem(b),
            };
            Ok(Value::Int(n))
        }
    }
}

fn integer_operand(value: Value, line: usize) -> EvalResult<i32> {
    match value {
        Value::Int(n) => Ok(n),
        other => Err(EvaluationError::TypeMismatch {
            message: format!(
                "Arithmetic only available on integers, not {}",
                other.describe()
            ),
            line,
        }),
    }
}

// ============================================================================
// References
// ============================================================================

fn evaluate_reference(reference: &Reference, ctx: &mut EvaluationContext) -> EvalResult<Value> {
    let line = reference.line;
    match &reference.kind {
        ReferenceKind::Plain(name) => {
            ctx.get_var(name)
                .cloned()
                .ok_or_else(|| EvaluationError::UndefinedReference {
                    name: name.clone(),
                    line,
                })
        }
        ReferenceKind::Member { lhs, name } => {
            let receiver = non_null_receiver(lhs, ctx, || format!("get member {name} of"))?;
            match ctx.resolver.resolve_member(&receiver, name) {
                Resolution::Found(value) => Ok(value),
                Resolution::NotFound => Err(EvaluationError::MemberNotFound {
                    member: name.clone(),
                    receiver: receiver.to_string(),
                    type_name: receiver.type_name().to_string(),
                    line,
                }),
                other => Err(resolution_error(other, name, line)),
            }
        }
        ReferenceKind::Method { lhs, name, args } => {
            let receiver = non_null_receiver(lhs, ctx, || format!("invoke method {name} on"))?;
            let args = args
                .iter()
                .map(|arg| evaluate_expr(arg, ctx))
                .collect::<EvalResult<Vec<_>>>()?;
            match ctx.resolver.resolve_method(&receiver, name, &args) {
                Resolution::Found(value) => Ok(value),
                Resolution::NotFound => Err(EvaluationError::MethodNotFound {
                    method: name.clone(),
                    type_name: receiver.type_name().to_string(),
                    args: args
                        .iter()
                        .map(Value::describe)
                        .collect::<Vec<_>>()
                        .join(", "),
                    line,
                }),
                other => Err(resolution_error(other, name, line)),
            }
        }
        ReferenceKind::Index { lhs, index } => {
            let receiver = non_null_receiver(lhs, ctx, || "index".to_string())?;
            let index = evaluate_expr(index, ctx)?;
            match ctx.resolver.resolve_index(&receiver, &index) {
                Resolution::Found(value) => Ok(value),
                Resolution::NotFound => Err(EvaluationError::InvalidIndex {
                    message: format!("Cannot index an object of type {}", receiver.type_name()),
                    line,
                }),
                Resolution::Failed(message) => Err(EvaluationError::InvalidIndex { message, line }),
                other => Err(resolution_error(other, "get", line)),
            }
        }
    }
}

fn non_null_receiver(
    lhs: &Reference,
    ctx: &mut EvaluationContext,
    action: impl FnOnce() -> String,
) -> EvalResult<Value> {
    let value = evaluate_reference(lhs, ctx)?;
    if value.is_null() {
        return Err(EvaluationError::NullReceiver {
            action: action(),
            line: lhs.line,
        });
    }
    Ok(value)
}

/// Errors for the resolution outcomes that do not depend on the kind of
/// reference.
fn resolution_error(resolution: Resolution, member: &str, line: usize) -> EvaluationError {
    match resolution {
        Resolution::Ambiguous(candidates) => EvaluationError::AmbiguousMethod {
            method: member.to_string(),
            candidates,
            line,
        },
        Resolution::Failed(message) => EvaluationError::InvocationFailed {
            member: member.to_string(),
            message,
            line,
        },
        Resolution::Found(_) | Resolution::NotFound => EvaluationError::InvocationFailed {
            member: member.to_string(),
            message: "unexpected resolution".to_string(),
            line,
        },
    }
}

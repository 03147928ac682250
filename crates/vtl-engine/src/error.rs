/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for template parsing and evaluation.
//!
//! Parsing and rendering fail fast: the first problem found aborts the whole
//! operation and is reported with the most specific line number available.

use thiserror::Error;

/// A structural problem in the template text, detected while parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}, on line {line}, at text starting: {context}")]
pub struct ParseError {
    /// What went wrong.
    pub message: String,
    /// 1-based line number where the problem was detected.
    pub line: usize,
    /// Up to 20 characters of the remaining input, or `EOF`.
    pub context: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize, context: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line,
            context: context.into(),
        }
    }
}

/// A problem detected while rendering a template against real data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("Undefined reference ${name} on line {line}")]
    UndefinedReference { name: String, line: usize },

    #[error("Cannot {action} null value on line {line}")]
    NullReceiver { action: String, line: usize },

    #[error("Member {member} does not correspond to a public getter of {receiver}, a {type_name}, on line {line}")]
    MemberNotFound {
        member: String,
        receiver: String,
        type_name: String,
        line: usize,
    },

    #[error("No method {method} in {type_name} compatible with arguments [{args}] on line {line}")]
    MethodNotFound {
        method: String,
        type_name: String,
        args: String,
        line: usize,
    },

    #[error("Ambiguous method invocation {method} on line {line}, could be one of: {}", .candidates.join(", "))]
    AmbiguousMethod {
        method: String,
        candidates: Vec<String>,
        line: usize,
    },

    #[error("Invalid index on line {line}: {message}")]
    InvalidIndex { message: String, line: usize },

    #[error("Not iterable on line {line}: {value}")]
    NotIterable { value: String, line: usize },

    #[error("In expression on line {line}: {message}")]
    TypeMismatch { message: String, line: usize },

    #[error("In expression on line {line}: Division by 0")]
    DivisionByZero { line: usize },

    #[error("#{name} on line {line} is neither a standard directive nor a macro that has been defined")]
    UndefinedMacro { name: String, line: usize },

    #[error("Wrong number of arguments to #{name} on line {line}: expected {expected}, got {actual}")]
    WrongArgumentCount {
        name: String,
        expected: usize,
        actual: usize,
        line: usize,
    },

    #[error("Evaluation depth limit of {max_depth} exceeded on line {line}")]
    DepthExceeded { max_depth: usize, line: usize },

    #[error("Range [{from}..{to}] on line {line} has more than {max} elements")]
    RangeTooLarge {
        from: i32,
        to: i32,
        max: usize,
        line: usize,
    },

    #[error("Error invoking {member} on line {line}: {message}")]
    InvocationFailed {
        member: String,
        message: String,
        line: usize,
    },

    /// An error raised inside a macro body, annotated with the macro's identity.
    #[error("In macro #{name} defined on line {line}: {source}")]
    InMacro {
        name: String,
        line: usize,
        #[source]
        source: Box<EvaluationError>,
    },
}

impl EvaluationError {
    /// The innermost error, looking through any macro annotations.
    pub fn root_cause(&self) -> &EvaluationError {
        match self {
            EvaluationError::InMacro { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Errors that can occur during template operations.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Error parsing the template syntax.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Error evaluating the template.
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// I/O error (e.g., reading a template file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for parsing.
pub type ParseResult<T> = Result<T, ParseError>;

/// Result type for evaluation.
pub type EvalResult<T> = Result<T, EvaluationError>;

/// Result type for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new("Expected )", 3, "foo bar...");
        assert_eq!(
            err.to_string(),
            "Expected ), on line 3, at text starting: foo bar..."
        );
    }

    #[test]
    fn test_macro_wrapping_keeps_cause() {
        let inner = EvaluationError::UndefinedReference {
            name: "x".to_string(),
            line: 4,
        };
        let outer = EvaluationError::InMacro {
            name: "m".to_string(),
            line: 2,
            source: Box::new(inner.clone()),
        };

        assert_eq!(
            outer.to_string(),
            "In macro #m defined on line 2: Undefined reference $x on line 4"
        );
        assert_eq!(outer.root_cause(), &inner);
        let source = std::error::Error::source(&outer).map(|e| e.to_string());
        assert_eq!(source.as_deref(), Some("Undefined reference $x on line 4"));
    }

    #[test]
    fn test_template_error_is_transparent() {
        let err: TemplateError = EvaluationError::DivisionByZero { line: 7 }.into();
        assert_eq!(err.to_string(), "In expression on line 7: Division by 0");
    }
}

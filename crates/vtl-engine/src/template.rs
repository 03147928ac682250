/*
 * template.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Parsed templates and the parse/render entry points.

use std::path::Path;
use std::sync::LazyLock;

use crate::ast::{MacroTable, Node};
use crate::error::{EvalResult, ParseResult, TemplateResult};
use crate::eval_context::{EvaluationContext, RenderOptions};
use crate::evaluator;
use crate::parser::tokenize;
use crate::reparser::{Reparsed, reparse};
use crate::resolver::{MemberResolver, TypeRegistry};
use crate::value::Variables;

static STANDARD_RESOLVER: LazyLock<TypeRegistry> = LazyLock::new(TypeRegistry::standard);

/// A parsed template.
///
/// Immutable once built. Each render call gets its own evaluation context,
/// so one template can be rendered from several threads at once.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    root: Node,
    macros: MacroTable,
}

/// Parse template text. Same as [`Template::parse`].
pub fn parse(source: &str) -> ParseResult<Template> {
    Template::parse(source)
}

impl Template {
    /// Parse template text.
    ///
    /// Fails on the first structural problem: malformed directives,
    /// unterminated strings, unmatched `#end`, and so on.
    pub fn parse(source: &str) -> ParseResult<Self> {
        let tokens = tokenize(source)?;
        let Reparsed { root, macros } = reparse(tokens)?;
        tracing::debug!(
            nodes = root.size(),
            macros = macros.len(),
            "parsed template"
        );
        Ok(Self { root, macros })
    }

    /// Read and parse a template file.
    pub fn from_file(path: impl AsRef<Path>) -> TemplateResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "loading template");
        Ok(Self::parse(&source)?)
    }

    /// The template body, with macro definitions removed.
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Macros defined anywhere in the template.
    pub fn macros(&self) -> &MacroTable {
        &self.macros
    }

    /// Render with the built-in resolver and default options.
    pub fn render(&self, vars: &Variables) -> EvalResult<String> {
        self.render_with(vars, &*STANDARD_RESOLVER, &RenderOptions::default())
    }

    /// Render with a host-supplied resolver and options.
    pub fn render_with(
        &self,
        vars: &Variables,
        resolver: &dyn MemberResolver,
        options: &RenderOptions,
    ) -> EvalResult<String> {
        tracing::debug!(
            vars = vars.len(),
            max_depth = options.max_depth,
            max_range = options.max_range,
            "rendering template"
        );
        let mut ctx =
            EvaluationContext::new(vars.to_map(), &self.macros, resolver).with_options(*options);
        let output = evaluator::render(&self.root, &mut ctx)?;
        tracing::debug!(bytes = output.len(), "rendered template");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EvaluationError, TemplateError};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_is_deterministic() {
        let template = Template::parse("#foreach ($k in $m)$k,#end").unwrap();
        let vars = Variables::from_json(serde_json::json!({"m": {"b": 1, "a": 2}}));
        let first = template.render(&vars).unwrap();
        assert_eq!(first, template.render(&vars).unwrap());
    }

    #[test]
    fn test_parse_extracts_macros() {
        let template = parse("#macro (a)#end#macro (b $x)$x#end").unwrap();
        let mut names: Vec<&String> = template.macros().keys().collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
        assert!(template.root().is_empty());
    }

    #[test]
    fn test_render_with_options() {
        let template = Template::parse("#macro (m $n)#if ($n > 0)#m($n - 1)#end#end#m(5)").unwrap();
        let options = RenderOptions::new().with_max_depth(3);
        let err = template
            .render_with(&Variables::new(), &TypeRegistry::new(), &options)
            .unwrap_err();
        assert_eq!(
            err.root_cause(),
            &EvaluationError::DepthExceeded {
                max_depth: 3,
                line: 1
            }
        );
        let deep_enough = RenderOptions::new().with_max_depth(6);
        assert_eq!(
            template
                .render_with(&Variables::new(), &TypeRegistry::new(), &deep_enough)
                .unwrap(),
            ""
        );
    }

    #[test]
    fn test_from_missing_file() {
        let err = Template::from_file("/nonexistent/template.vtl").unwrap_err();
        assert!(matches!(err, TemplateError::Io(_)));
    }

    #[test]
    fn test_template_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Template>();
    }
}

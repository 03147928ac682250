/*
 * reparser.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Second parsing phase: flat tokens to a tree.
//!
//! Directive markers are matched up recursively: `#if`/`#elseif`/`#else`/`#end`
//! become one [`If`] node (each `#elseif` a nested `If` in the else branch),
//! `#foreach ... #end` one [`ForEach`] node, and `#macro ... #end` a [`Macro`]
//! that is lifted out of the tree into the [`MacroTable`].
//!
//! Before matching, whitespace-only text between a `#set` and a preceding
//! comment, reference, macro definition end, or other `#set` is removed.

use std::collections::VecDeque;

use crate::ast::{Expr, ForEach, If, Macro, MacroTable, Node};
use crate::error::{ParseError, ParseResult};
use crate::parser::Token;

/// The tree and macro table built from one token sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Reparsed {
    pub root: Node,
    pub macros: MacroTable,
}

/// Build the template tree from the output of [`tokenize`](crate::parser::tokenize).
pub fn reparse(tokens: Vec<Token>) -> ParseResult<Reparsed> {
    Reparser::new(elide_whitespace_before_set(tokens)).reparse()
}

/// Tokens that close a parse loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopAt {
    Eof,
    End,
    ElseOrEnd,
}

impl StopAt {
    fn matches(self, token: &Token) -> bool {
        match self {
            StopAt::Eof => matches!(token, Token::Eof { .. }),
            StopAt::End => matches!(token, Token::End { .. }),
            StopAt::ElseOrEnd => matches!(
                token,
                Token::End { .. } | Token::Else { .. } | Token::ElseIf { .. }
            ),
        }
    }
}

struct Reparser {
    tokens: VecDeque<Token>,
    /// Returned once the queue is drained.
    eof: Token,
    macros: MacroTable,
}

impl Reparser {
    fn new(tokens: Vec<Token>) -> Self {
        let eof_line = tokens.last().map_or(1, Token::line);
        Self {
            tokens: tokens.into(),
            eof: Token::Eof { line: eof_line },
            macros: MacroTable::new(),
        }
    }

    fn reparse(mut self) -> ParseResult<Reparsed> {
        let root = self.parse_to(StopAt::Eof, "template", 1)?;
        Ok(Reparsed {
            root,
            macros: self.macros,
        })
    }

    fn current(&self) -> &Token {
        self.tokens.front().unwrap_or(&self.eof)
    }

    fn advance(&mut self) -> Token {
        match self.tokens.pop_front() {
            Some(token) => token,
            None => self.eof.clone(),
        }
    }

    /// Collect nodes until a token matching `stop` is current. The stop
    /// token is left unconsumed.
    fn parse_to(&mut self, stop: StopAt, what: &str, start_line: usize) -> ParseResult<Node> {
        let mut nodes = Vec::new();
        while !stop.matches(self.current()) {
            let token = self.advance();
            match token {
                Token::Eof { line } => {
                    return Err(ParseError::new(
                        format!("Reached end of file while parsing {what} starting on line {start_line}"),
                        line,
                        "EOF",
                    ));
                }
                Token::Node(node) => nodes.push(node),
                Token::Comment { .. } => {}
                Token::If { condition, line } => nodes.push(self.parse_if("#if", condition, line)?),
                Token::ForEach {
                    var,
                    collection,
                    line,
                } => {
                    let body = self.parse_to(StopAt::End, "#foreach", line)?;
                    self.advance();
                    nodes.push(Node::ForEach(ForEach {
                        var,
                        collection,
                        body: Box::new(body),
                        line,
                    }));
                }
                Token::MacroDefinition {
                    name,
                    parameters,
                    line,
                } => self.parse_macro_definition(name, parameters, line)?,
                unexpected @ (Token::Else { .. } | Token::ElseIf { .. } | Token::End { .. }) => {
                    return Err(unexpected_token(&unexpected));
                }
            }
        }
        Ok(Node::concat(start_line, nodes))
    }

    /// Parse the branches of an `#if` or `#elseif` whose marker has been
    /// consumed.
    fn parse_if(
        &mut self,
        what: &str,
        condition: Expr,
        line: usize,
    ) -> ParseResult<Node> {
        let then_branch = self.parse_to(StopAt::ElseOrEnd, what, line)?;
        let else_branch = match self.advance() {
            Token::End { line, .. } => Node::Empty { line },
            Token::Else { .. } => {
                let else_branch = self.parse_to(StopAt::End, what, line)?;
                self.advance();
                else_branch
            }
            // `#if (a) x #elseif (b) y ... #end` reads as
            // `#if (a) x #else #if (b) y ... #end #end`.
            Token::ElseIf {
                condition,
                line: elseif_line,
                ..
            } => self.parse_if("#elseif", condition, elseif_line)?,
            other => return Err(unexpected_token(&other)),
        };
        Ok(Node::If(If {
            condition,
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
            line,
        }))
    }

    fn parse_macro_definition(
        &mut self,
        name: String,
        parameters: Vec<String>,
        line: usize,
    ) -> ParseResult<()> {
        let body = self.parse_to(StopAt::End, &format!("#macro({name})"), line)?;
        self.advance();
        if let Some(existing) = self.macros.get(&name) {
            tracing::warn!(
                name = %name,
                line,
                first_defined_on = existing.line,
                "ignoring redefinition of macro"
            );
            return Ok(());
        }
        self.macros.insert(
            name.clone(),
            Macro {
                name,
                parameters,
                body,
                line,
            },
        );
        Ok(())
    }
}

fn unexpected_token(token: &Token) -> ParseError {
    let context = match token {
        Token::ElseIf { context, .. } | Token::Else { context, .. } | Token::End { context, .. } => {
            context.clone()
        }
        other => other.describe(),
    };
    ParseError::new(format!("Unexpected {}", token.describe()), token.line(), context)
}

/// Remove a whitespace-only text token sitting between a `#set` and a
/// preceding comment, reference, macro-closing `#end`, or `#set`.
fn elide_whitespace_before_set(tokens: Vec<Token>) -> Vec<Token> {
    let closes_macro = macro_closing_ends(&tokens);
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut out_closes_macro: Vec<bool> = Vec::with_capacity(tokens.len());

    for (token, closes) in tokens.into_iter().zip(closes_macro) {
        if is_set(&token) && out.len() >= 2 {
            let gap = out.len() - 1;
            let before = gap - 1;
            if is_blank_text(&out[gap]) && triggers_elision(&out[before], out_closes_macro[before])
            {
                out.pop();
                out_closes_macro.pop();
            }
        }
        out.push(token);
        out_closes_macro.push(closes);
    }
    out
}

/// For each token, whether it is an `#end` that closes a `#macro`.
fn macro_closing_ends(tokens: &[Token]) -> Vec<bool> {
    let mut open: Vec<bool> = Vec::new();
    tokens
        .iter()
        .map(|token| match token {
            Token::If { .. } | Token::ForEach { .. } => {
                open.push(false);
                false
            }
            Token::MacroDefinition { .. } => {
                open.push(true);
                false
            }
            Token::End { .. } => open.pop().unwrap_or(false),
            _ => false,
        })
        .collect()
}

fn is_set(token: &Token) -> bool {
    matches!(token, Token::Node(Node::Set(_)))
}

fn is_blank_text(token: &Token) -> bool {
    matches!(token, Token::Node(Node::Text(text)) if text.text.chars().all(char::is_whitespace))
}

fn triggers_elision(token: &Token, closes_macro: bool) -> bool {
    match token {
        Token::Comment { .. } => true,
        Token::Node(Node::Expression(_) | Node::Set(_)) => true,
        Token::End { .. } => closes_macro,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Text;
    use crate::parser::tokenize;
    use pretty_assertions::assert_eq;

    fn reparse_str(source: &str) -> ParseResult<Reparsed> {
        reparse(tokenize(source)?)
    }

    fn texts(node: &Node) -> Vec<String> {
        match node {
            Node::Text(Text { text, .. }) => vec![text.clone()],
            Node::Concat(concat) => concat.nodes.iter().flat_map(texts).collect(),
            _ => vec![],
        }
    }

    // ========================================================================
    // Tree building
    // ========================================================================

    #[test]
    fn test_plain_text() {
        let parsed = reparse_str("just text").unwrap();
        assert_eq!(texts(&parsed.root), vec!["just text"]);
        assert!(parsed.macros.is_empty());
    }

    #[test]
    fn test_elseif_chain_nests() {
        let parsed = reparse_str("#if ($a)A#elseif ($b)B#else C#end").unwrap();
        let Node::If(outer) = &parsed.root else {
            panic!("expected if, got {:?}", parsed.root);
        };
        assert_eq!(texts(&outer.then_branch), vec!["A"]);
        let Node::If(inner) = outer.else_branch.as_ref() else {
            panic!("expected nested if");
        };
        assert_eq!(texts(&inner.then_branch), vec!["B"]);
        assert_eq!(texts(&inner.else_branch), vec!["C"]);
    }

    #[test]
    fn test_if_without_else_has_empty_branch() {
        let parsed = reparse_str("#if ($a)A#end").unwrap();
        let Node::If(node) = &parsed.root else {
            panic!("expected if");
        };
        assert!(node.else_branch.is_empty());
    }

    #[test]
    fn test_foreach_body() {
        let parsed = reparse_str("#foreach ($x in $xs)[$x]#end").unwrap();
        let Node::ForEach(node) = &parsed.root else {
            panic!("expected foreach");
        };
        assert_eq!(node.var, "x");
        assert_eq!(texts(&node.body), vec!["[", "]"]);
    }

    #[test]
    fn test_macro_is_lifted_out_of_tree() {
        let parsed = reparse_str("a#macro(m $p)body#end\nb").unwrap();
        assert_eq!(texts(&parsed.root), vec!["a", "b"]);
        let m = &parsed.macros["m"];
        assert_eq!(m.parameters, vec!["p".to_string()]);
        assert_eq!(texts(&m.body), vec!["body"]);
        assert_eq!(m.line, 1);
    }

    #[test]
    fn test_first_macro_definition_wins() {
        let parsed = reparse_str("#macro(m)one#end#macro(m)two#end").unwrap();
        assert_eq!(parsed.macros.len(), 1);
        assert_eq!(texts(&parsed.macros["m"].body), vec!["one"]);
    }

    // ========================================================================
    // Errors
    // ========================================================================

    #[test]
    fn test_missing_end() {
        let err = reparse_str("x\n#if ($a)\nyes").unwrap_err();
        assert_eq!(
            err.message,
            "Reached end of file while parsing #if starting on line 2"
        );
        assert_eq!(err.context, "EOF");
    }

    #[test]
    fn test_missing_end_in_else_branch_names_the_if() {
        let err = reparse_str("#if ($a)A#else\nB").unwrap_err();
        assert_eq!(
            err.message,
            "Reached end of file while parsing #if starting on line 1"
        );
    }

    #[test]
    fn test_missing_end_for_macro() {
        let err = reparse_str("#macro(m $x)\n$x").unwrap_err();
        assert_eq!(
            err.message,
            "Reached end of file while parsing #macro(m) starting on line 1"
        );
    }

    #[test]
    fn test_stray_end() {
        let err = reparse_str("text\n#end").unwrap_err();
        assert_eq!(err.message, "Unexpected #end");
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_stray_else() {
        let err = reparse_str("#foreach ($x in $xs)#else#end").unwrap_err();
        assert_eq!(err.message, "Unexpected #else");
    }

    #[test]
    fn test_stray_directive_quotes_following_text() {
        let err = reparse_str("#end and then some more text").unwrap_err();
        assert_eq!(err.message, "Unexpected #end");
        assert_eq!(err.line, 1);
        assert_eq!(err.context, "#end and then some m...");

        let err = reparse_str("x\n#{else}").unwrap_err();
        assert_eq!(err.message, "Unexpected #else");
        assert_eq!(err.line, 2);
        assert_eq!(err.context, "#{else}");
    }

    // ========================================================================
    // Whitespace before #set
    // ========================================================================

    #[test]
    fn test_space_between_reference_and_set_is_removed() {
        let parsed = reparse_str("$x  #set ($y = 1)z").unwrap();
        assert_eq!(texts(&parsed.root), vec!["z"]);
    }

    #[test]
    fn test_space_between_sets_is_removed() {
        let parsed = reparse_str("#set ($a = 1)\n  #set ($b = 2)\nend").unwrap();
        assert_eq!(texts(&parsed.root), vec!["end"]);
    }

    #[test]
    fn test_space_after_macro_end_before_set_is_removed() {
        let parsed = reparse_str("#macro(m)x#end  #set ($a = 1)").unwrap();
        assert_eq!(texts(&parsed.root), Vec::<String>::new());
    }

    #[test]
    fn test_space_after_comment_before_set_is_removed() {
        let parsed = reparse_str("## note\n   #set ($a = 1)").unwrap();
        assert!(matches!(parsed.root, Node::Set(_)));
    }

    #[test]
    fn test_space_after_text_before_set_is_kept() {
        let parsed = reparse_str("a  #set ($a = 1)").unwrap();
        assert_eq!(texts(&parsed.root), vec!["a  "]);
    }

    #[test]
    fn test_space_after_if_end_before_set_is_kept() {
        let parsed = reparse_str("#if ($a)#end  #set ($b = 1)").unwrap();
        assert_eq!(texts(&parsed.root), vec!["  "]);
    }
}

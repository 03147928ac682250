/*
 * parser.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! First parsing phase: template text to a flat token sequence.
//!
//! Literal text, references, `#set` and macro calls come out as finished
//! [`Node`]s. Block directives (`#if`, `#foreach`, `#macro`, ...) come out as
//! markers that the [reparser](crate::reparser) matches up into a tree.
//! Expressions inside directive parentheses are parsed completely here, by
//! recursive descent.

use crate::ast::{BinaryOp, Expr, ExprKind, MacroCall, Node, Reference, ReferenceKind, Set, Text};
use crate::error::{ParseError, ParseResult};
use crate::scanner::Scanner;

/// Deepest nesting of operators, parentheses and reference suffixes within
/// one expression.
pub const MAX_EXPRESSION_DEPTH: usize = 100;

/// Deepest nesting of `#if`, `#foreach` and `#macro` blocks. Each `#elseif`
/// counts as one more level, since it nests in the tree.
pub const MAX_BLOCK_DEPTH: usize = 100;

/// One element of the flat sequence produced by the first phase.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Literal text, a reference, `#set`, or a macro call.
    Node(Node),
    If { condition: Expr, line: usize },
    // `context` on the markers that can turn up out of place quotes the
    // input from their `#`, for error messages.
    ElseIf {
        condition: Expr,
        line: usize,
        context: String,
    },
    Else { line: usize, context: String },
    End { line: usize, context: String },
    ForEach { var: String, collection: Expr, line: usize },
    MacroDefinition {
        name: String,
        parameters: Vec<String>,
        line: usize,
    },
    /// `## ...` or `#* ... *#`. Produces no output.
    Comment { line: usize },
    /// End of input. Always the last token.
    Eof { line: usize },
}

impl Token {
    pub fn line(&self) -> usize {
        match self {
            Token::Node(node) => node.line(),
            Token::If { line, .. }
            | Token::ElseIf { line, .. }
            | Token::Else { line, .. }
            | Token::End { line, .. }
            | Token::ForEach { line, .. }
            | Token::MacroDefinition { line, .. }
            | Token::Comment { line }
            | Token::Eof { line } => *line,
        }
    }

    /// How the token reads in error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Node(_) => "text".to_string(),
            Token::If { .. } => "#if".to_string(),
            Token::ElseIf { .. } => "#elseif".to_string(),
            Token::Else { .. } => "#else".to_string(),
            Token::End { .. } => "#end".to_string(),
            Token::ForEach { .. } => "#foreach".to_string(),
            Token::MacroDefinition { name, .. } => format!("#macro({name})"),
            Token::Comment { .. } => "comment".to_string(),
            Token::Eof { .. } => "end of file".to_string(),
        }
    }
}

/// Split template source into the flat token sequence, ending with
/// [`Token::Eof`].
pub fn tokenize(source: &str) -> ParseResult<Vec<Token>> {
    Parser::new(source).tokenize()
}

/// Recursive-descent parser over a [`Scanner`].
pub struct Parser<'a> {
    scanner: Scanner<'a>,
    /// Nesting within the expression being parsed.
    expression_depth: usize,
    /// Tree depth added by each open block, innermost last.
    open_blocks: Vec<usize>,
    block_depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            scanner: Scanner::new(source),
            expression_depth: 0,
            open_blocks: Vec::new(),
            block_depth: 0,
        }
    }

    pub fn tokenize(mut self) -> ParseResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.parse_token()?;
            let done = matches!(token, Token::Eof { .. });
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn parse_token(&mut self) -> ParseResult<Token> {
        let line = self.scanner.line();
        if self.scanner.at('#') {
            match self.scanner.peek_next() {
                Some('#') => {
                    self.skip_line_comment();
                    return Ok(Token::Comment { line });
                }
                Some('*') => {
                    self.skip_block_comment()?;
                    return Ok(Token::Comment { line });
                }
                Some(c) if c.is_alphabetic() || c == '{' => {
                    let context = self.scanner.context();
                    self.scanner.advance();
                    return self.parse_directive(line, context);
                }
                // A lone `#` is literal text.
                _ => {}
            }
        }
        if self.scanner.at_eof() {
            return Ok(Token::Eof { line });
        }
        self.parse_non_directive(line)
    }

    fn parse_non_directive(&mut self, line: usize) -> ParseResult<Token> {
        if self.scanner.at('$')
            && self
                .scanner
                .peek_next()
                .is_some_and(|c| c.is_alphabetic() || c == '{')
        {
            self.scanner.advance();
            let reference = self.parse_reference()?;
            return Ok(Token::Node(Node::Expression(reference.into())));
        }
        Ok(Token::Node(Node::Text(self.parse_plain_text(line))))
    }

    /// Literal text up to the next `$`, `#` or end of input. The first
    /// character is taken unconditionally.
    fn parse_plain_text(&mut self, line: usize) -> Text {
        let mut text = String::new();
        if let Some(first) = self.scanner.current() {
            text.push(first);
            self.scanner.advance();
        }
        text.push_str(self.scanner.take_while(|c| c != '$' && c != '#'));
        Text { text, line }
    }

    fn skip_line_comment(&mut self) {
        self.scanner.take_while(|c| c != '\n');
        self.scanner.advance();
    }

    fn skip_block_comment(&mut self) -> ParseResult<()> {
        // Skip `#*`
        self.scanner.advance();
        self.scanner.advance();
        loop {
            match self.scanner.current() {
                None => return Err(self.scanner.error("Unterminated #* comment")),
                Some('*') if self.scanner.peek_next() == Some('#') => {
                    self.scanner.advance();
                    self.scanner.advance();
                    return Ok(());
                }
                Some(_) => {
                    self.scanner.advance();
                }
            }
        }
    }

    /// Parse a directive; the `#` has been consumed. `context` quotes the
    /// input from the `#`.
    fn parse_directive(&mut self, line: usize, context: String) -> ParseResult<Token> {
        let directive = if self.scanner.at('{') {
            self.scanner.advance();
            let id = self.parse_id("Directive")?;
            if !self.scanner.at('}') {
                return Err(self.scanner.error("Expected } after directive name"));
            }
            self.scanner.advance();
            id
        } else {
            self.parse_id("Directive")?
        };

        self.track_block_nesting(&directive, line, &context)?;
        let token = match directive.as_str() {
            "end" => Token::End { line, context },
            "else" => Token::Else { line, context },
            "if" | "elseif" => {
                self.scanner.expect('(')?;
                let condition = self.parse_expression()?;
                self.scanner.expect(')')?;
                if directive == "if" {
                    Token::If { condition, line }
                } else {
                    Token::ElseIf {
                        condition,
                        line,
                        context,
                    }
                }
            }
            "foreach" => self.parse_foreach(line)?,
            "set" => self.parse_set(line)?,
            "macro" => self.parse_macro_definition(line)?,
            _ => self.parse_macro_call(directive, line)?,
        };

        if self.scanner.at('\n') {
            self.scanner.advance();
        }
        Ok(token)
    }

    /// Keep count of how deeply the tree built from the directives so far
    /// nests, and fail past [`MAX_BLOCK_DEPTH`].
    fn track_block_nesting(&mut self, directive: &str, line: usize, context: &str) -> ParseResult<()> {
        match directive {
            "if" | "foreach" | "macro" => self.open_blocks.push(1),
            "elseif" => match self.open_blocks.last_mut() {
                Some(levels) => *levels += 1,
                None => return Ok(()),
            },
            "end" => {
                let levels = self.open_blocks.pop().unwrap_or(0);
                self.block_depth = self.block_depth.saturating_sub(levels);
                return Ok(());
            }
            _ => return Ok(()),
        }
        self.block_depth += 1;
        if self.block_depth > MAX_BLOCK_DEPTH {
            return Err(ParseError::new(
                "Directives nested too deeply",
                line,
                context,
            ));
        }
        Ok(())
    }

    fn parse_foreach(&mut self, line: usize) -> ParseResult<Token> {
        self.scanner.expect('(')?;
        self.scanner.expect('$')?;
        let var = self.parse_id("For-each variable")?;
        self.scanner.skip_whitespace();
        if !(self.scanner.at('i') && self.scanner.peek_next() == Some('n')) {
            return Err(self.scanner.error("Expected 'in' for #foreach"));
        }
        self.scanner.advance();
        self.scanner.advance();
        let collection = self.parse_expression()?;
        self.scanner.expect(')')?;
        Ok(Token::ForEach {
            var,
            collection,
            line,
        })
    }

    fn parse_set(&mut self, line: usize) -> ParseResult<Token> {
        self.scanner.expect('(')?;
        self.scanner.expect('$')?;
        let var = self.parse_id("#set variable")?;
        self.scanner.expect('=')?;
        let value = self.parse_expression()?;
        self.scanner.expect(')')?;
        Ok(Token::Node(Node::Set(Set { var, value, line })))
    }

    fn parse_macro_definition(&mut self, line: usize) -> ParseResult<Token> {
        self.scanner.expect('(')?;
        self.scanner.skip_whitespace();
        let name = self.parse_id("Macro name")?;
        let mut parameters = Vec::new();
        loop {
            self.scanner.skip_whitespace();
            match self.scanner.current() {
                Some(')') => break,
                Some(',') => {
                    self.scanner.advance();
                }
                Some('$') => {
                    self.scanner.advance();
                    parameters.push(self.parse_id("Macro parameter name")?);
                }
                _ => return Err(self.scanner.error("Macro parameters should look like $name")),
            }
        }
        // Skip )
        self.scanner.advance();
        Ok(Token::MacroDefinition {
            name,
            parameters,
            line,
        })
    }

    fn parse_macro_call(&mut self, name: String, line: usize) -> ParseResult<Token> {
        self.scanner.skip_whitespace();
        if !self.scanner.at('(') {
            return Err(self
                .scanner
                .error(format!("Unrecognized directive #{name}")));
        }
        self.scanner.advance();
        let mut args = Vec::new();
        loop {
            self.scanner.skip_whitespace();
            match self.scanner.current() {
                Some(')') => break,
                Some(',') => {
                    self.scanner.advance();
                }
                _ => args.push(self.parse_expression()?),
            }
        }
        // Skip )
        self.scanner.advance();
        Ok(Token::Node(Node::MacroCall(MacroCall { name, args, line })))
    }

    // ========================================================================
    // References
    // ========================================================================

    /// Parse a reference; the `$` has been consumed.
    fn parse_reference(&mut self) -> ParseResult<Reference> {
        if self.scanner.at('{') {
            self.scanner.advance();
            let reference = self.parse_reference_no_brace()?;
            if !self.scanner.at('}') {
                return Err(self.scanner.error("Expected } at end of reference"));
            }
            self.scanner.advance();
            Ok(reference)
        } else {
            self.parse_reference_no_brace()
        }
    }

    fn parse_reference_no_brace(&mut self) -> ParseResult<Reference> {
        let depth = self.expression_depth;
        let line = self.scanner.line();
        let id = self.parse_id("Reference")?;
        let mut reference = Reference::plain(id, line);
        loop {
            reference = match self.scanner.current() {
                Some('.')
                    if self
                        .scanner
                        .peek_next()
                        .is_some_and(char::is_alphabetic) =>
                {
                    self.descend()?;
                    self.scanner.advance();
                    let name = self.parse_id("Member")?;
                    if self.scanner.at('(') {
                        let args = self.parse_method_args()?;
                        Reference {
                            kind: ReferenceKind::Method {
                                lhs: Box::new(reference),
                                name,
                                args,
                            },
                            line,
                        }
                    } else {
                        Reference {
                            kind: ReferenceKind::Member {
                                lhs: Box::new(reference),
                                name,
                            },
                            line,
                        }
                    }
                }
                Some('[') => {
                    self.descend()?;
                    self.scanner.advance();
                    let index = self.parse_expression()?;
                    if !self.scanner.at(']') {
                        return Err(self.scanner.error("Expected ]"));
                    }
                    self.scanner.advance();
                    Reference {
                        kind: ReferenceKind::Index {
                            lhs: Box::new(reference),
                            index: Box::new(index),
                        },
                        line,
                    }
                }
                _ => {
                    self.expression_depth = depth;
                    return Ok(reference);
                }
            };
        }
    }

    /// Parenthesized, comma-separated method arguments.
    fn parse_method_args(&mut self) -> ParseResult<Vec<Expr>> {
        self.scanner.advance_past_whitespace();
        let mut args = Vec::new();
        if !self.scanner.at(')') {
            args.push(self.parse_expression()?);
            while self.scanner.at(',') {
                self.scanner.advance_past_whitespace();
                args.push(self.parse_expression()?);
            }
            if !self.scanner.at(')') {
                return Err(self.scanner.error("Expected )"));
            }
        }
        self.scanner.advance();
        Ok(args)
    }

    // ========================================================================
    // Expressions, loosest binding first
    // ========================================================================

    fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.scanner.skip_whitespace();
        self.parse_or()
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let lhs = self.parse_and()?;
        if self.scanner.at('|') {
            self.scanner.advance();
            if !self.scanner.at('|') {
                return Err(self.scanner.error("Expected ||, not just |"));
            }
            self.scanner.advance_past_whitespace();
            self.descend()?;
            let rhs = self.parse_or()?;
            self.expression_depth -= 1;
            return Ok(Expr::binary(BinaryOp::Or, lhs, rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let lhs = self.parse_equality()?;
        if self.scanner.at('&') {
            self.scanner.advance();
            if !self.scanner.at('&') {
                return Err(self.scanner.error("Expected &&, not just &"));
            }
            self.scanner.advance_past_whitespace();
            self.descend()?;
            let rhs = self.parse_and()?;
            self.expression_depth -= 1;
            return Ok(Expr::binary(BinaryOp::And, lhs, rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        let depth = self.expression_depth;
        let mut lhs = self.parse_relational()?;
        loop {
            match self.scanner.current() {
                Some('=') => {
                    self.descend()?;
                    self.scanner.advance();
                    if !self.scanner.at('=') {
                        return Err(self.scanner.error("Expected ==, not just ="));
                    }
                    self.scanner.advance_past_whitespace();
                    let rhs = self.parse_relational()?;
                    lhs = Expr::binary(BinaryOp::Equals, lhs, rhs);
                }
                Some('!') => {
                    self.descend()?;
                    self.scanner.advance();
                    if !self.scanner.at('=') {
                        return Err(self.scanner.error("Expected !=, not just !"));
                    }
                    self.scanner.advance_past_whitespace();
                    let rhs = self.parse_relational()?;
                    lhs = Expr::not(Expr::binary(BinaryOp::Equals, lhs, rhs));
                }
                _ => {
                    self.expression_depth = depth;
                    return Ok(lhs);
                }
            }
        }
    }

    /// Only `<` is primitive: `a <= b` is `!(b < a)`, `a > b` is `b < a`,
    /// and `a >= b` is `!(a < b)`.
    fn parse_relational(&mut self) -> ParseResult<Expr> {
        let depth = self.expression_depth;
        let mut lhs = self.parse_additive()?;
        loop {
            match self.scanner.current() {
                Some('<') => {
                    self.descend()?;
                    self.scanner.advance();
                    if self.scanner.at('=') {
                        self.scanner.advance_past_whitespace();
                        let rhs = self.parse_additive()?;
                        lhs = Expr::not(Expr::binary(BinaryOp::Less, rhs, lhs));
                    } else {
                        self.scanner.skip_whitespace();
                        let rhs = self.parse_additive()?;
                        lhs = Expr::binary(BinaryOp::Less, lhs, rhs);
                    }
                }
                Some('>') => {
                    self.descend()?;
                    self.scanner.advance();
                    if self.scanner.at('=') {
                        self.scanner.advance_past_whitespace();
                        let rhs = self.parse_additive()?;
                        lhs = Expr::not(Expr::binary(BinaryOp::Less, lhs, rhs));
                    } else {
                        self.scanner.skip_whitespace();
                        let rhs = self.parse_additive()?;
                        lhs = Expr::binary(BinaryOp::Less, rhs, lhs);
                    }
                }
                _ => {
                    self.expression_depth = depth;
                    return Ok(lhs);
                }
            }
        }
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let depth = self.expression_depth;
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.scanner.current() {
                Some('+') => BinaryOp::Add,
                Some('-') => BinaryOp::Subtract,
                _ => {
                    self.expression_depth = depth;
                    return Ok(lhs);
                }
            };
            self.descend()?;
            self.scanner.advance_past_whitespace();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let depth = self.expression_depth;
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.scanner.current() {
                Some('*') => BinaryOp::Multiply,
                Some('/') => BinaryOp::Divide,
                Some('%') => BinaryOp::Remainder,
                _ => {
                    self.expression_depth = depth;
                    return Ok(lhs);
                }
            };
            self.descend()?;
            self.scanner.advance_past_whitespace();
            let rhs = self.parse_unary()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        self.descend()?;
        let line = self.scanner.line();
        let expr = match self.scanner.current() {
            Some('(') => {
                self.scanner.advance_past_whitespace();
                let expr = self.parse_or()?;
                self.scanner.expect(')')?;
                expr
            }
            Some('!') => {
                self.scanner.advance_past_whitespace();
                Expr::not(self.parse_unary()?)
            }
            Some('$') => {
                self.scanner.advance();
                self.parse_reference()?.into()
            }
            Some('"') => self.parse_string_literal()?,
            Some('[') => self.parse_list_literal()?,
            Some('-') => {
                self.scanner.advance();
                if self.scanner.current().is_some_and(|c| c.is_ascii_digit()) {
                    self.parse_int_literal("-")?
                } else {
                    self.scanner.skip_whitespace();
                    Expr::negate(self.parse_unary()?)
                }
            }
            Some(c) if c.is_ascii_digit() => self.parse_int_literal("")?,
            Some(c) if c.is_alphabetic() => self.parse_boolean_literal()?,
            _ => return Err(self.scanner.error("Expected an expression")),
        };
        self.scanner.skip_whitespace();
        self.expression_depth -= 1;
        Ok(Expr { line, ..expr })
    }

    /// Go one level deeper into the current expression.
    fn descend(&mut self) -> ParseResult<()> {
        if self.expression_depth >= MAX_EXPRESSION_DEPTH {
            return Err(self.scanner.error("Expression nested too deeply"));
        }
        self.expression_depth += 1;
        Ok(())
    }

    fn parse_string_literal(&mut self) -> ParseResult<Expr> {
        let line = self.scanner.line();
        // Skip opening quote
        self.scanner.advance();
        let mut value = String::new();
        loop {
            match self.scanner.current() {
                None | Some('\n') => {
                    return Err(self.scanner.error("Unterminated string constant"));
                }
                Some('"') => break,
                Some(c @ ('$' | '\\')) => {
                    return Err(self
                        .scanner
                        .error(format!("Unsupported character {c} in string constant")));
                }
                Some(c) => {
                    value.push(c);
                    self.scanner.advance();
                }
            }
        }
        self.scanner.advance();
        Ok(Expr::constant(value, line))
    }

    fn parse_int_literal(&mut self, prefix: &str) -> ParseResult<Expr> {
        let line = self.scanner.line();
        let digits = self.scanner.take_while(|c| c.is_ascii_digit());
        let text = format!("{prefix}{digits}");
        match text.parse::<i32>() {
            Ok(value) => Ok(Expr::constant(value, line)),
            Err(_) => Err(self.scanner.error(format!("Invalid integer: {text}"))),
        }
    }

    fn parse_boolean_literal(&mut self) -> ParseResult<Expr> {
        let line = self.scanner.line();
        match self.parse_id("Identifier without $")?.as_str() {
            "true" => Ok(Expr::constant(true, line)),
            "false" => Ok(Expr::constant(false, line)),
            _ => Err(self.scanner.error(
                "Identifier in expression must be preceded by $ or be true or false",
            )),
        }
    }

    /// `[a, b, ...]` or `[from..to]`.
    fn parse_list_literal(&mut self) -> ParseResult<Expr> {
        let line = self.scanner.line();
        self.scanner.advance_past_whitespace();
        if self.scanner.at(']') {
            self.scanner.advance();
            return Ok(Expr {
                kind: ExprKind::List(Vec::new()),
                line,
            });
        }
        let first = self.parse_expression()?;
        if self.scanner.at('.') && self.scanner.peek_next() == Some('.') {
            self.scanner.advance();
            self.scanner.advance();
            let last = self.parse_expression()?;
            self.scanner.expect(']')?;
            return Ok(Expr {
                kind: ExprKind::Range(Box::new(first), Box::new(last)),
                line,
            });
        }
        let mut items = vec![first];
        while self.scanner.at(',') {
            self.scanner.advance();
            items.push(self.parse_expression()?);
        }
        self.scanner.expect(']')?;
        Ok(Expr {
            kind: ExprKind::List(items),
            line,
        })
    }

    fn parse_id(&mut self, what: &str) -> ParseResult<String> {
        if !self.scanner.current().is_some_and(char::is_alphabetic) {
            return Err(self
                .scanner
                .error(format!("{what} should start with a letter")));
        }
        Ok(self
            .scanner
            .take_while(|c| c.is_alphanumeric() || c == '-' || c == '_')
            .to_string())
    }
}

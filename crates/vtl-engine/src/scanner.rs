/*
 * scanner.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Single-character lookahead over template text.

use crate::error::ParseError;

/// Number of characters of remaining input quoted in parse errors.
const ERROR_CONTEXT_CHARS: usize = 20;

/// A reader over the template source that always exposes the next
/// unconsumed character, and tracks the line it sits on.
#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    input: &'a str,
    /// Byte offset of the current (unconsumed) character.
    pos: usize,
    line: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
        }
    }

    /// The next unconsumed character, or `None` at end of input.
    pub fn current(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// The character after [`current`](Self::current).
    pub fn peek_next(&self) -> Option<char> {
        let mut chars = self.rest().chars();
        chars.next();
        chars.next()
    }

    /// Whether the current character is `c`.
    pub fn at(&self, c: char) -> bool {
        self.current() == Some(c)
    }

    pub fn at_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// 1-based line of the current character.
    pub fn line(&self) -> usize {
        self.line
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    /// Consume the current character and return the new current one.
    pub fn advance(&mut self) -> Option<char> {
        if let Some(c) = self.current() {
            self.pos += c.len_utf8();
            if c == '\n' {
                self.line += 1;
            }
        }
        self.current()
    }

    pub fn skip_whitespace(&mut self) {
        while self.current().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    /// Consume the current character, then any whitespace after it.
    pub fn advance_past_whitespace(&mut self) {
        self.advance();
        self.skip_whitespace();
    }

    /// Skip whitespace, then consume `expected` or fail.
    pub fn expect(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        if self.at(expected) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("Expected {expected}")))
        }
    }

    /// Consume characters while `pred` holds, returning them.
    pub fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.current().is_some_and(&pred) {
            self.advance();
        }
        &self.input[start..self.pos]
    }

    /// The start of the remaining input as quoted in parse errors, or `EOF`.
    pub fn context(&self) -> String {
        if self.at_eof() {
            return "EOF".to_string();
        }
        let mut chars = self.rest().chars();
        let mut quoted: String = chars.by_ref().take(ERROR_CONTEXT_CHARS).collect();
        if chars.next().is_some() {
            quoted.push_str("...");
        }
        quoted
    }

    /// Build a parse error at the current position, quoting what follows.
    pub fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.line, self.context())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookahead_and_lines() {
        let mut scanner = Scanner::new("a\nb");
        assert_eq!(scanner.current(), Some('a'));
        assert_eq!(scanner.peek_next(), Some('\n'));
        assert_eq!(scanner.line(), 1);

        assert_eq!(scanner.advance(), Some('\n'));
        assert_eq!(scanner.line(), 1);
        assert_eq!(scanner.advance(), Some('b'));
        assert_eq!(scanner.line(), 2);
        assert_eq!(scanner.advance(), None);
        assert!(scanner.at_eof());
        assert_eq!(scanner.advance(), None);
    }

    #[test]
    fn test_take_while_multibyte() {
        let mut scanner = Scanner::new("héllo wörld");
        assert_eq!(scanner.take_while(|c| c.is_alphabetic()), "héllo");
        assert_eq!(scanner.current(), Some(' '));
    }

    #[test]
    fn test_error_context_is_truncated() {
        let scanner = Scanner::new("abcdefghijklmnopqrstuvwxyz");
        let err = scanner.error("Oops");
        assert_eq!(err.context, "abcdefghijklmnopqrst...");
        assert_eq!(err.line, 1);

        let short = Scanner::new("abc").error("Oops");
        assert_eq!(short.context, "abc");
    }

    #[test]
    fn test_error_at_eof() {
        let mut scanner = Scanner::new("x");
        scanner.advance();
        assert_eq!(scanner.error("Expected )").context, "EOF");
    }

    #[test]
    fn test_expect_skips_whitespace() {
        let mut scanner = Scanner::new("  ( x");
        assert!(scanner.expect('(').is_ok());
        let err = scanner.expect(')').unwrap_err();
        assert_eq!(err.message, "Expected )");
        assert_eq!(err.context, "x");
    }
}

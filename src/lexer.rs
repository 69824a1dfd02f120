//! Lexical analysis (tokenization) of a single input line.
//!
//! The shell has no operators, so every token is a plain string. Quoting and
//! backslash escapes only control where one token ends and the next begins.

use thiserror::Error;

/// Errors that can occur during the lexical analysis process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexingError {
    /// A closing quote (single or double) was not found.
    #[error("unclosed quote")]
    UnclosedQuote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Unquoted,
    /// Inside a quoted region opened by the contained character.
    Quoted(char),
}

struct LexingFSM<'a> {
    input: std::str::Chars<'a>,
    state: LexingState,
    escaped: bool,
    buffer: String,
}

impl<'a> LexingFSM<'a> {
    fn new(line: &'a str) -> Self {
        LexingFSM {
            input: line.chars(),
            state: LexingState::Unquoted,
            escaped: false,
            buffer: String::new(),
        }
    }

    /// Runs the machine over the whole input.
    ///
    /// A pending escape at the end of input (a bare trailing backslash) is
    /// dropped without producing a character.
    fn make_tokens(mut self) -> Result<Vec<String>, LexingError> {
        let mut out = Vec::new();

        while let Some(ch) = self.input.next() {
            if self.escaped {
                self.buffer.push(ch);
                self.escaped = false;
                continue;
            }
            match self.state {
                LexingState::Unquoted => self.handle_unquoted(ch, &mut out),
                LexingState::Quoted(quote) => self.handle_quoted(ch, quote),
            }
        }

        if let LexingState::Quoted(_) = self.state {
            return Err(LexingError::UnclosedQuote);
        }

        self.finish_token(&mut out);
        Ok(out)
    }

    fn handle_unquoted(&mut self, ch: char, out: &mut Vec<String>) {
        match ch {
            '\\' => self.escaped = true,
            '"' | '\'' => self.state = LexingState::Quoted(ch),
            ' ' | '\t' => self.finish_token(out),
            c => self.buffer.push(c),
        }
    }

    fn handle_quoted(&mut self, ch: char, quote: char) {
        match ch {
            '\\' => self.escaped = true,
            c if c == quote => self.state = LexingState::Unquoted,
            // whitespace and the other quote character are literal here
            c => self.buffer.push(c),
        }
    }

    fn finish_token(&mut self, out: &mut Vec<String>) {
        if !self.buffer.is_empty() {
            out.push(std::mem::take(&mut self.buffer));
        }
    }
}

/// Splits a raw input line into tokens, honoring quotes and backslash escapes.
///
/// Empty input (or input made only of whitespace) yields an empty vector; the
/// caller decides whether that is an error.
pub fn split_into_tokens(line: &str) -> Result<Vec<String>, LexingError> {
    LexingFSM::new(line).make_tokens()
}

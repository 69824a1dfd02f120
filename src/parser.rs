//! Turns an input line into a [`Command`] and checks it before dispatch.

use crate::command::Command;
use crate::lexer::{self, LexingError};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

static MINUTES_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").unwrap());
// MM:SS or HH:MM:SS
static CLOCK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+:\d+(:\d+)?$").unwrap());

/// Errors that can occur while building a [`Command`] from a line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The line was blank.
    #[error("empty command")]
    Empty,
    /// The tokenizer rejected the line.
    #[error("failed to tokenize command: {0}")]
    Tokenize(#[from] LexingError),
}

/// Reasons a well-formed command is still refused before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("command name cannot be empty")]
    EmptyName,
    #[error("cannot specify both -N (nodes) and -w (nodelist)")]
    ConflictingOptions,
    #[error("invalid time format: {0} (use format: HH:MM:SS, MM:SS or minutes)")]
    InvalidTimeFormat(String),
}

struct CommandBuilder {
    tokens: Vec<String>,
    pos: usize,
}

impl CommandBuilder {
    fn from(tokens: Vec<String>) -> Self {
        CommandBuilder { tokens, pos: 0 }
    }

    fn consume(&mut self) -> Option<String> {
        let token = self.tokens.get_mut(self.pos).map(std::mem::take);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn build(mut self) -> Result<Command, ParseError> {
        let name = self.consume().ok_or(ParseError::Empty)?;
        let mut cmd = Command::new(name);

        while let Some(token) = self.consume() {
            if is_option(&token) {
                // An option swallows the next token as its value unless that
                // token is an option itself.
                let value = match self.peek() {
                    Some(next) if !is_option(next) => self.consume().unwrap_or_default(),
                    _ => String::new(),
                };
                cmd.options.insert(token, value);
            } else {
                cmd.args.push(token);
            }
        }

        Ok(cmd)
    }
}

fn is_option(token: &str) -> bool {
    token.starts_with('-')
}

/// Parses a raw line into a [`Command`].
///
/// Token 0 is the command name. Tokens starting with `-` are options; an
/// option takes the following token as its value when that token does not
/// start with `-`, otherwise its value is empty. Everything else is a
/// positional argument.
pub fn parse(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError::Empty);
    }
    let tokens = lexer::split_into_tokens(line)?;
    CommandBuilder::from(tokens).build()
}

/// Rejects commands that must not reach a handler or external program.
pub fn validate(cmd: &Command) -> Result<(), ValidationError> {
    if cmd.name.is_empty() {
        return Err(ValidationError::EmptyName);
    }

    if cmd.has_option("-N") && cmd.has_option("-w") {
        return Err(ValidationError::ConflictingOptions);
    }

    // `-t` without a value is a plain flag (e.g. `history -t`), nothing to check.
    if let Some(time) = cmd.options.get("-t").filter(|t| !t.is_empty()) {
        if !is_valid_time_format(time) {
            return Err(ValidationError::InvalidTimeFormat(time.clone()));
        }
    }

    Ok(())
}

/// Accepts bare minutes (`90`), `MM:SS` and `HH:MM:SS`.
pub fn is_valid_time_format(time: &str) -> bool {
    MINUTES_REGEX.is_match(time) || CLOCK_REGEX.is_match(time)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_option_with_value() {
        let cmd = parse("run -N 2 hostname").unwrap();
        assert_eq!(cmd.name, "run");
        assert_eq!(cmd.args, vec!["hostname"]);
        assert_eq!(cmd.options.len(), 1);
        assert_eq!(cmd.options["-N"], "2");
    }

    #[test]
    fn test_parse_option_swallows_following_word() {
        let cmd = parse("run -v hostname").unwrap();
        assert!(cmd.args.is_empty());
        assert_eq!(cmd.options["-v"], "hostname");
    }

    #[test]
    fn test_parse_flag_followed_by_option() {
        let cmd = parse("history -t -d").unwrap();
        assert_eq!(cmd.options["-t"], "");
        assert_eq!(cmd.options["-d"], "");
        assert!(cmd.args.is_empty());
    }

    #[test]
    fn test_parse_last_duplicate_option_wins() {
        let cmd = parse("run -p debug -p gpu hostname").unwrap();
        assert_eq!(cmd.options["-p"], "gpu");
        assert_eq!(cmd.args, vec!["hostname"]);
    }

    #[test]
    fn test_parse_positional_order_is_kept() {
        let cmd = parse("submit a.sh b c").unwrap();
        assert_eq!(cmd.args, vec!["a.sh", "b", "c"]);
    }

    #[test]
    fn test_parse_quoted_option_value() {
        let cmd = parse(r#"run -J "my job" ./sim"#).unwrap();
        assert_eq!(cmd.options["-J"], "my job");
        assert_eq!(cmd.args, vec!["./sim"]);
    }

    #[test]
    fn test_parse_empty_line() {
        assert_eq!(parse(""), Err(ParseError::Empty));
        assert_eq!(parse("   "), Err(ParseError::Empty));
        assert_eq!(parse("\"\""), Err(ParseError::Empty));
    }

    #[test]
    fn test_parse_unclosed_quote() {
        assert_eq!(
            parse("run 'oops"),
            Err(ParseError::Tokenize(LexingError::UnclosedQuote))
        );
    }

    #[test]
    fn test_validate_conflicting_node_options() {
        let cmd = Command::new("run")
            .with_option("-N", "2")
            .with_option("-w", "node1");
        assert_eq!(validate(&cmd), Err(ValidationError::ConflictingOptions));
    }

    #[test]
    fn test_validate_time_formats() {
        let bad = Command::new("run").with_option("-t", "abc");
        assert_eq!(
            validate(&bad),
            Err(ValidationError::InvalidTimeFormat("abc".to_string()))
        );

        for ok in ["10:00", "01:30:00", "45"] {
            let cmd = Command::new("run").with_option("-t", ok);
            assert_eq!(validate(&cmd), Ok(()), "{ok} should be accepted");
        }

        for bad in ["1:2:3:4", "10:", ":30", "1h"] {
            let cmd = Command::new("run").with_option("-t", bad);
            assert!(validate(&cmd).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_validate_time_flag_without_value() {
        let cmd = parse("history -t").unwrap();
        assert_eq!(validate(&cmd), Ok(()));
    }

    #[test]
    fn test_validate_empty_name() {
        assert_eq!(
            validate(&Command::default()),
            Err(ValidationError::EmptyName)
        );
    }
}

use crate::command::Command;
use crate::parser::{self, ParseError};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AliasError {
    #[error("error parsing alias {alias}: {source}")]
    Parse { alias: String, source: ParseError },
}

/// Replaces an aliased command name by its expansion.
///
/// The new line is `expansion` followed by the original positional arguments;
/// the original options are dropped. Expansion happens once: if the result
/// names another alias it is dispatched as written.
pub fn resolve(cmd: Command, aliases: &HashMap<String, String>) -> Result<Command, AliasError> {
    let Some(expansion) = aliases.get(&cmd.name) else {
        return Ok(cmd);
    };

    let mut line = expansion.clone();
    for arg in &cmd.args {
        line.push(' ');
        line.push_str(arg);
    }

    parser::parse(&line).map_err(|source| AliasError::Parse {
        alias: cmd.name.clone(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::LexingError;
    use crate::parser::parse;

    fn table(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_alias_expands_with_args() {
        let aliases = table(&[("q", "queue")]);
        let resolved = resolve(parse("q alice").unwrap(), &aliases).unwrap();
        assert_eq!(resolved, parse("queue alice").unwrap());
    }

    #[test]
    fn test_expansion_options_are_parsed() {
        let aliases = table(&[("gpurun", "run -p gpu -N 2")]);
        let resolved = resolve(parse("gpurun nvidia-smi").unwrap(), &aliases).unwrap();
        assert_eq!(resolved.name, "run");
        assert_eq!(resolved.options["-p"], "gpu");
        assert_eq!(resolved.options["-N"], "2");
        assert_eq!(resolved.args, vec!["nvidia-smi"]);
    }

    #[test]
    fn test_original_options_are_dropped() {
        let aliases = table(&[("q", "queue")]);
        let resolved = resolve(parse("q --all bob").unwrap(), &aliases).unwrap();
        assert_eq!(resolved, parse("queue").unwrap());
    }

    #[test]
    fn test_single_level_only() {
        let aliases = table(&[("a", "b x"), ("b", "queue")]);
        let resolved = resolve(parse("a").unwrap(), &aliases).unwrap();
        assert_eq!(resolved.name, "b");
        assert_eq!(resolved.args, vec!["x"]);
    }

    #[test]
    fn test_unknown_name_is_unchanged() {
        let cmd = parse("nodes -l").unwrap();
        let resolved = resolve(cmd.clone(), &table(&[("q", "queue")])).unwrap();
        assert_eq!(resolved, cmd);
    }

    #[test]
    fn test_bad_expansion_is_alias_error() {
        let aliases = table(&[("broken", "run 'oops")]);
        let err = resolve(parse("broken").unwrap(), &aliases).unwrap_err();
        assert_eq!(
            err,
            AliasError::Parse {
                alias: "broken".into(),
                source: ParseError::Tokenize(LexingError::UnclosedQuote),
            }
        );
    }
}

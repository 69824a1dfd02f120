//! Name → handler table and the fallback policy for unknown names.

use crate::command::{Command, CommandHandler, CommandInfo, ShellContext};
use crate::external::{CommandResult, ToolchainError};
use crate::history::HistoryError;
use std::collections::HashMap;
use std::io::{self, Write};
use thiserror::Error;
use tracing::debug;

/// Toolchain programs run through the captured execution path.
pub const TOOLCHAIN_COMMANDS: &[&str] = &[
    "srun", "sbatch", "scancel", "squeue", "sinfo", "sacct", "scontrol", "sstat", "sprio",
    "sshare", "sreport", "salloc", "sattach", "sacctmgr",
];

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Wrong arguments for a built-in; carries the usage line.
    #[error("usage: {0}")]
    Usage(String),
    #[error(transparent)]
    Toolchain(#[from] ToolchainError),
    #[error("{program} failed with exit code {exit_code}")]
    Failed { program: String, exit_code: i32 },
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub fn is_toolchain_command(name: &str) -> bool {
    TOOLCHAIN_COMMANDS.contains(&name)
}

#[derive(Default)]
pub struct Registry {
    handlers: HashMap<String, Box<dyn CommandHandler>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` to `handler`, replacing any previous binding.
    pub fn register(&mut self, name: impl Into<String>, handler: Box<dyn CommandHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<&dyn CommandHandler> {
        self.handlers.get(name).map(|h| h.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn command_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn command_infos(&self) -> Vec<CommandInfo> {
        self.command_names()
            .into_iter()
            .filter_map(|name| {
                self.get(name).map(|h| CommandInfo {
                    name: name.to_string(),
                    description: h.description(),
                    usage: h.usage(),
                })
            })
            .collect()
    }

    /// Runs `cmd`.
    ///
    /// Registered names go to their handler. Unregistered toolchain programs
    /// run captured (with a timeout) and fail on a non-zero exit; anything
    /// else runs interactively and only fails if it can't be started.
    pub fn dispatch(
        &self,
        cmd: &Command,
        ctx: &mut dyn ShellContext,
        stdout: &mut dyn Write,
    ) -> Result<(), DispatchError> {
        if let Some(handler) = self.get(&cmd.name) {
            debug!("dispatch {} to builtin", cmd.name);
            return handler.execute(cmd, ctx, stdout);
        }

        let args = flatten_args(cmd);
        if is_toolchain_command(&cmd.name) {
            debug!("dispatch {} as captured toolchain command", cmd.name);
            let result = ctx.client().execute(&cmd.name, &args)?;
            echo_result(stdout, &cmd.name, &result)
        } else {
            debug!("dispatch {} as interactive program", cmd.name);
            stdout.flush()?;
            ctx.client().execute_interactive(&cmd.name, &args)?;
            Ok(())
        }
    }
}

/// Flattens a command back into an argument list: options in key order, then
/// positional arguments.
///
/// `--key value` becomes `--key=value`, `-k value` stays two arguments and a
/// flag is just its key.
pub fn flatten_args(cmd: &Command) -> Vec<String> {
    let mut args = Vec::with_capacity(cmd.options.len() * 2 + cmd.args.len());
    for (key, value) in &cmd.options {
        if value.is_empty() {
            args.push(key.clone());
        } else if key.starts_with("--") {
            args.push(format!("{key}={value}"));
        } else {
            args.push(key.clone());
            args.push(value.clone());
        }
    }
    args.extend(cmd.args.iter().cloned());
    args
}

/// Writes a captured run's stdout then stderr verbatim and turns a non-zero
/// exit into an error.
pub fn echo_result(
    stdout: &mut dyn Write,
    program: &str,
    result: &CommandResult,
) -> Result<(), DispatchError> {
    stdout.write_all(result.stdout.as_bytes())?;
    stdout.write_all(result.stderr.as_bytes())?;
    if result.success {
        Ok(())
    } else {
        Err(DispatchError::Failed {
            program: program.to_string(),
            exit_code: result.exit_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::testing::{Call, FakeContext};

    struct Marker(&'static str);

    impl CommandHandler for Marker {
        fn description(&self) -> &'static str {
            "marker"
        }

        fn usage(&self) -> &'static str {
            "marker"
        }

        fn execute(
            &self,
            _cmd: &Command,
            _ctx: &mut dyn ShellContext,
            stdout: &mut dyn Write,
        ) -> Result<(), DispatchError> {
            write!(stdout, "{}", self.0)?;
            Ok(())
        }
    }

    #[test]
    fn test_registered_handler_wins() {
        let mut registry = Registry::new();
        registry.register("run", Box::new(Marker("run")));
        let mut ctx = FakeContext::new();
        let mut out = Vec::new();

        registry
            .dispatch(&parse("run hostname").unwrap(), &mut ctx, &mut out)
            .unwrap();

        assert_eq!(out, b"run");
        assert!(ctx.client.calls().is_empty());
    }

    #[test]
    fn test_last_registration_wins() {
        let mut registry = Registry::new();
        registry.register("x", Box::new(Marker("first")));
        registry.register("x", Box::new(Marker("second")));
        let mut out = Vec::new();

        registry
            .dispatch(&Command::new("x"), &mut FakeContext::new(), &mut out)
            .unwrap();

        assert_eq!(out, b"second");
        assert_eq!(registry.command_names(), vec!["x"]);
    }

    #[test]
    fn test_toolchain_command_runs_captured() {
        let mut registry = Registry::new();
        registry.register("run", Box::new(Marker("run")));
        registry.register("status", Box::new(Marker("status")));
        let mut ctx = FakeContext::new();
        ctx.client.respond("squeue", 0, "JOBID\n", "warning\n");
        let mut out = Vec::new();

        registry
            .dispatch(&parse("squeue -u bob").unwrap(), &mut ctx, &mut out)
            .unwrap();

        assert_eq!(
            ctx.client.calls(),
            vec![Call::Captured("squeue".into(), vec!["-u".into(), "bob".into()])]
        );
        assert_eq!(String::from_utf8(out).unwrap(), "JOBID\nwarning\n");
    }

    #[test]
    fn test_toolchain_nonzero_exit_is_error_after_echo() {
        let registry = Registry::new();
        let mut ctx = FakeContext::new();
        ctx.client.respond("scancel", 1, "", "scancel: error: invalid job id\n");
        let mut out = Vec::new();

        let err = registry
            .dispatch(&parse("scancel 99").unwrap(), &mut ctx, &mut out)
            .unwrap_err();

        assert!(matches!(err, DispatchError::Failed { exit_code: 1, .. }));
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "scancel: error: invalid job id\n"
        );
    }

    #[test]
    fn test_other_programs_run_interactive() {
        let registry = Registry::new();
        let mut ctx = FakeContext::new();

        let cmd = parse("less --chop-long-lines out.txt").unwrap();
        registry.dispatch(&cmd, &mut ctx, &mut Vec::new()).unwrap();

        assert_eq!(
            ctx.client.calls(),
            vec![Call::Interactive(
                "less".into(),
                vec!["--chop-long-lines=out.txt".into()]
            )]
        );
    }

    #[test]
    fn test_flatten_args() {
        let cmd = parse("sinfo --long -N 2 --format %P extra").unwrap();
        assert_eq!(
            flatten_args(&cmd),
            vec!["--format=%P", "--long", "-N", "2", "extra"]
        );
    }
}

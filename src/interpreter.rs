use crate::alias::{self, AliasError};
use crate::builtin::register_builtins;
use crate::command::{CommandInfo, ShellContext};
use crate::config::Config;
use crate::external::Toolchain;
use crate::history::{HistoryError, SharedHistory};
use crate::parser::{self, ParseError, ValidationError};
use crate::prompt;
use crate::registry::{DispatchError, Registry};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{self, Write};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a single input line failed. None of these end the REPL.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("error parsing command: {0}")]
    Parse(#[from] ParseError),
    #[error("invalid command: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Alias(#[from] AliasError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

struct ShellState {
    config: Config,
    history: SharedHistory,
    client: Box<dyn Toolchain>,
    running: bool,
}

/// What a handler sees while one line runs.
struct Session<'a> {
    state: &'a mut ShellState,
    registry: &'a Registry,
}

impl ShellContext for Session<'_> {
    fn history(&self) -> &SharedHistory {
        &self.state.history
    }

    fn config(&self) -> &Config {
        &self.state.config
    }

    fn config_mut(&mut self) -> &mut Config {
        &mut self.state.config
    }

    fn save_config(&self) -> anyhow::Result<()> {
        self.state.config.save()
    }

    fn client(&self) -> &dyn Toolchain {
        self.state.client.as_ref()
    }

    fn stop(&mut self) {
        self.state.running = false;
    }

    fn commands(&self) -> Vec<CommandInfo> {
        self.registry.command_infos()
    }
}

/// The interactive Slurm shell.
///
/// Each line goes through tokenizing, parsing, validation and alias
/// expansion before it is dispatched, and every attempt is recorded in the
/// history, failed ones included.
pub struct Interpreter {
    state: ShellState,
    registry: Registry,
}

impl Interpreter {
    /// Creates a shell with all built-in commands registered.
    pub fn new(config: Config, history: SharedHistory, client: Box<dyn Toolchain>) -> Self {
        let mut registry = Registry::new();
        register_builtins(&mut registry);
        Self {
            state: ShellState {
                config,
                history,
                client,
                running: true,
            },
            registry,
        }
    }

    pub fn config(&self) -> &Config {
        &self.state.config
    }

    pub fn history(&self) -> &SharedHistory {
        &self.state.history
    }

    /// `false` once `exit` or `quit` ran.
    pub fn is_running(&self) -> bool {
        self.state.running
    }

    /// Runs one input line and records it in the history.
    ///
    /// A line of the form `!N` is replaced by history entry `N` first; the
    /// replacement is what gets recorded.
    pub fn execute_line(&mut self, line: &str, out: &mut dyn Write) -> Result<(), ShellError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        let start = Instant::now();
        let line = match self.recall(line, out) {
            Ok(line) => line,
            Err(e) => {
                self.record(line, false, start);
                return Err(e);
            }
        };

        let result = self.process(&line, out);
        self.record(&line, result.is_ok(), start);
        result
    }

    fn recall(&self, line: &str, out: &mut dyn Write) -> Result<String, ShellError> {
        let Some(index) = line.strip_prefix('!').and_then(|n| n.parse::<usize>().ok()) else {
            return Ok(line.to_string());
        };
        let recalled = self.state.history.lock().get_by_index(index)?.to_string();
        writeln!(out, "{recalled}")?;
        Ok(recalled)
    }

    fn process(&mut self, line: &str, out: &mut dyn Write) -> Result<(), ShellError> {
        let cmd = parser::parse(line)?;
        parser::validate(&cmd)?;

        let cmd = alias::resolve(cmd, &self.state.config.aliases)?;
        parser::validate(&cmd)?;
        debug!("resolved {line:?} to {cmd:?}");

        let mut session = Session {
            state: &mut self.state,
            registry: &self.registry,
        };
        self.registry.dispatch(&cmd, &mut session, out)?;
        Ok(())
    }

    fn record(&self, line: &str, success: bool, start: Instant) {
        self.state
            .history
            .lock()
            .add(line, success, start.elapsed());
    }

    /// Reads the persisted history. Failures are logged, not returned.
    pub fn load_history(&self) {
        if let Err(e) = self.state.history.lock().load() {
            warn!("failed to load history: {e}");
        }
    }

    pub fn save_history(&self) {
        if let Err(e) = self.state.history.lock().save() {
            warn!("failed to save history: {e}");
        }
    }

    /// Prints the welcome banner and the cluster name, and warns when the
    /// Slurm tools are not installed.
    pub fn welcome(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "╔══════════════════════════════════════════════════════════════╗")?;
        writeln!(out, "║                  Slurm Shell (slsh) v{:<24}║", env!("CARGO_PKG_VERSION"))?;
        writeln!(out, "║               High Performance Computing Shell               ║")?;
        writeln!(out, "╚══════════════════════════════════════════════════════════════╝")?;
        writeln!(out)?;
        writeln!(out, "Welcome to slsh - A specialized shell for Slurm HPC environments!")?;
        writeln!(out, "Type 'help' for available commands or 'exit' to quit.")?;
        writeln!(out)?;

        if let Err(e) = self.state.client.check_available() {
            writeln!(out, "Warning: {e}")?;
            writeln!(out, "Some commands may not work properly.\n")?;
        } else if let Some(cluster) = self.state.client.cluster_name() {
            writeln!(out, "Connected to cluster: {cluster}\n")?;
        }
        Ok(())
    }

    /// Reads lines until EOF, Ctrl-C or `exit`.
    pub fn repl(&mut self) -> anyhow::Result<()> {
        let mut rl = DefaultEditor::new()?;
        for entry in self.state.history.lock().entries() {
            rl.add_history_entry(entry.command.as_str())?;
        }

        while self.state.running {
            let prompt = prompt::render(&self.state.config.prompt);
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    rl.add_history_entry(line)?;
                    let mut stdout = io::stdout();
                    if let Err(e) = self.execute_line(line, &mut stdout) {
                        println!("Error: {e}");
                    }
                    stdout.flush()?;
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err.into()),
            }
        }

        println!("Goodbye!");
        Ok(())
    }
}

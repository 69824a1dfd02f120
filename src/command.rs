use crate::config::Config;
use crate::external::Toolchain;
use crate::history::SharedHistory;
use crate::registry::DispatchError;
use std::collections::BTreeMap;
use std::io::Write;

/// One parsed invocation: `name [args...] [options...]`.
///
/// Options are keyed by the flag exactly as typed (`-N`, `--partition`). A flag
/// given more than once keeps only its last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
    pub options: BTreeMap<String, String>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn has_option(&self, key: &str) -> bool {
        self.options.contains_key(key)
    }

    /// Value of the first of `keys` that is present, e.g. `&["-n", "--count"]`.
    pub fn option(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .find_map(|k| self.options.get(*k))
            .map(String::as_str)
    }
}

/// Short description of a registered command, as shown by `help`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInfo {
    pub name: String,
    pub description: &'static str,
    pub usage: &'static str,
}

/// Capabilities a handler may use while it runs.
///
/// The interpreter owns all shell state; handlers only see it through this
/// interface.
pub trait ShellContext {
    fn history(&self) -> &SharedHistory;

    fn config(&self) -> &Config;

    fn config_mut(&mut self) -> &mut Config;

    /// Persists the current configuration (aliases included).
    fn save_config(&self) -> anyhow::Result<()>;

    fn client(&self) -> &dyn Toolchain;

    /// Asks the REPL loop to terminate after the current line.
    fn stop(&mut self);

    /// Registered commands, sorted by name.
    fn commands(&self) -> Vec<CommandInfo>;
}

/// A command implemented inside the shell.
///
/// Output goes to `stdout`, which is the terminal in the REPL and a buffer in
/// tests.
pub trait CommandHandler {
    fn description(&self) -> &'static str;

    fn usage(&self) -> &'static str;

    fn execute(
        &self,
        cmd: &Command,
        ctx: &mut dyn ShellContext,
        stdout: &mut dyn Write,
    ) -> Result<(), DispatchError>;
}

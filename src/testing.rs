//! Test doubles shared by the unit tests.

use crate::command::{CommandInfo, ShellContext};
use crate::config::Config;
use crate::external::{CommandResult, Toolchain, ToolchainError};
use crate::history::{History, SharedHistory};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Captured(String, Vec<String>),
    Interactive(String, Vec<String>),
}

/// Records every invocation and answers captured runs with canned results
/// (exit 0 and empty output unless told otherwise). Clones share state.
#[derive(Clone, Default)]
pub struct FakeToolchain {
    calls: Rc<RefCell<Vec<Call>>>,
    responses: Rc<RefCell<HashMap<String, CommandResult>>>,
}

impl FakeToolchain {
    pub fn respond(&self, program: &str, exit_code: i32, stdout: &str, stderr: &str) {
        self.responses.borrow_mut().insert(
            program.to_string(),
            CommandResult {
                success: exit_code == 0,
                exit_code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                ..Default::default()
            },
        );
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }
}

impl Toolchain for FakeToolchain {
    fn execute(&self, program: &str, args: &[String]) -> Result<CommandResult, ToolchainError> {
        self.calls
            .borrow_mut()
            .push(Call::Captured(program.to_string(), args.to_vec()));
        Ok(self
            .responses
            .borrow()
            .get(program)
            .cloned()
            .unwrap_or(CommandResult {
                success: true,
                ..Default::default()
            }))
    }

    fn execute_interactive(&self, program: &str, args: &[String]) -> Result<(), ToolchainError> {
        self.calls
            .borrow_mut()
            .push(Call::Interactive(program.to_string(), args.to_vec()));
        Ok(())
    }
}

pub struct FakeContext {
    pub history: SharedHistory,
    pub config: Config,
    pub client: FakeToolchain,
    pub stopped: bool,
    pub infos: Vec<CommandInfo>,
    pub saves: Cell<usize>,
}

impl FakeContext {
    pub fn new() -> Self {
        Self {
            history: History::new(100, PathBuf::from("/nonexistent/slsh_history")).into_shared(),
            config: Config::default(),
            client: FakeToolchain::default(),
            stopped: false,
            infos: Vec::new(),
            saves: Cell::new(0),
        }
    }
}

impl ShellContext for FakeContext {
    fn history(&self) -> &SharedHistory {
        &self.history
    }

    fn config(&self) -> &Config {
        &self.config
    }

    fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    fn save_config(&self) -> anyhow::Result<()> {
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }

    fn client(&self) -> &dyn Toolchain {
        &self.client
    }

    fn stop(&mut self) {
        self.stopped = true;
    }

    fn commands(&self) -> Vec<CommandInfo> {
        self.infos.clone()
    }
}

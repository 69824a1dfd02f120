//! An interactive shell for driving a Slurm cluster.
//!
//! Every input line is tokenized ([`lexer`]), parsed and validated
//! ([`parser`]), expanded through the alias table ([`alias`]) and dispatched
//! by the [`registry`] to a built-in command, to a Slurm tool run with
//! captured output, or to any other program attached to the terminal. The
//! [`history`] module keeps a bounded, persisted log of every line.
//!
//! The main entry point is [`Interpreter`].

pub mod alias;
mod builtin;
pub mod command;
pub mod config;
pub mod external;
mod format;
pub mod history;
mod interpreter;
pub mod job;
pub mod lexer;
pub mod parser;
pub mod prompt;
pub mod registry;

#[cfg(test)]
mod testing;

/// Re-export of the interactive shell.
///
/// See [`Interpreter`] for the high-level API.
pub use interpreter::{Interpreter, ShellError};

use anyhow::{Context, Result};
use argh::FromArgs;
use slurm_shell::config::{self, Config};
use slurm_shell::external::SlurmClient;
use slurm_shell::history::{self, History, SharedHistory};
use slurm_shell::Interpreter;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(FromArgs)]
/// An interactive shell for Slurm clusters.
struct Cli {
    #[argh(option)]
    /// configuration file. Defaults to ~/.config/slsh/config.json.
    config: Option<PathBuf>,

    #[argh(option)]
    /// history file. Defaults to ~/.slsh_history.
    history_file: Option<PathBuf>,

    #[argh(option, short = 'c')]
    /// run a single command line and exit with its status.
    command: Option<String>,

    #[argh(switch)]
    /// do not print the welcome banner.
    no_banner: bool,
}

fn flush_history(history: &SharedHistory) {
    if let Err(e) = history.lock().save() {
        eprintln!("Warning: failed to save history: {e}");
    }
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_env("SLSH_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli: Cli = argh::from_env();
    debug!("start shell");

    let config_path = cli.config.unwrap_or_else(config::default_config_path);
    let config = Config::load(&config_path);
    let client = SlurmClient::new(Duration::from_secs(config.command_timeout));

    let history_path = cli
        .history_file
        .unwrap_or_else(history::default_history_path);
    let history = History::new(config.history_size, history_path).into_shared();

    let mut shell = Interpreter::new(config, history, Box::new(client));
    shell.load_history();

    // must follow load_history: the handler saves whatever is in memory
    let on_signal = shell.history().clone();
    ctrlc::set_handler(move || {
        flush_history(&on_signal);
        println!("\nGoodbye!");
        std::process::exit(0);
    })
    .context("failed to install signal handler")?;

    if let Some(line) = cli.command {
        let result = shell.execute_line(&line, &mut io::stdout());
        shell.save_history();
        return Ok(match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                println!("Error: {e}");
                ExitCode::FAILURE
            }
        });
    }

    if !cli.no_banner {
        shell.welcome(&mut io::stdout())?;
    }
    let result = shell.repl();
    shell.save_history();
    result?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_signal_flush_keeps_loaded_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history");
        fs::write(&path, "1700000000|true|0|queue\n1700000001|false|0|run x\n").unwrap();

        let history = History::new(100, &path).into_shared();
        let shell = Interpreter::new(
            Config::default(),
            history,
            Box::new(SlurmClient::default()),
        );
        shell.load_history();
        flush_history(shell.history());

        let saved = fs::read_to_string(&path).unwrap();
        assert_eq!(saved.lines().count(), 2);
        assert!(saved.ends_with("|run x\n"));
    }
}

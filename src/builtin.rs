//! Commands implemented inside the shell.

use crate::command::{Command, CommandHandler, ShellContext};
use crate::format::{format_duration, format_error, format_success};
use crate::history::format_listing;
use crate::job::JobOptions;
use crate::registry::{DispatchError, Registry, TOOLCHAIN_COMMANDS, echo_result};
use std::io::Write;
use tracing::warn;

/// Registers every built-in and the single-letter shortcuts.
pub fn register_builtins(registry: &mut Registry) {
    registry.register("run", Box::new(Run));
    registry.register("submit", Box::new(Submit));

    registry.register("status", Box::new(Status));
    registry.register("cancel", Box::new(Cancel));
    registry.register("queue", Box::new(Queue));
    registry.register("jobs", Box::new(Jobs));

    registry.register("nodes", Box::new(Nodes));
    registry.register("partitions", Box::new(Partitions));

    registry.register("history", Box::new(HistoryCmd));
    registry.register("alias", Box::new(Alias));
    registry.register("unalias", Box::new(Unalias));
    registry.register("config", Box::new(ConfigCmd));
    registry.register("help", Box::new(Help));
    registry.register("exit", Box::new(Exit));
    registry.register("quit", Box::new(Exit));

    registry.register("q", Box::new(Queue));
    registry.register("j", Box::new(Jobs));
    registry.register("n", Box::new(Nodes));
    registry.register("h", Box::new(Help));
}

fn usage_line(usage: &str) -> DispatchError {
    DispatchError::Usage(usage.lines().next().unwrap_or(usage).to_string())
}

fn current_user() -> Option<String> {
    std::env::var("USER").ok().filter(|u| !u.is_empty())
}

/// Run a command on the cluster with `srun`, applying configured defaults.
pub struct Run;

impl CommandHandler for Run {
    fn description(&self) -> &'static str {
        "Execute a command using srun with configured defaults"
    }

    fn usage(&self) -> &'static str {
        "run [OPTIONS] <command> [arguments...]

Execute a command on the cluster using srun. Options not given fall back to
the configured defaults.

Examples:
  run hostname                    # Run hostname on default resources
  run -N 2 hostname               # Run on 2 nodes
  run -p gpu nvidia-smi           # Run on GPU partition
  run -t 30:00 ./my_simulation    # Run with 30 minute time limit

Options:
  -J, --job-name <name>           Job name
  -p, --partition <partition>     Partition to use
  -N, --nodes <count>             Number of nodes
  -c, --cpus-per-task <count>     CPUs per task
  --mem <memory>                  Memory per node
  -t, --time <time>               Time limit (HH:MM:SS, MM:SS or minutes)
  --qos <qos>                     Quality of Service
  -A, --account <account>         Account to charge
  -o, --output <file>             Output file
  -e, --error <file>              Error file
  -D, --chdir <dir>               Working directory

Any other option is passed to srun unchanged."
    }

    fn execute(
        &self,
        cmd: &Command,
        ctx: &mut dyn ShellContext,
        stdout: &mut dyn Write,
    ) -> Result<(), DispatchError> {
        if cmd.args.is_empty() {
            return Err(usage_line(self.usage()));
        }

        let mut job = JobOptions::from_options(&cmd.options);
        job.apply_defaults(ctx.config());

        writeln!(stdout, "Running: {}", cmd.args.join(" "))?;
        if let Some(partition) = &job.partition {
            writeln!(stdout, "Partition: {partition}")?;
        }
        if let Some(nodes) = job.nodes {
            writeln!(stdout, "Nodes: {nodes}")?;
        }
        if let Some(time) = &job.time {
            writeln!(stdout, "Time limit: {time}")?;
        }
        writeln!(stdout)?;

        let result = ctx.client().run_job(&cmd.args, &job)?;
        stdout.write_all(result.stdout.as_bytes())?;
        stdout.write_all(result.stderr.as_bytes())?;

        let color = ctx.config().color_output;
        let duration = format_duration(result.duration);
        if result.success {
            writeln!(
                stdout,
                "{} (Duration: {duration})",
                format_success("Job completed successfully", color)
            )?;
            Ok(())
        } else {
            let msg = format!("Job failed with exit code {}", result.exit_code);
            writeln!(stdout, "{} (Duration: {duration})", format_error(&msg, color))?;
            Err(DispatchError::Failed {
                program: "srun".to_string(),
                exit_code: result.exit_code,
            })
        }
    }
}

/// Submit a batch script with `sbatch`.
pub struct Submit;

impl CommandHandler for Submit {
    fn description(&self) -> &'static str {
        "Submit a batch job script"
    }

    fn usage(&self) -> &'static str {
        "submit [OPTIONS] <script>

Submit a job script using sbatch. Accepts the same options as `run`."
    }

    fn execute(
        &self,
        cmd: &Command,
        ctx: &mut dyn ShellContext,
        stdout: &mut dyn Write,
    ) -> Result<(), DispatchError> {
        let Some(script) = cmd.args.first() else {
            return Err(usage_line(self.usage()));
        };
        let job = JobOptions::from_options(&cmd.options);
        let result = ctx.client().submit_job(script, &job)?;
        echo_result(stdout, "sbatch", &result)
    }
}

/// Show the state of one job.
pub struct Status;

impl CommandHandler for Status {
    fn description(&self) -> &'static str {
        "Show status of a specific job"
    }

    fn usage(&self) -> &'static str {
        "status <job_id>

Show detailed status information for a specific job.

Examples:
  status 12345    # Show status of job 12345"
    }

    fn execute(
        &self,
        cmd: &Command,
        ctx: &mut dyn ShellContext,
        stdout: &mut dyn Write,
    ) -> Result<(), DispatchError> {
        let Some(job_id) = cmd.args.first() else {
            return Err(usage_line(self.usage()));
        };
        let result = ctx.client().job_status(job_id)?;
        echo_result(stdout, "squeue", &result)
    }
}

/// Cancel a job with `scancel`.
pub struct Cancel;

impl CommandHandler for Cancel {
    fn description(&self) -> &'static str {
        "Cancel a job"
    }

    fn usage(&self) -> &'static str {
        "cancel <job_id>

Cancel a running or pending job."
    }

    fn execute(
        &self,
        cmd: &Command,
        ctx: &mut dyn ShellContext,
        stdout: &mut dyn Write,
    ) -> Result<(), DispatchError> {
        let Some(job_id) = cmd.args.first() else {
            return Err(usage_line(self.usage()));
        };
        let result = ctx.client().cancel_job(job_id)?;
        echo_result(stdout, "scancel", &result)?;
        writeln!(stdout, "Job {job_id} cancelled")?;
        Ok(())
    }
}

/// List queued jobs, for the current user unless one is named.
pub struct Queue;

impl CommandHandler for Queue {
    fn description(&self) -> &'static str {
        "Show the job queue"
    }

    fn usage(&self) -> &'static str {
        "queue [user]

Show the job queue. Without arguments, shows jobs for the current user.
With a username, shows jobs for that user.

Examples:
  queue           # Show your jobs
  queue alice     # Show alice's jobs"
    }

    fn execute(
        &self,
        cmd: &Command,
        ctx: &mut dyn ShellContext,
        stdout: &mut dyn Write,
    ) -> Result<(), DispatchError> {
        let user = cmd.args.first().cloned().or_else(current_user);
        let result = ctx.client().queue(user.as_deref())?;
        echo_result(stdout, "squeue", &result)
    }
}

pub struct Jobs;

impl CommandHandler for Jobs {
    fn description(&self) -> &'static str {
        "Show your jobs"
    }

    fn usage(&self) -> &'static str {
        "jobs

Show all jobs of the current user."
    }

    fn execute(
        &self,
        _cmd: &Command,
        ctx: &mut dyn ShellContext,
        stdout: &mut dyn Write,
    ) -> Result<(), DispatchError> {
        let result = ctx.client().queue(current_user().as_deref())?;
        echo_result(stdout, "squeue", &result)
    }
}

pub struct Nodes;

impl CommandHandler for Nodes {
    fn description(&self) -> &'static str {
        "Show node information"
    }

    fn usage(&self) -> &'static str {
        "nodes

Show cluster node information."
    }

    fn execute(
        &self,
        _cmd: &Command,
        ctx: &mut dyn ShellContext,
        stdout: &mut dyn Write,
    ) -> Result<(), DispatchError> {
        let result = ctx.client().nodes()?;
        echo_result(stdout, "sinfo", &result)
    }
}

pub struct Partitions;

impl CommandHandler for Partitions {
    fn description(&self) -> &'static str {
        "Show partition information"
    }

    fn usage(&self) -> &'static str {
        "partitions

Show cluster partition information."
    }

    fn execute(
        &self,
        _cmd: &Command,
        ctx: &mut dyn ShellContext,
        stdout: &mut dyn Write,
    ) -> Result<(), DispatchError> {
        let result = ctx.client().partitions()?;
        echo_result(stdout, "sinfo", &result)
    }
}

/// Show, search or clear the command history.
pub struct HistoryCmd;

impl CommandHandler for HistoryCmd {
    fn description(&self) -> &'static str {
        "Show command history"
    }

    fn usage(&self) -> &'static str {
        "history [-t] [-d] [-n <count>] [-s <text>] [-c]

Show command history. Re-run an entry with !<number>.

Options:
  -t, --time          Show timestamps
  -d, --duration      Show execution duration
  -n, --count <n>     Show only the last <n> entries
  -s, --search <text> Show entries containing <text> (case-insensitive)
  -c, --clear         Clear the history"
    }

    fn execute(
        &self,
        cmd: &Command,
        ctx: &mut dyn ShellContext,
        stdout: &mut dyn Write,
    ) -> Result<(), DispatchError> {
        let show_time = ctx.config().show_timestamps
            || cmd.has_option("-t")
            || cmd.has_option("--time");
        let show_duration = cmd.has_option("-d") || cmd.has_option("--duration");

        let mut history = ctx.history().lock();

        if cmd.has_option("-c") || cmd.has_option("--clear") {
            history.clear();
            writeln!(stdout, "History cleared")?;
            return Ok(());
        }

        if let Some(query) = cmd.option(&["-s", "--search"]) {
            if query.is_empty() {
                return Err(usage_line(self.usage()));
            }
            let matches = history.search(query);
            if matches.is_empty() {
                writeln!(stdout, "No matching history entries")?;
            } else {
                let listing = format_listing(matches.into_iter(), show_time, show_duration);
                stdout.write_all(listing.as_bytes())?;
            }
            return Ok(());
        }

        if let Some(count) = cmd.option(&["-n", "--count"]) {
            let count: usize = count.parse().map_err(|_| usage_line(self.usage()))?;
            let last = history.last(count);
            let offset = history.len() - last.len();
            let listing = format_listing(
                last.iter().enumerate().map(|(i, e)| (offset + i, e)),
                show_time,
                show_duration,
            );
            stdout.write_all(listing.as_bytes())?;
            return Ok(());
        }

        stdout.write_all(history.format_entries(show_time, show_duration).as_bytes())?;
        Ok(())
    }
}

/// List, show or define aliases.
pub struct Alias;

impl CommandHandler for Alias {
    fn description(&self) -> &'static str {
        "List or define command aliases"
    }

    fn usage(&self) -> &'static str {
        "alias [name [expansion...]]

Without arguments, list all aliases. With a name, show that alias. With a
name and an expansion, define it and save the configuration. Quote
expansions that contain options.

Examples:
  alias                           # List aliases
  alias myrun \"run -N 4 -p gpu\"   # Define an alias
  myrun ./sim                     # Runs: run -N 4 -p gpu ./sim"
    }

    fn execute(
        &self,
        cmd: &Command,
        ctx: &mut dyn ShellContext,
        stdout: &mut dyn Write,
    ) -> Result<(), DispatchError> {
        if !cmd.options.is_empty() {
            return Err(usage_line(self.usage()));
        }

        match cmd.args.as_slice() {
            [] => {
                let mut aliases: Vec<_> = ctx.config().aliases.iter().collect();
                aliases.sort();
                for (name, expansion) in aliases {
                    writeln!(stdout, "alias {name}='{expansion}'")?;
                }
                Ok(())
            }
            [name] => match ctx.config().aliases.get(name) {
                Some(expansion) => {
                    writeln!(stdout, "alias {name}='{expansion}'")?;
                    Ok(())
                }
                None => Err(anyhow::anyhow!("alias: {name}: not found").into()),
            },
            [name, expansion @ ..] => {
                let expansion = expansion.join(" ");
                ctx.config_mut().set_alias(name.clone(), expansion.clone());
                save_config(ctx, stdout)?;
                writeln!(stdout, "alias {name}='{expansion}'")?;
                Ok(())
            }
        }
    }
}

pub struct Unalias;

impl CommandHandler for Unalias {
    fn description(&self) -> &'static str {
        "Remove a command alias"
    }

    fn usage(&self) -> &'static str {
        "unalias <name>

Remove an alias and save the configuration."
    }

    fn execute(
        &self,
        cmd: &Command,
        ctx: &mut dyn ShellContext,
        stdout: &mut dyn Write,
    ) -> Result<(), DispatchError> {
        let Some(name) = cmd.args.first() else {
            return Err(usage_line(self.usage()));
        };
        if ctx.config_mut().remove_alias(name).is_none() {
            return Err(anyhow::anyhow!("unalias: {name}: not found").into());
        }
        save_config(ctx, stdout)
    }
}

/// Persisting is best effort: the in-memory change already happened.
fn save_config(ctx: &dyn ShellContext, stdout: &mut dyn Write) -> Result<(), DispatchError> {
    if let Err(e) = ctx.save_config() {
        warn!("failed to save config: {e:#}");
        writeln!(stdout, "Warning: configuration not saved: {e:#}")?;
    }
    Ok(())
}

/// Show or change settings.
pub struct ConfigCmd;

impl CommandHandler for ConfigCmd {
    fn description(&self) -> &'static str {
        "Show or change shell configuration"
    }

    fn usage(&self) -> &'static str {
        "config [set <key> <value> | path]

Without arguments, show the configuration.

Examples:
  config                              # Show configuration
  config set default_partition gpu    # Change a default and save
  config set prompt \"[%t] slsh> \"     # Change the prompt
  config path                         # Show the configuration file

Prompt placeholders: %t time, %u user, %h host, %w working directory."
    }

    fn execute(
        &self,
        cmd: &Command,
        ctx: &mut dyn ShellContext,
        stdout: &mut dyn Write,
    ) -> Result<(), DispatchError> {
        match cmd.args.as_slice() {
            [] => {
                stdout.write_all(ctx.config().describe().as_bytes())?;
                Ok(())
            }
            [action] if action == "path" => {
                match ctx.config().path() {
                    Some(path) => writeln!(stdout, "{}", path.display())?,
                    None => writeln!(stdout, "(not persisted)")?,
                }
                Ok(())
            }
            [action, key, value @ ..] if action == "set" => {
                let value = value.join(" ");
                ctx.config_mut().set(key, &value)?;
                save_config(ctx, stdout)?;
                writeln!(stdout, "{key} = {value}")?;
                Ok(())
            }
            _ => Err(usage_line(self.usage())),
        }
    }
}

/// General help or the usage text of one command.
pub struct Help;

impl CommandHandler for Help {
    fn description(&self) -> &'static str {
        "Show help information for commands"
    }

    fn usage(&self) -> &'static str {
        "help [command]

Show help information. Without arguments, shows general help.
With a command name, shows detailed help for that command.

Examples:
  help            # Show general help
  help run        # Show help for 'run' command"
    }

    fn execute(
        &self,
        cmd: &Command,
        ctx: &mut dyn ShellContext,
        stdout: &mut dyn Write,
    ) -> Result<(), DispatchError> {
        let commands = ctx.commands();

        if let Some(name) = cmd.args.first() {
            match commands.iter().find(|c| &c.name == name) {
                Some(info) => {
                    writeln!(stdout, "Command: {}", info.name)?;
                    writeln!(stdout, "Description: {}\n", info.description)?;
                    writeln!(stdout, "Usage:\n{}\n", info.usage)?;
                }
                None => {
                    writeln!(stdout, "Unknown command: {name}")?;
                    writeln!(stdout, "Use 'help' to see available commands.")?;
                }
            }
            return Ok(());
        }

        writeln!(stdout, "Slurm Shell (slsh) Help\n")?;
        writeln!(stdout, "Built-in Commands:")?;
        let width = commands.iter().map(|c| c.name.len()).max().unwrap_or(0);
        // single-letter shortcuts are listed with the aliases
        for info in commands.iter().filter(|c| c.name.len() > 1) {
            writeln!(stdout, "  {:<width$}  {}", info.name, info.description)?;
        }

        let mut aliases: Vec<_> = ctx.config().aliases.iter().collect();
        if !aliases.is_empty() {
            aliases.sort();
            writeln!(stdout, "\nAliases:")?;
            for (name, expansion) in aliases {
                writeln!(stdout, "  {name:<6} {expansion}")?;
            }
        }

        writeln!(stdout, "\nSlurm Commands:")?;
        writeln!(stdout, "  {}", TOOLCHAIN_COMMANDS.join(", "))?;
        writeln!(stdout, "\nAny other program runs attached to the terminal.")?;
        writeln!(stdout, "\nFor detailed help on a specific command, use: help <command>")?;
        Ok(())
    }
}

pub struct Exit;

impl CommandHandler for Exit {
    fn description(&self) -> &'static str {
        "Exit the shell"
    }

    fn usage(&self) -> &'static str {
        "exit

Save history and leave the shell."
    }

    fn execute(
        &self,
        _cmd: &Command,
        ctx: &mut dyn ShellContext,
        _stdout: &mut dyn Write,
    ) -> Result<(), DispatchError> {
        ctx.stop();
        Ok(())
    }
}

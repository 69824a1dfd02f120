use crate::job::JobOptions;
use std::borrow::Cow;
use std::ffi::OsStr;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;
use wait_timeout::ChildExt;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long output is still collected after the child exited. A background
/// process that inherited the pipes can keep them open indefinitely.
const PIPE_GRACE: Duration = Duration::from_secs(1);

/// Outcome of a captured external run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Failures to run a program at all. A non-zero exit status is not one of
/// them; it is reported through [`CommandResult`].
#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("failed to start {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("{program} timed out after {}s", timeout.as_secs())]
    Timeout { program: String, timeout: Duration },
    #[error("failed to wait for {program}: {source}")]
    Wait { program: String, source: io::Error },
    #[error("{0} not found in PATH - is Slurm installed?")]
    NotInstalled(String),
}

/// Runs external programs on behalf of the shell.
///
/// Only [`Toolchain::execute`] and [`Toolchain::execute_interactive`] need an
/// implementation; the Slurm helpers are built on top of them.
pub trait Toolchain {
    /// Runs `program` with captured stdout/stderr and a timeout.
    fn execute(&self, program: &str, args: &[String]) -> Result<CommandResult, ToolchainError>;

    /// Runs `program` attached to the shell's terminal, without a timeout.
    ///
    /// The child's exit status is not inspected.
    fn execute_interactive(&self, program: &str, args: &[String]) -> Result<(), ToolchainError>;

    /// Checks that the core Slurm programs are reachable.
    fn check_available(&self) -> Result<(), ToolchainError> {
        let search_paths = std::env::var_os("PATH").unwrap_or_default();
        for program in ["srun", "squeue"] {
            if find_command_path(&search_paths, Path::new(program)).is_none() {
                return Err(ToolchainError::NotInstalled(program.to_string()));
            }
        }
        Ok(())
    }

    fn run_job(&self, command: &[String], options: &JobOptions) -> Result<CommandResult, ToolchainError> {
        let mut args = options.to_args();
        args.extend(command.iter().cloned());
        self.execute("srun", &args)
    }

    fn submit_job(&self, script: &str, options: &JobOptions) -> Result<CommandResult, ToolchainError> {
        let mut args = options.to_args();
        args.push(script.to_string());
        self.execute("sbatch", &args)
    }

    fn cancel_job(&self, job_id: &str) -> Result<CommandResult, ToolchainError> {
        self.execute("scancel", &[job_id.to_string()])
    }

    fn job_status(&self, job_id: &str) -> Result<CommandResult, ToolchainError> {
        self.execute(
            "squeue",
            &strings(&["-j", job_id, "--format=%i,%T,%P,%u,%M,%N,%r"]),
        )
    }

    fn queue(&self, user: Option<&str>) -> Result<CommandResult, ToolchainError> {
        let mut args = strings(&["--format=%i,%T,%P,%u,%M,%N,%j"]);
        if let Some(user) = user.filter(|u| !u.is_empty()) {
            args.extend(strings(&["-u", user]));
        }
        self.execute("squeue", &args)
    }

    fn nodes(&self) -> Result<CommandResult, ToolchainError> {
        self.execute("sinfo", &strings(&["-N", "--format=%N,%T,%P,%C,%m,%f"]))
    }

    fn partitions(&self) -> Result<CommandResult, ToolchainError> {
        self.execute("sinfo", &strings(&["--format=%P,%a,%l,%D,%N"]))
    }

    /// Cluster name from `scontrol show config`, `None` when it can't be queried.
    fn cluster_name(&self) -> Option<String> {
        let result = self
            .execute("scontrol", &strings(&["show", "config"]))
            .ok()
            .filter(|r| r.success)?;
        let name = result
            .stdout
            .lines()
            .find(|line| line.contains("ClusterName"))
            .and_then(|line| line.split_once('='))
            .map(|(_, value)| value.trim().to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        Some(name)
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

/// [`Toolchain`] backed by real child processes.
#[derive(Debug, Clone)]
pub struct SlurmClient {
    timeout: Duration,
}

impl Default for SlurmClient {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl SlurmClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Toolchain for SlurmClient {
    fn execute(&self, program: &str, args: &[String]) -> Result<CommandResult, ToolchainError> {
        debug!("captured: {} {:?}", program, args);
        let start = Instant::now();
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ToolchainError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match child.wait_timeout(self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                debug!("{} killed after {:?}", program, self.timeout);
                return Err(ToolchainError::Timeout {
                    program: program.to_string(),
                    timeout: self.timeout,
                });
            }
            Err(source) => {
                let _ = child.kill();
                return Err(ToolchainError::Wait {
                    program: program.to_string(),
                    source,
                });
            }
        };

        let exit_code = status.code().unwrap_or_else(|| terminated_by_signal(status));
        let deadline = Instant::now() + PIPE_GRACE;
        Ok(CommandResult {
            success: status.success(),
            exit_code,
            stdout: collect(&stdout, deadline),
            stderr: collect(&stderr, deadline),
            duration: start.elapsed(),
        })
    }

    fn execute_interactive(&self, program: &str, args: &[String]) -> Result<(), ToolchainError> {
        debug!("interactive: {} {:?}", program, args);
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| ToolchainError::Spawn {
                program: program.to_string(),
                source,
            })?;
        let status = child.wait().map_err(|source| ToolchainError::Wait {
            program: program.to_string(),
            source,
        })?;
        debug!("{} exited with {}", program, status);
        Ok(())
    }
}

/// Reads a child pipe on a separate thread so a chatty child can't block on
/// a full pipe while we wait for it. Chunks arrive as they are read.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let Some(mut pipe) = pipe else {
            return;
        };
        let mut buf = [0u8; 8192];
        loop {
            match pipe.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

/// Gathers output until the pipe closes or `deadline` passes, whichever
/// comes first.
fn collect(chunks: &Receiver<Vec<u8>>, deadline: Instant) -> String {
    let mut bytes = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match chunks.recv_timeout(remaining) {
            Ok(chunk) => bytes.extend_from_slice(&chunk),
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                debug!("output pipe still open after exit, keeping partial output");
                break;
            }
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve a command path the way a typical shell would.
///
/// - Absolute path: returns it if it exists.
/// - Relative with multiple components (e.g. `bin/srun`): returns it if it exists.
/// - `./foo` on Unix or any `./`-prefixed path elsewhere: returns it if it exists.
/// - Single component: searches each directory of `search_paths` (PATH).
/// - Empty path: `None`.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let search_in_current_dir = cfg!(not(unix)) || path.starts_with("./");
    if search_in_current_dir && path.exists() {
        return Some(Cow::Borrowed(path));
    }

    let mut components = path.components();
    match (components.next(), components.next()) {
        (None, None) => None,
        (Some(x), None) => find_in_path(search_paths, x.as_os_str()).map(Cow::Owned),
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| dir.join(cmd))
        .find(|path| path.exists())
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.exists() { Some(path) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    #[cfg(unix)]
    fn test_captured_output_and_exit_code() {
        let client = SlurmClient::default();
        let result = client
            .execute("sh", &strings(&["-c", "echo out; echo err >&2; exit 3"]))
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
    }

    #[test]
    #[cfg(unix)]
    fn test_captured_success() {
        let client = SlurmClient::default();
        let result = client.execute("true", &[]).unwrap();
        assert!(result.success);
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    #[cfg(unix)]
    fn test_captured_timeout_kills_child() {
        let client = SlurmClient::new(Duration::from_millis(200));
        let start = Instant::now();
        let err = client.execute("sleep", &strings(&["5"])).unwrap_err();
        assert!(matches!(err, ToolchainError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    #[cfg(unix)]
    fn test_background_grandchild_does_not_block_output() {
        let client = SlurmClient::new(Duration::from_millis(500));
        let start = Instant::now();
        let result = client
            .execute("sh", &strings(&["-c", "sleep 10 & echo started"]))
            .unwrap();
        assert!(result.success);
        assert_eq!(result.stdout, "started\n");
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let client = SlurmClient::default();
        let err = client
            .execute("definitely-not-a-real-program-slsh", &[])
            .unwrap_err();
        assert!(matches!(err, ToolchainError::Spawn { .. }));

        let err = client
            .execute_interactive("definitely-not-a-real-program-slsh", &[])
            .unwrap_err();
        assert!(matches!(err, ToolchainError::Spawn { .. }));
    }

    #[test]
    #[cfg(unix)]
    fn test_interactive_ignores_exit_status() {
        let client = SlurmClient::default();
        assert!(client.execute_interactive("false", &[]).is_ok());
    }

    #[test]
    #[cfg(unix)]
    fn test_find_absolute_path() {
        let found = find_command_path(OsStr::new("/bin"), Path::new("/bin/sh"));
        assert_eq!(found.as_deref(), Some(Path::new("/bin/sh")));
        assert!(find_command_path(OsStr::new("/bin"), Path::new("/bin/nonexisting")).is_none());
    }

    #[test]
    fn test_find_single_component_in_path() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("srun")).unwrap();
        let search = dir.path().as_os_str();

        let found = find_command_path(search, Path::new("srun")).expect("srun in PATH");
        assert!(found.starts_with(dir.path()));
        assert!(find_command_path(search, Path::new("squeue")).is_none());
    }

    #[test]
    fn test_find_empty_path_is_none() {
        assert!(find_command_path(OsStr::new("/bin"), Path::new("")).is_none());
    }

    #[test]
    #[cfg(unix)]
    fn test_cluster_name_parsing() {
        struct Fake;
        impl Toolchain for Fake {
            fn execute(&self, _: &str, _: &[String]) -> Result<CommandResult, ToolchainError> {
                Ok(CommandResult {
                    success: true,
                    stdout: "AccountingStorageType = none\nClusterName             = hpc1\n".into(),
                    ..Default::default()
                })
            }
            fn execute_interactive(&self, _: &str, _: &[String]) -> Result<(), ToolchainError> {
                Ok(())
            }
        }
        assert_eq!(Fake.cluster_name().as_deref(), Some("hpc1"));
    }
}

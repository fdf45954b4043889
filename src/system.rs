//! Host system access
//!
//! The kernel, the service manager and the package manager are only reached
//! through [`HostSystem`]. Every external call is bounded by a timeout and
//! reports a tagged [`Outcome`] instead of an error, so callers branch on the
//! result explicitly.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::TuneError;
use crate::validation;

/// Result of a best-effort external operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The operation completed successfully
    Success,
    /// The tool or feature does not exist on this host
    Unavailable(String),
    /// The tool ran but reported failure (or timed out)
    Failed(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Unavailable(reason) => write!(f, "unavailable ({})", reason),
            Outcome::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

/// An external command to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Overrides the host's default timeout
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// `program arg1 arg2`, for logs
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of an external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub outcome: Outcome,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: &str) -> Self {
        Self { outcome: Outcome::Success, stdout: stdout.to_string(), stderr: String::new() }
    }

    pub fn failed(reason: &str) -> Self {
        Self { outcome: Outcome::Failed(reason.to_string()), stdout: String::new(), stderr: reason.to_string() }
    }

    pub fn unavailable(reason: &str) -> Self {
        Self { outcome: Outcome::Unavailable(reason.to_string()), stdout: String::new(), stderr: String::new() }
    }

    /// First `n` lines of stdout
    pub fn head(&self, n: usize) -> Vec<String> {
        self.stdout.lines().take(n).map(|l| l.to_string()).collect()
    }
}

/// Access to the kernel, service manager and package manager
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HostSystem: Send + Sync {
    /// Run an external command; never fails, the outcome says what happened
    async fn run(&self, cmd: &CommandSpec) -> CommandOutput;

    /// Current value of a kernel parameter, `None` if unreadable
    async fn read_sysctl(&self, key: &str) -> Option<String>;

    /// Contents of a file, `None` if unreadable
    async fn read_file(&self, path: &Path) -> Option<String>;

    /// Whether `path` is a symlink (not followed), `None` if it does not exist
    async fn is_symlink(&self, path: &Path) -> Option<bool>;

    /// Whether the process has administrative rights
    fn is_root(&self) -> bool;
}

/// The real Linux host
pub struct LinuxHost {
    proc_sys: PathBuf,
    default_timeout: Duration,
}

impl LinuxHost {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            proc_sys: PathBuf::from("/proc/sys"),
            default_timeout,
        }
    }

    /// Filesystem path of a dotted sysctl key
    pub fn sysctl_path(&self, key: &str) -> PathBuf {
        self.proc_sys.join(key.replace('.', "/"))
    }
}

#[async_trait]
impl HostSystem for LinuxHost {
    async fn run(&self, cmd: &CommandSpec) -> CommandOutput {
        let timeout = cmd.timeout.unwrap_or(self.default_timeout);
        debug!("Running '{}' (timeout {:?})", cmd.command_line(), timeout);

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in &cmd.env {
            command.env(key, value);
        }

        let output = match tokio::time::timeout(timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return CommandOutput::unavailable(&format!("{} not found", cmd.program));
            }
            Ok(Err(e)) => {
                return CommandOutput::failed(&format!("Failed to run {}: {}", cmd.program, e));
            }
            Err(_) => {
                let err = TuneError::Timeout(format!("'{}' after {:?}", cmd.command_line(), timeout));
                return CommandOutput::failed(&err.to_string());
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        let outcome = if output.status.success() {
            Outcome::Success
        } else {
            let err = TuneError::CommandFailed {
                cmd: cmd.command_line(),
                code: output.status.code(),
                stderr: validation::sanitize_error_message(&stderr),
            };
            Outcome::Failed(err.to_string())
        };

        CommandOutput { outcome, stdout, stderr }
    }

    async fn read_sysctl(&self, key: &str) -> Option<String> {
        validation::validate_sysctl_key(key).ok()?;
        tokio::fs::read_to_string(self.sysctl_path(key))
            .await
            .ok()
            .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    async fn read_file(&self, path: &Path) -> Option<String> {
        tokio::fs::read_to_string(path).await.ok()
    }

    async fn is_symlink(&self, path: &Path) -> Option<bool> {
        tokio::fs::symlink_metadata(path)
            .await
            .ok()
            .map(|meta| meta.file_type().is_symlink())
    }

    fn is_root(&self) -> bool {
        unsafe { libc::geteuid() == 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spec_builder() {
        let cmd = CommandSpec::new("apt-get", &["install", "-y"])
            .arg("iperf3")
            .env("DEBIAN_FRONTEND", "noninteractive")
            .timeout(Duration::from_secs(5));

        assert_eq!(cmd.command_line(), "apt-get install -y iperf3");
        assert_eq!(cmd.env, vec![("DEBIAN_FRONTEND".to_string(), "noninteractive".to_string())]);
        assert_eq!(cmd.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_sysctl_path() {
        let host = LinuxHost::new(Duration::from_secs(1));
        assert_eq!(
            host.sysctl_path("net.ipv4.tcp_congestion_control"),
            PathBuf::from("/proc/sys/net/ipv4/tcp_congestion_control")
        );
    }

    #[test]
    fn test_head() {
        let out = CommandOutput::success("a\nb\nc\n");
        assert_eq!(out.head(2), vec!["a", "b"]);
        assert_eq!(out.head(10).len(), 3);
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let host = LinuxHost::new(Duration::from_secs(5));
        let out = host.run(&CommandSpec::new("nettune-no-such-binary", &[])).await;
        assert!(matches!(out.outcome, Outcome::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failed() {
        let host = LinuxHost::new(Duration::from_secs(5));
        let out = host.run(&CommandSpec::new("sh", &["-c", "echo oops >&2; exit 3"])).await;
        match out.outcome {
            Outcome::Failed(reason) => {
                assert!(reason.contains("code 3"));
                assert!(reason.contains("oops"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_failed() {
        let host = LinuxHost::new(Duration::from_millis(100));
        let out = host.run(&CommandSpec::new("sleep", &["5"])).await;
        assert!(matches!(out.outcome, Outcome::Failed(ref r) if r.contains("Timeout")));
    }

    #[tokio::test]
    async fn test_is_symlink() {
        let tmp = tempfile::TempDir::new().unwrap();
        let target = tmp.path().join("stub-resolv.conf");
        let link = tmp.path().join("resolv.conf");
        std::fs::write(&target, "nameserver 127.0.0.53\n").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let host = LinuxHost::new(Duration::from_secs(1));
        assert_eq!(host.is_symlink(&link).await, Some(true));
        assert_eq!(host.is_symlink(&target).await, Some(false));
        assert_eq!(host.is_symlink(&tmp.path().join("absent")).await, None);
    }

    #[tokio::test]
    async fn test_read_missing_sysctl() {
        let host = LinuxHost::new(Duration::from_secs(1));
        assert_eq!(host.read_sysctl("net.nettune.does_not_exist").await, None);
        assert_eq!(host.read_sysctl("bad key").await, None);
    }
}

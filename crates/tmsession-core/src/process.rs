use crate::error::ProcessError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitStatus;
use tokio::io::AsyncRead;

/// Unique identifier for a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::From, derive_more::Display)]
pub struct ProcessId(pub u32);

/// Result of a process termination operation
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationResult {
    /// Process was successfully terminated
    Success,
    /// Process was not found (already exited)
    ProcessNotFound,
    /// Permission denied (insufficient privileges)
    AccessDenied,
    /// Operation failed with specific error message
    Failed(String),
}

impl TerminationResult {
    /// The process is gone, whoever made it go.
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::Success | Self::ProcessNotFound)
    }
}

/// Everything needed to start a detached worker process
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    /// Append a `--flag value` pair
    pub fn flag(&mut self, flag: &str, value: impl ToString) -> &mut Self {
        self.args.push(format!("--{flag}"));
        self.args.push(value.to_string());
        self
    }

    /// Append a bare `--flag` switch
    pub fn switch(&mut self, flag: &str) -> &mut Self {
        self.args.push(format!("--{flag}"));
        self
    }

    pub fn working_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Value following `--flag`, if present
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        let name = format!("--{flag}");
        self.args
            .iter()
            .position(|a| *a == name)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    pub fn has_switch(&self, flag: &str) -> bool {
        let name = format!("--{flag}");
        self.args.iter().any(|a| *a == name)
    }
}

pub type OutputStream = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// The worker's output streams, handed out once per process
pub struct ProcessOutput {
    pub stdout: Option<OutputStream>,
    pub stderr: Option<OutputStream>,
}

/// Trait representing a handle to a running process
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    /// Get the process ID (None if process has exited)
    fn pid(&self) -> Option<ProcessId>;

    /// Get the command that started this process
    fn command(&self) -> &str;

    /// Get the arguments passed to this process
    fn args(&self) -> &[String];

    /// Take the output streams; returns `None` on the second call
    fn take_output(&mut self) -> Option<ProcessOutput>;

    /// Try to get exit status without blocking
    async fn try_wait(&mut self) -> Result<Option<ExitStatus>, ProcessError>;

    /// Forcibly terminate the process and everything it started, then reap it
    async fn kill(&mut self) -> TerminationResult;
}

/// Starts detached worker processes for the current platform
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn ProcessHandle>, ProcessError>;

    /// Get the platform name for logging and debugging
    fn platform_name(&self) -> &'static str;
}

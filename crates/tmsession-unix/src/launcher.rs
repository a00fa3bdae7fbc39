#[cfg(unix)]
mod unix_impl {
    use async_trait::async_trait;
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid as NixPid;
    use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
    use std::process::{ExitStatus, Stdio};
    use std::sync::{Arc, Mutex};
    use tmsession_core::{
        LaunchSpec, OutputStream, ProcessError, ProcessHandle, ProcessId, ProcessLauncher,
        ProcessOutput, TerminationResult,
    };
    use tokio::process::{Child, Command};
    use tracing::{debug, info, warn};

    /// A worker running as the leader of its own process group
    pub struct UnixProcessHandle {
        child: Child,
        pgid: u32,
        command: String,
        args: Vec<String>,
        output: Option<ProcessOutput>,
        system: Arc<Mutex<System>>,
    }

    impl UnixProcessHandle {
        /// Every live descendant of `root`, deepest first
        fn descendants(&self, root: u32) -> Vec<u32> {
            let mut system = match self.system.lock() {
                Ok(system) => system,
                Err(poisoned) => poisoned.into_inner(),
            };
            system.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                ProcessRefreshKind::default(),
            );
            let mut found = Vec::new();
            find_children_recursive(&system, root, &mut found);
            found
        }
    }

    /// Recursively find all child processes
    fn find_children_recursive(system: &System, parent_pid: u32, result: &mut Vec<u32>) {
        for (pid, process) in system.processes() {
            if process.parent().map(|p| p.as_u32()) == Some(parent_pid) {
                let child_pid = pid.as_u32();
                find_children_recursive(system, child_pid, result);
                result.push(child_pid);
            }
        }
    }

    fn signal_result(errno: Result<(), Errno>, what: &str) -> TerminationResult {
        match errno {
            Ok(()) => TerminationResult::Success,
            Err(Errno::ESRCH) => TerminationResult::ProcessNotFound,
            Err(Errno::EPERM) => {
                warn!("Permission denied to kill {what}");
                TerminationResult::AccessDenied
            }
            Err(e) => {
                warn!("Failed to kill {what}: {e}");
                TerminationResult::Failed(format!("SIGKILL to {what} failed: {e}"))
            }
        }
    }

    #[async_trait]
    impl ProcessHandle for UnixProcessHandle {
        fn pid(&self) -> Option<ProcessId> {
            self.child.id().map(ProcessId::from)
        }

        fn command(&self) -> &str {
            &self.command
        }

        fn args(&self) -> &[String] {
            &self.args
        }

        fn take_output(&mut self) -> Option<ProcessOutput> {
            self.output.take()
        }

        async fn try_wait(&mut self) -> Result<Option<ExitStatus>, ProcessError> {
            Ok(self.child.try_wait()?)
        }

        async fn kill(&mut self) -> TerminationResult {
            // Descendants that left the group are only reachable while the tree is intact.
            let strays = self.descendants(self.pgid);

            let group = format!("process group {}", self.pgid);
            let result = signal_result(
                signal::killpg(NixPid::from_raw(self.pgid as i32), Signal::SIGKILL),
                &group,
            );
            if result == TerminationResult::Success {
                info!(pgid = self.pgid, "Sent SIGKILL to process group");
            }

            for pid in strays {
                match signal::kill(NixPid::from_raw(pid as i32), Signal::SIGKILL) {
                    Ok(()) | Err(Errno::ESRCH) => {}
                    Err(e) => warn!(pid, "Failed to kill descendant: {e}"),
                }
            }

            // Reap the leader so no zombie is left behind.
            if let Err(e) = self.child.kill().await {
                debug!(pgid = self.pgid, "Reaping worker: {e}");
            }
            result
        }
    }

    /// Spawns workers in their own process group with piped output
    pub struct UnixProcessLauncher {
        system: Arc<Mutex<System>>,
    }

    impl Default for UnixProcessLauncher {
        fn default() -> Self {
            Self::new()
        }
    }

    impl UnixProcessLauncher {
        pub fn new() -> Self {
            info!("Initializing Unix process launcher");
            Self {
                system: Arc::new(Mutex::new(System::new())),
            }
        }
    }

    #[async_trait]
    impl ProcessLauncher for UnixProcessLauncher {
        async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn ProcessHandle>, ProcessError> {
            let mut cmd = Command::new(&spec.program);
            cmd.args(&spec.args)
                .envs(&spec.env)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .process_group(0);
            if let Some(dir) = &spec.working_dir {
                cmd.current_dir(dir);
            }

            let command = spec.program.display().to_string();
            let mut child = cmd.spawn().map_err(|e| match e.kind() {
                std::io::ErrorKind::PermissionDenied => {
                    ProcessError::PermissionDenied(format!("{command}: {e}"))
                }
                _ => ProcessError::SpawnFailed(format!("{command}: {e}")),
            })?;
            let pgid = child
                .id()
                .ok_or_else(|| ProcessError::SpawnFailed(format!("{command}: exited during spawn")))?;

            info!(pid = pgid, "Spawned Unix process: {command} with args: {:?}", spec.args);

            let output = ProcessOutput {
                stdout: child.stdout.take().map(|s| Box::new(s) as OutputStream),
                stderr: child.stderr.take().map(|s| Box::new(s) as OutputStream),
            };

            Ok(Box::new(UnixProcessHandle {
                child,
                pgid,
                command,
                args: spec.args.clone(),
                output: Some(output),
                system: self.system.clone(),
            }))
        }

        fn platform_name(&self) -> &'static str {
            "Unix"
        }
    }
}

#[cfg(unix)]
pub use unix_impl::{UnixProcessHandle, UnixProcessLauncher};

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tmsession_core::{LaunchSpec, ProcessError, ProcessLauncher, for_each_line};

    fn shell(script: &str) -> LaunchSpec {
        let mut spec = LaunchSpec::new("/bin/sh");
        spec.arg("-c").arg(script);
        spec
    }

    #[tokio::test]
    async fn test_launch_reads_output_and_exits() {
        let launcher = UnixProcessLauncher::new();
        let mut handle = launcher
            .launch(&shell("echo 'INFO hello'; echo 'MESSAGE ROUTER UP' >&2"))
            .await
            .unwrap();
        assert_eq!(handle.command(), "/bin/sh");

        let output = handle.take_output().unwrap();
        assert!(handle.take_output().is_none());

        let mut stdout = Vec::new();
        for_each_line(output.stdout.unwrap(), |l| stdout.push(l.to_string()))
            .await
            .unwrap();
        let mut stderr = Vec::new();
        for_each_line(output.stderr.unwrap(), |l| stderr.push(l.to_string()))
            .await
            .unwrap();

        assert_eq!(stdout, vec!["INFO hello"]);
        assert_eq!(stderr, vec!["MESSAGE ROUTER UP"]);
        assert!(handle.kill().await.is_gone());
        assert!(handle.pid().is_none());
    }

    #[tokio::test]
    async fn test_kill_terminates_whole_group() {
        let launcher = UnixProcessLauncher::new();
        let mut handle = launcher
            .launch(&shell("sleep 30 & sleep 30 & echo started; wait"))
            .await
            .unwrap();
        let output = handle.take_output().unwrap();
        assert!(handle.pid().is_some());
        assert!(handle.try_wait().await.unwrap().is_none());

        let reader = tokio::spawn(async move {
            let mut lines = Vec::new();
            for_each_line(output.stdout.unwrap(), |l| lines.push(l.to_string()))
                .await
                .unwrap();
            lines
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(handle.kill().await.is_gone());
        assert!(handle.pid().is_none());

        // stdout only closes once the background sleeps holding it are gone too
        let lines = tokio::time::timeout(Duration::from_secs(5), reader)
            .await
            .expect("group members still hold stdout")
            .unwrap();
        assert_eq!(lines, vec!["started"]);
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let launcher = UnixProcessLauncher::new();
        let result = launcher.launch(&LaunchSpec::new("/nonexistent/worker")).await;
        assert!(matches!(result, Err(ProcessError::SpawnFailed(_))));
    }

    #[tokio::test]
    async fn test_working_dir_and_env() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = shell("pwd; echo $RUN_TAG");
        spec.working_dir(dir.path());
        spec.env.insert("RUN_TAG".to_string(), "17".to_string());

        let launcher = UnixProcessLauncher::new();
        let mut handle = launcher.launch(&spec).await.unwrap();
        let output = handle.take_output().unwrap();
        let mut lines = Vec::new();
        for_each_line(output.stdout.unwrap(), |l| lines.push(l.to_string()))
            .await
            .unwrap();

        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(std::path::Path::new(&lines[0]).canonicalize().unwrap(), expected);
        assert_eq!(lines[1], "17");
    }
}

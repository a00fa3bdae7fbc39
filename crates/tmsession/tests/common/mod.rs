#![allow(dead_code)]

use async_trait::async_trait;
use std::process::ExitStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;
use tmsession::{
    LaunchSpec, MessageBus, ProcessError, ProcessHandle, ProcessId, ProcessLauncher,
    ProcessOutput, SessionConfig, SessionContext, SessionIdentity, TerminationResult,
};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use tmsession::testing::{StubFactory, StubLoader};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_file(true)
        .with_thread_ids(false)
        .with_target(false)
        .with_line_number(true)
        .try_init();
}

enum Line {
    Out(String),
    Err(String),
}

/// Test-side control of one fake worker.
pub struct WorkerControl {
    pub spec: LaunchSpec,
    pub killed: Arc<AtomicBool>,
    exited: Arc<AtomicBool>,
    lines: mpsc::UnboundedSender<Line>,
}

impl WorkerControl {
    pub fn say(&self, line: &str) {
        let _ = self.lines.send(Line::Out(format!("{line}\n")));
    }

    pub fn say_err(&self, line: &str) {
        let _ = self.lines.send(Line::Err(format!("{line}\n")));
    }

    /// Close both output streams, as a worker exiting would.
    pub fn exit(self) {}

    /// Exit while a background child keeps both output streams open.
    pub fn exit_keeping_output(&self) {
        self.exited.store(true, Ordering::SeqCst);
    }

    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}

struct FakeHandle {
    spec: LaunchSpec,
    output: Option<ProcessOutput>,
    pump: JoinHandle<()>,
    killed: Arc<AtomicBool>,
    exited: Arc<AtomicBool>,
}

#[async_trait]
impl ProcessHandle for FakeHandle {
    fn pid(&self) -> Option<ProcessId> {
        (!self.killed.load(Ordering::SeqCst)).then_some(ProcessId(4242))
    }

    fn command(&self) -> &str {
        "fake-worker"
    }

    fn args(&self) -> &[String] {
        &self.spec.args
    }

    fn take_output(&mut self) -> Option<ProcessOutput> {
        self.output.take()
    }

    async fn try_wait(&mut self) -> Result<Option<ExitStatus>, ProcessError> {
        #[cfg(unix)]
        if self.exited.load(Ordering::SeqCst) {
            use std::os::unix::process::ExitStatusExt;
            return Ok(Some(ExitStatus::from_raw(0)));
        }
        Ok(None)
    }

    async fn kill(&mut self) -> TerminationResult {
        self.killed.store(true, Ordering::SeqCst);
        self.pump.abort();
        TerminationResult::Success
    }
}

/// Launches in-memory workers whose output the test writes.
pub struct FakeLauncher {
    workers: mpsc::UnboundedSender<WorkerControl>,
    pub launches: AtomicUsize,
}

impl FakeLauncher {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<WorkerControl>) {
        let (workers, rx) = mpsc::unbounded_channel();
        let launcher = Arc::new(Self {
            workers,
            launches: AtomicUsize::new(0),
        });
        (launcher, rx)
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessLauncher for FakeLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn ProcessHandle>, ProcessError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let (mut out_writer, out_reader) = tokio::io::duplex(4096);
        let (mut err_writer, err_reader) = tokio::io::duplex(4096);
        let (lines, mut rx) = mpsc::unbounded_channel();

        let pump = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                let written = match line {
                    Line::Out(text) => out_writer.write_all(text.as_bytes()).await,
                    Line::Err(text) => err_writer.write_all(text.as_bytes()).await,
                };
                if written.is_err() {
                    break;
                }
            }
        });

        let killed = Arc::new(AtomicBool::new(false));
        let exited = Arc::new(AtomicBool::new(false));
        let _ = self.workers.send(WorkerControl {
            spec: spec.clone(),
            killed: killed.clone(),
            exited: exited.clone(),
            lines,
        });

        Ok(Box::new(FakeHandle {
            spec: spec.clone(),
            output: Some(ProcessOutput {
                stdout: Some(Box::new(out_reader)),
                stderr: Some(Box::new(err_reader)),
            }),
            pump,
            killed,
            exited,
        }))
    }

    fn platform_name(&self) -> &'static str {
        "fake"
    }
}

/// Scratch session directories plus collaborators for supervisor tests.
pub struct Harness {
    pub output_dir: TempDir,
    pub worker_dir: TempDir,
    pub config: SessionConfig,
    pub identity: SessionIdentity,
    pub loader: StubLoader,
}

impl Harness {
    /// A session with an installed worker, one product and short timeouts.
    pub fn new() -> Self {
        let output_dir = tempfile::tempdir().unwrap();
        let worker_dir = tempfile::tempdir().unwrap();
        std::fs::write(worker_dir.path().join("watcher"), "#!/bin/sh\n").unwrap();

        let mut config = SessionConfig::default();
        config.output_dir = output_dir.path().to_path_buf();
        config.messaging.check_service = false;
        let rec = &mut config.recorded_engineering;
        rec.worker_dir = worker_dir.path().to_path_buf();
        rec.worker_script = "watcher".to_string();
        rec.product_names = vec!["EHA_PROD".to_string()];
        rec.startup_timeout_ms = 2_000;
        rec.shutdown_timeout_ms = 2_000;
        rec.shutdown_grace_ms = 0;
        rec.reader_join_timeout_ms = 500;

        Self {
            output_dir,
            worker_dir,
            config,
            identity: SessionIdentity {
                number: Some(7),
                user: "tester".to_string(),
                host: "gds".to_string(),
                vcid: None,
            },
            loader: StubLoader::default(),
        }
    }

    pub fn context(self, launcher: Arc<dyn ProcessLauncher>) -> (SessionContext, Arc<MessageBus>, Dirs) {
        let bus = Arc::new(MessageBus::new(self.config.messaging.clone()));
        let ctx = SessionContext::new(
            self.config,
            self.identity,
            bus.clone(),
            Arc::new(self.loader),
            Arc::new(StubFactory::default()),
            launcher,
        );
        let dirs = Dirs {
            output: self.output_dir,
            _worker: self.worker_dir,
        };
        (ctx, bus, dirs)
    }
}

/// Keeps the scratch directories alive for the test's duration.
pub struct Dirs {
    pub output: TempDir,
    _worker: TempDir,
}

impl Dirs {
    pub fn files_with_prefix(&self, prefix: &str) -> Vec<std::path::PathBuf> {
        std::fs::read_dir(self.output.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(prefix))
            })
            .collect()
    }
}

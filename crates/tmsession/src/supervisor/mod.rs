//! Supervision of the recorded engineering watcher.
//!
//! The worker is a detached process whose health can only be inferred from
//! its output. Startup is confirmed by a marker line, shutdown is requested by
//! handing it a flag file carrying the number of products assembled during the
//! run, and confirmed by another marker line.

mod args;
pub mod classifier;
mod flag_file;
mod run_id;
mod state;

pub use classifier::{Handshake, LineSink, LogLineEvent, Markers, Severity};
pub use flag_file::{read_flag_file, write_flag_file};
pub use run_id::next_run_id;
pub use state::HandshakeState;

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tmsession_core::{
    Message, MessageKind, OutputStream, ProcessError, ProcessHandle, Service, ServiceError,
    SessionContext, SubscriptionId, for_each_line,
};
use tokio::fs::OpenOptions;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started { run_id: String },
    AlreadyRunning,
    /// Configured not to touch the OS; reported as running.
    DryRun,
    /// The session has no number yet, so there is nothing to watch.
    NoSession,
    /// The worker executable is not installed.
    WorkerMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    NotRunning,
    /// The worker confirmed its shutdown.
    Clean,
    /// The worker never confirmed; it was killed anyway.
    TimedOut,
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Messaging is disabled; the watcher has no products to listen for")]
    MessagingDisabled,

    #[error("No recorded engineering products are configured")]
    NoWorkItems,

    #[error("Message service at {host}:{port} is unreachable")]
    ChannelUnreachable { host: String, port: u16 },

    #[error("Could not create worker log {}: {source}", path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: ProcessError,
    },

    #[error("{program} did not report startup within {timeout:?}")]
    StartupTimedOut { program: String, timeout: Duration },

    #[error("{program} exited without reporting startup (status {status:?})")]
    StartupExitedWithoutMarker {
        program: String,
        status: Option<ExitStatus>,
    },
}

impl SupervisorError {
    /// The watcher declined to run rather than failed.
    pub fn is_quiet(&self) -> bool {
        matches!(self, Self::MessagingDisabled | Self::NoWorkItems)
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            Self::MessagingDisabled => "messaging_disabled",
            Self::NoWorkItems => "no_work_items",
            Self::ChannelUnreachable { .. } => "channel_unreachable",
            Self::LogFile { .. } => "log_file",
            Self::Spawn { .. } => "spawn",
            Self::StartupTimedOut { .. } => "startup_timed_out",
            Self::StartupExitedWithoutMarker { .. } => "startup_exited",
        }
    }
}

/// A launched worker and everything tied to its run.
struct ActiveWorker {
    run_id: String,
    handle: Box<dyn ProcessHandle>,
    sink: Arc<LineSink>,
    handshake: watch::Receiver<Handshake>,
    readers: Vec<JoinHandle<()>>,
    subscription: SubscriptionId,
    products: Arc<AtomicU64>,
}

struct Inner {
    state: HandshakeState,
    active: Option<ActiveWorker>,
}

impl Inner {
    fn transition(&mut self, next: HandshakeState) {
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "Ignoring invalid watcher state change");
            return;
        }
        debug!(from = %self.state, to = %next, "Watcher state change");
        self.state = next;
    }
}

/// Runs one external worker per start/stop cycle.
pub struct ExternalProcessSupervisor {
    ctx: SessionContext,
    name: String,
    inner: Mutex<Inner>,
}

impl ExternalProcessSupervisor {
    pub fn new(ctx: SessionContext) -> Self {
        let name = ctx.config.recorded_engineering.worker_script.clone();
        Self {
            ctx,
            name,
            inner: Mutex::new(Inner {
                state: HandshakeState::NotStarted,
                active: None,
            }),
        }
    }

    pub async fn state(&self) -> HandshakeState {
        self.inner.lock().await.state
    }

    /// Run id of the worker currently running, if any.
    pub async fn run_id(&self) -> Option<String> {
        let inner = self.inner.lock().await;
        inner.active.as_ref().map(|w| w.run_id.clone())
    }

    /// Products assembled since the current worker started.
    pub async fn product_count(&self) -> Option<u64> {
        let inner = self.inner.lock().await;
        inner
            .active
            .as_ref()
            .map(|w| w.products.load(Ordering::SeqCst))
    }

    /// Product names handed to the worker.
    ///
    /// Explicit names win; otherwise configured APIDs are resolved through the
    /// APID dictionary.
    pub fn product_names(&self) -> Vec<String> {
        let config = &self.ctx.config.recorded_engineering;
        if !config.product_names.is_empty() {
            return config.product_names.clone();
        }
        config
            .product_apids
            .iter()
            .map(|apid| {
                self.ctx
                    .loader
                    .apid_name(*apid)
                    .unwrap_or_else(|| "Unknown".to_string())
            })
            .collect()
    }

    pub async fn start(&self) -> Result<StartOutcome, SupervisorError> {
        let mut inner = self.inner.lock().await;
        if inner.state == HandshakeState::Running {
            debug!(worker = %self.name, "Watcher already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let config = &self.ctx.config.recorded_engineering;
        if config.dry_run {
            info!(worker = %self.name, "Dry run; not launching watcher");
            inner.transition(HandshakeState::Running);
            return Ok(StartOutcome::DryRun);
        }
        if !self.ctx.channel.is_enabled() {
            info!(worker = %self.name, "Not launching watcher: messaging is disabled");
            return Err(SupervisorError::MessagingDisabled);
        }
        let products = self.product_names();
        if products.is_empty() {
            info!(worker = %self.name, "Not launching watcher: no products configured");
            return Err(SupervisorError::NoWorkItems);
        }
        let Some(session) = self.ctx.identity.number else {
            info!(worker = %self.name, "Not launching watcher: session has no number yet");
            return Ok(StartOutcome::NoSession);
        };

        let run_id = next_run_id();
        if !self.ctx.channel.is_reachable().await {
            let messaging = &self.ctx.config.messaging;
            return Err(SupervisorError::ChannelUnreachable {
                host: messaging.host.clone(),
                port: messaging.port,
            });
        }

        let counter = Arc::new(AtomicU64::new(0));
        let subscription = self.ctx.channel.subscribe(
            MessageKind::ProductAssembled,
            Arc::new({
                let counter = counter.clone();
                move |_: &Message| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );

        let program = config.worker_path();
        if !program.is_file() {
            error!(worker = %self.name, path = %program.display(), "Watcher executable not found");
            self.ctx.channel.unsubscribe(subscription);
            return Ok(StartOutcome::WorkerMissing);
        }

        inner.transition(HandshakeState::Launching);
        let mut worker = match self
            .launch(&run_id, session, &products, subscription, counter)
            .await
        {
            Ok(worker) => worker,
            Err(e) => {
                error!(worker = %self.name, %run_id, "{e}");
                self.ctx.channel.unsubscribe(subscription);
                inner.transition(HandshakeState::Stopped);
                return Err(e);
            }
        };

        // Only the marker or the timeout ends the wait.
        let timeout = config.startup_timeout();
        let _ = tokio::time::timeout(timeout, worker.handshake.wait_for(|h| h.started)).await;
        let handshake = *worker.handshake.borrow();

        if handshake.started {
            info!(worker = %self.name, %run_id, "Watcher is up");
            self.ctx
                .channel
                .publish(Message::log(format!("{} has been launched", self.name)));
            inner.transition(HandshakeState::Running);
            inner.active = Some(worker);
            return Ok(StartOutcome::Started { run_id });
        }

        let err = if handshake.closed {
            SupervisorError::StartupExitedWithoutMarker {
                program: self.name.clone(),
                status: worker.handle.try_wait().await.ok().flatten(),
            }
        } else {
            SupervisorError::StartupTimedOut {
                program: self.name.clone(),
                timeout,
            }
        };
        error!(worker = %self.name, %run_id, label = err.as_label(), "{err}");
        self.release(worker).await;
        inner.transition(HandshakeState::TimedOut);
        Err(err)
    }

    async fn launch(
        &self,
        run_id: &str,
        session: u64,
        products: &[String],
        subscription: SubscriptionId,
        products_seen: Arc<AtomicU64>,
    ) -> Result<ActiveWorker, SupervisorError> {
        let config = &self.ctx.config;
        let log_path = config
            .output_dir
            .join(format!("RecordedEngWatcher.{run_id}.log"));
        let log = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&log_path)
            .await
            .map_err(|source| SupervisorError::LogFile {
                path: log_path.clone(),
                source,
            })?;

        let spec = args::launch_spec(&self.ctx, run_id, session, products);
        info!(worker = %self.name, %run_id, "Launching {}: {:?}", self.name, spec.args);
        let mut handle =
            self.ctx
                .launcher
                .launch(&spec)
                .await
                .map_err(|source| SupervisorError::Spawn {
                    program: self.name.clone(),
                    source,
                })?;
        if let Some(pid) = handle.pid() {
            info!(worker = %self.name, %pid, log = %log_path.display(), "Watcher launched");
        }

        let streams: Vec<OutputStream> = handle
            .take_output()
            .map(|output| [output.stdout, output.stderr].into_iter().flatten().collect())
            .unwrap_or_default();
        let sink = Arc::new(LineSink::new(
            Markers::from(&config.recorded_engineering),
            Some(log),
            streams.len(),
        ));
        let handshake = sink.subscribe();
        let readers = streams
            .into_iter()
            .map(|stream| spawn_reader(stream, sink.clone()))
            .collect();

        Ok(ActiveWorker {
            run_id: run_id.to_string(),
            handle,
            sink,
            handshake,
            readers,
            subscription,
            products: products_seen,
        })
    }

    pub async fn stop(&self) -> StopOutcome {
        let mut inner = self.inner.lock().await;
        if inner.state != HandshakeState::Running {
            return StopOutcome::NotRunning;
        }
        inner.transition(HandshakeState::Stopping);

        let Some(mut worker) = inner.active.take() else {
            inner.transition(HandshakeState::Stopped);
            return StopOutcome::Clean;
        };

        let config = &self.ctx.config;
        let flag = config
            .output_dir
            .join(config.recorded_engineering.flag_file_name(&worker.run_id));
        let count = worker.products.load(Ordering::SeqCst);
        let target = flag.clone();
        match tokio::task::spawn_blocking(move || write_flag_file(&target, count)).await {
            Ok(Ok(())) => info!(worker = %self.name, count, path = %flag.display(), "Wrote product flag file"),
            Ok(Err(e)) => warn!(worker = %self.name, path = %flag.display(), "Could not write flag file: {e}"),
            Err(e) => warn!(worker = %self.name, path = %flag.display(), "Flag file writer failed: {e}"),
        }

        let _ = tokio::time::timeout(
            config.recorded_engineering.shutdown_timeout(),
            worker.handshake.wait_for(|h| h.stopped),
        )
        .await;
        let clean = worker.handshake.borrow().stopped;

        self.release(worker).await;
        if clean {
            info!(worker = %self.name, "Watcher shut down");
            inner.transition(HandshakeState::Stopped);
            StopOutcome::Clean
        } else {
            warn!(worker = %self.name, "Watcher did not confirm shutdown; it was killed");
            inner.transition(HandshakeState::TimedOut);
            StopOutcome::TimedOut
        }
    }

    /// Tear down everything belonging to one run.
    async fn release(&self, mut worker: ActiveWorker) {
        self.ctx.channel.unsubscribe(worker.subscription);

        let result = worker.handle.kill().await;
        if !result.is_gone() {
            warn!(worker = %self.name, ?result, "Watcher may still be running");
        }

        let join_timeout = self.ctx.config.recorded_engineering.reader_join_timeout();
        for reader in worker.readers {
            let abort = reader.abort_handle();
            if tokio::time::timeout(join_timeout, reader).await.is_err() {
                debug!(worker = %self.name, "Output reader still busy; aborting it");
                abort.abort();
            }
        }
        worker.sink.close().await;
    }
}

fn spawn_reader(stream: OutputStream, sink: Arc<LineSink>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = for_each_line(stream, |line| {
            sink.handle_line(line);
        })
        .await
        {
            debug!("Watcher output closed with error: {e}");
        }
        sink.stream_closed();
    })
}

#[async_trait]
impl Service for ExternalProcessSupervisor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<(), ServiceError> {
        match ExternalProcessSupervisor::start(self).await {
            Ok(outcome) => {
                debug!(worker = %self.name, ?outcome, "Watcher start");
                Ok(())
            }
            Err(e) if e.is_quiet() => Err(ServiceError::NotRunnable {
                service: self.name.clone(),
                reason: e.to_string(),
            }),
            Err(e) => Err(ServiceError::start_failed(&self.name, e)),
        }
    }

    async fn stop(&self) {
        let outcome = ExternalProcessSupervisor::stop(self).await;
        debug!(worker = %self.name, ?outcome, "Watcher stop");
    }
}

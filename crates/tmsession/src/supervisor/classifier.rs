//! Interpretation of the worker's output lines.
//!
//! The worker cannot be observed directly; its startup and shutdown are
//! announced by marker text, and its own warnings are re-emitted here so they
//! reach the session log.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tmsession_core::RecordedEngineeringConfig;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Target used when re-emitting worker log lines.
pub const WORKER_TARGET: &str = "tmsession::worker";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, derive_more::Display)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Severity {
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "TRACE" => Some(Self::Trace),
            "DEBUG" => Some(Self::Debug),
            "INFO" => Some(Self::Info),
            "WARN" | "WARNING" => Some(Self::Warn),
            "ERROR" => Some(Self::Error),
            "FATAL" => Some(Self::Fatal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLineEvent {
    StartupMarker,
    ShutdownMarker,
    /// Line led by a log level; `message` is everything after it.
    Leveled { severity: Severity, message: String },
    /// Anything else, treated as informational.
    Plain,
}

/// Marker text announcing the worker's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
    pub startup: String,
    pub shutdown: Vec<String>,
}

impl From<&RecordedEngineeringConfig> for Markers {
    fn from(config: &RecordedEngineeringConfig) -> Self {
        Self {
            startup: config.startup_marker.clone(),
            shutdown: config.shutdown_markers.clone(),
        }
    }
}

pub fn classify(line: &str, markers: &Markers) -> LogLineEvent {
    if line.contains(&markers.startup) {
        return LogLineEvent::StartupMarker;
    }
    if markers.shutdown.iter().any(|m| line.contains(m.as_str())) {
        return LogLineEvent::ShutdownMarker;
    }
    let Some((token, rest)) = line.split_once(char::is_whitespace) else {
        return LogLineEvent::Plain;
    };
    match Severity::parse(token) {
        Some(severity) => LogLineEvent::Leveled {
            severity,
            message: rest.trim_start().to_string(),
        },
        None => LogLineEvent::Plain,
    }
}

/// Drop the worker's own timestamp/thread prefix (`...]:`) and `{...}` context.
pub fn strip_context(message: &str) -> &str {
    let text = message.split_once("]:").map_or(message, |(_, rest)| rest);
    let text = match (text.find('{'), text.find('}')) {
        (Some(open), Some(close)) if open < close => &text[close + 1..],
        _ => text,
    };
    text.trim()
}

/// What the worker has announced so far in the current cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Handshake {
    pub started: bool,
    pub stopped: bool,
    /// Every output stream reached end of file.
    pub closed: bool,
}

/// Appends lines to the run log from its own task.
struct LogWriter {
    lines: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl LogWriter {
    fn spawn(file: File) -> Self {
        let (lines, mut rx) = mpsc::unbounded_channel::<String>();
        let task = tokio::spawn(async move {
            let mut out = BufWriter::new(file);
            while let Some(line) = rx.recv().await {
                if let Err(e) = out.write_all(line.as_bytes()).await {
                    warn!("Could not write worker log: {e}");
                    return;
                }
                if rx.is_empty() {
                    if let Err(e) = out.flush().await {
                        warn!("Could not flush worker log: {e}");
                        return;
                    }
                }
            }
            if let Err(e) = out.flush().await {
                warn!("Could not flush worker log: {e}");
            }
        });
        Self { lines, task }
    }
}

/// Receives every output line of one worker run.
pub struct LineSink {
    markers: Markers,
    handshake: watch::Sender<Handshake>,
    open_streams: AtomicUsize,
    log: Mutex<Option<LogWriter>>,
}

impl LineSink {
    /// `streams` is the number of output streams that will report [`LineSink::stream_closed`].
    ///
    /// With a log file this must be called inside a tokio runtime.
    pub fn new(markers: Markers, log: Option<File>, streams: usize) -> Self {
        let (handshake, _rx) = watch::channel(Handshake {
            closed: streams == 0,
            ..Default::default()
        });
        Self {
            markers,
            handshake,
            open_streams: AtomicUsize::new(streams),
            log: Mutex::new(log.map(LogWriter::spawn)),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Handshake> {
        self.handshake.subscribe()
    }

    pub fn handle_line(&self, line: &str) -> LogLineEvent {
        let event = classify(line, &self.markers);
        match &event {
            LogLineEvent::StartupMarker => self.handshake.send_modify(|h| h.started = true),
            LogLineEvent::ShutdownMarker => self.handshake.send_modify(|h| h.stopped = true),
            LogLineEvent::Leveled { severity, message } => forward(*severity, message),
            LogLineEvent::Plain => {}
        }
        self.append(line);
        event
    }

    pub fn stream_closed(&self) {
        if self.open_streams.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.handshake.send_modify(|h| h.closed = true);
        }
    }

    /// Flush and release the log file; later lines are no longer recorded.
    pub async fn close(&self) {
        let writer = match self.log.lock() {
            Ok(mut log) => log.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(LogWriter { lines, task }) = writer {
            drop(lines);
            if let Err(e) = task.await {
                warn!("Worker log writer failed: {e}");
            }
        }
    }

    fn append(&self, line: &str) {
        let Ok(mut log) = self.log.lock() else {
            return;
        };
        if let Some(writer) = log.as_ref() {
            if writer.lines.send(format!("{line}\n")).is_err() {
                *log = None;
            }
        }
    }
}

fn forward(severity: Severity, message: &str) {
    let text = strip_context(message);
    match severity {
        Severity::Warn => warn!(target: WORKER_TARGET, "{text}"),
        Severity::Error | Severity::Fatal => error!(target: WORKER_TARGET, "{text}"),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use test_case::test_case;

    fn markers() -> Markers {
        Markers::from(&RecordedEngineeringConfig::default())
    }

    #[test_case("INFO [main]: MESSAGE ROUTER UP", LogLineEvent::StartupMarker; "startup marker anywhere")]
    #[test_case("MESSAGE ROUTER DOWN", LogLineEvent::ShutdownMarker; "router down")]
    #[test_case("INFO 12:00 LISTENERS DOWN now", LogLineEvent::ShutdownMarker; "listeners down")]
    #[test_case("starting up", LogLineEvent::Plain; "no level")]
    #[test_case("WARN", LogLineEvent::Plain; "level without message")]
    #[test_case(" WARN indented", LogLineEvent::Plain; "leading blank")]
    fn test_classify_markers_and_plain(line: &str, expected: LogLineEvent) {
        assert_eq!(classify(line, &markers()), expected);
    }

    #[test_case("warning disk low", Severity::Warn; "warning alias lowercase")]
    #[test_case("WARN disk low", Severity::Warn; "warn")]
    #[test_case("Error disk low", Severity::Error; "mixed case")]
    #[test_case("FATAL disk low", Severity::Fatal; "fatal")]
    #[test_case("DEBUG disk low", Severity::Debug; "debug")]
    #[test_case("trace disk low", Severity::Trace; "trace")]
    fn test_classify_levels(line: &str, severity: Severity) {
        assert_eq!(
            classify(line, &markers()),
            LogLineEvent::Leveled {
                severity,
                message: "disk low".to_string()
            }
        );
    }

    #[test_case("2024-01-01 [pool-1]: {session=7} product incomplete", "product incomplete"; "prefix and context")]
    #[test_case("[main]: no context here", "no context here"; "prefix only")]
    #[test_case("{ctx} only context", "only context"; "context only")]
    #[test_case("} reversed { braces", "} reversed { braces"; "unbalanced braces untouched")]
    #[test_case("plain message", "plain message"; "nothing to strip")]
    fn test_strip_context(message: &str, expected: &str) {
        assert_eq!(strip_context(message), expected);
    }

    #[tokio::test]
    async fn test_sink_tracks_handshake_and_logs_original_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.log");
        let file = File::create(&path).await.unwrap();
        let sink = LineSink::new(markers(), Some(file), 2);
        let rx = sink.subscribe();

        sink.handle_line("WARN [x]: {y} careful");
        assert_eq!(*rx.borrow(), Handshake::default());

        sink.handle_line("MESSAGE ROUTER UP");
        assert!(rx.borrow().started);
        sink.handle_line("LISTENERS DOWN");
        assert!(rx.borrow().stopped);

        sink.stream_closed();
        assert!(!rx.borrow().closed);
        sink.stream_closed();
        assert!(rx.borrow().closed);

        sink.close().await;
        sink.handle_line("after close");
        sink.close().await;

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "WARN [x]: {y} careful\nMESSAGE ROUTER UP\nLISTENERS DOWN\n");
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_warnings_are_forwarded_without_context() {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let sink = LineSink::new(markers(), None, 1);
            sink.handle_line("INFO [main]: {boot} quiet");
            sink.handle_line("WARN [pool-2]: {session=7} product incomplete");
            sink.handle_line("FATAL lost connection");
        });

        let output = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(!output.contains("quiet"));
        assert!(output.contains("WARN tmsession::worker: product incomplete"));
        assert!(!output.contains("session=7"));
        assert!(output.contains("ERROR tmsession::worker: lost connection"));
    }
}

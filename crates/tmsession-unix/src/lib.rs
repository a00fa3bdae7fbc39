//! Unix process launcher for session workers

mod launcher;

#[cfg(unix)]
pub use launcher::{UnixProcessHandle, UnixProcessLauncher};

pub fn platform_name() -> &'static str {
    "Unix"
}

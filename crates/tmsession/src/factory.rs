use std::sync::Arc;
use tmsession_core::ProcessLauncher;

/// Selects the process launcher for the platform this was compiled for
pub struct PlatformLauncherFactory;

impl PlatformLauncherFactory {
    #[cfg(unix)]
    pub fn create() -> Arc<dyn ProcessLauncher> {
        Arc::new(tmsession_unix::UnixProcessLauncher::new())
    }

    pub fn platform_name() -> &'static str {
        #[cfg(unix)]
        return tmsession_unix::platform_name();

        #[cfg(not(unix))]
        return "unsupported";
    }
}

use crate::config::SessionConfig;
use crate::dictionary::DictionaryLoader;
use crate::message::MessageChannel;
use crate::process::ProcessLauncher;
use crate::service::ServiceFactory;
use std::sync::Arc;

/// Who and where this session is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionIdentity {
    /// Assigned once the session is stored; `None` until then
    pub number: Option<u64>,
    pub user: String,
    pub host: String,
    /// Restricts downstream workers to one virtual channel
    pub vcid: Option<u32>,
}

/// Everything a feature needs to build and run its services.
#[derive(Clone)]
pub struct SessionContext {
    pub config: Arc<SessionConfig>,
    pub identity: SessionIdentity,
    pub channel: Arc<dyn MessageChannel>,
    pub loader: Arc<dyn DictionaryLoader>,
    pub factory: Arc<dyn ServiceFactory>,
    pub launcher: Arc<dyn ProcessLauncher>,
}

impl SessionContext {
    pub fn new(
        config: SessionConfig,
        identity: SessionIdentity,
        channel: Arc<dyn MessageChannel>,
        loader: Arc<dyn DictionaryLoader>,
        factory: Arc<dyn ServiceFactory>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            identity,
            channel,
            loader,
            factory,
            launcher,
        }
    }
}

//! Stand-in collaborators for exercising features without real services.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tmsession_core::{
    DictionaryKind, DictionaryLoader, LaunchSpec, LoadError, MessageBus, ProcessError,
    ProcessHandle, ProcessLauncher, Service, ServiceError, ServiceFactory, ServiceKey,
    SessionConfig, SessionContext, SessionIdentity,
};

/// Records start/stop calls as `"start <key>"` / `"stop <key>"`
pub struct StubService {
    key: ServiceKey,
    fail: bool,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Service for StubService {
    fn name(&self) -> &str {
        "stub"
    }

    async fn start(&self) -> Result<(), ServiceError> {
        self.log.lock().unwrap().push(format!("start {}", self.key));
        if self.fail {
            return Err(ServiceError::start_failed(self.key.to_string(), "stub failure"));
        }
        Ok(())
    }

    async fn stop(&self) {
        self.log.lock().unwrap().push(format!("stop {}", self.key));
    }
}

#[derive(Default)]
pub struct StubFactory {
    pub log: Arc<Mutex<Vec<String>>>,
    pub failing: HashSet<ServiceKey>,
}

impl StubFactory {
    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl ServiceFactory for StubFactory {
    fn create(&self, key: &ServiceKey, _ctx: &SessionContext) -> anyhow::Result<Arc<dyn Service>> {
        Ok(Arc::new(StubService {
            key: *key,
            fail: self.failing.contains(key),
            log: self.log.clone(),
        }))
    }
}

#[derive(Default)]
pub struct StubLoader {
    pub missing: HashSet<DictionaryKind>,
    pub apids: HashMap<u16, String>,
    pub loaded: Mutex<Vec<DictionaryKind>>,
}

#[async_trait]
impl DictionaryLoader for StubLoader {
    async fn load(&self, kind: DictionaryKind) -> Result<(), LoadError> {
        if self.missing.contains(&kind) {
            return Err(LoadError::new(kind, anyhow::anyhow!("not installed")));
        }
        self.loaded.lock().unwrap().push(kind);
        Ok(())
    }

    fn apid_name(&self, apid: u16) -> Option<String> {
        self.apids.get(&apid).cloned()
    }
}

/// Refuses every launch.
pub struct NoLauncher;

#[async_trait]
impl ProcessLauncher for NoLauncher {
    async fn launch(&self, _spec: &LaunchSpec) -> Result<Box<dyn ProcessHandle>, ProcessError> {
        Err(ProcessError::SpawnFailed("launching is not expected here".to_string()))
    }

    fn platform_name(&self) -> &'static str {
        "none"
    }
}

/// A session context over the stubs with no launcher.
pub fn context(
    config: SessionConfig,
    factory: Arc<StubFactory>,
    loader: Arc<StubLoader>,
) -> SessionContext {
    let channel = Arc::new(MessageBus::new(config.messaging.clone()));
    SessionContext::new(
        config,
        SessionIdentity::default(),
        channel,
        loader,
        factory,
        Arc::new(NoLauncher),
    )
}

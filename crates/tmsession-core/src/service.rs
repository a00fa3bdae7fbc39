use crate::context::SessionContext;
use crate::error::ServiceError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Smallest start/stop unit of session processing.
///
/// Implementations use interior mutability; the registry only ever holds shared handles.
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self) -> Result<(), ServiceError>;

    async fn stop(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Running,
}

/// What a service does within its feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ServiceRole {
    FrameSync,
    FrameTracking,
    PacketExtract,
    PacketTracking,
    PduExtract,
    FrameHeaderChannelizer,
    PacketHeaderChannelizer,
    SfduHeaderChannelizer,
    EvrExtract,
    ProductAssembly,
    ProductTracking,
    TimeCorrelation,
    RecordedEngineering,
    DsnMonitorChannelizer,
    NenStatusDecom,
}

/// Registry key: a role, optionally qualified by virtual channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    pub role: ServiceRole,
    pub vcid: Option<u32>,
}

impl ServiceKey {
    pub fn named(role: ServiceRole) -> Self {
        Self { role, vcid: None }
    }

    pub fn vcid(role: ServiceRole, vcid: u32) -> Self {
        Self {
            role,
            vcid: Some(vcid),
        }
    }
}

impl std::fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.vcid {
            Some(vcid) => write!(f, "{}[vc {}]", self.role, vcid),
            None => write!(f, "{}", self.role),
        }
    }
}

/// Builds the concrete services that do the actual telemetry work.
pub trait ServiceFactory: Send + Sync {
    fn create(&self, key: &ServiceKey, ctx: &SessionContext) -> anyhow::Result<Arc<dyn Service>>;
}

struct Entry {
    key: ServiceKey,
    service: Arc<dyn Service>,
    state: ServiceState,
}

/// Services of one feature, kept in registration order.
#[derive(Default)]
pub struct ServiceRegistry {
    entries: Vec<Entry>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service; a second registration under the same key replaces the service
    /// but keeps its original position.
    pub fn register(&mut self, key: ServiceKey, service: Arc<dyn Service>) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.key == key) {
            entry.service = service;
            entry.state = ServiceState::Stopped;
            return;
        }
        self.entries.push(Entry {
            key,
            service,
            state: ServiceState::Stopped,
        });
    }

    pub fn get(&self, key: &ServiceKey) -> Option<Arc<dyn Service>> {
        self.entries
            .iter()
            .find(|e| e.key == *key)
            .map(|e| e.service.clone())
    }

    pub fn state(&self, key: &ServiceKey) -> Option<ServiceState> {
        self.entries.iter().find(|e| e.key == *key).map(|e| e.state)
    }

    pub fn keys(&self) -> Vec<ServiceKey> {
        self.entries.iter().map(|e| e.key).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start every stopped entry in registration order.
    ///
    /// A failure does not stop the remaining entries from starting; the keys that
    /// failed are returned.
    pub async fn start_all(&mut self) -> Vec<ServiceKey> {
        let mut failed = Vec::new();
        for entry in self.entries.iter_mut() {
            if entry.state == ServiceState::Running {
                continue;
            }
            match entry.service.start().await {
                Ok(()) => {
                    debug!(service = %entry.key, "Service started");
                    entry.state = ServiceState::Running;
                }
                Err(e @ ServiceError::NotRunnable { .. }) => {
                    info!(service = %entry.key, "{e}");
                    failed.push(entry.key);
                }
                Err(e) => {
                    error!(service = %entry.key, label = e.as_label(), "Service failed to start: {e}");
                    failed.push(entry.key);
                }
            }
        }
        failed
    }

    /// Stop running entries, last registered first.
    pub async fn stop_all(&mut self) {
        for entry in self.entries.iter_mut().rev() {
            if entry.state != ServiceState::Running {
                continue;
            }
            entry.service.stop().await;
            entry.state = ServiceState::Stopped;
            info!(service = %entry.key, "Service stopped");
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

//! Independently enableable processing capabilities.
//!
//! Every capability is the same [`Feature`] record driven by a small
//! [`FeatureSetup`] strategy that names its enable rule, environment gate,
//! dictionaries and services.

mod evr;
mod frame;
mod header;
mod monitor;
mod packet;
mod pdu;
mod product;
mod recorded_eng;
mod time_corr;

pub use evr::EvrSetup;
pub use frame::FrameSetup;
pub use header::HeaderChannelizationSetup;
pub use monitor::{DsnMonitorSetup, NenStatusSetup};
pub use packet::PacketSetup;
pub use pdu::PduSetup;
pub use product::ProductGenerationSetup;
pub use recorded_eng::RecordedEngineeringSetup;
pub use time_corr::TimeCorrelationSetup;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tmsession_core::{
    DictionaryKind, LoadError, LoadPolicy, Service, ServiceKey, ServiceRegistry, SessionConfig,
    SessionContext,
};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum FeatureKind {
    Frame,
    Packet,
    HeaderChannelization,
    Evr,
    Pdu,
    ProductGeneration,
    TimeCorrelation,
    RecordedEngineering,
    DsnMonitor,
    NenStatus,
}

/// How a successful `init` went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    /// Not enabled; nothing was done.
    Disabled,
    /// Enabled, but the session environment rules it out. The feature disabled itself.
    Gated(String),
    Ready,
    /// Running without some optional dictionaries.
    Degraded(Vec<DictionaryKind>),
}

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("{feature}: required {dictionary} dictionary could not be loaded: {source}")]
    HardDictionaryFailure {
        feature: FeatureKind,
        dictionary: DictionaryKind,
        #[source]
        source: LoadError,
    },

    #[error("{feature}: {} service(s) failed to start", failed.len())]
    ServiceStartFailure {
        feature: FeatureKind,
        failed: Vec<ServiceKey>,
    },
}

impl FeatureError {
    pub fn feature(&self) -> FeatureKind {
        match self {
            FeatureError::HardDictionaryFailure { feature, .. }
            | FeatureError::ServiceStartFailure { feature, .. } => *feature,
        }
    }
}

/// Lifecycle of one capability within a session.
#[async_trait]
pub trait FeatureManager: Send + Sync {
    fn kind(&self) -> FeatureKind;

    fn name(&self) -> String {
        self.kind().to_string()
    }

    fn is_enabled(&self) -> bool;

    fn enable(&mut self, enabled: bool);

    /// False until `init` has completed without error.
    fn is_valid(&self) -> bool;

    async fn init(&mut self, ctx: &SessionContext) -> Result<InitOutcome, FeatureError>;

    /// Stop every service this feature started. Safe to call at any time, any number of times.
    async fn shutdown(&mut self);

    fn service(&self, key: &ServiceKey) -> Option<Arc<dyn Service>>;

    fn service_keys(&self) -> Vec<ServiceKey>;
}

/// What distinguishes one capability from another.
pub trait FeatureSetup: Send + Sync {
    fn kind(&self) -> FeatureKind;

    /// Whether the session configuration asks for this capability.
    fn wanted(&self, config: &SessionConfig) -> bool;

    /// Reason the session environment rules the capability out, if it does.
    fn gate(&self, _ctx: &SessionContext) -> Option<String> {
        None
    }

    fn dictionaries(&self, _ctx: &SessionContext) -> Vec<(DictionaryKind, LoadPolicy)> {
        Vec::new()
    }

    /// Services to register, in start order.
    fn plan(&self, ctx: &SessionContext) -> Vec<ServiceKey>;

    fn build(&self, key: &ServiceKey, ctx: &SessionContext) -> anyhow::Result<Arc<dyn Service>> {
        ctx.factory.create(key, ctx)
    }
}

/// Virtual channels services are instantiated for.
pub(crate) fn session_vcids(ctx: &SessionContext) -> Vec<u32> {
    match ctx.identity.vcid {
        Some(vcid) => vec![vcid],
        None => ctx.config.virtual_channels.clone(),
    }
}

pub struct Feature {
    setup: Box<dyn FeatureSetup>,
    enabled: bool,
    valid: bool,
    initialized: bool,
    registry: ServiceRegistry,
}

impl Feature {
    pub fn new(setup: impl FeatureSetup + 'static) -> Self {
        Self {
            setup: Box::new(setup),
            enabled: false,
            valid: false,
            initialized: false,
            registry: ServiceRegistry::new(),
        }
    }

    /// A feature enabled according to the session configuration.
    pub fn configured(setup: impl FeatureSetup + 'static, config: &SessionConfig) -> Self {
        let mut feature = Self::new(setup);
        feature.enabled = feature.setup.wanted(config);
        feature
    }

    async fn load_dictionaries(
        &self,
        ctx: &SessionContext,
    ) -> Result<Vec<DictionaryKind>, FeatureError> {
        let feature = self.kind();
        let mut degraded = Vec::new();
        for (dictionary, policy) in self.setup.dictionaries(ctx) {
            match (ctx.loader.load(dictionary).await, policy) {
                (Ok(()), _) => debug!(%feature, %dictionary, "Dictionary loaded"),
                (Err(e), LoadPolicy::Soft) => {
                    warn!(%feature, %dictionary, "Continuing without dictionary: {e}");
                    degraded.push(dictionary);
                }
                (Err(e), LoadPolicy::Hard) => {
                    error!(%feature, %dictionary, "Required dictionary unavailable: {e}");
                    return Err(FeatureError::HardDictionaryFailure {
                        feature,
                        dictionary,
                        source: e,
                    });
                }
            }
        }
        Ok(degraded)
    }
}

#[async_trait]
impl FeatureManager for Feature {
    fn kind(&self) -> FeatureKind {
        self.setup.kind()
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn enable(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    async fn init(&mut self, ctx: &SessionContext) -> Result<InitOutcome, FeatureError> {
        let feature = self.kind();
        if !self.enabled {
            debug!(%feature, "Feature disabled");
            self.valid = true;
            return Ok(InitOutcome::Disabled);
        }
        if self.initialized {
            if self.valid {
                return Ok(InitOutcome::Ready);
            }
            self.shutdown().await;
        }
        self.valid = false;

        if let Some(reason) = self.setup.gate(ctx) {
            info!(%feature, "Feature not available in this session: {reason}");
            self.enabled = false;
            self.valid = true;
            return Ok(InitOutcome::Gated(reason));
        }

        let degraded = self.load_dictionaries(ctx).await?;

        self.initialized = true;
        let mut failed = Vec::new();
        for key in self.setup.plan(ctx) {
            match self.setup.build(&key, ctx) {
                Ok(service) => self.registry.register(key, service),
                Err(e) => {
                    error!(%feature, service = %key, "Could not build service: {e:#}");
                    failed.push(key);
                }
            }
        }
        failed.extend(self.registry.start_all().await);

        if !failed.is_empty() {
            return Err(FeatureError::ServiceStartFailure { feature, failed });
        }

        self.valid = true;
        info!(%feature, services = self.registry.len(), "Feature initialized");
        if degraded.is_empty() {
            Ok(InitOutcome::Ready)
        } else {
            Ok(InitOutcome::Degraded(degraded))
        }
    }

    async fn shutdown(&mut self) {
        if !self.initialized {
            return;
        }
        debug!(feature = %self.kind(), "Shutting down feature");
        self.registry.stop_all().await;
        self.registry.clear();
        self.initialized = false;
    }

    fn service(&self, key: &ServiceKey) -> Option<Arc<dyn Service>> {
        self.registry.get(key)
    }

    fn service_keys(&self) -> Vec<ServiceKey> {
        self.registry.keys()
    }
}

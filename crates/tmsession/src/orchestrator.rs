use crate::feature::{
    DsnMonitorSetup, EvrSetup, Feature, FeatureError, FeatureKind, FeatureManager, FrameSetup,
    HeaderChannelizationSetup, InitOutcome, NenStatusSetup, PacketSetup, PduSetup,
    ProductGenerationSetup, RecordedEngineeringSetup, TimeCorrelationSetup,
};
use std::sync::Arc;
use tmsession_core::{Service, ServiceKey, SessionConfig, SessionContext};
use tracing::{error, info, warn};

/// Per-feature results of one session initialization.
#[derive(Debug, Default)]
pub struct SessionValidity {
    pub outcomes: Vec<(FeatureKind, Result<InitOutcome, FeatureError>)>,
}

impl SessionValidity {
    pub fn is_valid(&self) -> bool {
        self.outcomes.iter().all(|(_, result)| result.is_ok())
    }

    pub fn failed(&self) -> Vec<FeatureKind> {
        self.outcomes
            .iter()
            .filter(|(_, result)| result.is_err())
            .map(|(kind, _)| *kind)
            .collect()
    }

    pub fn outcome(&self, kind: FeatureKind) -> Option<&Result<InitOutcome, FeatureError>> {
        self.outcomes
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, result)| result)
    }
}

/// Brings a session's features up in a fixed order and takes them down again.
pub struct SessionOrchestrator {
    features: Vec<Box<dyn FeatureManager>>,
}

impl SessionOrchestrator {
    /// Every known feature, in start order, enabled per `config`.
    pub fn new(config: &SessionConfig) -> Self {
        let input = config.input_type;
        if input.needs_frame_sync() && !config.features.frame_sync {
            warn!(?input, "Input needs frame synchronization but it is disabled");
        }
        if input.needs_packet_extract() && !config.features.packet_extract {
            warn!(?input, "Input needs packet extraction but it is disabled");
        }

        let features: Vec<Box<dyn FeatureManager>> = vec![
            Box::new(Feature::configured(FrameSetup, config)),
            Box::new(Feature::configured(PacketSetup, config)),
            Box::new(Feature::configured(HeaderChannelizationSetup, config)),
            Box::new(Feature::configured(EvrSetup, config)),
            Box::new(Feature::configured(PduSetup, config)),
            Box::new(Feature::configured(ProductGenerationSetup, config)),
            Box::new(Feature::configured(TimeCorrelationSetup, config)),
            Box::new(Feature::configured(RecordedEngineeringSetup, config)),
            Box::new(Feature::configured(DsnMonitorSetup, config)),
            Box::new(Feature::configured(NenStatusSetup, config)),
        ];
        Self::with_features(features)
    }

    pub fn with_features(features: Vec<Box<dyn FeatureManager>>) -> Self {
        Self { features }
    }

    /// Initialize every feature in order. A failing feature does not stop the rest.
    pub async fn init(&mut self, ctx: &SessionContext) -> SessionValidity {
        let mut validity = SessionValidity::default();
        for feature in self.features.iter_mut() {
            let kind = feature.kind();
            let result = feature.init(ctx).await;
            if let Err(e) = &result {
                error!(feature = %kind, "Feature failed to initialize: {e}");
            }
            validity.outcomes.push((kind, result));
        }

        if validity.is_valid() {
            info!("All session features initialized");
        } else {
            warn!(failed = ?validity.failed(), "Session initialized with failed features");
        }
        validity
    }

    /// Shut features down, last started first.
    pub async fn shutdown(&mut self) {
        for feature in self.features.iter_mut().rev() {
            feature.shutdown().await;
        }
        info!("Session features shut down");
    }

    pub fn feature(&self, kind: FeatureKind) -> Option<&dyn FeatureManager> {
        self.features
            .iter()
            .find(|f| f.kind() == kind)
            .map(|f| f.as_ref())
    }

    pub fn feature_mut(&mut self, kind: FeatureKind) -> Option<&mut Box<dyn FeatureManager>> {
        self.features.iter_mut().find(|f| f.kind() == kind)
    }

    pub fn kinds(&self) -> Vec<FeatureKind> {
        self.features.iter().map(|f| f.kind()).collect()
    }

    pub fn service(&self, kind: FeatureKind, key: &ServiceKey) -> Option<Arc<dyn Service>> {
        self.feature(kind).and_then(|f| f.service(key))
    }
}

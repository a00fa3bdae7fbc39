use super::{FeatureKind, FeatureSetup};
use crate::supervisor::ExternalProcessSupervisor;
use std::sync::Arc;
use tmsession_core::{
    DictionaryKind, LoadPolicy, MiscFeature, Service, ServiceKey, ServiceRole, SessionConfig,
    SessionContext,
};

/// Watcher process that turns recorded engineering products into channel data
pub struct RecordedEngineeringSetup;

impl FeatureSetup for RecordedEngineeringSetup {
    fn kind(&self) -> FeatureKind {
        FeatureKind::RecordedEngineering
    }

    fn wanted(&self, config: &SessionConfig) -> bool {
        let features = &config.features;
        features.misc_features
            && features.product_gen
            && features.has_misc(MiscFeature::RecordedEngineering)
    }

    fn gate(&self, ctx: &SessionContext) -> Option<String> {
        ctx.config
            .sse
            .then(|| "support equipment sessions produce no recorded engineering".to_string())
    }

    fn dictionaries(&self, _ctx: &SessionContext) -> Vec<(DictionaryKind, LoadPolicy)> {
        vec![(DictionaryKind::Apid, LoadPolicy::Soft)]
    }

    fn plan(&self, _ctx: &SessionContext) -> Vec<ServiceKey> {
        vec![ServiceKey::named(ServiceRole::RecordedEngineering)]
    }

    fn build(&self, _key: &ServiceKey, ctx: &SessionContext) -> anyhow::Result<Arc<dyn Service>> {
        Ok(Arc::new(ExternalProcessSupervisor::new(ctx.clone())))
    }
}

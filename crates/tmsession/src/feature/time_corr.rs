use super::{FeatureKind, FeatureSetup};
use tmsession_core::{DictionaryKind, LoadPolicy, ServiceKey, ServiceRole, SessionConfig, SessionContext};

/// Spacecraft clock to ground time correlation
pub struct TimeCorrelationSetup;

impl FeatureSetup for TimeCorrelationSetup {
    fn kind(&self) -> FeatureKind {
        FeatureKind::TimeCorrelation
    }

    fn wanted(&self, config: &SessionConfig) -> bool {
        config.features.time_corr
    }

    fn gate(&self, ctx: &SessionContext) -> Option<String> {
        (!ctx.config.input_type.has_frames())
            .then(|| format!("input type {:?} carries no frames to correlate", ctx.config.input_type))
    }

    fn dictionaries(&self, _ctx: &SessionContext) -> Vec<(DictionaryKind, LoadPolicy)> {
        vec![(DictionaryKind::Frame, LoadPolicy::Hard)]
    }

    fn plan(&self, _ctx: &SessionContext) -> Vec<ServiceKey> {
        vec![ServiceKey::named(ServiceRole::TimeCorrelation)]
    }
}

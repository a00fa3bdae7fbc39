use super::{FeatureKind, FeatureSetup};
use tmsession_core::{DictionaryKind, LoadPolicy, ServiceKey, ServiceRole, SessionConfig, SessionContext};

/// Event record extraction
pub struct EvrSetup;

impl FeatureSetup for EvrSetup {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Evr
    }

    fn wanted(&self, config: &SessionConfig) -> bool {
        config.features.evr_decom
    }

    fn dictionaries(&self, _ctx: &SessionContext) -> Vec<(DictionaryKind, LoadPolicy)> {
        vec![(DictionaryKind::Evr, LoadPolicy::Soft)]
    }

    fn plan(&self, _ctx: &SessionContext) -> Vec<ServiceKey> {
        vec![ServiceKey::named(ServiceRole::EvrExtract)]
    }
}

use super::{FeatureKind, FeatureSetup, session_vcids};
use tmsession_core::{DictionaryKind, LoadPolicy, ServiceKey, ServiceRole, SessionConfig, SessionContext};

/// Data product assembly per virtual channel plus product accounting
pub struct ProductGenerationSetup;

impl FeatureSetup for ProductGenerationSetup {
    fn kind(&self) -> FeatureKind {
        FeatureKind::ProductGeneration
    }

    fn wanted(&self, config: &SessionConfig) -> bool {
        config.features.product_gen
    }

    fn gate(&self, ctx: &SessionContext) -> Option<String> {
        ctx.config
            .sse
            .then(|| "products are not generated for support equipment telemetry".to_string())
    }

    fn dictionaries(&self, _ctx: &SessionContext) -> Vec<(DictionaryKind, LoadPolicy)> {
        vec![(DictionaryKind::Product, LoadPolicy::Soft)]
    }

    fn plan(&self, ctx: &SessionContext) -> Vec<ServiceKey> {
        session_vcids(ctx)
            .into_iter()
            .map(|vcid| ServiceKey::vcid(ServiceRole::ProductAssembly, vcid))
            .chain(std::iter::once(ServiceKey::named(ServiceRole::ProductTracking)))
            .collect()
    }
}

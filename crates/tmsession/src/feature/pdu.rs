use super::{FeatureKind, FeatureSetup, session_vcids};
use tmsession_core::{ServiceKey, ServiceRole, SessionConfig, SessionContext};

/// Protocol data unit extraction per virtual channel
pub struct PduSetup;

impl FeatureSetup for PduSetup {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Pdu
    }

    fn wanted(&self, config: &SessionConfig) -> bool {
        config.features.pdu_extract
    }

    fn plan(&self, ctx: &SessionContext) -> Vec<ServiceKey> {
        session_vcids(ctx)
            .into_iter()
            .map(|vcid| ServiceKey::vcid(ServiceRole::PduExtract, vcid))
            .collect()
    }
}

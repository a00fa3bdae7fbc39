use super::{FeatureKind, FeatureSetup};
use tmsession_core::{
    DictionaryKind, LoadPolicy, MiscFeature, ServiceKey, ServiceRole, SessionConfig, SessionContext,
};

fn misc_wanted(config: &SessionConfig, feature: MiscFeature) -> bool {
    config.features.misc_features && config.features.has_misc(feature)
}

/// Channelization of ground station monitor data
pub struct DsnMonitorSetup;

impl FeatureSetup for DsnMonitorSetup {
    fn kind(&self) -> FeatureKind {
        FeatureKind::DsnMonitor
    }

    fn wanted(&self, config: &SessionConfig) -> bool {
        misc_wanted(config, MiscFeature::DsnMonitor)
    }

    fn dictionaries(&self, _ctx: &SessionContext) -> Vec<(DictionaryKind, LoadPolicy)> {
        vec![(DictionaryKind::Monitor, LoadPolicy::Soft)]
    }

    fn plan(&self, _ctx: &SessionContext) -> Vec<ServiceKey> {
        vec![ServiceKey::named(ServiceRole::DsnMonitorChannelizer)]
    }
}

/// Decommutation of near-earth network status packets
pub struct NenStatusSetup;

impl FeatureSetup for NenStatusSetup {
    fn kind(&self) -> FeatureKind {
        FeatureKind::NenStatus
    }

    fn wanted(&self, config: &SessionConfig) -> bool {
        misc_wanted(config, MiscFeature::NenStatus)
    }

    fn dictionaries(&self, _ctx: &SessionContext) -> Vec<(DictionaryKind, LoadPolicy)> {
        vec![(DictionaryKind::Monitor, LoadPolicy::Soft)]
    }

    fn plan(&self, _ctx: &SessionContext) -> Vec<ServiceKey> {
        vec![ServiceKey::named(ServiceRole::NenStatusDecom)]
    }
}

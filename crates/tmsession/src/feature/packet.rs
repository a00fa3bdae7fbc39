use super::{FeatureKind, FeatureSetup, session_vcids};
use tmsession_core::{DictionaryKind, LoadPolicy, ServiceKey, ServiceRole, SessionConfig, SessionContext};

/// Packet extraction per virtual channel plus packet accounting
pub struct PacketSetup;

impl FeatureSetup for PacketSetup {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Packet
    }

    /// Packet accounting runs for every session.
    fn wanted(&self, _config: &SessionConfig) -> bool {
        true
    }

    fn dictionaries(&self, _ctx: &SessionContext) -> Vec<(DictionaryKind, LoadPolicy)> {
        vec![(DictionaryKind::Apid, LoadPolicy::Soft)]
    }

    fn plan(&self, ctx: &SessionContext) -> Vec<ServiceKey> {
        let mut keys = Vec::new();
        if ctx.config.features.packet_extract && ctx.config.input_type.needs_packet_extract() {
            keys.extend(
                session_vcids(ctx)
                    .into_iter()
                    .map(|vcid| ServiceKey::vcid(ServiceRole::PacketExtract, vcid)),
            );
        }
        keys.push(ServiceKey::named(ServiceRole::PacketTracking));
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use std::sync::Arc;
    use tmsession_core::TelemetryInputType;

    #[test]
    fn test_packet_input_only_tracks() {
        let config = SessionConfig {
            input_type: TelemetryInputType::SfduPkt,
            ..Default::default()
        };
        let ctx = context(config, Arc::default(), Arc::default());
        assert_eq!(PacketSetup.plan(&ctx), vec![ServiceKey::named(ServiceRole::PacketTracking)]);
    }

    #[test]
    fn test_extractor_per_virtual_channel() {
        let config = SessionConfig::builder()
            .virtual_channels([1, 3])
            .build()
            .unwrap();
        let ctx = context(config, Arc::default(), Arc::default());
        assert_eq!(
            PacketSetup.plan(&ctx),
            vec![
                ServiceKey::vcid(ServiceRole::PacketExtract, 1),
                ServiceKey::vcid(ServiceRole::PacketExtract, 3),
                ServiceKey::named(ServiceRole::PacketTracking),
            ]
        );
    }
}

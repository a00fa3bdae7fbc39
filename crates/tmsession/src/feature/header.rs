use super::{FeatureKind, FeatureSetup};
use tmsession_core::{DictionaryKind, LoadPolicy, ServiceKey, ServiceRole, SessionConfig, SessionContext};

/// Channelization of frame, packet and SFDU header fields
pub struct HeaderChannelizationSetup;

impl FeatureSetup for HeaderChannelizationSetup {
    fn kind(&self) -> FeatureKind {
        FeatureKind::HeaderChannelization
    }

    fn wanted(&self, config: &SessionConfig) -> bool {
        config.features.any_header_channelizer()
    }

    fn dictionaries(&self, _ctx: &SessionContext) -> Vec<(DictionaryKind, LoadPolicy)> {
        vec![(DictionaryKind::Header, LoadPolicy::Soft)]
    }

    fn plan(&self, ctx: &SessionContext) -> Vec<ServiceKey> {
        let features = &ctx.config.features;
        let input = ctx.config.input_type;
        let mut keys = Vec::new();
        if features.frame_header_channels && input.has_frames() {
            keys.push(ServiceKey::named(ServiceRole::FrameHeaderChannelizer));
        }
        if features.packet_header_channels {
            keys.push(ServiceKey::named(ServiceRole::PacketHeaderChannelizer));
        }
        if features.sfdu_header_channels && input.has_sfdus() {
            keys.push(ServiceKey::named(ServiceRole::SfduHeaderChannelizer));
        }
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
    fn test_channelizers_follow_input() {
        let mut config = SessionConfig {
            input_type: TelemetryInputType::RawPkt,
            ..Default::default()
        };
        config.features.frame_header_channels = true;
        config.features.packet_header_channels = true;
        config.features.sfdu_header_channels = true;
        let ctx = context(config, Arc::default(), Arc::default());

        assert!(HeaderChannelizationSetup.wanted(&ctx.config));
        assert_eq!(
            HeaderChannelizationSetup.plan(&ctx),
            vec![ServiceKey::named(ServiceRole::PacketHeaderChannelizer)]
        );
    }

    #[test]
    fn test_not_wanted_without_channelizers() {
        assert!(!HeaderChannelizationSetup.wanted(&SessionConfig::default()));
    }
}

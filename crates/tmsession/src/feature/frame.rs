use super::{FeatureKind, FeatureSetup};
use tmsession_core::{DictionaryKind, LoadPolicy, ServiceKey, ServiceRole, SessionConfig, SessionContext};

/// Frame synchronization and frame accounting
pub struct FrameSetup;

impl FeatureSetup for FrameSetup {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Frame
    }

    fn wanted(&self, config: &SessionConfig) -> bool {
        config.input_type.has_frames()
    }

    fn dictionaries(&self, _ctx: &SessionContext) -> Vec<(DictionaryKind, LoadPolicy)> {
        vec![(DictionaryKind::Frame, LoadPolicy::Hard)]
    }

    fn plan(&self, ctx: &SessionContext) -> Vec<ServiceKey> {
        let input = ctx.config.input_type;
        let mut keys = Vec::new();
        if ctx.config.features.frame_sync && input.needs_frame_sync() {
            keys.push(ServiceKey::named(ServiceRole::FrameSync));
        }
        if input.has_frames() {
            keys.push(ServiceKey::named(ServiceRole::FrameTracking));
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

    fn ctx(input_type: TelemetryInputType, frame_sync: bool) -> SessionContext {
        let mut config = SessionConfig {
            input_type,
            ..Default::default()
        };
        config.features.frame_sync = frame_sync;
        context(config, Arc::default(), Arc::default())
    }

    #[test]
    fn test_raw_frames_get_sync_and_tracking() {
        let ctx = ctx(TelemetryInputType::RawTf, true);
        assert!(FrameSetup.wanted(&ctx.config));
        assert_eq!(
            FrameSetup.plan(&ctx),
            vec![
                ServiceKey::named(ServiceRole::FrameSync),
                ServiceKey::named(ServiceRole::FrameTracking)
            ]
        );
    }

    #[test]
    fn test_synced_frames_skip_sync() {
        let ctx = ctx(TelemetryInputType::SyncedTf, true);
        assert_eq!(FrameSetup.plan(&ctx), vec![ServiceKey::named(ServiceRole::FrameTracking)]);
    }

    #[test]
    fn test_packet_input_has_no_frame_feature() {
        let ctx = ctx(TelemetryInputType::RawPkt, true);
        assert!(!FrameSetup.wanted(&ctx.config));
        assert!(FrameSetup.plan(&ctx).is_empty());
    }
}

use crate::error::ConfigError;
use anyhow::Context;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Kind of telemetry arriving on the session's input connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TelemetryInputType {
    /// Unsynchronized transfer frame bit stream
    #[default]
    RawTf,
    /// Already synchronized transfer frames
    SyncedTf,
    /// Transfer frames wrapped in SFDUs
    SfduTf,
    /// Bare space packets
    RawPkt,
    /// Space packets wrapped in SFDUs
    SfduPkt,
}

impl TelemetryInputType {
    pub fn has_frames(&self) -> bool {
        matches!(self, Self::RawTf | Self::SyncedTf | Self::SfduTf)
    }

    pub fn needs_frame_sync(&self) -> bool {
        matches!(self, Self::RawTf)
    }

    pub fn needs_packet_extract(&self) -> bool {
        self.has_frames()
    }

    pub fn has_sfdus(&self) -> bool {
        matches!(self, Self::SfduTf | Self::SfduPkt)
    }
}

/// Operational venue of the session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VenueType {
    #[default]
    #[display("TESTSET")]
    Testset,
    #[display("TESTBED")]
    Testbed,
    #[display("ATLO")]
    Atlo,
    #[display("CRUISE")]
    Cruise,
    #[display("SURFACE")]
    Surface,
    #[display("OPS")]
    Ops,
}

impl VenueType {
    pub fn is_ops_venue(&self) -> bool {
        matches!(self, Self::Cruise | Self::Surface | Self::Ops)
    }

    pub fn is_test_venue(&self) -> bool {
        matches!(self, Self::Atlo | Self::Testbed)
    }
}

/// Optional features that are only instantiated when listed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MiscFeature {
    RecordedEngineering,
    DsnMonitor,
    NenStatus,
}

/// Which processing capabilities are requested for the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureSet {
    pub frame_sync: bool,
    pub packet_extract: bool,
    pub frame_header_channels: bool,
    pub packet_header_channels: bool,
    pub sfdu_header_channels: bool,
    pub evr_decom: bool,
    pub pdu_extract: bool,
    pub product_gen: bool,
    pub time_corr: bool,
    pub misc_features: bool,
    pub misc: Vec<MiscFeature>,
}

impl Default for FeatureSet {
    fn default() -> Self {
        Self {
            frame_sync: true,
            packet_extract: true,
            frame_header_channels: false,
            packet_header_channels: false,
            sfdu_header_channels: false,
            evr_decom: true,
            pdu_extract: false,
            product_gen: true,
            time_corr: false,
            misc_features: false,
            misc: Vec::new(),
        }
    }
}

impl FeatureSet {
    /// Every capability off; useful as a base for selective enabling
    pub fn none() -> Self {
        Self {
            frame_sync: false,
            packet_extract: false,
            evr_decom: false,
            product_gen: false,
            ..Default::default()
        }
    }

    pub fn any_header_channelizer(&self) -> bool {
        self.frame_header_channels || self.packet_header_channels || self.sfdu_header_channels
    }

    pub fn has_misc(&self, feature: MiscFeature) -> bool {
        self.misc.contains(&feature)
    }
}

/// Publish/subscribe service connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessagingConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Topic prefix for everything this session publishes
    pub root_topic: String,
    /// Check the broker endpoint accepts connections before subscribing
    pub check_service: bool,
    pub connect_timeout_ms: u64,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "localhost".to_string(),
            port: 61614,
            root_topic: "mpcs.session".to_string(),
            check_service: true,
            connect_timeout_ms: 2_000,
        }
    }
}

impl MessagingConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    pub host: String,
    pub port: u16,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VenueConfig {
    pub venue: VenueType,
    pub testbed_name: Option<String>,
    pub downlink_stream: Option<String>,
    pub subtopic: Option<String>,
}

/// Settings for the recorded engineering watcher process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase", default)]
#[builder(setter(into), default)]
pub struct RecordedEngineeringConfig {
    /// Directory holding the worker executable
    pub worker_dir: PathBuf,
    pub worker_script: String,
    pub startup_timeout_ms: u64,
    pub shutdown_timeout_ms: u64,
    /// Added on top of the shutdown timeout
    pub shutdown_grace_ms: u64,
    /// Bound on joining the output readers after the worker is killed
    pub reader_join_timeout_ms: u64,
    /// Product APIDs whose names become the worker's product list
    #[builder(setter(custom))]
    pub product_apids: Vec<u16>,
    /// Explicit product names; overrides `product_apids` when non-empty
    #[builder(setter(custom))]
    pub product_names: Vec<String>,
    pub startup_marker: String,
    #[builder(setter(custom))]
    pub shutdown_markers: Vec<String>,
    /// `{}` is replaced by the run id
    pub flag_file_pattern: String,
    /// Report success without touching the OS
    pub dry_run: bool,
}

impl Default for RecordedEngineeringConfig {
    fn default() -> Self {
        Self {
            worker_dir: PathBuf::from("bin"),
            worker_script: "chill_recorded_eng_watcher".to_string(),
            startup_timeout_ms: 60_000,
            shutdown_timeout_ms: 30_000,
            shutdown_grace_ms: 5_000,
            reader_join_timeout_ms: 2_000,
            product_apids: Vec::new(),
            product_names: Vec::new(),
            startup_marker: "MESSAGE ROUTER UP".to_string(),
            shutdown_markers: vec![
                "MESSAGE ROUTER DOWN".to_string(),
                "LISTENERS DOWN".to_string(),
            ],
            flag_file_pattern: "product_handler.{}.flag".to_string(),
            dry_run: false,
        }
    }
}

impl RecordedEngineeringConfig {
    pub fn builder() -> RecordedEngineeringConfigBuilder {
        RecordedEngineeringConfigBuilder::default()
    }

    pub fn worker_path(&self) -> PathBuf {
        self.worker_dir.join(&self.worker_script)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    /// Shutdown timeout including the fixed grace period
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms.saturating_add(self.shutdown_grace_ms))
    }

    pub fn reader_join_timeout(&self) -> Duration {
        Duration::from_millis(self.reader_join_timeout_ms)
    }

    pub fn flag_file_name(&self, run_id: &str) -> String {
        self.flag_file_pattern.replacen("{}", run_id, 1)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.startup_timeout_ms == 0 {
            return Err(ConfigError::invalid("startupTimeoutMs", "must be positive"));
        }
        if self.shutdown_timeout_ms == 0 {
            return Err(ConfigError::invalid("shutdownTimeoutMs", "must be positive"));
        }
        if self.startup_marker.trim().is_empty() {
            return Err(ConfigError::invalid("startupMarker", "must not be blank"));
        }
        if self.shutdown_markers.is_empty() || self.shutdown_markers.iter().any(|m| m.trim().is_empty()) {
            return Err(ConfigError::invalid(
                "shutdownMarkers",
                "at least one non-blank marker is required",
            ));
        }
        if !self.flag_file_pattern.contains("{}") {
            return Err(ConfigError::invalid(
                "flagFilePattern",
                "must contain a {} placeholder for the run id",
            ));
        }
        if self.worker_script.trim().is_empty() {
            return Err(ConfigError::invalid("workerScript", "must not be blank"));
        }
        Ok(())
    }
}

impl RecordedEngineeringConfigBuilder {
    pub fn product_apids<I: IntoIterator<Item = u16>>(&mut self, iter: I) -> &mut Self {
        self.product_apids = Some(iter.into_iter().collect());
        self
    }

    pub fn product_names<S: ToString, I: IntoIterator<Item = S>>(&mut self, iter: I) -> &mut Self {
        self.product_names = Some(iter.into_iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn shutdown_markers<S: ToString, I: IntoIterator<Item = S>>(&mut self, iter: I) -> &mut Self {
        self.shutdown_markers = Some(iter.into_iter().map(|s| s.to_string()).collect());
        self
    }
}

/// Main session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase", default)]
#[builder(setter(into), default)]
pub struct SessionConfig {
    pub features: FeatureSet,
    pub input_type: TelemetryInputType,
    /// Virtual channels carrying packets and products
    #[builder(setter(custom))]
    pub virtual_channels: Vec<u32>,
    /// Session output directory for logs and flag files
    pub output_dir: PathBuf,
    /// Processing simulated support equipment rather than flight data
    pub sse: bool,
    pub messaging: MessagingConfig,
    pub storage: StorageConfig,
    pub venue: VenueConfig,
    pub recorded_engineering: RecordedEngineeringConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            features: FeatureSet::default(),
            input_type: TelemetryInputType::default(),
            virtual_channels: vec![0],
            output_dir: PathBuf::from("."),
            sse: false,
            messaging: MessagingConfig::default(),
            storage: StorageConfig::default(),
            venue: VenueConfig::default(),
            recorded_engineering: RecordedEngineeringConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Load a JSON session configuration; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: SessionConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.messaging.enabled && self.messaging.port == 0 {
            return Err(ConfigError::invalid("messaging.port", "must be non-zero"));
        }
        if self.messaging.enabled && self.messaging.host.trim().is_empty() {
            return Err(ConfigError::invalid("messaging.host", "must not be blank"));
        }
        self.recorded_engineering.validate()
    }
}

impl SessionConfigBuilder {
    pub fn virtual_channels<I: IntoIterator<Item = u32>>(&mut self, iter: I) -> &mut Self {
        self.virtual_channels = Some(iter.into_iter().collect());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.virtual_channels, vec![0]);
        assert!(config.messaging.enabled);
    }

    #[test]
    fn test_input_type_capabilities() {
        assert!(TelemetryInputType::RawTf.needs_frame_sync());
        assert!(!TelemetryInputType::SyncedTf.needs_frame_sync());
        assert!(TelemetryInputType::SfduTf.has_sfdus());
        assert!(!TelemetryInputType::RawPkt.has_frames());
        assert!(!TelemetryInputType::SfduPkt.needs_packet_extract());
    }

    #[test]
    fn test_shutdown_timeout_includes_grace() {
        let config = RecordedEngineeringConfig::builder()
            .shutdown_timeout_ms(1_000u64)
            .shutdown_grace_ms(500u64)
            .build()
            .unwrap();
        assert_eq!(config.shutdown_timeout(), Duration::from_millis(1_500));
    }

    #[test]
    fn test_extreme_shutdown_timeout_saturates() {
        let config: RecordedEngineeringConfig = serde_json::from_str(&format!(
            r#"{{"shutdownTimeoutMs": {}, "shutdownGraceMs": 5000}}"#,
            u64::MAX
        ))
        .unwrap();
        assert_eq!(config.shutdown_timeout(), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_flag_file_name() {
        let config = RecordedEngineeringConfig::default();
        assert_eq!(config.flag_file_name("42.1.host"), "product_handler.42.1.host.flag");
    }

    #[test]
    fn test_invalid_config() {
        let mut config = RecordedEngineeringConfig {
            startup_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.startup_timeout_ms = 100;
        config.flag_file_pattern = "no-placeholder.flag".to_string();
        assert!(config.validate().is_err());

        config.flag_file_pattern = "f.{}".to_string();
        config.shutdown_markers = vec![];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_sets_lists() {
        let config = SessionConfig::builder()
            .virtual_channels([1, 6])
            .sse(true)
            .build()
            .unwrap();
        assert_eq!(config.virtual_channels, vec![1, 6]);
        assert!(config.sse);
        assert_eq!(config.storage.port, 3306);
    }

    #[test]
    fn test_from_json_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"inputType": "SFDU_PKT", "venue": {{"venue": "ATLO", "testbedName": "FSWTB"}},
               "recordedEngineering": {{"productApids": [5, 9], "startupTimeoutMs": 250}}}}"#
        )
        .unwrap();

        let config = SessionConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.input_type, TelemetryInputType::SfduPkt);
        assert_eq!(config.venue.venue, VenueType::Atlo);
        assert_eq!(config.venue.testbed_name.as_deref(), Some("FSWTB"));
        assert_eq!(config.recorded_engineering.product_apids, vec![5, 9]);
        assert_eq!(config.recorded_engineering.startup_timeout_ms, 250);
        assert_eq!(config.recorded_engineering.startup_marker, "MESSAGE ROUTER UP");
    }

    #[test]
    fn test_serialization() {
        let config = SessionConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: SessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }
}

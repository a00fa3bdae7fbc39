use crate::error::LoadError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Reference data a feature may need before its services can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "camelCase")]
pub enum DictionaryKind {
    #[display("apid")]
    Apid,
    #[display("frame")]
    Frame,
    #[display("header channel")]
    Header,
    #[display("evr")]
    Evr,
    #[display("product")]
    Product,
    #[display("monitor")]
    Monitor,
}

/// Whether a load failure disables the feature or only degrades it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPolicy {
    /// Warn and keep going without the data.
    Soft,
    /// The feature cannot decode correctly without the data.
    Hard,
}

/// Collaborator that loads and serves dictionary content.
#[async_trait]
pub trait DictionaryLoader: Send + Sync {
    async fn load(&self, kind: DictionaryKind) -> Result<(), LoadError>;

    /// Name of an APID from the loaded APID dictionary.
    fn apid_name(&self, _apid: u16) -> Option<String> {
        None
    }
}

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_crypto::{AesGcmCipher, Secret};
use strata_merge::MergePolicyKind;
use strata_store::{ChunkerConfig, GearChunker, ValueCodec};
use strata_types::{Clock, IdSource, Link, SystemClock, UuidIdSource};

use crate::error::{VersionError, VersionResult};

/// File-level settings, usually read from `strata.toml`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionStoreConfig {
    pub read_only: bool,
    pub chunker: ChunkerConfig,
    /// Hex-encoded 32-byte secret. Property values are encrypted when set.
    pub secret: Option<String>,
}

impl VersionStoreConfig {
    pub fn from_toml_str(s: &str) -> VersionResult<Self> {
        toml::from_str(s).map_err(|e| VersionError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> VersionResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| VersionError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> VersionResult<String> {
        toml::to_string(self).map_err(|e| VersionError::Config(e.to_string()))
    }

    pub fn chunker(&self) -> VersionResult<GearChunker> {
        Ok(GearChunker::new(self.chunker)?)
    }

    pub fn value_codec(&self) -> VersionResult<ValueCodec> {
        match &self.secret {
            Some(hex) => {
                let secret = Secret::from_hex(hex)?;
                Ok(ValueCodec::encrypted(Arc::new(AesGcmCipher::new(secret))))
            }
            None => Ok(ValueCodec::plain()),
        }
    }

    pub fn options(&self) -> VersionStoreOptions {
        VersionStoreOptions {
            read_only: self.read_only,
            ..VersionStoreOptions::default()
        }
    }
}

/// How to open a [`VersionStore`](crate::VersionStore).
#[derive(Clone)]
pub struct VersionStoreOptions {
    /// Never write the version log.
    pub read_only: bool,
    /// Recover identity and versions from this persisted log.
    pub store_root: Option<Link>,
    /// Check out (or record) this version after opening.
    pub version_root: Option<Link>,
    pub policy: MergePolicyKind,
    pub clock: Arc<dyn Clock>,
    pub id_source: Arc<dyn IdSource>,
}

impl Default for VersionStoreOptions {
    fn default() -> Self {
        Self {
            read_only: false,
            store_root: None,
            version_root: None,
            policy: MergePolicyKind::default(),
            clock: Arc::new(SystemClock),
            id_source: Arc::new(UuidIdSource),
        }
    }
}

impl VersionStoreOptions {
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn with_store_root(mut self, root: Link) -> Self {
        self.store_root = Some(root);
        self
    }

    pub fn with_version_root(mut self, root: Link) -> Self {
        self.version_root = Some(root);
        self
    }

    pub fn with_policy(mut self, policy: MergePolicyKind) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_source(mut self, id_source: Arc<dyn IdSource>) -> Self {
        self.id_source = id_source;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = VersionStoreConfig::default();
        assert!(!c.read_only);
        assert_eq!(c.chunker, ChunkerConfig::default());
        assert!(c.secret.is_none());
        assert!(!c.value_codec().unwrap().is_encrypted());
    }

    #[test]
    fn parse_toml() {
        let c = VersionStoreConfig::from_toml_str(
            r#"
            read_only = true
            secret = "0101010101010101010101010101010101010101010101010101010101010101"

            [chunker]
            min_size = 64
            avg_size = 128
            max_size = 512
            "#,
        )
        .unwrap();
        assert!(c.read_only);
        assert_eq!(c.chunker, ChunkerConfig::small());
        assert!(c.value_codec().unwrap().is_encrypted());
        assert!(c.options().read_only);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let c = VersionStoreConfig::from_toml_str("read_only = true").unwrap();
        assert_eq!(c.chunker, ChunkerConfig::default());
    }

    #[test]
    fn toml_round_trip() {
        let c = VersionStoreConfig {
            read_only: true,
            chunker: ChunkerConfig::small(),
            secret: None,
        };
        let text = c.to_toml_string().unwrap();
        assert_eq!(VersionStoreConfig::from_toml_str(&text).unwrap(), c);
    }

    #[test]
    fn bad_secret() {
        let c = VersionStoreConfig {
            secret: Some("not hex".into()),
            ..VersionStoreConfig::default()
        };
        assert!(matches!(c.value_codec(), Err(VersionError::Crypto(_))));
    }

    #[test]
    fn invalid_chunker() {
        let c = VersionStoreConfig {
            chunker: ChunkerConfig {
                min_size: 10,
                avg_size: 100,
                max_size: 50,
            },
            ..VersionStoreConfig::default()
        };
        assert!(matches!(c.chunker(), Err(VersionError::Store(_))));
    }

    #[test]
    fn options_builder() {
        let root = Link::from_hash([1; 32]);
        let o = VersionStoreOptions::default()
            .read_only()
            .with_store_root(root)
            .with_version_root(root);
        assert!(o.read_only);
        assert_eq!(o.store_root, Some(root));
        assert_eq!(o.version_root, Some(root));
    }
}

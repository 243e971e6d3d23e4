use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use worldvault_compress::{CompressionOptions, Preset, Strategy};

use crate::StoreError;

/// When saves go through the compression engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressMode {
    Never,
    /// Only when the backend enforces a size ceiling.
    #[default]
    WhenLimited,
    Always,
}

/// Store configuration.
///
/// Every field is optional in YAML:
/// ```yaml
/// preset: batch
/// compress_on_save: always
/// sync_on_save: true
/// auto_save_interval_ms: 5000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Options for the write path.
    pub compression: CompressionOptions,
    /// Named bundle that replaces `compression` when set.
    pub preset: Option<Preset>,
    pub compress_on_save: CompressMode,
    /// Options for `export_world(.., Compressed)`.
    pub export_compression: CompressionOptions,
    /// Passed through to save receipts for a sync layer to act on.
    pub sync_on_save: bool,
    pub auto_save_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            compression: CompressionOptions::default(),
            preset: None,
            compress_on_save: CompressMode::default(),
            export_compression: CompressionOptions::with_strategy(Strategy::Hybrid)
                .level(9)
                .threshold(0),
            sync_on_save: false,
            auto_save_interval_ms: 30_000,
        }
    }
}

impl StoreConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, StoreError> {
        serde_yaml::from_str(text).map_err(|e| StoreError::Config(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&text)
    }

    /// Options used when compressing on save.
    pub fn save_options(&self) -> CompressionOptions {
        self.preset.map(Preset::options).unwrap_or(self.compression)
    }

    pub fn auto_save_interval(&self) -> Duration {
        Duration::from_millis(self.auto_save_interval_ms.max(1))
    }

    /// Whether saves compress, given the backend's size ceiling.
    pub fn compresses_on_save(&self, ceiling: Option<usize>) -> bool {
        match self.compress_on_save {
            CompressMode::Never => false,
            CompressMode::WhenLimited => ceiling.is_some(),
            CompressMode::Always => true,
        }
    }
}

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::Strategy;

/// Documents smaller than this many bytes are stored uncompressed.
pub const DEFAULT_THRESHOLD: usize = 10 * 1024;
pub const DEFAULT_LEVEL: u8 = 6;
pub const MIN_LEVEL: u8 = 1;
pub const MAX_LEVEL: u8 = 9;

/// Per-call compression knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionOptions {
    pub strategy: Strategy,
    /// Size in bytes below which compression is skipped.
    pub threshold: usize,
    /// 1 = fastest, 9 = best ratio. Out-of-range values are clamped.
    pub level: u8,
    /// Run the codec on the blocking pool when called through the async API.
    pub parallel: bool,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            threshold: DEFAULT_THRESHOLD,
            level: DEFAULT_LEVEL,
            parallel: false,
        }
    }
}

impl CompressionOptions {
    pub fn with_strategy(strategy: Strategy) -> Self {
        Self {
            strategy,
            ..Default::default()
        }
    }

    pub fn threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// The level actually passed to the encoder.
    pub fn effective_level(&self) -> u8 {
        self.level.clamp(MIN_LEVEL, MAX_LEVEL)
    }
}

/// Named option bundles for common workloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Interactive editing: cheap encoders, high bypass threshold.
    RealTime,
    /// Background saves: ratio over latency.
    Batch,
    /// Archival: best ratio regardless of time.
    Offline,
    /// Constrained devices: moderate level.
    Mobile,
}

impl Preset {
    pub fn options(self) -> CompressionOptions {
        let (strategy, level, threshold) = match self {
            Self::RealTime => (Strategy::Lz, 1, 32 * 1024),
            Self::Batch => (Strategy::Gzip, 8, 8 * 1024),
            Self::Offline => (Strategy::Hybrid, MAX_LEVEL, 1024),
            Self::Mobile => (Strategy::Gzip, 5, 16 * 1024),
        };
        CompressionOptions {
            strategy,
            threshold,
            level,
            parallel: false,
        }
    }
}

impl From<Preset> for CompressionOptions {
    fn from(preset: Preset) -> Self {
        preset.options()
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "real_time" | "realtime" => Ok(Self::RealTime),
            "batch" => Ok(Self::Batch),
            "offline" => Ok(Self::Offline),
            "mobile" => Ok(Self::Mobile),
            other => Err(format!("unknown preset: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = CompressionOptions::default();
        assert_eq!(options.strategy, Strategy::Hybrid);
        assert_eq!(options.threshold, 10 * 1024);
        assert!(!options.parallel);
    }

    #[test]
    fn level_is_clamped() {
        assert_eq!(CompressionOptions::default().level(0).effective_level(), 1);
        assert_eq!(CompressionOptions::default().level(42).effective_level(), 9);
        assert_eq!(CompressionOptions::default().level(4).effective_level(), 4);
    }

    #[test]
    fn presets_resolve_to_concrete_options() {
        assert_eq!(Preset::RealTime.options().strategy, Strategy::Lz);
        assert_eq!(Preset::Offline.options().strategy, Strategy::Hybrid);
        assert_eq!(Preset::Offline.options().level, 9);
        assert!(Preset::Batch.options().level > Preset::Mobile.options().level);
        assert!(Preset::RealTime.options().threshold > Preset::Offline.options().threshold);
    }

    #[test]
    fn partial_options_deserialize_with_defaults() {
        let options: CompressionOptions =
            serde_json::from_str(r#"{"strategy": "zip-of-doom", "level": 3}"#).unwrap();
        assert_eq!(options.strategy, Strategy::Hybrid);
        assert_eq!(options.level, 3);
        assert_eq!(options.threshold, DEFAULT_THRESHOLD);
    }

    #[test]
    fn preset_names_parse() {
        assert_eq!("real-time".parse::<Preset>().unwrap(), Preset::RealTime);
        assert_eq!("MOBILE".parse::<Preset>().unwrap(), Preset::Mobile);
        assert!("turbo".parse::<Preset>().is_err());
    }
}

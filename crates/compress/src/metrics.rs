use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use crate::{Algorithm, CompressionResult};

/// Snapshot of engine-wide compression counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionMetrics {
    /// Every `compress` call.
    pub total_processed: u64,
    /// Calls that produced a non-`none` payload.
    pub total_compressed: u64,
    /// Running mean of `ratio` over compressed calls.
    pub average_ratio: f64,
    pub strategy_usage: BTreeMap<Algorithm, u64>,
}

/// Shared aggregator. One lock covers every counter so concurrent updates
/// and snapshots always see a consistent set.
#[derive(Debug, Default)]
pub(crate) struct MetricsRecorder {
    inner: Mutex<CompressionMetrics>,
}

impl MetricsRecorder {
    pub(crate) fn record(&self, result: &CompressionResult) {
        let mut metrics = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        metrics.total_processed += 1;
        *metrics.strategy_usage.entry(result.algorithm).or_default() += 1;
        if result.is_compressed() {
            metrics.total_compressed += 1;
            let n = metrics.total_compressed as f64;
            metrics.average_ratio += (result.ratio - metrics.average_ratio) / n;
        }
    }

    pub(crate) fn snapshot(&self) -> CompressionMetrics {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn reset(&self) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = CompressionMetrics::default();
    }
}

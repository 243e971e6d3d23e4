use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use worldvault_model::{WorldState, canonical_bytes};

use crate::codec::Codec;
use crate::metrics::MetricsRecorder;
use crate::{
    Algorithm, CompressError, CompressionMetadata, CompressionMetrics, CompressionOptions,
    CompressionResult, Strategy,
};

const RATIO_WEIGHT: f64 = 0.7;
const SPEED_WEIGHT: f64 = 0.3;

/// A decoded document and the time it took.
#[derive(Debug, Clone)]
pub struct Decompressed {
    pub data: WorldState,
    pub duration: Duration,
}

/// One row of a benchmark run.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkEntry {
    pub strategy: Strategy,
    pub result: CompressionResult,
    /// Higher is better.
    pub score: f64,
}

/// Compression service. Each call is independent; the only shared state is
/// the metrics aggregate.
#[derive(Debug, Default)]
pub struct CompressionEngine {
    metrics: MetricsRecorder,
}

impl CompressionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compress a document. Never fails: problems degrade to a `none` result.
    pub fn compress(&self, doc: &WorldState, options: &CompressionOptions) -> CompressionResult {
        let result = self.compress_untracked(doc, options);
        self.metrics.record(&result);
        result
    }

    /// Decode a result back into a document.
    pub fn decompress(&self, result: &CompressionResult) -> Result<Decompressed, CompressError> {
        let _span = tracing::debug_span!("decompress", algorithm = %result.algorithm).entered();
        let start = Instant::now();
        let bytes = result.algorithm.decode(&result.data)?;
        let data: WorldState = serde_json::from_slice(&bytes)
            .map_err(|e| CompressError::decompression(result.algorithm, e))?;
        Ok(Decompressed {
            data,
            duration: start.elapsed(),
        })
    }

    /// Like [`compress`](Self::compress), but runs on the blocking pool when
    /// `options.parallel` is set.
    pub async fn compress_async(
        self: &Arc<Self>,
        doc: WorldState,
        options: CompressionOptions,
    ) -> CompressionResult {
        if !options.parallel {
            return self.compress(&doc, &options);
        }
        let engine = Arc::clone(self);
        match tokio::task::spawn_blocking(move || engine.compress(&doc, &options)).await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => {
                tracing::warn!(%err, "compression task cancelled, storing nothing compressed");
                CompressionResult::new(
                    Algorithm::None,
                    0,
                    Vec::new(),
                    Duration::ZERO,
                    CompressionMetadata {
                        requested: options.strategy,
                        threshold: options.threshold,
                        ..Default::default()
                    },
                )
            }
        }
    }

    /// Async counterpart of [`decompress`](Self::decompress).
    pub async fn decompress_async(
        self: &Arc<Self>,
        result: CompressionResult,
        parallel: bool,
    ) -> Result<Decompressed, CompressError> {
        if !parallel {
            return self.decompress(&result);
        }
        let engine = Arc::clone(self);
        match tokio::task::spawn_blocking(move || engine.decompress(&result)).await {
            Ok(decoded) => decoded,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Err(CompressError::Decompression {
                algorithm: Algorithm::None,
                reason: err.to_string(),
            }),
        }
    }

    /// Run every strategy against `doc` and rank the outcomes, best first.
    ///
    /// The bypass threshold is ignored so each strategy actually runs.
    /// Benchmark runs are not counted in the metrics.
    pub fn benchmark(
        &self,
        doc: &WorldState,
        strategies: &[Strategy],
        level: u8,
    ) -> Vec<BenchmarkEntry> {
        let _span = tracing::info_span!("benchmark", world = doc.id()).entered();
        let mut entries: Vec<BenchmarkEntry> = strategies
            .iter()
            .map(|&strategy| {
                let options = CompressionOptions {
                    strategy,
                    threshold: 0,
                    level,
                    parallel: false,
                };
                let result = self.compress_untracked(doc, &options);
                let score = score(&result);
                tracing::debug!(%strategy, algorithm = %result.algorithm, ratio = result.ratio, score, "benchmarked");
                BenchmarkEntry {
                    strategy,
                    result,
                    score,
                }
            })
            .collect();

        entries.sort_by(rank);
        entries
    }

    pub fn metrics(&self) -> CompressionMetrics {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    fn compress_untracked(
        &self,
        doc: &WorldState,
        options: &CompressionOptions,
    ) -> CompressionResult {
        let _span = tracing::debug_span!("compress", world = doc.id()).entered();
        let start = Instant::now();
        let level = options.effective_level();
        let mut metadata = CompressionMetadata {
            requested: options.strategy,
            level: None,
            threshold: options.threshold,
            fallback: false,
        };

        let bytes = match canonical_bytes(doc) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(%err, "world not serializable, returning empty uncompressed result");
                return CompressionResult::new(
                    Algorithm::None,
                    0,
                    Vec::new(),
                    start.elapsed(),
                    metadata,
                );
            }
        };
        let original_size = bytes.len();

        if original_size < options.threshold {
            tracing::trace!(original_size, threshold = options.threshold, "below threshold");
            return CompressionResult::new(
                Algorithm::None,
                original_size,
                bytes,
                start.elapsed(),
                metadata,
            );
        }

        let has_structure = !doc.elements.is_empty() || doc.has_timeline();
        let algorithm = Algorithm::resolve(options.strategy, has_structure);
        if algorithm.uses_level() {
            metadata.level = Some(level);
        }

        let encoded = match algorithm.encode(&bytes, level) {
            Ok(encoded) if algorithm == Algorithm::None || encoded.len() < original_size => {
                encoded
            }
            Ok(encoded) => {
                tracing::debug!(%algorithm, original_size, encoded = encoded.len(), "encoding did not shrink input");
                return fallback(bytes, metadata, start);
            }
            Err(err) => {
                tracing::warn!(%err, "encoder failed, keeping raw bytes");
                return fallback(bytes, metadata, start);
            }
        };

        let result =
            CompressionResult::new(algorithm, original_size, encoded, start.elapsed(), metadata);
        tracing::debug!(
            %algorithm,
            original_size,
            compressed_size = result.compressed_size,
            ratio = result.ratio,
            "compressed"
        );
        result
    }
}

fn fallback(bytes: Vec<u8>, mut metadata: CompressionMetadata, start: Instant) -> CompressionResult {
    metadata.level = None;
    metadata.fallback = true;
    let size = bytes.len();
    CompressionResult::new(Algorithm::None, size, bytes, start.elapsed(), metadata)
}

/// Best first: higher score, then shorter duration.
fn rank(a: &BenchmarkEntry, b: &BenchmarkEntry) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.result.duration.cmp(&b.result.duration))
}

/// Composite of ratio (lower is better) and duration (lower is better).
fn score(result: &CompressionResult) -> f64 {
    let duration_ms = result.duration.as_secs_f64() * 1000.0;
    RATIO_WEIGHT * (1.0 - result.ratio) + SPEED_WEIGHT / (1.0 + duration_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Preset;
    use glam::Vec3;
    use serde_json::json;
    use worldvault_model::{TimelineEvent, WorldBranch, WorldElement};

    fn near_duplicate_world(count: usize) -> WorldState {
        let mut world = WorldState::new("forest", "Forest");
        world.creative_dna = json!({"patterns": ["fractal", "organic"], "confidence": 0.92});
        for i in 0..count {
            let mut element = WorldElement::new(format!("tree-{i}"), "tree", Vec3::new(i as f32, 0.0, 2.0));
            element.properties = json!({
                "visual": {"model": "oak_large", "color": "#2f6b1f", "scale": [1.0, 1.2, 1.0]},
                "physics": {"mass": 420.0, "collider": "capsule", "static": true},
                "behavior": {"sway": {"amplitude": 0.05, "frequency": 0.3}}
            });
            element.metadata.name = format!("Oak {i}");
            element.metadata.tags = vec!["flora".into(), "generated".into()];
            world.elements.push(element);
        }
        world
    }

    #[test]
    fn scenario_empty_world_under_large_threshold_is_not_compressed() {
        let engine = CompressionEngine::new();
        let world = WorldState::new("empty", "Empty");
        let result = engine.compress(&world, &CompressionOptions::default().threshold(100 * 1024));
        assert_eq!(result.algorithm, Algorithm::None);
        assert_eq!(result.ratio, 1.0);
        assert_eq!(result.compressed_size, result.original_size);
        assert_eq!(result.data, canonical_bytes(&world).unwrap());
    }

    #[test]
    fn non_finite_world_degrades_to_empty_none_result() {
        let engine = CompressionEngine::new();
        let mut world = near_duplicate_world(40);
        world.elements[3].position = Vec3::new(0.0, f32::NEG_INFINITY, 0.0);
        let result = engine.compress(&world, &CompressionOptions::default().threshold(0));
        assert_eq!(result.algorithm, Algorithm::None);
        assert_eq!(result.original_size, 0);
        assert!(result.data.is_empty());
        assert!(engine.decompress(&result).is_err());
    }

    #[test]
    fn benchmark_ties_go_to_the_faster_entry() {
        let entry = |strategy: Strategy, score: f64, millis: u64| {
            let mut result = CompressionResult::from_payload(Algorithm::Gzip, Some(6), vec![1, 2, 3]);
            result.duration = Duration::from_millis(millis);
            BenchmarkEntry {
                strategy,
                result,
                score,
            }
        };
        let mut entries = vec![
            entry(Strategy::Gzip, 0.5, 9),
            entry(Strategy::Lz, 0.5, 2),
            entry(Strategy::Delta, 0.8, 30),
            entry(Strategy::None, 0.1, 0),
        ];
        entries.sort_by(rank);
        let order: Vec<Strategy> = entries.iter().map(|e| e.strategy).collect();
        assert_eq!(
            order,
            [Strategy::Delta, Strategy::Lz, Strategy::Gzip, Strategy::None]
        );
        assert_eq!(rank(&entries[1], &entries[2]), Ordering::Less);
    }

    #[test]
    fn scenario_near_duplicates_compress_below_half() {
        let engine = CompressionEngine::new();
        let world = near_duplicate_world(50);
        let result = engine.compress(&world, &CompressionOptions::default());
        assert_eq!(result.algorithm, Algorithm::DeltaGzip);
        assert!(result.ratio < 0.5, "ratio {}", result.ratio);
        assert_eq!(result.metadata.level, Some(6));
    }

    #[test]
    fn every_strategy_round_trips() {
        let engine = CompressionEngine::new();
        let mut world = near_duplicate_world(12);
        let mut branch = WorldBranch::new("main", None);
        branch.timeline = (0..5)
            .map(|i| TimelineEvent {
                id: format!("t{i}"),
                kind: "edit".into(),
                action: "move".into(),
                parameters: json!({"element": format!("tree-{i}"), "dx": 1}),
                ..Default::default()
            })
            .collect();
        world.branches.push(branch);
        world.extensions.insert("syncHint".into(), json!("lan"));

        for strategy in Strategy::ALL {
            let options = CompressionOptions::with_strategy(strategy).threshold(0);
            let result = engine.compress(&world, &options);
            let decoded = engine.decompress(&result).unwrap();
            assert_eq!(decoded.data, world, "{strategy}");
        }
    }

    #[test]
    fn below_threshold_is_always_none() {
        let engine = CompressionEngine::new();
        let world = near_duplicate_world(3);
        let size = canonical_bytes(&world).unwrap().len();
        for strategy in Strategy::ALL {
            let options = CompressionOptions::with_strategy(strategy).threshold(size + 1);
            let result = engine.compress(&world, &options);
            assert_eq!(result.algorithm, Algorithm::None);
            assert_eq!(result.ratio, 1.0);
        }
    }

    #[test]
    fn compressed_ratios_stay_below_one() {
        let engine = CompressionEngine::new();
        let world = near_duplicate_world(20);
        for strategy in [Strategy::Lz, Strategy::Gzip, Strategy::Delta, Strategy::Hybrid] {
            let result = engine.compress(&world, &CompressionOptions::with_strategy(strategy).threshold(0));
            assert!(result.is_compressed(), "{strategy}");
            assert!(result.ratio > 0.0 && result.ratio < 1.0, "{strategy}: {}", result.ratio);
        }
    }

    #[test]
    fn more_repetition_never_worsens_ratio() {
        let engine = CompressionEngine::new();
        let options = CompressionOptions::with_strategy(Strategy::Gzip).threshold(0);
        let small = engine.compress(&near_duplicate_world(5), &options);
        let large = engine.compress(&near_duplicate_world(200), &options);
        assert!(large.ratio <= small.ratio);
    }

    #[test]
    fn hybrid_without_structure_reports_gzip() {
        let engine = CompressionEngine::new();
        let mut world = WorldState::new("flat", "Flat");
        world.settings = json!({"notes": "lorem ipsum ".repeat(200)});
        let result = engine.compress(&world, &CompressionOptions::default().threshold(0));
        assert_eq!(result.algorithm, Algorithm::Gzip);
        assert_eq!(result.metadata.level, Some(6));
    }

    #[test]
    fn incompressible_input_falls_back_to_none() {
        let engine = CompressionEngine::new();
        let world = WorldState::new("x", "");
        let result = engine.compress(&world, &CompressionOptions::with_strategy(Strategy::Delta).threshold(0));
        assert_eq!(result.algorithm, Algorithm::None);
        assert!(result.metadata.fallback);
        assert_eq!(engine.decompress(&result).unwrap().data, world);
    }

    #[test]
    fn scenario_garbage_lz_payload_fails() {
        let engine = CompressionEngine::new();
        let bogus = CompressionResult::from_payload(
            Algorithm::Lz,
            None,
            b"not-real-compressed-bytes".to_vec(),
        );
        let err = engine.decompress(&bogus).unwrap_err();
        assert!(matches!(
            err,
            CompressError::Decompression {
                algorithm: Algorithm::Lz,
                ..
            }
        ));
    }

    #[test]
    fn mismatched_algorithm_fails() {
        let engine = CompressionEngine::new();
        let world = near_duplicate_world(10);
        let mut result = engine.compress(&world, &CompressionOptions::with_strategy(Strategy::Gzip).threshold(0));
        result.algorithm = Algorithm::Delta;
        assert!(engine.decompress(&result).is_err());
    }

    #[test]
    fn benchmark_is_sorted_best_first() {
        let engine = CompressionEngine::new();
        let world = near_duplicate_world(40);
        let entries = engine.benchmark(&world, &Strategy::ALL, 6);
        assert_eq!(entries.len(), Strategy::ALL.len());
        assert!(entries.windows(2).all(|w| w[0].score >= w[1].score));
        assert_ne!(entries[0].strategy, Strategy::None);
        assert_eq!(engine.metrics().total_processed, 0);
    }

    #[test]
    fn metrics_track_compress_calls() {
        let engine = CompressionEngine::new();
        let world = near_duplicate_world(40);
        engine.compress(&world, &CompressionOptions::default());
        engine.compress(&WorldState::new("tiny", ""), &CompressionOptions::default());

        let metrics = engine.metrics();
        assert_eq!(metrics.total_processed, 2);
        assert_eq!(metrics.total_compressed, 1);
        assert!(metrics.average_ratio > 0.0 && metrics.average_ratio < 0.5);
        assert_eq!(metrics.strategy_usage[&Algorithm::DeltaGzip], 1);
        assert_eq!(metrics.strategy_usage[&Algorithm::None], 1);

        engine.reset_metrics();
        assert_eq!(engine.metrics().total_processed, 0);
    }

    #[test]
    fn presets_compress_large_worlds() {
        let engine = CompressionEngine::new();
        let world = near_duplicate_world(100);
        for preset in [Preset::RealTime, Preset::Batch, Preset::Offline, Preset::Mobile] {
            let result = engine.compress(&world, &preset.options());
            assert!(result.is_compressed(), "{preset:?}");
            assert_eq!(engine.decompress(&result).unwrap().data, world);
        }
    }

    #[tokio::test]
    async fn parallel_compression_matches_inline() {
        let engine = Arc::new(CompressionEngine::new());
        let world = near_duplicate_world(40);
        let inline = engine.compress(&world, &CompressionOptions::default());
        let offloaded = engine
            .compress_async(world.clone(), CompressionOptions::default().parallel(true))
            .await;
        assert_eq!(offloaded.algorithm, inline.algorithm);
        assert_eq!(offloaded.data, inline.data);

        let decoded = engine.decompress_async(offloaded, true).await.unwrap();
        assert_eq!(decoded.data, world);
        assert_eq!(engine.metrics().total_processed, 2);
    }
}

//! The cost-model profiler: a persistent, process-wide map from
//! `(node kind, strategy, size bucket)` to a smoothed execution cost
//! (`SPEC_FULL.md` §4.4).
//!
//! Advisory state only (`SPEC_FULL.md` §9): the solver must run with
//! heuristic fallbacks when this is empty, absent, or corrupt. Persistence
//! is explicit (`save`/`load`), never automatic on every compile.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::ir::NodeKindTag;

/// The EMA weight applied to each new sample (`SPEC_FULL.md` §4.4).
pub const ALPHA: f64 = 0.30;

/// Default profile file name (`SPEC_FULL.md` §6).
pub const DEFAULT_PROFILE_FILE: &str = ".ioc_profile";

/// One cost-model entry. `node_kind`/`strategy_name` are stored as owned
/// strings (rather than `NodeKindTag`/`&'static str`) so the on-disk
/// format is self-describing and stable across refactors of the enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub node_kind: String,
    pub strategy_name: String,
    pub size_bucket: usize,
    pub smoothed_ms: f64,
    pub sample_count: u64,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct ProfileKey {
    node_kind: String,
    strategy_name: String,
    size_bucket: usize,
}

/// Coarsen `n` into a size bucket, capping cache cardinality
/// (`SPEC_FULL.md` §4.4): `n` below 10, tens below 100, hundreds below
/// 1000, thousands beyond.
#[must_use]
pub fn bucket(n: usize) -> usize {
    if n < 10 {
        n
    } else if n < 100 {
        10 * (n / 10)
    } else if n < 1000 {
        100 * (n / 100)
    } else {
        1000 * (n / 1000)
    }
}

/// The process-wide (or explicitly-handled) cost-model store.
#[derive(Default)]
pub struct Profiler {
    records: Mutex<HashMap<ProfileKey, ProfileRecord>>,
}

impl Profiler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a profiler from `path`. A missing, empty, or malformed file is
    /// treated as no data and never aborts construction
    /// (`SPEC_FULL.md` §4.4, §7).
    #[must_use]
    pub fn load(path: impl AsRef<Path>) -> Self {
        let profiler = Self::new();
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) if !contents.trim().is_empty() => {
                match serde_json::from_str::<Vec<ProfileRecord>>(&contents) {
                    Ok(records) => {
                        let mut map = profiler.records.lock();
                        for record in records {
                            map.insert(
                                ProfileKey {
                                    node_kind: record.node_kind.clone(),
                                    strategy_name: record.strategy_name.clone(),
                                    size_bucket: record.size_bucket,
                                },
                                record,
                            );
                        }
                    }
                    Err(err) => {
                        tracing::warn!(?err, path = %path.display(), "malformed profile file, starting empty");
                    }
                }
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(?err, path = %path.display(), "no profile file found, starting empty");
            }
        }
        profiler
    }

    /// Persist every record to `path` as a flat JSON array. Write failures
    /// are logged and dropped, never fatal (`SPEC_FULL.md` §7) — profile
    /// data is advisory, not correctness-critical.
    pub fn save(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let records: Vec<ProfileRecord> = self.records.lock().values().cloned().collect();
        match serde_json::to_string_pretty(&records) {
            Ok(json) => {
                if let Err(err) = fs::write(path, json) {
                    tracing::warn!(?err, path = %path.display(), "failed to save profile, dropping");
                }
            }
            Err(err) => {
                tracing::warn!(?err, "failed to serialize profile, dropping");
            }
        }
    }

    /// Record a new sample for `(kind, strategy, n)`, updating the
    /// smoothed cost via EMA with weight [`ALPHA`].
    pub fn record(&self, kind: NodeKindTag, strategy: &str, n: usize, elapsed_ms: f64) {
        let key = ProfileKey {
            node_kind: kind.name().to_string(),
            strategy_name: strategy.to_string(),
            size_bucket: bucket(n),
        };
        let mut map = self.records.lock();
        map.entry(key.clone())
            .and_modify(|record| {
                record.smoothed_ms = (1.0 - ALPHA) * record.smoothed_ms + ALPHA * elapsed_ms;
                record.sample_count += 1;
            })
            .or_insert(ProfileRecord {
                node_kind: key.node_kind,
                strategy_name: key.strategy_name,
                size_bucket: key.size_bucket,
                smoothed_ms: elapsed_ms,
                sample_count: 1,
            });
    }

    /// Estimate the cost of running `strategy` on a kind-`kind` node whose
    /// input has size `n` (`SPEC_FULL.md` §4.4):
    ///
    /// 1. Exact bucket hit -> its smoothed cost.
    /// 2. Otherwise, the numerically-closest bucket for the same
    ///    `(kind, strategy)`, linearly extrapolated by `n / record.bucket`.
    /// 3. Otherwise, `default_per_unit(kind) * n`.
    #[must_use]
    pub fn estimate(&self, kind: NodeKindTag, strategy: &str, n: usize) -> f64 {
        let b = bucket(n);
        let map = self.records.lock();
        let exact = map.get(&ProfileKey {
            node_kind: kind.name().to_string(),
            strategy_name: strategy.to_string(),
            size_bucket: b,
        });
        if let Some(record) = exact {
            return record.smoothed_ms;
        }

        let closest = map
            .values()
            .filter(|r| r.node_kind == kind.name() && r.strategy_name == strategy)
            .min_by_key(|r| r.size_bucket.abs_diff(b));

        match closest {
            Some(record) if record.size_bucket > 0 => {
                record.smoothed_ms * (n as f64 / record.size_bucket as f64)
            }
            Some(record) => record.smoothed_ms,
            None => default_per_unit(kind) * n as f64,
        }
    }
}

/// Hard-coded per-kind default cost (ms per input element), used only
/// when the profiler has no record at all for `(kind, strategy)`.
fn default_per_unit(kind: NodeKindTag) -> f64 {
    match kind {
        NodeKindTag::Input | NodeKindTag::Constant => 0.0,
        NodeKindTag::Filter => 0.01,
        NodeKindTag::Map => 0.012,
        NodeKindTag::Reduce => 0.01,
        NodeKindTag::Distinct => 0.02,
        NodeKindTag::Flatten => 0.015,
        NodeKindTag::Assert => 0.008,
        NodeKindTag::Sort => 0.05,
        NodeKindTag::GroupBy => 0.03,
        NodeKindTag::Join => 0.02,
    }
}

/// Resolve the default profile file path under `dir` (or the current
/// working directory), matching `SPEC_FULL.md` §6's `.ioc_profile` default.
#[must_use]
pub fn default_profile_path(dir: Option<&Path>) -> PathBuf {
    match dir {
        Some(dir) => dir.join(DEFAULT_PROFILE_FILE),
        None => PathBuf::from(DEFAULT_PROFILE_FILE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucketing_is_piecewise_as_specified() {
        assert_eq!(bucket(5), 5);
        assert_eq!(bucket(9), 9);
        assert_eq!(bucket(10), 10);
        assert_eq!(bucket(99), 90);
        assert_eq!(bucket(100), 100);
        assert_eq!(bucket(999), 900);
        assert_eq!(bucket(1000), 1000);
        assert_eq!(bucket(1999), 1000);
        assert_eq!(bucket(2500), 2000);
    }

    #[test]
    fn ema_matches_closed_form_after_two_samples() {
        let p = Profiler::new();
        p.record(NodeKindTag::Map, "naive", 5, 10.0);
        p.record(NodeKindTag::Map, "naive", 5, 20.0);
        let expected = 0.7 * 10.0 + 0.3 * 20.0;
        assert!((p.estimate(NodeKindTag::Map, "naive", 5) - expected).abs() < 1e-9);
    }

    #[test]
    fn missing_file_yields_empty_profiler() {
        let p = Profiler::load("/nonexistent/path/.ioc_profile");
        // No data at all: falls back to the hard-coded default.
        let n = 100;
        assert!((p.estimate(NodeKindTag::Map, "naive", n) - default_per_unit(NodeKindTag::Map) * n as f64).abs() < 1e-9);
    }

    #[test]
    fn malformed_file_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".ioc_profile");
        std::fs::write(&path, "not json at all {{{").unwrap();
        let p = Profiler::load(&path);
        let n = 50;
        assert!((p.estimate(NodeKindTag::Filter, "naive", n) - default_per_unit(NodeKindTag::Filter) * n as f64).abs() < 1e-9);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".ioc_profile");
        let p = Profiler::new();
        p.record(NodeKindTag::Sort, "optimized", 500, 12.5);
        p.save(&path);

        let loaded = Profiler::load(&path);
        assert!((loaded.estimate(NodeKindTag::Sort, "optimized", 500) - 12.5).abs() < 1e-9);
    }

    #[test]
    fn extrapolation_scales_linearly_from_closest_bucket() {
        let p = Profiler::new();
        p.record(NodeKindTag::Filter, "naive", 100, 10.0);
        // No record for n=200; nearest bucket is 100 -> scale by 200/100.
        let estimate = p.estimate(NodeKindTag::Filter, "naive", 200);
        assert!((estimate - 20.0).abs() < 1e-9);
    }

    #[test]
    fn lookup_is_deterministic() {
        let p = Profiler::new();
        p.record(NodeKindTag::Join, "naive", 50, 5.0);
        let a = p.estimate(NodeKindTag::Join, "naive", 50);
        let b = p.estimate(NodeKindTag::Join, "naive", 50);
        assert_eq!(a, b);
    }
}

//! Coverage of recent query volume by the largest clusters.
//!
//! Given a workload and the assignment history of a clustering run, each
//! checkpoint ranks clusters by the recent cumulative volume of their
//! members. Coverage at `k` is the share of that checkpoint's volume held by
//! the `k` largest clusters; the report averages it over all checkpoints.
//!
//! Alongside the report, the summed arrival series of every cluster that ever
//! ranks in the top set is built incrementally (each checkpoint appends the
//! data up to `checkpoint + record_ahead_days`) and can be exported as
//! per-cluster CSV files for forecasting.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, Timelike};
use csv::{QuoteStyle, WriterBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clustering::{Checkpoint, ClusterId, ClusteringResult};
use crate::config::CoverageConfig;
use crate::loader::DATETIME_FORMAT;
use crate::series::{add_minutes, minutes_between, TimeSeries, Timestamp};
use crate::workload::Workload;

/// Errors raised while computing or exporting coverage.
#[derive(Debug, Error)]
pub enum CoverageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The assignment history names a template the workload does not have.
    #[error("Template in assignment history is not in the workload: {0}")]
    UnknownTemplate(String),
}

pub type CoverageResult<T> = Result<T, CoverageError>;

/// A cluster and the recent volume credited to it at one checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedCluster {
    pub cluster: ClusterId,
    pub volume: i64,
}

/// Ranking and coverage at one checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointCoverage {
    pub timestamp: Timestamp,
    /// Recent volume of every assigned template.
    pub total: i64,
    /// Largest clusters, at most `max_cluster_num`, by descending volume.
    pub top_clusters: Vec<RankedCluster>,
    /// `coverage[k]` is the share of `total` held by the `k + 1` largest clusters.
    pub coverage: Vec<f64>,
}

/// Coverage over a whole assignment history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    /// Checkpoints with non-zero assigned volume, in time order.
    pub checkpoints: Vec<CheckpointCoverage>,
    /// Mean of each checkpoint's coverage vector. Empty when no checkpoint
    /// had assigned volume.
    pub coverage: Vec<f64>,
}

impl CoverageReport {
    /// Write the report as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> CoverageResult<()> {
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(path, json).map_err(|source| CoverageError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read a report written by [`CoverageReport::save`].
    pub fn load(path: &Path) -> CoverageResult<Self> {
        let bytes = fs::read(path).map_err(|source| CoverageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Report plus the per-cluster series accumulated for top clusters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoverageAnalysis {
    pub report: CoverageReport,
    pub cluster_series: BTreeMap<ClusterId, TimeSeries>,
}

/// Computes [`CoverageAnalysis`] from a workload and its clustering.
#[derive(Debug, Clone)]
pub struct CoverageAnalyzer {
    config: CoverageConfig,
}

impl CoverageAnalyzer {
    pub fn new(config: CoverageConfig) -> Self {
        Self { config }
    }

    /// Walk the assignment history of `result` against `workload`.
    ///
    /// A template contributes the cumulative count at its last point at or
    /// before the checkpoint, provided that point is strictly less than
    /// `last_total_gap_seconds` old; otherwise it contributes nothing.
    pub fn analyze(
        &self,
        workload: &Workload,
        result: &ClusteringResult,
    ) -> CoverageResult<CoverageAnalysis> {
        let cumulative: BTreeMap<&str, TimeSeries> = workload
            .templates()
            .map(|t| (t.text.as_str(), t.series.cumulative()))
            .collect();
        let Some((min_date, _)) = workload.span() else {
            warn!("Workload has no data points; coverage is empty");
            return Ok(CoverageAnalysis::default());
        };

        let max_gap = Duration::seconds(self.config.last_total_gap_seconds);
        let record_ahead = Duration::days(self.config.record_ahead_days);

        let mut checkpoints = Vec::new();
        let mut series: BTreeMap<ClusterId, TimeSeries> = BTreeMap::new();
        let mut last_date = min_date;

        for checkpoint in &result.assignments {
            let current = checkpoint.timestamp;
            let ranked = rank_clusters(checkpoint, &cumulative, max_gap)?;
            let total: i64 = ranked.iter().map(|c| c.volume).sum();
            if ranked.is_empty() || total == 0 {
                last_date = current;
                continue;
            }

            let top: Vec<RankedCluster> = ranked
                .iter()
                .take(self.config.max_cluster_num)
                .copied()
                .collect();
            debug!("{}: top clusters {:?}", current, top);

            for entry in &top {
                if series.contains_key(&entry.cluster) {
                    continue;
                }
                let mut cluster_series = TimeSeries::new();
                for text in checkpoint.members(entry.cluster) {
                    let template = workload
                        .get(text)
                        .ok_or_else(|| CoverageError::UnknownTemplate(text.to_string()))?;
                    for (ts, count) in template.series.range(min_date, last_date + record_ahead) {
                        cluster_series.add(ts, count);
                    }
                }
                series.insert(entry.cluster, cluster_series);
            }

            for entry in &top {
                let Some(cluster_series) = series.get_mut(&entry.cluster) else {
                    continue;
                };
                for text in checkpoint.members(entry.cluster) {
                    let template = workload
                        .get(text)
                        .ok_or_else(|| CoverageError::UnknownTemplate(text.to_string()))?;
                    for (ts, count) in template
                        .series
                        .range(last_date + record_ahead, current + record_ahead)
                    {
                        cluster_series.add(ts, count);
                    }
                }
            }

            let coverage = (1..=self.config.max_cluster_num)
                .map(|k| {
                    let covered: i64 = ranked.iter().take(k).map(|c| c.volume).sum();
                    covered as f64 / total as f64
                })
                .collect();

            checkpoints.push(CheckpointCoverage {
                timestamp: current,
                total,
                top_clusters: top,
                coverage,
            });
            last_date = current;
        }

        let coverage = mean_coverage(&checkpoints, self.config.max_cluster_num);
        if coverage.is_empty() {
            warn!("No checkpoint had assigned volume; coverage is empty");
        } else {
            info!(
                "Coverage over {} checkpoints: {:?}",
                checkpoints.len(),
                coverage
            );
        }

        Ok(CoverageAnalysis {
            report: CoverageReport {
                checkpoints,
                coverage,
            },
            cluster_series: series,
        })
    }

    /// Export every cluster series with at least two points as
    /// `<dir>/<cluster>.csv`. Returns the number of files written.
    pub fn export_cluster_series(
        &self,
        dir: &Path,
        cluster_series: &BTreeMap<ClusterId, TimeSeries>,
    ) -> CoverageResult<usize> {
        fs::create_dir_all(dir).map_err(|source| CoverageError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut written = 0;
        for (cluster, series) in cluster_series {
            if series.len() < 2 {
                debug!("Not exporting cluster {}: {} point(s)", cluster, series.len());
                continue;
            }
            let path = dir.join(format!("{}.csv", cluster));
            write_series_csv(&path, &aggregate_series(series, self.config.aggregate_minutes))?;
            written += 1;
        }
        info!("Exported {} cluster series to {}", written, dir.display());
        Ok(written)
    }
}

/// Clusters at `checkpoint` by descending recent volume. Clusters with equal
/// volume keep the order in which their first member appears.
fn rank_clusters(
    checkpoint: &Checkpoint,
    cumulative: &BTreeMap<&str, TimeSeries>,
    max_gap: Duration,
) -> CoverageResult<Vec<RankedCluster>> {
    let current = checkpoint.timestamp;
    let mut ranked: Vec<RankedCluster> = Vec::new();
    let mut positions: BTreeMap<ClusterId, usize> = BTreeMap::new();

    for (text, membership) in &checkpoint.assignment {
        let Some(cluster) = membership.cluster() else {
            continue;
        };
        let accumulated = cumulative
            .get(text.as_str())
            .ok_or_else(|| CoverageError::UnknownTemplate(text.clone()))?;
        let volume = match accumulated.at_or_before(current) {
            Some((ts, total)) if current - ts < max_gap => total,
            _ => 0,
        };

        match positions.get(&cluster) {
            Some(&pos) => ranked[pos].volume += volume,
            None => {
                positions.insert(cluster, ranked.len());
                ranked.push(RankedCluster { cluster, volume });
            }
        }
    }

    ranked.sort_by(|a, b| b.volume.cmp(&a.volume));
    Ok(ranked)
}

fn mean_coverage(checkpoints: &[CheckpointCoverage], k: usize) -> Vec<f64> {
    if checkpoints.is_empty() {
        return Vec::new();
    }
    let n = checkpoints.len() as f64;
    (0..k)
        .map(|i| checkpoints.iter().map(|c| c.coverage[i]).sum::<f64>() / n)
        .collect()
}

/// Sum `series` into buckets of `aggregate_minutes`.
///
/// Walks every minute from the first to the last point; a bucket is emitted
/// at each minute whose minute-of-hour is a multiple of `aggregate_minutes`,
/// carrying the counts accumulated since the previous emission (inclusive of
/// that minute). Counts after the last emission are not reported.
pub fn aggregate_series(series: &TimeSeries, aggregate_minutes: u32) -> Vec<(Timestamp, i64)> {
    let (Some(first), Some(last)) = (series.first_timestamp(), series.last_timestamp()) else {
        return Vec::new();
    };
    let step = aggregate_minutes.max(1);

    let mut buckets = Vec::new();
    let mut value = 0;
    for offset in 0..=minutes_between(first, last) {
        let ts = add_minutes(first, offset);
        value += series.get(&ts);
        if ts.minute() % step == 0 {
            buckets.push((ts, value));
            value = 0;
        }
    }
    buckets
}

fn write_series_csv(path: &Path, rows: &[(Timestamp, i64)]) -> CoverageResult<()> {
    let csv_err = |source| CoverageError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_path(path)
        .map_err(csv_err)?;
    for (ts, value) in rows {
        writer
            .write_record([ts.format(DATETIME_FORMAT).to_string(), value.to_string()])
            .map_err(csv_err)?;
    }
    writer.flush().map_err(|source| CoverageError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::{Assignment, Membership};
    use chrono::NaiveDate;

    fn base() -> Timestamp {
        NaiveDate::from_ymd_opt(2017, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid base date")
    }

    fn at(minute: i64) -> Timestamp {
        add_minutes(base(), minute)
    }

    fn series(points: &[(i64, i64)]) -> TimeSeries {
        points.iter().map(|&(m, c)| (at(m), c)).collect()
    }

    fn assignment(pairs: &[(&str, Membership)]) -> Assignment {
        pairs.iter().map(|&(t, m)| (t.to_string(), m)).collect()
    }

    fn config(max_cluster_num: usize) -> CoverageConfig {
        CoverageConfig {
            max_cluster_num,
            ..CoverageConfig::default()
        }
    }

    #[test]
    fn test_coverage_ranks_clusters_by_recent_volume() {
        let workload = Workload::from_series([
            ("a", series(&[(0, 6), (10, 2)])),
            ("b", series(&[(0, 1), (10, 1)])),
            ("c", series(&[(5, 1)])),
        ]);
        let checkpoint = Checkpoint::new(
            at(60),
            assignment(&[
                ("a", Membership::Assigned(0)),
                ("b", Membership::Assigned(1)),
                ("c", Membership::Assigned(1)),
            ]),
        );
        let result = ClusteringResult {
            num_clusters: 2,
            assignments: vec![
                Checkpoint::new(base(), assignment(&[("a", Membership::Unassigned)])),
                checkpoint,
            ],
            cluster_totals: BTreeMap::new(),
        };

        let analysis = CoverageAnalyzer::new(config(2))
            .analyze(&workload, &result)
            .expect("analyze");

        let report = &analysis.report;
        assert_eq!(report.checkpoints.len(), 1, "unassigned-only snapshot skipped");
        let cp = &report.checkpoints[0];
        assert_eq!(cp.total, 11);
        assert_eq!(
            cp.top_clusters,
            vec![
                RankedCluster { cluster: 0, volume: 8 },
                RankedCluster { cluster: 1, volume: 3 },
            ]
        );
        assert!((cp.coverage[0] - 8.0 / 11.0).abs() < 1e-12);
        assert!((cp.coverage[1] - 1.0).abs() < 1e-12);
        assert_eq!(report.coverage, cp.coverage);
        println!("[PASS] test_coverage_ranks_clusters_by_recent_volume - {:?}", report.coverage);
    }

    #[test]
    fn test_stale_templates_contribute_nothing() {
        let workload = Workload::from_series([
            ("fresh", series(&[(2 * 1440, 4)])),
            ("stale", series(&[(0, 100)])),
        ]);
        let result = ClusteringResult {
            num_clusters: 2,
            assignments: vec![Checkpoint::new(
                at(2 * 1440 + 1),
                assignment(&[
                    ("fresh", Membership::Assigned(0)),
                    ("stale", Membership::Assigned(1)),
                ]),
            )],
            cluster_totals: BTreeMap::new(),
        };

        let analysis = CoverageAnalyzer::new(config(3))
            .analyze(&workload, &result)
            .expect("analyze");

        let cp = &analysis.report.checkpoints[0];
        assert_eq!(cp.total, 4);
        assert_eq!(cp.top_clusters[0], RankedCluster { cluster: 0, volume: 4 });
        assert_eq!(cp.top_clusters[1], RankedCluster { cluster: 1, volume: 0 });
        assert_eq!(cp.coverage, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_unknown_template_is_an_error() {
        let workload = Workload::from_series([("a", series(&[(0, 1)]))]);
        let result = ClusteringResult {
            num_clusters: 1,
            assignments: vec![Checkpoint::new(
                at(1),
                assignment(&[("ghost", Membership::Assigned(0))]),
            )],
            cluster_totals: BTreeMap::new(),
        };

        let err = CoverageAnalyzer::new(config(3))
            .analyze(&workload, &result)
            .unwrap_err();
        assert!(matches!(err, CoverageError::UnknownTemplate(ref t) if t == "ghost"));
    }

    #[test]
    fn test_cluster_series_extends_with_record_ahead() {
        let config = CoverageConfig {
            max_cluster_num: 1,
            record_ahead_days: 1,
            ..CoverageConfig::default()
        };
        let day = 1440;
        let workload = Workload::from_series([(
            "a",
            series(&[(0, 1), (day, 2), (2 * day, 3), (3 * day, 4), (4 * day, 5)]),
        )]);
        let assigned = assignment(&[("a", Membership::Assigned(0))]);
        let result = ClusteringResult {
            num_clusters: 1,
            assignments: vec![
                Checkpoint::new(at(day), assigned.clone()),
                Checkpoint::new(at(2 * day), assigned),
            ],
            cluster_totals: BTreeMap::new(),
        };

        let analysis = CoverageAnalyzer::new(config)
            .analyze(&workload, &result)
            .expect("analyze");

        // First checkpoint (last_date = min_date): seed [0, 1d), then extend
        // [1d, 2d). Second checkpoint extends [2d, 3d).
        let built = &analysis.cluster_series[&0];
        assert_eq!(built, &series(&[(0, 1), (day, 2), (2 * day, 3)]));
        println!("[PASS] test_cluster_series_extends_with_record_ahead - {} points", built.len());
    }

    #[test]
    fn test_aggregate_series_buckets_on_minute_boundaries() {
        let data = series(&[(3, 1), (7, 2), (10, 4), (15, 8), (20, 16), (21, 32)]);

        let buckets = aggregate_series(&data, 10);

        // Minutes 3..=21: emit at :10 (1 + 2 + 4) and :20 (8 + 16); :21 is dropped.
        assert_eq!(buckets, vec![(at(10), 7), (at(20), 24)]);
    }

    #[test]
    fn test_export_skips_short_series() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut clusters = BTreeMap::new();
        clusters.insert(0, series(&[(0, 1), (10, 2)]));
        clusters.insert(1, series(&[(0, 5)]));

        let written = CoverageAnalyzer::new(config(3))
            .export_cluster_series(dir.path(), &clusters)
            .expect("export");

        assert_eq!(written, 1);
        assert!(!dir.path().join("1.csv").exists());
        let content = fs::read_to_string(dir.path().join("0.csv")).expect("read");
        assert_eq!(
            content,
            "\"2017-01-01 00:00:00\",\"1\"\n\"2017-01-01 00:10:00\",\"2\"\n"
        );
    }

    #[test]
    fn test_report_save_writes_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("coverage.json");
        let report = CoverageReport {
            checkpoints: Vec::new(),
            coverage: vec![0.5, 0.75],
        };

        report.save(&path).expect("save");
        let restored = CoverageReport::load(&path).expect("load");
        assert_eq!(restored, report);
    }
}

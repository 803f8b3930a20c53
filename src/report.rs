//! Per-run row accounting.
//!
//! Every stage reports how many rows it read, kept and dropped (by reason).
//! Nothing here is raised as an error; the whole report is logged at the end
//! of a run and persisted next to the output tables.

use std::collections::BTreeMap;

use itertools::Itertools;
use log::{info, warn};
use serde::Serialize;

use crate::{error::RowIssue, integrate::JoinStats, reconcile::KeyStats};

/// Share of dropped rows above which a stage logs a warning.
const DROP_WARNING_RATIO: f64 = 0.25;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct IssueTally {
    counts: BTreeMap<String, usize>,
}

impl IssueTally {
    pub fn record(&mut self, issue: &RowIssue) {
        self.add(issue.code(), 1);
    }

    pub fn add(&mut self, code: &str, count: usize) {
        if count == 0 {
            return;
        }
        *self.counts.entry(code.to_string()).or_insert(0) += count;
    }

    pub fn get(&self, code: &str) -> usize {
        self.counts.get(code).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(code, count)| (code.as_str(), *count))
    }
}

impl std::fmt::Display for IssueTally {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.counts.is_empty() {
            return f.write_str("none");
        }
        let parts = self
            .iter()
            .map(|(code, count)| format!("{code}={count}"))
            .join(", ");
        f.write_str(&parts)
    }
}

/// Schema Loader accounting: source rows read vs. typed rows retained.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct LoadStats {
    pub source: String,
    pub rows_read: usize,
    pub rows_retained: usize,
    pub rows_rejected: usize,
    pub rejections: IssueTally,
}

impl LoadStats {
    pub fn reject(&mut self, issue: &RowIssue) {
        self.rows_rejected += 1;
        self.rejections.record(issue);
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct StageCounts {
    pub rows_in: usize,
    pub rows_out: usize,
    pub dropped: IssueTally,
}

impl StageCounts {
    pub fn rows_dropped(&self) -> usize {
        self.rows_in.saturating_sub(self.rows_out)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    pub inspections_load: LoadStats,
    pub population_load: LoadStats,
    pub inspections_normalize: StageCounts,
    pub population_normalize: StageCounts,
    pub keys: KeyStats,
    pub join: JoinStats,
    pub views: BTreeMap<String, usize>,
}

impl RunReport {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn log_summary(&self) {
        for load in [&self.inspections_load, &self.population_load] {
            info!(
                "Loaded {}: {} read, {} retained, {} rejected ({})",
                load.source, load.rows_read, load.rows_retained, load.rows_rejected, load.rejections
            );
        }
        for (label, stage) in [
            ("inspections", &self.inspections_normalize),
            ("population", &self.population_normalize),
        ] {
            info!(
                "Normalized {label}: {} in, {} out, dropped: {}",
                stage.rows_in, stage.rows_out, stage.dropped
            );
            if stage.rows_in > 0
                && stage.rows_dropped() as f64 / stage.rows_in as f64 > DROP_WARNING_RATIO
            {
                warn!(
                    "Normalizing {label} dropped {} of {} row(s)",
                    stage.rows_dropped(),
                    stage.rows_in
                );
            }
        }
        info!(
            "Community boards: {} mapped, {} unmapped",
            self.keys.mapped, self.keys.unmapped
        );
        if !self.keys.unmapped_boards.is_empty() {
            let common = self
                .keys
                .unmapped_boards
                .iter()
                .sorted_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)))
                .take(5)
                .map(|(board, count)| format!("{board:?} x{count}"))
                .join(", ");
            info!("Most frequent unmapped boards: {common}");
        }
        info!(
            "Join: {} inspection(s) in, {} out, {} matched, {} without population data",
            self.join.input_rows,
            self.join.output_rows,
            self.join.matched,
            self.join.unmatched
        );
        for (view, rows) in &self.views {
            info!("View {view}: {rows} row(s)");
        }
    }
}

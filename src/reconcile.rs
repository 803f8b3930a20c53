//! Geographic key reconciliation.
//!
//! Inspection rows carry a free-form community board (`"301"`, `"CB 3"`,
//! `"Unknown"`); population rows carry a bare district number. Both are
//! mapped onto a [`CanonicalKey`] here so the integrator can join on it.

use std::{collections::BTreeMap, fmt, sync::OnceLock};

use log::{debug, info};
use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;

use crate::{
    data::{Value, parse_typed_value},
    normalize::{Borough, InspectionRecord},
    schema::ColumnType,
    transform::string_ops::squish,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum District {
    Number(u8),
    Unmapped,
}

impl District {
    pub fn number(self) -> Option<u8> {
        match self {
            District::Number(n) => Some(n),
            District::Unmapped => None,
        }
    }

    pub fn is_mapped(self) -> bool {
        matches!(self, District::Number(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CanonicalKey {
    pub borough: Borough,
    pub district: District,
}

impl CanonicalKey {
    pub fn new(borough: Borough, district: u8) -> Self {
        CanonicalKey {
            borough,
            district: District::Number(district),
        }
    }

    pub fn unmapped(borough: Borough) -> Self {
        CanonicalKey {
            borough,
            district: District::Unmapped,
        }
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.district {
            District::Number(n) => write!(f, "{} CD {n}", self.borough),
            District::Unmapped => write!(f, "{} UNMAPPED", self.borough),
        }
    }
}

/// Key reconciliation counters for the run report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KeyStats {
    pub mapped: usize,
    pub unmapped: usize,
    /// Boards whose region digit or borough prefix names a different
    /// borough than the record. The record's borough is kept.
    pub borough_digit_mismatch: usize,
    /// Raw board values that could not be mapped, with their frequency.
    pub unmapped_boards: BTreeMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct ReconciledKeys {
    /// One key per input record, in input order.
    pub keys: Vec<CanonicalKey>,
    pub stats: KeyStats,
}

/// Board label used in [`KeyStats::unmapped_boards`] for absent boards.
pub const MISSING_BOARD: &str = "(missing)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Reconciliation {
    key: CanonicalKey,
    borough_mismatch: bool,
}

/// Accepts a district number if it exists in `borough`.
pub fn district_in_range(borough: Borough, value: i64) -> Option<u8> {
    u8::try_from(value)
        .ok()
        .filter(|district| borough.district_range().contains(district))
}

/// Maps a raw community board onto the canonical join key for a record in
/// `borough`. Never fails; anything unrecognised is `Unmapped`.
pub fn reconcile(board: Option<&str>, borough: Borough) -> CanonicalKey {
    reconcile_board(board, borough).key
}

fn reconcile_board(board: Option<&str>, borough: Borough) -> Reconciliation {
    let unmapped = Reconciliation {
        key: CanonicalKey::unmapped(borough),
        borough_mismatch: false,
    };
    let Some(board) = board.map(squish).filter(|b| !b.is_empty()) else {
        return unmapped;
    };
    if let Some(value) = board_number(&board) {
        return resolve_number(borough, value).unwrap_or(unmapped);
    }
    for pattern in board_patterns() {
        let Some(captures) = pattern.captures(&board) else {
            continue;
        };
        let Some(value) = captures.name("number").and_then(|m| board_number(m.as_str())) else {
            continue;
        };
        let prefix_mismatch = captures
            .name("borough")
            .and_then(|m| Borough::parse(m.as_str()))
            .is_some_and(|named| named != borough);
        return match resolve_number(borough, value) {
            Some(resolved) => Reconciliation {
                borough_mismatch: resolved.borough_mismatch || prefix_mismatch,
                ..resolved
            },
            None => unmapped,
        };
    }
    unmapped
}

fn board_number(raw: &str) -> Option<i64> {
    parse_typed_value(raw, ColumnType::Integer, None)
        .ok()
        .flatten()
        .as_ref()
        .and_then(Value::as_i64)
}

/// Three-digit values are region-coded: hundreds digit for the region,
/// last two digits for the district. Smaller values are the district itself.
fn resolve_number(borough: Borough, value: i64) -> Option<Reconciliation> {
    let (district, region) = if (100..1000).contains(&value) {
        (value % 100, Some(value / 100))
    } else {
        (value, None)
    };
    let district = district_in_range(borough, district)?;
    Some(Reconciliation {
        key: CanonicalKey::new(borough, district),
        borough_mismatch: region.is_some_and(|digit| digit != i64::from(borough.code())),
    })
}

fn board_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)^(?:CD|CB|COMMUNITY\s+(?:DISTRICT|BOARD))\s*[-#:]?\s*(?P<number>\d{1,3})$",
            r"(?i)^(?P<borough>MANHATTAN|BRONX|BROOKLYN|QUEENS|STATEN\s+ISLAND|MN|MH|BX|BK|QN|QNS|SI)\s*[-#:]?\s*(?:CD|CB|COMMUNITY\s+(?:DISTRICT|BOARD))?\s*[-#:]?\s*(?P<number>\d{1,3})$",
        ]
        .into_iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    })
}

/// Reconciles every record, preserving order, and tallies the outcome.
pub fn reconcile_all(records: &[InspectionRecord]) -> ReconciledKeys {
    let outcomes: Vec<Reconciliation> = records
        .par_iter()
        .map(|record| reconcile_board(record.community_board.as_deref(), record.borough))
        .collect();

    let mut stats = KeyStats::default();
    let mut keys = Vec::with_capacity(outcomes.len());
    for (record, outcome) in records.iter().zip(outcomes) {
        if outcome.key.district.is_mapped() {
            stats.mapped += 1;
        } else {
            stats.unmapped += 1;
            let label = record
                .community_board
                .clone()
                .unwrap_or_else(|| MISSING_BOARD.to_string());
            *stats.unmapped_boards.entry(label).or_default() += 1;
        }
        if outcome.borough_mismatch {
            stats.borough_digit_mismatch += 1;
            debug!(
                "Board {:?} on record {} names another borough than {}",
                record.community_board, record.record_id, record.borough
            );
        }
        keys.push(outcome.key);
    }
    info!(
        "Reconciled {} community board(s): {} mapped, {} unmapped ({} distinct unmapped value(s))",
        keys.len(),
        stats.mapped,
        stats.unmapped,
        stats.unmapped_boards.len()
    );
    ReconciledKeys { keys, stats }
}

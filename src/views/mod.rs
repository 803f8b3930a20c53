//! Analytical views derived from the integrated table.
//!
//! Each view is computed from `&[IntegratedRecord]` alone, groups through
//! ordered maps, and emits rows in a fixed order, so reordering the input
//! never changes the output. Views become Arrow record batches through
//! [`ArrowTable`].

pub mod cuisine;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod food_safety;
pub mod location;
pub mod processed;
pub mod risk;

use std::{collections::BTreeSet, sync::Arc};

use arrow::{
    array::RecordBatch,
    datatypes::{Field, Schema, SchemaRef},
    error::ArrowError,
};
use chrono::{Datelike, NaiveDate};
use log::info;
use serde::Serialize;

use crate::{integrate::IntegratedRecord, normalize::Grade};

pub use cuisine::{CuisineHygiene, CuisineHygieneRow};
pub use food_safety::{FoodSafetyDemographics, FoodSafetyRow};
pub use location::{LocationIntelligence, LocationRow};
pub use risk::{ViolationRisk, ViolationRiskRow};

/// A table with a fixed Arrow schema that can be materialised as one batch.
pub trait ArrowTable: Sync {
    /// File stem used when the table is written out.
    fn name(&self) -> &'static str;

    fn schema(&self) -> SchemaRef;

    fn row_count(&self) -> usize;

    fn to_record_batch(&self) -> Result<RecordBatch, ArrowError>;
}

/// The four views of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticalViews {
    pub food_safety: FoodSafetyDemographics,
    pub cuisine: CuisineHygiene,
    pub location: LocationIntelligence,
    pub risk: ViolationRisk,
}

impl AnalyticalViews {
    /// Builds all views; they share no state, so they are built concurrently.
    pub fn build_all(records: &[IntegratedRecord]) -> Self {
        let ((food_safety, cuisine), (location, risk)) = rayon::join(
            || {
                rayon::join(
                    || FoodSafetyDemographics::build(records),
                    || CuisineHygiene::build(records),
                )
            },
            || {
                rayon::join(
                    || LocationIntelligence::build(records),
                    || ViolationRisk::build(records),
                )
            },
        );
        let views = AnalyticalViews {
            food_safety,
            cuisine,
            location,
            risk,
        };
        for table in views.tables() {
            info!("Built view {} with {} row(s)", table.name(), table.row_count());
        }
        views
    }

    pub fn tables(&self) -> [&dyn ArrowTable; 4] {
        [&self.food_safety, &self.cuisine, &self.location, &self.risk]
    }
}

/// Days from 0001-01-01 to 1970-01-01, the Date32 epoch.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

pub(crate) fn date32(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

pub(crate) fn schema_of(fields: Vec<Field>) -> SchemaRef {
    Arc::new(Schema::new(fields))
}

/// Mean of floats summed in sorted order, so the result does not depend on
/// the order the values were collected in.
pub(crate) fn stable_mean(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Grade distribution of a group of inspection rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GradeCounts {
    pub a: i64,
    pub b: i64,
    pub c: i64,
    pub p: i64,
    pub z: i64,
    pub not_yet_graded: i64,
    pub ungraded: i64,
}

impl GradeCounts {
    pub fn record(&mut self, grade: Option<Grade>) {
        let slot = match grade {
            Some(Grade::A) => &mut self.a,
            Some(Grade::B) => &mut self.b,
            Some(Grade::C) => &mut self.c,
            Some(Grade::P) => &mut self.p,
            Some(Grade::Z) => &mut self.z,
            Some(Grade::NotYetGraded) => &mut self.not_yet_graded,
            None => &mut self.ungraded,
        };
        *slot += 1;
    }
}

/// Counters shared by the grouped views.
#[derive(Debug, Clone, Default)]
pub(crate) struct HygieneTally {
    pub inspections: i64,
    pub restaurants: BTreeSet<i64>,
    pub violations: i64,
    pub critical: i64,
    pub score_sum: i64,
    pub score_count: i64,
    pub grades: GradeCounts,
}

impl HygieneTally {
    pub fn add(&mut self, record: &IntegratedRecord) {
        let inspection = &record.inspection;
        self.inspections += 1;
        self.restaurants.insert(inspection.restaurant_id);
        if inspection.violation_code.is_some() {
            self.violations += 1;
        }
        if inspection.critical {
            self.critical += 1;
        }
        if let Some(score) = inspection.score {
            self.score_sum += score;
            self.score_count += 1;
        }
        self.grades.record(inspection.grade);
    }

    pub fn restaurant_count(&self) -> i64 {
        self.restaurants.len() as i64
    }

    pub fn critical_rate(&self) -> f64 {
        if self.inspections == 0 {
            0.0
        } else {
            self.critical as f64 / self.inspections as f64
        }
    }

    /// Integer sums make this exact regardless of row order.
    pub fn avg_score(&self) -> Option<f64> {
        (self.score_count > 0).then(|| self.score_sum as f64 / self.score_count as f64)
    }
}

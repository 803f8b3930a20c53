use std::{collections::BTreeMap, sync::Arc};

use arrow::{
    array::{
        ArrayRef, BooleanArray, Date32Array, Float64Array, Int64Array, RecordBatch, StringArray,
        UInt8Array, UInt64Array,
    },
    datatypes::{DataType, Field, SchemaRef},
    error::ArrowError,
};
use chrono::NaiveDate;
use serde::Serialize;

use super::{ArrowTable, date32, schema_of};
use crate::{integrate::IntegratedRecord, normalize::Borough};

/// Per-inspection features with the restaurant's history up to, but not
/// including, the inspection date. `is_critical` is the prediction target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViolationRiskRow {
    pub record_id: u64,
    pub restaurant_id: i64,
    pub borough: Borough,
    pub community_district: Option<u8>,
    pub cuisine: Option<String>,
    pub inspection_date: NaiveDate,
    pub violation_code: Option<String>,
    pub violation_category: Option<String>,
    pub score: Option<i64>,
    pub grade: Option<String>,
    pub population_density: Option<f64>,
    pub growth_rate: Option<f64>,
    pub prior_inspection_count: i64,
    pub prior_violation_count: i64,
    pub prior_critical_count: i64,
    pub is_critical: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViolationRisk {
    /// Ordered by (restaurant_id, inspection_date, record_id).
    pub rows: Vec<ViolationRiskRow>,
}

/// Running history of one restaurant, advanced one inspection date at a time.
#[derive(Default)]
struct History {
    inspections: i64,
    violations: i64,
    critical: i64,
}

impl ViolationRisk {
    pub const NAME: &'static str = "violation_risk";

    pub fn build(records: &[IntegratedRecord]) -> Self {
        let mut by_restaurant: BTreeMap<i64, Vec<&IntegratedRecord>> = BTreeMap::new();
        for record in records {
            by_restaurant
                .entry(record.inspection.restaurant_id)
                .or_default()
                .push(record);
        }

        let mut rows = Vec::with_capacity(records.len());
        for (_, mut visits) in by_restaurant {
            visits.sort_by_key(|r| (r.inspection.inspection_date, r.inspection.record_id));
            let mut history = History::default();
            for same_day in visits.chunk_by(|a, b| {
                a.inspection.inspection_date == b.inspection.inspection_date
            }) {
                for record in same_day {
                    rows.push(risk_row(record, &history));
                }
                history.inspections += 1;
                for record in same_day {
                    if record.inspection.violation_code.is_some() {
                        history.violations += 1;
                    }
                    if record.inspection.critical {
                        history.critical += 1;
                    }
                }
            }
        }
        ViolationRisk { rows }
    }

    pub fn arrow_schema() -> SchemaRef {
        schema_of(vec![
            Field::new("record_id", DataType::UInt64, false),
            Field::new("restaurant_id", DataType::Int64, false),
            Field::new("borough", DataType::Utf8, false),
            Field::new("community_district", DataType::UInt8, true),
            Field::new("cuisine", DataType::Utf8, true),
            Field::new("inspection_date", DataType::Date32, false),
            Field::new("violation_code", DataType::Utf8, true),
            Field::new("violation_category", DataType::Utf8, true),
            Field::new("score", DataType::Int64, true),
            Field::new("grade", DataType::Utf8, true),
            Field::new("population_density", DataType::Float64, true),
            Field::new("growth_rate", DataType::Float64, true),
            Field::new("prior_inspection_count", DataType::Int64, false),
            Field::new("prior_violation_count", DataType::Int64, false),
            Field::new("prior_critical_count", DataType::Int64, false),
            Field::new("is_critical", DataType::Boolean, false),
        ])
    }
}

fn risk_row(record: &IntegratedRecord, history: &History) -> ViolationRiskRow {
    let inspection = &record.inspection;
    ViolationRiskRow {
        record_id: inspection.record_id,
        restaurant_id: inspection.restaurant_id,
        borough: inspection.borough,
        community_district: record.district(),
        cuisine: inspection.cuisine.clone(),
        inspection_date: inspection.inspection_date,
        violation_code: inspection.violation_code.clone(),
        violation_category: inspection
            .violation_category
            .map(|c| c.label().to_string()),
        score: inspection.score,
        grade: inspection.grade.map(|g| g.label().to_string()),
        population_density: record.population_density(),
        growth_rate: record.growth_rate(),
        prior_inspection_count: history.inspections,
        prior_violation_count: history.violations,
        prior_critical_count: history.critical,
        is_critical: inspection.critical,
    }
}

impl ArrowTable for ViolationRisk {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn schema(&self) -> SchemaRef {
        Self::arrow_schema()
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn to_record_batch(&self) -> Result<RecordBatch, ArrowError> {
        let rows = &self.rows;
        let text = |f: fn(&ViolationRiskRow) -> Option<&str>| -> ArrayRef {
            Arc::new(StringArray::from_iter(rows.iter().map(f)))
        };
        let columns: Vec<ArrayRef> = vec![
            Arc::new(UInt64Array::from_iter_values(rows.iter().map(|r| r.record_id))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.restaurant_id))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.borough.name()))),
            Arc::new(UInt8Array::from_iter(rows.iter().map(|r| r.community_district))),
            text(|r| r.cuisine.as_deref()),
            Arc::new(Date32Array::from_iter_values(
                rows.iter().map(|r| date32(r.inspection_date)),
            )),
            text(|r| r.violation_code.as_deref()),
            text(|r| r.violation_category.as_deref()),
            Arc::new(Int64Array::from_iter(rows.iter().map(|r| r.score))),
            text(|r| r.grade.as_deref()),
            Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.population_density))),
            Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.growth_rate))),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.prior_inspection_count),
            )),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.prior_violation_count),
            )),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.prior_critical_count),
            )),
            Arc::new(BooleanArray::from(
                rows.iter().map(|r| r.is_critical).collect::<Vec<bool>>(),
            )),
        ];
        RecordBatch::try_new(Self::arrow_schema(), columns)
    }
}

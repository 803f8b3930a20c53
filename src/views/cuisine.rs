use std::{collections::BTreeMap, sync::Arc};

use arrow::{
    array::{ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray},
    datatypes::{DataType, Field, SchemaRef},
    error::ArrowError,
};
use serde::Serialize;

use super::{ArrowTable, HygieneTally, schema_of, stable_mean};
use crate::integrate::IntegratedRecord;

/// Label for inspections without a cuisine.
pub const UNSPECIFIED_CUISINE: &str = "Unspecified";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CuisineHygieneRow {
    pub cuisine: String,
    pub inspection_count: i64,
    pub restaurant_count: i64,
    pub violation_count: i64,
    pub critical_count: i64,
    pub critical_rate: f64,
    pub avg_score: Option<f64>,
    pub grade_a_count: i64,
    pub grade_b_count: i64,
    pub grade_c_count: i64,
    pub grade_p_count: i64,
    pub grade_z_count: i64,
    pub not_yet_graded_count: i64,
    pub ungraded_count: i64,
    /// Mean density over inspections that matched a population row.
    pub avg_population_density: Option<f64>,
}

/// Hygiene outcomes per cuisine, ordered by cuisine name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CuisineHygiene {
    pub rows: Vec<CuisineHygieneRow>,
}

#[derive(Default)]
struct CuisineGroup {
    tally: HygieneTally,
    densities: Vec<f64>,
}

impl CuisineHygiene {
    pub const NAME: &'static str = "cuisine_hygiene";

    pub fn build(records: &[IntegratedRecord]) -> Self {
        let mut groups: BTreeMap<&str, CuisineGroup> = BTreeMap::new();
        for record in records {
            let cuisine = record
                .inspection
                .cuisine
                .as_deref()
                .unwrap_or(UNSPECIFIED_CUISINE);
            let group = groups.entry(cuisine).or_default();
            group.tally.add(record);
            if let Some(density) = record.population_density() {
                group.densities.push(density);
            }
        }

        let rows = groups
            .into_iter()
            .map(|(cuisine, group)| {
                let tally = group.tally;
                CuisineHygieneRow {
                    cuisine: cuisine.to_string(),
                    inspection_count: tally.inspections,
                    restaurant_count: tally.restaurant_count(),
                    violation_count: tally.violations,
                    critical_count: tally.critical,
                    critical_rate: tally.critical_rate(),
                    avg_score: tally.avg_score(),
                    grade_a_count: tally.grades.a,
                    grade_b_count: tally.grades.b,
                    grade_c_count: tally.grades.c,
                    grade_p_count: tally.grades.p,
                    grade_z_count: tally.grades.z,
                    not_yet_graded_count: tally.grades.not_yet_graded,
                    ungraded_count: tally.grades.ungraded,
                    avg_population_density: stable_mean(group.densities),
                }
            })
            .collect();
        CuisineHygiene { rows }
    }

    pub fn arrow_schema() -> SchemaRef {
        let count = |name: &str| Field::new(name, DataType::Int64, false);
        schema_of(vec![
            Field::new("cuisine", DataType::Utf8, false),
            count("inspection_count"),
            count("restaurant_count"),
            count("violation_count"),
            count("critical_count"),
            Field::new("critical_rate", DataType::Float64, false),
            Field::new("avg_score", DataType::Float64, true),
            count("grade_a_count"),
            count("grade_b_count"),
            count("grade_c_count"),
            count("grade_p_count"),
            count("grade_z_count"),
            count("not_yet_graded_count"),
            count("ungraded_count"),
            Field::new("avg_population_density", DataType::Float64, true),
        ])
    }
}

impl ArrowTable for CuisineHygiene {
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
        let counts = |f: fn(&CuisineHygieneRow) -> i64| -> ArrayRef {
            Arc::new(Int64Array::from_iter_values(rows.iter().map(f)))
        };
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.cuisine.as_str()))),
            counts(|r| r.inspection_count),
            counts(|r| r.restaurant_count),
            counts(|r| r.violation_count),
            counts(|r| r.critical_count),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.critical_rate))),
            Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.avg_score))),
            counts(|r| r.grade_a_count),
            counts(|r| r.grade_b_count),
            counts(|r| r.grade_c_count),
            counts(|r| r.grade_p_count),
            counts(|r| r.grade_z_count),
            counts(|r| r.not_yet_graded_count),
            counts(|r| r.ungraded_count),
            Arc::new(Float64Array::from_iter(
                rows.iter().map(|r| r.avg_population_density),
            )),
        ];
        RecordBatch::try_new(Self::arrow_schema(), columns)
    }
}

use std::{collections::BTreeMap, sync::Arc};

use arrow::{
    array::{ArrayRef, Float64Array, Int32Array, Int64Array, RecordBatch, StringArray, UInt8Array},
    datatypes::{DataType, Field, SchemaRef},
    error::ArrowError,
};
use serde::Serialize;

use super::{ArrowTable, HygieneTally, schema_of};
use crate::{
    integrate::{IntegratedRecord, PopulationMatch},
    normalize::Borough,
};

/// Hygiene outcomes per community district, next to the district's
/// demographics. Unmapped rows form one group per borough with a null
/// district.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoodSafetyRow {
    pub borough: Borough,
    pub community_district: Option<u8>,
    pub district_name: Option<String>,
    pub inspection_count: i64,
    pub restaurant_count: i64,
    pub violation_count: i64,
    pub critical_count: i64,
    pub critical_rate: f64,
    pub avg_score: Option<f64>,
    pub grade_a_count: i64,
    pub grade_b_count: i64,
    pub grade_c_count: i64,
    pub population: Option<i64>,
    pub population_year: Option<i32>,
    pub population_density: Option<f64>,
    pub growth_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FoodSafetyDemographics {
    /// Ordered by borough, then district with the unmapped group first.
    pub rows: Vec<FoodSafetyRow>,
}

#[derive(Default)]
struct DistrictGroup<'a> {
    tally: HygieneTally,
    latest: Option<&'a PopulationMatch>,
}

/// Prefers the later year, then the larger population.
fn newer<'a>(current: Option<&'a PopulationMatch>, candidate: &'a PopulationMatch) -> &'a PopulationMatch {
    match current {
        Some(existing)
            if (existing.year, existing.population) >= (candidate.year, candidate.population) =>
        {
            existing
        }
        _ => candidate,
    }
}

impl FoodSafetyDemographics {
    pub const NAME: &'static str = "food_safety_demographics";

    pub fn build(records: &[IntegratedRecord]) -> Self {
        let mut groups: BTreeMap<(Borough, Option<u8>), DistrictGroup<'_>> = BTreeMap::new();
        for record in records {
            let group = groups
                .entry((record.key.borough, record.district()))
                .or_default();
            group.tally.add(record);
            if let Some(population) = record.population.as_ref() {
                group.latest = Some(newer(group.latest, population));
            }
        }

        let rows = groups
            .into_iter()
            .map(|((borough, community_district), group)| {
                let tally = &group.tally;
                let latest = group.latest;
                FoodSafetyRow {
                    borough,
                    community_district,
                    district_name: latest.and_then(|p| p.district_name.clone()),
                    inspection_count: tally.inspections,
                    restaurant_count: tally.restaurant_count(),
                    violation_count: tally.violations,
                    critical_count: tally.critical,
                    critical_rate: tally.critical_rate(),
                    avg_score: tally.avg_score(),
                    grade_a_count: tally.grades.a,
                    grade_b_count: tally.grades.b,
                    grade_c_count: tally.grades.c,
                    population: latest.map(|p| p.population),
                    population_year: latest.map(|p| p.year),
                    population_density: latest.map(|p| p.population_density),
                    growth_rate: latest.and_then(|p| p.growth_rate),
                }
            })
            .collect();
        FoodSafetyDemographics { rows }
    }

    pub fn arrow_schema() -> SchemaRef {
        schema_of(vec![
            Field::new("borough", DataType::Utf8, false),
            Field::new("community_district", DataType::UInt8, true),
            Field::new("district_name", DataType::Utf8, true),
            Field::new("inspection_count", DataType::Int64, false),
            Field::new("restaurant_count", DataType::Int64, false),
            Field::new("violation_count", DataType::Int64, false),
            Field::new("critical_count", DataType::Int64, false),
            Field::new("critical_rate", DataType::Float64, false),
            Field::new("avg_score", DataType::Float64, true),
            Field::new("grade_a_count", DataType::Int64, false),
            Field::new("grade_b_count", DataType::Int64, false),
            Field::new("grade_c_count", DataType::Int64, false),
            Field::new("population", DataType::Int64, true),
            Field::new("population_year", DataType::Int32, true),
            Field::new("population_density", DataType::Float64, true),
            Field::new("growth_rate", DataType::Float64, true),
        ])
    }
}

impl ArrowTable for FoodSafetyDemographics {
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
        let counts = |f: fn(&FoodSafetyRow) -> i64| -> ArrayRef {
            Arc::new(Int64Array::from_iter_values(rows.iter().map(f)))
        };
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.borough.name()))),
            Arc::new(UInt8Array::from_iter(rows.iter().map(|r| r.community_district))),
            Arc::new(StringArray::from_iter(rows.iter().map(|r| r.district_name.as_deref()))),
            counts(|r| r.inspection_count),
            counts(|r| r.restaurant_count),
            counts(|r| r.violation_count),
            counts(|r| r.critical_count),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.critical_rate))),
            Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.avg_score))),
            counts(|r| r.grade_a_count),
            counts(|r| r.grade_b_count),
            counts(|r| r.grade_c_count),
            Arc::new(Int64Array::from_iter(rows.iter().map(|r| r.population))),
            Arc::new(Int32Array::from_iter(rows.iter().map(|r| r.population_year))),
            Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.population_density))),
            Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.growth_rate))),
        ];
        RecordBatch::try_new(Self::arrow_schema(), columns)
    }
}

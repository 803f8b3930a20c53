use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use arrow::{
    array::{ArrayRef, Date32Array, Float64Array, Int64Array, RecordBatch, StringArray, UInt8Array},
    datatypes::{DataType, Field, SchemaRef},
    error::ArrowError,
};
use chrono::NaiveDate;
use serde::Serialize;

use super::{ArrowTable, date32, schema_of};
use crate::{integrate::IntegratedRecord, normalize::Borough};

/// One row per restaurant, described by its most recent inspection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationRow {
    pub restaurant_id: i64,
    pub name: Option<String>,
    pub full_address: String,
    pub building: Option<String>,
    pub street: Option<String>,
    pub zipcode: Option<String>,
    pub borough: Borough,
    pub community_district: Option<u8>,
    pub cuisine: Option<String>,
    /// Distinct inspection dates.
    pub inspection_count: i64,
    pub violation_count: i64,
    pub latest_inspection_date: NaiveDate,
    pub latest_score: Option<i64>,
    pub latest_grade: Option<String>,
    pub population_density: Option<f64>,
    pub growth_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationIntelligence {
    /// Ordered by restaurant id.
    pub rows: Vec<LocationRow>,
}

struct RestaurantGroup<'a> {
    latest: &'a IntegratedRecord,
    dates: BTreeSet<NaiveDate>,
    violations: i64,
}

fn is_later(candidate: &IntegratedRecord, current: &IntegratedRecord) -> bool {
    let order = |r: &IntegratedRecord| (r.inspection.inspection_date, r.inspection.record_id);
    order(candidate) > order(current)
}

impl LocationIntelligence {
    pub const NAME: &'static str = "location_intelligence";

    pub fn build(records: &[IntegratedRecord]) -> Self {
        let mut groups: BTreeMap<i64, RestaurantGroup<'_>> = BTreeMap::new();
        for record in records {
            let inspection = &record.inspection;
            let group = groups
                .entry(inspection.restaurant_id)
                .or_insert_with(|| RestaurantGroup {
                    latest: record,
                    dates: BTreeSet::new(),
                    violations: 0,
                });
            if is_later(record, group.latest) {
                group.latest = record;
            }
            group.dates.insert(inspection.inspection_date);
            if inspection.violation_code.is_some() {
                group.violations += 1;
            }
        }

        let rows = groups
            .into_iter()
            .map(|(restaurant_id, group)| {
                let latest = group.latest;
                let inspection = &latest.inspection;
                LocationRow {
                    restaurant_id,
                    name: inspection.name.clone(),
                    full_address: inspection.full_address.clone(),
                    building: inspection.building.clone(),
                    street: inspection.street.clone(),
                    zipcode: inspection.zipcode.clone(),
                    borough: inspection.borough,
                    community_district: latest.district(),
                    cuisine: inspection.cuisine.clone(),
                    inspection_count: group.dates.len() as i64,
                    violation_count: group.violations,
                    latest_inspection_date: inspection.inspection_date,
                    latest_score: inspection.score,
                    latest_grade: inspection.grade.map(|g| g.label().to_string()),
                    population_density: latest.population_density(),
                    growth_rate: latest.growth_rate(),
                }
            })
            .collect();
        LocationIntelligence { rows }
    }

    pub fn arrow_schema() -> SchemaRef {
        schema_of(vec![
            Field::new("restaurant_id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("full_address", DataType::Utf8, false),
            Field::new("building", DataType::Utf8, true),
            Field::new("street", DataType::Utf8, true),
            Field::new("zipcode", DataType::Utf8, true),
            Field::new("borough", DataType::Utf8, false),
            Field::new("community_district", DataType::UInt8, true),
            Field::new("cuisine", DataType::Utf8, true),
            Field::new("inspection_count", DataType::Int64, false),
            Field::new("violation_count", DataType::Int64, false),
            Field::new("latest_inspection_date", DataType::Date32, false),
            Field::new("latest_score", DataType::Int64, true),
            Field::new("latest_grade", DataType::Utf8, true),
            Field::new("population_density", DataType::Float64, true),
            Field::new("growth_rate", DataType::Float64, true),
        ])
    }
}

impl ArrowTable for LocationIntelligence {
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
        let text = |f: fn(&LocationRow) -> Option<&str>| -> ArrayRef {
            Arc::new(StringArray::from_iter(rows.iter().map(f)))
        };
        let columns: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.restaurant_id))),
            text(|r| r.name.as_deref()),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.full_address.as_str()))),
            text(|r| r.building.as_deref()),
            text(|r| r.street.as_deref()),
            text(|r| r.zipcode.as_deref()),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.borough.name()))),
            Arc::new(UInt8Array::from_iter(rows.iter().map(|r| r.community_district))),
            text(|r| r.cuisine.as_deref()),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.inspection_count))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.violation_count))),
            Arc::new(Date32Array::from_iter_values(
                rows.iter().map(|r| date32(r.latest_inspection_date)),
            )),
            Arc::new(Int64Array::from_iter(rows.iter().map(|r| r.latest_score))),
            text(|r| r.latest_grade.as_deref()),
            Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.population_density))),
            Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.growth_rate))),
        ];
        RecordBatch::try_new(Self::arrow_schema(), columns)
    }
}

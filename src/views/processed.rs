//! Row-level tables for the optional processed outputs: the cleaned
//! inspections, the cleaned population and the integrated join.

use std::sync::Arc;

use arrow::{
    array::{
        ArrayRef, BooleanArray, Date32Array, Float64Array, Int32Array, Int64Array, RecordBatch,
        StringArray, UInt8Array, UInt64Array,
    },
    datatypes::{DataType, Field, SchemaRef},
    error::ArrowError,
};

use super::{ArrowTable, date32, schema_of};
use crate::{
    integrate::IntegratedRecord,
    normalize::{InspectionRecord, PopulationRecord},
};

fn inspection_fields() -> Vec<Field> {
    vec![
        Field::new("record_id", DataType::UInt64, false),
        Field::new("restaurant_id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, true),
        Field::new("borough", DataType::Utf8, false),
        Field::new("building", DataType::Utf8, true),
        Field::new("street", DataType::Utf8, true),
        Field::new("zipcode", DataType::Utf8, true),
        Field::new("phone", DataType::Utf8, true),
        Field::new("cuisine", DataType::Utf8, true),
        Field::new("inspection_date", DataType::Date32, false),
        Field::new("action", DataType::Utf8, true),
        Field::new("violation_code", DataType::Utf8, true),
        Field::new("violation_description", DataType::Utf8, true),
        Field::new("critical", DataType::Boolean, false),
        Field::new("score", DataType::Int64, true),
        Field::new("grade", DataType::Utf8, true),
        Field::new("grade_date", DataType::Date32, true),
        Field::new("record_date", DataType::Date32, true),
        Field::new("community_board", DataType::Utf8, true),
        Field::new("full_address", DataType::Utf8, false),
        Field::new("violation_category", DataType::Utf8, true),
    ]
}

fn inspection_columns<'a>(records: impl Iterator<Item = &'a InspectionRecord> + Clone) -> Vec<ArrayRef> {
    let text = |f: fn(&InspectionRecord) -> Option<&str>| -> ArrayRef {
        Arc::new(StringArray::from_iter(records.clone().map(f)))
    };
    let dates = |f: fn(&InspectionRecord) -> Option<i32>| -> ArrayRef {
        Arc::new(Date32Array::from_iter(records.clone().map(f)))
    };
    vec![
        Arc::new(UInt64Array::from_iter_values(records.clone().map(|r| r.record_id))),
        Arc::new(Int64Array::from_iter_values(records.clone().map(|r| r.restaurant_id))),
        text(|r| r.name.as_deref()),
        Arc::new(StringArray::from_iter_values(records.clone().map(|r| r.borough.name()))),
        text(|r| r.building.as_deref()),
        text(|r| r.street.as_deref()),
        text(|r| r.zipcode.as_deref()),
        text(|r| r.phone.as_deref()),
        text(|r| r.cuisine.as_deref()),
        Arc::new(Date32Array::from_iter_values(
            records.clone().map(|r| date32(r.inspection_date)),
        )),
        text(|r| r.action.as_deref()),
        text(|r| r.violation_code.as_deref()),
        text(|r| r.violation_description.as_deref()),
        Arc::new(BooleanArray::from(
            records.clone().map(|r| r.critical).collect::<Vec<bool>>(),
        )),
        Arc::new(Int64Array::from_iter(records.clone().map(|r| r.score))),
        text(|r| r.grade.map(|g| g.label())),
        dates(|r| r.grade_date.map(date32)),
        dates(|r| r.record_date.map(date32)),
        text(|r| r.community_board.as_deref()),
        Arc::new(StringArray::from_iter_values(
            records.clone().map(|r| r.full_address.as_str()),
        )),
        text(|r| r.violation_category.map(|c| c.label())),
    ]
}

/// `restaurant_clean`: normalized inspections.
pub struct CleanInspections<'a>(pub &'a [InspectionRecord]);

impl CleanInspections<'_> {
    pub const NAME: &'static str = "restaurant_clean";

    pub fn arrow_schema() -> SchemaRef {
        schema_of(inspection_fields())
    }
}

impl ArrowTable for CleanInspections<'_> {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn schema(&self) -> SchemaRef {
        Self::arrow_schema()
    }

    fn row_count(&self) -> usize {
        self.0.len()
    }

    fn to_record_batch(&self) -> Result<RecordBatch, ArrowError> {
        RecordBatch::try_new(Self::arrow_schema(), inspection_columns(self.0.iter()))
    }
}

/// `population_clean`: deduplicated population with derived fields.
pub struct CleanPopulation<'a>(pub &'a [PopulationRecord]);

impl CleanPopulation<'_> {
    pub const NAME: &'static str = "population_clean";

    pub fn arrow_schema() -> SchemaRef {
        schema_of(vec![
            Field::new("record_id", DataType::UInt64, false),
            Field::new("borough", DataType::Utf8, false),
            Field::new("community_district", DataType::UInt8, false),
            Field::new("district_name", DataType::Utf8, true),
            Field::new("year", DataType::Int32, false),
            Field::new("population", DataType::Int64, false),
            Field::new("land_area", DataType::Float64, false),
            Field::new("population_density", DataType::Float64, false),
            Field::new("growth_rate", DataType::Float64, true),
        ])
    }
}

impl ArrowTable for CleanPopulation<'_> {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn schema(&self) -> SchemaRef {
        Self::arrow_schema()
    }

    fn row_count(&self) -> usize {
        self.0.len()
    }

    fn to_record_batch(&self) -> Result<RecordBatch, ArrowError> {
        let rows = self.0;
        let columns: Vec<ArrayRef> = vec![
            Arc::new(UInt64Array::from_iter_values(rows.iter().map(|r| r.record_id))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.borough.name()))),
            Arc::new(UInt8Array::from_iter_values(rows.iter().map(|r| r.district))),
            Arc::new(StringArray::from_iter(rows.iter().map(|r| r.district_name.as_deref()))),
            Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.year))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.population))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.land_area))),
            Arc::new(Float64Array::from_iter_values(
                rows.iter().map(|r| r.population_density),
            )),
            Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.growth_rate))),
        ];
        RecordBatch::try_new(Self::arrow_schema(), columns)
    }
}

/// `integrated_data`: every inspection column plus the join key and the
/// matched population fields.
pub struct IntegratedTable<'a>(pub &'a [IntegratedRecord]);

impl IntegratedTable<'_> {
    pub const NAME: &'static str = "integrated_data";

    pub fn arrow_schema() -> SchemaRef {
        let mut fields = inspection_fields();
        fields.extend([
            Field::new("community_district", DataType::UInt8, true),
            Field::new("district_name", DataType::Utf8, true),
            Field::new("population_year", DataType::Int32, true),
            Field::new("population", DataType::Int64, true),
            Field::new("land_area", DataType::Float64, true),
            Field::new("population_density", DataType::Float64, true),
            Field::new("growth_rate", DataType::Float64, true),
        ]);
        schema_of(fields)
    }
}

impl ArrowTable for IntegratedTable<'_> {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn schema(&self) -> SchemaRef {
        Self::arrow_schema()
    }

    fn row_count(&self) -> usize {
        self.0.len()
    }

    fn to_record_batch(&self) -> Result<RecordBatch, ArrowError> {
        let rows = self.0;
        let matched = || rows.iter().map(|r| r.population.as_ref());
        let mut columns = inspection_columns(rows.iter().map(|r| &r.inspection));
        let population_columns: Vec<ArrayRef> = vec![
            Arc::new(UInt8Array::from_iter(rows.iter().map(|r| r.district()))),
            Arc::new(StringArray::from_iter(
                matched().map(|p| p.and_then(|p| p.district_name.as_deref())),
            )),
            Arc::new(Int32Array::from_iter(matched().map(|p| p.map(|p| p.year)))),
            Arc::new(Int64Array::from_iter(matched().map(|p| p.map(|p| p.population)))),
            Arc::new(Float64Array::from_iter(matched().map(|p| p.map(|p| p.land_area)))),
            Arc::new(Float64Array::from_iter(
                matched().map(|p| p.map(|p| p.population_density)),
            )),
            Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.growth_rate()))),
        ];
        columns.extend(population_columns);
        RecordBatch::try_new(Self::arrow_schema(), columns)
    }
}

use std::collections::{BTreeMap, btree_map::Entry};

use clap::ValueEnum;
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::borough::Borough;
use crate::{
    error::{Result, RowIssue},
    loader::{TypedRow, TypedTable},
    reconcile::district_in_range,
    report::StageCounts,
    schema::population_columns as col,
    transform::string_ops::canonical_label,
};

/// Which row survives when several share a (borough, district, year) key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[value(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// The row that appears last in the source file.
    #[default]
    KeepLast,
    /// The row that appears first in the source file.
    KeepFirst,
    /// The row with a district name, then the larger land area; later rows
    /// win remaining ties.
    MostComplete,
}

/// One cleaned community district observation for one year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopulationRecord {
    pub record_id: u64,
    pub borough: Borough,
    pub district: u8,
    pub district_name: Option<String>,
    pub year: i32,
    pub population: i64,
    pub land_area: f64,
    pub population_density: f64,
    pub growth_rate: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct NormalizedPopulation {
    /// Sorted by (borough, district, year); keys are unique.
    pub records: Vec<PopulationRecord>,
    pub counts: StageCounts,
}

#[derive(Debug, Clone)]
struct PopulationRow {
    record_id: u64,
    borough: Borough,
    district: u8,
    district_name: Option<String>,
    year: i32,
    population: i64,
    land_area: f64,
}

impl PopulationRow {
    fn completeness(&self) -> (bool, f64) {
        (self.district_name.is_some(), self.land_area)
    }
}

struct PopulationColumns {
    borough: usize,
    district: usize,
    year: usize,
    population: usize,
    land_area: usize,
    district_name: Option<usize>,
}

impl PopulationColumns {
    fn resolve(table: &TypedTable) -> Result<Self> {
        Ok(PopulationColumns {
            borough: table.require_column(col::BOROUGH)?,
            district: table.require_column(col::CD_NUMBER)?,
            year: table.require_column(col::YEAR)?,
            population: table.require_column(col::POPULATION)?,
            land_area: table.require_column(col::LAND_AREA)?,
            district_name: table.descriptor.column_index(col::CD_NAME),
        })
    }
}

pub fn normalize_population(
    table: &TypedTable,
    policy: DuplicatePolicy,
) -> Result<NormalizedPopulation> {
    let columns = PopulationColumns::resolve(table)?;
    let outcomes: Vec<std::result::Result<PopulationRow, RowIssue>> = table
        .rows
        .par_iter()
        .map(|row| validate_row(&columns, row))
        .collect();

    let mut counts = StageCounts {
        rows_in: table.rows.len(),
        ..StageCounts::default()
    };
    let mut by_key: BTreeMap<(Borough, u8, i32), PopulationRow> = BTreeMap::new();
    for outcome in outcomes {
        let row = match outcome {
            Ok(row) => row,
            Err(issue) => {
                counts.dropped.record(&issue);
                continue;
            }
        };
        match by_key.entry((row.borough, row.district, row.year)) {
            Entry::Vacant(slot) => {
                slot.insert(row);
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get();
                let replace = match policy {
                    DuplicatePolicy::KeepLast => true,
                    DuplicatePolicy::KeepFirst => false,
                    DuplicatePolicy::MostComplete => {
                        let (new_named, new_area) = row.completeness();
                        let (old_named, old_area) = existing.completeness();
                        new_named
                            .cmp(&old_named)
                            .then(new_area.total_cmp(&old_area))
                            .is_ge()
                    }
                };
                debug!(
                    "Duplicate population key {} CD {} {}: rows {} and {}, keeping {}",
                    row.borough,
                    row.district,
                    row.year,
                    existing.record_id,
                    row.record_id,
                    if replace { row.record_id } else { existing.record_id }
                );
                if replace {
                    slot.insert(row);
                }
                counts.dropped.record(&RowIssue::DuplicateKey);
            }
        }
    }

    let records = derive_growth(by_key.into_values());
    counts.rows_out = records.len();
    Ok(NormalizedPopulation { records, counts })
}

fn validate_row(
    columns: &PopulationColumns,
    row: &TypedRow,
) -> std::result::Result<PopulationRow, RowIssue> {
    let missing = |column: &str| RowIssue::MissingRequired {
        column: column.to_string(),
    };
    let raw_borough = row.string(columns.borough).ok_or_else(|| missing(col::BOROUGH))?;
    let borough = Borough::parse(raw_borough).ok_or_else(|| RowIssue::UnmappedBorough {
        value: raw_borough.to_string(),
    })?;
    let raw_district = row.integer(columns.district).ok_or_else(|| missing(col::CD_NUMBER))?;
    let district = district_in_range(borough, raw_district)
        .ok_or(RowIssue::DistrictOutOfRange { value: raw_district })?;
    let raw_year = row.integer(columns.year).ok_or_else(|| missing(col::YEAR))?;
    let year = i32::try_from(raw_year).map_err(|_| RowIssue::Unparsable {
        column: col::YEAR.to_string(),
        value: raw_year.to_string(),
    })?;
    let population = row
        .integer(columns.population)
        .ok_or_else(|| missing(col::POPULATION))?;
    if population <= 0 {
        return Err(RowIssue::NonPositivePopulation);
    }
    let land_area = row
        .float(columns.land_area)
        .ok_or_else(|| missing(col::LAND_AREA))?;
    if land_area <= 0.0 || !land_area.is_finite() {
        return Err(RowIssue::NonPositiveLandArea);
    }
    Ok(PopulationRow {
        record_id: row.record_id,
        borough,
        district,
        district_name: columns
            .district_name
            .and_then(|idx| row.string(idx))
            .and_then(canonical_label),
        year,
        population,
        land_area,
    })
}

/// Computes density and growth over rows already sorted by
/// (borough, district, year).
fn derive_growth(rows: impl Iterator<Item = PopulationRow>) -> Vec<PopulationRecord> {
    let mut records: Vec<PopulationRecord> = Vec::new();
    for row in rows {
        let growth_rate = records
            .last()
            .filter(|prior| prior.borough == row.borough && prior.district == row.district)
            .and_then(|prior| growth_rate(prior.population, row.population));
        records.push(PopulationRecord {
            record_id: row.record_id,
            borough: row.borough,
            district: row.district,
            district_name: row.district_name,
            year: row.year,
            population: row.population,
            land_area: row.land_area,
            population_density: row.population as f64 / row.land_area,
            growth_rate,
        });
    }
    records
}

pub fn growth_rate(prior: i64, current: i64) -> Option<f64> {
    (prior > 0).then(|| (current - prior) as f64 / prior as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{loader::read_table, schema::population_schema};
    use encoding_rs::UTF_8;
    use std::path::Path;

    fn normalize(body: &str, policy: DuplicatePolicy) -> NormalizedPopulation {
        let text = format!("Borough,CD Number,CD Name,Year,Population,Land Area\n{body}");
        let table = read_table(
            text.as_bytes(),
            Path::new("population.csv"),
            &population_schema(),
            b',',
            UTF_8,
        )
        .unwrap();
        normalize_population(&table, policy).unwrap()
    }

    #[test]
    fn density_and_growth_are_derived_per_district() {
        let out = normalize(
            "Brooklyn,3,Bed Stuy,2000,100000,5.0\n\
             Brooklyn,3,Bed Stuy,2010,110000,5.0\n\
             Bronx,1,Mott Haven,2010,90000,3.0\n",
            DuplicatePolicy::KeepLast,
        );
        assert_eq!(out.records.len(), 3);
        let bronx = &out.records[0];
        assert_eq!(bronx.borough, Borough::Bronx);
        assert_eq!(bronx.growth_rate, None);
        assert_eq!(bronx.population_density, 30000.0);
        let bk_2000 = &out.records[1];
        assert_eq!(bk_2000.population_density, 20000.0);
        assert_eq!(bk_2000.growth_rate, None);
        let bk_2010 = &out.records[2];
        assert!((bk_2010.growth_rate.unwrap() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn invalid_population_land_area_and_districts_are_dropped() {
        let out = normalize(
            "Brooklyn,3,,2023,100000,0\n\
             Brooklyn,4,,2023,100000,-2\n\
             Staten Island,4,,2023,100000,2\n\
             Queens,1,,2023,-5,2\n\
             Queens,3,,2023,0,2\n\
             Narnia,1,,2023,5,2\n\
             Queens,2,,2023,500,2\n",
            DuplicatePolicy::KeepLast,
        );
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.counts.dropped.get("non_positive_land_area"), 2);
        assert_eq!(out.counts.dropped.get("district_out_of_range"), 1);
        assert_eq!(out.counts.dropped.get("non_positive_population"), 2);
        assert_eq!(out.counts.dropped.get("unmapped_borough"), 1);
        assert!(out.records.iter().all(|r| r.population_density > 0.0));
    }

    #[test]
    fn duplicate_policy_is_explicit() {
        let body = "Queens,1,Astoria,2010,100,1.0\nQueens,1,,2010,200,3.0\n";
        let last = normalize(body, DuplicatePolicy::KeepLast);
        assert_eq!(last.records[0].population, 200);
        assert_eq!(last.counts.dropped.get("duplicate_key"), 1);

        let first = normalize(body, DuplicatePolicy::KeepFirst);
        assert_eq!(first.records[0].population, 100);

        let complete = normalize(body, DuplicatePolicy::MostComplete);
        assert_eq!(complete.records[0].population, 100);
        assert_eq!(complete.records[0].district_name.as_deref(), Some("Astoria"));
    }

    #[test]
    fn growth_is_null_without_prior_population() {
        assert_eq!(growth_rate(0, 10), None);
        assert_eq!(growth_rate(100, 50), Some(-0.5));
    }
}

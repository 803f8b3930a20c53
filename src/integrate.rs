//! Left join of inspections against population on the canonical key.

use std::collections::BTreeMap;

use chrono::Datelike;
use log::info;
use rayon::prelude::*;
use serde::Serialize;

use crate::{
    normalize::{Borough, InspectionRecord, PopulationRecord},
    reconcile::{CanonicalKey, District},
};

/// Population fields carried onto an inspection after a successful match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopulationMatch {
    pub record_id: u64,
    pub district_name: Option<String>,
    pub year: i32,
    pub population: i64,
    pub land_area: f64,
    pub population_density: f64,
    pub growth_rate: Option<f64>,
}

impl From<&PopulationRecord> for PopulationMatch {
    fn from(record: &PopulationRecord) -> Self {
        PopulationMatch {
            record_id: record.record_id,
            district_name: record.district_name.clone(),
            year: record.year,
            population: record.population,
            land_area: record.land_area,
            population_density: record.population_density,
            growth_rate: record.growth_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegratedRecord {
    pub inspection: InspectionRecord,
    pub key: CanonicalKey,
    pub population: Option<PopulationMatch>,
}

impl IntegratedRecord {
    pub fn district(&self) -> Option<u8> {
        self.key.district.number()
    }

    pub fn population_density(&self) -> Option<f64> {
        self.population.as_ref().map(|p| p.population_density)
    }

    pub fn growth_rate(&self) -> Option<f64> {
        self.population.as_ref().and_then(|p| p.growth_rate)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JoinStats {
    pub input_rows: usize,
    pub output_rows: usize,
    pub matched: usize,
    /// Rows left without population data, unmapped keys included.
    pub unmatched: usize,
    pub unmapped: usize,
}

#[derive(Debug, Clone)]
pub struct Integrated {
    pub records: Vec<IntegratedRecord>,
    pub stats: JoinStats,
}

/// Population rows by district, then by year.
#[derive(Debug, Default)]
pub struct PopulationIndex<'a> {
    by_district: BTreeMap<(Borough, u8), BTreeMap<i32, &'a PopulationRecord>>,
}

impl<'a> PopulationIndex<'a> {
    /// Later entries replace earlier ones with the same key; the normalizer
    /// already guarantees uniqueness.
    pub fn build(records: &'a [PopulationRecord]) -> Self {
        let mut by_district: BTreeMap<(Borough, u8), BTreeMap<i32, &'a PopulationRecord>> =
            BTreeMap::new();
        for record in records {
            by_district
                .entry((record.borough, record.district))
                .or_default()
                .insert(record.year, record);
        }
        PopulationIndex { by_district }
    }

    /// The row for `key` with the greatest year not after `year`.
    pub fn lookup(&self, key: CanonicalKey, year: i32) -> Option<&'a PopulationRecord> {
        let District::Number(district) = key.district else {
            return None;
        };
        self.by_district
            .get(&(key.borough, district))?
            .range(..=year)
            .next_back()
            .map(|(_, record)| *record)
    }

    pub fn districts(&self) -> usize {
        self.by_district.len()
    }
}

/// Joins each inspection with its key's population row. `keys` holds one key
/// per inspection, in the same order. Output order and cardinality equal the
/// input's.
pub fn integrate(
    inspections: &[InspectionRecord],
    keys: &[CanonicalKey],
    population: &[PopulationRecord],
) -> Integrated {
    debug_assert_eq!(inspections.len(), keys.len());
    let index = PopulationIndex::build(population);
    let records: Vec<IntegratedRecord> = inspections
        .par_iter()
        .zip(keys.par_iter())
        .map(|(inspection, key)| IntegratedRecord {
            population: index
                .lookup(*key, inspection.inspection_date.year())
                .map(PopulationMatch::from),
            inspection: inspection.clone(),
            key: *key,
        })
        .collect();

    let matched = records.iter().filter(|r| r.population.is_some()).count();
    let stats = JoinStats {
        input_rows: inspections.len(),
        output_rows: records.len(),
        matched,
        unmatched: records.len() - matched,
        unmapped: records.iter().filter(|r| !r.key.district.is_mapped()).count(),
    };
    info!(
        "Joined {} inspection(s) against {} district(s): {} matched, {} unmatched ({} unmapped)",
        stats.input_rows,
        index.districts(),
        stats.matched,
        stats.unmatched,
        stats.unmapped
    );
    Integrated { records, stats }
}

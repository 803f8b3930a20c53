use std::fmt;

use chrono::NaiveDate;
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{borough::Borough, violation::{ViolationCategory, categorize}};
use crate::{
    error::{Result, RowIssue},
    loader::{TypedRow, TypedTable},
    report::StageCounts,
    schema::inspection_columns as col,
    transform::string_ops::{canonical_label, digits_only, squish, uppercase},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    P,
    Z,
    NotYetGraded,
}

impl Grade {
    pub fn parse(raw: &str) -> Option<Grade> {
        match squish(raw).to_ascii_uppercase().as_str() {
            "A" => Some(Grade::A),
            "B" => Some(Grade::B),
            "C" => Some(Grade::C),
            "P" => Some(Grade::P),
            "Z" => Some(Grade::Z),
            "N" | "NOT YET GRADED" => Some(Grade::NotYetGraded),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::P => "P",
            Grade::Z => "Z",
            Grade::NotYetGraded => "Not Yet Graded",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One cleaned inspection event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectionRecord {
    pub record_id: u64,
    pub restaurant_id: i64,
    pub name: Option<String>,
    pub borough: Borough,
    pub building: Option<String>,
    pub street: Option<String>,
    pub zipcode: Option<String>,
    pub phone: Option<String>,
    pub cuisine: Option<String>,
    pub inspection_date: NaiveDate,
    pub action: Option<String>,
    pub violation_code: Option<String>,
    pub violation_description: Option<String>,
    pub critical: bool,
    pub score: Option<i64>,
    pub grade: Option<Grade>,
    pub grade_date: Option<NaiveDate>,
    pub record_date: Option<NaiveDate>,
    pub community_board: Option<String>,
    pub full_address: String,
    pub violation_category: Option<ViolationCategory>,
}

#[derive(Debug, Clone)]
pub struct NormalizedInspections {
    pub records: Vec<InspectionRecord>,
    pub counts: StageCounts,
}

/// Column positions resolved once per table.
struct InspectionColumns {
    camis: usize,
    boro: usize,
    inspection_date: usize,
    dba: Option<usize>,
    building: Option<usize>,
    street: Option<usize>,
    zipcode: Option<usize>,
    phone: Option<usize>,
    cuisine: Option<usize>,
    action: Option<usize>,
    violation_code: Option<usize>,
    violation_description: Option<usize>,
    critical_flag: Option<usize>,
    score: Option<usize>,
    grade: Option<usize>,
    grade_date: Option<usize>,
    record_date: Option<usize>,
    community_board: Option<usize>,
}

impl InspectionColumns {
    fn resolve(table: &TypedTable) -> Result<Self> {
        let optional = |name: &str| table.descriptor.column_index(name);
        Ok(InspectionColumns {
            camis: table.require_column(col::CAMIS)?,
            boro: table.require_column(col::BORO)?,
            inspection_date: table.require_column(col::INSPECTION_DATE)?,
            dba: optional(col::DBA),
            building: optional(col::BUILDING),
            street: optional(col::STREET),
            zipcode: optional(col::ZIPCODE),
            phone: optional(col::PHONE),
            cuisine: optional(col::CUISINE),
            action: optional(col::ACTION),
            violation_code: optional(col::VIOLATION_CODE),
            violation_description: optional(col::VIOLATION_DESCRIPTION),
            critical_flag: optional(col::CRITICAL_FLAG),
            score: optional(col::SCORE),
            grade: optional(col::GRADE),
            grade_date: optional(col::GRADE_DATE),
            record_date: optional(col::RECORD_DATE),
            community_board: optional(col::COMMUNITY_BOARD),
        })
    }
}

/// The publisher's stand-in for "not yet inspected".
fn placeholder_inspection_date() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1900, 1, 1)
}

pub fn normalize_inspections(table: &TypedTable) -> Result<NormalizedInspections> {
    let columns = InspectionColumns::resolve(table)?;
    let outcomes: Vec<std::result::Result<InspectionRecord, RowIssue>> = table
        .rows
        .par_iter()
        .map(|row| normalize_row(&columns, row))
        .collect();

    let mut counts = StageCounts {
        rows_in: table.rows.len(),
        ..StageCounts::default()
    };
    let mut records = Vec::with_capacity(outcomes.len());
    for (row, outcome) in table.rows.iter().zip(outcomes) {
        match outcome {
            Ok(record) => records.push(record),
            Err(issue) => {
                debug!("Dropping inspection row {}: {issue}", row.record_id);
                counts.dropped.record(&issue);
            }
        }
    }
    counts.rows_out = records.len();
    Ok(NormalizedInspections { records, counts })
}

fn text(row: &TypedRow, idx: Option<usize>) -> Option<String> {
    let value = row.string(idx?)?;
    let squished = squish(value);
    (!squished.is_empty()).then(|| squished.into_owned())
}

fn normalize_row(
    columns: &InspectionColumns,
    row: &TypedRow,
) -> std::result::Result<InspectionRecord, RowIssue> {
    let restaurant_id = row
        .integer(columns.camis)
        .ok_or_else(|| RowIssue::MissingRequired {
            column: col::CAMIS.to_string(),
        })?;
    let raw_borough = row
        .string(columns.boro)
        .ok_or_else(|| RowIssue::MissingRequired {
            column: col::BORO.to_string(),
        })?;
    let borough = Borough::parse(raw_borough).ok_or_else(|| RowIssue::UnmappedBorough {
        value: raw_borough.to_string(),
    })?;
    let inspection_date =
        row.date(columns.inspection_date)
            .ok_or_else(|| RowIssue::MissingRequired {
                column: col::INSPECTION_DATE.to_string(),
            })?;
    if Some(inspection_date) == placeholder_inspection_date() {
        return Err(RowIssue::PlaceholderDate {
            column: col::INSPECTION_DATE.to_string(),
        });
    }

    let building = text(row, columns.building);
    let street = text(row, columns.street).and_then(|s| canonical_label(&s));
    let zipcode = text(row, columns.zipcode).and_then(|z| normalize_zip(&z));
    let violation_code = text(row, columns.violation_code).map(|c| uppercase(&c).into_owned());
    let full_address = full_address(
        building.as_deref(),
        street.as_deref(),
        borough,
        zipcode.as_deref(),
    );

    Ok(InspectionRecord {
        record_id: row.record_id,
        restaurant_id,
        name: text(row, columns.dba),
        borough,
        phone: text(row, columns.phone)
            .map(|p| digits_only(&p).into_owned())
            .filter(|p| !p.is_empty()),
        cuisine: text(row, columns.cuisine).and_then(|c| canonical_label(&c)),
        inspection_date,
        action: text(row, columns.action),
        violation_category: violation_code.as_deref().map(categorize),
        violation_code,
        violation_description: text(row, columns.violation_description),
        critical: text(row, columns.critical_flag)
            .map(|flag| is_critical_flag(&flag))
            .unwrap_or(false),
        score: columns
            .score
            .and_then(|idx| row.integer(idx))
            .filter(|score| *score >= 0),
        grade: text(row, columns.grade).and_then(|g| Grade::parse(&g)),
        grade_date: columns.grade_date.and_then(|idx| row.date(idx)),
        record_date: columns.record_date.and_then(|idx| row.date(idx)),
        community_board: text(row, columns.community_board),
        building,
        street,
        zipcode,
        full_address,
    })
}

pub fn is_critical_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "critical" | "y" | "yes" | "true"
    )
}

/// Five-digit zip, accepting ZIP+4. Anything else is treated as missing.
pub fn normalize_zip(raw: &str) -> Option<String> {
    let digits = digits_only(raw);
    match digits.len() {
        5 | 9 if digits.as_ref() != "00000" => Some(digits[..5].to_string()),
        _ => None,
    }
}

/// `"<building> <street>, <Borough>, NY <zip>"`, skipping missing parts.
pub fn full_address(
    building: Option<&str>,
    street: Option<&str>,
    borough: Borough,
    zipcode: Option<&str>,
) -> String {
    let line = [building, street]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    let state = match zipcode {
        Some(zip) => format!("NY {zip}"),
        None => "NY".to_string(),
    };
    let mut parts = Vec::with_capacity(3);
    if !line.is_empty() {
        parts.push(line);
    }
    parts.push(borough.name().to_string());
    parts.push(state);
    parts.join(", ")
}

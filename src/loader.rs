//! Schema Loader: turns a delimited source into a typed table.
//!
//! Headers are bound to the descriptor by name. Each data row is either fully
//! typed or rejected with a [`RowIssue`]; rejections are counted in
//! [`LoadStats`] and never abort the read. Only an unreadable source (missing
//! file, no header row, zero columns, I/O failure mid-read) or a missing
//! required column is fatal.
//!
//! For descriptors with a [`MeltSpec`](crate::schema::MeltSpec) and a wide
//! header row, each source row expands into one typed row per year column
//! with a value; `rows_retained` then counts melted rows.

use std::{
    io::Read,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use encoding_rs::{Encoding, UTF_8};
use log::{debug, info, warn};

use crate::{
    data::{Value, parse_typed_value},
    error::{PipelineError, Result, RowIssue},
    io_utils,
    report::LoadStats,
    schema::{HeaderBinding, SchemaDescriptor},
};

/// How many rejected rows are described individually at debug level.
const REJECTION_LOG_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct TypedRow {
    /// 1-based ordinal of the data row in the source file.
    pub record_id: u64,
    pub values: Vec<Option<Value>>,
}

impl TypedRow {
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx).and_then(|v| v.as_ref())
    }

    pub fn string(&self, idx: usize) -> Option<&str> {
        self.get(idx).and_then(Value::as_str)
    }

    pub fn integer(&self, idx: usize) -> Option<i64> {
        self.get(idx).and_then(Value::as_i64)
    }

    pub fn float(&self, idx: usize) -> Option<f64> {
        self.get(idx).and_then(Value::as_f64)
    }

    pub fn date(&self, idx: usize) -> Option<NaiveDate> {
        self.get(idx).and_then(Value::as_date)
    }
}

#[derive(Debug, Clone)]
pub struct TypedTable {
    pub source: PathBuf,
    pub descriptor: SchemaDescriptor,
    pub rows: Vec<TypedRow>,
    pub stats: LoadStats,
}

impl TypedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a declared column, or `MissingColumn` when the descriptor
    /// doesn't declare it.
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.descriptor
            .column_index(name)
            .ok_or_else(|| PipelineError::MissingColumn {
                dataset: self.descriptor.dataset,
                path: self.source.clone(),
                column: name.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            delimiter: None,
            encoding: UTF_8,
        }
    }
}

pub fn load_table(
    path: &Path,
    descriptor: &SchemaDescriptor,
    options: &LoadOptions,
) -> Result<TypedTable> {
    let delimiter = io_utils::resolve_input_delimiter(path, options.delimiter);
    info!(
        "Loading {} from '{}' (delimiter '{}', encoding {})",
        descriptor.dataset,
        path.display(),
        io_utils::printable_delimiter(delimiter),
        options.encoding.name()
    );
    let reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
    read_csv(reader, path, descriptor, options.encoding)
}

/// Reads from any byte source; `source` only names it in errors and stats.
pub fn read_table<R: Read>(
    reader: R,
    source: &Path,
    descriptor: &SchemaDescriptor,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<TypedTable> {
    read_csv(
        io_utils::open_csv_reader(reader, delimiter),
        source,
        descriptor,
        encoding,
    )
}

fn read_csv<R: Read>(
    mut reader: csv::Reader<R>,
    source: &Path,
    descriptor: &SchemaDescriptor,
    encoding: &'static Encoding,
) -> Result<TypedTable> {
    descriptor
        .validate()
        .map_err(|err| PipelineError::Config(format!("{err:#}")))?;

    let raw_headers = reader
        .byte_headers()
        .map_err(|err| PipelineError::unreadable(source, err))?
        .clone();
    let mut headers = io_utils::decode_record(&raw_headers, encoding)
        .map_err(|err| PipelineError::unreadable(source, format!("{err:#}")))?;
    if let Some(first) = headers.first_mut() {
        *first = first.trim_start_matches('\u{feff}').to_string();
    }
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(PipelineError::unreadable(source, "no header row or zero columns"));
    }

    let binding = descriptor
        .bind(&headers)
        .map_err(|err| PipelineError::Config(format!("{err:#}")))?;
    if let Some(column) = descriptor.missing_required(&binding).first() {
        return Err(PipelineError::MissingColumn {
            dataset: descriptor.dataset,
            path: source.to_path_buf(),
            column: column.to_string(),
        });
    }
    for (column, position) in descriptor.columns.iter().zip(&binding.positions) {
        if position.is_none() && !is_melt_target(descriptor, &binding, &column.name) {
            warn!(
                "{} source '{}' has no '{}' column; reading it as empty",
                descriptor.dataset,
                source.display(),
                column.name
            );
        }
    }
    if binding.is_wide() {
        debug!(
            "{} source uses the wide layout with {} year column(s)",
            descriptor.dataset,
            binding.melted.len()
        );
    }

    let mut stats = LoadStats {
        source: source.display().to_string(),
        ..LoadStats::default()
    };
    let mut rows = Vec::new();
    let mut record = csv::ByteRecord::new();
    let mut record_id = 0u64;
    loop {
        match reader.read_byte_record(&mut record) {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) if err.is_io_error() => {
                return Err(PipelineError::unreadable(source, err));
            }
            Err(err) => {
                record_id += 1;
                stats.rows_read += 1;
                debug!("Row {record_id} in {source:?} could not be read: {err}");
                stats.reject(&RowIssue::Undecodable);
                continue;
            }
        }
        record_id += 1;
        stats.rows_read += 1;

        let outcome = io_utils::decode_record(&record, encoding)
            .map_err(|_| RowIssue::Undecodable)
            .and_then(|decoded| {
                if decoded.len() != headers.len() {
                    return Err(RowIssue::FieldCount {
                        expected: headers.len(),
                        found: decoded.len(),
                    });
                }
                type_row(descriptor, &binding, &decoded)
            });

        match outcome {
            Ok(typed) => {
                for values in typed {
                    rows.push(TypedRow { record_id, values });
                }
            }
            Err(issue) => {
                if stats.rows_rejected < REJECTION_LOG_LIMIT {
                    debug!("Rejected row {record_id} in {source:?}: {issue}");
                }
                stats.reject(&issue);
            }
        }
    }
    stats.rows_retained = rows.len();
    info!(
        "Read {} row(s) from '{}': {} retained, {} rejected",
        stats.rows_read,
        source.display(),
        stats.rows_retained,
        stats.rows_rejected
    );

    Ok(TypedTable {
        source: source.to_path_buf(),
        descriptor: descriptor.clone(),
        rows,
        stats,
    })
}

fn is_melt_target(descriptor: &SchemaDescriptor, binding: &HeaderBinding, name: &str) -> bool {
    match &descriptor.melt {
        Some(melt) if binding.is_wide() => melt.year_column == name || melt.value_column == name,
        _ => false,
    }
}

/// Types one decoded row. Returns a single row for the long layout and one
/// row per populated year column for the wide layout.
fn type_row(
    descriptor: &SchemaDescriptor,
    binding: &HeaderBinding,
    decoded: &[String],
) -> std::result::Result<Vec<Vec<Option<Value>>>, RowIssue> {
    let mut base = Vec::with_capacity(descriptor.columns.len());
    for (column, position) in descriptor.columns.iter().zip(&binding.positions) {
        if is_melt_target(descriptor, binding, &column.name) {
            base.push(None);
            continue;
        }
        let raw = position
            .and_then(|idx| decoded.get(idx))
            .map(|s| s.as_str())
            .unwrap_or("");
        let value = parse_typed_value(raw, column.datatype, column.format.as_deref()).map_err(
            |_| RowIssue::Unparsable {
                column: column.name.clone(),
                value: raw.trim().to_string(),
            },
        )?;
        if value.is_none() && !column.nullable {
            return Err(RowIssue::MissingRequired {
                column: column.name.clone(),
            });
        }
        base.push(value);
    }

    let Some(melt) = descriptor.melt.as_ref().filter(|_| binding.is_wide()) else {
        return Ok(vec![base]);
    };
    let (Some(year_idx), Some(value_idx)) = (
        descriptor.column_index(&melt.year_column),
        descriptor.column_index(&melt.value_column),
    ) else {
        return Ok(vec![base]);
    };
    let value_column = &descriptor.columns[value_idx];
    let mut melted = Vec::with_capacity(binding.melted.len());
    for (year, position) in &binding.melted {
        let raw = decoded.get(*position).map(|s| s.as_str()).unwrap_or("");
        let value = parse_typed_value(raw, value_column.datatype, None).map_err(|_| {
            RowIssue::Unparsable {
                column: format!("{year} {}", value_column.name),
                value: raw.trim().to_string(),
            }
        })?;
        let Some(value) = value else {
            continue;
        };
        let mut row = base.clone();
        row[year_idx] = Some(Value::Integer(*year));
        row[value_idx] = Some(value);
        melted.push(row);
    }
    if melted.is_empty() {
        return Err(RowIssue::MissingRequired {
            column: value_column.name.clone(),
        });
    }
    Ok(melted)
}

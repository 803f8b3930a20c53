//! Error taxonomy for the cleaning and integration engine.
//!
//! Fatal conditions surface as [`PipelineError`] and abort the run. Row-level
//! problems are [`RowIssue`] values: they are tallied into the run report and
//! never raised, so a single bad row can't stop the pipeline.

use std::{fmt, io, path::PathBuf};

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use thiserror::Error;

use crate::schema::Dataset;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source {path:?} is unreadable: {reason}")]
    SourceUnreadable { path: PathBuf, reason: String },

    #[error("{dataset} source {path:?} is missing required column '{column}'")]
    MissingColumn {
        dataset: Dataset,
        path: PathBuf,
        column: String,
    },

    #[error("destination {path:?} is not writable")]
    DestinationUnwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode table '{table}'")]
    Arrow {
        table: String,
        #[source]
        source: ArrowError,
    },

    #[error("failed to write parquet file {path:?}")]
    Parquet {
        path: PathBuf,
        #[source]
        source: ParquetError,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn unreadable(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        PipelineError::SourceUnreadable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn unwritable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        PipelineError::DestinationUnwritable {
            path: path.into(),
            source,
        }
    }

    /// True for failures raised while persisting output.
    pub fn is_destination_failure(&self) -> bool {
        matches!(
            self,
            PipelineError::DestinationUnwritable { .. }
                | PipelineError::Arrow { .. }
                | PipelineError::Parquet { .. }
        )
    }
}

/// Why a single row was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowIssue {
    MissingRequired { column: String },
    Unparsable { column: String, value: String },
    Undecodable,
    FieldCount { expected: usize, found: usize },
    UnmappedBorough { value: String },
    PlaceholderDate { column: String },
    NonPositivePopulation,
    NonPositiveLandArea,
    DistrictOutOfRange { value: i64 },
    DuplicateKey,
}

impl RowIssue {
    /// Stable reason code used as the tally key in reports.
    pub fn code(&self) -> &'static str {
        match self {
            RowIssue::MissingRequired { .. } => "missing_required",
            RowIssue::Unparsable { .. } => "unparsable",
            RowIssue::Undecodable => "undecodable",
            RowIssue::FieldCount { .. } => "field_count",
            RowIssue::UnmappedBorough { .. } => "unmapped_borough",
            RowIssue::PlaceholderDate { .. } => "placeholder_date",
            RowIssue::NonPositivePopulation => "non_positive_population",
            RowIssue::NonPositiveLandArea => "non_positive_land_area",
            RowIssue::DistrictOutOfRange { .. } => "district_out_of_range",
            RowIssue::DuplicateKey => "duplicate_key",
        }
    }
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowIssue::MissingRequired { column } => write!(f, "required column '{column}' is empty"),
            RowIssue::Unparsable { column, value } => {
                write!(f, "column '{column}' has unparsable value '{value}'")
            }
            RowIssue::Undecodable => write!(f, "row could not be decoded"),
            RowIssue::FieldCount { expected, found } => {
                write!(f, "expected {expected} field(s) but found {found}")
            }
            RowIssue::UnmappedBorough { value } => write!(f, "unknown borough '{value}'"),
            RowIssue::PlaceholderDate { column } => {
                write!(f, "column '{column}' holds a placeholder date")
            }
            RowIssue::NonPositivePopulation => write!(f, "population is zero or negative"),
            RowIssue::NonPositiveLandArea => write!(f, "land area is zero or negative"),
            RowIssue::DistrictOutOfRange { value } => {
                write!(f, "district {value} is outside the borough's range")
            }
            RowIssue::DuplicateKey => write!(f, "superseded by another row with the same key"),
        }
    }
}

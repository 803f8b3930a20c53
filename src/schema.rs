//! Schema descriptors for the two raw datasets.
//!
//! A [`SchemaDescriptor`] is plain data: an ordered list of columns with a
//! semantic type and a nullability flag, persisted as YAML. The loader consumes
//! any descriptor uniformly; the built-in ones describe the DOHMH inspection
//! export and the community district population table and can be dumped with
//! the `schema` command, edited, and passed back in.
//!
//! Columns are bound to headers by name. Comparison goes through
//! [`header_key`], so `CUISINE DESCRIPTION`, `Cuisine Description` and
//! `cuisine_description` all bind to the same column.

use std::{
    fmt,
    fs::File,
    io::BufReader,
    path::Path,
};

use anyhow::{Context, Result, anyhow, ensure};
use clap::ValueEnum;
use heck::ToSnakeCase;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "kebab-case")]
pub enum Dataset {
    Inspections,
    Population,
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dataset::Inspections => write!(f, "inspections"),
            Dataset::Population => write!(f, "population"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub datatype: ColumnType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// chrono format string for date columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl ColumnSpec {
    pub fn new(name: &str, datatype: ColumnType, nullable: bool) -> Self {
        ColumnSpec {
            name: name.to_string(),
            datatype,
            nullable,
            aliases: Vec::new(),
            format: None,
        }
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_format(mut self, format: &str) -> Self {
        self.format = Some(format.to_string());
        self
    }

    pub fn matches_header(&self, header: &str) -> bool {
        let key = header_key(header);
        header_key(&self.name) == key || self.aliases.iter().any(|alias| header_key(alias) == key)
    }
}

/// Describes a wide layout where one header per year carries the value
/// (`1970 Population`, `1980 Population`, ...). Such rows are melted into one
/// typed row per year, filling `year_column` and `value_column`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeltSpec {
    pub year_column: String,
    pub value_column: String,
    /// Regex applied to the snake-cased header; the first capture is the year.
    pub header_pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaDescriptor {
    pub dataset: Dataset,
    pub columns: Vec<ColumnSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub melt: Option<MeltSpec>,
}

/// Result of matching a descriptor against a file's header row.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderBinding {
    /// Header position for each declared column, in declaration order.
    pub positions: Vec<Option<usize>>,
    /// `(year, header position)` pairs when the file uses the wide layout.
    pub melted: Vec<(i64, usize)>,
}

impl HeaderBinding {
    pub fn is_wide(&self) -> bool {
        !self.melted.is_empty()
    }
}

impl SchemaDescriptor {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.columns.is_empty(),
            "Schema for {} declares no columns",
            self.dataset
        );
        for (idx, column) in self.columns.iter().enumerate() {
            let key = header_key(&column.name);
            ensure!(!key.is_empty(), "Column {} has an empty name", idx + 1);
            if let Some(dup) = self.columns[..idx]
                .iter()
                .find(|prior| header_key(&prior.name) == key)
            {
                return Err(anyhow!(
                    "Columns '{}' and '{}' normalize to the same header",
                    dup.name,
                    column.name
                ));
            }
            if column.format.is_some() {
                ensure!(
                    column.datatype == ColumnType::Date,
                    "Column '{}' declares a format but is not a date",
                    column.name
                );
            }
        }
        if let Some(melt) = &self.melt {
            Regex::new(&melt.header_pattern)
                .with_context(|| format!("Compiling melt pattern '{}'", melt.header_pattern))?;
            for name in [&melt.year_column, &melt.value_column] {
                ensure!(
                    self.column_index(name).is_some(),
                    "Melt column '{name}' is not declared in the schema"
                );
            }
        }
        Ok(())
    }

    /// Binds declared columns to header positions. Extra headers are ignored.
    pub fn bind(&self, headers: &[String]) -> Result<HeaderBinding> {
        let positions: Vec<Option<usize>> = self
            .columns
            .iter()
            .map(|column| headers.iter().position(|h| column.matches_header(h)))
            .collect();
        let mut melted = Vec::new();
        if let Some(melt) = &self.melt {
            let long_layout = [&melt.year_column, &melt.value_column]
                .iter()
                .all(|name| self.column_index(name).and_then(|idx| positions[idx]).is_some());
            if !long_layout {
                let pattern = Regex::new(&melt.header_pattern)
                    .with_context(|| format!("Compiling melt pattern '{}'", melt.header_pattern))?;
                for (idx, header) in headers.iter().enumerate() {
                    let key = header_key(header);
                    if let Some(year) = pattern
                        .captures(&key)
                        .and_then(|caps| caps.get(1))
                        .and_then(|m| m.as_str().parse::<i64>().ok())
                    {
                        melted.push((year, idx));
                    }
                }
                melted.sort();
            }
        }
        Ok(HeaderBinding { positions, melted })
    }

    /// Non-nullable columns the header row does not provide.
    pub fn missing_required<'a>(&'a self, binding: &HeaderBinding) -> Vec<&'a str> {
        let melted_names: Vec<&str> = match (&self.melt, binding.is_wide()) {
            (Some(melt), true) => vec![melt.year_column.as_str(), melt.value_column.as_str()],
            _ => Vec::new(),
        };
        self.columns
            .iter()
            .zip(&binding.positions)
            .filter(|(column, position)| {
                !column.nullable && position.is_none() && !melted_names.contains(&column.name.as_str())
            })
            .map(|(column, _)| column.name.as_str())
            .collect()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening schema file {path:?}"))?;
        let reader = BufReader::new(file);
        let schema: SchemaDescriptor =
            serde_yaml::from_reader(reader).context("Parsing schema YAML")?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating schema file {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing schema YAML")
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing schema to YAML string")
    }

    pub fn builtin(dataset: Dataset) -> Self {
        match dataset {
            Dataset::Inspections => inspection_schema(),
            Dataset::Population => population_schema(),
        }
    }
}

/// Canonical form used to compare header names.
pub fn header_key(name: &str) -> String {
    name.trim().to_snake_case()
}

pub mod inspection_columns {
    pub const CAMIS: &str = "CAMIS";
    pub const DBA: &str = "DBA";
    pub const BORO: &str = "BORO";
    pub const BUILDING: &str = "BUILDING";
    pub const STREET: &str = "STREET";
    pub const ZIPCODE: &str = "ZIPCODE";
    pub const PHONE: &str = "PHONE";
    pub const CUISINE: &str = "CUISINE DESCRIPTION";
    pub const INSPECTION_DATE: &str = "INSPECTION DATE";
    pub const ACTION: &str = "ACTION";
    pub const VIOLATION_CODE: &str = "VIOLATION CODE";
    pub const VIOLATION_DESCRIPTION: &str = "VIOLATION DESCRIPTION";
    pub const CRITICAL_FLAG: &str = "CRITICAL FLAG";
    pub const SCORE: &str = "SCORE";
    pub const GRADE: &str = "GRADE";
    pub const GRADE_DATE: &str = "GRADE DATE";
    pub const RECORD_DATE: &str = "RECORD DATE";
    pub const COMMUNITY_BOARD: &str = "Community Board";
}

pub mod population_columns {
    pub const BOROUGH: &str = "Borough";
    pub const CD_NUMBER: &str = "CD Number";
    pub const CD_NAME: &str = "CD Name";
    pub const YEAR: &str = "Year";
    pub const POPULATION: &str = "Population";
    pub const LAND_AREA: &str = "Land Area";
}

pub fn inspection_schema() -> SchemaDescriptor {
    use inspection_columns::*;
    const US_DATE: &str = "%m/%d/%Y";
    SchemaDescriptor {
        dataset: Dataset::Inspections,
        columns: vec![
            ColumnSpec::new(CAMIS, ColumnType::Integer, false).with_aliases(&["Restaurant ID"]),
            ColumnSpec::new(DBA, ColumnType::String, true),
            ColumnSpec::new(BORO, ColumnType::String, false).with_aliases(&["Borough"]),
            ColumnSpec::new(BUILDING, ColumnType::String, true),
            ColumnSpec::new(STREET, ColumnType::String, true),
            ColumnSpec::new(ZIPCODE, ColumnType::String, true).with_aliases(&["Zip Code"]),
            ColumnSpec::new(PHONE, ColumnType::String, true),
            ColumnSpec::new(CUISINE, ColumnType::String, true).with_aliases(&["Cuisine"]),
            ColumnSpec::new(INSPECTION_DATE, ColumnType::Date, false).with_format(US_DATE),
            ColumnSpec::new(ACTION, ColumnType::String, true),
            ColumnSpec::new(VIOLATION_CODE, ColumnType::String, true),
            ColumnSpec::new(VIOLATION_DESCRIPTION, ColumnType::String, true),
            ColumnSpec::new(CRITICAL_FLAG, ColumnType::String, true),
            ColumnSpec::new(SCORE, ColumnType::Integer, true),
            ColumnSpec::new(GRADE, ColumnType::String, true),
            ColumnSpec::new(GRADE_DATE, ColumnType::Date, true).with_format(US_DATE),
            ColumnSpec::new(RECORD_DATE, ColumnType::Date, true).with_format(US_DATE),
            ColumnSpec::new(COMMUNITY_BOARD, ColumnType::String, true)
                .with_aliases(&["CD_NUMBER", "Community District"]),
        ],
        melt: None,
    }
}

pub fn population_schema() -> SchemaDescriptor {
    use population_columns::*;
    SchemaDescriptor {
        dataset: Dataset::Population,
        columns: vec![
            ColumnSpec::new(BOROUGH, ColumnType::String, false).with_aliases(&["BORO"]),
            ColumnSpec::new(CD_NUMBER, ColumnType::Integer, false)
                .with_aliases(&["Community District", "CD"]),
            ColumnSpec::new(CD_NAME, ColumnType::String, true),
            ColumnSpec::new(YEAR, ColumnType::Integer, false),
            ColumnSpec::new(POPULATION, ColumnType::Integer, false),
            ColumnSpec::new(LAND_AREA, ColumnType::Float, false)
                .with_aliases(&["Land Area (sq mi)", "Area"]),
        ],
        melt: Some(MeltSpec {
            year_column: YEAR.to_string(),
            value_column: POPULATION.to_string(),
            header_pattern: r"^(\d{4})_population$".to_string(),
        }),
    }
}

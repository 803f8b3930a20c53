use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{normalize::DuplicatePolicy, schema::Dataset};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Clean and integrate NYC restaurant inspections with community district population data",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the pipeline and write the analytical views as Parquet files
    Run(RunArgs),
    /// Run the pipeline and print the run report without writing any output
    Check(InputArgs),
    /// Write a built-in schema descriptor as YAML
    Schema(SchemaArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct InputArgs {
    /// Restaurant inspection CSV file
    #[arg(short = 'i', long)]
    pub inspections: Option<PathBuf>,
    /// Community district population CSV file
    #[arg(short = 'p', long)]
    pub population: Option<PathBuf>,
    /// CSV delimiter character for both inputs (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the inspection file (defaults to utf-8)
    #[arg(long = "inspection-encoding")]
    pub inspection_encoding: Option<String>,
    /// Character encoding of the population file (defaults to utf-8)
    #[arg(long = "population-encoding")]
    pub population_encoding: Option<String>,
    /// Schema descriptor (YAML) replacing the built-in inspection schema
    #[arg(long = "inspection-schema")]
    pub inspection_schema: Option<PathBuf>,
    /// Schema descriptor (YAML) replacing the built-in population schema
    #[arg(long = "population-schema")]
    pub population_schema: Option<PathBuf>,
    /// How duplicate (borough, district, year) population rows are resolved
    #[arg(long = "duplicate-policy", value_enum)]
    pub duplicate_policy: Option<DuplicatePolicy>,
    /// YAML config file; flags take precedence over its values
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Root directory; each run writes into a new timestamped folder below it
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
    /// Also write the cleaned and integrated row-level tables
    #[arg(long)]
    pub processed: bool,
}

#[derive(Debug, Clone, Args)]
pub struct SchemaArgs {
    /// Dataset whose built-in descriptor is written
    #[arg(short, long, value_enum)]
    pub dataset: Dataset,
    /// Destination file (prints to stdout when omitted)
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

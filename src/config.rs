//! Optional YAML run configuration.
//!
//! A config file carries the same settings as the command-line flags. Flags
//! win over file values; relative paths in the file are resolved against the
//! file's own directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::{
    cli::{InputArgs, RunArgs, parse_delimiter},
    io_utils,
    normalize::DuplicatePolicy,
    schema::{Dataset, SchemaDescriptor},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub inspections: Option<PathBuf>,
    pub population: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub processed: bool,
    pub delimiter: Option<String>,
    pub inspection_encoding: Option<String>,
    pub population_encoding: Option<String>,
    pub inspection_schema: Option<PathBuf>,
    pub population_schema: Option<PathBuf>,
    pub duplicate_policy: Option<DuplicatePolicy>,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Reading config file {path:?}"))?;
        let mut config: PipelineConfig = serde_yaml::from_str(&text)
            .with_context(|| format!("Parsing config file {path:?}"))?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    fn rebase(&mut self, base: &Path) {
        for slot in [
            &mut self.inspections,
            &mut self.population,
            &mut self.output,
            &mut self.inspection_schema,
            &mut self.population_schema,
        ] {
            if let Some(path) = slot.as_mut().filter(|p| p.is_relative()) {
                *path = base.join(&*path);
            }
        }
    }
}

/// Everything the engine needs to load both sources, after merging flags,
/// config file and defaults.
#[derive(Debug, Clone)]
pub struct InputSettings {
    pub inspections: PathBuf,
    pub population: PathBuf,
    pub delimiter: Option<u8>,
    pub inspection_encoding: &'static Encoding,
    pub population_encoding: &'static Encoding,
    pub inspection_schema: SchemaDescriptor,
    pub population_schema: SchemaDescriptor,
    pub duplicate_policy: DuplicatePolicy,
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub input: InputSettings,
    pub output: PathBuf,
    pub processed: bool,
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path),
        None => Ok(PipelineConfig::default()),
    }
}

fn schema_or_builtin(path: Option<&PathBuf>, dataset: Dataset) -> Result<SchemaDescriptor> {
    let Some(path) = path else {
        return Ok(SchemaDescriptor::builtin(dataset));
    };
    let schema = SchemaDescriptor::load(path)
        .with_context(|| format!("Loading {dataset} schema from {path:?}"))?;
    if schema.dataset != dataset {
        return Err(anyhow!(
            "Schema {path:?} describes the {} dataset, expected {dataset}",
            schema.dataset
        ));
    }
    Ok(schema)
}

impl InputSettings {
    pub fn resolve(args: &InputArgs) -> Result<Self> {
        let config = load_config(args.config.as_deref())?;
        Self::merge(args, &config)
    }

    fn merge(args: &InputArgs, config: &PipelineConfig) -> Result<Self> {
        let inspections = args
            .inspections
            .clone()
            .or_else(|| config.inspections.clone())
            .ok_or_else(|| anyhow!("An inspection source is required (--inspections)"))?;
        let population = args
            .population
            .clone()
            .or_else(|| config.population.clone())
            .ok_or_else(|| anyhow!("A population source is required (--population)"))?;
        let delimiter = match (args.delimiter, config.delimiter.as_deref()) {
            (Some(delimiter), _) => Some(delimiter),
            (None, Some(raw)) => Some(
                parse_delimiter(raw)
                    .map_err(|err| anyhow!("Invalid delimiter '{raw}' in config: {err}"))?,
            ),
            (None, None) => None,
        };
        let inspection_encoding = io_utils::resolve_encoding(
            args.inspection_encoding
                .as_deref()
                .or(config.inspection_encoding.as_deref()),
        )?;
        let population_encoding = io_utils::resolve_encoding(
            args.population_encoding
                .as_deref()
                .or(config.population_encoding.as_deref()),
        )?;
        let inspection_schema = schema_or_builtin(
            args.inspection_schema
                .as_ref()
                .or(config.inspection_schema.as_ref()),
            Dataset::Inspections,
        )?;
        let population_schema = schema_or_builtin(
            args.population_schema
                .as_ref()
                .or(config.population_schema.as_ref()),
            Dataset::Population,
        )?;
        Ok(InputSettings {
            inspections,
            population,
            delimiter,
            inspection_encoding,
            population_encoding,
            inspection_schema,
            population_schema,
            duplicate_policy: args
                .duplicate_policy
                .or(config.duplicate_policy)
                .unwrap_or_default(),
        })
    }
}

impl RunSettings {
    pub fn resolve(args: &RunArgs) -> Result<Self> {
        let config = load_config(args.input.config.as_deref())?;
        let input = InputSettings::merge(&args.input, &config)?;
        let output = args
            .output
            .clone()
            .or_else(|| config.output.clone())
            .ok_or_else(|| anyhow!("An output directory is required (--output)"))?;
        Ok(RunSettings {
            input,
            output,
            processed: args.processed || config.processed,
        })
    }
}

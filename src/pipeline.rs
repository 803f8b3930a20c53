//! The engine entry point and the `run` / `check` command handlers.
//!
//! [`Engine::run`] chains normalization, key reconciliation, the join and the
//! views over two loaded tables. It knows nothing about run folders or
//! files; the handlers below load the sources, call it, and persist the result.

use anyhow::{Context, Result};
use log::info;

use crate::{
    cli::{InputArgs, RunArgs},
    config::{InputSettings, RunSettings},
    error,
    integrate::{Integrated, integrate},
    loader::{LoadOptions, TypedTable, load_table},
    normalize::{
        DuplicatePolicy, NormalizedInspections, NormalizedPopulation, normalize_inspections,
        normalize_population,
    },
    output::{RunContext, write_run},
    reconcile::{KeyStats, reconcile_all},
    report::{LoadStats, RunReport},
    views::{
        AnalyticalViews, ArrowTable,
        processed::{CleanInspections, CleanPopulation, IntegratedTable},
    },
};

#[derive(Debug, Clone, Copy, Default)]
pub struct Engine {
    pub duplicate_policy: DuplicatePolicy,
}

/// Every intermediate table of one engine pass.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub inspections_load: LoadStats,
    pub population_load: LoadStats,
    pub inspections: NormalizedInspections,
    pub population: NormalizedPopulation,
    pub keys: KeyStats,
    pub integrated: Integrated,
    pub views: AnalyticalViews,
}

impl Engine {
    pub fn new(duplicate_policy: DuplicatePolicy) -> Self {
        Engine { duplicate_policy }
    }

    pub fn run(&self, inspections: &TypedTable, population: &TypedTable) -> error::Result<EngineOutput> {
        let (normalized_inspections, normalized_population) = rayon::join(
            || normalize_inspections(inspections),
            || normalize_population(population, self.duplicate_policy),
        );
        let normalized_inspections = normalized_inspections?;
        let normalized_population = normalized_population?;
        info!(
            "Normalized {} inspection(s) and {} population row(s)",
            normalized_inspections.records.len(),
            normalized_population.records.len()
        );

        let reconciled = reconcile_all(&normalized_inspections.records);
        let integrated = integrate(
            &normalized_inspections.records,
            &reconciled.keys,
            &normalized_population.records,
        );
        let views = AnalyticalViews::build_all(&integrated.records);

        Ok(EngineOutput {
            inspections_load: inspections.stats.clone(),
            population_load: population.stats.clone(),
            inspections: normalized_inspections,
            population: normalized_population,
            keys: reconciled.stats,
            integrated,
            views,
        })
    }
}

impl EngineOutput {
    pub fn report(&self, context: Option<&RunContext>) -> RunReport {
        RunReport {
            run_id: context.map(|c| c.run_id.clone()),
            started_at: context.map(|c| c.started_at.to_rfc3339()),
            inspections_load: self.inspections_load.clone(),
            population_load: self.population_load.clone(),
            inspections_normalize: self.inspections.counts.clone(),
            population_normalize: self.population.counts.clone(),
            keys: self.keys.clone(),
            join: self.integrated.stats.clone(),
            views: self
                .views
                .tables()
                .iter()
                .map(|table| (table.name().to_string(), table.row_count()))
                .collect(),
        }
    }
}

/// Loads both sources concurrently.
pub fn load_sources(settings: &InputSettings) -> error::Result<(TypedTable, TypedTable)> {
    let (inspections, population) = rayon::join(
        || {
            load_table(
                &settings.inspections,
                &settings.inspection_schema,
                &LoadOptions {
                    delimiter: settings.delimiter,
                    encoding: settings.inspection_encoding,
                },
            )
        },
        || {
            load_table(
                &settings.population,
                &settings.population_schema,
                &LoadOptions {
                    delimiter: settings.delimiter,
                    encoding: settings.population_encoding,
                },
            )
        },
    );
    Ok((inspections?, population?))
}

fn run_engine(settings: &InputSettings) -> Result<EngineOutput> {
    let (inspections, population) = load_sources(settings).context("Loading input sources")?;
    Engine::new(settings.duplicate_policy)
        .run(&inspections, &population)
        .context("Cleaning and integrating inputs")
}

pub fn execute(args: &RunArgs) -> Result<()> {
    let settings = RunSettings::resolve(args)?;
    let context = RunContext::new(&settings.output);
    info!(
        "Starting run {} ('{}' + '{}' -> {:?})",
        context.run_id,
        settings.input.inspections.display(),
        settings.input.population.display(),
        context.run_dir()
    );
    let output = run_engine(&settings.input)?;
    let report = output.report(Some(&context));
    report.log_summary();

    let clean_inspections = CleanInspections(&output.inspections.records);
    let clean_population = CleanPopulation(&output.population.records);
    let integrated = IntegratedTable(&output.integrated.records);
    let processed: Vec<&dyn ArrowTable> = if settings.processed {
        vec![
            &clean_inspections as &dyn ArrowTable,
            &clean_population as &dyn ArrowTable,
            &integrated as &dyn ArrowTable,
        ]
    } else {
        Vec::new()
    };
    let written = write_run(&context, &output.views.tables(), &processed, &report)
        .with_context(|| format!("Writing run output to {:?}", context.run_dir()))?;
    info!(
        "Run {} complete: {} file(s) in {:?}",
        context.run_id,
        written.files.len(),
        written.run_dir
    );
    Ok(())
}

pub fn check(args: &InputArgs) -> Result<()> {
    let settings = InputSettings::resolve(args)?;
    let output = run_engine(&settings)?;
    let report = output.report(None);
    report.log_summary();
    println!(
        "{}",
        report.to_json_pretty().context("Serializing run report")?
    );
    Ok(())
}

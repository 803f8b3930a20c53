pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod integrate;
pub mod io_utils;
pub mod loader;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod schema;
pub mod transform;
pub mod views;

use std::{env, fs, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::{
    cli::{Cli, Commands, SchemaArgs},
    schema::SchemaDescriptor,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("restaurant_pipeline", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => pipeline::execute(&args),
        Commands::Check(args) => pipeline::check(&args),
        Commands::Schema(args) => handle_schema(&args),
    }
}

fn handle_schema(args: &SchemaArgs) -> Result<()> {
    let schema = SchemaDescriptor::builtin(args.dataset);
    match &args.output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Creating directory {parent:?}"))?;
            }
            schema
                .save(path)
                .with_context(|| format!("Writing {} schema to {path:?}", args.dataset))?;
            info!(
                "Wrote {} schema with {} column(s) to {:?}",
                args.dataset,
                schema.columns.len(),
                path
            );
        }
        None => print!("{}", schema.to_yaml_string()?),
    }
    Ok(())
}

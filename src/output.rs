//! Run directories and Parquet persistence.
//!
//! Every run writes into `<root>/<YYYYMMDD_HHMMSS>_<id>/`. Files are staged in
//! a hidden `.<run_id>.partial` sibling and the directory is renamed into
//! place only once every file is complete, so a reader never sees half a run.

use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parquet::{
    arrow::ArrowWriter,
    basic::Compression,
    file::properties::WriterProperties,
};
use uuid::Uuid;

use crate::{
    error::{PipelineError, Result},
    report::RunReport,
    views::ArrowTable,
};

pub const REPORT_FILE: &str = "run_report.json";
pub const PROCESSED_DIR: &str = "processed";

/// Identity of one pipeline run. Built once by the caller and handed to the
/// writer; nothing here reads the clock on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub output_root: PathBuf,
}

impl RunContext {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        RunContext::at(output_root, Utc::now(), Uuid::new_v4())
    }

    pub fn at(output_root: impl Into<PathBuf>, started_at: DateTime<Utc>, id: Uuid) -> Self {
        let suffix = id.simple().to_string();
        RunContext {
            run_id: format!("{}_{}", started_at.format("%Y%m%d_%H%M%S"), &suffix[..8]),
            started_at,
            output_root: output_root.into(),
        }
    }

    pub fn run_dir(&self) -> PathBuf {
        self.output_root.join(&self.run_id)
    }

    fn staging_dir(&self) -> PathBuf {
        self.output_root.join(format!(".{}.partial", self.run_id))
    }
}

/// Files of a committed run, relative paths resolved against `run_dir`.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub run_dir: PathBuf,
    pub files: Vec<PathBuf>,
}

/// Writes `views` as Parquet files, `processed` tables under
/// `processed/`, and the report, then commits the run directory.
pub fn write_run(
    context: &RunContext,
    views: &[&dyn ArrowTable],
    processed: &[&dyn ArrowTable],
    report: &RunReport,
) -> Result<RunOutput> {
    let run_dir = context.run_dir();
    fs::create_dir_all(&context.output_root)
        .map_err(|err| PipelineError::unwritable(&context.output_root, err))?;
    if run_dir.exists() {
        return Err(PipelineError::unwritable(
            &run_dir,
            io::Error::new(io::ErrorKind::AlreadyExists, "run directory already exists"),
        ));
    }

    let staging = context.staging_dir();
    fs::create_dir(&staging).map_err(|err| PipelineError::unwritable(&staging, err))?;
    debug!("Staging run {} in {:?}", context.run_id, staging);

    let written = write_files(&staging, views, processed, report).and_then(|files| {
        if run_dir.exists() {
            return Err(PipelineError::unwritable(
                &run_dir,
                io::Error::new(io::ErrorKind::AlreadyExists, "run directory already exists"),
            ));
        }
        fs::rename(&staging, &run_dir).map_err(|err| PipelineError::unwritable(&run_dir, err))?;
        Ok(files)
    });
    let files = match written {
        Ok(files) => files,
        Err(err) => {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                warn!("Could not remove staging directory {staging:?}: {cleanup}");
            }
            return Err(err);
        }
    };

    info!(
        "Wrote {} file(s) for run {} to {:?}",
        files.len(),
        context.run_id,
        run_dir
    );
    Ok(RunOutput { run_dir, files })
}

fn write_files(
    staging: &Path,
    views: &[&dyn ArrowTable],
    processed: &[&dyn ArrowTable],
    report: &RunReport,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::with_capacity(views.len() + processed.len() + 1);
    for table in views {
        let name = PathBuf::from(format!("{}.parquet", table.name()));
        write_parquet(*table, &staging.join(&name))?;
        files.push(name);
    }
    if !processed.is_empty() {
        let dir = staging.join(PROCESSED_DIR);
        fs::create_dir(&dir).map_err(|err| PipelineError::unwritable(&dir, err))?;
        for table in processed {
            let name = Path::new(PROCESSED_DIR).join(format!("{}.parquet", table.name()));
            write_parquet(*table, &staging.join(&name))?;
            files.push(name);
        }
    }
    let report_path = staging.join(REPORT_FILE);
    write_report(report, &report_path)?;
    files.push(PathBuf::from(REPORT_FILE));
    Ok(files)
}

pub fn write_parquet(table: &dyn ArrowTable, path: &Path) -> Result<()> {
    let batch = table
        .to_record_batch()
        .map_err(|source| PipelineError::Arrow {
            table: table.name().to_string(),
            source,
        })?;
    let parquet_err = |source| PipelineError::Parquet {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(|err| PipelineError::unwritable(path, err))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props)).map_err(parquet_err)?;
    writer.write(&batch).map_err(parquet_err)?;
    writer.close().map_err(parquet_err)?;
    debug!("Wrote {} row(s) to {:?}", batch.num_rows(), path);
    Ok(())
}

pub fn write_report(report: &RunReport, path: &Path) -> Result<()> {
    let json = report
        .to_json_pretty()
        .map_err(|err| PipelineError::unwritable(path, io::Error::other(err)))?;
    fs::write(path, json).map_err(|err| PipelineError::unwritable(path, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::CuisineHygiene;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn fixed_context(root: &Path) -> RunContext {
        let started = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let id = Uuid::parse_str("a1b2c3d4-0000-4000-8000-000000000000").unwrap();
        RunContext::at(root, started, id)
    }

    #[test]
    fn run_id_combines_timestamp_and_uuid_prefix() {
        let context = fixed_context(Path::new("/out"));
        assert_eq!(context.run_id, "20240309_140507_a1b2c3d4");
        assert_eq!(context.run_dir(), Path::new("/out/20240309_140507_a1b2c3d4"));
    }

    #[test]
    fn commit_leaves_no_staging_directory() {
        let dir = tempdir().unwrap();
        let context = fixed_context(dir.path());
        let view = CuisineHygiene::default();
        let views: [&dyn ArrowTable; 1] = [&view];
        let output = write_run(&context, &views, &[], &RunReport::default()).unwrap();
        assert!(output.run_dir.join("cuisine_hygiene.parquet").is_file());
        assert!(output.run_dir.join(REPORT_FILE).is_file());
        assert!(!context.staging_dir().exists());
        assert_eq!(output.files.len(), 2);
    }

    #[test]
    fn existing_run_directory_is_never_overwritten() {
        let dir = tempdir().unwrap();
        let context = fixed_context(dir.path());
        fs::create_dir(context.run_dir()).unwrap();
        fs::write(context.run_dir().join("keep.txt"), "x").unwrap();
        let err = write_run(&context, &[], &[], &RunReport::default()).unwrap_err();
        assert!(err.is_destination_failure());
        assert!(context.run_dir().join("keep.txt").is_file());
    }

    #[test]
    fn unwritable_root_is_a_destination_failure() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "not a directory").unwrap();
        let context = fixed_context(&blocker);
        let err = write_run(&context, &[], &[], &RunReport::default()).unwrap_err();
        assert!(matches!(err, PipelineError::DestinationUnwritable { .. }));
    }
}

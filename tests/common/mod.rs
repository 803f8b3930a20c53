#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use arrow::record_batch::RecordBatch;
use encoding_rs::UTF_8;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use restaurant_pipeline::loader::{TypedTable, read_table};
use restaurant_pipeline::schema::{inspection_schema, population_schema};
use tempfile::{TempDir, tempdir};

pub const INSPECTION_HEADER: &str = "CAMIS,DBA,BORO,BUILDING,STREET,ZIPCODE,PHONE,CUISINE DESCRIPTION,INSPECTION DATE,ACTION,VIOLATION CODE,VIOLATION DESCRIPTION,CRITICAL FLAG,SCORE,GRADE,GRADE DATE,RECORD DATE,Community Board";
pub const POPULATION_HEADER: &str = "Borough,CD Number,CD Name,Year,Population,Land Area";

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Lists the run directories created under `root`, skipping hidden staging folders.
    pub fn run_dirs(&self, root: &str) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(self.path().join(root))
            .expect("read output root")
            .map(|entry| entry.expect("dir entry").path())
            .filter(|path| {
                path.is_dir()
                    && !path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .is_some_and(|name| name.starts_with('.'))
            })
            .collect();
        dirs.sort();
        dirs
    }
}

/// One inspection CSV line with the fields the tests vary; the rest are filled in.
pub fn inspection_line(
    camis: i64,
    borough: &str,
    date: &str,
    code: &str,
    score: &str,
    board: &str,
) -> String {
    format!(
        "{camis},Restaurant {camis},{borough},1,MAIN ST,10001,2125550000,American,{date},Violations were cited,{code},Description,Critical,{score},A,{date},02/01/2023,{board}"
    )
}

pub fn inspections_table(lines: &[String]) -> TypedTable {
    let text = format!("{INSPECTION_HEADER}\n{}\n", lines.join("\n"));
    read_table(
        text.as_bytes(),
        Path::new("inspections.csv"),
        &inspection_schema(),
        b',',
        UTF_8,
    )
    .expect("inspection table")
}

pub fn population_table(lines: &[&str]) -> TypedTable {
    let text = format!("{POPULATION_HEADER}\n{}\n", lines.join("\n"));
    read_table(
        text.as_bytes(),
        Path::new("population.csv"),
        &population_schema(),
        b',',
        UTF_8,
    )
    .expect("population table")
}

/// Reads a Parquet file back into a single record batch.
pub fn read_parquet(path: &Path) -> RecordBatch {
    let file = File::open(path).expect("open parquet file");
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).expect("parquet metadata");
    let schema = builder.schema().clone();
    let batches: Vec<RecordBatch> = builder
        .build()
        .expect("parquet reader")
        .collect::<Result<_, _>>()
        .expect("read record batches");
    arrow::compute::concat_batches(&schema, &batches).expect("concat batches")
}

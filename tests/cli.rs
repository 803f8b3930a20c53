mod common;

use std::fs;

use assert_cmd::Command;
use common::{TestWorkspace, fixture_path};
use predicates::str::contains;
use restaurant_pipeline::{
    output::{PROCESSED_DIR, REPORT_FILE},
    schema::{Dataset, SchemaDescriptor},
};

fn pipeline() -> Command {
    Command::cargo_bin("restaurant-pipeline").expect("binary exists")
}

fn fixture(name: &str) -> String {
    fixture_path(name).to_str().unwrap().to_string()
}

#[test]
fn run_writes_views_and_report_into_a_new_run_directory() {
    let workspace = TestWorkspace::new();
    let output = workspace.path().join("out");
    pipeline()
        .args([
            "run",
            "-i",
            &fixture("inspections_sample.csv"),
            "-p",
            &fixture("population_sample.csv"),
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();

    let runs = workspace.run_dirs("out");
    assert_eq!(runs.len(), 1);
    let run = &runs[0];
    for view in [
        "food_safety_demographics",
        "cuisine_hygiene",
        "location_intelligence",
        "violation_risk",
    ] {
        assert!(run.join(format!("{view}.parquet")).is_file(), "missing {view}");
    }
    assert!(!run.join(PROCESSED_DIR).exists());

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(run.join(REPORT_FILE)).unwrap()).unwrap();
    assert_eq!(report["join"]["output_rows"], 6);
    assert_eq!(report["views"]["location_intelligence"], 4);
    assert_eq!(
        report["run_id"].as_str(),
        run.file_name().and_then(|name| name.to_str())
    );
}

#[test]
fn repeated_runs_never_share_a_directory() {
    let workspace = TestWorkspace::new();
    let output = workspace.path().join("out");
    for _ in 0..2 {
        pipeline()
            .args([
                "run",
                "-i",
                &fixture("inspections_sample.csv"),
                "-p",
                &fixture("population_sample.csv"),
                "-o",
                output.to_str().unwrap(),
            ])
            .assert()
            .success();
    }
    assert_eq!(workspace.run_dirs("out").len(), 2);
}

#[test]
fn processed_flag_adds_row_level_tables() {
    let workspace = TestWorkspace::new();
    let output = workspace.path().join("out");
    pipeline()
        .args([
            "run",
            "-i",
            &fixture("inspections_sample.csv"),
            "-p",
            &fixture("population_wide.csv"),
            "-o",
            output.to_str().unwrap(),
            "--processed",
            "--duplicate-policy",
            "most-complete",
        ])
        .assert()
        .success();

    let run = workspace.run_dirs("out").remove(0);
    for table in ["restaurant_clean", "population_clean", "integrated_data"] {
        assert!(
            run.join(PROCESSED_DIR)
                .join(format!("{table}.parquet"))
                .is_file(),
            "missing {table}"
        );
    }
}

#[test]
fn run_reads_settings_from_config_file() {
    let workspace = TestWorkspace::new();
    let config = workspace.write(
        "pipeline.yml",
        &format!(
            "inspections: {}\npopulation: {}\noutput: runs\nprocessed: true\n",
            fixture("inspections_sample.csv"),
            fixture("population_sample.csv"),
        ),
    );
    pipeline()
        .args(["run", "-c", config.to_str().unwrap()])
        .assert()
        .success();

    let runs = workspace.run_dirs("runs");
    assert_eq!(runs.len(), 1);
    assert!(runs[0].join(PROCESSED_DIR).is_dir());
}

#[test]
fn check_prints_report_without_writing() {
    let workspace = TestWorkspace::new();
    pipeline()
        .current_dir(workspace.path())
        .args([
            "check",
            "-i",
            &fixture("inspections_sample.csv"),
            "-p",
            &fixture("population_sample.csv"),
        ])
        .assert()
        .success()
        .stdout(contains("\"inspections_load\""))
        .stdout(contains("\"unmapped_borough\": 1"))
        .stdout(contains("\"non_positive_land_area\": 1"));
    assert_eq!(fs::read_dir(workspace.path()).unwrap().count(), 0);
}

#[test]
fn schema_command_emits_loadable_yaml() {
    let workspace = TestWorkspace::new();
    pipeline()
        .args(["schema", "--dataset", "population"])
        .assert()
        .success()
        .stdout(contains("Land Area"));

    let path = workspace.path().join("schemas").join("inspections.yml");
    pipeline()
        .args([
            "schema",
            "-d",
            "inspections",
            "-o",
            path.to_str().unwrap(),
        ])
        .assert()
        .success();
    let loaded = SchemaDescriptor::load(&path).unwrap();
    assert_eq!(loaded, SchemaDescriptor::builtin(Dataset::Inspections));
}

#[test]
fn missing_source_fails_with_error_message() {
    let workspace = TestWorkspace::new();
    pipeline()
        .args([
            "run",
            "-i",
            workspace.path().join("absent.csv").to_str().unwrap(),
            "-p",
            &fixture("population_sample.csv"),
            "-o",
            workspace.path().join("out").to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(contains("error:"))
        .stderr(contains("absent.csv"));
    assert!(!workspace.path().join("out").exists());
}

#[test]
fn missing_required_column_aborts_the_run() {
    let workspace = TestWorkspace::new();
    let population = workspace.write(
        "population.csv",
        "Borough,CD Name,Year,Population,Land Area\nBronx,Mott Haven,2010,91497,2.6\n",
    );
    pipeline()
        .args([
            "check",
            "-i",
            &fixture("inspections_sample.csv"),
            "-p",
            population.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(contains("CD Number"));
}

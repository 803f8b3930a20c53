mod common;

use arrow::array::{Array, Float64Array, StringArray, UInt8Array};
use arrow::datatypes::DataType;
use chrono::{TimeZone, Utc};
use common::{
    TestWorkspace, fixture_path, inspection_line, inspections_table, population_table,
    read_parquet,
};
use restaurant_pipeline::{
    loader::{LoadOptions, load_table},
    normalize::{DuplicatePolicy, ViolationCategory},
    output::{REPORT_FILE, RunContext, write_run},
    pipeline::Engine,
    reconcile::District,
    schema::{inspection_schema, population_schema},
    views::{
        ArrowTable, CuisineHygiene, FoodSafetyDemographics, LocationIntelligence, ViolationRisk,
    },
};
use uuid::Uuid;

#[test]
fn brooklyn_board_joins_population_of_its_district() {
    let inspections = inspections_table(&[inspection_line(
        41, "bk", "01/15/2023", "04L", "12", "301",
    )]);
    let population = population_table(&["Brooklyn,1,Greenpoint,2023,100000,5.0"]);
    let output = Engine::default().run(&inspections, &population).unwrap();

    let record = &output.integrated.records[0];
    assert_eq!(record.district(), Some(1));
    assert_eq!(record.population_density(), Some(20_000.0));
    assert_eq!(
        record.inspection.violation_category,
        Some(ViolationCategory::Pest)
    );
    assert_eq!(output.integrated.stats.matched, 1);
}

#[test]
fn board_301_does_not_match_brooklyn_district_3() {
    // The leading 3 is the borough code; the district is the remainder mod 100.
    let inspections = inspections_table(&[inspection_line(
        45, "bk", "01/15/2023", "04L", "12", "301",
    )]);
    let population = population_table(&["Brooklyn,3,Bedford Stuyvesant,2023,100000,5.0"]);
    let output = Engine::default().run(&inspections, &population).unwrap();

    let record = &output.integrated.records[0];
    assert_eq!(record.district(), Some(1));
    assert_eq!(record.population, None);
    assert_eq!(record.population_density(), None);
    assert_eq!(output.integrated.stats.matched, 0);
}

#[test]
fn zero_land_area_drops_population_row_and_leaves_density_null() {
    let inspections = inspections_table(&[inspection_line(
        42, "Bronx", "03/10/2023", "02B", "20", "204",
    )]);
    let population = population_table(&["Bronx,4,Highbridge,2020,140000,0"]);
    let output = Engine::default().run(&inspections, &population).unwrap();

    assert!(output.population.records.is_empty());
    assert_eq!(
        output.population.counts.dropped.get("non_positive_land_area"),
        1
    );
    let record = &output.integrated.records[0];
    assert_eq!(record.district(), Some(4));
    assert_eq!(record.population, None);
    assert_eq!(output.views.food_safety.rows[0].population_density, None);
}

#[test]
fn unknown_board_stays_in_output_as_unmapped() {
    let inspections = inspections_table(&[
        inspection_line(43, "Queens", "05/01/2023", "06C", "18", "Unknown"),
        inspection_line(44, "Queens", "05/02/2023", "06C", "18", "403"),
    ]);
    let population = population_table(&["Queens,3,Jackson Heights,2010,171576,2.8"]);
    let output = Engine::default().run(&inspections, &population).unwrap();

    assert_eq!(output.integrated.records.len(), 2);
    assert_eq!(output.integrated.records[0].key.district, District::Unmapped);
    assert_eq!(output.integrated.records[0].population, None);
    assert!(output.integrated.records[1].population.is_some());
    assert_eq!(output.keys.unmapped_boards.get("Unknown"), Some(&1));
}

#[test]
fn fixtures_run_end_to_end_with_consistent_report() {
    let inspections = load_table(
        &fixture_path("inspections_sample.csv"),
        &inspection_schema(),
        &LoadOptions::default(),
    )
    .unwrap();
    let population = load_table(
        &fixture_path("population_sample.csv"),
        &population_schema(),
        &LoadOptions::default(),
    )
    .unwrap();
    let output = Engine::new(DuplicatePolicy::KeepFirst)
        .run(&inspections, &population)
        .unwrap();
    let report = output.report(None);

    assert_eq!(report.inspections_load.rows_read, 9);
    assert_eq!(report.inspections_normalize.rows_out, 6);
    assert_eq!(report.join.input_rows, 6);
    assert_eq!(report.join.output_rows, 6);
    assert_eq!(report.join.unmapped, 1);
    assert_eq!(report.join.matched, 5);
    assert_eq!(report.keys.mapped, 5);
    assert_eq!(report.views.get(LocationIntelligence::NAME), Some(&4));
    assert_eq!(report.views.get(ViolationRisk::NAME), Some(&6));
    assert!(report.run_id.is_none());

    let dragon = output
        .views
        .location
        .rows
        .iter()
        .find(|row| row.restaurant_id == 50002)
        .unwrap();
    assert_eq!(dragon.inspection_count, 2);
    assert_eq!(dragon.latest_grade.as_deref(), Some("A"));
    assert_eq!(dragon.population_density, Some(163277.0 / 1.6));
}

#[test]
fn written_views_round_trip_through_parquet() {
    let workspace = TestWorkspace::new();
    let inspections = load_table(
        &fixture_path("inspections_sample.csv"),
        &inspection_schema(),
        &LoadOptions::default(),
    )
    .unwrap();
    let population = load_table(
        &fixture_path("population_sample.csv"),
        &population_schema(),
        &LoadOptions::default(),
    )
    .unwrap();
    let output = Engine::default().run(&inspections, &population).unwrap();

    let started = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    let context = RunContext::at(workspace.path().join("runs"), started, Uuid::new_v4());
    let report = output.report(Some(&context));
    let written = write_run(&context, &output.views.tables(), &[], &report).unwrap();

    assert!(written.run_dir.starts_with(workspace.path().join("runs")));
    assert!(
        written
            .run_dir
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("20240102_030405_"))
    );
    assert!(written.run_dir.join(REPORT_FILE).is_file());
    let report_json = std::fs::read_to_string(written.run_dir.join(REPORT_FILE)).unwrap();
    assert!(report_json.contains(&context.run_id));

    for table in output.views.tables() {
        let batch = read_parquet(&written.run_dir.join(format!("{}.parquet", table.name())));
        assert_eq!(batch.num_rows(), table.row_count());
        let expected = table.schema();
        assert_eq!(batch.schema().fields().len(), expected.fields().len());
        for (read, declared) in batch.schema().fields().iter().zip(expected.fields()) {
            assert_eq!(read.name(), declared.name());
            assert_eq!(read.data_type(), declared.data_type());
        }
    }

    let food_safety = read_parquet(
        &written
            .run_dir
            .join(format!("{}.parquet", FoodSafetyDemographics::NAME)),
    );
    let borough = food_safety
        .column_by_name("borough")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    let district = food_safety
        .column_by_name("community_district")
        .unwrap()
        .as_any()
        .downcast_ref::<UInt8Array>()
        .unwrap();
    let density = food_safety
        .column_by_name("population_density")
        .unwrap()
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    let brooklyn = (0..food_safety.num_rows())
        .find(|&idx| borough.value(idx) == "Brooklyn")
        .unwrap();
    assert_eq!(district.value(brooklyn), 1);
    assert!((density.value(brooklyn) - 173083.0 / 4.9).abs() < 1e-9);

    let cuisine = read_parquet(
        &written
            .run_dir
            .join(format!("{}.parquet", CuisineHygiene::NAME)),
    );
    assert_eq!(
        cuisine.schema().field_with_name("avg_score").unwrap().data_type(),
        &DataType::Float64
    );
}

use arrow::array::{Array, Float64Array, Int64Array, StringArray};
use chrono::NaiveDate;
use proptest::prelude::*;
use restaurant_pipeline::{
    integrate::{IntegratedRecord, integrate},
    normalize::{
        Borough, Grade, InspectionRecord, PopulationRecord, categorize, inspection::full_address,
    },
    reconcile::reconcile,
    views::{AnalyticalViews, ArrowTable, CuisineHygiene, FoodSafetyDemographics, ViolationRisk},
};

#[derive(Debug, Clone)]
struct Visit {
    restaurant_id: i64,
    borough: Borough,
    board: &'static str,
    date: (i32, u32, u32),
    code: Option<&'static str>,
    score: Option<i64>,
    grade: Option<Grade>,
    cuisine: Option<&'static str>,
}

fn inspection(record_id: u64, visit: &Visit) -> InspectionRecord {
    let (y, m, d) = visit.date;
    InspectionRecord {
        record_id,
        restaurant_id: visit.restaurant_id,
        name: Some(format!("Restaurant {}", visit.restaurant_id)),
        borough: visit.borough,
        building: None,
        street: None,
        zipcode: None,
        phone: None,
        cuisine: visit.cuisine.map(str::to_string),
        inspection_date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
        action: None,
        violation_code: visit.code.map(str::to_string),
        violation_description: None,
        critical: visit.code.is_some_and(|c| c.starts_with("04")),
        score: visit.score,
        grade: visit.grade,
        grade_date: None,
        record_date: None,
        community_board: Some(visit.board.to_string()),
        full_address: full_address(None, None, visit.borough, None),
        violation_category: visit.code.map(categorize),
    }
}

fn population(borough: Borough, district: u8, year: i32, people: i64, area: f64) -> PopulationRecord {
    PopulationRecord {
        record_id: year as u64,
        borough,
        district,
        district_name: Some(format!("{borough} {district}")),
        year,
        population: people,
        land_area: area,
        population_density: people as f64 / area,
        growth_rate: None,
    }
}

fn integrated(visits: &[Visit], population: &[PopulationRecord]) -> Vec<IntegratedRecord> {
    let inspections: Vec<InspectionRecord> = visits
        .iter()
        .enumerate()
        .map(|(idx, visit)| inspection(idx as u64 + 1, visit))
        .collect();
    let keys: Vec<_> = inspections
        .iter()
        .map(|i| reconcile(i.community_board.as_deref(), i.borough))
        .collect();
    integrate(&inspections, &keys, population).records
}

fn visit(restaurant_id: i64, date: (i32, u32, u32), code: Option<&'static str>) -> Visit {
    Visit {
        restaurant_id,
        borough: Borough::Brooklyn,
        board: "301",
        date,
        code,
        score: Some(10),
        grade: Some(Grade::A),
        cuisine: Some("Pizza"),
    }
}

#[test]
fn food_safety_groups_by_district_with_unmapped_row() {
    let visits = [
        visit(1, (2023, 1, 15), Some("04L")),
        visit(1, (2023, 1, 15), Some("10F")),
        visit(2, (2023, 2, 1), None),
        Visit {
            board: "Unknown",
            ..visit(3, (2023, 3, 1), Some("02B"))
        },
    ];
    let records = integrated(&visits, &[population(Borough::Brooklyn, 1, 2020, 100_000, 5.0)]);
    let view = FoodSafetyDemographics::build(&records);

    assert_eq!(view.rows.len(), 2);
    let unmapped = &view.rows[0];
    assert_eq!(unmapped.community_district, None);
    assert_eq!(unmapped.population, None);
    let mapped = &view.rows[1];
    assert_eq!(mapped.community_district, Some(1));
    assert_eq!(mapped.inspection_count, 3);
    assert_eq!(mapped.restaurant_count, 2);
    assert_eq!(mapped.violation_count, 2);
    assert_eq!(mapped.critical_count, 1);
    assert_eq!(mapped.population_density, Some(20_000.0));
}

#[test]
fn violation_risk_counts_only_earlier_visits() {
    let visits = [
        visit(7, (2023, 5, 1), Some("02B")),
        visit(7, (2022, 1, 1), Some("04L")),
        visit(7, (2023, 5, 1), Some("10F")),
        visit(7, (2022, 6, 1), None),
    ];
    let view = ViolationRisk::build(&integrated(&visits, &[]));
    let priors: Vec<(i64, i64, i64)> = view
        .rows
        .iter()
        .map(|r| {
            (
                r.prior_inspection_count,
                r.prior_violation_count,
                r.prior_critical_count,
            )
        })
        .collect();
    assert_eq!(priors, vec![(0, 0, 0), (1, 1, 1), (2, 1, 1), (2, 1, 1)]);
}

#[test]
fn cuisine_view_encodes_to_arrow() {
    let visits = [
        visit(1, (2023, 1, 15), Some("04L")),
        Visit {
            cuisine: None,
            score: None,
            ..visit(2, (2023, 1, 20), None)
        },
    ];
    let records = integrated(&visits, &[population(Borough::Brooklyn, 1, 2020, 100_000, 5.0)]);
    let view = CuisineHygiene::build(&records);
    let batch = view.to_record_batch().unwrap();
    assert_eq!(batch.num_rows(), 2);
    assert_eq!(batch.schema(), CuisineHygiene::arrow_schema());

    let cuisine = batch
        .column_by_name("cuisine")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(cuisine.value(0), "Pizza");
    let inspections = batch
        .column_by_name("inspection_count")
        .unwrap()
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    assert_eq!(inspections.value(0), 1);
    let avg_score = batch
        .column_by_name("avg_score")
        .unwrap()
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    assert!(avg_score.is_null(1));
}

#[test]
fn empty_input_builds_empty_views() {
    let views = AnalyticalViews::build_all(&[]);
    for table in views.tables() {
        assert_eq!(table.row_count(), 0);
        let batch = table.to_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.schema(), table.schema());
    }
}

const BOARDS: [&str; 5] = ["301", "302", "03", "Unknown", "CD 1"];
const CODES: [Option<&str>; 4] = [None, Some("04L"), Some("02B"), Some("10F")];
const CUISINES: [Option<&str>; 3] = [None, Some("Pizza"), Some("Thai")];
const GRADES: [Option<Grade>; 4] = [None, Some(Grade::A), Some(Grade::B), Some(Grade::NotYetGraded)];

fn visits_strategy() -> impl Strategy<Value = Vec<Visit>> {
    prop::collection::vec(
        (
            1i64..6,
            prop::sample::select(vec![Borough::Brooklyn, Borough::Queens]),
            0usize..BOARDS.len(),
            (2019i32..2024, 1u32..13, 1u32..29),
            0usize..CODES.len(),
            prop::option::of(0i64..60),
            0usize..GRADES.len(),
            0usize..CUISINES.len(),
        )
            .prop_map(|(restaurant_id, borough, board, date, code, score, grade, cuisine)| Visit {
                restaurant_id,
                borough,
                board: BOARDS[board],
                date,
                code: CODES[code],
                score,
                grade: GRADES[grade],
                cuisine: CUISINES[cuisine],
            }),
        0..40,
    )
}

fn population_fixture() -> Vec<PopulationRecord> {
    vec![
        population(Borough::Brooklyn, 1, 2010, 173_083, 4.9),
        population(Borough::Brooklyn, 1, 2020, 185_000, 4.9),
        population(Borough::Brooklyn, 2, 2010, 99_617, 2.9),
        population(Borough::Brooklyn, 3, 2020, 154_000, 2.9),
        population(Borough::Queens, 1, 2015, 191_000, 4.3),
        population(Borough::Queens, 3, 2010, 171_576, 2.8),
    ]
}

fn shuffled_case() -> impl Strategy<Value = (Vec<IntegratedRecord>, Vec<IntegratedRecord>)> {
    visits_strategy().prop_flat_map(|visits| {
        let records = integrated(&visits, &population_fixture());
        (Just(records.clone()), Just(records).prop_shuffle())
    })
}

proptest! {
    #[test]
    fn views_do_not_depend_on_input_order((records, shuffled) in shuffled_case()) {
        let original = AnalyticalViews::build_all(&records);
        let reordered = AnalyticalViews::build_all(&shuffled);
        prop_assert_eq!(original, reordered);
    }

    #[test]
    fn food_safety_counts_partition_the_input((records, _) in shuffled_case()) {
        let view = FoodSafetyDemographics::build(&records);
        let total: i64 = view.rows.iter().map(|r| r.inspection_count).sum();
        prop_assert_eq!(total, records.len() as i64);
        let risk = ViolationRisk::build(&records);
        prop_assert_eq!(risk.rows.len(), records.len());
    }
}

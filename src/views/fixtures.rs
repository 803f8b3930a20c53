use chrono::NaiveDate;

use crate::{
    integrate::{IntegratedRecord, PopulationMatch},
    normalize::{Borough, InspectionRecord, inspection::full_address},
    reconcile::CanonicalKey,
};

pub fn integrated(
    record_id: u64,
    restaurant_id: i64,
    borough: Borough,
    district: Option<u8>,
) -> IntegratedRecord {
    IntegratedRecord {
        inspection: InspectionRecord {
            record_id,
            restaurant_id,
            name: Some(format!("Restaurant {restaurant_id}")),
            borough,
            building: None,
            street: None,
            zipcode: None,
            phone: None,
            cuisine: None,
            inspection_date: NaiveDate::from_ymd_opt(2023, 1, 15).unwrap(),
            action: None,
            violation_code: None,
            violation_description: None,
            critical: false,
            score: None,
            grade: None,
            grade_date: None,
            record_date: None,
            community_board: district.map(|d| format!("{}{d:02}", borough.code())),
            full_address: full_address(None, None, borough, None),
            violation_category: None,
        },
        key: match district {
            Some(d) => CanonicalKey::new(borough, d),
            None => CanonicalKey::unmapped(borough),
        },
        population: None,
    }
}

pub fn with_population(mut record: IntegratedRecord, year: i32, population: i64) -> IntegratedRecord {
    record.population = Some(PopulationMatch {
        record_id: year as u64,
        district_name: Some("Test District".to_string()),
        year,
        population,
        land_area: 2.0,
        population_density: population as f64 / 2.0,
        growth_rate: None,
    });
    record
}

pub fn on(mut record: IntegratedRecord, year: i32, month: u32, day: u32) -> IntegratedRecord {
    record.inspection.inspection_date = NaiveDate::from_ymd_opt(year, month, day).unwrap();
    record
}

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ViolationCategory {
    FoodTemperature,
    FoodHandling,
    Pest,
    PersonalHygiene,
    Facility,
    Administrative,
    Other,
}

impl ViolationCategory {
    pub fn label(self) -> &'static str {
        match self {
            ViolationCategory::FoodTemperature => "Food Temperature",
            ViolationCategory::FoodHandling => "Food Source & Handling",
            ViolationCategory::Pest => "Pest",
            ViolationCategory::PersonalHygiene => "Personal Hygiene",
            ViolationCategory::Facility => "Facility",
            ViolationCategory::Administrative => "Administrative",
            ViolationCategory::Other => "Other",
        }
    }
}

impl fmt::Display for ViolationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Code prefix → category. Lookup picks the longest matching prefix, so
/// table order is irrelevant.
const PREFIX_TABLE: &[(&str, ViolationCategory)] = &[
    ("02", ViolationCategory::FoodTemperature),
    ("03", ViolationCategory::FoodHandling),
    ("04A", ViolationCategory::Administrative),
    ("04B", ViolationCategory::PersonalHygiene),
    ("04C", ViolationCategory::PersonalHygiene),
    ("04D", ViolationCategory::PersonalHygiene),
    ("04E", ViolationCategory::FoodHandling),
    ("04F", ViolationCategory::FoodHandling),
    ("04G", ViolationCategory::FoodHandling),
    ("04H", ViolationCategory::FoodHandling),
    ("04I", ViolationCategory::FoodHandling),
    ("04J", ViolationCategory::FoodTemperature),
    ("04K", ViolationCategory::Pest),
    ("04L", ViolationCategory::Pest),
    ("04M", ViolationCategory::Pest),
    ("04N", ViolationCategory::Pest),
    ("04O", ViolationCategory::Pest),
    ("05", ViolationCategory::Facility),
    ("06", ViolationCategory::PersonalHygiene),
    ("07", ViolationCategory::Administrative),
    ("08", ViolationCategory::Pest),
    ("09", ViolationCategory::FoodHandling),
    ("10", ViolationCategory::Facility),
    ("15", ViolationCategory::Administrative),
    ("16", ViolationCategory::Administrative),
    ("18", ViolationCategory::Administrative),
    ("19", ViolationCategory::Administrative),
    ("20", ViolationCategory::Administrative),
    ("22", ViolationCategory::Administrative),
    ("28", ViolationCategory::Administrative),
];

/// Buckets a violation code. Unknown codes land in `Other`; nothing is
/// ever rejected here.
pub fn categorize(code: &str) -> ViolationCategory {
    let code = code.trim().to_ascii_uppercase();
    PREFIX_TABLE
        .iter()
        .filter(|(prefix, _)| code.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, category)| *category)
        .unwrap_or(ViolationCategory::Other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_prefix_wins() {
        assert_eq!(categorize("04L"), ViolationCategory::Pest);
        assert_eq!(categorize("04a"), ViolationCategory::Administrative);
        assert_eq!(categorize("02B"), ViolationCategory::FoodTemperature);
        assert_eq!(categorize(" 10F "), ViolationCategory::Facility);
    }

    #[test]
    fn unknown_codes_fall_into_other() {
        assert_eq!(categorize("99Z"), ViolationCategory::Other);
        assert_eq!(categorize("04Z"), ViolationCategory::Other);
        assert_eq!(categorize(""), ViolationCategory::Other);
    }

    #[test]
    fn prefixes_are_unique() {
        for (idx, (prefix, _)) in PREFIX_TABLE.iter().enumerate() {
            assert!(
                PREFIX_TABLE[idx + 1..].iter().all(|(other, _)| other != prefix),
                "duplicate prefix {prefix}"
            );
        }
    }
}

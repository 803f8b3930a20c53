use std::{fmt, ops::RangeInclusive};

use serde::{Deserialize, Serialize};

use crate::transform::string_ops::{squish, uppercase};

/// The five boroughs, ordered by their city borough code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Borough {
    Manhattan,
    Bronx,
    Brooklyn,
    Queens,
    StatenIsland,
}

/// Spellings seen in the inspection and population exports, after
/// whitespace squishing and uppercasing.
const BOROUGH_ALIASES: &[(&str, Borough)] = &[
    ("MANHATTAN", Borough::Manhattan),
    ("NEW YORK", Borough::Manhattan),
    ("NEW YORK COUNTY", Borough::Manhattan),
    ("MN", Borough::Manhattan),
    ("MH", Borough::Manhattan),
    ("1", Borough::Manhattan),
    ("BRONX", Borough::Bronx),
    ("THE BRONX", Borough::Bronx),
    ("BRONX COUNTY", Borough::Bronx),
    ("BX", Borough::Bronx),
    ("2", Borough::Bronx),
    ("BROOKLYN", Borough::Brooklyn),
    ("KINGS", Borough::Brooklyn),
    ("KINGS COUNTY", Borough::Brooklyn),
    ("BK", Borough::Brooklyn),
    ("BKLYN", Borough::Brooklyn),
    ("3", Borough::Brooklyn),
    ("QUEENS", Borough::Queens),
    ("QUEENS COUNTY", Borough::Queens),
    ("QN", Borough::Queens),
    ("QNS", Borough::Queens),
    ("4", Borough::Queens),
    ("STATEN ISLAND", Borough::StatenIsland),
    ("STATEN IS", Borough::StatenIsland),
    ("RICHMOND", Borough::StatenIsland),
    ("RICHMOND COUNTY", Borough::StatenIsland),
    ("SI", Borough::StatenIsland),
    ("5", Borough::StatenIsland),
];

impl Borough {
    pub const ALL: [Borough; 5] = [
        Borough::Manhattan,
        Borough::Bronx,
        Borough::Brooklyn,
        Borough::Queens,
        Borough::StatenIsland,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Borough::Manhattan => "Manhattan",
            Borough::Bronx => "Bronx",
            Borough::Brooklyn => "Brooklyn",
            Borough::Queens => "Queens",
            Borough::StatenIsland => "Staten Island",
        }
    }

    /// City borough code, also the leading digit of community board codes.
    pub fn code(self) -> u8 {
        match self {
            Borough::Manhattan => 1,
            Borough::Bronx => 2,
            Borough::Brooklyn => 3,
            Borough::Queens => 4,
            Borough::StatenIsland => 5,
        }
    }

    /// Community districts that exist in the borough.
    pub fn district_range(self) -> RangeInclusive<u8> {
        match self {
            Borough::Manhattan => 1..=12,
            Borough::Bronx => 1..=12,
            Borough::Brooklyn => 1..=18,
            Borough::Queens => 1..=14,
            Borough::StatenIsland => 1..=3,
        }
    }

    /// Maps a raw borough string through the alias table.
    pub fn parse(raw: &str) -> Option<Borough> {
        let squished = squish(raw);
        let key = uppercase(&squished);
        BOROUGH_ALIASES
            .iter()
            .find(|(alias, _)| *alias == key.as_ref())
            .map(|(_, borough)| *borough)
    }
}

impl fmt::Display for Borough {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve_regardless_of_case_and_spacing() {
        assert_eq!(Borough::parse("bk"), Some(Borough::Brooklyn));
        assert_eq!(Borough::parse("Brooklyn "), Some(Borough::Brooklyn));
        assert_eq!(Borough::parse("  staten   island"), Some(Borough::StatenIsland));
        assert_eq!(Borough::parse("MANHATTAN"), Some(Borough::Manhattan));
        assert_eq!(Borough::parse("Kings"), Some(Borough::Brooklyn));
        assert_eq!(Borough::parse("0"), None);
        assert_eq!(Borough::parse("Jersey City"), None);
    }

    #[test]
    fn every_alias_maps_to_a_listed_borough() {
        for (alias, borough) in BOROUGH_ALIASES {
            assert_eq!(Borough::parse(alias), Some(*borough), "alias {alias}");
            assert!(Borough::ALL.contains(borough));
        }
    }

    #[test]
    fn codes_follow_borough_order() {
        let codes: Vec<u8> = Borough::ALL.into_iter().map(Borough::code).collect();
        assert_eq!(codes, vec![1, 2, 3, 4, 5]);
        assert!(Borough::Manhattan < Borough::StatenIsland);
    }

    #[test]
    fn display_uses_canonical_names() {
        assert_eq!(Borough::StatenIsland.to_string(), "Staten Island");
    }
}

//! Field normalization for both datasets. Every row that leaves this module
//! carries a canonical [`Borough`]; rows that can't be keyed are dropped and
//! counted with their reason.

pub mod borough;
pub mod inspection;
pub mod population;
pub mod violation;

pub use borough::Borough;
pub use inspection::{Grade, InspectionRecord, NormalizedInspections, normalize_inspections};
pub use population::{DuplicatePolicy, NormalizedPopulation, PopulationRecord, normalize_population};
pub use violation::{ViolationCategory, categorize};

use lazy_static::lazy_static;
use polars::prelude::{DataType, Field, Schema};

pub const AGE_CATEGORY: &str = "AgeCategory";
pub const SMOKER_STATUS: &str = "SmokerStatus";

/// Prefix shared by the binary clinical-history columns.
pub const CONDITION_PREFIX: &str = "Had";

lazy_static! {
    /// Conditions offered when the caller does not name any.
    pub static ref DEFAULT_CONDITIONS: Vec<&'static str> =
        vec!["HadHeartAttack", "HadStroke", "HadDiabetes"];
}

pub struct PatientRecord {}

impl PatientRecord {
    /// Dtype overrides applied when reading raw CSV files.
    ///
    /// Only the filter columns are pinned; everything else is inferred.
    pub fn raw_schema() -> Schema {
        Schema::from_iter(vec![
            Field::new(AGE_CATEGORY, DataType::Utf8),
            Field::new(SMOKER_STATUS, DataType::Utf8),
        ])
    }
}

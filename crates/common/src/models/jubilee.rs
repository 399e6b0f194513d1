//! Anniversary records for the year report

use serde::{Deserialize, Serialize};

use super::event::Reference;

/// A round-number anniversary resolved for a specific target year
///
/// `age` is the difference between the target year and the stored birth
/// year; records only exist for positive ages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JubileeRecord {
    pub title: String,
    /// Month of the MM-DD key when it parsed cleanly
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub age: i32,
    pub references: Vec<Reference>,
}

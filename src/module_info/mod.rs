//! Course-module metadata.
mod repository;

pub use repository::*;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Course module as saved on database.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModuleInfo {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub module_name: String,
    /// Duration, in weeks. Always positive.
    pub module_duration: i32,
    pub exam_type: String,
    pub version: i32,
}

impl ModuleInfo {
    /// Create a not-yet-persisted [`ModuleInfo`].
    pub fn new(module_name: String, module_duration: i32, exam_type: String) -> Self {
        Self {
            id: 0,
            created_at: DateTime::default(),
            updated_at: DateTime::default(),
            module_name,
            module_duration,
            exam_type,
            version: 0,
        }
    }
}

// src/models/weak_area.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Largest answer count a single update may report.
pub const MAX_BATCH_COUNT: i32 = 10_000;

/// Mastery state of a topic, ordered from worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeakAreaStatus {
    Critical,
    NeedsWork,
    Improving,
    Mastered,
}

impl WeakAreaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeakAreaStatus::Critical => "critical",
            WeakAreaStatus::NeedsWork => "needs_work",
            WeakAreaStatus::Improving => "improving",
            WeakAreaStatus::Mastered => "mastered",
        }
    }
}

impl fmt::Display for WeakAreaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeakAreaStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(WeakAreaStatus::Critical),
            "needs_work" => Ok(WeakAreaStatus::NeedsWork),
            "improving" => Ok(WeakAreaStatus::Improving),
            "mastered" => Ok(WeakAreaStatus::Mastered),
            other => Err(format!("unknown weak area status '{}'", other)),
        }
    }
}

/// Represents the 'weak_areas' table. Unique per (student, subject, topic).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeakArea {
    pub id: i64,
    pub student_id: i64,
    pub subject: String,
    pub topic: String,
    pub subtopics: Vec<String>,
    pub prerequisites: Vec<String>,
    pub wrong_answers_count: i32,
    pub total_attempts: i32,
    pub improvement_score: i32,
    pub status: WeakAreaStatus,
    pub attempt_history: Vec<i64>,
    pub last_attempted_at: chrono::DateTime<chrono::Utc>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// One batch of answers on a single topic.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = validate_counts))]
pub struct WeakAreaUpdate {
    #[validate(range(min = 1))]
    pub student_id: i64,
    #[validate(length(min = 1, max = 100))]
    pub subject: String,
    #[validate(length(min = 1, max = 100))]
    pub topic: String,
    pub wrong_count: i32,
    pub total_count: i32,
    #[serde(default)]
    pub subtopics: Vec<String>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    pub attempt_id: Option<i64>,
}

fn validate_counts(update: &WeakAreaUpdate) -> Result<(), validator::ValidationError> {
    if update.total_count < 1 {
        return Err(validator::ValidationError::new("total_count_must_be_positive"));
    }
    if update.total_count > MAX_BATCH_COUNT {
        return Err(validator::ValidationError::new("total_count_too_large"));
    }
    if update.wrong_count < 0 || update.wrong_count > update.total_count {
        return Err(validator::ValidationError::new("wrong_count_out_of_range"));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeakAreaListParams {
    pub student_id: Option<i64>,
    pub subject: Option<String>,
}

// src/models/syllabus.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SyllabusTopic {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SyllabusSubject {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 200), nested)]
    pub topics: Vec<SyllabusTopic>,
}

/// Represents the 'syllabi' table. One document per (year, semester, batch, section).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Syllabus {
    pub id: i64,
    pub year: i32,
    pub semester: i32,
    pub batch: String,
    pub section: String,
    pub subjects: Vec<SyllabusSubject>,
    pub updated_by: i64,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Identifies which cohort a syllabus belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Validate)]
pub struct SyllabusKey {
    #[validate(range(min = 1, max = 6))]
    pub year: i32,
    #[validate(range(min = 1, max = 2))]
    pub semester: i32,
    #[validate(length(min = 1, max = 20))]
    pub batch: String,
    #[validate(length(min = 1, max = 20))]
    pub section: String,
}

/// DTO for creating or replacing a syllabus.
#[derive(Debug, Deserialize, Validate)]
pub struct UpsertSyllabusRequest {
    #[validate(nested)]
    #[serde(flatten)]
    pub key: SyllabusKey,
    #[validate(length(min = 1, max = 30), nested)]
    pub subjects: Vec<SyllabusSubject>,
}

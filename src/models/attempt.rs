// src/models/attempt.rs

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::weak_area::WeakArea;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Pass,
    Fail,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Pass => "pass",
            AttemptStatus::Fail => "fail",
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pass" => Ok(AttemptStatus::Pass),
            "fail" => Ok(AttemptStatus::Fail),
            other => Err(format!("unknown attempt status '{}'", other)),
        }
    }
}

/// Outcome of one question within an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResult {
    pub index: usize,
    pub topic: String,
    pub subtopic: Option<String>,
    pub selected: Option<String>,
    pub correct_answer: String,
    pub is_correct: bool,
}

/// Represents the 'quiz_attempts' table. Rows are never updated once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttempt {
    pub id: i64,
    pub student_id: i64,
    pub quiz_id: i64,
    pub subject: String,
    pub results: Vec<QuestionResult>,
    pub score: i32,
    pub total_questions: i32,
    pub percentage: f64,
    pub status: AttemptStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Graded attempt ready to be persisted.
#[derive(Debug, Clone)]
pub struct NewQuizAttempt {
    pub student_id: i64,
    pub quiz_id: i64,
    pub subject: String,
    pub results: Vec<QuestionResult>,
    pub score: i32,
    pub total_questions: i32,
    pub percentage: f64,
    pub status: AttemptStatus,
}

/// DTO for submitting a quiz attempt.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAttemptRequest {
    #[validate(range(min = 1))]
    pub quiz_id: i64,

    /// Student's answers.
    /// Key: question index within the quiz.
    /// Value: the selected option.
    pub answers: HashMap<usize, String>,
}

/// Response after a submission: the stored attempt plus the topics it touched.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAttemptResponse {
    pub attempt: QuizAttempt,
    pub weak_areas: Vec<WeakArea>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptListParams {
    pub student_id: Option<i64>,
    pub limit: Option<i64>,
}

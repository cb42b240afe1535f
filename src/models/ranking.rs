// src/models/ranking.rs

use serde::{Deserialize, Serialize};

/// Mean percentage a student reached in one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectScore {
    pub subject: String,
    pub attempts: i32,
    pub average_score: f64,
}

/// Represents the 'student_rankings' table. Rebuilt wholesale by the ranking job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRanking {
    pub student_id: i64,
    pub username: String,
    pub batch: Option<String>,
    pub section: Option<String>,
    pub average_score: f64,
    pub total_quizzes: i32,
    pub passed_quizzes: i32,
    pub pass_rate: f64,
    pub subject_scores: Vec<SubjectScore>,
    pub overall_rank: i32,
    pub batch_rank: Option<i32>,
    pub class_rank: Option<i32>,
    pub calculated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingScope {
    #[default]
    Overall,
    Batch,
    Class,
}

/// Query parameters for the leaderboard.
#[derive(Debug, Deserialize)]
pub struct RankingListParams {
    #[serde(default)]
    pub scope: RankingScope,
    pub batch: Option<String>,
    pub section: Option<String>,
    pub limit: Option<i64>,
}

/// Summary returned by a recalculation run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalculationSummary {
    pub students_ranked: usize,
    pub attempts_considered: usize,
    pub calculated_at: chrono::DateTime<chrono::Utc>,
}

// src/models/learning_path.rs

use serde::{Deserialize, Serialize};

use crate::models::weak_area::WeakAreaStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    CriticalTopic,
    StrugglingSubject,
    NeedsWorkTopic,
    UnassessedTopic,
    Mastered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub priority: Priority,
    pub kind: RecommendationKind,
    pub subject: Option<String>,
    pub topics: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicState {
    pub topic: String,
    pub status: WeakAreaStatus,
    pub improvement_score: i32,
}

/// Aggregated performance in one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectPerformance {
    pub subject: String,
    pub attempts: i32,
    pub average_score: f64,
    pub passed: i32,
    pub pass_rate: f64,
    pub latest_score: Option<f64>,
    pub weak_topics: Vec<TopicState>,
    pub improving_topics: Vec<TopicState>,
    pub strong_topics: Vec<TopicState>,
    /// Syllabus coverage as (completed, total) topics, when a syllabus exists.
    pub syllabus_topics_completed: Option<i32>,
    pub syllabus_topics_total: Option<i32>,
}

/// Where the student sits on the leaderboard, if ranked yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankSnapshot {
    pub overall_rank: i32,
    pub batch_rank: Option<i32>,
    pub class_rank: Option<i32>,
    pub average_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningPath {
    pub student_id: i64,
    pub subjects: Vec<SubjectPerformance>,
    pub recommendations: Vec<Recommendation>,
    pub ranking: Option<RankSnapshot>,
    pub narrative: Option<String>,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningPathParams {
    pub student_id: Option<i64>,
    /// Set to false to skip the AI narrative.
    pub narrative: Option<bool>,
}

// src/store/mod.rs

//! Persistence boundary.
//!
//! Handlers and services only talk to [`Store`]. `PgStore` is the production
//! implementation; `MemoryStore` backs the integration tests and local demos.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::{
        attempt::{NewQuizAttempt, QuizAttempt},
        quiz::{NewQuiz, Quiz},
        ranking::StudentRanking,
        syllabus::{Syllabus, SyllabusKey, SyllabusSubject},
        user::{NewUser, User},
        weak_area::{WeakArea, WeakAreaUpdate},
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Consistent view of everything the ranking job reads.
#[derive(Debug, Clone, Default)]
pub struct RankingSnapshot {
    /// Approved students in ascending id order.
    pub students: Vec<User>,
    /// Every attempt by those students in ascending id order.
    pub attempts: Vec<QuizAttempt>,
}

/// Which slice of the leaderboard to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RankingFilter {
    Overall,
    Batch(String),
    Class { batch: String, section: String },
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Fails with `Conflict` when the username is taken.
    async fn create_user(&self, user: NewUser) -> Result<User, AppError>;
    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError>;
    async fn list_users(&self, pending_only: bool) -> Result<Vec<User>, AppError>;
    /// Returns `None` when no such user exists.
    async fn approve_user(&self, id: i64) -> Result<Option<User>, AppError>;

    async fn create_quiz(&self, quiz: NewQuiz) -> Result<Quiz, AppError>;
    async fn find_quiz(&self, id: i64) -> Result<Option<Quiz>, AppError>;

    /// Persists a graded attempt and folds its per-topic results into the
    /// student's weak areas, all or nothing.
    async fn record_attempt(
        &self,
        attempt: NewQuizAttempt,
    ) -> Result<(QuizAttempt, Vec<WeakArea>), AppError>;
    async fn find_attempt(&self, id: i64) -> Result<Option<QuizAttempt>, AppError>;
    /// Newest first. `None` lists every student's attempts.
    async fn list_attempts(
        &self,
        student_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<QuizAttempt>, AppError>;

    /// Find-or-create by (student, subject, topic) and apply the update.
    /// Concurrent updates to the same key are serialized.
    async fn record_weak_area(&self, update: &WeakAreaUpdate) -> Result<WeakArea, AppError>;
    async fn list_weak_areas(
        &self,
        student_id: i64,
        subject: Option<&str>,
    ) -> Result<Vec<WeakArea>, AppError>;

    async fn ranking_snapshot(&self) -> Result<RankingSnapshot, AppError>;
    /// Replaces every ranking row at once.
    async fn replace_rankings(&self, rankings: &[StudentRanking]) -> Result<(), AppError>;
    async fn list_rankings(
        &self,
        filter: &RankingFilter,
        limit: i64,
    ) -> Result<Vec<StudentRanking>, AppError>;
    async fn find_ranking(&self, student_id: i64) -> Result<Option<StudentRanking>, AppError>;

    async fn upsert_syllabus(
        &self,
        key: &SyllabusKey,
        subjects: &[SyllabusSubject],
        updated_by: i64,
    ) -> Result<Syllabus, AppError>;
    async fn find_syllabus(&self, key: &SyllabusKey) -> Result<Option<Syllabus>, AppError>;
}

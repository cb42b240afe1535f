// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder, types::Json};

use crate::{
    error::AppError,
    models::{
        attempt::{NewQuizAttempt, QuestionResult, QuizAttempt},
        quiz::{NewQuiz, Quiz, QuizQuestion},
        ranking::{StudentRanking, SubjectScore},
        syllabus::{Syllabus, SyllabusKey, SyllabusSubject},
        user::{NewUser, User},
        weak_area::{WeakArea, WeakAreaUpdate},
    },
    services::{grading::topic_updates, weak_area::apply_update},
    store::{RankingFilter, RankingSnapshot, Store},
};

const USER_COLUMNS: &str =
    "id, username, password, role, approved, batch, section, year, semester, created_at";
const QUIZ_COLUMNS: &str =
    "id, title, subject, topic, passing_percentage, created_by, ai_generated, questions, created_at";
const ATTEMPT_COLUMNS: &str = "id, student_id, quiz_id, subject, results, score, total_questions, percentage, status, created_at";
const WEAK_AREA_COLUMNS: &str = "id, student_id, subject, topic, subtopics, prerequisites, wrong_answers_count, total_attempts, improvement_score, status, attempt_history, last_attempted_at, created_at";
const RANKING_COLUMNS: &str = "student_id, username, batch, section, average_score, total_quizzes, passed_quizzes, pass_rate, subject_scores, overall_rank, batch_rank, class_rank, calculated_at";
const SYLLABUS_COLUMNS: &str = "id, year, semester, batch, section, subjects, updated_by, updated_at";

/// Keeps each multi-row insert well under the Postgres bind-parameter limit.
const RANKING_INSERT_CHUNK: usize = 1000;

#[derive(FromRow)]
struct UserRow {
    id: i64,
    username: String,
    password: String,
    role: String,
    approved: bool,
    batch: Option<String>,
    section: Option<String>,
    year: Option<i32>,
    semester: Option<i32>,
    created_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            username: row.username,
            password: row.password,
            role: row.role.parse().map_err(AppError::InternalServerError)?,
            approved: row.approved,
            batch: row.batch,
            section: row.section,
            year: row.year,
            semester: row.semester,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct QuizRow {
    id: i64,
    title: String,
    subject: String,
    topic: String,
    passing_percentage: f64,
    created_by: i64,
    ai_generated: bool,
    questions: Json<Vec<QuizQuestion>>,
    created_at: Option<DateTime<Utc>>,
}

impl From<QuizRow> for Quiz {
    fn from(row: QuizRow) -> Self {
        Quiz {
            id: row.id,
            title: row.title,
            subject: row.subject,
            topic: row.topic,
            passing_percentage: row.passing_percentage,
            created_by: row.created_by,
            ai_generated: row.ai_generated,
            questions: row.questions.0,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct AttemptRow {
    id: i64,
    student_id: i64,
    quiz_id: i64,
    subject: String,
    results: Json<Vec<QuestionResult>>,
    score: i32,
    total_questions: i32,
    percentage: f64,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AttemptRow> for QuizAttempt {
    type Error = AppError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        Ok(QuizAttempt {
            id: row.id,
            student_id: row.student_id,
            quiz_id: row.quiz_id,
            subject: row.subject,
            results: row.results.0,
            score: row.score,
            total_questions: row.total_questions,
            percentage: row.percentage,
            status: row.status.parse().map_err(AppError::InternalServerError)?,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct WeakAreaRow {
    id: i64,
    student_id: i64,
    subject: String,
    topic: String,
    subtopics: Vec<String>,
    prerequisites: Vec<String>,
    wrong_answers_count: i32,
    total_attempts: i32,
    improvement_score: i32,
    status: String,
    attempt_history: Vec<i64>,
    last_attempted_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TryFrom<WeakAreaRow> for WeakArea {
    type Error = AppError;

    fn try_from(row: WeakAreaRow) -> Result<Self, Self::Error> {
        Ok(WeakArea {
            id: row.id,
            student_id: row.student_id,
            subject: row.subject,
            topic: row.topic,
            subtopics: row.subtopics,
            prerequisites: row.prerequisites,
            wrong_answers_count: row.wrong_answers_count,
            total_attempts: row.total_attempts,
            improvement_score: row.improvement_score,
            status: row.status.parse().map_err(AppError::InternalServerError)?,
            attempt_history: row.attempt_history,
            last_attempted_at: row.last_attempted_at,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct RankingRow {
    student_id: i64,
    username: String,
    batch: Option<String>,
    section: Option<String>,
    average_score: f64,
    total_quizzes: i32,
    passed_quizzes: i32,
    pass_rate: f64,
    subject_scores: Json<Vec<SubjectScore>>,
    overall_rank: i32,
    batch_rank: Option<i32>,
    class_rank: Option<i32>,
    calculated_at: DateTime<Utc>,
}

impl From<RankingRow> for StudentRanking {
    fn from(row: RankingRow) -> Self {
        StudentRanking {
            student_id: row.student_id,
            username: row.username,
            batch: row.batch,
            section: row.section,
            average_score: row.average_score,
            total_quizzes: row.total_quizzes,
            passed_quizzes: row.passed_quizzes,
            pass_rate: row.pass_rate,
            subject_scores: row.subject_scores.0,
            overall_rank: row.overall_rank,
            batch_rank: row.batch_rank,
            class_rank: row.class_rank,
            calculated_at: row.calculated_at,
        }
    }
}

#[derive(FromRow)]
struct SyllabusRow {
    id: i64,
    year: i32,
    semester: i32,
    batch: String,
    section: String,
    subjects: Json<Vec<SyllabusSubject>>,
    updated_by: i64,
    updated_at: DateTime<Utc>,
}

impl From<SyllabusRow> for Syllabus {
    fn from(row: SyllabusRow) -> Self {
        Syllabus {
            id: row.id,
            year: row.year,
            semester: row.semester,
            batch: row.batch,
            section: row.section,
            subjects: row.subjects.0,
            updated_by: row.updated_by,
            updated_at: row.updated_at,
        }
    }
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn lock_weak_area(
    conn: &mut PgConnection,
    update: &WeakAreaUpdate,
) -> Result<Option<WeakArea>, AppError> {
    let row = sqlx::query_as::<_, WeakAreaRow>(&format!(
        "SELECT {WEAK_AREA_COLUMNS} FROM weak_areas
         WHERE student_id = $1 AND subject = $2 AND topic = $3
         FOR UPDATE"
    ))
    .bind(update.student_id)
    .bind(&update.subject)
    .bind(&update.topic)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(WeakArea::try_from).transpose()
}

async fn write_existing_weak_area(
    conn: &mut PgConnection,
    current: &WeakArea,
    update: &WeakAreaUpdate,
) -> Result<WeakArea, AppError> {
    let next = apply_update(Some(current), update, Utc::now())?;

    let row = sqlx::query_as::<_, WeakAreaRow>(&format!(
        "UPDATE weak_areas SET
            subtopics = $2, prerequisites = $3,
            wrong_answers_count = $4, total_attempts = $5,
            improvement_score = $6, status = $7,
            attempt_history = $8, last_attempted_at = $9
         WHERE id = $1
         RETURNING {WEAK_AREA_COLUMNS}"
    ))
    .bind(current.id)
    .bind(&next.subtopics)
    .bind(&next.prerequisites)
    .bind(next.wrong_answers_count)
    .bind(next.total_attempts)
    .bind(next.improvement_score)
    .bind(next.status.as_str())
    .bind(&next.attempt_history)
    .bind(next.last_attempted_at)
    .fetch_one(&mut *conn)
    .await?;

    WeakArea::try_from(row)
}

/// Read-modify-write of one weak area under a row lock. Must run inside a
/// transaction so the lock is held until commit.
async fn upsert_weak_area(
    conn: &mut PgConnection,
    update: &WeakAreaUpdate,
) -> Result<WeakArea, AppError> {
    if let Some(current) = lock_weak_area(conn, update).await? {
        return write_existing_weak_area(conn, &current, update).await;
    }

    let fresh = apply_update(None, update, Utc::now())?;
    let inserted = sqlx::query_as::<_, WeakAreaRow>(&format!(
        "INSERT INTO weak_areas
            (student_id, subject, topic, subtopics, prerequisites,
             wrong_answers_count, total_attempts, improvement_score, status,
             attempt_history, last_attempted_at, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
         ON CONFLICT (student_id, subject, topic) DO NOTHING
         RETURNING {WEAK_AREA_COLUMNS}"
    ))
    .bind(fresh.student_id)
    .bind(&fresh.subject)
    .bind(&fresh.topic)
    .bind(&fresh.subtopics)
    .bind(&fresh.prerequisites)
    .bind(fresh.wrong_answers_count)
    .bind(fresh.total_attempts)
    .bind(fresh.improvement_score)
    .bind(fresh.status.as_str())
    .bind(&fresh.attempt_history)
    .bind(fresh.last_attempted_at)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(row) = inserted {
        return WeakArea::try_from(row);
    }

    // Another transaction created the row first; fold into theirs.
    tracing::debug!(
        student_id = update.student_id,
        topic = %update.topic,
        "weak area insert raced, retrying as update"
    );
    let current = lock_weak_area(conn, update).await?.ok_or_else(|| {
        AppError::InternalServerError("weak area vanished during upsert".to_string())
    })?;
    write_existing_weak_area(conn, &current, update).await
}

fn map_unique_violation(err: sqlx::Error, message: String) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(message),
        _ => AppError::from(err),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (username, password, role, approved, batch, section, year, semester)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.approved)
        .bind(&user.batch)
        .bind(&user.section)
        .bind(user.year)
        .bind(user.semester)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, format!("Username '{}' already exists", user.username)))?;

        User::try_from(row)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn list_users(&self, pending_only: bool) -> Result<Vec<User>, AppError> {
        sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE ($1 = FALSE OR approved = FALSE)
             ORDER BY id DESC"
        ))
        .bind(pending_only)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(User::try_from)
        .collect()
    }

    async fn approve_user(&self, id: i64) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET approved = TRUE WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn create_quiz(&self, quiz: NewQuiz) -> Result<Quiz, AppError> {
        let row = sqlx::query_as::<_, QuizRow>(&format!(
            "INSERT INTO quizzes (title, subject, topic, passing_percentage, created_by, ai_generated, questions)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {QUIZ_COLUMNS}"
        ))
        .bind(&quiz.title)
        .bind(&quiz.subject)
        .bind(&quiz.topic)
        .bind(quiz.passing_percentage)
        .bind(quiz.created_by)
        .bind(quiz.ai_generated)
        .bind(Json(&quiz.questions))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create quiz: {:?}", e);
            AppError::from(e)
        })?;

        Ok(Quiz::from(row))
    }

    async fn find_quiz(&self, id: i64) -> Result<Option<Quiz>, AppError> {
        let row = sqlx::query_as::<_, QuizRow>(&format!(
            "SELECT {QUIZ_COLUMNS} FROM quizzes WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Quiz::from))
    }

    async fn record_attempt(
        &self,
        attempt: NewQuizAttempt,
    ) -> Result<(QuizAttempt, Vec<WeakArea>), AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "INSERT INTO quiz_attempts
                (student_id, quiz_id, subject, results, score, total_questions, percentage, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {ATTEMPT_COLUMNS}"
        ))
        .bind(attempt.student_id)
        .bind(attempt.quiz_id)
        .bind(&attempt.subject)
        .bind(Json(&attempt.results))
        .bind(attempt.score)
        .bind(attempt.total_questions)
        .bind(attempt.percentage)
        .bind(attempt.status.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert quiz attempt: {:?}", e);
            AppError::from(e)
        })?;
        let stored = QuizAttempt::try_from(row)?;

        let updates = topic_updates(stored.student_id, &stored.subject, &stored.results, stored.id);
        let mut areas = Vec::with_capacity(updates.len());
        for update in &updates {
            areas.push(upsert_weak_area(&mut *tx, update).await?);
        }

        tx.commit().await?;
        Ok((stored, areas))
    }

    async fn find_attempt(&self, id: i64) -> Result<Option<QuizAttempt>, AppError> {
        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(QuizAttempt::try_from).transpose()
    }

    async fn list_attempts(
        &self,
        student_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<QuizAttempt>, AppError> {
        sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts
             WHERE ($1::BIGINT IS NULL OR student_id = $1)
             ORDER BY created_at DESC, id DESC
             LIMIT $2"
        ))
        .bind(student_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(QuizAttempt::try_from)
        .collect()
    }

    async fn record_weak_area(&self, update: &WeakAreaUpdate) -> Result<WeakArea, AppError> {
        let mut tx = self.pool.begin().await?;
        let area = upsert_weak_area(&mut *tx, update).await?;
        tx.commit().await?;
        Ok(area)
    }

    async fn list_weak_areas(
        &self,
        student_id: i64,
        subject: Option<&str>,
    ) -> Result<Vec<WeakArea>, AppError> {
        sqlx::query_as::<_, WeakAreaRow>(&format!(
            "SELECT {WEAK_AREA_COLUMNS} FROM weak_areas
             WHERE student_id = $1 AND ($2::TEXT IS NULL OR subject = $2)
             ORDER BY improvement_score ASC, subject, topic"
        ))
        .bind(student_id)
        .bind(subject)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(WeakArea::try_from)
        .collect()
    }

    async fn ranking_snapshot(&self) -> Result<RankingSnapshot, AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let students = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE role = 'student' AND approved = TRUE
             ORDER BY id"
        ))
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(User::try_from)
        .collect::<Result<Vec<_>, _>>()?;

        let attempts = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts
             WHERE student_id IN (SELECT id FROM users WHERE role = 'student' AND approved = TRUE)
             ORDER BY id"
        ))
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(QuizAttempt::try_from)
        .collect::<Result<Vec<_>, _>>()?;

        tx.commit().await?;
        Ok(RankingSnapshot { students, attempts })
    }

    async fn replace_rankings(&self, rankings: &[StudentRanking]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM student_rankings")
            .execute(&mut *tx)
            .await?;

        for chunk in rankings.chunks(RANKING_INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO student_rankings ({RANKING_COLUMNS}) "
            ));
            builder.push_values(chunk, |mut b, r| {
                b.push_bind(r.student_id)
                    .push_bind(r.username.clone())
                    .push_bind(r.batch.clone())
                    .push_bind(r.section.clone())
                    .push_bind(r.average_score)
                    .push_bind(r.total_quizzes)
                    .push_bind(r.passed_quizzes)
                    .push_bind(r.pass_rate)
                    .push_bind(Json(r.subject_scores.clone()))
                    .push_bind(r.overall_rank)
                    .push_bind(r.batch_rank)
                    .push_bind(r.class_rank)
                    .push_bind(r.calculated_at);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_rankings(
        &self,
        filter: &RankingFilter,
        limit: i64,
    ) -> Result<Vec<StudentRanking>, AppError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {RANKING_COLUMNS} FROM student_rankings"));

        match filter {
            RankingFilter::Overall => {
                builder.push(" ORDER BY overall_rank");
            }
            RankingFilter::Batch(batch) => {
                builder.push(" WHERE batch = ");
                builder.push_bind(batch.clone());
                builder.push(" AND batch_rank IS NOT NULL ORDER BY batch_rank");
            }
            RankingFilter::Class { batch, section } => {
                builder.push(" WHERE batch = ");
                builder.push_bind(batch.clone());
                builder.push(" AND section = ");
                builder.push_bind(section.clone());
                builder.push(" AND class_rank IS NOT NULL ORDER BY class_rank");
            }
        }
        builder.push(" LIMIT ");
        builder.push_bind(limit);

        let rows: Vec<RankingRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(StudentRanking::from).collect())
    }

    async fn find_ranking(&self, student_id: i64) -> Result<Option<StudentRanking>, AppError> {
        let row = sqlx::query_as::<_, RankingRow>(&format!(
            "SELECT {RANKING_COLUMNS} FROM student_rankings WHERE student_id = $1"
        ))
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(StudentRanking::from))
    }

    async fn upsert_syllabus(
        &self,
        key: &SyllabusKey,
        subjects: &[SyllabusSubject],
        updated_by: i64,
    ) -> Result<Syllabus, AppError> {
        let row = sqlx::query_as::<_, SyllabusRow>(&format!(
            "INSERT INTO syllabi (year, semester, batch, section, subjects, updated_by)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (year, semester, batch, section) DO UPDATE SET
                subjects = EXCLUDED.subjects,
                updated_by = EXCLUDED.updated_by,
                updated_at = CURRENT_TIMESTAMP
             RETURNING {SYLLABUS_COLUMNS}"
        ))
        .bind(key.year)
        .bind(key.semester)
        .bind(&key.batch)
        .bind(&key.section)
        .bind(Json(subjects))
        .bind(updated_by)
        .fetch_one(&self.pool)
        .await?;

        Ok(Syllabus::from(row))
    }

    async fn find_syllabus(&self, key: &SyllabusKey) -> Result<Option<Syllabus>, AppError> {
        let row = sqlx::query_as::<_, SyllabusRow>(&format!(
            "SELECT {SYLLABUS_COLUMNS} FROM syllabi
             WHERE year = $1 AND semester = $2 AND batch = $3 AND section = $4"
        ))
        .bind(key.year)
        .bind(key.semester)
        .bind(&key.batch)
        .bind(&key.section)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Syllabus::from))
    }
}

// src/store/memory.rs

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::{
    error::AppError,
    models::{
        attempt::{NewQuizAttempt, QuizAttempt},
        quiz::{NewQuiz, Quiz},
        ranking::StudentRanking,
        syllabus::{Syllabus, SyllabusKey, SyllabusSubject},
        user::{NewUser, Role, User},
        weak_area::{WeakArea, WeakAreaUpdate},
    },
    services::{grading::topic_updates, weak_area::apply_update},
    store::{RankingFilter, RankingSnapshot, Store},
};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    quizzes: Vec<Quiz>,
    attempts: Vec<QuizAttempt>,
    weak_areas: Vec<WeakArea>,
    rankings: Vec<StudentRanking>,
    syllabi: Vec<Syllabus>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn upsert_weak_area(&mut self, update: &WeakAreaUpdate) -> Result<WeakArea, AppError> {
        let now = Utc::now();
        let position = self.weak_areas.iter().position(|a| {
            a.student_id == update.student_id && a.subject == update.subject && a.topic == update.topic
        });

        match position {
            Some(i) => {
                let next = apply_update(Some(&self.weak_areas[i]), update, now)?;
                self.weak_areas[i] = next.clone();
                Ok(next)
            }
            None => {
                let mut fresh = apply_update(None, update, now)?;
                fresh.id = self.next_id();
                self.weak_areas.push(fresh.clone());
                Ok(fresh)
            }
        }
    }
}

/// In-process store. A single lock serializes every write, which also
/// serializes concurrent updates to the same weak area.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let mut t = self.tables.lock().await;
        if t.users.iter().any(|u| u.username == user.username) {
            return Err(AppError::Conflict(format!(
                "Username '{}' already exists",
                user.username
            )));
        }
        let created = User {
            id: t.next_id(),
            username: user.username,
            password: user.password_hash,
            role: user.role,
            approved: user.approved,
            batch: user.batch,
            section: user.section,
            year: user.year,
            semester: user.semester,
            created_at: Some(Utc::now()),
        };
        t.users.push(created.clone());
        Ok(created)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.users.iter().find(|u| u.username == username).cloned())
    }

    async fn list_users(&self, pending_only: bool) -> Result<Vec<User>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.users
            .iter()
            .rev()
            .filter(|u| !pending_only || !u.approved)
            .cloned()
            .collect())
    }

    async fn approve_user(&self, id: i64) -> Result<Option<User>, AppError> {
        let mut t = self.tables.lock().await;
        Ok(t.users.iter_mut().find(|u| u.id == id).map(|u| {
            u.approved = true;
            u.clone()
        }))
    }

    async fn create_quiz(&self, quiz: NewQuiz) -> Result<Quiz, AppError> {
        let mut t = self.tables.lock().await;
        let created = Quiz {
            id: t.next_id(),
            title: quiz.title,
            subject: quiz.subject,
            topic: quiz.topic,
            passing_percentage: quiz.passing_percentage,
            created_by: quiz.created_by,
            ai_generated: quiz.ai_generated,
            questions: quiz.questions,
            created_at: Some(Utc::now()),
        };
        t.quizzes.push(created.clone());
        Ok(created)
    }

    async fn find_quiz(&self, id: i64) -> Result<Option<Quiz>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.quizzes.iter().find(|q| q.id == id).cloned())
    }

    async fn record_attempt(
        &self,
        attempt: NewQuizAttempt,
    ) -> Result<(QuizAttempt, Vec<WeakArea>), AppError> {
        let mut t = self.tables.lock().await;
        let stored = QuizAttempt {
            id: t.next_id(),
            student_id: attempt.student_id,
            quiz_id: attempt.quiz_id,
            subject: attempt.subject,
            results: attempt.results,
            score: attempt.score,
            total_questions: attempt.total_questions,
            percentage: attempt.percentage,
            status: attempt.status,
            created_at: Utc::now(),
        };

        // All or nothing: put the weak areas back if any update fails.
        let before = t.weak_areas.clone();
        let areas: Result<Vec<WeakArea>, AppError> =
            topic_updates(stored.student_id, &stored.subject, &stored.results, stored.id)
                .iter()
                .map(|update| t.upsert_weak_area(update))
                .collect();
        let areas = match areas {
            Ok(areas) => areas,
            Err(e) => {
                t.weak_areas = before;
                return Err(e);
            }
        };

        t.attempts.push(stored.clone());
        Ok((stored, areas))
    }

    async fn find_attempt(&self, id: i64) -> Result<Option<QuizAttempt>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.attempts.iter().find(|a| a.id == id).cloned())
    }

    async fn list_attempts(
        &self,
        student_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<QuizAttempt>, AppError> {
        let t = self.tables.lock().await;
        // Ids grow with insertion time, so reverse order is newest first.
        Ok(t.attempts
            .iter()
            .rev()
            .filter(|a| student_id.is_none_or(|id| a.student_id == id))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn record_weak_area(&self, update: &WeakAreaUpdate) -> Result<WeakArea, AppError> {
        let mut t = self.tables.lock().await;
        t.upsert_weak_area(update)
    }

    async fn list_weak_areas(
        &self,
        student_id: i64,
        subject: Option<&str>,
    ) -> Result<Vec<WeakArea>, AppError> {
        let t = self.tables.lock().await;
        let mut areas: Vec<WeakArea> = t
            .weak_areas
            .iter()
            .filter(|a| a.student_id == student_id)
            .filter(|a| subject.is_none_or(|s| a.subject == s))
            .cloned()
            .collect();
        areas.sort_by(|a, b| {
            a.improvement_score
                .cmp(&b.improvement_score)
                .then_with(|| a.subject.cmp(&b.subject))
                .then_with(|| a.topic.cmp(&b.topic))
        });
        Ok(areas)
    }

    async fn ranking_snapshot(&self) -> Result<RankingSnapshot, AppError> {
        let t = self.tables.lock().await;
        let students: Vec<User> = t
            .users
            .iter()
            .filter(|u| u.approved && u.role == Role::Student)
            .cloned()
            .collect();
        let attempts = t
            .attempts
            .iter()
            .filter(|a| students.iter().any(|s| s.id == a.student_id))
            .cloned()
            .collect();
        Ok(RankingSnapshot { students, attempts })
    }

    async fn replace_rankings(&self, rankings: &[StudentRanking]) -> Result<(), AppError> {
        let mut t = self.tables.lock().await;
        t.rankings = rankings.to_vec();
        Ok(())
    }

    async fn list_rankings(
        &self,
        filter: &RankingFilter,
        limit: i64,
    ) -> Result<Vec<StudentRanking>, AppError> {
        let t = self.tables.lock().await;
        let mut rows: Vec<(i32, StudentRanking)> = t
            .rankings
            .iter()
            .filter_map(|r| {
                let rank = match filter {
                    RankingFilter::Overall => Some(r.overall_rank),
                    RankingFilter::Batch(batch) => {
                        r.batch_rank.filter(|_| r.batch.as_ref() == Some(batch))
                    }
                    RankingFilter::Class { batch, section } => r.class_rank.filter(|_| {
                        r.batch.as_ref() == Some(batch) && r.section.as_ref() == Some(section)
                    }),
                };
                rank.map(|rank| (rank, r.clone()))
            })
            .collect();
        rows.sort_by_key(|(rank, _)| *rank);
        Ok(rows
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(_, r)| r)
            .collect())
    }

    async fn find_ranking(&self, student_id: i64) -> Result<Option<StudentRanking>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.rankings.iter().find(|r| r.student_id == student_id).cloned())
    }

    async fn upsert_syllabus(
        &self,
        key: &SyllabusKey,
        subjects: &[SyllabusSubject],
        updated_by: i64,
    ) -> Result<Syllabus, AppError> {
        let mut t = self.tables.lock().await;
        let now = Utc::now();
        let existing = t.syllabi.iter().position(|s| {
            s.year == key.year
                && s.semester == key.semester
                && s.batch == key.batch
                && s.section == key.section
        });

        let syllabus = match existing {
            Some(i) => {
                let s = &mut t.syllabi[i];
                s.subjects = subjects.to_vec();
                s.updated_by = updated_by;
                s.updated_at = now;
                s.clone()
            }
            None => {
                let created = Syllabus {
                    id: t.next_id(),
                    year: key.year,
                    semester: key.semester,
                    batch: key.batch.clone(),
                    section: key.section.clone(),
                    subjects: subjects.to_vec(),
                    updated_by,
                    updated_at: now,
                };
                t.syllabi.push(created.clone());
                created
            }
        };
        Ok(syllabus)
    }

    async fn find_syllabus(&self, key: &SyllabusKey) -> Result<Option<Syllabus>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.syllabi
            .iter()
            .find(|s| {
                s.year == key.year
                    && s.semester == key.semester
                    && s.batch == key.batch
                    && s.section == key.section
            })
            .cloned())
    }
}

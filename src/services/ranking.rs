// src/services/ranking.rs

//! Leaderboard recalculation.
//!
//! Rankings are rebuilt from scratch on every run: aggregate each approved
//! student's attempts, then assign positions overall, per batch and per class.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    error::AppError,
    models::{
        attempt::{AttemptStatus, QuizAttempt},
        ranking::{RecalculationSummary, StudentRanking, SubjectScore},
        user::User,
    },
    store::Store,
};

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn aggregate_student(student: &User, attempts: &[&QuizAttempt], now: DateTime<Utc>) -> StudentRanking {
    let total = attempts.len() as i32;
    let passed = attempts
        .iter()
        .filter(|a| a.status == AttemptStatus::Pass)
        .count() as i32;
    let sum: f64 = attempts.iter().map(|a| a.percentage).sum();

    let mut by_subject: BTreeMap<&str, (i32, f64)> = BTreeMap::new();
    for attempt in attempts {
        let entry = by_subject.entry(attempt.subject.as_str()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += attempt.percentage;
    }
    let subject_scores = by_subject
        .into_iter()
        .map(|(subject, (count, total))| SubjectScore {
            subject: subject.to_string(),
            attempts: count,
            average_score: round2(total / count as f64),
        })
        .collect();

    let (average_score, pass_rate) = if total == 0 {
        (0.0, 0.0)
    } else {
        (
            round2(sum / total as f64),
            round2(passed as f64 / total as f64 * 100.0),
        )
    };

    StudentRanking {
        student_id: student.id,
        username: student.username.clone(),
        batch: student.batch.clone(),
        section: student.section.clone(),
        average_score,
        total_quizzes: total,
        passed_quizzes: passed,
        pass_rate,
        subject_scores,
        overall_rank: 0,
        batch_rank: None,
        class_rank: None,
        calculated_at: now,
    }
}

/// Assigns 1-based positions by descending average score.
///
/// The sort is stable, so equal averages keep their incoming order. Partition
/// counters advance while walking the global order, which keeps every batch
/// and class ordering consistent with the overall one. Students without a
/// batch (or section) get no batch (or class) rank.
pub fn assign_ranks(rankings: &mut [StudentRanking]) {
    let mut order: Vec<usize> = (0..rankings.len()).collect();
    order.sort_by(|&a, &b| {
        rankings[b]
            .average_score
            .total_cmp(&rankings[a].average_score)
    });

    let mut batch_counters: HashMap<String, i32> = HashMap::new();
    let mut class_counters: HashMap<(String, String), i32> = HashMap::new();

    for (position, &i) in order.iter().enumerate() {
        let row = &mut rankings[i];
        row.overall_rank = position as i32 + 1;

        row.batch_rank = row.batch.as_ref().map(|batch| {
            let counter = batch_counters.entry(batch.clone()).or_insert(0);
            *counter += 1;
            *counter
        });

        row.class_rank = match (&row.batch, &row.section) {
            (Some(batch), Some(section)) => {
                let counter = class_counters
                    .entry((batch.clone(), section.clone()))
                    .or_insert(0);
                *counter += 1;
                Some(*counter)
            }
            _ => None,
        };
    }
}

/// Builds the full ranking table from a snapshot of students and attempts.
/// Students are expected in ascending id order; that order breaks ties.
pub fn compute_rankings(
    students: &[User],
    attempts: &[QuizAttempt],
    now: DateTime<Utc>,
) -> Vec<StudentRanking> {
    let mut by_student: HashMap<i64, Vec<&QuizAttempt>> = HashMap::new();
    for attempt in attempts {
        by_student.entry(attempt.student_id).or_default().push(attempt);
    }

    let mut rankings: Vec<StudentRanking> = students
        .iter()
        .map(|student| {
            let own = by_student.get(&student.id).map(Vec::as_slice).unwrap_or(&[]);
            aggregate_student(student, own, now)
        })
        .collect();

    assign_ranks(&mut rankings);
    rankings
}

/// Runs one recalculation. The lock keeps runs from overlapping inside this
/// process; the store reads a consistent snapshot and writes every row in one
/// transaction.
pub async fn recalculate(
    store: &dyn Store,
    lock: &Mutex<()>,
) -> Result<RecalculationSummary, AppError> {
    let _guard = lock.lock().await;
    let started = std::time::Instant::now();

    let snapshot = store.ranking_snapshot().await?;
    let now = Utc::now();
    let rankings = compute_rankings(&snapshot.students, &snapshot.attempts, now);
    store.replace_rankings(&rankings).await?;

    tracing::info!(
        students = rankings.len(),
        attempts = snapshot.attempts.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "rankings recalculated"
    );

    Ok(RecalculationSummary {
        students_ranked: rankings.len(),
        attempts_considered: snapshot.attempts.len(),
        calculated_at: now,
    })
}

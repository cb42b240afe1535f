// src/services/weak_area.rs

//! Per-topic mastery tracking.
//!
//! Each batch of answers on a topic moves the topic's improvement score
//! towards the batch accuracy with exponential smoothing, and the status is
//! derived from the resulting score.

use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::weak_area::{WeakArea, WeakAreaStatus, WeakAreaUpdate},
};

/// Weight of the newest batch in the smoothed score. Applied regardless of
/// how many answers the batch contains.
pub const SMOOTHING_ALPHA: f64 = 0.5;

pub const MASTERED_THRESHOLD: i32 = 80;
pub const IMPROVING_THRESHOLD: i32 = 60;
pub const NEEDS_WORK_THRESHOLD: i32 = 40;

/// Share of correct answers in a batch, as a percentage.
pub fn recent_accuracy(wrong_count: i32, total_count: i32) -> f64 {
    if total_count <= 0 {
        return 0.0;
    }
    let correct = (total_count - wrong_count).clamp(0, total_count);
    correct as f64 / total_count as f64 * 100.0
}

pub fn status_for_score(score: i32) -> WeakAreaStatus {
    if score >= MASTERED_THRESHOLD {
        WeakAreaStatus::Mastered
    } else if score >= IMPROVING_THRESHOLD {
        WeakAreaStatus::Improving
    } else if score >= NEEDS_WORK_THRESHOLD {
        WeakAreaStatus::NeedsWork
    } else {
        WeakAreaStatus::Critical
    }
}

fn smoothed_score(previous: i32, recent: f64) -> i32 {
    let blended = (1.0 - SMOOTHING_ALPHA) * previous as f64 + SMOOTHING_ALPHA * recent;
    (blended.round() as i32).clamp(0, 100)
}

fn merge_unique(into: &mut Vec<String>, extra: &[String]) {
    for item in extra {
        let item = item.trim();
        if !item.is_empty() && !into.iter().any(|existing| existing == item) {
            into.push(item.to_string());
        }
    }
}

fn add_count(current: i32, extra: i32, field: &str) -> Result<i32, AppError> {
    current
        .checked_add(extra)
        .ok_or_else(|| AppError::BadRequest(format!("{} would overflow", field)))
}

/// Folds one update into the existing record, or builds the first record for
/// the key. A freshly built record carries `id = 0` until the store assigns one.
///
/// The first record takes its status from the score thresholds like every
/// later one, so an all-correct first batch starts out mastered.
pub fn apply_update(
    existing: Option<&WeakArea>,
    update: &WeakAreaUpdate,
    now: DateTime<Utc>,
) -> Result<WeakArea, AppError> {
    let recent = recent_accuracy(update.wrong_count, update.total_count);

    let mut area = match existing {
        Some(current) => {
            let mut next = current.clone();
            next.wrong_answers_count =
                add_count(current.wrong_answers_count, update.wrong_count, "wrongAnswersCount")?;
            next.total_attempts =
                add_count(current.total_attempts, update.total_count, "totalAttempts")?;
            next.improvement_score = smoothed_score(current.improvement_score, recent);
            next
        }
        None => WeakArea {
            id: 0,
            student_id: update.student_id,
            subject: update.subject.clone(),
            topic: update.topic.clone(),
            subtopics: Vec::new(),
            prerequisites: Vec::new(),
            wrong_answers_count: update.wrong_count,
            total_attempts: update.total_count,
            improvement_score: (recent.round() as i32).clamp(0, 100),
            status: WeakAreaStatus::Critical,
            attempt_history: Vec::new(),
            last_attempted_at: now,
            created_at: now,
        },
    };

    area.status = status_for_score(area.improvement_score);
    merge_unique(&mut area.subtopics, &update.subtopics);
    merge_unique(&mut area.prerequisites, &update.prerequisites);
    if let Some(attempt_id) = update.attempt_id {
        if !area.attempt_history.contains(&attempt_id) {
            area.attempt_history.push(attempt_id);
        }
    }
    area.last_attempted_at = now;
    Ok(area)
}

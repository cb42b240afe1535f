// src/services/learning_path.rs

//! Learning-path composition.
//!
//! Everything here is rule-based except the optional narrative, which is
//! requested from the text generator after the recommendations are fixed.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};

use crate::{
    config::LEARNING_PATH_ATTEMPT_WINDOW,
    error::AppError,
    models::{
        attempt::{AttemptStatus, QuizAttempt},
        learning_path::{
            LearningPath, Priority, RankSnapshot, Recommendation, RecommendationKind,
            SubjectPerformance, TopicState,
        },
        ranking::StudentRanking,
        syllabus::{Syllabus, SyllabusKey},
        user::User,
        weak_area::{WeakArea, WeakAreaStatus},
    },
    services::ranking::round2,
    store::Store,
    utils::{html::clean_html, llm::TextGenerator},
};

/// A subject whose pass rate stays below this is flagged as struggling.
pub const STRUGGLING_PASS_RATE: f64 = 60.0;
pub const MIN_ATTEMPTS_FOR_STRUGGLING: i32 = 2;
pub const MAX_NEEDS_WORK_RECOMMENDATIONS: usize = 5;
pub const MAX_UNASSESSED_RECOMMENDATIONS: usize = 3;

const NARRATIVE_SYSTEM_PROMPT: &str = "You are a supportive study coach. \
Write a short, encouraging study plan (at most 150 words) for a student based on \
the performance summary you are given. Use plain sentences, no headings.";

#[derive(Default)]
struct SubjectAcc {
    attempts: i32,
    average: f64,
    passed: i32,
    latest: Option<f64>,
    weak: Vec<TopicState>,
    improving: Vec<TopicState>,
    strong: Vec<TopicState>,
    syllabus: Option<(i32, i32)>,
}

fn topic_state(area: &WeakArea) -> TopicState {
    TopicState {
        topic: area.topic.clone(),
        status: area.status,
        improvement_score: area.improvement_score,
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Builds the rule-based learning path.
///
/// `attempts` must be ordered newest first; the first attempt seen for a
/// subject provides its latest score.
pub fn compose(
    student_id: i64,
    attempts: &[QuizAttempt],
    weak_areas: &[WeakArea],
    syllabus: Option<&Syllabus>,
    ranking: Option<&StudentRanking>,
    now: DateTime<Utc>,
) -> LearningPath {
    let mut subjects: BTreeMap<String, SubjectAcc> = BTreeMap::new();

    for attempt in attempts {
        let acc = subjects.entry(attempt.subject.clone()).or_default();
        acc.attempts += 1;
        acc.average += (attempt.percentage - acc.average) / acc.attempts as f64;
        if attempt.status == AttemptStatus::Pass {
            acc.passed += 1;
        }
        acc.latest.get_or_insert(attempt.percentage);
    }

    for area in weak_areas {
        let acc = subjects.entry(area.subject.clone()).or_default();
        match area.status {
            WeakAreaStatus::Critical | WeakAreaStatus::NeedsWork => acc.weak.push(topic_state(area)),
            WeakAreaStatus::Improving => acc.improving.push(topic_state(area)),
            WeakAreaStatus::Mastered => acc.strong.push(topic_state(area)),
        }
    }

    if let Some(syllabus) = syllabus {
        for subject in &syllabus.subjects {
            let completed = subject.topics.iter().filter(|t| t.completed).count() as i32;
            let acc = subjects.entry(subject.name.clone()).or_default();
            acc.syllabus = Some((completed, subject.topics.len() as i32));
        }
    }

    let performances: Vec<SubjectPerformance> = subjects
        .into_iter()
        .map(|(subject, mut acc)| {
            acc.weak.sort_by_key(|t| t.improvement_score);
            let pass_rate = if acc.attempts == 0 {
                0.0
            } else {
                round2(acc.passed as f64 / acc.attempts as f64 * 100.0)
            };
            SubjectPerformance {
                subject,
                attempts: acc.attempts,
                average_score: round2(acc.average),
                passed: acc.passed,
                pass_rate,
                latest_score: acc.latest.map(round2),
                weak_topics: acc.weak,
                improving_topics: acc.improving,
                strong_topics: acc.strong,
                syllabus_topics_completed: acc.syllabus.map(|(done, _)| done),
                syllabus_topics_total: acc.syllabus.map(|(_, total)| total),
            }
        })
        .collect();

    let recommendations = recommend(&performances, attempts, weak_areas, syllabus);

    LearningPath {
        student_id,
        subjects: performances,
        recommendations,
        ranking: ranking.map(|r| RankSnapshot {
            overall_rank: r.overall_rank,
            batch_rank: r.batch_rank,
            class_rank: r.class_rank,
            average_score: r.average_score,
        }),
        narrative: None,
        generated_at: now,
    }
}

fn recommend(
    performances: &[SubjectPerformance],
    attempts: &[QuizAttempt],
    weak_areas: &[WeakArea],
    syllabus: Option<&Syllabus>,
) -> Vec<Recommendation> {
    let mut recs = Vec::new();

    for area in weak_areas.iter().filter(|a| a.status == WeakAreaStatus::Critical) {
        recs.push(Recommendation {
            priority: Priority::High,
            kind: RecommendationKind::CriticalTopic,
            subject: Some(area.subject.clone()),
            topics: vec![area.topic.clone()],
            message: format!(
                "{} in {} is critical (score {}/100). Review the fundamentals before moving on.",
                area.topic, area.subject, area.improvement_score
            ),
        });
    }

    for perf in performances
        .iter()
        .filter(|p| p.attempts >= MIN_ATTEMPTS_FOR_STRUGGLING && p.pass_rate < STRUGGLING_PASS_RATE)
    {
        recs.push(Recommendation {
            priority: Priority::High,
            kind: RecommendationKind::StrugglingSubject,
            subject: Some(perf.subject.clone()),
            topics: perf.weak_topics.iter().map(|t| t.topic.clone()).collect(),
            message: format!(
                "Only {:.0}% of your {} quizzes in {} were passed. Schedule focused practice.",
                perf.pass_rate, perf.attempts, perf.subject
            ),
        });
    }

    let mut needs_work: Vec<&WeakArea> = weak_areas
        .iter()
        .filter(|a| a.status == WeakAreaStatus::NeedsWork)
        .collect();
    needs_work.sort_by_key(|a| a.improvement_score);
    for area in needs_work.into_iter().take(MAX_NEEDS_WORK_RECOMMENDATIONS) {
        recs.push(Recommendation {
            priority: Priority::Medium,
            kind: RecommendationKind::NeedsWorkTopic,
            subject: Some(area.subject.clone()),
            topics: vec![area.topic.clone()],
            message: format!(
                "Keep practicing {} in {} (score {}/100).",
                area.topic, area.subject, area.improvement_score
            ),
        });
    }

    if let Some(syllabus) = syllabus {
        let mut assessed: HashSet<(String, String)> = weak_areas
            .iter()
            .map(|a| (normalize(&a.subject), normalize(&a.topic)))
            .collect();
        for attempt in attempts {
            for result in &attempt.results {
                assessed.insert((normalize(&attempt.subject), normalize(&result.topic)));
            }
        }

        let unassessed = syllabus.subjects.iter().flat_map(|subject| {
            subject
                .topics
                .iter()
                .filter(|t| t.completed)
                .map(move |t| (subject, t))
        });
        for (subject, topic) in unassessed
            .filter(|(s, t)| !assessed.contains(&(normalize(&s.name), normalize(&t.name))))
            .take(MAX_UNASSESSED_RECOMMENDATIONS)
        {
            recs.push(Recommendation {
                priority: Priority::Medium,
                kind: RecommendationKind::UnassessedTopic,
                subject: Some(subject.name.clone()),
                topics: vec![topic.name.clone()],
                message: format!(
                    "{} in {} was covered in class but you have not been quizzed on it yet.",
                    topic.name, subject.name
                ),
            });
        }
    }

    let mastered: Vec<String> = weak_areas
        .iter()
        .filter(|a| a.status == WeakAreaStatus::Mastered)
        .map(|a| a.topic.clone())
        .collect();
    if !mastered.is_empty() {
        recs.push(Recommendation {
            priority: Priority::Low,
            kind: RecommendationKind::Mastered,
            subject: None,
            message: format!("Great work! You have mastered: {}.", mastered.join(", ")),
            topics: mastered,
        });
    }

    // Stable, so each priority keeps the order rules were applied in.
    recs.sort_by_key(|r| r.priority);
    recs
}

/// Summarizes the computed path for the narrative prompt.
pub fn narrative_prompt(student: &User, path: &LearningPath) -> String {
    let mut prompt = format!("Student: {}\n", student.username);

    if let Some(rank) = &path.ranking {
        prompt.push_str(&format!(
            "Overall rank: {} (average {:.1}%)\n",
            rank.overall_rank, rank.average_score
        ));
    }

    prompt.push_str("Subjects:\n");
    for subject in &path.subjects {
        prompt.push_str(&format!(
            "- {}: {} attempts, average {:.1}%, pass rate {:.1}%",
            subject.subject, subject.attempts, subject.average_score, subject.pass_rate
        ));
        if !subject.weak_topics.is_empty() {
            let weak: Vec<&str> = subject.weak_topics.iter().map(|t| t.topic.as_str()).collect();
            prompt.push_str(&format!("; weak topics: {}", weak.join(", ")));
        }
        prompt.push('\n');
    }

    prompt.push_str("Recommendations:\n");
    for rec in &path.recommendations {
        prompt.push_str(&format!("- [{:?}] {}\n", rec.priority, rec.message));
    }
    prompt
}

/// Loads everything the composer needs and optionally asks the generator for
/// a narrative. Narrative failures never fail the request.
pub async fn build_learning_path(
    store: &dyn Store,
    generator: Option<&dyn TextGenerator>,
    student: &User,
    include_narrative: bool,
) -> Result<LearningPath, AppError> {
    let attempts = store
        .list_attempts(Some(student.id), LEARNING_PATH_ATTEMPT_WINDOW)
        .await?;
    let weak_areas = store.list_weak_areas(student.id, None).await?;
    let ranking = store.find_ranking(student.id).await?;

    let syllabus = match (student.year, student.semester, &student.batch, &student.section) {
        (Some(year), Some(semester), Some(batch), Some(section)) => {
            let key = SyllabusKey {
                year,
                semester,
                batch: batch.clone(),
                section: section.clone(),
            };
            store.find_syllabus(&key).await?
        }
        _ => None,
    };

    let mut path = compose(
        student.id,
        &attempts,
        &weak_areas,
        syllabus.as_ref(),
        ranking.as_ref(),
        Utc::now(),
    );

    if let (true, Some(generator)) = (include_narrative, generator) {
        let prompt = narrative_prompt(student, &path);
        match generator.complete(NARRATIVE_SYSTEM_PROMPT, &prompt).await {
            Ok(text) => {
                let cleaned = clean_html(text.trim());
                path.narrative = Some(cleaned).filter(|t| !t.is_empty());
            }
            Err(e) => {
                tracing::warn!(student_id = student.id, "learning path narrative skipped: {}", e);
            }
        }
    }

    Ok(path)
}

// src/services/quiz_generation.rs

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use validator::Validate;

use crate::{
    config::{MAX_GENERATED_QUESTIONS, PASSING_SCORE_PERCENTAGE},
    error::AppError,
    models::quiz::{GenerateQuizRequest, NewQuiz, QuizQuestion},
    utils::llm::{LlmError, TextGenerator},
};

const DEFAULT_QUESTION_COUNT: usize = 5;

const SYSTEM_PROMPT: &str = "You write multiple-choice quizzes for university students. \
Reply with JSON only: an array of objects with the keys \"prompt\", \"options\" \
(4 strings), \"answer\" (exactly one of the options), \"subtopic\" and \"explanation\".";

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("fenced json pattern is valid")
});

#[derive(Deserialize)]
#[serde(untagged)]
enum GeneratedPayload {
    List(Vec<QuizQuestion>),
    Wrapped { questions: Vec<QuizQuestion> },
}

pub fn user_prompt(req: &GenerateQuizRequest, count: usize) -> String {
    format!(
        "Subject: {}\nTopic: {}\nDifficulty: {}\nNumber of questions: {}",
        req.subject,
        req.topic,
        req.difficulty.as_deref().unwrap_or("medium"),
        count
    )
}

/// Strips markdown fences and surrounding chatter, leaving the JSON document.
fn extract_json(raw: &str) -> &str {
    if let Some(inner) = FENCED_JSON.captures(raw).and_then(|c| c.get(1)) {
        return inner.as_str();
    }
    let start = raw.find(['[', '{']);
    let end = raw.rfind([']', '}']);
    match (start, end) {
        (Some(s), Some(e)) if s < e => &raw[s..=e],
        _ => raw.trim(),
    }
}

/// Parses model output into questions scored against `topic`.
///
/// Malformed questions (bad lengths, answer not among the options) are
/// dropped; output with no usable question is an error.
pub fn parse_questions(raw: &str, topic: &str, limit: usize) -> Result<Vec<QuizQuestion>, LlmError> {
    let payload: GeneratedPayload = serde_json::from_str(extract_json(raw))?;
    let questions = match payload {
        GeneratedPayload::List(list) => list,
        GeneratedPayload::Wrapped { questions } => questions,
    };

    let received = questions.len();
    let usable: Vec<QuizQuestion> = questions
        .into_iter()
        .map(|mut q| {
            q.topic.get_or_insert_with(|| topic.to_string());
            q
        })
        .filter(|q| q.validate().is_ok() && q.options.contains(&q.answer))
        .take(limit)
        .collect();

    if usable.len() < received.min(limit) {
        tracing::warn!(
            received,
            kept = usable.len(),
            "dropped malformed generated questions"
        );
    }
    if usable.is_empty() {
        return Err(LlmError::InvalidOutput(
            "no valid questions in generated quiz".to_string(),
        ));
    }
    Ok(usable)
}

/// Asks the generator for a quiz and returns it ready for the store.
pub async fn generate_quiz(
    generator: &dyn TextGenerator,
    req: &GenerateQuizRequest,
    created_by: i64,
) -> Result<NewQuiz, AppError> {
    let count = req
        .question_count
        .unwrap_or(DEFAULT_QUESTION_COUNT)
        .clamp(1, MAX_GENERATED_QUESTIONS);

    let raw = generator.complete(SYSTEM_PROMPT, &user_prompt(req, count)).await?;
    let questions = parse_questions(&raw, &req.topic, count)?;

    tracing::info!(
        subject = %req.subject,
        topic = %req.topic,
        questions = questions.len(),
        "generated quiz"
    );

    Ok(NewQuiz {
        title: format!("{}: {}", req.subject, req.topic),
        subject: req.subject.clone(),
        topic: req.topic.clone(),
        passing_percentage: PASSING_SCORE_PERCENTAGE,
        created_by,
        ai_generated: true,
        questions,
    })
}

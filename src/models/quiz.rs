// src/models/quiz.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

/// A single question stored inside a quiz.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    #[validate(length(min = 1, max = 1000))]
    pub prompt: String,

    /// Answer options (e.g., ["Option A", "Option B"]).
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,

    /// The correct option, matched verbatim against the student's answer.
    #[validate(length(min = 1, max = 500))]
    pub answer: String,

    /// Topic this question assesses; falls back to the quiz topic.
    #[validate(length(min = 1, max = 100))]
    pub topic: Option<String>,

    #[validate(length(min = 1, max = 100))]
    pub subtopic: Option<String>,

    #[validate(length(max = 2000))]
    pub explanation: Option<String>,
}

/// Represents the 'quizzes' table in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: i64,
    pub title: String,
    pub subject: String,
    pub topic: String,
    pub passing_percentage: f64,
    pub created_by: i64,
    pub ai_generated: bool,
    pub questions: Vec<QuizQuestion>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Quiz {
    /// Topic a question is scored against.
    pub fn topic_of<'a>(&'a self, question: &'a QuizQuestion) -> &'a str {
        question.topic.as_deref().unwrap_or(&self.topic)
    }
}

/// Insert payload for the store.
#[derive(Debug, Clone)]
pub struct NewQuiz {
    pub title: String,
    pub subject: String,
    pub topic: String,
    pub passing_percentage: f64,
    pub created_by: i64,
    pub ai_generated: bool,
    pub questions: Vec<QuizQuestion>,
}

/// DTO for sending a question to the client (excludes answer and explanation).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub index: usize,
    pub prompt: String,
    pub options: Vec<String>,
    pub topic: String,
}

/// DTO for sending a quiz to whoever is about to take it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuiz {
    pub id: i64,
    pub title: String,
    pub subject: String,
    pub topic: String,
    pub passing_percentage: f64,
    pub ai_generated: bool,
    pub questions: Vec<PublicQuestion>,
}

impl From<&Quiz> for PublicQuiz {
    fn from(quiz: &Quiz) -> Self {
        let questions = quiz
            .questions
            .iter()
            .enumerate()
            .map(|(index, q)| PublicQuestion {
                index,
                prompt: q.prompt.clone(),
                options: q.options.clone(),
                topic: quiz.topic_of(q).to_string(),
            })
            .collect();

        Self {
            id: quiz.id,
            title: quiz.title.clone(),
            subject: quiz.subject.clone(),
            topic: quiz.topic.clone(),
            passing_percentage: quiz.passing_percentage,
            ai_generated: quiz.ai_generated,
            questions,
        }
    }
}

/// DTO for a professor authoring a quiz by hand.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 100))]
    pub subject: String,
    #[validate(length(min = 1, max = 100))]
    pub topic: String,
    #[validate(range(min = 0.0, max = 100.0))]
    pub passing_percentage: Option<f64>,
    #[validate(length(min = 1, max = 100), nested)]
    pub questions: Vec<QuizQuestion>,
}

/// DTO for asking the AI provider to write a quiz.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateQuizRequest {
    #[validate(length(min = 1, max = 100))]
    pub subject: String,
    #[validate(length(min = 1, max = 100))]
    pub topic: String,
    #[validate(range(min = 1, max = 20))]
    pub question_count: Option<usize>,
    #[validate(length(min = 1, max = 20))]
    pub difficulty: Option<String>,
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    if options.len() < 2 {
        return Err(validator::ValidationError::new("at_least_two_options"));
    }
    for opt in options {
        if opt.is_empty() || opt.len() > 500 {
            return Err(validator::ValidationError::new("invalid_option_length"));
        }
    }
    Ok(())
}

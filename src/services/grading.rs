// src/services/grading.rs

use std::collections::{BTreeMap, HashMap};

use crate::models::{
    attempt::{AttemptStatus, NewQuizAttempt, QuestionResult},
    quiz::Quiz,
    weak_area::WeakAreaUpdate,
};

/// Grades a submission against the quiz answer key.
/// Unanswered questions count as wrong; answers to unknown indexes are ignored.
pub fn grade_submission(
    quiz: &Quiz,
    student_id: i64,
    answers: &HashMap<usize, String>,
) -> NewQuizAttempt {
    let results: Vec<QuestionResult> = quiz
        .questions
        .iter()
        .enumerate()
        .map(|(index, question)| {
            let selected = answers.get(&index).cloned();
            // Strict string matching, like the answer key is written.
            let is_correct = selected.as_deref() == Some(question.answer.as_str());
            QuestionResult {
                index,
                topic: quiz.topic_of(question).to_string(),
                subtopic: question.subtopic.clone(),
                selected,
                correct_answer: question.answer.clone(),
                is_correct,
            }
        })
        .collect();

    let total_questions = results.len() as i32;
    let score = results.iter().filter(|r| r.is_correct).count() as i32;
    let percentage = if total_questions == 0 {
        0.0
    } else {
        score as f64 / total_questions as f64 * 100.0
    };
    let status = if percentage >= quiz.passing_percentage {
        AttemptStatus::Pass
    } else {
        AttemptStatus::Fail
    };

    NewQuizAttempt {
        student_id,
        quiz_id: quiz.id,
        subject: quiz.subject.clone(),
        results,
        score,
        total_questions,
        percentage,
        status,
    }
}

/// Splits graded results into one weak-area update per topic, in topic order.
pub fn topic_updates(
    student_id: i64,
    subject: &str,
    results: &[QuestionResult],
    attempt_id: i64,
) -> Vec<WeakAreaUpdate> {
    let mut by_topic: BTreeMap<&str, WeakAreaUpdate> = BTreeMap::new();

    for result in results {
        let entry = by_topic
            .entry(result.topic.as_str())
            .or_insert_with(|| WeakAreaUpdate {
                student_id,
                subject: subject.to_string(),
                topic: result.topic.clone(),
                wrong_count: 0,
                total_count: 0,
                subtopics: Vec::new(),
                prerequisites: Vec::new(),
                attempt_id: Some(attempt_id),
            });
        entry.total_count += 1;
        if !result.is_correct {
            entry.wrong_count += 1;
        }
        if let Some(sub) = &result.subtopic {
            if !entry.subtopics.contains(sub) {
                entry.subtopics.push(sub.clone());
            }
        }
    }

    by_topic.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quiz::QuizQuestion;

    fn question(answer: &str, topic: Option<&str>) -> QuizQuestion {
        QuizQuestion {
            prompt: "Pick one".to_string(),
            options: vec!["A".to_string(), "B".to_string(), "C".to_string()],
            answer: answer.to_string(),
            topic: topic.map(str::to_string),
            subtopic: None,
            explanation: None,
        }
    }

    fn quiz(questions: Vec<QuizQuestion>) -> Quiz {
        Quiz {
            id: 3,
            title: "Weekly check".to_string(),
            subject: "Databases".to_string(),
            topic: "SQL".to_string(),
            passing_percentage: 60.0,
            created_by: 1,
            ai_generated: false,
            questions,
            created_at: None,
        }
    }

    #[test]
    fn test_grade_pass_threshold() {
        let quiz = quiz(vec![
            question("A", None),
            question("A", None),
            question("A", None),
            question("B", None),
            question("B", None),
        ]);
        let mut answers = HashMap::new();
        answers.insert(0, "A".to_string());
        answers.insert(1, "A".to_string());
        answers.insert(2, "A".to_string());
        answers.insert(3, "C".to_string()); // Wrong
        // Question 4 left unanswered

        let graded = grade_submission(&quiz, 11, &answers);
        assert_eq!(graded.score, 3);
        assert_eq!(graded.total_questions, 5);
        assert_eq!(graded.percentage, 60.0);
        assert_eq!(graded.status, AttemptStatus::Pass);
        assert_eq!(graded.results[4].selected, None);
        assert!(!graded.results[4].is_correct);
    }

    #[test]
    fn test_grade_fail_and_ignores_unknown_indexes() {
        let quiz = quiz(vec![question("A", None), question("B", None)]);
        let mut answers = HashMap::new();
        answers.insert(0, "A".to_string());
        answers.insert(9, "A".to_string());

        let graded = grade_submission(&quiz, 11, &answers);
        assert_eq!(graded.score, 1);
        assert_eq!(graded.percentage, 50.0);
        assert_eq!(graded.status, AttemptStatus::Fail);
    }

    #[test]
    fn test_topic_updates_group_by_question_topic() {
        let quiz = quiz(vec![
            question("A", Some("Joins")),
            question("A", Some("Joins")),
            question("A", None),
            question("A", Some("Indexes")),
        ]);
        let mut answers = HashMap::new();
        answers.insert(0, "A".to_string());
        answers.insert(1, "B".to_string());
        answers.insert(2, "B".to_string());
        answers.insert(3, "A".to_string());

        let graded = grade_submission(&quiz, 11, &answers);
        let updates = topic_updates(11, &graded.subject, &graded.results, 42);

        let topics: Vec<(&str, i32, i32)> = updates
            .iter()
            .map(|u| (u.topic.as_str(), u.wrong_count, u.total_count))
            .collect();
        assert_eq!(topics, vec![("Indexes", 0, 1), ("Joins", 1, 2), ("SQL", 1, 1)]);
        assert!(updates.iter().all(|u| u.attempt_id == Some(42)));
        assert!(updates.iter().all(|u| u.subject == "Databases"));
    }
}

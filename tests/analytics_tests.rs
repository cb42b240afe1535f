// tests/analytics_tests.rs

mod common;

use common::{
    CannedGenerator, FailingGenerator, TestApp, create_quiz, register_and_approve,
    register_with_cohort, spawn_app, submit,
};
use serde_json::{Value, json};

async fn get_json(url: String, token: &str) -> (u16, Value) {
    let response = reqwest::Client::new()
        .get(&url)
        .bearer_auth(token)
        .send()
        .await
        .expect("Failed to execute request");
    let status = response.status().as_u16();
    let body = response.json().await.unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn attempts_feed_weak_areas_with_smoothing() {
    // Arrange
    let app = spawn_app().await;
    let (_, professor) = register_and_approve(&app, "prof_db", "professor", None).await;
    let (student_id, student) = register_and_approve(&app, "alice", "student", Some(("2023", "A"))).await;
    let quiz_id = create_quiz(&app, &professor, "Databases", "Joins", 5).await;

    // Students get the public view of the quiz
    let (status, quiz) = get_json(format!("{}/api/quizzes/{}", app.address, quiz_id), &student).await;
    assert_eq!(status, 200);
    assert_eq!(quiz["questions"].as_array().unwrap().len(), 5);
    assert!(quiz["questions"][0].get("answer").is_none());

    // Act: 2 of 5 right, then 4 of 5 right
    let first = submit(&app, &student, quiz_id, 2, 5).await;
    let second = submit(&app, &student, quiz_id, 4, 5).await;

    // Assert
    assert_eq!(first["attempt"]["percentage"], 40.0);
    assert_eq!(first["attempt"]["status"], "fail");
    assert_eq!(first["weakAreas"][0]["improvementScore"], 40);
    assert_eq!(first["weakAreas"][0]["status"], "needs_work");

    assert_eq!(second["attempt"]["status"], "pass");
    let area = &second["weakAreas"][0];
    assert_eq!(area["improvementScore"], 60);
    assert_eq!(area["status"], "improving");
    assert_eq!(area["wrongAnswersCount"], 4);
    assert_eq!(area["totalAttempts"], 10);
    assert_eq!(
        area["attemptHistory"],
        json!([first["attempt"]["id"], second["attempt"]["id"]])
    );

    let (status, areas) = get_json(format!("{}/api/weak-areas", app.address), &student).await;
    assert_eq!(status, 200);
    assert_eq!(areas.as_array().unwrap().len(), 1);
    assert_eq!(areas[0]["studentId"], student_id);

    // Newest attempt first
    let (status, attempts) = get_json(format!("{}/api/quiz-attempts", app.address), &student).await;
    assert_eq!(status, 200);
    assert_eq!(attempts[0]["percentage"], 80.0);
    assert_eq!(attempts[1]["percentage"], 40.0);
}

#[tokio::test]
async fn students_only_reach_their_own_records() {
    let app = spawn_app().await;
    let (_, professor) = register_and_approve(&app, "prof_own", "professor", None).await;
    let (alice_id, alice) = register_and_approve(&app, "alice", "student", Some(("2023", "A"))).await;
    let (bob_id, _) = register_and_approve(&app, "bob", "student", Some(("2023", "A"))).await;

    let (status, _) = get_json(
        format!("{}/api/weak-areas?studentId={}", app.address, bob_id),
        &alice,
    )
    .await;
    assert_eq!(status, 403);

    let (status, _) = get_json(
        format!("{}/api/learning-path?studentId={}", app.address, bob_id),
        &alice,
    )
    .await;
    assert_eq!(status, 403);

    // Staff must say which student they mean
    let (status, _) = get_json(format!("{}/api/weak-areas", app.address), &professor).await;
    assert_eq!(status, 400);

    let (status, _) = get_json(
        format!("{}/api/weak-areas?studentId={}", app.address, alice_id),
        &professor,
    )
    .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn weak_area_endpoint_validates_and_applies_updates() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let (alice_id, alice) = register_and_approve(&app, "alice", "student", Some(("2023", "A"))).await;
    let (bob_id, _) = register_and_approve(&app, "bob", "student", Some(("2023", "A"))).await;
    let url = format!("{}/api/weak-areas", app.address);

    let response = client
        .post(&url)
        .bearer_auth(&alice)
        .json(&json!({
            "studentId": alice_id,
            "subject": "Math",
            "topic": "Series",
            "wrongCount": 3,
            "totalCount": 5,
            "subtopics": ["Convergence", "Convergence"],
            "prerequisites": ["Limits"]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let area: Value = response.json().await.unwrap();
    assert_eq!(area["improvementScore"], 40);
    assert_eq!(area["status"], "needs_work");
    assert_eq!(area["subtopics"], json!(["Convergence"]));
    assert_eq!(area["prerequisites"], json!(["Limits"]));

    let invalid = [
        json!({ "studentId": alice_id, "subject": "Math", "topic": "Series", "wrongCount": 6, "totalCount": 5 }),
        json!({ "studentId": alice_id, "subject": "Math", "topic": "Series", "wrongCount": 0, "totalCount": 0 }),
        json!({ "studentId": alice_id, "subject": "", "topic": "Series", "wrongCount": 0, "totalCount": 1 }),
    ];
    for payload in invalid {
        let response = client.post(&url).bearer_auth(&alice).json(&payload).send().await.unwrap();
        assert_eq!(response.status().as_u16(), 400, "payload: {}", payload);
    }

    let response = client
        .post(&url)
        .bearer_auth(&alice)
        .json(&json!({ "studentId": bob_id, "subject": "Math", "topic": "Series", "wrongCount": 0, "totalCount": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn weak_area_counts_are_bounded() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let (alice_id, alice) = register_and_approve(&app, "alice", "student", Some(("2023", "A"))).await;
    let url = format!("{}/api/weak-areas", app.address);

    // Oversized batches are refused every time instead of accumulating.
    for _ in 0..2 {
        let response = client
            .post(&url)
            .bearer_auth(&alice)
            .json(&json!({
                "studentId": alice_id,
                "subject": "Math",
                "topic": "Series",
                "wrongCount": 0,
                "totalCount": i32::MAX
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
    }

    let response = client
        .post(&url)
        .bearer_auth(&alice)
        .json(&json!({
            "studentId": alice_id,
            "subject": "Math",
            "topic": "Series",
            "wrongCount": 0,
            "totalCount": 10_000
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let area: Value = response.json().await.unwrap();
    assert_eq!(area["totalAttempts"], 10_000);
    assert_eq!(area["status"], "mastered");
}

#[tokio::test]
async fn weak_area_history_only_takes_own_attempts() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let (_, professor) = register_and_approve(&app, "prof_hist", "professor", None).await;
    let (alice_id, alice) = register_and_approve(&app, "alice", "student", Some(("2023", "A"))).await;
    let (_, bob) = register_and_approve(&app, "bob", "student", Some(("2023", "A"))).await;
    let quiz_id = create_quiz(&app, &professor, "Math", "Series", 2).await;
    let alice_attempt = submit(&app, &alice, quiz_id, 1, 2).await["attempt"]["id"].clone();
    let bob_attempt = submit(&app, &bob, quiz_id, 1, 2).await["attempt"]["id"].clone();
    let url = format!("{}/api/weak-areas", app.address);

    let post = |attempt_id: Value| {
        client
            .post(&url)
            .bearer_auth(&alice)
            .json(&json!({
                "studentId": alice_id,
                "subject": "Math",
                "topic": "Series",
                "wrongCount": 0,
                "totalCount": 2,
                "attemptId": attempt_id
            }))
            .send()
    };

    assert_eq!(post(bob_attempt).await.unwrap().status().as_u16(), 400);
    assert_eq!(post(json!(999_999)).await.unwrap().status().as_u16(), 404);

    let response = post(alice_attempt.clone()).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let area: Value = response.json().await.unwrap();
    assert_eq!(area["attemptHistory"], json!([alice_attempt]));
}

#[tokio::test]
async fn rankings_recalculate_into_dense_partitions() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let admin = app.admin_token().await;
    let (_, professor) = register_and_approve(&app, "prof_rank", "professor", None).await;
    let (alice_id, alice) = register_and_approve(&app, "alice", "student", Some(("2023", "A"))).await;
    let (bob_id, bob) = register_and_approve(&app, "bob", "student", Some(("2023", "B"))).await;
    let (carol_id, _) = register_and_approve(&app, "carol", "student", Some(("2024", "A"))).await;
    let quiz_id = create_quiz(&app, &professor, "Databases", "Joins", 5).await;

    // Nothing calculated yet
    let (status, _) = get_json(format!("{}/api/rankings/me", app.address), &alice).await;
    assert_eq!(status, 404);

    submit(&app, &alice, quiz_id, 2, 5).await;
    submit(&app, &alice, quiz_id, 4, 5).await;
    submit(&app, &bob, quiz_id, 5, 5).await;

    // Act
    let response = client
        .post(&format!("{}/api/rankings", app.address))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let summary: Value = response.json().await.unwrap();
    assert_eq!(summary["studentsRanked"], 3);
    assert_eq!(summary["attemptsConsidered"], 3);

    // Assert: overall order by average
    let (_, overall) = get_json(format!("{}/api/rankings", app.address), &alice).await;
    let order: Vec<(i64, i64)> = overall
        .as_array()
        .unwrap()
        .iter()
        .map(|r| (r["studentId"].as_i64().unwrap(), r["overallRank"].as_i64().unwrap()))
        .collect();
    assert_eq!(order, vec![(bob_id, 1), (alice_id, 2), (carol_id, 3)]);
    assert_eq!(overall[1]["averageScore"], 60.0);
    assert_eq!(overall[2]["averageScore"], 0.0);

    let (_, batch) = get_json(
        format!("{}/api/rankings?scope=batch&batch=2023", app.address),
        &alice,
    )
    .await;
    let batch_ranks: Vec<i64> = batch
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["batchRank"].as_i64().unwrap())
        .collect();
    assert_eq!(batch_ranks, vec![1, 2]);

    let (status, _) = get_json(
        format!("{}/api/rankings?scope=class&batch=2023", app.address),
        &alice,
    )
    .await;
    assert_eq!(status, 400);

    let (_, mine) = get_json(format!("{}/api/rankings/me", app.address), &alice).await;
    assert_eq!(mine["overallRank"], 2);
    assert_eq!(mine["batchRank"], 2);
    assert_eq!(mine["classRank"], 1);
    assert_eq!(mine["passedQuizzes"], 1);
    assert_eq!(mine["passRate"], 50.0);

    // Recomputing without new attempts changes nothing
    client
        .post(&format!("{}/api/rankings", app.address))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let (_, again) = get_json(format!("{}/api/rankings", app.address), &alice).await;
    let again_order: Vec<(i64, i64)> = again
        .as_array()
        .unwrap()
        .iter()
        .map(|r| (r["studentId"].as_i64().unwrap(), r["overallRank"].as_i64().unwrap()))
        .collect();
    assert_eq!(again_order, order);
}

async fn student_with_critical_topic(app: &TestApp) -> String {
    let (_, professor) = register_and_approve(app, "prof_lp", "professor", None).await;
    let (_, student) = register_and_approve(app, "alice", "student", Some(("2023", "A"))).await;
    let quiz_id = create_quiz(app, &professor, "Databases", "Joins", 5).await;
    submit(app, &student, quiz_id, 0, 5).await;
    student
}

#[tokio::test]
async fn learning_path_prioritizes_critical_topics() {
    let app = spawn_app().await;
    let student = student_with_critical_topic(&app).await;

    let (status, path) = get_json(format!("{}/api/learning-path", app.address), &student).await;
    assert_eq!(status, 200);

    assert_eq!(path["recommendations"][0]["priority"], "high");
    assert_eq!(path["recommendations"][0]["kind"], "critical_topic");
    assert_eq!(path["recommendations"][0]["topics"], json!(["Joins"]));
    assert!(
        path["recommendations"]
            .as_array()
            .unwrap()
            .iter()
            .all(|r| r["kind"] != "mastered")
    );
    assert_eq!(path["subjects"][0]["subject"], "Databases");
    assert_eq!(path["subjects"][0]["weakTopics"][0]["status"], "critical");
    assert!(path["narrative"].is_null());
}

#[tokio::test]
async fn learning_path_survives_narrative_failure() {
    let app = TestApp::builder().generator(FailingGenerator).spawn().await;
    let student = student_with_critical_topic(&app).await;

    let (status, path) = get_json(format!("{}/api/learning-path", app.address), &student).await;
    assert_eq!(status, 200);
    assert!(path["narrative"].is_null());
    assert!(!path["recommendations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn learning_path_narrative_is_sanitized_and_optional() {
    let app = TestApp::builder()
        .generator(CannedGenerator(
            "<p>Start with joins.</p><script>alert(1)</script>".to_string(),
        ))
        .spawn()
        .await;
    let student = student_with_critical_topic(&app).await;

    let (_, path) = get_json(format!("{}/api/learning-path", app.address), &student).await;
    assert_eq!(path["narrative"], "<p>Start with joins.</p>");

    let (_, path) = get_json(
        format!("{}/api/learning-path?narrative=false", app.address),
        &student,
    )
    .await;
    assert!(path["narrative"].is_null());
}

#[tokio::test]
async fn syllabus_drives_unassessed_topic_recommendations() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let (_, professor) = register_and_approve(&app, "prof_syl", "professor", None).await;
    let (_, student) =
        register_with_cohort(&app, "alice", "student", Some(("2023", "A")), Some((2, 1))).await;

    let syllabus = json!({
        "year": 2,
        "semester": 1,
        "batch": "2023",
        "section": "A",
        "subjects": [{
            "name": "Databases",
            "topics": [
                { "name": "Joins", "completed": true },
                { "name": "Indexes", "completed": true },
                { "name": "Views", "completed": false }
            ]
        }]
    });

    // Students cannot edit the syllabus
    let response = client
        .put(&format!("{}/api/syllabus", app.address))
        .bearer_auth(&student)
        .json(&syllabus)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = client
        .put(&format!("{}/api/syllabus", app.address))
        .bearer_auth(&professor)
        .json(&syllabus)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let (status, stored) = get_json(
        format!("{}/api/syllabus?year=2&semester=1&batch=2023&section=A", app.address),
        &student,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(stored["subjects"][0]["topics"].as_array().unwrap().len(), 3);

    // The student is quizzed on joins only
    let quiz_id = create_quiz(&app, &professor, "Databases", "Joins", 5).await;
    submit(&app, &student, quiz_id, 5, 5).await;

    // Act
    let (_, path) = get_json(
        format!("{}/api/learning-path?narrative=false", app.address),
        &student,
    )
    .await;

    // Assert
    let unassessed: Vec<&Value> = path["recommendations"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|r| r["kind"] == "unassessed_topic")
        .collect();
    assert_eq!(unassessed.len(), 1);
    assert_eq!(unassessed[0]["topics"], json!(["Indexes"]));

    let databases = &path["subjects"][0];
    assert_eq!(databases["syllabusTopicsCompleted"], 2);
    assert_eq!(databases["syllabusTopicsTotal"], 3);

    let last = path["recommendations"].as_array().unwrap().last().unwrap();
    assert_eq!(last["kind"], "mastered");
    assert_eq!(last["priority"], "low");
}

#[tokio::test]
async fn generated_quizzes_are_stored_and_hidden_from_students() {
    let generated = r#"Sure! ```json
[
  {"prompt": "Which join keeps unmatched left rows?", "options": ["INNER", "LEFT"], "answer": "LEFT", "explanation": "LEFT JOIN keeps them."},
  {"prompt": "Broken", "options": ["A", "B"], "answer": "C"}
]
```"#;
    let app = TestApp::builder()
        .generator(CannedGenerator(generated.to_string()))
        .spawn()
        .await;
    let client = reqwest::Client::new();
    let (_, student) = register_and_approve(&app, "alice", "student", Some(("2023", "A"))).await;
    let (_, professor) = register_and_approve(&app, "prof_ai", "professor", None).await;

    let response = client
        .post(&format!("{}/api/quizzes/generate", app.address))
        .bearer_auth(&student)
        .json(&json!({ "subject": "Databases", "topic": "Joins", "questionCount": 3 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let quiz: Value = response.json().await.unwrap();
    assert_eq!(quiz["aiGenerated"], true);
    assert_eq!(quiz["questions"].as_array().unwrap().len(), 1);
    assert!(quiz["questions"][0].get("answer").is_none());
    assert_eq!(quiz["questions"][0]["topic"], "Joins");

    let (_, full) = get_json(
        format!("{}/api/quizzes/{}", app.address, quiz["id"]),
        &professor,
    )
    .await;
    assert_eq!(full["questions"][0]["answer"], "LEFT");
}

#[tokio::test]
async fn quiz_generation_without_provider_fails() {
    let app = spawn_app().await;
    let (_, student) = register_and_approve(&app, "alice", "student", Some(("2023", "A"))).await;

    let response = reqwest::Client::new()
        .post(&format!("{}/api/quizzes/generate", app.address))
        .bearer_auth(&student)
        .json(&json!({ "subject": "Databases", "topic": "Joins" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "AI provider request failed");
}

// tests/common/mod.rs

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use lms_backend::{
    config::{Config, LlmSettings, RateLimitBackend, RateLimitSettings},
    models::user::{NewUser, Role},
    routes,
    state::AppState,
    store::{MemoryStore, Store},
    utils::{
        hash::hash_password,
        llm::{LlmError, TextGenerator},
        rate_limit::MemoryRateLimiter,
    },
};
use serde_json::{Value, json};

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin-password";

/// Generator that always fails, like a provider outage.
pub struct FailingGenerator;

#[async_trait]
impl TextGenerator for FailingGenerator {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
        Err(LlmError::EmptyChoices)
    }
}

/// Generator that answers every prompt with the same text.
pub struct CannedGenerator(pub String);

#[async_trait]
impl TextGenerator for CannedGenerator {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
        Ok(self.0.clone())
    }
}

pub struct TestApp {
    pub address: String,
    pub store: Arc<MemoryStore>,
}

pub struct TestAppBuilder {
    capacity: f64,
    refill_per_sec: f64,
    trust_forwarded_for: bool,
    generator: Option<Arc<dyn TextGenerator>>,
}

impl TestApp {
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder {
            capacity: 10_000.0,
            refill_per_sec: 1_000.0,
            trust_forwarded_for: false,
            generator: None,
        }
    }

    pub async fn admin_token(&self) -> String {
        login(self, ADMIN_USERNAME, ADMIN_PASSWORD).await
    }
}

impl TestAppBuilder {
    pub fn rate_limit(mut self, capacity: f64, refill_per_sec: f64) -> Self {
        self.capacity = capacity;
        self.refill_per_sec = refill_per_sec;
        self
    }

    /// Key anonymous callers by `X-Forwarded-For`, as behind a proxy.
    pub fn trust_forwarded_for(mut self) -> Self {
        self.trust_forwarded_for = true;
        self
    }

    pub fn generator(mut self, generator: impl TextGenerator + 'static) -> Self {
        let generator: Arc<dyn TextGenerator> = Arc::new(generator);
        self.generator = Some(generator);
        self
    }

    /// Spawns the app on a random port, backed by the in-memory store.
    pub async fn spawn(self) -> TestApp {
        let config = Config {
            database_url: "postgres://unused".to_string(),
            jwt_secret: "test_secret_for_integration_tests".to_string(),
            jwt_expiration: 600, // 10 minutes for tests
            rust_log: "error".to_string(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            admin_username: Some(ADMIN_USERNAME.to_string()),
            admin_password: Some(ADMIN_PASSWORD.to_string()),
            cors_origins: vec!["http://localhost:5173".to_string()],
            rate_limit: RateLimitSettings {
                backend: RateLimitBackend::Memory,
                capacity: self.capacity,
                refill_per_sec: self.refill_per_sec,
                trust_forwarded_for: self.trust_forwarded_for,
            },
            llm: LlmSettings {
                api_key: None,
                model: "test-model".to_string(),
                api_endpoint: "http://127.0.0.1:9".to_string(),
                timeout_secs: 1,
                max_retries: 0,
            },
        };

        let store = Arc::new(MemoryStore::new());
        store
            .create_user(NewUser {
                username: ADMIN_USERNAME.to_string(),
                password_hash: hash_password(ADMIN_PASSWORD).expect("hash admin password"),
                role: Role::Admin,
                approved: true,
                batch: None,
                section: None,
                year: None,
                semester: None,
            })
            .await
            .expect("seed admin");

        let rate_limiter = Arc::new(MemoryRateLimiter::new(self.capacity, self.refill_per_sec));
        let state = AppState::new(store.clone(), config, rate_limiter, self.generator);
        let app = routes::create_router(state);

        // Bind to port 0 to get a random available port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind random port");
        let port = listener.local_addr().unwrap().port();

        // Spawn the server in the background
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        TestApp {
            address: format!("http://127.0.0.1:{}", port),
            store,
        }
    }
}

pub async fn spawn_app() -> TestApp {
    TestApp::builder().spawn().await
}

pub async fn login(app: &TestApp, username: &str, password: &str) -> String {
    let response = reqwest::Client::new()
        .post(&format!("{}/api/auth/login", app.address))
        .json(&json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200, "login failed for {}", username);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["type"], "Bearer");
    body["token"].as_str().unwrap().to_string()
}

/// Registers a user, approves it as the admin and logs in.
/// Returns (user id, token).
pub async fn register_and_approve(
    app: &TestApp,
    username: &str,
    role: &str,
    placement: Option<(&str, &str)>,
) -> (i64, String) {
    register_with_cohort(app, username, role, placement, None).await
}

/// Like [`register_and_approve`] but also sets (year, semester).
pub async fn register_with_cohort(
    app: &TestApp,
    username: &str,
    role: &str,
    placement: Option<(&str, &str)>,
    term: Option<(i32, i32)>,
) -> (i64, String) {
    let client = reqwest::Client::new();
    let mut payload = json!({ "username": username, "password": "password123", "role": role });
    if let Some((batch, section)) = placement {
        payload["batch"] = json!(batch);
        payload["section"] = json!(section);
    }
    if let Some((year, semester)) = term {
        payload["year"] = json!(year);
        payload["semester"] = json!(semester);
    }

    let response = client
        .post(&format!("{}/api/auth/register", app.address))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let user: Value = response.json().await.unwrap();
    let id = user["id"].as_i64().unwrap();

    let response = client
        .put(&format!("{}/api/admin/users/{}/approve", app.address, id))
        .bearer_auth(app.admin_token().await)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    (id, login(app, username, "password123").await)
}

/// A quiz whose every question has "right" as the correct option.
pub fn quiz_payload(subject: &str, topic: &str, questions: usize) -> Value {
    let questions: Vec<Value> = (0..questions)
        .map(|i| {
            json!({
                "prompt": format!("Question {}", i),
                "options": ["right", "wrong"],
                "answer": "right"
            })
        })
        .collect();

    json!({
        "title": format!("{} quiz", topic),
        "subject": subject,
        "topic": topic,
        "questions": questions
    })
}

/// Creates a quiz as `token` and returns its id.
pub async fn create_quiz(app: &TestApp, token: &str, subject: &str, topic: &str, questions: usize) -> i64 {
    let response = reqwest::Client::new()
        .post(&format!("{}/api/quizzes", app.address))
        .bearer_auth(token)
        .json(&quiz_payload(subject, topic, questions))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let quiz: Value = response.json().await.unwrap();
    quiz["id"].as_i64().unwrap()
}

/// Submits an attempt answering the first `correct` questions right and the
/// rest wrong. Returns the response body.
pub async fn submit(app: &TestApp, token: &str, quiz_id: i64, correct: usize, total: usize) -> Value {
    let answers: serde_json::Map<String, Value> = (0..total)
        .map(|i| {
            let choice = if i < correct { "right" } else { "wrong" };
            (i.to_string(), json!(choice))
        })
        .collect();

    let response = reqwest::Client::new()
        .post(&format!("{}/api/quiz-attempts", app.address))
        .bearer_auth(token)
        .json(&json!({ "quizId": quiz_id, "answers": answers }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    response.json().await.unwrap()
}

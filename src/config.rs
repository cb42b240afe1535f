// src/config.rs

use std::env;
use std::fmt;
use std::net::SocketAddr;

use dotenvy::dotenv;
use url::Url;

/// Default share of correct answers a quiz needs to count as passed.
pub const PASSING_SCORE_PERCENTAGE: f64 = 60.0;

/// Maximum number of questions a single AI-generated quiz may contain.
pub const MAX_GENERATED_QUESTIONS: usize = 20;

/// Number of recent attempts the learning-path composer looks at.
pub const LEARNING_PATH_ATTEMPT_WINDOW: i64 = 50;

/// Which backend holds rate-limit buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub backend: RateLimitBackend,
    /// Bucket size, i.e. the burst a caller may spend at once.
    pub capacity: f64,
    /// Tokens added back per second.
    pub refill_per_sec: f64,
    /// Key anonymous callers by `X-Forwarded-For`. Only safe behind a proxy
    /// that overwrites the header.
    pub trust_forwarded_for: bool,
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub api_endpoint: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl LlmSettings {
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub bind_addr: SocketAddr,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub cors_origins: Vec<String>,
    pub rate_limit: RateLimitSettings,
    pub llm: LlmSettings,
}

#[derive(Debug)]
pub struct ConfigError(String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?;

        let jwt_expiration = parsed("JWT_EXPIRATION")?.unwrap_or(60 * 60 * 24);

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let bind_addr = parsed("BIND_ADDR")?.unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

        let cors_origins = optional("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| {
                vec![
                    "http://localhost:5173".to_string(),
                    "http://127.0.0.1:5173".to_string(),
                ]
            });

        let backend = match optional("RATE_LIMIT_BACKEND").as_deref() {
            None | Some("memory") => RateLimitBackend::Memory,
            Some("postgres") => RateLimitBackend::Postgres,
            Some(other) => {
                return Err(ConfigError(format!(
                    "RATE_LIMIT_BACKEND must be 'memory' or 'postgres', got '{}'",
                    other
                )));
            }
        };

        let rate_limit = RateLimitSettings {
            backend,
            capacity: parsed("RATE_LIMIT_CAPACITY")?.unwrap_or(60.0),
            refill_per_sec: parsed("RATE_LIMIT_REFILL_PER_SEC")?.unwrap_or(1.0),
            trust_forwarded_for: parsed("RATE_LIMIT_TRUST_FORWARDED_FOR")?.unwrap_or(false),
        };
        if rate_limit.capacity < 1.0 || rate_limit.refill_per_sec <= 0.0 {
            return Err(ConfigError(
                "RATE_LIMIT_CAPACITY must be >= 1 and RATE_LIMIT_REFILL_PER_SEC > 0".to_string(),
            ));
        }

        let api_endpoint = optional("LLM_API_ENDPOINT")
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        if Url::parse(&api_endpoint).is_err() {
            return Err(ConfigError(format!(
                "LLM_API_ENDPOINT is not a valid URL: {}",
                api_endpoint
            )));
        }

        let llm = LlmSettings {
            api_key: optional("LLM_API_KEY"),
            model: optional("LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            api_endpoint,
            timeout_secs: parsed("LLM_TIMEOUT_SECS")?.unwrap_or(60),
            max_retries: parsed("LLM_MAX_RETRIES")?.unwrap_or(3),
        };

        Ok(Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            bind_addr,
            admin_username: optional("ADMIN_USERNAME"),
            admin_password: optional("ADMIN_PASSWORD"),
            cors_origins,
            rate_limit,
            llm,
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn required(key: &str) -> Result<String, ConfigError> {
    optional(key).ok_or_else(|| ConfigError(format!("{} must be set", key)))
}

fn parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match optional(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError(format!("{} has an invalid value: '{}'", key, raw))),
    }
}

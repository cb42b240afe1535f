// src/utils/rate_limit.rs

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::{config::RateLimitSettings, error::AppError, utils::jwt::Claims};

/// Outcome of spending one token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after_secs: u64 },
}

/// Token-bucket limiter keyed by caller identity.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, key: &str) -> Result<RateDecision, AppError>;
}

fn retry_after(tokens: f64, refill_per_sec: f64) -> u64 {
    ((1.0 - tokens).max(0.0) / refill_per_sec).ceil().max(1.0) as u64
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

/// Single-process limiter. Buckets live in memory and reset on restart.
pub struct MemoryRateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl MemoryRateLimiter {
    pub fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            refill_per_sec,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn take(&self, bucket: &mut Bucket, now: Instant) -> RateDecision {
        let elapsed = now.saturating_duration_since(bucket.refilled_at).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.refilled_at = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            RateDecision::Allowed
        } else {
            RateDecision::Limited {
                retry_after_secs: retry_after(bucket.tokens, self.refill_per_sec),
            }
        }
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn check(&self, key: &str) -> Result<RateDecision, AppError> {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;

        // Full buckets carry no information; drop them so the map stays small.
        if buckets.len() > 10_000 {
            let capacity = self.capacity;
            let rate = self.refill_per_sec;
            buckets.retain(|_, b| {
                b.tokens + now.saturating_duration_since(b.refilled_at).as_secs_f64() * rate < capacity
            });
        }

        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.capacity,
            refilled_at: now,
        });
        Ok(self.take(bucket, now))
    }
}

/// Limiter shared by every server instance through the `rate_limit_buckets`
/// table. Refill and consumption happen in one atomic upsert.
pub struct PgRateLimiter {
    pool: PgPool,
    capacity: f64,
    refill_per_sec: f64,
}

impl PgRateLimiter {
    pub fn new(pool: PgPool, capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            pool,
            capacity,
            refill_per_sec,
        }
    }
}

#[async_trait]
impl RateLimiter for PgRateLimiter {
    async fn check(&self, key: &str) -> Result<RateDecision, AppError> {
        let (tokens, allowed): (f64, bool) = sqlx::query_as(
            r#"
            WITH refreshed AS (
                SELECT LEAST(
                    $2,
                    COALESCE(
                        (SELECT tokens + EXTRACT(EPOCH FROM (clock_timestamp() - refilled_at))::DOUBLE PRECISION * $3
                         FROM rate_limit_buckets WHERE key = $1),
                        $2
                    )
                ) AS available
            )
            INSERT INTO rate_limit_buckets (key, tokens, last_allowed, refilled_at)
            SELECT $1,
                   CASE WHEN available >= 1 THEN available - 1 ELSE available END,
                   available >= 1,
                   clock_timestamp()
            FROM refreshed
            ON CONFLICT (key) DO UPDATE SET
                tokens = LEAST($2, rate_limit_buckets.tokens
                    + EXTRACT(EPOCH FROM (clock_timestamp() - rate_limit_buckets.refilled_at))::DOUBLE PRECISION * $3)
                    - CASE WHEN LEAST($2, rate_limit_buckets.tokens
                        + EXTRACT(EPOCH FROM (clock_timestamp() - rate_limit_buckets.refilled_at))::DOUBLE PRECISION * $3) >= 1
                      THEN 1 ELSE 0 END,
                last_allowed = LEAST($2, rate_limit_buckets.tokens
                    + EXTRACT(EPOCH FROM (clock_timestamp() - rate_limit_buckets.refilled_at))::DOUBLE PRECISION * $3) >= 1,
                refilled_at = clock_timestamp()
            RETURNING tokens::DOUBLE PRECISION, last_allowed
            "#,
        )
        .bind(key)
        .bind(self.capacity)
        .bind(self.refill_per_sec)
        .fetch_one(&self.pool)
        .await?;

        if allowed {
            Ok(RateDecision::Allowed)
        } else {
            Ok(RateDecision::Limited {
                retry_after_secs: retry_after(tokens, self.refill_per_sec),
            })
        }
    }
}

/// Builds the limiter selected by configuration.
pub fn build_rate_limiter(settings: &RateLimitSettings, pool: Option<&PgPool>) -> Arc<dyn RateLimiter> {
    use crate::config::RateLimitBackend;

    match (settings.backend, pool) {
        (RateLimitBackend::Postgres, Some(pool)) => Arc::new(PgRateLimiter::new(
            pool.clone(),
            settings.capacity,
            settings.refill_per_sec,
        )),
        (RateLimitBackend::Postgres, None) => {
            tracing::warn!("Postgres rate limiting requested without a pool, using in-memory buckets");
            Arc::new(MemoryRateLimiter::new(settings.capacity, settings.refill_per_sec))
        }
        (RateLimitBackend::Memory, _) => {
            Arc::new(MemoryRateLimiter::new(settings.capacity, settings.refill_per_sec))
        }
    }
}

/// State of the rate-limit middleware.
#[derive(Clone)]
pub struct RateLimitGuard {
    pub limiter: Arc<dyn RateLimiter>,
    pub trust_forwarded_for: bool,
}

/// Authenticated callers are limited per user, everyone else per client IP.
/// The socket address is used unless forwarded headers are trusted.
fn caller_key(req: &Request<Body>, trust_forwarded_for: bool) -> String {
    if let Some(claims) = req.extensions().get::<Claims>() {
        return format!("user:{}", claims.sub);
    }

    let forwarded = trust_forwarded_for
        .then(|| {
            req.headers()
                .get(HeaderName::from_static("x-forwarded-for"))
                .and_then(|v| v.to_str().ok())
                .and_then(|raw| raw.split(',').next())
                .map(|ip| ip.trim().to_string())
                .filter(|ip| !ip.is_empty())
        })
        .flatten();

    let ip = forwarded.or_else(|| {
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    });

    format!("ip:{}", ip.unwrap_or_else(|| "unknown".to_string()))
}

/// Axum Middleware: Rate limiting.
///
/// Spends one token for the caller; answers 429 with `Retry-After` when the
/// bucket is empty.
pub async fn rate_limit_middleware(
    State(guard): State<RateLimitGuard>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let key = caller_key(&req, guard.trust_forwarded_for);

    match guard.limiter.check(&key).await {
        Ok(RateDecision::Allowed) => next.run(req).await,
        Ok(RateDecision::Limited { retry_after_secs }) => {
            tracing::debug!(key = %key, retry_after_secs, "request rate limited");
            AppError::TooManyRequests(retry_after_secs).into_response()
        }
        Err(e) => {
            // Fail open when the limiter backend is unavailable.
            tracing::error!("Rate limiter check failed: {:?}", e);
            next.run(req).await
        }
    }
}

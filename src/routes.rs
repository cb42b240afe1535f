// src/routes.rs

use axum::{
    Router,
    extract::FromRef,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handlers::{admin, attempt, auth, learning_path, quiz, ranking, syllabus, weak_area},
    state::AppState,
    utils::{
        jwt::{admin_middleware, auth_middleware, staff_middleware},
        rate_limit::{RateLimitGuard, rate_limit_middleware},
    },
};

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Assembles the main application router.
///
/// * Public auth routes are rate limited per client IP.
/// * Every other route runs auth first, then the rate limiter keyed by user,
///   then any role check.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    let rate_limit =
        middleware::from_fn_with_state(RateLimitGuard::from_ref(&state), rate_limit_middleware);
    let authenticated = middleware::from_fn_with_state(state.config.clone(), auth_middleware);

    let auth_routes = Router::new()
        .route("/me", get(auth::me))
        .layer(rate_limit.clone())
        .layer(authenticated.clone())
        .merge(
            Router::new()
                .route("/register", post(auth::register))
                .route("/login", post(auth::login))
                .layer(rate_limit.clone()),
        );

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users))
        .route("/users/{id}/approve", put(admin::approve_user))
        // Auth first, then the limiter, then the admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(rate_limit.clone())
        .layer(authenticated.clone());

    let quiz_routes = Router::new()
        .route(
            "/",
            post(quiz::create_quiz).layer(middleware::from_fn(staff_middleware)),
        )
        .route("/generate", post(quiz::generate_quiz))
        .route("/{id}", get(quiz::get_quiz));

    let attempt_routes = Router::new().route(
        "/",
        get(attempt::list_attempts).post(attempt::submit_attempt),
    );

    let weak_area_routes = Router::new().route(
        "/",
        get(weak_area::list_weak_areas).post(weak_area::record_weak_area),
    );

    let ranking_routes = Router::new()
        .route(
            "/",
            get(ranking::list_rankings).merge(
                post(ranking::recalculate_rankings).layer(middleware::from_fn(admin_middleware)),
            ),
        )
        .route("/me", get(ranking::my_ranking));

    let learning_path_routes =
        Router::new().route("/", get(learning_path::get_learning_path));

    let syllabus_routes = Router::new().route(
        "/",
        get(syllabus::get_syllabus).merge(
            put(syllabus::upsert_syllabus).layer(middleware::from_fn(staff_middleware)),
        ),
    );

    let protected_routes = Router::new()
        .nest("/quizzes", quiz_routes)
        .nest("/quiz-attempts", attempt_routes)
        .nest("/weak-areas", weak_area_routes)
        .nest("/rankings", ranking_routes)
        .nest("/learning-path", learning_path_routes)
        .nest("/syllabus", syllabus_routes)
        .layer(rate_limit)
        .layer(authenticated);

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/admin", admin_routes)
        .nest("/api", protected_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

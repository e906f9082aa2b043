// src/routes.rs

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    handler::Handler,
    http::{HeaderValue, Method},
    middleware,
    routing::{delete, get, post},
};
use serde_json::{Value, json};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handlers::{attempts, auth, exam_types, questions, results, subjects, tests, uploads, users},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Nests one sub-router per resource under /api/v1.
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (pool, config, image manager).
///
/// Authentication is layered per sub-router; admin checks sit on the
/// individual write handlers because their paths are shared with
/// student-visible reads.
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_layer = middleware::from_fn_with_state(state.clone(), auth_middleware);

    let user_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        // Protected user routes
        .merge(
            Router::new()
                .route("/", get(users::list_users))
                .route(
                    "/{id}",
                    get(users::get_user).put(users::update_user).delete(
                        users::delete_user.layer(middleware::from_fn(admin_middleware)),
                    ),
                )
                .layer(auth_layer.clone()),
        );

    let exam_type_routes = Router::new()
        .route(
            "/",
            get(exam_types::list_exam_types).post(
                exam_types::create_exam_type.layer(middleware::from_fn(admin_middleware)),
            ),
        )
        .route(
            "/{id}",
            get(exam_types::get_exam_type)
                .put(exam_types::update_exam_type.layer(middleware::from_fn(admin_middleware)))
                .delete(
                    exam_types::delete_exam_type.layer(middleware::from_fn(admin_middleware)),
                ),
        )
        .layer(auth_layer.clone());

    let subject_routes = Router::new()
        .route(
            "/",
            get(subjects::list_subjects)
                .post(subjects::create_subject.layer(middleware::from_fn(admin_middleware))),
        )
        .route(
            "/{id}",
            get(subjects::get_subject)
                .put(subjects::update_subject.layer(middleware::from_fn(admin_middleware)))
                .delete(subjects::delete_subject.layer(middleware::from_fn(admin_middleware))),
        )
        .layer(auth_layer.clone());

    // Image endpoints have no student-visible methods on their paths, so the
    // whole group takes the auth + admin pair. The body limit sits above the
    // manager's own size check to cut oversized uploads off early; the slack
    // covers multipart framing.
    let question_image_routes = Router::new()
        .route(
            "/{id}/upload-question-image",
            post(questions::upload_question_image),
        )
        .route(
            "/{id}/upload-explanation-image",
            post(questions::upload_explanation_image),
        )
        .route(
            "/{id}/question-image",
            delete(questions::delete_question_image),
        )
        .route(
            "/{id}/explanation-image",
            delete(questions::delete_explanation_image),
        )
        .layer(DefaultBodyLimit::max(
            state.config.upload.max_bytes + 64 * 1024,
        ))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(auth_layer.clone());

    let question_routes = Router::new()
        .route(
            "/",
            get(questions::list_questions)
                .post(questions::create_question.layer(middleware::from_fn(admin_middleware))),
        )
        .route(
            "/bulk",
            post(questions::bulk_create_questions.layer(middleware::from_fn(admin_middleware))),
        )
        .route(
            "/{id}",
            get(questions::get_question)
                .put(questions::update_question.layer(middleware::from_fn(admin_middleware)))
                .delete(
                    questions::delete_question.layer(middleware::from_fn(admin_middleware)),
                ),
        )
        .layer(auth_layer.clone())
        .merge(question_image_routes);

    let test_routes = Router::new()
        .route(
            "/",
            get(tests::list_tests)
                .post(tests::create_test.layer(middleware::from_fn(admin_middleware))),
        )
        .route(
            "/{id}",
            get(tests::get_test)
                .put(tests::update_test.layer(middleware::from_fn(admin_middleware)))
                .delete(tests::delete_test.layer(middleware::from_fn(admin_middleware))),
        )
        .route("/{id}/with-questions", get(tests::get_test_with_questions))
        .layer(auth_layer.clone());

    let attempt_routes = Router::new()
        .route("/start", post(attempts::start_attempt))
        .route("/{id}/submit", post(attempts::submit_attempt))
        .route("/{id}", get(attempts::get_attempt))
        .route("/user/{user_id}", get(attempts::list_user_attempts))
        .layer(auth_layer.clone());

    let result_routes = Router::new()
        .route("/attempt/{attempt_id}", get(results::get_attempt_result))
        .route("/user/{user_id}", get(results::get_user_results))
        .route(
            "/test/{test_id}/analytics",
            get(results::get_test_analytics.layer(middleware::from_fn(admin_middleware))),
        )
        .layer(auth_layer.clone());

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        // Stored images are public; embedded <img> tags cannot send a token.
        .route("/uploads/{dir}/{filename}", get(uploads::serve_upload))
        .nest("/api/v1/users", user_routes)
        .nest("/api/v1/exam-types", exam_type_routes)
        .nest("/api/v1/subjects", subject_routes)
        .nest("/api/v1/questions", question_routes)
        .nest("/api/v1/tests", test_routes)
        .nest("/api/v1/attempts", attempt_routes)
        .nest("/api/v1/results", result_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "CBT Application Backend API" }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

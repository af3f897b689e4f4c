//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API and its OpenAPI documentation.

use crate::{
    handlers,
    models::{
        ErrorResponse, EvaluationPayload, EvaluationResponse, ExerciseResponse, ExercisesPayload,
        LessonPayload, LessonResponse, MessagePayload, ProgressPayload, ProgressResponse,
        PronunciationPayload, PronunciationResponse, ReplyResponse, StartSessionPayload,
        StatisticsResponse, TierDistributionResponse, TranslationPayload, TranslationResponse,
        TurnResponse, UpdateTierPayload, UserResponse, VocabularyItemResponse, VocabularyPayload,
    },
    state::AppState,
};

use axum::{
    Router,
    routing::{delete, get, patch, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::send_message,
        handlers::start_session,
        handlers::evaluate_response,
        handlers::evaluate_pronunciation,
        handlers::get_progress,
        handlers::record_progress,
        handlers::get_history,
        handlers::generate_lesson,
        handlers::generate_exercises,
        handlers::generate_vocabulary,
        handlers::translate,
        handlers::list_users,
        handlers::update_tier,
        handlers::delete_user,
        handlers::get_statistics,
    ),
    components(
        schemas(
            MessagePayload, StartSessionPayload, ReplyResponse, EvaluationPayload, EvaluationResponse,
            PronunciationPayload, PronunciationResponse, ProgressPayload, ProgressResponse, TurnResponse,
            LessonPayload, LessonResponse, ExercisesPayload, ExerciseResponse, VocabularyPayload,
            VocabularyItemResponse, TranslationPayload, TranslationResponse, UserResponse,
            UpdateTierPayload, StatisticsResponse, TierDistributionResponse, ErrorResponse
        )
    ),
    tags(
        (name = "Verba API", description = "English tutoring: conversation, practice, pronunciation and progress")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/messages", post(handlers::send_message))
        .route("/sessions", post(handlers::start_session))
        .route("/evaluations", post(handlers::evaluate_response))
        .route("/pronunciations", post(handlers::evaluate_pronunciation))
        .route(
            "/progress",
            get(handlers::get_progress).post(handlers::record_progress),
        )
        .route("/history", get(handlers::get_history))
        .route("/lessons", post(handlers::generate_lesson))
        .route("/exercises", post(handlers::generate_exercises))
        .route("/vocabulary", post(handlers::generate_vocabulary))
        .route("/translations", post(handlers::translate))
        .route("/users", get(handlers::list_users))
        .route("/users/{id}", delete(handlers::delete_user))
        .route("/users/{id}/tier", patch(handlers::update_tier))
        .route("/stats", get(handlers::get_statistics))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
        .layer(TraceLayer::new_for_http())
}

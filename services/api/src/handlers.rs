//! Axum Handlers for the REST API
//!
//! Learner-facing endpoints identify the caller through the `x-user-id` header
//! (the chat platform's user id) and register unknown callers on first contact,
//! using `x-display-name` when present. Administrative endpoints address
//! learners by their internal id.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use verba_core::{ProficiencyTier, ProgressDelta, ProgressReport, TutorError, User};

use crate::{
    models::{
        ErrorResponse, EvaluationPayload, EvaluationResponse, ExerciseResponse, ExercisesPayload,
        LessonPayload, LessonResponse, ListUsersQuery, MessagePayload, ProgressPayload,
        ProgressResponse, PronunciationPayload, PronunciationResponse, ReplyResponse,
        StartSessionPayload, StatisticsResponse, TranslationPayload, TranslationResponse,
        TurnResponse, UpdateTierPayload, UserResponse, VocabularyItemResponse, VocabularyPayload,
    },
    state::AppState,
};

const DEFAULT_DIFFICULTY: &str = "medium";
const DEFAULT_CATEGORY: &str = "general";
const DEFAULT_EXERCISE_COUNT: usize = 5;
const MAX_EXERCISE_COUNT: usize = 20;
const DEFAULT_VOCABULARY_ITEMS: usize = 10;
const MAX_VOCABULARY_ITEMS: usize = 50;
const DEFAULT_TARGET_LANGUAGE: &str = "pt-br";

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unprocessable(String),
    Unavailable(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::Unprocessable(message) => {
                (StatusCode::UNPROCESSABLE_ENTITY, Json(ErrorResponse { message })).into_response()
            }
            ApiError::Unavailable(message) => {
                (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl ApiError {
    fn from_tutor(err: TutorError) -> Self {
        match err {
            TutorError::NotRegistered(_) => ApiError::NotFound(err.user_message()),
            TutorError::InvalidTier(_) | TutorError::UnsupportedAudio(_) => {
                ApiError::BadRequest(err.user_message())
            }
            TutorError::InsufficientContext => ApiError::Unprocessable(err.user_message()),
            TutorError::NotSupported { .. }
            | TutorError::ProviderFailure(_)
            | TutorError::Store(_) => ApiError::InternalServerError(err.into()),
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        match err.into().downcast::<TutorError>() {
            Ok(tutor) => Self::from_tutor(tutor),
            Err(other) => Self::InternalServerError(other),
        }
    }
}

/// Resolves the calling learner, registering them on first contact.
async fn caller(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let external_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest("x-user-id header is required".to_string()))?;
    let display_name = headers
        .get("x-display-name")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(external_id);

    Ok(state.users.register_user(external_id, display_name).await?)
}

fn parse_tier(tier: &str) -> Result<ProficiencyTier, ApiError> {
    Ok(tier.parse::<ProficiencyTier>()?)
}

/// Send a free-text message to the tutor.
#[utoipa::path(
    post,
    path = "/messages",
    request_body = MessagePayload,
    responses(
        (status = 200, description = "The tutor's reply", body = ReplyResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "Chat platform id of the learner"),
        ("x-display-name" = Option<String>, Header, description = "Name used when registering the learner")
    )
)]
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<MessagePayload>,
) -> Result<Json<ReplyResponse>, ApiError> {
    if payload.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".to_string()));
    }
    let user = caller(&state, &headers).await?;
    let reply = state.conversation.process_message(user.id, &payload.text).await;
    Ok(Json(ReplyResponse { reply }))
}

/// Start a new practice session, discarding the previous conversation.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body = StartSessionPayload,
    responses(
        (status = 201, description = "Session started; the body holds the tutor's welcome", body = ReplyResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "Chat platform id of the learner"),
        ("x-display-name" = Option<String>, Header, description = "Name used when registering the learner")
    )
)]
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<StartSessionPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let user = caller(&state, &headers).await?;
    let reply = state
        .conversation
        .start_practice_session(user.id, payload.topic.as_deref())
        .await;
    Ok((StatusCode::CREATED, Json(ReplyResponse { reply })))
}

/// Evaluate an answer against an expected pattern or the tutor's last question.
#[utoipa::path(
    post,
    path = "/evaluations",
    request_body = EvaluationPayload,
    responses(
        (status = 200, description = "Structured evaluation", body = EvaluationResponse),
        (status = 422, description = "Nothing to grade the answer against", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "Chat platform id of the learner"),
        ("x-display-name" = Option<String>, Header, description = "Name used when registering the learner")
    )
)]
pub async fn evaluate_response(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<EvaluationPayload>,
) -> Result<Json<EvaluationResponse>, ApiError> {
    let user = caller(&state, &headers).await?;
    let evaluation = state
        .conversation
        .evaluate_user_response(user.id, &payload.response, payload.expected_pattern.as_deref())
        .await?;
    Ok(Json(evaluation.into()))
}

/// Transcribe a recording and score it against the expected text.
#[utoipa::path(
    post,
    path = "/pronunciations",
    request_body = PronunciationPayload,
    responses(
        (status = 200, description = "Transcription and score", body = PronunciationResponse),
        (status = 400, description = "Unsupported attachment", body = ErrorResponse),
        (status = 503, description = "No transcription provider configured", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "Chat platform id of the learner"),
        ("x-display-name" = Option<String>, Header, description = "Name used when registering the learner")
    )
)]
pub async fn evaluate_pronunciation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<PronunciationPayload>,
) -> Result<Json<PronunciationResponse>, ApiError> {
    let coach = state.pronunciation.as_ref().ok_or_else(|| {
        ApiError::Unavailable("Pronunciation practice is not configured.".to_string())
    })?;
    let user = caller(&state, &headers).await?;
    let report = coach
        .evaluate(user.id, &payload.audio_url, payload.expected_text.as_deref())
        .await?;
    Ok(Json(report.into()))
}

/// Show the caller's learning progress.
#[utoipa::path(
    get,
    path = "/progress",
    responses(
        (status = 200, description = "Progress report", body = ProgressResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "Chat platform id of the learner"),
        ("x-display-name" = Option<String>, Header, description = "Name used when registering the learner")
    )
)]
pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ProgressResponse>, ApiError> {
    let user = caller(&state, &headers).await?;
    let report = state.users.get_user_progress(user.id).await?;
    Ok(Json(report.into()))
}

/// Record progress for the caller, levelling them up when thresholds are met.
#[utoipa::path(
    post,
    path = "/progress",
    request_body = ProgressPayload,
    responses(
        (status = 200, description = "Updated progress report", body = ProgressResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "Chat platform id of the learner"),
        ("x-display-name" = Option<String>, Header, description = "Name used when registering the learner")
    )
)]
pub async fn record_progress(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ProgressPayload>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let user = caller(&state, &headers).await?;
    let delta = ProgressDelta::from(payload);
    let updated = state.users.update_user_progress(user.id, &delta).await?;
    Ok(Json(ProgressReport::from(&updated).into()))
}

/// The caller's stored conversation, oldest turn first.
#[utoipa::path(
    get,
    path = "/history",
    responses(
        (status = 200, description = "Conversation history", body = [TurnResponse]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "Chat platform id of the learner"),
        ("x-display-name" = Option<String>, Header, description = "Name used when registering the learner")
    )
)]
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<TurnResponse>>, ApiError> {
    let user = caller(&state, &headers).await?;
    let turns = state.users.get_conversation_history(user.id).await?;
    Ok(Json(turns.into_iter().map(TurnResponse::from).collect()))
}

/// Generate a lesson on a topic.
#[utoipa::path(
    post,
    path = "/lessons",
    request_body = LessonPayload,
    responses(
        (status = 200, description = "Generated lesson", body = LessonResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn generate_lesson(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LessonPayload>,
) -> Result<Json<LessonResponse>, ApiError> {
    let lesson = state
        .ai
        .generate_lesson_content(
            &payload.topic,
            payload.difficulty.as_deref().unwrap_or(DEFAULT_DIFFICULTY),
            payload.category.as_deref().unwrap_or(DEFAULT_CATEGORY),
        )
        .await?;
    Ok(Json(lesson.into()))
}

/// Generate exercises from lesson text.
#[utoipa::path(
    post,
    path = "/exercises",
    request_body = ExercisesPayload,
    responses(
        (status = 200, description = "Generated exercises", body = [ExerciseResponse]),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn generate_exercises(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExercisesPayload>,
) -> Result<Json<Vec<ExerciseResponse>>, ApiError> {
    let count = payload.count.unwrap_or(DEFAULT_EXERCISE_COUNT);
    if count == 0 || count > MAX_EXERCISE_COUNT {
        return Err(ApiError::BadRequest(format!(
            "count must be between 1 and {}",
            MAX_EXERCISE_COUNT
        )));
    }
    let exercises = state
        .ai
        .generate_exercises(
            &payload.lesson_content,
            count,
            payload.difficulty.as_deref().unwrap_or(DEFAULT_DIFFICULTY),
        )
        .await?;
    Ok(Json(exercises.into_iter().map(ExerciseResponse::from).collect()))
}

/// Extract study vocabulary from a text at the caller's level.
#[utoipa::path(
    post,
    path = "/vocabulary",
    request_body = VocabularyPayload,
    responses(
        (status = 200, description = "Vocabulary list", body = [VocabularyItemResponse]),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "Chat platform id of the learner"),
        ("x-display-name" = Option<String>, Header, description = "Name used when registering the learner")
    )
)]
pub async fn generate_vocabulary(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<VocabularyPayload>,
) -> Result<Json<Vec<VocabularyItemResponse>>, ApiError> {
    let max_items = payload.max_items.unwrap_or(DEFAULT_VOCABULARY_ITEMS);
    if max_items == 0 || max_items > MAX_VOCABULARY_ITEMS {
        return Err(ApiError::BadRequest(format!(
            "max_items must be between 1 and {}",
            MAX_VOCABULARY_ITEMS
        )));
    }
    let user = caller(&state, &headers).await?;
    let items = state
        .ai
        .generate_vocabulary_list(&payload.text, user.tier, max_items)
        .await?;
    Ok(Json(items.into_iter().map(VocabularyItemResponse::from).collect()))
}

/// Translate a text.
#[utoipa::path(
    post,
    path = "/translations",
    request_body = TranslationPayload,
    responses(
        (status = 200, description = "Translated text", body = TranslationResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn translate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TranslationPayload>,
) -> Result<Json<TranslationResponse>, ApiError> {
    let target = payload
        .target_language
        .as_deref()
        .unwrap_or(DEFAULT_TARGET_LANGUAGE);
    let translation = state.ai.translate_text(&payload.text, target).await?;
    Ok(Json(TranslationResponse { translation }))
}

/// List learners, optionally filtered by tier.
#[utoipa::path(
    get,
    path = "/users",
    responses(
        (status = 200, description = "Learners", body = [UserResponse]),
        (status = 400, description = "Unknown tier", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(ListUsersQuery)
)]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let tier = query.tier.as_deref().map(parse_tier).transpose()?;
    let users = state.users.list_users(tier).await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// Override a learner's tier.
#[utoipa::path(
    patch,
    path = "/users/{id}/tier",
    request_body = UpdateTierPayload,
    responses(
        (status = 200, description = "Tier updated", body = UserResponse),
        (status = 400, description = "Unknown tier", body = ErrorResponse),
        (status = 404, description = "Learner not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Internal learner id")
    )
)]
pub async fn update_tier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTierPayload>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.users.update_user_tier(id, &payload.tier).await?;
    Ok(Json(user.into()))
}

/// Delete a learner and their history.
#[utoipa::path(
    delete,
    path = "/users/{id}",
    responses(
        (status = 204, description = "Learner deleted"),
        (status = 404, description = "Learner not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Internal learner id")
    )
)]
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.users.delete_user(id).await? {
        info!(user_id = %id, "Learner removed through the API");
        Ok(StatusCode::NO_CONTENT)
    } else {
        warn!(user_id = %id, "Delete requested for unknown learner");
        Err(ApiError::NotFound(format!("User with id '{}' not found", id)))
    }
}

/// Aggregate statistics over all learners.
#[utoipa::path(
    get,
    path = "/stats",
    responses(
        (status = 200, description = "Statistics", body = StatisticsResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn get_statistics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatisticsResponse>, ApiError> {
    let stats = state.users.statistics().await?;
    Ok(Json(stats.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tutor_errors_map_to_status_codes() {
        let status = |err: TutorError| ApiError::from(err).into_response().status();

        assert_eq!(status(TutorError::NotRegistered("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(TutorError::InvalidTier("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(TutorError::UnsupportedAudio("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(TutorError::InsufficientContext), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            status(TutorError::ProviderFailure(anyhow::anyhow!("down"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn other_errors_are_internal() {
        let err = ApiError::from(anyhow::anyhow!("boom"));
        assert!(matches!(err, ApiError::InternalServerError(_)));
    }
}

use crate::api::AppState;
use crate::api::schemas::registrations::EnqueueRegistrationResponse;
use crate::domain::registration::RegistrationRequest;
use crate::error::{AppError, Result};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

/// Queues a token registration for asynchronous validation and subscription.
///
/// # Errors
/// Returns `AppError::BadRequest` if the token or topic is invalid.
/// Returns `AppError::Queue` if the queue cannot be reached.
pub async fn enqueue_registration(
    State(state): State<AppState>,
    Json(payload): Json<RegistrationRequest>,
) -> Result<impl IntoResponse> {
    payload.validate().map_err(AppError::BadRequest)?;

    let request = RegistrationRequest { token: payload.token.trim().to_string(), topic: payload.topic.trim().to_string() };
    let body = serde_json::to_string(&request).map_err(|_| AppError::Internal)?;
    let message_id = state.queue.enqueue(&body).await?;

    tracing::debug!(%message_id, "Registration queued");
    Ok((StatusCode::ACCEPTED, Json(EnqueueRegistrationResponse { message_id })))
}

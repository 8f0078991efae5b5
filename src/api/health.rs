use crate::api::MgmtState;
use crate::api::schemas::health::HealthResponse;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

/// Liveness probe: returns 200 OK as long as the process is running.
pub async fn livez() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe: checks connectivity to the token store and the queue, and reports dead letters.
pub async fn readyz(State(state): State<MgmtState>) -> impl IntoResponse {
    let (db_res, queue_res, dead_letters) = tokio::join!(
        state.health_service.check_db(),
        state.health_service.check_queue(),
        state.health_service.dead_letters()
    );

    let mut status_code = StatusCode::OK;
    let db_status = if let Err(e) = db_res {
        tracing::warn!(error = %e, component = "database", "Readiness probe failed");
        status_code = StatusCode::SERVICE_UNAVAILABLE;
        "error"
    } else {
        "ok"
    };

    let queue_status = if let Err(e) = queue_res {
        tracing::warn!(error = %e, component = "queue", "Readiness probe failed");
        status_code = StatusCode::SERVICE_UNAVAILABLE;
        "error"
    } else {
        "ok"
    };

    let response = HealthResponse {
        status: if status_code == StatusCode::OK { "ok" } else { "error" }.to_string(),
        database: db_status.to_string(),
        queue: queue_status.to_string(),
        dead_letters,
    };

    (status_code, Json(response))
}

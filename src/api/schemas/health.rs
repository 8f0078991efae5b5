use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub queue: String,
    /// Informational only; dead letters do not make the service unready.
    pub dead_letters: Option<usize>,
}

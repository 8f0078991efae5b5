use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRegistrationResponse {
    pub message_id: String,
}

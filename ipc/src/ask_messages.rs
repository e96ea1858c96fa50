use chrono::{SecondsFormat, Utc};
use coda_core::{AskAnswer, AskRequestBatch};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the event emitted when the host registers a new pending session.
pub const ASK_SESSION_CREATED_EVENT: &str = "ask_session_created";

/// Discriminator carried in the `type` field of socket requests.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AskMessageType {
    AskRequest,
}

/// Represents the request sent from the CLI to the host over the ask socket.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AskSocketRequest {
    #[serde(rename = "type")]
    pub message_type: AskMessageType,
    pub ask_id: String,
    pub request: AskRequestBatch,
    /// 0 means the requester waits forever
    pub timeout_ms: u64,
    pub requested_at_iso: String,
}

impl AskSocketRequest {
    /// Builds an `ask_request` envelope stamped with the current time.
    pub fn new(ask_id: impl Into<String>, request: AskRequestBatch, timeout_ms: u64) -> Self {
        Self {
            message_type: AskMessageType::AskRequest,
            ask_id: ask_id.into(),
            request,
            timeout_ms,
            requested_at_iso: now_iso_utc(),
        }
    }
}

/// How the UI resolves a pending session.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubmitAskStatus {
    Answered,
    Cancelled,
}

/// Submission posted by the UI to the host's "submit response" operation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SubmitAskPayload {
    pub ask_id: String,
    pub answers: Vec<AskAnswer>,
    pub note: Option<String>,
    pub status: SubmitAskStatus,
}

/// A pending session as reported by the host's "list pending sessions" operation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingAskSession {
    pub ask_id: String,
    pub request: AskRequestBatch,
    pub requested_at_iso: String,
    pub timeout_ms: u64,
    pub expires_at_iso: Option<String>,
    pub is_expired: bool,
}

/// Payload of the best-effort `ask_session_created` notification.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AskSessionCreated {
    pub ask_id: String,
    pub requested_at_iso: String,
    pub first_question_text: Option<String>,
}

/// Generates a locally unique ask id: `ask-<unix millis>-<12 hex chars>`.
pub fn new_ask_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("ask-{}-{}", Utc::now().timestamp_millis(), &random[..12])
}

/// Current time as an RFC 3339 UTC timestamp with millisecond precision.
pub fn now_iso_utc() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use coda_core::{
    validate_response_batch, AskAnswer, AskQuestion, AskRequestBatch, AskResponseBatch,
    AskResponseStatus, ResponseSource, ValidationError, OTHER_OPTION_LABEL,
};
use coda_ipc::{
    now_iso_utc, AskSessionCreated, AskSocketRequest, PendingAskSession, SubmitAskPayload,
    SubmitAskStatus,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Default time an expired session stays listed before the sweeper drops it.
pub const DEFAULT_EXPIRED_RETENTION: Duration = Duration::from_secs(30);

/// Channel back to the socket connection that is waiting for the answer.
pub type SessionResponder = oneshot::Sender<AskResponseBatch>;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("ask session already exists: {0}")]
    AlreadyExists(String),

    #[error("ask session not found: {0}")]
    NotFound(String),

    #[error("ask session has expired")]
    Expired,

    #[error("{0}")]
    InvalidSubmission(String),

    #[error("ask requester disconnected before response submission")]
    RequesterDisconnected,

    #[error("invalid ask response payload: {0}")]
    InvalidResponse(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Debug)]
struct PendingSession {
    request: AskRequestBatch,
    requested_at: DateTime<Utc>,
    requested_at_iso: String,
    timeout_ms: u64,
    responder: SessionResponder,
}

impl PendingSession {
    fn expires_at(&self) -> Option<DateTime<Utc>> {
        session_expiry(self.requested_at, self.timeout_ms)
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map(|expiry| now >= expiry).unwrap_or(false)
    }

    fn view(&self, ask_id: &str, now: DateTime<Utc>) -> PendingAskSession {
        PendingAskSession {
            ask_id: ask_id.to_string(),
            request: self.request.clone(),
            requested_at_iso: self.requested_at_iso.clone(),
            timeout_ms: self.timeout_ms,
            expires_at_iso: self.expires_at().map(format_iso_utc),
            is_expired: self.is_expired(now),
        }
    }
}

/// In-memory registry of pending ask sessions, keyed by ask id.
///
/// Every pending entry owns the responder of exactly one socket connection.
/// Entries leave the map on every terminal transition (answered, cancelled,
/// expired, requester gone).
#[derive(Debug, Clone)]
pub struct AskRegistry {
    sessions: Arc<RwLock<HashMap<String, PendingSession>>>,
    expired_retention: Duration,
}

impl Default for AskRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_EXPIRED_RETENTION)
    }
}

impl AskRegistry {
    pub fn new(expired_retention: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            expired_retention,
        }
    }

    /// Registers a validated socket request and returns the creation event.
    pub fn insert_pending_session(
        &self,
        request: AskSocketRequest,
        responder: SessionResponder,
    ) -> Result<AskSessionCreated, RegistryError> {
        let now = Utc::now();
        // An unparsable timestamp falls back to the accept time.
        let requested_at = DateTime::parse_from_rfc3339(&request.requested_at_iso)
            .map(|parsed| parsed.with_timezone(&Utc))
            .unwrap_or(now);

        let mut sessions = self.sessions.write().map_err(|e| {
            RegistryError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;

        if sessions.contains_key(&request.ask_id) {
            return Err(RegistryError::AlreadyExists(request.ask_id));
        }

        let created = AskSessionCreated {
            ask_id: request.ask_id.clone(),
            requested_at_iso: request.requested_at_iso.clone(),
            first_question_text: request
                .request
                .questions
                .first()
                .map(|question| question.question.clone()),
        };

        sessions.insert(
            request.ask_id,
            PendingSession {
                request: request.request,
                requested_at,
                requested_at_iso: request.requested_at_iso,
                timeout_ms: request.timeout_ms,
                responder,
            },
        );
        debug!(ask_id = %created.ask_id, "Registered pending ask session");

        Ok(created)
    }

    /// Drops a session without responding, e.g. when its requester is gone.
    pub fn remove_pending_session(&self, ask_id: &str) -> bool {
        match self.sessions.write() {
            Ok(mut sessions) => sessions.remove(ask_id).is_some(),
            Err(e) => {
                warn!(error = %e, "Failed to acquire write lock");
                false
            }
        }
    }

    /// Lists pending sessions, oldest first, after sweeping stale expired ones.
    pub fn list_pending_sessions(&self) -> Result<Vec<PendingAskSession>, RegistryError> {
        self.list_pending_sessions_at(Utc::now())
    }

    pub(crate) fn list_pending_sessions_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PendingAskSession>, RegistryError> {
        self.sweep_expired_sessions_at(now)?;

        let mut views = {
            let sessions = self.sessions.read().map_err(|e| {
                RegistryError::Storage(format!("Failed to acquire read lock: {}", e))
            })?;
            sessions
                .iter()
                .map(|(ask_id, session)| session.view(ask_id, now))
                .collect::<Vec<_>>()
        };

        views.sort_by(|left, right| left.requested_at_iso.cmp(&right.requested_at_iso));
        Ok(views)
    }

    /// Applies a UI submission and forwards the resulting response to the requester.
    ///
    /// Invalid submissions leave the session pending. A submission against an
    /// expired session removes it and forwards an `expired` response instead.
    pub fn submit_response(&self, payload: SubmitAskPayload) -> Result<(), RegistryError> {
        self.submit_response_at(payload, Utc::now())
    }

    pub(crate) fn submit_response_at(
        &self,
        payload: SubmitAskPayload,
        now: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        let (request, expired) = {
            let sessions = self.sessions.read().map_err(|e| {
                RegistryError::Storage(format!("Failed to acquire read lock: {}", e))
            })?;
            let session = sessions
                .get(&payload.ask_id)
                .ok_or_else(|| RegistryError::NotFound(payload.ask_id.clone()))?;
            (session.request.clone(), session.is_expired(now))
        };

        if expired {
            if let Some(session) = self.take_session(&payload.ask_id)? {
                info!(ask_id = %payload.ask_id, "Submission arrived after expiry");
                let _ = session
                    .responder
                    .send(AskResponseBatch::expired(payload.ask_id.clone()));
            }
            return Err(RegistryError::Expired);
        }

        let note = normalize_optional_text(payload.note);
        let response = match payload.status {
            SubmitAskStatus::Answered => {
                let answers = normalize_answers(&request.questions, payload.answers)?;
                if request.requires_note() && note.is_none() {
                    return Err(RegistryError::InvalidSubmission(
                        "note is required for this ask session".to_string(),
                    ));
                }
                AskResponseBatch {
                    ask_id: payload.ask_id.clone(),
                    answers,
                    note,
                    status: AskResponseStatus::Answered,
                    answered_at_iso: Some(now_iso_utc()),
                    source: ResponseSource::TauriUi,
                }
            }
            SubmitAskStatus::Cancelled => AskResponseBatch {
                ask_id: payload.ask_id.clone(),
                answers: Vec::new(),
                note,
                status: AskResponseStatus::Cancelled,
                answered_at_iso: Some(now_iso_utc()),
                source: ResponseSource::TauriUi,
            },
        };
        let response = validate_response_batch(response)?;

        let session = self
            .take_session(&payload.ask_id)?
            .ok_or_else(|| RegistryError::NotFound(payload.ask_id.clone()))?;

        info!(ask_id = %response.ask_id, status = %response.status, "Ask session resolved");
        session
            .responder
            .send(response)
            .map_err(|_| RegistryError::RequesterDisconnected)
    }

    /// Removes sessions that expired longer ago than the retention window and
    /// forwards an `expired` response to each requester.
    pub fn sweep_expired_sessions(&self) -> Result<usize, RegistryError> {
        self.sweep_expired_sessions_at(Utc::now())
    }

    pub(crate) fn sweep_expired_sessions_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<usize, RegistryError> {
        let stale: Vec<(String, PendingSession)> = {
            let mut sessions = self.sessions.write().map_err(|e| {
                RegistryError::Storage(format!("Failed to acquire write lock: {}", e))
            })?;

            let stale_ids: Vec<String> = sessions
                .iter()
                .filter(|(_, session)| {
                    session
                        .expires_at()
                        .and_then(|expiry| (now - expiry).to_std().ok())
                        .map(|overdue| overdue > self.expired_retention)
                        .unwrap_or(false)
                })
                .map(|(ask_id, _)| ask_id.clone())
                .collect();

            stale_ids
                .into_iter()
                .filter_map(|ask_id| sessions.remove(&ask_id).map(|session| (ask_id, session)))
                .collect()
        };

        let swept = stale.len();
        for (ask_id, session) in stale {
            debug!(%ask_id, "Sweeping expired ask session");
            let _ = session.responder.send(AskResponseBatch::expired(ask_id));
        }
        Ok(swept)
    }

    /// Number of sessions currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.sessions.read().map(|sessions| sessions.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take_session(&self, ask_id: &str) -> Result<Option<PendingSession>, RegistryError> {
        let mut sessions = self.sessions.write().map_err(|e| {
            RegistryError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;
        Ok(sessions.remove(ask_id))
    }
}

/// Runs `sweep_expired_sessions` on a fixed interval until the task is aborted.
pub async fn run_sweeper(registry: AskRegistry, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match registry.sweep_expired_sessions() {
            Ok(0) => {}
            Ok(swept) => info!(swept, "Swept expired ask sessions"),
            Err(e) => warn!(error = %e, "Ask session sweep failed"),
        }
    }
}

/// Checks one answer per question and rewrites labels to the canonical ones.
fn normalize_answers(
    questions: &[AskQuestion],
    raw_answers: Vec<AskAnswer>,
) -> Result<Vec<AskAnswer>, RegistryError> {
    if raw_answers.len() != questions.len() {
        return Err(RegistryError::InvalidSubmission(
            "answers must contain exactly one entry per question".to_string(),
        ));
    }

    let mut answers_by_id = HashMap::new();
    for answer in raw_answers {
        if answers_by_id.insert(answer.id.clone(), answer).is_some() {
            return Err(RegistryError::InvalidSubmission(
                "answers contain duplicate question ids".to_string(),
            ));
        }
    }

    questions
        .iter()
        .map(|question| {
            let answer = answers_by_id.remove(&question.id).ok_or_else(|| {
                RegistryError::InvalidSubmission(format!(
                    "answer is missing for question id: {}",
                    question.id
                ))
            })?;
            normalize_answer(question, answer)
        })
        .collect()
}

fn normalize_answer(question: &AskQuestion, answer: AskAnswer) -> Result<AskAnswer, RegistryError> {
    let invalid = |message: String| RegistryError::InvalidSubmission(message);

    if answer.used_other {
        if answer.selected_index.is_some() {
            return Err(invalid(format!(
                "selected_index must be null when used_other is true (question: {})",
                question.id
            )));
        }
        let other_text = normalize_optional_text(answer.other_text).ok_or_else(|| {
            invalid(format!("other_text is required for question id: {}", question.id))
        })?;
        return Ok(AskAnswer {
            id: question.id.clone(),
            selected_label: OTHER_OPTION_LABEL.to_string(),
            selected_index: None,
            used_other: true,
            other_text: Some(other_text),
        });
    }

    if answer.other_text.is_some() {
        return Err(invalid(format!(
            "other_text must be null when used_other is false (question: {})",
            question.id
        )));
    }

    let index = answer.selected_index.ok_or_else(|| {
        invalid(format!("selected_index is required for question id: {}", question.id))
    })?;
    let option = question.options.get(index).ok_or_else(|| {
        invalid(format!(
            "selected_index {} is out of range for question id: {}",
            index, question.id
        ))
    })?;

    Ok(AskAnswer::option(question, index, option.label.clone()))
}

fn normalize_optional_text(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn session_expiry(requested_at: DateTime<Utc>, timeout_ms: u64) -> Option<DateTime<Utc>> {
    if timeout_ms == 0 {
        return None;
    }
    let timeout = ChronoDuration::milliseconds(i64::try_from(timeout_ms).unwrap_or(i64::MAX));
    // Overflowing the calendar means the session never expires in practice.
    requested_at.checked_add_signed(timeout)
}

fn format_iso_utc(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

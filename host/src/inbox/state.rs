use super::draft::{normalize_note, AnswerDraft};
use super::InboxError;
use chrono::{DateTime, Utc};
use coda_ipc::{PendingAskSession, SubmitAskPayload, SubmitAskStatus};
use std::collections::{HashMap, HashSet};

/// Sequence number handed to each fetch so late results can be discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket(u64);

/// One pending session together with its local editing state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session: PendingAskSession,
    /// Drafts in question order, keyed by question id
    pub drafts: Vec<(String, AnswerDraft)>,
    pub note: String,
    pub error: Option<String>,
    pub submitting: bool,
}

/// Point-in-time copy of the inbox for rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboxSnapshot {
    pub sessions: Vec<SessionSnapshot>,
    pub load_error: Option<String>,
    pub loaded: bool,
}

/// Synchronous reconciliation state. Owned behind a mutex by `AskInbox`;
/// every method runs to completion without awaiting.
#[derive(Debug, Default)]
pub struct InboxState {
    sessions: Vec<PendingAskSession>,
    drafts: HashMap<String, HashMap<String, AnswerDraft>>,
    notes: HashMap<String, String>,
    errors: HashMap<String, String>,
    submitting: HashSet<String>,
    load_error: Option<String>,
    loaded: bool,
    next_ticket: u64,
    last_applied: u64,
}

impl InboxState {
    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.next_ticket += 1;
        FetchTicket(self.next_ticket)
    }

    /// Applies a fetched pending list unless a newer fetch was applied already.
    ///
    /// New sessions get empty drafts and an empty note; existing drafts are
    /// kept as they are; vanished sessions lose all local state.
    pub fn apply_fetch(&mut self, ticket: FetchTicket, sessions: Vec<PendingAskSession>) -> bool {
        if ticket.0 <= self.last_applied {
            return false;
        }
        self.last_applied = ticket.0;
        self.loaded = true;
        self.load_error = None;

        let mut drafts = HashMap::with_capacity(sessions.len());
        let mut notes = HashMap::with_capacity(sessions.len());
        for session in &sessions {
            let mut existing = self.drafts.remove(&session.ask_id).unwrap_or_default();
            let question_drafts: HashMap<String, AnswerDraft> = session
                .request
                .questions
                .iter()
                .map(|question| {
                    let draft = existing.remove(&question.id).unwrap_or_default();
                    (question.id.clone(), draft)
                })
                .collect();
            drafts.insert(session.ask_id.clone(), question_drafts);

            let note = self.notes.remove(&session.ask_id).unwrap_or_default();
            notes.insert(session.ask_id.clone(), note);
        }

        let present: HashSet<&str> = sessions.iter().map(|s| s.ask_id.as_str()).collect();
        self.errors.retain(|ask_id, _| present.contains(ask_id.as_str()));
        self.submitting.retain(|ask_id| present.contains(ask_id.as_str()));

        self.drafts = drafts;
        self.notes = notes;
        self.sessions = sessions;
        true
    }

    /// Records a failed fetch unless a newer fetch was applied already.
    pub fn record_load_error(&mut self, ticket: FetchTicket, message: String) -> bool {
        if ticket.0 <= self.last_applied {
            return false;
        }
        self.loaded = true;
        self.load_error = Some(message);
        true
    }

    pub fn sessions(&self) -> &[PendingAskSession] {
        &self.sessions
    }

    pub fn draft(&self, ask_id: &str, question_id: &str) -> Option<&AnswerDraft> {
        self.drafts.get(ask_id)?.get(question_id)
    }

    pub fn note(&self, ask_id: &str) -> Option<&str> {
        self.notes.get(ask_id).map(String::as_str)
    }

    pub fn error(&self, ask_id: &str) -> Option<&str> {
        self.errors.get(ask_id).map(String::as_str)
    }

    pub fn is_submitting(&self, ask_id: &str) -> bool {
        self.submitting.contains(ask_id)
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub fn select_option(
        &mut self,
        ask_id: &str,
        question_id: &str,
        index: usize,
    ) -> Result<(), InboxError> {
        let label = {
            let question = self
                .session(ask_id)?
                .request
                .questions
                .iter()
                .find(|question| question.id == question_id)
                .ok_or_else(|| unknown_question(ask_id, question_id))?;
            question
                .options
                .get(index)
                .map(|option| option.label.clone())
                .ok_or_else(|| InboxError::OptionOutOfRange {
                    question_id: question_id.to_string(),
                    index,
                })?
        };

        let draft = self.draft_mut(ask_id, question_id)?;
        draft.selected_index = Some(index);
        draft.selected_label = Some(label);
        draft.used_other = false;
        Ok(())
    }

    pub fn select_other(&mut self, ask_id: &str, question_id: &str) -> Result<(), InboxError> {
        let draft = self.draft_mut(ask_id, question_id)?;
        draft.selected_index = None;
        draft.selected_label = None;
        draft.used_other = true;
        Ok(())
    }

    pub fn set_other_text(
        &mut self,
        ask_id: &str,
        question_id: &str,
        text: &str,
    ) -> Result<(), InboxError> {
        self.draft_mut(ask_id, question_id)?.other_text = text.to_string();
        Ok(())
    }

    pub fn set_note(&mut self, ask_id: &str, text: &str) -> Result<(), InboxError> {
        self.session(ask_id)?;
        self.notes.insert(ask_id.to_string(), text.to_string());
        Ok(())
    }

    /// Validates drafts locally and builds an `answered` submission.
    ///
    /// A local validation failure is stored as the session's error and the
    /// session stays editable. On success the session is marked submitting.
    pub fn prepare_submit(
        &mut self,
        ask_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SubmitAskPayload, InboxError> {
        let session = self.submittable_session(ask_id, now)?;
        let drafts = self.drafts.get(ask_id);
        let answers: Option<Vec<_>> = session
            .request
            .questions
            .iter()
            .map(|question| {
                drafts
                    .and_then(|d| d.get(&question.id))
                    .filter(|draft| draft.is_valid_for(question))
                    .map(|draft| draft.to_answer(question))
            })
            .collect();
        let requires_note = session.request.requires_note();

        let Some(answers) = answers else {
            return Err(self.fail_locally(ask_id, InboxError::Incomplete));
        };

        let note = self.note(ask_id).and_then(normalize_note);
        if requires_note && note.is_none() {
            return Err(self.fail_locally(ask_id, InboxError::NoteRequired));
        }

        self.start_submission(ask_id);
        Ok(SubmitAskPayload {
            ask_id: ask_id.to_string(),
            answers,
            note,
            status: SubmitAskStatus::Answered,
        })
    }

    /// Builds a `cancelled` submission. Drafts are not consulted.
    pub fn prepare_cancel(
        &mut self,
        ask_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SubmitAskPayload, InboxError> {
        self.submittable_session(ask_id, now)?;
        let note = self.note(ask_id).and_then(normalize_note);

        self.start_submission(ask_id);
        Ok(SubmitAskPayload {
            ask_id: ask_id.to_string(),
            answers: Vec::new(),
            note,
            status: SubmitAskStatus::Cancelled,
        })
    }

    /// Clears the submitting flag and stores the host's rejection, if any.
    pub fn finish_submission(&mut self, ask_id: &str, error: Option<String>) {
        self.submitting.remove(ask_id);
        match error {
            Some(message) => {
                self.errors.insert(ask_id.to_string(), message);
            }
            None => {
                self.errors.remove(ask_id);
            }
        }
    }

    pub fn snapshot(&self) -> InboxSnapshot {
        let sessions = self
            .sessions
            .iter()
            .map(|session| SessionSnapshot {
                session: session.clone(),
                drafts: session
                    .request
                    .questions
                    .iter()
                    .map(|question| {
                        let draft = self
                            .draft(&session.ask_id, &question.id)
                            .cloned()
                            .unwrap_or_default();
                        (question.id.clone(), draft)
                    })
                    .collect(),
                note: self.note(&session.ask_id).unwrap_or_default().to_string(),
                error: self.error(&session.ask_id).map(str::to_string),
                submitting: self.is_submitting(&session.ask_id),
            })
            .collect();

        InboxSnapshot {
            sessions,
            load_error: self.load_error.clone(),
            loaded: self.loaded,
        }
    }

    fn session(&self, ask_id: &str) -> Result<&PendingAskSession, InboxError> {
        self.sessions
            .iter()
            .find(|session| session.ask_id == ask_id)
            .ok_or_else(|| InboxError::UnknownSession(ask_id.to_string()))
    }

    fn submittable_session(
        &self,
        ask_id: &str,
        now: DateTime<Utc>,
    ) -> Result<&PendingAskSession, InboxError> {
        let session = self.session(ask_id)?;
        if is_session_expired(session, now) {
            return Err(InboxError::Expired(ask_id.to_string()));
        }
        if self.is_submitting(ask_id) {
            return Err(InboxError::Busy(ask_id.to_string()));
        }
        Ok(session)
    }

    fn draft_mut(&mut self, ask_id: &str, question_id: &str) -> Result<&mut AnswerDraft, InboxError> {
        self.session(ask_id)?;
        self.drafts
            .get_mut(ask_id)
            .and_then(|drafts| drafts.get_mut(question_id))
            .ok_or_else(|| unknown_question(ask_id, question_id))
    }

    fn start_submission(&mut self, ask_id: &str) {
        self.submitting.insert(ask_id.to_string());
        self.errors.remove(ask_id);
    }

    fn fail_locally(&mut self, ask_id: &str, error: InboxError) -> InboxError {
        self.errors.insert(ask_id.to_string(), error.to_string());
        error
    }
}

/// Expired per the host's flag, or because the expiry passed since the last poll.
pub fn is_session_expired(session: &PendingAskSession, now: DateTime<Utc>) -> bool {
    if session.is_expired {
        return true;
    }
    session
        .expires_at_iso
        .as_deref()
        .and_then(|iso| DateTime::parse_from_rfc3339(iso).ok())
        .map(|expiry| now >= expiry.with_timezone(&Utc))
        .unwrap_or(false)
}

fn unknown_question(ask_id: &str, question_id: &str) -> InboxError {
    InboxError::UnknownQuestion {
        ask_id: ask_id.to_string(),
        question_id: question_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coda_core::{AskNote, AskOption, AskQuestion, AskRequestBatch};

    fn question(id: &str) -> AskQuestion {
        AskQuestion {
            header: "Scope".to_string(),
            id: id.to_string(),
            question: "Pick one?".to_string(),
            options: vec![
                AskOption {
                    label: "Ship now (Recommended)".to_string(),
                    description: "Fast path".to_string(),
                },
                AskOption {
                    label: "Expand".to_string(),
                    description: "Broad path".to_string(),
                },
            ],
        }
    }

    fn session(ask_id: &str, note_required: Option<bool>) -> PendingAskSession {
        PendingAskSession {
            ask_id: ask_id.to_string(),
            request: AskRequestBatch {
                questions: vec![question("scope_choice"), question("risk_level")],
                note: note_required.map(|required| AskNote {
                    label: "Reason".to_string(),
                    required,
                }),
            },
            requested_at_iso: "2026-02-19T00:00:00.000Z".to_string(),
            timeout_ms: 0,
            expires_at_iso: None,
            is_expired: false,
        }
    }

    fn loaded(sessions: Vec<PendingAskSession>) -> InboxState {
        let mut state = InboxState::default();
        let ticket = state.begin_fetch();
        assert!(state.apply_fetch(ticket, sessions));
        state
    }

    #[test]
    fn test_new_sessions_get_empty_drafts() {
        let state = loaded(vec![session("ask-1", None)]);
        assert_eq!(
            state.draft("ask-1", "scope_choice"),
            Some(&AnswerDraft::default())
        );
        assert_eq!(state.note("ask-1"), Some(""));
    }

    #[test]
    fn test_polling_twice_keeps_drafts() {
        let mut state = loaded(vec![session("ask-1", None)]);
        state.select_option("ask-1", "scope_choice", 1).unwrap();
        state.select_other("ask-1", "risk_level").unwrap();
        state.set_other_text("ask-1", "risk_level", "half typed").unwrap();
        state.set_note("ask-1", "draft note").unwrap();
        let before = state.snapshot();

        for _ in 0..2 {
            let ticket = state.begin_fetch();
            state.apply_fetch(ticket, vec![session("ask-1", None)]);
        }

        assert_eq!(state.snapshot(), before);
        assert_eq!(
            state.draft("ask-1", "scope_choice").unwrap().selected_label.as_deref(),
            Some("Expand")
        );
    }

    #[test]
    fn test_vanished_sessions_are_dropped() {
        let mut state = loaded(vec![session("ask-1", None), session("ask-2", None)]);
        state.select_option("ask-1", "scope_choice", 0).unwrap();
        state.prepare_submit("ask-2", Utc::now()).unwrap_err();
        assert!(state.error("ask-2").is_some());

        let ticket = state.begin_fetch();
        state.apply_fetch(ticket, vec![session("ask-1", None)]);

        assert!(state.draft("ask-2", "scope_choice").is_none());
        assert!(state.note("ask-2").is_none());
        assert!(state.error("ask-2").is_none());
        assert_eq!(state.sessions().len(), 1);
    }

    #[test]
    fn test_stale_fetch_is_ignored() {
        let mut state = InboxState::default();
        let older = state.begin_fetch();
        let newer = state.begin_fetch();

        assert!(state.apply_fetch(newer, vec![session("ask-new", None)]));
        assert!(!state.apply_fetch(older, vec![session("ask-old", None)]));
        assert!(!state.record_load_error(older, "late failure".to_string()));

        assert_eq!(state.sessions()[0].ask_id, "ask-new");
        assert_eq!(state.load_error(), None);
    }

    #[test]
    fn test_incomplete_submit_is_rejected_locally() {
        let mut state = loaded(vec![session("ask-1", None)]);
        state.select_option("ask-1", "scope_choice", 0).unwrap();

        let error = state.prepare_submit("ask-1", Utc::now()).unwrap_err();
        assert!(matches!(error, InboxError::Incomplete));
        assert_eq!(
            state.error("ask-1"),
            Some("Please answer every question before submitting.")
        );
        assert!(!state.is_submitting("ask-1"));
    }

    #[test]
    fn test_blank_other_text_is_incomplete() {
        let mut state = loaded(vec![session("ask-1", None)]);
        state.select_option("ask-1", "scope_choice", 0).unwrap();
        state.select_other("ask-1", "risk_level").unwrap();
        state.set_other_text("ask-1", "risk_level", "   ").unwrap();

        assert!(matches!(
            state.prepare_submit("ask-1", Utc::now()),
            Err(InboxError::Incomplete)
        ));
    }

    #[test]
    fn test_required_note_is_enforced() {
        let mut state = loaded(vec![session("ask-1", Some(true))]);
        state.select_option("ask-1", "scope_choice", 0).unwrap();
        state.select_option("ask-1", "risk_level", 1).unwrap();
        state.set_note("ask-1", "   ").unwrap();

        let error = state.prepare_submit("ask-1", Utc::now()).unwrap_err();
        assert!(matches!(error, InboxError::NoteRequired));
        assert_eq!(
            state.error("ask-1"),
            Some("Note is required before submitting this ask.")
        );
    }

    #[test]
    fn test_submit_with_other_and_note() {
        let mut state = loaded(vec![session("ask-1", Some(true))]);
        state.select_option("ask-1", "scope_choice", 0).unwrap();
        state.select_other("ask-1", "risk_level").unwrap();
        state.set_other_text("ask-1", "risk_level", "  depends on QA ").unwrap();
        state.set_note("ask-1", "  ship it  ").unwrap();

        let payload = state.prepare_submit("ask-1", Utc::now()).unwrap();
        assert_eq!(payload.status, SubmitAskStatus::Answered);
        assert_eq!(payload.note.as_deref(), Some("ship it"));
        assert_eq!(payload.answers.len(), 2);
        assert_eq!(payload.answers[0].selected_label, "Ship now (Recommended)");
        assert_eq!(payload.answers[0].selected_index, Some(0));

        let other = &payload.answers[1];
        assert!(other.used_other);
        assert_eq!(other.selected_label, "Other");
        assert_eq!(other.selected_index, None);
        assert_eq!(other.other_text.as_deref(), Some("depends on QA"));

        assert!(state.is_submitting("ask-1"));
        assert!(matches!(
            state.prepare_submit("ask-1", Utc::now()),
            Err(InboxError::Busy(_))
        ));
    }

    #[test]
    fn test_reselecting_option_after_other() {
        let mut state = loaded(vec![session("ask-1", None)]);
        state.select_other("ask-1", "scope_choice").unwrap();
        state.set_other_text("ask-1", "scope_choice", "custom").unwrap();
        state.select_option("ask-1", "scope_choice", 1).unwrap();

        let draft = state.draft("ask-1", "scope_choice").unwrap();
        assert!(!draft.used_other);
        assert_eq!(draft.selected_index, Some(1));
    }

    #[test]
    fn test_cancel_ignores_drafts() {
        let mut state = loaded(vec![session("ask-1", Some(true))]);
        state.select_option("ask-1", "scope_choice", 0).unwrap();

        let payload = state.prepare_cancel("ask-1", Utc::now()).unwrap();
        assert_eq!(payload.status, SubmitAskStatus::Cancelled);
        assert!(payload.answers.is_empty());
        assert_eq!(payload.note, None);
    }

    #[test]
    fn test_expired_session_is_not_submittable() {
        let mut expired = session("ask-1", None);
        expired.timeout_ms = 1000;
        expired.expires_at_iso = Some("2026-02-19T00:00:01.000Z".to_string());
        let mut state = loaded(vec![expired]);
        state.select_option("ask-1", "scope_choice", 0).unwrap();
        state.select_option("ask-1", "risk_level", 0).unwrap();

        let now = DateTime::parse_from_rfc3339("2026-02-19T00:00:02Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(matches!(
            state.prepare_submit("ask-1", now),
            Err(InboxError::Expired(_))
        ));
        assert!(matches!(
            state.prepare_cancel("ask-1", now),
            Err(InboxError::Expired(_))
        ));
        assert!(!state.is_submitting("ask-1"));
    }

    #[test]
    fn test_finish_submission_records_host_error() {
        let mut state = loaded(vec![session("ask-1", None)]);
        state.prepare_cancel("ask-1", Utc::now()).unwrap();
        state.finish_submission("ask-1", Some("Cancel failed: boom".to_string()));

        assert!(!state.is_submitting("ask-1"));
        assert_eq!(state.error("ask-1"), Some("Cancel failed: boom"));
    }

    #[test]
    fn test_edits_on_unknown_targets_fail() {
        let mut state = loaded(vec![session("ask-1", None)]);
        assert!(matches!(
            state.select_option("ask-9", "scope_choice", 0),
            Err(InboxError::UnknownSession(_))
        ));
        assert!(matches!(
            state.select_other("ask-1", "nope"),
            Err(InboxError::UnknownQuestion { .. })
        ));
        assert!(matches!(
            state.select_option("ask-1", "scope_choice", 7),
            Err(InboxError::OptionOutOfRange { index: 7, .. })
        ));
    }
}

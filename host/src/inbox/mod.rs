//! Pending-ask inbox: polls the host, keeps per-session drafts and submits
//! answers or cancellations on the user's behalf.

mod draft;
mod state;

pub use draft::{normalize_note, AnswerDraft};
pub use state::{is_session_expired, FetchTicket, InboxSnapshot, InboxState, SessionSnapshot};

use crate::host::{AskHost, HostError};
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum InboxError {
    #[error("ask session is not pending: {0}")]
    UnknownSession(String),

    #[error("question {question_id} is not part of ask session {ask_id}")]
    UnknownQuestion { ask_id: String, question_id: String },

    #[error("option {index} is out of range for question {question_id}")]
    OptionOutOfRange { question_id: String, index: usize },

    #[error("ask session has expired: {0}")]
    Expired(String),

    #[error("ask session is already being submitted: {0}")]
    Busy(String),

    #[error("Please answer every question before submitting.")]
    Incomplete,

    #[error("Note is required before submitting this ask.")]
    NoteRequired,

    #[error("Submit failed: {0}")]
    SubmitFailed(String),

    #[error("Cancel failed: {0}")]
    CancelFailed(String),

    #[error("Unable to load ask queue: {0}")]
    Load(String),

    #[error("inbox state lock poisoned: {0}")]
    State(String),
}

/// UI-side view of the host's pending asks.
///
/// All state lives behind a synchronous mutex that is never held across an
/// await point; host calls happen with the lock released.
pub struct AskInbox<H: AskHost> {
    host: Arc<H>,
    state: Mutex<InboxState>,
    poll_interval: Duration,
}

impl<H: AskHost + 'static> AskInbox<H> {
    pub fn new(host: Arc<H>, poll_interval: Duration) -> Self {
        Self {
            host,
            state: Mutex::new(InboxState::default()),
            poll_interval,
        }
    }

    /// Fetches the pending list once and reconciles it with local drafts.
    ///
    /// Returns `false` when a newer fetch was applied first.
    pub async fn refresh(&self) -> Result<bool, InboxError> {
        let ticket = self.lock()?.begin_fetch();
        match self.host.list_pending_sessions().await {
            Ok(sessions) => {
                let count = sessions.len();
                let applied = self.lock()?.apply_fetch(ticket, sessions);
                if applied {
                    debug!(pending = count, "Reconciled ask queue");
                }
                Ok(applied)
            }
            Err(e) => {
                let error = InboxError::Load(e.to_string());
                self.lock()?.record_load_error(ticket, error.to_string());
                Err(error)
            }
        }
    }

    /// Submits the drafted answers for `ask_id`.
    pub async fn submit(&self, ask_id: &str) -> Result<(), InboxError> {
        let payload = self.lock()?.prepare_submit(ask_id, Utc::now())?;
        let result = self.host.submit_response(payload).await;
        self.complete(ask_id, result, InboxError::SubmitFailed).await
    }

    /// Cancels `ask_id` on the requester's behalf.
    pub async fn cancel(&self, ask_id: &str) -> Result<(), InboxError> {
        let payload = self.lock()?.prepare_cancel(ask_id, Utc::now())?;
        let result = self.host.submit_response(payload).await;
        self.complete(ask_id, result, InboxError::CancelFailed).await
    }

    pub fn select_option(
        &self,
        ask_id: &str,
        question_id: &str,
        index: usize,
    ) -> Result<(), InboxError> {
        self.lock()?.select_option(ask_id, question_id, index)
    }

    pub fn select_other(&self, ask_id: &str, question_id: &str) -> Result<(), InboxError> {
        self.lock()?.select_other(ask_id, question_id)
    }

    pub fn set_other_text(
        &self,
        ask_id: &str,
        question_id: &str,
        text: &str,
    ) -> Result<(), InboxError> {
        self.lock()?.set_other_text(ask_id, question_id, text)
    }

    pub fn set_note(&self, ask_id: &str, text: &str) -> Result<(), InboxError> {
        self.lock()?.set_note(ask_id, text)
    }

    pub fn snapshot(&self) -> Result<InboxSnapshot, InboxError> {
        Ok(self.lock()?.snapshot())
    }

    /// Starts refreshing on the configured interval. Each tick runs its own
    /// fetch, so a slow host never delays the next tick; late results are
    /// discarded by fetch ticket.
    pub fn spawn_poller(self: &Arc<Self>) -> InboxPoller {
        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        let inbox = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inbox.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let inbox = Arc::clone(&inbox);
                        tokio::spawn(async move {
                            if let Err(e) = inbox.refresh().await {
                                warn!(error = %e, "Ask queue poll failed");
                            }
                        });
                    }
                    _ = stop_rx.recv() => {
                        debug!("Stopping ask queue poller");
                        break;
                    }
                }
            }
        });
        InboxPoller { stop_tx, handle }
    }

    async fn complete(
        &self,
        ask_id: &str,
        result: Result<(), HostError>,
        wrap: fn(String) -> InboxError,
    ) -> Result<(), InboxError> {
        match result {
            Ok(()) => {
                self.lock()?.finish_submission(ask_id, None);
                info!(%ask_id, "Resolved ask session");
                if let Err(e) = self.refresh().await {
                    warn!(error = %e, "Refresh after resolving ask failed");
                }
                Ok(())
            }
            Err(e) => {
                let error = wrap(e.to_string());
                self.lock()?.finish_submission(ask_id, Some(error.to_string()));
                Err(error)
            }
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, InboxState>, InboxError> {
        self.state
            .lock()
            .map_err(|e| InboxError::State(e.to_string()))
    }
}

/// Handle to a running poll loop.
pub struct InboxPoller {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl InboxPoller {
    /// Stops the loop and waits for it to exit. In-flight fetches finish on
    /// their own.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(()).await;
        let _ = self.handle.await;
    }
}

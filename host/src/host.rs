use crate::registry::{AskRegistry, RegistryError};
use async_trait::async_trait;
use coda_ipc::{PendingAskSession, SubmitAskPayload};
use thiserror::Error;

/// Error returned by the UI-facing host operations.
#[derive(Error, Debug)]
pub enum HostError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("host unavailable: {0}")]
    Unavailable(String),
}

/// The two operations a UI uses to drive pending asks.
///
/// The inbox only talks to the host through this trait, so it can run
/// against the in-process registry or any other transport to a host.
#[async_trait]
pub trait AskHost: Send + Sync {
    /// "list pending sessions"
    async fn list_pending_sessions(&self) -> Result<Vec<PendingAskSession>, HostError>;

    /// "submit response"
    async fn submit_response(&self, payload: SubmitAskPayload) -> Result<(), HostError>;
}

#[async_trait]
impl AskHost for AskRegistry {
    async fn list_pending_sessions(&self) -> Result<Vec<PendingAskSession>, HostError> {
        Ok(AskRegistry::list_pending_sessions(self)?)
    }

    async fn submit_response(&self, payload: SubmitAskPayload) -> Result<(), HostError> {
        Ok(AskRegistry::submit_response(self, payload)?)
    }
}

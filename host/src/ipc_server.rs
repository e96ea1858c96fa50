use crate::notify::AskNotifier;
use crate::registry::{AskRegistry, RegistryError};
use coda_core::{validate_request_batch, AskResponseBatch, ValidationError};
use coda_ipc::{encode_frame, prepare_socket_path, read_frame, AskSocketRequest, FrameError};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt, Interest};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("empty ask socket payload")]
    EmptyPayload,

    #[error("failed to read ask socket payload: {0}")]
    Frame(#[from] FrameError),

    #[error("failed to parse ask socket payload: {0}")]
    Parse(String),

    #[error("invalid ask request: {0}")]
    InvalidRequest(#[from] ValidationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("ask session channel closed before response was produced: {0}")]
    ResponderDropped(String),

    #[error("failed to write ask response for session {ask_id} to socket: {source}")]
    Write {
        ask_id: String,
        #[source]
        source: io::Error,
    },
}

/// How often a half-closed connection is checked for a full close.
const HALF_CLOSED_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shared state for connection handlers
struct ServerState {
    registry: AskRegistry,
    notifier: AskNotifier,
}

/// Accepts ask requests on the host socket, one request per connection.
pub struct AskSocketServer {
    state: Arc<ServerState>,
}

/// Prepares the socket path (creating its directory, removing a stale
/// socket) and binds the listener.
pub fn bind_ask_socket(socket_path: &Path) -> io::Result<UnixListener> {
    prepare_socket_path(socket_path)?;
    let listener = UnixListener::bind(socket_path)?;
    info!("Ask socket listening on {}", socket_path.display());
    Ok(listener)
}

impl AskSocketServer {
    pub fn new(registry: AskRegistry, notifier: AskNotifier) -> Self {
        Self {
            state: Arc::new(ServerState { registry, notifier }),
        }
    }

    /// Accepts connections until a shutdown signal arrives.
    pub async fn run(self, listener: UnixListener, mut shutdown_rx: mpsc::Receiver<()>) {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        debug!("Accepted ask socket connection");
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, state).await {
                                warn!(error = %e, "Ask socket connection failed");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept ask socket connection");
                    }
                },
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping ask socket listener");
                    break;
                }
            }
        }
    }
}

/// Handles one requester: read one request, register it, wait for the
/// answer (or the requester leaving), write one response and close.
async fn handle_connection(stream: UnixStream, state: Arc<ServerState>) -> Result<(), ServerError> {
    let (mut reader, mut writer) = stream.into_split();

    let line = read_frame(&mut reader)
        .await?
        .ok_or(ServerError::EmptyPayload)?;
    let request = parse_socket_request(&line)?;
    let ask_id = request.ask_id.clone();

    let (responder, response_rx) = oneshot::channel::<AskResponseBatch>();
    // A colliding id is rejected; the connection closes without a response.
    let created = state.registry.insert_pending_session(request, responder)?;
    state.notifier.notify(created);

    let response = tokio::select! {
        response = response_rx => {
            response.map_err(|_| ServerError::ResponderDropped(ask_id.clone()))?
        }
        _ = wait_for_disconnect(&mut reader, &writer) => {
            info!(%ask_id, "Requester disconnected; dropping pending ask session");
            state.registry.remove_pending_session(&ask_id);
            return Ok(());
        }
    };

    let write_result = write_response(&mut writer, &response).await;
    state.registry.remove_pending_session(&ask_id);
    write_result.map_err(|source| ServerError::Write {
        ask_id: ask_id.clone(),
        source,
    })?;

    debug!(%ask_id, status = %response.status, "Sent ask response");
    Ok(())
}

/// Decodes a request frame and runs it through the schema validator.
fn parse_socket_request(line: &str) -> Result<AskSocketRequest, ServerError> {
    let mut request: AskSocketRequest =
        serde_json::from_str(line).map_err(|e| ServerError::Parse(e.to_string()))?;

    request.ask_id = request.ask_id.trim().to_string();
    if request.ask_id.is_empty() {
        return Err(ServerError::Parse("ask_id must not be empty".to_string()));
    }
    request.request = validate_request_batch(request.request)?;
    Ok(request)
}

/// Resolves once the requester is gone. Extra bytes after the request are
/// ignored. EOF alone is not a disconnect: a requester may shut down its
/// write side and keep reading, so after EOF only a full close counts.
async fn wait_for_disconnect(reader: &mut OwnedReadHalf, writer: &OwnedWriteHalf) {
    let mut scratch = [0u8; 256];
    loop {
        match reader.read(&mut scratch).await {
            Ok(0) => break,
            Ok(_) => continue,
            Err(_) => return,
        }
    }

    debug!("Requester half-closed its side; still waiting for the answer");
    loop {
        match writer.ready(Interest::WRITABLE).await {
            Ok(ready) if !ready.is_write_closed() => {
                tokio::time::sleep(HALF_CLOSED_POLL_INTERVAL).await;
            }
            _ => return,
        }
    }
}

async fn write_response<W>(writer: &mut W, response: &AskResponseBatch) -> io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let frame = encode_frame(response)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    writer.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use coda_core::{AskResponseStatus, ResponseSource};
    use coda_ipc::{SubmitAskPayload, SubmitAskStatus};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tempfile::tempdir;

    fn request_line(ask_id: &str) -> String {
        format!(
            "{}\n",
            json!({
                "type": "ask_request",
                "ask_id": ask_id,
                "request": {
                    "questions": [{
                        "header": "Scope",
                        "id": "scope_choice",
                        "question": "  Pick one?  ",
                        "options": [
                            { "label": "Ship now (Recommended)", "description": "Fast path" },
                            { "label": "Expand", "description": "Broad path" }
                        ]
                    }]
                },
                "timeout_ms": 0,
                "requested_at_iso": "2026-02-19T00:00:00.000Z"
            })
        )
    }

    async fn wait_for_sessions(registry: &AskRegistry, count: usize) {
        for _ in 0..200 {
            if registry.len() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("registry never reached {count} sessions");
    }

    fn start_server(
        dir: &Path,
    ) -> (std::path::PathBuf, AskRegistry, AskNotifier, mpsc::Sender<()>) {
        let socket_path = dir.join("runtime").join("ask.sock");
        let listener = bind_ask_socket(&socket_path).unwrap();
        let registry = AskRegistry::default();
        let notifier = AskNotifier::new();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let server = AskSocketServer::new(registry.clone(), notifier.clone());
        tokio::spawn(server.run(listener, shutdown_rx));
        (socket_path, registry, notifier, shutdown_tx)
    }

    #[tokio::test]
    async fn test_registers_request_and_writes_one_response() {
        let dir = tempdir().unwrap();
        let (socket_path, registry, notifier, _shutdown) = start_server(dir.path());
        let mut events = notifier.subscribe();

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        stream
            .write_all(request_line("ask-srv-1").as_bytes())
            .await
            .unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.ask_id, "ask-srv-1");
        assert_eq!(event.first_question_text.as_deref(), Some("Pick one?"));

        let pending = registry.list_pending_sessions().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].request.questions[0].question, "Pick one?");

        registry
            .submit_response(SubmitAskPayload {
                ask_id: "ask-srv-1".to_string(),
                answers: Vec::new(),
                note: None,
                status: SubmitAskStatus::Cancelled,
            })
            .unwrap();

        let mut received = String::new();
        stream.read_to_string(&mut received).await.unwrap();
        assert_eq!(received.matches('\n').count(), 1);
        let response: Value = serde_json::from_str(received.trim()).unwrap();
        assert_eq!(response["ask_id"], json!("ask-srv-1"));
        assert_eq!(response["status"], json!("cancelled"));
        assert_eq!(response["source"], json!("tauri-ui"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_requester_disconnect_removes_session() {
        let dir = tempdir().unwrap();
        let (socket_path, registry, _notifier, _shutdown) = start_server(dir.path());

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        stream
            .write_all(request_line("ask-srv-2").as_bytes())
            .await
            .unwrap();
        wait_for_sessions(&registry, 1).await;

        drop(stream);
        wait_for_sessions(&registry, 0).await;
    }

    #[tokio::test]
    async fn test_half_closed_requester_still_receives_response() {
        let dir = tempdir().unwrap();
        let (socket_path, registry, _notifier, _shutdown) = start_server(dir.path());

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        stream
            .write_all(request_line("ask-srv-half").as_bytes())
            .await
            .unwrap();
        stream.shutdown().await.unwrap();
        wait_for_sessions(&registry, 1).await;

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(registry.len(), 1);

        registry
            .submit_response(SubmitAskPayload {
                ask_id: "ask-srv-half".to_string(),
                answers: Vec::new(),
                note: None,
                status: SubmitAskStatus::Cancelled,
            })
            .unwrap();

        let mut received = String::new();
        stream.read_to_string(&mut received).await.unwrap();
        let response: Value = serde_json::from_str(received.trim()).unwrap();
        assert_eq!(response["ask_id"], json!("ask-srv-half"));
        assert_eq!(response["status"], json!("cancelled"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_request_is_closed_without_registration() {
        let dir = tempdir().unwrap();
        let (socket_path, registry, _notifier, _shutdown) = start_server(dir.path());

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        let bad = json!({
            "type": "ask_request",
            "ask_id": "ask-bad",
            "request": { "questions": [] },
            "timeout_ms": 0,
            "requested_at_iso": "2026-02-19T00:00:00Z"
        });
        stream
            .write_all(format!("{bad}\n").as_bytes())
            .await
            .unwrap();

        let mut received = Vec::new();
        stream.read_to_end(&mut received).await.unwrap();
        assert!(received.is_empty());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_ask_id_closes_second_connection() {
        let dir = tempdir().unwrap();
        let (socket_path, registry, _notifier, _shutdown) = start_server(dir.path());

        let mut first = UnixStream::connect(&socket_path).await.unwrap();
        first
            .write_all(request_line("ask-dup").as_bytes())
            .await
            .unwrap();
        wait_for_sessions(&registry, 1).await;

        let mut second = UnixStream::connect(&socket_path).await.unwrap();
        second
            .write_all(request_line("ask-dup").as_bytes())
            .await
            .unwrap();
        let mut received = Vec::new();
        second.read_to_end(&mut received).await.unwrap();
        assert!(received.is_empty());

        // The original session is untouched.
        assert_eq!(registry.len(), 1);
        drop(first);
    }

    #[test]
    fn test_parse_rejects_unknown_type_and_blank_id() {
        let line = request_line("ask-1").replace("ask_request", "ping");
        assert!(matches!(parse_socket_request(&line), Err(ServerError::Parse(_))));

        let line = request_line("   ");
        assert!(matches!(parse_socket_request(&line), Err(ServerError::Parse(_))));
    }

    #[tokio::test]
    async fn test_write_response_frames_one_line() {
        let mut out = Vec::new();
        write_response(
            &mut out,
            &AskResponseBatch {
                ask_id: "ask-1".to_string(),
                answers: Vec::new(),
                note: None,
                status: AskResponseStatus::Expired,
                answered_at_iso: None,
                source: ResponseSource::TauriUi,
            },
        )
        .await
        .unwrap();
        assert!(out.ends_with(b"}\n"));
    }
}

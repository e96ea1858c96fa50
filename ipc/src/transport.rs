use crate::ask_messages::AskSocketRequest;
use crate::framing::{encode_frame, read_frame, FrameError, MAX_FRAME_BYTES};
use coda_core::{validate_ask_response_batch, AskResponseBatch, ValidationError};
use serde_json::Value;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tracing::{debug, instrument};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to connect to ask socket at {path}: {source}")]
    Connect {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("socket I/O failure: {0}")]
    Io(#[from] io::Error),
    #[error("failed to serialize ask request: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("socket closed before response payload arrived")]
    ClosedBeforeResponse,
    #[error("socket response frame exceeds {MAX_FRAME_BYTES} bytes")]
    FrameTooLarge,
    #[error("socket delivered a response frame that is not valid UTF-8")]
    InvalidUtf8,
    #[error("invalid socket response JSON: {0}")]
    MalformedFrame(String),
    #[error("invalid ask response payload: {0}")]
    InvalidResponse(#[from] ValidationError),
    #[error("ask request timed out")]
    Timeout,
    #[error("interrupted while waiting for ask response")]
    Interrupted,
}

impl From<FrameError> for TransportError {
    fn from(error: FrameError) -> Self {
        match error {
            FrameError::TooLarge => TransportError::FrameTooLarge,
            FrameError::InvalidUtf8 => TransportError::InvalidUtf8,
            FrameError::Io(e) => TransportError::Io(e),
        }
    }
}

/// Requester side of the ask socket: one connection, one request, one response.
#[derive(Debug, Clone)]
pub struct AskSocketClient {
    socket_path: PathBuf,
}

impl AskSocketClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Sends `request` and waits for the host's validated response.
    ///
    /// `timeout_ms == 0` waits indefinitely; otherwise the timer covers
    /// connect, write and read. When `interrupt` resolves first the wait is
    /// abandoned with [`TransportError::Interrupted`]. The connection is owned
    /// by the exchange future, so it is closed on every exit path, including
    /// the timeout and interrupt branches that drop that future.
    #[instrument(skip(self, request, interrupt), fields(ask_id = %request.ask_id))]
    pub async fn send_framed_request<F>(
        &self,
        request: &AskSocketRequest,
        timeout_ms: u64,
        interrupt: F,
    ) -> Result<AskResponseBatch, TransportError>
    where
        F: Future<Output = ()>,
    {
        let exchange = self.exchange(request);
        let bounded = async {
            if timeout_ms == 0 {
                return exchange.await;
            }
            match tokio::time::timeout(Duration::from_millis(timeout_ms), exchange).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(timeout_ms, "No ask response before timeout");
                    Err(TransportError::Timeout)
                }
            }
        };

        tokio::select! {
            biased;
            _ = interrupt => {
                debug!("Interrupted while waiting for ask response");
                Err(TransportError::Interrupted)
            }
            result = bounded => result,
        }
    }

    async fn exchange(&self, request: &AskSocketRequest) -> Result<AskResponseBatch, TransportError> {
        let frame = encode_frame(request).map_err(TransportError::Serialize)?;

        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|source| TransportError::Connect {
                path: self.socket_path.display().to_string(),
                source,
            })?;
        debug!(path = %self.socket_path.display(), "Connected to ask socket");

        stream.write_all(&frame).await?;
        stream.flush().await?;
        debug!(bytes = frame.len(), "Ask request sent");

        // Only the first frame is authoritative; anything after it is dropped.
        let line = read_frame(&mut stream)
            .await?
            .ok_or(TransportError::ClosedBeforeResponse)?;
        if let Err(e) = stream.shutdown().await {
            debug!(error = %e, "Ask socket shutdown after response failed");
        }
        drop(stream);

        debug!(bytes = line.len(), "Ask response frame received");
        parse_response(&line)
    }
}

fn parse_response(line: &str) -> Result<AskResponseBatch, TransportError> {
    let raw: Value =
        serde_json::from_str(line).map_err(|e| TransportError::MalformedFrame(e.to_string()))?;
    Ok(validate_ask_response_batch(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use coda_core::{AskOption, AskQuestion, AskRequestBatch, AskResponseStatus};
    use serde_json::json;
    use tempfile::{tempdir, TempDir};
    use tokio::io::AsyncReadExt;
    use tokio::net::UnixListener;
    use tokio::sync::oneshot;

    fn request() -> AskSocketRequest {
        AskSocketRequest::new(
            "ask-test-1",
            AskRequestBatch {
                questions: vec![AskQuestion {
                    header: "Scope".to_string(),
                    id: "scope_choice".to_string(),
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
                }],
                note: None,
            },
            0,
        )
    }

    fn answered_json(ask_id: &str) -> String {
        json!({
            "ask_id": ask_id,
            "answers": [{
                "id": "scope_choice",
                "selected_label": "Ship now (Recommended)",
                "selected_index": 0,
                "used_other": false,
                "other_text": null
            }],
            "note": null,
            "status": "answered",
            "answered_at_iso": "2026-02-19T13:00:00.000Z",
            "source": "tauri-ui"
        })
        .to_string()
    }

    /// Binds a listener that reads one request frame and replies with `reply(request)` bytes.
    /// The returned receiver fires once the server observes the client closing.
    fn serve_once<F>(reply: F) -> (TempDir, PathBuf, oneshot::Receiver<()>)
    where
        F: FnOnce(Value) -> Option<Vec<u8>> + Send + 'static,
    {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("ask.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();
        let (closed_tx, closed_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let line = read_frame(&mut stream).await.unwrap().unwrap();
            let payload: Value = serde_json::from_str(&line).unwrap();
            if let Some(bytes) = reply(payload) {
                stream.write_all(&bytes).await.unwrap();
                stream.shutdown().await.unwrap();
            }
            // Wait until the client drops its end.
            let mut rest = Vec::new();
            let _ = stream.read_to_end(&mut rest).await;
            let _ = closed_tx.send(());
        });

        (dir, socket_path, closed_rx)
    }

    #[tokio::test]
    async fn test_receives_answered_response() {
        let (_dir, path, closed) = serve_once(|payload| {
            assert_eq!(payload["type"], json!("ask_request"));
            let ask_id = payload["ask_id"].as_str().unwrap().to_string();
            Some(format!("{}\n", answered_json(&ask_id)).into_bytes())
        });

        let response = AskSocketClient::new(path)
            .send_framed_request(&request(), 0, std::future::pending())
            .await
            .unwrap();

        assert_eq!(response.ask_id, "ask-test-1");
        assert_eq!(response.status, AskResponseStatus::Answered);
        closed.await.unwrap();
    }

    #[tokio::test]
    async fn test_trailing_frame_without_newline_is_accepted() {
        let (_dir, path, _closed) =
            serve_once(|_| Some(answered_json("ask-test-1").into_bytes()));

        let response = AskSocketClient::new(path)
            .send_framed_request(&request(), 1000, std::future::pending())
            .await
            .unwrap();
        assert_eq!(response.answers.len(), 1);
    }

    #[tokio::test]
    async fn test_first_frame_wins() {
        let (_dir, path, _closed) = serve_once(|_| {
            Some(
                format!(
                    "\n{}\n{{\"garbage\":true}}\n",
                    answered_json("ask-test-1")
                )
                .into_bytes(),
            )
        });

        let response = AskSocketClient::new(path)
            .send_framed_request(&request(), 0, std::future::pending())
            .await
            .unwrap();
        assert_eq!(response.status, AskResponseStatus::Answered);
    }

    #[tokio::test]
    async fn test_times_out_and_closes_connection() {
        let (_dir, path, closed) = serve_once(|_| None);

        let started = std::time::Instant::now();
        let result = AskSocketClient::new(path)
            .send_framed_request(&request(), 20, std::future::pending())
            .await;

        assert!(matches!(result, Err(TransportError::Timeout)));
        assert!(started.elapsed() < Duration::from_secs(2));
        // The server sees EOF because the client dropped the stream.
        tokio::time::timeout(Duration::from_secs(2), closed)
            .await
            .expect("client connection should be closed after timeout")
            .unwrap();
    }

    #[tokio::test]
    async fn test_interrupt_wins_and_closes_connection() {
        let (_dir, path, closed) = serve_once(|_| None);
        let (interrupt_tx, interrupt_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = interrupt_tx.send(());
        });

        let result = AskSocketClient::new(path)
            .send_framed_request(&request(), 0, async {
                let _ = interrupt_rx.await;
            })
            .await;

        assert!(matches!(result, Err(TransportError::Interrupted)));
        tokio::time::timeout(Duration::from_secs(2), closed)
            .await
            .expect("client connection should be closed after interrupt")
            .unwrap();
    }

    #[tokio::test]
    async fn test_malformed_json_is_a_protocol_error() {
        let (_dir, path, _closed) = serve_once(|_| Some(b"{not json}\n".to_vec()));

        let result = AskSocketClient::new(path)
            .send_framed_request(&request(), 0, std::future::pending())
            .await;
        assert!(matches!(result, Err(TransportError::MalformedFrame(_))));
    }

    #[tokio::test]
    async fn test_invalid_response_is_not_accepted() {
        let (_dir, path, _closed) = serve_once(|_| {
            Some(
                format!(
                    "{}\n",
                    json!({
                        "ask_id": "ask-test-1",
                        "answers": [],
                        "note": null,
                        "status": "cancelled",
                        "answered_at_iso": null,
                        "source": "cli"
                    })
                )
                .into_bytes(),
            )
        });

        let result = AskSocketClient::new(path)
            .send_framed_request(&request(), 0, std::future::pending())
            .await;
        let error = result.unwrap_err();
        assert!(matches!(error, TransportError::InvalidResponse(_)));
        assert!(error.to_string().starts_with("invalid ask response payload"));
    }

    #[tokio::test]
    async fn test_close_without_payload() {
        let (_dir, path, _closed) = serve_once(|_| Some(Vec::new()));

        let result = AskSocketClient::new(path)
            .send_framed_request(&request(), 0, std::future::pending())
            .await;
        assert!(matches!(result, Err(TransportError::ClosedBeforeResponse)));
    }

    #[tokio::test]
    async fn test_missing_socket_is_a_connect_error() {
        let dir = tempdir().unwrap();
        let result = AskSocketClient::new(dir.path().join("absent.sock"))
            .send_framed_request(&request(), 0, std::future::pending())
            .await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}

use crate::cli::AskArgs;
use crate::output::write_response;
use coda_core::{validate_ask_request_batch_json, AskResponseStatus, ValidationError};
use coda_ipc::{new_ask_id, AskSocketClient, AskSocketRequest, TransportError};
use std::future::Future;
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_RUNTIME_ERROR: u8 = 1;
pub const EXIT_VALIDATION_ERROR: u8 = 2;
pub const EXIT_TIMEOUT: u8 = 3;
pub const EXIT_CANCELLED: u8 = 4;
pub const EXIT_INTERRUPTED: u8 = 130;

const STDIN_IS_TERMINAL_MESSAGE: &str =
    "ask request JSON must be provided via stdin (example: echo '{\"questions\":[...]}' | coda ask)";

/// A non-zero outcome of the ask command.
///
/// `message` is printed as `error: <message>` when present. Cancelled,
/// expired and interrupted outcomes carry no message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("exit {code}: {}", .message.as_deref().unwrap_or(""))]
pub struct CliExit {
    pub code: u8,
    pub message: Option<String>,
}

impl CliExit {
    fn with_message(code: u8, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    fn silent(code: u8) -> Self {
        Self {
            code,
            message: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::with_message(EXIT_VALIDATION_ERROR, message)
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::with_message(EXIT_RUNTIME_ERROR, message)
    }
}

impl From<ValidationError> for CliExit {
    fn from(error: ValidationError) -> Self {
        CliExit::validation(error.to_string())
    }
}

impl From<TransportError> for CliExit {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Timeout => CliExit::with_message(EXIT_TIMEOUT, error.to_string()),
            TransportError::Interrupted => CliExit::silent(EXIT_INTERRUPTED),
            other => CliExit::runtime(other.to_string()),
        }
    }
}

/// Runs `coda ask` end to end: read and validate stdin, send one framed
/// request, print the response and map its status to an exit code.
pub async fn run_ask_command<R, W, F>(
    args: &AskArgs,
    stdin: R,
    stdin_is_terminal: bool,
    stdout: &mut W,
    socket_path: &Path,
    interrupt: F,
) -> Result<(), CliExit>
where
    R: AsyncRead + Unpin,
    W: Write,
    F: Future<Output = ()>,
{
    let timeout_ms = args.timeout_ms().map_err(CliExit::validation)?;
    let raw_json = read_stdin_json(stdin, stdin_is_terminal).await?;
    let request = validate_ask_request_batch_json(&raw_json)?;

    let ask_id = new_ask_id();
    info!(%ask_id, questions = request.questions.len(), "Sending ask request");
    let envelope = AskSocketRequest::new(ask_id.clone(), request, timeout_ms);

    let response = AskSocketClient::new(socket_path)
        .send_framed_request(&envelope, timeout_ms, interrupt)
        .await?;

    if response.ask_id != ask_id {
        return Err(CliExit::runtime(format!(
            "ask_id mismatch: expected {}, received {}",
            ask_id, response.ask_id
        )));
    }
    debug!(%ask_id, status = %response.status, "Ask response received");

    write_response(stdout, &response, args.json)
        .map_err(|e| CliExit::runtime(format!("failed to write response: {e}")))?;

    match response.status {
        AskResponseStatus::Answered => Ok(()),
        AskResponseStatus::Cancelled => Err(CliExit::silent(EXIT_CANCELLED)),
        AskResponseStatus::Expired => Err(CliExit::silent(EXIT_TIMEOUT)),
    }
}

async fn read_stdin_json<R>(mut stdin: R, stdin_is_terminal: bool) -> Result<String, CliExit>
where
    R: AsyncRead + Unpin,
{
    if stdin_is_terminal {
        return Err(CliExit::validation(STDIN_IS_TERMINAL_MESSAGE));
    }

    let mut input = String::new();
    stdin
        .read_to_string(&mut input)
        .await
        .map_err(|e| CliExit::validation(format!("failed to read ask request from stdin: {e}")))?;
    Ok(input)
}

// This crate centralizes the ask socket protocol: message envelopes,
// newline framing and the requester-side transport.

pub mod ask_messages; // Envelopes exchanged between CLI, host and inbox
pub mod framing; // Newline-delimited JSON framing
pub mod socket_path; // Well-known socket location
pub mod transport; // One-shot framed request/response client

pub use ask_messages::{
    new_ask_id, now_iso_utc, AskMessageType, AskSessionCreated, AskSocketRequest,
    PendingAskSession, SubmitAskPayload, SubmitAskStatus, ASK_SESSION_CREATED_EVENT,
};
pub use framing::{encode_frame, read_frame, FrameDecoder, FrameError, MAX_FRAME_BYTES};
pub use socket_path::{prepare_socket_path, resolve_ask_socket_path};
pub use transport::{AskSocketClient, TransportError};

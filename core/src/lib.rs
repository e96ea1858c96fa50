// Core ask-session functionality shared by the CLI and the host:
// - Request/response contracts exchanged over the ask socket
// - Schema validation (the trust boundary for every payload)
// - Configuration loading
// - Shared error types

// Export types module - Ask request/response data structures
pub mod types;
pub use types::*;

// Export validation module - Schema validator
pub mod validation;
pub use validation::{
    validate_ask_request_batch, validate_ask_request_batch_json, validate_ask_response_batch,
    validate_request_batch, validate_response_batch,
};

// Export config module - Configuration loading
pub mod config;
pub use config::*;

// Export errors module - Shared error types
pub mod errors;
pub use errors::*;

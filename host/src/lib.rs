// Reference host for the ask protocol:
// - Session registry with expiry and retention
// - Unix socket server that parks one requester per session
// - Arrival notifications
// - Inbox reconciliation and a terminal console to answer asks

pub mod console; // dialoguer front end for the inbox
pub mod host; // UI-facing host operations
pub mod inbox; // Poll/draft/submit reconciliation
pub mod ipc_server; // Ask socket listener
pub mod logging; // tracing setup
pub mod notify; // ask_session_created fan-out
pub mod registry; // Pending session store

pub use console::{spawn_console, ConsoleError, ConsoleInbox};
pub use host::{AskHost, HostError};
pub use inbox::{AskInbox, InboxError, InboxPoller, InboxSnapshot, SessionSnapshot};
pub use ipc_server::{bind_ask_socket, AskSocketServer, ServerError};
pub use notify::{run_notification_listener, AskNotifier, NotificationDeduper};
pub use registry::{run_sweeper, AskRegistry, RegistryError, DEFAULT_EXPIRED_RETENTION};

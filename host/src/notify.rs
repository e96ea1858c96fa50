use coda_ipc::{AskSessionCreated, ASK_SESSION_CREATED_EVENT};
use colored::*;
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub const ASK_NOTIFICATION_TITLE: &str = "New ask needs your response";
pub const ASK_NOTIFICATION_PREVIEW_MAX_CHARS: usize = 92;
const ASK_NOTIFICATION_FALLBACK: &str = "Open Coda to answer the pending ask";
const CHANNEL_CAPACITY: usize = 64;

/// Best-effort fan-out of `ask_session_created` events.
#[derive(Debug, Clone)]
pub struct AskNotifier {
    sender: broadcast::Sender<AskSessionCreated>,
}

impl Default for AskNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl AskNotifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AskSessionCreated> {
        self.sender.subscribe()
    }

    /// Publishes the event. Having no subscribers is not an error.
    pub fn notify(&self, event: AskSessionCreated) {
        let ask_id = event.ask_id.clone();
        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(%ask_id, receivers, event = ASK_SESSION_CREATED_EVENT, "Emitted event")
            }
            Err(_) => debug!(%ask_id, event = ASK_SESSION_CREATED_EVENT, "No event subscribers"),
        }
    }
}

/// Body text for an arrival notification.
pub fn build_notification_preview(first_question_text: Option<&str>) -> String {
    let source = first_question_text
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .unwrap_or(ASK_NOTIFICATION_FALLBACK);
    let clipped: String = source.chars().take(ASK_NOTIFICATION_PREVIEW_MAX_CHARS).collect();
    format!("{}...", clipped.trim_end())
}

/// Remembers which asks were already announced.
#[derive(Debug, Default)]
pub struct NotificationDeduper {
    notified: HashSet<String>,
}

impl NotificationDeduper {
    /// True the first time an ask id is seen.
    pub fn should_notify(&mut self, ask_id: &str) -> bool {
        self.notified.insert(ask_id.to_string())
    }
}

/// Announces new asks on stderr until the notifier is dropped.
pub async fn run_notification_listener(mut receiver: broadcast::Receiver<AskSessionCreated>) {
    let mut deduper = NotificationDeduper::default();
    loop {
        match receiver.recv().await {
            Ok(event) => {
                if !deduper.should_notify(&event.ask_id) {
                    continue;
                }
                let preview = build_notification_preview(event.first_question_text.as_deref());
                info!(ask_id = %event.ask_id, "Ask session created");
                eprintln!("{} {}", ASK_NOTIFICATION_TITLE.bold().yellow(), preview);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Notification listener lagged behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

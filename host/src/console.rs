use crate::host::AskHost;
use crate::inbox::{
    is_session_expired, AnswerDraft, AskInbox, InboxError, InboxSnapshot, SessionSnapshot,
};
use chrono::{DateTime, Local, Utc};
use coda_core::{AskOption, AskQuestion, AskRequestBatch, OTHER_OPTION_LABEL};
use coda_ipc::PendingAskSession;
use colored::*;
use dialoguer::{theme::ColorfulTheme, Input, Select};
use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const IDLE_WAIT: Duration = Duration::from_millis(250);
const DEFAULT_NOTE_LABEL: &str = "Note";

#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("terminal prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("inbox unavailable: {0}")]
    Inbox(String),
}

enum Action {
    Submit,
    Cancel,
    Skip,
}

/// Terminal front end for the inbox: walks through pending asks one at a
/// time with dialoguer prompts.
pub struct ConsoleInbox<H: AskHost> {
    inbox: Arc<AskInbox<H>>,
    runtime: Handle,
    theme: ColorfulTheme,
    skipped: HashSet<String>,
}

/// Runs the console on its own OS thread. Prompts block on stdin, so they
/// stay off the async runtime. When the console ends, a shutdown signal is
/// sent so the host exits with it.
pub fn spawn_console<H: AskHost + 'static>(
    inbox: Arc<AskInbox<H>>,
    runtime: Handle,
    shutdown_tx: mpsc::Sender<()>,
) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("coda-inbox-console".to_string())
        .spawn(move || {
            let mut console = ConsoleInbox::new(inbox, runtime);
            if let Err(e) = console.run() {
                warn!(error = %e, "Inbox console stopped");
            }
            let _ = shutdown_tx.blocking_send(());
        })
}

impl<H: AskHost + 'static> ConsoleInbox<H> {
    pub fn new(inbox: Arc<AskInbox<H>>, runtime: Handle) -> Self {
        Self {
            inbox,
            runtime,
            theme: ColorfulTheme::default(),
            skipped: HashSet::new(),
        }
    }

    /// Prompt loop. Returns only when the terminal fails or the user aborts
    /// a prompt with Ctrl-C.
    pub fn run(&mut self) -> Result<(), ConsoleError> {
        println!("{}", "Waiting for asks...".dimmed());
        let mut waiting = true;
        let mut shown_load_error: Option<String> = None;

        loop {
            let snapshot = self
                .inbox
                .snapshot()
                .map_err(|e| ConsoleError::Inbox(e.to_string()))?;

            if snapshot.load_error != shown_load_error {
                if let Some(message) = snapshot.load_error.as_deref() {
                    eprintln!("{}", message.red());
                }
                shown_load_error = snapshot.load_error.clone();
            }

            let present: HashSet<&str> = snapshot
                .sessions
                .iter()
                .map(|entry| entry.session.ask_id.as_str())
                .collect();
            self.skipped.retain(|ask_id| present.contains(ask_id.as_str()));

            let Some(entry) = next_session(&snapshot, &mut self.skipped, Utc::now()) else {
                if !waiting {
                    println!("{}", "Waiting for asks...".dimmed());
                    waiting = true;
                }
                thread::sleep(IDLE_WAIT);
                continue;
            };
            waiting = false;

            let entry = entry.clone();
            self.answer_session(&entry)?;
        }
    }

    fn answer_session(&mut self, entry: &SessionSnapshot) -> Result<(), ConsoleError> {
        let session = &entry.session;
        let ask_id = session.ask_id.as_str();

        println!();
        println!(
            "{} {} {}",
            "Ask".cyan().bold(),
            ask_id.bold(),
            format!("({})", format_expiry(session)).dimmed()
        );
        if let Some(error) = entry.error.as_deref() {
            eprintln!("{}", error.red());
        }

        for (question, (_, draft)) in session.request.questions.iter().zip(&entry.drafts) {
            if !self.prompt_question(ask_id, question, draft)? {
                return Ok(());
            }
        }

        let note = Input::<String>::with_theme(&self.theme)
            .with_prompt(note_prompt(&session.request))
            .with_initial_text(entry.note.clone())
            .allow_empty(true)
            .interact_text()?;
        if self.edit(|inbox| inbox.set_note(ask_id, &note)).is_none() {
            return Ok(());
        }

        let action = match Select::with_theme(&self.theme)
            .with_prompt("Resolve this ask")
            .items(&["Submit", "Cancel ask", "Skip for now"])
            .default(0)
            .interact_opt()?
        {
            Some(0) => Action::Submit,
            Some(1) => Action::Cancel,
            _ => Action::Skip,
        };

        let result = match action {
            Action::Submit => self.runtime.block_on(self.inbox.submit(ask_id)),
            Action::Cancel => self.runtime.block_on(self.inbox.cancel(ask_id)),
            Action::Skip => {
                debug!(%ask_id, "Skipped ask");
                self.skipped.insert(ask_id.to_string());
                return Ok(());
            }
        };

        match result {
            Ok(()) => println!("{}", format!("Resolved {}", ask_id).green()),
            // The message is kept on the session and shown when it comes back around.
            Err(e) => eprintln!("{}", e.to_string().red()),
        }
        Ok(())
    }

    /// Returns `false` when the session disappeared or the user backed out.
    fn prompt_question(
        &mut self,
        ask_id: &str,
        question: &AskQuestion,
        draft: &AnswerDraft,
    ) -> Result<bool, ConsoleError> {
        println!("{} {}", question.header.magenta().bold(), question.question);

        let choice = Select::with_theme(&self.theme)
            .items(&option_items(question))
            .default(default_choice(question, draft))
            .interact_opt()?;
        let Some(choice) = choice else {
            self.skipped.insert(ask_id.to_string());
            return Ok(false);
        };

        if choice < question.options.len() {
            return Ok(self
                .edit(|inbox| inbox.select_option(ask_id, &question.id, choice))
                .is_some());
        }

        if self
            .edit(|inbox| inbox.select_other(ask_id, &question.id))
            .is_none()
        {
            return Ok(false);
        }
        let text = Input::<String>::with_theme(&self.theme)
            .with_prompt(OTHER_OPTION_LABEL)
            .with_initial_text(draft.other_text.clone())
            .allow_empty(true)
            .interact_text()?;
        Ok(self
            .edit(|inbox| inbox.set_other_text(ask_id, &question.id, &text))
            .is_some())
    }

    /// Applies a draft edit. A failure means the ask is gone from the queue.
    fn edit<F>(&self, apply: F) -> Option<()>
    where
        F: FnOnce(&AskInbox<H>) -> Result<(), InboxError>,
    {
        match apply(&self.inbox) {
            Ok(()) => Some(()),
            Err(e) => {
                eprintln!("{}", format!("Ask is no longer pending ({})", e).yellow());
                None
            }
        }
    }
}

/// Picks the first answerable session that was not skipped. Once every
/// answerable session was skipped the rotation starts over.
fn next_session<'a>(
    snapshot: &'a InboxSnapshot,
    skipped: &mut HashSet<String>,
    now: DateTime<Utc>,
) -> Option<&'a SessionSnapshot> {
    let answerable: Vec<&SessionSnapshot> = snapshot
        .sessions
        .iter()
        .filter(|entry| !entry.submitting && !is_session_expired(&entry.session, now))
        .collect();

    if let Some(entry) = answerable
        .iter()
        .find(|entry| !skipped.contains(&entry.session.ask_id))
    {
        return Some(entry);
    }
    if answerable.is_empty() {
        return None;
    }
    skipped.clear();
    answerable.first().copied()
}

/// "No timeout" or "Expires at <local time>".
pub fn format_expiry(session: &PendingAskSession) -> String {
    let expiry = session
        .expires_at_iso
        .as_deref()
        .and_then(|iso| DateTime::parse_from_rfc3339(iso).ok());
    match expiry {
        Some(expiry) => format!(
            "Expires at {}",
            expiry.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        ),
        None => "No timeout".to_string(),
    }
}

fn option_items(question: &AskQuestion) -> Vec<String> {
    question
        .options
        .iter()
        .map(|option| format!("{} - {}", option.label, option.description))
        .chain(std::iter::once(OTHER_OPTION_LABEL.to_string()))
        .collect()
}

fn default_choice(question: &AskQuestion, draft: &AnswerDraft) -> usize {
    if draft.used_other {
        return question.options.len();
    }
    draft
        .selected_index
        .filter(|index| *index < question.options.len())
        .or_else(|| question.options.iter().position(AskOption::is_recommended))
        .unwrap_or(0)
}

fn note_prompt(request: &AskRequestBatch) -> String {
    match &request.note {
        Some(note) if note.required => format!("{} (required)", note.label),
        Some(note) => format!("{} (optional)", note.label),
        None => format!("{} (optional)", DEFAULT_NOTE_LABEL),
    }
}

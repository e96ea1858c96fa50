use serde::{Deserialize, Serialize};
use std::fmt;

/// Label used for free-text answers that replace a predefined option.
pub const OTHER_OPTION_LABEL: &str = "Other";

/// Suffix that marks an option as the recommended choice.
pub const RECOMMENDED_SUFFIX: &str = "(Recommended)";

/// One selectable choice of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskOption {
    pub label: String,
    pub description: String,
}

impl AskOption {
    /// Whether this option carries the canonical `(Recommended)` suffix.
    pub fn is_recommended(&self) -> bool {
        self.label.ends_with(RECOMMENDED_SUFFIX)
    }
}

/// A single multiple-choice question of an ask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskQuestion {
    /// Short tag shown next to the question (12 characters max)
    pub header: String,
    /// snake_case identifier, unique within the batch
    pub id: String,
    pub question: String,
    pub options: Vec<AskOption>,
}

/// Optional free-text field collected alongside the answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskNote {
    pub label: String,
    #[serde(default)]
    pub required: bool,
}

/// The questionnaire posed by the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskRequestBatch {
    pub questions: Vec<AskQuestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<AskNote>,
}

impl AskRequestBatch {
    /// Whether the batch declares a note that must be filled before submit.
    pub fn requires_note(&self) -> bool {
        self.note.as_ref().map(|note| note.required).unwrap_or(false)
    }
}

/// The answer given to one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskAnswer {
    pub id: String,
    pub selected_label: String,
    pub selected_index: Option<usize>,
    pub used_other: bool,
    pub other_text: Option<String>,
}

impl AskAnswer {
    /// Builds an answer that picks a predefined option.
    pub fn option(question: &AskQuestion, index: usize, label: impl Into<String>) -> Self {
        Self {
            id: question.id.clone(),
            selected_label: label.into(),
            selected_index: Some(index),
            used_other: false,
            other_text: None,
        }
    }

    /// Builds a free-text "Other" answer.
    pub fn other(question: &AskQuestion, text: impl Into<String>) -> Self {
        Self {
            id: question.id.clone(),
            selected_label: OTHER_OPTION_LABEL.to_string(),
            selected_index: None,
            used_other: true,
            other_text: Some(text.into()),
        }
    }
}

/// Terminal state of an ask as reported back to the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AskResponseStatus {
    Answered,
    Cancelled,
    Expired,
}

impl AskResponseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AskResponseStatus::Answered => "answered",
            AskResponseStatus::Cancelled => "cancelled",
            AskResponseStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for AskResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Producer of a response batch. Only the desktop UI is recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResponseSource {
    #[default]
    #[serde(rename = "tauri-ui")]
    TauriUi,
}

/// The answer batch delivered back over the original socket connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskResponseBatch {
    pub ask_id: String,
    pub answers: Vec<AskAnswer>,
    pub note: Option<String>,
    pub status: AskResponseStatus,
    pub answered_at_iso: Option<String>,
    pub source: ResponseSource,
}

impl AskResponseBatch {
    /// Response forwarded when a session times out on the host.
    pub fn expired(ask_id: impl Into<String>) -> Self {
        Self {
            ask_id: ask_id.into(),
            answers: Vec::new(),
            note: None,
            status: AskResponseStatus::Expired,
            answered_at_iso: None,
            source: ResponseSource::TauriUi,
        }
    }
}

use coda_core::{AskAnswer, AskQuestion};

/// The UI-local, in-progress answer to one question.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerDraft {
    pub selected_index: Option<usize>,
    pub selected_label: Option<String>,
    pub used_other: bool,
    pub other_text: String,
}

impl AnswerDraft {
    /// Whether this draft is a complete answer to `question`.
    pub fn is_valid_for(&self, question: &AskQuestion) -> bool {
        if self.used_other {
            return !self.other_text.trim().is_empty();
        }
        self.selected_index
            .map(|index| index < question.options.len())
            .unwrap_or(false)
    }

    /// Builds the submitted answer. Callers check `is_valid_for` first.
    pub fn to_answer(&self, question: &AskQuestion) -> AskAnswer {
        if self.used_other {
            return AskAnswer::other(question, self.other_text.trim());
        }

        let index = self.selected_index.unwrap_or_default();
        let label = question
            .options
            .get(index)
            .map(|option| option.label.clone())
            .unwrap_or_default();
        AskAnswer::option(question, index, label)
    }
}

/// Trimmed note, or `None` when blank.
pub fn normalize_note(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

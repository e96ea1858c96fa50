//! Schema validation for ask requests and responses.
//!
//! The validator is pure: it takes a decoded payload and returns a
//! normalized copy (text fields trimmed) or the first violation found.
//! Callers never inspect a payload's fields before it has passed through
//! one of the `validate_*` entry points.

use std::collections::HashSet;

use chrono::DateTime;
use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::ValidationError;
use crate::types::{
    AskAnswer, AskNote, AskOption, AskQuestion, AskRequestBatch, AskResponseBatch,
    AskResponseStatus, RECOMMENDED_SUFFIX,
};

const MAX_TEXT_CHARS: usize = 240;
const MAX_HEADER_CHARS: usize = 12;
const MIN_OPTIONS: usize = 2;
const RECOMMENDED_MARKER: &str = "Recommended";

lazy_static! {
    static ref SNAKE_CASE_ID: Regex =
        Regex::new(r"^[a-z][a-z0-9_]*$").expect("snake_case pattern is a valid regex");
}

type ValidationResult<T> = Result<T, ValidationError>;

/// Validates request JSON text, e.g. the contents of standard input.
pub fn validate_ask_request_batch_json(raw_text: &str) -> ValidationResult<AskRequestBatch> {
    if raw_text.trim().is_empty() {
        return Err(ValidationError::EmptyInput);
    }

    let raw: Value = serde_json::from_str(raw_text)
        .map_err(|e| ValidationError::MalformedJson(e.to_string()))?;

    validate_ask_request_batch(raw)
}

/// Validates an already-decoded JSON value as an ask request batch.
pub fn validate_ask_request_batch(raw: Value) -> ValidationResult<AskRequestBatch> {
    validate_request_batch(decode(raw)?)
}

/// Validates an ask response batch received from the host.
pub fn validate_ask_response_batch(raw: Value) -> ValidationResult<AskResponseBatch> {
    validate_response_batch(decode(raw)?)
}

/// Structural and semantic checks on a typed request batch.
pub fn validate_request_batch(batch: AskRequestBatch) -> ValidationResult<AskRequestBatch> {
    if batch.questions.is_empty() {
        return Err(ValidationError::field(
            "questions",
            "questions must contain at least 1 entry",
        ));
    }

    let mut seen_ids = HashSet::new();
    let mut questions = Vec::with_capacity(batch.questions.len());

    for (index, question) in batch.questions.into_iter().enumerate() {
        let path = format!("questions[{index}]");
        let question = validate_question(question, &path)?;

        if !seen_ids.insert(question.id.clone()) {
            return Err(ValidationError::field(
                format!("{path}.id"),
                format!("duplicate question id: {}", question.id),
            ));
        }
        questions.push(question);
    }

    let note = batch
        .note
        .map(|note| -> ValidationResult<AskNote> {
            Ok(AskNote {
                label: normalize_text(&note.label, "note.label")?,
                required: note.required,
            })
        })
        .transpose()?;

    Ok(AskRequestBatch { questions, note })
}

/// Structural and semantic checks on a typed response batch.
pub fn validate_response_batch(batch: AskResponseBatch) -> ValidationResult<AskResponseBatch> {
    let ask_id = normalize_text(&batch.ask_id, "ask_id")?;

    if batch.status != AskResponseStatus::Answered && !batch.answers.is_empty() {
        return Err(ValidationError::field(
            "answers",
            format!("answers must be empty when status is {}", batch.status),
        ));
    }

    let mut seen_ids = HashSet::new();
    let mut answers = Vec::with_capacity(batch.answers.len());
    for (index, answer) in batch.answers.into_iter().enumerate() {
        let path = format!("answers[{index}]");
        let answer = validate_answer(answer, &path)?;
        if !seen_ids.insert(answer.id.clone()) {
            return Err(ValidationError::field(
                format!("{path}.id"),
                format!("duplicate answer id: {}", answer.id),
            ));
        }
        answers.push(answer);
    }

    let note = batch
        .note
        .map(|note| note.trim().to_string())
        .filter(|note| !note.is_empty());

    match (&batch.answered_at_iso, batch.status) {
        (Some(timestamp), _) => {
            DateTime::parse_from_rfc3339(timestamp).map_err(|_| {
                ValidationError::field(
                    "answered_at_iso",
                    "answered_at_iso must be an ISO-8601 datetime with offset",
                )
            })?;
        }
        (None, AskResponseStatus::Answered) => {
            return Err(ValidationError::field(
                "answered_at_iso",
                "answered_at_iso is required when status is answered",
            ));
        }
        (None, _) => {}
    }

    Ok(AskResponseBatch {
        ask_id,
        answers,
        note,
        status: batch.status,
        answered_at_iso: batch.answered_at_iso,
        source: batch.source,
    })
}

fn decode<T: DeserializeOwned>(raw: Value) -> ValidationResult<T> {
    serde_json::from_value(raw).map_err(|e| ValidationError::Shape(e.to_string()))
}

fn validate_question(question: AskQuestion, path: &str) -> ValidationResult<AskQuestion> {
    let header = question.header.trim();
    if header.is_empty() {
        return Err(ValidationError::field(
            format!("{path}.header"),
            "header must not be empty",
        ));
    }
    if header.chars().count() > MAX_HEADER_CHARS {
        return Err(ValidationError::field(
            format!("{path}.header"),
            format!("header must be {MAX_HEADER_CHARS} characters or fewer"),
        ));
    }

    validate_snake_case_id(&question.id, &format!("{path}.id"))?;
    let text = normalize_text(&question.question, &format!("{path}.question"))?;

    if question.options.len() < MIN_OPTIONS {
        return Err(ValidationError::field(
            format!("{path}.options"),
            format!("options must contain at least {MIN_OPTIONS} entries"),
        ));
    }

    let options = question
        .options
        .into_iter()
        .enumerate()
        .map(|(index, option)| validate_option(option, &format!("{path}.options[{index}]")))
        .collect::<ValidationResult<Vec<_>>>()?;

    Ok(AskQuestion {
        header: header.to_string(),
        id: question.id,
        question: text,
        options,
    })
}

fn validate_option(option: AskOption, path: &str) -> ValidationResult<AskOption> {
    let label = normalize_text(&option.label, &format!("{path}.label"))?;
    let description = normalize_text(&option.description, &format!("{path}.description"))?;

    // Only the trailing suffix position is machine-recognizable.
    if label.contains(RECOMMENDED_MARKER) && !label.ends_with(RECOMMENDED_SUFFIX) {
        return Err(ValidationError::field(
            format!("{path}.label"),
            format!("recommended option labels must use the \"{RECOMMENDED_SUFFIX}\" suffix"),
        ));
    }

    Ok(AskOption { label, description })
}

fn validate_answer(answer: AskAnswer, path: &str) -> ValidationResult<AskAnswer> {
    validate_snake_case_id(&answer.id, &format!("{path}.id"))?;
    let selected_label = normalize_text(&answer.selected_label, &format!("{path}.selected_label"))?;

    let other_text = if answer.used_other {
        let raw = answer
            .other_text
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| {
                ValidationError::field(
                    format!("{path}.other_text"),
                    "other_text is required when used_other is true",
                )
            })?;
        if answer.selected_index.is_some() {
            return Err(ValidationError::field(
                format!("{path}.selected_index"),
                "selected_index must be null when used_other is true",
            ));
        }
        Some(normalize_text(raw, &format!("{path}.other_text"))?)
    } else {
        if answer.other_text.is_some() {
            return Err(ValidationError::field(
                format!("{path}.other_text"),
                "other_text must be null when used_other is false",
            ));
        }
        None
    };

    Ok(AskAnswer {
        id: answer.id,
        selected_label,
        selected_index: answer.selected_index,
        used_other: answer.used_other,
        other_text,
    })
}

fn validate_snake_case_id(id: &str, path: &str) -> ValidationResult<()> {
    if SNAKE_CASE_ID.is_match(id) {
        Ok(())
    } else {
        Err(ValidationError::field(path, "id must be snake_case"))
    }
}

fn normalize_text(value: &str, path: &str) -> ValidationResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::field(path, "value must not be empty"));
    }
    if trimmed.chars().count() > MAX_TEXT_CHARS {
        return Err(ValidationError::field(
            path,
            format!("value must be {MAX_TEXT_CHARS} characters or fewer"),
        ));
    }
    Ok(trimmed.to_string())
}

use serde_json::{Map, Value};

use crate::error::PipelineError;
use crate::record::{RecordDraft, CHOICE_COUNT, TAG_COUNT};

/// Validate one parsed record against the per-record shape rules.
///
/// Checks run in a fixed order and short-circuit on the first failure;
/// `position` is the record's 1-indexed place in the batch and appears in
/// every message so the operator can fix the one offending record.
///
/// # Errors
/// Returns [`PipelineError::SchemaViolation`] naming the offending field.
pub fn validate_record(value: &Value, position: usize) -> Result<RecordDraft, PipelineError> {
    let Some(object) = value.as_object() else {
        return Err(violation(position, "record", "must be a JSON object".to_string()));
    };

    let question_text = require_text(object, "questionText", position)?;
    let choices = require_fixed_strings::<CHOICE_COUNT>(object, "choices", position)?;
    let answer = require_text(object, "answer", position)?;
    let tags = require_fixed_strings::<TAG_COUNT>(object, "tags", position)?;

    for (index, tag) in tags.iter().enumerate() {
        if tags[..index].contains(tag) {
            return Err(violation(
                position,
                "tags",
                format!("must be pairwise unique, but {tag:?} repeats"),
            ));
        }
    }

    Ok(RecordDraft { question_text, choices, answer, tags })
}

fn require_text(
    object: &Map<String, Value>,
    field: &'static str,
    position: usize,
) -> Result<String, PipelineError> {
    let Some(value) = object.get(field) else {
        return Err(violation(position, field, "is missing".to_string()));
    };
    let Some(text) = value.as_str() else {
        return Err(violation(position, field, "must be a string".to_string()));
    };
    if text.trim().is_empty() {
        return Err(violation(position, field, "must be non-empty".to_string()));
    }
    Ok(text.to_string())
}

fn require_fixed_strings<const N: usize>(
    object: &Map<String, Value>,
    field: &'static str,
    position: usize,
) -> Result<[String; N], PipelineError> {
    let Some(value) = object.get(field) else {
        return Err(violation(position, field, "is missing".to_string()));
    };
    let Some(items) = value.as_array() else {
        return Err(violation(position, field, "must be an array".to_string()));
    };
    if items.len() != N {
        return Err(violation(
            position,
            field,
            format!("must contain exactly {N} entries, got {}", items.len()),
        ));
    }

    let mut collected = Vec::with_capacity(N);
    for item in items {
        let Some(text) = item.as_str() else {
            return Err(violation(position, field, "entries must all be strings".to_string()));
        };
        if text.trim().is_empty() {
            return Err(violation(position, field, "entries must all be non-empty".to_string()));
        }
        collected.push(text.to_string());
    }

    collected.try_into().map_err(|_| {
        // Length was checked above; this is unreachable in practice.
        violation(position, field, format!("must contain exactly {N} entries"))
    })
}

fn violation(position: usize, field: &'static str, reason: String) -> PipelineError {
    PipelineError::SchemaViolation { position, field, reason }
}

//! Reply text extraction for upstream responses.
//!
//! The model API has shipped several response shapes. [`UPSTREAM_TEXT`] tries
//! them in a fixed order; each strategy is a plain function so it can be
//! tested on its own.

use serde_json::Value;

use chat_relay_core::extract::non_empty_str_field;
use chat_relay_core::{Extractor, Strategy};

fn first_candidate_content(value: &Value) -> Option<&Value> {
    value
        .get("candidates")?
        .as_array()?
        .first()?
        .get("content")
}

fn join_part_texts(parts: &[Value]) -> String {
    parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect()
}

/// `candidates[0].content.parts[*].text`, concatenated.
fn candidate_parts(value: &Value) -> Option<String> {
    let parts = first_candidate_content(value)?.get("parts")?.as_array()?;
    Some(join_part_texts(parts))
}

/// `candidates[0].content` given directly as a string.
fn candidate_text(value: &Value) -> Option<String> {
    first_candidate_content(value)?.as_str().map(str::to_string)
}

/// `candidates[0].content` as an array of strings, `{text}` or `{parts}`.
fn candidate_content_list(value: &Value) -> Option<String> {
    let items = first_candidate_content(value)?.as_array()?;
    Some(
        items
            .iter()
            .map(|item| {
                if let Some(text) = item.as_str() {
                    return text.to_string();
                }
                if let Some(text) = item.get("text").and_then(Value::as_str) {
                    return text.to_string();
                }
                item.get("parts")
                    .and_then(Value::as_array)
                    .map(|parts| join_part_texts(parts))
                    .unwrap_or_default()
            })
            .collect(),
    )
}

/// The whole payload is a string.
fn bare_string(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

/// A top-level `text` field.
fn text_field(value: &Value) -> Option<String> {
    non_empty_str_field(value, "text")
}

/// `output[*]` entries as strings or `{content: [{text}]}`, one per line.
fn output_list(value: &Value) -> Option<String> {
    let outputs = value.get("output")?.as_array()?;
    let lines: Vec<String> = outputs
        .iter()
        .map(|output| {
            if let Some(text) = output.as_str() {
                return text.to_string();
            }
            output
                .get("content")
                .and_then(Value::as_array)
                .map(|content| join_part_texts(content))
                .unwrap_or_default()
        })
        .collect();
    Some(lines.join("\n"))
}

/// `choices[0].text`, the completion-style shape.
fn choice_text(value: &Value) -> Option<String> {
    let choice = value.get("choices")?.as_array()?.first()?;
    non_empty_str_field(choice, "text")
}

const UPSTREAM_STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "candidate_parts",
        extract: candidate_parts,
    },
    Strategy {
        name: "candidate_text",
        extract: candidate_text,
    },
    Strategy {
        name: "candidate_content_list",
        extract: candidate_content_list,
    },
    Strategy {
        name: "bare_string",
        extract: bare_string,
    },
    Strategy {
        name: "text_field",
        extract: text_field,
    },
    Strategy {
        name: "output_list",
        extract: output_list,
    },
    Strategy {
        name: "choice_text",
        extract: choice_text,
    },
];

/// Ordered extraction chain for upstream model responses.
pub const UPSTREAM_TEXT: Extractor = Extractor::new(UPSTREAM_STRATEGIES);

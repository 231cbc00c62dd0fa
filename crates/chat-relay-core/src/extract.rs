//! Reply text extraction.
//!
//! Different backends put the reply text in different places. An
//! [`Extractor`] holds an ordered list of named [`Strategy`] values and
//! returns the result of the first one that recognises the payload shape.

use serde_json::Value;

/// One way of locating reply text inside a JSON payload.
#[derive(Debug, Clone, Copy)]
pub struct Strategy {
    /// Short name used in logs.
    pub name: &'static str,
    /// Returns `Some` when the payload has the shape this strategy handles.
    pub extract: fn(&Value) -> Option<String>,
}

impl Strategy {
    /// Apply the strategy to a payload.
    #[must_use]
    pub fn apply(&self, value: &Value) -> Option<String> {
        (self.extract)(value)
    }
}

/// Ordered chain of extraction strategies.
#[derive(Debug, Clone, Copy)]
pub struct Extractor {
    strategies: &'static [Strategy],
}

impl Extractor {
    /// Build an extractor from an ordered strategy list.
    #[must_use]
    pub const fn new(strategies: &'static [Strategy]) -> Self {
        Self { strategies }
    }

    /// The strategies in the order they are tried.
    #[must_use]
    pub const fn strategies(&self) -> &'static [Strategy] {
        self.strategies
    }

    /// Return the text found by the first matching strategy.
    #[must_use]
    pub fn extract(&self, value: &Value) -> Option<String> {
        self.strategies.iter().find_map(|strategy| {
            let text = strategy.apply(value)?;
            tracing::trace!(strategy = strategy.name, "Reply text extracted");
            Some(text)
        })
    }

    /// Like [`Extractor::extract`], falling back to an empty string.
    #[must_use]
    pub fn extract_or_empty(&self, value: &Value) -> String {
        self.extract(value).unwrap_or_default()
    }
}

/// Return the named field when it holds a non-empty string.
#[must_use]
pub fn non_empty_str_field(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn content_field(value: &Value) -> Option<String> {
    non_empty_str_field(value, "content")
}

fn answer_field(value: &Value) -> Option<String> {
    non_empty_str_field(value, "answer")
}

fn text_field(value: &Value) -> Option<String> {
    non_empty_str_field(value, "text")
}

const REPLY_STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "content",
        extract: content_field,
    },
    Strategy {
        name: "answer",
        extract: answer_field,
    },
    Strategy {
        name: "text",
        extract: text_field,
    },
];

/// Strategies for the gateway's JSON reply body: `content`, `answer`, `text`.
pub const REPLY_FIELDS: Extractor = Extractor::new(REPLY_STRATEGIES);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reply_fields_in_priority_order() {
        let body = json!({"content": "a", "answer": "b", "text": "c"});
        assert_eq!(REPLY_FIELDS.extract(&body).as_deref(), Some("a"));

        let body = json!({"answer": "b", "text": "c"});
        assert_eq!(REPLY_FIELDS.extract(&body).as_deref(), Some("b"));

        let body = json!({"text": "c"});
        assert_eq!(REPLY_FIELDS.extract(&body).as_deref(), Some("c"));
    }

    #[test]
    fn empty_fields_fall_through() {
        let body = json!({"content": "", "text": "fallback"});
        assert_eq!(REPLY_FIELDS.extract(&body).as_deref(), Some("fallback"));
    }

    #[test]
    fn unknown_shape_yields_empty() {
        assert_eq!(REPLY_FIELDS.extract(&json!({"reply": 1})), None);
        assert_eq!(REPLY_FIELDS.extract_or_empty(&json!([1, 2])), "");
    }

    #[test]
    fn each_strategy_is_independent() {
        let names: Vec<_> = REPLY_FIELDS.strategies().iter().map(|s| s.name).collect();
        assert_eq!(names, ["content", "answer", "text"]);

        let answer = &REPLY_FIELDS.strategies()[1];
        assert_eq!(answer.apply(&json!({"answer": "x"})).as_deref(), Some("x"));
        assert_eq!(answer.apply(&json!({"content": "x"})), None);
    }
}

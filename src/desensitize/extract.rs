//! Local-model PII extraction.
//!
//! A completion-style prompt shows the model one worked example and ends
//! with `Output: [`, inviting it to finish a JSON array of
//! `{"type": ..., "value": ...}` objects. Stop sequences cut the reply off
//! before the model starts hallucinating a second task. Extraction runs
//! only against the local endpoint; the raw content never leaves the device.

use crate::desensitize::PrivacyEntity;
use crate::error::Result;
use crate::model::{GenerateOptions, LanguageModel};
use std::sync::Arc;

/// Cap on the content snippet sent to the model.
const MAX_CONTENT_CHARS: usize = 3000;

/// Sentinels marking the boundary between the completion and whatever the
/// model would invent next.
const STOP_SEQUENCES: &[&str] = &["\n\n", "Input:", "Task:"];

/// Minimum entity value length worth redacting.
const MIN_VALUE_CHARS: usize = 2;

/// Extracts `(type, value)` privacy entities from content via the local model.
pub struct PiiExtractor {
    model: Arc<dyn LanguageModel>,
}

impl PiiExtractor {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Extract privacy entities from `content`. Transport errors propagate;
    /// a reply that is not a JSON array simply yields no entities.
    pub async fn extract(&self, content: &str) -> Result<Vec<PrivacyEntity>> {
        let snippet = truncate_chars(content, MAX_CONTENT_CHARS);
        let prompt = extraction_prompt(snippet);
        let options = GenerateOptions::default()
            .with_temperature(0.05)
            .with_num_predict(512)
            .with_stop(STOP_SEQUENCES);

        let reply = self.model.generate(&prompt, &options).await?;
        Ok(parse_entities(&reply))
    }
}

/// Completion prompt: task description, one worked example, and an opened
/// output bracket for the model to finish.
fn extraction_prompt(content: &str) -> String {
    format!(
        "Task: extract privacy entities from the input as a JSON array of \
{{\"type\", \"value\"}} objects. Types include name, phone, email, address, \
access_code, delivery, id, card, secret, salary, amount, date, birthday. \
The input may be English or Chinese.\n\
Input: Call Zhang Wei at 13588889999, the pickup code is 7731.\n\
Output: [{{\"type\": \"name\", \"value\": \"Zhang Wei\"}}, \
{{\"type\": \"phone\", \"value\": \"13588889999\"}}, \
{{\"type\": \"access_code\", \"value\": \"7731\"}}]\n\
Input: {content}\n\
Output: ["
    )
}

/// Re-close the completion and parse it leniently: prefix the `[` the prompt
/// already opened, drop anything after the last `]`, and keep only entries
/// with string type/value and a value of at least two characters.
pub(crate) fn parse_entities(reply: &str) -> Vec<PrivacyEntity> {
    let mut text = format!("[{}", reply.trim());
    match text.rfind(']') {
        Some(index) => text.truncate(index + 1),
        None => return Vec::new(),
    }

    let Ok(serde_json::Value::Array(items)) = serde_json::from_str(&text) else {
        tracing::debug!("extractor reply was not a JSON array");
        return Vec::new();
    };

    items
        .into_iter()
        .filter_map(|item| {
            let kind = item.get("type")?.as_str()?.to_string();
            let value = item.get("value")?.as_str()?.to_string();
            (value.chars().count() >= MIN_VALUE_CHARS).then_some(PrivacyEntity { kind, value })
        })
        .collect()
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_ends_with_open_bracket() {
        let prompt = extraction_prompt("some content");
        assert!(prompt.ends_with("Output: ["));
        assert!(prompt.contains("Input: some content"));
    }

    #[test]
    fn parses_completion_without_leading_bracket() {
        let reply = r#"{"type": "phone", "value": "13912345678"}, {"type": "email", "value": "a@b.cn"}]"#;
        let entities = parse_entities(reply);
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].kind, "phone");
        assert_eq!(entities[1].value, "a@b.cn");
    }

    #[test]
    fn trailing_chatter_after_array_dropped() {
        let reply = r#"{"type": "name", "value": "Jane Doe"}] and that is all I found"#;
        let entities = parse_entities(reply);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].value, "Jane Doe");
    }

    #[test]
    fn invalid_json_yields_empty() {
        assert!(parse_entities("sorry, I cannot help with that").is_empty());
        assert!(parse_entities(r#"{"type": "phone", "#).is_empty());
    }

    #[test]
    fn non_object_and_short_values_filtered() {
        let reply = r#""loose string", {"type": "code", "value": "7"}, {"type": "code", "value": "77"}, {"type": 3, "value": "abc"}]"#;
        let entities = parse_entities(reply);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].value, "77");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "身份证".repeat(2000);
        let snippet = truncate_chars(&text, MAX_CONTENT_CHARS);
        assert_eq!(snippet.chars().count(), MAX_CONTENT_CHARS);
    }
}

//! Desensitization: replace privacy-entity values with typed opaque tokens.
//!
//! The map from entity to token is deliberately discarded; redaction here
//! is one-way. Extraction is model-backed when a local model is available;
//! otherwise a small ordered list of regex substitutions catches the worst
//! offenders (API keys, `token=`, `password=`).

pub mod extract;

pub use extract::PiiExtractor;

use crate::model::LanguageModel;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};

/// A privacy entity extracted from content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyEntity {
    /// Open-ended type label as the extractor produced it ("phone",
    /// "pickup code", …). Normalized to a closed token set on redaction.
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

/// Canonical redaction-token types and the extractor labels that map to
/// them. Lookup is case-insensitive with spaces folded to underscores;
/// unknown labels pass through uppercased.
const TOKEN_ALIASES: &[(&str, &str)] = &[
    ("name", "NAME"),
    ("person", "NAME"),
    ("person_name", "NAME"),
    ("phone", "PHONE"),
    ("phone_number", "PHONE"),
    ("mobile", "PHONE"),
    ("telephone", "PHONE"),
    ("email", "EMAIL"),
    ("email_address", "EMAIL"),
    ("address", "ADDRESS"),
    ("home_address", "ADDRESS"),
    ("location", "ADDRESS"),
    ("access_code", "ACCESS_CODE"),
    ("code", "ACCESS_CODE"),
    ("pickup_code", "ACCESS_CODE"),
    ("pin", "ACCESS_CODE"),
    ("delivery", "DELIVERY"),
    ("tracking_number", "DELIVERY"),
    ("express", "DELIVERY"),
    ("id", "ID"),
    ("id_card", "ID"),
    ("id_number", "ID"),
    ("identity", "ID"),
    ("passport", "ID"),
    ("card", "CARD"),
    ("bank_card", "CARD"),
    ("credit_card", "CARD"),
    ("card_number", "CARD"),
    ("secret", "SECRET"),
    ("api_key", "SECRET"),
    ("token", "SECRET"),
    ("password", "SECRET"),
    ("private_key", "SECRET"),
    ("ip", "IP"),
    ("ip_address", "IP"),
    ("license", "LICENSE"),
    ("license_plate", "LICENSE"),
    ("plate", "LICENSE"),
    ("time", "TIME"),
    ("date", "DATE"),
    ("salary", "SALARY"),
    ("income", "SALARY"),
    ("amount", "AMOUNT"),
    ("money", "AMOUNT"),
    ("payment", "PAYMENT"),
    ("birthday", "BIRTHDAY"),
    ("birth_date", "BIRTHDAY"),
    ("dob", "BIRTHDAY"),
];

/// Ordered rule-only fallback: pattern plus replacement token.
static FALLBACK_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"\bsk-[A-Za-z0-9_\-]{8,}\b").expect("sk key pattern"),
            "[REDACTED:SECRET]",
        ),
        (
            Regex::new(r"(?i)\btoken=\S+").expect("token pattern"),
            "token=[REDACTED:SECRET]",
        ),
        (
            Regex::new(r"(?i)\bpassword=\S+").expect("password pattern"),
            "password=[REDACTED:SECRET]",
        ),
    ]
});

/// Normalize an extractor label to a canonical token type.
pub fn normalize_token_type(kind: &str) -> String {
    let folded = kind.trim().to_lowercase().replace(' ', "_");
    for (alias, canonical) in TOKEN_ALIASES {
        if folded == *alias {
            return (*canonical).to_string();
        }
    }
    folded.to_uppercase()
}

/// The bracket token an entity of the given type is replaced with.
pub fn redaction_token(kind: &str) -> String {
    format!("[REDACTED:{}]", normalize_token_type(kind))
}

/// A message prefixed with this marker has already been through the router.
pub const REDACTION_MARKER: &str = "[REDACTED:";

/// Result of a desensitization pass.
#[derive(Debug, Clone)]
pub struct RedactionOutcome {
    pub text: String,
    /// Whether model-backed extraction produced the entity set, as opposed
    /// to the rule-only fallback.
    pub model_used: bool,
}

/// Replace every entity value in `content` with its typed token.
///
/// Values are replaced in descending length order so that an entity whose
/// value is a prefix of another's never clips the longer one. The
/// post-condition (no entity value survives as a substring) is verified
/// and, if violated by overlap effects, replacement is reapplied with the
/// surviving value first.
pub fn redact(content: &str, entities: &[PrivacyEntity]) -> String {
    let mut ordered: Vec<&PrivacyEntity> = entities
        .iter()
        .filter(|e| !e.value.is_empty())
        .collect();
    ordered.sort_by_key(|e| std::cmp::Reverse(e.value.chars().count()));

    let mut output = apply_replacements(content, &ordered);

    let leaked: Vec<&PrivacyEntity> = ordered
        .iter()
        .copied()
        .filter(|e| output.contains(&e.value))
        .collect();
    if !leaked.is_empty() {
        let mut reordered = leaked.clone();
        reordered.extend(ordered.iter().copied().filter(|e| {
            !leaked
                .iter()
                .any(|l| l.kind == e.kind && l.value == e.value)
        }));
        output = apply_replacements(content, &reordered);
    }

    output
}

fn apply_replacements(content: &str, ordered: &[&PrivacyEntity]) -> String {
    let mut output = content.to_string();
    for entity in ordered {
        let token = redaction_token(&entity.kind);
        output = output.replace(&entity.value, &token);
    }
    output
}

/// Rule-only redaction for when the model is disabled or unreachable.
pub fn redact_fallback(content: &str) -> String {
    let mut output = content.to_string();
    for (pattern, replacement) in FALLBACK_RULES.iter() {
        output = pattern.replace_all(&output, *replacement).into_owned();
    }
    output
}

/// Extraction plus redaction behind one seam.
pub struct Desensitizer {
    extractor: Option<PiiExtractor>,
}

impl Desensitizer {
    /// Model-backed when a model is supplied, rule-only otherwise.
    pub fn new(model: Option<Arc<dyn LanguageModel>>) -> Self {
        Self {
            extractor: model.map(PiiExtractor::new),
        }
    }

    /// Extract entities locally and redact them out of `content`.
    pub async fn desensitize(&self, content: &str) -> RedactionOutcome {
        if let Some(extractor) = &self.extractor {
            match extractor.extract(content).await {
                Ok(entities) => {
                    return RedactionOutcome {
                        text: redact(content, &entities),
                        model_used: true,
                    };
                }
                Err(e) => {
                    tracing::warn!("[S2] extraction failed, using rule fallback: {e}");
                }
            }
        }
        RedactionOutcome {
            text: redact_fallback(content),
            model_used: false,
        }
    }

    /// Extract entities without redacting (used to check residue).
    pub async fn extract(&self, content: &str) -> Vec<PrivacyEntity> {
        match &self.extractor {
            Some(extractor) => extractor.extract(content).await.unwrap_or_default(),
            None => Vec::new(),
        }
    }
}

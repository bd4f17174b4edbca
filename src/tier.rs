//! Core vocabulary for tiered privacy classification.
//!
//! Everything downstream (detectors, routing, persistence) speaks in terms
//! of the three sensitivity tiers and the lifecycle checkpoints defined here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Sensitivity tier assigned to content.
///
/// Total order: `S1 < S2 < S3`. Aggregation over multiple detectors takes
/// the supremum, and a session's highest observed tier never decreases.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum SensitivityTier {
    /// Public; safe for any model.
    S1,
    /// Sensitive; must be desensitized before leaving the device.
    S2,
    /// Private; never leaves the device, even desensitized.
    S3,
}

impl SensitivityTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::S1 => "S1",
            Self::S2 => "S2",
            Self::S3 => "S3",
        }
    }

    /// Parse a tier label as emitted by the local model (`"S1"`..`"S3"`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "S1" => Some(Self::S1),
            "S2" => Some(Self::S2),
            "S3" => Some(Self::S3),
            _ => None,
        }
    }

    /// The routing action this tier maps to. Total on all tiers.
    pub fn action(self) -> Action {
        match self {
            Self::S1 => Action::Passthrough,
            Self::S2 => Action::Desensitize,
            Self::S3 => Action::Redirect,
        }
    }

    /// Whether this tier marks a session as private.
    pub fn is_private(self) -> bool {
        matches!(self, Self::S2 | Self::S3)
    }
}

impl fmt::Display for SensitivityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing action derived from a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Forward unchanged to the host's chosen model.
    Passthrough,
    /// Replace privacy entities before anything leaves the device.
    Desensitize,
    /// Answer locally; the remote model never sees the content.
    Redirect,
}

/// Lifecycle checkpoint at which the orchestrator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    MessageReceived,
    ResolveModel,
    BeforeToolCall,
    AfterToolCall,
    ToolResultPersist,
    SessionEnd,
}

impl Checkpoint {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MessageReceived => "message_received",
            Self::ResolveModel => "resolve_model",
            Self::BeforeToolCall => "before_tool_call",
            Self::AfterToolCall => "after_tool_call",
            Self::ToolResultPersist => "tool_result_persist",
            Self::SessionEnd => "session_end",
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which detector produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    Rule,
    Semantic,
}

impl DetectorKind {
    /// Tie-break priority when two detectors agree on a tier. Rules carry
    /// concrete evidence, so they win over the model's judgement.
    pub fn priority(self) -> u8 {
        match self {
            Self::Rule => 2,
            Self::Semantic => 1,
        }
    }
}

/// What a detector gets to look at. Not every field is populated at every
/// checkpoint: a message checkpoint has no tool fields and vice versa.
#[derive(Debug, Clone, Default)]
pub struct DetectionContext {
    pub message_text: Option<String>,
    pub tool_name: Option<String>,
    pub tool_params: Option<Value>,
    pub tool_result: Option<String>,
    pub file_content_snippet: Option<String>,
    pub session_key: Option<String>,
    pub agent_id: Option<String>,
}

impl DetectionContext {
    pub fn for_message(text: impl Into<String>) -> Self {
        Self {
            message_text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn for_tool_call(name: impl Into<String>, params: Value) -> Self {
        Self {
            tool_name: Some(name.into()),
            tool_params: Some(params),
            ..Self::default()
        }
    }

    pub fn for_tool_result(name: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            tool_name: Some(name.into()),
            tool_result: Some(result.into()),
            ..Self::default()
        }
    }

    pub fn with_session(mut self, key: impl Into<String>) -> Self {
        self.session_key = Some(key.into());
        self
    }

    pub fn with_agent(mut self, id: impl Into<String>) -> Self {
        self.agent_id = Some(id.into());
        self
    }

    /// The text a semantic detector should judge, in field-priority order.
    pub fn primary_text(&self) -> Option<&str> {
        self.message_text
            .as_deref()
            .or(self.tool_result.as_deref())
            .or(self.file_content_snippet.as_deref())
    }
}

/// Outcome of a single detector run.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionResult {
    pub tier: SensitivityTier,
    pub reason: String,
    pub detector: DetectorKind,
    /// Confidence in `[0, 1]`. Rules always report `1.0`.
    pub confidence: f64,
}

impl DetectionResult {
    /// An `S1` result, used both for "nothing matched" and for detector
    /// failures (which must never stall the pipeline).
    pub fn clear(detector: DetectorKind, reason: impl Into<String>, confidence: f64) -> Self {
        Self {
            tier: SensitivityTier::S1,
            reason: reason.into(),
            detector,
            confidence,
        }
    }
}

/// One entry in a session's bounded detection history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub timestamp: DateTime<Utc>,
    pub tier: SensitivityTier,
    pub checkpoint: Checkpoint,
    pub reason: String,
}

impl DetectionRecord {
    pub fn new(tier: SensitivityTier, checkpoint: Checkpoint, reason: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            tier,
            checkpoint,
            reason: reason.into(),
        }
    }
}

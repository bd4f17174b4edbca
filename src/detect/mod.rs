//! Detector aggregation: scatter-gather over the checkpoint's enabled
//! detector set, reduced by tier supremum.
//!
//! The aggregator never fails as a whole. A detector that errors or times
//! out contributes S1 and the others proceed; ties between detectors that
//! agree on a tier go to the rule detector, which carries concrete evidence.

pub mod rules;
pub mod semantic;

pub use rules::detect_by_rules;
pub use semantic::SemanticDetector;

use crate::config::{CheckpointsConfig, CompiledRules, CurtainConfig, DetectorChoice};
use crate::error::Result;
use crate::model::LanguageModel;
use crate::tier::{Checkpoint, DetectionContext, DetectionResult, DetectorKind};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on a single semantic-detector run within a checkpoint.
const SEMANTIC_TIMEOUT_SECS: u64 = 20;

/// The checkpoint-aware detector set.
pub struct DetectorSet {
    rules: CompiledRules,
    semantic: Option<SemanticDetector>,
    checkpoints: CheckpointsConfig,
    semantic_timeout: Duration,
}

impl DetectorSet {
    /// Compile the rule tables and wire the semantic detector when a local
    /// model is available.
    pub fn new(config: &CurtainConfig, model: Option<Arc<dyn LanguageModel>>) -> Result<Self> {
        Ok(Self {
            rules: config.rules.compile()?,
            semantic: model.map(SemanticDetector::new),
            checkpoints: config.checkpoints.clone(),
            semantic_timeout: Duration::from_secs(SEMANTIC_TIMEOUT_SECS),
        })
    }

    pub fn rules(&self) -> &CompiledRules {
        &self.rules
    }

    /// Run the checkpoint's enabled detectors concurrently and reduce to
    /// the dominating tier.
    pub async fn detect(
        &self,
        context: &DetectionContext,
        checkpoint: Checkpoint,
    ) -> DetectionResult {
        let choices = self.checkpoints.detectors_for(checkpoint);
        if choices.is_empty() {
            return DetectionResult::clear(DetectorKind::Rule, "no detectors enabled", 1.0);
        }

        let run_rules = choices.contains(&DetectorChoice::RuleDetector);
        let run_semantic =
            choices.contains(&DetectorChoice::LocalModelDetector) && self.semantic.is_some();

        let rule_task = async {
            if run_rules {
                Some(detect_by_rules(context, &self.rules))
            } else {
                None
            }
        };
        let semantic_task = async {
            if !run_semantic {
                return None;
            }
            let detector = self.semantic.as_ref()?;
            match tokio::time::timeout(self.semantic_timeout, detector.detect(context)).await {
                Ok(result) => Some(result),
                Err(_) => {
                    tracing::warn!(
                        checkpoint = %checkpoint,
                        "[S1] semantic detector timed out after {:?}",
                        self.semantic_timeout
                    );
                    Some(DetectionResult::clear(
                        DetectorKind::Semantic,
                        "semantic detector timed out",
                        0.0,
                    ))
                }
            }
        };

        let (rule_result, semantic_result) = tokio::join!(rule_task, semantic_task);
        let results: Vec<DetectionResult> =
            [rule_result, semantic_result].into_iter().flatten().collect();

        reduce(results)
    }
}

/// Supremum over tiers; `Rule > Semantic` on ties; the reasons of every
/// detector that reported the winning tier are joined with `"; "`.
fn reduce(results: Vec<DetectionResult>) -> DetectionResult {
    let Some(top_tier) = results.iter().map(|r| r.tier).max() else {
        return DetectionResult::clear(DetectorKind::Rule, "no detectors ran", 1.0);
    };

    let mut winners: Vec<&DetectionResult> =
        results.iter().filter(|r| r.tier == top_tier).collect();
    winners.sort_by_key(|r| std::cmp::Reverse(r.detector.priority()));

    let lead = winners[0];
    let reason = winners
        .iter()
        .map(|r| r.reason.as_str())
        .collect::<Vec<_>>()
        .join("; ");

    DetectionResult {
        tier: top_tier,
        reason,
        detector: lead.detector,
        confidence: lead.confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CurtainError;
    use crate::model::{ChatMessage, GenerateOptions};
    use crate::tier::SensitivityTier;
    use async_trait::async_trait;

    struct FixedModel {
        reply: Option<String>,
    }

    #[async_trait]
    impl LanguageModel for FixedModel {
        async fn generate(&self, _: &str, _: &GenerateOptions) -> crate::error::Result<String> {
            self.respond()
        }

        async fn chat(
            &self,
            _: &[ChatMessage],
            _: &GenerateOptions,
        ) -> crate::error::Result<String> {
            self.respond()
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    impl FixedModel {
        fn respond(&self) -> crate::error::Result<String> {
            match &self.reply {
                Some(reply) => Ok(reply.clone()),
                None => Err(CurtainError::ModelTransport("down".into())),
            }
        }
    }

    fn detector_set(reply: Option<&str>) -> DetectorSet {
        let model: Arc<dyn LanguageModel> = Arc::new(FixedModel {
            reply: reply.map(str::to_string),
        });
        DetectorSet::new(&CurtainConfig::default(), Some(model)).unwrap()
    }

    #[tokio::test]
    async fn supremum_over_detectors() {
        // Rules say S1 ("hello"), the model says S2: the supremum wins.
        let set = detector_set(Some(r#"{"level": "S2", "reason": "model hunch", "confidence": 0.7}"#));
        let result = set
            .detect(
                &DetectionContext::for_message("hello there"),
                Checkpoint::MessageReceived,
            )
            .await;
        assert_eq!(result.tier, SensitivityTier::S2);
        assert_eq!(result.detector, DetectorKind::Semantic);
    }

    #[tokio::test]
    async fn rule_wins_tie_at_same_tier() {
        let set = detector_set(Some(
            r#"{"level": "S2", "reason": "model hunch", "confidence": 0.7}"#,
        ));
        let result = set
            .detect(
                &DetectionContext::for_message("my phone is 13912345678"),
                Checkpoint::MessageReceived,
            )
            .await;
        assert_eq!(result.tier, SensitivityTier::S2);
        assert_eq!(result.detector, DetectorKind::Rule);
        assert_eq!(result.confidence, 1.0);
        assert!(result.reason.contains("; "), "composite reason: {}", result.reason);
    }

    #[tokio::test]
    async fn failing_semantic_contributes_s1() {
        let set = detector_set(None);
        let result = set
            .detect(
                &DetectionContext::for_message("my phone is 13912345678"),
                Checkpoint::MessageReceived,
            )
            .await;
        // Rule detector still lands S2 even with the model down.
        assert_eq!(result.tier, SensitivityTier::S2);
        assert_eq!(result.detector, DetectorKind::Rule);
    }

    #[tokio::test]
    async fn tool_checkpoints_run_rules_only_by_default() {
        // The default config enables only the rule detector for tool calls,
        // so a "model" that would scream S3 is never consulted.
        let set = detector_set(Some(r#"{"level": "S3", "reason": "paranoid", "confidence": 1.0}"#));
        let result = set
            .detect(
                &DetectionContext::for_tool_call("calendar.list", serde_json::json!({})),
                Checkpoint::BeforeToolCall,
            )
            .await;
        assert_eq!(result.tier, SensitivityTier::S1);
    }

    #[tokio::test]
    async fn session_end_has_no_detectors() {
        let set = detector_set(Some(r#"{"level": "S3"}"#));
        let result = set
            .detect(
                &DetectionContext::for_message("bye"),
                Checkpoint::SessionEnd,
            )
            .await;
        assert_eq!(result.tier, SensitivityTier::S1);
        assert_eq!(result.reason, "no detectors enabled");
    }
}

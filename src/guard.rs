//! File-access guard for tool calls.
//!
//! Defense-in-depth behind the desensitized-prompt pathway: even if a cloud
//! model asks nicely, tool calls from non-guard sessions must not read the
//! full track, the full memory, or files already supplied desensitized.
//! Block-first: a blocked call returns a reason the host can surface, and
//! the agent must not retry.

use crate::detect::rules::path_matches;
use crate::files::{collect_param_paths, normalize_path};
use crate::session::{is_guard_session, SessionRegistry};
use crate::tier::SensitivityTier;
use serde_json::Value;
use std::path::Path;

/// Tool names treated as file reads for the pre-read check.
const READ_TOOL_NAMES: &[&str] = &["read", "read_file", "cat"];

/// Guard verdict for one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Block { reason: String },
}

impl GuardDecision {
    fn block(reason: impl Into<String>) -> Self {
        Self::Block {
            reason: reason.into(),
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Block { .. })
    }
}

/// Guards tool calls against protected local-only paths.
pub struct FileAccessGuard {
    /// Normalized roots no non-guard session may touch: the full-track
    /// sessions directory, the full memory file, the full memory directory.
    protected_roots: Vec<String>,
}

impl FileAccessGuard {
    pub fn new(full_track_dir: &Path, full_memory_file: &Path, full_memory_dir: &Path) -> Self {
        let protected_roots = [full_track_dir, full_memory_file, full_memory_dir]
            .iter()
            .map(|p| normalize_path(&p.to_string_lossy()))
            .collect();
        Self { protected_roots }
    }

    /// Evaluate one proposed tool call.
    ///
    /// `tier` is the aggregated detection tier for the call; classification
    /// runs before the guard so that rule hits on parameters (S3 paths)
    /// participate. Session marking stays with the orchestrator.
    pub fn evaluate(
        &self,
        tool_name: &str,
        params: &Value,
        session_key: &str,
        tier: SensitivityTier,
        sessions: &SessionRegistry,
    ) -> GuardDecision {
        let candidate_paths = collect_param_paths(params);

        // 1. Protected roots are invisible outside guard sessions.
        if !is_guard_session(session_key) {
            for path in &candidate_paths {
                let normalized = normalize_path(path);
                if self
                    .protected_roots
                    .iter()
                    .any(|root| path_matches(&normalized, root))
                {
                    return GuardDecision::block(format!(
                        "access to protected private history denied: {path}"
                    ));
                }
            }
        }

        // 2. Pre-read files were already supplied desensitized.
        if READ_TOOL_NAMES
            .iter()
            .any(|t| t.eq_ignore_ascii_case(tool_name))
        {
            for path in &candidate_paths {
                if sessions.is_file_pre_read(session_key, path) {
                    return GuardDecision::block(format!(
                        "{path} was already provided in desensitized form; \
                         answer from the supplied content instead of re-reading the file"
                    ));
                }
            }
        }

        // 3. Tier verdict: S3 blocks, S2 and below pass.
        if tier == SensitivityTier::S3 {
            return GuardDecision::block(format!(
                "tool call classified S3 ({tool_name}); blocked from leaving the device"
            ));
        }

        GuardDecision::Allow
    }
}

//! Per-session privacy state.
//!
//! Process-local registry indexed by session key. Three invariants hold for
//! every entry: `is_private` iff the highest tier is S2 or S3, the highest
//! tier only increases, and privacy never reverts except through an explicit
//! reset. A key containing `:guard:` marks a local-only guard session.

use crate::files::{extract_file_references, normalize_path};
use crate::tier::{Checkpoint, DetectionRecord, SensitivityTier};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

/// Bound on the per-session detection history ring.
pub const DETECTION_HISTORY_LIMIT: usize = 50;

/// Substring marking a session key as a local-only guard context.
pub const GUARD_KEY_MARKER: &str = ":guard:";

/// Suffix appended to a key to derive its paired guard-session key.
pub const GUARD_KEY_SUFFIX: &str = ":guard";

/// Whether a session key names a local-only guard context.
pub fn is_guard_session(key: &str) -> bool {
    key.contains(GUARD_KEY_MARKER) || key.ends_with(GUARD_KEY_SUFFIX)
}

/// Privacy state for one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionPrivacyState {
    pub session_key: String,
    pub is_private: bool,
    pub highest_tier: SensitivityTier,
    pub detection_history: VecDeque<DetectionRecord>,
    pub pre_read_files: HashSet<String>,
}

impl SessionPrivacyState {
    fn new(session_key: &str) -> Self {
        Self {
            session_key: session_key.to_string(),
            is_private: false,
            highest_tier: SensitivityTier::S1,
            detection_history: VecDeque::with_capacity(DETECTION_HISTORY_LIMIT),
            pre_read_files: HashSet::new(),
        }
    }
}

/// Process-wide session registry.
///
/// Read-mostly: checkpoint handlers take the write lock only to mutate.
/// Callers obtain a registry by reference from the orchestrator, never by
/// global name.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionPrivacyState>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the session's tier. Monotone: lower tiers never lower the
    /// stored supremum, and `is_private` follows the tier.
    pub fn mark_private(&self, key: &str, tier: SensitivityTier) {
        let mut sessions = self.sessions.write();
        let state = sessions
            .entry(key.to_string())
            .or_insert_with(|| SessionPrivacyState::new(key));
        state.highest_tier = state.highest_tier.max(tier);
        state.is_private = state.is_private || tier.is_private();
    }

    pub fn is_private(&self, key: &str) -> bool {
        self.sessions
            .read()
            .get(key)
            .map(|s| s.is_private)
            .unwrap_or(false)
    }

    pub fn highest_tier(&self, key: &str) -> SensitivityTier {
        self.sessions
            .read()
            .get(key)
            .map(|s| s.highest_tier)
            .unwrap_or(SensitivityTier::S1)
    }

    /// Append to the bounded detection history ring.
    pub fn record_detection(
        &self,
        key: &str,
        tier: SensitivityTier,
        checkpoint: Checkpoint,
        reason: &str,
    ) {
        let mut sessions = self.sessions.write();
        let state = sessions
            .entry(key.to_string())
            .or_insert_with(|| SessionPrivacyState::new(key));
        if state.detection_history.len() == DETECTION_HISTORY_LIMIT {
            state.detection_history.pop_front();
        }
        state
            .detection_history
            .push_back(DetectionRecord::new(tier, checkpoint, reason));
    }

    /// Scan a message for file references and register them as pre-read.
    /// Returns the references found, for logging.
    pub fn mark_pre_read_files(&self, key: &str, message: &str) -> Vec<String> {
        let references = extract_file_references(message);
        if references.is_empty() {
            return references;
        }
        let mut sessions = self.sessions.write();
        let state = sessions
            .entry(key.to_string())
            .or_insert_with(|| SessionPrivacyState::new(key));
        for reference in &references {
            state.pre_read_files.insert(normalize_path(reference));
        }
        references
    }

    /// Register a single file as pre-read for the session.
    pub fn add_pre_read_file(&self, key: &str, path: &str) {
        let mut sessions = self.sessions.write();
        let state = sessions
            .entry(key.to_string())
            .or_insert_with(|| SessionPrivacyState::new(key));
        state.pre_read_files.insert(normalize_path(path));
    }

    /// Whether a path was already supplied to the session desensitized.
    pub fn is_file_pre_read(&self, key: &str, path: &str) -> bool {
        let normalized = normalize_path(path);
        self.sessions
            .read()
            .get(key)
            .map(|s| s.pre_read_files.contains(&normalized))
            .unwrap_or(false)
    }

    /// Point-in-time copy of a session's state, for host audit surfaces.
    pub fn snapshot(&self, key: &str) -> Option<SessionPrivacyState> {
        self.sessions.read().get(key).cloned()
    }

    /// Explicit de-escalation: drop the session and its paired guard
    /// session (keys derived by appending `:guard`).
    pub fn reset(&self, key: &str) {
        let mut sessions = self.sessions.write();
        sessions.remove(key);
        let guard_prefix = format!("{key}{GUARD_KEY_SUFFIX}");
        sessions.retain(|k, _| k != &guard_prefix && !k.starts_with(&format!("{guard_prefix}:")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_is_monotone() {
        let registry = SessionRegistry::new();
        registry.mark_private("s1", SensitivityTier::S2);
        assert!(registry.is_private("s1"));
        assert_eq!(registry.highest_tier("s1"), SensitivityTier::S2);

        registry.mark_private("s1", SensitivityTier::S1);
        assert!(registry.is_private("s1"), "privacy must not revert");
        assert_eq!(registry.highest_tier("s1"), SensitivityTier::S2);

        registry.mark_private("s1", SensitivityTier::S3);
        assert_eq!(registry.highest_tier("s1"), SensitivityTier::S3);
    }

    #[test]
    fn s1_does_not_mark_private() {
        let registry = SessionRegistry::new();
        registry.mark_private("s1", SensitivityTier::S1);
        assert!(!registry.is_private("s1"));
        assert_eq!(registry.highest_tier("s1"), SensitivityTier::S1);
    }

    #[test]
    fn history_ring_is_bounded() {
        let registry = SessionRegistry::new();
        for i in 0..(DETECTION_HISTORY_LIMIT + 10) {
            registry.record_detection(
                "s1",
                SensitivityTier::S1,
                Checkpoint::MessageReceived,
                &format!("entry {i}"),
            );
        }
        let state = registry.snapshot("s1").unwrap();
        assert_eq!(state.detection_history.len(), DETECTION_HISTORY_LIMIT);
        assert_eq!(state.detection_history.back().unwrap().reason, "entry 59");
        assert_eq!(state.detection_history.front().unwrap().reason, "entry 10");
    }

    #[test]
    fn pre_read_files_from_message() {
        let registry = SessionRegistry::new();
        let found = registry.mark_pre_read_files("s1", "please check invoices/Q3.csv and b.xlsx");
        assert_eq!(found.len(), 2);
        assert!(registry.is_file_pre_read("s1", "invoices/Q3.csv"));
        assert!(registry.is_file_pre_read("s1", "./invoices/Q3.csv"));
        assert!(!registry.is_file_pre_read("s1", "other.csv"));
        assert!(!registry.is_file_pre_read("s2", "invoices/Q3.csv"));
    }

    #[test]
    fn unknown_extensions_not_registered() {
        let registry = SessionRegistry::new();
        let found = registry.mark_pre_read_files("s1", "run build.sh then open a.csv");
        assert_eq!(found, vec!["a.csv"]);
    }

    #[test]
    fn guard_session_keys() {
        assert!(is_guard_session("chat-1:guard:2"));
        assert!(is_guard_session("chat-1:guard"));
        assert!(!is_guard_session("chat-1"));
    }

    #[test]
    fn reset_removes_session_and_guard_pair() {
        let registry = SessionRegistry::new();
        registry.mark_private("chat-1", SensitivityTier::S3);
        registry.mark_private("chat-1:guard", SensitivityTier::S3);
        registry.mark_private("chat-1:guard:sub", SensitivityTier::S3);
        registry.mark_private("chat-2", SensitivityTier::S2);

        registry.reset("chat-1");
        assert!(!registry.is_private("chat-1"));
        assert!(!registry.is_private("chat-1:guard"));
        assert!(!registry.is_private("chat-1:guard:sub"));
        assert!(registry.is_private("chat-2"), "other sessions untouched");
    }
}

//! Curtain: privacy-protection middleware for AI agent runtimes.
//!
//! Sits between the user and the host agent runtime, classifies every
//! message into a sensitivity tier, and routes it so that privacy-tier data
//! never reaches a remote model:
//!
//! - **S1** passes through untouched.
//! - **S2** has its privacy entities extracted locally and replaced with
//!   typed `[REDACTED:…]` tokens before anything leaves the device.
//! - **S3** is answered by a local model; the cloud sees only a placeholder.
//!
//! The host emits six lifecycle checkpoints into [`PrivacyOrchestrator`];
//! detection combines a deterministic rule detector with a local-model
//! semantic detector, reduced by tier supremum. Persistence is dual-track
//! (a full history for the local model and audit, and an independently
//! projected clean history safe for cloud delivery), and the file-access
//! guard keeps tool calls away from the full track, the full memory, and
//! files already supplied in desensitized form.

pub mod config;
pub mod desensitize;
pub mod detect;
pub mod error;
pub mod events;
pub mod files;
pub mod guard;
pub mod history;
pub mod memory;
pub mod model;
pub mod orchestrator;
pub mod session;
pub mod tier;

pub use config::CurtainConfig;
pub use desensitize::{redact, Desensitizer, PrivacyEntity, RedactionOutcome};
pub use error::{CurtainError, Result};
pub use events::{BroadcastEventBus, EventSink, PrivacyEvent};
pub use files::{DocumentConverter, FileReader, SpreadsheetConverter};
pub use guard::{FileAccessGuard, GuardDecision};
pub use history::{DualTrackStore, HistoryRecord, Track};
pub use memory::{MemoryManager, MemoryWriteOptions};
pub use model::{LanguageModel, OllamaClient};
pub use orchestrator::{PrivacyOrchestrator, RoutingDecision};
pub use session::{SessionPrivacyState, SessionRegistry};
pub use tier::{
    Action, Checkpoint, DetectionContext, DetectionResult, DetectorKind, SensitivityTier,
};

//! Error taxonomy for the privacy middleware.
//!
//! Non-security failures degrade the pipeline conservatively (a failing
//! semantic detector yields S1, a failing extractor yields no entities, a
//! failing redactor falls back to rules). Security failures, anything that
//! could leave the clean track ahead of or inconsistent with the full track,
//! surface as hard errors and are never swallowed.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CurtainError>;

#[derive(Error, Debug)]
pub enum CurtainError {
    /// Configuration rejected at load time (unknown key, invalid regex, …).
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// A detector exceeded its per-checkpoint timeout.
    #[error("detector timed out after {0:?}")]
    DetectorTimeout(std::time::Duration),

    /// The local model endpoint failed or returned a malformed reply.
    #[error("local model transport: {0}")]
    ModelTransport(String),

    /// The extractor reply could not be parsed as an entity array.
    #[error("extraction parse: {0}")]
    ExtractionParse(String),

    /// A track or memory write failed. Hard error when the clean track is
    /// involved: the dual-track invariant must not be silently violated.
    #[error("storage write: {0}")]
    StorageWrite(String),

    /// A referenced file could not be read or converted.
    #[error("file read {path}: {message}")]
    FileRead { path: String, message: String },

    /// A tool call was blocked by the file-access guard.
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

//! Error taxonomy for the SDM core.
//!
//! Every failure is immediately fatal to the operation in progress — there is
//! no retry or partial recovery inside the core. Counter saturation is defined
//! clamping behaviour, never an error.

use thiserror::Error;

/// Errors surfaced by the SDM core.
#[derive(Debug, Error)]
pub enum SdmError {
    /// `initialize`/`initialize_fixed` called on an already-initialized store.
    #[error("memory cannot be initialized more than once")]
    AlreadyInitialized,

    /// A write, read or serialize was attempted before initialization.
    #[error("memory has not been initialized")]
    NotInitialized,

    /// `initialize_fixed` was given fewer addresses than locations.
    #[error("not enough hard location addresses: need {needed}, got {got}")]
    InsufficientAddresses { needed: usize, got: usize },

    /// Vector dimensions, range bits or counter-table lengths do not match.
    #[error("geometry mismatch: {0}")]
    GeometryMismatch(String),

    /// Bad magic prefix or truncated stream during deserialization.
    #[error("format error: {0}")]
    Format(String),

    /// Underlying file or stream I/O failure.
    #[error("i/o error")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SdmError>;

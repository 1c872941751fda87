//! # SDM
//!
//! A Sparse Distributed Memory: a content-addressable associative store that
//! maps high-dimensional address vectors to accumulated value vectors through
//! a fixed population of hard locations, each activated when a query falls
//! within a configured distance radius and each keeping a running statistical
//! consensus of every value written to it.
//!
//! ## Components
//!
//! 1. [`Word`] — fixed-width vector of B-bit dimensions packed into 32-bit
//!    units, with Hamming/circular distance and majority reconstruction
//! 2. [`HardLocation`] — one fixed address plus a saturating counter table
//! 3. [`Memory`] — the engine: radius-activated write/read scans, per-scan
//!    diagnostics, and binary persistence of whole stores
//!
//! Behaviour switches (distance metric, counter width, write policy) live in
//! one [`SdmConfig`] chosen when a store is created; nothing reads ambient
//! global state. The engine is single-threaded by design — see [`Memory`].

pub mod config;
pub mod error;
pub mod location;
pub mod memory;
pub(crate) mod wire;
pub mod word;

pub use config::{CounterKind, DistanceMetric, SdmConfig};
pub use error::{Result, SdmError};
pub use location::HardLocation;
pub use memory::{Geometry, Memory, ReadResult, ScanStats};
pub use word::Word;

//! Store-wide behaviour configuration.
//!
//! The distance metric, counter width and write policy are fixed once when a
//! memory is created and shared by every component of that store. Components
//! read the configuration by reference; there is no ambient global state.

use serde::{Deserialize, Serialize};

/// Distance variant used for multi-valued (`range_bits > 1`) vectors.
///
/// Binary vectors always use Hamming distance; this choice only applies to the
/// per-dimension circular distances of wider ranges. Exactly one variant is
/// active per store, never mixed mid-computation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Sum of per-dimension circular distances.
    Manhattan,
    /// Square root of the sum of squared circular distances.
    Euclidean,
}

/// Width and saturation bounds of the evidence counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterKind {
    /// Unsigned 16-bit counters counting up from zero. In binary mode the
    /// decrement half of the write saturates at zero, so negative evidence is
    /// never recorded.
    Unsigned16,
    /// Signed 8-bit counters centered at zero. The classic Kanerva layout:
    /// binary writes push counters both ways.
    Signed8,
}

impl CounterKind {
    /// Lower saturation bound.
    pub fn min(self) -> i32 {
        match self {
            CounterKind::Unsigned16 => 0,
            CounterKind::Signed8 => i8::MIN as i32,
        }
    }

    /// Upper saturation bound.
    pub fn max(self) -> i32 {
        match self {
            CounterKind::Unsigned16 => u16::MAX as i32,
            CounterKind::Signed8 => i8::MAX as i32,
        }
    }

    /// Clamp an accumulated value into this kind's bounds.
    pub fn clamp(self, value: i32) -> i32 {
        value.clamp(self.min(), self.max())
    }
}

/// Behaviour switches for one memory store, chosen at creation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdmConfig {
    /// Distance variant for multi-valued vectors.
    pub metric: DistanceMetric,

    /// Counter width and saturation bounds.
    pub counter: CounterKind,

    /// Multi-valued write policy: when set, writing value `v` to a dimension
    /// also decrements every other slot in that dimension's counter slice,
    /// actively suppressing unobserved values.
    pub decrement_unmatched: bool,
}

impl Default for SdmConfig {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::Euclidean,
            counter: CounterKind::Signed8,
            decrement_unmatched: false,
        }
    }
}

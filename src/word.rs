//! Fixed-width bit-packed vector with distance and reconstruction semantics.
//!
//! A `Word` is an ordered sequence of N small-integer dimensions, each taking
//! one of `2^B` values (B in 1..=8), packed densely MSB-first into 32-bit
//! storage units. A dimension's bits may straddle a unit boundary when B does
//! not divide 32. Unused trailing bits of the last unit are kept zero and are
//! masked out of every metric computation.

use std::fmt;
use std::io::{Read, Write};

use rand::Rng;

use crate::config::DistanceMetric;
use crate::error::{Result, SdmError};
use crate::wire;

/// Width of one packed storage unit, in bits.
pub const UNIT_BITS: usize = 32;

/// A fixed-length vector of B-bit dimensions.
#[derive(Clone, PartialEq, Eq)]
pub struct Word {
    /// Number of dimensions (N).
    word_len: u16,
    /// Bits per dimension (B, 1..=8).
    range_bits: u8,
    /// Number of packed units: ceil(N*B / 32).
    num_units: u16,
    /// Bits of the last unit actually used; 0 when N*B is a multiple of 32.
    last_unit_bits: u16,
    /// Packed storage, MSB-first.
    units: Vec<u32>,
}

/// Unit count and used-bit count of the last unit for a given geometry.
fn unit_layout(word_len: u16, range_bits: u8) -> (u16, u16) {
    let total_bits = word_len as usize * range_bits as usize;
    let mut num_units = total_bits / UNIT_BITS;
    let last_unit_bits = total_bits % UNIT_BITS;
    if last_unit_bits > 0 {
        num_units += 1;
    }
    (num_units as u16, last_unit_bits as u16)
}

/// Pack dimension values densely MSB-first into 32-bit units.
fn pack_values(values: &[u8], range_bits: u8) -> Vec<u32> {
    let b = range_bits as usize;
    let total_bits = values.len() * b;
    let mut units = vec![0u32; (total_bits + UNIT_BITS - 1) / UNIT_BITS];

    for (i, &value) in values.iter().enumerate() {
        let bit = i * b;
        let unit = bit / UNIT_BITS;
        let offset = bit % UNIT_BITS;

        if offset + b <= UNIT_BITS {
            units[unit] |= (value as u32) << (UNIT_BITS - offset - b);
        } else {
            // Value straddles two units: high part ends this unit, low part
            // starts the next.
            let low_bits = offset + b - UNIT_BITS;
            units[unit] |= (value as u32) >> low_bits;
            units[unit + 1] |= (value as u32) << (UNIT_BITS - low_bits);
        }
    }

    units
}

impl Word {
    fn from_parts(word_len: u16, range_bits: u8, units: Vec<u32>) -> Self {
        let (num_units, last_unit_bits) = unit_layout(word_len, range_bits);
        debug_assert_eq!(units.len(), num_units as usize);
        Self {
            word_len,
            range_bits,
            num_units,
            last_unit_bits,
            units,
        }
    }

    /// Construct a word with uniformly random dimension values.
    pub fn random(word_len: u16, range_bits: u8, rng: &mut impl Rng) -> Self {
        let (num_units, last_unit_bits) = unit_layout(word_len, range_bits);
        let mut units: Vec<u32> = (0..num_units).map(|_| rng.gen::<u32>()).collect();

        // Keep the padding invariant: unused trailing bits stay zero.
        if last_unit_bits > 0 {
            if let Some(last) = units.last_mut() {
                *last &= u32::MAX << (UNIT_BITS - last_unit_bits as usize);
            }
        }

        Self {
            word_len,
            range_bits,
            num_units,
            last_unit_bits,
            units,
        }
    }

    /// Construct from a raw byte buffer holding the packed bit stream.
    ///
    /// Bytes are packed big-endian, four to a unit; an incomplete trailing
    /// unit and any units beyond the buffer are zero-padded. Fails when the
    /// buffer holds more bytes than the geometry can store.
    pub fn from_bytes(word_len: u16, range_bits: u8, bytes: &[u8]) -> Result<Self> {
        let (num_units, last_unit_bits) = unit_layout(word_len, range_bits);

        if bytes.len() > num_units as usize * 4 {
            return Err(SdmError::GeometryMismatch(format!(
                "{} bytes exceed the {} units implied by {} dimensions of {} bits",
                bytes.len(),
                num_units,
                word_len,
                range_bits
            )));
        }

        let mut units: Vec<u32> = bytes
            .chunks(4)
            .map(|chunk| {
                let mut unit = 0u32;
                for (i, &byte) in chunk.iter().enumerate() {
                    unit |= (byte as u32) << (24 - 8 * i);
                }
                unit
            })
            .collect();
        units.resize(num_units as usize, 0);

        if last_unit_bits > 0 {
            if let Some(last) = units.last_mut() {
                *last &= u32::MAX << (UNIT_BITS - last_unit_bits as usize);
            }
        }

        Ok(Self {
            word_len,
            range_bits,
            num_units,
            last_unit_bits,
            units,
        })
    }

    /// Number of dimensions.
    pub fn len(&self) -> usize {
        self.word_len as usize
    }

    /// True when the word has no dimensions.
    pub fn is_empty(&self) -> bool {
        self.word_len == 0
    }

    /// Bits per dimension.
    pub fn range_bits(&self) -> u8 {
        self.range_bits
    }

    /// Number of values a dimension can take: `2^range_bits`.
    pub fn range_size(&self) -> u32 {
        1 << self.range_bits
    }

    /// Number of packed storage units.
    pub fn num_units(&self) -> usize {
        self.num_units as usize
    }

    /// Raw storage unit at `index`.
    pub fn unit_at(&self, index: usize) -> u32 {
        self.units[index]
    }

    /// Extract the value of dimension `index`.
    ///
    /// Panics when `index` is out of range.
    pub fn int_at(&self, index: usize) -> u8 {
        assert!(index < self.word_len as usize, "dimension out of range");

        let b = self.range_bits as usize;
        let bit = index * b;
        let unit = bit / UNIT_BITS;
        let offset = bit % UNIT_BITS;
        let mask = (1u32 << b) - 1;

        if offset + b <= UNIT_BITS {
            ((self.units[unit] >> (UNIT_BITS - offset - b)) & mask) as u8
        } else {
            let low_bits = offset + b - UNIT_BITS;
            let high = self.units[unit] & ((1u32 << (b - low_bits)) - 1);
            let low = self.units[unit + 1] >> (UNIT_BITS - low_bits);
            ((high << low_bits) | low) as u8
        }
    }

    /// Iterate `(index, value)` over every dimension in order.
    ///
    /// The traversal is lazy, restartable and does not mutate the word.
    pub fn ints(&self) -> impl Iterator<Item = (usize, u8)> + '_ {
        (0..self.word_len as usize).map(move |i| (i, self.int_at(i)))
    }

    fn check_geometry(&self, other: &Word) -> Result<()> {
        if self.word_len != other.word_len || self.range_bits != other.range_bits {
            return Err(SdmError::GeometryMismatch(format!(
                "({} dims, {} bits) vs ({} dims, {} bits)",
                self.word_len, self.range_bits, other.word_len, other.range_bits
            )));
        }
        Ok(())
    }

    /// Distance to another word of identical geometry.
    ///
    /// Binary words use Hamming distance (an integer in `[0, N]`); wider
    /// ranges use per-dimension circular distance accumulated according to
    /// `metric`. Dimension values are categorical and wrap around, so the
    /// per-dimension distance is `min(|a-b|, range_size - |a-b|)`.
    pub fn distance_to(&self, other: &Word, metric: DistanceMetric) -> Result<f32> {
        self.check_geometry(other)?;

        if self.range_bits == 1 {
            let mut dist = 0u32;
            for i in 0..self.units.len() {
                let mut xored = self.units[i] ^ other.units[i];
                if self.last_unit_bits > 0 && i == self.units.len() - 1 {
                    xored &= u32::MAX << (UNIT_BITS - self.last_unit_bits as usize);
                }
                dist += xored.count_ones();
            }
            return Ok(dist as f32);
        }

        let range_size = self.range_size();
        let mut sum = 0.0f32;
        for ((_, a), (_, b)) in self.ints().zip(other.ints()) {
            let diff = (a as u32).abs_diff(b as u32);
            let circular = diff.min(range_size - diff);
            match metric {
                DistanceMetric::Manhattan => sum += circular as f32,
                DistanceMetric::Euclidean => sum += (circular * circular) as f32,
            }
        }

        Ok(match metric {
            DistanceMetric::Manhattan => sum,
            DistanceMetric::Euclidean => sum.sqrt(),
        })
    }

    /// Bias this word's values toward `other` by iterated linear interpolation.
    ///
    /// Each dimension runs `iterations` rounds of
    /// `v <- clamp(trunc(v + (other_v - v) * scale), 0, range_size - 1)`,
    /// every round starting from the updated value, so more iterations
    /// converge geometrically toward `other`.
    pub fn imprint(&mut self, other: &Word, scale: f32, iterations: u32) -> Result<()> {
        self.check_geometry(other)?;

        let max_value = self.range_size() as i32 - 1;
        let mut values = Vec::with_capacity(self.len());

        for ((_, a), (_, b)) in self.ints().zip(other.ints()) {
            let mut value = a as i32;
            let target = b as i32;
            for _ in 0..iterations {
                let blended = (value as f32 + (target - value) as f32 * scale) as i32;
                value = blended.clamp(0, max_value);
            }
            values.push(value as u8);
        }

        self.units = pack_values(&values, self.range_bits);
        Ok(())
    }

    /// Reconstruct a word from an accumulated counter table.
    ///
    /// The table holds `2^range_bits` slots per dimension, so the result has
    /// `counters.len() / 2^range_bits` dimensions.
    ///
    /// Binary mode reads one signed counter per dimension (the first N slots
    /// of the table): positive means 1, negative means 0, zero is broken by a
    /// random bit. This path always reports `conclusive = true`, even with no
    /// evidence at all.
    ///
    /// Wider ranges take the argmax of each dimension's slot slice, first
    /// value winning ties; the whole result is conclusive only when some
    /// dimension had a strictly positive maximum. A dimension whose slice is
    /// entirely non-positive reconstructs as 0.
    pub fn from_counters(counters: &[i32], range_bits: u8, rng: &mut impl Rng) -> (Word, bool) {
        let range_size = 1usize << range_bits;
        debug_assert_eq!(counters.len() % range_size, 0);
        let word_len = counters.len() / range_size;

        if range_bits == 1 {
            let values: Vec<u8> = counters[..word_len]
                .iter()
                .map(|&c| {
                    if c > 0 {
                        1
                    } else if c < 0 {
                        0
                    } else {
                        rng.gen::<bool>() as u8
                    }
                })
                .collect();
            return (Self::from_values(word_len as u16, 1, &values), true);
        }

        let mut conclusive = false;
        let mut values = Vec::with_capacity(word_len);
        for dim in 0..word_len {
            let slice = &counters[dim * range_size..(dim + 1) * range_size];
            let mut max = 0i32;
            let mut value_at_max = 0u8;
            for (value, &count) in slice.iter().enumerate() {
                if count > max {
                    max = count;
                    value_at_max = value as u8;
                    conclusive = true;
                }
            }
            values.push(value_at_max);
        }

        (
            Self::from_values(word_len as u16, range_bits, &values),
            conclusive,
        )
    }

    /// Construct from explicit dimension values.
    ///
    /// Panics when a value does not fit in `range_bits` bits.
    pub fn from_values(word_len: u16, range_bits: u8, values: &[u8]) -> Self {
        assert_eq!(values.len(), word_len as usize, "value count mismatch");
        let range_size = 1u32 << range_bits;
        assert!(
            values.iter().all(|&v| (v as u32) < range_size),
            "value does not fit in {} bits",
            range_bits
        );
        Self::from_parts(word_len, range_bits, pack_values(values, range_bits))
    }

    /// Write the fixed-order binary encoding.
    pub fn serialize(&self, writer: &mut impl Write) -> Result<()> {
        wire::write_u16(writer, self.word_len)?;
        wire::write_u8(writer, self.range_bits)?;
        wire::write_u16(writer, self.num_units)?;
        wire::write_u16(writer, self.last_unit_bits)?;
        for &unit in &self.units {
            wire::write_u32(writer, unit)?;
        }
        Ok(())
    }

    /// Read back exactly the fields written by [`Word::serialize`].
    pub fn deserialize(reader: &mut impl Read) -> Result<Self> {
        let word_len = wire::read_u16(reader)?;
        let range_bits = wire::read_u8(reader)?;
        if !(1..=8).contains(&range_bits) {
            return Err(SdmError::Format(format!(
                "range bits must be in 1..=8, got {}",
                range_bits
            )));
        }
        let num_units = wire::read_u16(reader)?;
        let last_unit_bits = wire::read_u16(reader)?;

        let (expected_units, expected_last) = unit_layout(word_len, range_bits);
        if num_units != expected_units || last_unit_bits != expected_last {
            return Err(SdmError::Format(format!(
                "inconsistent word header: {} units / {} trailing bits for {} dims of {} bits",
                num_units, last_unit_bits, word_len, range_bits
            )));
        }

        let mut units = Vec::with_capacity(num_units as usize);
        for _ in 0..num_units {
            units.push(wire::read_u32(reader)?);
        }

        Ok(Self {
            word_len,
            range_bits,
            num_units,
            last_unit_bits,
            units,
        })
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Word(dims={}, bits={}, units={})",
            self.word_len, self.range_bits, self.num_units
        )
    }
}

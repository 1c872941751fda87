//! A hard location: one fixed address and a table of evidence counters.
//!
//! The counter table holds `2^B` slots per data dimension. Binary stores
//! collapse a dimension's two-value slice into a single signed counter at the
//! dimension's index, leaving the upper half of the table unused; the table
//! keeps its full length so accumulators and serialization stay uniform
//! across modes.

use std::io::{Read, Write};

use rand::Rng;

use crate::config::{CounterKind, SdmConfig};
use crate::error::{Result, SdmError};
use crate::wire;
use crate::word::Word;

/// One unit of storage in the memory. The address never changes after
/// construction; only the counters and diagnostics mutate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HardLocation {
    address: Word,
    data_dims: u16,
    counters: Vec<i32>,
    write_count: u32,
    /// Low nibble of each written datum's first storage unit. Diagnostics
    /// only; not serialized.
    write_history: Vec<u8>,
}

impl HardLocation {
    /// Create a location with the given address and a zeroed counter table
    /// sized for `data_dims` dimensions of the address's range.
    pub fn new(address: Word, data_dims: u16) -> Self {
        let table_len = data_dims as usize * address.range_size() as usize;
        Self {
            address,
            data_dims,
            counters: vec![0; table_len],
            write_count: 0,
            write_history: Vec::new(),
        }
    }

    /// The location's fixed address.
    pub fn address(&self) -> &Word {
        &self.address
    }

    /// The raw counter table.
    pub fn counters(&self) -> &[i32] {
        &self.counters
    }

    /// Number of writes absorbed by this location.
    pub fn write_count(&self) -> u32 {
        self.write_count
    }

    /// Fingerprints of every datum written here, in order.
    pub fn write_history(&self) -> &[u8] {
        &self.write_history
    }

    fn check_data_geometry(&self, data: &Word) -> Result<()> {
        if data.len() != self.data_dims as usize || data.range_bits() != self.address.range_bits() {
            return Err(SdmError::GeometryMismatch(format!(
                "data ({} dims, {} bits) does not match location ({} dims, {} bits)",
                data.len(),
                data.range_bits(),
                self.data_dims,
                self.address.range_bits()
            )));
        }
        Ok(())
    }

    /// Absorb one datum into the counters.
    ///
    /// Binary mode counts each bit up or down; wider ranges bump the slot of
    /// the observed value and, under the decrement-unmatched policy, push
    /// every other slot in the dimension's slice toward the floor. All
    /// arithmetic saturates at the configured bounds.
    pub fn write(&mut self, data: &Word, cfg: &SdmConfig) -> Result<()> {
        self.check_data_geometry(data)?;

        let counter = cfg.counter;
        if data.range_bits() == 1 {
            for (dim, bit) in data.ints() {
                if bit == 1 {
                    self.counters[dim] = saturating_inc(self.counters[dim], counter);
                } else {
                    self.counters[dim] = saturating_dec(self.counters[dim], counter);
                }
            }
        } else {
            let range_size = data.range_size() as usize;
            for (dim, value) in data.ints() {
                let base = dim * range_size;
                if cfg.decrement_unmatched {
                    for slot in base..base + range_size {
                        if slot == base + value as usize {
                            self.counters[slot] = saturating_inc(self.counters[slot], counter);
                        } else {
                            self.counters[slot] = saturating_dec(self.counters[slot], counter);
                        }
                    }
                } else {
                    let slot = base + value as usize;
                    self.counters[slot] = saturating_inc(self.counters[slot], counter);
                }
            }
        }

        self.write_count += 1;
        let fingerprint = if data.num_units() > 0 {
            (data.unit_at(0) & 0xF) as u8
        } else {
            0
        };
        self.write_history.push(fingerprint);
        Ok(())
    }

    /// Contribute this location's evidence into a shared accumulator.
    ///
    /// Binary mode votes once per dimension (positive counter +1, negative
    /// -1, zero broken by a random sign); wider ranges add the raw counters
    /// slot-wise. Consensus across locations is resolved later by
    /// [`Word::from_counters`].
    pub fn read(
        &self,
        accumulator: &mut [i32],
        cfg: &SdmConfig,
        rng: &mut impl Rng,
    ) -> Result<()> {
        if accumulator.len() != self.counters.len() {
            return Err(SdmError::GeometryMismatch(format!(
                "accumulator length {} does not match counter table length {}",
                accumulator.len(),
                self.counters.len()
            )));
        }

        let counter = cfg.counter;
        if self.address.range_bits() == 1 {
            for dim in 0..self.data_dims as usize {
                let vote = match self.counters[dim] {
                    c if c > 0 => 1,
                    c if c < 0 => -1,
                    _ => {
                        if rng.gen::<bool>() {
                            1
                        } else {
                            -1
                        }
                    }
                };
                accumulator[dim] = counter.clamp(accumulator[dim] + vote);
            }
        } else {
            for (acc, &c) in accumulator.iter_mut().zip(self.counters.iter()) {
                *acc = counter.clamp(*acc + c);
            }
        }

        Ok(())
    }

    /// Write count, address, then every counter at the configured width.
    pub fn serialize(&self, writer: &mut impl Write, cfg: &SdmConfig) -> Result<()> {
        wire::write_u32(writer, self.write_count)?;
        self.address.serialize(writer)?;
        for &c in &self.counters {
            match cfg.counter {
                CounterKind::Unsigned16 => wire::write_u16(writer, c as u16)?,
                CounterKind::Signed8 => wire::write_i8(writer, c as i8)?,
            }
        }
        Ok(())
    }

    /// Read back a location serialized with the same configuration.
    pub fn deserialize(reader: &mut impl Read, data_dims: u16, cfg: &SdmConfig) -> Result<Self> {
        let write_count = wire::read_u32(reader)?;
        let address = Word::deserialize(reader)?;

        let table_len = data_dims as usize * address.range_size() as usize;
        let mut counters = Vec::with_capacity(table_len);
        for _ in 0..table_len {
            let c = match cfg.counter {
                CounterKind::Unsigned16 => wire::read_u16(reader)? as i32,
                CounterKind::Signed8 => wire::read_i8(reader)? as i32,
            };
            counters.push(c);
        }

        Ok(Self {
            address,
            data_dims,
            counters,
            write_count,
            write_history: Vec::new(),
        })
    }
}

fn saturating_inc(value: i32, kind: CounterKind) -> i32 {
    if value < kind.max() {
        value + 1
    } else {
        value
    }
}

fn saturating_dec(value: i32, kind: CounterKind) -> i32 {
    if value > kind.min() {
        value - 1
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DistanceMetric;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io::Cursor;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(11)
    }

    fn signed_cfg() -> SdmConfig {
        SdmConfig::default()
    }

    fn unsigned_cfg() -> SdmConfig {
        SdmConfig {
            counter: CounterKind::Unsigned16,
            ..SdmConfig::default()
        }
    }

    #[test]
    fn test_binary_write_counts_both_ways() {
        let mut r = rng();
        let mut loc = HardLocation::new(Word::random(8, 1, &mut r), 8);
        let data = Word::from_bytes(8, 1, &[0b1111_0000]).unwrap();
        loc.write(&data, &signed_cfg()).unwrap();

        assert_eq!(&loc.counters()[..8], &[1, 1, 1, 1, -1, -1, -1, -1]);
        assert_eq!(loc.write_count(), 1);
    }

    #[test]
    fn test_binary_write_saturates() {
        let mut r = rng();
        let cfg = signed_cfg();
        let mut loc = HardLocation::new(Word::random(8, 1, &mut r), 8);
        let data = Word::from_bytes(8, 1, &[0b1111_0000]).unwrap();
        for _ in 0..300 {
            loc.write(&data, &cfg).unwrap();
        }
        assert_eq!(&loc.counters()[..8], &[127, 127, 127, 127, -128, -128, -128, -128]);
    }

    #[test]
    fn test_unsigned_counters_floor_at_zero() {
        let mut r = rng();
        let cfg = unsigned_cfg();
        let mut loc = HardLocation::new(Word::random(8, 1, &mut r), 8);
        let data = Word::from_bytes(8, 1, &[0b0000_0000]).unwrap();
        loc.write(&data, &cfg).unwrap();
        assert!(loc.counters()[..8].iter().all(|&c| c == 0));
    }

    #[test]
    fn test_multi_valued_write_increments_observed_slot() {
        let mut r = rng();
        let mut loc = HardLocation::new(Word::random(4, 2, &mut r), 4);
        let data = Word::from_values(4, 2, &[3, 0, 2, 2]);
        loc.write(&data, &signed_cfg()).unwrap();

        let c = loc.counters();
        assert_eq!(c[0 * 4 + 3], 1);
        assert_eq!(c[1 * 4 + 0], 1);
        assert_eq!(c[2 * 4 + 2], 1);
        assert_eq!(c[3 * 4 + 2], 1);
        assert_eq!(c.iter().sum::<i32>(), 4);
    }

    #[test]
    fn test_decrement_unmatched_policy() {
        let mut r = rng();
        let cfg = SdmConfig {
            decrement_unmatched: true,
            ..SdmConfig::default()
        };
        let mut loc = HardLocation::new(Word::random(1, 2, &mut r), 1);
        let data = Word::from_values(1, 2, &[3]);
        loc.write(&data, &cfg).unwrap();
        assert_eq!(loc.counters(), &[-1, -1, -1, 1]);

        // The floor holds under repetition.
        for _ in 0..300 {
            loc.write(&data, &cfg).unwrap();
        }
        assert_eq!(loc.counters(), &[-128, -128, -128, 127]);
    }

    #[test]
    fn test_write_geometry_mismatch() {
        let mut r = rng();
        let mut loc = HardLocation::new(Word::random(8, 1, &mut r), 8);
        let wrong_dims = Word::random(16, 1, &mut r);
        assert!(matches!(
            loc.write(&wrong_dims, &signed_cfg()),
            Err(SdmError::GeometryMismatch(_))
        ));
    }

    #[test]
    fn test_binary_read_votes() {
        let mut r = rng();
        let cfg = signed_cfg();
        let mut loc = HardLocation::new(Word::random(8, 1, &mut r), 8);
        let data = Word::from_bytes(8, 1, &[0b1010_0000]).unwrap();
        loc.write(&data, &cfg).unwrap();
        loc.write(&data, &cfg).unwrap();

        let mut acc = vec![0i32; 16];
        loc.read(&mut acc, &cfg, &mut r).unwrap();
        // One vote per dimension regardless of counter magnitude.
        assert_eq!(&acc[..8], &[1, -1, 1, -1, -1, -1, -1, -1]);
    }

    #[test]
    fn test_binary_read_tie_break_is_nonzero() {
        let mut r = rng();
        let cfg = signed_cfg();
        let loc = HardLocation::new(Word::random(8, 1, &mut r), 8);
        let mut acc = vec![0i32; 16];
        loc.read(&mut acc, &cfg, &mut r).unwrap();
        assert!(acc[..8].iter().all(|&v| v == 1 || v == -1));
    }

    #[test]
    fn test_multi_valued_read_sums_raw_counters() {
        let mut r = rng();
        let cfg = signed_cfg();
        let mut loc = HardLocation::new(Word::random(2, 2, &mut r), 2);
        let data = Word::from_values(2, 2, &[1, 3]);
        loc.write(&data, &cfg).unwrap();
        loc.write(&data, &cfg).unwrap();
        loc.write(&data, &cfg).unwrap();

        let mut acc = vec![0i32; 8];
        loc.read(&mut acc, &cfg, &mut r).unwrap();
        assert_eq!(acc, vec![0, 3, 0, 0, 0, 0, 0, 3]);
    }

    #[test]
    fn test_read_accumulator_length_mismatch() {
        let mut r = rng();
        let loc = HardLocation::new(Word::random(8, 1, &mut r), 8);
        let mut acc = vec![0i32; 4];
        assert!(matches!(
            loc.read(&mut acc, &signed_cfg(), &mut r),
            Err(SdmError::GeometryMismatch(_))
        ));
    }

    #[test]
    fn test_write_history_fingerprints() {
        let mut r = rng();
        let mut loc = HardLocation::new(Word::random(8, 1, &mut r), 8);
        let data = Word::from_bytes(8, 1, &[0b0000_0101]).unwrap();
        loc.write(&data, &signed_cfg()).unwrap();
        // from_bytes packs into the high byte, so the low nibble is zero here.
        assert_eq!(loc.write_history(), &[0]);

        let data32 = Word::from_bytes(8, 4, &[0, 0, 0, 0x2A]).unwrap();
        let mut loc32 = HardLocation::new(Word::random(8, 4, &mut r), 8);
        loc32.write(&data32, &signed_cfg()).unwrap();
        assert_eq!(loc32.write_history(), &[0xA]);
    }

    #[test]
    fn test_serialize_round_trip_signed() {
        let mut r = rng();
        let cfg = signed_cfg();
        let mut loc = HardLocation::new(Word::random(16, 1, &mut r), 16);
        let data = Word::random(16, 1, &mut r);
        for _ in 0..5 {
            loc.write(&data, &cfg).unwrap();
        }

        let mut buf = Vec::new();
        loc.serialize(&mut buf, &cfg).unwrap();
        let back = HardLocation::deserialize(&mut Cursor::new(buf), 16, &cfg).unwrap();

        assert_eq!(back.write_count(), loc.write_count());
        assert_eq!(back.address(), loc.address());
        assert_eq!(back.counters(), loc.counters());
    }

    #[test]
    fn test_serialize_round_trip_unsigned_wide_counts() {
        let mut r = rng();
        let cfg = unsigned_cfg();
        let mut loc = HardLocation::new(Word::random(4, 4, &mut r), 4);
        let data = Word::from_values(4, 4, &[7, 7, 7, 7]);
        for _ in 0..1000 {
            loc.write(&data, &cfg).unwrap();
        }
        assert_eq!(loc.counters()[7], 1000);

        let mut buf = Vec::new();
        loc.serialize(&mut buf, &cfg).unwrap();
        let back = HardLocation::deserialize(&mut Cursor::new(buf), 4, &cfg).unwrap();
        assert_eq!(back.counters(), loc.counters());
    }

    #[test]
    fn test_deserialize_truncated() {
        let mut r = rng();
        let cfg = signed_cfg();
        let loc = HardLocation::new(Word::random(16, 1, &mut r), 16);
        let mut buf = Vec::new();
        loc.serialize(&mut buf, &cfg).unwrap();
        buf.truncate(buf.len() - 1);
        let err = HardLocation::deserialize(&mut Cursor::new(buf), 16, &cfg).unwrap_err();
        assert!(matches!(err, SdmError::Format(_)));
    }

    #[test]
    fn test_address_distance_usable_for_activation() {
        let loc = HardLocation::new(Word::from_bytes(8, 1, &[0]).unwrap(), 8);
        let query = Word::from_bytes(8, 1, &[0b1000_0000]).unwrap();
        let d = query
            .distance_to(loc.address(), DistanceMetric::Euclidean)
            .unwrap();
        assert_eq!(d, 1.0);
    }
}

//! The memory engine: radius-activated scans over a fixed population of hard
//! locations, plus whole-store persistence.
//!
//! A `Memory` is single-threaded by design. `write` and `read` are
//! synchronous, non-reentrant, O(location count) scans with no internal
//! suspension points or locking; callers needing concurrency serialize calls
//! externally or partition locations across independent stores. Cooperative
//! cancellation of bulk loops belongs to the caller, between calls.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use rand::Rng;
use tracing::info;

use crate::config::SdmConfig;
use crate::error::{Result, SdmError};
use crate::location::HardLocation;
use crate::wire;
use crate::word::Word;

/// ASCII magic prefix of the persisted store format.
const FILE_MAGIC: &[u8] = b"?!SDM!?";

/// Geometry of a store, fixed at initialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    /// Dimensions of address words.
    pub addr_dims: u16,
    /// Dimensions of data words.
    pub data_dims: u16,
    /// Bits per dimension (1..=8) for both addresses and data.
    pub range_bits: u8,
    /// Number of hard locations.
    pub num_locations: usize,
    /// Activation radius: a location participates when its address is within
    /// this distance of the query.
    pub radius: u32,
}

/// Diagnostics from the most recent full scan.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScanStats {
    /// Locations whose distance fell within the radius.
    pub activations: usize,
    /// Mean distance over the full scan.
    pub mean_distance: f32,
    /// Minimum distance seen over the full scan.
    pub min_distance: f32,
}

/// Outcome of a read: the reconstructed word, whether any counter carried a
/// positive signal, and the scan diagnostics.
#[derive(Clone, Debug)]
pub struct ReadResult {
    pub value: Word,
    pub conclusive: bool,
    pub stats: ScanStats,
}

/// A sparse distributed memory store.
///
/// Lifecycle: created empty, initialized exactly once (random or fixed
/// addresses), then written/read any number of times and optionally
/// persisted. Location addresses are immutable after initialization; bias
/// them beforehand with [`Word::imprint`] and [`Memory::initialize_fixed`].
#[derive(Debug)]
pub struct Memory {
    config: SdmConfig,
    addr_dims: u16,
    data_dims: u16,
    range_bits: u8,
    radius: u32,
    write_count: u32,
    locations: Vec<HardLocation>,
    last_stats: ScanStats,
    initialized: bool,
}

impl Memory {
    /// Create an empty, uninitialized store with the given behaviour
    /// configuration.
    pub fn new(config: SdmConfig) -> Self {
        Self {
            config,
            addr_dims: 0,
            data_dims: 0,
            range_bits: 0,
            radius: 0,
            write_count: 0,
            locations: Vec::new(),
            last_stats: ScanStats::default(),
            initialized: false,
        }
    }

    fn check_geometry_params(geometry: &Geometry) -> Result<()> {
        if geometry.range_bits < 1 || geometry.range_bits > 8 {
            return Err(SdmError::GeometryMismatch(format!(
                "range bits must be in 1..=8, got {}",
                geometry.range_bits
            )));
        }
        Ok(())
    }

    /// One-time initialization with freshly randomized location addresses.
    pub fn initialize(&mut self, geometry: Geometry, rng: &mut impl Rng) -> Result<()> {
        if self.initialized {
            return Err(SdmError::AlreadyInitialized);
        }
        Self::check_geometry_params(&geometry)?;

        self.apply_geometry(&geometry);
        self.locations = (0..geometry.num_locations)
            .map(|_| {
                let addr = Word::random(geometry.addr_dims, geometry.range_bits, rng);
                HardLocation::new(addr, geometry.data_dims)
            })
            .collect();

        self.initialized = true;
        Ok(())
    }

    /// One-time initialization with caller-supplied location addresses.
    ///
    /// Takes the first `num_locations` addresses and ignores any extras;
    /// fails when fewer are provided or when an address does not match the
    /// store geometry.
    pub fn initialize_fixed(&mut self, geometry: Geometry, addrs: Vec<Word>) -> Result<()> {
        if self.initialized {
            return Err(SdmError::AlreadyInitialized);
        }
        Self::check_geometry_params(&geometry)?;

        if addrs.len() < geometry.num_locations {
            return Err(SdmError::InsufficientAddresses {
                needed: geometry.num_locations,
                got: addrs.len(),
            });
        }

        for addr in addrs.iter().take(geometry.num_locations) {
            if addr.len() != geometry.addr_dims as usize
                || addr.range_bits() != geometry.range_bits
            {
                return Err(SdmError::GeometryMismatch(format!(
                    "address ({} dims, {} bits) does not match geometry ({} dims, {} bits)",
                    addr.len(),
                    addr.range_bits(),
                    geometry.addr_dims,
                    geometry.range_bits
                )));
            }
        }

        self.apply_geometry(&geometry);
        self.locations = addrs
            .into_iter()
            .take(geometry.num_locations)
            .map(|addr| HardLocation::new(addr, geometry.data_dims))
            .collect();

        self.initialized = true;
        Ok(())
    }

    fn apply_geometry(&mut self, geometry: &Geometry) {
        self.addr_dims = geometry.addr_dims;
        self.data_dims = geometry.data_dims;
        self.range_bits = geometry.range_bits;
        self.radius = geometry.radius;
    }

    fn check_addr(&self, addr: &Word) -> Result<()> {
        if addr.len() != self.addr_dims as usize || addr.range_bits() != self.range_bits {
            return Err(SdmError::GeometryMismatch(format!(
                "address ({} dims, {} bits) does not match memory ({} dims, {} bits)",
                addr.len(),
                addr.range_bits(),
                self.addr_dims,
                self.range_bits
            )));
        }
        Ok(())
    }

    /// Scan all locations, activating those within the radius of `addr`.
    /// Calls `visit` on each activated location and returns the diagnostics.
    fn activation_scan<F>(&mut self, addr: &Word, mut visit: F) -> Result<ScanStats>
    where
        F: FnMut(&mut HardLocation) -> Result<()>,
    {
        let metric = self.config.metric;
        let radius = self.radius as f32;

        let mut sum = 0.0f32;
        let mut min = f32::MAX;
        let mut activations = 0usize;

        for location in &mut self.locations {
            let dist = addr.distance_to(location.address(), metric)?;

            if dist <= radius {
                visit(location)?;
                activations += 1;
            }

            sum += dist;
            if dist < min {
                min = dist;
            }
        }

        let len = self.locations.len();
        let stats = ScanStats {
            activations,
            mean_distance: if len > 0 { sum / len as f32 } else { 0.0 },
            min_distance: if len > 0 { min } else { 0.0 },
        };
        self.last_stats = stats;
        Ok(stats)
    }

    /// Write `data` into every location within the radius of `addr`.
    ///
    /// Always runs to completion over the full location set. A
    /// capacity-exhaustion failure mode is reserved for the future; today a
    /// write that activates nothing still succeeds.
    pub fn write(&mut self, addr: &Word, data: &Word) -> Result<ScanStats> {
        if !self.initialized {
            return Err(SdmError::NotInitialized);
        }
        self.check_addr(addr)?;
        if data.len() != self.data_dims as usize || data.range_bits() != self.range_bits {
            return Err(SdmError::GeometryMismatch(format!(
                "data ({} dims, {} bits) does not match memory ({} dims, {} bits)",
                data.len(),
                data.range_bits(),
                self.data_dims,
                self.range_bits
            )));
        }

        let config = self.config;
        let stats = self.activation_scan(addr, |location| location.write(data, &config))?;

        self.write_count += 1;
        Ok(stats)
    }

    /// Read the consensus value at `addr`.
    ///
    /// Every activated location contributes into a shared accumulator, then
    /// [`Word::from_counters`] reconstructs the result and its conclusiveness.
    pub fn read(&mut self, addr: &Word) -> Result<ReadResult> {
        if !self.initialized {
            return Err(SdmError::NotInitialized);
        }
        self.check_addr(addr)?;

        let config = self.config;
        let mut rng = rand::thread_rng();
        let mut accumulator =
            vec![0i32; self.data_dims as usize * (1usize << self.range_bits)];

        let stats = self.activation_scan(addr, |location| {
            location.read(&mut accumulator, &config, &mut rng)
        })?;

        let (value, conclusive) = Word::from_counters(&accumulator, self.range_bits, &mut rng);
        Ok(ReadResult {
            value,
            conclusive,
            stats,
        })
    }

    /// The store's behaviour configuration.
    pub fn config(&self) -> &SdmConfig {
        &self.config
    }

    /// Read-only view of the location population, for analysis tooling.
    pub fn locations(&self) -> &[HardLocation] {
        &self.locations
    }

    /// Diagnostics of the most recent write or read scan.
    pub fn last_stats(&self) -> ScanStats {
        self.last_stats
    }

    /// Total writes absorbed by the store.
    pub fn write_count(&self) -> u32 {
        self.write_count
    }

    /// Address-word dimensions.
    pub fn addr_dims(&self) -> u16 {
        self.addr_dims
    }

    /// Data-word dimensions.
    pub fn data_dims(&self) -> u16 {
        self.data_dims
    }

    /// Bits per dimension.
    pub fn range_bits(&self) -> u8 {
        self.range_bits
    }

    /// Activation radius.
    pub fn radius(&self) -> u32 {
        self.radius
    }

    /// True once the store has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Write the whole store: magic prefix, geometry, write counter, then
    /// every location in order. Progress is logged roughly every 10% of
    /// locations as an operational courtesy for multi-million-record stores.
    pub fn serialize(&self, writer: &mut impl Write) -> Result<()> {
        if !self.initialized {
            return Err(SdmError::NotInitialized);
        }

        writer.write_all(FILE_MAGIC)?;
        wire::write_i32(writer, self.addr_dims as i32)?;
        wire::write_i32(writer, self.data_dims as i32)?;
        wire::write_i32(writer, self.range_bits as i32)?;
        wire::write_i32(writer, self.radius as i32)?;
        wire::write_i32(writer, self.write_count as i32)?;
        wire::write_i32(writer, self.locations.len() as i32)?;

        let progress_interval = (self.locations.len() / 10).max(1);
        for (idx, location) in self.locations.iter().enumerate() {
            location.serialize(writer, &self.config)?;

            if (idx + 1) % progress_interval == 0 {
                let progress = (idx + 1) as f32 / self.locations.len() as f32 * 100.0;
                info!("save progress: {:.0}%", progress);
            }
        }

        Ok(())
    }

    /// Read back a store serialized with the same configuration. The result
    /// is immediately `Ready`.
    pub fn deserialize(reader: &mut impl Read, config: SdmConfig) -> Result<Self> {
        let mut magic = [0u8; FILE_MAGIC.len()];
        wire::read_exact(reader, &mut magic)?;
        if magic != *FILE_MAGIC {
            return Err(SdmError::Format("magic prefix not found".to_string()));
        }

        let addr_dims = wire::read_i32(reader)?;
        let data_dims = wire::read_i32(reader)?;
        let range_bits = wire::read_i32(reader)?;
        let radius = wire::read_i32(reader)?;
        let write_count = wire::read_i32(reader)?;
        let location_count = wire::read_i32(reader)?;

        // A corrupted or crafted header must fail cleanly, never feed an
        // out-of-range value into the geometry.
        let dim_range = 0..=u16::MAX as i32;
        if !dim_range.contains(&addr_dims) || !dim_range.contains(&data_dims) {
            return Err(SdmError::Format(format!(
                "dimension counts out of range: {} address / {} data",
                addr_dims, data_dims
            )));
        }
        if !(1..=8).contains(&range_bits) {
            return Err(SdmError::Format(format!(
                "range bits must be in 1..=8, got {}",
                range_bits
            )));
        }
        if radius < 0 || write_count < 0 || location_count < 0 {
            return Err(SdmError::Format(format!(
                "negative header field: radius {}, write count {}, location count {}",
                radius, write_count, location_count
            )));
        }

        let addr_dims = addr_dims as u16;
        let data_dims = data_dims as u16;
        let range_bits = range_bits as u8;
        let radius = radius as u32;
        let write_count = write_count as u32;
        let location_count = location_count as usize;

        let progress_interval = (location_count / 10).max(1);
        let mut locations = Vec::with_capacity(location_count);
        for idx in 0..location_count {
            locations.push(HardLocation::deserialize(reader, data_dims, &config)?);

            if (idx + 1) % progress_interval == 0 {
                let progress = (idx + 1) as f32 / location_count as f32 * 100.0;
                info!("load progress: {:.0}%", progress);
            }
        }

        info!("load completed; memory has {} total writes", write_count);

        Ok(Self {
            config,
            addr_dims,
            data_dims,
            range_bits,
            radius,
            write_count,
            locations,
            last_stats: ScanStats::default(),
            initialized: true,
        })
    }

    /// Persist the store to a file.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        self.serialize(&mut writer)?;
        writer.flush()?;

        let bytes = writer.stream_position()?;
        info!(
            "saved memory to {} (size: {:.2}MB)",
            path.as_ref().display(),
            bytes as f64 / (1024.0 * 1024.0)
        );
        Ok(())
    }

    /// Load a store persisted by [`Memory::save_to_file`] with the same
    /// configuration.
    pub fn load_from_file(path: impl AsRef<Path>, config: SdmConfig) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);
        Self::deserialize(&mut reader, config)
    }
}

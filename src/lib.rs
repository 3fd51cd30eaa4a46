//! Constant-memory cardinality approximation over any "since timestamp" window.
//!
//! A `Sketch` is a LogLog-Beta counter whose registers remember *when* they saw
//! what they saw. Every inserted item carries a timestamp, and the sketch can later
//! estimate the number of unique items inserted at or after any cutoff, not just over
//! its whole lifetime.
//!
//! * Memory does not grow with the length of the stream. Each bucket keeps only the
//!   observations that some cutoff still needs, which is a handful in practice.
//! * The relative error is chosen at construction; the number of buckets follows
//!   from it as in HyperLogLog (`1.04 / sqrt(m)`).
//! * A single bias-corrected formula (LogLog-Beta) covers the whole cardinality
//!   range, so there is no switch between small- and large-range estimators.
//!
//! ```rust
//! use sllb::Sketch;
//!
//! # fn main() -> Result<(), sllb::Error> {
//! // A sketch with a relative standard error of about 1%.
//! let mut sk = Sketch::new(0.01)?;
//!
//! // Timestamps are in whatever unit the caller likes; they only need to be comparable.
//! for t in 0..10_000u64 {
//!     sk.insert(t, format!("user-{}", t));
//! }
//! // Seeing an item again does not change the count.
//! sk.insert(9_999, "user-9999");
//!
//! // Everything ever inserted...
//! let all = sk.estimate(0);
//! assert!(all > 9_600 && all < 10_400);
//!
//! // ...or only what was inserted since timestamp 7500.
//! let recent = sk.estimate(7_500);
//! assert!(recent > 2_400 && recent < 2_600);
//!
//! // Nothing was inserted after the last timestamp.
//! assert_eq!(sk.estimate(10_000), 0);
//!
//! // Sketches built with the same parameters can be merged.
//! let mut other = Sketch::new(0.01)?;
//! for t in 10_000..15_000u64 {
//!     other.insert(t, format!("user-{}", t));
//! }
//! sk.union(&other)?;
//! let merged = sk.estimate(0);
//! assert!(merged > 14_400 && merged < 15_600);
//!
//! // If the `serialize`-feature is used, Sketches can be serialized/deserialized
//! // from any Reader/Writer.
//! #[cfg(feature = "serialize")]
//! {
//!     let mut buffer = Vec::new();
//!     sk.save(&mut buffer)?;
//!
//!     let loaded = Sketch::load(&buffer[..])?;
//!     assert_eq!(sk.estimate(7_500), loaded.estimate(7_500));
//! }
//! # Ok(())
//! # }
//! ```

mod error;
pub mod register;

pub use error::{Error, Result};
pub use register::{Observation, Register};

use metrohash::MetroHash64;
use std::hash::{self, Hasher};
use tracing::{debug, trace};

/// Bucket bits used by `Sketch::default()`: 2^14 buckets, a relative standard error
/// of about 0.8%. The beta coefficients are fitted for this bucket count.
pub const DEFAULT_BUCKET_BITS: u32 = 14;

/// Default upper bound for the precision value recorded per observation.
///
/// A bucket that only ever records values up to the cap stops distinguishing
/// larger windows once it saturates, so the cap bounds the cardinality range the
/// estimate can cover. With 32, a bucket saturates only after about 2^31 items.
pub const DEFAULT_MAX_PRECISION: u8 = 32;

/// Largest supported number of bucket bits (`p`).
///
/// The bucket index is taken from the top `p` bits of a 64-bit hash and at least 32
/// bits are left for the precision value.
pub const MAX_BUCKET_BITS: u32 = 32;

const HASH_SEED: u64 = 32;

fn alpha(m: usize) -> f64 {
    match m {
        16 => 0.673,
        32 => 0.697,
        64 => 0.709,
        _ => 0.7213 / (1.0 + 1.079 / m as f64),
    }
}

fn beta(ez: f64) -> f64 {
    let zl = (ez + 1.0).ln();
    -0.370_393_911 * ez
        + 0.070_471_823 * zl
        + 0.173_936_86 * zl.powi(2)
        + 0.163_398_39 * zl.powi(3)
        + -0.092_377_45 * zl.powi(4)
        + 0.037_380_27 * zl.powi(5)
        + -0.005_384_159 * zl.powi(6)
        + 0.000_424_19 * zl.powi(7)
}

/// 1-based position of the leftmost set bit of `x`, clipped to `max`.
fn rho(x: u64, max: u8) -> u8 {
    (x.leading_zeros() + 1).min(u32::from(max)) as u8
}

fn hash64(bytes: &[u8]) -> u64 {
    let mut hasher = MetroHash64::with_seed(HASH_SEED);
    hasher.write(bytes);
    hasher.finish()
}

/// Number of bucket bits needed for a relative standard error of `error_rate`.
fn bucket_bits(error_rate: f64) -> Result<u32> {
    if !(0.0 < error_rate && error_rate < 1.0) {
        return Err(Error::InvalidParameter(format!(
            "error rate must be between 0 and 1, got {}",
            error_rate
        )));
    }
    let p = (1.04 / error_rate).powi(2).log2().ceil() as u32;
    if p > MAX_BUCKET_BITS {
        return Err(Error::InvalidParameter(format!(
            "error rate {} needs 2^{} buckets, at most 2^{} are supported",
            error_rate, p, MAX_BUCKET_BITS
        )));
    }
    Ok(p)
}

/// Records the approximate number of unique elements seen since any point in time.
#[derive(Clone)]
pub struct Sketch {
    p: u32,
    max_precision: u8,
    alpha: f64,
    regs: Vec<Register>,
}

impl std::fmt::Debug for Sketch {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "Sketch {{ {} }}", self.estimate(0))
    }
}

impl Default for Sketch {
    fn default() -> Self {
        Self::empty(DEFAULT_BUCKET_BITS, DEFAULT_MAX_PRECISION)
    }
}

impl<T: hash::Hash> std::iter::FromIterator<(u64, T)> for Sketch {
    fn from_iter<I: IntoIterator<Item = (u64, T)>>(iter: I) -> Self {
        let mut sk = Self::default();
        iter.into_iter().for_each(|(t, v)| sk.insert(t, v));
        sk
    }
}

impl Sketch {
    /// A sketch with a relative standard error of about `error_rate`.
    ///
    /// Fails with [`Error::InvalidParameter`] unless `0 < error_rate < 1`, or if the
    /// error rate is so small (below about `1.6e-5`) that more than
    /// 2^[`MAX_BUCKET_BITS`] buckets would be needed.
    pub fn new(error_rate: f64) -> Result<Self> {
        Self::with_max_precision(error_rate, DEFAULT_MAX_PRECISION)
    }

    /// Like [`Sketch::new`], with an explicit cap on the recorded precision values.
    ///
    /// A lower cap saves a little memory per bucket but saturates buckets earlier,
    /// limiting the largest window that can be estimated accurately. The cap must lie
    /// in `1..=65 - p`, `p` being the number of bucket bits.
    pub fn with_max_precision(error_rate: f64, max_precision: u8) -> Result<Self> {
        let p = bucket_bits(error_rate)?;
        let sk = Self::from_parts(p, max_precision)?;
        debug!(
            error_rate,
            bucket_bits = sk.p,
            buckets = sk.regs.len(),
            alpha = sk.alpha,
            max_precision,
            "created sketch"
        );
        Ok(sk)
    }

    fn from_parts(p: u32, max_precision: u8) -> Result<Self> {
        if p == 0 || p > MAX_BUCKET_BITS {
            return Err(Error::InvalidParameter(format!(
                "bucket bits must be between 1 and {}, got {}",
                MAX_BUCKET_BITS, p
            )));
        }
        let limit = 65 - p;
        if max_precision == 0 || u32::from(max_precision) > limit {
            return Err(Error::InvalidParameter(format!(
                "precision cap must be between 1 and {} for {} bucket bits, got {}",
                limit, p, max_precision
            )));
        }
        Ok(Self::empty(p, max_precision))
    }

    fn empty(p: u32, max_precision: u8) -> Self {
        let m = 1usize << p;
        Self {
            p,
            max_precision,
            alpha: alpha(m),
            regs: vec![Register::new(); m],
        }
    }

    /// Number of hash bits used to select a bucket.
    pub fn bucket_bits(&self) -> u32 {
        self.p
    }

    /// Number of buckets, `2^bucket_bits`.
    pub fn num_buckets(&self) -> usize {
        self.regs.len()
    }

    /// The cap on recorded precision values.
    pub fn max_precision(&self) -> u8 {
        self.max_precision
    }

    /// The expected relative standard error of an estimate, `1.04 / sqrt(m)`.
    pub fn standard_error(&self) -> f64 {
        1.04 / (self.regs.len() as f64).sqrt()
    }

    /// `true` if nothing has been inserted yet.
    pub fn is_empty(&self) -> bool {
        self.regs.iter().all(Register::is_empty)
    }

    /// The per-bucket registers.
    pub fn registers(&self) -> &[Register] {
        &self.regs
    }

    /// Split a hash into its bucket index (top `p` bits) and precision value (rank
    /// of the remaining bits).
    fn bucket_and_precision(&self, h: u64) -> (usize, u8) {
        let bucket = (h >> (64 - self.p)) as usize;
        (bucket, rho(h << self.p, self.max_precision))
    }

    /// Add an element given by an already computed 64-bit hash.
    ///
    /// The hash must be uniformly distributed; use this to bring your own hash function.
    pub fn insert_hash(&mut self, timestamp: u64, h: u64) {
        let (bucket, precision) = self.bucket_and_precision(h);
        self.regs[bucket].insert(Observation::new(timestamp, precision));
    }

    /// Add an element at `timestamp`, using the element's Hash-implementation
    pub fn insert(&mut self, timestamp: u64, v: impl hash::Hash) {
        let mut hasher = MetroHash64::with_seed(HASH_SEED);
        v.hash(&mut hasher);
        self.insert_hash(timestamp, hasher.finish());
    }

    /// Add a single element given by raw bytes at `timestamp`
    pub fn insert_bytes(&mut self, timestamp: u64, v: &[u8]) {
        self.insert_hash(timestamp, hash64(v));
    }

    fn sum_and_zeros(&self, since: u64) -> (f64, f64) {
        let mut sum = 0.0;
        let mut ez = 0.0;
        for reg in self.regs.iter() {
            let r = reg.get(since);
            if r == 0 {
                ez += 1.0;
            }
            sum += 1.0 / 2f64.powi(i32::from(r));
        }
        (sum, ez)
    }

    /// The approximate number of unique elements inserted with a timestamp of at
    /// least `since`.
    pub fn estimate(&self, since: u64) -> u64 {
        let m = self.regs.len() as f64;
        let (sum, ez) = self.sum_and_zeros(since);
        let est = self.alpha * m * (m - ez) / (beta(ez) + sum);
        trace!(since, zeros = ez, estimate = est, "estimated cardinality");
        est as u64
    }

    /// Merge `other` into this sketch; afterwards this sketch answers every query as if
    /// it had seen the elements of both.
    ///
    /// Both sketches must have the same number of buckets and the same precision cap.
    pub fn union<'a>(&'a mut self, other: &Self) -> Result<&'a Self> {
        if self.p != other.p || self.max_precision != other.max_precision {
            return Err(Error::IncompatibleSketch {
                bucket_bits: self.p,
                max_precision: self.max_precision,
                other_bucket_bits: other.p,
                other_max_precision: other.max_precision,
            });
        }
        for (r, rr) in self.regs.iter_mut().zip(other.regs.iter()) {
            for obs in rr {
                r.insert(*obs);
            }
        }
        debug!(buckets = self.regs.len(), "merged sketches");
        Ok(&*self)
    }

    /// Serialize this Sketch to the given writer
    #[cfg(feature = "serialize")]
    pub fn save<W: std::io::Write>(&self, writer: W) -> Result<()> {
        use byteorder::{LittleEndian, WriteBytesExt};
        use std::convert::TryFrom;

        let mut writer = writer;
        writer.write_u8(self.p as u8)?;
        writer.write_u8(self.max_precision)?;
        for reg in self.regs.iter() {
            let len = u32::try_from(reg.len())
                .map_err(|_| Error::Malformed(format!("register too large: {}", reg.len())))?;
            writer.write_u32::<LittleEndian>(len)?;
            for obs in reg {
                writer.write_u64::<LittleEndian>(obs.timestamp)?;
                writer.write_u8(obs.precision)?;
            }
        }
        Ok(())
    }

    /// Deserialize a Sketch from the given reader
    #[cfg(feature = "serialize")]
    pub fn load<R: std::io::Read>(reader: R) -> Result<Self> {
        use byteorder::{LittleEndian, ReadBytesExt};
        use tracing::warn;

        let mut reader = reader;
        let p = u32::from(reader.read_u8()?);
        let max_precision = reader.read_u8()?;
        let mut sk = Self::from_parts(p, max_precision).map_err(|e| {
            warn!(error = %e, "rejected sketch header");
            Error::Malformed(e.to_string())
        })?;
        for (bucket, reg) in sk.regs.iter_mut().enumerate() {
            let len = reader.read_u32::<LittleEndian>()?;
            for _ in 0..len {
                let timestamp = reader.read_u64::<LittleEndian>()?;
                let precision = reader.read_u8()?;
                if precision == 0 || precision > max_precision {
                    warn!(bucket, precision, max_precision, "rejected sketch register");
                    return Err(Error::Malformed(format!(
                        "precision {} in bucket {} outside 1..={}",
                        precision, bucket, max_precision
                    )));
                }
                reg.insert(Observation::new(timestamp, precision));
            }
        }
        Ok(sk)
    }
}

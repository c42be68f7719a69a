//! Transaction identifiers.
//!
//! Every accepted mutation gets a ULID: 48 bits of millisecond time followed
//! by 80 random bits. The canonical 26-character encoding sorts the same way
//! as the underlying integer, so a transaction id is both the log ordering key
//! and a human-readable handle.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use ulid::{Generator, Ulid};

/// Monotonic, sortable transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxId(Ulid);

impl TxId {
    /// Create from an existing ULID.
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Get the underlying ULID.
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }

    /// Millisecond timestamp component.
    pub fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TxId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_str(s).map(Self)
    }
}

/// Produces strictly increasing transaction ids within this process.
///
/// Ids generated in the same millisecond increment the random component
/// instead of drawing a fresh one.
pub struct TxIdGenerator {
    inner: Mutex<Generator>,
}

impl Default for TxIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TxIdGenerator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Generator::new()),
        }
    }

    /// Next id, strictly greater than every id this generator returned before.
    pub fn next_id(&self) -> TxId {
        loop {
            // A poisoned guard still holds a valid generator.
            let mut generator = match self.inner.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            match generator.generate() {
                Ok(ulid) => return TxId(ulid),
                // Random component overflowed within this millisecond.
                Err(_) => {
                    drop(generator);
                    std::thread::yield_now();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_is_strictly_increasing() {
        let generator = TxIdGenerator::new();
        let ids: Vec<TxId> = (0..1000).map(|_| generator.next_id()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_string_order_matches_id_order() {
        let generator = TxIdGenerator::new();
        let a = generator.next_id();
        let b = generator.next_id();
        assert!(a.to_string() < b.to_string());
    }

    #[test]
    fn test_parse_round_trip() {
        let id = TxIdGenerator::new().next_id();
        let parsed: TxId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("not-a-ulid".parse::<TxId>().is_err());
    }
}

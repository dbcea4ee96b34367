//! Time-sortable 128-bit identifiers.
//!
//! A [`Ulid`] is 16 bytes: a 48-bit big-endian millisecond timestamp
//! followed by 80 bits of randomness. Ordering is plain byte-array
//! ordering, so identifiers sort by creation time. The text form is 26
//! characters drawn from the Crockford base-32 alphabet, most significant
//! bits first.
//!
//! # Example
//!
//! ```
//! use rdb_core::Ulid;
//!
//! let a = Ulid::new();
//! let b = Ulid::new();
//! assert!(a < b);
//!
//! let text = a.to_string();
//! assert_eq!(text.len(), 26);
//! assert_eq!(text.parse::<Ulid>().unwrap(), a);
//! ```

use std::cell::RefCell;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::RngCore;
use thiserror::Error;

/// Symbols used by the text form, indexed by 5-bit group value.
pub const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Length of the text form.
pub const ENCODED_LEN: usize = 26;

/// Length of the binary form.
pub const BYTE_LEN: usize = 16;

const TIMESTAMP_LEN: usize = 6;
const TIMESTAMP_MASK: u64 = 0xFFFF_FFFF_FFFF;

/// Identifier parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// Input is not a valid text or hex rendering of an identifier.
    #[error("invalid identifier format '{input}': {reason}")]
    InvalidFormat {
        /// The rejected input.
        input: String,
        /// What was wrong with it.
        reason: &'static str,
    },
}

impl IdError {
    fn invalid(input: &str, reason: &'static str) -> Self {
        Self::InvalidFormat {
            input: input.to_string(),
            reason,
        }
    }
}

/// A 16-byte time-ordered identifier.
///
/// The all-zero value ([`Ulid::EMPTY`]) is the "unset" sentinel and is
/// also what [`Default`] returns.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ulid([u8; BYTE_LEN]);

impl Ulid {
    /// The all-zero "unset" identifier.
    pub const EMPTY: Ulid = Ulid([0; BYTE_LEN]);

    /// Generates a new identifier from the calling thread's generator.
    ///
    /// Identifiers produced on one thread are strictly increasing, including
    /// several within the same millisecond.
    pub fn new() -> Self {
        THREAD_GENERATOR.with(|generator| generator.borrow_mut().generate())
    }

    /// Builds an identifier for an explicit millisecond timestamp with fresh
    /// randomness.
    ///
    /// This bypasses the monotonic generator and is meant for backfilled or
    /// deterministic keys.
    pub fn from_timestamp_ms(ms: u64) -> Self {
        let mut bytes = [0u8; BYTE_LEN];
        write_timestamp(&mut bytes, ms);
        rand::thread_rng().fill_bytes(&mut bytes[TIMESTAMP_LEN..]);
        Ulid(bytes)
    }

    /// Wraps 16 raw bytes.
    pub const fn from_bytes(bytes: [u8; BYTE_LEN]) -> Self {
        Ulid(bytes)
    }

    /// Builds an identifier from a byte slice that must be exactly 16 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, IdError> {
        let array: [u8; BYTE_LEN] = bytes
            .try_into()
            .map_err(|_| IdError::invalid(&hex::encode(bytes), "expected 16 bytes"))?;
        Ok(Ulid(array))
    }

    /// Returns the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; BYTE_LEN] {
        &self.0
    }

    /// Returns true for the all-zero sentinel.
    pub fn is_empty(&self) -> bool {
        self.0 == [0; BYTE_LEN]
    }

    /// Milliseconds since the Unix epoch stored in the high 48 bits.
    pub fn timestamp_ms(&self) -> u64 {
        self.0[..TIMESTAMP_LEN]
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
    }

    /// The embedded timestamp as a UTC date-time.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.timestamp_ms())
            .ok()
            .and_then(DateTime::from_timestamp_millis)
    }

    /// Renders the 32-character lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses the 32-character hex form.
    pub fn from_hex(input: &str) -> Result<Self, IdError> {
        if input.len() != BYTE_LEN * 2 {
            return Err(IdError::invalid(input, "hex form must be 32 characters"));
        }
        let mut bytes = [0u8; BYTE_LEN];
        hex::decode_to_slice(input, &mut bytes)
            .map_err(|_| IdError::invalid(input, "not a hex string"))?;
        Ok(Ulid(bytes))
    }

    /// Returns true if `input` is a well-formed 26-character text form.
    pub fn is_valid_str(input: &str) -> bool {
        decode(input).is_ok()
    }
}

impl fmt::Display for Ulid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = encode(&self.0);
        // The alphabet is ASCII, so every symbol is a single char.
        for &symbol in &encoded {
            fmt::Write::write_char(f, char::from(symbol))?;
        }
        Ok(())
    }
}

impl fmt::Debug for Ulid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ulid({self})")
    }
}

impl FromStr for Ulid {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s).map(Ulid)
    }
}

impl From<[u8; BYTE_LEN]> for Ulid {
    fn from(bytes: [u8; BYTE_LEN]) -> Self {
        Ulid(bytes)
    }
}

impl From<Ulid> for [u8; BYTE_LEN] {
    fn from(id: Ulid) -> Self {
        id.0
    }
}

/// Monotonic identifier generator.
///
/// Within one millisecond the previous identifier's random part is
/// incremented as a big-endian counter, so successive identifiers from the
/// same generator never compare equal or go backwards. A new millisecond
/// draws fresh randomness.
///
/// # Example
///
/// ```
/// use rdb_core::UlidGenerator;
///
/// let mut generator = UlidGenerator::new();
/// let a = generator.generate_at(1_700_000_000_000);
/// let b = generator.generate_at(1_700_000_000_000);
/// assert!(a < b);
/// assert_eq!(a.timestamp_ms(), b.timestamp_ms());
/// ```
#[derive(Debug, Default)]
pub struct UlidGenerator {
    last: Option<Ulid>,
}

impl UlidGenerator {
    /// Creates a generator with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates an identifier for the current wall-clock millisecond.
    pub fn generate(&mut self) -> Ulid {
        self.generate_at(now_ms())
    }

    /// Generates an identifier for `ms`, applying the monotonicity rule.
    ///
    /// A clock that steps backwards is treated like the same millisecond, so
    /// ordering still holds for the identifiers this generator hands out.
    pub fn generate_at(&mut self, ms: u64) -> Ulid {
        let ms = ms & TIMESTAMP_MASK;
        let next = match self.last {
            Some(prev) if prev.timestamp_ms() >= ms => increment(prev),
            _ => Ulid::from_timestamp_ms(ms),
        };
        self.last = Some(next);
        next
    }
}

thread_local! {
    static THREAD_GENERATOR: RefCell<UlidGenerator> = RefCell::new(UlidGenerator::new());
}

fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

fn write_timestamp(bytes: &mut [u8; BYTE_LEN], ms: u64) {
    let ts = (ms & TIMESTAMP_MASK).to_be_bytes();
    bytes[..TIMESTAMP_LEN].copy_from_slice(&ts[2..]);
}

/// Adds one to the random part. If all 80 bits overflow the timestamp moves
/// forward one millisecond with fresh randomness.
fn increment(prev: Ulid) -> Ulid {
    let mut bytes = prev.0;
    for byte in bytes[TIMESTAMP_LEN..].iter_mut().rev() {
        let (value, carry) = byte.overflowing_add(1);
        *byte = value;
        if !carry {
            return Ulid(bytes);
        }
    }
    Ulid::from_timestamp_ms(prev.timestamp_ms() + 1)
}

fn encode(bytes: &[u8; BYTE_LEN]) -> [u8; ENCODED_LEN] {
    let mut out = [0u8; ENCODED_LEN];
    let mut acc: u32 = 0;
    let mut bits = 0u32;
    let mut pos = 0;
    for &byte in bytes {
        acc = ((acc << 8) | u32::from(byte)) & 0x1FFF;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out[pos] = ALPHABET[((acc >> bits) & 0x1F) as usize];
            pos += 1;
        }
    }
    // 128 bits leave 3 over; they fill the top of the final symbol.
    if bits > 0 {
        out[pos] = ALPHABET[((acc << (5 - bits)) & 0x1F) as usize];
    }
    out
}

fn decode(input: &str) -> Result<[u8; BYTE_LEN], IdError> {
    if input.len() != ENCODED_LEN {
        return Err(IdError::invalid(input, "text form must be 26 characters"));
    }
    let mut out = [0u8; BYTE_LEN];
    let mut acc: u32 = 0;
    let mut bits = 0u32;
    let mut pos = 0;
    for (index, symbol) in input.bytes().enumerate() {
        let value = symbol_value(symbol)
            .ok_or_else(|| IdError::invalid(input, "character outside the identifier alphabet"))?;
        if index == ENCODED_LEN - 1 && value & 0b11 != 0 {
            return Err(IdError::invalid(input, "trailing bits must be zero"));
        }
        acc = ((acc << 5) | u32::from(value)) & 0x1FFF;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            if pos < BYTE_LEN {
                out[pos] = (acc >> bits) as u8;
                pos += 1;
            }
        }
    }
    Ok(out)
}

fn symbol_value(symbol: u8) -> Option<u8> {
    ALPHABET
        .iter()
        .position(|&candidate| candidate == symbol)
        .map(|index| index as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_renders_as_zeros() {
        assert_eq!(Ulid::EMPTY.to_string(), "0".repeat(26));
        assert!(Ulid::EMPTY.is_empty());
        assert_eq!(Ulid::default(), Ulid::EMPTY);
        assert_eq!(Ulid::from_bytes([0; 16]), Ulid::EMPTY);
    }

    #[test]
    fn test_text_round_trip() {
        let id = Ulid::from_bytes([
            0x01, 0x8B, 0xCF, 0xE5, 0x68, 0x00, 0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x11, 0x22, 0x33,
            0x44, 0x55,
        ]);
        let text = id.to_string();
        assert_eq!(text.len(), ENCODED_LEN);
        assert_eq!(text.parse::<Ulid>().unwrap(), id);
    }

    #[test]
    fn test_all_ones_encodes_to_top_symbols() {
        let id = Ulid::from_bytes([0xFF; 16]);
        let text = id.to_string();
        assert_eq!(&text[..25], "Z".repeat(25));
        // Last symbol carries three set bits followed by two zero bits.
        assert_eq!(&text[25..], "W");
        assert_eq!(text.parse::<Ulid>().unwrap(), id);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert!(matches!(
            "0123".parse::<Ulid>(),
            Err(IdError::InvalidFormat { .. })
        ));
        assert!("0".repeat(27).parse::<Ulid>().is_err());
        assert!("".parse::<Ulid>().is_err());
    }

    #[test]
    fn test_decode_rejects_excluded_and_lowercase_symbols() {
        let mut text = "0".repeat(25);
        text.push('0');
        for bad in ['I', 'L', 'O', 'U', 'a', '-'] {
            let mut candidate = text.clone();
            candidate.replace_range(3..4, &bad.to_string());
            assert!(candidate.parse::<Ulid>().is_err(), "{candidate} accepted");
        }
    }

    #[test]
    fn test_empty_decodes_only_from_zero_text() {
        let zeros = "0".repeat(26);
        assert!(zeros.parse::<Ulid>().unwrap().is_empty());

        let mut nonzero_tail = "0".repeat(25);
        nonzero_tail.push('1');
        assert!(nonzero_tail.parse::<Ulid>().is_err());
    }

    #[test]
    fn test_hex_round_trip_and_errors() {
        let id = Ulid::from_timestamp_ms(1_700_000_000_123);
        let hex = id.to_hex();
        assert_eq!(hex.len(), 32);
        assert_eq!(hex, hex.to_lowercase());
        assert_eq!(Ulid::from_hex(&hex).unwrap(), id);

        assert!(Ulid::from_hex("abcd").is_err());
        assert!(Ulid::from_hex(&"zz".repeat(16)).is_err());
    }

    #[test]
    fn test_timestamp_is_big_endian_prefix() {
        let id = Ulid::from_timestamp_ms(0x0102_0304_0506);
        assert_eq!(&id.as_bytes()[..6], &[1, 2, 3, 4, 5, 6]);
        assert_eq!(id.timestamp_ms(), 0x0102_0304_0506);
    }

    #[test]
    fn test_datetime_matches_timestamp() {
        let id = Ulid::from_timestamp_ms(1_700_000_000_000);
        let dt = id.datetime().unwrap();
        assert_eq!(dt.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_generator_monotonic_within_millisecond() {
        let mut generator = UlidGenerator::new();
        let mut previous = generator.generate_at(42);
        for _ in 0..1000 {
            let next = generator.generate_at(42);
            assert!(next > previous);
            assert_eq!(next.timestamp_ms(), 42);
            previous = next;
        }
    }

    #[test]
    fn test_generator_increments_random_part_by_one() {
        let mut generator = UlidGenerator::new();
        let a = generator.generate_at(7);
        let b = generator.generate_at(7);
        let a_tail = u128::from_be_bytes(*a.as_bytes()) & ((1u128 << 80) - 1);
        let b_tail = u128::from_be_bytes(*b.as_bytes()) & ((1u128 << 80) - 1);
        assert_eq!(a_tail.wrapping_add(1) & ((1u128 << 80) - 1), b_tail);
    }

    #[test]
    fn test_increment_carries_leftward() {
        let mut bytes = [0u8; 16];
        bytes[5] = 9;
        bytes[14] = 0x01;
        bytes[15] = 0xFF;
        let next = increment(Ulid::from_bytes(bytes));
        assert_eq!(next.as_bytes()[14], 0x02);
        assert_eq!(next.as_bytes()[15], 0x00);
        assert_eq!(next.timestamp_ms(), 9);
    }

    #[test]
    fn test_increment_overflow_moves_to_next_millisecond() {
        let mut bytes = [0xFFu8; 16];
        bytes[..6].copy_from_slice(&[0, 0, 0, 0, 0, 5]);
        let next = increment(Ulid::from_bytes(bytes));
        assert_eq!(next.timestamp_ms(), 6);
        assert!(next > Ulid::from_bytes(bytes));
    }

    #[test]
    fn test_generator_new_millisecond_uses_later_timestamp() {
        let mut generator = UlidGenerator::new();
        let a = generator.generate_at(100);
        let b = generator.generate_at(101);
        assert!(b > a);
        assert_eq!(b.timestamp_ms(), 101);
    }

    #[test]
    fn test_thread_generator_is_increasing() {
        let ids: Vec<Ulid> = (0..200).map(|_| Ulid::new()).collect();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_from_slice_requires_sixteen_bytes() {
        assert!(Ulid::from_slice(&[1, 2, 3]).is_err());
        assert_eq!(Ulid::from_slice(&[0; 16]).unwrap(), Ulid::EMPTY);
    }

    #[test]
    fn test_is_valid_str() {
        assert!(Ulid::is_valid_str(&Ulid::new().to_string()));
        assert!(!Ulid::is_valid_str("not-an-identifier"));
    }
}

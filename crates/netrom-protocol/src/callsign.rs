//! Station identifiers
//!
//! Every routing entity keys on a [`Callsign`]: an uppercase, trimmed base
//! of up to six alphanumerics plus an optional secondary station id (SSID)
//! in `0..=15`. An SSID of zero is the same station as no SSID at all.
//!
//! # Shifted encoding
//!
//! AX.25 address fields (and NET/ROM NODES entries) carry callsigns as
//! seven bytes: six ASCII characters each shifted left one bit, padded
//! with shifted spaces, followed by an SSID byte.
//!
//! ```text
//! 'W'<<1 '1'<<1 'A'<<1 'W'<<1 ' '<<1 ' '<<1  0b0RRS_SSSE
//! ```
//!
//! - `RR`: reserved bits (normally set)
//! - `SSSS`: SSID
//! - `E`: address extension bit (last address in the field)

use std::fmt;

/// Length of a shifted callsign field
pub const ADDRESS_LEN: usize = 7;

/// Longest base callsign an AX.25 address can carry
pub const MAX_BASE_LEN: usize = 6;

/// Highest secondary station id
pub const MAX_SSID: u8 = 15;

/// Reserved bits set in the SSID byte of an encoded address
const SSID_RESERVED: u8 = 0b0110_0000;

/// A normalized station identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Callsign {
    base: String,
    ssid: u8,
}

impl Callsign {
    /// Parse a display-form callsign such as `w1aw`, ` K2ABC-7 ` or `NODES`
    ///
    /// Returns `None` for anything that does not normalize to a valid
    /// station identifier.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        let (base, ssid) = match trimmed.split_once('-') {
            Some((base, ssid)) => {
                let ssid = ssid.trim().parse::<u8>().ok()?;
                (base.trim(), ssid)
            }
            None => (trimmed, 0),
        };
        Self::from_parts(&base.to_ascii_uppercase(), ssid)
    }

    /// Build a callsign from an already-split base and SSID
    pub fn from_parts(base: &str, ssid: u8) -> Option<Self> {
        if base.is_empty() || base.len() > MAX_BASE_LEN || ssid > MAX_SSID {
            return None;
        }
        if !base
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        {
            return None;
        }
        Some(Self {
            base: base.to_string(),
            ssid,
        })
    }

    /// The conventional "no callsign configured" placeholder, `N0CALL`
    pub fn nocall() -> Self {
        Self {
            base: "N0CALL".to_string(),
            ssid: 0,
        }
    }

    /// The base callsign without SSID
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The secondary station id (0 when absent)
    pub fn ssid(&self) -> u8 {
        self.ssid
    }

    /// Whether this looks like an amateur radio callsign rather than a
    /// broadcast address or alias
    ///
    /// Requires three to six characters, a digit within the first three
    /// characters, and a trailing letter (`W1AW`, `2E0ABC`, `N0CALL`).
    pub fn is_amateur_plausible(&self) -> bool {
        let bytes = self.base.as_bytes();
        if bytes.len() < 3 {
            return false;
        }
        let has_letter = bytes.iter().any(u8::is_ascii_uppercase);
        let early_digit = bytes.iter().take(3).any(u8::is_ascii_digit);
        let ends_with_letter = bytes.last().is_some_and(u8::is_ascii_uppercase);
        has_letter && early_digit && ends_with_letter
    }
}

impl fmt::Display for Callsign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ssid == 0 {
            write!(f, "{}", self.base)
        } else {
            write!(f, "{}-{}", self.base, self.ssid)
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Callsign {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Callsign {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Callsign::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid callsign: {s:?}")))
    }
}

/// Decode a 7-byte shifted callsign
///
/// Each of the first six bytes is shifted right one bit and must yield
/// `A-Z`, `0-9` or a space; the first space terminates the callsign and
/// only spaces may follow it. The SSID comes from bits 1-4 of the seventh
/// byte. Returns `None` if the field is short or malformed.
pub fn decode_shifted(bytes: &[u8]) -> Option<Callsign> {
    let field = bytes.get(..ADDRESS_LEN)?;

    let mut base = String::with_capacity(MAX_BASE_LEN);
    let mut terminated = false;
    for &b in &field[..MAX_BASE_LEN] {
        let c = char::from(b >> 1);
        match c {
            ' ' => terminated = true,
            'A'..='Z' | '0'..='9' if !terminated => base.push(c),
            _ => return None,
        }
    }

    let ssid = (field[6] >> 1) & 0x0F;
    Callsign::from_parts(&base, ssid)
}

/// Encode a callsign into its 7-byte shifted form
///
/// The extension bit is left clear; AX.25 framing sets it on the final
/// address itself.
pub fn encode_shifted(call: &Callsign) -> [u8; ADDRESS_LEN] {
    let mut out = [b' ' << 1; ADDRESS_LEN];
    for (slot, b) in out.iter_mut().zip(call.base.bytes()) {
        *slot = b << 1;
    }
    out[6] = SSID_RESERVED | (call.ssid << 1);
    out
}

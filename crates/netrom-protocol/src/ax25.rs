//! AX.25 frame decoding
//!
//! # Frame Format
//! ```text
//! [dest 7] [src 7] [digi 7]*0..8 [control] [pid]? [info...]
//! ```
//!
//! - Address fields use the shifted encoding from [`crate::callsign`]
//! - Bit 0 of the last SSID byte in the address field is set (extension bit)
//! - Bit 7 of a digipeater SSID byte is the "has been repeated" flag
//! - A PID byte follows the control field only for I and UI frames

use std::time::SystemTime;

use crate::callsign::{decode_shifted, encode_shifted, Callsign, ADDRESS_LEN};
use crate::error::ParseError;
use crate::packet::{FrameKind, Packet};

/// Maximum number of digipeaters AX.25 allows in the address field
pub const MAX_DIGIPEATERS: usize = 8;

/// Destination + source + control
const MIN_FRAME_LEN: usize = ADDRESS_LEN * 2 + 1;

/// Extension bit marking the last address
const EXTENSION_BIT: u8 = 0x01;

/// Command/response bit on destination/source, H bit on digipeaters
const HIGH_BIT: u8 = 0x80;

/// One entry of the digipeater path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digipeater {
    /// Digipeater callsign
    pub callsign: Callsign,
    /// Whether this digipeater has already relayed the frame
    pub repeated: bool,
}

/// A decoded AX.25 frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ax25Frame {
    /// Destination address
    pub destination: Callsign,
    /// Source address
    pub source: Callsign,
    /// Digipeater path in transmission order
    pub digipeaters: Vec<Digipeater>,
    /// Raw control byte
    pub control: u8,
    /// Protocol id (I and UI frames)
    pub pid: Option<u8>,
    /// Information field
    pub info: Vec<u8>,
}

impl Ax25Frame {
    /// Build a UI frame
    pub fn ui(source: Callsign, destination: Callsign, pid: u8, info: Vec<u8>) -> Self {
        Self {
            destination,
            source,
            digipeaters: Vec::new(),
            control: 0x03,
            pid: Some(pid),
            info,
        }
    }

    /// Frame kind from the control field
    pub fn kind(&self) -> FrameKind {
        FrameKind::from_control(self.control)
    }

    /// Encode to wire format (without KISS framing)
    pub fn encode(&self) -> Vec<u8> {
        let addresses = 2 + self.digipeaters.len();
        let mut out = Vec::with_capacity(addresses * ADDRESS_LEN + 2 + self.info.len());

        let mut dest = encode_shifted(&self.destination);
        dest[6] |= HIGH_BIT;
        out.extend_from_slice(&dest);
        out.extend_from_slice(&encode_shifted(&self.source));

        for digi in &self.digipeaters {
            let mut field = encode_shifted(&digi.callsign);
            if digi.repeated {
                field[6] |= HIGH_BIT;
            }
            out.extend_from_slice(&field);
        }

        // Mark the last address field
        let last_ssid = addresses * ADDRESS_LEN - 1;
        out[last_ssid] |= EXTENSION_BIT;

        out.push(self.control);
        if self.kind().has_pid() {
            if let Some(pid) = self.pid {
                out.push(pid);
            }
        }
        out.extend_from_slice(&self.info);
        out
    }

    /// Convert to the router's packet input form
    pub fn into_packet(self, timestamp: SystemTime) -> Packet {
        let kind = self.kind();
        Packet {
            timestamp,
            from: self.source.to_string(),
            to: self.destination.to_string(),
            via: self
                .digipeaters
                .iter()
                .map(|d| d.callsign.to_string())
                .collect(),
            pid: self.pid,
            info: self.info,
            kind,
        }
    }
}

/// Decode an AX.25 frame
pub fn decode_frame(data: &[u8]) -> Result<Ax25Frame, ParseError> {
    if data.len() < MIN_FRAME_LEN {
        return Err(ParseError::Incomplete {
            needed: MIN_FRAME_LEN - data.len(),
        });
    }

    let destination = decode_address(&data[0..ADDRESS_LEN])?;
    let source = decode_address(&data[ADDRESS_LEN..ADDRESS_LEN * 2])?;

    let mut offset = ADDRESS_LEN * 2;
    let mut last = data[offset - 1] & EXTENSION_BIT != 0;
    let mut digipeaters = Vec::new();

    while !last {
        if digipeaters.len() == MAX_DIGIPEATERS {
            return Err(ParseError::InvalidFrame(format!(
                "more than {} digipeaters",
                MAX_DIGIPEATERS
            )));
        }
        let field = data
            .get(offset..offset + ADDRESS_LEN)
            .ok_or_else(|| ParseError::Incomplete {
                needed: offset + ADDRESS_LEN - data.len(),
            })?;
        digipeaters.push(Digipeater {
            callsign: decode_address(field)?,
            repeated: field[6] & HIGH_BIT != 0,
        });
        last = field[6] & EXTENSION_BIT != 0;
        offset += ADDRESS_LEN;
    }

    let control = *data.get(offset).ok_or(ParseError::Incomplete { needed: 1 })?;
    offset += 1;

    let mut pid = None;
    if FrameKind::from_control(control).has_pid() {
        pid = Some(*data.get(offset).ok_or(ParseError::Incomplete { needed: 1 })?);
        offset += 1;
    }

    Ok(Ax25Frame {
        destination,
        source,
        digipeaters,
        control,
        pid,
        info: data[offset..].to_vec(),
    })
}

fn decode_address(field: &[u8]) -> Result<Callsign, ParseError> {
    decode_shifted(field).ok_or_else(|| {
        ParseError::InvalidAddress(
            field
                .iter()
                .map(|b| format!("{:02X}", b))
                .collect::<Vec<_>>()
                .join(" "),
        )
    })
}

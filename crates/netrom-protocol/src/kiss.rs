//! KISS TNC framing
//!
//! KISS wraps each AX.25 frame between `FEND` bytes and escapes any
//! `FEND`/`FESC` inside the payload.
//!
//! # Frame Format
//! ```text
//! C0 [port<<4 | command] [data...] C0
//! ```
//!
//! - `C0` (`FEND`): frame delimiter
//! - `DB DC` (`FESC TFEND`): escaped `C0` inside data
//! - `DB DD` (`FESC TFESC`): escaped `DB` inside data
//! - Command `0` carries an AX.25 frame; the others configure the TNC

use crate::error::ParseError;

/// Frame delimiter
pub const FEND: u8 = 0xC0;
/// Escape introducer
pub const FESC: u8 = 0xDB;
/// Escaped FEND
pub const TFEND: u8 = 0xDC;
/// Escaped FESC
pub const TFESC: u8 = 0xDD;

/// Maximum unescaped frame length (AX.25 max plus headroom)
pub const MAX_FRAME_LEN: usize = 1024;

/// KISS command nibble
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KissCommand {
    /// AX.25 frame payload
    Data,
    /// Transmitter keyup delay
    TxDelay,
    /// Persistence parameter
    Persistence,
    /// Slot interval
    SlotTime,
    /// Transmitter tail time
    TxTail,
    /// Full duplex on/off
    FullDuplex,
    /// Hardware specific
    SetHardware,
    /// Exit KISS mode
    Return,
    /// Anything else
    Unknown(u8),
}

impl KissCommand {
    /// Decode the low nibble of a KISS type byte
    pub fn from_type_byte(byte: u8) -> Self {
        if byte == 0xFF {
            return Self::Return;
        }
        match byte & 0x0F {
            0x00 => Self::Data,
            0x01 => Self::TxDelay,
            0x02 => Self::Persistence,
            0x03 => Self::SlotTime,
            0x04 => Self::TxTail,
            0x05 => Self::FullDuplex,
            0x06 => Self::SetHardware,
            other => Self::Unknown(other),
        }
    }
}

/// One unescaped KISS frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KissFrame {
    /// TNC port (high nibble of the type byte)
    pub port: u8,
    /// Command (low nibble of the type byte)
    pub command: KissCommand,
    /// Unescaped payload following the type byte
    pub data: Vec<u8>,
}

impl KissFrame {
    /// Whether this frame carries an AX.25 frame
    pub fn is_data(&self) -> bool {
        self.command == KissCommand::Data
    }
}

/// Streaming KISS decoder
///
/// Bytes arrive in arbitrary chunks from a serial port or TCP socket;
/// completed frames are pulled out one at a time.
pub struct KissCodec {
    buffer: Vec<u8>,
}

impl KissCodec {
    /// Create a new KISS codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_FRAME_LEN),
        }
    }

    /// Push raw bytes into the codec's buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // Nothing but noise since the last delimiter - keep only the tail
        if self.buffer.len() > MAX_FRAME_LEN * 4 {
            let start = self.buffer.len() - MAX_FRAME_LEN;
            self.buffer.drain(..start);
        }
    }

    /// Try to extract the next complete frame from the buffer
    ///
    /// Frames with invalid escapes or an oversize payload are dropped with a
    /// warning and decoding continues with the following frame.
    pub fn next_frame(&mut self) -> Option<KissFrame> {
        loop {
            let start = self.buffer.iter().position(|&b| b == FEND)?;
            if start > 0 {
                self.buffer.drain(..start);
            }

            let end = self.buffer[1..].iter().position(|&b| b == FEND)? + 1;
            let raw: Vec<u8> = self.buffer.drain(..end).collect();

            // Back-to-back FENDs are idle fill
            if raw.len() <= 1 {
                continue;
            }

            match Self::unescape(&raw[1..]) {
                Ok(body) => {
                    let Some((&type_byte, data)) = body.split_first() else {
                        continue;
                    };
                    return Some(KissFrame {
                        port: type_byte >> 4,
                        command: KissCommand::from_type_byte(type_byte),
                        data: data.to_vec(),
                    });
                }
                Err(e) => {
                    tracing::warn!("Dropping KISS frame: {}", e);
                }
            }
        }
    }

    /// Clear the internal buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn unescape(escaped: &[u8]) -> Result<Vec<u8>, ParseError> {
        let mut out = Vec::with_capacity(escaped.len());
        let mut bytes = escaped.iter();
        while let Some(&b) = bytes.next() {
            if b == FESC {
                match bytes.next() {
                    Some(&TFEND) => out.push(FEND),
                    Some(&TFESC) => out.push(FESC),
                    Some(&other) => return Err(ParseError::InvalidEscape(other)),
                    None => return Err(ParseError::Incomplete { needed: 1 }),
                }
            } else {
                out.push(b);
            }
            if out.len() > MAX_FRAME_LEN {
                return Err(ParseError::InvalidFrame(format!(
                    "frame exceeds {} bytes",
                    MAX_FRAME_LEN
                )));
            }
        }
        Ok(out)
    }
}

impl Default for KissCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrap an AX.25 frame as a KISS data frame for the given TNC port
pub fn encode_frame(port: u8, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 4);
    out.push(FEND);
    out.push((port & 0x0F) << 4);
    for &b in data {
        match b {
            FEND => out.extend_from_slice(&[FESC, TFEND]),
            FESC => out.extend_from_slice(&[FESC, TFESC]),
            _ => out.push(b),
        }
    }
    out.push(FEND);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame() {
        let mut codec = KissCodec::new();
        codec.push_bytes(&[FEND, 0x00, 0x01, 0x02, FEND]);

        let frame = codec.next_frame().unwrap();
        assert_eq!(frame.port, 0);
        assert!(frame.is_data());
        assert_eq!(frame.data, vec![0x01, 0x02]);
        assert!(codec.next_frame().is_none());
    }

    #[test]
    fn test_partial_frame() {
        let mut codec = KissCodec::new();
        codec.push_bytes(&[FEND, 0x10, 0xAA]);
        assert!(codec.next_frame().is_none());

        codec.push_bytes(&[0xBB, FEND]);
        let frame = codec.next_frame().unwrap();
        assert_eq!(frame.port, 1);
        assert_eq!(frame.data, vec![0xAA, 0xBB]);
    }

    #[test]
    fn test_escapes_resolved() {
        let mut codec = KissCodec::new();
        codec.push_bytes(&[FEND, 0x00, FESC, TFEND, 0x42, FESC, TFESC, FEND]);

        let frame = codec.next_frame().unwrap();
        assert_eq!(frame.data, vec![FEND, 0x42, FESC]);
    }

    #[test]
    fn test_leading_noise_and_idle_fill_skipped() {
        let mut codec = KissCodec::new();
        codec.push_bytes(&[0x55, 0x66, FEND, FEND, FEND, 0x00, 0x07, FEND]);

        let frame = codec.next_frame().unwrap();
        assert_eq!(frame.data, vec![0x07]);
        assert!(codec.next_frame().is_none());
    }

    #[test]
    fn test_invalid_escape_drops_only_that_frame() {
        let mut codec = KissCodec::new();
        codec.push_bytes(&[FEND, 0x00, FESC, 0x01, FEND, 0x00, 0x09, FEND]);

        let frame = codec.next_frame().unwrap();
        assert_eq!(frame.data, vec![0x09]);
    }

    #[test]
    fn test_shared_delimiter_between_frames() {
        let mut codec = KissCodec::new();
        codec.push_bytes(&[FEND, 0x00, 0x01, FEND, 0x00, 0x02, FEND]);

        assert_eq!(codec.next_frame().unwrap().data, vec![0x01]);
        assert_eq!(codec.next_frame().unwrap().data, vec![0x02]);
    }

    #[test]
    fn test_command_frames_are_not_data() {
        let mut codec = KissCodec::new();
        codec.push_bytes(&[FEND, 0x01, 0x32, FEND]);

        let frame = codec.next_frame().unwrap();
        assert_eq!(frame.command, KissCommand::TxDelay);
        assert!(!frame.is_data());
    }

    #[test]
    fn test_encode_escapes() {
        let encoded = encode_frame(2, &[0x01, FEND, FESC]);
        assert_eq!(
            encoded,
            vec![FEND, 0x20, 0x01, FESC, TFEND, FESC, TFESC, FEND]
        );

        let mut codec = KissCodec::new();
        codec.push_bytes(&encoded);
        let frame = codec.next_frame().unwrap();
        assert_eq!(frame.port, 2);
        assert_eq!(frame.data, vec![0x01, FEND, FESC]);
    }
}

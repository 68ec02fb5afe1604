//! Error types for AX.25 and KISS parsing

use thiserror::Error;

/// Errors that can occur while parsing link-layer data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Buffer is incomplete - need more data
    #[error("incomplete data: need {needed} more bytes")]
    Incomplete { needed: usize },

    /// Address field does not decode to a station identifier
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid frame structure
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// KISS escape byte followed by something other than TFEND/TFESC
    #[error("invalid KISS escape: 0x{0:02X}")]
    InvalidEscape(u8),
}

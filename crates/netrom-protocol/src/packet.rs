//! Normalized packet input
//!
//! [`Packet`] is what the routing core consumes: one heard frame with
//! display-form addresses. Addresses are deliberately kept as strings;
//! consumers normalize them with [`Callsign::parse`](crate::Callsign::parse)
//! and must not assume the producer already did.

use std::time::SystemTime;

/// NET/ROM layer-3 protocol id
pub const PID_NETROM: u8 = 0xCF;

/// "No layer 3" protocol id used by plain UI/connected traffic
pub const PID_NO_LAYER3: u8 = 0xF0;

/// Destination addresses used for beacon/ID/broadcast traffic
const INFRASTRUCTURE_DESTINATIONS: &[&str] = &["ID", "BEACON", "NODES"];

/// AX.25 frame kind as decoded from the control field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FrameKind {
    /// Information frame (connected mode)
    I,
    /// Receive ready
    Rr,
    /// Receive not ready
    Rnr,
    /// Reject
    Rej,
    /// Selective reject
    Srej,
    /// Unnumbered information (datagram)
    Ui,
    /// Set asynchronous balanced mode (connect)
    Sabm,
    /// Extended SABM (modulo-128 connect)
    Sabme,
    /// Unnumbered acknowledge
    Ua,
    /// Disconnected mode
    Dm,
    /// Disconnect
    Disc,
    /// Frame reject
    Frmr,
    /// Exchange identification
    Xid,
    /// Test
    Test,
    /// Unrecognized control field
    Unknown,
}

impl FrameKind {
    /// Decode the frame kind from an AX.25 (modulo-8) control byte
    pub fn from_control(control: u8) -> Self {
        if control & 0x01 == 0 {
            return Self::I;
        }
        if control & 0x03 == 0x01 {
            return match (control >> 2) & 0x03 {
                0 => Self::Rr,
                1 => Self::Rnr,
                2 => Self::Rej,
                _ => Self::Srej,
            };
        }
        // U frame - mask out the P/F bit
        match control & 0xEF {
            0x03 => Self::Ui,
            0x2F => Self::Sabm,
            0x6F => Self::Sabme,
            0x63 => Self::Ua,
            0x0F => Self::Dm,
            0x43 => Self::Disc,
            0x87 => Self::Frmr,
            0xAF => Self::Xid,
            0xE3 => Self::Test,
            _ => Self::Unknown,
        }
    }

    /// Whether this kind carries a PID byte and information field
    pub fn has_pid(&self) -> bool {
        matches!(self, Self::I | Self::Ui)
    }

    /// Short display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::I => "I",
            Self::Rr => "RR",
            Self::Rnr => "RNR",
            Self::Rej => "REJ",
            Self::Srej => "SREJ",
            Self::Ui => "UI",
            Self::Sabm => "SABM",
            Self::Sabme => "SABME",
            Self::Ua => "UA",
            Self::Dm => "DM",
            Self::Disc => "DISC",
            Self::Frmr => "FRMR",
            Self::Xid => "XID",
            Self::Test => "TEST",
            Self::Unknown => "?",
        }
    }
}

/// One observed packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// When the packet was heard
    pub timestamp: SystemTime,
    /// Source address (display form)
    pub from: String,
    /// Destination address (display form)
    pub to: String,
    /// Digipeater path in transmission order
    pub via: Vec<String>,
    /// Protocol id (I and UI frames only)
    pub pid: Option<u8>,
    /// Information field
    pub info: Vec<u8>,
    /// Frame kind
    pub kind: FrameKind,
}

impl Packet {
    /// Create a UI packet with no digipeaters, mostly useful for tests
    pub fn ui(from: &str, to: &str, info: &[u8], timestamp: SystemTime) -> Self {
        Self {
            timestamp,
            from: from.to_string(),
            to: to.to_string(),
            via: Vec::new(),
            pid: Some(PID_NO_LAYER3),
            info: info.to_vec(),
            kind: FrameKind::Ui,
        }
    }

    /// Set the digipeater path
    pub fn with_via(mut self, via: &[&str]) -> Self {
        self.via = via.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Set the protocol id
    pub fn with_pid(mut self, pid: u8) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Whether the packet was relayed by at least one digipeater
    pub fn is_digipeated(&self) -> bool {
        !self.via.is_empty()
    }

    /// Beacon, ID and broadcast traffic
    ///
    /// These are UI frames sent to a well-known pseudo-address; they say
    /// nothing about who the sender is talking to.
    pub fn is_infrastructure(&self) -> bool {
        if self.kind != FrameKind::Ui {
            return false;
        }
        let to = self.to.trim();
        let base = to.split_once('-').map_or(to, |(base, _)| base);
        INFRASTRUCTURE_DESTINATIONS
            .iter()
            .any(|d| d.eq_ignore_ascii_case(base))
    }
}

//! NET/ROM NODES broadcast decoding
//!
//! NET/ROM nodes periodically send a UI frame with PID `0xCF` to the
//! pseudo-address `NODES`, advertising every destination they can reach
//! and the quality of their best route to it.
//!
//! # Layouts
//!
//! All layouts start with the signature byte `0xFF`. Two incompatible
//! entry formats are in use, and the standard one may carry the sender's
//! alias in front of the first entry:
//!
//! ```text
//! Standard (21 bytes/entry):
//!   FF [dest call 7] [dest alias 6] [next-hop call 7] [quality 1] ...
//!
//! Standard with origin alias:
//!   FF [origin alias 6] [dest call 7] [dest alias 6] [next-hop call 7] [quality 1] ...
//!
//! Alias-first (20 bytes/entry):
//!   FF [dest alias 6] [dest call 7] [next-hop alias 6] [quality 1] ...
//! ```
//!
//! Callsigns use the shifted AX.25 encoding; aliases are plain ASCII padded
//! with spaces. The alias-first next hop is an alias rather than a routable
//! callsign, so the frame's own source address stands in for it.
//!
//! # Detection
//!
//! The layout is never inferred from size alone. Bytes 1-6 and 14-19 are
//! checked for printable ASCII (alias candidates) and combined with the
//! entry-size modulus of each layout; see [`detect_layout`].
//!
//! Decoding never fails loudly: anything that is not a well-formed
//! broadcast yields `None`, and individual entries with undecodable
//! callsigns are skipped without affecting their siblings.

use std::time::SystemTime;

use tracing::trace;

use crate::callsign::{decode_shifted, encode_shifted, Callsign, ADDRESS_LEN};
use crate::packet::{Packet, PID_NETROM};

/// First byte of every NODES broadcast
pub const NODES_SIGNATURE: u8 = 0xFF;

/// Destination address of NODES broadcasts
pub const NODES_DESTINATION: &str = "NODES";

/// Length of an alias field
pub const ALIAS_LEN: usize = 6;

/// Standard entry: call + alias + call + quality
pub const STANDARD_ENTRY_LEN: usize = ADDRESS_LEN + ALIAS_LEN + ADDRESS_LEN + 1;

/// Alias-first entry: alias + call + alias + quality
pub const ALIAS_FIRST_ENTRY_LEN: usize = ALIAS_LEN + ADDRESS_LEN + ALIAS_LEN + 1;

/// Signature byte plus the smallest entry
const MIN_PAYLOAD_LEN: usize = 1 + ALIAS_FIRST_ENTRY_LEN;

/// Candidate alias at the start of the payload
const FIRST_ALIAS: std::ops::Range<usize> = 1..1 + ALIAS_LEN;

/// Candidate alias in the middle of the first entry
const SECOND_ALIAS: std::ops::Range<usize> = 14..14 + ALIAS_LEN;

/// On-wire layout of a NODES broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BroadcastLayout {
    /// Callsign-first entries, no sender alias
    Standard,
    /// Callsign-first entries preceded by the sender's alias
    StandardWithOriginAlias,
    /// Alias-first entries
    AliasFirst,
}

impl BroadcastLayout {
    /// Offset of the first entry in the payload
    pub fn entries_offset(&self) -> usize {
        match self {
            Self::StandardWithOriginAlias => 1 + ALIAS_LEN,
            Self::Standard | Self::AliasFirst => 1,
        }
    }

    /// Size of each entry
    pub fn entry_len(&self) -> usize {
        match self {
            Self::Standard | Self::StandardWithOriginAlias => STANDARD_ENTRY_LEN,
            Self::AliasFirst => ALIAS_FIRST_ENTRY_LEN,
        }
    }

    /// Whether the payload length is a whole number of entries
    fn fits(&self, len: usize) -> bool {
        let offset = self.entries_offset();
        len >= offset + self.entry_len() && (len - offset) % self.entry_len() == 0
    }
}

/// One advertised destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodesEntry {
    /// Advertised destination
    pub destination: Callsign,
    /// Destination alias (may be empty)
    pub alias: String,
    /// Neighbor the sender uses to reach the destination
    pub next_hop: Callsign,
    /// Sender's route quality to the destination
    pub quality: u8,
}

/// A decoded NODES broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodesBroadcast {
    /// Station that sent the broadcast
    pub origin: Callsign,
    /// Sender's alias when the layout carries one
    pub origin_alias: Option<String>,
    /// Layout the payload was decoded with
    pub layout: BroadcastLayout,
    /// Entries whose callsigns decoded cleanly
    pub entries: Vec<NodesEntry>,
    /// When the broadcast was heard
    pub timestamp: SystemTime,
}

impl NodesBroadcast {
    /// Decode a broadcast from an observed packet
    pub fn from_packet(packet: &Packet) -> Option<Self> {
        decode_nodes_broadcast(
            packet.pid,
            &packet.to,
            &packet.from,
            &packet.info,
            packet.timestamp,
        )
    }

    /// Encode the information field in this broadcast's layout
    ///
    /// Alias-first entries carry the origin alias (or blanks) as next-hop
    /// alias since the next-hop alias is not tracked.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            self.layout.entries_offset() + self.entries.len() * self.layout.entry_len(),
        );
        out.push(NODES_SIGNATURE);

        let origin_alias = self.origin_alias.as_deref().unwrap_or("");
        if self.layout == BroadcastLayout::StandardWithOriginAlias {
            out.extend_from_slice(&encode_alias(origin_alias));
        }

        for entry in &self.entries {
            match self.layout {
                BroadcastLayout::Standard | BroadcastLayout::StandardWithOriginAlias => {
                    out.extend_from_slice(&encode_shifted(&entry.destination));
                    out.extend_from_slice(&encode_alias(&entry.alias));
                    out.extend_from_slice(&encode_shifted(&entry.next_hop));
                }
                BroadcastLayout::AliasFirst => {
                    out.extend_from_slice(&encode_alias(&entry.alias));
                    out.extend_from_slice(&encode_shifted(&entry.destination));
                    out.extend_from_slice(&encode_alias(origin_alias));
                }
            }
            out.push(entry.quality);
        }
        out
    }
}

/// Decode a NODES broadcast
///
/// Returns `None` unless the PID is NET/ROM, the destination is `NODES`,
/// the payload starts with the signature byte, holds at least one entry,
/// and at least one entry decodes.
pub fn decode_nodes_broadcast(
    pid: Option<u8>,
    destination: &str,
    source: &str,
    info: &[u8],
    timestamp: SystemTime,
) -> Option<NodesBroadcast> {
    if pid != Some(PID_NETROM) {
        return None;
    }
    let dest = Callsign::parse(destination)?;
    if dest.base() != NODES_DESTINATION || dest.ssid() != 0 {
        return None;
    }
    let origin = Callsign::parse(source)?;
    let layout = detect_layout(info)?;

    let entries = decode_entries(info, layout, &origin);
    if entries.is_empty() {
        trace!("NODES broadcast from {} had no decodable entries", origin);
        return None;
    }

    let origin_alias = match layout {
        BroadcastLayout::StandardWithOriginAlias => Some(decode_alias(&info[FIRST_ALIAS])),
        _ => None,
    };

    trace!(
        "NODES broadcast from {}: {:?}, {} entries",
        origin,
        layout,
        entries.len()
    );

    Some(NodesBroadcast {
        origin,
        origin_alias,
        layout,
        entries,
        timestamp,
    })
}

/// Pick the layout of a NODES payload
///
/// Pure function of the payload bytes. Decision order:
///
/// 1. Both alias candidates printable and both the alias-first and the
///    origin-alias sizes fit: whichever layout yields more plausible
///    entries, origin-alias on a tie.
/// 2. Both alias candidates printable and the alias-first size fits.
/// 3. First alias candidate printable and the origin-alias size fits.
/// 4. The plain standard size fits.
/// 5. No size fits: origin-alias (or alias-first when too short for it)
///    if the first candidate is printable, otherwise standard. Only whole
///    entries are decoded.
pub fn detect_layout(payload: &[u8]) -> Option<BroadcastLayout> {
    if payload.len() < MIN_PAYLOAD_LEN || payload[0] != NODES_SIGNATURE {
        return None;
    }

    let len = payload.len();
    let first_alias = is_printable(&payload[FIRST_ALIAS]);
    let second_alias = is_printable(&payload[SECOND_ALIAS]);

    let alias_first = BroadcastLayout::AliasFirst.fits(len);
    let origin_alias = BroadcastLayout::StandardWithOriginAlias.fits(len);
    let standard = BroadcastLayout::Standard.fits(len);

    let layout = if first_alias && second_alias && alias_first && origin_alias {
        let as_alias_first = count_plausible(payload, BroadcastLayout::AliasFirst);
        let as_origin_alias = count_plausible(payload, BroadcastLayout::StandardWithOriginAlias);
        if as_alias_first > as_origin_alias {
            BroadcastLayout::AliasFirst
        } else {
            BroadcastLayout::StandardWithOriginAlias
        }
    } else if first_alias && second_alias && alias_first {
        BroadcastLayout::AliasFirst
    } else if first_alias && origin_alias {
        BroadcastLayout::StandardWithOriginAlias
    } else if standard {
        BroadcastLayout::Standard
    } else if first_alias {
        if len >= BroadcastLayout::StandardWithOriginAlias.entries_offset() + STANDARD_ENTRY_LEN {
            BroadcastLayout::StandardWithOriginAlias
        } else {
            BroadcastLayout::AliasFirst
        }
    } else {
        BroadcastLayout::Standard
    };

    Some(layout)
}

fn entry_chunks(payload: &[u8], layout: BroadcastLayout) -> std::slice::ChunksExact<'_, u8> {
    let offset = layout.entries_offset().min(payload.len());
    payload[offset..].chunks_exact(layout.entry_len())
}

fn count_plausible(payload: &[u8], layout: BroadcastLayout) -> usize {
    let call_at = match layout {
        BroadcastLayout::AliasFirst => ALIAS_LEN,
        BroadcastLayout::Standard | BroadcastLayout::StandardWithOriginAlias => 0,
    };
    entry_chunks(payload, layout)
        .filter(|entry| plausible_callsign(&entry[call_at..call_at + ADDRESS_LEN]).is_some())
        .count()
}

fn decode_entries(payload: &[u8], layout: BroadcastLayout, origin: &Callsign) -> Vec<NodesEntry> {
    entry_chunks(payload, layout)
        .enumerate()
        .filter_map(|(index, entry)| {
            let decoded = match layout {
                BroadcastLayout::Standard | BroadcastLayout::StandardWithOriginAlias => {
                    decode_standard_entry(entry)
                }
                BroadcastLayout::AliasFirst => decode_alias_first_entry(entry, origin),
            };
            if decoded.is_none() {
                trace!("Skipping undecodable NODES entry {} from {}", index, origin);
            }
            decoded
        })
        .collect()
}

fn decode_standard_entry(entry: &[u8]) -> Option<NodesEntry> {
    let destination = plausible_callsign(&entry[0..ADDRESS_LEN])?;
    let alias = decode_alias(&entry[ADDRESS_LEN..ADDRESS_LEN + ALIAS_LEN]);
    let next_hop = plausible_callsign(&entry[ADDRESS_LEN + ALIAS_LEN..STANDARD_ENTRY_LEN - 1])?;
    Some(NodesEntry {
        destination,
        alias,
        next_hop,
        quality: entry[STANDARD_ENTRY_LEN - 1],
    })
}

fn decode_alias_first_entry(entry: &[u8], origin: &Callsign) -> Option<NodesEntry> {
    let alias = decode_alias(&entry[0..ALIAS_LEN]);
    let destination = plausible_callsign(&entry[ALIAS_LEN..ALIAS_LEN + ADDRESS_LEN])?;
    Some(NodesEntry {
        destination,
        alias,
        next_hop: origin.clone(),
        quality: entry[ALIAS_FIRST_ENTRY_LEN - 1],
    })
}

fn plausible_callsign(field: &[u8]) -> Option<Callsign> {
    decode_shifted(field).filter(Callsign::is_amateur_plausible)
}

fn is_printable(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| (0x20..=0x7E).contains(&b))
}

fn decode_alias(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|&&b| (0x20..=0x7E).contains(&b))
        .map(|&b| char::from(b))
        .collect::<String>()
        .trim()
        .to_string()
}

fn encode_alias(alias: &str) -> [u8; ALIAS_LEN] {
    let mut out = [b' '; ALIAS_LEN];
    for (slot, b) in out.iter_mut().zip(alias.bytes()) {
        *slot = b;
    }
    out
}

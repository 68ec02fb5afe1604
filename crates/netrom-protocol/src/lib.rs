//! NET/ROM Protocol Library
//!
//! This crate provides the wire-level side of a NET/ROM network monitor:
//!
//! - **KISS**: TNC framing with FEND/FESC escaping ([`kiss`])
//! - **AX.25**: Address field, digipeater path, control and PID decoding ([`ax25`])
//! - **Callsigns**: Normalization and shifted AX.25 encoding ([`callsign`])
//! - **NODES broadcasts**: NET/ROM routing broadcasts in both the standard
//!   and the alias-first layout ([`nodes`])
//!
//! # Architecture
//!
//! Bytes from a TNC flow through three stages:
//! - [`KissCodec`] turns a byte stream into frames
//! - [`ax25::decode_frame`] turns a frame into addresses and payload
//! - [`Ax25Frame::into_packet`] produces the [`Packet`] the router consumes
//!
//! The NODES decoder works on a [`Packet`] so that packets replayed from
//! storage (which never saw KISS) take the same path as live traffic.
//!
//! # Example
//!
//! ```rust
//! use std::time::SystemTime;
//! use netrom_protocol::{ax25, KissCodec, NodesBroadcast};
//!
//! let mut codec = KissCodec::new();
//! codec.push_bytes(&[0xC0, 0x00]);
//! codec.push_bytes(&[0xC0]);
//!
//! while let Some(frame) = codec.next_frame() {
//!     if let Ok(ax25) = ax25::decode_frame(&frame.data) {
//!         let packet = ax25.into_packet(SystemTime::now());
//!         if let Some(broadcast) = NodesBroadcast::from_packet(&packet) {
//!             println!("{} advertises {} nodes", broadcast.origin, broadcast.entries.len());
//!         }
//!     }
//! }
//! ```

pub mod ax25;
pub mod callsign;
pub mod error;
pub mod kiss;
pub mod nodes;
pub mod packet;

pub use ax25::{Ax25Frame, Digipeater};
pub use callsign::Callsign;
pub use error::ParseError;
pub use kiss::{KissCodec, KissCommand, KissFrame};
pub use nodes::{decode_nodes_broadcast, BroadcastLayout, NodesBroadcast, NodesEntry};
pub use packet::{FrameKind, Packet, PID_NETROM, PID_NO_LAYER3};

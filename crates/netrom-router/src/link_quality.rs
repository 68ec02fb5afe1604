//! Link quality estimation seam
//!
//! Delivery-ratio statistics (duplicates, acknowledgements) are kept by
//! an external estimator. The coordinator feeds it every packet and asks
//! it for a figure when recording a direct observation. An answer of 0
//! means "unknown", not "unusable".

use netrom_protocol::{Callsign, Packet};

/// Source of per-link quality estimates
pub trait LinkQualityEstimator: Send {
    /// Update statistics from one packet
    fn observe(&mut self, packet: &Packet);

    /// Estimated quality of the link `from -> to`, 0 if unknown
    fn link_quality(&self, from: &Callsign, to: &Callsign) -> u8;
}

/// Estimator that never knows anything
#[derive(Debug, Clone, Copy, Default)]
pub struct UnknownLinkQuality;

impl LinkQualityEstimator for UnknownLinkQuality {
    fn observe(&mut self, _packet: &Packet) {}

    fn link_quality(&self, _from: &Callsign, _to: &Callsign) -> u8 {
        0
    }
}

/// Blend an estimate with the configured default direct quality
pub(crate) fn blend(estimate: u8, default: u8) -> u8 {
    if estimate == 0 {
        return default;
    }
    ((u16::from(estimate) + u16::from(default) + 1) / 2) as u8
}

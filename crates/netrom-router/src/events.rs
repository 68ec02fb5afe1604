//! Router events
//!
//! Every change to neighbor or route state is reported through a single
//! event stream so that displays and graph builders can update
//! incrementally instead of diffing full snapshots.

use netrom_protocol::Callsign;

use crate::state::{Neighbor, Route, RoutingMode};

/// Counts of entries removed by one maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Neighbors whose obsolescence count ran out
    pub neighbors_removed: usize,
    /// Routes removed by decay or because their neighbor vanished
    pub routes_removed: usize,
    /// Inference evidence records dropped
    pub evidence_removed: usize,
}

impl PurgeReport {
    /// Whether the pass removed anything at all
    pub fn is_empty(&self) -> bool {
        self.neighbors_removed == 0 && self.routes_removed == 0 && self.evidence_removed == 0
    }
}

/// Unified event enum for routing activity
#[derive(Debug, Clone, PartialEq)]
pub enum RouterEvent {
    // -------------------------------------------------------------------------
    // Neighbor events
    // -------------------------------------------------------------------------
    /// A neighbor was learned
    NeighborAdded(Neighbor),

    /// A known neighbor was refreshed
    NeighborUpdated(Neighbor),

    /// A neighbor expired
    NeighborRemoved {
        /// Callsign of the expired neighbor
        callsign: Callsign,
    },

    // -------------------------------------------------------------------------
    // Route events
    // -------------------------------------------------------------------------
    /// A route was learned
    RouteAdded(Route),

    /// A known route was refreshed
    RouteUpdated(Route),

    /// A route expired, was evicted by a better one, or was retracted
    RouteRemoved {
        /// Route destination
        destination: Callsign,
        /// Neighbor the route went through
        origin: Callsign,
    },

    // -------------------------------------------------------------------------
    // Coordinator events
    // -------------------------------------------------------------------------
    /// A NODES broadcast was decoded
    BroadcastDecoded {
        /// Sender of the broadcast
        origin: Callsign,
        /// Entries that decoded
        entries: usize,
        /// Entries accepted into the routing table
        accepted: usize,
    },

    /// The routing mode changed
    ModeChanged {
        /// Previous mode
        from: RoutingMode,
        /// New mode
        to: RoutingMode,
    },

    /// A maintenance pass removed stale entries
    Purged(PurgeReport),
}

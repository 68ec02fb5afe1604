//! Neighbor and route state

use std::cmp::Ordering;
use std::time::SystemTime;

use netrom_protocol::Callsign;
use serde::{Deserialize, Serialize};

/// Highest NET/ROM quality
pub const MAX_QUALITY: u8 = 255;

/// Where neighbor evidence came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NeighborSource {
    /// Heard directly, or sent us a NODES broadcast
    Classic,
    /// Derived by passive inference
    Inferred,
}

impl NeighborSource {
    /// Combine existing and new evidence; classic evidence is never downgraded
    pub fn merge(self, incoming: Self) -> Self {
        match self {
            Self::Inferred => incoming,
            Self::Classic => Self::Classic,
        }
    }
}

/// Where route evidence came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteSource {
    /// Learned from classic observation
    Classic,
    /// Learned from a NODES broadcast
    Broadcast,
    /// Derived by passive inference
    Inferred,
}

impl RouteSource {
    /// Combine existing and new evidence; only `Inferred` is ever replaced
    pub fn merge(self, incoming: Self) -> Self {
        match self {
            Self::Inferred => incoming,
            other => other,
        }
    }
}

/// Which evidence paths run, and which entries queries show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RoutingMode {
    /// Direct observation and NODES broadcasts only
    #[default]
    Classic,
    /// Passive inference only (broadcasts are still honored)
    Inference,
    /// Both evidence paths
    Hybrid,
}

impl RoutingMode {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Classic => "Classic",
            Self::Inference => "Inference",
            Self::Hybrid => "Hybrid",
        }
    }

    /// Get description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Classic => "Learn neighbors from direct traffic and routes from NODES broadcasts",
            Self::Inference => "Infer neighbors and routes from overheard digipeated traffic",
            Self::Hybrid => "Combine classic learning with passive inference",
        }
    }

    /// Whether direct packets feed the routing table
    pub fn runs_classic(&self) -> bool {
        matches!(self, Self::Classic | Self::Hybrid)
    }

    /// Whether packets feed the inference engine
    pub fn runs_inference(&self) -> bool {
        matches!(self, Self::Inference | Self::Hybrid)
    }

    /// Whether a neighbor with this source belongs in this mode's view
    pub fn shows_neighbor(&self, source: NeighborSource) -> bool {
        match self {
            Self::Classic => source == NeighborSource::Classic,
            Self::Inference => source == NeighborSource::Inferred,
            Self::Hybrid => true,
        }
    }

    /// Whether a route with this source belongs in this mode's view
    pub fn shows_route(&self, source: RouteSource) -> bool {
        match self {
            Self::Classic => source != RouteSource::Inferred,
            Self::Inference => source == RouteSource::Inferred,
            Self::Hybrid => true,
        }
    }
}

/// Which side of an observed packet is the remote station
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sent to us (or overheard): the sender is remote
    Incoming,
    /// Sent by us: the recipient is remote
    Outgoing,
}

/// A station reachable without digipeaters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Neighbor callsign
    pub callsign: Callsign,
    /// Link quality (0-255)
    pub quality: u8,
    /// Last time the neighbor was heard
    pub last_update: SystemTime,
    /// Remaining obsolescence count
    pub obsolescence: u32,
    /// Evidence kind
    pub source: NeighborSource,
}

/// A path to a destination through one neighbor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Destination station
    pub destination: Callsign,
    /// Neighbor the route goes through
    pub origin: Callsign,
    /// Route quality (0-255)
    pub quality: u8,
    /// Station sequence starting at `origin`
    pub path: Vec<Callsign>,
    /// Last time the route was advertised or inferred
    pub last_heard: SystemTime,
    /// Remaining obsolescence count
    pub obsolescence: u32,
    /// Evidence kind
    pub source: RouteSource,
}

/// One destination advertised by a neighbor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteAdvertisement {
    /// Advertised destination
    pub destination: Callsign,
    /// Neighbor's quality to the destination
    pub quality: u8,
    /// Advertised path (the origin is prepended if missing)
    pub path: Vec<Callsign>,
}

/// Clamp an arbitrary quality figure into 0..=255
pub fn clamp_quality(value: i32) -> u8 {
    value.clamp(0, i32::from(MAX_QUALITY)) as u8
}

/// NET/ROM quality algebra: `(a * b + 128) / 256`
///
/// Combines an advertised route quality with the quality of the neighbor
/// it was heard from.
pub fn combine_quality(advertised: u8, neighbor: u8) -> u8 {
    ((u32::from(advertised) * u32::from(neighbor) + 128) / 256) as u8
}

/// Display/diff order for neighbors: quality desc, then callsign
pub fn neighbor_order(a: &Neighbor, b: &Neighbor) -> Ordering {
    b.quality
        .cmp(&a.quality)
        .then_with(|| a.callsign.cmp(&b.callsign))
}

/// Rank of routes to one destination: quality desc, origin asc, shorter path first
pub fn route_rank(a: &Route, b: &Route) -> Ordering {
    b.quality
        .cmp(&a.quality)
        .then_with(|| a.origin.cmp(&b.origin))
        .then_with(|| a.path.len().cmp(&b.path.len()))
}

/// Display/diff order across destinations
pub fn route_order(a: &Route, b: &Route) -> Ordering {
    b.quality
        .cmp(&a.quality)
        .then_with(|| a.destination.cmp(&b.destination))
        .then_with(|| a.origin.cmp(&b.origin))
        .then_with(|| a.path.len().cmp(&b.path.len()))
}

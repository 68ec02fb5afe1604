//! NET/ROM Routing Core
//!
//! This crate builds a live picture of a NET/ROM routing mesh from two
//! independent evidence sources: explicit NODES broadcasts and passively
//! overheard traffic.
//!
//! # Architecture
//!
//! - [`RoutingTable`] tracks neighbors and up to K routes per destination,
//!   with NET/ROM quality algebra and obsolescence decay
//! - [`InferenceEngine`] turns digipeated traffic into provisional route
//!   evidence and publishes it into the table
//! - [`Coordinator`] dispatches packets according to the [`RoutingMode`]:
//!
//! - **Classic**: direct traffic and NODES broadcasts (default)
//! - **Inference**: passive inference, plus NODES broadcasts
//! - **Hybrid**: both
//!
//! The core is synchronous and single-owner. [`actor::run_router_actor`]
//! wraps a [`Coordinator`] in a tokio task so that capture, replay and
//! display code can share it through a command channel.
//!
//! # Example
//!
//! ```rust
//! use std::time::SystemTime;
//! use netrom_protocol::{Callsign, Packet};
//! use netrom_router::{Coordinator, RouterConfig, RoutingMode};
//!
//! let local = Callsign::parse("N0CALL").unwrap();
//! let mut router = Coordinator::new(RouterConfig::for_station(local));
//! router.set_mode(RoutingMode::Hybrid);
//!
//! let packet = Packet::ui("K2ABC", "N0CALL", b"hello", SystemTime::now()).with_via(&["W1AW"]);
//! router.process_packet(&packet);
//!
//! let k2abc = Callsign::parse("K2ABC").unwrap();
//! assert!(router.best_route_to(&k2abc).is_some());
//! ```

pub mod actor;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod inference;
pub mod link_quality;
mod ranked;
pub mod snapshot;
pub mod state;
pub mod table;

// Re-export actor types
pub use actor::{run_router_actor, RouterCommand, RouterHandle};

pub use config::{InferenceConfig, RouterConfig};
pub use coordinator::Coordinator;
pub use error::RouterError;
pub use events::{PurgeReport, RouterEvent};
pub use inference::{IgnoreReason, InferenceEngine, InferenceOutcome, RouteEvidence};
pub use link_quality::{LinkQualityEstimator, UnknownLinkQuality};
pub use snapshot::RouterSnapshot;
pub use state::{
    clamp_quality, combine_quality, Direction, Neighbor, NeighborSource, Route,
    RouteAdvertisement, RouteSource, RoutingMode, MAX_QUALITY,
};
pub use table::{DirectObservation, RoutingTable};

//! Mode coordinator
//!
//! The single entry point for packets. It owns the [`RoutingTable`], the
//! optional [`InferenceEngine`] and the link quality estimator, and routes
//! every packet to them according to the current [`RoutingMode`].
//!
//! NODES broadcasts are handled the same way in every mode: the sender is
//! registered as a high-quality neighbor and its entries are applied as
//! broadcast routes. Everything else goes to classic learning, inference,
//! or both.
//!
//! There is one table regardless of mode. Mode-specific views filter it by
//! evidence kind.

use std::time::{Duration, SystemTime};

use netrom_protocol::{Callsign, NodesBroadcast, Packet};
use tracing::{debug, info, trace};

use crate::config::RouterConfig;
use crate::events::{PurgeReport, RouterEvent};
use crate::inference::InferenceEngine;
use crate::link_quality::{blend, LinkQualityEstimator, UnknownLinkQuality};
use crate::snapshot::RouterSnapshot;
use crate::state::{
    Direction, Neighbor, NeighborSource, Route, RouteAdvertisement, RouteSource, RoutingMode,
};
use crate::table::{DirectObservation, RoutingTable};

/// Routing core for one local station
pub struct Coordinator {
    mode: RoutingMode,
    table: RoutingTable,
    /// Created on first switch into a mode that needs it, then kept
    inference: Option<InferenceEngine>,
    link_quality: Box<dyn LinkQualityEstimator>,
    event_buffer: Vec<RouterEvent>,
}

impl Coordinator {
    /// Create a coordinator in classic mode with no link quality estimates
    pub fn new(config: RouterConfig) -> Self {
        Self::with_link_quality(config, Box::new(UnknownLinkQuality))
    }

    /// Create with an external link quality estimator
    pub fn with_link_quality(
        config: RouterConfig,
        link_quality: Box<dyn LinkQualityEstimator>,
    ) -> Self {
        Self {
            mode: RoutingMode::default(),
            table: RoutingTable::new(config),
            inference: None,
            link_quality,
            event_buffer: Vec::new(),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &RouterConfig {
        self.table.config()
    }

    /// Current routing mode
    pub fn mode(&self) -> RoutingMode {
        self.mode
    }

    /// Switch routing mode
    ///
    /// Entering inference or hybrid mode creates the inference engine if
    /// it does not exist yet. Leaving those modes keeps it, along with its
    /// evidence.
    pub fn set_mode(&mut self, mode: RoutingMode) {
        if mode.runs_inference() && self.inference.is_none() {
            debug!("Creating inference engine");
            self.inference = Some(InferenceEngine::new(self.config().inference.clone()));
        }
        if mode != self.mode {
            info!("Routing mode: {} -> {}", self.mode.name(), mode.name());
            self.event_buffer.push(RouterEvent::ModeChanged {
                from: self.mode,
                to: mode,
            });
            self.mode = mode;
        }
    }

    /// The routing table, unfiltered
    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// The inference engine, if it has been created
    pub fn inference(&self) -> Option<&InferenceEngine> {
        self.inference.as_ref()
    }

    /// Process one packet
    ///
    /// Never fails: malformed and policy-rejected packets simply have no
    /// effect.
    pub fn process_packet(&mut self, packet: &Packet) {
        self.link_quality.observe(packet);

        if let Some(broadcast) = NodesBroadcast::from_packet(packet) {
            self.apply_broadcast(packet, &broadcast);
            self.collect_table_events();
            return;
        }

        if self.mode.runs_classic() {
            self.observe_classic(packet);
        }
        if self.mode.runs_inference() {
            if let Some(engine) = self.inference.as_mut() {
                let outcome = engine.observe(packet, &mut self.table);
                trace!("Inference: {:?}", outcome);
            }
        }
        self.collect_table_events();
    }

    /// Register the broadcast's sender and apply its entries
    fn apply_broadcast(&mut self, packet: &Packet, broadcast: &NodesBroadcast) {
        let origin = &broadcast.origin;

        // A digipeated broadcast did not come from a neighbor
        if packet.via.is_empty() {
            let config = self.table.config();
            let observation = DirectObservation {
                from: origin.clone(),
                to: config.local_callsign.clone(),
                via_is_empty: true,
                is_infrastructure: false,
                quality: i32::from(config.broadcast_neighbor_quality),
                direction: Direction::Incoming,
                timestamp: broadcast.timestamp,
                source: NeighborSource::Classic,
            };
            self.table.observe_direct(observation);
        }

        let adverts: Vec<RouteAdvertisement> = broadcast
            .entries
            .iter()
            .map(|entry| {
                let mut path = vec![origin.clone()];
                if entry.next_hop != *origin && entry.next_hop != entry.destination {
                    path.push(entry.next_hop.clone());
                }
                path.push(entry.destination.clone());
                RouteAdvertisement {
                    destination: entry.destination.clone(),
                    quality: entry.quality,
                    path,
                }
            })
            .collect();

        let accepted = self.table.broadcast_routes(
            origin,
            &adverts,
            broadcast.timestamp,
            RouteSource::Broadcast,
        );
        debug!(
            "NODES from {} ({:?}): {} entries, {} accepted",
            origin,
            broadcast.layout,
            adverts.len(),
            accepted
        );

        self.collect_table_events();
        self.event_buffer.push(RouterEvent::BroadcastDecoded {
            origin: origin.clone(),
            entries: adverts.len(),
            accepted,
        });
    }

    /// Classic neighbor learning from direct traffic
    fn observe_classic(&mut self, packet: &Packet) {
        if !packet.via.is_empty() {
            return;
        }
        let (Some(from), Some(to)) = (Callsign::parse(&packet.from), Callsign::parse(&packet.to))
        else {
            return;
        };

        let config = self.table.config();
        let direction = if from == config.local_callsign {
            Direction::Outgoing
        } else {
            Direction::Incoming
        };
        let estimate = self.link_quality.link_quality(&from, &to);
        let quality = blend(estimate, config.default_direct_quality);

        self.table.observe_direct(DirectObservation {
            from,
            to,
            via_is_empty: true,
            is_infrastructure: packet.is_infrastructure(),
            quality: i32::from(quality),
            direction,
            timestamp: packet.timestamp,
            source: NeighborSource::Classic,
        });
    }

    /// Periodic maintenance of the table and the evidence ledger
    pub fn purge(&mut self, now: SystemTime) -> PurgeReport {
        let mut report = self.table.purge_stale_routes(now);
        if let Some(engine) = self.inference.as_mut() {
            report.evidence_removed = engine.purge_stale_evidence(now, &mut self.table);
        }
        self.collect_table_events();

        if !report.is_empty() {
            info!(
                "Purged {} neighbors, {} routes, {} evidence records",
                report.neighbors_removed, report.routes_removed, report.evidence_removed
            );
            self.event_buffer.push(RouterEvent::Purged(report));
        }
        report
    }

    /// Neighbors visible in `mode`, best first
    pub fn current_neighbors_for(&self, mode: RoutingMode) -> Vec<Neighbor> {
        self.table
            .current_neighbors()
            .into_iter()
            .filter(|n| mode.shows_neighbor(n.source))
            .collect()
    }

    /// Routes visible in `mode`, best first
    pub fn current_routes_for(&self, mode: RoutingMode) -> Vec<Route> {
        self.table
            .current_routes()
            .into_iter()
            .filter(|r| mode.shows_route(r.source))
            .collect()
    }

    /// Neighbors visible in the current mode
    pub fn current_neighbors(&self) -> Vec<Neighbor> {
        self.current_neighbors_for(self.mode)
    }

    /// Routes visible in the current mode
    pub fn current_routes(&self) -> Vec<Route> {
        self.current_routes_for(self.mode)
    }

    /// Routes to `destination` visible in the current mode, best first
    pub fn best_paths(&self, destination: &Callsign) -> Vec<Route> {
        self.table
            .best_paths(destination)
            .into_iter()
            .filter(|r| self.mode.shows_route(r.source))
            .collect()
    }

    /// Best route to `destination` visible in the current mode
    pub fn best_route_to(&self, destination: &Callsign) -> Option<Route> {
        self.best_paths(destination).into_iter().next()
    }

    /// Capture the full table for persistence
    pub fn snapshot(&self, last_processed_id: u64, now: SystemTime) -> RouterSnapshot {
        RouterSnapshot {
            created_at: now,
            last_processed_id,
            config_fingerprint: self.config().fingerprint(),
            mode: self.mode,
            neighbors: self.table.current_neighbors(),
            routes: self.table.current_routes(),
        }
    }

    /// Load a snapshot taken earlier
    ///
    /// Returns `false`, leaving state untouched, if the snapshot is older
    /// than `max_age` or was taken under a different configuration.
    pub fn restore(&mut self, snapshot: RouterSnapshot, now: SystemTime, max_age: Duration) -> bool {
        if let Err(e) = snapshot.validate(now, max_age, &self.config().fingerprint()) {
            info!("Not restoring snapshot: {}", e);
            return false;
        }

        let neighbors = self.table.import_neighbors(snapshot.neighbors);
        let routes = self.table.import_routes(snapshot.routes);
        // Imports are not live observations
        self.table.drain_events();
        info!(
            "Restored {} neighbors and {} routes (last input {})",
            neighbors, routes, snapshot.last_processed_id
        );
        true
    }

    fn collect_table_events(&mut self) {
        self.event_buffer.extend(self.table.drain_events());
    }

    /// Drain pending events
    pub fn drain_events(&mut self) -> Vec<RouterEvent> {
        self.collect_table_events();
        std::mem::take(&mut self.event_buffer)
    }
}

//! NET/ROM routing table
//!
//! Tracks neighbors (stations heard without digipeaters) and up to K routes
//! per destination, each through a different neighbor.
//!
//! # Obsolescence
//!
//! Every neighbor and route carries an obsolescence count that is reset on
//! each refresh. [`RoutingTable::purge_stale_routes`] subtracts one count
//! per whole `obsolescence_interval` elapsed since the entry was last
//! refreshed (or last decremented) and drops the entry when the count
//! reaches zero. An entry refreshed just before an interval boundary
//! therefore survives longer than the raw interval.
//!
//! # Policy
//!
//! Rejections are silent no-ops: routes from unknown origins, routes below
//! the quality floor, and anything that would route to or through the
//! local station are simply not recorded.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, SystemTime};

use netrom_protocol::Callsign;
use tracing::{debug, trace};

use crate::config::RouterConfig;
use crate::events::{PurgeReport, RouterEvent};
use crate::ranked::BoundedRanked;
use crate::state::{
    clamp_quality, combine_quality, neighbor_order, route_order, route_rank, Direction, Neighbor,
    NeighborSource, Route, RouteAdvertisement, RouteSource,
};

/// One direct observation of traffic
#[derive(Debug, Clone)]
pub struct DirectObservation {
    /// Packet sender
    pub from: Callsign,
    /// Packet recipient
    pub to: Callsign,
    /// Whether the packet carried no digipeater path
    pub via_is_empty: bool,
    /// Beacon/ID/broadcast traffic
    pub is_infrastructure: bool,
    /// Observed link quality (clamped to 0-255)
    pub quality: i32,
    /// Which side of the packet is the remote station
    pub direction: Direction,
    /// When the packet was heard
    pub timestamp: SystemTime,
    /// Evidence kind
    pub source: NeighborSource,
}

#[derive(Debug, Clone)]
struct NeighborEntry {
    neighbor: Neighbor,
    /// Reference point for obsolescence decay
    decay_anchor: SystemTime,
}

#[derive(Debug, Clone)]
struct RouteEntry {
    route: Route,
    decay_anchor: SystemTime,
}

/// Outcome of applying decay to one entry
enum Decay {
    Keep,
    Decremented,
    Expired,
}

/// Neighbor and route state for one local station
pub struct RoutingTable {
    config: RouterConfig,
    neighbors: HashMap<Callsign, NeighborEntry>,
    routes: BTreeMap<Callsign, BoundedRanked<RouteEntry>>,
    event_buffer: Vec<RouterEvent>,
}

impl RoutingTable {
    /// Create an empty table
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            neighbors: HashMap::new(),
            routes: BTreeMap::new(),
            event_buffer: Vec::new(),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// The local station
    pub fn local_callsign(&self) -> &Callsign {
        &self.config.local_callsign
    }

    /// Record a direct observation
    ///
    /// Only packets without digipeaters and outside beacon/ID traffic count.
    /// The remote station's quality becomes
    /// `max(existing, observed) + increment`, capped at 255.
    ///
    /// Returns whether a neighbor was added or refreshed.
    pub fn observe_direct(&mut self, obs: DirectObservation) -> bool {
        if !obs.via_is_empty || obs.is_infrastructure {
            return false;
        }

        let remote = match obs.direction {
            Direction::Incoming => obs.from,
            Direction::Outgoing => obs.to,
        };
        if remote == self.config.local_callsign {
            trace!("Ignoring direct observation of the local station");
            return false;
        }

        let observed = clamp_quality(obs.quality);
        let increment = self.config.neighbor_quality_increment;
        let obsolescence = self.config.obsolescence_init;

        match self.neighbors.get_mut(&remote) {
            Some(entry) => {
                let n = &mut entry.neighbor;
                n.quality = n.quality.max(observed).saturating_add(increment);
                n.last_update = n.last_update.max(obs.timestamp);
                n.obsolescence = obsolescence;
                n.source = n.source.merge(obs.source);
                entry.decay_anchor = n.last_update;
                self.event_buffer
                    .push(RouterEvent::NeighborUpdated(n.clone()));
            }
            None => {
                let neighbor = Neighbor {
                    callsign: remote.clone(),
                    quality: observed.saturating_add(increment),
                    last_update: obs.timestamp,
                    obsolescence,
                    source: obs.source,
                };
                debug!(
                    "New {:?} neighbor {} (quality {})",
                    neighbor.source, neighbor.callsign, neighbor.quality
                );
                self.event_buffer
                    .push(RouterEvent::NeighborAdded(neighbor.clone()));
                self.neighbors.insert(
                    remote,
                    NeighborEntry {
                        neighbor,
                        decay_anchor: obs.timestamp,
                    },
                );
            }
        }
        true
    }

    /// Apply routes advertised by a neighbor
    ///
    /// The whole batch is ignored unless `origin` is already a neighbor.
    /// Each entry is combined with the neighbor's quality using the NET/ROM
    /// quality algebra and dropped if it falls below the quality floor, or
    /// if it would route to the origin itself, to the local station, or
    /// through the local station.
    ///
    /// Returns the number of routes added or refreshed.
    pub fn broadcast_routes(
        &mut self,
        origin: &Callsign,
        entries: &[RouteAdvertisement],
        timestamp: SystemTime,
        source: RouteSource,
    ) -> usize {
        let Some(neighbor_quality) = self.neighbors.get(origin).map(|e| e.neighbor.quality) else {
            debug!("Ignoring routes from {}: not a neighbor", origin);
            return 0;
        };

        let local = self.config.local_callsign.clone();
        let mut mutated = 0;

        for adv in entries {
            if adv.destination == local || adv.destination == *origin {
                trace!("Ignoring route from {} to {}", origin, adv.destination);
                continue;
            }
            if adv.path.contains(&local) {
                trace!(
                    "Ignoring route from {} to {}: path runs through {}",
                    origin,
                    adv.destination,
                    local
                );
                continue;
            }

            let quality = combine_quality(adv.quality, neighbor_quality);
            if quality < self.config.min_route_quality {
                trace!(
                    "Ignoring route from {} to {}: quality {} below {}",
                    origin,
                    adv.destination,
                    quality,
                    self.config.min_route_quality
                );
                continue;
            }

            let mut path = adv.path.clone();
            if path.first() != Some(origin) {
                path.insert(0, origin.clone());
            }

            let route = Route {
                destination: adv.destination.clone(),
                origin: origin.clone(),
                quality,
                path,
                last_heard: timestamp,
                obsolescence: self.config.obsolescence_init,
                source,
            };
            if self.upsert_route(route) {
                mutated += 1;
            }
        }

        mutated
    }

    /// Insert or refresh a route, then re-rank its destination
    ///
    /// Returns whether the route survived ranking.
    fn upsert_route(&mut self, incoming: Route) -> bool {
        let capacity = self.config.max_routes_per_destination;
        let set = self
            .routes
            .entry(incoming.destination.clone())
            .or_insert_with(|| BoundedRanked::new(capacity));

        let destination = incoming.destination.clone();
        let origin = incoming.origin.clone();

        let is_new = match set.find_mut(|e| e.route.origin == origin) {
            Some(entry) => {
                let r = &mut entry.route;
                r.quality = r.quality.max(incoming.quality);
                r.path = incoming.path;
                r.last_heard = r.last_heard.max(incoming.last_heard);
                r.obsolescence = incoming.obsolescence;
                r.source = r.source.merge(incoming.source);
                entry.decay_anchor = r.last_heard;
                false
            }
            None => {
                let anchor = incoming.last_heard;
                set.push(RouteEntry {
                    route: incoming,
                    decay_anchor: anchor,
                });
                true
            }
        };

        let evicted = set.rerank(|a, b| route_rank(&a.route, &b.route));
        let mut survived = true;
        for entry in evicted {
            if entry.route.origin == origin {
                survived = false;
                if is_new {
                    continue;
                }
            }
            self.event_buffer.push(RouterEvent::RouteRemoved {
                destination: entry.route.destination,
                origin: entry.route.origin,
            });
        }
        if set.is_empty() {
            self.routes.remove(&destination);
        }

        if survived {
            if let Some(entry) = self
                .routes
                .get(&destination)
                .and_then(|set| set.find(|e| e.route.origin == origin))
            {
                let route = entry.route.clone();
                self.event_buffer.push(if is_new {
                    RouterEvent::RouteAdded(route)
                } else {
                    RouterEvent::RouteUpdated(route)
                });
            }
        }
        survived
    }

    /// Remove one route
    ///
    /// Returns whether a route was removed.
    pub fn remove_route(&mut self, origin: &Callsign, destination: &Callsign) -> bool {
        self.remove_route_where(origin, destination, |_| true)
    }

    /// Remove a route only if it rests purely on inferred evidence
    ///
    /// Routes that were later confirmed by a broadcast or classic evidence
    /// are left alone.
    pub fn retract_inferred_route(&mut self, origin: &Callsign, destination: &Callsign) -> bool {
        self.remove_route_where(origin, destination, |r| r.source == RouteSource::Inferred)
    }

    fn remove_route_where(
        &mut self,
        origin: &Callsign,
        destination: &Callsign,
        pred: impl Fn(&Route) -> bool,
    ) -> bool {
        let Some(set) = self.routes.get_mut(destination) else {
            return false;
        };
        let removed = set.remove_where(|e| e.route.origin == *origin && pred(&e.route));
        if set.is_empty() {
            self.routes.remove(destination);
        }
        for entry in &removed {
            debug!("Removed route to {} via {}", destination, origin);
            self.event_buffer.push(RouterEvent::RouteRemoved {
                destination: entry.route.destination.clone(),
                origin: entry.route.origin.clone(),
            });
        }
        !removed.is_empty()
    }

    /// Decay every neighbor and route by elapsed time
    ///
    /// Neighbors that expire take their routes with them.
    pub fn purge_stale_routes(&mut self, now: SystemTime) -> PurgeReport {
        let interval = self.config.obsolescence_interval;
        let mut report = PurgeReport::default();
        if interval.is_zero() {
            return report;
        }

        let mut expired_neighbors = Vec::new();
        for (callsign, entry) in self.neighbors.iter_mut() {
            match decay(
                &mut entry.neighbor.obsolescence,
                &mut entry.decay_anchor,
                now,
                interval,
            ) {
                Decay::Expired => expired_neighbors.push(callsign.clone()),
                Decay::Decremented | Decay::Keep => {}
            }
        }
        for callsign in &expired_neighbors {
            self.neighbors.remove(callsign);
            debug!("Neighbor {} expired", callsign);
            self.event_buffer.push(RouterEvent::NeighborRemoved {
                callsign: callsign.clone(),
            });
        }
        report.neighbors_removed = expired_neighbors.len();

        let neighbors = &self.neighbors;
        let mut removed_routes = Vec::new();
        for set in self.routes.values_mut() {
            for entry in set.iter_mut() {
                if let Decay::Expired = decay(
                    &mut entry.route.obsolescence,
                    &mut entry.decay_anchor,
                    now,
                    interval,
                ) {
                    entry.route.obsolescence = 0;
                }
            }
            removed_routes.extend(set.remove_where(|e| {
                e.route.obsolescence == 0 || !neighbors.contains_key(&e.route.origin)
            }));
        }
        self.routes.retain(|_, set| !set.is_empty());

        for entry in &removed_routes {
            self.event_buffer.push(RouterEvent::RouteRemoved {
                destination: entry.route.destination.clone(),
                origin: entry.route.origin.clone(),
            });
        }
        report.routes_removed = removed_routes.len();

        if !report.is_empty() {
            debug!(
                "Purged {} neighbors and {} routes",
                report.neighbors_removed, report.routes_removed
            );
        }
        report
    }

    /// Load neighbors from a snapshot
    ///
    /// Entries naming the local station are skipped. Existing entries are
    /// merged with the same precedence rules as live observations.
    pub fn import_neighbors(&mut self, neighbors: Vec<Neighbor>) -> usize {
        let mut imported = 0;
        for incoming in neighbors {
            if incoming.callsign == self.config.local_callsign {
                continue;
            }
            match self.neighbors.get_mut(&incoming.callsign) {
                Some(entry) => {
                    let n = &mut entry.neighbor;
                    n.quality = n.quality.max(incoming.quality);
                    n.last_update = n.last_update.max(incoming.last_update);
                    n.obsolescence = n.obsolescence.max(incoming.obsolescence);
                    n.source = n.source.merge(incoming.source);
                    entry.decay_anchor = n.last_update;
                }
                None => {
                    let anchor = incoming.last_update;
                    self.neighbors.insert(
                        incoming.callsign.clone(),
                        NeighborEntry {
                            neighbor: incoming,
                            decay_anchor: anchor,
                        },
                    );
                }
            }
            imported += 1;
        }
        imported
    }

    /// Load routes from a snapshot
    ///
    /// Routes to, from or through the local station are skipped, as are
    /// routes whose path does not start at their origin and routes via a
    /// station that is not a known neighbor. Import neighbors first.
    pub fn import_routes(&mut self, routes: Vec<Route>) -> usize {
        let local = self.config.local_callsign.clone();
        let mut imported = 0;
        for route in routes {
            if route.destination == local
                || route.origin == local
                || route.destination == route.origin
                || route.path.contains(&local)
                || route.path.first() != Some(&route.origin)
                || !self.neighbors.contains_key(&route.origin)
            {
                continue;
            }
            if self.upsert_route(route) {
                imported += 1;
            }
        }
        imported
    }

    /// Look up one neighbor
    pub fn neighbor(&self, callsign: &Callsign) -> Option<&Neighbor> {
        self.neighbors.get(callsign).map(|e| &e.neighbor)
    }

    /// All neighbors, best first
    pub fn current_neighbors(&self) -> Vec<Neighbor> {
        let mut out: Vec<Neighbor> = self.neighbors.values().map(|e| e.neighbor.clone()).collect();
        out.sort_by(neighbor_order);
        out
    }

    /// All routes, best first
    pub fn current_routes(&self) -> Vec<Route> {
        let mut out: Vec<Route> = self
            .routes
            .values()
            .flat_map(|set| set.iter().map(|e| e.route.clone()))
            .collect();
        out.sort_by(route_order);
        out
    }

    /// Routes to a destination, best first
    pub fn best_paths(&self, destination: &Callsign) -> Vec<Route> {
        self.routes
            .get(destination)
            .map(|set| set.iter().map(|e| e.route.clone()).collect())
            .unwrap_or_default()
    }

    /// The best route to a destination
    pub fn best_route_to(&self, destination: &Callsign) -> Option<Route> {
        self.routes
            .get(destination)
            .and_then(|set| set.iter().next())
            .map(|e| e.route.clone())
    }

    /// Number of neighbors
    pub fn neighbor_count(&self) -> usize {
        self.neighbors.len()
    }

    /// Number of routes across all destinations
    pub fn route_count(&self) -> usize {
        self.routes.values().map(BoundedRanked::len).sum()
    }

    /// Drain pending events
    pub fn drain_events(&mut self) -> Vec<RouterEvent> {
        std::mem::take(&mut self.event_buffer)
    }
}

/// Consume whole elapsed intervals from an obsolescence count
fn decay(
    obsolescence: &mut u32,
    anchor: &mut SystemTime,
    now: SystemTime,
    interval: Duration,
) -> Decay {
    if *obsolescence == 0 {
        return Decay::Expired;
    }
    let age = now.duration_since(*anchor).unwrap_or_default();
    let elapsed = age.as_nanos() / interval.as_nanos();
    if elapsed == 0 {
        return Decay::Keep;
    }
    if elapsed >= u128::from(*obsolescence) {
        return Decay::Expired;
    }

    // elapsed < obsolescence <= u32::MAX
    let elapsed = elapsed as u32;
    *obsolescence -= elapsed;
    *anchor += interval * elapsed;
    Decay::Decremented
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(s: &str) -> Callsign {
        Callsign::parse(s).unwrap()
    }

    fn t(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn table() -> RoutingTable {
        RoutingTable::new(RouterConfig::for_station(call("N0CALL")))
    }

    fn heard(from: &str, quality: i32, at: SystemTime) -> DirectObservation {
        DirectObservation {
            from: call(from),
            to: call("N0CALL"),
            via_is_empty: true,
            is_infrastructure: false,
            quality,
            direction: Direction::Incoming,
            timestamp: at,
            source: NeighborSource::Classic,
        }
    }

    fn advert(dest: &str, quality: u8, path: &[&str]) -> RouteAdvertisement {
        RouteAdvertisement {
            destination: call(dest),
            quality,
            path: path.iter().map(|s| call(s)).collect(),
        }
    }

    #[test]
    fn test_direct_observation_creates_neighbor() {
        let mut table = table();
        assert!(table.observe_direct(heard("W1AW", 80, t(0))));

        let neighbors = table.current_neighbors();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].callsign, call("W1AW"));
        assert_eq!(neighbors[0].quality, 90);
        assert_eq!(neighbors[0].obsolescence, 6);
    }

    #[test]
    fn test_digipeated_and_infrastructure_ignored() {
        let mut table = table();

        let mut digi = heard("W1AW", 80, t(0));
        digi.via_is_empty = false;
        assert!(!table.observe_direct(digi));

        let mut beacon = heard("W1AW", 80, t(0));
        beacon.is_infrastructure = true;
        assert!(!table.observe_direct(beacon));

        assert_eq!(table.neighbor_count(), 0);
    }

    #[test]
    fn test_outgoing_observation_records_recipient() {
        let mut table = table();
        let obs = DirectObservation {
            from: call("N0CALL"),
            to: call("K2ABC"),
            direction: Direction::Outgoing,
            ..heard("N0CALL", 100, t(0))
        };
        assert!(table.observe_direct(obs));
        assert!(table.neighbor(&call("K2ABC")).is_some());
        assert!(table.neighbor(&call("N0CALL")).is_none());
    }

    #[test]
    fn test_local_station_never_a_neighbor() {
        let mut table = table();
        assert!(!table.observe_direct(heard("N0CALL", 100, t(0))));
        assert_eq!(table.neighbor_count(), 0);
    }

    #[test]
    fn test_quality_boost_capped() {
        let mut table = table();
        for i in 0..40 {
            table.observe_direct(heard("W1AW", 200, t(i)));
        }
        assert_eq!(table.neighbor(&call("W1AW")).unwrap().quality, 255);
    }

    #[test]
    fn test_lower_observation_does_not_lower_quality() {
        let mut table = table();
        table.observe_direct(heard("W1AW", 200, t(0)));
        table.observe_direct(heard("W1AW", 20, t(1)));
        assert_eq!(table.neighbor(&call("W1AW")).unwrap().quality, 220);
    }

    #[test]
    fn test_classic_neighbor_not_downgraded() {
        let mut table = table();
        table.observe_direct(heard("W1AW", 100, t(0)));
        table.observe_direct(DirectObservation {
            source: NeighborSource::Inferred,
            ..heard("W1AW", 100, t(1))
        });
        assert_eq!(
            table.neighbor(&call("W1AW")).unwrap().source,
            NeighborSource::Classic
        );
    }

    #[test]
    fn test_broadcast_from_unknown_origin_ignored() {
        let mut table = table();
        let n = table.broadcast_routes(
            &call("W1AW"),
            &[advert("K2ABC", 200, &["W1AW", "K2ABC"])],
            t(0),
            RouteSource::Broadcast,
        );
        assert_eq!(n, 0);
        assert_eq!(table.route_count(), 0);
    }

    #[test]
    fn test_broadcast_learns_route() {
        let mut table = table();
        table.observe_direct(heard("W1AW", 182, t(0)));

        let n = table.broadcast_routes(
            &call("W1AW"),
            &[advert("K2ABC", 200, &["K2ABC"])],
            t(1),
            RouteSource::Broadcast,
        );
        assert_eq!(n, 1);

        let route = table.best_route_to(&call("K2ABC")).unwrap();
        assert_eq!(route.origin, call("W1AW"));
        assert_eq!(route.path, vec![call("W1AW"), call("K2ABC")]);
        // (200 * 192 + 128) / 256
        assert_eq!(route.quality, 150);
        assert_eq!(route.source, RouteSource::Broadcast);
    }

    #[test]
    fn test_broadcast_policy_rejections() {
        let mut table = table();
        table.observe_direct(heard("W1AW", 182, t(0)));

        let n = table.broadcast_routes(
            &call("W1AW"),
            &[
                advert("N0CALL", 255, &["W1AW", "N0CALL"]),
                advert("W1AW", 255, &["W1AW"]),
                advert("K2ABC", 255, &["W1AW", "N0CALL", "K2ABC"]),
                advert("N3XYZ", 40, &["W1AW", "N3XYZ"]),
            ],
            t(1),
            RouteSource::Broadcast,
        );
        assert_eq!(n, 0);
        assert_eq!(table.route_count(), 0);
    }

    #[test]
    fn test_route_refresh_keeps_best_quality() {
        let mut table = table();
        table.observe_direct(heard("W1AW", 182, t(0)));
        let origin = call("W1AW");

        table.broadcast_routes(&origin, &[advert("K2ABC", 200, &[])], t(1), RouteSource::Inferred);
        table.broadcast_routes(&origin, &[advert("K2ABC", 100, &[])], t(2), RouteSource::Broadcast);

        let routes = table.best_paths(&call("K2ABC"));
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].quality, 150);
        assert_eq!(routes[0].last_heard, t(2));
        assert_eq!(routes[0].source, RouteSource::Broadcast);

        table.broadcast_routes(&origin, &[advert("K2ABC", 200, &[])], t(3), RouteSource::Inferred);
        assert_eq!(
            table.best_route_to(&call("K2ABC")).unwrap().source,
            RouteSource::Broadcast
        );
    }

    #[test]
    fn test_routes_per_destination_bounded() {
        let mut table = table();
        let origins = ["W1AW", "K1AAA", "K1BBB", "K1CCC"];
        for (i, origin) in origins.iter().enumerate() {
            table.observe_direct(heard(origin, 182, t(0)));
            table.broadcast_routes(
                &call(origin),
                &[advert("N3XYZ", 120 + i as u8 * 20, &[])],
                t(1),
                RouteSource::Broadcast,
            );
        }

        let routes = table.best_paths(&call("N3XYZ"));
        assert_eq!(routes.len(), 3);
        assert_eq!(routes[0].origin, call("K1CCC"));
        assert_eq!(routes[2].origin, call("K1AAA"));
        assert!(routes.iter().all(|r| r.origin != call("W1AW")));
    }

    #[test]
    fn test_weak_route_into_full_set_emits_no_events() {
        let mut table = table();
        table.config.max_routes_per_destination = 1;
        table.observe_direct(heard("W1AW", 182, t(0)));
        table.observe_direct(heard("K1AAA", 182, t(0)));
        table.broadcast_routes(&call("W1AW"), &[advert("N3XYZ", 250, &[])], t(1), RouteSource::Broadcast);
        table.drain_events();

        let n = table.broadcast_routes(
            &call("K1AAA"),
            &[advert("N3XYZ", 100, &[])],
            t(1),
            RouteSource::Broadcast,
        );
        assert_eq!(n, 0);
        assert!(table.drain_events().is_empty());
    }

    #[test]
    fn test_ordering_ties_broken_by_origin_then_path() {
        let mut table = table();
        table.observe_direct(heard("W1AW", 182, t(0)));
        table.observe_direct(heard("K1AAA", 182, t(0)));
        table.broadcast_routes(&call("W1AW"), &[advert("N3XYZ", 200, &[])], t(1), RouteSource::Broadcast);
        table.broadcast_routes(&call("K1AAA"), &[advert("N3XYZ", 200, &["K1AAA", "K1BBB", "N3XYZ"])], t(1), RouteSource::Broadcast);

        let routes = table.best_paths(&call("N3XYZ"));
        assert_eq!(routes[0].origin, call("K1AAA"));
        assert_eq!(routes[1].origin, call("W1AW"));
        assert_eq!(table.current_routes(), table.current_routes());
    }

    #[test]
    fn test_purge_within_interval_keeps_counter() {
        let mut table = table();
        table.observe_direct(heard("W1AW", 100, t(0)));

        let report = table.purge_stale_routes(t(3599));
        assert!(report.is_empty());
        assert_eq!(table.neighbor(&call("W1AW")).unwrap().obsolescence, 6);
    }

    #[test]
    fn test_purge_decrements_without_double_counting() {
        let mut table = table();
        table.observe_direct(heard("W1AW", 100, t(0)));

        table.purge_stale_routes(t(3600 * 2 + 10));
        assert_eq!(table.neighbor(&call("W1AW")).unwrap().obsolescence, 4);

        // Same wall-clock time again: nothing more to consume
        table.purge_stale_routes(t(3600 * 2 + 20));
        assert_eq!(table.neighbor(&call("W1AW")).unwrap().obsolescence, 4);

        table.purge_stale_routes(t(3600 * 3));
        assert_eq!(table.neighbor(&call("W1AW")).unwrap().obsolescence, 3);
    }

    #[test]
    fn test_purge_at_full_lifetime_removes() {
        let mut table = table();
        table.observe_direct(heard("W1AW", 182, t(0)));
        table.broadcast_routes(&call("W1AW"), &[advert("K2ABC", 200, &[])], t(0), RouteSource::Broadcast);

        let report = table.purge_stale_routes(t(3600 * 6));
        assert_eq!(report.neighbors_removed, 1);
        assert_eq!(report.routes_removed, 1);
        assert_eq!(table.neighbor_count(), 0);
        assert_eq!(table.route_count(), 0);
    }

    #[test]
    fn test_neighbor_expiry_drops_its_routes() {
        let mut table = table();
        table.observe_direct(heard("W1AW", 182, t(0)));
        table.broadcast_routes(&call("W1AW"), &[advert("K2ABC", 200, &[])], t(3600 * 3), RouteSource::Broadcast);

        let report = table.purge_stale_routes(t(3600 * 6));
        assert_eq!(report.neighbors_removed, 1);
        assert_eq!(report.routes_removed, 1);
    }

    #[test]
    fn test_remove_and_retract() {
        let mut table = table();
        table.observe_direct(heard("W1AW", 182, t(0)));
        let origin = call("W1AW");
        table.broadcast_routes(&origin, &[advert("K2ABC", 200, &[])], t(0), RouteSource::Broadcast);
        table.broadcast_routes(&origin, &[advert("N3XYZ", 200, &[])], t(0), RouteSource::Inferred);

        assert!(!table.retract_inferred_route(&origin, &call("K2ABC")));
        assert!(table.retract_inferred_route(&origin, &call("N3XYZ")));
        assert!(table.remove_route(&origin, &call("K2ABC")));
        assert!(!table.remove_route(&origin, &call("K2ABC")));
        assert_eq!(table.route_count(), 0);
    }

    #[test]
    fn test_import_skips_local_and_merges() {
        let mut table = table();
        table.observe_direct(heard("W1AW", 100, t(10)));

        let imported = table.import_neighbors(vec![
            Neighbor {
                callsign: call("N0CALL"),
                quality: 200,
                last_update: t(0),
                obsolescence: 6,
                source: NeighborSource::Classic,
            },
            Neighbor {
                callsign: call("W1AW"),
                quality: 200,
                last_update: t(0),
                obsolescence: 2,
                source: NeighborSource::Inferred,
            },
        ]);
        assert_eq!(imported, 1);

        let n = table.neighbor(&call("W1AW")).unwrap();
        assert_eq!(n.quality, 200);
        assert_eq!(n.source, NeighborSource::Classic);
        assert_eq!(n.last_update, t(10));

        let route = |dest: &str, path: &[&str]| Route {
            destination: call(dest),
            origin: call("W1AW"),
            quality: 150,
            path: path.iter().map(|s| call(s)).collect(),
            last_heard: t(0),
            obsolescence: 6,
            source: RouteSource::Broadcast,
        };
        let imported = table.import_routes(vec![
            route("K2ABC", &["W1AW", "K2ABC"]),
            route("N0CALL", &["W1AW", "N0CALL"]),
            route("N3XYZ", &["W1AW", "N0CALL", "N3XYZ"]),
            route("VE3ABC", &["K2ABC", "VE3ABC"]),
        ]);
        assert_eq!(imported, 1);
        assert!(table.best_route_to(&call("K2ABC")).is_some());
    }

    #[test]
    fn test_import_requires_known_origin() {
        let mut table = table();
        let imported = table.import_routes(vec![Route {
            destination: call("K2ABC"),
            origin: call("W1AW"),
            quality: 150,
            path: vec![call("W1AW"), call("K2ABC")],
            last_heard: t(0),
            obsolescence: 6,
            source: RouteSource::Broadcast,
        }]);

        assert_eq!(imported, 0);
        assert_eq!(table.route_count(), 0);
        assert!(table.best_route_to(&call("K2ABC")).is_none());
    }

    #[test]
    fn test_exhausted_counter_removed_without_elapsed_interval() {
        let mut table = table();
        table.import_neighbors(vec![Neighbor {
            callsign: call("W1AW"),
            quality: 150,
            last_update: t(0),
            obsolescence: 0,
            source: NeighborSource::Classic,
        }]);
        assert_eq!(table.neighbor_count(), 1);

        let report = table.purge_stale_routes(t(10));
        assert_eq!(report.neighbors_removed, 1);
        assert_eq!(table.neighbor_count(), 0);
    }

    #[test]
    fn test_zero_initial_obsolescence_expires_on_next_purge() {
        let mut config = RouterConfig::for_station(call("N0CALL"));
        config.obsolescence_init = 0;
        let mut table = RoutingTable::new(config);
        table.observe_direct(heard("W1AW", 100, t(0)));

        table.purge_stale_routes(t(1));
        assert_eq!(table.neighbor_count(), 0);
    }
}

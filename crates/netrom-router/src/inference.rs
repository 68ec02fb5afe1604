//! Passive route inference
//!
//! Stations that never send NODES broadcasts still show up in ordinary
//! traffic. A packet from `K2ABC` digipeated by `W1AW` tells us that
//! `W1AW` is in range of us and that `K2ABC` is reachable through it.
//!
//! Each such observation becomes a [`RouteEvidence`] record keyed by
//! `(destination, origin)`. Evidence is reinforced by repeated sightings
//! and decays continuously with a configurable half-life. Every update is
//! published into the [`RoutingTable`] as an inferred route, and evidence
//! that decays away is actively retracted from it.

use std::collections::BTreeMap;
use std::time::SystemTime;

use netrom_protocol::{Callsign, Packet};
use tracing::{debug, trace};

use crate::config::InferenceConfig;
use crate::ranked::BoundedRanked;
use crate::state::{Direction, NeighborSource, RouteAdvertisement, RouteSource, MAX_QUALITY};
use crate::table::{DirectObservation, RoutingTable};

/// Provisional evidence that `destination` is reachable through `origin`
#[derive(Debug, Clone, PartialEq)]
pub struct RouteEvidence {
    /// Station heard through the digipeater
    pub destination: Callsign,
    /// Last digipeater, our neighbor
    pub origin: Callsign,
    /// `[origin, destination]`
    pub path: Vec<Callsign>,
    /// Most recent corroborating packet
    pub last_observed: SystemTime,
    /// Number of corroborating packets, capped
    pub reinforcement: u32,
}

impl RouteEvidence {
    /// Decay multiplier `0.5^(age / half_life)`
    fn decay(&self, now: SystemTime, config: &InferenceConfig) -> f64 {
        let age = now
            .duration_since(self.last_observed)
            .unwrap_or_default()
            .as_secs_f64();
        let half_life = config.half_life.as_secs_f64();
        if half_life <= 0.0 {
            return if age > 0.0 { 0.0 } else { 1.0 };
        }
        0.5f64.powf(age / half_life)
    }

    /// Reinforcement scaled by decay
    pub fn strength(&self, now: SystemTime, config: &InferenceConfig) -> f64 {
        f64::from(self.reinforcement) * self.decay(now, config)
    }

    /// Route quality this evidence supports right now
    pub fn advertised_quality(&self, now: SystemTime, config: &InferenceConfig) -> u8 {
        let extra = u64::from(self.reinforcement.saturating_sub(1))
            * u64::from(config.reinforcement_step);
        let base = (u64::from(config.route_base_quality) + extra).min(u64::from(MAX_QUALITY));
        (base as f64 * self.decay(now, config)).round() as u8
    }
}

/// Why a packet contributed no evidence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Beacon, ID or NODES traffic
    Infrastructure,
    /// An address did not normalize to a callsign
    InvalidAddress,
    /// Direct packet between two other stations
    NotAddressedToLocal,
    /// We sent it ourselves
    LocalSender,
    /// We appear in the digipeater path
    LocalInPath,
    /// The last digipeater is the sender
    SelfRoute,
}

/// What the engine made of one packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InferenceOutcome {
    /// No evidence recorded
    Ignored(IgnoreReason),
    /// Sender recorded as a directly heard neighbor
    DirectNeighbor(Callsign),
    /// Route evidence recorded and published
    RouteEvidence {
        /// Packet sender
        destination: Callsign,
        /// Last digipeater
        origin: Callsign,
    },
}

/// Derives neighbor and route evidence from overheard traffic
pub struct InferenceEngine {
    config: InferenceConfig,
    evidence: BTreeMap<Callsign, BoundedRanked<RouteEvidence>>,
}

impl InferenceEngine {
    /// Create an engine with an empty evidence ledger
    pub fn new(config: InferenceConfig) -> Self {
        Self {
            config,
            evidence: BTreeMap::new(),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Learn from one packet, publishing into `table`
    pub fn observe(&mut self, packet: &Packet, table: &mut RoutingTable) -> InferenceOutcome {
        if packet.is_infrastructure() {
            return InferenceOutcome::Ignored(IgnoreReason::Infrastructure);
        }

        let (Some(from), Some(to)) = (Callsign::parse(&packet.from), Callsign::parse(&packet.to))
        else {
            trace!("Ignoring packet with invalid addresses {} > {}", packet.from, packet.to);
            return InferenceOutcome::Ignored(IgnoreReason::InvalidAddress);
        };
        let local = table.local_callsign().clone();

        if packet.via.is_empty() {
            if to != local {
                return InferenceOutcome::Ignored(IgnoreReason::NotAddressedToLocal);
            }
            if from == local {
                return InferenceOutcome::Ignored(IgnoreReason::LocalSender);
            }
            table.observe_direct(DirectObservation {
                from: from.clone(),
                to,
                via_is_empty: true,
                is_infrastructure: false,
                quality: i32::from(self.config.direct_quality),
                direction: Direction::Incoming,
                timestamp: packet.timestamp,
                source: NeighborSource::Inferred,
            });
            return InferenceOutcome::DirectNeighbor(from);
        }

        let Some(via) = packet
            .via
            .iter()
            .map(|v| Callsign::parse(v))
            .collect::<Option<Vec<_>>>()
        else {
            return InferenceOutcome::Ignored(IgnoreReason::InvalidAddress);
        };

        // Also covers a last hop equal to the local station
        if via.contains(&local) {
            return InferenceOutcome::Ignored(IgnoreReason::LocalInPath);
        }
        if from == local {
            return InferenceOutcome::Ignored(IgnoreReason::LocalSender);
        }
        let Some(next_hop) = via.last().cloned() else {
            return InferenceOutcome::Ignored(IgnoreReason::InvalidAddress);
        };
        if next_hop == from {
            return InferenceOutcome::Ignored(IgnoreReason::SelfRoute);
        }

        table.observe_direct(DirectObservation {
            from: next_hop.clone(),
            to: local,
            via_is_empty: true,
            is_infrastructure: false,
            quality: i32::from(self.config.inferred_neighbor_quality),
            direction: Direction::Incoming,
            timestamp: packet.timestamp,
            source: NeighborSource::Inferred,
        });

        if let Some(evidence) = self.record(&from, &next_hop, packet.timestamp, table) {
            self.publish(&evidence, packet.timestamp, table);
        }

        InferenceOutcome::RouteEvidence {
            destination: from,
            origin: next_hop,
        }
    }

    /// Refresh or create evidence, then re-rank its destination
    ///
    /// Returns the evidence if it survived ranking.
    fn record(
        &mut self,
        destination: &Callsign,
        origin: &Callsign,
        now: SystemTime,
        table: &mut RoutingTable,
    ) -> Option<RouteEvidence> {
        let config = &self.config;
        let bucket = self
            .evidence
            .entry(destination.clone())
            .or_insert_with(|| BoundedRanked::new(config.max_routes_per_destination));

        let path = vec![origin.clone(), destination.clone()];
        match bucket.find_mut(|e| e.origin == *origin) {
            Some(existing) => {
                existing.reinforcement = existing
                    .reinforcement
                    .saturating_add(1)
                    .min(config.max_reinforcement.max(1));
                existing.last_observed = existing.last_observed.max(now);
                existing.path = path;
            }
            None => bucket.push(RouteEvidence {
                destination: destination.clone(),
                origin: origin.clone(),
                path,
                last_observed: now,
                reinforcement: 1,
            }),
        }

        let evicted = bucket.rerank(|a, b| {
            b.advertised_quality(now, config)
                .cmp(&a.advertised_quality(now, config))
                .then_with(|| a.origin.cmp(&b.origin))
        });
        let survivor = bucket.find(|e| e.origin == *origin).cloned();
        if bucket.is_empty() {
            self.evidence.remove(destination);
        }

        for gone in evicted {
            debug!("Evidence for {} via {} evicted", gone.destination, gone.origin);
            table.retract_inferred_route(&gone.origin, &gone.destination);
        }
        survivor
    }

    /// Push evidence into the routing table as an inferred route
    ///
    /// The advertised quality is raised to whatever the table needs to
    /// accept the route through the current neighbor, so that a weak
    /// first hop cannot hide a well-corroborated destination.
    fn publish(&self, evidence: &RouteEvidence, now: SystemTime, table: &mut RoutingTable) {
        let advertised = evidence.advertised_quality(now, &self.config);
        let quality = table
            .neighbor(&evidence.origin)
            .and_then(|n| required_quality(table.config().min_route_quality, n.quality))
            .map_or(advertised, |required| advertised.max(required));

        let advert = RouteAdvertisement {
            destination: evidence.destination.clone(),
            quality,
            path: evidence.path.clone(),
        };
        let mutated = table.broadcast_routes(&evidence.origin, &[advert], now, RouteSource::Inferred);
        trace!(
            "Published {} via {} at quality {} ({} mutated)",
            evidence.destination,
            evidence.origin,
            quality,
            mutated
        );
    }

    /// Drop decayed evidence and retract the routes it supported
    ///
    /// Evidence older than one half-life or weaker than `min_strength` is
    /// removed. Returns the number of records removed.
    pub fn purge_stale_evidence(&mut self, now: SystemTime, table: &mut RoutingTable) -> usize {
        let config = &self.config;
        let mut removed = Vec::new();
        for bucket in self.evidence.values_mut() {
            removed.extend(bucket.remove_where(|e| {
                let age = now.duration_since(e.last_observed).unwrap_or_default();
                age > config.half_life || e.strength(now, config) < config.min_strength
            }));
        }
        self.evidence.retain(|_, bucket| !bucket.is_empty());

        for evidence in &removed {
            debug!(
                "Evidence for {} via {} expired",
                evidence.destination, evidence.origin
            );
            table.retract_inferred_route(&evidence.origin, &evidence.destination);
        }
        removed.len()
    }

    /// Evidence for one destination, best first
    pub fn evidence(&self, destination: &Callsign) -> impl Iterator<Item = &RouteEvidence> + '_ {
        self.evidence
            .get(destination)
            .into_iter()
            .flat_map(|bucket| bucket.iter())
    }

    /// Total evidence records
    pub fn evidence_count(&self) -> usize {
        self.evidence.values().map(BoundedRanked::len).sum()
    }
}

/// Smallest advertised quality that combines with `neighbor` to reach `min`
fn required_quality(min: u8, neighbor: u8) -> Option<u8> {
    if neighbor == 0 {
        return None;
    }
    let target = (u32::from(min) * 256).saturating_sub(128);
    let required = target.div_ceil(u32::from(neighbor));
    u8::try_from(required).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use crate::state::combine_quality;
    use std::time::Duration;

    fn call(s: &str) -> Callsign {
        Callsign::parse(s).unwrap()
    }

    fn t(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn setup() -> (InferenceEngine, RoutingTable) {
        let config = RouterConfig::for_station(call("N0CALL"));
        (
            InferenceEngine::new(config.inference.clone()),
            RoutingTable::new(config),
        )
    }

    #[test]
    fn test_required_quality() {
        for neighbor in 1..=255u8 {
            if let Some(q) = required_quality(50, neighbor) {
                assert!(combine_quality(q, neighbor) >= 50, "neighbor {neighbor}");
                if q > 0 {
                    assert!(combine_quality(q - 1, neighbor) < 50, "neighbor {neighbor}");
                }
            }
        }
        assert_eq!(required_quality(50, 0), None);
        assert_eq!(required_quality(50, 20), None);
    }

    #[test]
    fn test_digipeated_packet_yields_route() {
        let (mut engine, mut table) = setup();
        let packet = Packet::ui("K2ABC", "N0CALL", b"hi", t(0)).with_via(&["W1AW"]);

        let outcome = engine.observe(&packet, &mut table);
        assert_eq!(
            outcome,
            InferenceOutcome::RouteEvidence {
                destination: call("K2ABC"),
                origin: call("W1AW"),
            }
        );

        let neighbor = table.neighbor(&call("W1AW")).unwrap();
        assert_eq!(neighbor.source, NeighborSource::Inferred);

        let route = table.best_route_to(&call("K2ABC")).unwrap();
        assert_eq!(route.origin, call("W1AW"));
        assert_eq!(route.path, vec![call("W1AW"), call("K2ABC")]);
        assert_eq!(route.source, RouteSource::Inferred);
        assert_eq!(engine.evidence(&call("K2ABC")).count(), 1);
    }

    #[test]
    fn test_direct_packet_to_local() {
        let (mut engine, mut table) = setup();
        let packet = Packet::ui("K2ABC", "N0CALL", b"hi", t(0));
        assert_eq!(
            engine.observe(&packet, &mut table),
            InferenceOutcome::DirectNeighbor(call("K2ABC"))
        );
        assert_eq!(table.neighbor(&call("K2ABC")).unwrap().quality, 170);

        let other = Packet::ui("K2ABC", "W1AW", b"hi", t(0));
        assert_eq!(
            engine.observe(&other, &mut table),
            InferenceOutcome::Ignored(IgnoreReason::NotAddressedToLocal)
        );
    }

    #[test]
    fn test_guardrails() {
        let (mut engine, mut table) = setup();
        let cases = [
            (
                Packet::ui("N0CALL", "K2ABC", b"", t(0)).with_via(&["W1AW"]),
                IgnoreReason::LocalSender,
            ),
            (
                Packet::ui("K2ABC", "W1AW", b"", t(0)).with_via(&["N0CALL"]),
                IgnoreReason::LocalInPath,
            ),
            (
                Packet::ui("K2ABC", "W1AW", b"", t(0)).with_via(&["N0CALL", "VE3ABC"]),
                IgnoreReason::LocalInPath,
            ),
            (
                Packet::ui("K2ABC", "W1AW", b"", t(0)).with_via(&["K2ABC"]),
                IgnoreReason::SelfRoute,
            ),
            (
                Packet::ui("W1AW", "ID", b"", t(0)),
                IgnoreReason::Infrastructure,
            ),
            (
                Packet::ui("K2ABC", "W1AW", b"", t(0)).with_via(&["bad call"]),
                IgnoreReason::InvalidAddress,
            ),
        ];

        for (packet, reason) in cases {
            assert_eq!(
                engine.observe(&packet, &mut table),
                InferenceOutcome::Ignored(reason)
            );
        }
        assert_eq!(table.neighbor_count(), 0);
        assert_eq!(table.route_count(), 0);
        assert_eq!(engine.evidence_count(), 0);
    }

    #[test]
    fn test_reinforcement_raises_quality() {
        let (mut engine, mut table) = setup();
        let packet = Packet::ui("K2ABC", "N3XYZ", b"", t(0)).with_via(&["W1AW"]);

        engine.observe(&packet, &mut table);
        let first = engine.evidence(&call("K2ABC")).next().unwrap().clone();
        for _ in 0..20 {
            engine.observe(&packet, &mut table);
        }
        let later = engine.evidence(&call("K2ABC")).next().unwrap().clone();

        assert_eq!(first.reinforcement, 1);
        assert_eq!(later.reinforcement, 8);
        assert_eq!(first.advertised_quality(t(0), engine.config()), 96);
        assert_eq!(later.advertised_quality(t(0), engine.config()), 208);
    }

    #[test]
    fn test_decay_halves_quality() {
        let config = InferenceConfig::default();
        let evidence = RouteEvidence {
            destination: call("K2ABC"),
            origin: call("W1AW"),
            path: vec![call("W1AW"), call("K2ABC")],
            last_observed: t(0),
            reinforcement: 2,
        };
        assert_eq!(evidence.advertised_quality(t(1800), &config), 56);
        assert!((evidence.strength(t(1800), &config) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_purge_retracts_published_route() {
        let (mut engine, mut table) = setup();
        let packet = Packet::ui("K2ABC", "N3XYZ", b"", t(0)).with_via(&["W1AW"]);
        engine.observe(&packet, &mut table);
        assert!(table.best_route_to(&call("K2ABC")).is_some());

        assert_eq!(engine.purge_stale_evidence(t(1800), &mut table), 0);
        assert_eq!(engine.purge_stale_evidence(t(1801), &mut table), 1);
        assert!(table.best_route_to(&call("K2ABC")).is_none());
        assert_eq!(engine.evidence_count(), 0);
    }

    #[test]
    fn test_purge_keeps_confirmed_route() {
        let (mut engine, mut table) = setup();
        let packet = Packet::ui("K2ABC", "N3XYZ", b"", t(0)).with_via(&["W1AW"]);
        engine.observe(&packet, &mut table);

        table.broadcast_routes(
            &call("W1AW"),
            &[RouteAdvertisement {
                destination: call("K2ABC"),
                quality: 200,
                path: vec![],
            }],
            t(1),
            RouteSource::Broadcast,
        );

        engine.purge_stale_evidence(t(4000), &mut table);
        let route = table.best_route_to(&call("K2ABC")).unwrap();
        assert_eq!(route.source, RouteSource::Broadcast);
    }

    #[test]
    fn test_bucket_bounded_and_evictions_retracted() {
        let (mut engine, mut table) = setup();
        // Reinforce one origin so it outranks the rest
        for _ in 0..4 {
            let p = Packet::ui("K2ABC", "N3XYZ", b"", t(0)).with_via(&["W1AW"]);
            engine.observe(&p, &mut table);
        }
        for digi in ["K1AAA", "K1BBB", "K1CCC"] {
            let p = Packet::ui("K2ABC", "N3XYZ", b"", t(0)).with_via(&[digi]);
            engine.observe(&p, &mut table);
        }

        let origins: Vec<_> = engine
            .evidence(&call("K2ABC"))
            .map(|e| e.origin.to_string())
            .collect();
        assert_eq!(origins, vec!["W1AW", "K1AAA", "K1BBB"]);
        assert!(table
            .best_paths(&call("K2ABC"))
            .iter()
            .all(|r| r.origin != call("K1CCC")));
    }
}

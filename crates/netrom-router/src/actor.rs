//! Router Actor
//!
//! Owns the [`Coordinator`] and serializes every access to it. Live capture,
//! replay and display code all talk to the routing core by sending
//! [`RouterCommand`]s, so no locking is needed anywhere.
//!
//! # Architecture
//!
//! The actor receives commands through one channel and emits
//! [`RouterEvent`]s through another. A timer inside the actor runs periodic
//! maintenance on the same task as packet processing.
//!
//! # Example
//!
//! ```rust,ignore
//! use netrom_router::actor::{run_router_actor, RouterCommand};
//! use netrom_router::{Coordinator, RouterConfig};
//! use tokio::sync::mpsc;
//!
//! let (cmd_tx, cmd_rx) = mpsc::channel(256);
//! let (event_tx, mut event_rx) = mpsc::channel(256);
//!
//! let coordinator = Coordinator::new(RouterConfig::default());
//! tokio::spawn(run_router_actor(coordinator, Duration::from_secs(60), cmd_rx, event_tx));
//! ```

use std::time::SystemTime;

use netrom_protocol::{Callsign, Packet};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info};

use crate::coordinator::Coordinator;
use crate::error::RouterError;
use crate::events::{PurgeReport, RouterEvent};
use crate::snapshot::RouterSnapshot;
use crate::state::{Neighbor, Route, RoutingMode};

/// Commands sent to the router actor
#[derive(Debug)]
pub enum RouterCommand {
    /// Process one observed packet
    Packet {
        /// Monotonically increasing input id, recorded in snapshots
        id: u64,
        /// The decoded packet
        packet: Packet,
    },

    /// Switch routing mode
    SetMode {
        /// Mode to switch to
        mode: RoutingMode,
    },

    /// List neighbors, for the given mode or the current one
    QueryNeighbors {
        /// View to list; `None` for the current mode
        mode: Option<RoutingMode>,
        /// Channel to send back the neighbors, best first
        response: oneshot::Sender<Vec<Neighbor>>,
    },

    /// List routes, for the given mode or the current one
    QueryRoutes {
        /// View to list; `None` for the current mode
        mode: Option<RoutingMode>,
        /// Channel to send back the routes, best first
        response: oneshot::Sender<Vec<Route>>,
    },

    /// Best route to a destination in the current mode
    BestRoute {
        /// Station to look up
        destination: Callsign,
        /// Channel to send back the route, if any
        response: oneshot::Sender<Option<Route>>,
    },

    /// Capture the routing state
    Snapshot {
        /// Channel to send back the snapshot
        response: oneshot::Sender<RouterSnapshot>,
    },

    /// Load a snapshot; the reply says whether it was accepted
    Restore {
        /// Snapshot to load
        snapshot: Box<RouterSnapshot>,
        /// Older snapshots are rejected
        max_age: Duration,
        /// Channel to send back whether it was accepted
        response: oneshot::Sender<bool>,
    },

    /// Run maintenance now
    Purge {
        /// Channel to send back what was removed
        response: oneshot::Sender<PurgeReport>,
    },

    /// Stop the actor
    Shutdown,
}

/// Cloneable handle for talking to a running router actor
#[derive(Debug, Clone)]
pub struct RouterHandle {
    cmd_tx: mpsc::Sender<RouterCommand>,
}

impl RouterHandle {
    /// Wrap a command sender
    pub fn new(cmd_tx: mpsc::Sender<RouterCommand>) -> Self {
        Self { cmd_tx }
    }

    async fn send(&self, cmd: RouterCommand) -> Result<(), RouterError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| RouterError::ActorGone)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RouterCommand,
    ) -> Result<T, RouterError> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx)).await?;
        rx.await.map_err(|_| RouterError::ActorGone)
    }

    /// Submit a packet
    pub async fn packet(&self, id: u64, packet: Packet) -> Result<(), RouterError> {
        self.send(RouterCommand::Packet { id, packet }).await
    }

    /// Switch routing mode
    pub async fn set_mode(&self, mode: RoutingMode) -> Result<(), RouterError> {
        self.send(RouterCommand::SetMode { mode }).await
    }

    /// Neighbors for `mode`, or the current mode
    pub async fn neighbors(&self, mode: Option<RoutingMode>) -> Result<Vec<Neighbor>, RouterError> {
        self.request(|response| RouterCommand::QueryNeighbors { mode, response })
            .await
    }

    /// Routes for `mode`, or the current mode
    pub async fn routes(&self, mode: Option<RoutingMode>) -> Result<Vec<Route>, RouterError> {
        self.request(|response| RouterCommand::QueryRoutes { mode, response })
            .await
    }

    /// Best route to `destination`
    pub async fn best_route(&self, destination: Callsign) -> Result<Option<Route>, RouterError> {
        self.request(|response| RouterCommand::BestRoute {
            destination,
            response,
        })
        .await
    }

    /// Capture the routing state
    pub async fn snapshot(&self) -> Result<RouterSnapshot, RouterError> {
        self.request(|response| RouterCommand::Snapshot { response })
            .await
    }

    /// Load a snapshot
    pub async fn restore(
        &self,
        snapshot: RouterSnapshot,
        max_age: Duration,
    ) -> Result<bool, RouterError> {
        self.request(|response| RouterCommand::Restore {
            snapshot: Box::new(snapshot),
            max_age,
            response,
        })
        .await
    }

    /// Run maintenance now
    pub async fn purge(&self) -> Result<PurgeReport, RouterError> {
        self.request(|response| RouterCommand::Purge { response })
            .await
    }

    /// Stop the actor
    pub async fn shutdown(&self) -> Result<(), RouterError> {
        self.send(RouterCommand::Shutdown).await
    }
}

async fn flush_events(coordinator: &mut Coordinator, event_tx: &mpsc::Sender<RouterEvent>) {
    for event in coordinator.drain_events() {
        let _ = event_tx.send(event).await;
    }
}

/// Run the router actor
///
/// Processes commands until [`RouterCommand::Shutdown`] arrives or every
/// sender is dropped, running maintenance every `purge_every`.
///
/// # Arguments
///
/// * `coordinator` - Routing core to own
/// * `purge_every` - Maintenance period
/// * `cmd_rx` - Receiver for commands sent to the actor
/// * `event_tx` - Sender for events emitted by the actor
pub async fn run_router_actor(
    mut coordinator: Coordinator,
    purge_every: Duration,
    mut cmd_rx: mpsc::Receiver<RouterCommand>,
    event_tx: mpsc::Sender<RouterEvent>,
) {
    info!(
        "Router actor started for {} in {} mode",
        coordinator.config().local_callsign,
        coordinator.mode().name()
    );

    let mut last_processed_id = 0u64;

    let mut purge_timer = interval(purge_every.max(Duration::from_millis(1)));
    purge_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick fires immediately
    purge_timer.tick().await;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break; };
                match cmd {
                    RouterCommand::Packet { id, packet } => {
                        coordinator.process_packet(&packet);
                        last_processed_id = last_processed_id.max(id);
                    }

                    RouterCommand::SetMode { mode } => {
                        coordinator.set_mode(mode);
                    }

                    RouterCommand::QueryNeighbors { mode, response } => {
                        let neighbors = match mode {
                            Some(mode) => coordinator.current_neighbors_for(mode),
                            None => coordinator.current_neighbors(),
                        };
                        let _ = response.send(neighbors);
                    }

                    RouterCommand::QueryRoutes { mode, response } => {
                        let routes = match mode {
                            Some(mode) => coordinator.current_routes_for(mode),
                            None => coordinator.current_routes(),
                        };
                        let _ = response.send(routes);
                    }

                    RouterCommand::BestRoute { destination, response } => {
                        let _ = response.send(coordinator.best_route_to(&destination));
                    }

                    RouterCommand::Snapshot { response } => {
                        let _ = response.send(coordinator.snapshot(last_processed_id, SystemTime::now()));
                    }

                    RouterCommand::Restore { snapshot, max_age, response } => {
                        let id = snapshot.last_processed_id;
                        let accepted = coordinator.restore(*snapshot, SystemTime::now(), max_age);
                        if accepted {
                            last_processed_id = last_processed_id.max(id);
                        }
                        let _ = response.send(accepted);
                    }

                    RouterCommand::Purge { response } => {
                        let report = coordinator.purge(SystemTime::now());
                        let _ = response.send(report);
                    }

                    RouterCommand::Shutdown => {
                        debug!("Router actor shutting down");
                        break;
                    }
                }
                flush_events(&mut coordinator, &event_tx).await;
            }

            _ = purge_timer.tick() => {
                coordinator.purge(SystemTime::now());
                flush_events(&mut coordinator, &event_tx).await;
            }
        }
    }

    info!("Router actor stopped");
}

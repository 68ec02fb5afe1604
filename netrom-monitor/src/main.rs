//! NET/ROM Network Monitor
//!
//! Headless monitor that listens to a KISS TNC, builds the NET/ROM routing
//! picture, and periodically logs it.
//!
//! Usage:
//!
//! ```text
//! netrom-monitor [SETTINGS.json]
//! netrom-monitor --init          write default settings
//! netrom-monitor --list-ports    list serial ports
//! ```

mod error;
mod settings;
mod source;
mod stats;

use std::path::PathBuf;
use std::time::{Instant, SystemTime};

use netrom_router::{
    run_router_actor, Coordinator, RouterEvent, RouterHandle, RouterSnapshot,
};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::MonitorError;
use crate::settings::Settings;
use crate::stats::{SharedStats, TrafficStats};

#[tokio::main]
async fn main() -> Result<(), MonitorError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "netrom_monitor=info,netrom_router=info,netrom_protocol=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let arg = std::env::args().nth(1);
    match arg.as_deref() {
        Some("--list-ports") => return list_ports(),
        Some("--init") => {
            Settings::default().save()?;
            if let Some(path) = Settings::settings_path() {
                info!("Wrote default settings to {}", path.display());
            }
            return Ok(());
        }
        _ => {}
    }

    let settings = match arg {
        Some(path) => Settings::load_from(&PathBuf::from(path)),
        None => Settings::load(),
    };
    settings.router.validate()?;

    info!(
        "Starting NET/ROM monitor as {} ({} mode)",
        settings.router.local_callsign,
        settings.mode.name()
    );

    let mut coordinator = Coordinator::new(settings.router.clone());
    coordinator.set_mode(settings.mode);
    coordinator.drain_events();

    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    let (event_tx, event_rx) = mpsc::channel(1024);
    let actor = tokio::spawn(run_router_actor(
        coordinator,
        settings.purge_interval(),
        cmd_rx,
        event_tx,
    ));
    let router = RouterHandle::new(cmd_tx);

    let first_id = restore_snapshot(&settings, &router).await?;

    tokio::spawn(log_events(event_rx));
    let stats = TrafficStats::shared();
    let source = tokio::spawn(source::run_source(
        settings.source.clone(),
        settings.kiss_port,
        router.clone(),
        stats.clone(),
        settings.router.local_callsign.clone(),
        first_id,
    ));

    let mut report_timer = interval(settings.report_interval());
    report_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!("Cannot listen for Ctrl-C: {}", e);
                }
                info!("Shutting down");
                break;
            }
            _ = report_timer.tick() => {
                report_traffic(&stats).await;
                report(&router).await?;
            }
        }
    }

    source.abort();
    save_snapshot(&settings, &router).await;
    router.shutdown().await?;
    let _ = actor.await;

    Ok(())
}

/// Print available serial ports
fn list_ports() -> Result<(), MonitorError> {
    let ports = serialport::available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        match port.port_type {
            serialport::SerialPortType::UsbPort(usb) => println!(
                "{} ({})",
                port.port_name,
                usb.product.as_deref().unwrap_or("USB")
            ),
            _ => println!("{}", port.port_name),
        }
    }
    Ok(())
}

/// Load the previous snapshot, returning the first input id to use
async fn restore_snapshot(settings: &Settings, router: &RouterHandle) -> Result<u64, MonitorError> {
    let Some(path) = settings.snapshot_path() else {
        return Ok(1);
    };
    if !path.exists() {
        debug!("No snapshot at {}", path.display());
        return Ok(1);
    }

    let snapshot = match RouterSnapshot::load(&path) {
        Ok(s) => s,
        Err(e) => {
            warn!("Ignoring snapshot {}: {}", path.display(), e);
            return Ok(1);
        }
    };

    let next_id = snapshot.last_processed_id + 1;
    if router
        .restore(snapshot, settings.snapshot_max_age())
        .await?
    {
        Ok(next_id)
    } else {
        Ok(1)
    }
}

async fn save_snapshot(settings: &Settings, router: &RouterHandle) {
    let Some(path) = settings.snapshot_path() else {
        return;
    };
    match router.snapshot().await {
        Ok(snapshot) => match snapshot.save(&path) {
            Ok(()) => info!(
                "Saved {} neighbors and {} routes to {}",
                snapshot.neighbors.len(),
                snapshot.routes.len(),
                path.display()
            ),
            Err(e) => warn!("Failed to save snapshot: {}", e),
        },
        Err(e) => warn!("Failed to take snapshot: {}", e),
    }
}

/// Log traffic counters
async fn report_traffic(stats: &SharedStats) {
    let stats = stats.lock().await;
    info!(
        "Traffic: {} frames ({:.1}/s), sent {} ({} bytes), received {} ({} bytes), I/S/U {}/{}/{}, {} undecodable, {}",
        stats.total_frames(),
        stats.frames_per_second(Instant::now()),
        stats.sent.frames,
        stats.sent.bytes,
        stats.received.frames,
        stats.received.bytes,
        stats.i_frames,
        stats.s_frames,
        stats.u_frames,
        stats.undecodable,
        if stats.connected { "connected" } else { "disconnected" }
    );
}

/// Log the current table
async fn report(router: &RouterHandle) -> Result<(), MonitorError> {
    let neighbors = router.neighbors(None).await?;
    let routes = router.routes(None).await?;
    let now = SystemTime::now();

    info!("{} neighbors, {} routes", neighbors.len(), routes.len());
    for n in &neighbors {
        let age = now.duration_since(n.last_update).unwrap_or_default();
        info!(
            "  {:<9} q={:<3} obs={} {:?} heard {}s ago",
            n.callsign.to_string(),
            n.quality,
            n.obsolescence,
            n.source,
            age.as_secs()
        );
    }
    for r in &routes {
        let path: Vec<String> = r.path.iter().map(|c| c.to_string()).collect();
        info!(
            "  {:<9} via {:<9} q={:<3} {:?} [{}]",
            r.destination.to_string(),
            r.origin.to_string(),
            r.quality,
            r.source,
            path.join(" > ")
        );
    }
    Ok(())
}

async fn log_events(mut event_rx: mpsc::Receiver<RouterEvent>) {
    while let Some(event) = event_rx.recv().await {
        match event {
            RouterEvent::NeighborAdded(n) => {
                info!("New neighbor {} (q={}, {:?})", n.callsign, n.quality, n.source)
            }
            RouterEvent::NeighborRemoved { callsign } => info!("Neighbor {} expired", callsign),
            RouterEvent::RouteAdded(r) => info!(
                "New route to {} via {} (q={}, {:?})",
                r.destination, r.origin, r.quality, r.source
            ),
            RouterEvent::RouteRemoved { destination, origin } => {
                debug!("Route to {} via {} removed", destination, origin)
            }
            RouterEvent::BroadcastDecoded {
                origin,
                entries,
                accepted,
            } => info!("NODES from {}: {}/{} entries accepted", origin, accepted, entries),
            RouterEvent::ModeChanged { from, to } => {
                info!("Mode changed from {} to {}", from.name(), to.name())
            }
            RouterEvent::Purged(report) => debug!("Maintenance: {:?}", report),
            RouterEvent::NeighborUpdated(_) | RouterEvent::RouteUpdated(_) => {}
        }
    }
}

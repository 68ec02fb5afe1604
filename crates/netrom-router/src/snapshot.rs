//! Routing state snapshots
//!
//! A snapshot records the neighbor and route tables together with the id of
//! the last input processed, so that a restarted monitor can reload its
//! state and replay only newer traffic. Snapshots are only trusted when
//! they are recent and were taken under the same configuration.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RouterError;
use crate::state::{Neighbor, Route, RoutingMode};

/// Persisted routing state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterSnapshot {
    /// When the snapshot was taken
    pub created_at: SystemTime,
    /// Id of the last input folded into this state
    pub last_processed_id: u64,
    /// [`RouterConfig::fingerprint`](crate::RouterConfig::fingerprint) at capture time
    pub config_fingerprint: String,
    /// Routing mode at capture time
    pub mode: RoutingMode,
    /// Every neighbor, regardless of mode
    pub neighbors: Vec<Neighbor>,
    /// Every route, regardless of mode
    pub routes: Vec<Route>,
}

impl RouterSnapshot {
    /// Check age and configuration, explaining any rejection
    pub fn validate(
        &self,
        now: SystemTime,
        max_age: Duration,
        fingerprint: &str,
    ) -> Result<(), RouterError> {
        if self.config_fingerprint != fingerprint {
            return Err(RouterError::SnapshotRejected(
                "configuration changed since snapshot".to_string(),
            ));
        }
        // A snapshot from the future is as untrustworthy as a stale one
        let age = now.duration_since(self.created_at).map_err(|_| {
            RouterError::SnapshotRejected("snapshot timestamp is in the future".to_string())
        })?;
        if age > max_age {
            return Err(RouterError::SnapshotRejected(format!(
                "snapshot is {}s old (max {}s)",
                age.as_secs(),
                max_age.as_secs()
            )));
        }
        Ok(())
    }

    /// Whether the snapshot may be restored
    pub fn is_valid(&self, now: SystemTime, max_age: Duration, fingerprint: &str) -> bool {
        self.validate(now, max_age, fingerprint).is_ok()
    }

    /// Read a snapshot from a JSON file
    pub fn load(path: &Path) -> Result<Self, RouterError> {
        let content = fs::read_to_string(path)?;
        let snapshot: Self = serde_json::from_str(&content)?;
        debug!(
            "Loaded snapshot from {:?} ({} neighbors, {} routes)",
            path,
            snapshot.neighbors.len(),
            snapshot.routes.len()
        );
        Ok(snapshot)
    }

    /// Write the snapshot as JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), RouterError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        debug!("Saved snapshot to {:?}", path);
        Ok(())
    }
}

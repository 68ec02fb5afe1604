//! Router configuration

use std::time::Duration;

use netrom_protocol::Callsign;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::RouterError;

/// Routing table and mode coordinator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// This station's callsign; never a neighbor, destination or path hop
    pub local_callsign: Callsign,
    /// Routes kept per destination
    pub max_routes_per_destination: usize,
    /// Combined quality below which advertised routes are ignored
    pub min_route_quality: u8,
    /// Obsolescence count given to fresh neighbors and routes
    pub obsolescence_init: u32,
    /// Time that consumes one obsolescence count
    #[serde(with = "duration_secs")]
    pub obsolescence_interval: Duration,
    /// Added to a neighbor's quality on every direct observation
    pub neighbor_quality_increment: u8,
    /// Quality given to the sender of a NODES broadcast
    pub broadcast_neighbor_quality: u8,
    /// Direct observation quality when no link estimate is available
    pub default_direct_quality: u8,
    /// Passive inference tuning
    pub inference: InferenceConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            local_callsign: Callsign::nocall(),
            max_routes_per_destination: 3,
            min_route_quality: 50,
            obsolescence_init: 6,
            obsolescence_interval: Duration::from_secs(3600),
            neighbor_quality_increment: 10,
            broadcast_neighbor_quality: 192,
            default_direct_quality: 128,
            inference: InferenceConfig::default(),
        }
    }
}

impl RouterConfig {
    /// Default configuration for a station
    pub fn for_station(local_callsign: Callsign) -> Self {
        Self {
            local_callsign,
            ..Default::default()
        }
    }

    /// Reject values the routing core cannot work with
    pub fn validate(&self) -> Result<(), RouterError> {
        if self.max_routes_per_destination == 0 {
            return Err(RouterError::InvalidConfig(
                "max_routes_per_destination must be at least 1".to_string(),
            ));
        }
        self.inference.validate()
    }

    /// Hex SHA-256 of the canonical JSON form
    ///
    /// Snapshots taken under a different configuration are not restored.
    /// Only meaningful for a configuration that passes [`validate`](Self::validate):
    /// JSON has no spelling for non-finite floats.
    pub fn fingerprint(&self) -> String {
        let canonical = match serde_json::to_vec(self) {
            Ok(json) => json,
            Err(_) => format!("{:?}", self).into_bytes(),
        };
        hex::encode(Sha256::digest(&canonical))
    }
}

/// Passive inference configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Quality of a station heard sending directly to us
    pub direct_quality: u8,
    /// Quality of a digipeater inferred to be our neighbor
    pub inferred_neighbor_quality: u8,
    /// Advertised quality of a route seen once
    pub route_base_quality: u8,
    /// Advertised quality gained per reinforcement
    pub reinforcement_step: u8,
    /// Reinforcement ceiling
    pub max_reinforcement: u32,
    /// Evidence strength halves every `half_life`; older evidence is dropped
    #[serde(with = "duration_secs")]
    pub half_life: Duration,
    /// Evidence weaker than this is dropped
    pub min_strength: f64,
    /// Evidence records kept per destination
    pub max_routes_per_destination: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            direct_quality: 160,
            inferred_neighbor_quality: 128,
            route_base_quality: 96,
            reinforcement_step: 16,
            max_reinforcement: 8,
            half_life: Duration::from_secs(1800),
            min_strength: 0.5,
            max_routes_per_destination: 3,
        }
    }
}

impl InferenceConfig {
    /// Reject values the inference engine cannot work with
    pub fn validate(&self) -> Result<(), RouterError> {
        if !self.min_strength.is_finite() || self.min_strength < 0.0 {
            return Err(RouterError::InvalidConfig(format!(
                "inference.min_strength must be a finite, non-negative number (got {})",
                self.min_strength
            )));
        }
        if self.max_routes_per_destination == 0 {
            return Err(RouterError::InvalidConfig(
                "inference.max_routes_per_destination must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serialize durations as whole seconds
pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RouterConfig =
            serde_json::from_str(r#"{"local_callsign": "k1abc-2", "min_route_quality": 70}"#)
                .unwrap();
        assert_eq!(config.local_callsign.to_string(), "K1ABC-2");
        assert_eq!(config.min_route_quality, 70);
        assert_eq!(config.max_routes_per_destination, 3);
        assert_eq!(config.obsolescence_interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_invalid_callsign_rejected() {
        let result: Result<RouterConfig, _> =
            serde_json::from_str(r#"{"local_callsign": "not a call"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_fingerprint_tracks_settings() {
        let a = RouterConfig::default();
        let mut b = RouterConfig::default();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);

        b.min_route_quality += 1;
        assert_ne!(a.fingerprint(), b.fingerprint());

        let c = RouterConfig::for_station(Callsign::parse("W1AW").unwrap());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(RouterConfig::default().validate().is_ok());
    }

    #[test]
    fn test_non_finite_strength_rejected() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -0.5] {
            let mut config = RouterConfig::default();
            config.inference.min_strength = bad;
            assert!(matches!(
                config.validate(),
                Err(RouterError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_zero_route_limits_rejected() {
        let mut config = RouterConfig::default();
        config.max_routes_per_destination = 0;
        assert!(config.validate().is_err());

        let mut config = RouterConfig::default();
        config.inference.max_routes_per_destination = 0;
        assert!(config.validate().is_err());
    }
}

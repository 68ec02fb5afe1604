//! Traffic statistics
//!
//! Counters for everything heard on the KISS source, split by direction
//! relative to the local station and by AX.25 frame class, plus a recent
//! frame rate.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use netrom_protocol::{Callsign, FrameKind, Packet};
use tokio::sync::Mutex;

/// Stats shared between the source task and the reporter
pub type SharedStats = Arc<Mutex<TrafficStats>>;

/// Frames older than this do not count towards the rate
const RATE_WINDOW: Duration = Duration::from_secs(5);

/// Most frame times kept for the rate
const RATE_SAMPLES: usize = 100;

/// Frame and byte counts in one direction
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DirectionStats {
    /// Frames counted
    pub frames: u64,
    /// AX.25 bytes counted, excluding KISS framing
    pub bytes: u64,
}

impl DirectionStats {
    fn add(&mut self, bytes: usize) {
        self.frames += 1;
        self.bytes += bytes as u64;
    }
}

/// Counters for one monitor run
#[derive(Debug, Default, Clone)]
pub struct TrafficStats {
    /// Frames sent by the local station
    pub sent: DirectionStats,
    /// Frames sent by anyone else
    pub received: DirectionStats,
    /// Information frames
    pub i_frames: u64,
    /// Supervisory frames (RR, RNR, REJ, SREJ)
    pub s_frames: u64,
    /// Unnumbered frames, including UI
    pub u_frames: u64,
    /// KISS data frames that were not valid AX.25
    pub undecodable: u64,
    /// Whether the source is currently connected
    pub connected: bool,
    /// Successful connections so far
    pub connections: u64,
    recent: VecDeque<Instant>,
}

impl TrafficStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap for sharing between tasks
    pub fn shared() -> SharedStats {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Count one decoded frame of `frame_len` bytes
    pub fn record(&mut self, packet: &Packet, frame_len: usize, local: &Callsign, now: Instant) {
        if Callsign::parse(&packet.from).as_ref() == Some(local) {
            self.sent.add(frame_len);
        } else {
            self.received.add(frame_len);
        }

        match packet.kind {
            FrameKind::I => self.i_frames += 1,
            FrameKind::Rr | FrameKind::Rnr | FrameKind::Rej | FrameKind::Srej => {
                self.s_frames += 1
            }
            _ => self.u_frames += 1,
        }

        while self
            .recent
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) > RATE_WINDOW)
        {
            self.recent.pop_front();
        }
        if self.recent.len() == RATE_SAMPLES {
            self.recent.pop_front();
        }
        self.recent.push_back(now);
    }

    /// Mark the source connected or disconnected
    pub fn set_connected(&mut self, connected: bool) {
        if connected && !self.connected {
            self.connections += 1;
        }
        self.connected = connected;
    }

    /// Frames heard in either direction
    pub fn total_frames(&self) -> u64 {
        self.sent.frames + self.received.frames
    }

    /// Frames per second over the last few seconds
    ///
    /// Zero until at least two frames at least 100 ms apart have been
    /// heard within the window.
    pub fn frames_per_second(&self, now: Instant) -> f64 {
        let mut window = self
            .recent
            .iter()
            .filter(|t| now.saturating_duration_since(**t) <= RATE_WINDOW);
        let Some(first) = window.next() else {
            return 0.0;
        };
        let (count, last) = window.fold((1usize, first), |(n, _), t| (n + 1, t));
        if count < 2 {
            return 0.0;
        }
        let span = last.saturating_duration_since(*first).as_secs_f64();
        if span < 0.1 {
            return 0.0;
        }
        count as f64 / span
    }
}

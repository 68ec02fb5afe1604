//! KISS packet sources
//!
//! Reads raw bytes from a TCP KISS server or a serial TNC, splits them into
//! KISS frames, decodes AX.25 and forwards the resulting packets to the
//! router actor. Connection failures are logged and retried with a capped
//! exponential backoff; only a stopped router ends the source.

use std::time::{Duration, Instant, SystemTime};

use netrom_protocol::{ax25, Callsign, KissCodec, Packet};
use netrom_router::{RouterError, RouterHandle};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, trace, warn};

use crate::error::MonitorError;
use crate::settings::SourceSettings;
use crate::stats::SharedStats;

/// Delay before the first reconnect attempt
const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Longest delay between reconnect attempts
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Double the reconnect delay, up to the cap
fn next_reconnect_delay(delay: Duration) -> Duration {
    (delay * 2).min(MAX_RECONNECT_DELAY)
}

/// A decoded packet and the size of the AX.25 frame it came from
#[derive(Debug, Clone)]
pub struct HeardFrame {
    /// The decoded packet
    pub packet: Packet,
    /// AX.25 frame size in bytes, without KISS framing
    pub frame_len: usize,
}

/// Turns KISS bytes into packets
pub struct FrameDecoder {
    codec: KissCodec,
    kiss_port: Option<u8>,
    undecodable: u64,
}

impl FrameDecoder {
    /// Create a decoder, optionally accepting a single KISS port
    pub fn new(kiss_port: Option<u8>) -> Self {
        Self {
            codec: KissCodec::new(),
            kiss_port,
            undecodable: 0,
        }
    }

    /// Feed bytes and collect every complete packet
    ///
    /// Non-data frames, frames from other ports and undecodable AX.25 are
    /// dropped.
    pub fn push(&mut self, data: &[u8], now: SystemTime) -> Vec<HeardFrame> {
        self.codec.push_bytes(data);

        let mut heard = Vec::new();
        while let Some(frame) = self.codec.next_frame() {
            if !frame.is_data() {
                trace!("Skipping KISS {:?} frame", frame.command);
                continue;
            }
            if self.kiss_port.is_some_and(|port| port != frame.port) {
                continue;
            }
            match ax25::decode_frame(&frame.data) {
                Ok(decoded) => heard.push(HeardFrame {
                    packet: decoded.into_packet(now),
                    frame_len: frame.data.len(),
                }),
                Err(e) => {
                    self.undecodable += 1;
                    debug!("Dropping undecodable frame: {}", e);
                }
            }
        }
        heard
    }

    /// Data frames on our port that were not valid AX.25
    pub fn undecodable(&self) -> u64 {
        self.undecodable
    }

    /// Forget any partial frame
    pub fn reset(&mut self) {
        self.codec.clear();
    }
}

type ByteStream = Box<dyn AsyncRead + Unpin + Send>;

async fn connect(settings: &SourceSettings) -> Result<ByteStream, MonitorError> {
    match settings {
        SourceSettings::Tcp { addr } => {
            let stream = TcpStream::connect(addr).await?;
            Ok(Box::new(stream))
        }
        SourceSettings::Serial { port, baud_rate } => {
            let stream = tokio_serial::new(port, *baud_rate)
                .timeout(Duration::from_millis(100))
                .open_native_async()?;
            Ok(Box::new(stream))
        }
    }
}

/// Where decoded packets go
struct Sink<'a> {
    router: &'a RouterHandle,
    stats: &'a SharedStats,
    local: &'a Callsign,
}

/// Read packets until the stream ends or fails
///
/// `next_id` is advanced past every packet handed to the router, even when
/// the read later fails.
async fn pump(
    stream: &mut ByteStream,
    decoder: &mut FrameDecoder,
    sink: &Sink<'_>,
    next_id: &mut u64,
) -> Result<(), MonitorError> {
    let mut buffer = vec![0u8; 1024];
    loop {
        let n = stream.read(&mut buffer).await?;
        if n == 0 {
            return Ok(());
        }
        let heard = decoder.push(&buffer[..n], SystemTime::now());

        {
            let mut stats = sink.stats.lock().await;
            let now = Instant::now();
            for frame in &heard {
                stats.record(&frame.packet, frame.frame_len, sink.local, now);
            }
            stats.undecodable = decoder.undecodable();
        }

        for frame in heard {
            let packet = frame.packet;
            trace!("{} > {} via {:?}", packet.from, packet.to, packet.via);
            sink.router.packet(*next_id, packet).await?;
            *next_id += 1;
        }
    }
}

/// Run a source until the router stops
///
/// Input ids start at `first_id` and increase by one per packet. Traffic
/// is counted in `stats`, with `local` deciding which frames were sent by
/// this station.
pub async fn run_source(
    settings: SourceSettings,
    kiss_port: Option<u8>,
    router: RouterHandle,
    stats: SharedStats,
    local: Callsign,
    first_id: u64,
) -> Result<(), MonitorError> {
    let mut decoder = FrameDecoder::new(kiss_port);
    let mut next_id = first_id;
    let mut delay = INITIAL_RECONNECT_DELAY;
    let sink = Sink {
        router: &router,
        stats: &stats,
        local: &local,
    };

    loop {
        match connect(&settings).await {
            Ok(mut stream) => {
                info!("Connected to {}", settings.describe());
                delay = INITIAL_RECONNECT_DELAY;
                stats.lock().await.set_connected(true);
                decoder.reset();

                let result = pump(&mut stream, &mut decoder, &sink, &mut next_id).await;
                stats.lock().await.set_connected(false);
                match result {
                    Ok(()) => warn!("{} closed the connection", settings.describe()),
                    Err(MonitorError::Router(RouterError::ActorGone)) => {
                        return Err(RouterError::ActorGone.into());
                    }
                    Err(e) => warn!("Read from {} failed: {}", settings.describe(), e),
                }
            }
            Err(e) => warn!("Cannot connect to {}: {}", settings.describe(), e),
        }
        debug!("Reconnecting in {}s", delay.as_secs());
        tokio::time::sleep(delay).await;
        delay = next_reconnect_delay(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netrom_protocol::{kiss, Ax25Frame, PID_NO_LAYER3};

    fn frame_bytes(port: u8, from: &str, to: &str) -> Vec<u8> {
        let frame = Ax25Frame::ui(
            Callsign::parse(from).unwrap(),
            Callsign::parse(to).unwrap(),
            PID_NO_LAYER3,
            b"test".to_vec(),
        );
        kiss::encode_frame(port, &frame.encode())
    }

    #[test]
    fn test_decoder_yields_packets() {
        let mut decoder = FrameDecoder::new(None);
        let mut bytes = frame_bytes(0, "W1AW", "N0CALL");
        bytes.extend(frame_bytes(1, "K2ABC", "N0CALL"));

        let heard = decoder.push(&bytes, SystemTime::UNIX_EPOCH);
        assert_eq!(heard.len(), 2);
        assert_eq!(heard[0].packet.from, "W1AW");
        assert_eq!(heard[1].packet.from, "K2ABC");
        assert_eq!(heard[1].packet.info, b"test");
        // Two addresses, control, PID and four info bytes
        assert_eq!(heard[0].frame_len, 7 + 7 + 1 + 1 + 4);
    }

    #[test]
    fn test_decoder_port_filter() {
        let mut decoder = FrameDecoder::new(Some(1));
        let mut bytes = frame_bytes(0, "W1AW", "N0CALL");
        bytes.extend(frame_bytes(1, "K2ABC", "N0CALL"));

        let heard = decoder.push(&bytes, SystemTime::UNIX_EPOCH);
        assert_eq!(heard.len(), 1);
        assert_eq!(heard[0].packet.from, "K2ABC");
        assert_eq!(decoder.undecodable(), 0);
    }

    #[test]
    fn test_decoder_handles_split_reads_and_garbage() {
        let mut decoder = FrameDecoder::new(None);
        let bytes = frame_bytes(0, "W1AW", "N0CALL");
        let (a, b) = bytes.split_at(7);

        assert!(decoder.push(&[0x13, 0x37], SystemTime::UNIX_EPOCH).is_empty());
        assert!(decoder.push(a, SystemTime::UNIX_EPOCH).is_empty());
        assert_eq!(decoder.push(b, SystemTime::UNIX_EPOCH).len(), 1);

        // Too short for AX.25
        assert!(decoder
            .push(&kiss::encode_frame(0, &[1, 2, 3]), SystemTime::UNIX_EPOCH)
            .is_empty());
        assert_eq!(decoder.undecodable(), 1);
    }

    #[test]
    fn test_reconnect_backoff_doubles_up_to_cap() {
        let mut delay = INITIAL_RECONNECT_DELAY;
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(delay.as_secs());
            delay = next_reconnect_delay(delay);
        }
        assert_eq!(seen, vec![1, 2, 4, 8, 10, 10]);
    }

    #[tokio::test]
    async fn test_pump_counts_traffic_and_forwards_packets() {
        use crate::stats::TrafficStats;
        use tokio::sync::mpsc;

        let mut bytes = frame_bytes(0, "N0CALL", "W1AW");
        bytes.extend(frame_bytes(0, "W1AW", "N0CALL"));
        bytes.extend(kiss::encode_frame(0, &[1, 2, 3]));
        let mut stream: ByteStream = Box::new(std::io::Cursor::new(bytes));

        let (cmd_tx, mut cmd_rx) = mpsc::channel(8);
        let router = RouterHandle::new(cmd_tx);
        let stats = TrafficStats::shared();
        let local = Callsign::parse("N0CALL").unwrap();
        let sink = Sink {
            router: &router,
            stats: &stats,
            local: &local,
        };
        let mut decoder = FrameDecoder::new(None);
        let mut next_id = 7;

        pump(&mut stream, &mut decoder, &sink, &mut next_id).await.unwrap();
        assert_eq!(next_id, 9);

        let stats = stats.lock().await;
        assert_eq!(stats.sent.frames, 1);
        assert_eq!(stats.received.frames, 1);
        assert_eq!(stats.u_frames, 2);
        assert_eq!(stats.undecodable, 1);
        drop(stats);

        let mut ids = Vec::new();
        while let Ok(cmd) = cmd_rx.try_recv() {
            if let netrom_router::RouterCommand::Packet { id, .. } = cmd {
                ids.push(id);
            }
        }
        assert_eq!(ids, vec![7, 8]);
    }
}

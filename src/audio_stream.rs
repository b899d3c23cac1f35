use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result as AnyResult};
use log::{debug, error, info, warn};

use crate::conversion::{decode_i16_le, SAMPLE_BYTES};
use crate::error::{Result, SpectrogramError};
use crate::pipeline::Pipeline;
use crate::utils::{hop_samples, READ_CHUNK_BYTES};

const READ_TIMEOUT: Duration = Duration::from_millis(200);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Counts bytes over a fixed window and reports the resulting sample rate.
pub struct ThroughputMeter {
    window: Duration,
    started: Instant,
    bytes: usize,
}

impl ThroughputMeter {
    pub fn new(window: Duration) -> Self {
        Self::starting_at(window, Instant::now())
    }

    pub fn starting_at(window: Duration, now: Instant) -> Self {
        Self {
            window,
            started: now,
            bytes: 0,
        }
    }

    /// Adds `bytes`; once the window has elapsed returns samples/second and restarts the window.
    pub fn record_at(&mut self, bytes: usize, now: Instant) -> Option<f64> {
        self.bytes += bytes;
        let elapsed = now.saturating_duration_since(self.started);
        if elapsed < self.window || elapsed.is_zero() {
            return None;
        }
        let rate = (self.bytes / SAMPLE_BYTES) as f64 / elapsed.as_secs_f64();
        self.bytes = 0;
        self.started = now;
        Some(rate)
    }
}

/// Turns an unframed i16 LE byte stream into 90%-overlapping sample frames.
///
/// Chunks may split samples anywhere. After every [`StreamIngestor::push`] the caller drains
/// [`StreamIngestor::next_frame`] until it returns `None`; the emitted frame sequence depends
/// only on the concatenated bytes, never on how they were chunked.
pub struct StreamIngestor {
    fft_size: usize,
    hop_bytes: usize,
    max_pending_bytes: usize,
    buffer: Vec<u8>,
    read_pos: usize,
    /// An odd number of bytes was dropped; the next byte is the tail of a lost sample.
    skip_byte: bool,
    frame: Vec<f64>,
    throughput: ThroughputMeter,
}

impl StreamIngestor {
    pub fn new(fft_size: usize, max_pending_bytes: usize, throughput_window: Duration) -> Self {
        let hop = hop_samples(fft_size);
        info!(
            "Stream ingestor: {} samples per frame, advancing {} samples",
            fft_size, hop
        );
        Self {
            fft_size,
            hop_bytes: hop * SAMPLE_BYTES,
            max_pending_bytes,
            buffer: Vec::with_capacity(fft_size * SAMPLE_BYTES * 2),
            read_pos: 0,
            skip_byte: false,
            frame: vec![0.0; fft_size],
            throughput: ThroughputMeter::new(throughput_window),
        }
    }

    pub fn frame_bytes(&self) -> usize {
        self.fft_size * SAMPLE_BYTES
    }

    pub fn hop_samples(&self) -> usize {
        self.hop_bytes / SAMPLE_BYTES
    }

    /// Bytes received but not yet consumed by the sliding window.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len() - self.read_pos
    }

    /// Appends a chunk. Rejects it, leaving the buffer untouched, if the ceiling would be exceeded.
    ///
    /// Rejected bytes are lost, but sample alignment is kept: after an odd number of dropped
    /// bytes the first byte of the next accepted chunk is discarded as well.
    pub fn push(&mut self, chunk: &[u8]) -> Result<()> {
        self.push_at(chunk, Instant::now())
    }

    pub fn push_at(&mut self, chunk: &[u8], now: Instant) -> Result<()> {
        let data = if self.skip_byte && !chunk.is_empty() {
            &chunk[1..]
        } else {
            chunk
        };
        let pending = self.pending_bytes() + data.len();
        if pending > self.max_pending_bytes {
            if chunk.len() % 2 == 1 {
                self.skip_byte = !self.skip_byte;
            }
            return Err(SpectrogramError::BufferOverflow {
                pending,
                limit: self.max_pending_bytes,
            });
        }

        if data.len() != chunk.len() {
            debug!("Discarding one byte to stay on a sample boundary");
            self.skip_byte = false;
        }
        self.compact();
        self.buffer.extend_from_slice(data);

        if let Some(rate) = self.throughput.record_at(chunk.len(), now) {
            info!("{:.1} samples/second", rate);
        }
        Ok(())
    }

    /// Next frame if at least N samples are buffered; advances the window by N/10 samples.
    pub fn next_frame(&mut self) -> Option<&[f64]> {
        let frame_bytes = self.frame_bytes();
        if self.pending_bytes() < frame_bytes {
            return None;
        }

        let start = self.read_pos;
        decode_i16_le(&self.buffer[start..start + frame_bytes], &mut self.frame);
        self.read_pos += self.hop_bytes;
        Some(&self.frame)
    }

    fn compact(&mut self) {
        if self.read_pos > 0 && self.read_pos >= self.buffer.len() / 2 {
            self.buffer.drain(..self.read_pos);
            self.read_pos = 0;
        }
    }
}

/// Connects once to `addr` and feeds every received chunk through `pipeline` until EOF,
/// a socket error, or `shutdown_flag` is raised. There is no reconnection.
pub fn start_receiving_thread(
    addr: SocketAddr,
    pipeline: Arc<Mutex<Pipeline>>,
    shutdown_flag: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
) {
    match receive_loop(addr, &pipeline, &shutdown_flag, &connected) {
        Ok(()) => info!("Receiving thread shutting down"),
        Err(e) => error!("Receiving thread stopped: {:?}", e),
    }
    connected.store(false, Ordering::SeqCst);
}

fn receive_loop(
    addr: SocketAddr,
    pipeline: &Arc<Mutex<Pipeline>>,
    shutdown_flag: &Arc<AtomicBool>,
    connected: &Arc<AtomicBool>,
) -> AnyResult<()> {
    info!("Connecting to {}", addr);
    let mut stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    connected.store(true, Ordering::SeqCst);
    info!("Connected to {}", addr);

    let mut chunk = vec![0u8; READ_CHUNK_BYTES];
    while !shutdown_flag.load(Ordering::SeqCst) {
        let n = match stream.read(&mut chunk) {
            Ok(0) => {
                warn!("Connection to {} closed by peer", addr);
                return Ok(());
            }
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(anyhow!("read from {} failed: {}", addr, e)),
        };

        let mut pipeline = pipeline
            .lock()
            .map_err(|_| anyhow!("pipeline mutex poisoned"))?;
        match pipeline.push_bytes(&chunk[..n]) {
            Ok(frames) => debug!("Received {} bytes, processed {} frames", n, frames),
            Err(e @ SpectrogramError::BufferOverflow { .. }) => {
                warn!("Dropping {} bytes: {}", n, e);
            }
            Err(e) => error!("Pipeline error: {}", e),
        }
    }
    Ok(())
}

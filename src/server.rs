use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use log::{debug, info, warn};

use crate::conversion::{encode_i16_le, f32_to_i16};
use crate::make_waves::ToneGenerator;

const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Where the served samples come from.
pub enum SampleSource {
    /// Samples of a recording, replayed from the start when exhausted.
    Looped { samples: Vec<i16>, position: usize },
    Tone(ToneGenerator),
}

impl SampleSource {
    pub fn looped(samples: Vec<i16>) -> Result<Self> {
        if samples.is_empty() {
            return Err(anyhow!("no samples to serve"));
        }
        Ok(SampleSource::Looped {
            samples,
            position: 0,
        })
    }

    pub fn fill(&mut self, out: &mut [i16]) {
        match self {
            SampleSource::Looped { samples, position } => {
                for sample in out.iter_mut() {
                    *sample = samples[*position];
                    *position = (*position + 1) % samples.len();
                }
            }
            SampleSource::Tone(tone) => tone.fill(out),
        }
    }
}

/// Reads the first channel of a WAV file as 16-bit samples; returns them with the file's rate.
pub fn load_wav_samples<P: AsRef<Path>>(path: P) -> Result<(Vec<i16>, u32)> {
    let path = path.as_ref();
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| anyhow!("Failed to open {}: {}", path.display(), e))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;
    info!(
        "{}: {} Hz, {} channel(s), {} bits, {:?}",
        path.display(),
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample,
        spec.sample_format
    );
    if channels > 1 {
        warn!("Only the first of {} channels will be served", channels);
    }

    let samples: Vec<i16> = match spec.sample_format {
        hound::SampleFormat::Int if spec.bits_per_sample <= 16 => reader
            .samples::<i16>()
            .step_by(channels)
            .collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let shift = spec.bits_per_sample.saturating_sub(16) as u32;
            reader
                .samples::<i32>()
                .step_by(channels)
                .map(|s| s.map(|v| (v >> shift) as i16))
                .collect::<std::result::Result<_, _>>()?
        }
        hound::SampleFormat::Float => {
            let floats: Vec<f32> = reader
                .samples::<f32>()
                .step_by(channels)
                .collect::<std::result::Result<_, _>>()?;
            f32_to_i16(&floats)
        }
    };

    info!("Loaded {} samples from {}", samples.len(), path.display());
    Ok((samples, spec.sample_rate))
}

pub struct ServerSettings {
    pub sample_rate: f64,
    pub chunk_samples: usize,
    /// Sleep between chunks so the stream runs at `sample_rate`.
    pub realtime: bool,
}

/// Accepts clients one at a time and streams `source` to each until it disconnects.
pub fn run_server(
    listener: TcpListener,
    mut source: SampleSource,
    settings: &ServerSettings,
    shutdown_flag: Arc<AtomicBool>,
) -> Result<()> {
    listener.set_nonblocking(true)?;
    info!("Serving samples on {}", listener.local_addr()?);

    while !shutdown_flag.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                info!("Client connected: {}", addr);
                stream.set_nonblocking(false)?;
                stream_to_client(stream, addr, &mut source, settings, &shutdown_flag)?;
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => return Err(anyhow!("accept failed: {}", e)),
        }
    }

    info!("Server shutting down");
    Ok(())
}

fn stream_to_client(
    mut stream: TcpStream,
    addr: SocketAddr,
    source: &mut SampleSource,
    settings: &ServerSettings,
    shutdown_flag: &Arc<AtomicBool>,
) -> Result<()> {
    let chunk_samples = settings.chunk_samples.max(1);
    let chunk_duration = Duration::from_secs_f64(chunk_samples as f64 / settings.sample_rate);
    let mut samples = vec![0i16; chunk_samples];
    let mut deadline = Instant::now();
    let mut sent: u64 = 0;

    while !shutdown_flag.load(Ordering::SeqCst) {
        source.fill(&mut samples);
        if let Err(e) = stream.write_all(&encode_i16_le(&samples)) {
            info!("Client {} disconnected after {} samples: {}", addr, sent, e);
            return Ok(());
        }
        sent += chunk_samples as u64;

        if settings.realtime {
            deadline += chunk_duration;
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            } else {
                debug!("Server falling behind by {:?}", now - deadline);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn looped_source_wraps_around() {
        let mut source = SampleSource::looped(vec![1, 2, 3]).unwrap();
        let mut out = [0i16; 7];
        source.fill(&mut out);
        assert_eq!(out, [1, 2, 3, 1, 2, 3, 1]);
        assert!(SampleSource::looped(Vec::new()).is_err());
    }

    #[test]
    fn wav_first_channel_is_loaded() {
        let path = std::env::temp_dir().join(format!("tcp_spectrogram_wav_{}.wav", std::process::id()));
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 5512,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..10i16 {
            writer.write_sample(i).unwrap();
            writer.write_sample(-i).unwrap();
        }
        writer.finalize().unwrap();

        let (samples, rate) = load_wav_samples(&path).unwrap();
        assert_eq!(rate, 5512);
        assert_eq!(samples, (0..10).collect::<Vec<i16>>());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn streams_pcm_to_client() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(AtomicBool::new(false));
        let settings = ServerSettings {
            sample_rate: 8000.0,
            chunk_samples: 64,
            realtime: false,
        };
        let server = {
            let shutdown = Arc::clone(&shutdown);
            let source = SampleSource::looped(vec![7, -7]).unwrap();
            thread::spawn(move || run_server(listener, source, &settings, shutdown))
        };

        let mut client = TcpStream::connect(addr).unwrap();
        let mut bytes = [0u8; 400];
        client.read_exact(&mut bytes).unwrap();
        shutdown.store(true, Ordering::SeqCst);
        drop(client);

        let samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert!(samples.chunks(2).all(|pair| pair == [7, -7]));
        server.join().unwrap().unwrap();
    }
}

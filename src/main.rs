use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{error, info, warn};

use tcp_spectrogram::audio_stream::start_receiving_thread;
use tcp_spectrogram::make_waves::ToneGenerator;
use tcp_spectrogram::plot::{self, SpectrogramApp};
use tcp_spectrogram::presets::PresetManager;
use tcp_spectrogram::server::{load_wav_samples, run_server, SampleSource, ServerSettings};
use tcp_spectrogram::utils::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SAMPLE_RATE};
use tcp_spectrogram::{Pipeline, SpectrogramConfig};

const DEFAULT_TONE_HZ: f64 = 1000.0;
const DEFAULT_CHUNK_SAMPLES: usize = 1024;
const TONE_AMPLITUDE: f64 = 0.5;

#[derive(Parser, Debug)]
#[command(name = "tcp_spectrogram", version, about = "Scrolling spectrogram of a PCM stream received over TCP")]
struct Cli {
    /// Turn on log output (RUST_LOG is honoured when set)
    #[arg(long, global = true)]
    enable_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to a sample server and show the spectrogram
    View(ViewArgs),
    /// Stream 16-bit PCM to whoever connects
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct ViewArgs {
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// YAML file with analysis settings
    #[arg(long)]
    config: Option<PathBuf>,
    /// YAML file with named display presets
    #[arg(long)]
    presets: Option<PathBuf>,
    #[arg(long, requires = "presets")]
    preset: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    brightness: Option<i32>,
    #[arg(long, allow_hyphen_values = true)]
    contrast: Option<i32>,
    #[arg(long)]
    freq_from: Option<u32>,
    #[arg(long)]
    freq_to: Option<u32>,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Loop the first channel of this WAV file
    #[arg(long, conflicts_with = "tone_hz")]
    wav: Option<PathBuf>,
    /// Serve a sine tone at this frequency
    #[arg(long)]
    tone_hz: Option<f64>,
    /// Pacing rate; defaults to the WAV file's rate
    #[arg(long)]
    sample_rate: Option<f64>,
    #[arg(long, default_value_t = DEFAULT_CHUNK_SAMPLES)]
    chunk_samples: usize,
}

fn main() {
    let cli = Cli::parse();

    if cli.enable_logs {
        // Don't override RUST_LOG if it's already set
        if std::env::var("RUST_LOG").is_err() {
            std::env::set_var("RUST_LOG", "tcp_spectrogram=info");
        }
        env_logger::init();
    }

    if let Err(e) = run(cli.command) {
        if cli.enable_logs {
            error!("Application encountered an error: {:?}", e);
        } else {
            eprintln!("Error: {:?}", e);
        }
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::View(args) => run_view(args),
        Command::Serve(args) => run_serve(args),
    }
}

fn resolve_addr(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .with_context(|| format!("Cannot resolve {}:{}", host, port))?
        .next()
        .ok_or_else(|| anyhow!("No address found for {}:{}", host, port))
}

fn run_view(args: ViewArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => SpectrogramConfig::from_yaml_file(path)?,
        None => SpectrogramConfig::default(),
    };

    let (mut brightness, mut contrast) = (0, 0);
    let (mut freq_from, mut freq_to) = (config.freq_from, config.freq_to);
    if let Some(path) = &args.presets {
        let manager = PresetManager::new(path)?;
        let name = args.preset.as_deref().unwrap_or("default");
        let preset = manager.get(name)?;
        info!("Using preset '{}'", name);
        brightness = preset.brightness;
        contrast = preset.contrast;
        freq_from = preset.freq_from;
        freq_to = preset.freq_to;
    }
    brightness = args.brightness.unwrap_or(brightness);
    contrast = args.contrast.unwrap_or(contrast);
    freq_from = args.freq_from.unwrap_or(freq_from);
    freq_to = args.freq_to.unwrap_or(freq_to);

    let (status_tx, status_rx) = crossbeam_channel::unbounded();
    let mut pipeline = Pipeline::new(config)?.with_status_sender(status_tx);
    pipeline.set_brightness(brightness);
    pipeline.set_contrast(contrast)?;
    pipeline.set_frequency_range(freq_from, freq_to)?;
    let pipeline = Arc::new(Mutex::new(pipeline));

    let addr = resolve_addr(&args.host, args.port)?;
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let connected = Arc::new(AtomicBool::new(false));

    info!("Starting receiving thread...");
    let receive_thread = std::thread::spawn({
        let pipeline = Arc::clone(&pipeline);
        let shutdown_flag = Arc::clone(&shutdown_flag);
        let connected = Arc::clone(&connected);
        move || start_receiving_thread(addr, pipeline, shutdown_flag, connected)
    });

    info!("Starting GUI...");
    let app = SpectrogramApp::new(
        Arc::clone(&pipeline),
        status_rx,
        Arc::clone(&connected),
        format!("Source: {}", addr),
    );
    let gui_result = plot::run_native(app);

    info!("Setting shutdown flag...");
    shutdown_flag.store(true, Ordering::SeqCst);
    if receive_thread.join().is_err() {
        warn!("Receiving thread panicked");
    }
    info!("Viewer closed");
    gui_result
}

fn run_serve(args: ServeArgs) -> Result<()> {
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    {
        let shutdown_flag = Arc::clone(&shutdown_flag);
        ctrlc::set_handler(move || {
            info!("Ctrl-C received, stopping server");
            shutdown_flag.store(true, Ordering::SeqCst);
        })?;
    }

    let (source, sample_rate) = match &args.wav {
        Some(path) => {
            let (samples, file_rate) = load_wav_samples(path)?;
            let rate = args.sample_rate.unwrap_or(file_rate as f64);
            (SampleSource::looped(samples)?, rate)
        }
        None => {
            let rate = args.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
            let hz = args.tone_hz.unwrap_or(DEFAULT_TONE_HZ);
            info!("Serving a {} Hz tone at {} Hz", hz, rate);
            (SampleSource::Tone(ToneGenerator::new(hz, rate, TONE_AMPLITUDE)), rate)
        }
    };
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(anyhow!("Invalid sample rate {}", sample_rate));
    }

    let listener = TcpListener::bind(("0.0.0.0", args.port))
        .with_context(|| format!("Cannot listen on port {}", args.port))?;
    let settings = ServerSettings {
        sample_rate,
        chunk_samples: args.chunk_samples,
        realtime: true,
    };
    run_server(listener, source, &settings, shutdown_flag)
}

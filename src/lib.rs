//! Real-time spectrogram of a 16-bit PCM stream received over TCP.
//!
//! Bytes flow through [`audio_stream::StreamIngestor`] (overlapping frames),
//! [`fft_analysis::WindowedFft`] (Hamming window + magnitude spectrum) and
//! [`spectrogram::SpectrogramBuffer`] (rebin, dB normalisation, palette mapping, scroll).
//! [`pipeline::Pipeline`] ties the three together.

pub mod audio_stream;
pub mod config;
pub mod conversion;
pub mod error;
pub mod fft_analysis;
pub mod make_waves;
pub mod palette;
pub mod pipeline;
pub mod plot;
pub mod presets;
pub mod server;
pub mod spectrogram;
pub mod utils;

pub use config::SpectrogramConfig;
pub use error::{Result, SpectrogramError};
pub use palette::{Palette, Rgb};
pub use pipeline::Pipeline;
pub use spectrogram::{RgbImage, SpectrogramBuffer, StatusEvent};

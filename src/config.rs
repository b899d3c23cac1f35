use std::fs;
use std::path::Path;

use anyhow::{anyhow, Result as AnyResult};
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpectrogramError};
use crate::utils::{
    DEFAULT_FFT_SIZE, DEFAULT_FREQ_FROM, DEFAULT_FREQ_TO, DEFAULT_HISTORY_WIDTH,
    DEFAULT_MAX_PENDING_BYTES, DEFAULT_SAMPLE_RATE, READ_CHUNK_BYTES, THROUGHPUT_WINDOW_SECS,
};

/// Construction-time settings for the ingest -> FFT -> spectrogram pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrogramConfig {
    /// Samples per analysis window (N).
    pub fft_size: usize,
    /// Rate of the incoming PCM stream in Hz.
    pub sample_rate: f64,
    /// Default lower edge of the displayed frequency range.
    pub freq_from: u32,
    /// Default upper edge of the displayed frequency range.
    pub freq_to: u32,
    /// Number of columns in the rolling image.
    pub history_width: usize,
    /// Ceiling for bytes waiting in the ingestion buffer.
    pub max_pending_bytes: usize,
    /// Length of the throughput reporting window.
    pub throughput_window_secs: u64,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            sample_rate: DEFAULT_SAMPLE_RATE,
            freq_from: DEFAULT_FREQ_FROM,
            freq_to: DEFAULT_FREQ_TO,
            history_width: DEFAULT_HISTORY_WIDTH,
            max_pending_bytes: DEFAULT_MAX_PENDING_BYTES,
            throughput_window_secs: THROUGHPUT_WINDOW_SECS,
        }
    }
}

impl SpectrogramConfig {
    pub fn nyquist(&self) -> f64 {
        self.sample_rate / 2.0
    }

    pub fn frame_bytes(&self) -> usize {
        self.fft_size * std::mem::size_of::<i16>()
    }

    pub fn validate(&self) -> Result<()> {
        if self.fft_size < 2 {
            return Err(SpectrogramError::InvalidConfig(format!(
                "fft_size must be at least 2, got {}",
                self.fft_size
            )));
        }
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(SpectrogramError::InvalidConfig(format!(
                "sample_rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if self.history_width == 0 {
            return Err(SpectrogramError::InvalidConfig(
                "history_width must be non-zero".to_string(),
            ));
        }
        let min_pending = self.frame_bytes() + READ_CHUNK_BYTES;
        if self.max_pending_bytes < min_pending {
            return Err(SpectrogramError::InvalidConfig(format!(
                "max_pending_bytes ({}) must hold one frame plus one read ({} bytes)",
                self.max_pending_bytes, min_pending
            )));
        }
        validate_frequency_range(self.freq_from, self.freq_to, self.nyquist())
    }

    /// Loads a (possibly partial) YAML config; missing keys keep their defaults.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> AnyResult<Self> {
        let path = path.as_ref();
        info!("Loading spectrogram config from {}", path.display());
        let yaml_str = fs::read_to_string(path)?;
        let config: SpectrogramConfig = serde_yaml::from_str(&yaml_str)
            .map_err(|e| anyhow!("Failed to parse {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }
}

pub fn validate_frequency_range(from: u32, to: u32, nyquist: f64) -> Result<()> {
    if from >= to || to as f64 > nyquist {
        return Err(SpectrogramError::InvalidFrequencyRange { from, to, nyquist });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SpectrogramConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frame_bytes(), 32768);
        assert_eq!(config.nyquist(), 2756.25);
    }

    #[test]
    fn rejects_inverted_and_out_of_band_ranges() {
        let mut config = SpectrogramConfig::default();
        config.freq_from = 2000;
        config.freq_to = 1000;
        assert!(matches!(
            config.validate(),
            Err(SpectrogramError::InvalidFrequencyRange { from: 2000, to: 1000, .. })
        ));

        config.freq_from = 0;
        config.freq_to = 3000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_tiny_pending_ceiling() {
        let config = SpectrogramConfig {
            fft_size: 1024,
            max_pending_bytes: 100,
            ..SpectrogramConfig::default()
        };
        assert!(matches!(config.validate(), Err(SpectrogramError::InvalidConfig(_))));

        let one_frame = SpectrogramConfig {
            fft_size: 1024,
            max_pending_bytes: 2048,
            ..SpectrogramConfig::default()
        };
        assert!(one_frame.validate().is_err());

        let frame_and_read = SpectrogramConfig {
            max_pending_bytes: 2048 + READ_CHUNK_BYTES,
            ..one_frame
        };
        assert!(frame_and_read.validate().is_ok());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: SpectrogramConfig =
            serde_yaml::from_str("fft_size: 2048\nsample_rate: 8000.0\nfreq_to: 4000\n").unwrap();
        assert_eq!(config.fft_size, 2048);
        assert_eq!(config.freq_to, 4000);
        assert_eq!(config.history_width, DEFAULT_HISTORY_WIDTH);
        assert!(config.validate().is_ok());
    }
}

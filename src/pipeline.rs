use std::time::Duration;

use crossbeam_channel::Sender;
use log::{debug, info};

use crate::audio_stream::StreamIngestor;
use crate::config::SpectrogramConfig;
use crate::error::Result;
use crate::fft_analysis::WindowedFft;
use crate::spectrogram::{SpectrogramBuffer, StatusEvent};

/// Ingest -> analyze -> rebin/draw, run synchronously for every received chunk.
pub struct Pipeline {
    config: SpectrogramConfig,
    ingestor: StreamIngestor,
    fft: WindowedFft,
    spectrogram: SpectrogramBuffer,
}

impl Pipeline {
    pub fn new(config: SpectrogramConfig) -> Result<Self> {
        config.validate()?;
        let ingestor = StreamIngestor::new(
            config.fft_size,
            config.max_pending_bytes,
            Duration::from_secs(config.throughput_window_secs),
        );
        let fft = WindowedFft::new(config.fft_size);
        let spectrogram = SpectrogramBuffer::new(&config)?;
        info!(
            "Pipeline ready: fft_size={}, sample_rate={} Hz, range {}..{} Hz, {} columns",
            config.fft_size, config.sample_rate, config.freq_from, config.freq_to, config.history_width
        );

        Ok(Self {
            config,
            ingestor,
            fft,
            spectrogram,
        })
    }

    pub fn with_status_sender(mut self, tx: Sender<StatusEvent>) -> Self {
        self.spectrogram.set_status_sender(tx);
        self
    }

    pub fn config(&self) -> &SpectrogramConfig {
        &self.config
    }

    pub fn spectrogram(&self) -> &SpectrogramBuffer {
        &self.spectrogram
    }

    /// Feeds raw stream bytes; every frame that becomes available is analyzed and drawn.
    /// Returns how many frames were processed.
    pub fn push_bytes(&mut self, chunk: &[u8]) -> Result<usize> {
        self.ingestor.push(chunk)?;

        let mut frames = 0;
        while let Some(frame) = self.ingestor.next_frame() {
            let spectrum = self.fft.compute(frame)?;
            self.spectrogram.push_spectrum(spectrum)?;
            frames += 1;
        }
        if frames > 0 {
            debug!(
                "Processed {} frames, {} bytes pending",
                frames,
                self.ingestor.pending_bytes()
            );
        }
        Ok(frames)
    }

    pub fn set_display_size(&mut self, width: usize, height: usize) {
        self.spectrogram.set_display_size(width, height);
    }

    pub fn set_brightness(&mut self, brightness: i32) {
        self.spectrogram.set_brightness(brightness);
    }

    pub fn set_contrast(&mut self, contrast: i32) -> Result<()> {
        self.spectrogram.set_contrast(contrast)
    }

    pub fn set_frequency_range(&mut self, from: u32, to: u32) -> Result<()> {
        self.spectrogram.set_frequency_range(from, to)
    }

    /// Restores the configured default range.
    pub fn reset_frequency_range(&mut self) -> Result<()> {
        info!("Resetting frequency range");
        self.spectrogram
            .set_frequency_range(self.config.freq_from, self.config.freq_to)
    }
}

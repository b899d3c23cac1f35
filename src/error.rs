use std::fmt;

/// Errors produced by the streaming spectrogram core.
#[derive(Debug, Clone, PartialEq)]
pub enum SpectrogramError {
    /// A configuration value is unusable (zero sizes, bad sample rate, ...).
    InvalidConfig(String),
    /// Frequency range must satisfy `from < to <= nyquist`.
    InvalidFrequencyRange { from: u32, to: u32, nyquist: f64 },
    /// Contrast outside the range where the contrast factor is defined.
    ContrastOutOfRange(i32),
    /// Palette lookup outside `0..=255`.
    PaletteIndexOutOfRange(i64),
    /// A sample frame handed to the analyzer had the wrong length.
    FrameLength { expected: usize, actual: usize },
    /// The FFT backend rejected its buffers.
    Fft(String),
    /// Accepting a chunk would grow the ingestion buffer past its ceiling.
    BufferOverflow { pending: usize, limit: usize },
}

impl fmt::Display for SpectrogramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpectrogramError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            SpectrogramError::InvalidFrequencyRange { from, to, nyquist } => write!(
                f,
                "invalid frequency range {}..{} Hz (must satisfy from < to <= {})",
                from, to, nyquist
            ),
            SpectrogramError::ContrastOutOfRange(v) => {
                write!(f, "contrast {} out of range (-255..=258)", v)
            }
            SpectrogramError::PaletteIndexOutOfRange(i) => {
                write!(f, "palette index {} out of range (0..=255)", i)
            }
            SpectrogramError::FrameLength { expected, actual } => write!(
                f,
                "sample frame has {} samples, analyzer expects {}",
                actual, expected
            ),
            SpectrogramError::Fft(msg) => write!(f, "FFT error: {}", msg),
            SpectrogramError::BufferOverflow { pending, limit } => write!(
                f,
                "ingestion buffer would hold {} bytes, limit is {}",
                pending, limit
            ),
        }
    }
}

impl std::error::Error for SpectrogramError {}

pub type Result<T> = std::result::Result<T, SpectrogramError>;

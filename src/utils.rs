use log::debug;

pub const DEFAULT_FFT_SIZE: usize = 16384;
pub const DEFAULT_SAMPLE_RATE: f64 = 5512.5;
pub const DEFAULT_FREQ_FROM: u32 = 0;
pub const DEFAULT_FREQ_TO: u32 = 2756;
pub const DEFAULT_HISTORY_WIDTH: usize = 864;  // Columns kept in the rolling image
pub const OVERLAP_DIVISOR: usize = 10;  // Window advances by 1/10 of its length (90% overlap)
pub const THROUGHPUT_WINDOW_SECS: u64 = 5;
pub const DEFAULT_MAX_PENDING_BYTES: usize = 64 * 1024 * 1024;
pub const READ_CHUNK_BYTES: usize = 64 * 1024;  // Largest chunk handed to the ingestor per socket read
pub const DB_FLOOR: f64 = -150.0;  // dBFS reported for silent rows
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 4321;

/// Number of samples the analysis window advances per frame, never zero.
pub fn hop_samples(fft_size: usize) -> usize {
    let hop = (fft_size as f64 / OVERLAP_DIVISOR as f64).round() as usize;
    let hop = hop.max(1);
    debug!("Hop for fft_size {}: {} samples", fft_size, hop);
    hop
}

/// Hz between adjacent FFT bins.
pub fn bin_width(sample_rate: f64, fft_size: usize) -> f64 {
    sample_rate / fft_size as f64
}

/// Row (0 = lowest frequency) that `hertz` falls into when `from..to` is spread over `height` rows.
pub fn hertz_to_row(hertz: f64, from: u32, to: u32, height: usize) -> Option<usize> {
    if height == 0 || to <= from {
        return None;
    }
    let from = from as f64;
    let to = to as f64;
    if hertz < from || hertz >= to {
        return None;
    }
    let row = ((hertz - from) * height as f64 / (to - from)).floor() as usize;
    Some(row.min(height - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hop_is_tenth_of_window_rounded() {
        assert_eq!(hop_samples(16384), 1638);
        assert_eq!(hop_samples(1024), 102);
        assert_eq!(hop_samples(15), 2);
        assert_eq!(hop_samples(2), 1);
    }

    #[test]
    fn row_mapping_round_trips_edges() {
        assert_eq!(hertz_to_row(0.0, 0, 4000, 64), Some(0));
        assert_eq!(hertz_to_row(1000.0, 0, 4000, 64), Some(16));
        assert_eq!(hertz_to_row(3999.0, 0, 4000, 64), Some(63));
        assert_eq!(hertz_to_row(4000.0, 0, 4000, 64), None);
        assert_eq!(hertz_to_row(100.0, 500, 4000, 64), None);
    }
}

use std::f64::consts::PI;

use log::debug;

/// Phase-continuous sine source producing 16-bit PCM.
///
/// Successive calls to [`ToneGenerator::fill`] continue exactly where the previous call
/// stopped, so a stream assembled from many chunks is one unbroken tone.
#[derive(Debug, Clone)]
pub struct ToneGenerator {
    phase: f64,
    phase_delta: f64,
    amplitude: f64,
}

impl ToneGenerator {
    /// `amplitude` is a fraction of full scale and is clamped to `0.0..=1.0`.
    pub fn new(frequency: f64, sample_rate: f64, amplitude: f64) -> Self {
        let phase_delta = 2.0 * PI * frequency / sample_rate;
        debug!(
            "Tone generator: {} Hz at {} Hz sample rate, amplitude {}",
            frequency, sample_rate, amplitude
        );
        Self {
            phase: 0.0,
            phase_delta,
            amplitude: amplitude.clamp(0.0, 1.0),
        }
    }

    pub fn fill(&mut self, out: &mut [i16]) {
        let scale = self.amplitude * i16::MAX as f64;
        for sample in out.iter_mut() {
            *sample = (scale * self.phase.sin()).round() as i16;
            self.phase += self.phase_delta;
            if self.phase >= 2.0 * PI {
                self.phase -= 2.0 * PI;
            }
        }
    }

    pub fn samples(&mut self, count: usize) -> Vec<i16> {
        let mut out = vec![0; count];
        self.fill(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunked_output_matches_single_block() {
        let mut whole = ToneGenerator::new(1000.0, 8000.0, 0.5);
        let expected = whole.samples(100);

        let mut chunked = ToneGenerator::new(1000.0, 8000.0, 0.5);
        let mut got = chunked.samples(37);
        got.extend(chunked.samples(63));
        assert_eq!(got, expected);
    }

    #[test]
    fn quarter_rate_tone_hits_peaks() {
        let mut tone = ToneGenerator::new(2000.0, 8000.0, 1.0);
        let s = tone.samples(4);
        assert_eq!(s[0], 0);
        assert_eq!(s[1], i16::MAX);
        assert_eq!(s[2], 0);
        assert_eq!(s[3], -i16::MAX);
    }
}

use std::f64::consts::PI;
use std::sync::Arc;

use log::{debug, error};
use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

use crate::error::{Result, SpectrogramError};

/// Symmetric Hamming window: `w(i) = 0.54 - 0.46 * cos(2*pi*i/(N-1))`.
///
/// Only the first half is evaluated; the rest is mirrored so `w(i) == w(N-1-i)` holds exactly.
pub fn hamming_window(len: usize) -> Vec<f64> {
    let mut window = vec![0.0; len];
    if len == 1 {
        window[0] = 1.0;
        return window;
    }
    if len == 0 {
        return window;
    }

    let m = len - 1;
    let half = (len + 1) / 2;
    for i in 0..half {
        let x = 2.0 * PI * i as f64 / m as f64;
        let w = 0.54 - 0.46 * x.cos();
        window[i] = w;
        window[m - i] = w;
    }
    window
}

/// Hamming-windowed real-to-complex magnitude analyzer for a fixed frame length.
///
/// The window, plan and all work buffers are built once in [`WindowedFft::new`];
/// [`WindowedFft::compute`] never allocates.
pub struct WindowedFft {
    fft_size: usize,
    window: Vec<f64>,
    plan: Arc<dyn RealToComplex<f64>>,
    input: Vec<f64>,
    output: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
    magnitudes: Vec<f64>,
}

impl WindowedFft {
    pub fn new(fft_size: usize) -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let plan = planner.plan_fft_forward(fft_size);
        let input = plan.make_input_vec();
        let output = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();
        debug!(
            "Planned forward FFT of {} samples ({} output bins)",
            fft_size,
            output.len()
        );

        Self {
            fft_size,
            window: hamming_window(fft_size),
            plan,
            input,
            output,
            scratch,
            magnitudes: vec![0.0; fft_size / 2],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn window(&self) -> &[f64] {
        &self.window
    }

    /// Magnitudes of bins `1..=N/2` for one frame; the DC bin is dropped.
    ///
    /// The returned slice is overwritten by the next call.
    pub fn compute(&mut self, frame: &[f64]) -> Result<&[f64]> {
        if frame.len() != self.fft_size {
            return Err(SpectrogramError::FrameLength {
                expected: self.fft_size,
                actual: frame.len(),
            });
        }

        for ((dst, &sample), &w) in self.input.iter_mut().zip(frame).zip(&self.window) {
            *dst = sample * w;
        }

        if let Err(e) = self
            .plan
            .process_with_scratch(&mut self.input, &mut self.output, &mut self.scratch)
        {
            error!("FFT computation error: {:?}", e);
            return Err(SpectrogramError::Fft(e.to_string()));
        }

        for (magnitude, c) in self.magnitudes.iter_mut().zip(&self.output[1..]) {
            *magnitude = (c.re * c.re + c.im * c.im).sqrt();
        }

        Ok(&self.magnitudes)
    }
}

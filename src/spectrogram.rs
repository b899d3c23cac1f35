use std::fmt;

use crossbeam_channel::Sender;
use log::{debug, info};
use rayon::prelude::*;

use crate::config::{validate_frequency_range, SpectrogramConfig};
use crate::error::{Result, SpectrogramError};
use crate::palette::{Palette, Rgb, PALETTE_SIZE};
use crate::utils::{bin_width, hertz_to_row, DB_FLOOR};

const SCALE_BACKGROUND: Rgb = Rgb::new(50, 50, 50);

/// Row-major RGB raster handed to the display layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbImage {
    width: usize,
    height: usize,
    pixels: Vec<Rgb>,
}

impl RgbImage {
    pub fn filled(width: usize, height: usize, color: Rgb) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel(&self, x: usize, y: usize) -> Rgb {
        self.pixels[y * self.width + x]
    }

    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }

    /// Packed `[r, g, b, r, g, b, ...]` bytes, row-major.
    pub fn to_rgb_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.pixels.len() * 3);
        for p in &self.pixels {
            bytes.extend_from_slice(&[p.r, p.g, p.b]);
        }
        bytes
    }
}

/// Notifications emitted while the row mapping is rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    Rescaling,
    Rescaled { height: usize },
}

impl StatusEvent {
    /// How long a status bar should keep the message; 0 means until replaced.
    pub fn display_millis(&self) -> u64 {
        match self {
            StatusEvent::Rescaling => 0,
            StatusEvent::Rescaled { .. } => 3000,
        }
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusEvent::Rescaling => write!(f, "Rescaling spectrogram..."),
            StatusEvent::Rescaled { .. } => write!(f, "Spectrogram rescaled"),
        }
    }
}

/// Running dB reference shared by every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationState {
    /// Largest row magnitude seen so far; never decreases.
    pub max: f64,
    /// Smoothed per-frame mean dBFS, `avg' = (frame_mean + avg) / 2`.
    pub average: f64,
}

impl Default for NormalizationState {
    fn default() -> Self {
        Self {
            max: f64::NEG_INFINITY,
            average: 0.0,
        }
    }
}

impl NormalizationState {
    pub fn dbfs(&self, magnitude: f64) -> f64 {
        if !(self.max > 0.0) || magnitude == 0.0 {
            return DB_FLOOR;
        }
        (10.0 * (magnitude.abs() / self.max).log10()).max(DB_FLOOR)
    }

    /// Palette index for `dbfs`, or `None` while the average is still zero.
    fn color_index(&self, dbfs: f64) -> Option<i64> {
        if !(self.average.abs() > f64::EPSILON) {
            return None;
        }
        let value = dbfs.min(0.0).max(self.average);
        Some(((value - self.average) / self.average.abs() * 255.0) as i64)
    }
}

/// One drawn column, stored top row first at the height it was drawn with.
#[derive(Debug, Clone, Default)]
struct HistoryColumn {
    indices: Vec<u8>,
    colors: Vec<Rgb>,
}

/// Ring of columns with a rotating write position; nothing is moved when a column is added.
struct ColumnHistory {
    columns: Vec<HistoryColumn>,
    head: usize,
    len: usize,
}

impl ColumnHistory {
    fn new(capacity: usize) -> Self {
        Self {
            columns: vec![HistoryColumn::default(); capacity],
            head: 0,
            len: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.columns.len()
    }

    fn push(&mut self, column: HistoryColumn) {
        self.columns[self.head] = column;
        self.head = (self.head + 1) % self.capacity(); // Wrap around
        self.len = (self.len + 1).min(self.capacity());
    }

    /// `age` 0 is the newest column.
    fn get(&self, age: usize) -> Option<&HistoryColumn> {
        if age >= self.len {
            return None;
        }
        let cap = self.capacity();
        Some(&self.columns[(self.head + cap - 1 - age) % cap])
    }
}

/// Rolling colour-mapped spectrogram of fixed width.
///
/// Each spectral frame is re-binned onto the current display height, converted to dBFS against
/// the running maximum, mapped through the palette and written as the rightmost column; older
/// columns move one step left and the oldest falls off.
pub struct SpectrogramBuffer {
    sample_rate: f64,
    fft_size: usize,
    frame_len: usize,
    display_width: usize,
    display_height: usize,
    pixel_height: usize,
    freq_from: u32,
    freq_to: u32,
    needs_rescale: bool,
    row_magnitudes: Vec<f64>,
    normalization: NormalizationState,
    palette: Palette,
    history: ColumnHistory,
    frames_drawn: u64,
    status_tx: Option<Sender<StatusEvent>>,
}

impl SpectrogramBuffer {
    pub fn new(config: &SpectrogramConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            sample_rate: config.sample_rate,
            fft_size: config.fft_size,
            frame_len: config.fft_size / 2,
            display_width: config.history_width,
            display_height: 0,
            pixel_height: 0,
            freq_from: config.freq_from,
            freq_to: config.freq_to,
            needs_rescale: true,
            row_magnitudes: Vec::new(),
            normalization: NormalizationState::default(),
            palette: Palette::new(),
            history: ColumnHistory::new(config.history_width),
            frames_drawn: 0,
            status_tx: None,
        })
    }

    pub fn set_status_sender(&mut self, tx: Sender<StatusEvent>) {
        self.status_tx = Some(tx);
    }

    pub fn history_width(&self) -> usize {
        self.history.capacity()
    }

    /// Columns drawn so far, at most `history_width`.
    pub fn len(&self) -> usize {
        self.history.len
    }

    pub fn is_empty(&self) -> bool {
        self.history.len == 0
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn pixel_height(&self) -> usize {
        self.pixel_height
    }

    pub fn display_size(&self) -> (usize, usize) {
        (self.display_width, self.display_height)
    }

    pub fn frequency_range(&self) -> (u32, u32) {
        (self.freq_from, self.freq_to)
    }

    pub fn needs_rescale(&self) -> bool {
        self.needs_rescale
    }

    pub fn normalization(&self) -> NormalizationState {
        self.normalization
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Re-binned magnitudes of the last frame, row 0 = lowest frequency.
    pub fn row_magnitudes(&self) -> &[f64] {
        &self.row_magnitudes
    }

    /// The display surface size; a height change forces a rebin on the next frame.
    pub fn set_display_size(&mut self, width: usize, height: usize) {
        self.display_width = width;
        self.display_height = height;
    }

    pub fn set_brightness(&mut self, brightness: i32) {
        self.palette.set_brightness(brightness);
    }

    pub fn set_contrast(&mut self, contrast: i32) -> Result<()> {
        self.palette.set_contrast(contrast)
    }

    pub fn set_frequency_range(&mut self, from: u32, to: u32) -> Result<()> {
        validate_frequency_range(from, to, self.sample_rate / 2.0)?;
        if self.freq_from != from || self.freq_to != to {
            info!("Frequency range set to {}..{} Hz", from, to);
            self.freq_from = from;
            self.freq_to = to;
            self.needs_rescale = true;
        }
        Ok(())
    }

    /// Image row (0 = top) that `hertz` is drawn on with the current mapping.
    pub fn row_for_frequency(&self, hertz: f64) -> Option<usize> {
        hertz_to_row(hertz, self.freq_from, self.freq_to, self.pixel_height)
            .map(|row| self.pixel_height - 1 - row)
    }

    /// Palette indices of a stored column, top row first; `age` 0 is the newest.
    pub fn column_indices(&self, age: usize) -> Option<&[u8]> {
        self.history.get(age).map(|c| c.indices.as_slice())
    }

    /// Ingests one spectral frame (bins `1..=N/2`) and scrolls it in as the newest column.
    pub fn push_spectrum(&mut self, spectrum: &[f64]) -> Result<()> {
        if spectrum.len() != self.frame_len {
            return Err(SpectrogramError::FrameLength {
                expected: self.frame_len,
                actual: spectrum.len(),
            });
        }

        if self.needs_rescale || self.pixel_height != self.display_height {
            self.rescale();
        }

        if self.pixel_height == 0 {
            debug!("Display height is 0, frame not drawn");
            return Ok(());
        }

        self.rebin(spectrum);
        let column = self.map_column();
        self.history.push(column);
        self.frames_drawn += 1;
        Ok(())
    }

    fn rescale(&mut self) {
        self.notify(StatusEvent::Rescaling);
        self.pixel_height = self.display_height;
        self.row_magnitudes = vec![0.0; self.pixel_height];
        self.notify(StatusEvent::Rescaled {
            height: self.pixel_height,
        });
        self.needs_rescale = false;
    }

    fn notify(&self, event: StatusEvent) {
        info!("{}", event);
        if let Some(tx) = &self.status_tx {
            if tx.send(event).is_err() {
                debug!("Status receiver dropped, event {:?} discarded", event);
            }
        }
    }

    /// Averages FFT bins into `pixel_height` rows; bin `b` sits at `b * df` Hz.
    fn rebin(&mut self, spectrum: &[f64]) {
        let df = bin_width(self.sample_rate, self.fft_size);
        let start = self.freq_from as f64 / df;
        let end = self.freq_to as f64 / df;
        let f = (end - start) / self.pixel_height as f64;

        for (k, row) in self.row_magnitudes.iter_mut().enumerate() {
            let lo = start + k as f64 * f;
            let hi = lo + f;
            let mut sum = 0.0;
            let mut n = 0usize;

            let mut bin = lo.floor() as usize;
            while (bin as f64) < hi {
                // Bin 0 (DC) is not part of the spectral frame.
                if bin >= 1 && bin <= self.frame_len && (bin as f64) < end {
                    sum += spectrum[bin - 1];
                    n += 1;
                }
                bin += 1;
            }

            *row = if n > 0 {
                sum / n as f64
            } else {
                // Only rows below bin 1 end up here; they reuse the nearest bin.
                let nearest = (lo.round() as usize).clamp(1, self.frame_len);
                spectrum[nearest - 1]
            };
        }
    }

    fn map_column(&mut self) -> HistoryColumn {
        let height = self.pixel_height;
        let mut column = HistoryColumn {
            indices: vec![0; height],
            colors: vec![Rgb::default(); height],
        };
        let mut db_sum = 0.0;

        for (k, &magnitude) in self.row_magnitudes.iter().enumerate() {
            if magnitude > self.normalization.max {
                self.normalization.max = magnitude;
            }
            let dbfs = self.normalization.dbfs(magnitude);
            db_sum += dbfs;

            let index = match self.normalization.color_index(dbfs) {
                Some(index) => {
                    let clamped = index.clamp(0, PALETTE_SIZE as i64 - 1);
                    if clamped != index {
                        debug!("Colour index {} clamped to {}", index, clamped);
                    }
                    clamped as u8
                }
                None => 0,
            };

            let y = height - 1 - k;
            column.indices[y] = index;
            column.colors[y] = self.palette.color(index);
        }

        let frame_mean = db_sum / height as f64;
        self.normalization.average = (frame_mean + self.normalization.average) / 2.0;
        column
    }

    /// The history resampled to `width` x `height`, oldest column on the left.
    ///
    /// Unfilled columns are black; each column is scaled from the height it was drawn at.
    pub fn render(&self, width: usize, height: usize) -> RgbImage {
        let mut image = RgbImage::filled(width, height, Rgb::default());
        if width == 0 || height == 0 {
            return image;
        }

        // Ages are measured from the right edge so the newest column always lands at x = width - 1.
        let capacity = self.history.capacity();
        let columns: Vec<Option<&HistoryColumn>> = (0..width)
            .map(|x| self.history.get((width - 1 - x) * capacity / width))
            .collect();

        image
            .pixels
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (pixel, column) in row.iter_mut().zip(&columns) {
                    if let Some(column) = column {
                        let h = column.colors.len();
                        if h > 0 {
                            *pixel = column.colors[y * h / height];
                        }
                    }
                }
            });
        image
    }

    /// Full-resolution history: `history_width` x current display height.
    pub fn history_image(&self) -> RgbImage {
        self.render(self.history.capacity(), self.display_height)
    }

    /// History scaled to the display surface.
    pub fn render_display(&self) -> RgbImage {
        self.render(self.display_width, self.display_height)
    }

    /// Vertical gradient of the adjusted palette, highest index at the top.
    pub fn palette_image(&self, width: usize, height: usize) -> RgbImage {
        let mut image = RgbImage::filled(width, height, Rgb::default());
        for y in 0..height {
            let s = (height - y) as f64 / height as f64;
            let color = self.palette.color_clamped((s * 255.0) as i64);
            for x in 0..width {
                image.pixels[y * width + x] = color;
            }
        }
        image
    }

    /// Background for the frequency scale; tick labels are drawn by the UI layer.
    pub fn frequency_scale_image(&self, width: usize, height: usize) -> RgbImage {
        RgbImage::filled(width, height, SCALE_BACKGROUND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn config() -> SpectrogramConfig {
        SpectrogramConfig {
            fft_size: 64,
            sample_rate: 6400.0,
            freq_from: 0,
            freq_to: 3200,
            history_width: 4,
            ..SpectrogramConfig::default()
        }
    }

    fn buffer(height: usize) -> SpectrogramBuffer {
        let mut buffer = SpectrogramBuffer::new(&config()).unwrap();
        buffer.set_display_size(4, height);
        buffer
    }

    /// Spectrum with a single strong bin over a flat floor.
    fn spectrum_with_peak(bin: usize) -> Vec<f64> {
        (1..=32)
            .map(|b| if b == bin { 1000.0 } else { 1.0 })
            .collect()
    }

    #[test]
    fn rebin_averages_bins_per_row() {
        // df = 100 Hz, 0..3200 Hz over 8 rows -> 4 bins per row, bin 0 skipped.
        let mut buf = buffer(8);
        let spectrum: Vec<f64> = (1..=32).map(|b| b as f64).collect();
        buf.push_spectrum(&spectrum).unwrap();
        let rows = buf.row_magnitudes();
        assert_eq!(rows.len(), 8);
        assert_eq!(rows[0], (1.0 + 2.0 + 3.0) / 3.0);
        assert_eq!(rows[1], (4.0 + 5.0 + 6.0 + 7.0) / 4.0);
        assert_eq!(rows[7], (28.0 + 29.0 + 30.0 + 31.0) / 4.0);
    }

    #[test]
    fn rebin_is_reproducible() {
        let spectrum: Vec<f64> = (0..32).map(|i| ((i * 37) % 11) as f64 * 0.37 + 0.1).collect();
        let run = || {
            let mut buf = buffer(13);
            buf.set_frequency_range(350, 2900).unwrap();
            buf.push_spectrum(&spectrum).unwrap();
            buf.row_magnitudes().iter().map(|m| m.to_bits()).collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn frequency_change_triggers_rescale_notifications() {
        let (tx, rx) = unbounded();
        let mut buf = buffer(8);
        buf.set_status_sender(tx);

        buf.push_spectrum(&spectrum_with_peak(5)).unwrap();
        assert_eq!(rx.try_recv().unwrap(), StatusEvent::Rescaling);
        assert_eq!(rx.try_recv().unwrap(), StatusEvent::Rescaled { height: 8 });

        buf.push_spectrum(&spectrum_with_peak(5)).unwrap();
        assert!(rx.try_recv().is_err());

        buf.set_frequency_range(0, 1600).unwrap();
        assert!(buf.needs_rescale());
        buf.push_spectrum(&spectrum_with_peak(5)).unwrap();
        assert!(!buf.needs_rescale());
        assert_eq!(rx.try_recv().unwrap(), StatusEvent::Rescaling);
        assert_eq!(rx.try_recv().unwrap(), StatusEvent::Rescaled { height: 8 });
        // 2 bins per row now
        assert_eq!(buf.row_magnitudes()[0], 1.0);
    }

    #[test]
    fn setting_same_range_does_not_rescale() {
        let mut buf = buffer(8);
        buf.push_spectrum(&spectrum_with_peak(5)).unwrap();
        buf.set_frequency_range(0, 3200).unwrap();
        assert!(!buf.needs_rescale());
        assert!(buf.set_frequency_range(3000, 1000).is_err());
        assert!(buf.set_frequency_range(0, 3201).is_err());
    }

    #[test]
    fn display_height_change_reallocates_rows() {
        let mut buf = buffer(8);
        buf.push_spectrum(&spectrum_with_peak(5)).unwrap();
        buf.set_display_size(4, 16);
        buf.push_spectrum(&spectrum_with_peak(5)).unwrap();
        assert_eq!(buf.pixel_height(), 16);
        assert_eq!(buf.row_magnitudes().len(), 16);
        assert_eq!(buf.column_indices(0).unwrap().len(), 16);
        assert_eq!(buf.column_indices(1).unwrap().len(), 8);
    }

    #[test]
    fn first_frame_is_drawn_with_index_zero() {
        let mut buf = buffer(8);
        buf.push_spectrum(&spectrum_with_peak(5)).unwrap();
        assert!(buf.column_indices(0).unwrap().iter().all(|&i| i == 0));
        let norm = buf.normalization();
        assert_eq!(norm.max, (1.0 + 1000.0 + 1.0 + 1.0) / 4.0);
        assert!(norm.average < 0.0);
    }

    #[test]
    fn loudest_row_gets_top_index_after_warmup() {
        let mut buf = buffer(8);
        for _ in 0..3 {
            buf.push_spectrum(&spectrum_with_peak(5)).unwrap();
        }
        // bin 5 (500 Hz) lands in row 1 -> image row 6
        assert_eq!(buf.row_for_frequency(500.0), Some(6));
        let column = buf.column_indices(0).unwrap();
        assert_eq!(column[6], 255);
        assert!(column.iter().enumerate().all(|(y, &i)| y == 6 || i < 255));
    }

    #[test]
    fn max_is_monotonic_and_silence_is_floored() {
        let mut buf = buffer(8);
        buf.push_spectrum(&spectrum_with_peak(5)).unwrap();
        let max = buf.normalization().max;
        buf.push_spectrum(&vec![0.0; 32]).unwrap();
        assert_eq!(buf.normalization().max, max);
        assert_eq!(buf.normalization().dbfs(0.0), DB_FLOOR);

        let silent = NormalizationState::default();
        assert_eq!(silent.dbfs(5.0), DB_FLOOR);
    }

    #[test]
    fn scroll_keeps_newest_on_the_right() {
        let mut buf = buffer(8);
        for bin in [5, 9, 13, 17, 21, 25] {
            buf.push_spectrum(&spectrum_with_peak(bin)).unwrap();
        }
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.frames_drawn(), 6);

        let image = buf.history_image();
        assert_eq!((image.width(), image.height()), (4, 8));
        for age in 0..4 {
            let indices = buf.column_indices(age).unwrap();
            let x = 3 - age;
            for (y, &index) in indices.iter().enumerate() {
                assert_eq!(image.pixel(x, y), buf.palette().color_clamped(index as i64));
            }
        }
        // newest column peaks at bin 25 -> row 6 -> image row 1
        assert_eq!(buf.column_indices(0).unwrap()[1], 255);
    }

    #[test]
    fn unfilled_history_renders_black() {
        let mut buf = buffer(8);
        buf.push_spectrum(&spectrum_with_peak(5)).unwrap();
        let image = buf.render(8, 16);
        assert_eq!((image.width(), image.height()), (8, 16));
        assert!((0..6).all(|x| image.pixel(x, 0) == Rgb::default()));
        assert_eq!(image.to_rgb_bytes().len(), 8 * 16 * 3);
    }

    #[test]
    fn rows_below_first_bin_reuse_it() {
        // 0..200 Hz over 8 rows is a quarter bin per row; the lowest rows hold only DC.
        let mut buf = buffer(8);
        buf.set_frequency_range(0, 200).unwrap();
        let spectrum: Vec<f64> = (1..=32).map(|b| b as f64 * 10.0).collect();
        buf.push_spectrum(&spectrum).unwrap();
        assert!(buf.row_magnitudes().iter().all(|&m| m == 10.0));
        assert_eq!(buf.normalization().average, 0.0);
    }

    #[test]
    fn narrow_render_keeps_newest_column_on_the_right() {
        let wide = SpectrogramConfig {
            history_width: 864,
            ..config()
        };
        let mut buf = SpectrogramBuffer::new(&wide).unwrap();
        buf.set_display_size(660, 8);
        buf.push_spectrum(&spectrum_with_peak(5)).unwrap();
        buf.push_spectrum(&spectrum_with_peak(25)).unwrap();

        let image = buf.render(660, 8);
        let newest = buf.column_indices(0).unwrap();
        for (y, &index) in newest.iter().enumerate() {
            assert_eq!(image.pixel(659, y), buf.palette().color(index));
        }
        assert_eq!(newest[1], 255);
        assert_eq!(image.pixel(0, 0), Rgb::default());
    }

    #[test]
    fn zero_height_skips_drawing() {
        let mut buf = buffer(0);
        buf.push_spectrum(&spectrum_with_peak(5)).unwrap();
        assert!(buf.is_empty());
        assert_eq!(buf.frames_drawn(), 0);
    }

    #[test]
    fn wrong_spectrum_length_is_rejected() {
        let mut buf = buffer(8);
        assert_eq!(
            buf.push_spectrum(&[1.0; 31]).unwrap_err(),
            SpectrogramError::FrameLength { expected: 32, actual: 31 }
        );
    }

    #[test]
    fn palette_image_runs_red_to_blue() {
        let buf = buffer(8);
        let image = buf.palette_image(3, 256);
        assert_eq!(image.pixel(0, 0), Rgb::new(255, 0, 0));
        assert_eq!(image.pixel(2, 255), buf.palette().color_clamped(0));
        let scale = buf.frequency_scale_image(2, 2);
        assert!(scale.pixels().iter().all(|&p| p == Rgb::new(50, 50, 50)));
    }
}

use log::warn;

use crate::error::{Result, SpectrogramError};

pub const PALETTE_SIZE: usize = 256;
const RAMP_STEP: i32 = 4;
const CONTRAST_MIN: i32 = -255;
const CONTRAST_MAX: i32 = 258;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// 256-entry blue -> cyan -> green -> yellow -> red ramp with brightness/contrast applied on lookup.
#[derive(Debug, Clone)]
pub struct Palette {
    colors: [Rgb; PALETTE_SIZE],
    brightness: i32,
    contrast: i32,
    contrast_factor: f64,
}

impl Default for Palette {
    fn default() -> Self {
        Self::new()
    }
}

impl Palette {
    pub fn new() -> Self {
        let mut colors = [Rgb::default(); PALETTE_SIZE];
        colors[0] = Rgb::new(0, 0, 255);
        colors[PALETTE_SIZE - 1] = Rgb::new(255, 0, 0);

        let mut i = 1;
        while i < PALETTE_SIZE - 1 {
            let prev = colors[i - 1];
            let (mut r, mut g, mut b) = (prev.r as i32, prev.g as i32, prev.b as i32);

            if r <= 0 && g < 255 && b >= 255 {
                g += RAMP_STEP;
            } else if r <= 0 && g >= 255 && b > 0 {
                b -= RAMP_STEP;
            } else if r < 255 && g >= 255 && b <= 0 {
                r += RAMP_STEP;
            } else if r >= 255 && g > 0 && b <= 0 {
                g -= RAMP_STEP;
            } else {
                break;
            }

            colors[i] = Rgb::new(clamp_channel(r), clamp_channel(g), clamp_channel(b));
            i += 1;
        }

        Self {
            colors,
            brightness: 0,
            contrast: 0,
            contrast_factor: 1.0,
        }
    }

    pub fn brightness(&self) -> i32 {
        self.brightness
    }

    pub fn contrast(&self) -> i32 {
        self.contrast
    }

    pub fn set_brightness(&mut self, brightness: i32) {
        self.brightness = brightness;
    }

    /// Stores `contrast` and recomputes `f = 259*(255+c) / (255*(259-c))`.
    pub fn set_contrast(&mut self, contrast: i32) -> Result<()> {
        if !(CONTRAST_MIN..=CONTRAST_MAX).contains(&contrast) {
            return Err(SpectrogramError::ContrastOutOfRange(contrast));
        }
        self.contrast = contrast;
        self.contrast_factor =
            (259.0 * (255.0 + contrast as f64)) / (255.0 * (259.0 - contrast as f64));
        Ok(())
    }

    /// Untransformed ramp entry.
    pub fn base_color(&self, index: u8) -> Rgb {
        self.colors[index as usize]
    }

    /// Ramp entry `index` with brightness and contrast applied.
    pub fn color(&self, index: u8) -> Rgb {
        self.adjust(self.colors[index as usize])
    }

    /// Like [`Palette::color`] for a computed index; anything outside `0..=255` is an error.
    pub fn get(&self, index: i64) -> Result<Rgb> {
        if !(0..PALETTE_SIZE as i64).contains(&index) {
            return Err(SpectrogramError::PaletteIndexOutOfRange(index));
        }
        Ok(self.color(index as u8))
    }

    /// Like [`Palette::get`] but clamps the index into `0..=255` first.
    pub fn color_clamped(&self, index: i64) -> Rgb {
        let clamped = index.clamp(0, PALETTE_SIZE as i64 - 1);
        if clamped != index {
            warn!("Palette index {} clamped to {}", index, clamped);
        }
        self.color(clamped as u8)
    }

    fn adjust(&self, color: Rgb) -> Rgb {
        let channel = |c: u8| {
            let v = c as i32 + self.brightness;
            let v = (self.contrast_factor * (v - 128) as f64 + 128.0) as i32;
            clamp_channel(v)
        };
        Rgb::new(channel(color.r), channel(color.g), channel(color.b))
    }
}

fn clamp_channel(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_starts_blue_and_ends_red() {
        let palette = Palette::new();
        assert_eq!(palette.get(0).unwrap(), Rgb::new(0, 0, 255));
        assert_eq!(palette.get(255).unwrap(), Rgb::new(255, 0, 0));
    }

    #[test]
    fn ramp_passes_through_cyan_green_yellow() {
        let palette = Palette::new();
        assert_eq!(palette.base_color(64), Rgb::new(0, 255, 255));
        assert_eq!(palette.base_color(128), Rgb::new(0, 255, 0));
        assert_eq!(palette.base_color(192), Rgb::new(255, 255, 0));
        assert_eq!(palette.base_color(254), Rgb::new(255, 7, 0));
    }

    #[test]
    fn neutral_controls_are_identity() {
        let palette = Palette::new();
        for i in 0..=255u8 {
            assert_eq!(palette.get(i as i64).unwrap(), palette.base_color(i));
        }
    }

    #[test]
    fn brightness_offsets_all_channels() {
        let mut palette = Palette::new();
        palette.set_brightness(100);
        assert_eq!(palette.get(0).unwrap(), Rgb::new(100, 100, 255));
        palette.set_brightness(-300);
        assert_eq!(palette.get(128).unwrap(), Rgb::new(0, 0, 0));
    }

    #[test]
    fn contrast_stretches_around_mid_grey() {
        let mut palette = Palette::new();
        palette.set_contrast(128).unwrap();
        // f = 259*383 / (255*131) ~= 2.9696
        assert_eq!(palette.get(0).unwrap(), Rgb::new(0, 0, 255));
        palette.set_contrast(-255).unwrap();
        assert_eq!(palette.get(0).unwrap(), Rgb::new(128, 128, 128));
    }

    #[test]
    fn contrast_rejects_singular_values() {
        let mut palette = Palette::new();
        assert_eq!(
            palette.set_contrast(259),
            Err(SpectrogramError::ContrastOutOfRange(259))
        );
        assert_eq!(palette.contrast(), 0);
    }

    #[test]
    fn out_of_range_index_is_error_or_clamped() {
        let palette = Palette::new();
        assert_eq!(palette.get(256), Err(SpectrogramError::PaletteIndexOutOfRange(256)));
        assert_eq!(palette.get(-1), Err(SpectrogramError::PaletteIndexOutOfRange(-1)));
        assert_eq!(palette.color_clamped(999), Rgb::new(255, 0, 0));
        assert_eq!(palette.color_clamped(-5), Rgb::new(0, 0, 255));
    }

    #[test]
    fn color_applies_controls_like_get() {
        let mut palette = Palette::new();
        palette.set_brightness(-30);
        palette.set_contrast(10).unwrap();
        for index in [0u8, 64, 128, 200, 255] {
            assert_eq!(palette.color(index), palette.get(index as i64).unwrap());
        }
        assert_ne!(palette.color(128), palette.base_color(128));
    }
}

//! CIE 1931 xy to sRGB conversion for color lights.
//!
//! Zigbee lights report color as xy chromaticity; the host model speaks
//! `#rrggbb`. Colors are rendered at full luminance since brightness is a
//! property of its own.

/// 8-bit sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb` (the leading `#` is optional).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

fn gamma_compress(v: f64) -> f64 {
    if v <= 0.0031308 {
        12.92 * v
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

/// Convert xy chromaticity to sRGB at full luminance.
///
/// Returns `None` for coordinates outside the valid range.
pub fn xy_to_rgb(x: f64, y: f64) -> Option<Rgb> {
    if !(0.0..=1.0).contains(&x) || !(0.0..=1.0).contains(&y) || y == 0.0 {
        return None;
    }

    let luminance = 1.0;
    let z = 1.0 - x - y;
    let big_x = (luminance / y) * x;
    let big_z = (luminance / y) * z;

    let r = big_x * 1.656492 - luminance * 0.354851 - big_z * 0.255038;
    let g = -big_x * 0.707196 + luminance * 1.655397 + big_z * 0.036152;
    let b = big_x * 0.051713 - luminance * 0.121364 + big_z * 1.011530;

    let mut channels = [r, g, b].map(|c| gamma_compress(c.max(0.0)));
    let max = channels.iter().cloned().fold(0.0_f64, f64::max);
    if max > 1.0 {
        channels = channels.map(|c| c / max);
    }

    let [r, g, b] = channels.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
    Some(Rgb::new(r, g, b))
}

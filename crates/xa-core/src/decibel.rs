//! XACT decibel coding
//!
//! Bank content stores most volumes as a single byte on a curved decibel
//! scale (0 = -96 dB, ~180 = 0 dB, 255 = ~+6 dB). Everything downstream
//! works in linear gain.

use std::sync::LazyLock;

// Fit constants for the byte → dB curve.
const CURVE_A: f64 = -96.0;
const CURVE_B: f64 = 0.432254984608615;
const CURVE_C: f64 = 80.1748600297963;
const CURVE_D: f64 = 67.7385212334047;

/// Byte → linear volume, precomputed for every byte value.
static VOLUME_TABLE: LazyLock<[f32; 256]> = LazyLock::new(|| {
    let mut table = [0.0f32; 256];
    for (byte, slot) in table.iter_mut().enumerate() {
        *slot = volume_from_decibels(parse_decibels(byte as u8));
    }
    table
});

/// Decode an XACT decibel byte into decibels.
#[inline]
pub fn parse_decibels(binary_value: u8) -> f32 {
    let ratio = (binary_value as f64 / CURVE_C).powf(CURVE_B);
    (((CURVE_A - CURVE_D) / (1.0 + ratio)) + CURVE_D) as f32
}

/// Convert decibels to linear volume.
#[inline]
pub fn volume_from_decibels(decibels: f32) -> f32 {
    10.0_f64.powf(decibels as f64 / 20.0) as f32
}

/// Decode an XACT decibel byte straight to linear volume (table lookup).
#[inline]
pub fn volume_from_byte(binary_value: u8) -> f32 {
    VOLUME_TABLE[binary_value as usize]
}

//! Voice and Sound Bank Seams
//!
//! Clips never touch an audio device. A `SoundBank` hands out `Voice`s
//! (one playing sound-effect instance each) for a wave bank / track pair,
//! and play-wave events drive those voices.

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// VOICE STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Playback state of a single voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum VoiceState {
    #[default]
    Stopped = 0,
    Playing = 1,
    Paused = 2,
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILTER MODE
// ═══════════════════════════════════════════════════════════════════════════════

/// Clip filter type (2-bit field in the clip header)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum FilterMode {
    #[default]
    LowPass = 0,
    BandPass = 1,
    HighPass = 2,
    Notch = 3,
}

impl FilterMode {
    /// Decode from the low two bits of `bits`
    #[inline]
    pub fn from_bits(bits: u16) -> Self {
        match bits & 0x3 {
            0 => FilterMode::LowPass,
            1 => FilterMode::BandPass,
            2 => FilterMode::HighPass,
            _ => FilterMode::Notch,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FilterMode::LowPass => "LowPass",
            FilterMode::BandPass => "BandPass",
            FilterMode::HighPass => "HighPass",
            FilterMode::Notch => "Notch",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRAITS
// ═══════════════════════════════════════════════════════════════════════════════

/// One playing sound-effect instance.
///
/// Dropping the box releases the voice back to its owner.
pub trait Voice: Send {
    fn play(&mut self);
    fn stop(&mut self);
    fn pause(&mut self);
    fn resume(&mut self);
    fn state(&self) -> VoiceState;

    fn set_volume(&mut self, volume: f32);
    fn set_pitch(&mut self, pitch: f32);
    fn set_pan(&mut self, pan: f32);
    fn set_looped(&mut self, looped: bool);

    /// Only called for clips that route through reverb.
    fn set_reverb_mix(&mut self, _mix: f32) {}

    /// Only called for clips with the filter enabled.
    fn set_filter(&mut self, _mode: FilterMode, _q: f32, _frequency: f32) {}
}

/// Resolves wave bank / track indices into voices.
///
/// Under an `AudioService`, `create_voice` and every `Voice` method run
/// while the service holds its clip lock. Implementations must not call
/// back into the same `AudioService` from there: the lock is not reentrant
/// and the call deadlocks.
pub trait SoundBank: Send + Sync {
    /// `None` when no voice can be created (pool exhausted, missing wave).
    fn create_voice(&self, wave_bank: u8, track: u16) -> Option<Box<dyn Voice>>;
}

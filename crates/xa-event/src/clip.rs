//! XACT Clip
//!
//! A clip is a header (volume, filter) plus a table of timestamped events.
//! `ClipDefinition` is the parsed, audio-free form; `XactClip` binds it to
//! a sound bank and runs the playback state machine:
//!
//! ```text
//! Stopped ──play──▶ Playing ──pause──▶ Paused
//!    ▲                 │  ◀──resume──
//!    └──stop / done────┘
//! ```

use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use xa_core::{ReadLe, XactResult, parse_decibels, volume_from_decibels};

use crate::curve::ClipParameters;
use crate::event::{ClipCommand, ClipContext, ClipEvent, EventDefinition, EventKind};
use crate::play_wave::PlayWaveEvent;
use crate::voice::{FilterMode, SoundBank};
use crate::volume::VolumeEvent;

// ═══════════════════════════════════════════════════════════════════════════════
// CLIP FILTER
// ═══════════════════════════════════════════════════════════════════════════════

/// Filter Q is stored in hundredths
pub const FILTER_Q_SCALE: f32 = 0.01;

/// Clip-wide filter settings
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClipFilter {
    pub enabled: bool,
    pub mode: FilterMode,
    pub q: f32,
    pub frequency: f32,
    /// Upper byte of the filter word, meaning unknown
    pub reserved: u16,
}

impl ClipFilter {
    /// Decode the packed filter word and frequency
    pub fn from_word(word: u16, frequency: u16) -> Self {
        Self {
            enabled: word & 0x1 != 0,
            mode: FilterMode::from_bits(word >> 1),
            q: ((word >> 3) & 0x1F) as f32 * FILTER_Q_SCALE,
            frequency: frequency as f32,
            reserved: word >> 8,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLIP DEFINITION
// ═══════════════════════════════════════════════════════════════════════════════

/// Parsed clip, independent of any sound bank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipDefinition {
    /// Raw decibel-coded volume byte
    pub volume_byte: u8,
    pub decibels: f32,
    /// Linear volume restored on every `play`
    pub default_volume: f32,
    /// Absolute offset of the event table in the source
    pub event_table_offset: u32,
    pub filter: ClipFilter,
    pub events: Vec<EventDefinition>,
}

impl ClipDefinition {
    /// Parse a clip from a reader positioned at its metadata.
    ///
    /// The event table lives elsewhere in the file; the reader is left just
    /// past the metadata once the table has been read.
    pub fn read_from<R: Read + Seek>(reader: &mut R) -> XactResult<Self> {
        let volume_byte = reader.read_u8()?;
        let decibels = parse_decibels(volume_byte);
        let event_table_offset = reader.read_u32_le()?;
        let filter_word = reader.read_u16_le()?;
        let filter_frequency = reader.read_u16_le()?;
        let filter = ClipFilter::from_word(filter_word, filter_frequency);

        let resume_at = reader.stream_position()?;
        reader.seek(SeekFrom::Start(event_table_offset as u64))?;

        let event_count = reader.read_u8()?;
        let mut events = Vec::with_capacity(event_count as usize);
        for _ in 0..event_count {
            events.push(EventDefinition::read_from(reader, volume_byte)?);
        }

        reader.seek(SeekFrom::Start(resume_at))?;

        debug!(
            "Parsed clip: {:.1} dB, {} events at {:#x}, filter {} ({})",
            decibels,
            events.len(),
            event_table_offset,
            if filter.enabled { "on" } else { "off" },
            filter.mode.name()
        );
        if filter.reserved != 0 {
            debug!("Clip filter word carries reserved bits {:#x}", filter.reserved);
        }

        Ok(Self {
            volume_byte,
            decibels,
            default_volume: volume_from_decibels(decibels),
            event_table_offset,
            filter,
            events,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLIP STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Clip playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ClipState {
    #[default]
    Stopped = 0,
    Playing = 1,
    Paused = 2,
}

impl ClipState {
    pub fn name(&self) -> &'static str {
        match self {
            ClipState::Stopped => "Stopped",
            ClipState::Playing => "Playing",
            ClipState::Paused => "Paused",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// XACT CLIP
// ═══════════════════════════════════════════════════════════════════════════════

/// Runtime clip
pub struct XactClip {
    /// Sorted by timestamp, fixed after construction
    events: Vec<ClipEvent>,
    ctx: ClipContext,
    default_volume: f32,
    volume: f32,
    volume_scale: f32,
    state: ClipState,
    elapsed: f32,
    /// Index of the first unfired event
    next_event: usize,
}

impl XactClip {
    pub fn new(definition: ClipDefinition, sound_bank: Arc<dyn SoundBank>, use_reverb: bool) -> Self {
        let mut events: Vec<ClipEvent> = definition
            .events
            .into_iter()
            .map(|event| match event.kind {
                EventKind::PlayWave(def) => {
                    ClipEvent::PlayWave(PlayWaveEvent::new(event.header, def, sound_bank.clone()))
                }
                EventKind::Volume(def) => ClipEvent::Volume(VolumeEvent::new(event.header, &def)),
            })
            .collect();
        if !events.is_sorted_by(|a, b| a.timestamp() <= b.timestamp()) {
            debug!("Clip event table out of timestamp order, sorting {} events", events.len());
            events.sort_by(|a, b| a.timestamp().total_cmp(&b.timestamp()));
        }

        Self {
            events,
            ctx: ClipContext {
                filter: definition.filter,
                use_reverb,
            },
            default_volume: definition.default_volume,
            volume: definition.default_volume,
            volume_scale: 1.0,
            state: ClipState::Stopped,
            elapsed: 0.0,
            next_event: 0,
        }
    }

    /// Parse and bind in one step
    pub fn from_reader<R: Read + Seek>(
        reader: &mut R,
        sound_bank: Arc<dyn SoundBank>,
        use_reverb: bool,
    ) -> XactResult<Self> {
        Ok(Self::new(ClipDefinition::read_from(reader)?, sound_bank, use_reverb))
    }

    // === Queries ===

    pub fn state(&self) -> ClipState {
        self.state
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.state == ClipState::Playing
    }

    /// Seconds since `play`
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn next_event(&self) -> usize {
        self.next_event
    }

    /// Events in firing order. This is the table order stably sorted by
    /// timestamp, so it differs from `ClipDefinition::events` when the table
    /// was out of order.
    pub fn events(&self) -> &[ClipEvent] {
        &self.events
    }

    pub fn default_volume(&self) -> f32 {
        self.default_volume
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn volume_scale(&self) -> f32 {
        self.volume_scale
    }

    /// Volume pushed to events
    #[inline]
    pub fn effective_volume(&self) -> f32 {
        self.volume * self.volume_scale
    }

    pub fn filter(&self) -> &ClipFilter {
        &self.ctx.filter
    }

    pub fn use_reverb(&self) -> bool {
        self.ctx.use_reverb
    }

    /// Some voice is still fading out after `stop`
    pub fn is_releasing(&self) -> bool {
        self.events.iter().any(ClipEvent::is_releasing)
    }

    // === Playback ===

    /// Restart from the top. Zero-timestamp events fire immediately.
    pub fn play(&mut self) {
        for event in &mut self.events {
            event.halt();
        }

        self.elapsed = 0.0;
        self.next_event = 0;
        self.set_volume(self.default_volume);
        self.state = ClipState::Playing;
        self.update(0.0);
    }

    /// Advance by `dt` seconds. Returns true while still playing.
    ///
    /// A stopped clip only advances the fade-outs left by `stop`.
    pub fn update(&mut self, dt: f32) -> bool {
        if self.state != ClipState::Playing {
            if self.state == ClipState::Stopped {
                self.update_releases(dt);
            }
            return false;
        }

        self.elapsed += dt;

        while self.next_event < self.events.len() && self.events[self.next_event].timestamp() <= self.elapsed {
            let ctx = self.ctx;
            let index = self.next_event;
            self.next_event += 1;

            trace!("Fire clip event {} at {:.3}s", index, self.elapsed);
            if let Some(ClipCommand::SetVolume(volume)) = self.events[index].play(&ctx) {
                self.set_volume(volume);
            }
        }

        let ctx = self.ctx;
        let mut any_active = false;
        for event in &mut self.events[..self.next_event] {
            any_active |= event.update(dt, &ctx);
        }

        if !any_active && self.next_event >= self.events.len() {
            trace!("Clip finished after {:.3}s", self.elapsed);
            self.state = ClipState::Stopped;
        }

        self.is_playing()
    }

    fn update_releases(&mut self, dt: f32) {
        let ctx = self.ctx;
        for event in self.events.iter_mut().filter(|e| e.is_releasing()) {
            event.update(dt, &ctx);
        }
    }

    pub fn pause(&mut self) {
        if self.state != ClipState::Playing {
            return;
        }
        for event in &mut self.events {
            event.pause();
        }
        self.state = ClipState::Paused;
    }

    pub fn resume(&mut self) {
        if self.state != ClipState::Paused {
            return;
        }
        for event in &mut self.events {
            event.resume();
        }
        self.state = ClipState::Playing;
    }

    /// The clip is Stopped on return. Voices with a fade-out keep ramping
    /// down through later `update` calls.
    pub fn stop(&mut self) {
        for event in &mut self.events {
            event.stop();
        }
        self.state = ClipState::Stopped;
    }

    // === Parameters ===

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        self.update_volumes();
    }

    pub fn set_volume_scale(&mut self, scale: f32) {
        self.volume_scale = scale;
        self.update_volumes();
    }

    fn update_volumes(&mut self) {
        let volume = self.effective_volume();
        for event in &mut self.events {
            event.set_track_volume(volume);
        }
    }

    pub fn set_pan(&mut self, pan: f32) {
        for event in &mut self.events {
            event.set_track_pan(pan);
        }
    }

    /// Push RPC-driven parameters. `params.volume` becomes the volume scale.
    pub fn update_state(&mut self, params: &ClipParameters) {
        self.volume_scale = params.volume;
        let track_volume = self.effective_volume();
        let ctx = self.ctx;
        for event in &mut self.events {
            event.set_state(track_volume, params, &ctx);
        }
    }

    pub fn set_fade(&mut self, fade_in_secs: f32, fade_out_secs: f32) {
        for event in &mut self.events {
            event.set_fade(fade_in_secs, fade_out_secs);
        }
    }

    /// Reseed variation RNGs. Event `i` of [`XactClip::events`] gets `seed + i`.
    pub fn seed(&mut self, seed: u64) {
        for (i, event) in self.events.iter_mut().enumerate() {
            event.seed(seed.wrapping_add(i as u64));
        }
    }
}

impl std::fmt::Debug for XactClip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XactClip")
            .field("state", &self.state)
            .field("elapsed", &self.elapsed)
            .field("next_event", &self.next_event)
            .field("events", &self.events.len())
            .field("volume", &self.volume)
            .field("volume_scale", &self.volume_scale)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

//! Clip Event Definitions
//!
//! A clip's event table is a count byte followed by packed records. Every
//! record starts with the same header (id, timestamp, random offset); the
//! rest of its layout is looked up by id in [`EVENT_RECORDS`], so adding or
//! rejecting an event id is a one-line table change.

use std::io::Read;

use log::debug;
use serde::{Deserialize, Serialize};
use xa_core::{MS_TO_SECS, ReadLe, XactError, XactResult, parse_decibels, volume_from_byte, volume_from_decibels};

use crate::clip::ClipFilter;
use crate::curve::ClipParameters;
use crate::play_wave::PlayWaveEvent;
use crate::volume::VolumeEvent;

// ═══════════════════════════════════════════════════════════════════════════════
// RECORD TABLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Pan angle / arc are stored in hundredths of a degree
pub const PAN_SCALE: f32 = 0.01;
/// Pitch ranges are stored in thousandths
pub const PITCH_SCALE: f32 = 0.001;
/// Filter frequency ranges are stored ×1000
pub const FREQUENCY_SCALE: f32 = 0.001;
/// Volume event decibels are stored ×100
pub const VOLUME_DB_SCALE: f32 = 0.01;

/// Where the track list of a play-wave record comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackLayout {
    /// `u16` track + `u8` wave bank, before the loop count
    Single,
    /// Weighted playlist after everything else
    Variations,
}

/// Layout of a play-wave record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveLayout {
    pub tracks: TrackLayout,
    /// Pitch / volume / filter variation block present
    pub ranges: bool,
}

/// Record shape for one event id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordShape {
    PlayWave(WaveLayout),
    Volume,
    /// Recognized, but playback is not supported
    Unimplemented(&'static str),
}

/// Every event id this runtime recognizes. Anything else is a fatal parse error.
pub const EVENT_RECORDS: &[(u8, RecordShape)] = &[
    (0, RecordShape::Unimplemented("stop")),
    (
        1,
        RecordShape::PlayWave(WaveLayout { tracks: TrackLayout::Single, ranges: false }),
    ),
    (
        3,
        RecordShape::PlayWave(WaveLayout { tracks: TrackLayout::Variations, ranges: false }),
    ),
    (
        4,
        RecordShape::PlayWave(WaveLayout { tracks: TrackLayout::Single, ranges: true }),
    ),
    (
        6,
        RecordShape::PlayWave(WaveLayout { tracks: TrackLayout::Variations, ranges: true }),
    ),
    (7, RecordShape::Unimplemented("pitch")),
    (8, RecordShape::Volume),
    (9, RecordShape::Unimplemented("marker")),
    (17, RecordShape::Unimplemented("volume repeat")),
];

/// Look up the record shape for an event id
pub fn record_shape(id: u8) -> Option<RecordShape> {
    EVENT_RECORDS
        .iter()
        .find(|(record_id, _)| *record_id == id)
        .map(|(_, shape)| *shape)
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT HEADER
// ═══════════════════════════════════════════════════════════════════════════════

/// Common event record header
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventHeader {
    /// Event id (5 bits)
    pub id: u8,
    /// Seconds from clip start
    pub timestamp: f32,
    /// Random start-offset jitter in seconds
    pub random_offset: f32,
    /// Upper 11 header bits, meaning unknown
    pub reserved: u16,
}

impl EventHeader {
    /// Unpack a 32-bit event info word and the random offset
    pub fn decode(info: u32, random_offset_ms: u16) -> Self {
        Self {
            id: (info & 0x1F) as u8,
            timestamp: ((info >> 5) & 0xFFFF) as f32 * MS_TO_SECS,
            random_offset: random_offset_ms as f32 * MS_TO_SECS,
            reserved: (info >> 21) as u16,
        }
    }

    pub fn read_from<R: Read>(reader: &mut R) -> XactResult<Self> {
        let info = reader.read_u32_le()?;
        let random_offset_ms = reader.read_u16_le()?;
        Ok(Self::decode(info, random_offset_ms))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PLAY WAVE DEFINITION
// ═══════════════════════════════════════════════════════════════════════════════

/// How a play-wave event picks among its tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum VariationType {
    #[default]
    Ordered = 0,
    OrderedFromRandom = 1,
    /// Weighted random
    Random = 2,
    /// Weighted random, never the same track twice in a row
    RandomNoImmediateRepeats = 3,
    /// Every track once before any repeats
    Shuffle = 4,
}

impl VariationType {
    pub fn from_index(index: u8) -> XactResult<Self> {
        match index {
            0 => Ok(VariationType::Ordered),
            1 => Ok(VariationType::OrderedFromRandom),
            2 => Ok(VariationType::Random),
            3 => Ok(VariationType::RandomNoImmediateRepeats),
            4 => Ok(VariationType::Shuffle),
            other => Err(XactError::InvalidVariation(other)),
        }
    }
}

/// One playable track of a play-wave event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveTrack {
    pub wave_bank: u8,
    pub track: u16,
    /// Selection weight (`max - min` from the record, 0 for single tracks)
    pub weight: u8,
}

/// Play-wave record flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WaveFlags {
    pub play_release: bool,
    pub pan_enabled: bool,
    pub use_center_speaker: bool,
}

impl WaveFlags {
    fn from_byte(flags: u8) -> Self {
        Self {
            play_release: flags & 0x01 != 0,
            pan_enabled: flags & 0x02 != 0,
            use_center_speaker: flags & 0x04 != 0,
        }
    }
}

/// Randomization range stored as `(min, max - min)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariationRange {
    pub min: f32,
    pub span: f32,
}

impl VariationRange {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, span: max - min }
    }

    /// Value at `t` in `[0, 1)`
    #[inline]
    pub fn sample(&self, t: f32) -> f32 {
        self.min + t * self.span
    }

    pub fn max(&self) -> f32 {
        self.min + self.span
    }
}

/// Filter frequency and Q randomization
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterVariation {
    pub frequency: VariationRange,
    pub q: VariationRange,
}

/// Parsed play-wave record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayWaveDefinition {
    pub flags: WaveFlags,
    pub tracks: Vec<WaveTrack>,
    pub variation: VariationType,
    /// 0 = play once, 255 = loop forever
    pub loop_count: u8,
    pub new_wave_on_loop: bool,
    pub pan_angle: f32,
    pub pan_arc: f32,
    pub pitch_variation: Option<VariationRange>,
    pub volume_variation: Option<VariationRange>,
    pub filter_variation: Option<FilterVariation>,
    /// Bytes the format carries but this runtime does not interpret, in read order
    pub unknown: Vec<u8>,
}

impl PlayWaveDefinition {
    /// Sum of track weights
    pub fn total_weight(&self) -> u32 {
        self.tracks.iter().map(|t| t.weight as u32).sum()
    }

    /// Loops forever on a single track (voice-level looping)
    pub fn is_infinite_single(&self) -> bool {
        self.loop_count == INFINITE_LOOP && self.tracks.len() == 1
    }

    fn read_from<R: Read>(reader: &mut R, layout: WaveLayout, header: &EventHeader) -> XactResult<Self> {
        let mut unknown = Vec::new();

        unknown.push(reader.read_u8()?);
        let flags = WaveFlags::from_byte(reader.read_u8()?);

        let mut tracks = Vec::new();
        if layout.tracks == TrackLayout::Single {
            let track = reader.read_u16_le()?;
            let wave_bank = reader.read_u8()?;
            tracks.push(WaveTrack { wave_bank, track, weight: 0 });
        }

        let loop_count = reader.read_u8()?;
        let pan_angle = reader.read_u16_le()? as f32 * PAN_SCALE;
        let pan_arc = reader.read_u16_le()? as f32 * PAN_SCALE;

        let mut pitch_variation = None;
        let mut volume_variation = None;
        let mut filter_variation = None;
        if layout.ranges {
            let min_pitch = reader.read_i16_le()? as f32 * PITCH_SCALE;
            let max_pitch = reader.read_i16_le()? as f32 * PITCH_SCALE;
            let min_volume = volume_from_byte(reader.read_u8()?);
            let max_volume = volume_from_byte(reader.read_u8()?);
            let min_frequency = reader.read_f32_le()? * FREQUENCY_SCALE;
            let max_frequency = reader.read_f32_le()? * FREQUENCY_SCALE;
            let min_q = reader.read_f32_le()?;
            let max_q = reader.read_f32_le()?;
            unknown.push(reader.read_u8()?);
            let variation_flags = reader.read_u8()?;

            if variation_flags & 0x10 != 0 {
                pitch_variation = Some(VariationRange::new(min_pitch, max_pitch));
            }
            if variation_flags & 0x20 != 0 {
                volume_variation = Some(VariationRange::new(min_volume, max_volume));
            }
            if variation_flags & 0x40 != 0 {
                filter_variation = Some(FilterVariation {
                    frequency: VariationRange::new(min_frequency, max_frequency),
                    q: VariationRange::new(min_q, max_q),
                });
            }
        }

        let mut variation = VariationType::Ordered;
        let mut new_wave_on_loop = false;
        if layout.tracks == TrackLayout::Variations {
            let track_count = reader.read_u16_le()?;
            let more_flags = reader.read_u8()?;
            new_wave_on_loop = more_flags & 0x40 != 0;
            variation = VariationType::from_index(more_flags & 0x0F)?;
            unknown.extend_from_slice(&reader.read_array::<5>()?);

            tracks.reserve(track_count as usize);
            for _ in 0..track_count {
                let track = reader.read_u16_le()?;
                let wave_bank = reader.read_u8()?;
                let min_weight = reader.read_u8()?;
                let max_weight = reader.read_u8()?;
                if min_weight > max_weight {
                    debug!(
                        "Track {} weight range {}..{} is inverted, using weight 0",
                        track, min_weight, max_weight
                    );
                }
                tracks.push(WaveTrack {
                    wave_bank,
                    track,
                    weight: max_weight.saturating_sub(min_weight),
                });
            }
        }

        if tracks.is_empty() {
            return Err(XactError::EmptyTrackList { timestamp: header.timestamp });
        }

        Ok(Self {
            flags,
            tracks,
            variation,
            loop_count,
            new_wave_on_loop,
            pan_angle,
            pan_arc,
            pitch_variation,
            volume_variation,
            filter_variation,
            unknown,
        })
    }
}

/// Loop count meaning "forever"
pub const INFINITE_LOOP: u8 = 255;

// ═══════════════════════════════════════════════════════════════════════════════
// VOLUME DEFINITION
// ═══════════════════════════════════════════════════════════════════════════════

/// Parsed volume record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeDefinition {
    /// Decibels are added to the clip volume rather than replacing it
    pub additive: bool,
    /// Decibels as stored in the record
    pub decibels: f32,
    /// Resolved linear volume
    pub volume: f32,
    pub unknown: Vec<u8>,
}

impl VolumeDefinition {
    fn read_from<R: Read>(reader: &mut R, clip_decibels: f32) -> XactResult<Self> {
        let mut unknown = reader.read_array::<2>()?.to_vec();
        let flags = reader.read_u8()?;
        let additive = flags & 0x01 != 0;

        let decibels = reader.read_f32_le()? * VOLUME_DB_SCALE;
        let base = if additive { clip_decibels } else { 0.0 };
        let volume = volume_from_decibels(decibels + base);

        unknown.extend_from_slice(&reader.read_array::<9>()?);

        Ok(Self {
            additive,
            decibels,
            volume,
            unknown,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT DEFINITION
// ═══════════════════════════════════════════════════════════════════════════════

/// Record body by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    PlayWave(PlayWaveDefinition),
    Volume(VolumeDefinition),
}

/// One parsed clip event: header plus record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDefinition {
    pub header: EventHeader,
    pub kind: EventKind,
}

impl EventDefinition {
    /// Read one event record. `clip_volume_byte` is the owning clip's
    /// volume, needed by additive volume records.
    pub fn read_from<R: Read>(reader: &mut R, clip_volume_byte: u8) -> XactResult<Self> {
        let header = EventHeader::read_from(reader)?;

        let shape = record_shape(header.id).ok_or(XactError::UnknownEvent { id: header.id })?;

        let kind = match shape {
            RecordShape::PlayWave(layout) => {
                EventKind::PlayWave(PlayWaveDefinition::read_from(reader, layout, &header)?)
            }
            RecordShape::Volume => {
                EventKind::Volume(VolumeDefinition::read_from(reader, parse_decibels(clip_volume_byte))?)
            }
            RecordShape::Unimplemented(kind) => {
                return Err(XactError::UnimplementedEvent { id: header.id, kind });
            }
        };

        let definition = Self { header, kind };
        if definition.has_unknown_data() {
            debug!(
                "Clip event id {} at {:.3}s carries uninterpreted data (reserved={:#x}, unknown={:?})",
                header.id,
                header.timestamp,
                header.reserved,
                definition.unknown_bytes()
            );
        }
        Ok(definition)
    }

    pub fn timestamp(&self) -> f32 {
        self.header.timestamp
    }

    /// Uninterpreted record bytes
    pub fn unknown_bytes(&self) -> &[u8] {
        match &self.kind {
            EventKind::PlayWave(def) => &def.unknown,
            EventKind::Volume(def) => &def.unknown,
        }
    }

    /// Reserved header bits or unknown record bytes are nonzero
    pub fn has_unknown_data(&self) -> bool {
        self.header.reserved != 0 || self.unknown_bytes().iter().any(|&b| b != 0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RUNTIME EVENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Clip-level settings events read while playing
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClipContext {
    pub filter: ClipFilter,
    pub use_reverb: bool,
}

/// Request from an event back to its clip
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClipCommand {
    SetVolume(f32),
}

/// Runtime clip event
pub enum ClipEvent {
    PlayWave(PlayWaveEvent),
    Volume(VolumeEvent),
}

impl ClipEvent {
    pub fn header(&self) -> &EventHeader {
        match self {
            ClipEvent::PlayWave(evt) => evt.header(),
            ClipEvent::Volume(evt) => evt.header(),
        }
    }

    #[inline]
    pub fn timestamp(&self) -> f32 {
        self.header().timestamp
    }

    #[inline]
    pub fn random_offset(&self) -> f32 {
        self.header().random_offset
    }

    /// Fire the event. May ask the clip to do something in return.
    pub fn play(&mut self, ctx: &ClipContext) -> Option<ClipCommand> {
        match self {
            ClipEvent::PlayWave(evt) => {
                evt.play(ctx);
                None
            }
            ClipEvent::Volume(evt) => Some(evt.play()),
        }
    }

    /// Advance a fired event. Returns true while it is still active.
    pub fn update(&mut self, dt: f32, ctx: &ClipContext) -> bool {
        match self {
            ClipEvent::PlayWave(evt) => evt.update(dt, ctx),
            ClipEvent::Volume(_) => false,
        }
    }

    pub fn stop(&mut self) {
        if let ClipEvent::PlayWave(evt) = self {
            evt.stop();
        }
    }

    /// Stop without a fade-out
    pub fn halt(&mut self) {
        if let ClipEvent::PlayWave(evt) = self {
            evt.halt();
        }
    }

    pub fn pause(&mut self) {
        if let ClipEvent::PlayWave(evt) = self {
            evt.pause();
        }
    }

    pub fn resume(&mut self) {
        if let ClipEvent::PlayWave(evt) = self {
            evt.resume();
        }
    }

    pub fn set_track_volume(&mut self, volume: f32) {
        if let ClipEvent::PlayWave(evt) = self {
            evt.set_track_volume(volume);
        }
    }

    pub fn set_track_pan(&mut self, pan: f32) {
        if let ClipEvent::PlayWave(evt) = self {
            evt.set_track_pan(pan);
        }
    }

    pub fn set_state(&mut self, track_volume: f32, params: &ClipParameters, ctx: &ClipContext) {
        if let ClipEvent::PlayWave(evt) = self {
            evt.set_state(track_volume, params, ctx);
        }
    }

    pub fn set_fade(&mut self, fade_in_secs: f32, fade_out_secs: f32) {
        if let ClipEvent::PlayWave(evt) = self {
            evt.set_fade(fade_in_secs, fade_out_secs);
        }
    }

    pub fn seed(&mut self, seed: u64) {
        if let ClipEvent::PlayWave(evt) = self {
            evt.seed(seed);
        }
    }

    /// True while the event holds a voice
    pub fn is_active(&self) -> bool {
        match self {
            ClipEvent::PlayWave(evt) => evt.is_active(),
            ClipEvent::Volume(_) => false,
        }
    }

    pub fn is_releasing(&self) -> bool {
        matches!(self, ClipEvent::PlayWave(evt) if evt.is_releasing())
    }
}

impl std::fmt::Debug for ClipEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClipEvent::PlayWave(evt) => f.debug_tuple("PlayWave").field(evt).finish(),
            ClipEvent::Volume(evt) => f.debug_tuple("Volume").field(evt).finish(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

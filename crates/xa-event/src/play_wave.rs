//! Play Wave Event
//!
//! Picks a track according to its variation type, requests a voice from
//! the sound bank and keeps it alive through the record's loop count.

use std::sync::Arc;

use log::{trace, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::curve::ClipParameters;
use crate::event::{ClipContext, EventHeader, INFINITE_LOOP, PlayWaveDefinition, VariationType, WaveTrack};
use crate::voice::{SoundBank, Voice, VoiceState};

/// Runtime play-wave event
pub struct PlayWaveEvent {
    header: EventHeader,
    definition: PlayWaveDefinition,
    sound_bank: Arc<dyn SoundBank>,
    rng: StdRng,

    /// Last picked track (None before the first play)
    wav_index: Option<usize>,
    /// Remaining tracks of the current shuffle pass
    shuffle_deck: Vec<usize>,
    loop_index: u8,
    voice: Option<Box<dyn Voice>>,

    // Rolled per play
    track_volume: f32,
    track_pitch: f32,
    track_filter_frequency: f32,
    track_filter_q: f32,

    // Pushed by the clip
    clip_volume: f32,
    clip_pitch: f32,
    clip_reverb_mix: f32,

    fade_in_secs: f32,
    fade_out_secs: f32,
    fade_elapsed: f32,
    /// Time into the fade-out started by `stop` (None when not releasing)
    release_elapsed: Option<f32>,
}

impl PlayWaveEvent {
    pub fn new(header: EventHeader, definition: PlayWaveDefinition, sound_bank: Arc<dyn SoundBank>) -> Self {
        Self {
            header,
            definition,
            sound_bank,
            rng: StdRng::from_os_rng(),
            wav_index: None,
            shuffle_deck: Vec::new(),
            loop_index: 0,
            voice: None,
            track_volume: 1.0,
            track_pitch: 0.0,
            track_filter_frequency: 0.0,
            track_filter_q: 0.0,
            clip_volume: 1.0,
            clip_pitch: 0.0,
            clip_reverb_mix: 0.0,
            fade_in_secs: 0.0,
            fade_out_secs: 0.0,
            fade_elapsed: 0.0,
            release_elapsed: None,
        }
    }

    // === Queries ===

    pub fn header(&self) -> &EventHeader {
        &self.header
    }

    pub fn definition(&self) -> &PlayWaveDefinition {
        &self.definition
    }

    /// Holding a voice
    #[inline]
    pub fn is_active(&self) -> bool {
        self.voice.is_some()
    }

    /// Track of the last play, if any
    pub fn current_track(&self) -> Option<WaveTrack> {
        self.wav_index.map(|i| self.definition.tracks[i])
    }

    pub fn loop_index(&self) -> u8 {
        self.loop_index
    }

    /// Volume currently pushed to the voice
    pub fn effective_volume(&self) -> f32 {
        self.track_volume * self.clip_volume * self.fade_gain()
    }

    pub fn fade_out_secs(&self) -> f32 {
        self.fade_out_secs
    }

    /// Voice is fading out after `stop`
    #[inline]
    pub fn is_releasing(&self) -> bool {
        self.release_elapsed.is_some()
    }

    // === Playback ===

    /// Start from scratch: drop any current voice, pick a track, play it.
    pub fn play(&mut self, ctx: &ClipContext) {
        self.halt();
        self.fade_elapsed = 0.0;
        self.play_track(true, ctx);
    }

    fn play_track(&mut self, pick_new_wav: bool, ctx: &ClipContext) {
        if pick_new_wav || self.wav_index.is_none() {
            self.wav_index = Some(self.pick_track());
        }
        let index = self.wav_index.unwrap_or(0);
        let track = self.definition.tracks[index];

        let Some(mut voice) = self.sound_bank.create_voice(track.wave_bank, track.track) else {
            warn!(
                "No voice for wave bank {} track {} (event at {:.3}s)",
                track.wave_bank, track.track, self.header.timestamp
            );
            return;
        };

        if let Some(range) = self.definition.volume_variation {
            self.track_volume = range.sample(self.rng.random::<f32>());
        }
        if let Some(range) = self.definition.pitch_variation {
            self.track_pitch = range.sample(self.rng.random::<f32>());
        }
        if ctx.filter.enabled {
            if let Some(filter) = self.definition.filter_variation {
                self.track_filter_frequency = filter.frequency.sample(self.rng.random::<f32>());
                self.track_filter_q = filter.q.sample(self.rng.random::<f32>());
            } else {
                self.track_filter_frequency = ctx.filter.frequency;
                self.track_filter_q = ctx.filter.q;
            }
        }

        // A single infinitely looping track loops at the voice level
        voice.set_looped(self.definition.is_infinite_single());

        trace!(
            "Play wave bank {} track {} (loop {}/{})",
            track.wave_bank, track.track, self.loop_index, self.definition.loop_count
        );

        self.voice = Some(voice);
        self.apply_state(ctx);
        if let Some(voice) = self.voice.as_mut() {
            voice.play();
        }
    }

    fn pick_track(&mut self) -> usize {
        let track_count = self.definition.tracks.len();
        if track_count <= 1 {
            return 0;
        }

        match self.definition.variation {
            VariationType::Ordered => self.wav_index.map_or(0, |i| (i + 1) % track_count),
            VariationType::OrderedFromRandom => match self.wav_index {
                Some(i) => (i + 1) % track_count,
                None => self.rng.random_range(0..track_count),
            },
            VariationType::Random => self.pick_weighted(),
            VariationType::RandomNoImmediateRepeats => {
                let last = self.wav_index;
                let pick = self.pick_weighted();
                if Some(pick) == last {
                    (pick + 1) % track_count
                } else {
                    pick
                }
            }
            VariationType::Shuffle => {
                if self.shuffle_deck.is_empty() {
                    self.shuffle_deck = (0..track_count).collect();
                    self.shuffle_deck.shuffle(&mut self.rng);
                }
                self.shuffle_deck.pop().unwrap_or(0)
            }
        }
    }

    fn pick_weighted(&mut self) -> usize {
        let tracks = &self.definition.tracks;
        let total = self.definition.total_weight();
        if total == 0 {
            return self.rng.random_range(0..tracks.len());
        }

        let mut roll = self.rng.random_range(0..total) as i64;
        for (i, track) in tracks.iter().enumerate() {
            roll -= track.weight as i64;
            if roll < 0 {
                return i;
            }
        }
        tracks.len() - 1
    }

    /// Advance the event. Returns true while a voice is held.
    pub fn update(&mut self, dt: f32, ctx: &ClipContext) -> bool {
        if let Some(elapsed) = self.release_elapsed {
            self.update_release(elapsed, dt);
            return self.voice.is_some();
        }

        let voice_stopped = self
            .voice
            .as_ref()
            .is_some_and(|v| v.state() == VoiceState::Stopped);

        if voice_stopped {
            let loop_count = self.definition.loop_count;
            self.voice = None;

            if loop_count == 0 || (loop_count != INFINITE_LOOP && self.loop_index >= loop_count) {
                self.loop_index = 0;
            } else {
                if loop_count != INFINITE_LOOP {
                    self.loop_index += 1;
                }
                self.play_track(self.definition.new_wave_on_loop, ctx);
            }
        } else if self.voice.is_some() && self.fade_elapsed < self.fade_in_secs {
            self.fade_elapsed = (self.fade_elapsed + dt).min(self.fade_in_secs);
            self.apply_volume();
        }

        self.voice.is_some()
    }

    /// Release the event. With a fade-out set, a playing voice ramps down
    /// over `fade_out_secs` of `update` time and stops at the end; no
    /// further loops start meanwhile. Otherwise the voice stops at once.
    pub fn stop(&mut self) {
        if self.release_elapsed.is_some() {
            return;
        }

        let audible = self.voice.as_ref().is_some_and(|v| v.state() == VoiceState::Playing);
        if self.fade_out_secs > 0.0 && audible {
            trace!("Fade out over {:.3}s (event at {:.3}s)", self.fade_out_secs, self.header.timestamp);
            self.release_elapsed = Some(0.0);
            self.loop_index = 0;
        } else {
            self.halt();
        }
    }

    /// Stop the voice immediately, cutting any fade-out short
    pub fn halt(&mut self) {
        if let Some(mut voice) = self.voice.take() {
            if voice.state() != VoiceState::Stopped {
                voice.stop();
            }
        }
        self.release_elapsed = None;
        self.loop_index = 0;
    }

    fn update_release(&mut self, elapsed: f32, dt: f32) {
        let state = self.voice.as_ref().map_or(VoiceState::Stopped, |v| v.state());
        match state {
            VoiceState::Stopped => self.halt(),
            VoiceState::Paused => {}
            VoiceState::Playing => {
                let elapsed = elapsed + dt;
                if elapsed >= self.fade_out_secs {
                    self.halt();
                } else {
                    self.release_elapsed = Some(elapsed);
                    self.apply_volume();
                }
            }
        }
    }

    pub fn pause(&mut self) {
        if let Some(voice) = self.voice.as_mut() {
            voice.pause();
        }
    }

    pub fn resume(&mut self) {
        if let Some(voice) = self.voice.as_mut() {
            if voice.state() == VoiceState::Paused {
                voice.resume();
            }
        }
    }

    // === Parameters ===

    pub fn set_track_volume(&mut self, volume: f32) {
        self.clip_volume = volume;
        self.apply_volume();
    }

    pub fn set_track_pan(&mut self, pan: f32) {
        if let Some(voice) = self.voice.as_mut() {
            voice.set_pan(pan);
        }
    }

    /// RPC-driven state. Filter values from the curves override the rolled ones.
    pub fn set_state(&mut self, track_volume: f32, params: &ClipParameters, ctx: &ClipContext) {
        self.clip_volume = track_volume;
        self.clip_pitch = params.pitch;
        self.clip_reverb_mix = params.reverb_mix;

        if let Some(frequency) = params.filter_frequency {
            self.track_filter_frequency = frequency;
        }
        if let Some(q) = params.filter_q {
            self.track_filter_q = q;
        }

        self.apply_state(ctx);
    }

    /// Fade-in ramps the voice volume from silence on each `play`.
    /// Fade-out ramps it back to silence after `stop`.
    pub fn set_fade(&mut self, fade_in_secs: f32, fade_out_secs: f32) {
        self.fade_in_secs = fade_in_secs.max(0.0);
        self.fade_out_secs = fade_out_secs.max(0.0);
    }

    pub fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    #[inline]
    fn fade_gain(&self) -> f32 {
        let fade_in = if self.fade_in_secs <= 0.0 {
            1.0
        } else {
            (self.fade_elapsed / self.fade_in_secs).clamp(0.0, 1.0)
        };
        let fade_out = match self.release_elapsed {
            Some(elapsed) if self.fade_out_secs > 0.0 => (1.0 - elapsed / self.fade_out_secs).clamp(0.0, 1.0),
            _ => 1.0,
        };
        fade_in * fade_out
    }

    fn apply_volume(&mut self) {
        let volume = self.effective_volume();
        if let Some(voice) = self.voice.as_mut() {
            voice.set_volume(volume);
        }
    }

    fn apply_state(&mut self, ctx: &ClipContext) {
        let volume = self.effective_volume();
        let pitch = self.track_pitch + self.clip_pitch;
        let Some(voice) = self.voice.as_mut() else {
            return;
        };

        voice.set_volume(volume);
        voice.set_pitch(pitch);
        if ctx.use_reverb {
            voice.set_reverb_mix(self.clip_reverb_mix);
        }
        if ctx.filter.enabled {
            voice.set_filter(ctx.filter.mode, self.track_filter_q, self.track_filter_frequency);
        }
    }
}

impl std::fmt::Debug for PlayWaveEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayWaveEvent")
            .field("header", &self.header)
            .field("tracks", &self.definition.tracks.len())
            .field("variation", &self.definition.variation)
            .field("wav_index", &self.wav_index)
            .field("loop_index", &self.loop_index)
            .field("active", &self.is_active())
            .field("releasing", &self.is_releasing())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

//! Audio Service
//!
//! Owns loaded clips and ticks them. Explicitly constructed and shared by
//! cloning the handle; all clip mutation goes through one lock.
//!
//! ## Thread Safety Design
//!
//! `AudioService` is a cheap `Clone` around `Arc<AudioServiceShared>`.
//! Game code and the tick loop may live on different threads; each call
//! takes the clip map lock for its own duration only.
//!
//! The sound bank and its voices are driven with that lock held, so they
//! must never call back into the service (see [`SoundBank`]).

use std::collections::HashMap;
use std::io::{Read, Seek};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, trace};
use parking_lot::Mutex;
use xa_core::{XactError, XactResult};

use crate::clip::{ClipDefinition, ClipState, XactClip};
use crate::config::ServiceConfig;
use crate::curve::ClipParameters;
use crate::voice::SoundBank;

/// Handle of a loaded clip
pub type ClipId = u64;

/// Per-clip seed stride when the config carries a seed
const CLIP_SEED_STRIDE: u64 = 1 << 16;

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED STATE
// ═══════════════════════════════════════════════════════════════════════════════

struct AudioServiceShared {
    config: ServiceConfig,
    sound_bank: Arc<dyn SoundBank>,
    clips: Mutex<HashMap<ClipId, XactClip>>,
    next_id: AtomicU64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// AUDIO SERVICE
// ═══════════════════════════════════════════════════════════════════════════════

/// Shared owner of clips
#[derive(Clone)]
pub struct AudioService {
    shared: Arc<AudioServiceShared>,
}

impl AudioService {
    pub fn new(config: ServiceConfig, sound_bank: Arc<dyn SoundBank>) -> Self {
        debug!(
            "Audio service up (max clips {}, seed {:?}, max step {:?})",
            config.max_clips, config.seed, config.max_step_secs
        );

        Self {
            shared: Arc::new(AudioServiceShared {
                config,
                sound_bank,
                clips: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.shared.config
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CLIP REGISTRATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Parse a clip from `reader` and load it
    pub fn load_clip<R: Read + Seek>(&self, reader: &mut R, use_reverb: bool) -> XactResult<ClipId> {
        let definition = ClipDefinition::read_from(reader)?;
        self.insert_clip(definition, use_reverb)
    }

    /// Bind a parsed clip to the service's sound bank and load it
    pub fn insert_clip(&self, definition: ClipDefinition, use_reverb: bool) -> XactResult<ClipId> {
        let mut clips = self.shared.clips.lock();
        if !self.shared.config.has_room(clips.len()) {
            return Err(XactError::ServiceFull(clips.len()));
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let mut clip = XactClip::new(definition, Arc::clone(&self.shared.sound_bank), use_reverb);
        if let Some(seed) = self.shared.config.seed {
            clip.seed(seed.wrapping_add(id.wrapping_mul(CLIP_SEED_STRIDE)));
        }

        trace!("Loaded clip {} ({} events)", id, clip.events().len());
        clips.insert(id, clip);
        Ok(id)
    }

    /// Stop and drop a clip. Returns false for unknown ids.
    pub fn remove_clip(&self, id: ClipId) -> bool {
        match self.shared.clips.lock().remove(&id) {
            Some(mut clip) => {
                clip.stop();
                true
            }
            None => false,
        }
    }

    /// Run `f` against a clip under the service lock
    pub fn with_clip<T>(&self, id: ClipId, f: impl FnOnce(&mut XactClip) -> T) -> Option<T> {
        self.shared.clips.lock().get_mut(&id).map(f)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PLAYBACK (by clip id; unknown ids return false)
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn play(&self, id: ClipId) -> bool {
        self.with_clip(id, XactClip::play).is_some()
    }

    pub fn pause(&self, id: ClipId) -> bool {
        self.with_clip(id, XactClip::pause).is_some()
    }

    pub fn resume(&self, id: ClipId) -> bool {
        self.with_clip(id, XactClip::resume).is_some()
    }

    pub fn stop(&self, id: ClipId) -> bool {
        self.with_clip(id, XactClip::stop).is_some()
    }

    pub fn set_volume(&self, id: ClipId, volume: f32) -> bool {
        self.with_clip(id, |clip| clip.set_volume(volume)).is_some()
    }

    pub fn set_volume_scale(&self, id: ClipId, scale: f32) -> bool {
        self.with_clip(id, |clip| clip.set_volume_scale(scale)).is_some()
    }

    pub fn set_pan(&self, id: ClipId, pan: f32) -> bool {
        self.with_clip(id, |clip| clip.set_pan(pan)).is_some()
    }

    pub fn update_state(&self, id: ClipId, params: &ClipParameters) -> bool {
        self.with_clip(id, |clip| clip.update_state(params)).is_some()
    }

    pub fn set_fade(&self, id: ClipId, fade_in_secs: f32, fade_out_secs: f32) -> bool {
        self.with_clip(id, |clip| clip.set_fade(fade_in_secs, fade_out_secs)).is_some()
    }

    pub fn state(&self, id: ClipId) -> Option<ClipState> {
        self.with_clip(id, |clip| clip.state())
    }

    pub fn stop_all(&self) {
        for clip in self.shared.clips.lock().values_mut() {
            clip.stop();
        }
    }

    pub fn pause_all(&self) {
        for clip in self.shared.clips.lock().values_mut() {
            clip.pause();
        }
    }

    pub fn resume_all(&self) {
        for clip in self.shared.clips.lock().values_mut() {
            clip.resume();
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TICK
    // ═══════════════════════════════════════════════════════════════════════════

    /// Advance every clip by `dt` seconds (clamped to `max_step_secs`).
    /// Returns the number of clips still playing.
    pub fn update(&self, dt: f32) -> usize {
        let dt = self.shared.config.clamp_step(dt);
        let mut clips = self.shared.clips.lock();

        let mut playing = 0;
        for clip in clips.values_mut() {
            if clip.update(dt) {
                playing += 1;
            }
        }
        playing
    }

    pub fn clip_count(&self) -> usize {
        self.shared.clips.lock().len()
    }

    /// Clips currently playing
    pub fn active_count(&self) -> usize {
        self.shared.clips.lock().values().filter(|c| c.is_playing()).count()
    }

    pub fn clip_ids(&self) -> Vec<ClipId> {
        let mut ids: Vec<ClipId> = self.shared.clips.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl std::fmt::Debug for AudioService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioService")
            .field("config", &self.shared.config)
            .field("clips", &self.clip_count())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

//! XACT Clip Runtime
//!
//! Parses XACT clip event tables and plays them against a pool of voices:
//! - Binary clip header and event table parsing
//! - Play-wave events with track variations, loops and random ranges
//! - Volume events
//! - Clip playback state machine
//! - RPC (Runtime Parameter Control) curves
//! - Shared audio service owning loaded clips
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     CLIP RUNTIME ARCHITECTURE                    │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │   Bank bytes ──▶ ClipDefinition ──▶ XactClip ──▶ ClipEvent[]     │
//! │                  (pure data)        (state)      │               │
//! │                                                  ▼               │
//! │   RpcCurve[] ──▶ ClipParameters ──▶ update_state  SoundBank      │
//! │                                                  │               │
//! │                                                  ▼               │
//! │   AudioService.update(dt) ─────────────────────▶ Voice           │
//! │                                                                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use xa_event::{AudioService, ServiceConfig};
//!
//! let service = AudioService::new(ServiceConfig::default(), sound_bank);
//!
//! reader.seek(SeekFrom::Start(clip_offset))?;
//! let clip = service.load_clip(&mut reader, false)?;
//! service.play(clip);
//!
//! // Once per frame
//! service.update(dt);
//! ```

#![allow(clippy::new_without_default)]

pub mod clip;
pub mod config;
pub mod curve;
pub mod event;
pub mod manager;
pub mod play_wave;
pub mod voice;
pub mod volume;

// Re-exports
pub use clip::{ClipDefinition, ClipFilter, ClipState, XactClip};
pub use config::ServiceConfig;
pub use curve::{ClipParameters, RpcCurve, RpcParameter, RpcPoint, RpcPointType};
pub use event::{
    ClipCommand, ClipContext, ClipEvent, EVENT_RECORDS, EventDefinition, EventHeader, EventKind,
    FilterVariation, PlayWaveDefinition, RecordShape, VariationRange, VariationType, VolumeDefinition,
    WaveFlags, WaveTrack, record_shape,
};
pub use manager::{AudioService, ClipId};
pub use play_wave::PlayWaveEvent;
pub use voice::{FilterMode, SoundBank, Voice, VoiceState};
pub use volume::VolumeEvent;

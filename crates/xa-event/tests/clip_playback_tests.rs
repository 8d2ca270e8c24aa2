//! Clip Playback Integration Tests
//!
//! Tests for:
//! - Parsing a clip out of a bank image (metadata + remote event table)
//! - Event scheduling across ticks
//! - Stop / replay and end-of-clip transitions
//! - RPC curves driving `update_state`
//! - Seeded variation playback
//! - Fade-out after stop
//! - AudioService loading from a reader

use std::io::Cursor;
use std::sync::Arc;

use approx::assert_abs_diff_eq;
use parking_lot::Mutex;
use xa_core::XactError;
use xa_event::{
    AudioService, ClipDefinition, ClipParameters, ClipState, EventKind, FilterMode, RpcCurve, RpcParameter,
    RpcPoint, ServiceConfig, SoundBank, VariationType, Voice, VoiceState, XactClip,
};

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct VoiceRecord {
    track: u16,
    state: VoiceState,
    volume: f32,
    pitch: f32,
    filter: Option<(FilterMode, f32, f32)>,
}

struct RecordingVoice(Arc<Mutex<VoiceRecord>>);

impl Voice for RecordingVoice {
    fn play(&mut self) {
        self.0.lock().state = VoiceState::Playing;
    }
    fn stop(&mut self) {
        self.0.lock().state = VoiceState::Stopped;
    }
    fn pause(&mut self) {
        self.0.lock().state = VoiceState::Paused;
    }
    fn resume(&mut self) {
        self.0.lock().state = VoiceState::Playing;
    }
    fn state(&self) -> VoiceState {
        self.0.lock().state
    }
    fn set_volume(&mut self, volume: f32) {
        self.0.lock().volume = volume;
    }
    fn set_pitch(&mut self, pitch: f32) {
        self.0.lock().pitch = pitch;
    }
    fn set_pan(&mut self, _pan: f32) {}
    fn set_looped(&mut self, _looped: bool) {}
    fn set_filter(&mut self, mode: FilterMode, q: f32, frequency: f32) {
        self.0.lock().filter = Some((mode, q, frequency));
    }
}

/// Sound bank that records every voice it creates
#[derive(Default)]
struct RecordingBank {
    voices: Mutex<Vec<Arc<Mutex<VoiceRecord>>>>,
}

impl RecordingBank {
    fn tracks(&self) -> Vec<u16> {
        self.voices.lock().iter().map(|v| v.lock().track).collect()
    }

    fn voice(&self, index: usize) -> Arc<Mutex<VoiceRecord>> {
        self.voices.lock()[index].clone()
    }

    /// Simulate every voice reaching the end of its wave
    fn finish_all(&self) {
        for voice in self.voices.lock().iter() {
            voice.lock().state = VoiceState::Stopped;
        }
    }
}

impl SoundBank for RecordingBank {
    fn create_voice(&self, _wave_bank: u8, track: u16) -> Option<Box<dyn Voice>> {
        let record = Arc::new(Mutex::new(VoiceRecord {
            track,
            ..Default::default()
        }));
        self.voices.lock().push(record.clone());
        Some(Box::new(RecordingVoice(record)))
    }
}

/// Little-endian byte builder for bank images
#[derive(Default)]
struct Bytes(Vec<u8>);

impl Bytes {
    fn u8(&mut self, v: u8) -> &mut Self {
        self.0.push(v);
        self
    }
    fn u16(&mut self, v: u16) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    fn u32(&mut self, v: u32) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    fn f32(&mut self, v: f32) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    fn zeros(&mut self, n: usize) -> &mut Self {
        self.0.extend(std::iter::repeat_n(0u8, n));
        self
    }

    fn event_header(&mut self, id: u8, timestamp_ms: u32) -> &mut Self {
        self.u32(id as u32 | (timestamp_ms << 5)).u16(0)
    }

    /// Id 1: single track, played once
    fn single_wave(&mut self, timestamp_ms: u32, track: u16) -> &mut Self {
        self.event_header(1, timestamp_ms)
            .u8(0)
            .u8(0)
            .u16(track)
            .u8(0)
            .u8(0)
            .u16(0)
            .u16(0)
    }

    /// Id 3: weighted track list, played once
    fn variation_wave(&mut self, timestamp_ms: u32, variation: u8, tracks: &[(u16, u8)]) -> &mut Self {
        self.event_header(3, timestamp_ms)
            .u8(0)
            .u8(0)
            .u8(0)
            .u16(0)
            .u16(0)
            .u16(tracks.len() as u16)
            .u8(variation)
            .zeros(5);
        for &(track, weight) in tracks {
            self.u16(track).u8(0).u8(0).u8(weight);
        }
        self
    }

    /// Id 8: absolute volume in dB
    fn volume(&mut self, timestamp_ms: u32, decibels: f32) -> &mut Self {
        self.event_header(8, timestamp_ms)
            .zeros(2)
            .u8(0)
            .f32(decibels * 100.0)
            .zeros(9)
    }
}

const TABLE_OFFSET: u32 = 32;

/// Clip metadata at 0, event table at `TABLE_OFFSET`
fn bank_image(filter_word: u16, frequency: u16, events: impl FnOnce(&mut Bytes) -> usize) -> Vec<u8> {
    let mut bytes = Bytes::default();
    bytes.u8(180).u32(TABLE_OFFSET).u16(filter_word).u16(frequency);
    bytes.0.resize(TABLE_OFFSET as usize, 0);

    let count_at = bytes.0.len();
    bytes.u8(0);
    let count = events(&mut bytes);
    bytes.0[count_at] = count as u8;
    bytes.0
}

fn load(image: Vec<u8>, bank: &Arc<RecordingBank>) -> XactClip {
    XactClip::from_reader(&mut Cursor::new(image), bank.clone(), false).unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSING
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_parse_mixed_table() {
    let image = bank_image(0, 0, |b| {
        b.single_wave(0, 3)
            .variation_wave(250, 2, &[(10, 50), (11, 50)])
            .volume(1000, -12.0);
        3
    });

    let def = ClipDefinition::read_from(&mut Cursor::new(image)).unwrap();
    assert_eq!(def.events.len(), 3);
    assert!(matches!(def.events[0].kind, EventKind::PlayWave(_)));

    let EventKind::PlayWave(wave) = &def.events[1].kind else {
        panic!("expected play wave");
    };
    assert_eq!(wave.variation, VariationType::Random);
    assert_eq!(wave.total_weight(), 100);

    let EventKind::Volume(volume) = &def.events[2].kind else {
        panic!("expected volume");
    };
    assert_abs_diff_eq!(volume.volume, 0.251, epsilon = 0.001);
}

#[test]
fn test_unimplemented_event_fails_whole_clip() {
    let image = bank_image(0, 0, |b| {
        b.single_wave(0, 1).event_header(9, 10);
        2
    });

    let err = ClipDefinition::read_from(&mut Cursor::new(image)).unwrap_err();
    assert!(matches!(err, XactError::UnimplementedEvent { id: 9, kind: "marker" }));
    assert!(err.is_content_error());
}

#[test]
fn test_definition_serializes_to_json() {
    let image = bank_image(0, 0, |b| {
        b.single_wave(0, 3);
        1
    });
    let def = ClipDefinition::read_from(&mut Cursor::new(image)).unwrap();

    let json = serde_json::to_string(&def).unwrap();
    let back: ClipDefinition = serde_json::from_str(&json).unwrap();
    assert_eq!(back, def);
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCHEDULING
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_second_event_fires_once_on_time() {
    let bank = Arc::new(RecordingBank::default());
    let mut clip = load(
        bank_image(0, 0, |b| {
            b.single_wave(0, 1).single_wave(500, 2);
            2
        }),
        &bank,
    );

    clip.play();
    assert_eq!(bank.tracks(), vec![1]);

    clip.update(0.4);
    assert_eq!(bank.tracks(), vec![1]);

    clip.update(0.1);
    assert_eq!(bank.tracks(), vec![1, 2]);

    for _ in 0..20 {
        clip.update(0.05);
    }
    assert_eq!(bank.tracks(), vec![1, 2]);
    assert_eq!(clip.next_event(), 2);
}

#[test]
fn test_large_step_fires_all_due_events() {
    let bank = Arc::new(RecordingBank::default());
    let mut clip = load(
        bank_image(0, 0, |b| {
            b.single_wave(0, 1).single_wave(100, 2).single_wave(200, 3).single_wave(900, 4);
            4
        }),
        &bank,
    );

    clip.play();
    clip.update(0.5);
    assert_eq!(bank.tracks(), vec![1, 2, 3]);
    assert_eq!(clip.next_event(), 3);
}

#[test]
fn test_clip_ends_when_voices_finish() {
    let bank = Arc::new(RecordingBank::default());
    let mut clip = load(
        bank_image(0, 0, |b| {
            b.single_wave(0, 1).single_wave(100, 2);
            2
        }),
        &bank,
    );

    clip.play();
    assert!(clip.update(0.2));
    assert_eq!(clip.state(), ClipState::Playing);

    bank.finish_all();
    assert!(!clip.update(0.01));
    assert_eq!(clip.state(), ClipState::Stopped);

    // Further ticks are no-ops
    let elapsed = clip.elapsed();
    clip.update(5.0);
    assert_eq!(clip.elapsed(), elapsed);
    assert_eq!(bank.tracks().len(), 2);
}

#[test]
fn test_replay_after_stop_matches_first_play() {
    let bank = Arc::new(RecordingBank::default());
    let mut clip = load(
        bank_image(0, 0, |b| {
            b.single_wave(0, 1).volume(100, -6.0).single_wave(300, 2);
            3
        }),
        &bank,
    );

    clip.play();
    clip.update(0.35);
    let first_session = bank.tracks();
    assert_eq!(first_session, vec![1, 2]);
    assert_abs_diff_eq!(clip.volume(), 0.501, epsilon = 0.001);

    clip.stop();
    assert_eq!(clip.state(), ClipState::Stopped);

    clip.play();
    assert_eq!(clip.volume(), clip.default_volume());
    assert_eq!(clip.next_event(), 1);
    clip.update(0.35);
    assert_eq!(bank.tracks(), vec![1, 2, 1, 2]);
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_volume_and_scale_reach_voice() {
    let bank = Arc::new(RecordingBank::default());
    let mut clip = load(
        bank_image(0, 0, |b| {
            b.single_wave(0, 1);
            1
        }),
        &bank,
    );

    clip.play();
    clip.set_volume_scale(0.5);
    clip.set_volume(0.6);
    assert_abs_diff_eq!(bank.voice(0).lock().volume, 0.3, epsilon = 1e-6);

    clip.set_volume(0.6);
    clip.set_volume_scale(0.5);
    assert_abs_diff_eq!(bank.voice(0).lock().volume, 0.3, epsilon = 1e-6);
}

#[test]
fn test_rpc_curves_drive_clip_state() {
    let bank = Arc::new(RecordingBank::default());
    // Filter enabled, low pass, Q bits 10
    let filter_word = 0x1 | (10 << 3);
    let mut clip = load(
        bank_image(filter_word, 1500, |b| {
            b.single_wave(0, 1);
            1
        }),
        &bank,
    );

    clip.play();
    {
        let voice = bank.voice(0);
        let voice = voice.lock();
        let (mode, q, frequency) = voice.filter.unwrap();
        assert_eq!(mode, FilterMode::LowPass);
        assert_abs_diff_eq!(q, 0.1, epsilon = 1e-6);
        assert_eq!(frequency, 1500.0);
    }

    let curves = vec![
        RpcCurve::new(0, RpcParameter::Volume, vec![RpcPoint::linear(0.0, 0.0), RpcPoint::linear(1.0, -600.0)])
            .unwrap(),
        RpcCurve::new(1, RpcParameter::Pitch, vec![RpcPoint::linear(0.0, -1000.0), RpcPoint::linear(1.0, 1000.0)])
            .unwrap(),
        RpcCurve::new(0, RpcParameter::FilterFrequency, vec![RpcPoint::linear(0.0, 400.0)]).unwrap(),
    ];
    let variables = [1.0f32, 0.75];
    let params = ClipParameters::from_curves(&curves, |c| variables[c.variable as usize]);
    clip.update_state(&params);

    assert_abs_diff_eq!(clip.volume_scale(), 0.501, epsilon = 0.001);

    let voice = bank.voice(0);
    let voice = voice.lock();
    assert_abs_diff_eq!(voice.volume, clip.effective_volume(), epsilon = 1e-6);
    assert_abs_diff_eq!(voice.pitch, 0.5, epsilon = 1e-6);
    assert_eq!(voice.filter.map(|f| f.2), Some(400.0));
}

#[test]
fn test_seeded_clips_pick_same_tracks() {
    let image = bank_image(0, 0, |b| {
        b.variation_wave(0, 2, &[(1, 10), (2, 10), (3, 10), (4, 10)]);
        1
    });

    let run = |seed: u64| {
        let bank = Arc::new(RecordingBank::default());
        let mut clip = load(image.clone(), &bank);
        clip.seed(seed);
        for _ in 0..16 {
            clip.play();
            clip.stop();
        }
        bank.tracks()
    };

    assert_eq!(run(42), run(42));
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVICE
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_service_loads_and_ticks() {
    let bank = Arc::new(RecordingBank::default());
    let service = AudioService::new(
        ServiceConfig::from_json(r#"{"max_clips": 4, "seed": 1}"#).unwrap(),
        bank.clone(),
    );

    let image = bank_image(0, 0, |b| {
        b.single_wave(0, 7).single_wave(200, 8);
        2
    });
    let mut reader = Cursor::new(image);
    let id = service.load_clip(&mut reader, false).unwrap();
    assert_eq!(reader.position(), 9);

    assert!(service.play(id));
    assert_eq!(bank.tracks(), vec![7]);

    assert_eq!(service.update(0.1), 1);
    assert_eq!(service.update(0.1), 1);
    assert_eq!(bank.tracks(), vec![7, 8]);

    bank.finish_all();
    assert_eq!(service.update(0.1), 0);
    assert_eq!(service.state(id), Some(ClipState::Stopped));
}

#[test]
fn test_service_fades_out_stopped_clip() {
    let bank = Arc::new(RecordingBank::default());
    let service = AudioService::new(ServiceConfig::default(), bank.clone());

    let image = bank_image(0, 0, |b| {
        b.single_wave(0, 3);
        1
    });
    let id = service.load_clip(&mut Cursor::new(image), false).unwrap();
    service.set_fade(id, 0.0, 1.0);

    assert!(service.play(id));
    service.stop(id);
    assert_eq!(service.state(id), Some(ClipState::Stopped));
    assert_eq!(bank.voice(0).lock().state, VoiceState::Playing);
    let full = bank.voice(0).lock().volume;
    assert!(full > 0.0);

    for expected in [0.75, 0.5, 0.25] {
        assert_eq!(service.update(0.25), 0);
        assert_abs_diff_eq!(bank.voice(0).lock().volume, full * expected, epsilon = 1e-5);
    }

    service.update(0.25);
    assert_eq!(bank.voice(0).lock().state, VoiceState::Stopped);
    assert_eq!(bank.tracks(), vec![3]);
}

#[test]
fn test_service_rejects_bad_clip() {
    let bank = Arc::new(RecordingBank::default());
    let service = AudioService::new(ServiceConfig::default(), bank);

    let image = bank_image(0, 0, |b| {
        b.event_header(5, 0);
        1
    });
    let err = service.load_clip(&mut Cursor::new(image), false).unwrap_err();
    assert!(matches!(err, XactError::UnknownEvent { id: 5 }));
    assert_eq!(service.clip_count(), 0);
}

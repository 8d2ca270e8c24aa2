//! RPC (Runtime Parameter Control) Curves
//!
//! Map a game-driven variable onto a sound parameter through a
//! piecewise curve, and fold a set of curves into the parameter tuple a
//! clip consumes in `update_state`.

use std::io::Read;

use log::trace;
use serde::{Deserialize, Serialize};
use xa_core::{ReadLe, XactError, XactResult, volume_from_decibels};

// ═══════════════════════════════════════════════════════════════════════════════
// RPC POINT
// ═══════════════════════════════════════════════════════════════════════════════

/// Segment shape declared by a curve point
///
/// Every kind is currently evaluated linearly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum RpcPointType {
    #[default]
    Linear = 0,
    Fast = 1,
    Slow = 2,
    SinCos = 3,
}

impl RpcPointType {
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(RpcPointType::Linear),
            1 => Some(RpcPointType::Fast),
            2 => Some(RpcPointType::Slow),
            3 => Some(RpcPointType::SinCos),
            _ => None,
        }
    }
}

/// Curve control point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RpcPoint {
    /// Variable value (x)
    pub position: f32,
    /// Output value (y)
    pub value: f32,
    /// Shape of the segment starting at this point
    pub kind: RpcPointType,
}

impl RpcPoint {
    pub fn linear(position: f32, value: f32) -> Self {
        Self {
            position,
            value,
            kind: RpcPointType::Linear,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RPC PARAMETER
// ═══════════════════════════════════════════════════════════════════════════════

/// Sound parameter a curve drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcParameter {
    /// Output in hundredths of a dB
    Volume,
    /// Output in thousandths
    Pitch,
    /// Output in hundredths of a dB
    ReverbSend,
    FilterFrequency,
    FilterQ,
    /// Reverb DSP parameter (index past the sound parameters)
    Dsp(u16),
}

impl RpcParameter {
    /// Number of non-DSP parameters
    pub const SOUND_PARAMETERS: u16 = 5;

    pub fn from_index(index: u16) -> Self {
        match index {
            0 => RpcParameter::Volume,
            1 => RpcParameter::Pitch,
            2 => RpcParameter::ReverbSend,
            3 => RpcParameter::FilterFrequency,
            4 => RpcParameter::FilterQ,
            other => RpcParameter::Dsp(other - Self::SOUND_PARAMETERS),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RPC CURVE
// ═══════════════════════════════════════════════════════════════════════════════

/// RPC curve over sorted control points
///
/// Deserialization goes through [`RpcCurve::new`], so an empty or unsorted
/// point list is rejected there too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCurve")]
pub struct RpcCurve {
    /// Index of the bound variable
    pub variable: u16,
    /// Variable is engine-global rather than per-cue
    pub is_global: bool,
    pub parameter: RpcParameter,
    points: Vec<RpcPoint>,
}

/// Unchecked serde shape of [`RpcCurve`]
#[derive(Deserialize)]
struct RawCurve {
    variable: u16,
    #[serde(default)]
    is_global: bool,
    parameter: RpcParameter,
    points: Vec<RpcPoint>,
}

impl TryFrom<RawCurve> for RpcCurve {
    type Error = XactError;

    fn try_from(raw: RawCurve) -> XactResult<Self> {
        Ok(Self::new(raw.variable, raw.parameter, raw.points)?.with_global(raw.is_global))
    }
}

impl RpcCurve {
    /// Build a curve. Points must be non-empty and sorted by position.
    pub fn new(variable: u16, parameter: RpcParameter, points: Vec<RpcPoint>) -> XactResult<Self> {
        if points.is_empty() {
            return Err(XactError::InvalidCurve(format!("variable {} has no points", variable)));
        }
        if points.windows(2).any(|w| w[1].position < w[0].position) {
            return Err(XactError::InvalidCurve(format!(
                "variable {} points are not sorted by position",
                variable
            )));
        }

        Ok(Self {
            variable,
            is_global: false,
            parameter,
            points,
        })
    }

    /// Mark the bound variable as global
    pub fn with_global(mut self, is_global: bool) -> Self {
        self.is_global = is_global;
        self
    }

    /// Read one curve record. `is_global` resolves a variable index to its scope.
    pub fn read_from<R: Read>(reader: &mut R, is_global: impl Fn(u16) -> bool) -> XactResult<Self> {
        let variable = reader.read_u16_le()?;
        let point_count = reader.read_u8()?;
        let parameter = RpcParameter::from_index(reader.read_u16_le()?);

        let mut points = Vec::with_capacity(point_count as usize);
        for _ in 0..point_count {
            let position = reader.read_f32_le()?;
            let value = reader.read_f32_le()?;
            let kind_index = reader.read_u8()?;
            let kind = RpcPointType::from_index(kind_index).ok_or_else(|| {
                XactError::InvalidCurve(format!("unknown point type {}", kind_index))
            })?;
            points.push(RpcPoint { position, value, kind });
        }

        Ok(Self::new(variable, parameter, points)?.with_global(is_global(variable)))
    }

    /// Read `count` consecutive curve records
    pub fn read_table<R: Read>(
        reader: &mut R,
        count: usize,
        is_global: impl Fn(u16) -> bool,
    ) -> XactResult<Vec<Self>> {
        (0..count).map(|_| Self::read_from(reader, &is_global)).collect()
    }

    pub fn points(&self) -> &[RpcPoint] {
        &self.points
    }

    /// Evaluate the curve for a variable value.
    ///
    /// Clamps to the first/last value outside the point range. A curve
    /// without points evaluates to 0.
    pub fn evaluate(&self, position: f32) -> f32 {
        let (Some(&head), Some(&tail)) = (self.points.first(), self.points.last()) else {
            return 0.0;
        };

        let mut first = head;
        if position <= first.position {
            return first.value;
        }

        let mut second = tail;
        if position >= second.position {
            return second.value;
        }

        for point in &self.points[1..] {
            second = *point;
            if second.position >= position {
                break;
            }
            first = second;
        }

        // Non-linear kinds share the linear formula
        let t = (position - first.position) / (second.position - first.position);
        first.value + (second.value - first.value) * t
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLIP PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Parameter tuple pushed to clips by `update_state`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipParameters {
    /// Linear volume scale
    pub volume: f32,
    pub pitch: f32,
    pub reverb_mix: f32,
    /// Overrides the rolled filter frequency when set
    pub filter_frequency: Option<f32>,
    /// Overrides the rolled filter Q when set
    pub filter_q: Option<f32>,
}

impl Default for ClipParameters {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pitch: 0.0,
            reverb_mix: 0.0,
            filter_frequency: None,
            filter_q: None,
        }
    }
}

impl ClipParameters {
    /// Fold curve outputs into one tuple. `variable_value` returns the
    /// current value of a curve's bound variable.
    pub fn from_curves<'a>(
        curves: impl IntoIterator<Item = &'a RpcCurve>,
        variable_value: impl Fn(&RpcCurve) -> f32,
    ) -> Self {
        let mut params = Self::default();

        for curve in curves {
            let value = curve.evaluate(variable_value(curve));
            match curve.parameter {
                RpcParameter::Volume => params.volume *= volume_from_decibels(value / 100.0),
                RpcParameter::Pitch => params.pitch += value / 1000.0,
                RpcParameter::ReverbSend => params.reverb_mix += volume_from_decibels(value / 100.0),
                RpcParameter::FilterFrequency => params.filter_frequency = Some(value),
                RpcParameter::FilterQ => params.filter_q = Some(value),
                RpcParameter::Dsp(index) => {
                    trace!("Skipping DSP parameter {} on variable {}", index, curve.variable);
                }
            }
        }

        params
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

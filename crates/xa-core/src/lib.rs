//! xa-core: Shared types for the XACT clip runtime
//!
//! Error type, decibel coding and little-endian reads used by the
//! event and tooling crates.

mod decibel;
mod error;
mod reader;

pub use decibel::*;
pub use error::*;
pub use reader::*;

/// Milliseconds → seconds scale used by every XACT time field
pub const MS_TO_SECS: f32 = 0.001;

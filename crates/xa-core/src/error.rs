//! Error types for the XACT clip runtime

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum XactError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown clip event id {id}")]
    UnknownEvent { id: u8 },

    #[error("Clip event id {id} ({kind}) is not implemented")]
    UnimplementedEvent { id: u8, kind: &'static str },

    #[error("Invalid variation type {0}")]
    InvalidVariation(u8),

    #[error("Play wave event at {timestamp}s has no tracks")]
    EmptyTrackList { timestamp: f32 },

    #[error("Invalid RPC curve: {0}")]
    InvalidCurve(String),

    #[error("Service is full ({0} clips)")]
    ServiceFull(usize),

    #[error("Config error: {0}")]
    Config(String),
}

impl XactError {
    /// True for errors raised by malformed or unsupported bank content
    /// (as opposed to I/O or service misuse).
    pub fn is_content_error(&self) -> bool {
        matches!(
            self,
            XactError::UnknownEvent { .. }
                | XactError::UnimplementedEvent { .. }
                | XactError::InvalidVariation(_)
                | XactError::EmptyTrackList { .. }
                | XactError::InvalidCurve(_)
        )
    }
}

/// Result type alias
pub type XactResult<T> = Result<T, XactError>;

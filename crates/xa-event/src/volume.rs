//! Volume Event
//!
//! Sets the owning clip's volume when fired. Never holds a voice.

use crate::event::{ClipCommand, EventHeader, VolumeDefinition};

#[derive(Debug, Clone)]
pub struct VolumeEvent {
    header: EventHeader,
    volume: f32,
}

impl VolumeEvent {
    pub fn new(header: EventHeader, definition: &VolumeDefinition) -> Self {
        Self {
            header,
            volume: definition.volume,
        }
    }

    pub fn header(&self) -> &EventHeader {
        &self.header
    }

    /// Linear volume applied to the clip
    pub fn volume(&self) -> f32 {
        self.volume
    }

    #[inline]
    pub fn play(&self) -> ClipCommand {
        ClipCommand::SetVolume(self.volume)
    }
}

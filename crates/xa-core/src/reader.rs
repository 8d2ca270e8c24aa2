//! Little-endian primitive reads
//!
//! XACT banks are little-endian throughout. Blanket-implemented for every
//! `Read`, so parsers work on files, cursors and slices alike.

use std::io::{self, Read};

/// Little-endian read helpers
pub trait ReadLe: Read {
    #[inline]
    fn read_u8(&mut self) -> io::Result<u8> {
        let mut bytes = [0u8; 1];
        self.read_exact(&mut bytes)?;
        Ok(bytes[0])
    }

    #[inline]
    fn read_u16_le(&mut self) -> io::Result<u16> {
        let mut bytes = [0u8; 2];
        self.read_exact(&mut bytes)?;
        Ok(u16::from_le_bytes(bytes))
    }

    #[inline]
    fn read_i16_le(&mut self) -> io::Result<i16> {
        let mut bytes = [0u8; 2];
        self.read_exact(&mut bytes)?;
        Ok(i16::from_le_bytes(bytes))
    }

    #[inline]
    fn read_u32_le(&mut self) -> io::Result<u32> {
        let mut bytes = [0u8; 4];
        self.read_exact(&mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }

    #[inline]
    fn read_f32_le(&mut self) -> io::Result<f32> {
        let mut bytes = [0u8; 4];
        self.read_exact(&mut bytes)?;
        Ok(f32::from_le_bytes(bytes))
    }

    /// Read a fixed-size run of bytes whose meaning is unknown.
    #[inline]
    fn read_array<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let mut bytes = [0u8; N];
        self.read_exact(&mut bytes)?;
        Ok(bytes)
    }
}

impl<R: Read + ?Sized> ReadLe for R {}

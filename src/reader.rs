//! Seekable little-endian byte source for level decoding
//!
//! Thin adapter over any `Read + Seek` stream. Every table in the format
//! family is read through this cursor; decoders advance it by exactly the
//! bytes their generation declares, so a wrong-sized read here corrupts every
//! later table.

use std::io::{Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use log::warn;

use crate::error::{FormatError, Warning};

/// Filler dword the G5 tooling writes into unused count slots.
pub const FILLER: u32 = 0xCDCD_CDCD;

/// Cursor over a little-endian level stream.
pub struct LevelReader<R> {
    inner: R,
    size: u64,
}

impl<R: Read + Seek> LevelReader<R> {
    pub fn new(mut inner: R) -> Result<Self, FormatError> {
        let size = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self { inner, size })
    }

    /// Total stream length in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn tell(&mut self) -> Result<u64, FormatError> {
        Ok(self.inner.stream_position()?)
    }

    pub fn seek(&mut self, position: u64) -> Result<(), FormatError> {
        self.inner.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    pub fn skip(&mut self, delta: u64) -> Result<(), FormatError> {
        self.inner.seek(SeekFrom::Current(delta as i64))?;
        Ok(())
    }

    pub fn is_eof(&mut self) -> Result<bool, FormatError> {
        Ok(self.tell()? >= self.size)
    }

    pub fn read_u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.inner.read_u8()?)
    }

    pub fn read_i8(&mut self) -> Result<i8, FormatError> {
        Ok(self.inner.read_i8()?)
    }

    pub fn read_u16(&mut self) -> Result<u16, FormatError> {
        Ok(self.inner.read_u16::<LittleEndian>()?)
    }

    pub fn read_i16(&mut self) -> Result<i16, FormatError> {
        Ok(self.inner.read_i16::<LittleEndian>()?)
    }

    pub fn read_u32(&mut self) -> Result<u32, FormatError> {
        Ok(self.inner.read_u32::<LittleEndian>()?)
    }

    pub fn read_i32(&mut self) -> Result<i32, FormatError> {
        Ok(self.inner.read_i32::<LittleEndian>()?)
    }

    pub fn read_f32(&mut self) -> Result<f32, FormatError> {
        Ok(self.inner.read_f32::<LittleEndian>()?)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, FormatError> {
        let mut buf = vec![0u8; n];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Expect a single marker byte; anything else is a fatal format error.
    pub fn expect_marker(&mut self, byte: u8, name: &'static str) -> Result<(), FormatError> {
        let found = self.read_u8()?;
        if found != byte {
            return Err(FormatError::BadMarker {
                expected: name,
                found,
            });
        }
        Ok(())
    }

    /// Read a u32 that is either a real count or G5 filler. Filler clamps to
    /// zero with a warning instead of exploding a Vec allocation.
    pub fn read_count_or_filler(
        &mut self,
        what: &str,
        warnings: &mut Vec<Warning>,
    ) -> Result<u32, FormatError> {
        let count = self.read_u32()?;
        if count == FILLER {
            warn!("{}: filler in place of count", what);
            warnings.push(Warning::FillerCount {
                what: what.to_string(),
            });
            return Ok(0);
        }
        Ok(count)
    }

    /// Read `count` elements of `f`. `count` above the hard cap is treated as
    /// broken structure, since real content never comes close.
    pub fn read_vector<T, F>(
        &mut self,
        count: usize,
        cap: usize,
        what: &'static str,
        mut f: F,
    ) -> Result<Vec<T>, FormatError>
    where
        F: FnMut(&mut Self) -> Result<T, FormatError>,
    {
        if count > cap {
            return Err(FormatError::BadCount {
                what,
                count: count as u64,
                cap: cap as u64,
            });
        }
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(f(self)?);
        }
        Ok(out)
    }

    /// Read up to `cap` fixed-size elements, byte-exactly skipping the excess
    /// so later tables stay in sync. The clamp is a warning, not an error.
    pub fn read_vector_capped<T, F>(
        &mut self,
        count: usize,
        cap: usize,
        element_size: u64,
        what: &str,
        warnings: &mut Vec<Warning>,
        mut f: F,
    ) -> Result<Vec<T>, FormatError>
    where
        F: FnMut(&mut Self) -> Result<T, FormatError>,
    {
        let kept = count.min(cap);
        if count > cap {
            warn!("{}: count {} clamped to {}", what, count, cap);
            warnings.push(Warning::CountClamped {
                what: what.to_string(),
                count: count as u64,
                cap: cap as u64,
            });
        }
        let mut out = Vec::with_capacity(kept);
        for _ in 0..kept {
            out.push(f(self)?);
        }
        self.skip((count - kept) as u64 * element_size)?;
        Ok(out)
    }

    pub fn read_u16_vector(
        &mut self,
        count: usize,
        cap: usize,
        what: &'static str,
    ) -> Result<Vec<u16>, FormatError> {
        self.read_vector(count, cap, what, |r| r.read_u16())
    }

    pub fn read_i32_vector(
        &mut self,
        count: usize,
        cap: usize,
        what: &'static str,
    ) -> Result<Vec<i32>, FormatError> {
        self.read_vector(count, cap, what, |r| r.read_i32())
    }
}

//! Texture container framing
//!
//! Pixel payloads are never interpreted here; this module knows exactly how
//! many bytes each generation's texture blocks occupy so the cursor lands on
//! the next table. G4/G5 wrap several blocks in a small frame (uncompressed
//! size, compressed size, payload); for G4 the payloads are zlib streams and
//! decompression is delegated to the host through [`Inflate`].

use log::debug;

use crate::error::FormatError;
use crate::raw::limits;
use crate::reader::LevelReader;
use std::io::{Read, Seek};

pub const PAGE_PIXELS: usize = 256 * 256;
/// 8-bit page: one byte per pixel.
pub const PAGE_BYTES_8: u64 = PAGE_PIXELS as u64;
/// 16-bit page: two bytes per pixel.
pub const PAGE_BYTES_16: u64 = PAGE_PIXELS as u64 * 2;
/// 32-bit page: four bytes per pixel.
pub const PAGE_BYTES_32: u64 = PAGE_PIXELS as u64 * 4;

pub const PALETTE_BYTES_8: u64 = 768;
pub const PALETTE_BYTES_16: u64 = 1024;
pub const LIGHTMAP_BYTES: u64 = 8192;

/// Decompression seam. The loader never links a decompression algorithm;
/// the host supplies one (G4 payloads are raw zlib).
pub trait Inflate {
    /// Inflate `compressed` into exactly `uncompressed_size` bytes.
    fn inflate(&self, compressed: &[u8], uncompressed_size: usize) -> Result<Vec<u8>, String>;
}

/// Counts of texture pages declared by a G4/G5 header.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageCounts {
    pub room: u16,
    pub object: u16,
    pub bump: u16,
}

impl PageCounts {
    pub fn read<R: Read + Seek>(reader: &mut LevelReader<R>) -> Result<Self, FormatError> {
        let counts = Self {
            room: reader.read_u16()?,
            object: reader.read_u16()?,
            bump: reader.read_u16()?,
        };
        let total = counts.total();
        if total > limits::MAX_TEXTURE_PAGES {
            return Err(FormatError::BadCount {
                what: "texture pages",
                count: total as u64,
                cap: limits::MAX_TEXTURE_PAGES as u64,
            });
        }
        Ok(counts)
    }

    pub fn total(&self) -> usize {
        self.room as usize + self.object as usize + self.bump as usize
    }
}

/// Skip a count-prefixed block of 8-bit texture pages (G1..G3 layout:
/// u32 page count, then pages).
pub fn skip_paged_block_8<R: Read + Seek>(
    reader: &mut LevelReader<R>,
) -> Result<u32, FormatError> {
    let pages = reader.read_u32()?;
    if pages as usize > limits::MAX_TEXTURE_PAGES {
        return Err(FormatError::BadCount {
            what: "texture pages",
            count: pages as u64,
            cap: limits::MAX_TEXTURE_PAGES as u64,
        });
    }
    debug!("skipping {} 8-bit texture pages", pages);
    reader.skip(pages as u64 * PAGE_BYTES_8)?;
    Ok(pages)
}

/// Skip `pages` 16-bit texture pages (count already known from the 8-bit
/// block, G2/G3 layout).
pub fn skip_pages_16<R: Read + Seek>(
    reader: &mut LevelReader<R>,
    pages: u32,
) -> Result<(), FormatError> {
    reader.skip(pages as u64 * PAGE_BYTES_16)
}

/// One G4/G5 framed block: declared uncompressed size, stored size, payload.
#[derive(Debug)]
pub struct FramedBlock {
    pub uncompressed_size: usize,
    pub data: Vec<u8>,
}

impl FramedBlock {
    /// Read the frame without touching the payload encoding.
    pub fn read<R: Read + Seek>(
        reader: &mut LevelReader<R>,
        what: &'static str,
    ) -> Result<Self, FormatError> {
        let uncompressed_size = reader.read_u32()? as usize;
        let stored_size = reader.read_u32()? as usize;
        if uncompressed_size > limits::MAX_BLOCK_BYTES || stored_size > limits::MAX_BLOCK_BYTES {
            return Err(FormatError::BadCount {
                what,
                count: uncompressed_size.max(stored_size) as u64,
                cap: limits::MAX_BLOCK_BYTES as u64,
            });
        }
        debug!("{}: {} bytes stored, {} inflated", what, stored_size, uncompressed_size);
        Ok(Self {
            uncompressed_size,
            data: reader.read_bytes(stored_size)?,
        })
    }

    /// Read the frame and skip its payload entirely.
    pub fn skip<R: Read + Seek>(
        reader: &mut LevelReader<R>,
        what: &'static str,
    ) -> Result<(), FormatError> {
        let uncompressed_size = reader.read_u32()? as usize;
        let stored_size = reader.read_u32()? as usize;
        if uncompressed_size > limits::MAX_BLOCK_BYTES || stored_size > limits::MAX_BLOCK_BYTES {
            return Err(FormatError::BadCount {
                what,
                count: uncompressed_size.max(stored_size) as u64,
                cap: limits::MAX_BLOCK_BYTES as u64,
            });
        }
        reader.skip(stored_size as u64)
    }

    /// Inflate through the host-supplied seam. A payload already at the
    /// declared size is passed through untouched (G5 stores its geometry
    /// block uncompressed inside the same frame).
    pub fn inflate<I: Inflate + ?Sized>(self, inflater: &I) -> Result<Vec<u8>, FormatError> {
        if self.data.len() == self.uncompressed_size {
            return Ok(self.data);
        }
        let size = self.uncompressed_size;
        inflater
            .inflate(&self.data, size)
            .map_err(|e| FormatError::BadStructure(format!("inflate failed: {}", e)))
    }
}

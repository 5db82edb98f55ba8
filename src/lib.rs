//! Loader for the five generations of the classic room-portal level format
//!
//! The pipeline has two phases. Decode reads every table of the byte stream
//! into plain records, keeping cross-references numeric behind typed wrappers
//! ([`refs`]). Link resolves those references into a navigable [`World`]:
//! rooms with sector grids, portal redirects, stacked-room links, navigation
//! boxes with zones, and the floor-data behavior streams. Spatial and zone
//! queries live in [`world::locate`].
//!
//! Compressed payloads (G4 geometry) are inflated through the host-supplied
//! [`Inflate`] seam; the crate links no decompression algorithm itself.

pub mod assemble;
pub mod error;
pub mod raw;
pub mod reader;
pub mod refs;
pub mod world;

#[cfg(test)]
mod testutil;

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

pub use error::{FormatError, LinkError, LoadError, Warning};
pub use raw::texture::Inflate;
pub use raw::{Generation, LoaderOptions};
pub use reader::LevelReader;
pub use world::locate::{locate, same_zone, zone_id, AgentCapability, Location};
pub use world::{CameraSlot, NavBox, Room, Sector, SimState, World};

/// Peek at a stream's leading magic. Answers G4 for the magic G4 and G5
/// share; the distinction is the caller's (conventionally the file suffix).
pub fn probe_generation<R: Read + Seek>(source: R) -> Result<Generation, FormatError> {
    let mut reader = LevelReader::new(source)?;
    raw::probe_generation(&mut reader)
}

/// Load a level from any seekable stream. Returns the linked world together
/// with every non-fatal oddity observed along the way.
pub fn load_level<R: Read + Seek, I: Inflate + ?Sized>(
    source: R,
    generation: Generation,
    options: &LoaderOptions,
    inflater: &I,
) -> Result<(World, Vec<Warning>), LoadError> {
    options
        .validate()
        .map_err(FormatError::BadStructure)?;
    let mut reader = LevelReader::new(source)?;
    let mut warnings = Vec::new();
    let raw = raw::RawLevel::read(&mut reader, generation, options, inflater, &mut warnings)?;
    let mut world = assemble::assemble(raw, &mut warnings)?;
    world.generation = Some(generation);
    Ok((world, warnings))
}

/// Convenience wrapper over [`load_level`] for on-disk files.
pub fn load_level_file<I: Inflate + ?Sized>(
    path: &Path,
    generation: Generation,
    options: &LoaderOptions,
    inflater: &I,
) -> Result<(World, Vec<Warning>), LoadError> {
    let file = BufReader::new(File::open(path)?);
    load_level(file, generation, options, inflater)
}

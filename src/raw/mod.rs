//! Raw decode phase: version probing, loader options, and the per-generation
//! table sequences
//!
//! A raw level is the file's tables decoded into plain records, with every
//! cross-reference still numeric (behind its typed wrapper). No resolution
//! happens here; that is the assembler's job. What this module owns is the
//! exact order and width of every table each generation writes.

pub mod animation;
pub mod records;
pub mod room;
pub mod texture;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{FormatError, Warning};
use crate::reader::LevelReader;
use animation::{RawAnimationGroup, RawMeshBlock};
use records::{
    read_items, read_zones, sound_map_size, AiObject, RawBox, RawCameraSlot,
    CinematicFrame, FlybyCamera, RawItem, SoundDetails, SoundSource,
    SpriteSequence, SpriteTexture, StaticMesh, ZoneSet,
};
use room::RawRoom;
use std::io::{Cursor, Read, Seek};
use texture::{FramedBlock, Inflate, PageCounts};

/// Hard caps on declared counts. Real content sits far below every one of
/// these; a count above them means the stream is desynchronized or hostile.
pub mod limits {
    pub const MAX_ROOMS: usize = 2048;
    pub const MAX_ROOM_VERTICES: usize = 65_536;
    pub const MAX_ROOM_FACES: usize = 65_536;
    pub const MAX_ROOM_PORTALS: usize = 512;
    pub const MAX_ROOM_LIGHTS: usize = 512;
    pub const MAX_ROOM_STATIC_MESHES: usize = 256;
    pub const MAX_ROOM_LAYERS: usize = 512;
    pub const MAX_FLOOR_DATA_WORDS: usize = 1 << 20;
    pub const MAX_MESH_WORDS: usize = 1 << 22;
    pub const MAX_MESH_POINTERS: usize = 1 << 16;
    pub const MAX_ANIMATIONS: usize = 1 << 16;
    pub const MAX_TRANSITIONS: usize = 1 << 16;
    pub const MAX_ANIM_COMMANDS: usize = 1 << 18;
    pub const MAX_BONE_TREE_WORDS: usize = 1 << 18;
    pub const MAX_POSE_FRAME_WORDS: usize = 1 << 22;
    pub const MAX_MODELS: usize = 1 << 14;
    pub const MAX_STATIC_MESHES: usize = 1 << 12;
    pub const MAX_SPRITE_TEXTURES: usize = 1 << 14;
    pub const MAX_SPRITE_SEQUENCES: usize = 1 << 14;
    pub const MAX_CAMERA_SLOTS: usize = 1 << 14;
    pub const MAX_FLYBY_CAMERAS: usize = 1 << 14;
    pub const MAX_SOUND_SOURCES: usize = 1 << 14;
    /// Box indices are stored in 14 bits.
    pub const MAX_BOXES: usize = 1 << 14;
    pub const MAX_OVERLAPS: usize = 1 << 18;
    /// Bound on a single box's overlap chain walk.
    pub const MAX_OVERLAP_CHAIN: usize = 1 << 14;
    pub const MAX_ANIMATED_TEXTURE_WORDS: usize = 1 << 18;
    pub const MAX_OBJECT_TEXTURES: usize = 1 << 17;
    pub const MAX_ITEMS: usize = 1 << 14;
    pub const MAX_AI_OBJECTS: usize = 1 << 12;
    pub const MAX_CINEMATIC_FRAMES: usize = 1 << 16;
    pub const MAX_SOUND_DETAILS: usize = 1 << 14;
    pub const MAX_SAMPLE_INDICES: usize = 1 << 14;
    pub const MAX_SAMPLES: usize = 1 << 14;
    pub const MAX_TEXTURE_PAGES: usize = 512;
    /// Cap on a single framed texture/geometry block.
    pub const MAX_BLOCK_BYTES: usize = 1 << 28;
}

/// Format generation. Decides every table's order and width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Generation {
    Tr1,
    Tr2,
    Tr3,
    Tr4,
    /// Shares its leading magic with [`Generation::Tr4`]; a bare byte stream
    /// cannot distinguish them, so G5 is always selected by the caller.
    Tr5,
}

impl Generation {
    /// Map a leading version magic to its generation. G4 and G5 share the
    /// 'TR4\0' magic; this answers G4 for it.
    pub fn from_magic(magic: u32) -> Result<Self, FormatError> {
        match magic {
            0x0000_0020 => Ok(Generation::Tr1),
            0x0000_002D => Ok(Generation::Tr2),
            0xFF08_0038 | 0xFF18_0038 | 0xFF18_0034 => Ok(Generation::Tr3),
            0x0034_5254 => Ok(Generation::Tr4),
            other => Err(FormatError::BadMagic(other)),
        }
    }

    /// Whether `magic` is a legal leading magic for this generation.
    pub fn accepts_magic(self, magic: u32) -> bool {
        match Self::from_magic(magic) {
            Ok(Generation::Tr4) => matches!(self, Generation::Tr4 | Generation::Tr5),
            Ok(g) => g == self,
            Err(_) => false,
        }
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Generation::Tr1 => "G1",
            Generation::Tr2 => "G2",
            Generation::Tr3 => "G3",
            Generation::Tr4 => "G4",
            Generation::Tr5 => "G5",
        };
        f.write_str(s)
    }
}

/// Read the leading magic without consuming the stream position.
pub fn probe_generation<R: Read + Seek>(
    reader: &mut LevelReader<R>,
) -> Result<Generation, FormatError> {
    let pos = reader.tell()?;
    let magic = reader.read_u32()?;
    reader.seek(pos)?;
    Generation::from_magic(magic)
}

/// Tunable loading behavior. Constructible from RON so tooling can ship a
/// config file next to the content it loads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderOptions {
    /// G1 demo builds store the palette before the camera table instead of
    /// after the lightmap.
    pub demo_variant: bool,
    /// Cap on a room's sector grid dimension (either axis).
    pub max_room_dimension: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            demo_variant: false,
            max_room_dimension: 256,
        }
    }
}

fn validate_dimension(value: usize, context: &str) -> Result<(), String> {
    if value == 0 || value > 1024 {
        return Err(format!("{}: {} outside 1..=1024", context, value));
    }
    Ok(())
}

impl LoaderOptions {
    pub fn from_ron_str(s: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(s)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, FormatError> {
        let text = std::fs::read_to_string(path)?;
        let options = Self::from_ron_str(&text)
            .map_err(|e| FormatError::BadStructure(format!("options file: {}", e)))?;
        options.validate().map_err(FormatError::BadStructure)?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_dimension(self.max_room_dimension, "max_room_dimension")
    }

    pub fn to_ron(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }
}

/// Every table of one level, decoded but unlinked.
#[derive(Debug, Default)]
pub struct RawLevel {
    pub rooms: Vec<RawRoom>,
    pub floor_data: Vec<u16>,
    pub mesh_block: RawMeshBlock,
    pub animation: RawAnimationGroup,
    pub static_meshes: Vec<StaticMesh>,
    pub sprite_textures: Vec<SpriteTexture>,
    pub sprite_sequences: Vec<SpriteSequence>,
    pub camera_slots: Vec<RawCameraSlot>,
    pub flyby_cameras: Vec<FlybyCamera>,
    pub sound_sources: Vec<SoundSource>,
    pub boxes: Vec<RawBox>,
    pub overlaps: Vec<u16>,
    pub base_zones: Vec<ZoneSet>,
    pub alternate_zones: Vec<ZoneSet>,
    pub animated_texture_words: Vec<u16>,
    pub items: Vec<RawItem>,
    pub ai_objects: Vec<AiObject>,
    pub cinematic_frames: Vec<CinematicFrame>,
    pub demo_data: Vec<u8>,
    pub sound_map: Vec<i16>,
    pub sound_details: Vec<SoundDetails>,
    pub sample_indices: Vec<u32>,
    /// Counts for payloads that are skipped, not carried.
    pub texture_pages: u32,
    pub object_textures: u32,
    pub samples: u32,
}

impl RawLevel {
    /// Decode the whole stream for `generation`. The magic is verified
    /// against the caller's tag (G5 accepts the shared G4 magic).
    pub fn read<R: Read + Seek, I: Inflate + ?Sized>(
        reader: &mut LevelReader<R>,
        generation: Generation,
        options: &LoaderOptions,
        inflater: &I,
        warnings: &mut Vec<Warning>,
    ) -> Result<Self, FormatError> {
        let magic = reader.read_u32()?;
        if !generation.accepts_magic(magic) {
            return Err(FormatError::BadMagic(magic));
        }
        info!("decoding {} level ({} bytes)", generation, reader.size());
        match generation {
            Generation::Tr1 => Self::read_g1(reader, options, warnings),
            Generation::Tr2 | Generation::Tr3 => {
                Self::read_g2_g3(reader, generation, options, warnings)
            }
            Generation::Tr4 => Self::read_g4(reader, options, inflater, warnings),
            Generation::Tr5 => Self::read_g5(reader, options, warnings),
        }
    }

    fn read_g1<R: Read + Seek>(
        reader: &mut LevelReader<R>,
        options: &LoaderOptions,
        warnings: &mut Vec<Warning>,
    ) -> Result<Self, FormatError> {
        let mut level = Self {
            texture_pages: texture::skip_paged_block_8(reader)?,
            ..Self::default()
        };
        reader.read_u32()?; // unused slot after the texture block

        level.read_rooms_and_geometry(reader, Generation::Tr1, options, warnings)?;
        level.static_meshes = read_counted(reader, limits::MAX_STATIC_MESHES, "static meshes", StaticMesh::read)?;
        level.object_textures = skip_object_textures(reader, Generation::Tr1)?;
        level.read_sprites(reader)?;

        if options.demo_variant {
            reader.skip(texture::PALETTE_BYTES_8)?;
        }

        level.read_navigation(reader, Generation::Tr1, warnings)?;
        level.read_animated_textures(reader)?;
        level.items = read_items(reader, Generation::Tr1, warnings)?;

        reader.skip(texture::LIGHTMAP_BYTES)?;
        if !options.demo_variant {
            reader.skip(texture::PALETTE_BYTES_8)?;
        }

        level.read_cinematic_and_demo(reader)?;
        level.read_sound_tables(reader, Generation::Tr1)?;

        // G1 carries sample payloads inline, before the index table.
        let sample_bytes = reader.read_u32()? as u64;
        reader.skip(sample_bytes)?;
        level.samples = sample_bytes as u32;
        let n = reader.read_u32()? as usize;
        level.sample_indices =
            reader.read_vector(n, limits::MAX_SAMPLE_INDICES, "sample indices", |r| {
                r.read_u32()
            })?;
        Ok(level)
    }

    fn read_g2_g3<R: Read + Seek>(
        reader: &mut LevelReader<R>,
        generation: Generation,
        options: &LoaderOptions,
        warnings: &mut Vec<Warning>,
    ) -> Result<Self, FormatError> {
        reader.skip(texture::PALETTE_BYTES_8)?;
        reader.skip(texture::PALETTE_BYTES_16)?;
        let mut level = Self {
            texture_pages: texture::skip_paged_block_8(reader)?,
            ..Self::default()
        };
        texture::skip_pages_16(reader, level.texture_pages)?;
        reader.read_u32()?; // unused

        level.read_rooms_and_geometry(reader, generation, options, warnings)?;
        level.static_meshes = read_counted(reader, limits::MAX_STATIC_MESHES, "static meshes", StaticMesh::read)?;
        if generation == Generation::Tr2 {
            level.object_textures = skip_object_textures(reader, generation)?;
        }
        level.read_sprites(reader)?;
        level.read_navigation(reader, generation, warnings)?;
        level.read_animated_textures(reader)?;
        if generation == Generation::Tr3 {
            // Moved after the animated-texture table in this generation.
            level.object_textures = skip_object_textures(reader, generation)?;
        }
        level.items = read_items(reader, generation, warnings)?;

        reader.skip(texture::LIGHTMAP_BYTES)?;
        level.read_cinematic_and_demo(reader)?;
        level.read_sound_tables(reader, generation)?;

        // Sample payloads live in an external archive; only indices here.
        let n = reader.read_u32()? as usize;
        level.sample_indices =
            reader.read_vector(n, limits::MAX_SAMPLE_INDICES, "sample indices", |r| {
                r.read_u32()
            })?;
        Ok(level)
    }

    fn read_g4<R: Read + Seek, I: Inflate + ?Sized>(
        reader: &mut LevelReader<R>,
        options: &LoaderOptions,
        inflater: &I,
        warnings: &mut Vec<Warning>,
    ) -> Result<Self, FormatError> {
        let pages = PageCounts::read(reader)?;
        FramedBlock::skip(reader, "32-bit texture block")?;
        FramedBlock::skip(reader, "16-bit texture block")?;
        FramedBlock::skip(reader, "misc texture block")?;

        // The whole geometry section is one compressed block; every table
        // below is decoded from the inflated bytes, never the outer stream.
        let geometry = FramedBlock::read(reader, "geometry block")?.inflate(inflater)?;
        let mut inner = LevelReader::new(Cursor::new(geometry))?;
        let mut level =
            Self::read_geometry_g4_g5(&mut inner, Generation::Tr4, options, warnings)?;
        level.texture_pages = pages.total() as u32;
        if !inner.is_eof()? {
            warnings.push(Warning::SuspectValue {
                what: "geometry block".to_string(),
                detail: format!(
                    "{} trailing bytes after the last table",
                    inner.size() - inner.tell()?
                ),
            });
        }

        level.samples = Self::skip_samples(reader)?;
        Ok(level)
    }

    fn read_g5<R: Read + Seek>(
        reader: &mut LevelReader<R>,
        options: &LoaderOptions,
        warnings: &mut Vec<Warning>,
    ) -> Result<Self, FormatError> {
        let pages = PageCounts::read(reader)?;
        FramedBlock::skip(reader, "32-bit texture block")?;
        FramedBlock::skip(reader, "16-bit texture block")?;
        FramedBlock::skip(reader, "misc texture block")?;

        reader.read_u16()?; // lara type
        reader.read_u16()?; // weather type
        for i in 0..7 {
            let v = reader.read_u32()?;
            if v != 0 {
                warnings.push(Warning::BadSeparator {
                    what: format!("g5 padding word {}", i),
                    found: v,
                });
            }
        }

        // Same frame as G4's geometry block, but stored flat.
        let uncompressed = reader.read_u32()?;
        let stored = reader.read_u32()?;
        if uncompressed != stored {
            warnings.push(Warning::SuspectValue {
                what: "g5 geometry block".to_string(),
                detail: format!("sizes disagree ({} vs {})", uncompressed, stored),
            });
        }

        let mut level = Self::read_geometry_g4_g5(reader, Generation::Tr5, options, warnings)?;
        level.texture_pages = pages.total() as u32;

        for i in 0..6 {
            let v = reader.read_u8()?;
            if v != 0xCD {
                warnings.push(Warning::BadSeparator {
                    what: format!("g5 sample separator byte {}", i),
                    found: v as u32,
                });
            }
        }
        level.samples = Self::skip_samples(reader)?;
        Ok(level)
    }

    /// Shared G4/G5 geometry table sequence.
    fn read_geometry_g4_g5<R: Read + Seek>(
        reader: &mut LevelReader<R>,
        generation: Generation,
        options: &LoaderOptions,
        warnings: &mut Vec<Warning>,
    ) -> Result<Self, FormatError> {
        let mut level = Self::default();
        if generation == Generation::Tr5 {
            reader.read_u32()?; // unused slot
        }
        level.read_rooms_and_geometry(reader, generation, options, warnings)?;
        level.static_meshes = read_counted(reader, limits::MAX_STATIC_MESHES, "static meshes", StaticMesh::read)?;

        expect_text_marker(reader, "SPR", generation == Generation::Tr5)?;
        level.read_sprites(reader)?;
        level.read_navigation(reader, generation, warnings)?;
        level.read_animated_textures(reader)?;
        reader.read_u8()?; // animated-texture UV count
        expect_text_marker(reader, "TEX", generation == Generation::Tr5)?;
        level.object_textures = skip_object_textures(reader, generation)?;

        level.items = read_items(reader, generation, warnings)?;
        level.ai_objects =
            read_counted(reader, limits::MAX_AI_OBJECTS, "ai objects", AiObject::read)?;

        let n = reader.read_u16()? as usize;
        level.demo_data = reader.read_bytes(n)?;

        level.read_sound_tables(reader, generation)?;
        let n = reader.read_u32()? as usize;
        level.sample_indices =
            reader.read_vector(n, limits::MAX_SAMPLE_INDICES, "sample indices", |r| {
                r.read_u32()
            })?;
        Ok(level)
    }

    /// Rooms, floor data, mesh block, animation group. Identical position in
    /// every generation's sequence.
    fn read_rooms_and_geometry<R: Read + Seek>(
        &mut self,
        reader: &mut LevelReader<R>,
        generation: Generation,
        options: &LoaderOptions,
        warnings: &mut Vec<Warning>,
    ) -> Result<(), FormatError> {
        let num_rooms = match generation {
            Generation::Tr5 => reader.read_u32()? as usize,
            _ => reader.read_u16()? as usize,
        };
        self.rooms = reader.read_vector(num_rooms, limits::MAX_ROOMS, "rooms", |r| {
            RawRoom::read(r, generation, options, warnings)
        })?;
        debug!("{} rooms", self.rooms.len());

        let n = reader.read_u32()? as usize;
        self.floor_data = reader.read_u16_vector(n, limits::MAX_FLOOR_DATA_WORDS, "floor data")?;
        self.mesh_block = RawMeshBlock::read(reader)?;
        self.animation = RawAnimationGroup::read(reader, generation, warnings)?;
        Ok(())
    }

    fn read_sprites<R: Read + Seek>(
        &mut self,
        reader: &mut LevelReader<R>,
    ) -> Result<(), FormatError> {
        self.sprite_textures = read_counted(
            reader,
            limits::MAX_SPRITE_TEXTURES,
            "sprite textures",
            SpriteTexture::read,
        )?;
        self.sprite_sequences = read_counted(
            reader,
            limits::MAX_SPRITE_SEQUENCES,
            "sprite sequences",
            SpriteSequence::read,
        )?;
        Ok(())
    }

    /// Camera slots, flybys (G4+), sound sources, boxes, overlaps, zones.
    fn read_navigation<R: Read + Seek>(
        &mut self,
        reader: &mut LevelReader<R>,
        generation: Generation,
        warnings: &mut Vec<Warning>,
    ) -> Result<(), FormatError> {
        self.camera_slots = read_counted(
            reader,
            limits::MAX_CAMERA_SLOTS,
            "camera slots",
            RawCameraSlot::read,
        )?;
        if matches!(generation, Generation::Tr4 | Generation::Tr5) {
            self.flyby_cameras = read_counted(
                reader,
                limits::MAX_FLYBY_CAMERAS,
                "flyby cameras",
                FlybyCamera::read,
            )?;
        }
        self.sound_sources = read_counted(
            reader,
            limits::MAX_SOUND_SOURCES,
            "sound sources",
            SoundSource::read,
        )?;

        let n = reader.read_u32()? as usize;
        if n > limits::MAX_BOXES {
            return Err(FormatError::BadCount {
                what: "boxes",
                count: n as u64,
                cap: limits::MAX_BOXES as u64,
            });
        }
        self.boxes = Vec::with_capacity(n);
        for i in 0..n {
            self.boxes.push(RawBox::read(reader, generation, i, warnings)?);
        }

        let n = reader.read_u32()? as usize;
        self.overlaps = reader.read_u16_vector(n, limits::MAX_OVERLAPS, "overlaps")?;
        let (base, alternate) = read_zones(reader, generation, self.boxes.len())?;
        self.base_zones = base;
        self.alternate_zones = alternate;
        debug!(
            "{} boxes, {} overlap words, {} camera slots",
            self.boxes.len(),
            self.overlaps.len(),
            self.camera_slots.len()
        );
        Ok(())
    }

    fn read_animated_textures<R: Read + Seek>(
        &mut self,
        reader: &mut LevelReader<R>,
    ) -> Result<(), FormatError> {
        let n = reader.read_u32()? as usize;
        self.animated_texture_words =
            reader.read_u16_vector(n, limits::MAX_ANIMATED_TEXTURE_WORDS, "animated textures")?;
        Ok(())
    }

    fn read_cinematic_and_demo<R: Read + Seek>(
        &mut self,
        reader: &mut LevelReader<R>,
    ) -> Result<(), FormatError> {
        let n = reader.read_u16()? as usize;
        self.cinematic_frames = reader.read_vector(
            n,
            limits::MAX_CINEMATIC_FRAMES,
            "cinematic frames",
            CinematicFrame::read,
        )?;
        let n = reader.read_u16()? as usize;
        self.demo_data = reader.read_bytes(n)?;
        Ok(())
    }

    fn read_sound_tables<R: Read + Seek>(
        &mut self,
        reader: &mut LevelReader<R>,
        generation: Generation,
    ) -> Result<(), FormatError> {
        let entries = sound_map_size(generation);
        self.sound_map = reader.read_vector(entries, entries, "sound map", |r| r.read_i16())?;
        let n = reader.read_u32()? as usize;
        self.sound_details =
            reader.read_vector(n, limits::MAX_SOUND_DETAILS, "sound details", |r| {
                SoundDetails::read(r, generation)
            })?;
        Ok(())
    }

    /// G4/G5 trailing sample archive: per-sample size frame + payload.
    fn skip_samples<R: Read + Seek>(reader: &mut LevelReader<R>) -> Result<u32, FormatError> {
        let n = reader.read_u32()?;
        if n as usize > limits::MAX_SAMPLES {
            return Err(FormatError::BadCount {
                what: "samples",
                count: n as u64,
                cap: limits::MAX_SAMPLES as u64,
            });
        }
        for _ in 0..n {
            FramedBlock::skip(reader, "sample")?;
        }
        Ok(n)
    }
}

fn read_counted<R: Read + Seek, T, F>(
    reader: &mut LevelReader<R>,
    cap: usize,
    what: &'static str,
    f: F,
) -> Result<Vec<T>, FormatError>
where
    F: FnMut(&mut LevelReader<R>) -> Result<T, FormatError>,
{
    let n = reader.read_u32()? as usize;
    reader.read_vector(n, cap, what, f)
}

fn object_texture_size(generation: Generation) -> u64 {
    match generation {
        Generation::Tr1 | Generation::Tr2 | Generation::Tr3 => 20,
        Generation::Tr4 => 38,
        Generation::Tr5 => 40,
    }
}

/// Object textures are carried as an opaque span; only the count is kept.
fn skip_object_textures<R: Read + Seek>(
    reader: &mut LevelReader<R>,
    generation: Generation,
) -> Result<u32, FormatError> {
    let n = reader.read_u32()?;
    if n as usize > limits::MAX_OBJECT_TEXTURES {
        return Err(FormatError::BadCount {
            what: "object textures",
            count: n as u64,
            cap: limits::MAX_OBJECT_TEXTURES as u64,
        });
    }
    reader.skip(n as u64 * object_texture_size(generation))?;
    Ok(n)
}

/// G4 markers are bare ASCII; G5 appends a NUL.
fn expect_text_marker<R: Read + Seek>(
    reader: &mut LevelReader<R>,
    name: &'static str,
    nul_terminated: bool,
) -> Result<(), FormatError> {
    for byte in name.bytes() {
        reader.expect_marker(byte, name)?;
    }
    if nul_terminated {
        reader.expect_marker(0, name)?;
    }
    Ok(())
}

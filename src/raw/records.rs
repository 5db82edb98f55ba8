//! Navigation boxes, zones, placements and the audio/demo tail tables

use glam::IVec3;

use crate::error::{FormatError, Warning};
use crate::raw::room::read_ivec3_32;
use crate::raw::{limits, Generation};
use crate::reader::LevelReader;
use crate::refs::{RoomTable, TableIndex};
use std::io::{Read, Seek};

/// Overlap word flag: box is currently blocked (initial simulation state).
pub const OVERLAP_BLOCKED: u16 = 0x4000;
/// Overlap word flag: box can be blocked by a pushable.
pub const OVERLAP_BLOCKABLE: u16 = 0x8000;
/// Low bits of the overlap word: first index into the overlap table.
pub const OVERLAP_INDEX_MASK: u16 = 0x3fff;

/// Overlap list terminator bit on the listed box indices.
pub const OVERLAP_END_BIT: u16 = 0x8000;

/// One navigation box. G1 stores world-unit extents; G2+ stores sector-unit
/// bytes which are widened here so both come out in world units.
#[derive(Debug, Clone, Copy)]
pub struct RawBox {
    pub zmin: i32,
    pub zmax: i32,
    pub xmin: i32,
    pub xmax: i32,
    /// Floor height, file axes.
    pub floor: i16,
    /// Packed overlap word: index + blocked/blockable flags.
    pub overlap_word: u16,
}

impl RawBox {
    pub fn read<R: Read + Seek>(
        reader: &mut LevelReader<R>,
        generation: Generation,
        index: usize,
        warnings: &mut Vec<Warning>,
    ) -> Result<Self, FormatError> {
        let (zmin, zmax, xmin, xmax) = match generation {
            Generation::Tr1 => (
                reader.read_i32()?,
                reader.read_i32()?,
                reader.read_i32()?,
                reader.read_i32()?,
            ),
            _ => (
                reader.read_u8()? as i32 * 1024,
                reader.read_u8()? as i32 * 1024,
                reader.read_u8()? as i32 * 1024,
                reader.read_u8()? as i32 * 1024,
            ),
        };
        if zmax - zmin < 1024 || xmax - xmin < 1024 {
            warnings.push(Warning::SuspectValue {
                what: format!("box {}", index),
                detail: format!(
                    "extent smaller than one sector (z {}..{}, x {}..{})",
                    zmin, zmax, xmin, xmax
                ),
            });
        }
        Ok(Self {
            zmin,
            zmax,
            xmin,
            xmax,
            floor: reader.read_i16()?,
            overlap_word: reader.read_u16()?,
        })
    }

    pub fn overlap_index(&self) -> usize {
        (self.overlap_word & OVERLAP_INDEX_MASK) as usize
    }

    pub fn initially_blocked(&self) -> bool {
        self.overlap_word & OVERLAP_BLOCKED != 0
    }

    pub fn blockable(&self) -> bool {
        self.overlap_word & OVERLAP_BLOCKABLE != 0
    }
}

/// One zone id set for one box. G1 has two ground zones; later generations
/// add two more, left zero for G1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZoneSet {
    pub ground1: u16,
    pub ground2: u16,
    pub ground3: u16,
    pub ground4: u16,
    pub fly: u16,
}

/// One zone block: whole `u16[num_boxes]` arrays, one per zone field, not
/// one record per box. G1 carries two ground arrays and fly; later
/// generations carry four ground arrays.
fn read_zone_block<R: Read + Seek>(
    reader: &mut LevelReader<R>,
    generation: Generation,
    num_boxes: usize,
    what: &'static str,
) -> Result<Vec<ZoneSet>, FormatError> {
    let mut array =
        |r: &mut LevelReader<R>| r.read_u16_vector(num_boxes, limits::MAX_BOXES, what);
    let ground1 = array(reader)?;
    let ground2 = array(reader)?;
    let (ground3, ground4) = match generation {
        Generation::Tr1 => (vec![0; num_boxes], vec![0; num_boxes]),
        _ => (array(reader)?, array(reader)?),
    };
    let fly = array(reader)?;
    Ok((0..num_boxes)
        .map(|i| ZoneSet {
            ground1: ground1[i],
            ground2: ground2[i],
            ground3: ground3[i],
            ground4: ground4[i],
            fly: fly[i],
        })
        .collect())
}

/// Zone tables: the base block of arrays, then the alternate block.
pub fn read_zones<R: Read + Seek>(
    reader: &mut LevelReader<R>,
    generation: Generation,
    num_boxes: usize,
) -> Result<(Vec<ZoneSet>, Vec<ZoneSet>), FormatError> {
    let base = read_zone_block(reader, generation, num_boxes, "base zones")?;
    let alternate = read_zone_block(reader, generation, num_boxes, "alternate zones")?;
    Ok((base, alternate))
}

/// Raw camera-or-sink slot. The two trailing words carry different meanings
/// depending on which kind the slot turns out to be; splitting happens at
/// link time once floor data names the sinks.
#[derive(Debug, Clone, Copy)]
pub struct RawCameraSlot {
    pub position: IVec3,
    pub word1: u16,
    pub word2: u16,
}

impl RawCameraSlot {
    pub fn read<R: Read + Seek>(reader: &mut LevelReader<R>) -> Result<Self, FormatError> {
        Ok(Self {
            position: read_ivec3_32(reader)?,
            word1: reader.read_u16()?,
            word2: reader.read_u16()?,
        })
    }
}

/// Scripted camera path node (G4+).
#[derive(Debug, Clone, Copy)]
pub struct FlybyCamera {
    pub position: IVec3,
    pub direction: IVec3,
    pub sequence: i8,
    pub index: i8,
    pub fov: u16,
    pub roll: u16,
    pub timer: u16,
    pub speed: u16,
    pub flags: u16,
    pub room: TableIndex<RoomTable>,
}

impl FlybyCamera {
    pub fn read<R: Read + Seek>(reader: &mut LevelReader<R>) -> Result<Self, FormatError> {
        Ok(Self {
            position: read_ivec3_32(reader)?,
            direction: read_ivec3_32(reader)?,
            sequence: reader.read_i8()?,
            index: reader.read_i8()?,
            fov: reader.read_u16()?,
            roll: reader.read_u16()?,
            timer: reader.read_u16()?,
            speed: reader.read_u16()?,
            flags: reader.read_u16()?,
            room: TableIndex::new(reader.read_u32()?),
        })
    }
}

/// AI placement hint (G4+).
#[derive(Debug, Clone, Copy)]
pub struct AiObject {
    pub object_id: u16,
    pub room: TableIndex<RoomTable>,
    pub position: IVec3,
    pub ocb: u16,
    pub flags: u16,
    pub angle: i32,
}

impl AiObject {
    pub fn read<R: Read + Seek>(reader: &mut LevelReader<R>) -> Result<Self, FormatError> {
        Ok(Self {
            object_id: reader.read_u16()?,
            room: TableIndex::new(reader.read_u16()? as u32),
            position: read_ivec3_32(reader)?,
            ocb: reader.read_u16()?,
            flags: reader.read_u16()?,
            angle: reader.read_i32()?,
        })
    }
}

/// Flag: source plays only while the alternate room set is active.
pub const SOUND_SOURCE_IF_SWAPPED: u16 = 0x40;
/// Flag: source plays only while the base room set is active.
pub const SOUND_SOURCE_IF_NOT_SWAPPED: u16 = 0x80;

/// Positional looping sound emitter.
#[derive(Debug, Clone, Copy)]
pub struct SoundSource {
    pub position: IVec3,
    pub sound_id: u16,
    pub flags: u16,
}

impl SoundSource {
    pub fn read<R: Read + Seek>(reader: &mut LevelReader<R>) -> Result<Self, FormatError> {
        Ok(Self {
            position: read_ivec3_32(reader)?,
            sound_id: reader.read_u16()?,
            flags: reader.read_u16()?,
        })
    }
}

/// Item (entity) placement.
#[derive(Debug, Clone, Copy)]
pub struct RawItem {
    pub object_id: i16,
    pub room: TableIndex<RoomTable>,
    pub position: IVec3,
    pub angle: i16,
    pub shade: i16,
    pub shade2: i16,
    pub ocb: u16,
    pub flags: u16,
}

impl RawItem {
    pub fn read<R: Read + Seek>(
        reader: &mut LevelReader<R>,
        generation: Generation,
    ) -> Result<Self, FormatError> {
        let object_id = reader.read_i16()?;
        let room = TableIndex::new(reader.read_u16()? as u32);
        let position = read_ivec3_32(reader)?;
        let angle = reader.read_i16()?;
        let inverted = |v: i16| if v >= 0 { (8191 - v) << 2 } else { v };
        let (shade, shade2, ocb) = match generation {
            Generation::Tr1 => {
                let s = inverted(reader.read_i16()?);
                (s, s, 0)
            }
            Generation::Tr2 => {
                let s = inverted(reader.read_i16()?);
                (s, inverted(reader.read_i16()?), 0)
            }
            Generation::Tr3 => {
                let s = reader.read_i16()?;
                (s, reader.read_i16()?, 0)
            }
            Generation::Tr4 | Generation::Tr5 => {
                let s = reader.read_i16()?;
                (s, s, reader.read_u16()?)
            }
        };
        Ok(Self {
            object_id,
            room,
            position,
            angle,
            shade,
            shade2,
            ocb,
            flags: reader.read_u16()?,
        })
    }
}

fn item_record_size(generation: Generation) -> u64 {
    match generation {
        Generation::Tr1 => 22,
        Generation::Tr2 | Generation::Tr3 => 24,
        Generation::Tr4 | Generation::Tr5 => 24,
    }
}

pub fn read_items<R: Read + Seek>(
    reader: &mut LevelReader<R>,
    generation: Generation,
    warnings: &mut Vec<Warning>,
) -> Result<Vec<RawItem>, FormatError> {
    let n = reader.read_u32()? as usize;
    reader.read_vector_capped(
        n,
        limits::MAX_ITEMS,
        item_record_size(generation),
        "items",
        warnings,
        |r| RawItem::read(r, generation),
    )
}

/// Static mesh definition: mesh pointer slot plus two bounding boxes.
#[derive(Debug, Clone, Copy)]
pub struct StaticMesh {
    pub id: u32,
    pub mesh: u16,
    pub visibility_box: [i16; 6],
    pub collision_box: [i16; 6],
    pub flags: u16,
}

impl StaticMesh {
    pub fn read<R: Read + Seek>(reader: &mut LevelReader<R>) -> Result<Self, FormatError> {
        let id = reader.read_u32()?;
        let mesh = reader.read_u16()?;
        let mut visibility_box = [0i16; 6];
        for v in &mut visibility_box {
            *v = reader.read_i16()?;
        }
        let mut collision_box = [0i16; 6];
        for v in &mut collision_box {
            *v = reader.read_i16()?;
        }
        Ok(Self {
            id,
            mesh,
            visibility_box,
            collision_box,
            flags: reader.read_u16()?,
        })
    }
}

/// One cinematic camera frame (eight packed words).
#[derive(Debug, Clone, Copy)]
pub struct CinematicFrame {
    pub words: [i16; 8],
}

impl CinematicFrame {
    pub fn read<R: Read + Seek>(reader: &mut LevelReader<R>) -> Result<Self, FormatError> {
        let mut words = [0i16; 8];
        for w in &mut words {
            *w = reader.read_i16()?;
        }
        Ok(Self { words })
    }
}

/// Sound effect playback properties. Field widths differ across generations;
/// the G3+ packing is widened into the common shape.
#[derive(Debug, Clone, Copy)]
pub struct SoundDetails {
    pub sample: u16,
    pub volume: u16,
    pub chance: u16,
    pub range: u8,
    pub pitch: i8,
    pub characteristics: u16,
}

impl SoundDetails {
    pub fn read<R: Read + Seek>(
        reader: &mut LevelReader<R>,
        generation: Generation,
    ) -> Result<Self, FormatError> {
        match generation {
            Generation::Tr1 | Generation::Tr2 => Ok(Self {
                sample: reader.read_u16()?,
                volume: reader.read_u16()?,
                chance: reader.read_u16()?,
                range: 8,
                pitch: 0,
                characteristics: reader.read_u16()?,
            }),
            _ => Ok(Self {
                sample: reader.read_u16()?,
                volume: reader.read_u8()? as u16,
                range: reader.read_u8()?,
                chance: reader.read_u8()? as u16,
                pitch: reader.read_i8()?,
                characteristics: reader.read_u16()?,
            }),
        }
    }
}

/// Sprite atlas entry (same 16-byte layout across all generations).
#[derive(Debug, Clone, Copy)]
pub struct SpriteTexture {
    pub tile: u16,
    pub x: u8,
    pub y: u8,
    pub width: u16,
    pub height: u16,
    pub left: i16,
    pub top: i16,
    pub right: i16,
    pub bottom: i16,
}

impl SpriteTexture {
    pub fn read<R: Read + Seek>(reader: &mut LevelReader<R>) -> Result<Self, FormatError> {
        Ok(Self {
            tile: reader.read_u16()?,
            x: reader.read_u8()?,
            y: reader.read_u8()?,
            width: reader.read_u16()?,
            height: reader.read_u16()?,
            left: reader.read_i16()?,
            top: reader.read_i16()?,
            right: reader.read_i16()?,
            bottom: reader.read_i16()?,
        })
    }
}

/// Run of sprite textures forming one logical sprite.
#[derive(Debug, Clone, Copy)]
pub struct SpriteSequence {
    pub type_id: u32,
    /// Stored negated on disk.
    pub length: i16,
    pub offset: u16,
}

impl SpriteSequence {
    pub fn read<R: Read + Seek>(reader: &mut LevelReader<R>) -> Result<Self, FormatError> {
        Ok(Self {
            type_id: reader.read_u32()?,
            length: reader.read_i16()?,
            offset: reader.read_u16()?,
        })
    }
}

/// Number of entries in the sound id -> effect property map.
pub fn sound_map_size(generation: Generation) -> usize {
    match generation {
        Generation::Tr1 => 256,
        Generation::Tr2 | Generation::Tr3 | Generation::Tr4 => 370,
        Generation::Tr5 => 450,
    }
}

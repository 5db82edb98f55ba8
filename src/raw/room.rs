//! Room record decoders, one per format generation
//!
//! Rooms are the hardest single decode: sub-counts are interleaved with data
//! in a fixed order, and the vertex/rectangle/triangle/sprite block carries a
//! declared word length the cursor must be forced to afterwards, because some
//! generations append unknown trailing fields inside it. G5 rooms abandon the
//! sequential layout entirely for a 208-byte header with data offsets and a
//! declared total size.
//!
//! All coordinates here are in file axes (Y grows downward); the assembler
//! flips to up-positive world space.

use bitflags::bitflags;
use glam::{IVec3, Vec3};
use log::warn;

use crate::error::{FormatError, Warning};
use crate::raw::{limits, Generation, LoaderOptions};
use crate::reader::{LevelReader, FILLER};
use crate::refs::{FloorDataTable, RoomTable, TableElement, TableIndex};
use std::io::{Read, Seek};

/// G5 room block tag, 'XELA' on disk.
pub const ROOM_TAG_G5: u32 = 0x414C_4558;

/// Reserved "no room" value in sector stack links.
pub const NO_ROOM: u8 = 0xff;

/// Floor/ceiling click value marking an impassable wall column.
pub const WALL_CLICKS: i8 = -127;

bitflags! {
    /// Room attribute bits. Unknown bits are retained verbatim.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RoomFlags: u16 {
        const WATER = 0x0001;
        /// Relocated here from bit 0x0080 when decoding G3 streams, to keep
        /// one meaning per bit across generations.
        const QUICKSAND = 0x0002;
        const OUTSIDE = 0x0020;
        const NO_LENSFLARE = 0x0080;
    }
}

/// One grid cell of floor/ceiling data, exactly as encoded (8 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSector {
    pub floor_data: TableIndex<FloorDataTable>,
    /// Signed; negative means no box.
    pub box_index: i16,
    pub room_below: u8,
    /// Floor height in quarter-sector clicks, file axes.
    pub floor: i8,
    pub room_above: u8,
    pub ceiling: i8,
}

impl RawSector {
    pub fn read<R: Read + Seek>(reader: &mut LevelReader<R>) -> Result<Self, FormatError> {
        Ok(Self {
            floor_data: TableIndex::new(reader.read_u16()? as u32),
            box_index: reader.read_i16()?,
            room_below: reader.read_u8()?,
            floor: reader.read_i8()?,
            room_above: reader.read_u8()?,
            ceiling: reader.read_i8()?,
        })
    }

    pub fn is_wall(&self) -> bool {
        self.floor == WALL_CLICKS && self.ceiling == WALL_CLICKS
    }
}

/// Directed room connector. Vertices are stored room-local on disk; the room
/// offset is folded in at decode so they come out in world space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPortal {
    pub adjoining_room: TableIndex<RoomTable>,
    pub normal: IVec3,
    pub vertices: [IVec3; 4],
}

impl RawPortal {
    pub fn read<R: Read + Seek>(
        reader: &mut LevelReader<R>,
        room_offset: IVec3,
    ) -> Result<Self, FormatError> {
        let adjoining_room = TableIndex::new(reader.read_u16()? as u32);
        let normal = read_ivec3_16(reader)?;
        let mut vertices = [IVec3::ZERO; 4];
        for v in &mut vertices {
            *v = read_ivec3_16(reader)? + room_offset;
        }
        Ok(Self {
            adjoining_room,
            normal,
            vertices,
        })
    }
}

/// Room mesh vertex. G1..G4 store i16 positions and shades; G5 stores float
/// position/normal plus a packed color. Absent fields default.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub shade: i16,
    pub attributes: u16,
    pub shade2: i16,
    pub color: u32,
}

impl RoomVertex {
    fn read_g1<R: Read + Seek>(reader: &mut LevelReader<R>) -> Result<Self, FormatError> {
        let position = read_vec3_16(reader)?;
        let shade = reader.read_i16()?;
        Ok(Self {
            position,
            normal: Vec3::ZERO,
            shade,
            attributes: 0,
            shade2: shade,
            color: 0,
        })
    }

    fn read_g2<R: Read + Seek>(reader: &mut LevelReader<R>) -> Result<Self, FormatError> {
        let position = read_vec3_16(reader)?;
        // G2 stores brightness inverted; normalize to the common scale.
        let shade = (8191 - reader.read_i16()?).wrapping_mul(4);
        let attributes = reader.read_u16()?;
        let shade2 = (8191 - reader.read_i16()?).wrapping_mul(4);
        Ok(Self {
            position,
            normal: Vec3::ZERO,
            shade,
            attributes,
            shade2,
            color: 0,
        })
    }

    fn read_g3_g4<R: Read + Seek>(reader: &mut LevelReader<R>) -> Result<Self, FormatError> {
        let position = read_vec3_16(reader)?;
        let shade = reader.read_i16()?;
        let attributes = reader.read_u16()?;
        let shade2 = reader.read_i16()?;
        Ok(Self {
            position,
            normal: Vec3::ZERO,
            shade,
            attributes,
            shade2,
            color: 0,
        })
    }

    fn read_g5<R: Read + Seek>(reader: &mut LevelReader<R>) -> Result<Self, FormatError> {
        let position = read_vec3_f(reader)?;
        let normal = read_vec3_f(reader)?;
        let b = reader.read_u8()? as u32;
        let g = reader.read_u8()? as u32;
        let r = reader.read_u8()? as u32;
        let a = reader.read_u8()? as u32;
        Ok(Self {
            position,
            normal,
            shade: 0,
            attributes: 0,
            shade2: 0,
            color: (a << 24) | (r << 16) | (g << 8) | b,
        })
    }

    pub fn read<R: Read + Seek>(
        reader: &mut LevelReader<R>,
        generation: Generation,
    ) -> Result<Self, FormatError> {
        match generation {
            Generation::Tr1 => Self::read_g1(reader),
            Generation::Tr2 => Self::read_g2(reader),
            Generation::Tr3 | Generation::Tr4 => Self::read_g3_g4(reader),
            Generation::Tr5 => Self::read_g5(reader),
        }
    }
}

/// Textured quad, indices into the room vertex list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Face4 {
    pub vertices: [u16; 4],
    pub texture: u16,
}

impl Face4 {
    pub fn read<R: Read + Seek>(reader: &mut LevelReader<R>) -> Result<Self, FormatError> {
        let mut vertices = [0u16; 4];
        for v in &mut vertices {
            *v = reader.read_u16()?;
        }
        Ok(Self {
            vertices,
            texture: reader.read_u16()?,
        })
    }

    /// G5 layer variant carries a trailing lighting word.
    fn read_g5<R: Read + Seek>(reader: &mut LevelReader<R>) -> Result<Self, FormatError> {
        let face = Self::read(reader)?;
        reader.read_u16()?; // lighting
        Ok(face)
    }
}

/// Textured triangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Face3 {
    pub vertices: [u16; 3],
    pub texture: u16,
}

impl Face3 {
    pub fn read<R: Read + Seek>(reader: &mut LevelReader<R>) -> Result<Self, FormatError> {
        let mut vertices = [0u16; 3];
        for v in &mut vertices {
            *v = reader.read_u16()?;
        }
        Ok(Self {
            vertices,
            texture: reader.read_u16()?,
        })
    }

    fn read_g5<R: Read + Seek>(reader: &mut LevelReader<R>) -> Result<Self, FormatError> {
        let face = Self::read(reader)?;
        reader.read_u16()?; // lighting
        Ok(face)
    }
}

/// Sprite placement inside a room (vertex anchor + sprite id).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpriteInstance {
    pub vertex: u16,
    pub id: u16,
}

impl SpriteInstance {
    pub fn read<R: Read + Seek>(reader: &mut LevelReader<R>) -> Result<Self, FormatError> {
        Ok(Self {
            vertex: reader.read_u16()?,
            id: reader.read_u16()?,
        })
    }
}

/// Room light. Only the fields shared across generations are kept; the rest
/// of each generation's record is consumed byte-exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub position: Vec3,
    pub color: [u8; 4],
    pub intensity: i16,
    pub fade: i32,
    pub light_type: u8,
}

impl Light {
    pub fn read<R: Read + Seek>(
        reader: &mut LevelReader<R>,
        generation: Generation,
        warnings: &mut Vec<Warning>,
    ) -> Result<Self, FormatError> {
        match generation {
            Generation::Tr1 => {
                let position = read_vec3_32(reader)?;
                let intensity = reader.read_i16()?;
                let fade = reader.read_i32()?;
                Ok(Self {
                    position,
                    color: [0xff, 0xff, 0xff, 0xff],
                    intensity,
                    fade,
                    light_type: 1,
                })
            }
            Generation::Tr2 => {
                let position = read_vec3_32(reader)?;
                let intensity = reader.read_i16()?;
                reader.read_i16()?; // intensity2
                let fade = reader.read_i32()?;
                reader.read_i32()?; // fade2
                Ok(Self {
                    position,
                    color: [0xff, 0xff, 0xff, 0xff],
                    intensity,
                    fade,
                    light_type: 1,
                })
            }
            Generation::Tr3 => {
                let position = read_vec3_32(reader)?;
                let mut color = [0u8; 4];
                for c in &mut color {
                    *c = reader.read_u8()?;
                }
                let fade = reader.read_i32()?;
                reader.read_i32()?; // fade2
                Ok(Self {
                    position,
                    color,
                    intensity: 0,
                    fade,
                    light_type: 1,
                })
            }
            Generation::Tr4 => {
                let position = read_vec3_32(reader)?;
                let mut color = [0xffu8; 4];
                for c in color.iter_mut().take(3) {
                    *c = reader.read_u8()?;
                }
                let light_type = reader.read_u8()?;
                reader.read_u8()?; // unknown
                let intensity = reader.read_u8()? as i16;
                // inner/outer radius, length, cutoff, direction
                for _ in 0..7 {
                    reader.read_f32()?;
                }
                Ok(Self {
                    position,
                    color,
                    intensity,
                    fade: 0,
                    light_type,
                })
            }
            Generation::Tr5 => {
                // 88-byte float layout ending in three 0xCD separators.
                let position = read_vec3_f(reader)?;
                let mut color = [0u8; 4];
                for c in &mut color {
                    *c = (reader.read_f32()? * 255.0) as u8;
                }
                for _ in 0..5 {
                    reader.read_f32()?; // radii, rad in/out, range
                }
                read_vec3_f(reader)?; // direction
                read_ivec3_32(reader)?; // pos2
                read_ivec3_32(reader)?; // dir2
                let light_type = reader.read_u8()?;
                for i in 0..3 {
                    let sep = reader.read_u8()?;
                    if sep != 0xCD {
                        warn!("g5 light separator {} has wrong value", i);
                        warnings.push(Warning::BadSeparator {
                            what: format!("g5 light separator {}", i),
                            found: sep as u32,
                        });
                    }
                }
                Ok(Self {
                    position,
                    color,
                    intensity: 0,
                    fade: 0,
                    light_type,
                })
            }
        }
    }
}

/// Static mesh placement inside a room.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomStaticMesh {
    pub position: IVec3,
    pub rotation: u16,
    pub shade: i16,
    pub shade2: i16,
    pub object_id: u16,
}

impl RoomStaticMesh {
    pub fn read<R: Read + Seek>(
        reader: &mut LevelReader<R>,
        generation: Generation,
    ) -> Result<Self, FormatError> {
        let position = read_ivec3_32(reader)?;
        let rotation = reader.read_u16()?;
        let shade = reader.read_i16()?;
        let shade2 = match generation {
            Generation::Tr1 => shade,
            _ => reader.read_i16()?,
        };
        Ok(Self {
            position,
            rotation,
            shade,
            shade2,
            object_id: reader.read_u16()?,
        })
    }
}

/// G5 mesh layer descriptor (56 bytes).
#[derive(Debug, Clone, Copy, Default)]
struct Layer {
    num_vertices: u16,
    num_rectangles: u16,
    num_triangles: u16,
}

impl Layer {
    fn read<R: Read + Seek>(
        reader: &mut LevelReader<R>,
        warnings: &mut Vec<Warning>,
    ) -> Result<Self, FormatError> {
        let num_vertices = reader.read_u16()?;
        reader.read_u16()?;
        reader.read_u16()?;
        let num_rectangles = reader.read_u16()?;
        let num_triangles = reader.read_u16()?;
        reader.read_u16()?;
        reader.read_u16()?;
        if reader.read_u16()? != 0 {
            warnings.push(Warning::BadSeparator {
                what: "g5 layer filler".to_string(),
                found: 1,
            });
        }
        for _ in 0..6 {
            reader.read_f32()?; // bounding box
        }
        if reader.read_u32()? != 0 {
            warnings.push(Warning::BadSeparator {
                what: "g5 layer filler2".to_string(),
                found: 1,
            });
        }
        for _ in 0..6 {
            reader.read_i16()?;
        }
        Ok(Self {
            num_vertices,
            num_rectangles,
            num_triangles,
        })
    }
}

/// One decoded room, still carrying raw typed references.
#[derive(Debug, Clone)]
pub struct RawRoom {
    /// Room-local-to-world offset, file axes.
    pub position: IVec3,
    pub y_bottom: i32,
    pub y_top: i32,
    pub vertices: Vec<RoomVertex>,
    pub rectangles: Vec<Face4>,
    pub triangles: Vec<Face3>,
    pub sprites: Vec<SpriteInstance>,
    pub portals: Vec<RawPortal>,
    pub sector_count_z: u16,
    pub sector_count_x: u16,
    pub sectors: Vec<RawSector>,
    pub ambient_shade: i16,
    pub light_mode: i16,
    pub lights: Vec<Light>,
    pub static_meshes: Vec<RoomStaticMesh>,
    /// Signed; negative means no alternate.
    pub alternate_room: i16,
    pub alternate_group: u8,
    pub flags: RoomFlags,
    pub water_scheme: u8,
    pub reverb: u8,
}

impl TableElement<RoomTable> for RawRoom {
    const WIDTH: u32 = 1;
}

impl RawRoom {
    pub fn total_sectors(&self) -> usize {
        self.sector_count_z as usize * self.sector_count_x as usize
    }

    pub fn read<R: Read + Seek>(
        reader: &mut LevelReader<R>,
        generation: Generation,
        options: &LoaderOptions,
        warnings: &mut Vec<Warning>,
    ) -> Result<Self, FormatError> {
        match generation {
            Generation::Tr5 => Self::read_g5(reader, options, warnings),
            _ => Self::read_sequential(reader, generation, options, warnings),
        }
    }

    /// G1..G4 layout: header, declared-length mesh sub-block (with forced
    /// seek), portals, sector grid, lighting, placements, trailing
    /// per-generation bytes.
    fn read_sequential<R: Read + Seek>(
        reader: &mut LevelReader<R>,
        generation: Generation,
        options: &LoaderOptions,
        warnings: &mut Vec<Warning>,
    ) -> Result<Self, FormatError> {
        let x = reader.read_i32()?;
        let z = reader.read_i32()?;
        let y_bottom = reader.read_i32()?;
        let y_top = reader.read_i32()?;
        let position = IVec3::new(x, 0, z);

        let num_data_words = reader.read_u32()? as u64;
        let data_start = reader.tell()?;

        let n = reader.read_u16()? as usize;
        let vertices = reader.read_vector(n, limits::MAX_ROOM_VERTICES, "room vertices", |r| {
            RoomVertex::read(r, generation)
        })?;
        let n = reader.read_u16()? as usize;
        let rectangles =
            reader.read_vector(n, limits::MAX_ROOM_FACES, "room rectangles", Face4::read)?;
        let n = reader.read_u16()? as usize;
        let triangles =
            reader.read_vector(n, limits::MAX_ROOM_FACES, "room triangles", Face3::read)?;
        let n = reader.read_u16()? as usize;
        let sprites = reader.read_vector(
            n,
            limits::MAX_ROOM_FACES,
            "room sprites",
            SpriteInstance::read,
        )?;

        // Some generations hide unknown trailing fields inside the declared
        // block; the cursor position after it is authoritative.
        reader.seek(data_start + num_data_words * 2)?;

        let n = reader.read_u16()? as usize;
        let portals = reader.read_vector(n, limits::MAX_ROOM_PORTALS, "room portals", |r| {
            RawPortal::read(r, position)
        })?;

        let sector_count_z = reader.read_u16()?;
        let sector_count_x = reader.read_u16()?;
        let total = sector_count_z as usize * sector_count_x as usize;
        if sector_count_z as usize > options.max_room_dimension
            || sector_count_x as usize > options.max_room_dimension
        {
            return Err(FormatError::BadCount {
                what: "sector grid dimension",
                count: sector_count_z.max(sector_count_x) as u64,
                cap: options.max_room_dimension as u64,
            });
        }
        let sectors = reader.read_vector(total, usize::MAX, "sectors", RawSector::read)?;

        let mut ambient_shade = reader.read_i16()?;
        let mut light_mode = 0;
        match generation {
            Generation::Tr2 => {
                ambient_shade = (8191 - ambient_shade).wrapping_mul(4);
                reader.read_i16()?; // second pair, same inverted transform
                light_mode = reader.read_i16()?;
            }
            Generation::Tr3 | Generation::Tr4 => {
                reader.read_i16()?; // second ambient word
            }
            _ => {}
        }

        let n = reader.read_u16()? as usize;
        // The per-record reader warns into its own sink; the capped read
        // holds the outer one for its clamp report.
        let mut light_warnings = Vec::new();
        let lights = reader.read_vector_capped(
            n,
            limits::MAX_ROOM_LIGHTS,
            light_record_size(generation),
            "room lights",
            warnings,
            |r| Light::read(r, generation, &mut light_warnings),
        )?;
        warnings.append(&mut light_warnings);
        let n = reader.read_u16()? as usize;
        let static_meshes = reader.read_vector_capped(
            n,
            limits::MAX_ROOM_STATIC_MESHES,
            room_static_mesh_size(generation),
            "room static meshes",
            warnings,
            |r| RoomStaticMesh::read(r, generation),
        )?;

        let alternate_room = reader.read_i16()?;
        let mut flags = reader.read_u16()?;
        let mut alternate_group = 0u8;
        let mut water_scheme = 0u8;
        let mut reverb = 0u8;
        match generation {
            Generation::Tr1 | Generation::Tr2 => {}
            Generation::Tr3 => {
                if flags & 0x0080 != 0 {
                    // Quicksand moved off the lensflare bit.
                    flags = (flags & !0x0080) | 0x0002;
                }
                water_scheme = reader.read_u8()?;
                reverb = reader.read_u8()?;
                reader.read_u8()?; // alternate group override slot, unused
            }
            Generation::Tr4 => {
                water_scheme = reader.read_u8()?;
                reverb = reader.read_u8()?;
                alternate_group = reader.read_u8()?;
            }
            Generation::Tr5 => unreachable!(),
        }

        Ok(Self {
            position,
            y_bottom,
            y_top,
            vertices,
            rectangles,
            triangles,
            sprites,
            portals,
            sector_count_z,
            sector_count_x,
            sectors,
            ambient_shade,
            light_mode,
            lights,
            static_meshes,
            alternate_room,
            alternate_group,
            flags: RoomFlags::from_bits_retain(flags),
            water_scheme,
            reverb,
        })
    }

    /// G5 layout: 'XELA' tag, declared block size, 208-byte header whose data
    /// offsets are relative to `header_start + 208`, then a forced seek to
    /// the declared end.
    fn read_g5<R: Read + Seek>(
        reader: &mut LevelReader<R>,
        options: &LoaderOptions,
        warnings: &mut Vec<Warning>,
    ) -> Result<Self, FormatError> {
        let tag = reader.read_u32()?;
        if tag != ROOM_TAG_G5 {
            warn!("g5 room tag 'XELA' not found (got 0x{:08X})", tag);
            warnings.push(Warning::BadSeparator {
                what: "g5 room tag".to_string(),
                found: tag,
            });
        }
        let block_size = reader.read_u32()? as u64;
        let header_start = reader.tell()?;
        let block_end = header_start + block_size;
        let data_base = header_start + 208;

        let mut sep = |reader: &mut LevelReader<R>,
                       what: &str,
                       accept_zero: bool,
                       warnings: &mut Vec<Warning>|
         -> Result<(), FormatError> {
            let v = reader.read_u32()?;
            let ok = v == FILLER || (accept_zero && v == 0);
            if !ok {
                warnings.push(Warning::BadSeparator {
                    what: format!("g5 room {}", what),
                    found: v,
                });
            }
            Ok(())
        };

        sep(reader, "separator1", false, warnings)?;
        reader.read_i32()?; // end of sector data, redundant
        let sector_data_offset = reader.read_u32()? as u64;
        sep(reader, "separator2", true, warnings)?;
        let static_meshes_offset = reader.read_u32()? as u64;

        let x = reader.read_i32()?;
        let y = reader.read_i32()?;
        let z = reader.read_i32()?;
        let position = IVec3::new(x, y, z);
        let y_bottom = reader.read_i32()?;
        let y_top = reader.read_i32()?;

        let sector_count_z = reader.read_u16()?;
        let sector_count_x = reader.read_u16()?;
        if sector_count_z as usize > options.max_room_dimension
            || sector_count_x as usize > options.max_room_dimension
        {
            return Err(FormatError::BadCount {
                what: "sector grid dimension",
                count: sector_count_z.max(sector_count_x) as u64,
                cap: options.max_room_dimension as u64,
            });
        }

        reader.read_u32()?; // packed room color

        let num_lights = reader.read_u16()? as usize;
        if num_lights > limits::MAX_ROOM_LIGHTS {
            warnings.push(Warning::CountClamped {
                what: "g5 room lights".to_string(),
                count: num_lights as u64,
                cap: limits::MAX_ROOM_LIGHTS as u64,
            });
        }
        let num_static_meshes = reader.read_u16()? as usize;
        if num_static_meshes > limits::MAX_ROOM_STATIC_MESHES {
            warnings.push(Warning::CountClamped {
                what: "g5 room static meshes".to_string(),
                count: num_static_meshes as u64,
                cap: limits::MAX_ROOM_STATIC_MESHES as u64,
            });
        }

        let reverb = reader.read_u8()?;
        let alternate_group = reader.read_u8()?;
        let water_scheme = reader.read_u16()? as u8;

        for what in ["filler1", "filler2"] {
            let v = reader.read_u32()?;
            if v != 0x0000_7FFF {
                warnings.push(Warning::BadSeparator {
                    what: format!("g5 room {}", what),
                    found: v,
                });
            }
        }
        sep(reader, "separator4", false, warnings)?;
        sep(reader, "separator5", false, warnings)?;
        let v = reader.read_u32()?;
        if v != 0xFFFF_FFFF {
            warnings.push(Warning::BadSeparator {
                what: "g5 room separator6".to_string(),
                found: v,
            });
        }

        let alternate_room = reader.read_i16()?;
        let flags = reader.read_u16()?;

        reader.read_u32()?;
        reader.read_u32()?;
        reader.read_u32()?;
        sep(reader, "separator7", true, warnings)?;
        reader.read_u16()?;
        reader.read_u16()?;
        reader.read_f32()?; // world x as float
        reader.read_u32()?;
        reader.read_f32()?; // world z as float
        sep(reader, "separator8", false, warnings)?;
        sep(reader, "separator9", false, warnings)?;
        sep(reader, "separator10", false, warnings)?;
        sep(reader, "separator11", false, warnings)?;
        sep(reader, "separator12", true, warnings)?;
        sep(reader, "separator13", false, warnings)?;

        let num_triangles = reader.read_count_or_filler("g5 room triangles", warnings)? as usize;
        let num_rectangles = reader.read_count_or_filler("g5 room rectangles", warnings)? as usize;
        if num_triangles > limits::MAX_ROOM_FACES || num_rectangles > limits::MAX_ROOM_FACES {
            return Err(FormatError::BadCount {
                what: "g5 room faces",
                count: num_triangles.max(num_rectangles) as u64,
                cap: limits::MAX_ROOM_FACES as u64,
            });
        }
        sep(reader, "separator14", true, warnings)?;

        reader.read_u32()?; // light block size
        let num_lights2 = reader.read_u32()? as usize;
        if num_lights2 != num_lights {
            return Err(FormatError::BadStructure(format!(
                "g5 room light counts disagree ({} vs {})",
                num_lights, num_lights2
            )));
        }
        reader.read_u32()?;
        reader.read_f32()?; // y top as float
        reader.read_f32()?; // y bottom as float

        let num_layers = reader.read_u32()? as usize;
        let layer_offset = reader.read_u32()? as u64;
        let vertices_offset = reader.read_u32()? as u64;
        let poly_offset = reader.read_u32()? as u64;
        let poly_offset2 = reader.read_u32()? as u64;
        if poly_offset != poly_offset2 {
            return Err(FormatError::BadStructure(
                "g5 room poly offsets disagree".to_string(),
            ));
        }
        let vertices_size = reader.read_u32()? as u64;
        if vertices_size % 28 != 0 {
            return Err(FormatError::BadStructure(format!(
                "g5 room vertex block size {} not a multiple of 28",
                vertices_size
            )));
        }
        sep(reader, "separator15", false, warnings)?;
        sep(reader, "separator16", false, warnings)?;
        sep(reader, "separator17", false, warnings)?;
        sep(reader, "separator18", false, warnings)?;
        debug_assert_eq!(reader.tell()?, data_base);

        let mut lights = Vec::with_capacity(num_lights.min(limits::MAX_ROOM_LIGHTS));
        for _ in 0..num_lights {
            lights.push(Light::read(reader, Generation::Tr5, warnings)?);
        }
        lights.truncate(limits::MAX_ROOM_LIGHTS);

        reader.seek(data_base + sector_data_offset)?;
        let total = sector_count_z as usize * sector_count_x as usize;
        let sectors = reader.read_vector(total, usize::MAX, "sectors", RawSector::read)?;
        let n = reader.read_i16()?.max(0) as usize;
        let portals = reader.read_vector(n, limits::MAX_ROOM_PORTALS, "room portals", |r| {
            RawPortal::read(r, position)
        })?;

        reader.seek(data_base + static_meshes_offset)?;
        let mut static_meshes = Vec::with_capacity(num_static_meshes.min(limits::MAX_ROOM_STATIC_MESHES));
        for _ in 0..num_static_meshes {
            static_meshes.push(RoomStaticMesh::read(reader, Generation::Tr4)?);
        }
        static_meshes.truncate(limits::MAX_ROOM_STATIC_MESHES);

        reader.seek(data_base + layer_offset)?;
        let mut layers = Vec::with_capacity(num_layers.min(limits::MAX_ROOM_LAYERS));
        for _ in 0..num_layers.min(limits::MAX_ROOM_LAYERS) {
            layers.push(Layer::read(reader, warnings)?);
        }

        // Faces are stored per layer with layer-local vertex indices; rebase
        // them against the flat vertex list.
        reader.seek(data_base + poly_offset)?;
        let mut rectangles = Vec::with_capacity(num_rectangles);
        let mut triangles = Vec::with_capacity(num_triangles);
        let mut vertex_base = 0u16;
        for layer in &layers {
            for _ in 0..layer.num_rectangles {
                let mut face = Face4::read_g5(reader)?;
                for v in &mut face.vertices {
                    *v = v.wrapping_add(vertex_base);
                }
                rectangles.push(face);
            }
            for _ in 0..layer.num_triangles {
                let mut face = Face3::read_g5(reader)?;
                for v in &mut face.vertices {
                    *v = v.wrapping_add(vertex_base);
                }
                triangles.push(face);
            }
            vertex_base = vertex_base.wrapping_add(layer.num_vertices);
        }

        reader.seek(data_base + vertices_offset)?;
        let num_vertices = (vertices_size / 28) as usize;
        let vertices = reader.read_vector(
            num_vertices,
            limits::MAX_ROOM_VERTICES,
            "room vertices",
            |r| RoomVertex::read(r, Generation::Tr5),
        )?;

        // Whatever trailing data the block carries, the declared size wins.
        reader.seek(block_end)?;

        Ok(Self {
            position,
            y_bottom,
            y_top,
            vertices,
            rectangles,
            triangles,
            sprites: Vec::new(),
            portals,
            sector_count_z,
            sector_count_x,
            sectors,
            ambient_shade: 32767,
            light_mode: 0,
            lights,
            static_meshes,
            alternate_room,
            alternate_group,
            flags: RoomFlags::from_bits_retain(flags),
            water_scheme,
            reverb,
        })
    }
}

fn light_record_size(generation: Generation) -> u64 {
    match generation {
        Generation::Tr1 => 18,
        Generation::Tr2 => 24,
        Generation::Tr3 => 24,
        Generation::Tr4 => 46,
        Generation::Tr5 => 88,
    }
}

fn room_static_mesh_size(generation: Generation) -> u64 {
    match generation {
        Generation::Tr1 => 18,
        _ => 20,
    }
}

pub(crate) fn read_ivec3_16<R: Read + Seek>(
    reader: &mut LevelReader<R>,
) -> Result<IVec3, FormatError> {
    Ok(IVec3::new(
        reader.read_i16()? as i32,
        reader.read_i16()? as i32,
        reader.read_i16()? as i32,
    ))
}

pub(crate) fn read_ivec3_32<R: Read + Seek>(
    reader: &mut LevelReader<R>,
) -> Result<IVec3, FormatError> {
    Ok(IVec3::new(
        reader.read_i32()?,
        reader.read_i32()?,
        reader.read_i32()?,
    ))
}

pub(crate) fn read_vec3_16<R: Read + Seek>(
    reader: &mut LevelReader<R>,
) -> Result<Vec3, FormatError> {
    Ok(Vec3::new(
        reader.read_i16()? as f32,
        reader.read_i16()? as f32,
        reader.read_i16()? as f32,
    ))
}

pub(crate) fn read_vec3_32<R: Read + Seek>(
    reader: &mut LevelReader<R>,
) -> Result<Vec3, FormatError> {
    Ok(Vec3::new(
        reader.read_i32()? as f32,
        reader.read_i32()? as f32,
        reader.read_i32()? as f32,
    ))
}

pub(crate) fn read_vec3_f<R: Read + Seek>(
    reader: &mut LevelReader<R>,
) -> Result<Vec3, FormatError> {
    Ok(Vec3::new(
        reader.read_f32()?,
        reader.read_f32()?,
        reader.read_f32()?,
    ))
}

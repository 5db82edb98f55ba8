//! Test-only synthetic level writers
//!
//! Builds byte-exact minimal levels for every generation so the full decode
//! and link pipeline can be exercised without shipping content. Also provides
//! a stored-block zlib pair (writer + [`Inflate`] impl) so the G4 compressed
//! geometry path runs through the real seam.

use byteorder::{LittleEndian, WriteBytesExt};

use crate::raw::records::sound_map_size;
use crate::raw::texture::Inflate;
use crate::raw::Generation;

/// Little-endian byte sink mirroring the reader's primitive set.
#[derive(Default)]
pub struct Writer(pub Vec<u8>);

impl Writer {
    pub fn u8(&mut self, v: u8) {
        self.0.push(v);
    }
    pub fn i8(&mut self, v: i8) {
        self.0.push(v as u8);
    }
    pub fn u16(&mut self, v: u16) {
        self.0.write_u16::<LittleEndian>(v).unwrap();
    }
    pub fn i16(&mut self, v: i16) {
        self.0.write_i16::<LittleEndian>(v).unwrap();
    }
    pub fn u32(&mut self, v: u32) {
        self.0.write_u32::<LittleEndian>(v).unwrap();
    }
    pub fn i32(&mut self, v: i32) {
        self.0.write_i32::<LittleEndian>(v).unwrap();
    }
    pub fn f32(&mut self, v: f32) {
        self.0.write_f32::<LittleEndian>(v).unwrap();
    }
    pub fn zeros(&mut self, n: usize) {
        self.0.extend(std::iter::repeat(0).take(n));
    }
    pub fn bytes(&mut self, b: &[u8]) {
        self.0.extend_from_slice(b);
    }
}

#[derive(Debug, Clone)]
pub struct SectorSpec {
    pub floor_data: u16,
    pub box_index: i16,
    pub room_below: u8,
    pub floor: i8,
    pub room_above: u8,
    pub ceiling: i8,
}

impl Default for SectorSpec {
    fn default() -> Self {
        Self {
            floor_data: 0,
            box_index: -1,
            room_below: 0xff,
            floor: 0,
            room_above: 0xff,
            ceiling: -10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoomSpec {
    pub x: i32,
    pub z: i32,
    pub y_bottom: i32,
    pub y_top: i32,
    pub count_x: u16,
    pub count_z: u16,
    pub sectors: Vec<SectorSpec>,
    pub alternate_room: i16,
    pub flags: u16,
}

impl RoomSpec {
    /// A flat room with uniform default sectors.
    pub fn flat(x: i32, z: i32, count_x: u16, count_z: u16) -> Self {
        Self {
            x,
            z,
            y_bottom: 0,
            y_top: -2560,
            count_x,
            count_z,
            sectors: vec![SectorSpec::default(); count_x as usize * count_z as usize],
            alternate_room: -1,
            flags: 0,
        }
    }

    pub fn sector_mut(&mut self, x: usize, z: usize) -> &mut SectorSpec {
        &mut self.sectors[x * self.count_z as usize + z]
    }
}

#[derive(Debug, Clone, Default)]
pub struct BoxSpec {
    pub zmin: i32,
    pub zmax: i32,
    pub xmin: i32,
    pub xmax: i32,
    pub floor: i16,
    pub overlap_word: u16,
    /// ground1, ground2, ground3, ground4, fly.
    pub base_zone: [u16; 5],
    pub alternate_zone: [u16; 5],
}

#[derive(Debug, Clone, Default)]
pub struct CameraSpec {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub word1: u16,
    pub word2: u16,
}

#[derive(Debug, Clone, Default)]
pub struct ItemSpec {
    pub object_id: i16,
    pub room: u16,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub angle: i16,
    pub flags: u16,
}

/// Description of a whole synthetic level. Unlisted tables are written empty.
#[derive(Debug, Clone)]
pub struct LevelSpec {
    pub rooms: Vec<RoomSpec>,
    /// Word 0 is the reserved empty entry.
    pub floor_data: Vec<u16>,
    pub boxes: Vec<BoxSpec>,
    pub overlaps: Vec<u16>,
    pub cameras: Vec<CameraSpec>,
    pub items: Vec<ItemSpec>,
}

impl Default for LevelSpec {
    fn default() -> Self {
        Self {
            rooms: Vec::new(),
            floor_data: vec![0],
            boxes: Vec::new(),
            overlaps: Vec::new(),
            cameras: Vec::new(),
            items: Vec::new(),
        }
    }
}

/// Serialize `spec` exactly as the given generation lays it out.
pub fn write_level(generation: Generation, spec: &LevelSpec) -> Vec<u8> {
    let mut w = Writer::default();
    match generation {
        Generation::Tr1 => {
            w.u32(0x20);
            w.u32(0); // texture pages
            w.u32(0); // unused
            write_core(&mut w, generation, spec);
        }
        Generation::Tr2 | Generation::Tr3 => {
            w.u32(if generation == Generation::Tr2 { 0x2D } else { 0xFF18_0038 });
            w.zeros(768 + 1024); // palettes
            w.u32(0); // texture pages
            w.u32(0); // unused
            write_core(&mut w, generation, spec);
        }
        Generation::Tr4 => {
            w.u32(0x0034_5254);
            w.u16(0);
            w.u16(0);
            w.u16(0); // page counts
            for _ in 0..3 {
                w.u32(0);
                w.u32(0); // empty framed texture blocks
            }
            let mut inner = Writer::default();
            write_core(&mut inner, generation, spec);
            let compressed = stored_zlib(&inner.0);
            w.u32(inner.0.len() as u32);
            w.u32(compressed.len() as u32);
            w.bytes(&compressed);
            w.u32(0); // samples
        }
        Generation::Tr5 => {
            w.u32(0x0034_5254);
            w.u16(0);
            w.u16(0);
            w.u16(0);
            for _ in 0..3 {
                w.u32(0);
                w.u32(0);
            }
            w.u16(0); // lara type
            w.u16(0); // weather
            for _ in 0..7 {
                w.u32(0);
            }
            let mut inner = Writer::default();
            inner.u32(0); // unused leading slot
            write_core(&mut inner, generation, spec);
            w.u32(inner.0.len() as u32);
            w.u32(inner.0.len() as u32); // stored flat
            w.bytes(&inner.0);
            for _ in 0..6 {
                w.u8(0xCD);
            }
            w.u32(0); // samples
        }
    }
    w.0
}

/// The shared room/geometry/navigation/tail sequence. For G1..G3 this is the
/// rest of the file after the texture preamble; for G4/G5 it is the geometry
/// block body.
fn write_core(w: &mut Writer, generation: Generation, spec: &LevelSpec) {
    match generation {
        Generation::Tr5 => w.u32(spec.rooms.len() as u32),
        _ => w.u16(spec.rooms.len() as u16),
    }
    for room in &spec.rooms {
        write_room(w, generation, room);
    }

    w.u32(spec.floor_data.len() as u32);
    for &word in &spec.floor_data {
        w.u16(word);
    }

    w.u32(0); // mesh words
    w.u32(0); // mesh pointers
    for _ in 0..7 {
        w.u32(0); // empty animation group
    }
    w.u32(0); // static mesh definitions

    let late = matches!(generation, Generation::Tr4 | Generation::Tr5);
    if generation == Generation::Tr1 || generation == Generation::Tr2 {
        w.u32(0); // object textures
    }
    if late {
        w.bytes(b"SPR");
        if generation == Generation::Tr5 {
            w.u8(0);
        }
    }
    w.u32(0); // sprite textures
    w.u32(0); // sprite sequences

    w.u32(spec.cameras.len() as u32);
    for cam in &spec.cameras {
        w.i32(cam.x);
        w.i32(cam.y);
        w.i32(cam.z);
        w.u16(cam.word1);
        w.u16(cam.word2);
    }
    if late {
        w.u32(0); // flyby cameras
    }
    w.u32(0); // sound sources

    w.u32(spec.boxes.len() as u32);
    for b in &spec.boxes {
        if generation == Generation::Tr1 {
            w.i32(b.zmin);
            w.i32(b.zmax);
            w.i32(b.xmin);
            w.i32(b.xmax);
        } else {
            w.u8((b.zmin / 1024) as u8);
            w.u8((b.zmax / 1024) as u8);
            w.u8((b.xmin / 1024) as u8);
            w.u8((b.xmax / 1024) as u8);
        }
        w.i16(b.floor);
        w.u16(b.overlap_word);
    }
    w.u32(spec.overlaps.len() as u32);
    for &word in &spec.overlaps {
        w.u16(word);
    }
    // Zones are whole arrays per field, not records per box.
    let zone_sets: [fn(&BoxSpec) -> [u16; 5]; 2] =
        [|b| b.base_zone, |b| b.alternate_zone];
    let fields: &[usize] = if generation == Generation::Tr1 {
        &[0, 1, 4]
    } else {
        &[0, 1, 2, 3, 4]
    };
    for pick in zone_sets {
        for &field in fields {
            for b in &spec.boxes {
                w.u16(pick(b)[field]);
            }
        }
    }

    w.u32(0); // animated textures
    if late {
        w.u8(0); // animated-texture uv count
        w.bytes(b"TEX");
        if generation == Generation::Tr5 {
            w.u8(0);
        }
        w.u32(0); // object textures
    }
    if generation == Generation::Tr3 {
        w.u32(0); // object textures, moved after animated textures
    }

    w.u32(spec.items.len() as u32);
    for item in &spec.items {
        w.i16(item.object_id);
        w.u16(item.room);
        w.i32(item.x);
        w.i32(item.y);
        w.i32(item.z);
        w.i16(item.angle);
        match generation {
            Generation::Tr1 => w.i16(0),
            Generation::Tr2 | Generation::Tr3 => {
                w.i16(0);
                w.i16(0);
            }
            Generation::Tr4 | Generation::Tr5 => {
                w.i16(0);
                w.u16(0); // ocb
            }
        }
        w.u16(item.flags);
    }

    if late {
        w.u32(0); // ai objects
        w.u16(0); // demo data
    } else {
        w.zeros(8192); // lightmap
        if generation == Generation::Tr1 {
            w.zeros(768); // palette
        }
        w.u16(0); // cinematic frames
        w.u16(0); // demo data
    }

    w.zeros(sound_map_size(generation) * 2);
    w.u32(0); // sound details
    if generation == Generation::Tr1 {
        w.u32(0); // inline sample data
    }
    w.u32(0); // sample indices
}

fn write_room(w: &mut Writer, generation: Generation, room: &RoomSpec) {
    assert_eq!(
        room.sectors.len(),
        room.count_x as usize * room.count_z as usize
    );
    if generation == Generation::Tr5 {
        return write_room_g5(w, room);
    }

    w.i32(room.x);
    w.i32(room.z);
    w.i32(room.y_bottom);
    w.i32(room.y_top);
    w.u32(4); // data block: the four zero counts
    w.u16(0); // vertices
    w.u16(0); // rectangles
    w.u16(0); // triangles
    w.u16(0); // sprites
    w.u16(0); // portals
    w.u16(room.count_z);
    w.u16(room.count_x);
    for sector in &room.sectors {
        write_sector(w, sector);
    }
    w.i16(0); // ambient
    match generation {
        Generation::Tr1 => {}
        Generation::Tr2 => {
            w.i16(0); // second ambient
            w.i16(0); // light mode
        }
        _ => w.i16(0), // second ambient
    }
    w.u16(0); // lights
    w.u16(0); // room static meshes
    w.i16(room.alternate_room);
    w.u16(room.flags);
    if matches!(generation, Generation::Tr3 | Generation::Tr4) {
        w.u8(0); // water scheme
        w.u8(0); // reverb
        w.u8(0); // alternate group slot
    }
}

/// The G5 tagged room: 208-byte header, sector grid, empty portal list, no
/// lights/layers/vertices.
fn write_room_g5(w: &mut Writer, room: &RoomSpec) {
    const CD: u32 = 0xCDCD_CDCD;
    let sector_bytes = room.sectors.len() * 8;
    let data_len = sector_bytes + 2; // sectors + empty portal count
    let after_sectors = (sector_bytes + 2) as u32;

    w.u32(0x414C_4558); // 'XELA'
    w.u32(208 + data_len as u32);

    w.u32(CD); // separator1
    w.i32(0); // end of sector data
    w.u32(0); // sector data offset
    w.u32(0); // separator2
    w.u32(after_sectors); // static meshes offset
    w.i32(room.x);
    w.i32(0);
    w.i32(room.z);
    w.i32(room.y_bottom);
    w.i32(room.y_top);
    w.u16(room.count_z);
    w.u16(room.count_x);
    w.u32(0); // room color
    w.u16(0); // lights
    w.u16(0); // room static meshes
    w.u8(0); // reverb
    w.u8(0); // alternate group
    w.u16(0); // water scheme
    w.u32(0x0000_7FFF); // filler1
    w.u32(0x0000_7FFF); // filler2
    w.u32(CD); // separator4
    w.u32(CD); // separator5
    w.u32(0xFFFF_FFFF); // separator6
    w.i16(room.alternate_room);
    w.u16(room.flags);
    w.u32(0);
    w.u32(0);
    w.u32(0);
    w.u32(0); // separator7
    w.u16(0);
    w.u16(0);
    w.f32(room.x as f32);
    w.u32(0);
    w.f32(room.z as f32);
    w.u32(CD); // separator8
    w.u32(CD); // separator9
    w.u32(CD); // separator10
    w.u32(CD); // separator11
    w.u32(0); // separator12
    w.u32(CD); // separator13
    w.u32(0); // triangles
    w.u32(0); // rectangles
    w.u32(0); // separator14
    w.u32(0); // light block size
    w.u32(0); // lights again
    w.u32(0);
    w.f32(room.y_top as f32);
    w.f32(room.y_bottom as f32);
    w.u32(0); // layers
    w.u32(after_sectors); // layer offset
    w.u32(after_sectors); // vertices offset
    w.u32(after_sectors); // poly offset
    w.u32(after_sectors); // poly offset 2
    w.u32(0); // vertices size
    w.u32(CD); // separator15
    w.u32(CD); // separator16
    w.u32(CD); // separator17
    w.u32(CD); // separator18

    for sector in &room.sectors {
        write_sector(w, sector);
    }
    w.i16(0); // portals
}

fn write_sector(w: &mut Writer, sector: &SectorSpec) {
    w.u16(sector.floor_data);
    w.i16(sector.box_index);
    w.u8(sector.room_below);
    w.i8(sector.floor);
    w.u8(sector.room_above);
    w.i8(sector.ceiling);
}

/// Wrap `data` in a zlib stream of stored (uncompressed) deflate blocks.
pub fn stored_zlib(data: &[u8]) -> Vec<u8> {
    let mut out = vec![0x78, 0x01];
    let mut chunks = data.chunks(0xffff).peekable();
    if data.is_empty() {
        out.extend_from_slice(&[0x01, 0x00, 0x00, 0xff, 0xff]);
    }
    while let Some(chunk) = chunks.next() {
        out.push(if chunks.peek().is_none() { 0x01 } else { 0x00 });
        let len = chunk.len() as u16;
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&(!len).to_le_bytes());
        out.extend_from_slice(chunk);
    }
    out.extend_from_slice(&adler32(data).to_be_bytes());
    out
}

fn adler32(data: &[u8]) -> u32 {
    let mut a: u32 = 1;
    let mut b: u32 = 0;
    for &byte in data {
        a = (a + byte as u32) % 65521;
        b = (b + a) % 65521;
    }
    (b << 16) | a
}

/// Inflater for streams produced by [`stored_zlib`]. Only stored deflate
/// blocks are understood, which is all the tests emit.
pub struct StoredInflate;

impl Inflate for StoredInflate {
    fn inflate(&self, compressed: &[u8], uncompressed_size: usize) -> Result<Vec<u8>, String> {
        if compressed.len() < 2 {
            return Err("stream too short for a zlib header".to_string());
        }
        let mut out = Vec::with_capacity(uncompressed_size);
        let mut pos = 2; // skip the zlib header
        loop {
            let header = *compressed
                .get(pos)
                .ok_or_else(|| "truncated block header".to_string())?;
            if header & 0x06 != 0 {
                return Err(format!("unsupported deflate block type {:#04x}", header));
            }
            let len_bytes = compressed
                .get(pos + 1..pos + 5)
                .ok_or_else(|| "truncated stored block length".to_string())?;
            let len = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
            let nlen = u16::from_le_bytes([len_bytes[2], len_bytes[3]]);
            if nlen != !(len as u16) {
                return Err("stored block length check failed".to_string());
            }
            let payload = compressed
                .get(pos + 5..pos + 5 + len)
                .ok_or_else(|| "truncated stored block payload".to_string())?;
            out.extend_from_slice(payload);
            pos += 5 + len;
            if header & 0x01 != 0 {
                break;
            }
        }
        if out.len() != uncompressed_size {
            return Err(format!(
                "inflated to {} bytes, expected {}",
                out.len(),
                uncompressed_size
            ));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_zlib_round_trip() {
        let data: Vec<u8> = (0..200_000).map(|i| (i % 251) as u8).collect();
        let packed = stored_zlib(&data);
        assert_ne!(packed.len(), data.len());
        let unpacked = StoredInflate.inflate(&packed, data.len()).unwrap();
        assert_eq!(unpacked, data);
    }

    #[test]
    fn test_stored_zlib_empty_input() {
        let packed = stored_zlib(&[]);
        let unpacked = StoredInflate.inflate(&packed, 0).unwrap();
        assert!(unpacked.is_empty());
    }

    #[test]
    fn test_inflate_rejects_size_mismatch() {
        let packed = stored_zlib(b"abc");
        assert!(StoredInflate.inflate(&packed, 7).is_err());
    }
}

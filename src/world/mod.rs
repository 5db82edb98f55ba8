//! The linked world model
//!
//! Everything in here is fully resolved: relations are `Option<usize>`
//! indices into the world's own tables, heights are up-positive world units,
//! and no numeric value needs a second lookup to be trusted. The [`World`] is
//! immutable after assembly; the only mutable runtime state (box blocking,
//! alternate-set parity) lives in [`SimState`].

pub mod floordata;
pub mod locate;

use glam::IVec3;

use crate::raw::records::{
    CinematicFrame, SoundDetails, SpriteSequence, SpriteTexture, StaticMesh, ZoneSet,
    SOUND_SOURCE_IF_NOT_SWAPPED, SOUND_SOURCE_IF_SWAPPED,
};
use crate::raw::room::{Face3, Face4, Light, RoomFlags, RoomStaticMesh, RoomVertex, SpriteInstance};
use crate::raw::Generation;
use crate::refs::{RoomTable, TableElement};
use std::ops::Range;

/// Edge length of one sector in world units.
pub const SECTOR_SIZE: f32 = 1024.0;
/// One height click in world units.
pub const QUARTER_SECTOR: i32 = 256;
/// Sentinel height of an impassable wall column, for both floor and ceiling.
pub const WALL_HEIGHT: i32 = 127 * QUARTER_SECTOR;

/// One grid cell with every relation resolved. Heights are up-positive world
/// units; `floor <= ceiling` except for wall columns, where both carry
/// [`WALL_HEIGHT`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sector {
    pub floor: i32,
    pub ceiling: i32,
    pub box_index: Option<usize>,
    pub room_below: Option<usize>,
    pub room_above: Option<usize>,
    /// Word span of this sector's entry in [`World::floor_data`].
    pub floor_data: Option<Range<usize>>,
    /// Room this sector redirects to, from its portal chunk.
    pub portal_target: Option<usize>,
}

impl Sector {
    pub fn is_wall(&self) -> bool {
        self.floor == WALL_HEIGHT && self.ceiling == WALL_HEIGHT
    }
}

/// Directed connection surface to another room, vertices in world space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Portal {
    pub target_room: usize,
    pub normal: IVec3,
    pub vertices: [IVec3; 4],
}

/// Render payload of a room, carried for external consumers and never
/// interpreted by the loader.
#[derive(Debug, Clone, Default)]
pub struct RoomMesh {
    pub vertices: Vec<RoomVertex>,
    pub rectangles: Vec<Face4>,
    pub triangles: Vec<Face3>,
    pub sprites: Vec<SpriteInstance>,
}

#[derive(Debug, Clone)]
pub struct Room {
    /// World-space origin of the sector grid (x/z; y unused).
    pub position: IVec3,
    /// Vertical extent, up-positive.
    pub bottom: i32,
    pub top: i32,
    pub sector_count_x: usize,
    pub sector_count_z: usize,
    /// Row-major by x: index = x * sector_count_z + z.
    pub sectors: Vec<Sector>,
    pub portals: Vec<Portal>,
    pub alternate_room: Option<usize>,
    pub alternate_group: u8,
    pub flags: RoomFlags,
    pub ambient_shade: i16,
    pub water_scheme: u8,
    pub reverb: u8,
    pub mesh: RoomMesh,
    pub lights: Vec<Light>,
    pub static_meshes: Vec<RoomStaticMesh>,
}

impl TableElement<RoomTable> for Room {
    const WIDTH: u32 = 1;
}

impl Room {
    pub fn is_water(&self) -> bool {
        self.flags.contains(RoomFlags::WATER)
    }

    pub fn sector_at(&self, x: usize, z: usize) -> &Sector {
        &self.sectors[x * self.sector_count_z + z]
    }
}

/// One navigation box with its resolved overlap neighbors and zone ids.
#[derive(Debug, Clone)]
pub struct NavBox {
    /// World-unit extents, inclusive min / exclusive max.
    pub x_min: i32,
    pub x_max: i32,
    pub z_min: i32,
    pub z_max: i32,
    /// Box floor height, up-positive.
    pub floor: i32,
    /// Whether a pushable may block this box at runtime.
    pub blockable: bool,
    /// Neighboring box indices from the overlap table.
    pub overlaps: Vec<usize>,
    /// Zone ids: `zones[0]` is the base set, `zones[1]` the alternate set.
    pub zones: [ZoneSet; 2],
    /// Parity the zone sets were recorded under (always the base layout).
    pub recorded_parity: bool,
}

impl NavBox {
    /// Zone set effective under the caller's alternate-set parity. The
    /// selection depends only on whether the parities differ.
    pub fn zone_set(&self, parity: bool) -> &ZoneSet {
        if parity != self.recorded_parity {
            &self.zones[1]
        } else {
            &self.zones[0]
        }
    }
}

/// A camera-table slot, split into its two meanings at link time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraSlot {
    Fixed {
        position: IVec3,
        room: Option<usize>,
        flags: u16,
    },
    /// Underwater current attractor.
    Sink {
        position: IVec3,
        strength: u16,
        box_index: Option<usize>,
    },
}

impl CameraSlot {
    pub fn position(&self) -> IVec3 {
        match self {
            CameraSlot::Fixed { position, .. } | CameraSlot::Sink { position, .. } => *position,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Item {
    pub object_id: i16,
    pub room: Option<usize>,
    pub position: IVec3,
    pub angle: i16,
    pub shade: i16,
    pub shade2: i16,
    pub ocb: u16,
    pub flags: u16,
}

#[derive(Debug, Clone)]
pub struct AiObject {
    pub object_id: u16,
    pub room: Option<usize>,
    pub position: IVec3,
    pub ocb: u16,
    pub flags: u16,
    pub angle: i32,
}

#[derive(Debug, Clone)]
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
    pub room: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct SoundSource {
    pub position: IVec3,
    pub sound_id: u16,
    pub flags: u16,
}

impl SoundSource {
    /// Whether the source is audible under the given alternate-set parity.
    pub fn audible(&self, parity: bool) -> bool {
        if self.flags & SOUND_SOURCE_IF_SWAPPED != 0 {
            return parity;
        }
        if self.flags & SOUND_SOURCE_IF_NOT_SWAPPED != 0 {
            return !parity;
        }
        true
    }
}

/// Resolved animation record.
#[derive(Debug, Clone)]
pub struct Animation {
    pub state_id: u16,
    pub speed: i32,
    pub acceleration: i32,
    pub lateral_speed: i32,
    pub lateral_acceleration: i32,
    pub first_frame: u16,
    pub last_frame: u16,
    pub next_animation: usize,
    pub next_frame: u16,
    pub segment_length: u8,
    pub pose_data_size: u8,
    /// Slot in [`World::pose_frames`]; dangling offsets degrade to `None`.
    pub pose_frame_slot: Option<usize>,
    /// Span in [`World::transitions`].
    pub transitions: Range<usize>,
    /// Span in [`World::anim_commands`].
    pub commands: Range<usize>,
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub state_id: u16,
    /// Span in [`World::transition_cases`].
    pub cases: Range<usize>,
}

#[derive(Debug, Clone)]
pub struct TransitionCase {
    pub first_frame: u16,
    pub last_frame: u16,
    pub target_animation: usize,
    pub target_frame: u16,
}

#[derive(Debug, Clone)]
pub struct SkeletalModel {
    pub type_id: u32,
    pub mesh_count: i16,
    pub mesh_base: u16,
    pub bone_index: u32,
    pub pose_frame_slot: Option<usize>,
    pub animation: Option<usize>,
}

/// The fully linked level. Sole owner of all tables; queries borrow, nothing
/// escapes with hidden lifetimes.
#[derive(Debug, Default)]
pub struct World {
    pub generation: Option<Generation>,
    pub rooms: Vec<Room>,
    pub floor_data: Vec<u16>,
    pub boxes: Vec<NavBox>,
    pub camera_slots: Vec<CameraSlot>,
    pub flyby_cameras: Vec<FlybyCamera>,
    pub sound_sources: Vec<SoundSource>,
    pub items: Vec<Item>,
    pub ai_objects: Vec<AiObject>,
    pub animations: Vec<Animation>,
    pub transitions: Vec<Transition>,
    pub transition_cases: Vec<TransitionCase>,
    pub anim_commands: Vec<u16>,
    pub bone_trees: Vec<i32>,
    pub pose_frames: Vec<u16>,
    pub models: Vec<SkeletalModel>,
    pub mesh_words: Vec<u16>,
    /// Word slots into `mesh_words`, one per mesh.
    pub mesh_slots: Vec<usize>,
    pub static_meshes: Vec<StaticMesh>,
    pub sprite_textures: Vec<SpriteTexture>,
    pub sprite_sequences: Vec<SpriteSequence>,
    pub cinematic_frames: Vec<CinematicFrame>,
    pub demo_data: Vec<u8>,
    pub sound_map: Vec<i16>,
    pub sound_details: Vec<SoundDetails>,
    pub sample_indices: Vec<u32>,
    /// Initial blocked bits, consumed by [`SimState::new`].
    pub(crate) initial_blocked: Vec<bool>,
}

impl World {
    pub fn stats(&self) -> WorldStats {
        WorldStats {
            rooms: self.rooms.len(),
            sectors: self.rooms.iter().map(|r| r.sectors.len()).sum(),
            boxes: self.boxes.len(),
            items: self.items.len(),
            animations: self.animations.len(),
            camera_slots: self.camera_slots.len(),
        }
    }

    pub fn model_by_type(&self, type_id: u32) -> Option<&SkeletalModel> {
        self.models.iter().find(|m| m.type_id == type_id)
    }
}

/// Summary counters for logging and tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorldStats {
    pub rooms: usize,
    pub sectors: usize,
    pub boxes: usize,
    pub items: usize,
    pub animations: usize,
    pub camera_slots: usize,
}

impl std::fmt::Display for WorldStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} rooms ({} sectors), {} boxes, {} items, {} animations, {} camera slots",
            self.rooms, self.sectors, self.boxes, self.items, self.animations, self.camera_slots
        )
    }
}

/// Mutable runtime navigation state, kept apart from the immutable world.
#[derive(Debug, Clone)]
pub struct SimState {
    blocked: Vec<bool>,
    /// Per-group room flips; rooms name their group with a byte.
    flipped_groups: Vec<bool>,
    /// Global alternate-set parity (false = base rooms active).
    pub parity: bool,
}

impl SimState {
    pub fn new(world: &World) -> Self {
        Self {
            blocked: world.initial_blocked.clone(),
            flipped_groups: vec![false; 256],
            parity: false,
        }
    }

    pub fn is_blocked(&self, box_index: usize) -> bool {
        self.blocked.get(box_index).copied().unwrap_or(false)
    }

    /// Setting the bit on a non-blockable box is ignored.
    pub fn set_blocked(&mut self, world: &World, box_index: usize, blocked: bool) {
        if let (Some(slot), Some(nav_box)) =
            (self.blocked.get_mut(box_index), world.boxes.get(box_index))
        {
            if nav_box.blockable {
                *slot = blocked;
            }
        }
    }

    pub fn toggle_parity(&mut self) {
        self.parity = !self.parity;
    }

    pub fn flip_group(&mut self, group: u8) {
        self.flipped_groups[group as usize] = !self.flipped_groups[group as usize];
    }

    pub fn is_group_flipped(&self, group: u8) -> bool {
        self.flipped_groups[group as usize]
    }

    /// Room to present for `room_index` under the current flips: its
    /// alternate when the room's group is flipped, otherwise itself.
    pub fn effective_room(&self, world: &World, room_index: usize) -> usize {
        match world.rooms.get(room_index) {
            Some(room) if self.is_group_flipped(room.alternate_group) => {
                room.alternate_room.unwrap_or(room_index)
            }
            _ => room_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nav_box_with_zones(base_fly: u16, alternate_fly: u16) -> NavBox {
        NavBox {
            x_min: 0,
            x_max: 1024,
            z_min: 0,
            z_max: 1024,
            floor: 0,
            blockable: false,
            overlaps: Vec::new(),
            zones: [
                ZoneSet {
                    fly: base_fly,
                    ..ZoneSet::default()
                },
                ZoneSet {
                    fly: alternate_fly,
                    ..ZoneSet::default()
                },
            ],
            recorded_parity: false,
        }
    }

    #[test]
    fn test_zone_set_selection_depends_only_on_parity_xor() {
        let mut nav_box = nav_box_with_zones(10, 20);
        assert_eq!(nav_box.zone_set(false).fly, 10);
        assert_eq!(nav_box.zone_set(true).fly, 20);

        // Flipping both the recorded and the caller parity picks the same set.
        nav_box.recorded_parity = true;
        assert_eq!(nav_box.zone_set(true).fly, 10);
        assert_eq!(nav_box.zone_set(false).fly, 20);
    }

    #[test]
    fn test_sim_state_blocking_respects_blockable() {
        let mut world = World::default();
        world.boxes.push(nav_box_with_zones(0, 0)); // not blockable
        let mut blockable = nav_box_with_zones(0, 0);
        blockable.blockable = true;
        world.boxes.push(blockable);
        world.initial_blocked = vec![false, true];

        let mut sim = SimState::new(&world);
        assert!(!sim.is_blocked(0));
        assert!(sim.is_blocked(1));

        sim.set_blocked(&world, 0, true);
        assert!(!sim.is_blocked(0));
        sim.set_blocked(&world, 1, false);
        assert!(!sim.is_blocked(1));
    }

    fn plain_room(alternate_room: Option<usize>, alternate_group: u8) -> Room {
        Room {
            position: IVec3::ZERO,
            bottom: 0,
            top: 2560,
            sector_count_x: 0,
            sector_count_z: 0,
            sectors: Vec::new(),
            portals: Vec::new(),
            alternate_room,
            alternate_group,
            flags: RoomFlags::empty(),
            ambient_shade: 0,
            water_scheme: 0,
            reverb: 0,
            mesh: RoomMesh::default(),
            lights: Vec::new(),
            static_meshes: Vec::new(),
        }
    }

    #[test]
    fn test_group_flip_selects_alternate_room() {
        let mut world = World::default();
        world.rooms.push(plain_room(Some(1), 3));
        world.rooms.push(plain_room(None, 0));
        let mut sim = SimState::new(&world);
        assert_eq!(sim.effective_room(&world, 0), 0);
        sim.flip_group(3);
        assert_eq!(sim.effective_room(&world, 0), 1);
        assert_eq!(sim.effective_room(&world, 1), 1);
        sim.flip_group(3);
        assert_eq!(sim.effective_room(&world, 0), 0);
    }

    #[test]
    fn test_sound_source_parity_gating() {
        let base_only = SoundSource {
            position: IVec3::ZERO,
            sound_id: 1,
            flags: SOUND_SOURCE_IF_NOT_SWAPPED,
        };
        let swapped_only = SoundSource {
            position: IVec3::ZERO,
            sound_id: 2,
            flags: SOUND_SOURCE_IF_SWAPPED,
        };
        let always = SoundSource {
            position: IVec3::ZERO,
            sound_id: 3,
            flags: 0,
        };
        assert!(base_only.audible(false) && !base_only.audible(true));
        assert!(!swapped_only.audible(false) && swapped_only.audible(true));
        assert!(always.audible(false) && always.audible(true));
    }

    #[test]
    fn test_wall_sector_sentinel() {
        let sector = Sector {
            floor: WALL_HEIGHT,
            ceiling: WALL_HEIGHT,
            box_index: None,
            room_below: None,
            room_above: None,
            floor_data: None,
            portal_target: None,
        };
        assert!(sector.is_wall());
    }
}

//! Mesh block and the skeletal animation table group
//!
//! The mesh block is a word table addressed by byte offsets; pose data is a
//! second shared word table addressed by byte offsets from both animations
//! and skeletal models. Both offsets keep their table tag so they can only be
//! resolved against the right words.

use log::debug;

use crate::error::{FormatError, Warning};
use crate::raw::{limits, Generation};
use crate::reader::LevelReader;
use crate::refs::{AnimationTable, MeshWordTable, PoseFrameTable, TableElement, TableIndex, TableOffset};
use std::io::{Read, Seek};

/// Reserved "no animation" value on skeletal models.
pub const NO_ANIMATION: u16 = 0xffff;

/// G5 writes this filler word after every skeletal model record.
const MODEL_FILLER_G5: u16 = 0xFFEF;

/// Raw mesh storage: an opaque word blob plus the byte offsets that name
/// individual meshes inside it.
#[derive(Debug, Clone, Default)]
pub struct RawMeshBlock {
    pub words: Vec<u16>,
    pub pointers: Vec<TableOffset<MeshWordTable>>,
}

impl RawMeshBlock {
    /// Layout: u32 word count, words, u32 pointer count, u32 byte offsets.
    pub fn read<R: Read + Seek>(reader: &mut LevelReader<R>) -> Result<Self, FormatError> {
        let num_words = reader.read_u32()? as usize;
        let words = reader.read_u16_vector(num_words, limits::MAX_MESH_WORDS, "mesh words")?;
        let num_pointers = reader.read_u32()? as usize;
        let pointers = reader.read_vector(
            num_pointers,
            limits::MAX_MESH_POINTERS,
            "mesh pointers",
            |r| Ok(TableOffset::new(r.read_u32()?)),
        )?;
        debug!("mesh block: {} words, {} pointers", words.len(), pointers.len());
        Ok(Self { words, pointers })
    }
}

/// One animation record. G4/G5 add a lateral speed/acceleration pair.
#[derive(Debug, Clone)]
pub struct RawAnimation {
    pub pose_data: TableOffset<PoseFrameTable>,
    /// Frames between stored poses; zero on disk means one.
    pub segment_length: u8,
    pub pose_data_size: u8,
    pub state_id: u16,
    pub speed: i32,
    pub acceleration: i32,
    pub lateral_speed: i32,
    pub lateral_acceleration: i32,
    pub first_frame: u16,
    pub last_frame: u16,
    pub next_animation: TableIndex<AnimationTable>,
    pub next_frame: u16,
    pub transitions_count: u16,
    pub transitions_index: u16,
    pub commands_count: u16,
    pub commands_index: u16,
}

impl TableElement<AnimationTable> for RawAnimation {
    const WIDTH: u32 = 1;
}

impl RawAnimation {
    pub fn read<R: Read + Seek>(
        reader: &mut LevelReader<R>,
        generation: Generation,
    ) -> Result<Self, FormatError> {
        let pose_data = TableOffset::new(reader.read_u32()?);
        let segment_length = reader.read_u8()?.max(1);
        let pose_data_size = reader.read_u8()?;
        let state_id = reader.read_u16()?;
        let speed = reader.read_i32()?;
        let acceleration = reader.read_i32()?;
        let (lateral_speed, lateral_acceleration) = match generation {
            Generation::Tr4 | Generation::Tr5 => (reader.read_i32()?, reader.read_i32()?),
            _ => (0, 0),
        };
        Ok(Self {
            pose_data,
            segment_length,
            pose_data_size,
            state_id,
            speed,
            acceleration,
            lateral_speed,
            lateral_acceleration,
            first_frame: reader.read_u16()?,
            last_frame: reader.read_u16()?,
            next_animation: TableIndex::new(reader.read_u16()? as u32),
            next_frame: reader.read_u16()?,
            transitions_count: reader.read_u16()?,
            transitions_index: reader.read_u16()?,
            commands_count: reader.read_u16()?,
            commands_index: reader.read_u16()?,
        })
    }
}

/// State-change record: for one target state, a span of transition cases.
#[derive(Debug, Clone, Copy)]
pub struct RawTransition {
    pub state_id: u16,
    pub case_count: u16,
    pub first_case: u16,
}

impl RawTransition {
    pub fn read<R: Read + Seek>(reader: &mut LevelReader<R>) -> Result<Self, FormatError> {
        Ok(Self {
            state_id: reader.read_u16()?,
            case_count: reader.read_u16()?,
            first_case: reader.read_u16()?,
        })
    }
}

/// Frame-windowed dispatch target of a transition.
#[derive(Debug, Clone, Copy)]
pub struct RawTransitionCase {
    pub first_frame: u16,
    pub last_frame: u16,
    pub target_animation: TableIndex<AnimationTable>,
    pub target_frame: u16,
}

impl RawTransitionCase {
    pub fn read<R: Read + Seek>(reader: &mut LevelReader<R>) -> Result<Self, FormatError> {
        Ok(Self {
            first_frame: reader.read_u16()?,
            last_frame: reader.read_u16()?,
            target_animation: TableIndex::new(reader.read_u16()? as u32),
            target_frame: reader.read_u16()?,
        })
    }
}

/// Skeletal model: mesh span, bone-tree entry, pose data, first animation.
#[derive(Debug, Clone)]
pub struct RawSkeletalModel {
    pub type_id: u32,
    pub mesh_count: i16,
    pub mesh_base: u16,
    pub bone_index: u32,
    pub pose_data: TableOffset<PoseFrameTable>,
    pub animation: Option<TableIndex<AnimationTable>>,
}

impl RawSkeletalModel {
    pub fn read<R: Read + Seek>(
        reader: &mut LevelReader<R>,
        generation: Generation,
        warnings: &mut Vec<Warning>,
    ) -> Result<Self, FormatError> {
        let type_id = reader.read_u32()?;
        let mesh_count = reader.read_i16()?;
        let mesh_base = reader.read_u16()?;
        let bone_index = reader.read_u32()?;
        let pose_data = TableOffset::new(reader.read_u32()?);
        let animation_raw = reader.read_u16()?;
        if generation == Generation::Tr5 {
            let filler = reader.read_u16()?;
            if filler != MODEL_FILLER_G5 {
                warnings.push(Warning::BadSeparator {
                    what: format!("skeletal model {:#x} filler", type_id),
                    found: filler as u32,
                });
            }
        }
        Ok(Self {
            type_id,
            mesh_count,
            mesh_base,
            bone_index,
            pose_data,
            animation: (animation_raw != NO_ANIMATION)
                .then(|| TableIndex::new(animation_raw as u32)),
        })
    }
}

/// The whole animation group, in stream order.
#[derive(Debug, Clone, Default)]
pub struct RawAnimationGroup {
    pub animations: Vec<RawAnimation>,
    pub transitions: Vec<RawTransition>,
    pub transition_cases: Vec<RawTransitionCase>,
    pub anim_commands: Vec<u16>,
    pub bone_trees: Vec<i32>,
    pub pose_frames: Vec<u16>,
    pub models: Vec<RawSkeletalModel>,
}

impl RawAnimationGroup {
    pub fn read<R: Read + Seek>(
        reader: &mut LevelReader<R>,
        generation: Generation,
        warnings: &mut Vec<Warning>,
    ) -> Result<Self, FormatError> {
        let n = reader.read_u32()? as usize;
        let animations = reader.read_vector(n, limits::MAX_ANIMATIONS, "animations", |r| {
            RawAnimation::read(r, generation)
        })?;
        let n = reader.read_u32()? as usize;
        let transitions =
            reader.read_vector(n, limits::MAX_TRANSITIONS, "transitions", RawTransition::read)?;
        let n = reader.read_u32()? as usize;
        let transition_cases = reader.read_vector(
            n,
            limits::MAX_TRANSITIONS,
            "transition cases",
            RawTransitionCase::read,
        )?;
        let n = reader.read_u32()? as usize;
        let anim_commands =
            reader.read_u16_vector(n, limits::MAX_ANIM_COMMANDS, "animation commands")?;
        let n = reader.read_u32()? as usize;
        let bone_trees = reader.read_i32_vector(n, limits::MAX_BONE_TREE_WORDS, "bone trees")?;
        let n = reader.read_u32()? as usize;
        let pose_frames = reader.read_u16_vector(n, limits::MAX_POSE_FRAME_WORDS, "pose frames")?;
        let n = reader.read_u32()? as usize;
        let models = reader.read_vector(n, limits::MAX_MODELS, "skeletal models", |r| {
            RawSkeletalModel::read(r, generation, warnings)
        })?;
        debug!(
            "animation group: {} animations, {} models, {} pose frame words",
            animations.len(),
            models.len(),
            pose_frames.len()
        );
        Ok(Self {
            animations,
            transitions,
            transition_cases,
            anim_commands,
            bone_trees,
            pose_frames,
            models,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn push_u16(b: &mut Vec<u8>, v: u16) {
        b.extend_from_slice(&v.to_le_bytes());
    }
    fn push_u32(b: &mut Vec<u8>, v: u32) {
        b.extend_from_slice(&v.to_le_bytes());
    }

    #[test]
    fn test_mesh_block_pointers_are_word_offsets() {
        let mut b = Vec::new();
        push_u32(&mut b, 3); // word count
        for w in [0xAAAAu16, 0xBBBB, 0xCCCC] {
            push_u16(&mut b, w);
        }
        push_u32(&mut b, 2); // pointer count
        push_u32(&mut b, 0);
        push_u32(&mut b, 4);

        let mut r = LevelReader::new(Cursor::new(b)).unwrap();
        let block = RawMeshBlock::read(&mut r).unwrap();
        assert_eq!(block.words.len(), 3);
        assert_eq!(*block.pointers[1].resolve(&block.words, "mesh").unwrap(), 0xCCCC);
    }

    #[test]
    fn test_animation_lateral_pair_only_in_later_generations() {
        let mut b = Vec::new();
        push_u32(&mut b, 6); // pose data offset
        b.push(0); // segment length, zero normalizes to one
        b.push(10); // pose data size
        push_u16(&mut b, 2); // state
        push_u32(&mut b, 100); // speed
        push_u32(&mut b, 5); // accel
        push_u32(&mut b, 7i32 as u32); // lateral speed (G4 only)
        push_u32(&mut b, 1); // lateral accel
        for v in [0u16, 30, 0, 0, 0, 0, 0, 0] {
            push_u16(&mut b, v);
        }

        let mut r = LevelReader::new(Cursor::new(b.clone())).unwrap();
        let anim = RawAnimation::read(&mut r, Generation::Tr4).unwrap();
        assert_eq!(anim.segment_length, 1);
        assert_eq!(anim.lateral_speed, 7);
        assert_eq!(anim.last_frame, 30);

        // Same bytes as G1: lateral pair absent, cursor lands 8 bytes earlier.
        let mut r = LevelReader::new(Cursor::new(b)).unwrap();
        let anim = RawAnimation::read(&mut r, Generation::Tr1).unwrap();
        assert_eq!(anim.lateral_speed, 0);
        assert_eq!(anim.first_frame, 7); // the bytes the lateral pair occupied
    }

    #[test]
    fn test_skeletal_model_filler_warning_g5() {
        let mut b = Vec::new();
        push_u32(&mut b, 0x160); // type
        push_u16(&mut b, 1i16 as u16);
        push_u16(&mut b, 0);
        push_u32(&mut b, 0);
        push_u32(&mut b, 0);
        push_u16(&mut b, NO_ANIMATION);
        push_u16(&mut b, 0x1234); // wrong filler

        let mut warnings = Vec::new();
        let mut r = LevelReader::new(Cursor::new(b)).unwrap();
        let model = RawSkeletalModel::read(&mut r, Generation::Tr5, &mut warnings).unwrap();
        assert!(model.animation.is_none());
        assert_eq!(warnings.len(), 1);
    }
}

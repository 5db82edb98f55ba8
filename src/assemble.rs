//! Linking phase: raw tables in, resolved [`World`] out
//!
//! Sentinels become `Option`, byte offsets become slots, heights flip to
//! up-positive world units, and the camera table splits into cameras and
//! sinks. Stray indices in optional relations degrade to `None` with a
//! warning; malformed floor data and misaligned offsets abort the link.

use log::{info, warn};
use std::collections::HashSet;

use crate::error::{LoadError, Warning};
use crate::raw::records::{RawBox, RawCameraSlot, OVERLAP_END_BIT};
use crate::raw::room::{RawRoom, NO_ROOM, WALL_CLICKS};
use crate::raw::{limits, RawLevel};
use crate::world::floordata;
use crate::world::{
    AiObject, Animation, CameraSlot, FlybyCamera, Item, NavBox, Portal, Room, RoomMesh, Sector,
    SkeletalModel, SoundSource, Transition, TransitionCase, World, QUARTER_SECTOR, WALL_HEIGHT,
};

/// Resolve an optional index, degrading out-of-range values to `None`.
fn lenient(
    index: usize,
    table_len: usize,
    what: &str,
    warnings: &mut Vec<Warning>,
) -> Option<usize> {
    if index < table_len {
        Some(index)
    } else {
        warn!("{}: index {} out of range ({} entries)", what, index, table_len);
        warnings.push(Warning::DanglingReference {
            what: what.to_string(),
            index,
            table_len,
        });
        None
    }
}

fn flip_clicks(clicks: i8) -> i32 {
    -(clicks as i32 * QUARTER_SECTOR)
}

/// Link a decoded level into a world.
pub fn assemble(raw: RawLevel, warnings: &mut Vec<Warning>) -> Result<World, LoadError> {
    let num_rooms = raw.rooms.len();
    let num_boxes = raw.boxes.len();
    let mut sinks: HashSet<usize> = HashSet::new();

    // Resolve the animation tables first; the room loop below takes the
    // room records out of `raw` by value.
    let (animations, transitions, transition_cases, models, mesh_slots) =
        link_animation_group(&raw, warnings)?;

    let mut rooms = Vec::with_capacity(num_rooms);
    for (room_index, raw_room) in raw.rooms.into_iter().enumerate() {
        rooms.push(link_room(
            room_index,
            raw_room,
            num_rooms,
            num_boxes,
            &raw.floor_data,
            &mut sinks,
            warnings,
        )?);
    }

    let boxes = link_boxes(
        &raw.boxes,
        &raw.overlaps,
        &raw.base_zones,
        &raw.alternate_zones,
        warnings,
    );
    let initial_blocked = raw.boxes.iter().map(RawBox::initially_blocked).collect();

    let camera_slots = raw
        .camera_slots
        .iter()
        .enumerate()
        .map(|(i, slot)| link_camera_slot(i, slot, &sinks, num_rooms, num_boxes, warnings))
        .collect();

    let items = raw
        .items
        .iter()
        .map(|item| Item {
            object_id: item.object_id,
            room: lenient(item.room.raw() as usize, num_rooms, "item room", warnings),
            position: item.position,
            angle: item.angle,
            shade: item.shade,
            shade2: item.shade2,
            ocb: item.ocb,
            flags: item.flags,
        })
        .collect();

    let ai_objects = raw
        .ai_objects
        .iter()
        .map(|obj| AiObject {
            object_id: obj.object_id,
            room: lenient(obj.room.raw() as usize, num_rooms, "ai object room", warnings),
            position: obj.position,
            ocb: obj.ocb,
            flags: obj.flags,
            angle: obj.angle,
        })
        .collect();

    let flyby_cameras = raw
        .flyby_cameras
        .iter()
        .map(|cam| FlybyCamera {
            position: cam.position,
            direction: cam.direction,
            sequence: cam.sequence,
            index: cam.index,
            fov: cam.fov,
            roll: cam.roll,
            timer: cam.timer,
            speed: cam.speed,
            flags: cam.flags,
            room: lenient(cam.room.raw() as usize, num_rooms, "flyby camera room", warnings),
        })
        .collect();

    let sound_sources = raw
        .sound_sources
        .iter()
        .map(|src| SoundSource {
            position: src.position,
            sound_id: src.sound_id,
            flags: src.flags,
        })
        .collect();

    let world = World {
        generation: None,
        rooms,
        floor_data: raw.floor_data,
        boxes,
        camera_slots,
        flyby_cameras,
        sound_sources,
        items,
        ai_objects,
        animations,
        transitions,
        transition_cases,
        anim_commands: raw.animation.anim_commands,
        bone_trees: raw.animation.bone_trees,
        pose_frames: raw.animation.pose_frames,
        models,
        mesh_words: raw.mesh_block.words,
        mesh_slots,
        static_meshes: raw.static_meshes,
        sprite_textures: raw.sprite_textures,
        sprite_sequences: raw.sprite_sequences,
        cinematic_frames: raw.cinematic_frames,
        demo_data: raw.demo_data,
        sound_map: raw.sound_map,
        sound_details: raw.sound_details,
        sample_indices: raw.sample_indices,
        initial_blocked,
    };
    info!("linked world: {}", world.stats());
    Ok(world)
}

fn link_room(
    room_index: usize,
    raw: RawRoom,
    num_rooms: usize,
    num_boxes: usize,
    floor_data: &[u16],
    sinks: &mut HashSet<usize>,
    warnings: &mut Vec<Warning>,
) -> Result<Room, LoadError> {
    if raw.sectors.len() != raw.total_sectors() {
        return Err(LoadError::Link(crate::error::LinkError::SectorGridMismatch {
            room: room_index,
            width: raw.sector_count_x as usize,
            depth: raw.sector_count_z as usize,
            sectors: raw.sectors.len(),
        }));
    }

    let mut sectors = Vec::with_capacity(raw.sectors.len());
    for raw_sector in &raw.sectors {
        let is_wall = raw_sector.is_wall();
        let (floor, ceiling) = if is_wall {
            (WALL_HEIGHT, WALL_HEIGHT)
        } else {
            (flip_clicks(raw_sector.floor), flip_clicks(raw_sector.ceiling))
        };

        let box_index = if raw_sector.box_index >= 0 {
            lenient(
                raw_sector.box_index as usize,
                num_boxes,
                "sector box",
                warnings,
            )
        } else {
            None
        };
        let room_below = if raw_sector.room_below != NO_ROOM {
            lenient(
                raw_sector.room_below as usize,
                num_rooms,
                "sector room below",
                warnings,
            )
        } else {
            None
        };
        let room_above = if raw_sector.room_above != NO_ROOM {
            lenient(
                raw_sector.room_above as usize,
                num_rooms,
                "sector room above",
                warnings,
            )
        } else {
            None
        };

        // The floor-data entry decides the word span and the portal redirect;
        // a malformed chunk stream here aborts the whole link.
        let start = raw_sector.floor_data.raw() as usize;
        let (floor_data_range, portal_target) = if start != 0 {
            let (chunks, len) = floordata::parse_chunks(floor_data, start)
                .map_err(LoadError::Link)?;
            for sink in floordata::sink_targets(&chunks) {
                sinks.insert(sink);
            }
            let portal = floordata::portal_target(&chunks).and_then(|target| {
                lenient(target.raw() as usize, num_rooms, "portal target room", warnings)
            });
            (Some(start..start + len), portal)
        } else {
            (None, None)
        };

        sectors.push(Sector {
            floor,
            ceiling,
            box_index,
            room_below,
            room_above,
            floor_data: floor_data_range,
            portal_target,
        });
    }

    let portals = raw
        .portals
        .iter()
        .filter_map(|portal| {
            lenient(
                portal.adjoining_room.raw() as usize,
                num_rooms,
                "room portal target",
                warnings,
            )
            .map(|target_room| Portal {
                target_room,
                normal: portal.normal,
                vertices: portal.vertices,
            })
        })
        .collect();

    let alternate_room = if raw.alternate_room >= 0 {
        lenient(
            raw.alternate_room as usize,
            num_rooms,
            "alternate room",
            warnings,
        )
    } else {
        None
    };

    Ok(Room {
        position: raw.position,
        // File heights grow downward; flip so bottom <= top.
        bottom: -raw.y_bottom,
        top: -raw.y_top,
        sector_count_x: raw.sector_count_x as usize,
        sector_count_z: raw.sector_count_z as usize,
        sectors,
        portals,
        alternate_room,
        alternate_group: raw.alternate_group,
        flags: raw.flags,
        ambient_shade: raw.ambient_shade,
        water_scheme: raw.water_scheme,
        reverb: raw.reverb,
        mesh: RoomMesh {
            vertices: raw.vertices,
            rectangles: raw.rectangles,
            triangles: raw.triangles,
            sprites: raw.sprites,
        },
        lights: raw.lights,
        static_meshes: raw.static_meshes,
    })
}

fn link_boxes(
    raw_boxes: &[RawBox],
    overlaps: &[u16],
    base_zones: &[crate::raw::records::ZoneSet],
    alternate_zones: &[crate::raw::records::ZoneSet],
    warnings: &mut Vec<Warning>,
) -> Vec<NavBox> {
    raw_boxes
        .iter()
        .enumerate()
        .map(|(index, raw_box)| {
            let mut chain = Vec::new();
            let mut cursor = raw_box.overlap_index();
            loop {
                let Some(&word) = overlaps.get(cursor) else {
                    warnings.push(Warning::DanglingReference {
                        what: format!("box {} overlap chain", index),
                        index: cursor,
                        table_len: overlaps.len(),
                    });
                    break;
                };
                let neighbor = (word & !OVERLAP_END_BIT) as usize;
                if neighbor < raw_boxes.len() {
                    chain.push(neighbor);
                } else {
                    warnings.push(Warning::DanglingReference {
                        what: format!("box {} overlap neighbor", index),
                        index: neighbor,
                        table_len: raw_boxes.len(),
                    });
                }
                if word & OVERLAP_END_BIT != 0 {
                    break;
                }
                cursor += 1;
                if chain.len() >= limits::MAX_OVERLAP_CHAIN {
                    warnings.push(Warning::SuspectValue {
                        what: format!("box {} overlap chain", index),
                        detail: "no terminator within the chain cap".to_string(),
                    });
                    break;
                }
            }

            NavBox {
                x_min: raw_box.xmin,
                x_max: raw_box.xmax,
                z_min: raw_box.zmin,
                z_max: raw_box.zmax,
                floor: -(raw_box.floor as i32),
                blockable: raw_box.blockable(),
                overlaps: chain,
                zones: [
                    base_zones.get(index).copied().unwrap_or_default(),
                    alternate_zones.get(index).copied().unwrap_or_default(),
                ],
                recorded_parity: false,
            }
        })
        .collect()
}

fn link_camera_slot(
    index: usize,
    slot: &RawCameraSlot,
    sinks: &HashSet<usize>,
    num_rooms: usize,
    num_boxes: usize,
    warnings: &mut Vec<Warning>,
) -> CameraSlot {
    if sinks.contains(&index) {
        CameraSlot::Sink {
            position: slot.position,
            strength: slot.word1,
            box_index: lenient(slot.word2 as usize, num_boxes, "sink box", warnings),
        }
    } else {
        CameraSlot::Fixed {
            position: slot.position,
            room: lenient(slot.word1 as usize, num_rooms, "camera room", warnings),
            flags: slot.word2,
        }
    }
}

type AnimationTables = (
    Vec<Animation>,
    Vec<Transition>,
    Vec<TransitionCase>,
    Vec<SkeletalModel>,
    Vec<usize>,
);

fn link_animation_group(
    raw: &RawLevel,
    warnings: &mut Vec<Warning>,
) -> Result<AnimationTables, LoadError> {
    let group = &raw.animation;
    let num_animations = group.animations.len();
    let pose_words = group.pose_frames.len();

    let clamp_span = |start: usize, count: usize, len: usize, what: &str, warnings: &mut Vec<Warning>| {
        let end = start.saturating_add(count);
        if end > len {
            warnings.push(Warning::DanglingReference {
                what: what.to_string(),
                index: end,
                table_len: len,
            });
            start.min(len)..len
        } else {
            start..end
        }
    };

    let mut animations = Vec::with_capacity(num_animations);
    for (index, anim) in group.animations.iter().enumerate() {
        // A misaligned pose offset is a decode-level fault and stays fatal;
        // a merely dangling one degrades like the other optional links.
        let slot = anim.pose_data.slot::<u16>().map_err(LoadError::Format)?;
        let pose_frame_slot = lenient(slot, pose_words, "animation pose data", warnings);

        let next_animation = match lenient(
            anim.next_animation.raw() as usize,
            num_animations,
            "next animation",
            warnings,
        ) {
            Some(next) => next,
            None => index,
        };

        animations.push(Animation {
            state_id: anim.state_id,
            speed: anim.speed,
            acceleration: anim.acceleration,
            lateral_speed: anim.lateral_speed,
            lateral_acceleration: anim.lateral_acceleration,
            first_frame: anim.first_frame,
            last_frame: anim.last_frame,
            next_animation,
            next_frame: anim.next_frame,
            segment_length: anim.segment_length,
            pose_data_size: anim.pose_data_size,
            pose_frame_slot,
            transitions: clamp_span(
                anim.transitions_index as usize,
                anim.transitions_count as usize,
                group.transitions.len(),
                "animation transitions",
                warnings,
            ),
            commands: clamp_span(
                anim.commands_index as usize,
                anim.commands_count as usize,
                group.anim_commands.len(),
                "animation commands",
                warnings,
            ),
        });
    }

    let transitions = group
        .transitions
        .iter()
        .map(|t| Transition {
            state_id: t.state_id,
            cases: clamp_span(
                t.first_case as usize,
                t.case_count as usize,
                group.transition_cases.len(),
                "transition cases",
                warnings,
            ),
        })
        .collect();

    let transition_cases = group
        .transition_cases
        .iter()
        .map(|c| TransitionCase {
            first_frame: c.first_frame,
            last_frame: c.last_frame,
            target_animation: lenient(
                c.target_animation.raw() as usize,
                num_animations,
                "transition target animation",
                warnings,
            )
            .unwrap_or(0),
            target_frame: c.target_frame,
        })
        .collect();

    let mut models = Vec::with_capacity(group.models.len());
    for model in &group.models {
        let slot = model.pose_data.slot::<u16>().map_err(LoadError::Format)?;
        models.push(SkeletalModel {
            type_id: model.type_id,
            mesh_count: model.mesh_count,
            mesh_base: model.mesh_base,
            bone_index: model.bone_index,
            pose_frame_slot: lenient(slot, pose_words, "model pose data", warnings),
            animation: model
                .animation
                .and_then(|a| lenient(a.raw() as usize, num_animations, "model animation", warnings)),
        });
    }

    let mut mesh_slots = Vec::with_capacity(raw.mesh_block.pointers.len());
    for pointer in &raw.mesh_block.pointers {
        let slot = pointer.slot::<u16>().map_err(LoadError::Format)?;
        if let Some(slot) = lenient(slot, raw.mesh_block.words.len(), "mesh pointer", warnings) {
            mesh_slots.push(slot);
        }
    }

    Ok((animations, transitions, transition_cases, models, mesh_slots))
}

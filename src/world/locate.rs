//! Spatial queries over the linked world
//!
//! `locate` answers "which sector owns this point", starting from a caller
//! hint room and following portal redirects horizontally, then stacked-room
//! links vertically. Every loop is bounded by the room count; a level whose
//! links form a cycle yields an error instead of spinning.

use glam::Vec3;
use log::trace;

use crate::error::LinkError;
use crate::world::{Room, Sector, SimState, World, SECTOR_SIZE};

/// Which zone id applies to an agent, by its movement class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentCapability {
    /// Ground agent, one-click steps.
    Ground1,
    /// Ground agent, taller steps.
    Ground2,
    Ground3,
    Ground4,
    /// Flying or swimming agent.
    Fly,
}

/// Resolved position of a point in the world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub room: usize,
    pub sector_x: usize,
    pub sector_z: usize,
    /// Heights of the owning sector, up-positive.
    pub floor: i32,
    pub ceiling: i32,
    pub box_index: Option<usize>,
}

impl Location {
    pub fn sector<'w>(&self, world: &'w World) -> &'w Sector {
        world.rooms[self.room].sector_at(self.sector_x, self.sector_z)
    }
}

/// Grid cell of `position` in `room`, clamped to the grid. Points outside the
/// room resolve to the nearest edge cell, whose portal or wall data then
/// redirects or stops the search.
fn clamped_cell(room: &Room, position: Vec3) -> (usize, usize) {
    let cell = |value: f32, origin: i32, count: usize| -> usize {
        let raw = ((value - origin as f32) / SECTOR_SIZE).floor();
        (raw.max(0.0) as usize).min(count.saturating_sub(1))
    };
    (
        cell(position.x, room.position.x, room.sector_count_x),
        cell(position.z, room.position.z, room.sector_count_z),
    )
}

/// Find the sector that owns `position`, starting from `room_hint`. The hint
/// only needs to be near the truth; a stale hint costs extra hops, not a
/// wrong answer.
pub fn locate(world: &World, room_hint: usize, position: Vec3) -> Result<Location, LinkError> {
    if room_hint >= world.rooms.len() {
        return Err(LinkError::IndexOutOfRange {
            what: "room hint",
            index: room_hint,
            table_len: world.rooms.len(),
        });
    }
    let bound = world.rooms.len();
    let mut hops = 0usize;
    let mut room_index = room_hint;

    // Horizontal phase: follow portal redirects until a sector claims the
    // point for its own room.
    let (mut x, mut z) = loop {
        let room = &world.rooms[room_index];
        let (x, z) = clamped_cell(room, position);
        match room.sector_at(x, z).portal_target {
            Some(target) => {
                trace!("locate: portal redirect {} -> {}", room_index, target);
                room_index = target;
                hops += 1;
                if hops > bound {
                    return Err(LinkError::TraversalOverflow {
                        start_room: room_hint,
                        bound,
                    });
                }
            }
            None => break (x, z),
        }
    };

    // Vertical phase: step through the stacked-room links until the point
    // sits between floor and ceiling.
    loop {
        let sector = world.rooms[room_index].sector_at(x, z);
        if sector.is_wall() {
            break;
        }
        // Resting exactly on the floor still belongs to the room beneath.
        let next = if (position.y as i32) <= sector.floor {
            sector.room_below
        } else if (position.y as i32) > sector.ceiling {
            sector.room_above
        } else {
            None
        };
        match next {
            Some(target) => {
                room_index = target;
                let cell = clamped_cell(&world.rooms[room_index], position);
                x = cell.0;
                z = cell.1;
                hops += 1;
                if hops > bound {
                    return Err(LinkError::TraversalOverflow {
                        start_room: room_hint,
                        bound,
                    });
                }
            }
            None => break,
        }
    }

    let sector = world.rooms[room_index].sector_at(x, z);
    Ok(Location {
        room: room_index,
        sector_x: x,
        sector_z: z,
        floor: sector.floor,
        ceiling: sector.ceiling,
        box_index: sector.box_index,
    })
}

/// Zone id of a box for an agent class, under the simulation's current
/// alternate-set parity. `None` for an out-of-range box.
pub fn zone_id(
    world: &World,
    sim: &SimState,
    box_index: usize,
    capability: AgentCapability,
) -> Option<u16> {
    let zone_set = world.boxes.get(box_index)?.zone_set(sim.parity);
    Some(match capability {
        AgentCapability::Ground1 => zone_set.ground1,
        AgentCapability::Ground2 => zone_set.ground2,
        AgentCapability::Ground3 => zone_set.ground3,
        AgentCapability::Ground4 => zone_set.ground4,
        AgentCapability::Fly => zone_set.fly,
    })
}

/// Whether two boxes share a zone id for the given agent class, i.e. the
/// agent can path between them.
pub fn same_zone(
    world: &World,
    sim: &SimState,
    from: usize,
    to: usize,
    capability: AgentCapability,
) -> bool {
    match (
        zone_id(world, sim, from, capability),
        zone_id(world, sim, to, capability),
    ) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{NavBox, Portal, RoomMesh, WALL_HEIGHT};
    use crate::raw::records::ZoneSet;
    use crate::raw::room::RoomFlags;
    use glam::IVec3;

    fn flat_sector(floor: i32, ceiling: i32) -> Sector {
        Sector {
            floor,
            ceiling,
            box_index: None,
            room_below: None,
            room_above: None,
            floor_data: None,
            portal_target: None,
        }
    }

    fn room_at(x: i32, z: i32, count_x: usize, count_z: usize, sectors: Vec<Sector>) -> Room {
        Room {
            position: IVec3::new(x, 0, z),
            bottom: 0,
            top: 2560,
            sector_count_x: count_x,
            sector_count_z: count_z,
            sectors,
            portals: Vec::<Portal>::new(),
            alternate_room: None,
            alternate_group: 0,
            flags: RoomFlags::empty(),
            ambient_shade: 0,
            water_scheme: 0,
            reverb: 0,
            mesh: RoomMesh::default(),
            lights: Vec::new(),
            static_meshes: Vec::new(),
        }
    }

    /// Two rooms side by side; room 0's east column redirects into room 1.
    fn side_by_side_world() -> World {
        let mut sectors0 = vec![flat_sector(0, 2560); 4];
        // 2x2 grid, x-major: cells (1,0) and (1,1) border room 1.
        sectors0[2].portal_target = Some(1);
        sectors0[3].portal_target = Some(1);
        let sectors1 = vec![flat_sector(-256, 2560); 4];
        World {
            rooms: vec![
                room_at(0, 0, 2, 2, sectors0),
                room_at(2048, 0, 2, 2, sectors1),
            ],
            ..World::default()
        }
    }

    #[test]
    fn test_locate_follows_portal_redirect() {
        let world = side_by_side_world();
        // Point physically inside room 1, hinted at room 0.
        let here = locate(&world, 0, Vec3::new(2600.0, 0.0, 500.0)).unwrap();
        assert_eq!(here.room, 1);
        assert_eq!(here.floor, -256);
    }

    #[test]
    fn test_locate_is_hint_independent() {
        let world = side_by_side_world();
        let point = Vec3::new(2600.0, 0.0, 500.0);
        let from0 = locate(&world, 0, point).unwrap();
        let from1 = locate(&world, 1, point).unwrap();
        assert_eq!(from0, from1);
    }

    #[test]
    fn test_locate_descends_through_stacked_rooms() {
        // Room 0 on top of room 1; point below room 0's floor.
        let mut upper = vec![flat_sector(0, 2560)];
        upper[0].room_below = Some(1);
        let lower = vec![flat_sector(-2560, 0)];
        let world = World {
            rooms: vec![room_at(0, 0, 1, 1, upper), room_at(0, 0, 1, 1, lower)],
            ..World::default()
        };
        let here = locate(&world, 0, Vec3::new(500.0, -1000.0, 500.0)).unwrap();
        assert_eq!(here.room, 1);
        assert_eq!(here.floor, -2560);
    }

    #[test]
    fn test_locate_descends_when_resting_on_the_floor() {
        // A point exactly at the boundary height belongs to the room beneath.
        let mut upper = vec![flat_sector(1024, 3584)];
        upper[0].room_below = Some(1);
        let lower = vec![flat_sector(-1024, 1024)];
        let world = World {
            rooms: vec![room_at(0, 0, 1, 1, upper), room_at(0, 0, 1, 1, lower)],
            ..World::default()
        };
        let here = locate(&world, 0, Vec3::new(500.0, 1024.0, 500.0)).unwrap();
        assert_eq!(here.room, 1);
        assert_eq!(here.floor, -1024);
        // Just above the boundary stays put.
        let above = locate(&world, 0, Vec3::new(500.0, 1025.0, 500.0)).unwrap();
        assert_eq!(above.room, 0);
    }

    #[test]
    fn test_locate_detects_portal_cycle() {
        let mut sectors0 = vec![flat_sector(0, 2560)];
        sectors0[0].portal_target = Some(1);
        let mut sectors1 = vec![flat_sector(0, 2560)];
        sectors1[0].portal_target = Some(0);
        let world = World {
            rooms: vec![room_at(0, 0, 1, 1, sectors0), room_at(0, 0, 1, 1, sectors1)],
            ..World::default()
        };
        assert!(matches!(
            locate(&world, 0, Vec3::new(500.0, 0.0, 500.0)),
            Err(LinkError::TraversalOverflow { start_room: 0, .. })
        ));
    }

    #[test]
    fn test_locate_stops_at_wall_column() {
        let world = World {
            rooms: vec![room_at(0, 0, 1, 1, vec![flat_sector(WALL_HEIGHT, WALL_HEIGHT)])],
            ..World::default()
        };
        let here = locate(&world, 0, Vec3::new(100.0, 0.0, 100.0)).unwrap();
        assert!(here.sector(&world).is_wall());
    }

    #[test]
    fn test_locate_rejects_bad_hint() {
        let world = side_by_side_world();
        assert!(matches!(
            locate(&world, 9, Vec3::ZERO),
            Err(LinkError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_zone_lookup_by_capability_and_parity() {
        let mut world = World::default();
        world.boxes.push(NavBox {
            x_min: 0,
            x_max: 1024,
            z_min: 0,
            z_max: 1024,
            floor: 0,
            blockable: false,
            overlaps: Vec::new(),
            zones: [
                ZoneSet {
                    ground1: 1,
                    fly: 5,
                    ..ZoneSet::default()
                },
                ZoneSet {
                    ground1: 2,
                    fly: 6,
                    ..ZoneSet::default()
                },
            ],
            recorded_parity: false,
        });
        world.initial_blocked = vec![false];
        let mut sim = SimState::new(&world);
        assert_eq!(zone_id(&world, &sim, 0, AgentCapability::Ground1), Some(1));
        assert_eq!(zone_id(&world, &sim, 0, AgentCapability::Fly), Some(5));
        sim.toggle_parity();
        assert_eq!(zone_id(&world, &sim, 0, AgentCapability::Ground1), Some(2));
        assert_eq!(zone_id(&world, &sim, 0, AgentCapability::Fly), Some(6));
        assert_eq!(zone_id(&world, &sim, 1, AgentCapability::Fly), None);
    }
}

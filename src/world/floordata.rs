//! Floor-data chunk stream decoding
//!
//! Per-sector behavior lives in a shared word table. A sector's entry is a
//! chunk list: each chunk word packs a type in its low byte, condition bits
//! above it, and a continuation bit at the top. Command-sequence chunks embed
//! a nested command list with its own terminator bit. Malformed streams are
//! fatal: guessing a chunk width desynchronizes every word after it.

use crate::error::LinkError;
use crate::refs::{RoomTable, TableIndex};

/// Continuation bit on chunk words and command words.
pub const END_BIT: u16 = 0x8000;

const TYPE_PORTAL: u8 = 0x01;
const TYPE_FLOOR_SLANT: u8 = 0x02;
const TYPE_CEILING_SLANT: u8 = 0x03;
const TYPE_COMMAND_SEQUENCE: u8 = 0x04;
const TYPE_DEATH: u8 = 0x05;
const TYPE_CLIMBABLE_WALL: u8 = 0x06;
const TYPE_TRIANGLE_FIRST: u8 = 0x07;
const TYPE_TRIANGLE_LAST: u8 = 0x12;
const TYPE_MONKEY_SWING: u8 = 0x13;
const TYPE_MINECART_LEFT: u8 = 0x14;
const TYPE_MINECART_RIGHT: u8 = 0x15;

/// Command opcode inside a command sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Activate,
    SwitchCamera,
    UnderwaterCurrent,
    FlipMap,
    FlipOn,
    FlipOff,
    LookAt,
    EndLevel,
    PlayTrack,
    FlipEffect,
    Secret,
    ClearBodies,
    FlyBy,
    CutScene,
}

impl CommandKind {
    fn from_opcode(opcode: u16) -> Option<Self> {
        Some(match opcode {
            0x00 => CommandKind::Activate,
            0x01 => CommandKind::SwitchCamera,
            0x02 => CommandKind::UnderwaterCurrent,
            0x03 => CommandKind::FlipMap,
            0x04 => CommandKind::FlipOn,
            0x05 => CommandKind::FlipOff,
            0x06 => CommandKind::LookAt,
            0x07 => CommandKind::EndLevel,
            0x08 => CommandKind::PlayTrack,
            0x09 => CommandKind::FlipEffect,
            0x0A => CommandKind::Secret,
            0x0B => CommandKind::ClearBodies,
            0x0C => CommandKind::FlyBy,
            0x0D => CommandKind::CutScene,
            _ => return None,
        })
    }

    /// Camera-style commands carry one extra parameter word.
    fn has_extra_word(self) -> bool {
        matches!(self, CommandKind::SwitchCamera | CommandKind::FlyBy)
    }
}

/// One command of a sequence. `parameter` is the low ten bits of the command
/// word; camera commands carry a second word verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub parameter: u16,
    pub extra: Option<u16>,
}

/// Header state of a command-sequence chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSequence {
    /// Trigger function from the chunk's condition bits.
    pub function: u8,
    pub timer: u8,
    pub one_shot: bool,
    pub activation_mask: u8,
    pub commands: Vec<Command>,
}

/// One decoded chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Portal(TableIndex<RoomTable>),
    FloorSlant { x: i8, z: i8 },
    CeilingSlant { x: i8, z: i8 },
    CommandSequence(CommandSequence),
    Death,
    ClimbableWall { directions: u8 },
    /// Split-triangle floor or ceiling shape; carried opaque.
    Triangle { kind: u8, word: u16 },
    MonkeySwing,
    MinecartLeft,
    MinecartRight,
}

fn word_at(words: &[u16], index: usize) -> Result<u16, LinkError> {
    words.get(index).copied().ok_or(LinkError::BadFloorData {
        index,
        reason: "chunk stream runs past the end of the table".to_string(),
    })
}

/// Decode the chunk list starting at `start`. Returns the chunks and the
/// number of words consumed; slot 0 is the reserved empty entry and decodes
/// to no chunks.
pub fn parse_chunks(words: &[u16], start: usize) -> Result<(Vec<Chunk>, usize), LinkError> {
    if start == 0 {
        return Ok((Vec::new(), 0));
    }
    let mut chunks = Vec::new();
    let mut index = start;
    loop {
        let header = word_at(words, index)?;
        index += 1;
        let chunk_type = (header & 0x00ff) as u8;
        let condition = ((header >> 8) & 0x7f) as u8;
        let chunk = match chunk_type {
            TYPE_PORTAL => {
                let target = word_at(words, index)?;
                index += 1;
                Chunk::Portal(TableIndex::new(target as u32))
            }
            TYPE_FLOOR_SLANT | TYPE_CEILING_SLANT => {
                let word = word_at(words, index)?;
                index += 1;
                let x = (word & 0x00ff) as u8 as i8;
                let z = (word >> 8) as u8 as i8;
                if chunk_type == TYPE_FLOOR_SLANT {
                    Chunk::FloorSlant { x, z }
                } else {
                    Chunk::CeilingSlant { x, z }
                }
            }
            TYPE_COMMAND_SEQUENCE => {
                let activation = word_at(words, index)?;
                index += 1;
                let mut commands = Vec::new();
                loop {
                    let word = word_at(words, index)?;
                    index += 1;
                    let kind = CommandKind::from_opcode((word >> 10) & 0x0f).ok_or(
                        LinkError::BadFloorData {
                            index: index - 1,
                            reason: format!("unknown command opcode in word {:#06x}", word),
                        },
                    )?;
                    let extra = if kind.has_extra_word() {
                        let extra = word_at(words, index)?;
                        index += 1;
                        Some(extra)
                    } else {
                        None
                    };
                    commands.push(Command {
                        kind,
                        parameter: word & 0x03ff,
                        extra,
                    });
                    if word & END_BIT != 0 {
                        break;
                    }
                }
                Chunk::CommandSequence(CommandSequence {
                    function: condition,
                    timer: (activation & 0x00ff) as u8,
                    one_shot: activation & 0x0100 != 0,
                    activation_mask: ((activation >> 9) & 0x1f) as u8,
                    commands,
                })
            }
            TYPE_DEATH => Chunk::Death,
            TYPE_CLIMBABLE_WALL => Chunk::ClimbableWall {
                directions: condition,
            },
            TYPE_TRIANGLE_FIRST..=TYPE_TRIANGLE_LAST => {
                let word = word_at(words, index)?;
                index += 1;
                Chunk::Triangle {
                    kind: chunk_type,
                    word,
                }
            }
            TYPE_MONKEY_SWING => Chunk::MonkeySwing,
            TYPE_MINECART_LEFT => Chunk::MinecartLeft,
            TYPE_MINECART_RIGHT => Chunk::MinecartRight,
            other => {
                return Err(LinkError::BadFloorData {
                    index: index - 1,
                    reason: format!("unknown chunk type {:#04x}", other),
                })
            }
        };
        chunks.push(chunk);
        if header & END_BIT != 0 {
            break;
        }
    }
    Ok((chunks, index - start))
}

/// Number of words the entry at `start` occupies.
pub fn slice_len(words: &[u16], start: usize) -> Result<usize, LinkError> {
    parse_chunks(words, start).map(|(_, len)| len)
}

/// Room redirect of a chunk list: at most a floor slant and a ceiling slant
/// may precede the portal chunk, and only when they are not the final chunk.
pub fn portal_target(chunks: &[Chunk]) -> Option<TableIndex<RoomTable>> {
    let mut rest = chunks;
    if let [Chunk::FloorSlant { .. }, tail @ ..] = rest {
        if tail.is_empty() {
            return None;
        }
        rest = tail;
    }
    if let [Chunk::CeilingSlant { .. }, tail @ ..] = rest {
        if tail.is_empty() {
            return None;
        }
        rest = tail;
    }
    match rest.first() {
        Some(Chunk::Portal(target)) => Some(*target),
        _ => None,
    }
}

/// Camera-slot indices named as underwater currents by any command in the
/// chunk list. These slots are sinks, not cameras.
pub fn sink_targets(chunks: &[Chunk]) -> impl Iterator<Item = usize> + '_ {
    chunks
        .iter()
        .filter_map(|chunk| match chunk {
            Chunk::CommandSequence(seq) => Some(seq.commands.iter()),
            _ => None,
        })
        .flatten()
        .filter(|command| command.kind == CommandKind::UnderwaterCurrent)
        .map(|command| command.parameter as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(kind: u16, parameter: u16, end: bool) -> u16 {
        (kind << 10) | parameter | if end { END_BIT } else { 0 }
    }

    #[test]
    fn test_reserved_zero_entry_decodes_empty() {
        let words = vec![0xdead];
        let (chunks, len) = parse_chunks(&words, 0).unwrap();
        assert!(chunks.is_empty());
        assert_eq!(len, 0);
    }

    #[test]
    fn test_portal_behind_slants() {
        // slot 1: floor slant, ceiling slant, portal to room 7 (last chunk).
        let words = vec![
            0,
            0x0002,
            0x01FE, // x=-2, z=1
            0x0003,
            0x0000,
            0x8001,
            7,
        ];
        let (chunks, len) = parse_chunks(&words, 1).unwrap();
        assert_eq!(len, 6);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], Chunk::FloorSlant { x: -2, z: 1 });
        assert_eq!(portal_target(&chunks).unwrap().raw(), 7);
    }

    #[test]
    fn test_slant_as_last_chunk_is_not_a_portal() {
        let words = vec![0, 0x8002, 0x0101];
        let (chunks, _) = parse_chunks(&words, 1).unwrap();
        assert_eq!(portal_target(&chunks), None);
    }

    #[test]
    fn test_command_sequence_with_camera_extra_word() {
        // trigger chunk, activation word, switch-camera (extra word), then
        // a final activate command carrying the end bit.
        let words = vec![
            0,
            0x8004 | (0x05 << 8), // sequence chunk, function 5, last chunk
            0x3E05,               // timer 5, all mask bits
            cmd(0x01, 12, false),
            0x0050, // camera duration word
            cmd(0x00, 30, true),
        ];
        let (chunks, len) = parse_chunks(&words, 1).unwrap();
        assert_eq!(len, 5);
        let Chunk::CommandSequence(seq) = &chunks[0] else {
            panic!("expected a command sequence");
        };
        assert_eq!(seq.function, 5);
        assert_eq!(seq.timer, 5);
        assert_eq!(seq.activation_mask, 0x1f);
        assert_eq!(seq.commands.len(), 2);
        assert_eq!(seq.commands[0].kind, CommandKind::SwitchCamera);
        assert_eq!(seq.commands[0].extra, Some(0x0050));
        assert_eq!(seq.commands[1].kind, CommandKind::Activate);
        assert_eq!(seq.commands[1].parameter, 30);
    }

    #[test]
    fn test_unknown_chunk_type_is_fatal() {
        let words = vec![0, 0x80FF];
        assert!(matches!(
            parse_chunks(&words, 1),
            Err(LinkError::BadFloorData { index: 1, .. })
        ));
    }

    #[test]
    fn test_truncated_stream_is_fatal() {
        // Portal chunk with its operand cut off.
        let words = vec![0, 0x0001];
        assert!(matches!(
            parse_chunks(&words, 1),
            Err(LinkError::BadFloorData { .. })
        ));
    }

    #[test]
    fn test_sink_targets_found_across_commands() {
        let words = vec![
            0,
            0x8004,
            0x0000,
            cmd(0x02, 3, false), // underwater current -> slot 3
            cmd(0x02, 9, true),  // underwater current -> slot 9
        ];
        let (chunks, _) = parse_chunks(&words, 1).unwrap();
        let sinks: Vec<usize> = sink_targets(&chunks).collect();
        assert_eq!(sinks, vec![3, 9]);
    }
}

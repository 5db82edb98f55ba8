//! Error taxonomy for the level loading pipeline
//!
//! Three severities, matching how broken content actually behaves:
//! - [`FormatError`]: the byte stream itself is wrong. Fatal - every later
//!   table offset depends on correct earlier parsing, so the whole load
//!   aborts.
//! - [`LinkError`]: a decoded cross-reference cannot be resolved. Per-sector
//!   room/box links degrade to "none" with a [`Warning`] (retail levels ship
//!   stray values in unused slots); floor-data resolution and sector grid
//!   overflows are fatal because they corrupt global consistency.
//! - [`Warning`]: accumulated and returned alongside the loaded world.

use serde::Serialize;

/// Fatal structural error in the byte stream. Aborts the entire load.
#[derive(Debug)]
pub enum FormatError {
    IoError(std::io::Error),
    /// The leading version magic matched no known generation.
    BadMagic(u32),
    /// A fixed marker byte sequence (e.g. "SPR", "TEX") was not found.
    BadMarker {
        expected: &'static str,
        found: u8,
    },
    /// A declared count exceeds its hard cap and cannot be a real count.
    BadCount {
        what: &'static str,
        count: u64,
        cap: u64,
    },
    /// A byte-offset reference does not divide evenly by its element size.
    MisalignedOffset {
        offset: u32,
        element_size: u32,
    },
    /// A structural expectation failed (bad separator semantics, impossible
    /// sub-block layout).
    BadStructure(String),
}

impl From<std::io::Error> for FormatError {
    fn from(e: std::io::Error) -> Self {
        FormatError::IoError(e)
    }
}

impl std::fmt::Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatError::IoError(e) => write!(f, "IO error: {}", e),
            FormatError::BadMagic(m) => write!(f, "unrecognized version magic 0x{:08X}", m),
            FormatError::BadMarker { expected, found } => {
                write!(f, "marker '{}' not found (got 0x{:02X})", expected, found)
            }
            FormatError::BadCount { what, count, cap } => {
                write!(f, "impossible {} count {} (cap {})", what, count, cap)
            }
            FormatError::MisalignedOffset {
                offset,
                element_size,
            } => write!(
                f,
                "offset {} is not a multiple of element size {}",
                offset, element_size
            ),
            FormatError::BadStructure(msg) => write!(f, "bad structure: {}", msg),
        }
    }
}

impl std::error::Error for FormatError {}

/// Cross-reference resolution error raised during or after assembly.
#[derive(Debug)]
pub enum LinkError {
    /// An index points past the end of its target table.
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        table_len: usize,
    },
    /// A floor-data chunk stream is malformed (unknown opcode, scan past the
    /// table end). Fatal: sector behavior would be silently wrong.
    BadFloorData {
        index: usize,
        reason: String,
    },
    /// A room's declared sector grid does not match its sector table.
    SectorGridMismatch {
        room: usize,
        width: usize,
        depth: usize,
        sectors: usize,
    },
    /// A spatial query crossed more rooms than exist in the world, which can
    /// only happen on a cyclic room graph.
    TraversalOverflow {
        start_room: usize,
        bound: usize,
    },
}

impl std::fmt::Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkError::IndexOutOfRange {
                what,
                index,
                table_len,
            } => write!(
                f,
                "{} index {} out of range (table has {} entries)",
                what, index, table_len
            ),
            LinkError::BadFloorData { index, reason } => {
                write!(f, "malformed floor data at word {}: {}", index, reason)
            }
            LinkError::SectorGridMismatch {
                room,
                width,
                depth,
                sectors,
            } => write!(
                f,
                "room {}: sector grid {}x{} does not match {} sectors",
                room, width, depth, sectors
            ),
            LinkError::TraversalOverflow { start_room, bound } => write!(
                f,
                "room traversal from room {} exceeded {} hops (cyclic room graph?)",
                start_room, bound
            ),
        }
    }
}

impl std::error::Error for LinkError {}

/// Umbrella error returned by the top-level load entry points.
#[derive(Debug)]
pub enum LoadError {
    Format(FormatError),
    Link(LinkError),
}

impl From<FormatError> for LoadError {
    fn from(e: FormatError) -> Self {
        LoadError::Format(e)
    }
}

impl From<LinkError> for LoadError {
    fn from(e: LinkError) -> Self {
        LoadError::Link(e)
    }
}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Format(FormatError::IoError(e))
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Format(e) => write!(f, "format error: {}", e),
            LoadError::Link(e) => write!(f, "link error: {}", e),
        }
    }
}

impl std::error::Error for LoadError {}

/// Non-fatal condition observed during load. All warnings are accumulated and
/// returned with the successfully loaded world. Serializable so tooling can
/// dump a RON report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Warning {
    /// A declared count exceeded its defensive cap; excess entries were
    /// skipped byte-exactly so later tables stay in sync.
    CountClamped {
        what: String,
        count: u64,
        cap: u64,
    },
    /// A count slot held filler (0xCDCDCDCD); treated as zero.
    FillerCount {
        what: String,
    },
    /// A separator or filler word had an unexpected value.
    BadSeparator {
        what: String,
        found: u32,
    },
    /// An optional per-sector or per-record relation pointed out of range and
    /// was degraded to "none".
    DanglingReference {
        what: String,
        index: usize,
        table_len: usize,
    },
    /// A value failed a soft consistency check but was kept.
    SuspectValue {
        what: String,
        detail: String,
    },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::CountClamped { what, count, cap } => {
                write!(f, "{}: count {} clamped to {}", what, count, cap)
            }
            Warning::FillerCount { what } => {
                write!(f, "{}: filler in place of count, treated as zero", what)
            }
            Warning::BadSeparator { what, found } => {
                write!(f, "{}: unexpected separator value 0x{:08X}", what, found)
            }
            Warning::DanglingReference {
                what,
                index,
                table_len,
            } => write!(
                f,
                "{}: index {} out of range ({} entries), relation dropped",
                what, index, table_len
            ),
            Warning::SuspectValue { what, detail } => write!(f, "{}: {}", what, detail),
        }
    }
}

/// Serialize a warning report to RON for tooling.
pub fn warnings_to_ron(warnings: &[Warning]) -> Result<String, ron::Error> {
    let config = ron::ser::PrettyConfig::new()
        .depth_limit(4)
        .indentor("  ".to_string());
    ron::ser::to_string_pretty(&warnings, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_misaligned_offset() {
        let e = FormatError::MisalignedOffset {
            offset: 7,
            element_size: 2,
        };
        assert_eq!(e.to_string(), "offset 7 is not a multiple of element size 2");
    }

    #[test]
    fn test_warning_report_serializes() {
        let warnings = vec![
            Warning::DanglingReference {
                what: "sector room_below".to_string(),
                index: 200,
                table_len: 3,
            },
            Warning::FillerCount {
                what: "room triangles".to_string(),
            },
        ];
        let ron = warnings_to_ron(&warnings).unwrap();
        assert!(ron.contains("DanglingReference"));
        assert!(ron.contains("room_below"));
    }
}

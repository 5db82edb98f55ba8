//! Typed cross-references into not-yet-loaded tables
//!
//! The format reuses plain numeric fields to point into tables that are
//! decoded later in the stream. A raw record therefore stores the number
//! behind a zero-cost wrapper that remembers which table(s) it may legally
//! resolve against. Resolving against an undeclared table does not compile;
//! resolving against the right table still checks bounds (and, for byte
//! offsets, divisibility by the element size) at link time.
//!
//! Table membership is expressed through [`TableElement`]: a reference tagged
//! with `Tag` resolves only against slices of types implementing
//! `TableElement<Tag>`. One tag may declare several legal element types.

use std::marker::PhantomData;

use crate::error::{FormatError, LinkError};

/// Declares that `Self` is a legal element type for tables referenced through
/// `Tag`. `WIDTH` is the serialized element width used by offset division.
pub trait TableElement<Tag> {
    const WIDTH: u32;
}

/// Tag: the shared pose-frame word table.
pub enum PoseFrameTable {}
/// Tag: the mesh word block (byte offsets from the mesh-pointer table).
pub enum MeshWordTable {}
/// Tag: the room table.
pub enum RoomTable {}
/// Tag: the animation table.
pub enum AnimationTable {}
/// Tag: the shared floor-data word table.
pub enum FloorDataTable {}

impl TableElement<PoseFrameTable> for u16 {
    const WIDTH: u32 = 2;
}
impl TableElement<MeshWordTable> for u16 {
    const WIDTH: u32 = 2;
}
impl TableElement<FloorDataTable> for u16 {
    const WIDTH: u32 = 2;
}

/// A raw byte offset into a table. The slot index is `raw / WIDTH`; a raw
/// value that does not divide evenly is a fatal decode error, because it can
/// only mean the number was written against a different table layout.
pub struct TableOffset<Tag> {
    raw: u32,
    _tag: PhantomData<fn() -> Tag>,
}

impl<Tag> TableOffset<Tag> {
    pub fn new(raw: u32) -> Self {
        Self {
            raw,
            _tag: PhantomData,
        }
    }

    pub fn raw(&self) -> u32 {
        self.raw
    }

    /// Slot index within the target table.
    pub fn slot<T: TableElement<Tag>>(&self) -> Result<usize, FormatError> {
        if self.raw % T::WIDTH != 0 {
            return Err(FormatError::MisalignedOffset {
                offset: self.raw,
                element_size: T::WIDTH,
            });
        }
        Ok((self.raw / T::WIDTH) as usize)
    }

    /// Whether the offset lands inside `table`. Divisibility failures count
    /// as "outside".
    pub fn in_table<T: TableElement<Tag>>(&self, table: &[T]) -> bool {
        match self.slot::<T>() {
            Ok(slot) => slot < table.len(),
            Err(_) => false,
        }
    }

    pub fn resolve<'t, T: TableElement<Tag>>(
        &self,
        table: &'t [T],
        what: &'static str,
    ) -> Result<&'t T, LinkError> {
        let slot = self.slot::<T>().map_err(|_| LinkError::IndexOutOfRange {
            what,
            index: self.raw as usize,
            table_len: table.len(),
        })?;
        table.get(slot).ok_or(LinkError::IndexOutOfRange {
            what,
            index: slot,
            table_len: table.len(),
        })
    }
}

// Manual impls: a derived Clone would demand Tag: Clone, and the tags are
// uninhabited marker types.
impl<Tag> Clone for TableOffset<Tag> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<Tag> Copy for TableOffset<Tag> {}
impl<Tag> std::fmt::Debug for TableOffset<Tag> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TableOffset({})", self.raw)
    }
}
impl<Tag> PartialEq for TableOffset<Tag> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}
impl<Tag> Eq for TableOffset<Tag> {}

/// A plain index into a table, bounds-checked at link time.
pub struct TableIndex<Tag> {
    raw: u32,
    _tag: PhantomData<fn() -> Tag>,
}

impl<Tag> TableIndex<Tag> {
    pub fn new(raw: u32) -> Self {
        Self {
            raw,
            _tag: PhantomData,
        }
    }

    pub fn raw(&self) -> u32 {
        self.raw
    }

    pub fn in_table<T: TableElement<Tag>>(&self, table: &[T]) -> bool {
        (self.raw as usize) < table.len()
    }

    pub fn resolve<'t, T: TableElement<Tag>>(
        &self,
        table: &'t [T],
        what: &'static str,
    ) -> Result<&'t T, LinkError> {
        table
            .get(self.raw as usize)
            .ok_or(LinkError::IndexOutOfRange {
                what,
                index: self.raw as usize,
                table_len: table.len(),
            })
    }
}

impl<Tag> Clone for TableIndex<Tag> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<Tag> Copy for TableIndex<Tag> {}
impl<Tag> std::fmt::Debug for TableIndex<Tag> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TableIndex({})", self.raw)
    }
}
impl<Tag> PartialEq for TableIndex<Tag> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}
impl<Tag> Eq for TableIndex<Tag> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_divisibility() {
        let table: Vec<u16> = vec![100, 200, 300];

        let ok = TableOffset::<PoseFrameTable>::new(4);
        assert_eq!(ok.slot::<u16>().unwrap(), 2);
        assert_eq!(*ok.resolve(&table, "pose frame").unwrap(), 300);

        // Any raw value with the low bit set must fail against 2-byte words.
        for raw in [1u32, 3, 7, 4095] {
            let bad = TableOffset::<PoseFrameTable>::new(raw);
            assert!(matches!(
                bad.slot::<u16>(),
                Err(FormatError::MisalignedOffset {
                    offset,
                    element_size: 2,
                }) if offset == raw
            ));
        }
    }

    #[test]
    fn test_offset_out_of_range() {
        let table: Vec<u16> = vec![0; 4];
        let past_end = TableOffset::<PoseFrameTable>::new(8);
        assert!(!past_end.in_table(&table));
        assert!(matches!(
            past_end.resolve(&table, "pose frame"),
            Err(LinkError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_index_bounds() {
        let table: Vec<u16> = vec![7, 8];
        assert_eq!(
            *TableIndex::<FloorDataTable>::new(1)
                .resolve(&table, "floor data")
                .unwrap(),
            8
        );
        assert!(matches!(
            TableIndex::<FloorDataTable>::new(2).resolve(&table, "floor data"),
            Err(LinkError::IndexOutOfRange {
                index: 2,
                table_len: 2,
                ..
            })
        ));
    }
}

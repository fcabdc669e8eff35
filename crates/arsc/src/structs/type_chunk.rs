//! Type chunks: the per-configuration entry tables of a package.

use std::collections::BTreeMap;

use bitflags::bitflags;
use byteorder::{LE, WriteBytesExt};
use winnow::binary::{le_u16, le_u32, u8};
use winnow::prelude::*;

use crate::chunk::{ChunkHeader, ChunkKind, NO_ENTRY, SerializeFlags, emit_chunk, read_u32s};
use crate::errors::ChunkError;
use crate::structs::{ResConfig, ResValue};

const CODE: u16 = 0x0201;

bitflags! {
    /// Bits of the 16-bit entry flag word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntryFlags: u16 {
        /// If set, this is a complex entry holding a set of name/value mappings
        const COMPLEX = 0x0001;

        /// If set, this resource has been declared public
        const PUBLIC = 0x0002;
    }
}

/// The payload of one entry: a single typed value, or a parent reference
/// with a list of (attribute id, value) mappings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Simple(ResValue),
    Complex {
        parent: u32,
        values: Vec<(u32, ResValue)>,
    },
}

/// One resource entry. Plain data with structural equality: consumers key
/// maps by entries, never by identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entry {
    pub flags: u16,
    pub key_index: u32,
    pub kind: EntryKind,
}

impl Entry {
    const SIMPLE_HEADER_SIZE: u16 = 8;
    const COMPLEX_HEADER_SIZE: u16 = 16;

    pub fn simple(key_index: u32, value: ResValue) -> Entry {
        Entry {
            flags: 0,
            key_index,
            kind: EntryKind::Simple(value),
        }
    }

    pub fn is_complex(&self) -> bool {
        matches!(self.kind, EntryKind::Complex { .. })
    }

    pub fn is_public(&self) -> bool {
        EntryFlags::from_bits_truncate(self.flags).contains(EntryFlags::PUBLIC)
    }

    /// The simple value, if this entry carries one.
    pub fn value(&self) -> Option<&ResValue> {
        match &self.kind {
            EntryKind::Simple(value) => Some(value),
            EntryKind::Complex { .. } => None,
        }
    }

    /// The (attribute id, value) mappings of a complex entry.
    pub fn values(&self) -> &[(u32, ResValue)] {
        match &self.kind {
            EntryKind::Simple(_) => &[],
            EntryKind::Complex { values, .. } => values,
        }
    }

    /// Serialized length in bytes.
    pub fn size(&self) -> usize {
        match &self.kind {
            EntryKind::Simple(_) => 16,
            EntryKind::Complex { values, .. } => 16 + values.len() * 12,
        }
    }

    fn parse_header_fields(input: &mut &[u8]) -> ModalResult<(u16, u16, u32)> {
        (le_u16, le_u16, le_u32).parse_next(input)
    }

    fn parse_map_fields(input: &mut &[u8]) -> ModalResult<(u32, u32)> {
        (le_u32, le_u32).parse_next(input)
    }

    fn parse_map16_fields(input: &mut &[u8]) -> ModalResult<(u16, u16)> {
        (le_u16, le_u16).parse_next(input)
    }

    pub(crate) fn parse(input: &mut &[u8], abs: usize) -> Result<Entry, ChunkError> {
        let (_header_size, flags, key_index) = Self::parse_header_fields(input)
            .map_err(|_| ChunkError::truncated(abs, "entry header"))?;

        let kind = if EntryFlags::from_bits_truncate(flags).contains(EntryFlags::COMPLEX) {
            let (parent, count) = Self::parse_map_fields(input)
                .map_err(|_| ChunkError::truncated(abs, "complex entry header"))?;
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let name = le_u32::<_, winnow::error::ContextError>
                    .parse_next(input)
                    .map_err(|_| ChunkError::truncated(abs, "complex entry mapping"))?;
                let value = ResValue::parse(input, abs)?;
                values.push((name, value));
            }
            EntryKind::Complex { parent, values }
        } else {
            EntryKind::Simple(ResValue::parse(input, abs)?)
        };

        Ok(Entry {
            flags,
            key_index,
            kind,
        })
    }

    pub(crate) fn write_to(
        &self,
        out: &mut Vec<u8>,
        flags: SerializeFlags,
    ) -> Result<(), ChunkError> {
        let mut flag_word = self.flags;
        if flags.contains(SerializeFlags::PRIVATE_RESOURCES) {
            flag_word &= !EntryFlags::PUBLIC.bits();
        }

        match &self.kind {
            EntryKind::Simple(value) => {
                out.write_u16::<LE>(Self::SIMPLE_HEADER_SIZE)?;
                out.write_u16::<LE>(flag_word & !EntryFlags::COMPLEX.bits())?;
                out.write_u32::<LE>(self.key_index)?;
                value.write_to(out)?;
            }
            EntryKind::Complex { parent, values } => {
                out.write_u16::<LE>(Self::COMPLEX_HEADER_SIZE)?;
                out.write_u16::<LE>(flag_word | EntryFlags::COMPLEX.bits())?;
                out.write_u32::<LE>(self.key_index)?;
                out.write_u32::<LE>(*parent)?;
                out.write_u32::<LE>(values.len() as u32)?;
                for (name, value) in values {
                    out.write_u32::<LE>(*name)?;
                    value.write_to(out)?;
                }
            }
        }
        Ok(())
    }
}

bitflags! {
    /// Bits of the 8-bit type-chunk flag byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TypeFlags: u8 {
        /// If set, the entry table encodes (index, quarter-offset) pairs for
        /// present entries only
        const SPARSE = 0x01;
    }
}

/// A type chunk (type code 0x0201): the entries of one resource type under
/// one configuration. Entries live in a sparse map from dense index to
/// entry; absent indices serialize as the `0xFFFFFFFF` sentinel in the
/// dense layout and are omitted in the sparse one.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeChunk {
    id: u8,
    flags: u8,
    reserved: u16,
    total_entry_count: u32,
    config: ResConfig,
    entries: BTreeMap<u32, Entry>,
}

impl TypeChunk {
    fn parse_header_fields(input: &mut &[u8]) -> ModalResult<(u8, u8, u16, u32, u32)> {
        (u8, u8, le_u16, le_u32, le_u32).parse_next(input)
    }

    pub(crate) fn parse(
        header: ChunkHeader,
        chunk: &[u8],
        abs: usize,
    ) -> Result<TypeChunk, ChunkError> {
        let mut cur = &chunk[ChunkHeader::SIZE..];
        let (id, flags, reserved, total_entry_count, entries_start) =
            Self::parse_header_fields(&mut cur)
                .map_err(|_| ChunkError::truncated(abs, "type chunk header"))?;

        if id == 0 {
            return Err(ChunkError::malformed(abs, CODE, "type id 0 is invalid"));
        }

        let config = ResConfig::parse(&mut cur, abs)?;

        let expected_header = 20 + config.size() as usize;
        if header.header_size as usize != expected_header {
            return Err(ChunkError::malformed(
                abs,
                CODE,
                format!(
                    "header size {} does not match the {} byte configuration",
                    header.header_size,
                    config.size()
                ),
            ));
        }

        let entries_start = entries_start as usize;
        if entries_start < expected_header || entries_start > chunk.len() {
            return Err(ChunkError::malformed(
                abs,
                CODE,
                format!("entries start {entries_start} is out of bounds"),
            ));
        }
        let entry_region = &chunk[entries_start..];

        let mut entries = BTreeMap::new();
        if TypeFlags::from_bits_truncate(flags).contains(TypeFlags::SPARSE) {
            let mut table = &chunk[expected_header..entries_start];
            for _ in 0..total_entry_count {
                let (index, quarter) = Entry::parse_map16_fields(&mut table)
                    .map_err(|_| ChunkError::truncated(abs, "sparse entry table"))?;
                let offset = quarter as usize * 4;
                if offset >= entry_region.len() {
                    return Err(ChunkError::malformed(
                        abs,
                        CODE,
                        format!("sparse entry offset {offset} exceeds the chunk"),
                    ));
                }
                let mut ecur = &entry_region[offset..];
                entries.insert(index as u32, Entry::parse(&mut ecur, abs)?);
            }
        } else {
            let mut table = &chunk[expected_header..entries_start];
            let offsets = read_u32s(total_entry_count as usize, &mut table)
                .map_err(|_| ChunkError::truncated(abs, "entry offset table"))?;
            for (index, &offset) in offsets.iter().enumerate() {
                if offset == NO_ENTRY {
                    continue;
                }
                if offset as usize >= entry_region.len() {
                    return Err(ChunkError::malformed(
                        abs,
                        CODE,
                        format!("entry offset {offset} exceeds the chunk"),
                    ));
                }
                let mut ecur = &entry_region[offset as usize..];
                entries.insert(index as u32, Entry::parse(&mut ecur, abs)?);
            }
        }

        Ok(TypeChunk {
            id,
            flags,
            reserved,
            total_entry_count,
            config,
            entries,
        })
    }

    pub(crate) fn write_to(
        &self,
        out: &mut Vec<u8>,
        flags: SerializeFlags,
    ) -> Result<(), ChunkError> {
        let sparse = self.is_sparse();

        let mut entry_data = Vec::new();
        let mut body = Vec::new();

        let table_count = if sparse {
            self.entries.len() as u32
        } else {
            self.total_entry_count
        };
        let header_size = 20 + self.config.size() as u16;
        let entries_start = header_size as u32 + table_count * 4;

        body.write_u8(self.id)?;
        body.write_u8(self.flags)?;
        body.write_u16::<LE>(self.reserved)?;
        body.write_u32::<LE>(table_count)?;
        body.write_u32::<LE>(entries_start)?;
        self.config.write_to(&mut body)?;

        if sparse {
            for (&index, entry) in &self.entries {
                let offset = entry_data.len();
                if offset % 4 != 0 {
                    return Err(ChunkError::invariant(format!(
                        "sparse entry offset {offset} is not a multiple of 4"
                    )));
                }
                if index > 0xFFFF || offset / 4 > 0xFFFF {
                    return Err(ChunkError::invariant(
                        "sparse entry does not fit the 16-bit index/offset encoding",
                    ));
                }
                body.write_u16::<LE>(index as u16)?;
                body.write_u16::<LE>((offset / 4) as u16)?;
                entry.write_to(&mut entry_data, flags)?;
            }
        } else {
            for index in 0..self.total_entry_count {
                match self.entries.get(&index) {
                    Some(entry) => {
                        body.write_u32::<LE>(entry_data.len() as u32)?;
                        entry.write_to(&mut entry_data, flags)?;
                    }
                    None => body.write_u32::<LE>(NO_ENTRY)?,
                }
            }
        }

        body.extend_from_slice(&entry_data);
        emit_chunk(out, ChunkKind::TableType, header_size, &body)
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn is_sparse(&self) -> bool {
        TypeFlags::from_bits_truncate(self.flags).contains(TypeFlags::SPARSE)
    }

    pub fn config(&self) -> &ResConfig {
        &self.config
    }

    /// Sparse map from dense index to entry.
    pub fn entries(&self) -> &BTreeMap<u32, Entry> {
        &self.entries
    }

    pub(crate) fn entries_mut(&mut self) -> &mut BTreeMap<u32, Entry> {
        &mut self.entries
    }

    pub fn entry(&self, index: u32) -> Option<&Entry> {
        self.entries.get(&index)
    }

    /// The declared number of entry slots, counting absent ones.
    pub fn total_entry_count(&self) -> u32 {
        if self.is_sparse() {
            self.entries.len() as u32
        } else {
            self.total_entry_count
        }
    }

    pub fn present_entry_count(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn null_entry_count(&self) -> u32 {
        self.total_entry_count() - self.present_entry_count()
    }

    #[cfg(test)]
    pub(crate) fn build(
        id: u8,
        flags: u8,
        total_entry_count: u32,
        config: ResConfig,
        entries: BTreeMap<u32, Entry>,
    ) -> TypeChunk {
        TypeChunk {
            id,
            flags,
            reserved: 0,
            total_entry_count,
            config,
            entries,
        }
    }
}

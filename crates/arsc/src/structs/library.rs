//! Shared-library chunks: package-id to package-name mappings.

use std::fmt;

use byteorder::{LE, WriteBytesExt};
use winnow::binary::le_u32;
use winnow::prelude::*;
use winnow::token::take;

use crate::chunk::{ChunkHeader, ChunkKind, emit_chunk};
use crate::errors::ChunkError;

/// One shared-library mapping: the package id assigned at build time and
/// the library's package name in a fixed 256-byte UTF-16 field.
#[derive(Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    pub package_id: u32,
    pub raw_name: [u8; 256],
}

impl LibraryEntry {
    fn parse_fields(input: &mut &[u8]) -> ModalResult<LibraryEntry> {
        (le_u32, take(256usize))
            .map(|(package_id, raw_name): (u32, &[u8])| LibraryEntry {
                package_id,
                raw_name: raw_name
                    .try_into()
                    .expect("expected 256 bytes for the library name"),
            })
            .parse_next(input)
    }

    /// The package name, decoded up to the first NUL.
    pub fn package_name(&self) -> String {
        crate::structs::decode_fixed_utf16(&self.raw_name)
    }
}

impl fmt::Debug for LibraryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryEntry")
            .field("package_id", &self.package_id)
            .field("package_name", &self.package_name())
            .finish()
    }
}

/// A library chunk (type code 0x0203).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryChunk {
    entries: Vec<LibraryEntry>,
}

impl LibraryChunk {
    const HEADER_SIZE: u16 = 12;
    const CODE: u16 = 0x0203;

    pub(crate) fn parse(
        header: ChunkHeader,
        chunk: &[u8],
        abs: usize,
    ) -> Result<LibraryChunk, ChunkError> {
        if header.header_size != Self::HEADER_SIZE {
            return Err(ChunkError::malformed(
                abs,
                Self::CODE,
                format!("library header size {} != 12", header.header_size),
            ));
        }

        let mut cur = &chunk[ChunkHeader::SIZE..];
        let count = le_u32::<_, winnow::error::ContextError>
            .parse_next(&mut cur)
            .map_err(|_| ChunkError::truncated(abs, "library count"))?;

        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let entry = LibraryEntry::parse_fields(&mut cur)
                .map_err(|_| ChunkError::truncated(abs, "library entry"))?;
            entries.push(entry);
        }

        Ok(LibraryChunk { entries })
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) -> Result<(), ChunkError> {
        let mut body = Vec::with_capacity(4 + self.entries.len() * 260);
        body.write_u32::<LE>(self.entries.len() as u32)?;
        for entry in &self.entries {
            body.write_u32::<LE>(entry.package_id)?;
            body.extend_from_slice(&entry.raw_name);
        }
        emit_chunk(out, ChunkKind::TableLibrary, Self::HEADER_SIZE, &body)
    }

    pub fn entries(&self) -> &[LibraryEntry] {
        &self.entries
    }
}

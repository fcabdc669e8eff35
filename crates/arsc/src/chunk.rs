//! Chunk framing: the common 8-byte metadata header, the polymorphic chunk
//! tree and the top-level document.
//!
//! Every chunk starts with a 16-bit type code, a 16-bit header size and a
//! 32-bit total size. A single framing routine dispatches on the type code;
//! after a chunk's own parser returns, the cursor is repositioned to
//! `offset + size` so intra-chunk slack and unknown trailing bytes never
//! derail the stream. Writing is symmetric: each chunk assembles its body in
//! a private scratch buffer, back-patching any header field that depends on
//! payload layout, and the framed size is derived from the finished body.

use bitflags::bitflags;
use byteorder::{LE, WriteBytesExt};
use winnow::binary::{le_u16, le_u32};
use winnow::combinator::repeat;
use winnow::prelude::*;

use crate::errors::ChunkError;
use crate::structs::{
    LibraryChunk, PackageChunk, StringPoolChunk, TableChunk, TypeChunk, TypeSpecChunk,
    XmlCdataChunk, XmlChunk, XmlElementChunk, XmlElementEndChunk, XmlNamespaceChunk,
    XmlResourceMapChunk,
};

/// Sentinel used throughout the format for "no entry" / "no string".
pub const NO_ENTRY: u32 = 0xFFFF_FFFF;

bitflags! {
    /// Options accepted by the writer. The default (empty) set reproduces
    /// an untouched input byte for byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SerializeFlags: u32 {
        /// Deduplicate pool strings and styles by content
        const SHRINK = 1 << 0;

        /// Strip the public bit from type-spec masks and entry flags
        const PRIVATE_RESOURCES = 1 << 1;
    }
}

/// Chunk type catalogue. Codes outside this set are carried as [`Chunk::Raw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkKind {
    StringPool,
    Table,
    Xml,
    XmlStartNamespace,
    XmlEndNamespace,
    XmlStartElement,
    XmlEndElement,
    XmlCdata,
    XmlResourceMap,
    TablePackage,
    TableType,
    TableTypeSpec,
    TableLibrary,
    Unknown(u16),
}

impl From<u16> for ChunkKind {
    fn from(code: u16) -> Self {
        match code {
            0x0001 => ChunkKind::StringPool,
            0x0002 => ChunkKind::Table,
            0x0003 => ChunkKind::Xml,
            0x0100 => ChunkKind::XmlStartNamespace,
            0x0101 => ChunkKind::XmlEndNamespace,
            0x0102 => ChunkKind::XmlStartElement,
            0x0103 => ChunkKind::XmlEndElement,
            0x0104 => ChunkKind::XmlCdata,
            0x0180 => ChunkKind::XmlResourceMap,
            0x0200 => ChunkKind::TablePackage,
            0x0201 => ChunkKind::TableType,
            0x0202 => ChunkKind::TableTypeSpec,
            0x0203 => ChunkKind::TableLibrary,
            other => ChunkKind::Unknown(other),
        }
    }
}

impl ChunkKind {
    pub fn code(self) -> u16 {
        match self {
            ChunkKind::StringPool => 0x0001,
            ChunkKind::Table => 0x0002,
            ChunkKind::Xml => 0x0003,
            ChunkKind::XmlStartNamespace => 0x0100,
            ChunkKind::XmlEndNamespace => 0x0101,
            ChunkKind::XmlStartElement => 0x0102,
            ChunkKind::XmlEndElement => 0x0103,
            ChunkKind::XmlCdata => 0x0104,
            ChunkKind::XmlResourceMap => 0x0180,
            ChunkKind::TablePackage => 0x0200,
            ChunkKind::TableType => 0x0201,
            ChunkKind::TableTypeSpec => 0x0202,
            ChunkKind::TableLibrary => 0x0203,
            ChunkKind::Unknown(code) => code,
        }
    }
}

/// The 8-byte metadata prefix shared by every chunk.
#[derive(Debug, Clone, Copy)]
pub struct ChunkHeader {
    pub kind: ChunkKind,
    pub header_size: u16,
    pub size: u32,
}

impl ChunkHeader {
    pub(crate) const SIZE: usize = 8;

    fn parse_fields(input: &mut &[u8]) -> ModalResult<ChunkHeader> {
        (le_u16, le_u16, le_u32)
            .map(|(code, header_size, size)| ChunkHeader {
                kind: ChunkKind::from(code),
                header_size,
                size,
            })
            .parse_next(input)
    }
}

/// One chunk of any kind, owning its children.
#[derive(Debug, Clone, PartialEq)]
pub enum Chunk {
    StringPool(StringPoolChunk),
    Table(TableChunk),
    Xml(XmlChunk),
    XmlStartNamespace(XmlNamespaceChunk),
    XmlEndNamespace(XmlNamespaceChunk),
    XmlStartElement(XmlElementChunk),
    XmlEndElement(XmlElementEndChunk),
    XmlCdata(XmlCdataChunk),
    XmlResourceMap(XmlResourceMapChunk),
    Package(PackageChunk),
    Type(TypeChunk),
    TypeSpec(TypeSpecChunk),
    Library(LibraryChunk),
    Raw(RawChunk),
}

impl Chunk {
    /// Parses the chunk starting at `buf[0]`. `abs` is the absolute offset
    /// of that position in the original input, used for error context.
    /// Returns the chunk and the number of bytes it declared.
    pub(crate) fn parse_next(buf: &[u8], abs: usize) -> Result<(Chunk, usize), ChunkError> {
        let mut cur = buf;
        let header = ChunkHeader::parse_fields(&mut cur)
            .map_err(|_| ChunkError::truncated(abs, "chunk metadata header"))?;
        let code = header.kind.code();

        if (header.header_size as usize) < ChunkHeader::SIZE {
            return Err(ChunkError::malformed(
                abs,
                code,
                format!(
                    "header size {} is smaller than the 8 byte metadata",
                    header.header_size
                ),
            ));
        }
        if (header.size as usize) < header.header_size as usize {
            return Err(ChunkError::malformed(
                abs,
                code,
                format!(
                    "chunk size {} is smaller than its header size {}",
                    header.size, header.header_size
                ),
            ));
        }
        if header.size as usize > buf.len() {
            return Err(ChunkError::Overrun {
                offset: abs,
                type_code: code,
                declared: header.size,
                available: buf.len(),
            });
        }

        let chunk = &buf[..header.size as usize];
        let parsed = match header.kind {
            ChunkKind::StringPool => Chunk::StringPool(StringPoolChunk::parse(header, chunk, abs)?),
            ChunkKind::Table => Chunk::Table(TableChunk::parse(header, chunk, abs)?),
            ChunkKind::Xml => Chunk::Xml(XmlChunk::parse(header, chunk, abs)?),
            ChunkKind::XmlStartNamespace => {
                Chunk::XmlStartNamespace(XmlNamespaceChunk::parse(header, chunk, abs)?)
            }
            ChunkKind::XmlEndNamespace => {
                Chunk::XmlEndNamespace(XmlNamespaceChunk::parse(header, chunk, abs)?)
            }
            ChunkKind::XmlStartElement => {
                Chunk::XmlStartElement(XmlElementChunk::parse(header, chunk, abs)?)
            }
            ChunkKind::XmlEndElement => {
                Chunk::XmlEndElement(XmlElementEndChunk::parse(header, chunk, abs)?)
            }
            ChunkKind::XmlCdata => Chunk::XmlCdata(XmlCdataChunk::parse(header, chunk, abs)?),
            ChunkKind::XmlResourceMap => {
                Chunk::XmlResourceMap(XmlResourceMapChunk::parse(header, chunk, abs)?)
            }
            ChunkKind::TablePackage => Chunk::Package(PackageChunk::parse(header, chunk, abs)?),
            ChunkKind::TableType => Chunk::Type(TypeChunk::parse(header, chunk, abs)?),
            ChunkKind::TableTypeSpec => Chunk::TypeSpec(TypeSpecChunk::parse(header, chunk, abs)?),
            ChunkKind::TableLibrary => Chunk::Library(LibraryChunk::parse(header, chunk, abs)?),
            ChunkKind::Unknown(code) => Chunk::Raw(RawChunk {
                code,
                header_size: header.header_size,
                body: chunk[ChunkHeader::SIZE..].to_vec(),
            }),
        };

        Ok((parsed, header.size as usize))
    }

    pub fn kind(&self) -> ChunkKind {
        match self {
            Chunk::StringPool(_) => ChunkKind::StringPool,
            Chunk::Table(_) => ChunkKind::Table,
            Chunk::Xml(_) => ChunkKind::Xml,
            Chunk::XmlStartNamespace(_) => ChunkKind::XmlStartNamespace,
            Chunk::XmlEndNamespace(_) => ChunkKind::XmlEndNamespace,
            Chunk::XmlStartElement(_) => ChunkKind::XmlStartElement,
            Chunk::XmlEndElement(_) => ChunkKind::XmlEndElement,
            Chunk::XmlCdata(_) => ChunkKind::XmlCdata,
            Chunk::XmlResourceMap(_) => ChunkKind::XmlResourceMap,
            Chunk::Package(_) => ChunkKind::TablePackage,
            Chunk::Type(_) => ChunkKind::TableType,
            Chunk::TypeSpec(_) => ChunkKind::TableTypeSpec,
            Chunk::Library(_) => ChunkKind::TableLibrary,
            Chunk::Raw(raw) => ChunkKind::Unknown(raw.code),
        }
    }

    pub fn write_to(&self, out: &mut Vec<u8>, flags: SerializeFlags) -> Result<(), ChunkError> {
        match self {
            Chunk::StringPool(c) => c.write_to(out, flags),
            Chunk::Table(c) => c.write_to(out, flags),
            Chunk::Xml(c) => c.write_to(out, flags),
            Chunk::XmlStartNamespace(c) => c.write_to(out, ChunkKind::XmlStartNamespace),
            Chunk::XmlEndNamespace(c) => c.write_to(out, ChunkKind::XmlEndNamespace),
            Chunk::XmlStartElement(c) => c.write_to(out),
            Chunk::XmlEndElement(c) => c.write_to(out),
            Chunk::XmlCdata(c) => c.write_to(out),
            Chunk::XmlResourceMap(c) => c.write_to(out),
            Chunk::Package(c) => c.write_to(out, flags),
            Chunk::Type(c) => c.write_to(out, flags),
            Chunk::TypeSpec(c) => c.write_to(out, flags),
            Chunk::Library(c) => c.write_to(out),
            Chunk::Raw(c) => c.write_to(out),
        }
    }

    /// Serialized length under the given options.
    pub fn size(&self, flags: SerializeFlags) -> Result<usize, ChunkError> {
        let mut scratch = Vec::new();
        self.write_to(&mut scratch, flags)?;
        Ok(scratch.len())
    }

    pub fn to_bytes(&self, flags: SerializeFlags) -> Result<Vec<u8>, ChunkError> {
        let mut out = Vec::new();
        self.write_to(&mut out, flags)?;
        Ok(out)
    }
}

/// A chunk whose type code is outside the catalogue. The bytes after the
/// metadata header are preserved verbatim and carry no interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    pub code: u16,
    pub header_size: u16,
    pub body: Vec<u8>,
}

impl RawChunk {
    pub(crate) fn write_to(&self, out: &mut Vec<u8>) -> Result<(), ChunkError> {
        out.write_u16::<LE>(self.code)?;
        out.write_u16::<LE>(self.header_size)?;
        out.write_u32::<LE>((ChunkHeader::SIZE + self.body.len()) as u32)?;
        out.extend_from_slice(&self.body);
        Ok(())
    }
}

/// A parsed container file: the ordered sequence of root chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub chunks: Vec<Chunk>,
}

impl Document {
    /// Parses an entire byte slice into the root chunk sequence.
    pub fn parse(data: &[u8]) -> Result<Document, ChunkError> {
        let chunks = parse_chunk_sequence(data, 0, 0, data.len())?;
        Ok(Document { chunks })
    }

    /// Re-serializes the whole tree. Under [`SerializeFlags::empty`] the
    /// result of parsing-then-serializing equals the original input.
    pub fn serialize(&self, flags: SerializeFlags) -> Result<Vec<u8>, ChunkError> {
        let mut out = Vec::new();
        for chunk in &self.chunks {
            chunk.write_to(&mut out, flags)?;
            pad_to_4(&mut out);
        }
        Ok(out)
    }

    /// Resource tables among the root chunks, usually exactly one for a
    /// `resources.arsc` input.
    pub fn tables(&self) -> impl Iterator<Item = &TableChunk> {
        self.chunks.iter().filter_map(|c| match c {
            Chunk::Table(t) => Some(t),
            _ => None,
        })
    }

    pub fn tables_mut(&mut self) -> impl Iterator<Item = &mut TableChunk> {
        self.chunks.iter_mut().filter_map(|c| match c {
            Chunk::Table(t) => Some(t),
            _ => None,
        })
    }

    /// Compiled XML documents among the root chunks.
    pub fn xml_chunks(&self) -> impl Iterator<Item = &XmlChunk> {
        self.chunks.iter().filter_map(|c| match c {
            Chunk::Xml(x) => Some(x),
            _ => None,
        })
    }

    pub fn xml_chunks_mut(&mut self) -> impl Iterator<Item = &mut XmlChunk> {
        self.chunks.iter_mut().filter_map(|c| match c {
            Chunk::Xml(x) => Some(x),
            _ => None,
        })
    }
}

/// Parses the contiguous children of a container between `start` and `end`
/// (both relative to `chunk`), honoring the 4-byte inter-chunk alignment.
/// `abs` is the container's absolute offset.
pub(crate) fn parse_chunk_sequence(
    chunk: &[u8],
    abs: usize,
    start: usize,
    end: usize,
) -> Result<Vec<Chunk>, ChunkError> {
    let mut children = Vec::new();
    let mut pos = start;

    while pos < end {
        let (child, consumed) = Chunk::parse_next(&chunk[pos..end], abs + pos)?;
        children.push(child);
        pos += consumed;
        pos = (pos + 3) & !3;
    }

    Ok(children)
}

/// Frames a finished chunk body: metadata header followed by the body bytes.
/// `body` is everything after the 8-byte metadata and is expected to be
/// 4-byte aligned already.
pub(crate) fn emit_chunk(
    out: &mut Vec<u8>,
    kind: ChunkKind,
    header_size: u16,
    body: &[u8],
) -> Result<(), ChunkError> {
    out.write_u16::<LE>(kind.code())?;
    out.write_u16::<LE>(header_size)?;
    out.write_u32::<LE>((ChunkHeader::SIZE + body.len()) as u32)?;
    out.extend_from_slice(body);
    Ok(())
}

/// Zero-pads a scratch buffer to the next 4-byte boundary.
pub(crate) fn pad_to_4(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

pub(crate) fn read_u32s(count: usize, input: &mut &[u8]) -> ModalResult<Vec<u32>> {
    repeat(count, le_u32).parse_next(input)
}

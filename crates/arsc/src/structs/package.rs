//! Package chunks: one resource package with its type-string pool,
//! key-string pool, type specs and per-configuration type chunks.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::mem;

use byteorder::{LE, WriteBytesExt};
use winnow::binary::le_u32;
use winnow::prelude::*;
use winnow::token::take;

use crate::chunk::{Chunk, ChunkHeader, ChunkKind, SerializeFlags, emit_chunk, pad_to_4};
use crate::errors::ChunkError;
use crate::structs::{LibraryChunk, StringPoolChunk, TypeChunk, TypeSpecChunk, decode_fixed_utf16};

const CODE: u16 = 0x0200;

/// A package chunk (type code 0x0200). Children stay in their on-disk
/// order; the type-string and key-string pools are identified by matching
/// the header offsets against the position each child was parsed at, and
/// re-emission back-patches those offsets from where the pools actually
/// land.
#[derive(Clone, PartialEq)]
pub struct PackageChunk {
    header_size: u16,
    id: u32,
    raw_name: [u8; 256],
    last_public_type: u32,
    last_public_key: u32,
    type_id_offset: u32,
    children: Vec<Chunk>,
    type_pool: usize,
    key_pool: usize,
}

struct HeaderFields {
    id: u32,
    raw_name: [u8; 256],
    type_strings_offset: u32,
    last_public_type: u32,
    key_strings_offset: u32,
    last_public_key: u32,
}

impl PackageChunk {
    /// Header with the type-id offset word.
    const HEADER_FULL: u16 = 288;

    /// Older header form without the trailing type-id offset.
    const HEADER_LEGACY: u16 = 284;

    fn parse_header_fields(input: &mut &[u8]) -> ModalResult<HeaderFields> {
        (le_u32, take(256usize), le_u32, le_u32, le_u32, le_u32)
            .map(
                |(id, name, type_strings_offset, last_public_type, key_strings_offset, last_public_key): (
                    u32,
                    &[u8],
                    u32,
                    u32,
                    u32,
                    u32,
                )| HeaderFields {
                    id,
                    raw_name: name.try_into().expect("expected 256 bytes for the package name"),
                    type_strings_offset,
                    last_public_type,
                    key_strings_offset,
                    last_public_key,
                },
            )
            .parse_next(input)
    }

    pub(crate) fn parse(
        header: ChunkHeader,
        chunk: &[u8],
        abs: usize,
    ) -> Result<PackageChunk, ChunkError> {
        if header.header_size != Self::HEADER_FULL && header.header_size != Self::HEADER_LEGACY {
            return Err(ChunkError::malformed(
                abs,
                CODE,
                format!("package header size {} is not 284 or 288", header.header_size),
            ));
        }

        let mut cur = &chunk[ChunkHeader::SIZE..];
        let fields = Self::parse_header_fields(&mut cur)
            .map_err(|_| ChunkError::truncated(abs, "package header"))?;

        let type_id_offset = if header.header_size == Self::HEADER_FULL {
            le_u32::<_, winnow::error::ContextError>
                .parse_next(&mut cur)
                .map_err(|_| ChunkError::truncated(abs, "package type-id offset"))?
        } else {
            0
        };

        let mut children = Vec::new();
        let mut child_offsets = Vec::new();
        let mut pos = header.header_size as usize;
        while pos < chunk.len() {
            let (child, consumed) = Chunk::parse_next(&chunk[pos..], abs + pos)?;
            child_offsets.push(pos);
            children.push(child);
            pos += consumed;
            pos = (pos + 3) & !3;
        }

        let mut type_pool = None;
        let mut key_pool = None;
        let mut library_seen = false;
        for (i, (child, &off)) in children.iter().zip(&child_offsets).enumerate() {
            match child {
                Chunk::StringPool(_) => {
                    if off as u32 == fields.type_strings_offset {
                        type_pool = Some(i);
                    } else if off as u32 == fields.key_strings_offset {
                        key_pool = Some(i);
                    }
                }
                Chunk::Type(_) | Chunk::TypeSpec(_) | Chunk::Raw(_) => {}
                Chunk::Library(_) => {
                    if library_seen {
                        return Err(ChunkError::malformed(
                            abs,
                            CODE,
                            "package holds more than one library chunk",
                        ));
                    }
                    library_seen = true;
                }
                other => {
                    return Err(ChunkError::UnexpectedChild {
                        offset: abs + off,
                        type_code: other.kind().code(),
                        container: "package chunk",
                    });
                }
            }
        }

        let type_pool = type_pool.ok_or_else(|| {
            ChunkError::malformed(abs, CODE, "no string pool at the type-strings offset")
        })?;
        let key_pool = key_pool.ok_or_else(|| {
            ChunkError::malformed(abs, CODE, "no string pool at the key-strings offset")
        })?;

        let package = PackageChunk {
            header_size: header.header_size,
            id: fields.id,
            raw_name: fields.raw_name,
            last_public_type: fields.last_public_type,
            last_public_key: fields.last_public_key,
            type_id_offset,
            children,
            type_pool,
            key_pool,
        };
        package.check_pool_references(abs)?;
        Ok(package)
    }

    fn check_pool_references(&self, abs: usize) -> Result<(), ChunkError> {
        let type_count = self.type_string_pool().string_count() as u32;
        let key_count = self.key_string_pool().string_count() as u32;

        for t in self.type_chunks() {
            if t.id() as u32 > type_count {
                return Err(ChunkError::malformed(
                    abs,
                    CODE,
                    format!(
                        "type chunk id {} exceeds the {} type strings",
                        t.id(),
                        type_count
                    ),
                ));
            }
            for entry in t.entries().values() {
                if entry.key_index >= key_count {
                    return Err(ChunkError::malformed(
                        abs,
                        CODE,
                        format!(
                            "entry key index {} exceeds the {} key strings",
                            entry.key_index, key_count
                        ),
                    ));
                }
            }
        }
        for spec in self.type_specs() {
            if spec.id() as u32 > type_count {
                return Err(ChunkError::malformed(
                    abs,
                    CODE,
                    format!(
                        "type spec id {} exceeds the {} type strings",
                        spec.id(),
                        type_count
                    ),
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn write_to(
        &self,
        out: &mut Vec<u8>,
        flags: SerializeFlags,
    ) -> Result<(), ChunkError> {
        let mut body = Vec::new();
        body.write_u32::<LE>(self.id)?;
        body.extend_from_slice(&self.raw_name);
        body.write_u32::<LE>(0)?; // type strings, patched below
        body.write_u32::<LE>(self.last_public_type)?;
        body.write_u32::<LE>(0)?; // key strings, patched below
        body.write_u32::<LE>(self.last_public_key)?;
        if self.header_size == Self::HEADER_FULL {
            body.write_u32::<LE>(self.type_id_offset)?;
        }

        let mut type_strings_at = 0u32;
        let mut key_strings_at = 0u32;
        for (i, child) in self.children.iter().enumerate() {
            let off = (body.len() + ChunkHeader::SIZE) as u32;
            if i == self.type_pool {
                type_strings_at = off;
            }
            if i == self.key_pool {
                key_strings_at = off;
            }
            child.write_to(&mut body, flags)?;
            pad_to_4(&mut body);
        }

        body[260..264].copy_from_slice(&type_strings_at.to_le_bytes());
        body[268..272].copy_from_slice(&key_strings_at.to_le_bytes());

        emit_chunk(out, ChunkKind::TablePackage, self.header_size, &body)
    }

    /// The 1-based package id, the high byte of every resource id the
    /// package defines.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The package name, decoded up to the first NUL.
    pub fn name(&self) -> String {
        decode_fixed_utf16(&self.raw_name)
    }

    pub fn type_string_pool(&self) -> &StringPoolChunk {
        match &self.children[self.type_pool] {
            Chunk::StringPool(pool) => pool,
            _ => unreachable!("type pool index always points at a string pool"),
        }
    }

    pub fn key_string_pool(&self) -> &StringPoolChunk {
        match &self.children[self.key_pool] {
            Chunk::StringPool(pool) => pool,
            _ => unreachable!("key pool index always points at a string pool"),
        }
    }

    pub fn children(&self) -> &[Chunk] {
        &self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut [Chunk] {
        &mut self.children
    }

    /// All type chunks in on-disk order; the first chunk of each id keeps
    /// its leading position, which downstream tools rely on.
    pub fn type_chunks(&self) -> impl Iterator<Item = &TypeChunk> {
        self.children.iter().filter_map(|c| match c {
            Chunk::Type(t) => Some(t),
            _ => None,
        })
    }

    pub fn type_chunks_with_id(&self, id: u8) -> impl Iterator<Item = &TypeChunk> {
        self.type_chunks().filter(move |t| t.id() == id)
    }

    /// Type chunks whose 1-based id resolves to `name` in the type-string
    /// pool.
    pub fn type_chunks_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a TypeChunk> {
        self.type_chunks()
            .filter(move |t| self.type_name(t.id()).is_some_and(|n| n == name))
    }

    pub fn type_specs(&self) -> impl Iterator<Item = &TypeSpecChunk> {
        self.children.iter().filter_map(|c| match c {
            Chunk::TypeSpec(s) => Some(s),
            _ => None,
        })
    }

    pub fn type_spec_with_id(&self, id: u8) -> Option<&TypeSpecChunk> {
        self.type_specs().find(|s| s.id() == id)
    }

    pub fn library(&self) -> Option<&LibraryChunk> {
        self.children.iter().find_map(|c| match c {
            Chunk::Library(l) => Some(l),
            _ => None,
        })
    }

    /// Resolves a 1-based type id against the type-string pool.
    pub fn type_name(&self, id: u8) -> Option<&str> {
        if id == 0 {
            return None;
        }
        self.type_string_pool().string(id as u32 - 1)
    }

    /// Deletes a set of key-string indices. Every entry's key index is
    /// rewritten through the pool's remap; entries whose key was deleted
    /// are dropped. A type chunk emptied by this is removed from the
    /// package, and its type spec goes with it when no other chunk shares
    /// the id. Returns the remap.
    pub fn delete_key_strings(
        &mut self,
        indices: &BTreeSet<u32>,
    ) -> Result<Vec<Option<u32>>, ChunkError> {
        let key_pool = self.key_pool;
        let remap = match &mut self.children[key_pool] {
            Chunk::StringPool(pool) => pool.delete(indices)?,
            _ => {
                return Err(ChunkError::invariant(
                    "key pool index does not point at a string pool",
                ));
            }
        };

        let mut emptied_ids: HashSet<u8> = HashSet::new();
        let mut remove = vec![false; self.children.len()];

        for (i, child) in self.children.iter_mut().enumerate() {
            let Chunk::Type(t) = child else { continue };
            let id = t.id();
            let entries = t.entries_mut();
            let old = mem::take(entries);
            let mut dropped = false;
            for (index, mut entry) in old {
                match remap.get(entry.key_index as usize).and_then(|r| *r) {
                    Some(new_key) => {
                        entry.key_index = new_key;
                        entries.insert(index, entry);
                    }
                    None => dropped = true,
                }
            }
            if dropped && entries.is_empty() {
                emptied_ids.insert(id);
                remove[i] = true;
            }
        }

        let surviving_ids: HashSet<u8> = self
            .children
            .iter()
            .enumerate()
            .filter(|(i, _)| !remove[*i])
            .filter_map(|(_, c)| match c {
                Chunk::Type(t) => Some(t.id()),
                _ => None,
            })
            .collect();

        for (i, child) in self.children.iter().enumerate() {
            if let Chunk::TypeSpec(spec) = child
                && emptied_ids.contains(&spec.id())
                && !surviving_ids.contains(&spec.id())
            {
                remove[i] = true;
            }
        }

        let old_children = mem::take(&mut self.children);
        for (i, child) in old_children.into_iter().enumerate() {
            if remove[i] {
                continue;
            }
            if i == self.type_pool {
                self.type_pool = self.children.len();
            }
            if i == self.key_pool {
                self.key_pool = self.children.len();
            }
            self.children.push(child);
        }

        Ok(remap)
    }

    #[cfg(test)]
    pub(crate) fn build(id: u32, name: &str, children: Vec<Chunk>) -> PackageChunk {
        let mut raw_name = [0u8; 256];
        for (i, unit) in name.encode_utf16().take(127).enumerate() {
            raw_name[i * 2] = unit as u8;
            raw_name[i * 2 + 1] = (unit >> 8) as u8;
        }
        let type_pool = children
            .iter()
            .position(|c| matches!(c, Chunk::StringPool(_)))
            .expect("a package needs a type string pool");
        let key_pool = children
            .iter()
            .skip(type_pool + 1)
            .position(|c| matches!(c, Chunk::StringPool(_)))
            .map(|p| p + type_pool + 1)
            .expect("a package needs a key string pool");
        PackageChunk {
            header_size: Self::HEADER_FULL,
            id,
            raw_name,
            last_public_type: 0,
            last_public_key: 0,
            type_id_offset: 0,
            children,
            type_pool,
            key_pool,
        }
    }
}

impl fmt::Debug for PackageChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageChunk")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("last_public_type", &self.last_public_type)
            .field("last_public_key", &self.last_public_key)
            .field("type_id_offset", &self.type_id_offset)
            .field("children", &self.children.len())
            .finish()
    }
}

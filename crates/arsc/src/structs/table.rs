//! The resource table chunk: the root of a `resources.arsc` stream.

use std::collections::BTreeSet;

use byteorder::{LE, WriteBytesExt};
use log::warn;
use winnow::binary::le_u32;
use winnow::prelude::*;

use crate::chunk::{
    Chunk, ChunkHeader, ChunkKind, SerializeFlags, emit_chunk, pad_to_4, parse_chunk_sequence,
};
use crate::errors::ChunkError;
use crate::structs::{Entry, EntryKind, PackageChunk, ResConfig, ResValue, ResourceId, StringPoolChunk, ValueType};

const CODE: u16 = 0x0002;

/// A resource table chunk (type code 0x0002): the global value string pool
/// followed by one or more packages.
#[derive(Debug, Clone, PartialEq)]
pub struct TableChunk {
    package_count: u32,
    children: Vec<Chunk>,
    value_pool: usize,
}

impl TableChunk {
    const HEADER_SIZE: u16 = 12;

    pub(crate) fn parse(
        header: ChunkHeader,
        chunk: &[u8],
        abs: usize,
    ) -> Result<TableChunk, ChunkError> {
        if header.header_size != Self::HEADER_SIZE {
            return Err(ChunkError::malformed(
                abs,
                CODE,
                format!("resource table header size {} != 12", header.header_size),
            ));
        }

        let mut cur = &chunk[ChunkHeader::SIZE..];
        let package_count = le_u32::<_, winnow::error::ContextError>
            .parse_next(&mut cur)
            .map_err(|_| ChunkError::truncated(abs, "package count"))?;

        let children =
            parse_chunk_sequence(chunk, abs, Self::HEADER_SIZE as usize, chunk.len())?;

        let mut value_pool = None;
        let mut packages = 0u32;
        for (i, child) in children.iter().enumerate() {
            match child {
                Chunk::StringPool(_) => {
                    if value_pool.is_some() {
                        return Err(ChunkError::malformed(
                            abs,
                            CODE,
                            "resource table holds more than one global string pool",
                        ));
                    }
                    value_pool = Some(i);
                }
                Chunk::Package(_) => packages += 1,
                Chunk::Raw(_) => {}
                other => {
                    return Err(ChunkError::UnexpectedChild {
                        offset: abs,
                        type_code: other.kind().code(),
                        container: "resource table",
                    });
                }
            }
        }

        let value_pool = value_pool.ok_or_else(|| {
            ChunkError::malformed(abs, CODE, "resource table has no global string pool")
        })?;

        if packages == 0 {
            warn!("expected at least one resource package at offset {abs:#x}");
        }
        if packages != package_count {
            // the declared count is informational, the children are
            // authoritative
            warn!("resource table declares {package_count} packages but holds {packages}");
        }

        Ok(TableChunk {
            package_count,
            children,
            value_pool,
        })
    }

    pub(crate) fn write_to(
        &self,
        out: &mut Vec<u8>,
        flags: SerializeFlags,
    ) -> Result<(), ChunkError> {
        let mut body = Vec::new();
        body.write_u32::<LE>(self.package_count)?;
        for child in &self.children {
            child.write_to(&mut body, flags)?;
            pad_to_4(&mut body);
        }
        emit_chunk(out, ChunkKind::Table, Self::HEADER_SIZE, &body)
    }

    /// The global value string pool: string-typed resource values index
    /// into it.
    pub fn string_pool(&self) -> &StringPoolChunk {
        match &self.children[self.value_pool] {
            Chunk::StringPool(pool) => pool,
            _ => unreachable!("value pool index always points at a string pool"),
        }
    }

    pub fn packages(&self) -> impl Iterator<Item = &PackageChunk> {
        self.children.iter().filter_map(|c| match c {
            Chunk::Package(p) => Some(p),
            _ => None,
        })
    }

    pub fn package(&self, name: &str) -> Option<&PackageChunk> {
        self.packages().find(|p| p.name() == name)
    }

    pub fn packages_mut(&mut self) -> impl Iterator<Item = &mut PackageChunk> {
        self.children.iter_mut().filter_map(|c| match c {
            Chunk::Package(p) => Some(p),
            _ => None,
        })
    }

    /// Looks a packed identifier up across every configuration, returning
    /// (configuration, entry) pairs in on-disk order.
    pub fn resolve(&self, id: ResourceId) -> Vec<(&ResConfig, &Entry)> {
        let mut results = Vec::new();
        for package in self.packages() {
            if package.id() != id.package_id() as u32 {
                continue;
            }
            for t in package.type_chunks_with_id(id.type_id()) {
                if let Some(entry) = t.entry(id.entry_index() as u32) {
                    results.push((t.config(), entry));
                }
            }
        }
        results
    }

    /// Deletes a set of indices from the global string pool and rewrites
    /// every string-typed value in every package through the returned
    /// remap. A simple entry whose string was deleted becomes the null
    /// entry; the slot itself survives, since sibling configurations may
    /// rely on it. Complex sub-values are rewritten independently.
    pub fn delete_strings(
        &mut self,
        indices: &BTreeSet<u32>,
    ) -> Result<Vec<Option<u32>>, ChunkError> {
        let value_pool = self.value_pool;
        let remap = match &mut self.children[value_pool] {
            Chunk::StringPool(pool) => pool.delete(indices)?,
            _ => {
                return Err(ChunkError::invariant(
                    "value pool index does not point at a string pool",
                ));
            }
        };

        for child in &mut self.children {
            let Chunk::Package(package) = child else {
                continue;
            };
            for pchild in package.children_mut() {
                let Chunk::Type(t) = pchild else { continue };
                for entry in t.entries_mut().values_mut() {
                    match &mut entry.kind {
                        EntryKind::Simple(value) => apply_remap(value, &remap),
                        EntryKind::Complex { values, .. } => {
                            for (_, value) in values {
                                apply_remap(value, &remap);
                            }
                        }
                    }
                }
            }
        }

        Ok(remap)
    }

    #[cfg(test)]
    pub(crate) fn build(pool: StringPoolChunk, packages: Vec<PackageChunk>) -> TableChunk {
        let mut children = vec![Chunk::StringPool(pool)];
        let package_count = packages.len() as u32;
        children.extend(packages.into_iter().map(Chunk::Package));
        TableChunk {
            package_count,
            children,
            value_pool: 0,
        }
    }
}

fn apply_remap(value: &mut ResValue, remap: &[Option<u32>]) {
    if value.value_type != ValueType::String {
        return;
    }
    match remap.get(value.data as usize) {
        Some(Some(new_index)) => value.data = *new_index,
        Some(None) => *value = ResValue::null(),
        None => warn!(
            "string value index {} lies outside the remapped pool",
            value.data
        ),
    }
}

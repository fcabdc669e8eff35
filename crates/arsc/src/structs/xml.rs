//! Compiled XML: the document chunk and its namespace, element, cdata and
//! resource-map children.
//!
//! Every node carries a source line number and an optional comment index;
//! both, like every other string index in the stream, resolve against the
//! string pool embedded in the enclosing document chunk.

use std::collections::HashMap;

use byteorder::{LE, WriteBytesExt};
use winnow::binary::{le_u16, le_u32};
use winnow::prelude::*;

use crate::chunk::{
    Chunk, ChunkHeader, ChunkKind, NO_ENTRY, SerializeFlags, emit_chunk, pad_to_4,
    parse_chunk_sequence, read_u32s,
};
use crate::errors::ChunkError;
use crate::structs::{ResValue, StringPoolChunk, ValueType};

/// Size of every XML node header: chunk metadata plus line and comment.
const NODE_HEADER_SIZE: u16 = 16;

/// On-disk size of one element attribute record.
const ATTRIBUTE_SIZE: u16 = 20;

/// A compiled XML document (type code 0x0003): a string pool, an optional
/// resource map and a stream of node chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlChunk {
    children: Vec<Chunk>,
}

impl XmlChunk {
    const HEADER_SIZE: u16 = 8;
    const CODE: u16 = 0x0003;

    pub(crate) fn parse(
        header: ChunkHeader,
        chunk: &[u8],
        abs: usize,
    ) -> Result<XmlChunk, ChunkError> {
        if header.header_size != Self::HEADER_SIZE {
            return Err(ChunkError::malformed(
                abs,
                Self::CODE,
                format!("xml chunk header size {} != 8", header.header_size),
            ));
        }

        let children = parse_chunk_sequence(chunk, abs, Self::HEADER_SIZE as usize, chunk.len())?;
        for child in &children {
            match child {
                Chunk::StringPool(_)
                | Chunk::XmlResourceMap(_)
                | Chunk::XmlStartNamespace(_)
                | Chunk::XmlEndNamespace(_)
                | Chunk::XmlStartElement(_)
                | Chunk::XmlEndElement(_)
                | Chunk::XmlCdata(_)
                | Chunk::Raw(_) => {}
                other => {
                    return Err(ChunkError::UnexpectedChild {
                        offset: abs,
                        type_code: other.kind().code(),
                        container: "xml chunk",
                    });
                }
            }
        }

        Ok(XmlChunk { children })
    }

    pub(crate) fn write_to(
        &self,
        out: &mut Vec<u8>,
        flags: SerializeFlags,
    ) -> Result<(), ChunkError> {
        let mut body = Vec::new();
        for child in &self.children {
            child.write_to(&mut body, flags)?;
            pad_to_4(&mut body);
        }
        emit_chunk(out, ChunkKind::Xml, Self::HEADER_SIZE, &body)
    }

    /// The document's embedded string pool.
    pub fn string_pool(&self) -> Option<&StringPoolChunk> {
        self.children.iter().find_map(|c| match c {
            Chunk::StringPool(pool) => Some(pool),
            _ => None,
        })
    }

    pub fn resource_map(&self) -> Option<&XmlResourceMapChunk> {
        self.children.iter().find_map(|c| match c {
            Chunk::XmlResourceMap(map) => Some(map),
            _ => None,
        })
    }

    /// The node stream, in document order.
    pub fn nodes(&self) -> impl Iterator<Item = &Chunk> {
        self.children.iter().filter(|c| {
            matches!(
                c,
                Chunk::XmlStartNamespace(_)
                    | Chunk::XmlEndNamespace(_)
                    | Chunk::XmlStartElement(_)
                    | Chunk::XmlEndElement(_)
                    | Chunk::XmlCdata(_)
            )
        })
    }

    /// Resolves a string index from any node in this document. The
    /// `0xFFFFFFFF` sentinel resolves to `None`.
    pub fn string(&self, index: u32) -> Option<&str> {
        if index == NO_ENTRY {
            return None;
        }
        self.string_pool().and_then(|pool| pool.string(index))
    }

    /// Rewrites every element attribute whose typed value is a reference
    /// found in `map`. Attributes are structurally immutable: each match is
    /// replaced by a fresh record at the same index.
    pub fn remap_references(&mut self, map: &HashMap<u32, u32>) {
        for child in &mut self.children {
            if let Chunk::XmlStartElement(element) = child {
                element.remap_references(map);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn build(children: Vec<Chunk>) -> XmlChunk {
        XmlChunk { children }
    }
}

/// A namespace start or end node; the two share one layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XmlNamespaceChunk {
    pub line: u32,
    pub comment: u32,
    pub prefix_index: u32,
    pub uri_index: u32,
}

impl XmlNamespaceChunk {
    fn parse_fields(input: &mut &[u8]) -> ModalResult<XmlNamespaceChunk> {
        (le_u32, le_u32, le_u32, le_u32)
            .map(|(line, comment, prefix_index, uri_index)| XmlNamespaceChunk {
                line,
                comment,
                prefix_index,
                uri_index,
            })
            .parse_next(input)
    }

    pub(crate) fn parse(
        header: ChunkHeader,
        chunk: &[u8],
        abs: usize,
    ) -> Result<XmlNamespaceChunk, ChunkError> {
        check_node_header(&header, abs)?;
        let mut cur = &chunk[ChunkHeader::SIZE..];
        Self::parse_fields(&mut cur).map_err(|_| ChunkError::truncated(abs, "namespace node"))
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>, kind: ChunkKind) -> Result<(), ChunkError> {
        let mut body = Vec::with_capacity(16);
        body.write_u32::<LE>(self.line)?;
        body.write_u32::<LE>(self.comment)?;
        body.write_u32::<LE>(self.prefix_index)?;
        body.write_u32::<LE>(self.uri_index)?;
        emit_chunk(out, kind, NODE_HEADER_SIZE, &body)
    }
}

/// One 20-byte element attribute: namespace, name, raw string value and the
/// embedded typed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XmlAttribute {
    pub namespace_index: u32,
    pub name_index: u32,
    pub raw_value_index: u32,
    pub value: ResValue,
}

/// An element-start node with its attribute table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElementChunk {
    pub line: u32,
    pub comment: u32,
    pub namespace_index: u32,
    pub name_index: u32,
    id_index: u16,
    class_index: u16,
    style_index: u16,
    attributes: Vec<XmlAttribute>,
}

impl XmlElementChunk {
    const CODE: u16 = 0x0102;

    fn parse_fields(input: &mut &[u8]) -> ModalResult<(u32, u32, u32, u32, u16, u16, u16, u16, u16, u16)> {
        (
            le_u32, // line
            le_u32, // comment
            le_u32, // namespace
            le_u32, // name
            le_u16, // attribute start
            le_u16, // attribute size
            le_u16, // attribute count
            le_u16, // id index
            le_u16, // class index
            le_u16, // style index
        )
            .parse_next(input)
    }

    pub(crate) fn parse(
        header: ChunkHeader,
        chunk: &[u8],
        abs: usize,
    ) -> Result<XmlElementChunk, ChunkError> {
        check_node_header(&header, abs)?;

        let mut cur = &chunk[ChunkHeader::SIZE..];
        let (
            line,
            comment,
            namespace_index,
            name_index,
            attribute_start,
            attribute_size,
            attribute_count,
            id_index,
            class_index,
            style_index,
        ) = Self::parse_fields(&mut cur)
            .map_err(|_| ChunkError::truncated(abs, "element node"))?;

        if attribute_start != ATTRIBUTE_SIZE {
            return Err(ChunkError::malformed(
                abs,
                Self::CODE,
                format!("attribute table starts at {attribute_start}, expected 20"),
            ));
        }
        if attribute_size != ATTRIBUTE_SIZE {
            return Err(ChunkError::malformed(
                abs,
                Self::CODE,
                format!("attribute size {attribute_size}, expected 20"),
            ));
        }

        let mut attributes = Vec::with_capacity(attribute_count as usize);
        for _ in 0..attribute_count {
            let (ns, name, raw) = Self::parse_attribute_indices(&mut cur)
                .map_err(|_| ChunkError::truncated(abs, "element attribute"))?;
            let value = ResValue::parse(&mut cur, abs)?;
            attributes.push(XmlAttribute {
                namespace_index: ns,
                name_index: name,
                raw_value_index: raw,
                value,
            });
        }

        Ok(XmlElementChunk {
            line,
            comment,
            namespace_index,
            name_index,
            id_index,
            class_index,
            style_index,
            attributes,
        })
    }

    fn parse_attribute_indices(input: &mut &[u8]) -> ModalResult<(u32, u32, u32)> {
        (le_u32, le_u32, le_u32).parse_next(input)
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) -> Result<(), ChunkError> {
        let mut body = Vec::with_capacity(28 + self.attributes.len() * ATTRIBUTE_SIZE as usize);
        body.write_u32::<LE>(self.line)?;
        body.write_u32::<LE>(self.comment)?;
        body.write_u32::<LE>(self.namespace_index)?;
        body.write_u32::<LE>(self.name_index)?;
        body.write_u16::<LE>(ATTRIBUTE_SIZE)?;
        body.write_u16::<LE>(ATTRIBUTE_SIZE)?;
        body.write_u16::<LE>(self.attributes.len() as u16)?;
        body.write_u16::<LE>(self.id_index)?;
        body.write_u16::<LE>(self.class_index)?;
        body.write_u16::<LE>(self.style_index)?;
        for attribute in &self.attributes {
            body.write_u32::<LE>(attribute.namespace_index)?;
            body.write_u32::<LE>(attribute.name_index)?;
            body.write_u32::<LE>(attribute.raw_value_index)?;
            attribute.value.write_to(&mut body)?;
        }
        emit_chunk(out, ChunkKind::XmlStartElement, NODE_HEADER_SIZE, &body)
    }

    pub fn attributes(&self) -> &[XmlAttribute] {
        &self.attributes
    }

    /// 0-based index of the "id" attribute, stored on disk as value + 1.
    pub fn id_attribute_index(&self) -> Option<u16> {
        self.id_index.checked_sub(1)
    }

    pub fn class_attribute_index(&self) -> Option<u16> {
        self.class_index.checked_sub(1)
    }

    pub fn style_attribute_index(&self) -> Option<u16> {
        self.style_index.checked_sub(1)
    }

    pub(crate) fn remap_references(&mut self, map: &HashMap<u32, u32>) {
        for slot in &mut self.attributes {
            if slot.value.value_type == ValueType::Reference
                && let Some(&new_target) = map.get(&slot.value.data)
            {
                *slot = XmlAttribute {
                    value: ResValue {
                        data: new_target,
                        ..slot.value
                    },
                    ..*slot
                };
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn build(
        line: u32,
        namespace_index: u32,
        name_index: u32,
        attributes: Vec<XmlAttribute>,
    ) -> XmlElementChunk {
        XmlElementChunk {
            line,
            comment: NO_ENTRY,
            namespace_index,
            name_index,
            id_index: 0,
            class_index: 0,
            style_index: 0,
            attributes,
        }
    }
}

/// An element-end node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XmlElementEndChunk {
    pub line: u32,
    pub comment: u32,
    pub namespace_index: u32,
    pub name_index: u32,
}

impl XmlElementEndChunk {
    fn parse_fields(input: &mut &[u8]) -> ModalResult<XmlElementEndChunk> {
        (le_u32, le_u32, le_u32, le_u32)
            .map(|(line, comment, namespace_index, name_index)| XmlElementEndChunk {
                line,
                comment,
                namespace_index,
                name_index,
            })
            .parse_next(input)
    }

    pub(crate) fn parse(
        header: ChunkHeader,
        chunk: &[u8],
        abs: usize,
    ) -> Result<XmlElementEndChunk, ChunkError> {
        check_node_header(&header, abs)?;
        let mut cur = &chunk[ChunkHeader::SIZE..];
        Self::parse_fields(&mut cur).map_err(|_| ChunkError::truncated(abs, "element end node"))
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) -> Result<(), ChunkError> {
        let mut body = Vec::with_capacity(16);
        body.write_u32::<LE>(self.line)?;
        body.write_u32::<LE>(self.comment)?;
        body.write_u32::<LE>(self.namespace_index)?;
        body.write_u32::<LE>(self.name_index)?;
        emit_chunk(out, ChunkKind::XmlEndElement, NODE_HEADER_SIZE, &body)
    }
}

/// A cdata node: the raw character data and its typed form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XmlCdataChunk {
    pub line: u32,
    pub comment: u32,
    pub data_index: u32,
    pub value: ResValue,
}

impl XmlCdataChunk {
    fn parse_fields(input: &mut &[u8]) -> ModalResult<(u32, u32, u32)> {
        (le_u32, le_u32, le_u32).parse_next(input)
    }

    pub(crate) fn parse(
        header: ChunkHeader,
        chunk: &[u8],
        abs: usize,
    ) -> Result<XmlCdataChunk, ChunkError> {
        check_node_header(&header, abs)?;
        let mut cur = &chunk[ChunkHeader::SIZE..];
        let (line, comment, data_index) = Self::parse_fields(&mut cur)
            .map_err(|_| ChunkError::truncated(abs, "cdata node"))?;
        let value = ResValue::parse(&mut cur, abs)?;
        Ok(XmlCdataChunk {
            line,
            comment,
            data_index,
            value,
        })
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) -> Result<(), ChunkError> {
        let mut body = Vec::with_capacity(20);
        body.write_u32::<LE>(self.line)?;
        body.write_u32::<LE>(self.comment)?;
        body.write_u32::<LE>(self.data_index)?;
        self.value.write_to(&mut body)?;
        emit_chunk(out, ChunkKind::XmlCdata, NODE_HEADER_SIZE, &body)
    }
}

/// The resource map: maps the first string-pool indices to attribute
/// resource ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlResourceMapChunk {
    ids: Vec<u32>,
}

impl XmlResourceMapChunk {
    const HEADER_SIZE: u16 = 8;
    const CODE: u16 = 0x0180;

    pub(crate) fn parse(
        header: ChunkHeader,
        chunk: &[u8],
        abs: usize,
    ) -> Result<XmlResourceMapChunk, ChunkError> {
        if header.header_size != Self::HEADER_SIZE {
            return Err(ChunkError::malformed(
                abs,
                Self::CODE,
                format!("resource map header size {} != 8", header.header_size),
            ));
        }

        let mut cur = &chunk[Self::HEADER_SIZE as usize..];
        let count = (chunk.len() - Self::HEADER_SIZE as usize) / 4;
        let ids = read_u32s(count, &mut cur)
            .map_err(|_| ChunkError::truncated(abs, "resource map"))?;
        Ok(XmlResourceMapChunk { ids })
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) -> Result<(), ChunkError> {
        let mut body = Vec::with_capacity(self.ids.len() * 4);
        for id in &self.ids {
            body.write_u32::<LE>(*id)?;
        }
        emit_chunk(out, ChunkKind::XmlResourceMap, Self::HEADER_SIZE, &body)
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    /// The attribute resource id mapped to a string-pool index, if any.
    pub fn resource_id(&self, string_index: u32) -> Option<u32> {
        self.ids.get(string_index as usize).copied()
    }

    #[cfg(test)]
    pub(crate) fn build(ids: Vec<u32>) -> XmlResourceMapChunk {
        XmlResourceMapChunk { ids }
    }
}

fn check_node_header(header: &ChunkHeader, abs: usize) -> Result<(), ChunkError> {
    if header.header_size != NODE_HEADER_SIZE {
        return Err(ChunkError::malformed(
            abs,
            header.kind.code(),
            format!("xml node header size {} != 16", header.header_size),
        ));
    }
    Ok(())
}

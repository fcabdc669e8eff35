//! The deduplicated, optionally styled string pool chunk.

use std::collections::{BTreeSet, HashMap};
use std::mem;

use bitflags::bitflags;
use byteorder::{LE, WriteBytesExt};
use winnow::binary::le_u32;
use winnow::prelude::*;

use crate::chunk::{
    ChunkHeader, ChunkKind, NO_ENTRY, SerializeFlags, emit_chunk, pad_to_4, read_u32s,
};
use crate::errors::ChunkError;
use crate::strings;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PoolFlags: u32 {
        /// Strings are sorted by their UTF-16 values
        const SORTED = 1 << 0;

        /// Strings are stored in the UTF-8 encoding
        const UTF8 = 1 << 8;
    }
}

/// A typed range within a string: the index of the string naming the span
/// tag, and the inclusive first and last code units it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StyleSpan {
    pub name_index: u32,
    pub start: u32,
    pub stop: u32,
}

/// The spans attached to one pool string. Styles sit in a vector parallel
/// to the strings; style `i` decorates string `i`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Style {
    pub spans: Vec<StyleSpan>,
}

impl Style {
    fn to_bytes(&self) -> Result<Vec<u8>, ChunkError> {
        let mut out = Vec::with_capacity(self.spans.len() * 12 + 4);
        for span in &self.spans {
            out.write_u32::<LE>(span.name_index)?;
            out.write_u32::<LE>(span.start)?;
            out.write_u32::<LE>(span.stop)?;
        }
        out.write_u32::<LE>(NO_ENTRY)?;
        Ok(out)
    }
}

/// A string pool chunk (type code 0x0001).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringPoolChunk {
    flags: PoolFlags,
    strings: Vec<String>,
    styles: Vec<Style>,
    originally_deduped: bool,
}

impl StringPoolChunk {
    const HEADER_SIZE: u16 = 28;
    const CODE: u16 = 0x0001;

    pub fn new(utf8: bool) -> StringPoolChunk {
        StringPoolChunk {
            flags: if utf8 { PoolFlags::UTF8 } else { PoolFlags::empty() },
            strings: Vec::new(),
            styles: Vec::new(),
            originally_deduped: false,
        }
    }

    pub(crate) fn parse(
        header: ChunkHeader,
        chunk: &[u8],
        abs: usize,
    ) -> Result<StringPoolChunk, ChunkError> {
        if header.header_size != Self::HEADER_SIZE {
            return Err(ChunkError::malformed(
                abs,
                Self::CODE,
                format!("string pool header size {} != 28", header.header_size),
            ));
        }

        let mut cur = &chunk[ChunkHeader::SIZE..Self::HEADER_SIZE as usize];
        let (string_count, style_count, raw_flags, strings_start, styles_start) =
            Self::parse_header_fields(&mut cur)
                .map_err(|_| ChunkError::truncated(abs, "string pool header"))?;

        if style_count > string_count {
            return Err(ChunkError::malformed(
                abs,
                Self::CODE,
                format!("style count {style_count} exceeds string count {string_count}"),
            ));
        }

        let tables_len = (string_count as usize)
            .checked_add(style_count as usize)
            .and_then(|n| n.checked_mul(4))
            .filter(|n| Self::HEADER_SIZE as usize + n <= chunk.len())
            .ok_or_else(|| {
                ChunkError::malformed(abs, Self::CODE, "offset tables exceed chunk size")
            })?;

        let mut cur = &chunk[Self::HEADER_SIZE as usize..Self::HEADER_SIZE as usize + tables_len];
        let string_offsets = read_u32s(string_count as usize, &mut cur)
            .map_err(|_| ChunkError::truncated(abs, "string offset table"))?;
        let style_offsets = read_u32s(style_count as usize, &mut cur)
            .map_err(|_| ChunkError::truncated(abs, "style offset table"))?;

        let strings_start = strings_start as usize;
        let strings_end = if style_count > 0 {
            styles_start as usize
        } else {
            chunk.len()
        };
        if strings_start > strings_end || strings_end > chunk.len() {
            return Err(ChunkError::malformed(
                abs,
                Self::CODE,
                format!("string data region {strings_start}..{strings_end} is out of bounds"),
            ));
        }
        let string_region = &chunk[strings_start..strings_end];

        let utf8 = PoolFlags::from_bits_retain(raw_flags).contains(PoolFlags::UTF8);
        let mut originally_deduped = false;
        let mut prev: Option<u32> = None;
        let mut parsed_strings = Vec::with_capacity(string_count as usize);

        for &off in &string_offsets {
            if let Some(p) = prev
                && off <= p
            {
                originally_deduped = true;
            }
            prev = Some(off);

            if off as usize >= string_region.len() {
                return Err(ChunkError::malformed(
                    abs,
                    Self::CODE,
                    format!("string offset {off} exceeds the pool data length"),
                ));
            }

            let mut scur = &string_region[off as usize..];
            let s = if utf8 {
                strings::decode_utf8(&mut scur)
            } else {
                strings::decode_utf16(&mut scur)
            }
            .map_err(|_| {
                ChunkError::malformed(abs, Self::CODE, format!("undecodable string at offset {off}"))
            })?;
            parsed_strings.push(s);
        }

        let mut parsed_styles = Vec::with_capacity(style_count as usize);
        if style_count > 0 {
            let styles_start = styles_start as usize;
            if styles_start > chunk.len() {
                return Err(ChunkError::malformed(
                    abs,
                    Self::CODE,
                    "style data region is out of bounds",
                ));
            }
            let style_region = &chunk[styles_start..];

            for &off in &style_offsets {
                if off as usize >= style_region.len() {
                    return Err(ChunkError::malformed(
                        abs,
                        Self::CODE,
                        format!("style offset {off} exceeds the pool data length"),
                    ));
                }
                let mut scur = &style_region[off as usize..];
                let style = Self::parse_style_fields(&mut scur)
                    .map_err(|_| ChunkError::truncated(abs, "style span list"))?;
                for span in &style.spans {
                    if span.name_index >= string_count {
                        return Err(ChunkError::malformed(
                            abs,
                            Self::CODE,
                            format!("style span names string {} of {string_count}", span.name_index),
                        ));
                    }
                }
                parsed_styles.push(style);
            }
        }

        Ok(StringPoolChunk {
            flags: PoolFlags::from_bits_retain(raw_flags),
            strings: parsed_strings,
            styles: parsed_styles,
            originally_deduped,
        })
    }

    fn parse_header_fields(input: &mut &[u8]) -> ModalResult<(u32, u32, u32, u32, u32)> {
        (le_u32, le_u32, le_u32, le_u32, le_u32).parse_next(input)
    }

    fn parse_style_fields(input: &mut &[u8]) -> ModalResult<Style> {
        let mut spans = Vec::new();
        loop {
            let name = le_u32(input)?;
            if name == NO_ENTRY {
                return Ok(Style { spans });
            }
            let (start, stop) = (le_u32, le_u32).parse_next(input)?;
            spans.push(StyleSpan {
                name_index: name,
                start,
                stop,
            });
        }
    }

    pub(crate) fn write_to(
        &self,
        out: &mut Vec<u8>,
        flags: SerializeFlags,
    ) -> Result<(), ChunkError> {
        let dedup = flags.contains(SerializeFlags::SHRINK) || self.originally_deduped;
        let utf8 = self.is_utf8();

        let mut string_data = Vec::new();
        let mut string_offsets: Vec<u32> = Vec::with_capacity(self.strings.len());
        let mut seen: HashMap<&str, u32> = HashMap::new();
        for s in &self.strings {
            if dedup && let Some(&off) = seen.get(s.as_str()) {
                string_offsets.push(off);
                continue;
            }
            let off = string_data.len() as u32;
            if utf8 {
                strings::encode_utf8(s, &mut string_data)?;
            } else {
                strings::encode_utf16(s, &mut string_data)?;
            }
            string_offsets.push(off);
            seen.insert(s.as_str(), off);
        }
        pad_to_4(&mut string_data);

        let mut style_data = Vec::new();
        let mut style_offsets: Vec<u32> = Vec::with_capacity(self.styles.len());
        let mut seen_styles: HashMap<Vec<u8>, u32> = HashMap::new();
        for style in &self.styles {
            let bytes = style.to_bytes()?;
            if dedup && let Some(&off) = seen_styles.get(&bytes) {
                style_offsets.push(off);
                continue;
            }
            let off = style_data.len() as u32;
            style_data.extend_from_slice(&bytes);
            style_offsets.push(off);
            seen_styles.insert(bytes, off);
        }
        if !self.styles.is_empty() {
            // region terminator; the second word matches the on-device
            // format and is preserved without interpretation
            style_data.write_u32::<LE>(NO_ENTRY)?;
            style_data.write_u32::<LE>(NO_ENTRY)?;
            pad_to_4(&mut style_data);
        }

        let strings_start =
            Self::HEADER_SIZE as u32 + 4 * (self.strings.len() + self.styles.len()) as u32;
        let styles_start = if self.styles.is_empty() {
            0
        } else {
            strings_start + string_data.len() as u32
        };

        let mut body = Vec::new();
        body.write_u32::<LE>(self.strings.len() as u32)?;
        body.write_u32::<LE>(self.styles.len() as u32)?;
        body.write_u32::<LE>(self.flags.bits())?;
        body.write_u32::<LE>(strings_start)?;
        body.write_u32::<LE>(styles_start)?;
        for off in &string_offsets {
            body.write_u32::<LE>(*off)?;
        }
        for off in &style_offsets {
            body.write_u32::<LE>(*off)?;
        }
        body.extend_from_slice(&string_data);
        body.extend_from_slice(&style_data);

        emit_chunk(out, ChunkKind::StringPool, Self::HEADER_SIZE, &body)
    }

    pub fn string(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(String::as_str)
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    pub fn style(&self, index: u32) -> Option<&Style> {
        self.styles.get(index as usize)
    }

    pub fn styles(&self) -> &[Style] {
        &self.styles
    }

    pub fn string_count(&self) -> usize {
        self.strings.len()
    }

    pub fn style_count(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn is_utf8(&self) -> bool {
        self.flags.contains(PoolFlags::UTF8)
    }

    pub fn is_sorted(&self) -> bool {
        self.flags.contains(PoolFlags::SORTED)
    }

    /// True when the original offsets showed a non-increasing step, meaning
    /// the pool was emitted deduplicated. Re-emission then dedups even
    /// under default options.
    pub fn is_originally_deduplicated(&self) -> bool {
        self.originally_deduped
    }

    /// Appends a string and returns its index.
    pub fn add(&mut self, s: impl Into<String>) -> u32 {
        self.strings.push(s.into());
        (self.strings.len() - 1) as u32
    }

    /// Replaces the string at `index` in place; indices stay stable.
    pub fn set(&mut self, index: u32, s: impl Into<String>) -> Result<(), ChunkError> {
        let slot = self.strings.get_mut(index as usize).ok_or_else(|| {
            ChunkError::invariant(format!("string index {index} is out of range"))
        })?;
        *slot = s.into();
        Ok(())
    }

    /// Deletes the given set of string indices and returns the old-to-new
    /// remap, `None` marking a deleted index. Indices that a surviving
    /// style's span names are protected and survive the deletion. The
    /// caller must apply the remap across every structure holding indices
    /// into this pool before reading it again.
    pub fn delete(&mut self, indices: &BTreeSet<u32>) -> Result<Vec<Option<u32>>, ChunkError> {
        let len = self.strings.len() as u32;
        if let Some(&max) = indices.iter().next_back()
            && max >= len
        {
            return Err(ChunkError::invariant(format!(
                "cannot delete string {max} from a pool of {len}"
            )));
        }

        // Protecting a string revives its style, whose own spans may name
        // further doomed strings, so the pass runs to a fixed point.
        let mut doomed = indices.clone();
        loop {
            let mut changed = false;
            for (j, style) in self.styles.iter().enumerate() {
                if doomed.contains(&(j as u32)) {
                    continue;
                }
                for span in &style.spans {
                    changed |= doomed.remove(&span.name_index);
                }
            }
            if !changed {
                break;
            }
        }

        let mut remap = Vec::with_capacity(len as usize);
        let mut next = 0u32;
        for i in 0..len {
            if doomed.contains(&i) {
                remap.push(None);
            } else {
                remap.push(Some(next));
                next += 1;
            }
        }

        self.strings = mem::take(&mut self.strings)
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !doomed.contains(&(*i as u32)))
            .map(|(_, s)| s)
            .collect();
        self.styles = mem::take(&mut self.styles)
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !doomed.contains(&(*i as u32)))
            .map(|(_, s)| s)
            .collect();

        for style in &mut self.styles {
            for span in &mut style.spans {
                span.name_index = remap[span.name_index as usize].ok_or_else(|| {
                    ChunkError::invariant("a surviving style span names a deleted string")
                })?;
            }
        }

        Ok(remap)
    }

    #[cfg(test)]
    pub(crate) fn push_style(&mut self, style: Style) {
        self.styles.push(style);
    }
}

//! String codec for the two pool encodings.
//!
//! UTF-16 strings carry one 16-bit length prefix in code units, with a
//! second word for lengths of 0x8000 units and above. UTF-8 strings carry
//! two prefixes, the UTF-16 code-unit count followed by the encoded byte
//! count, each one byte below 0x80 and two bytes up to 0x7FFF. The UTF-8
//! decoder additionally accepts Android's modified UTF-8: a NUL encoded as
//! `C0 80` and non-BMP code points carried as two surrogate halves, each a
//! 3-byte sequence.

use byteorder::{LE, WriteBytesExt};
use winnow::binary::{le_u16, u8};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::take;

use crate::errors::ChunkError;

#[inline]
fn bad_data() -> ErrMode<ContextError> {
    ErrMode::Backtrack(ContextError::new())
}

/// Reads one string at the cursor: length prefix, UTF-16 LE code units and
/// the 16-bit terminator.
pub(crate) fn decode_utf16(input: &mut &[u8]) -> ModalResult<String> {
    let first = le_u16(input)? as usize;
    let len = if first & 0x8000 != 0 {
        ((first & 0x7FFF) << 16) | le_u16(input)? as usize
    } else {
        first
    };

    let raw = take(len * 2).parse_next(input)?;
    let _ = le_u16(input)?;

    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();

    String::from_utf16(&units).map_err(|_| bad_data())
}

/// Reads one string at the cursor: both prefixes, the encoded bytes and the
/// single NUL terminator.
pub(crate) fn decode_utf8(input: &mut &[u8]) -> ModalResult<String> {
    let unit_count = decode_len8(input)?;
    let byte_count = decode_len8(input)?;

    let raw = take(byte_count).parse_next(input)?;
    let _ = u8(input)?;

    let decoded = decode_modified_utf8(raw).ok_or_else(bad_data)?;

    // the first prefix is the UTF-16 length of the same string
    if decoded.encode_utf16().count() != unit_count {
        return Err(bad_data());
    }

    Ok(decoded)
}

fn decode_len8(input: &mut &[u8]) -> ModalResult<usize> {
    let b = u8(input)? as usize;
    if b & 0x80 != 0 {
        Ok(((b & 0x7F) << 8) | u8(input)? as usize)
    } else {
        Ok(b)
    }
}

/// Decodes modified UTF-8 into UTF-16 code units, then pairs surrogates.
/// Accepts plain 4-byte sequences as well: they decode to the same
/// surrogate pair via `(cp >> 10) + 0xD7C0`, `(cp & 0x3FF) + 0xDC00`.
fn decode_modified_utf8(raw: &[u8]) -> Option<String> {
    let mut units: Vec<u16> = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        let b = raw[i];
        if b & 0x80 == 0 {
            units.push(b as u16);
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            let c = *raw.get(i + 1)?;
            if c & 0xC0 != 0x80 {
                return None;
            }
            units.push(((b as u16 & 0x1F) << 6) | (c as u16 & 0x3F));
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            let (c, d) = (*raw.get(i + 1)?, *raw.get(i + 2)?);
            if c & 0xC0 != 0x80 || d & 0xC0 != 0x80 {
                return None;
            }
            units.push(((b as u16 & 0x0F) << 12) | ((c as u16 & 0x3F) << 6) | (d as u16 & 0x3F));
            i += 3;
        } else if b & 0xF8 == 0xF0 {
            let (c, d, e) = (*raw.get(i + 1)?, *raw.get(i + 2)?, *raw.get(i + 3)?);
            if c & 0xC0 != 0x80 || d & 0xC0 != 0x80 || e & 0xC0 != 0x80 {
                return None;
            }
            let cp = ((b as u32 & 0x07) << 18)
                | ((c as u32 & 0x3F) << 12)
                | ((d as u32 & 0x3F) << 6)
                | (e as u32 & 0x3F);
            if cp < 0x10000 || cp > 0x10FFFF {
                return None;
            }
            units.push(((cp >> 10) + 0xD7C0) as u16);
            units.push(((cp & 0x3FF) + 0xDC00) as u16);
            i += 4;
        } else {
            return None;
        }
    }

    String::from_utf16(&units).ok()
}

/// Appends one pool string in the UTF-8 encoding: unit-count prefix,
/// byte-count prefix, the bytes and a NUL.
pub(crate) fn encode_utf8(s: &str, out: &mut Vec<u8>) -> Result<(), ChunkError> {
    let unit_count = s.encode_utf16().count();
    let bytes = s.as_bytes();

    if unit_count > 0x7FFF || bytes.len() > 0x7FFF {
        return Err(ChunkError::invariant(format!(
            "string of {} bytes is too long for the UTF-8 pool encoding",
            bytes.len()
        )));
    }

    encode_len8(unit_count, out);
    encode_len8(bytes.len(), out);
    out.extend_from_slice(bytes);
    out.push(0);
    Ok(())
}

fn encode_len8(len: usize, out: &mut Vec<u8>) {
    if len < 0x80 {
        out.push(len as u8);
    } else {
        out.push(0x80 | (len >> 8) as u8);
        out.push(len as u8);
    }
}

/// Appends one pool string in the UTF-16 encoding: unit-count prefix, the
/// little-endian code units and a 16-bit terminator.
pub(crate) fn encode_utf16(s: &str, out: &mut Vec<u8>) -> Result<(), ChunkError> {
    let units: Vec<u16> = s.encode_utf16().collect();

    if units.len() > 0x7FFF_FFFF {
        return Err(ChunkError::invariant(format!(
            "string of {} code units is too long for the UTF-16 pool encoding",
            units.len()
        )));
    }

    if units.len() >= 0x8000 {
        out.write_u16::<LE>(0x8000 | (units.len() >> 16) as u16)?;
        out.write_u16::<LE>(units.len() as u16)?;
    } else {
        out.write_u16::<LE>(units.len() as u16)?;
    }

    for unit in &units {
        out.write_u16::<LE>(*unit)?;
    }
    out.write_u16::<LE>(0)?;
    Ok(())
}

//! Type-spec chunks: the per-entry configuration masks of one type.

use byteorder::{LE, WriteBytesExt};
use winnow::binary::{le_u16, le_u32, u8};
use winnow::prelude::*;

use crate::chunk::{ChunkHeader, ChunkKind, SerializeFlags, emit_chunk, read_u32s};
use crate::errors::ChunkError;

const CODE: u16 = 0x0202;

/// Mask bit marking an entry as public.
pub const SPEC_PUBLIC: u32 = 0x4000_0000;

/// A type-spec chunk (type code 0x0202): one 32-bit configuration mask per
/// entry of the corresponding type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSpecChunk {
    id: u8,
    res0: u8,
    res1: u16,
    masks: Vec<u32>,
}

impl TypeSpecChunk {
    const HEADER_SIZE: u16 = 16;

    fn parse_header_fields(input: &mut &[u8]) -> ModalResult<(u8, u8, u16, u32)> {
        (u8, u8, le_u16, le_u32).parse_next(input)
    }

    pub(crate) fn parse(
        header: ChunkHeader,
        chunk: &[u8],
        abs: usize,
    ) -> Result<TypeSpecChunk, ChunkError> {
        if header.header_size != Self::HEADER_SIZE {
            return Err(ChunkError::malformed(
                abs,
                CODE,
                format!("type spec header size {} != 16", header.header_size),
            ));
        }

        let mut cur = &chunk[ChunkHeader::SIZE..];
        let (id, res0, res1, entry_count) = Self::parse_header_fields(&mut cur)
            .map_err(|_| ChunkError::truncated(abs, "type spec header"))?;

        if id == 0 {
            return Err(ChunkError::malformed(abs, CODE, "type id 0 is invalid"));
        }

        let masks = read_u32s(entry_count as usize, &mut cur)
            .map_err(|_| ChunkError::truncated(abs, "type spec masks"))?;

        Ok(TypeSpecChunk {
            id,
            res0,
            res1,
            masks,
        })
    }

    pub(crate) fn write_to(
        &self,
        out: &mut Vec<u8>,
        flags: SerializeFlags,
    ) -> Result<(), ChunkError> {
        let strip = flags.contains(SerializeFlags::PRIVATE_RESOURCES);

        let mut body = Vec::with_capacity(8 + self.masks.len() * 4);
        body.write_u8(self.id)?;
        body.write_u8(self.res0)?;
        body.write_u16::<LE>(self.res1)?;
        body.write_u32::<LE>(self.masks.len() as u32)?;
        for &mask in &self.masks {
            body.write_u32::<LE>(if strip { mask & !SPEC_PUBLIC } else { mask })?;
        }

        emit_chunk(out, ChunkKind::TableTypeSpec, Self::HEADER_SIZE, &body)
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn masks(&self) -> &[u32] {
        &self.masks
    }

    pub fn entry_count(&self) -> u32 {
        self.masks.len() as u32
    }

    /// Whether the mask word marks the entry at `index` public.
    pub fn is_public(&self, index: u32) -> bool {
        self.masks
            .get(index as usize)
            .is_some_and(|mask| mask & SPEC_PUBLIC != 0)
    }

    #[cfg(test)]
    pub(crate) fn build(id: u8, masks: Vec<u32>) -> TypeSpecChunk {
        TypeSpecChunk {
            id,
            res0: 0,
            res1: 0,
            masks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;

    #[test]
    fn masks_round_trip() {
        let spec = TypeSpecChunk::build(2, vec![0, SPEC_PUBLIC | 4, 0x100]);
        let mut bytes = Vec::new();
        spec.write_to(&mut bytes, SerializeFlags::empty()).unwrap();

        let (parsed, consumed) = Chunk::parse_next(&bytes, 0).unwrap();
        assert_eq!(consumed, bytes.len());
        let Chunk::TypeSpec(parsed) = parsed else {
            panic!("expected a type spec");
        };
        assert_eq!(parsed, spec);
        assert!(!parsed.is_public(0));
        assert!(parsed.is_public(1));
        assert!(!parsed.is_public(5));
    }

    #[test]
    fn private_resources_strips_the_public_mask_bit() {
        let spec = TypeSpecChunk::build(1, vec![SPEC_PUBLIC | 4]);
        let mut bytes = Vec::new();
        spec.write_to(&mut bytes, SerializeFlags::PRIVATE_RESOURCES)
            .unwrap();

        let (parsed, _) = Chunk::parse_next(&bytes, 0).unwrap();
        let Chunk::TypeSpec(parsed) = parsed else {
            panic!("expected a type spec");
        };
        assert_eq!(parsed.masks(), [4]);
    }
}

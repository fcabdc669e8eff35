//! Typed resource values and packed resource identifiers.

use byteorder::{LE, WriteBytesExt};
use winnow::binary::{le_u16, le_u32, u8};
use winnow::prelude::*;

use crate::errors::ChunkError;
use crate::structs::StringPoolChunk;

/// Type of the 32-bit data word carried by a [`ResValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueType {
    /// The data is either 0 (undefined) or 1 (empty)
    Null = 0x00,

    /// The data is a reference to another resource table entry
    Reference = 0x01,

    /// The data is an attribute resource identifier
    Attribute = 0x02,

    /// The data is an index into the containing table's string pool
    String = 0x03,

    /// The data is a single-precision floating point number
    Float = 0x04,

    /// The data is a complex number encoding a dimension, such as "100in"
    Dimension = 0x05,

    /// The data is a complex number encoding a fraction of a container
    Fraction = 0x06,

    /// The data is a reference resolved through a dynamic package mapping
    DynamicReference = 0x07,

    /// The data is an attribute resolved through a dynamic package mapping
    DynamicAttribute = 0x08,

    /// The data is a raw integer of the form n..n
    IntDec = 0x10,

    /// The data is a raw integer of the form 0xn..n
    IntHex = 0x11,

    /// The data is 0 for "false" and 1 for "true"
    IntBoolean = 0x12,

    /// The data is a color of the form #aarrggbb
    ColorArgb8 = 0x1c,

    /// The data is a color of the form #rrggbb
    ColorRgb8 = 0x1d,

    /// The data is a color of the form #argb
    ColorArgb4 = 0x1e,

    /// The data is a color of the form #rgb
    ColorRgb4 = 0x1f,
}

impl ValueType {
    pub fn from_code(code: u8) -> Option<ValueType> {
        Some(match code {
            0x00 => ValueType::Null,
            0x01 => ValueType::Reference,
            0x02 => ValueType::Attribute,
            0x03 => ValueType::String,
            0x04 => ValueType::Float,
            0x05 => ValueType::Dimension,
            0x06 => ValueType::Fraction,
            0x07 => ValueType::DynamicReference,
            0x08 => ValueType::DynamicAttribute,
            0x10 => ValueType::IntDec,
            0x11 => ValueType::IntHex,
            0x12 => ValueType::IntBoolean,
            0x1c => ValueType::ColorArgb8,
            0x1d => ValueType::ColorRgb8,
            0x1e => ValueType::ColorArgb4,
            0x1f => ValueType::ColorRgb4,
            _ => return None,
        })
    }

    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// The fixed 8-byte typed-value record: struct size, a reserved byte, the
/// type tag and the 32-bit data word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResValue {
    pub size: u16,
    pub res0: u8,
    pub value_type: ValueType,
    pub data: u32,
}

impl ResValue {
    const RADIX_MULTS: [f64; 4] = [0.00390625, 3.051758e-005, 1.192093e-007, 4.656613e-010];
    const DIMENSION_UNITS: [&str; 6] = ["px", "dip", "sp", "pt", "in", "mm"];
    const FRACTION_UNITS: [&str; 2] = ["%", "%p"];
    const COMPLEX_UNIT_MASK: u32 = 0x0F;

    pub const fn null() -> ResValue {
        ResValue {
            size: 8,
            res0: 0,
            value_type: ValueType::Null,
            data: 0,
        }
    }

    pub const fn string(index: u32) -> ResValue {
        ResValue {
            size: 8,
            res0: 0,
            value_type: ValueType::String,
            data: index,
        }
    }

    pub const fn reference(id: ResourceId) -> ResValue {
        ResValue {
            size: 8,
            res0: 0,
            value_type: ValueType::Reference,
            data: id.raw(),
        }
    }

    fn parse_fields(input: &mut &[u8]) -> ModalResult<(u16, u8, u8, u32)> {
        (le_u16, u8, u8, le_u32).parse_next(input)
    }

    /// Parses one value at the cursor. `abs` locates the owning chunk for
    /// error context; an unrecognized type tag fails the parse.
    pub(crate) fn parse(input: &mut &[u8], abs: usize) -> Result<ResValue, ChunkError> {
        let (size, res0, tag, data) = Self::parse_fields(input)
            .map_err(|_| ChunkError::truncated(abs, "resource value"))?;

        let value_type = ValueType::from_code(tag)
            .ok_or(ChunkError::UnsupportedValueType { offset: abs, tag })?;

        Ok(ResValue {
            size,
            res0,
            value_type,
            data,
        })
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) -> Result<(), ChunkError> {
        out.write_u16::<LE>(self.size)?;
        out.write_u8(self.res0)?;
        out.write_u8(self.value_type.code())?;
        out.write_u32::<LE>(self.data)?;
        Ok(())
    }

    /// Human-readable rendering, resolving string values through the pool
    /// that owns them.
    pub fn format_with(&self, pool: &StringPoolChunk) -> String {
        match self.value_type {
            ValueType::Null => {
                if self.data == 0 {
                    "@null".to_owned()
                } else {
                    "@empty".to_owned()
                }
            }
            ValueType::Reference | ValueType::DynamicReference => {
                format!("@{:08x}", self.data)
            }
            ValueType::Attribute | ValueType::DynamicAttribute => {
                format!("?{:08x}", self.data)
            }
            ValueType::String => pool
                .string(self.data)
                .map(str::to_owned)
                .unwrap_or_default(),
            ValueType::Float => f32::from_bits(self.data).to_string(),
            ValueType::Dimension => {
                let idx = (self.data & Self::COMPLEX_UNIT_MASK) as usize;
                let unit = Self::DIMENSION_UNITS.get(idx).unwrap_or(&"");
                format!("{}{}", self.complex_to_float(), unit)
            }
            ValueType::Fraction => {
                let idx = (self.data & Self::COMPLEX_UNIT_MASK) as usize;
                let unit = Self::FRACTION_UNITS.get(idx).unwrap_or(&"");
                format!("{}{}", self.complex_to_float() * 100f64, unit)
            }
            ValueType::IntDec => format!("{}", self.data),
            ValueType::IntHex => format!("0x{:08x}", self.data),
            ValueType::IntBoolean => {
                if self.data == 0 {
                    "false".to_owned()
                } else {
                    "true".to_owned()
                }
            }
            ValueType::ColorArgb8
            | ValueType::ColorRgb8
            | ValueType::ColorArgb4
            | ValueType::ColorRgb4 => format!("#{:08x}", self.data),
        }
    }

    #[inline(always)]
    fn complex_to_float(&self) -> f64 {
        ((self.data & 0xFFFF_FF00) as f64) * Self::RADIX_MULTS[((self.data >> 4) & 3) as usize]
    }
}

/// A packed resource identifier: `0xPPTTEEEE` with a 1-based package id, a
/// 1-based type id and a 0-based entry index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u32);

impl ResourceId {
    pub const fn new(package_id: u8, type_id: u8, entry_index: u16) -> ResourceId {
        ResourceId(((package_id as u32) << 24) | ((type_id as u32) << 16) | entry_index as u32)
    }

    pub const fn from_raw(raw: u32) -> ResourceId {
        ResourceId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn package_id(self) -> u8 {
        (self.0 >> 24) as u8
    }

    #[inline]
    pub const fn type_id(self) -> u8 {
        (self.0 >> 16) as u8
    }

    #[inline]
    pub const fn entry_index(self) -> u16 {
        self.0 as u16
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_unpacks_its_fields() {
        let id = ResourceId::from_raw(0x01234567);
        assert_eq!(id.package_id(), 0x01);
        assert_eq!(id.type_id(), 0x23);
        assert_eq!(id.entry_index(), 0x4567);

        let id = ResourceId::from_raw(0xFEDCBA98);
        assert_eq!(id.package_id(), 0xFE);
        assert_eq!(id.type_id(), 0xDC);
        assert_eq!(id.entry_index(), 0xBA98);
    }

    #[test]
    fn identifier_repacks_to_the_same_word() {
        let id = ResourceId::new(0x7F, 0x02, 0x0010);
        assert_eq!(id.raw(), 0x7F020010);
        assert_eq!(ResourceId::new(0xFE, 0xDC, 0xBA98).raw(), 0xFEDCBA98);
    }

    #[test]
    fn value_round_trips_through_bytes() {
        let value = ResValue {
            size: 8,
            res0: 0,
            value_type: ValueType::IntHex,
            data: 0xDEADBEEF,
        };
        let mut out = Vec::new();
        value.write_to(&mut out).unwrap();
        assert_eq!(out, [0x08, 0x00, 0x00, 0x11, 0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(ResValue::parse(&mut out.as_slice(), 0).unwrap(), value);
    }

    #[test]
    fn unknown_value_tag_fails_parse() {
        let raw = [0x08, 0x00, 0x00, 0x0B, 0, 0, 0, 0];
        assert!(matches!(
            ResValue::parse(&mut raw.as_slice(), 0x40),
            Err(ChunkError::UnsupportedValueType { offset: 0x40, tag: 0x0B })
        ));
    }
}

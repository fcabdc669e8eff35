//! The variable-length resource configuration record embedded in every
//! type chunk.
//!
//! The record begins with its own size. Fields are read while watching the
//! historical size thresholds at 28, 32, 36, 48 and 52 bytes; anything the
//! declared size does not cover keeps its default, and bytes beyond 52 are
//! carried as opaque trailing data. The writer emits exactly `size` bytes.

use byteorder::{LE, WriteBytesExt};
use winnow::binary::{le_u16, le_u32, u8};
use winnow::prelude::*;
use winnow::token::take;

use crate::errors::ChunkError;

const TYPE_CODE: u16 = 0x0201;

/// The qualifier tuple (locale, density, orientation, ...) a set of entries
/// is designed for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResConfig {
    size: u32,
    pub mcc: u16,
    pub mnc: u16,
    pub language: [u8; 2],
    pub region: [u8; 2],
    pub orientation: u8,
    pub touchscreen: u8,
    pub density: u16,
    pub keyboard: u8,
    pub navigation: u8,
    pub input_flags: u8,
    pub input_pad0: u8,
    pub screen_width: u16,
    pub screen_height: u16,
    pub sdk_version: u16,
    pub minor_version: u16,
    pub screen_layout: u8,
    pub ui_mode: u8,
    pub smallest_screen_width_dp: u16,
    pub screen_width_dp: u16,
    pub screen_height_dp: u16,
    pub locale_script: [u8; 4],
    pub locale_variant: [u8; 8],
    pub screen_layout2: u8,
    pub color_mode: u8,
    pub screen_config_pad2: u16,
    unknown: Vec<u8>,
}

impl Default for ResConfig {
    fn default() -> ResConfig {
        ResConfig {
            size: 28,
            mcc: 0,
            mnc: 0,
            language: [0; 2],
            region: [0; 2],
            orientation: 0,
            touchscreen: 0,
            density: 0,
            keyboard: 0,
            navigation: 0,
            input_flags: 0,
            input_pad0: 0,
            screen_width: 0,
            screen_height: 0,
            sdk_version: 0,
            minor_version: 0,
            screen_layout: 0,
            ui_mode: 0,
            smallest_screen_width_dp: 0,
            screen_width_dp: 0,
            screen_height_dp: 0,
            locale_script: [0; 4],
            locale_variant: [0; 8],
            screen_layout2: 0,
            color_mode: 0,
            screen_config_pad2: 0,
            unknown: Vec::new(),
        }
    }
}

impl ResConfig {
    pub(crate) fn parse(input: &mut &[u8], abs: usize) -> Result<ResConfig, ChunkError> {
        let size = le_u32::<_, winnow::error::ContextError>
            .parse_next(input)
            .map_err(|_| ChunkError::truncated(abs, "configuration size"))?;

        if size < 28 {
            return Err(ChunkError::malformed(
                abs,
                TYPE_CODE,
                format!("configuration size {size} is below the 28 byte minimum"),
            ));
        }

        let (body, rest) = input
            .split_at_checked(size as usize - 4)
            .ok_or_else(|| ChunkError::truncated(abs, "configuration body"))?;
        *input = rest;

        let mut cur = body;
        Self::parse_fields(&mut cur, size)
            .map_err(|_| ChunkError::truncated(abs, "configuration fields"))
    }

    fn parse_fields(input: &mut &[u8], size: u32) -> ModalResult<ResConfig> {
        let mut config = ResConfig {
            size,
            ..ResConfig::default()
        };

        (le_u16, le_u16, take(2usize), take(2usize))
            .map(|(mcc, mnc, language, region): (u16, u16, &[u8], &[u8])| {
                config.mcc = mcc;
                config.mnc = mnc;
                config.language = language.try_into().expect("expected 2 bytes for language");
                config.region = region.try_into().expect("expected 2 bytes for region");
            })
            .parse_next(input)?;

        (u8, u8, le_u16, u8, u8, u8, u8)
            .map(
                |(orientation, touchscreen, density, keyboard, navigation, input_flags, pad0)| {
                    config.orientation = orientation;
                    config.touchscreen = touchscreen;
                    config.density = density;
                    config.keyboard = keyboard;
                    config.navigation = navigation;
                    config.input_flags = input_flags;
                    config.input_pad0 = pad0;
                },
            )
            .parse_next(input)?;

        (le_u16, le_u16, le_u16, le_u16)
            .map(|(width, height, sdk, minor)| {
                config.screen_width = width;
                config.screen_height = height;
                config.sdk_version = sdk;
                config.minor_version = minor;
            })
            .parse_next(input)?;

        if size >= 32 {
            (u8, u8, le_u16)
                .map(|(layout, ui_mode, smallest)| {
                    config.screen_layout = layout;
                    config.ui_mode = ui_mode;
                    config.smallest_screen_width_dp = smallest;
                })
                .parse_next(input)?;
        }
        if size >= 36 {
            (le_u16, le_u16)
                .map(|(width, height)| {
                    config.screen_width_dp = width;
                    config.screen_height_dp = height;
                })
                .parse_next(input)?;
        }
        if size >= 48 {
            (take(4usize), take(8usize))
                .map(|(script, variant): (&[u8], &[u8])| {
                    config.locale_script =
                        script.try_into().expect("expected 4 bytes for locale script");
                    config.locale_variant =
                        variant.try_into().expect("expected 8 bytes for locale variant");
                })
                .parse_next(input)?;
        }
        if size >= 52 {
            (u8, u8, le_u16)
                .map(|(layout2, color_mode, pad2)| {
                    config.screen_layout2 = layout2;
                    config.color_mode = color_mode;
                    config.screen_config_pad2 = pad2;
                })
                .parse_next(input)?;
        }
        if size > 52 {
            config.unknown = input.to_vec();
            *input = &input[input.len()..];
        }

        Ok(config)
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) -> Result<(), ChunkError> {
        let start = out.len();

        out.write_u32::<LE>(self.size)?;
        out.write_u16::<LE>(self.mcc)?;
        out.write_u16::<LE>(self.mnc)?;
        out.extend_from_slice(&self.language);
        out.extend_from_slice(&self.region);
        out.write_u8(self.orientation)?;
        out.write_u8(self.touchscreen)?;
        out.write_u16::<LE>(self.density)?;
        out.write_u8(self.keyboard)?;
        out.write_u8(self.navigation)?;
        out.write_u8(self.input_flags)?;
        out.write_u8(self.input_pad0)?;
        out.write_u16::<LE>(self.screen_width)?;
        out.write_u16::<LE>(self.screen_height)?;
        out.write_u16::<LE>(self.sdk_version)?;
        out.write_u16::<LE>(self.minor_version)?;

        if self.size >= 32 {
            out.write_u8(self.screen_layout)?;
            out.write_u8(self.ui_mode)?;
            out.write_u16::<LE>(self.smallest_screen_width_dp)?;
        }
        if self.size >= 36 {
            out.write_u16::<LE>(self.screen_width_dp)?;
            out.write_u16::<LE>(self.screen_height_dp)?;
        }
        if self.size >= 48 {
            out.extend_from_slice(&self.locale_script);
            out.extend_from_slice(&self.locale_variant);
        }
        if self.size >= 52 {
            out.write_u8(self.screen_layout2)?;
            out.write_u8(self.color_mode)?;
            out.write_u16::<LE>(self.screen_config_pad2)?;
        }
        out.extend_from_slice(&self.unknown);

        let written = out.len() - start;
        if written > self.size as usize {
            return Err(ChunkError::invariant(format!(
                "configuration fields occupy {written} bytes but the declared size is {}",
                self.size
            )));
        }
        out.resize(start + self.size as usize, 0);
        Ok(())
    }

    /// Declared size of the serialized record, including the size word.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// The default configuration: every known field zero and all trailing
    /// bytes zero. This is the sentinel matched by baseless-key analysis.
    pub fn is_default(&self) -> bool {
        self.mcc == 0
            && self.mnc == 0
            && self.language == [0; 2]
            && self.region == [0; 2]
            && self.orientation == 0
            && self.touchscreen == 0
            && self.density == 0
            && self.keyboard == 0
            && self.navigation == 0
            && self.input_flags == 0
            && self.input_pad0 == 0
            && self.screen_width == 0
            && self.screen_height == 0
            && self.sdk_version == 0
            && self.minor_version == 0
            && self.screen_layout == 0
            && self.ui_mode == 0
            && self.smallest_screen_width_dp == 0
            && self.screen_width_dp == 0
            && self.screen_height_dp == 0
            && self.locale_script == [0; 4]
            && self.locale_variant == [0; 8]
            && self.screen_layout2 == 0
            && self.color_mode == 0
            && self.screen_config_pad2 == 0
            && self.unknown.iter().all(|b| *b == 0)
    }

    /// Two-letter or unpacked three-letter language code, `None` for "any".
    pub fn language_code(&self) -> Option<String> {
        unpack_locale_part(self.language, b'a')
    }

    /// Two-letter or unpacked three-digit region code, `None` for "any".
    pub fn region_code(&self) -> Option<String> {
        unpack_locale_part(self.region, b'0')
    }

    /// The resource-directory qualifier suffix this configuration would be
    /// written as, e.g. `fr-rFR-land-xhdpi-v21`. Empty for the default
    /// configuration.
    pub fn qualifiers(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        let mut push = |s: String| parts.push(s);

        if self.mcc != 0 {
            push(format!("mcc{}", self.mcc));
        }
        if self.mnc != 0 {
            push(format!("mnc{}", self.mnc));
        }
        if let Some(lang) = self.language_code() {
            push(lang);
        }
        if let Some(region) = self.region_code() {
            push(format!("r{region}"));
        }

        match self.screen_layout & 0xC0 {
            0x40 => push("ldltr".to_owned()),
            0x80 => push("ldrtl".to_owned()),
            _ => {}
        }
        if self.smallest_screen_width_dp != 0 {
            push(format!("sw{}dp", self.smallest_screen_width_dp));
        }
        if self.screen_width_dp != 0 {
            push(format!("w{}dp", self.screen_width_dp));
        }
        if self.screen_height_dp != 0 {
            push(format!("h{}dp", self.screen_height_dp));
        }
        match self.screen_layout & 0x0F {
            0x01 => push("small".to_owned()),
            0x02 => push("normal".to_owned()),
            0x03 => push("large".to_owned()),
            0x04 => push("xlarge".to_owned()),
            _ => {}
        }
        match self.screen_layout & 0x30 {
            0x10 => push("notlong".to_owned()),
            0x20 => push("long".to_owned()),
            _ => {}
        }
        match self.screen_layout2 & 0x03 {
            0x01 => push("notround".to_owned()),
            0x02 => push("round".to_owned()),
            _ => {}
        }
        match self.color_mode & 0x03 {
            0x01 => push("nowidecg".to_owned()),
            0x02 => push("widecg".to_owned()),
            _ => {}
        }
        match self.color_mode & 0x0C {
            0x04 => push("lowdr".to_owned()),
            0x08 => push("highdr".to_owned()),
            _ => {}
        }
        match self.orientation {
            0x01 => push("port".to_owned()),
            0x02 => push("land".to_owned()),
            0x03 => push("square".to_owned()),
            _ => {}
        }
        match self.ui_mode & 0x0F {
            0x02 => push("desk".to_owned()),
            0x03 => push("car".to_owned()),
            0x04 => push("television".to_owned()),
            0x05 => push("appliance".to_owned()),
            0x06 => push("watch".to_owned()),
            0x07 => push("vrheadset".to_owned()),
            _ => {}
        }
        match self.ui_mode & 0x30 {
            0x10 => push("notnight".to_owned()),
            0x20 => push("night".to_owned()),
            _ => {}
        }
        match self.density {
            0 => {}
            120 => push("ldpi".to_owned()),
            160 => push("mdpi".to_owned()),
            213 => push("tvdpi".to_owned()),
            240 => push("hdpi".to_owned()),
            320 => push("xhdpi".to_owned()),
            480 => push("xxhdpi".to_owned()),
            640 => push("xxxhdpi".to_owned()),
            0xFFFE => push("anydpi".to_owned()),
            0xFFFF => push("nodpi".to_owned()),
            other => push(format!("{other}dpi")),
        }
        match self.touchscreen {
            0x01 => push("notouch".to_owned()),
            0x02 => push("stylus".to_owned()),
            0x03 => push("finger".to_owned()),
            _ => {}
        }
        match self.input_flags & 0x03 {
            0x01 => push("keysexposed".to_owned()),
            0x02 => push("keyshidden".to_owned()),
            0x03 => push("keyssoft".to_owned()),
            _ => {}
        }
        match self.keyboard {
            0x01 => push("nokeys".to_owned()),
            0x02 => push("qwerty".to_owned()),
            0x03 => push("12key".to_owned()),
            _ => {}
        }
        match self.input_flags & 0x0C {
            0x04 => push("navexposed".to_owned()),
            0x08 => push("navhidden".to_owned()),
            _ => {}
        }
        match self.navigation {
            0x01 => push("nonav".to_owned()),
            0x02 => push("dpad".to_owned()),
            0x03 => push("trackball".to_owned()),
            0x04 => push("wheel".to_owned()),
            _ => {}
        }
        if self.screen_width != 0 || self.screen_height != 0 {
            push(format!("{}x{}", self.screen_width, self.screen_height));
        }
        if self.sdk_version != 0 {
            if self.minor_version != 0 {
                push(format!("v{}.{}", self.sdk_version, self.minor_version));
            } else {
                push(format!("v{}", self.sdk_version));
            }
        }

        parts.join("-")
    }
}

impl std::fmt::Display for ResConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let q = self.qualifiers();
        if q.is_empty() {
            f.write_str("default")
        } else {
            f.write_str(&q)
        }
    }
}

/// Unpacks one half of the locale field. A zero pair means "any". When the
/// high bit of the first byte is set the pair holds three 5-bit letters
/// relative to `base`, otherwise it is two plain 7-bit characters.
fn unpack_locale_part(raw: [u8; 2], base: u8) -> Option<String> {
    if raw == [0, 0] {
        return None;
    }

    if raw[0] & 0x80 != 0 {
        let first = base + (raw[1] & 0x1F);
        let second = base + (((raw[1] & 0xE0) >> 5) | ((raw[0] & 0x03) << 3));
        let third = base + ((raw[0] & 0x7C) >> 2);
        return Some(String::from_utf8_lossy(&[first, second, third]).into_owned());
    }

    Some(String::from_utf8_lossy(&raw).into_owned())
}

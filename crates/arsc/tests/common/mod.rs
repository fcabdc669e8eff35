//! Byte-level builders for synthetic container fixtures. These assemble
//! the on-disk layout by hand, independently of the library's writer, so
//! the round-trip assertions check both directions against the format
//! itself.
#![allow(dead_code)]

use byteorder::{LE, WriteBytesExt};

pub const NO_ENTRY: u32 = 0xFFFF_FFFF;
pub const UTF8_FLAG: u32 = 1 << 8;

/// Frames a chunk: metadata header, header remainder, payload.
pub fn chunk(code: u16, header_rest: &[u8], payload: &[u8]) -> Vec<u8> {
    let header_size = 8 + header_rest.len();
    let size = header_size + payload.len();
    let mut out = Vec::with_capacity(size);
    out.write_u16::<LE>(code).unwrap();
    out.write_u16::<LE>(header_size as u16).unwrap();
    out.write_u32::<LE>(size as u32).unwrap();
    out.extend_from_slice(header_rest);
    out.extend_from_slice(payload);
    out
}

pub fn pad4(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

fn utf8_string(s: &str) -> Vec<u8> {
    assert!(s.len() < 0x80, "fixture strings stay below the 2-byte prefix");
    let mut out = Vec::new();
    out.push(s.encode_utf16().count() as u8);
    out.push(s.len() as u8);
    out.extend_from_slice(s.as_bytes());
    out.push(0);
    out
}

fn utf16_string(s: &str) -> Vec<u8> {
    let units: Vec<u16> = s.encode_utf16().collect();
    assert!(units.len() < 0x8000);
    let mut out = Vec::new();
    out.write_u16::<LE>(units.len() as u16).unwrap();
    for unit in units {
        out.write_u16::<LE>(unit).unwrap();
    }
    out.write_u16::<LE>(0).unwrap();
    out
}

/// A string pool chunk without styles. Offsets are laid out strictly
/// increasing, one copy per string.
pub fn string_pool(utf8: bool, strings: &[&str]) -> Vec<u8> {
    let mut offsets = Vec::new();
    let mut data = Vec::new();
    for s in strings {
        offsets.write_u32::<LE>(data.len() as u32).unwrap();
        let encoded = if utf8 { utf8_string(s) } else { utf16_string(s) };
        data.extend_from_slice(&encoded);
    }
    pad4(&mut data);

    let strings_start = 28 + offsets.len();
    let mut header_rest = Vec::new();
    header_rest.write_u32::<LE>(strings.len() as u32).unwrap();
    header_rest.write_u32::<LE>(0).unwrap();
    header_rest
        .write_u32::<LE>(if utf8 { UTF8_FLAG } else { 0 })
        .unwrap();
    header_rest.write_u32::<LE>(strings_start as u32).unwrap();
    header_rest.write_u32::<LE>(0).unwrap();

    let mut payload = offsets;
    payload.extend_from_slice(&data);
    chunk(0x0001, &header_rest, &payload)
}

/// A string pool with styles. `styles[i]` decorates `strings[i]` and holds
/// (name index, start, stop) spans; each style is terminated by one END
/// word, the region by two more.
pub fn styled_string_pool(utf8: bool, strings: &[&str], styles: &[&[(u32, u32, u32)]]) -> Vec<u8> {
    assert!(styles.len() <= strings.len());

    let mut string_offsets = Vec::new();
    let mut string_data = Vec::new();
    for s in strings {
        string_offsets
            .write_u32::<LE>(string_data.len() as u32)
            .unwrap();
        let encoded = if utf8 { utf8_string(s) } else { utf16_string(s) };
        string_data.extend_from_slice(&encoded);
    }
    pad4(&mut string_data);

    let mut style_offsets = Vec::new();
    let mut style_data = Vec::new();
    for spans in styles {
        style_offsets
            .write_u32::<LE>(style_data.len() as u32)
            .unwrap();
        for (name, start, stop) in *spans {
            style_data.write_u32::<LE>(*name).unwrap();
            style_data.write_u32::<LE>(*start).unwrap();
            style_data.write_u32::<LE>(*stop).unwrap();
        }
        style_data.write_u32::<LE>(NO_ENTRY).unwrap();
    }
    style_data.write_u32::<LE>(NO_ENTRY).unwrap();
    style_data.write_u32::<LE>(NO_ENTRY).unwrap();
    pad4(&mut style_data);

    let strings_start = 28 + string_offsets.len() + style_offsets.len();
    let styles_start = strings_start + string_data.len();
    let mut header_rest = Vec::new();
    header_rest.write_u32::<LE>(strings.len() as u32).unwrap();
    header_rest.write_u32::<LE>(styles.len() as u32).unwrap();
    header_rest
        .write_u32::<LE>(if utf8 { UTF8_FLAG } else { 0 })
        .unwrap();
    header_rest.write_u32::<LE>(strings_start as u32).unwrap();
    header_rest.write_u32::<LE>(styles_start as u32).unwrap();

    let mut payload = string_offsets;
    payload.extend_from_slice(&style_offsets);
    payload.extend_from_slice(&string_data);
    payload.extend_from_slice(&style_data);
    chunk(0x0001, &header_rest, &payload)
}

/// A sparse type chunk: (dense index, entry) pairs, offsets encoded in
/// quarters.
pub fn sparse_type_chunk(id: u8, config: &[u8], entries: &[(u16, Vec<u8>)]) -> Vec<u8> {
    let mut pairs = Vec::new();
    let mut data = Vec::new();
    for (index, entry) in entries {
        assert!(data.len() % 4 == 0);
        pairs.write_u16::<LE>(*index).unwrap();
        pairs.write_u16::<LE>((data.len() / 4) as u16).unwrap();
        data.extend_from_slice(entry);
    }

    let header_size = 20 + config.len();
    let mut header_rest = Vec::new();
    header_rest.push(id);
    header_rest.push(0x01); // sparse
    header_rest.write_u16::<LE>(0).unwrap();
    header_rest.write_u32::<LE>(entries.len() as u32).unwrap();
    header_rest
        .write_u32::<LE>((header_size + pairs.len()) as u32)
        .unwrap();
    header_rest.extend_from_slice(config);

    let mut payload = pairs;
    payload.extend_from_slice(&data);
    chunk(0x0201, &header_rest, &payload)
}

/// A shared-library chunk with (package id, package name) entries.
pub fn library(entries: &[(u32, &str)]) -> Vec<u8> {
    let mut header_rest = Vec::new();
    header_rest.write_u32::<LE>(entries.len() as u32).unwrap();

    let mut payload = Vec::new();
    for (id, name) in entries {
        payload.write_u32::<LE>(*id).unwrap();
        payload.extend_from_slice(&fixed_utf16_name(name));
    }
    chunk(0x0203, &header_rest, &payload)
}

/// A default (all-zero) 28-byte configuration.
pub fn default_config() -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u32::<LE>(28).unwrap();
    out.resize(28, 0);
    out
}

/// A simple entry: 8-byte header plus one value.
pub fn simple_entry(flags: u16, key_index: u32, value_type: u8, data: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u16::<LE>(8).unwrap();
    out.write_u16::<LE>(flags).unwrap();
    out.write_u32::<LE>(key_index).unwrap();
    out.write_u16::<LE>(8).unwrap();
    out.push(0);
    out.push(value_type);
    out.write_u32::<LE>(data).unwrap();
    out
}

/// A dense type chunk for `slots`, where `None` becomes the sentinel.
pub fn type_chunk(id: u8, config: &[u8], slots: &[Option<Vec<u8>>]) -> Vec<u8> {
    let mut offsets = Vec::new();
    let mut data = Vec::new();
    for slot in slots {
        match slot {
            Some(entry) => {
                offsets.write_u32::<LE>(data.len() as u32).unwrap();
                data.extend_from_slice(entry);
            }
            None => offsets.write_u32::<LE>(NO_ENTRY).unwrap(),
        }
    }

    let header_size = 20 + config.len();
    let mut header_rest = Vec::new();
    header_rest.push(id);
    header_rest.push(0); // flags
    header_rest.write_u16::<LE>(0).unwrap();
    header_rest.write_u32::<LE>(slots.len() as u32).unwrap();
    header_rest
        .write_u32::<LE>((header_size + offsets.len()) as u32)
        .unwrap();
    header_rest.extend_from_slice(config);

    let mut payload = offsets;
    payload.extend_from_slice(&data);
    chunk(0x0201, &header_rest, &payload)
}

pub fn type_spec(id: u8, masks: &[u32]) -> Vec<u8> {
    let mut header_rest = Vec::new();
    header_rest.push(id);
    header_rest.push(0);
    header_rest.write_u16::<LE>(0).unwrap();
    header_rest.write_u32::<LE>(masks.len() as u32).unwrap();

    let mut payload = Vec::new();
    for mask in masks {
        payload.write_u32::<LE>(*mask).unwrap();
    }
    chunk(0x0202, &header_rest, &payload)
}

pub fn fixed_utf16_name(name: &str) -> [u8; 256] {
    let mut out = [0u8; 256];
    for (i, unit) in name.encode_utf16().take(127).enumerate() {
        out[i * 2] = unit as u8;
        out[i * 2 + 1] = (unit >> 8) as u8;
    }
    out
}

/// A package chunk with the full 288-byte header. Children are emitted in
/// order; the type- and key-pool offsets point at the children named by
/// index.
pub fn package(
    id: u32,
    name: &str,
    children: &[Vec<u8>],
    type_pool_child: usize,
    key_pool_child: usize,
) -> Vec<u8> {
    let mut child_offsets = Vec::with_capacity(children.len());
    let mut payload = Vec::new();
    for child in children {
        child_offsets.push(288 + payload.len());
        payload.extend_from_slice(child);
        pad4(&mut payload);
    }

    let mut header_rest = Vec::new();
    header_rest.write_u32::<LE>(id).unwrap();
    header_rest.extend_from_slice(&fixed_utf16_name(name));
    header_rest
        .write_u32::<LE>(child_offsets[type_pool_child] as u32)
        .unwrap();
    header_rest.write_u32::<LE>(0).unwrap(); // last public type
    header_rest
        .write_u32::<LE>(child_offsets[key_pool_child] as u32)
        .unwrap();
    header_rest.write_u32::<LE>(0).unwrap(); // last public key
    header_rest.write_u32::<LE>(0).unwrap(); // type id offset

    chunk(0x0200, &header_rest, &payload)
}

/// A resource table wrapping a global pool and package chunks.
pub fn table(package_count: u32, children: &[Vec<u8>]) -> Vec<u8> {
    let mut payload = Vec::new();
    for child in children {
        payload.extend_from_slice(child);
        pad4(&mut payload);
    }
    let mut header_rest = Vec::new();
    header_rest.write_u32::<LE>(package_count).unwrap();
    chunk(0x0002, &header_rest, &payload)
}

/// An XML node chunk: 16-byte node header (line, comment) plus fields.
pub fn xml_node(code: u16, line: u32, comment: u32, fields: &[u8]) -> Vec<u8> {
    let mut header_rest = Vec::new();
    header_rest.write_u32::<LE>(line).unwrap();
    header_rest.write_u32::<LE>(comment).unwrap();
    chunk(code, &header_rest, fields)
}

pub fn le32(values: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for v in values {
        out.write_u32::<LE>(*v).unwrap();
    }
    out
}

pub fn le16(values: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 2);
    for v in values {
        out.write_u16::<LE>(*v).unwrap();
    }
    out
}

//! Byte-exact round-trips over hand-assembled container fixtures.

mod common;

use arsckit::{Chunk, ChunkKind, Document, ResourceId, SerializeFlags, ValueType};
use common::*;

/// A resources.arsc-shaped stream: global pool, one package with a type
/// pool, a key pool, a spec, a dense type chunk, and an unknown chunk that
/// must survive verbatim.
fn sample_arsc() -> Vec<u8> {
    let global_pool = string_pool(true, &["alpha", "beta"]);
    let type_pool = string_pool(false, &["string"]);
    let key_pool = string_pool(true, &["first", "second"]);
    let spec = type_spec(1, &[0x4000_0000, 0]);
    let types = type_chunk(
        1,
        &default_config(),
        &[
            Some(simple_entry(0, 0, 0x03, 0)), // string "alpha"
            None,
            Some(simple_entry(0, 1, 0x10, 42)), // decimal 42
        ],
    );

    let pkg = package(
        0x7F,
        "com.example.fixture",
        &[type_pool, key_pool, spec, types],
        0,
        1,
    );

    // a chunk kind outside the catalogue, preserved without interpretation
    let opaque = chunk(0x0204, &[], &le32(&[0xCAFE_F00D]));

    table(1, &[global_pool, pkg, opaque])
}

/// An AndroidManifest.xml-shaped stream.
fn sample_xml() -> Vec<u8> {
    let pool = string_pool(true, &["package", "android", "manifest", "demo.app"]);
    let resmap = chunk(0x0180, &[], &le32(&[0x0101_021B]));

    let ns_start = xml_node(0x0100, 1, NO_ENTRY, &le32(&[1, NO_ENTRY]));
    let element = {
        let mut fields = le32(&[NO_ENTRY, 2]); // namespace, name "manifest"
        fields.extend_from_slice(&le16(&[20, 20, 1, 0, 0, 0]));
        // one attribute: package="demo.app"
        fields.extend_from_slice(&le32(&[NO_ENTRY, 0, 3]));
        fields.extend_from_slice(&le16(&[8]));
        fields.push(0);
        fields.push(0x03); // string
        fields.extend_from_slice(&le32(&[3]));
        xml_node(0x0102, 2, NO_ENTRY, &fields)
    };
    let element_end = xml_node(0x0103, 5, NO_ENTRY, &le32(&[NO_ENTRY, 2]));
    let ns_end = xml_node(0x0101, 5, NO_ENTRY, &le32(&[1, NO_ENTRY]));

    let mut payload = Vec::new();
    for child in [pool, resmap, ns_start, element, element_end, ns_end] {
        payload.extend_from_slice(&child);
        pad4(&mut payload);
    }
    chunk(0x0003, &[], &payload)
}

#[test]
fn arsc_round_trips_byte_for_byte() {
    let input = sample_arsc();
    let doc = Document::parse(&input).unwrap();
    let output = doc.serialize(SerializeFlags::empty()).unwrap();
    assert_eq!(output, input);
}

#[test]
fn arsc_structure_is_exposed_through_the_table() {
    let input = sample_arsc();
    let doc = Document::parse(&input).unwrap();

    let table = doc.tables().next().unwrap();
    assert_eq!(table.string_pool().strings(), ["alpha", "beta"]);
    assert!(table.string_pool().is_utf8());

    let pkg = table.package("com.example.fixture").unwrap();
    assert_eq!(pkg.id(), 0x7F);
    assert_eq!(pkg.type_name(1), Some("string"));
    assert!(!pkg.type_string_pool().is_utf8());

    let t = pkg.type_chunks().next().unwrap();
    assert!(t.config().is_default());
    assert_eq!(t.total_entry_count(), 3);
    assert_eq!(t.present_entry_count(), 2);
    assert_eq!(t.null_entry_count(), 1);

    let entry = t.entry(0).unwrap();
    assert_eq!(pkg.key_string_pool().string(entry.key_index), Some("first"));
    let value = entry.value().unwrap();
    assert_eq!(value.value_type, ValueType::String);
    assert_eq!(table.string_pool().string(value.data), Some("alpha"));

    let spec = pkg.type_spec_with_id(1).unwrap();
    assert!(spec.is_public(0));
    assert!(!spec.is_public(1));

    // lookup by packed identifier
    let hits = table.resolve(ResourceId::from_raw(0x7F010002));
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].1.value().unwrap().data, 42);
    assert!(table.resolve(ResourceId::from_raw(0x7F010001)).is_empty());
}

#[test]
fn unknown_chunks_survive_verbatim() {
    let input = sample_arsc();
    let doc = Document::parse(&input).unwrap();

    let table = doc.tables().next().unwrap();
    let raw_codes: Vec<ChunkKind> = table
        .packages()
        .flat_map(|p| p.children().iter())
        .map(Chunk::kind)
        .collect();
    assert!(!raw_codes.contains(&ChunkKind::Unknown(0x0204)));

    // the opaque chunk sits among the table children and re-emits unchanged
    let output = doc.serialize(SerializeFlags::empty()).unwrap();
    assert_eq!(output, input);
    let tail = &output[output.len() - 12..];
    assert_eq!(&tail[..2], 0x0204u16.to_le_bytes());
    assert_eq!(&tail[8..], 0xCAFE_F00Du32.to_le_bytes());
}

#[test]
fn xml_round_trips_byte_for_byte() {
    let input = sample_xml();
    let doc = Document::parse(&input).unwrap();
    let output = doc.serialize(SerializeFlags::empty()).unwrap();
    assert_eq!(output, input);
}

#[test]
fn xml_structure_is_exposed_through_the_document() {
    let input = sample_xml();
    let doc = Document::parse(&input).unwrap();

    let xml = doc.xml_chunks().next().unwrap();
    assert_eq!(xml.string(2), Some("manifest"));
    assert_eq!(xml.resource_map().unwrap().ids(), [0x0101_021B]);
    assert_eq!(xml.nodes().count(), 4);

    let element = xml
        .nodes()
        .find_map(|c| match c {
            Chunk::XmlStartElement(e) => Some(e),
            _ => None,
        })
        .unwrap();
    assert_eq!(xml.string(element.name_index), Some("manifest"));
    let attribute = &element.attributes()[0];
    assert_eq!(xml.string(attribute.name_index), Some("package"));
    assert_eq!(xml.string(attribute.value.data), Some("demo.app"));
}

#[test]
fn multiple_root_chunks_round_trip() {
    let mut input = sample_arsc();
    input.extend_from_slice(&sample_xml());
    input.extend_from_slice(&chunk(0x0300, &[], &le32(&[1, 2, 3])));

    let doc = Document::parse(&input).unwrap();
    assert_eq!(doc.chunks.len(), 3);
    assert_eq!(doc.serialize(SerializeFlags::empty()).unwrap(), input);
}

#[test]
fn styled_pool_round_trips_with_both_sentinel_words() {
    // "<b>hi</b> there" styled with a bold span naming string 1
    let input = styled_string_pool(
        false,
        &["hi there", "b", "plain"],
        &[&[(1, 0, 1)], &[]],
    );

    let doc = Document::parse(&input).unwrap();
    let Chunk::StringPool(pool) = &doc.chunks[0] else {
        panic!("expected a string pool");
    };
    assert_eq!(pool.style_count(), 2);
    assert_eq!(pool.style(0).unwrap().spans.len(), 1);
    assert_eq!(pool.style(0).unwrap().spans[0].name_index, 1);
    assert!(pool.style(1).unwrap().spans.is_empty());

    assert_eq!(doc.serialize(SerializeFlags::empty()).unwrap(), input);
}

#[test]
fn sparse_type_chunk_round_trips() {
    let types = sparse_type_chunk(
        1,
        &default_config(),
        &[
            (3, simple_entry(0, 0, 0x10, 7)),
            (200, simple_entry(0, 0, 0x10, 8)),
        ],
    );
    let pkg = package(
        0x7F,
        "sparse.demo",
        &[
            string_pool(true, &["string"]),
            string_pool(true, &["key"]),
            types,
        ],
        0,
        1,
    );
    let input = table(1, &[string_pool(true, &[]), pkg]);

    let doc = Document::parse(&input).unwrap();
    let table = doc.tables().next().unwrap();
    let t = table.packages().next().unwrap().type_chunks().next().unwrap();
    assert!(t.is_sparse());
    assert_eq!(t.present_entry_count(), 2);
    assert_eq!(t.entry(3).unwrap().value().unwrap().data, 7);
    assert_eq!(t.entry(200).unwrap().value().unwrap().data, 8);
    assert!(t.entry(4).is_none());

    assert_eq!(doc.serialize(SerializeFlags::empty()).unwrap(), input);
}

#[test]
fn library_chunk_round_trips() {
    let pkg = package(
        0x7F,
        "lib.demo",
        &[
            string_pool(true, &[]),
            string_pool(true, &[]),
            library(&[(0x02, "com.example.shared")]),
        ],
        0,
        1,
    );
    let input = table(1, &[string_pool(true, &[]), pkg]);

    let doc = Document::parse(&input).unwrap();
    let table = doc.tables().next().unwrap();
    let lib = table.packages().next().unwrap().library().unwrap();
    assert_eq!(lib.entries()[0].package_id, 2);
    assert_eq!(lib.entries()[0].package_name(), "com.example.shared");

    assert_eq!(doc.serialize(SerializeFlags::empty()).unwrap(), input);
}

#[test]
fn shrink_dedups_and_the_result_stays_deduplicated() {
    // the fixture writes "twice" twice, with strictly increasing offsets
    let pool = string_pool(true, &["twice", "twice", "once"]);
    let doc = Document::parse(&pool).unwrap();

    let Chunk::StringPool(parsed) = &doc.chunks[0] else {
        panic!("expected a string pool");
    };
    assert!(!parsed.is_originally_deduplicated());

    // plain serialization reproduces the duplicated layout
    assert_eq!(doc.serialize(SerializeFlags::empty()).unwrap(), pool);

    let shrunk = doc.serialize(SerializeFlags::SHRINK).unwrap();
    assert!(shrunk.len() < pool.len());

    // once deduplicated, default options must keep the dedup
    let redoc = Document::parse(&shrunk).unwrap();
    let Chunk::StringPool(reparsed) = &redoc.chunks[0] else {
        panic!("expected a string pool");
    };
    assert!(reparsed.is_originally_deduplicated());
    assert_eq!(redoc.serialize(SerializeFlags::empty()).unwrap(), shrunk);
}

#[test]
fn private_resources_strips_public_marks_everywhere() {
    let input = sample_arsc();
    let doc = Document::parse(&input).unwrap();
    let stripped = doc.serialize(SerializeFlags::PRIVATE_RESOURCES).unwrap();

    let redoc = Document::parse(&stripped).unwrap();
    let table = redoc.tables().next().unwrap();
    let pkg = table.packages().next().unwrap();
    assert!(!pkg.type_spec_with_id(1).unwrap().is_public(0));
}

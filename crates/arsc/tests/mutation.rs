//! Mutation scenarios: pool deletion fan-out, key deletion pruning, and
//! XML reference remapping, all starting from parsed fixtures.

mod common;

use std::collections::{BTreeSet, HashMap};

use arsckit::{Chunk, Document, SerializeFlags, ValueType};
use common::*;

fn arsc_with_string_values() -> Vec<u8> {
    let global_pool = string_pool(true, &["alpha", "beta", "gamma"]);
    let type_pool = string_pool(true, &["string"]);
    let key_pool = string_pool(true, &["one", "two", "three"]);
    let types = type_chunk(
        1,
        &default_config(),
        &[
            Some(simple_entry(0, 0, 0x03, 0)),
            Some(simple_entry(0, 1, 0x03, 1)),
            Some(simple_entry(0, 2, 0x03, 2)),
        ],
    );
    let pkg = package(
        0x7F,
        "demo",
        &[type_pool, key_pool, type_spec(1, &[0, 0, 0]), types],
        0,
        1,
    );
    table(1, &[global_pool, pkg])
}

#[test]
fn deleting_global_strings_rewrites_and_nulls_values() {
    let mut doc = Document::parse(&arsc_with_string_values()).unwrap();

    let table = doc.tables_mut().next().unwrap();
    let doomed = BTreeSet::from([1u32]);
    let remap = table.delete_strings(&doomed).unwrap();

    // the remap marks exactly the deleted set
    for (i, slot) in remap.iter().enumerate() {
        assert_eq!(slot.is_none(), doomed.contains(&(i as u32)));
    }
    assert_eq!(table.string_pool().strings(), ["alpha", "gamma"]);

    let pkg = table.packages().next().unwrap();
    let t = pkg.type_chunks().next().unwrap();
    assert_eq!(t.entry(0).unwrap().value().unwrap().data, 0);
    // the deleted string's entry became null but kept its slot
    let nulled = t.entry(1).unwrap().value().unwrap();
    assert_eq!(nulled.value_type, ValueType::Null);
    assert_eq!(t.entry(2).unwrap().value().unwrap().data, 1);
    assert_eq!(t.present_entry_count(), 3);

    // the mutated document still serializes and reparses cleanly
    let bytes = doc.serialize(SerializeFlags::empty()).unwrap();
    let redoc = Document::parse(&bytes).unwrap();
    assert_eq!(redoc.serialize(SerializeFlags::empty()).unwrap(), bytes);
}

#[test]
fn deleting_key_strings_prunes_emptied_types() {
    let mut doc = Document::parse(&arsc_with_string_values()).unwrap();

    let table = doc.tables_mut().next().unwrap();
    let pkg = table.packages_mut().next().unwrap();
    let remap = pkg
        .delete_key_strings(&BTreeSet::from([0u32, 1, 2]))
        .unwrap();
    assert_eq!(remap, vec![None, None, None]);

    // every entry lost its key, so the type chunk and its spec are gone
    assert_eq!(pkg.type_chunks().count(), 0);
    assert_eq!(pkg.type_specs().count(), 0);

    let bytes = doc.serialize(SerializeFlags::empty()).unwrap();
    let redoc = Document::parse(&bytes).unwrap();
    let table = redoc.tables().next().unwrap();
    assert!(table.packages().next().unwrap().key_string_pool().is_empty());
}

#[test]
fn pool_add_and_set_keep_indices_stable() {
    let mut doc = Document::parse(&string_pool(true, &["first"])).unwrap();
    let Chunk::StringPool(pool) = &mut doc.chunks[0] else {
        panic!("expected a string pool");
    };

    assert_eq!(pool.add("second"), 1);
    pool.set(0, "renamed").unwrap();
    assert!(pool.set(9, "nope").is_err());

    let bytes = doc.serialize(SerializeFlags::empty()).unwrap();
    let redoc = Document::parse(&bytes).unwrap();
    let Chunk::StringPool(pool) = &redoc.chunks[0] else {
        panic!("expected a string pool");
    };
    assert_eq!(pool.strings(), ["renamed", "second"]);
}

#[test]
fn xml_reference_remap_survives_serialization() {
    let pool = string_pool(true, &["name", "root"]);
    let element = {
        let mut fields = le32(&[NO_ENTRY, 1]);
        fields.extend_from_slice(&le16(&[20, 20, 1, 0, 0, 0]));
        fields.extend_from_slice(&le32(&[NO_ENTRY, 0, NO_ENTRY]));
        fields.extend_from_slice(&le16(&[8]));
        fields.push(0);
        fields.push(0x01); // reference
        fields.extend_from_slice(&le32(&[0x7F010000]));
        xml_node(0x0102, 1, NO_ENTRY, &fields)
    };
    let element_end = xml_node(0x0103, 2, NO_ENTRY, &le32(&[NO_ENTRY, 1]));

    let mut payload = Vec::new();
    for child in [pool, element, element_end] {
        payload.extend_from_slice(&child);
        pad4(&mut payload);
    }
    let input = chunk(0x0003, &[], &payload);

    let mut doc = Document::parse(&input).unwrap();
    let xml = doc.xml_chunks_mut().next().unwrap();
    xml.remap_references(&HashMap::from([(0x7F010000u32, 0x7F0A0001u32)]));

    let bytes = doc.serialize(SerializeFlags::empty()).unwrap();
    let redoc = Document::parse(&bytes).unwrap();
    let xml = redoc.xml_chunks().next().unwrap();
    let element = xml
        .nodes()
        .find_map(|c| match c {
            Chunk::XmlStartElement(e) => Some(e),
            _ => None,
        })
        .unwrap();
    assert_eq!(element.attributes()[0].value.data, 0x7F0A0001);

    // only the reference word changed
    assert_eq!(bytes.len(), input.len());
}

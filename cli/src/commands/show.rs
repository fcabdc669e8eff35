use std::path::Path;

use anyhow::Result;
use arsckit::SerializeFlags;

use crate::commands::load_document;

pub(crate) fn command_show(path: &Path) -> Result<()> {
    let doc = load_document(path)?;

    for table in doc.tables() {
        println!(
            "resource table: {} strings, {} package(s)",
            table.string_pool().string_count(),
            table.packages().count()
        );

        for package in table.packages() {
            println!(
                "package 0x{:02x} {:?}: {} types, {} specs",
                package.id(),
                package.name(),
                package.type_chunks().count(),
                package.type_specs().count()
            );
            if let Some(library) = package.library() {
                for entry in library.entries() {
                    println!(
                        "  library 0x{:02x} {:?}",
                        entry.package_id,
                        entry.package_name()
                    );
                }
            }

            for t in package.type_chunks() {
                let name = package.type_name(t.id()).unwrap_or("?");
                let layout = if t.is_sparse() { "sparse" } else { "dense" };
                println!(
                    "  type {:#04x} {} [{}] {}: {} entries, {} null",
                    t.id(),
                    name,
                    t.config(),
                    layout,
                    t.total_entry_count(),
                    t.null_entry_count()
                );

                for (index, entry) in t.entries() {
                    let key = package
                        .key_string_pool()
                        .string(entry.key_index)
                        .unwrap_or("?");
                    let public = package
                        .type_spec_with_id(t.id())
                        .is_some_and(|spec| spec.is_public(*index));
                    let marker = if public { " (public)" } else { "" };

                    if entry.is_complex() {
                        println!(
                            "    [{index}] {key}{marker}: complex, {} values, {} bytes",
                            entry.values().len(),
                            entry.size()
                        );
                    } else if let Some(value) = entry.value() {
                        println!(
                            "    [{index}] {key}{marker}: {}",
                            value.format_with(table.string_pool())
                        );
                    }
                }
            }
        }
    }

    for (i, chunk) in doc.chunks.iter().enumerate() {
        println!(
            "root chunk {i}: {:?}, {} bytes",
            chunk.kind(),
            chunk.size(SerializeFlags::empty())?
        );
    }

    Ok(())
}

use std::path::Path;

use anyhow::Result;
use arsckit::{Chunk, StringPoolChunk};

use crate::commands::load_document;

fn dump_pool(label: &str, pool: &StringPoolChunk) {
    let encoding = if pool.is_utf8() { "utf-8" } else { "utf-16" };
    let mut traits = String::new();
    if pool.is_sorted() {
        traits.push_str(", sorted");
    }
    if pool.is_originally_deduplicated() {
        traits.push_str(", deduplicated");
    }
    println!(
        "{label}: {} strings, {} styles ({encoding}{traits})",
        pool.string_count(),
        pool.style_count()
    );

    for (i, s) in pool.strings().iter().enumerate() {
        let spans = pool
            .style(i as u32)
            .map(|style| style.spans.len())
            .unwrap_or(0);
        if spans > 0 {
            println!("  [{i}] {s:?} ({spans} span(s))");
        } else {
            println!("  [{i}] {s:?}");
        }
    }
}

pub(crate) fn command_strings(path: &Path) -> Result<()> {
    let doc = load_document(path)?;

    for chunk in &doc.chunks {
        match chunk {
            Chunk::StringPool(pool) => dump_pool("string pool", pool),
            Chunk::Table(table) => {
                dump_pool("global pool", table.string_pool());
                for package in table.packages() {
                    dump_pool(
                        &format!("{:?} type strings", package.name()),
                        package.type_string_pool(),
                    );
                    dump_pool(
                        &format!("{:?} key strings", package.name()),
                        package.key_string_pool(),
                    );
                }
            }
            Chunk::Xml(xml) => {
                if let Some(pool) = xml.string_pool() {
                    dump_pool("xml pool", pool);
                }
            }
            _ => {}
        }
    }

    Ok(())
}

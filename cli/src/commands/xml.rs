use std::path::Path;

use anyhow::{Result, bail};
use arsckit::{Chunk, XmlChunk};

use crate::commands::load_document;

fn dump_document(xml: &XmlChunk) {
    let pool = match xml.string_pool() {
        Some(pool) => pool,
        None => {
            println!("(document without a string pool)");
            return;
        }
    };

    let mut depth = 0usize;
    for node in xml.nodes() {
        match node {
            Chunk::XmlStartNamespace(ns) => {
                let prefix = xml.string(ns.prefix_index).unwrap_or("");
                let uri = xml.string(ns.uri_index).unwrap_or("");
                println!("{}xmlns:{prefix}={uri:?}", "  ".repeat(depth));
            }
            Chunk::XmlStartElement(element) => {
                let name = xml.string(element.name_index).unwrap_or("?");
                print!("{}<{name}", "  ".repeat(depth));
                for attribute in element.attributes() {
                    let attr_name = xml.string(attribute.name_index).unwrap_or("?");
                    print!(" {attr_name}={:?}", attribute.value.format_with(pool));
                }
                println!("> (line {})", element.line);
                depth += 1;
            }
            Chunk::XmlCdata(cdata) => {
                let text = xml.string(cdata.data_index).unwrap_or("");
                println!("{}{text:?}", "  ".repeat(depth));
            }
            Chunk::XmlEndElement(end) => {
                depth = depth.saturating_sub(1);
                let name = xml.string(end.name_index).unwrap_or("?");
                println!("{}</{name}>", "  ".repeat(depth));
            }
            Chunk::XmlEndNamespace(_) => {}
            _ => {}
        }
    }
}

pub(crate) fn command_xml(path: &Path) -> Result<()> {
    let doc = load_document(path)?;

    let mut seen = false;
    for xml in doc.xml_chunks() {
        dump_document(xml);
        seen = true;
    }
    if !seen {
        bail!("{:?} holds no compiled XML chunk", path);
    }

    Ok(())
}

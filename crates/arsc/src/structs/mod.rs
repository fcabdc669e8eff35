pub mod config;
pub mod library;
pub mod package;
pub mod string_pool;
pub mod table;
pub mod type_chunk;
pub mod type_spec;
pub mod value;
pub mod xml;

pub use config::ResConfig;
pub use library::{LibraryChunk, LibraryEntry};
pub use package::PackageChunk;
pub use string_pool::{PoolFlags, StringPoolChunk, Style, StyleSpan};
pub use table::TableChunk;
pub use type_chunk::{Entry, EntryFlags, EntryKind, TypeChunk, TypeFlags};
pub use type_spec::{SPEC_PUBLIC, TypeSpecChunk};
pub use value::{ResValue, ResourceId, ValueType};
pub use xml::{
    XmlAttribute, XmlCdataChunk, XmlChunk, XmlElementChunk, XmlElementEndChunk, XmlNamespaceChunk,
    XmlResourceMapChunk,
};

/// Decodes a fixed-width UTF-16 LE field up to the first NUL. Package and
/// library names are stored this way.
pub(crate) fn decode_fixed_utf16(raw: &[u8]) -> String {
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
        .take_while(|&unit| unit != 0)
        .collect();

    String::from_utf16(&units).unwrap_or_default()
}

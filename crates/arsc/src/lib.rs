//! Parser, editor and byte-exact re-serializer for compiled Android
//! resource containers: `resources.arsc`, `AndroidManifest.xml` and every
//! compiled `res/*.xml`.
//!
//! A [`Document`] is the ordered sequence of root chunks parsed from a byte
//! slice. Under default options, serializing an untouched document
//! reproduces the input byte for byte; the [`SerializeFlags`] options add
//! content deduplication and public-bit stripping on top.

pub mod chunk;
pub mod errors;
mod strings;
pub mod structs;

pub use chunk::{Chunk, ChunkKind, Document, NO_ENTRY, RawChunk, SerializeFlags};
pub use errors::ChunkError;
pub use structs::{
    Entry, EntryKind, PackageChunk, ResConfig, ResValue, ResourceId, StringPoolChunk, Style,
    StyleSpan, TableChunk, TypeChunk, TypeSpecChunk, ValueType, XmlAttribute, XmlChunk,
    XmlElementChunk,
};

pub(crate) mod roundtrip;
pub(crate) mod show;
pub(crate) mod strings;
pub(crate) mod xml;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use arsckit::Document;

pub(crate) fn load_document(path: &Path) -> Result<Document> {
    let bytes = fs::read(path).with_context(|| format!("cannot read {:?}", path))?;
    Document::parse(&bytes).with_context(|| format!("cannot parse {:?}", path))
}

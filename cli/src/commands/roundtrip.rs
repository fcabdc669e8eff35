use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use arsckit::{Document, SerializeFlags};
use log::info;

pub(crate) fn command_roundtrip(paths: &[PathBuf]) -> Result<()> {
    let mut failures = 0usize;

    for path in paths {
        let input = fs::read(path).with_context(|| format!("cannot read {:?}", path))?;
        let doc = Document::parse(&input).with_context(|| format!("cannot parse {:?}", path))?;
        let output = doc
            .serialize(SerializeFlags::empty())
            .with_context(|| format!("cannot serialize {:?}", path))?;

        if input == output {
            info!("{:?}: {} bytes, identical", path, input.len());
            println!("{}: ok", path.display());
        } else {
            let at = input
                .iter()
                .zip(&output)
                .position(|(a, b)| a != b)
                .unwrap_or_else(|| input.len().min(output.len()));
            println!(
                "{}: MISMATCH at offset {at:#x} ({} bytes in, {} bytes out)",
                path.display(),
                input.len(),
                output.len()
            );
            failures += 1;
        }
    }

    if failures > 0 {
        bail!("{failures} file(s) did not round-trip");
    }
    Ok(())
}

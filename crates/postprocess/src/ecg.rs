//! ECG conversion: drops timestamps, keeping one value per line.
use anyhow::{Context, Result};
use log::info;
use std::io::{BufRead, Write};

use config::IngestConfig;
use storage::ObjectStore;

/// Output name for a gap-filled segment: every `csv` becomes `ecg`.
#[must_use]
pub fn ecg_name(csv_name: &str) -> String {
    csv_name.replace("csv", "ecg")
}

/// Copies the second comma field of every line from `reader` to `out`.
///
/// The field keeps its own line terminator. Lines that are exactly `"\n"`
/// are skipped; lines without a comma produce nothing. Returns the number of
/// lines written.
pub fn strip_timestamps<R: BufRead, W: Write + ?Sized>(mut reader: R, out: &mut W) -> Result<usize> {
    let mut line = String::new();
    let mut written = 0;
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        if line == "\n" {
            continue;
        }
        if let Some(value) = line.split(',').nth(1) {
            out.write_all(value.as_bytes())?;
            written += 1;
        }
    }
    out.flush()?;
    Ok(written)
}

/// Converts `container/name` into an ECG object in the configured ECG
/// container. Returns the output name.
pub fn convert_to_ecg(
    store: &dyn ObjectStore,
    config: &IngestConfig,
    container: &str,
    name: &str,
) -> Result<String> {
    let reader = store
        .open_reader(container, name)
        .with_context(|| format!("failed to open {}/{}", container, name))?;
    let out_name = ecg_name(name);
    let mut writer = store
        .open_writer(&config.ecg_container, &out_name)
        .with_context(|| format!("failed to open {}/{}", config.ecg_container, out_name))?;

    let lines = strip_timestamps(reader, writer.as_mut())
        .with_context(|| format!("failed to convert {}/{}", container, name))?;
    writer.finish()?;

    info!(
        "converted {}/{} -> {}/{} ({} values)",
        container, name, config.ecg_container, out_name, lines
    );
    Ok(out_name)
}

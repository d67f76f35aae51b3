//! Shared plumbing for the append-only CSV logs.

use std::path::Path;

use anyhow::{anyhow, Context};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Create `path` (and its parent directory) holding only `header` when it is missing or empty.
pub(crate) async fn ensure_with_header(path: &Path, header: &[&str]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
    }

    if fs::try_exists(path)
        .await
        .with_context(|| format!("checking {}", path.display()))?
    {
        let meta = fs::metadata(path)
            .await
            .with_context(|| format!("reading metadata of {}", path.display()))?;
        if meta.len() > 0 {
            return Ok(());
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(header)
        .context("encoding csv header")?;
    let bytes = writer
        .into_inner()
        .map_err(|err| anyhow!("flushing csv header buffer: {err}"))?;
    fs::write(path, bytes)
        .await
        .with_context(|| format!("writing header to {}", path.display()))
}

/// Append `rows` to `path` without a header.
pub(crate) async fn append_rows<T: Serialize>(path: &Path, rows: &[T]) -> anyhow::Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    for row in rows {
        writer.serialize(row).context("encoding csv row")?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| anyhow!("flushing csv row buffer: {err}"))?;

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("opening {} for append", path.display()))?;
    file.write_all(&bytes)
        .await
        .with_context(|| format!("appending to {}", path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing {}", path.display()))?;
    Ok(())
}

/// Read every well-formed row of `path`. Malformed lines are logged and skipped;
/// a missing file reads as empty.
pub(crate) async fn read_rows<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    if !fs::try_exists(path)
        .await
        .with_context(|| format!("checking {}", path.display()))?
    {
        return Ok(Vec::new());
    }

    let bytes = fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes.as_slice());

    let mut rows = Vec::new();
    for (index, record) in reader.deserialize::<T>().enumerate() {
        match record {
            Ok(row) => rows.push(row),
            Err(err) => warn!(
                path = %path.display(),
                line = index + 2,
                error = %err,
                "skipping malformed csv row"
            ),
        }
    }
    Ok(rows)
}

/// Lenient boolean cell parsing; accepts the `True`/`False` spelling older logs use.
pub(crate) fn parse_flag(cell: Option<&str>) -> Option<bool> {
    match cell?.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

pub(crate) fn format_flag(value: Option<bool>) -> Option<String> {
    value.map(|v| v.to_string())
}

//! Atomic JSONL writing.
//!
//! Writes go to a sibling `.tmp` file which is renamed over the target once
//! fully flushed. Renames within one filesystem are atomic on POSIX, so the
//! target is never observed half-written; a crash leaves at worst a stale
//! `.tmp` alongside the intact previous file.

use crate::error::Result;
use serde::Serialize;
use std::path::Path;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};

/// Atomically write `values` to `path`, one JSON document per line.
///
/// The previous contents of `path` (if any) are replaced only after the new
/// contents are fully written and flushed.
pub async fn write_jsonl_atomic<T, P>(path: P, values: &[T]) -> Result<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let tmp_path = path.with_extension("tmp");

    let file = File::create(&tmp_path).await?;
    let mut writer = BufWriter::new(file);

    for value in values {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
    }

    writer.flush().await?;
    writer.into_inner().sync_all().await?;

    fs::rename(&tmp_path, path).await?;
    Ok(())
}

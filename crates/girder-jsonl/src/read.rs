//! Resilient line-by-line JSONL reading.

use crate::error::Result;
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

/// A non-fatal problem encountered while reading a JSONL file.
///
/// The offending line is skipped and reading continues; callers decide
/// whether to surface the warning to the user or just log it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// 1-based line number of the problem line.
    pub line_number: usize,
    /// Description of why the line could not be used.
    pub reason: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line_number, self.reason)
    }
}

/// Read a JSONL file, deserializing each non-empty line as a `T`.
///
/// Lines that fail to parse are skipped and reported as [`Warning`]s rather
/// than failing the whole read. Blank lines are ignored silently. An IO
/// failure (file missing, permission) is still a hard error.
pub async fn read_jsonl_resilient<T, P>(path: P) -> Result<(Vec<T>, Vec<Warning>)>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref()).await?;
    let mut lines = BufReader::new(file).lines();

    let mut records = Vec::new();
    let mut warnings = Vec::new();
    let mut line_number = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<T>(trimmed) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(line = line_number, error = %e, "skipping malformed JSONL line");
                warnings.push(Warning {
                    line_number,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok((records, warnings))
}

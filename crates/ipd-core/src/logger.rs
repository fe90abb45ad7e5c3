//! Append-only JSON Lines event sink for round records.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{CoreError, Result};
use crate::transcript::RoundRecord;

/// Writes [`RoundRecord`]s to `<output_dir>/rounds.jsonl`, one JSON object
/// per line.
///
/// A single `Mutex<BufWriter<File>>` serializes writes: replicates may run
/// on separate threads, but each round record is appended atomically, with
/// no interleaving within a line. Ordering between concurrent workers is
/// not guaranteed and is not required — every record carries full context
/// keys (§5).
pub struct RoundLogger {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl RoundLogger {
    /// Open (creating if absent, appending if present) `<output_dir>/rounds.jsonl`.
    pub fn open(output_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(output_dir)?;
        let path = output_dir.join("rounds.jsonl");
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    /// The path this logger writes to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one round record as a single JSON line, then flush.
    pub fn log_round(&self, record: &RoundRecord) -> Result<()> {
        let line = serde_json::to_string(record).map_err(|e| CoreError::Config(e.to_string()))?;
        let mut guard = self
            .writer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.write_all(line.as_bytes())?;
        guard.write_all(b"\n")?;
        guard.flush()?;
        Ok(())
    }
}

/// Read every round record from `<output_dir>/rounds.jsonl`, in file order.
pub fn load_rounds_jsonl(path: &Path) -> Result<Vec<RoundRecord>> {
    let contents = std::fs::read_to_string(path)?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| CoreError::Aggregation {
                offset: i as u64,
                reason: e.to_string(),
            })
        })
        .collect()
}

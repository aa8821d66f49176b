//! JSONL audit writer with daily file rotation.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDate;

use super::{AuditEntry, AuditLogger};
use crate::{AppError, Result};

struct OpenFile {
    date: NaiveDate,
    writer: BufWriter<File>,
}

/// Appends one JSON object per line to `<dir>/audit-YYYY-MM-DD.jsonl`.
///
/// The file is chosen by the entry's own timestamp (UTC date), so a new
/// file starts with the first entry of each day.
pub struct JsonlAuditWriter {
    dir: PathBuf,
    current: Mutex<Option<OpenFile>>,
}

impl JsonlAuditWriter {
    /// Writer storing files in `dir`, which is created if missing.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory cannot be created.
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).map_err(|err| {
            AppError::Io(format!(
                "failed to create audit directory {}: {err}",
                dir.display()
            ))
        })?;
        Ok(Self {
            dir,
            current: Mutex::new(None),
        })
    }

    /// Path of the file holding entries for `date`.
    #[must_use]
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("audit-{date}.jsonl"))
    }

    fn open(path: &Path) -> Result<BufWriter<File>> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| AppError::Io(format!("failed to open {}: {err}", path.display())))?;
        Ok(BufWriter::new(file))
    }
}

impl AuditLogger for JsonlAuditWriter {
    fn log_entry(&self, entry: AuditEntry) -> Result<()> {
        let date = entry.timestamp.date_naive();
        let line = serde_json::to_string(&entry)
            .map_err(|err| AppError::Io(format!("failed to encode audit entry: {err}")))?;

        let mut guard = self
            .current
            .lock()
            .map_err(|_| AppError::Io("audit writer lock poisoned".into()))?;

        if guard.as_ref().is_none_or(|open| open.date != date) {
            *guard = Some(OpenFile {
                date,
                writer: Self::open(&self.path_for(date))?,
            });
        }

        if let Some(open) = guard.as_mut() {
            writeln!(open.writer, "{line}")
                .and_then(|()| open.writer.flush())
                .map_err(|err| AppError::Io(format!("audit write failed: {err}")))?;
        }
        Ok(())
    }
}

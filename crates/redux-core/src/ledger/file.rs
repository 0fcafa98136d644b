use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ReduxError, Result};
use crate::frame::FrameType;

use super::table::Table;
use super::{Ledger, NearestQuery, Record};

/// Ledger persisted as JSON lines, one record per line, in sequence order.
///
/// Appends are written through immediately. When a write fails the row stays
/// in memory and in the pending queue, and is retried on the next append or
/// explicit [`flush`](Ledger::flush).
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    table: Table,
    pending: Vec<Record>,
}

impl FileLedger {
    /// Open the ledger at `path`, loading existing rows. A missing file is an
    /// empty ledger; the file is created on first append.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let rows = if path.exists() {
            let (rows, torn_at) = read_rows(&path)?;
            if let Some(len) = torn_at {
                OpenOptions::new().write(true).open(&path)?.set_len(len)?;
            }
            rows
        } else {
            Vec::new()
        };
        info!(path = %path.display(), rows = rows.len(), "Opened ledger");
        Ok(Self {
            path,
            state: Mutex::new(State {
                table: Table::from_rows(rows),
                pending: Vec::new(),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended in memory but not yet on disk.
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }
}

/// Parse every row. An unterminated last line that does not parse is a torn
/// write: it is dropped and its offset returned so the caller can cut it off.
fn read_rows(path: &Path) -> Result<(Vec<Record>, Option<u64>)> {
    let contents = fs::read_to_string(path)?;
    let (body, tail) = match contents.rfind('\n') {
        Some(i) => contents.split_at(i + 1),
        None => ("", contents.as_str()),
    };

    let mut rows = body
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| ReduxError::CorruptLedger {
                line: i + 1,
                message: e.to_string(),
            })
        })
        .collect::<Result<Vec<Record>>>()?;

    let mut torn_at = None;
    if !tail.trim().is_empty() {
        match serde_json::from_str(tail) {
            Ok(record) => rows.push(record),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    bytes = tail.len(),
                    error = %e,
                    "Dropping torn ledger tail"
                );
                torn_at = Some(body.len() as u64);
            }
        }
    }
    Ok((rows, torn_at))
}

/// Does the file end mid-line? A complete last row may lack its newline.
fn ends_mid_line(file: &mut File, len: u64) -> Result<bool> {
    if len == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Append `pending` in one write. On failure the file is cut back to its
/// previous length so no partial row is left behind.
fn write_pending(path: &Path, pending: &[Record]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;
    let start = file.metadata()?.len();

    let mut buf = Vec::new();
    if ends_mid_line(&mut file, start)? {
        buf.push(b'\n');
    }
    for record in pending {
        serde_json::to_writer(&mut buf, record)?;
        buf.push(b'\n');
    }

    if let Err(e) = file.write_all(&buf).and_then(|()| file.sync_data()) {
        if let Err(cut) = file.set_len(start) {
            warn!(path = %path.display(), error = %cut, "Could not cut back partial ledger write");
        }
        return Err(e.into());
    }
    Ok(())
}

impl State {
    fn flush_to(&mut self, path: &Path) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        write_pending(path, &self.pending)?;
        debug!(rows = self.pending.len(), "Ledger rows persisted");
        self.pending.clear();
        Ok(())
    }
}

impl Ledger for FileLedger {
    fn contains(&self, frame: &str, stage: &str) -> bool {
        self.state.lock().table.contains(frame, stage)
    }

    fn append(&self, record: Record) -> Result<u64> {
        let mut state = self.state.lock();
        let stored = state.table.push(record);
        let seq = stored.seq;
        state.pending.push(stored);
        if let Err(e) = state.flush_to(&self.path) {
            warn!(
                path = %self.path.display(),
                pending = state.pending.len(),
                error = %e,
                "Ledger write failed; rows kept for retry"
            );
            return Err(e);
        }
        Ok(seq)
    }

    fn nearest_of_type(&self, frame_type: FrameType, query: &NearestQuery<'_>) -> Option<Record> {
        self.state.lock().table.nearest_of_type(frame_type, query)
    }

    fn count_of_type(&self, frame_type: FrameType, group: &str) -> usize {
        self.state.lock().table.count_of_type(frame_type, group)
    }

    fn records_for(&self, frame: &str) -> Vec<Record> {
        self.state.lock().table.records_for(frame)
    }

    fn records(&self) -> Vec<Record> {
        self.state.lock().table.rows().to_vec()
    }

    fn flush(&self) -> Result<()> {
        self.state.lock().flush_to(&self.path)
    }

    fn len(&self) -> usize {
        self.state.lock().table.rows().len()
    }
}

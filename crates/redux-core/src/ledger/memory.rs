use parking_lot::RwLock;

use crate::error::Result;
use crate::frame::FrameType;

use super::table::Table;
use super::{Ledger, NearestQuery, Record};

/// Process-local ledger with no backing file.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    table: RwLock<Table>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a ledger with rows, numbered in the order given.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let mut table = Table::default();
        for record in records {
            table.push(record);
        }
        Self {
            table: RwLock::new(table),
        }
    }
}

impl Ledger for MemoryLedger {
    fn contains(&self, frame: &str, stage: &str) -> bool {
        self.table.read().contains(frame, stage)
    }

    fn append(&self, record: Record) -> Result<u64> {
        Ok(self.table.write().push(record).seq)
    }

    fn nearest_of_type(&self, frame_type: FrameType, query: &NearestQuery<'_>) -> Option<Record> {
        self.table.read().nearest_of_type(frame_type, query)
    }

    fn count_of_type(&self, frame_type: FrameType, group: &str) -> usize {
        self.table.read().count_of_type(frame_type, group)
    }

    fn records_for(&self, frame: &str) -> Vec<Record> {
        self.table.read().records_for(frame)
    }

    fn records(&self) -> Vec<Record> {
        self.table.read().rows().to_vec()
    }

    fn len(&self) -> usize {
        self.table.read().rows().len()
    }
}

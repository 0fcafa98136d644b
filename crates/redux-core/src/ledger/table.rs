use std::collections::HashSet;

use crate::frame::FrameType;

use super::{NearestQuery, Record};

/// Row storage and queries shared by the ledger implementations.
/// Callers provide the locking.
#[derive(Debug, Default)]
pub(super) struct Table {
    rows: Vec<Record>,
    next_seq: u64,
}

impl Table {
    pub(super) fn from_rows(mut rows: Vec<Record>) -> Self {
        rows.sort_by_key(|r| r.seq);
        // A retried partial write can leave the same row on disk twice.
        rows.dedup_by_key(|r| r.seq);
        let next_seq = rows.last().map_or(0, |r| r.seq + 1);
        Self { rows, next_seq }
    }

    /// Assign the next sequence key and store the row.
    pub(super) fn push(&mut self, mut record: Record) -> Record {
        record.seq = self.next_seq;
        self.next_seq += 1;
        self.rows.push(record.clone());
        record
    }

    pub(super) fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub(super) fn contains(&self, frame: &str, stage: &str) -> bool {
        self.rows.iter().any(|r| r.frame == frame && r.stage == stage)
    }

    pub(super) fn records_for(&self, frame: &str) -> Vec<Record> {
        self.rows.iter().filter(|r| r.frame == frame).cloned().collect()
    }

    pub(super) fn count_of_type(&self, frame_type: FrameType, group: &str) -> usize {
        self.rows
            .iter()
            .filter(|r| r.frame_type == frame_type && r.group == group)
            .map(|r| r.frame.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    pub(super) fn nearest_of_type(
        &self,
        frame_type: FrameType,
        query: &NearestQuery<'_>,
    ) -> Option<Record> {
        // Rows are already in sequence order.
        let candidates: Vec<&Record> = self
            .rows
            .iter()
            .filter(|r| r.frame_type == frame_type)
            .filter(|r| query.group.map_or(true, |g| r.group == g))
            .filter(|r| match (query.camera, r.camera.as_deref()) {
                (Some(wanted), Some(camera)) => wanted.eq_ignore_ascii_case(camera),
                _ => true,
            })
            .filter(|r| query.before_seq.map_or(true, |s| r.seq <= s))
            .collect();

        if let Some(target) = query.near_mjd {
            // Later rows win ties, so `min_by` runs over the reversed list.
            let closest = candidates
                .iter()
                .rev()
                .filter_map(|r| r.mjd.map(|m| (*r, (m - target).abs())))
                .min_by(|a, b| a.1.total_cmp(&b.1));
            if let Some((record, _)) = closest {
                return Some(record.clone());
            }
        }

        candidates.last().map(|r| (*r).clone())
    }
}

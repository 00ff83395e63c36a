/* ╔═════════════════════════════════════════════════════════════════════════╗
   ║ Module: ring                                                            ║
   ╟─────────────────────────────────────────────────────────────────────────╢
   ║ Descr.: Fixed-capacity, most-recent-wins ring of ErrorRecord slots.     ║
   ║         Not a queue: overwriting old slots is intentional.              ║
   ╚═════════════════════════════════════════════════════════════════════════╝
*/
use crate::record::ErrorRecord;

/// Whether a `record()` call wrapped the cursor back to slot 0.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum WriteOutcome {
    BlockNotFull,
    BlockFull,
}

/// The RAM ring: `N` fixed slots plus a write cursor. `N` is 64 when the
/// `persist` feature is off, or the records-per-block count when it is on
/// (the ring doubles as the in-memory mirror of the current persisted
/// block in that case).
pub struct RecordStore<const N: usize> {
    records: [ErrorRecord; N],
    next_idx: usize,
}

impl<const N: usize> RecordStore<N> {
    pub const fn new() -> RecordStore<N> {
        RecordStore {
            records: [ErrorRecord::EMPTY; N],
            next_idx: 0,
        }
    }

    /// Zero the ring and reset the cursor. Called from `init()` and from
    /// the block-wrap path when persistence clears the record array.
    pub fn clear(&mut self) {
        self.records = [ErrorRecord::EMPTY; N];
        self.next_idx = 0;
    }

    pub fn next_idx(&self) -> usize {
        self.next_idx
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn records(&self) -> &[ErrorRecord; N] {
        &self.records
    }

    /// Write one record at the cursor, advance it, and report whether the
    /// cursor wrapped back to 0. Overwrites whatever was at that slot; no
    /// explicit clearing of older slots is needed since `valid` is
    /// re-stamped on every write.
    pub fn record(&mut self, record: ErrorRecord) -> WriteOutcome {
        self.records[self.next_idx] = record;
        self.next_idx += 1;
        if self.next_idx >= N {
            self.next_idx = 0;
            WriteOutcome::BlockFull
        } else {
            WriteOutcome::BlockNotFull
        }
    }

    /// Iterate valid records from most-recently-written to oldest,
    /// stopping at the first empty slot (the RAM-only replay order).
    pub fn iter_newest_first(&self) -> NewestFirst<'_, N> {
        NewestFirst {
            store: self,
            remaining: N,
            idx: self.next_idx,
            done: false,
        }
    }
}

impl<const N: usize> Default for RecordStore<N> {
    fn default() -> Self {
        RecordStore::new()
    }
}

pub struct NewestFirst<'a, const N: usize> {
    store: &'a RecordStore<N>,
    remaining: usize,
    idx: usize,
    done: bool,
}

impl<'a, const N: usize> Iterator for NewestFirst<'a, N> {
    type Item = ErrorRecord;

    fn next(&mut self) -> Option<ErrorRecord> {
        if self.done || self.remaining == 0 {
            return None;
        }
        self.idx = if self.idx == 0 { N - 1 } else { self.idx - 1 };
        self.remaining -= 1;
        let record = self.store.records[self.idx];
        if !record.is_valid() {
            self.done = true;
            return None;
        }
        Some(record)
    }
}

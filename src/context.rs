/* ╔═════════════════════════════════════════════════════════════════════════╗
   ║ Module: context                                                         ║
   ╟─────────────────────────────────────────────────────────────────────────╢
   ║ Descr.: Owns every piece of state the original firmware kept as        ║
   ║         process-wide globals: the RAM ring, the persistence cursor,    ║
   ║         the decoder table and the log-level threshold. Constructed     ║
   ║         once by the host firmware and passed to every call site        ║
   ║         instead of being reached for through statics.                  ║
   ╚═════════════════════════════════════════════════════════════════════════╝
*/
use crate::config::{DECODE_BUF_LEN, ERR_LEV_WARNING, RAM_ONLY_CAPACITY};
use crate::decoder::{DecodeFlags, DecodeFn, DecoderRegistry};
use crate::linebuf::LineBuf;
use crate::record::{ErrorRecord, Severity};
use crate::ring::RecordStore;
use crate::traits::{ConsoleSink, TickSource};
use core::fmt::Write;
use core::sync::atomic::{AtomicU8, Ordering};
use spin::{Mutex, MutexGuard, RwLock};

#[cfg(feature = "persist")]
use crate::block::{self, AddressRange, Block, ParsedBlock, RECORDS_PER_BLOCK};
#[cfg(feature = "persist")]
use crate::traits::{BlockStorage, BufferLease, TransferBuffer};
#[cfg(feature = "persist")]
use log::warn;

/// RAM ring capacity: the records-per-block count when persistence is
/// compiled in (the ring mirrors the current block), or a fixed 64 when it
/// is not.
#[cfg(feature = "persist")]
pub const RING_CAPACITY: usize = RECORDS_PER_BLOCK;
#[cfg(not(feature = "persist"))]
pub const RING_CAPACITY: usize = RAM_ONLY_CAPACITY;

#[cfg(feature = "persist")]
struct PersistState {
    range: AddressRange,
    current_block: u16,
    number: u16,
    running: bool,
}

#[cfg(feature = "persist")]
impl PersistState {
    const fn new() -> PersistState {
        PersistState {
            range: AddressRange::new(crate::config::ERR_ADDR_START, crate::config::ERR_ADDR_END),
            current_block: crate::config::ERR_ADDR_START,
            number: 0,
            running: false,
        }
    }
}

pub(crate) struct Inner {
    pub(crate) ring: RecordStore<RING_CAPACITY>,
    #[cfg(feature = "persist")]
    persist: PersistState,
}

/// The diagnostic log core. One instance is constructed by the host
/// firmware at startup and threaded through to every caller; it replaces
/// the globals the original C implementation relied on.
pub struct ErrorLog {
    pub(crate) inner: Mutex<Inner>,
    pub(crate) decoders: RwLock<DecoderRegistry>,
    level: AtomicU8,
}

impl ErrorLog {
    /// Construct a freshly zeroed log: empty ring, no decoders registered,
    /// log level at the default `Warning` band, persistence (if compiled
    /// in) not yet running.
    pub const fn new() -> ErrorLog {
        ErrorLog {
            inner: Mutex::new(Inner {
                ring: RecordStore::new(),
                #[cfg(feature = "persist")]
                persist: PersistState::new(),
            }),
            decoders: RwLock::new(DecoderRegistry::new()),
            level: AtomicU8::new(ERR_LEV_WARNING),
        }
    }

    /// Install a decoder for `[min, max]`. See [`DecoderRegistry::register`].
    pub fn register_decoder(
        &self,
        min: u16,
        max: u16,
        callback: DecodeFn,
        flags: DecodeFlags,
    ) -> crate::error::Result<()> {
        self.decoders.write().register(min, max, callback, flags)
    }

    /// Replace the log-level threshold, returning the previous value. Uses
    /// sequentially-consistent atomics rather than the ring mutex, since
    /// the threshold is read far more often than it is written.
    pub fn set_level(&self, new_level: u8) -> u8 {
        self.level.swap(new_level, Ordering::SeqCst)
    }

    pub fn level(&self) -> u8 {
        self.level.load(Ordering::SeqCst)
    }

    /// Record `(level, source, err, argument)` if it meets the current
    /// threshold, optionally echoing a formatted line to `console`.
    /// Available when the `persist` feature is disabled; see the
    /// `persist`-enabled overload below for the durable variant.
    ///
    /// Suspends while acquiring the ring mutex. Not safe to call from
    /// interrupt context; route those callers through a deferred queue.
    #[cfg(not(feature = "persist"))]
    pub fn report(
        &self,
        level: u8,
        source: u16,
        err: i32,
        argument: u16,
        ticker: &dyn TickSource,
        console: Option<&dyn ConsoleSink>,
    ) {
        let Some(record) = self.record_if_above_threshold(level, source, err, argument, ticker)
        else {
            return;
        };
        if let Some(console) = console {
            self.print_one(record, console);
        }
    }

    /// Record `(level, source, err, argument)` if it meets the current
    /// threshold, mirroring it into `storage` when persistence is running,
    /// and optionally echoing a formatted line to `console`.
    ///
    /// Suspends while acquiring the ring mutex and, if persistence is
    /// running, while writing the block. Not safe to call from interrupt
    /// context; route those callers through a deferred queue.
    #[cfg(feature = "persist")]
    pub fn report(
        &self,
        level: u8,
        source: u16,
        err: i32,
        argument: u16,
        ticker: &dyn TickSource,
        console: Option<&dyn ConsoleSink>,
        storage: Option<&dyn BlockStorage>,
    ) {
        if level < self.level() {
            return;
        }
        let time = ticker.now();
        let record = ErrorRecord::new(level, source, err, argument, time);

        let Some(mut inner) = self.inner.try_lock() else {
            return;
        };
        inner.ring.record(record);
        if let Some(storage) = storage {
            self.persist_after_record(&mut inner, storage);
        }
        drop(inner);

        if let Some(console) = console {
            self.print_one(record, console);
        }
    }

    #[cfg(not(feature = "persist"))]
    fn record_if_above_threshold(
        &self,
        level: u8,
        source: u16,
        err: i32,
        argument: u16,
        ticker: &dyn TickSource,
    ) -> Option<ErrorRecord> {
        if level < self.level() {
            return None;
        }
        let time = ticker.now();
        let record = ErrorRecord::new(level, source, err, argument, time);

        // Mutex-acquisition failure: drop the record silently. This is the
        // only silent-loss path and is tolerated because the ring is a
        // best-effort diagnostic, not an audit log.
        let mut inner = self.inner.try_lock()?;
        inner.ring.record(record);
        Some(record)
    }

    #[cfg(feature = "persist")]
    fn persist_after_record(&self, inner: &mut Inner, storage: &dyn BlockStorage) {
        if !inner.persist.running {
            return;
        }
        let mut block = Block::new();
        block.number = inner.persist.number;
        block.records.copy_from_slice(inner.ring.records());
        let bytes = block.to_bytes();

        // A write failure here is absorbed: the record is already safe in
        // RAM, only its durability is affected.
        if let Err(e) = storage.write_block(inner.persist.current_block, &bytes) {
            warn!("error log: block write failed: {:?}", e);
        }

        if inner.ring.next_idx() == 0 {
            inner.persist.current_block = inner.persist.range.next(inner.persist.current_block);
            inner.persist.number += 1;
            inner.ring.clear();
        }
    }

    fn print_one(&self, record: ErrorRecord, console: &dyn ConsoleSink) {
        let mut decode_buf = [0u8; DECODE_BUF_LEN];
        let text = self.decoders.read().decode(
            &mut decode_buf,
            record.source,
            record.err,
            record.argument,
            DecodeFlags::NONE,
        );
        let severity = Severity::from_level(record.level);
        let mut storage = [0u8; DECODE_BUF_LEN + 40];
        let mut line = LineBuf::new(&mut storage);
        let _ = write!(
            line,
            "{}:{}({}) : {}",
            record.time,
            severity.label(),
            record.level,
            text
        );
        console.write_line(line.as_str());
    }

    pub(crate) fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock()
    }
}

#[cfg(feature = "persist")]
impl ErrorLog {
    /// Scan `[ERR_ADDR_START, ERR_ADDR_END)` for the newest valid block,
    /// resume numbering after it, write a fresh empty block there, and set
    /// `running = true`. Any storage/lock/buffer failure is logged and
    /// absorbed: `running` stays `false`, so subsequent reports stay
    /// RAM-only.
    pub fn recording_start(
        &self,
        storage: &dyn BlockStorage,
        buffer: &dyn TransferBuffer,
        lock_timeout_ms: Option<u32>,
        buffer_timeout_ms: u32,
    ) {
        if let Err(e) = storage.lock(lock_timeout_ms) {
            warn!("error log: could not lock storage for recording_start: {:?}", e);
            return;
        }

        let outcome = self.scan_and_seed(storage, buffer, buffer_timeout_ms);
        storage.unlock();

        match outcome {
            Some((current_block, number)) => {
                let mut inner = self.inner.lock();
                inner.persist.current_block = current_block;
                inner.persist.number = number;
                inner.persist.running = true;
                inner.ring.clear();
            }
            None => warn!("error log: recording_start could not seed an initial block"),
        }
    }

    fn scan_and_seed(
        &self,
        storage: &dyn BlockStorage,
        buffer: &dyn TransferBuffer,
        buffer_timeout_ms: u32,
    ) -> Option<(u16, u16)> {
        let Some(mut lease) = BufferLease::acquire(buffer, buffer_timeout_ms) else {
            warn!("error log: could not acquire transfer buffer for recording_start");
            return None;
        };

        let range = AddressRange::new(crate::config::ERR_ADDR_START, crate::config::ERR_ADDR_END);
        let mut found: Option<(u16, u16)> = None; // (addr, number)

        for addr in range.start..range.end {
            if storage.read_block(addr, lease.buf()).is_err() {
                continue;
            }
            if let ParsedBlock::Valid { number, .. } = block::parse(lease.buf()) {
                let better = match found {
                    // Later-scanned block wins ties.
                    Some((_, best_number)) => number >= best_number,
                    None => true,
                };
                if better {
                    found = Some((addr, number));
                }
            }
        }

        let (current_block, number) = match found {
            Some((addr, number)) => (range.next(addr), number + 1),
            None => (range.start, 0),
        };

        let mut fresh = Block::new();
        fresh.number = number;
        let bytes = fresh.to_bytes();
        if let Err(e) = storage.write_block(current_block, &bytes) {
            warn!("error log: could not write seed block: {:?}", e);
            return None;
        }

        Some((current_block, number))
    }

    /// Erase the persisted ring and reset the in-memory block/ring state to
    /// match. No-op on the RAM ring beyond the reset if the erase itself
    /// fails: storage errors propagate so the caller knows nothing was
    /// cleared.
    pub fn clear_saved_errors(&self, storage: &dyn BlockStorage) -> crate::error::Result<()> {
        let mut inner = self.inner.lock();
        storage.erase(inner.persist.range.start, inner.persist.range.end)?;
        inner.ring.clear();
        inner.persist.current_block = inner.persist.range.start;
        inner.persist.number = 0;
        Ok(())
    }

    pub(crate) fn persist_snapshot(&self) -> (u16, u16, bool) {
        let inner = self.inner.lock();
        (
            inner.persist.current_block,
            inner.persist.number,
            inner.persist.running,
        )
    }

    pub(crate) fn address_range(&self) -> AddressRange {
        self.inner.lock().persist.range
    }
}

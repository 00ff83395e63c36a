/* ╔═════════════════════════════════════════════════════════════════════════╗
   ║ Module: traits                                                          ║
   ╟─────────────────────────────────────────────────────────────────────────╢
   ║ Descr.: Narrow capability interfaces for collaborators the core treats ║
   ║         as external: block storage, the shared transfer buffer, the    ║
   ║         tick source and the console sink. Keeping these as injected    ║
   ║         traits (rather than globals) is what makes the core testable   ║
   ║         without real I/O.                                              ║
   ╚═════════════════════════════════════════════════════════════════════════╝
*/
use crate::config::BLOCK_SIZE;
use crate::error::Result;

/// Block-addressable removable storage, e.g. an SD card. One block is
/// [`BLOCK_SIZE`] bytes; addresses are block indices, not byte offsets.
pub trait BlockStorage {
    /// One-time driver initialisation.
    fn init(&self) -> Result<()>;
    /// Acquire exclusive access to the device, waiting up to `timeout_ms`
    /// (`None` waits indefinitely).
    fn lock(&self, timeout_ms: Option<u32>) -> Result<()>;
    /// Release a previously acquired lock.
    fn unlock(&self);
    /// Read the block at `addr` into `buf`.
    fn read_block(&self, addr: u16, buf: &mut [u8; BLOCK_SIZE]) -> Result<()>;
    /// Write `buf` to the block at `addr`.
    fn write_block(&self, addr: u16, buf: &[u8; BLOCK_SIZE]) -> Result<()>;
    /// Erase every block in `[start, end)`.
    fn erase(&self, start: u16, end: u16) -> Result<()>;
}

/// The shared scratch buffer used for block reads during scans and
/// replays. Exactly one buffer exists; callers must release it (dropping
/// the guard) before another caller can acquire it.
pub trait TransferBuffer {
    /// Acquire the buffer, waiting up to `timeout_ms`. `None` means the
    /// buffer is busy and the caller should give up.
    fn acquire(&self, timeout_ms: u32) -> Option<&mut [u8; BLOCK_SIZE]>;
    /// Release a buffer previously returned by `acquire`.
    fn release(&self);
}

/// A guard that releases a leased [`TransferBuffer`] on drop, so every
/// early-return path in the replay/scan walks still frees it.
pub struct BufferLease<'a, T: TransferBuffer + ?Sized> {
    owner: &'a T,
    buf: &'a mut [u8; BLOCK_SIZE],
}

impl<'a, T: TransferBuffer + ?Sized> BufferLease<'a, T> {
    /// Lease the buffer from `owner`, or `None` if it is unavailable within
    /// `timeout_ms`.
    pub fn acquire(owner: &'a T, timeout_ms: u32) -> Option<BufferLease<'a, T>> {
        owner
            .acquire(timeout_ms)
            .map(|buf| BufferLease { owner, buf })
    }

    pub fn buf(&mut self) -> &mut [u8; BLOCK_SIZE] {
        self.buf
    }
}

impl<'a, T: TransferBuffer + ?Sized> Drop for BufferLease<'a, T> {
    fn drop(&mut self) {
        self.owner.release();
    }
}

/// Monotonic tick source sampled at report time.
pub trait TickSource {
    fn now(&self) -> u32;
}

/// A console (or other text sink) that one formatted diagnostic line is
/// written to per call.
pub trait ConsoleSink {
    fn write_line(&self, line: &str);
}

/// Symbolic bus-address lookup, used by bus-specific print helpers that
/// want to show a name instead of a raw address.
pub trait BusAddrLookup {
    fn lookup(&self, addr: u8) -> Option<&'static str>;
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeMap;
    use std::string::String;
    use std::vec::Vec;

    /// In-memory stand-in for a block-addressable device, good enough to
    /// exercise the persister/replayer without real hardware.
    pub struct FakeStorage {
        pub blocks: RefCell<BTreeMap<u16, [u8; BLOCK_SIZE]>>,
        pub locked: Cell<bool>,
        pub fail_reads: Cell<bool>,
        pub fail_addrs: RefCell<BTreeMap<u16, ()>>,
    }

    impl FakeStorage {
        pub fn new() -> FakeStorage {
            FakeStorage {
                blocks: RefCell::new(BTreeMap::new()),
                locked: Cell::new(false),
                fail_reads: Cell::new(false),
                fail_addrs: RefCell::new(BTreeMap::new()),
            }
        }

        /// Make reads of this one address fail, simulating a bad sector in
        /// the middle of an otherwise healthy ring.
        pub fn fail_reads_at(&self, addr: u16) {
            self.fail_addrs.borrow_mut().insert(addr, ());
        }
    }

    impl BlockStorage for FakeStorage {
        fn init(&self) -> Result<()> {
            Ok(())
        }

        fn lock(&self, _timeout_ms: Option<u32>) -> Result<()> {
            self.locked.set(true);
            Ok(())
        }

        fn unlock(&self) {
            self.locked.set(false);
        }

        fn read_block(&self, addr: u16, buf: &mut [u8; BLOCK_SIZE]) -> Result<()> {
            if self.fail_reads.get() || self.fail_addrs.borrow().contains_key(&addr) {
                return Err(crate::error::Error::Storage);
            }
            match self.blocks.borrow().get(&addr) {
                Some(stored) => {
                    buf.copy_from_slice(stored);
                    Ok(())
                }
                None => {
                    *buf = [0u8; BLOCK_SIZE];
                    Ok(())
                }
            }
        }

        fn write_block(&self, addr: u16, buf: &[u8; BLOCK_SIZE]) -> Result<()> {
            self.blocks.borrow_mut().insert(addr, *buf);
            Ok(())
        }

        fn erase(&self, start: u16, end: u16) -> Result<()> {
            let mut blocks = self.blocks.borrow_mut();
            for addr in start..end {
                blocks.remove(&addr);
            }
            Ok(())
        }
    }

    /// Single shared scratch buffer, backed by `UnsafeCell` the same way
    /// `sync::irqsave_spinlock` hands out an exclusive view from `&self`.
    pub struct FakeTransferBuffer {
        busy: Cell<bool>,
        storage: std::cell::UnsafeCell<[u8; BLOCK_SIZE]>,
    }

    impl FakeTransferBuffer {
        pub fn new() -> FakeTransferBuffer {
            FakeTransferBuffer {
                busy: Cell::new(false),
                storage: std::cell::UnsafeCell::new([0u8; BLOCK_SIZE]),
            }
        }
    }

    impl TransferBuffer for FakeTransferBuffer {
        fn acquire(&self, _timeout_ms: u32) -> Option<&mut [u8; BLOCK_SIZE]> {
            if self.busy.get() {
                return None;
            }
            self.busy.set(true);
            // SAFETY: `busy` enforces at most one outstanding borrow at a
            // time, matching the single-shared-buffer contract.
            Some(unsafe { &mut *self.storage.get() })
        }

        fn release(&self) {
            self.busy.set(false);
        }
    }

    pub struct FakeTicker {
        pub now: Cell<u32>,
    }

    impl FakeTicker {
        pub fn new() -> FakeTicker {
            FakeTicker { now: Cell::new(0) }
        }

        pub fn advance(&self, by: u32) -> u32 {
            let next = self.now.get() + by;
            self.now.set(next);
            next
        }
    }

    impl TickSource for FakeTicker {
        fn now(&self) -> u32 {
            self.now.get()
        }
    }

    pub struct FakeConsole {
        pub lines: RefCell<Vec<String>>,
    }

    impl FakeConsole {
        pub fn new() -> FakeConsole {
            FakeConsole {
                lines: RefCell::new(Vec::new()),
            }
        }
    }

    impl ConsoleSink for FakeConsole {
        fn write_line(&self, line: &str) {
            self.lines.borrow_mut().push(String::from(line));
        }
    }
}

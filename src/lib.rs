//! On-device diagnostic error logging core.
//!
//! Captures structured [`ErrorRecord`]s, classifies them by severity band,
//! buffers the most recent ones in a RAM ring guarded by a mutex, and —
//! with the `persist` feature enabled — durably mirrors them as
//! fixed-layout blocks on removable block storage. A pluggable decoder
//! registry renders raw `source`/`err`/`argument` fields to human-readable
//! text, and two replay paths walk the log newest-first: one printing to a
//! console sink, one exporting packed record images into a caller-owned
//! buffer.
//!
//! The core owns no globals: an [`ErrorLog`] is constructed once by the
//! host firmware and threaded through to every call site, with its I/O
//! collaborators (storage, transfer buffer, tick source, console) injected
//! as small capability traits rather than reached for through statics.
#![cfg_attr(not(test), no_std)]

mod config;
mod context;
mod crc16;
mod decoder;
mod error;
mod linebuf;
mod record;
mod replay;
mod ring;
mod traits;

#[cfg(feature = "persist")]
mod block;

pub use config::{
    BLOCK_SIZE, DECODE_BUF_LEN, ERR_ADDR_END, ERR_ADDR_START, ERR_LEV_CRITICAL, ERR_LEV_DEBUG,
    ERR_LEV_ERROR, ERR_LEV_INFO, ERR_LEV_WARNING, ERR_SRC_ARCBUS, ERR_SRC_SUBSYSTEM, MAX_DECODERS,
    RAM_ONLY_CAPACITY, SAVED_ERROR_MAGIC,
};
pub use context::ErrorLog;
pub use decoder::{DecodeFlags, DecodeFn};
pub use error::{Error, Result};
pub use record::{ErrorRecord, Severity};
pub use replay::{replay, replay_to_memory};
pub use traits::{BusAddrLookup, ConsoleSink, TickSource};

#[cfg(feature = "persist")]
pub use block::{AddressRange, Block, ParsedBlock, LEGACY_RECORDS_PER_BLOCK, RECORDS_PER_BLOCK};
#[cfg(feature = "persist")]
pub use traits::{BlockStorage, BufferLease, TransferBuffer};

#[cfg(test)]
fn arcbus_decoder<'a>(buf: &'a mut [u8; DECODE_BUF_LEN], _s: u16, err: i32, _a: u16) -> &'a str {
    use core::fmt::Write;
    let mut line = crate::linebuf::LineBuf::new(buf);
    let _ = write!(line, "ArcBus fault code {}", err);
    line.into_str()
}

#[cfg(all(test, not(feature = "persist")))]
mod ram_only_integration_tests {
    use super::*;
    use crate::traits::fakes::{FakeConsole, FakeTicker};

    #[test]
    fn fresh_log_reports_nothing_to_replay() {
        let log = ErrorLog::new();
        let console = FakeConsole::new();
        replay(&log, 0, ERR_LEV_DEBUG, &console);
        assert_eq!(console.lines.borrow().len(), 0);
    }

    #[test]
    fn reported_records_replay_newest_first() {
        let log = ErrorLog::new();
        let ticker = FakeTicker::new();
        let console = FakeConsole::new();
        log.register_decoder(0, 49, arcbus_decoder, DecodeFlags::NONE)
            .unwrap();
        log.set_level(ERR_LEV_DEBUG);

        for i in 0..3 {
            ticker.advance(1);
            log.report(ERR_LEV_ERROR, 10, i, 0, &ticker, None);
        }
        replay(&log, 0, ERR_LEV_DEBUG, &console);

        let lines = console.lines.borrow();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("ArcBus fault code 2"));
        assert!(lines[2].contains("ArcBus fault code 0"));
    }

    #[test]
    fn reports_below_threshold_are_dropped() {
        let log = ErrorLog::new();
        let ticker = FakeTicker::new();
        log.set_level(ERR_LEV_ERROR);
        log.report(ERR_LEV_INFO, 10, 0, 0, &ticker, None);
        log.report(ERR_LEV_ERROR, 10, 0, 0, &ticker, None);

        let mut dest = [0u8; 64];
        let count = replay_to_memory(&log, &mut dest, ERR_LEV_DEBUG);
        assert_eq!(count, 1);
    }

    #[test]
    fn replay_limit_and_min_level_combine() {
        let log = ErrorLog::new();
        let ticker = FakeTicker::new();
        let console = FakeConsole::new();
        log.set_level(ERR_LEV_DEBUG);
        for (i, level) in [ERR_LEV_INFO, ERR_LEV_ERROR, ERR_LEV_ERROR, ERR_LEV_CRITICAL]
            .into_iter()
            .enumerate()
        {
            ticker.advance(1);
            log.report(level, 10, i as i32, 0, &ticker, None);
        }
        // Only the two most recent Error-or-above records, limited to 1.
        replay(&log, 1, ERR_LEV_ERROR, &console);
        assert_eq!(console.lines.borrow().len(), 1);
        assert!(console.lines.borrow()[0].contains("fault code 3"));
    }

    #[test]
    fn ram_only_ring_wraps_at_its_fixed_capacity() {
        let log = ErrorLog::new();
        let ticker = FakeTicker::new();
        for i in 0..(RAM_ONLY_CAPACITY as i32 + 5) {
            ticker.advance(1);
            log.report(ERR_LEV_ERROR, 10, i, 0, &ticker, None);
        }
        let mut dest = [0u8; (RAM_ONLY_CAPACITY + 10) * 14 + 2];
        let count = replay_to_memory(&log, &mut dest, ERR_LEV_DEBUG);
        assert_eq!(count as usize, RAM_ONLY_CAPACITY);
    }
}

/* ╔═════════════════════════════════════════════════════════════════════════╗
   ║ Module: replay                                                          ║
   ╟─────────────────────────────────────────────────────────────────────────╢
   ║ Descr.: The two replay paths: print formatted lines to a console sink, ║
   ║         or export packed record images into a caller-owned buffer.     ║
   ║         Both walk newest-first and tolerate corruption: a storage read ║
   ║         failure ends the walk; a CRC mismatch or an out-of-sequence    ║
   ║         block is reported (print mode) or skipped (export mode) and   ║
   ║         the walk continues into older blocks.                         ║
   ╚═════════════════════════════════════════════════════════════════════════╝
*/
use crate::config::DECODE_BUF_LEN;
use crate::context::ErrorLog;
use crate::decoder::DecodeFlags;
use crate::linebuf::LineBuf;
use crate::record::{ErrorRecord, Severity, RECORD_SIZE};
use crate::traits::ConsoleSink;
use byteorder::{ByteOrder, LittleEndian};
use core::fmt::Write;

#[cfg(feature = "persist")]
use crate::block::{self, ParsedBlock, WalkItem};
#[cfg(feature = "persist")]
use crate::traits::{BlockStorage, BufferLease, TransferBuffer};
#[cfg(feature = "persist")]
use log::warn;

fn format_and_print(log: &ErrorLog, record: ErrorRecord, console: &dyn ConsoleSink) {
    let mut decode_buf = [0u8; DECODE_BUF_LEN];
    let text = log.decoders.read().decode(
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

/// Pack one record into its fixed 14-byte wire image at `dest[0..RECORD_SIZE]`.
fn pack_into(record: &ErrorRecord, dest: &mut [u8]) {
    let mut buf = [0u8; RECORD_SIZE];
    record.write_to(&mut buf);
    dest[..RECORD_SIZE].copy_from_slice(&buf);
}

/// Print up to `num` records (`0` means unlimited) at or above `min_level`,
/// newest-first, from the RAM ring.
#[cfg(not(feature = "persist"))]
pub fn replay(log: &ErrorLog, num: u16, min_level: u8, console: &dyn ConsoleSink) {
    let inner = log.lock_inner();
    let mut emitted: u16 = 0;
    for record in inner.ring.iter_newest_first() {
        if num != 0 && emitted >= num {
            break;
        }
        if record.level < min_level {
            continue;
        }
        format_and_print(log, record, console);
        emitted += 1;
    }
}

/// Export up to as many records as `dest` can hold at or above `min_level`,
/// newest-first: a 16-bit little-endian count at `dest[0..2]`, followed by
/// packed 14-byte record images.
#[cfg(not(feature = "persist"))]
pub fn replay_to_memory(log: &ErrorLog, dest: &mut [u8], min_level: u8) -> u16 {
    let inner = log.lock_inner();
    let mut count: u16 = 0;
    let mut offset = 2usize;
    for record in inner.ring.iter_newest_first() {
        if record.level < min_level {
            continue;
        }
        if offset + RECORD_SIZE > dest.len() {
            break;
        }
        pack_into(&record, &mut dest[offset..offset + RECORD_SIZE]);
        offset += RECORD_SIZE;
        count += 1;
    }
    LittleEndian::write_u16(&mut dest[0..2], count);
    count
}

/// What a replay callback does with one walked item; shared by both replay
/// paths so the backward-block-walk logic lives in one place.
#[cfg(feature = "persist")]
enum Sink<'a> {
    Print(&'a dyn ConsoleSink),
    Export { dest: &'a mut [u8], offset: usize, count: u16 },
}

#[cfg(feature = "persist")]
impl<'a> Sink<'a> {
    fn take_record(&mut self, log: &ErrorLog, record: ErrorRecord) -> bool {
        match self {
            Sink::Print(console) => {
                format_and_print(log, record, *console);
                true
            }
            Sink::Export { dest, offset, count } => {
                if *offset + RECORD_SIZE > dest.len() {
                    return false;
                }
                pack_into(&record, &mut dest[*offset..*offset + RECORD_SIZE]);
                *offset += RECORD_SIZE;
                *count += 1;
                true
            }
        }
    }

    fn take_gap(&mut self) {
        if let Sink::Print(console) = self {
            console.write_line("");
        }
    }

    /// A block failed its CRC check, or was found where a valid block was
    /// expected but its signature is missing. Reported as a blank line in
    /// print mode (an operator scanning the replay can see where history
    /// is missing); silently skipped in export mode, per spec.
    fn take_corruption(&mut self) {
        self.take_gap();
    }
}

/// Walk the RAM ring (the still-open current block) followed by every
/// earlier persisted block, newest-first, feeding matching records into
/// `sink` until `num` have been emitted (`0` meaning unlimited) or the
/// address range is exhausted. A CRC mismatch or an out-of-sequence block
/// is reported and skipped so older blocks remain reachable; a storage
/// read error terminates the walk outright, since nothing past it is
/// reliably addressable.
#[cfg(feature = "persist")]
fn walk(
    log: &ErrorLog,
    num: u16,
    min_level: u8,
    storage: &dyn BlockStorage,
    buffer: &dyn TransferBuffer,
    buffer_timeout_ms: u32,
    sink: &mut Sink<'_>,
) {
    let mut emitted: u16 = 0;
    let mut ring_has_data = false;

    {
        let inner = log.lock_inner();
        for record in inner.ring.iter_newest_first() {
            ring_has_data = true;
            if num != 0 && emitted >= num {
                return;
            }
            if record.level < min_level {
                continue;
            }
            if !sink.take_record(log, record) {
                return;
            }
            emitted += 1;
        }
    }
    if num != 0 && emitted >= num {
        return;
    }

    let (current_block, current_number, running) = log.persist_snapshot();
    if !running {
        return;
    }

    let Some(mut lease) = BufferLease::acquire(buffer, buffer_timeout_ms) else {
        warn!("error log: replay could not acquire the transfer buffer");
        return;
    };

    let range = log.address_range();
    let mut addr = range.prev(current_block);
    // Every successful `record()` rewrites the whole current block to
    // `current_block`, so once the RAM ring holds anything this cycle, the
    // on-disk copy at that address is identical to what the RAM walk above
    // already reported -- re-reading it from storage would double-report
    // it. But right after a wrap (ring freshly cleared, nothing written to
    // the new `current_block` yet), the address still holds the *previous*
    // lap's sealed block, which is real, unreported history and must still
    // be walked.
    let mut blocks_remaining = if ring_has_data {
        range.len().saturating_sub(1)
    } else {
        range.len()
    };

    // The next sealed block we read is expected to carry `number - 1` of
    // whatever came before it; `None` once that countdown reaches 0 means
    // no older block can legitimately exist, so a missing signature there
    // is the ordinary end of the log rather than a corruption.
    let mut expected_number = current_number.checked_sub(1);

    while blocks_remaining > 0 {
        blocks_remaining -= 1;

        // A read failure leaves the rest of the log unreachable through
        // this block-address chain; terminate rather than skip past it.
        if storage.read_block(addr, lease.buf()).is_err() {
            warn!("error log: replay hit a storage read error, ending the walk");
            return;
        }

        match block::parse(lease.buf()) {
            ParsedBlock::Valid { number, records, .. } => {
                if expected_number != Some(number) {
                    sink.take_gap();
                }
                expected_number = number.checked_sub(1);

                for item in block::walk_newest_first(&records) {
                    if num != 0 && emitted >= num {
                        return;
                    }
                    match item {
                        WalkItem::Record(record) => {
                            if record.level < min_level {
                                continue;
                            }
                            if !sink.take_record(log, record) {
                                return;
                            }
                            emitted += 1;
                        }
                        WalkItem::Gap => sink.take_gap(),
                    }
                }
            }
            ParsedBlock::CrcMismatch { number } => {
                warn!("error log: replay hit a CRC mismatch at block {number}, skipping it");
                sink.take_corruption();
                expected_number = number.checked_sub(1);
            }
            ParsedBlock::Uninitialised => match expected_number {
                None => return,
                Some(expected) => {
                    warn!(
                        "error log: replay expected block {expected} but storage was uninitialised, skipping it"
                    );
                    sink.take_corruption();
                    expected_number = expected.checked_sub(1);
                }
            },
        }

        addr = range.prev(addr);
    }
}

/// Print up to `num` records (`0` unlimited) at or above `min_level`,
/// newest-first, across the RAM ring and persisted blocks. A gap inside a
/// block, a CRC mismatch, or an unexpectedly missing block all print as a
/// blank line and the walk continues into older blocks; only a storage
/// read failure, or an uninitialised block found where none is expected
/// anymore, ends the walk.
#[cfg(feature = "persist")]
pub fn replay(
    log: &ErrorLog,
    num: u16,
    min_level: u8,
    storage: &dyn BlockStorage,
    buffer: &dyn TransferBuffer,
    buffer_timeout_ms: u32,
    console: &dyn ConsoleSink,
) {
    walk(
        log,
        num,
        min_level,
        storage,
        buffer,
        buffer_timeout_ms,
        &mut Sink::Print(console),
    );
}

/// Export replayed records into `dest`: a 16-bit count at `dest[0..2]`
/// followed by packed 14-byte images, newest-first, stopping once `dest`
/// cannot hold another record. Gaps are skipped rather than represented in
/// the exported image.
#[cfg(feature = "persist")]
pub fn replay_to_memory(
    log: &ErrorLog,
    dest: &mut [u8],
    min_level: u8,
    storage: &dyn BlockStorage,
    buffer: &dyn TransferBuffer,
    buffer_timeout_ms: u32,
) -> u16 {
    let mut sink = Sink::Export { dest, offset: 2, count: 0 };
    walk(log, 0, min_level, storage, buffer, buffer_timeout_ms, &mut sink);
    let (dest, count) = match sink {
        Sink::Export { dest, count, .. } => (dest, count),
        Sink::Print(_) => unreachable!(),
    };
    LittleEndian::write_u16(&mut dest[0..2], count);
    count
}

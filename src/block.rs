/* ╔═════════════════════════════════════════════════════════════════════════╗
   ║ Module: block                                                           ║
   ╟─────────────────────────────────────────────────────────────────────────╢
   ║ Descr.: Fixed 512-byte on-storage block layout: two signature words,   ║
   ║         a monotonic block number, a record array and a trailing CRC.   ║
   ║         Byte-exact: readers and writers agree on field order & widths. ║
   ╚═════════════════════════════════════════════════════════════════════════╝
*/
use crate::config::BLOCK_SIZE;
use crate::crc16::crc16;
use crate::record::{ErrorRecord, RECORD_SIZE};
use byteorder::{ByteOrder, LittleEndian};

/// Current (two-word) block signature.
pub const SIGNATURE1: u16 = 0xA55A;
pub const SIGNATURE2: u16 = 0xCB31;
/// Third signature word accepted on read only, for blocks written by the
/// legacy three-signature-word firmware revision.
pub const LEGACY_SIGNATURE3: u16 = 0xE93A;

const CURRENT_HEADER_LEN: usize = 2 + 2 + 2; // sig1, sig2, number
const LEGACY_HEADER_LEN: usize = 2 + 2 + 2 + 2; // sig1, sig2, sig3, number
const TRAILER_LEN: usize = 2; // chk

/// Number of records that fit in a block written by this implementation.
pub const RECORDS_PER_BLOCK: usize = (BLOCK_SIZE - CURRENT_HEADER_LEN - TRAILER_LEN) / RECORD_SIZE;
/// Number of records that fit in a legacy three-signature-word block.
pub const LEGACY_RECORDS_PER_BLOCK: usize =
    (BLOCK_SIZE - LEGACY_HEADER_LEN - TRAILER_LEN) / RECORD_SIZE;

/// An in-memory mirror of the current persisted block.
#[derive(Clone)]
pub struct Block {
    pub number: u16,
    pub records: [ErrorRecord; RECORDS_PER_BLOCK],
}

impl Block {
    pub const fn new() -> Block {
        Block {
            number: 0,
            records: [ErrorRecord::EMPTY; RECORDS_PER_BLOCK],
        }
    }

    /// Serialize the block with its CRC-16 computed over every byte except
    /// the trailing checksum field itself.
    pub fn to_bytes(&self) -> [u8; BLOCK_SIZE] {
        let mut out = [0u8; BLOCK_SIZE];
        LittleEndian::write_u16(&mut out[0..2], SIGNATURE1);
        LittleEndian::write_u16(&mut out[2..4], SIGNATURE2);
        LittleEndian::write_u16(&mut out[4..6], self.number);

        let mut offset = CURRENT_HEADER_LEN;
        let mut record_buf = [0u8; RECORD_SIZE];
        for record in &self.records {
            record.write_to(&mut record_buf);
            out[offset..offset + RECORD_SIZE].copy_from_slice(&record_buf);
            offset += RECORD_SIZE;
        }

        let chk = crc16(&out[..BLOCK_SIZE - TRAILER_LEN]);
        LittleEndian::write_u16(&mut out[BLOCK_SIZE - TRAILER_LEN..], chk);
        out
    }
}

impl Default for Block {
    fn default() -> Self {
        Block::new()
    }
}

/// Outcome of reading one 512-byte buffer back into a block.
#[derive(Debug)]
pub enum ParsedBlock {
    /// Storage that has never been written (or garbage): neither signature
    /// word pair was found.
    Uninitialised,
    /// Signatures recognised, but the trailing CRC does not match.
    CrcMismatch { number: u16 },
    /// A fully valid block.
    Valid {
        number: u16,
        legacy: bool,
        records: [ErrorRecord; RECORDS_PER_BLOCK],
    },
}

/// Parse a raw block buffer, accepting both the current two-signature-word
/// layout and the legacy three-word layout on read.
pub fn parse(buf: &[u8; BLOCK_SIZE]) -> ParsedBlock {
    let sig1 = LittleEndian::read_u16(&buf[0..2]);
    let sig2 = LittleEndian::read_u16(&buf[2..4]);
    if sig1 != SIGNATURE1 || sig2 != SIGNATURE2 {
        return ParsedBlock::Uninitialised;
    }

    let maybe_sig3 = LittleEndian::read_u16(&buf[4..6]);
    let legacy = maybe_sig3 == LEGACY_SIGNATURE3;

    let (header_len, record_count) = if legacy {
        (LEGACY_HEADER_LEN, LEGACY_RECORDS_PER_BLOCK)
    } else {
        (CURRENT_HEADER_LEN, RECORDS_PER_BLOCK)
    };
    let number = LittleEndian::read_u16(&buf[header_len - 2..header_len]);

    let expected_chk = LittleEndian::read_u16(&buf[BLOCK_SIZE - TRAILER_LEN..]);
    let actual_chk = crc16(&buf[..BLOCK_SIZE - TRAILER_LEN]);
    if expected_chk != actual_chk {
        return ParsedBlock::CrcMismatch { number };
    }

    let mut records = [ErrorRecord::EMPTY; RECORDS_PER_BLOCK];
    let mut offset = header_len;
    let mut record_buf = [0u8; RECORD_SIZE];
    for slot in records.iter_mut().take(record_count) {
        record_buf.copy_from_slice(&buf[offset..offset + RECORD_SIZE]);
        *slot = ErrorRecord::read_from(&record_buf);
        offset += RECORD_SIZE;
    }

    ParsedBlock::Valid {
        number,
        legacy,
        records,
    }
}

/// The half-open block-address range `[start, end)` the persisted ring
/// lives in. Wraps `end - 1 -> start` and `start -> end - 1`, so advancing
/// past the last block always lands back at the first one (an earlier
/// firmware revision forgot this wrap on the write path).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AddressRange {
    pub start: u16,
    pub end: u16,
}

impl AddressRange {
    pub const fn new(start: u16, end: u16) -> AddressRange {
        AddressRange { start, end }
    }

    pub fn len(&self) -> u16 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// The block address after `addr`, wrapping `end - 1` back to `start`.
    pub fn next(&self, addr: u16) -> u16 {
        let candidate = addr + 1;
        if candidate >= self.end {
            self.start
        } else {
            candidate
        }
    }

    /// The block address before `addr`, wrapping `start` back to `end - 1`.
    pub fn prev(&self, addr: u16) -> u16 {
        if addr <= self.start {
            self.end - 1
        } else {
            addr - 1
        }
    }
}

/// One item produced while walking a block's record array backward
/// (index `RECORDS_PER_BLOCK - 1` down to `0`): either a valid record, or a
/// marker for a contiguous run of invalid slots (printed as one blank
/// line, matching the original's skip-break behaviour).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum WalkItem {
    Record(ErrorRecord),
    Gap,
}

/// Walk a block's record array from the highest index down to 0, newest
/// slot conceptually last (blocks are filled low-to-high by the
/// persister, so high indices are oldest within a fully-sealed block and
/// low indices are oldest within the still-filling current block — the
/// caller only cares about valid-vs-gap, not which end is "newer", since
/// cross-block ordering is handled by the Replayer).
pub fn walk_newest_first(records: &[ErrorRecord; RECORDS_PER_BLOCK]) -> impl Iterator<Item = WalkItem> + '_ {
    let mut in_gap = false;
    records.iter().rev().filter_map(move |record| {
        if record.is_valid() {
            in_gap = false;
            Some(WalkItem::Record(*record))
        } else if !in_gap {
            in_gap = true;
            Some(WalkItem::Gap)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_populated_block() {
        let mut block = Block::new();
        block.number = 7;
        block.records[0] = ErrorRecord::new(90, 1, -3, 2, 100);
        let bytes = block.to_bytes();
        match parse(&bytes) {
            ParsedBlock::Valid {
                number,
                legacy,
                records,
            } => {
                assert_eq!(number, 7);
                assert!(!legacy);
                assert_eq!(records[0], block.records[0]);
            }
            other => panic!("expected Valid, got {:?}", other),
        }
    }

    #[test]
    fn uninitialised_storage_has_no_signature() {
        let bytes = [0u8; BLOCK_SIZE];
        assert!(matches!(parse(&bytes), ParsedBlock::Uninitialised));
    }

    #[test]
    fn mutating_any_byte_but_chk_fails_the_crc_check() {
        let block = Block::new();
        let mut bytes = block.to_bytes();
        bytes[10] ^= 0xFF;
        match parse(&bytes) {
            ParsedBlock::CrcMismatch { .. } => {}
            other => panic!("expected CrcMismatch, got {:?}", other),
        }
    }

    #[test]
    fn address_range_wraps_in_both_directions() {
        let range = AddressRange::new(0, 64);
        assert_eq!(range.next(63), 0);
        assert_eq!(range.next(10), 11);
        assert_eq!(range.prev(0), 63);
        assert_eq!(range.prev(10), 9);
    }

    #[test]
    fn records_per_block_matches_the_504_byte_budget() {
        // 512 - 6 (sig1+sig2+number) - 2 (chk) = 504; 504 / 14 = 36.
        assert_eq!(RECORDS_PER_BLOCK, 36);
    }

    #[test]
    fn walk_reports_a_single_gap_for_a_contiguous_invalid_run() {
        let mut records = [ErrorRecord::EMPTY; RECORDS_PER_BLOCK];
        records[0] = ErrorRecord::new(90, 1, 1, 0, 1);
        records[1] = ErrorRecord::new(90, 1, 2, 0, 2);
        // records[2..] stay empty -> one gap once walked in reverse.
        let items: Vec<WalkItem> = walk_newest_first(&records).collect();
        assert_eq!(items[0], WalkItem::Gap);
        assert_eq!(items[1], WalkItem::Record(records[1]));
        assert_eq!(items[2], WalkItem::Record(records[0]));
        assert_eq!(items.len(), 3);
    }
}

/* ╔═════════════════════════════════════════════════════════════════════════╗
   ║ Module: decoder                                                         ║
   ╟─────────────────────────────────────────────────────────────────────────╢
   ║ Descr.: Fixed-capacity source -> text decoder table. No heap: entries   ║
   ║         live in a const-sized array, installed once at startup.        ║
   ╚═════════════════════════════════════════════════════════════════════════╝
*/
use crate::config::{DECODE_BUF_LEN, MAX_DECODERS};
use crate::error::{Error, Result};
use crate::linebuf::LineBuf;
use core::fmt::Write;

bitflags::bitflags! {
    /// Dispatch mask carried alongside each decoder entry and by each call
    /// to [`DecoderRegistry::decode`]. A query of `0` skips the flag check
    /// entirely (matches any range-matching entry); a non-zero query must
    /// share at least one bit with the entry's flags.
    #[derive(Default)]
    pub struct DecodeFlags: u32 {
        const NONE = 0;
        /// Entry decodes sources reserved for the platform bus library
        /// (`source < ERR_SRC_SUBSYSTEM`).
        const BUS = 1 << 0;
        /// Entry decodes sources free for application-subsystem use
        /// (`source >= ERR_SRC_SUBSYSTEM`).
        const SUBSYSTEM = 1 << 1;
        /// Entry should also be consulted by bus-specific print helpers
        /// (e.g. print-spi-err) that decode through a [`BusAddrLookup`],
        /// rather than through the generic console replay path alone.
        ///
        /// [`BusAddrLookup`]: crate::traits::BusAddrLookup
        const BUS_PRINT = 1 << 2;
    }
}

/// A decoder callback: given the caller-owned scratch buffer and a
/// record's source/err/argument fields, return the text to display. The
/// returned `&str` may borrow from `buf` (after writing into it) or be a
/// `'static` string, mirroring the C callback's "return `buf` or a static
/// string" contract.
pub type DecodeFn = for<'a> fn(&'a mut [u8; DECODE_BUF_LEN], u16, i32, u16) -> &'a str;

#[derive(Clone, Copy)]
struct DecoderEntry {
    min: u16,
    max: u16,
    callback: DecodeFn,
    flags: DecodeFlags,
}

impl DecoderEntry {
    fn contains(&self, source: u16) -> bool {
        source >= self.min && source <= self.max
    }

    fn matches_flags(&self, query: DecodeFlags) -> bool {
        query.is_empty() || self.flags.intersects(query)
    }
}

/// Process-wide table mapping a source-tag range to a decode callback.
pub struct DecoderRegistry {
    entries: [Option<DecoderEntry>; MAX_DECODERS],
    count: usize,
}

impl DecoderRegistry {
    pub const fn new() -> DecoderRegistry {
        DecoderRegistry {
            entries: [None; MAX_DECODERS],
            count: 0,
        }
    }

    /// Install a decoder for the inclusive range `[min, max]`.
    ///
    /// Fails with [`Error::InvalidRange`] if `min > max`, with
    /// [`Error::Overlap`] if the range intersects an already-registered
    /// entry, and with [`Error::TableFull`] once all slots are used. The
    /// table is left unmodified on any failure.
    pub fn register(
        &mut self,
        min: u16,
        max: u16,
        callback: DecodeFn,
        flags: DecodeFlags,
    ) -> Result<()> {
        if min > max {
            return Err(Error::InvalidRange);
        }
        for existing in self.entries.iter().flatten() {
            if ranges_overlap(min, max, existing.min, existing.max) {
                return Err(Error::Overlap);
            }
        }
        if self.count >= MAX_DECODERS {
            return Err(Error::TableFull);
        }
        self.entries[self.count] = Some(DecoderEntry {
            min,
            max,
            callback,
            flags,
        });
        self.count += 1;
        Ok(())
    }

    /// Render `source`/`err`/`argument` to text using the first registered
    /// entry whose range contains `source` and whose flags match
    /// `query_flags`. Falls back to a generic "Unknown Source" line when no
    /// entry matches, so every source produces at least a readable line.
    pub fn decode<'a>(
        &self,
        buf: &'a mut [u8; DECODE_BUF_LEN],
        source: u16,
        err: i32,
        argument: u16,
        query_flags: DecodeFlags,
    ) -> &'a str {
        for entry in self.entries.iter().flatten() {
            if entry.contains(source) && entry.matches_flags(query_flags) {
                return (entry.callback)(buf, source, err, argument);
            }
        }

        let mut line = LineBuf::new(buf);
        let _ = write!(
            line,
            "Unknown Source : source = {}, error = {}, argument = {}",
            source, err, argument
        );
        line.into_str()
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        DecoderRegistry::new()
    }
}

fn ranges_overlap(a_min: u16, a_max: u16, b_min: u16, b_max: u16) -> bool {
    a_min <= b_max && b_min <= a_max
}

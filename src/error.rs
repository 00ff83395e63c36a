//! Error type shared by every fallible public operation.

use core::fmt;

/// Failures surfaced by the diagnostic log core itself.
///
/// Nothing in this crate panics or aborts on a recoverable condition; every
/// failure is either returned here, expressed by the absence of persisted
/// state (`running == false`), or emitted as a line on the console sink.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The decoder table already holds its maximum number of entries.
    TableFull,
    /// `register(min, max, ..)` was called with `min > max`.
    InvalidRange,
    /// The requested source range intersects an already-registered range.
    Overlap,
    /// The external storage device reported a failure (init/lock/read/write/erase).
    Storage,
    /// A lock (ring mutex or external storage lock) could not be acquired in time.
    LockTimeout,
    /// The shared transfer buffer could not be acquired in time.
    BufferUnavailable,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::TableFull => "decoder table full",
            Error::InvalidRange => "invalid source range",
            Error::Overlap => "source range overlaps an existing decoder",
            Error::Storage => "storage device error",
            Error::LockTimeout => "lock acquisition timed out",
            Error::BufferUnavailable => "shared transfer buffer unavailable",
        };
        f.write_str(msg)
    }
}

pub type Result<T> = core::result::Result<T, Error>;

//! Compile-time configuration for the diagnostic log core.
//!
//! These mirror the `enum{...}` constant groups in the original firmware's
//! `Error.h`; kept as `pub const` items here instead so callers can refer to
//! them with normal Rust item paths.

/// Sources below this value are reserved for the platform bus library; the
/// range `[0, ERR_SRC_SUBSYSTEM)` is not enforced by the decoder registry,
/// it is just the documented convention subsystems are expected to follow.
pub const ERR_SRC_ARCBUS: u16 = 0;
/// First source tag free for application subsystem use.
pub const ERR_SRC_SUBSYSTEM: u16 = 50;

/// Default first block address of the persisted error-log ring on external
/// storage. Overridable by constructing an `AddressRange` with different
/// bounds (see `block::AddressRange`, available when the `persist` feature
/// is enabled).
pub const ERR_ADDR_START: u16 = 0;
/// Default one-past-the-last block address of the persisted error-log ring.
pub const ERR_ADDR_END: u16 = 64;

/// Severity bands, derived from the numeric `level` byte.
pub const ERR_LEV_DEBUG: u8 = 0;
pub const ERR_LEV_INFO: u8 = 30;
pub const ERR_LEV_WARNING: u8 = 60;
pub const ERR_LEV_ERROR: u8 = 90;
pub const ERR_LEV_CRITICAL: u8 = 120;

/// Sentinel byte marking an occupied ring slot.
pub const SAVED_ERROR_MAGIC: u8 = 0xA5;

/// Size, in bytes, of a persisted block on external storage.
pub const BLOCK_SIZE: usize = 512;

/// Size of the caller-owned scratch buffer handed to decoder callbacks.
pub const DECODE_BUF_LEN: usize = 150;

/// Number of slots in the decoder dispatch table.
pub const MAX_DECODERS: usize = 4;

/// RAM ring capacity used when the `persist` feature is disabled.
pub const RAM_ONLY_CAPACITY: usize = 64;

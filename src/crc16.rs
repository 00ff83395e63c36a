//! CRC-16 checksum over persisted blocks.
//!
//! The original firmware left the polynomial as a TODO ("decide on good
//! values to use"); CRC-16/CCITT-FALSE is used here, the same family the
//! `crc` crate already ships pre-baked tables for.

use crc::{Crc, CRC_16_IBM_3740};

const ALGORITHM: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Compute the CRC-16 over `data`.
pub fn crc16(data: &[u8]) -> u16 {
    ALGORITHM.checksum(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_a_single_flipped_byte() {
        let mut block = [0u8; 64];
        for (i, b) in block.iter_mut().enumerate() {
            *b = i as u8;
        }
        let original = crc16(&block);
        block[30] ^= 0x01;
        assert_ne!(crc16(&block), original);
    }

    #[test]
    fn is_deterministic() {
        let data = b"error log block";
        assert_eq!(crc16(data), crc16(data));
    }
}

//! Nibble packing for SYSEX payloads.
//!
//! SYSEX data bytes only carry 7 bits. The synthesizer sidesteps this by
//! sending every byte as two 4-bit values, low nibble first.

use crate::error::{Error, Result};

/// Split each byte into `(low, high)` nibbles.
pub fn to_nibbles(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().flat_map(|&b| [b & 0x0F, b >> 4]).collect()
}

/// Join `(low, high)` nibble pairs back into bytes.
pub fn from_nibbles(nibbles: &[u8]) -> Result<Vec<u8>> {
    if nibbles.len() % 2 != 0 {
        return Err(Error::MalformedPayload(format!(
            "odd nibble count {}",
            nibbles.len()
        )));
    }

    nibbles
        .chunks_exact(2)
        .enumerate()
        .map(|(i, pair)| {
            let (low, high) = (pair[0], pair[1]);
            if low > 0x0F || high > 0x0F {
                Err(Error::MalformedPayload(format!(
                    "nibble pair {} out of range: {:#04x} {:#04x}",
                    i, low, high
                )))
            } else {
                Ok(low | (high << 4))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_nibble_first() {
        assert_eq!(to_nibbles(&[0xA5, 0x0F]), vec![0x05, 0x0A, 0x0F, 0x00]);
    }

    #[test]
    fn test_roundtrip_all_byte_values() {
        let bytes: Vec<u8> = (0..=255).collect();
        let nibbles = to_nibbles(&bytes);
        assert_eq!(nibbles.len(), 512);
        assert!(nibbles.iter().all(|&n| n <= 0x0F));
        assert_eq!(from_nibbles(&nibbles).unwrap(), bytes);
    }

    #[test]
    fn test_empty() {
        assert!(to_nibbles(&[]).is_empty());
        assert!(from_nibbles(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_odd_length_fails() {
        assert!(matches!(
            from_nibbles(&[0x01, 0x02, 0x03]),
            Err(Error::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_out_of_range_nibble_fails() {
        assert!(matches!(
            from_nibbles(&[0x10, 0x00]),
            Err(Error::MalformedPayload(_))
        ));
    }
}

//! CRC-16/CCITT-FALSE checksum used by the UART service.
//!
//! Polynomial 0x1021, initial value 0xFFFF, no reflection, no final XOR.
//! Direct requests and responses carry the checksum big-endian immediately
//! after the sync bytes; MeatNet node frames use the same algorithm over a
//! wider header span.

const CRC_POLYNOMIAL: u16 = 0x1021;
const CRC_INITIAL: u16 = 0xFFFF;

/// Computes the CRC-16/CCITT-FALSE checksum of `data`.
pub fn calculate_crc(data: &[u8]) -> u16 {
    let mut crc = CRC_INITIAL;

    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ CRC_POLYNOMIAL;
            } else {
                crc <<= 1;
            }
        }
    }

    crc
}

/// Verifies that `expected` matches the checksum of `data`.
pub fn verify_crc(data: &[u8], expected: u16) -> bool {
    calculate_crc(data) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc_known_vector() {
        // CRC-16/CCITT-FALSE check value for "123456789".
        assert_eq!(calculate_crc(b"123456789"), 0x29B1);
    }

    #[test]
    fn test_crc_empty() {
        assert_eq!(calculate_crc(&[]), 0xFFFF);
    }

    #[test]
    fn test_crc_single_byte() {
        assert_eq!(calculate_crc(&[0x00]), 0xE1F0);
    }

    #[test]
    fn test_verify_crc() {
        let data = [0x01, 0x02, 0x03, 0x04];
        let crc = calculate_crc(&data);
        assert!(verify_crc(&data, crc));
        assert!(!verify_crc(&data, crc.wrapping_add(1)));
    }

    #[test]
    fn test_crc_sensitive_to_order() {
        assert_ne!(calculate_crc(&[0x01, 0x02]), calculate_crc(&[0x02, 0x01]));
    }

    proptest::proptest! {
        #[test]
        fn test_crc_detects_single_bit_flip(
            data in proptest::collection::vec(proptest::prelude::any::<u8>(), 1..64),
            bit in 0usize..512,
        ) {
            let bit = bit % (data.len() * 8);
            let mut flipped = data.clone();
            flipped[bit / 8] ^= 1 << (bit % 8);
            proptest::prop_assert_ne!(calculate_crc(&data), calculate_crc(&flipped));
        }
    }
}

//! Frame checksum algorithms.
//!
//! A [`ChecksumSpec`] pairs the signal that carries the transmitted checksum
//! with the [`ChecksumAlgorithm`] used to recompute it. The checksum is
//! computed over the valid payload bytes with the checksum's own bits
//! cleared, then truncated to the signal width.

use canguard_types::CanFrame;

use crate::signal::SignalSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    /// Wrapping byte sum.
    Sum8,
    /// Byte-wise XOR.
    Xor8,
    /// Bitwise CRC-8, MSB first, no reflection, no final XOR.
    Crc8 { poly: u8, init: u8 },
}

impl ChecksumAlgorithm {
    pub fn compute(&self, bytes: &[u8]) -> u8 {
        match *self {
            ChecksumAlgorithm::Sum8 => bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)),
            ChecksumAlgorithm::Xor8 => bytes.iter().fold(0u8, |acc, b| acc ^ b),
            ChecksumAlgorithm::Crc8 { poly, init } => {
                let mut crc = init;
                for byte in bytes {
                    crc ^= byte;
                    for _ in 0..8 {
                        crc = if crc & 0x80 != 0 {
                            (crc << 1) ^ poly
                        } else {
                            crc << 1
                        };
                    }
                }
                crc
            }
        }
    }
}

/// Where the checksum lives and how to recompute it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChecksumSpec {
    pub signal: SignalSpec,
    pub algorithm: ChecksumAlgorithm,
}

impl ChecksumSpec {
    /// Checksum carried by the frame.
    pub fn stored(&self, frame: &CanFrame) -> u64 {
        self.signal.raw(frame)
    }

    /// Checksum recomputed from the rest of the payload.
    pub fn compute(&self, frame: &CanFrame) -> u64 {
        let mut cleared = *frame;
        self.signal.write(&mut cleared, 0);
        u64::from(self.algorithm.compute(cleared.payload())) & self.signal.mask()
    }

    pub fn verify(&self, frame: &CanFrame) -> bool {
        self.stored(frame) == self.compute(frame)
    }

    /// Overwrite the checksum field with the correct value.
    pub fn seal(&self, frame: &mut CanFrame) {
        let checksum = self.compute(frame);
        self.signal.write(frame, checksum);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn last_byte_checksum(algorithm: ChecksumAlgorithm) -> ChecksumSpec {
        ChecksumSpec {
            signal: SignalSpec::be("checksum", 7, 0, 8),
            algorithm,
        }
    }

    #[test]
    fn sum8_wraps() {
        assert_eq!(ChecksumAlgorithm::Sum8.compute(&[0xFF, 0x02]), 0x01);
    }

    #[test]
    fn xor8_of_identical_bytes_is_zero() {
        assert_eq!(ChecksumAlgorithm::Xor8.compute(&[0x5A, 0x5A]), 0);
    }

    #[test]
    fn crc8_sae_j1850_check_value() {
        // CRC-8/SAE-J1850 without final XOR over "123456789".
        let crc = ChecksumAlgorithm::Crc8 { poly: 0x1D, init: 0xFF }.compute(b"123456789");
        assert_eq!(crc ^ 0xFF, 0x4B);
    }

    #[test]
    fn sealed_frame_verifies() {
        let spec = last_byte_checksum(ChecksumAlgorithm::Crc8 { poly: 0x1D, init: 0x00 });
        let mut frame = CanFrame::new(0, 0x200, &[1, 2, 3, 4, 5, 6, 7, 0]).unwrap();
        spec.seal(&mut frame);
        assert!(spec.verify(&frame));
    }

    #[test]
    fn corrupted_payload_fails_verification() {
        let spec = last_byte_checksum(ChecksumAlgorithm::Sum8);
        let mut frame = CanFrame::new(0, 0x200, &[1, 2, 3, 4, 5, 6, 7, 0]).unwrap();
        spec.seal(&mut frame);
        frame.data[3] ^= 0x10;
        assert!(!spec.verify(&frame));
    }

    #[test]
    fn checksum_bits_are_excluded_from_computation() {
        let spec = last_byte_checksum(ChecksumAlgorithm::Xor8);
        let frame = CanFrame::new(0, 0x200, &[0x0F, 0, 0, 0, 0, 0, 0, 0xAB]).unwrap();
        assert_eq!(spec.compute(&frame), 0x0F);
    }
}

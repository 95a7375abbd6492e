//! [`SignalSpec`] – bit-level signal decoder.
//!
//! A signal is described by where its least significant bit sits, how wide it
//! is, and the linear `scale`/`offset` that turns the raw integer into a
//! physical value. Signals use big-endian ("Motorola") byte order: the
//! payload is read as one big-endian 64-bit word and the signal occupies bits
//! `lsb .. lsb + width` of that word.
//!
//! # Example
//!
//! ```rust
//! use canguard_hal::signal::SignalSpec;
//! use canguard_types::CanFrame;
//!
//! // 16-bit speed in bytes 0..2, 0.01 km/h per bit.
//! const SPEED: SignalSpec = SignalSpec::be("speed", 1, 0, 16).scaled(0.01 / 3.6, 0.0);
//!
//! let frame = CanFrame::new(0, 0x415, &[0x27, 0x10, 0, 0, 0, 0, 0, 0]).unwrap();
//! assert_eq!(SPEED.raw(&frame), 10_000);
//! assert!((SPEED.value(&frame) - 27.777).abs() < 1e-3);
//! ```

use canguard_types::{CanFrame, MAX_FRAME_LEN};

/// Location, width and scaling of one signal inside a frame payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalSpec {
    /// Signal name as it appears in the vehicle's message catalogue.
    pub name: &'static str,
    /// Bit offset of the least significant bit inside the big-endian word.
    pub lsb: u8,
    /// Width in bits (1..=64).
    pub width: u8,
    pub scale: f64,
    pub offset: f64,
}

impl SignalSpec {
    /// Describe a big-endian signal whose least significant bit is bit
    /// `shift` of payload byte `byte`.
    pub const fn be(name: &'static str, byte: u8, shift: u8, width: u8) -> Self {
        Self {
            name,
            lsb: (MAX_FRAME_LEN as u8 - 1 - byte) * 8 + shift,
            width,
            scale: 1.0,
            offset: 0.0,
        }
    }

    /// Same signal with a physical `scale` and `offset`.
    pub const fn scaled(self, scale: f64, offset: f64) -> Self {
        Self {
            scale,
            offset,
            ..self
        }
    }

    /// Mask of `width` ones, right-aligned.
    pub const fn mask(&self) -> u64 {
        if self.width >= 64 {
            u64::MAX
        } else {
            (1u64 << self.width) - 1
        }
    }

    /// Raw unsigned value of the signal.
    pub fn raw(&self, frame: &CanFrame) -> u64 {
        (u64::from_be_bytes(frame.data) >> self.lsb) & self.mask()
    }

    /// Physical value: `raw * scale + offset`.
    pub fn value(&self, frame: &CanFrame) -> f64 {
        self.raw(frame) as f64 * self.scale + self.offset
    }

    /// Write `raw` into the signal's bits, leaving every other bit untouched.
    ///
    /// Values wider than the signal are truncated to `width` bits.
    pub fn write(&self, frame: &mut CanFrame, raw: u64) {
        let mut word = u64::from_be_bytes(frame.data);
        word &= !(self.mask() << self.lsb);
        word |= (raw & self.mask()) << self.lsb;
        frame.data = word.to_be_bytes();
    }
}

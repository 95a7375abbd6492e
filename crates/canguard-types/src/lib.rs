//! Shared vocabulary for the CanGuard safety stack.
//!
//! Every other crate in the workspace speaks in these types: raw
//! [`CanFrame`]s on the wire, the [`MessageDescriptor`] allow-list entries,
//! the process-wide [`VehicleState`] snapshot and the fault/verdict enums the
//! address monitor reports.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum payload length of a classic CAN frame.
pub const MAX_FRAME_LEN: usize = 8;

/// Identifier of a physical CAN bus on the interceptor board.
pub type BusId = u8;

/// A single classic CAN frame as seen by the interceptor.
///
/// `timestamp_us` is the receive (or submit) time in microseconds on the
/// board's monotonic clock; it only needs to be comparable between frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanFrame {
    pub bus: BusId,
    pub address: u32,
    pub len: u8,
    pub data: [u8; MAX_FRAME_LEN],
    pub timestamp_us: u64,
}

impl CanFrame {
    /// Build a frame from a payload slice.
    ///
    /// # Errors
    ///
    /// Returns [`SafetyError::InvalidFrame`] if `payload` is longer than
    /// [`MAX_FRAME_LEN`] bytes.
    pub fn new(bus: BusId, address: u32, payload: &[u8]) -> Result<Self, SafetyError> {
        if payload.len() > MAX_FRAME_LEN {
            return Err(SafetyError::InvalidFrame(format!(
                "payload of {} bytes exceeds {MAX_FRAME_LEN}",
                payload.len()
            )));
        }
        let mut data = [0u8; MAX_FRAME_LEN];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            bus,
            address,
            len: payload.len() as u8,
            data,
            timestamp_us: 0,
        })
    }

    /// Return a copy of this frame stamped with `timestamp_us`.
    pub fn at(mut self, timestamp_us: u64) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }

    /// The valid part of the payload.
    pub fn payload(&self) -> &[u8] {
        &self.data[..usize::from(self.len).min(MAX_FRAME_LEN)]
    }

    /// Byte `index` of the payload, `0` when out of range.
    pub fn byte(&self, index: usize) -> u8 {
        self.payload().get(index).copied().unwrap_or(0)
    }

    /// Bit `bit` counted LSB-first within each byte (`bit / 8` selects the
    /// byte, `bit % 8` the position inside it).
    pub fn bit(&self, bit: usize) -> bool {
        (self.byte(bit / 8) >> (bit % 8)) & 1 == 1
    }
}

/// One `(address, bus, length)` tuple.
///
/// Used for the transmit allow-list and to describe monitored receive
/// addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageDescriptor {
    pub address: u32,
    pub bus: BusId,
    pub len: u8,
}

impl MessageDescriptor {
    pub const fn new(address: u32, bus: BusId, len: u8) -> Self {
        Self { address, bus, len }
    }

    /// `true` when `frame` has exactly this address, bus and length.
    pub fn matches(&self, frame: &CanFrame) -> bool {
        self.address == frame.address && self.bus == frame.bus && self.len == frame.len
    }
}

/// Per-frame fault detected by the address monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Fault {
    /// Known address on a known bus, but the length does not match.
    Length,
    /// Rolling counter did not advance by exactly one.
    Counter,
    /// Recomputed checksum does not match the transmitted one.
    Checksum,
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fault::Length => write!(f, "length"),
            Fault::Counter => write!(f, "counter"),
            Fault::Checksum => write!(f, "checksum"),
        }
    }
}

/// Outcome of running a received frame through the address monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RxVerdict {
    /// No monitored entry covers this address on this bus.
    Unmonitored,
    /// Monitored and every enabled check passed.
    Valid,
    /// Monitored and a check failed.
    Invalid(Fault),
}

impl RxVerdict {
    /// `false` only for [`RxVerdict::Invalid`].
    pub fn is_valid(&self) -> bool {
        !matches!(self, RxVerdict::Invalid(_))
    }
}

/// Health of one monitored address, as reported to read-only consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddrHealth {
    pub address: u32,
    pub bus: BusId,
    /// At least one matching frame has been received since initialisation.
    pub seen: bool,
    /// No frame within the liveness window.
    pub lagging: bool,
    /// Too many wrong counters in a row.
    pub counter_degraded: bool,
    /// The most recent checksum matched (or checksums are not checked).
    pub checksum_ok: bool,
}

impl AddrHealth {
    /// A source is healthy when it has been seen and carries no fault flag.
    pub fn healthy(&self) -> bool {
        self.seen && !self.lagging && !self.counter_degraded && self.checksum_ok
    }
}

/// Process-wide vehicle state derived from trusted sensor frames.
///
/// Single writer (the state tracker on the receive path), many readers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    /// Vehicle speed in m/s, never negative.
    pub vehicle_speed: f64,
    /// Yaw rate in rad/s.
    pub yaw_rate: f64,
    /// Yaw-rate quality flag from the sensor itself.
    pub yaw_rate_valid: bool,
    pub vehicle_moving: bool,
    pub gas_pressed: bool,
    pub gas_pressed_prev: bool,
    pub brake_pressed: bool,
    pub brake_pressed_prev: bool,
    pub cruise_engaged: bool,
    pub cruise_engaged_prev: bool,
    pub controls_allowed: bool,
    /// Curvature (1/m) of the last lateral command the gatekeeper accepted.
    pub last_curvature: f64,
}

/// Error type for configuration, construction and gatekeeper verdict detail.
///
/// Bus faults are never errors; see [`Fault`] and [`RxVerdict`].
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SafetyError {
    #[error("Tx denied by {rule}: {reason}")]
    TxDenied { rule: String, reason: String },

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Invalid vehicle profile: {0}")]
    InvalidProfile(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error on {bus}: {details}")]
    Transport { bus: String, details: String },
}

impl SafetyError {
    /// Shorthand for a [`SafetyError::TxDenied`].
    pub fn denied(rule: &str, reason: impl Into<String>) -> Self {
        SafetyError::TxDenied {
            rule: rule.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_oversized_payload() {
        let result = CanFrame::new(0, 0x123, &[0u8; 9]);
        assert!(matches!(result, Err(SafetyError::InvalidFrame(_))));
    }

    #[test]
    fn frame_pads_short_payload() {
        let frame = CanFrame::new(0, 0x123, &[0xAA, 0xBB]).unwrap();
        assert_eq!(frame.len, 2);
        assert_eq!(frame.payload(), &[0xAA, 0xBB]);
        assert_eq!(frame.byte(1), 0xBB);
        assert_eq!(frame.byte(5), 0);
    }

    #[test]
    fn frame_bit_is_lsb_first_per_byte() {
        let frame = CanFrame::new(0, 0x83, &[0, 0x01, 0, 0x02, 0, 0, 0, 0]).unwrap();
        assert!(frame.bit(8));
        assert!(frame.bit(25));
        assert!(!frame.bit(0));
        assert!(!frame.bit(24));
    }

    #[test]
    fn descriptor_requires_exact_length() {
        let desc = MessageDescriptor::new(0x3CA, 0, 8);
        let ok = CanFrame::new(0, 0x3CA, &[0; 8]).unwrap();
        let short = CanFrame::new(0, 0x3CA, &[0; 7]).unwrap();
        let other_bus = CanFrame::new(2, 0x3CA, &[0; 8]).unwrap();
        assert!(desc.matches(&ok));
        assert!(!desc.matches(&short));
        assert!(!desc.matches(&other_bus));
    }

    #[test]
    fn verdict_validity() {
        assert!(RxVerdict::Unmonitored.is_valid());
        assert!(RxVerdict::Valid.is_valid());
        assert!(!RxVerdict::Invalid(Fault::Counter).is_valid());
    }

    #[test]
    fn addr_health_requires_sighting() {
        let health = AddrHealth {
            address: 0x415,
            bus: 0,
            seen: false,
            lagging: false,
            counter_degraded: false,
            checksum_ok: true,
        };
        assert!(!health.healthy());
        assert!(AddrHealth { seen: true, ..health }.healthy());
    }

    #[test]
    fn vehicle_state_serializes() {
        let state = VehicleState {
            vehicle_speed: 12.5,
            controls_allowed: true,
            ..Default::default()
        };
        let json = serde_json::to_string(&state).unwrap();
        let back: VehicleState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
    }

    #[test]
    fn safety_error_display() {
        let err = SafetyError::denied("lateral_control", "curvature rate out of band");
        assert!(err.to_string().contains("lateral_control"));
        assert!(err.to_string().contains("curvature rate"));
    }
}

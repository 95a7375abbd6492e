//! [`BusForwarder`] – inter-bus passthrough with stock-LKAS isolation.
//!
//! The controller sits between the vehicle (main bus) and the stock ADAS
//! camera (camera bus). Everything from the vehicle is passed to the camera
//! so the stock system keeps working. Everything from the camera is passed
//! back, except the stock lane-keeping / ACC messages that the controller
//! sends itself. Frames from any other bus are never forwarded.
//!
//! # Example
//!
//! ```
//! use canguard_kernel::forwarder::BusForwarder;
//! use canguard_types::CanFrame;
//!
//! let fwd = BusForwarder::new(0, 2, vec![0x3CA, 0x3D3]);
//! let lkas = CanFrame::new(0, 0x3CA, &[0; 8]).unwrap();
//!
//! assert_eq!(fwd.forward(0, &lkas), Some(2));
//! assert_eq!(fwd.forward(2, &lkas), None);
//! assert_eq!(fwd.forward(2, &CanFrame::new(2, 0x100, &[0; 8]).unwrap()), Some(0));
//! assert_eq!(fwd.forward(1, &lkas), None);
//! ```

use canguard_types::{BusId, CanFrame};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusForwarder {
    main_bus: BusId,
    camera_bus: BusId,
    blocked: Vec<u32>,
}

impl BusForwarder {
    /// `blocked` lists the camera-bus addresses that must not reach the
    /// main bus.
    pub fn new(main_bus: BusId, camera_bus: BusId, blocked: Vec<u32>) -> Self {
        Self {
            main_bus,
            camera_bus,
            blocked,
        }
    }

    pub fn main_bus(&self) -> BusId {
        self.main_bus
    }

    /// `true` for addresses the stock camera sends and the controller owns.
    pub fn is_blocked(&self, address: u32) -> bool {
        self.blocked.contains(&address)
    }

    /// Destination bus for a frame received on `source_bus`, or `None` when
    /// it must be dropped.
    pub fn forward(&self, source_bus: BusId, frame: &CanFrame) -> Option<BusId> {
        if source_bus == self.main_bus {
            Some(self.camera_bus)
        } else if source_bus == self.camera_bus && !self.is_blocked(frame.address) {
            Some(self.main_bus)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ford_like() -> BusForwarder {
        BusForwarder::new(0, 2, vec![0x18A, 0x3CA, 0x3D3, 0x3D8])
    }

    fn frame(address: u32) -> CanFrame {
        CanFrame::new(0, address, &[0; 8]).unwrap()
    }

    #[test]
    fn main_bus_forwards_everything_to_camera() {
        let fwd = ford_like();
        for addr in [0x3CA, 0x3D3, 0x165, 0x7FF] {
            assert_eq!(fwd.forward(0, &frame(addr)), Some(2));
        }
    }

    #[test]
    fn camera_bus_suppresses_stock_lkas() {
        let fwd = ford_like();
        for addr in [0x18A, 0x3CA, 0x3D3, 0x3D8] {
            assert_eq!(fwd.forward(2, &frame(addr)), None, "{addr:#x}");
        }
        assert_eq!(fwd.forward(2, &frame(0x083)), Some(0));
    }

    #[test]
    fn unknown_bus_is_never_forwarded() {
        let fwd = ford_like();
        for bus in [1, 3, 7, 255] {
            assert_eq!(fwd.forward(bus, &frame(0x165)), None);
        }
    }

    #[test]
    fn forwarding_is_stateless() {
        let fwd = ford_like();
        let f = frame(0x3CA);
        let first = fwd.forward(2, &f);
        for _ in 0..10 {
            assert_eq!(fwd.forward(2, &f), first);
        }
    }
}

//! Generic `CanTransceiver` trait – the seam to the physical bus driver.
//!
//! The safety engine never talks to hardware directly. A board support
//! crate implements this trait for each CAN controller; tests and the replay
//! tool use [`SimBus`][crate::sim::SimBus].

use canguard_types::{BusId, CanFrame, SafetyError};

/// One CAN controller attached to one physical bus.
pub trait CanTransceiver: Send {
    /// Bus number this controller is wired to.
    fn bus(&self) -> BusId;

    /// Queue `frame` for transmission.
    ///
    /// # Errors
    ///
    /// Returns [`SafetyError::Transport`] when the controller refuses the
    /// frame (mailbox full, bus-off, …).
    fn send(&mut self, frame: CanFrame) -> Result<(), SafetyError>;

    /// Pop the next received frame, if any. Never blocks.
    fn recv(&mut self) -> Option<CanFrame>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LoopbackBus {
        bus: BusId,
        pending: Option<CanFrame>,
    }

    impl CanTransceiver for LoopbackBus {
        fn bus(&self) -> BusId {
            self.bus
        }

        fn send(&mut self, frame: CanFrame) -> Result<(), SafetyError> {
            if self.pending.is_some() {
                return Err(SafetyError::Transport {
                    bus: self.bus.to_string(),
                    details: "mailbox full".to_string(),
                });
            }
            self.pending = Some(frame);
            Ok(())
        }

        fn recv(&mut self) -> Option<CanFrame> {
            self.pending.take()
        }
    }

    #[test]
    fn loopback_returns_sent_frame() {
        let mut bus = LoopbackBus { bus: 1, pending: None };
        let frame = CanFrame::new(1, 0x42, &[1, 2, 3]).unwrap();
        bus.send(frame).unwrap();
        assert!(bus.send(frame).is_err());
        assert_eq!(bus.recv(), Some(frame));
        assert_eq!(bus.recv(), None);
        assert_eq!(bus.bus(), 1);
    }
}

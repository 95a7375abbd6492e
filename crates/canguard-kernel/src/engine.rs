//! [`SafetyEngine`] – the receive, transmit and forwarding hooks for one
//! vehicle.
//!
//! The engine owns every piece of runtime state (address monitor, vehicle
//! state, relay latch). Nothing is process-global, so several engines can
//! run side by side. Three paths touch it:
//!
//! 1. **Receive** – [`rx`][SafetyEngine::rx] / [`process_rx`][SafetyEngine::process_rx]:
//!    validate the frame, update vehicle state from valid frames, latch a
//!    relay malfunction, and decide where to forward it. Forwarding never
//!    depends on the verdict or the relay latch.
//! 2. **Transmit** – [`authorize`][SafetyEngine::authorize]: allow or deny
//!    a frame from the driving-policy software. Accepted lateral commands
//!    become the reference for the next curvature rate check.
//! 3. **Timer** – [`tick`][SafetyEngine::tick]: liveness timeouts.
//!
//! While any monitored source is degraded, or once a relay malfunction is
//! latched, controls are held off.
//!
//! # Example
//!
//! ```
//! use canguard_kernel::{EngineOptions, SafetyEngine, VehicleModel};
//! use canguard_types::CanFrame;
//!
//! let profile = VehicleModel::Ford.profile().unwrap();
//! let mut engine = SafetyEngine::new(profile, EngineOptions::default()).unwrap();
//!
//! // Unknown traffic from the vehicle passes through to the camera.
//! let outcome = engine.process_rx(&CanFrame::new(0, 0x7E8, &[0; 8]).unwrap());
//! assert_eq!(outcome.forward, Some(2));
//!
//! // No sources seen yet: resume is denied.
//! let mut resume = CanFrame::new(0, 0x083, &[0; 8]).unwrap();
//! resume.data[3] = 0x02;
//! assert!(!engine.authorize(&resume));
//! ```

use canguard_hal::SampleBuffer;
use canguard_types::{AddrHealth, BusId, CanFrame, RxVerdict, SafetyError, VehicleState};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::address_monitor::AddressMonitor;
use crate::forwarder::BusForwarder;
use crate::gatekeeper::{Gatekeeper, TxContext};
use crate::profile::VehicleProfile;
use crate::state_tracker::{EngineOptions, VehicleStateTracker};

/// Result of the combined receive path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RxOutcome {
    pub verdict: RxVerdict,
    /// Bus to copy the frame to, `None` to drop it.
    pub forward: Option<BusId>,
}

pub struct SafetyEngine {
    name: &'static str,
    monitor: AddressMonitor,
    tracker: VehicleStateTracker,
    gatekeeper: Gatekeeper,
    forwarder: BusForwarder,
    controls_inhibited: bool,
    relay_malfunction: bool,
}

impl SafetyEngine {
    /// Validate `profile` and build an engine with empty runtime state.
    ///
    /// # Errors
    ///
    /// [`SafetyError::InvalidProfile`] if the profile fails validation.
    pub fn new(profile: VehicleProfile, options: EngineOptions) -> Result<Self, SafetyError> {
        profile.validate()?;

        let VehicleProfile {
            name,
            main_bus,
            camera_bus,
            tx_allow_list,
            addr_checks,
            rx_rules,
            stock_lkas_addresses,
            tx_rules,
            ..
        } = profile;

        let mut gatekeeper = Gatekeeper::new(tx_allow_list);
        for rule in tx_rules {
            gatekeeper.add_rule(rule);
        }

        let mut engine = Self {
            name,
            monitor: AddressMonitor::new(addr_checks),
            tracker: VehicleStateTracker::new(rx_rules, options),
            gatekeeper,
            forwarder: BusForwarder::new(main_bus, camera_bus, stock_lkas_addresses),
            controls_inhibited: false,
            relay_malfunction: false,
        };
        engine.update_inhibition();
        info!(
            vehicle = name,
            allow_gas_override = options.allow_gas_override,
            "safety engine initialised"
        );
        Ok(engine)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    // ── Receive path ────────────────────────────────────────────────────────

    /// `true` unless `frame` is a monitored message failing a check.
    pub fn check(&mut self, frame: &CanFrame) -> bool {
        self.rx(frame).is_valid()
    }

    /// Validate `frame` and apply it to the vehicle state.
    ///
    /// Invalid frames leave the state untouched. Unmonitored frames are
    /// still decoded if a state rule covers them.
    pub fn rx(&mut self, frame: &CanFrame) -> RxVerdict {
        let verdict = self.monitor.verdict(frame);
        if verdict.is_valid() {
            self.tracker.on_valid_frame(frame);
            let on_main_bus = frame.bus == self.forwarder.main_bus();
            if on_main_bus && self.forwarder.is_blocked(frame.address) {
                self.latch_relay_malfunction(frame.address);
            }
        }
        self.update_inhibition();
        verdict
    }

    /// Receive path plus forwarding decision.
    pub fn process_rx(&mut self, frame: &CanFrame) -> RxOutcome {
        let verdict = self.rx(frame);
        RxOutcome {
            verdict,
            forward: self.forward(frame.bus, frame),
        }
    }

    /// Destination for a frame received on `source_bus`.
    pub fn forward(&self, source_bus: BusId, frame: &CanFrame) -> Option<BusId> {
        self.forwarder.forward(source_bus, frame)
    }

    /// Re-evaluate liveness at `now_us` without a frame arriving.
    pub fn tick(&mut self, now_us: u64) {
        self.monitor.tick(now_us);
        self.update_inhibition();
    }

    fn latch_relay_malfunction(&mut self, address: u32) {
        if !self.relay_malfunction {
            warn!(
                addr = %format_args!("{:#x}", address),
                "relay malfunction: stock camera message on main bus"
            );
        }
        self.relay_malfunction = true;
    }

    fn update_inhibition(&mut self) {
        let inhibited = self.relay_malfunction || self.monitor.degraded();
        if inhibited != self.controls_inhibited {
            if inhibited {
                warn!(vehicle = self.name, "controls inhibited");
            } else {
                info!(vehicle = self.name, "all monitored sources healthy");
            }
            self.controls_inhibited = inhibited;
        }
        if inhibited && self.tracker.state().controls_allowed {
            self.tracker.disengage("controls inhibited");
        }
    }

    // ── Transmit path ───────────────────────────────────────────────────────

    /// Decide whether `frame` may be transmitted and record accepted
    /// lateral commands.
    pub fn authorize(&mut self, frame: &CanFrame) -> bool {
        self.try_authorize(frame).is_ok()
    }

    /// Like [`authorize`][Self::authorize], reporting why a frame was
    /// denied.
    ///
    /// # Errors
    ///
    /// [`SafetyError::TxDenied`] naming the first failing check.
    pub fn try_authorize(&mut self, frame: &CanFrame) -> Result<(), SafetyError> {
        match self.evaluate_tx(frame) {
            Ok(()) => {
                if let Some(curvature) = self.gatekeeper.commanded_curvature(frame) {
                    self.tracker.set_last_curvature(curvature);
                }
                Ok(())
            }
            Err(e) => {
                debug!(
                    addr = %format_args!("{:#x}", frame.address),
                    bus = frame.bus,
                    error = %e,
                    "tx denied"
                );
                Err(e)
            }
        }
    }

    /// Verdict for `frame` without recording anything.
    ///
    /// # Errors
    ///
    /// [`SafetyError::TxDenied`] naming the first failing check.
    pub fn evaluate_tx(&self, frame: &CanFrame) -> Result<(), SafetyError> {
        let ctx = TxContext {
            controls_inhibited: self.controls_inhibited,
            relay_malfunction: self.relay_malfunction,
            ..TxContext::new(self.tracker.state(), self.tracker.yaw_samples())
        };
        self.gatekeeper.evaluate(frame, &ctx)
    }

    // ── State query ─────────────────────────────────────────────────────────

    pub fn state(&self) -> &VehicleState {
        self.tracker.state()
    }

    pub fn yaw_samples(&self) -> &SampleBuffer {
        self.tracker.yaw_samples()
    }

    pub fn health(&self) -> Vec<AddrHealth> {
        self.monitor.health()
    }

    pub fn controls_inhibited(&self) -> bool {
        self.controls_inhibited
    }

    pub fn relay_malfunction(&self) -> bool {
        self.relay_malfunction
    }

    /// Back to the just-initialised state, as after a power cycle.
    pub fn reset(&mut self) {
        self.monitor.reset();
        self.tracker.reset();
        self.relay_malfunction = false;
        self.controls_inhibited = false;
        self.update_inhibition();
        info!(vehicle = self.name, "safety engine reset");
    }
}

//! [`VehicleStateTracker`] – derives [`VehicleState`] from validated frames.
//!
//! The tracker is the single writer of the vehicle state. Each field has one
//! authoritative source message, described by an [`RxRule`] in the vehicle
//! profile. The tracker also runs the controls-allowed state machine:
//!
//! ```text
//! disabled ──(cruise engaged rising edge, no brake / gas override)──▶ enabled
//! enabled  ──(cruise off | brake | gas edge | cancel | degraded)───▶ disabled
//! ```
//!
//! It never forces controls on; the only way in is a cruise engagement edge.

use canguard_hal::{SampleBuffer, SignalSpec};
use canguard_types::{BusId, CanFrame, VehicleState};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Runtime options that are not part of a vehicle profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// When `true`, pressing the gas pedal does not disengage controls.
    #[serde(default)]
    pub allow_gas_override: bool,
}

/// How one signal of a received message updates the vehicle state.
#[derive(Debug, Clone, PartialEq)]
pub enum StateSignal {
    /// `vehicle_moving = raw == moving_value`.
    Standstill { signal: SignalSpec, moving_value: u64 },
    /// `vehicle_speed = max(value, 0)` in m/s.
    Speed { signal: SignalSpec },
    /// Yaw rate in rad/s plus the sensor's own quality sub-field.
    YawRate {
        signal: SignalSpec,
        quality: SignalSpec,
        quality_ok: u64,
    },
    /// `gas_pressed = raw > 0`.
    Gas { signal: SignalSpec },
    /// `brake_pressed = raw == pressed_value`.
    Brake { signal: SignalSpec, pressed_value: u64 },
    /// Cruise is engaged when the state sub-field is one of `engaged_values`.
    Cruise {
        signal: SignalSpec,
        engaged_values: Vec<u64>,
    },
    /// A driver cancel press disengages controls.
    CancelButton { signal: SignalSpec },
}

/// Binds a [`StateSignal`] to the message and bus it is decoded from.
#[derive(Debug, Clone, PartialEq)]
pub struct RxRule {
    pub address: u32,
    pub bus: BusId,
    pub update: StateSignal,
}

/// Single writer of [`VehicleState`].
#[derive(Debug, Clone)]
pub struct VehicleStateTracker {
    rules: Vec<RxRule>,
    options: EngineOptions,
    state: VehicleState,
    yaw_samples: SampleBuffer,
}

impl VehicleStateTracker {
    pub fn new(rules: Vec<RxRule>, options: EngineOptions) -> Self {
        Self {
            rules,
            options,
            state: VehicleState::default(),
            yaw_samples: SampleBuffer::new(),
        }
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    /// Recent yaw-rate samples (rad/s).
    pub fn yaw_samples(&self) -> &SampleBuffer {
        &self.yaw_samples
    }

    /// Apply every rule for this frame's address and bus, then run the
    /// generic override checks. Call only for frames the address monitor
    /// did not reject.
    pub fn on_valid_frame(&mut self, frame: &CanFrame) {
        let rules = std::mem::take(&mut self.rules);
        let mut matched = false;
        for rule in rules
            .iter()
            .filter(|r| r.address == frame.address && r.bus == frame.bus)
        {
            matched = true;
            self.apply(&rule.update, frame);
        }
        self.rules = rules;
        if matched {
            self.override_checks();
        }
    }

    fn apply(&mut self, update: &StateSignal, frame: &CanFrame) {
        match update {
            StateSignal::Standstill {
                signal,
                moving_value,
            } => {
                self.state.vehicle_moving = signal.raw(frame) == *moving_value;
            }
            StateSignal::Speed { signal } => {
                self.state.vehicle_speed = signal.value(frame).max(0.0);
            }
            StateSignal::YawRate {
                signal,
                quality,
                quality_ok,
            } => {
                let yaw_rate = signal.value(frame);
                self.state.yaw_rate = yaw_rate;
                self.yaw_samples.push(yaw_rate);
                self.state.yaw_rate_valid = quality.raw(frame) == *quality_ok;
            }
            StateSignal::Gas { signal } => {
                self.state.gas_pressed = signal.raw(frame) > 0;
            }
            StateSignal::Brake {
                signal,
                pressed_value,
            } => {
                self.state.brake_pressed = signal.raw(frame) == *pressed_value;
            }
            StateSignal::Cruise {
                signal,
                engaged_values,
            } => {
                let raw = signal.raw(frame);
                self.cruise_check(engaged_values.contains(&raw));
            }
            StateSignal::CancelButton { signal } => {
                if signal.raw(frame) != 0 {
                    self.disengage("cancel button pressed");
                }
            }
        }
    }

    /// Cruise engagement edge detection.
    fn cruise_check(&mut self, engaged: bool) {
        self.state.cruise_engaged = engaged;
        if !engaged {
            self.disengage("cruise disengaged");
        } else if !self.state.cruise_engaged_prev && !self.override_active() {
            if !self.state.controls_allowed {
                info!("controls allowed: cruise engaged");
            }
            self.state.controls_allowed = true;
        }
        self.state.cruise_engaged_prev = engaged;
    }

    fn override_active(&self) -> bool {
        self.state.brake_pressed || (self.state.gas_pressed && !self.options.allow_gas_override)
    }

    fn override_checks(&mut self) {
        let s = self.state;
        if s.gas_pressed && !s.gas_pressed_prev && !self.options.allow_gas_override {
            self.disengage("gas pressed");
        }
        if s.brake_pressed && (!s.brake_pressed_prev || s.vehicle_moving) {
            self.disengage("brake pressed");
        }
        self.state.gas_pressed_prev = s.gas_pressed;
        self.state.brake_pressed_prev = s.brake_pressed;
    }

    /// Force controls off and drop the curvature reference. Never turns
    /// controls on.
    pub fn disengage(&mut self, reason: &str) {
        if self.state.controls_allowed {
            info!(reason, "controls disengaged");
        } else {
            debug!(reason, "disengage while already disabled");
        }
        self.state.controls_allowed = false;
        self.state.last_curvature = 0.0;
    }

    /// Record the curvature of a lateral command the gatekeeper accepted.
    pub fn set_last_curvature(&mut self, curvature: f64) {
        self.state.last_curvature = curvature;
    }

    pub fn reset(&mut self) {
        self.state = VehicleState::default();
        self.yaw_samples.clear();
    }
}

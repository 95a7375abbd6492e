//! Built-in [`TxRule`]s.
//!
//! - [`ButtonRule`] – cancel and resume presses in a shared driver-control
//!   message must agree with the current cruise / controls state.
//! - [`PassiveActionRule`] – display-only messages must keep their action
//!   sub-field at the inactive sentinel.
//! - [`LateralControlRule`] – steering curvature requests: neutral auxiliary
//!   axes, operator authorization, trustworthy yaw rate and a speed-dependent
//!   curvature rate band.
//!
//! Every rule denies a frame rather than rewriting it.

use canguard_hal::{LookupTable, SignalSpec};
use canguard_types::{CanFrame, SafetyError};

use crate::gatekeeper::{TxContext, TxRule};

/// Slack for comparing decoded curvature against the rate band.
const CURVATURE_EPSILON: f64 = 1e-9;

// ────────────────────────────────────────────────────────────────────────────
// ButtonRule
// ────────────────────────────────────────────────────────────────────────────

/// Cancel and resume buttons carried in a driver-control message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ButtonRule {
    pub address: u32,
    pub cancel: SignalSpec,
    pub resume: SignalSpec,
}

impl TxRule for ButtonRule {
    fn name(&self) -> &str {
        "buttons"
    }

    fn check(&self, frame: &CanFrame, ctx: &TxContext<'_>) -> Result<(), SafetyError> {
        if frame.address != self.address {
            return Ok(());
        }
        if self.cancel.raw(frame) != 0 && !ctx.state.cruise_engaged_prev {
            return Err(SafetyError::denied(
                self.name(),
                "cancel pressed while cruise is not engaged",
            ));
        }
        if self.resume.raw(frame) != 0 && !ctx.controls_allowed() {
            return Err(SafetyError::denied(
                self.name(),
                "resume pressed while controls are not allowed",
            ));
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PassiveActionRule
// ────────────────────────────────────────────────────────────────────────────

/// A message that may only be sent with its action field inactive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassiveActionRule {
    pub address: u32,
    pub action: SignalSpec,
    pub inactive: u64,
}

impl TxRule for PassiveActionRule {
    fn name(&self) -> &str {
        "passive_action"
    }

    fn check(&self, frame: &CanFrame, _ctx: &TxContext<'_>) -> Result<(), SafetyError> {
        if frame.address != self.address {
            return Ok(());
        }
        let action = self.action.raw(frame);
        if action != self.inactive {
            return Err(SafetyError::denied(
                self.name(),
                format!(
                    "{} = {action}, must be {} on {:#x}",
                    self.action.name, self.inactive, self.address
                ),
            ));
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LateralControlRule
// ────────────────────────────────────────────────────────────────────────────

/// Sub-fields of a curvature-based steering command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LateralSignals {
    pub control_type: SignalSpec,
    /// Scaled to 1/m.
    pub curvature: SignalSpec,
    pub curvature_rate: SignalSpec,
    pub path_angle: SignalSpec,
    pub path_offset: SignalSpec,
}

/// Raw sentinel values meaning "no request" for each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeutralValues {
    pub curvature: u64,
    pub curvature_rate: u64,
    pub path_angle: u64,
    pub path_offset: u64,
}

/// Cross-check of requested curvature against the measured yaw rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YawPlausibility {
    /// Below this speed (m/s) the measured curvature is too noisy to use.
    pub min_speed: f64,
    /// Allowed distance (1/m) outside the measured curvature range.
    pub max_deviation: f64,
}

/// Speed-dependent curvature limits of a vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct SteeringLimits {
    /// Maximum per-cycle curvature change away from straight, by speed.
    pub rate_up: LookupTable,
    /// Maximum per-cycle curvature change toward straight, by speed.
    pub rate_down: LookupTable,
    /// Absolute curvature bound (1/m). `None` until vehicle dynamics data
    /// provides one.
    pub max_curvature: Option<f64>,
    pub yaw_plausibility: Option<YawPlausibility>,
}

impl SteeringLimits {
    /// Permitted `[lowest, highest]` curvature for the next request.
    ///
    /// Moving away from zero uses the `rate_up` limit and moving back toward
    /// zero uses `rate_down`. A previous request of exactly zero counts as
    /// positive.
    pub fn rate_band(&self, last: f64, speed: f64) -> (f64, f64) {
        let up = self.rate_up.interpolate(speed);
        let down = self.rate_down.interpolate(speed);
        if last >= 0.0 {
            (last - down, last + up)
        } else {
            (last - up, last + down)
        }
    }
}

/// Validates a curvature-based lateral control message.
#[derive(Debug, Clone, PartialEq)]
pub struct LateralControlRule {
    pub address: u32,
    pub signals: LateralSignals,
    pub neutral: NeutralValues,
    pub limits: SteeringLimits,
}

impl LateralControlRule {
    /// A request is active when it selects a control mode or moves the
    /// curvature off its inactive sentinel.
    pub fn steer_enabled(&self, frame: &CanFrame) -> bool {
        self.signals.control_type.raw(frame) != 0
            || self.signals.curvature.raw(frame) != self.neutral.curvature
    }

    fn check_auxiliary(&self, frame: &CanFrame) -> Result<(), SafetyError> {
        let axes = [
            (&self.signals.curvature_rate, self.neutral.curvature_rate),
            (&self.signals.path_angle, self.neutral.path_angle),
            (&self.signals.path_offset, self.neutral.path_offset),
        ];
        for (signal, neutral) in axes {
            let raw = signal.raw(frame);
            if raw != neutral {
                return Err(SafetyError::denied(
                    self.name(),
                    format!("{} = {raw} is not neutral ({neutral})", signal.name),
                ));
            }
        }
        Ok(())
    }

    fn check_rate(&self, curvature: f64, ctx: &TxContext<'_>) -> Result<(), SafetyError> {
        let (lowest, highest) = self
            .limits
            .rate_band(ctx.state.last_curvature, ctx.state.vehicle_speed);
        if curvature > highest + CURVATURE_EPSILON || curvature < lowest - CURVATURE_EPSILON {
            return Err(SafetyError::denied(
                self.name(),
                format!(
                    "curvature {curvature:.5} outside [{lowest:.5}, {highest:.5}] at {:.1} m/s",
                    ctx.state.vehicle_speed
                ),
            ));
        }
        Ok(())
    }

    fn check_magnitude(&self, curvature: f64) -> Result<(), SafetyError> {
        match self.limits.max_curvature {
            Some(max) if curvature.abs() > max => Err(SafetyError::denied(
                self.name(),
                format!("|curvature| {:.5} exceeds {max:.5}", curvature.abs()),
            )),
            _ => Ok(()),
        }
    }

    fn check_plausibility(&self, curvature: f64, ctx: &TxContext<'_>) -> Result<(), SafetyError> {
        let Some(plausibility) = self.limits.yaw_plausibility else {
            return Ok(());
        };
        let speed = ctx.state.vehicle_speed;
        if speed <= plausibility.min_speed || ctx.yaw_samples.is_empty() {
            return Ok(());
        }
        let lowest = ctx.yaw_samples.min() / speed - plausibility.max_deviation;
        let highest = ctx.yaw_samples.max() / speed + plausibility.max_deviation;
        if curvature < lowest || curvature > highest {
            return Err(SafetyError::denied(
                self.name(),
                format!(
                    "curvature {curvature:.5} inconsistent with measured [{lowest:.5}, {highest:.5}]"
                ),
            ));
        }
        Ok(())
    }
}

impl TxRule for LateralControlRule {
    fn name(&self) -> &str {
        "lateral_control"
    }

    fn check(&self, frame: &CanFrame, ctx: &TxContext<'_>) -> Result<(), SafetyError> {
        if frame.address != self.address {
            return Ok(());
        }
        self.check_auxiliary(frame)?;

        if !self.steer_enabled(frame) {
            return Ok(());
        }
        if !ctx.controls_allowed() {
            return Err(SafetyError::denied(
                self.name(),
                "steering requested while controls are not allowed",
            ));
        }
        if !ctx.state.yaw_rate_valid {
            return Err(SafetyError::denied(
                self.name(),
                "steering requested without a valid yaw rate",
            ));
        }

        let curvature = self.signals.curvature.value(frame);
        self.check_rate(curvature, ctx)?;
        self.check_magnitude(curvature)?;
        self.check_plausibility(curvature, ctx)
    }

    /// Only active requests move the rate-band reference. A neutral frame
    /// leaves it at the last active command.
    fn commanded_curvature(&self, frame: &CanFrame) -> Option<f64> {
        (frame.address == self.address && self.steer_enabled(frame))
            .then(|| self.signals.curvature.value(frame))
    }
}

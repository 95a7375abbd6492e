//! [`Gatekeeper`] – single interception point for outbound frames.
//!
//! Before the controller puts a frame from the driving-policy software on
//! the bus it must pass [`Gatekeeper::authorize`]. Checks run in order and
//! the first failure denies the frame:
//!
//! 1. **Relay** – nothing is transmitted while a relay malfunction is
//!    latched.
//! 2. **Allow-list** – `(address, bus, length)` must exactly match a
//!    [`MessageDescriptor`].
//! 3. **Rules** – every registered [`TxRule`] in insertion order.
//!
//! The gatekeeper never rewrites a payload. A denial is an expected outcome,
//! not an error in the controller.
//!
//! # Example
//!
//! ```
//! use canguard_hal::SignalSpec;
//! use canguard_kernel::gatekeeper::{Gatekeeper, TxContext};
//! use canguard_kernel::tx_rules::PassiveActionRule;
//! use canguard_hal::SampleBuffer;
//! use canguard_types::{CanFrame, MessageDescriptor, VehicleState};
//!
//! let mut gate = Gatekeeper::new(vec![MessageDescriptor::new(0x3CA, 0, 8)]);
//! gate.add_rule(Box::new(PassiveActionRule {
//!     address: 0x3CA,
//!     action: SignalSpec::be("action", 0, 5, 3),
//!     inactive: 0,
//! }));
//!
//! let state = VehicleState::default();
//! let samples = SampleBuffer::new();
//! let ctx = TxContext::new(&state, &samples);
//!
//! assert!(gate.authorize(&CanFrame::new(0, 0x3CA, &[0; 8]).unwrap(), &ctx));
//! assert!(!gate.authorize(&CanFrame::new(0, 0x3CA, &[0x20, 0, 0, 0, 0, 0, 0, 0]).unwrap(), &ctx));
//! assert!(!gate.authorize(&CanFrame::new(1, 0x3CA, &[0; 8]).unwrap(), &ctx));
//! ```

use std::collections::HashSet;

use canguard_hal::SampleBuffer;
use canguard_types::{CanFrame, MessageDescriptor, SafetyError, VehicleState};
use tracing::debug;

// ────────────────────────────────────────────────────────────────────────────
// Context
// ────────────────────────────────────────────────────────────────────────────

/// Read-only view of everything a [`TxRule`] may consult.
#[derive(Debug, Clone, Copy)]
pub struct TxContext<'a> {
    pub state: &'a VehicleState,
    pub yaw_samples: &'a SampleBuffer,
    /// A monitored source is degraded; actuation must not rely on state.
    pub controls_inhibited: bool,
    pub relay_malfunction: bool,
}

impl<'a> TxContext<'a> {
    /// Context with no inhibition flags raised.
    pub fn new(state: &'a VehicleState, yaw_samples: &'a SampleBuffer) -> Self {
        Self {
            state,
            yaw_samples,
            controls_inhibited: false,
            relay_malfunction: false,
        }
    }

    /// Controls are allowed and nothing inhibits them.
    pub fn controls_allowed(&self) -> bool {
        self.state.controls_allowed && !self.controls_inhibited && !self.relay_malfunction
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Rule trait
// ────────────────────────────────────────────────────────────────────────────

/// A semantic check on one kind of outbound message.
///
/// Implement this trait for per-message rules and register them with
/// [`Gatekeeper::add_rule`].
pub trait TxRule: Send + Sync {
    /// Name used in denial messages.
    fn name(&self) -> &str;

    /// Return `Ok(())` when `frame` is acceptable, or
    /// [`SafetyError::TxDenied`] otherwise. Frames the rule does not cover
    /// must pass.
    fn check(&self, frame: &CanFrame, ctx: &TxContext<'_>) -> Result<(), SafetyError>;

    /// Curvature actively commanded by `frame`, for rules that cover
    /// lateral control. `None` for neutral requests.
    fn commanded_curvature(&self, _frame: &CanFrame) -> Option<f64> {
        None
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Gatekeeper
// ────────────────────────────────────────────────────────────────────────────

/// Allow-list plus ordered [`TxRule`]s.
#[derive(Default)]
pub struct Gatekeeper {
    allow_list: Vec<MessageDescriptor>,
    rules: Vec<Box<dyn TxRule>>,
}

impl Gatekeeper {
    pub fn new(allow_list: Vec<MessageDescriptor>) -> Self {
        Self {
            allow_list,
            rules: Vec::new(),
        }
    }

    /// Register a rule. Rules are evaluated in insertion order.
    pub fn add_rule(&mut self, rule: Box<dyn TxRule>) {
        self.rules.push(rule);
    }

    pub fn allow_list(&self) -> &[MessageDescriptor] {
        &self.allow_list
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// `true` when `frame` may be transmitted.
    pub fn authorize(&self, frame: &CanFrame, ctx: &TxContext<'_>) -> bool {
        match self.evaluate(frame, ctx) {
            Ok(()) => true,
            Err(e) => {
                debug!(
                    addr = %format_args!("{:#x}", frame.address),
                    bus = frame.bus,
                    error = %e,
                    "tx denied"
                );
                false
            }
        }
    }

    /// Like [`authorize`][Self::authorize], reporting the first denial.
    ///
    /// # Errors
    ///
    /// [`SafetyError::TxDenied`] naming the failing check.
    pub fn evaluate(&self, frame: &CanFrame, ctx: &TxContext<'_>) -> Result<(), SafetyError> {
        if ctx.relay_malfunction {
            return Err(SafetyError::denied("relay", "relay malfunction latched"));
        }
        if !self.allow_list.iter().any(|d| d.matches(frame)) {
            return Err(SafetyError::denied(
                "allow_list",
                format!(
                    "{:#x} on bus {} with length {} is not allowed",
                    frame.address, frame.bus, frame.len
                ),
            ));
        }
        for rule in &self.rules {
            rule.check(frame, ctx)?;
        }
        Ok(())
    }

    /// Curvature commanded by `frame`, if any rule covers lateral control
    /// for it.
    pub fn commanded_curvature(&self, frame: &CanFrame) -> Option<f64> {
        self.rules.iter().find_map(|r| r.commanded_curvature(frame))
    }
}

/// Reject allow-lists that name the same `(address, bus)` pair twice.
///
/// # Errors
///
/// [`SafetyError::InvalidProfile`] naming the duplicate.
pub fn validate_allow_list(allow_list: &[MessageDescriptor]) -> Result<(), SafetyError> {
    let mut seen = HashSet::new();
    for desc in allow_list {
        if !seen.insert((desc.address, desc.bus)) {
            return Err(SafetyError::InvalidProfile(format!(
                "duplicate allow-list entry {:#x} on bus {}",
                desc.address, desc.bus
            )));
        }
    }
    Ok(())
}

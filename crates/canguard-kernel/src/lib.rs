//! `canguard-kernel` – the CAN safety policy engine.
//!
//! Sits inline between the vehicle, the stock ADAS camera and the driving
//! policy. It does not decide what the car should do; it decides what may
//! reach the actuators.
//!
//! # Modules
//!
//! - [`address_monitor`] – [`AddressMonitor`][address_monitor::AddressMonitor]:
//!   per-address length, counter, checksum and liveness checks on received
//!   frames.
//! - [`state_tracker`] – [`VehicleStateTracker`][state_tracker::VehicleStateTracker]:
//!   single writer of the [`VehicleState`][canguard_types::VehicleState] and
//!   the controls-allowed state machine.
//! - [`gatekeeper`] – [`Gatekeeper`][gatekeeper::Gatekeeper]: allow-list plus
//!   ordered [`TxRule`][gatekeeper::TxRule]s for every outbound frame.
//! - [`tx_rules`] – the built-in button, passive-action and lateral-control
//!   rules, including the curvature rate band.
//! - [`forwarder`] – [`BusForwarder`][forwarder::BusForwarder]: passthrough
//!   between the main and camera buses with stock-LKAS isolation.
//! - [`profile`] / [`profiles`] – [`VehicleProfile`][profile::VehicleProfile]
//!   tables and the [`VehicleModel`][profile::VehicleModel] registry.
//! - [`engine`] – [`SafetyEngine`][engine::SafetyEngine]: wires everything
//!   into the rx / tx / forward / tick hooks.

pub mod address_monitor;
pub mod engine;
pub mod forwarder;
pub mod gatekeeper;
pub mod profile;
pub mod profiles;
pub mod state_tracker;
pub mod tx_rules;

pub use address_monitor::{AddrCheckEntry, AddrCheckVariant, AddressMonitor, CounterSpec};
pub use engine::{RxOutcome, SafetyEngine};
pub use forwarder::BusForwarder;
pub use gatekeeper::{Gatekeeper, TxContext, TxRule};
pub use profile::{VehicleModel, VehicleProfile};
pub use state_tracker::{EngineOptions, RxRule, StateSignal, VehicleStateTracker};
pub use tx_rules::{
    ButtonRule, LateralControlRule, LateralSignals, NeutralValues, PassiveActionRule,
    SteeringLimits, YawPlausibility,
};

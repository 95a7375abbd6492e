//! [`VehicleProfile`] – static per-vehicle configuration.
//!
//! A profile bundles every table the engine needs for one vehicle family:
//! the transmit allow-list, the monitored receive messages, the state decode
//! rules, the stock messages the controller takes over, and the transmit
//! rules with their steering limits. It is supplied once at initialisation
//! and never mutated afterwards.
//!
//! Profiles are selected by [`VehicleModel`], which (de)serializes as a
//! lowercase string so it can live in a config file.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use canguard_types::{BusId, MessageDescriptor, SafetyError};
use serde::{Deserialize, Serialize};

use crate::address_monitor::{AddrCheckEntry, MAX_ADDR_CHECK_VARIANTS};
use crate::gatekeeper::{validate_allow_list, TxRule};
use crate::profiles;
use crate::state_tracker::RxRule;
use crate::tx_rules::SteeringLimits;

pub struct VehicleProfile {
    pub name: &'static str,
    pub main_bus: BusId,
    pub camera_bus: BusId,
    pub tx_allow_list: Vec<MessageDescriptor>,
    pub addr_checks: Vec<AddrCheckEntry>,
    pub rx_rules: Vec<RxRule>,
    /// Stock camera messages the controller replaces. Blocked from the
    /// camera bus and a relay fault when seen on the main bus.
    pub stock_lkas_addresses: Vec<u32>,
    /// Limits also held by the lateral rule, kept here for display.
    pub steering_limits: SteeringLimits,
    pub tx_rules: Vec<Box<dyn TxRule>>,
}

impl fmt::Debug for VehicleProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rules: Vec<&str> = self.tx_rules.iter().map(|r| r.name()).collect();
        f.debug_struct("VehicleProfile")
            .field("name", &self.name)
            .field("main_bus", &self.main_bus)
            .field("camera_bus", &self.camera_bus)
            .field("tx_allow_list", &self.tx_allow_list)
            .field("addr_checks", &self.addr_checks)
            .field("rx_rules", &self.rx_rules)
            .field("stock_lkas_addresses", &self.stock_lkas_addresses)
            .field("steering_limits", &self.steering_limits)
            .field("tx_rules", &rules)
            .finish()
    }
}

impl VehicleProfile {
    /// Reject profiles the engine cannot run safely.
    ///
    /// # Errors
    ///
    /// [`SafetyError::InvalidProfile`] for:
    /// - identical main and camera buses
    /// - duplicate `(address, bus)` pairs in the allow-list
    /// - monitored entries with no variants or more than
    ///   [`MAX_ADDR_CHECK_VARIANTS`]
    /// - the same `(address, bus, length)` variant monitored twice
    pub fn validate(&self) -> Result<(), SafetyError> {
        if self.main_bus == self.camera_bus {
            return Err(SafetyError::InvalidProfile(format!(
                "{}: main and camera bus are both {}",
                self.name, self.main_bus
            )));
        }
        validate_allow_list(&self.tx_allow_list)?;

        let mut monitored = HashSet::new();
        for (index, entry) in self.addr_checks.iter().enumerate() {
            let n = entry.variants.len();
            if n == 0 || n > MAX_ADDR_CHECK_VARIANTS {
                return Err(SafetyError::InvalidProfile(format!(
                    "{}: address check {index} has {n} variants (1..={MAX_ADDR_CHECK_VARIANTS})",
                    self.name
                )));
            }
            for variant in &entry.variants {
                let msg = variant.msg;
                if !monitored.insert((msg.address, msg.bus, msg.len)) {
                    return Err(SafetyError::InvalidProfile(format!(
                        "{}: {:#x} on bus {} with length {} is monitored twice",
                        self.name, msg.address, msg.bus, msg.len
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Supported vehicle families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleModel {
    #[default]
    Ford,
}

impl VehicleModel {
    pub const ALL: [VehicleModel; 1] = [VehicleModel::Ford];

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleModel::Ford => "ford",
        }
    }

    /// Build this model's profile.
    ///
    /// # Errors
    ///
    /// [`SafetyError::InvalidProfile`] if a static table is malformed.
    pub fn profile(&self) -> Result<VehicleProfile, SafetyError> {
        match self {
            VehicleModel::Ford => profiles::ford::profile(),
        }
    }
}

impl fmt::Display for VehicleModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleModel {
    type Err = SafetyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VehicleModel::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SafetyError::Config(format!("unknown vehicle model '{s}'")))
    }
}

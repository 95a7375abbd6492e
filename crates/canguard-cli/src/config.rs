//! Reads and writes `~/.canguard/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use canguard_kernel::{EngineOptions, VehicleModel};
use canguard_types::{BusId, SafetyError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Persisted replay configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Vehicle profile to load.
    #[serde(default)]
    pub vehicle: VehicleModel,

    /// Keep controls engaged while the driver presses the gas pedal.
    #[serde(default)]
    pub allow_gas_override: bool,

    /// Interface name in the log → bus number on the interceptor.
    #[serde(default = "default_bus_map")]
    pub bus_map: BTreeMap<String, BusId>,

    /// Print a line per forwarded frame, not only rejections and tx.
    #[serde(default)]
    pub show_forwarding: bool,
}

fn default_bus_map() -> BTreeMap<String, BusId> {
    [("can0", 0), ("can1", 1), ("can2", 2)]
        .into_iter()
        .map(|(name, bus)| (name.to_string(), bus))
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vehicle: VehicleModel::default(),
            allow_gas_override: false,
            bus_map: default_bus_map(),
            show_forwarding: false,
        }
    }
}

impl Config {
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            allow_gas_override: self.allow_gas_override,
        }
    }

    /// Bus number for a log interface name.
    pub fn bus_for(&self, interface: &str) -> Option<BusId> {
        self.bus_map.get(interface).copied()
    }
}

/// Return the path to `~/.canguard/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".canguard").join("config.toml")
}

/// Load the config, falling back to defaults when the file is missing or
/// unreadable. Environment overrides apply either way.
pub fn load_or_default() -> Config {
    load_or_default_from(&config_path())
}

pub(crate) fn load_or_default_from(path: &Path) -> Config {
    match load_from(path) {
        Ok(Some(cfg)) => {
            info!(path = %path.display(), "config loaded");
            return cfg;
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "using default configuration"),
    }
    let mut cfg = Config::default();
    apply_env_overrides(&mut cfg);
    cfg
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, SafetyError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        SafetyError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| SafetyError::Config(format!("failed to parse {}: {e}", path.display())))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `CANGUARD_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `CANGUARD_VEHICLE` | `vehicle` |
/// | `CANGUARD_ALLOW_GAS` | `allow_gas_override` (`1`/`true`/`0`/`false`) |
///
/// Unparseable values are ignored with a warning.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("CANGUARD_VEHICLE") {
        match v.parse::<VehicleModel>() {
            Ok(model) => cfg.vehicle = model,
            Err(e) => warn!(error = %e, "ignoring CANGUARD_VEHICLE"),
        }
    }
    if let Ok(v) = std::env::var("CANGUARD_ALLOW_GAS") {
        match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => cfg.allow_gas_override = true,
            "0" | "false" | "no" => cfg.allow_gas_override = false,
            other => warn!(value = other, "ignoring CANGUARD_ALLOW_GAS"),
        }
    }
}

/// Save the config, creating `~/.canguard/` if necessary.
pub fn save(cfg: &Config) -> Result<(), SafetyError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), SafetyError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            SafetyError::Config(format!("failed to create {}: {e}", parent.display()))
        })?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| SafetyError::Config(format!("failed to serialize config: {e}")))?;
    fs::write(path, raw)
        .map_err(|e| SafetyError::Config(format!("failed to write {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.vehicle, VehicleModel::Ford);
        assert_eq!(loaded.bus_for("can2"), Some(2));
        assert!(!loaded.show_forwarding);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "show_forwarding = true\n").expect("write");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert!(loaded.show_forwarding);
        assert_eq!(loaded.bus_map, default_bus_map());
    }

    #[test]
    fn custom_bus_map_is_read() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "vehicle = \"ford\"\n[bus_map]\nvcan0 = 0\nvcan1 = 2\n").expect("write");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.bus_for("vcan1"), Some(2));
        assert_eq!(loaded.bus_for("can0"), None);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "vehicle = \"delorean\"\n").expect("write");
        assert!(matches!(load_from(&path), Err(SafetyError::Config(_))));
    }

    #[test]
    fn config_path_points_to_canguard_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".canguard"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn env_overrides() {
        // SAFETY: the only test touching these variables.
        unsafe {
            std::env::set_var("CANGUARD_ALLOW_GAS", "true");
            std::env::set_var("CANGUARD_VEHICLE", "FORD");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert!(cfg.allow_gas_override);
        assert_eq!(cfg.vehicle, VehicleModel::Ford);
        assert!(cfg.engine_options().allow_gas_override);

        unsafe { std::env::set_var("CANGUARD_ALLOW_GAS", "maybe") };
        apply_env_overrides(&mut cfg);
        assert!(cfg.allow_gas_override);

        // An unreadable file falls back to defaults with overrides applied.
        unsafe { std::env::set_var("CANGUARD_ALLOW_GAS", "1") };
        let dir = tempfile::tempdir().expect("tmp dir");
        let broken = dir.path().join("config.toml");
        fs::write(&broken, "vehicle = [").expect("write");
        assert!(load_or_default_from(&broken).allow_gas_override);
        let missing = dir.path().join("absent.toml");
        assert!(load_or_default_from(&missing).allow_gas_override);

        unsafe {
            std::env::remove_var("CANGUARD_ALLOW_GAS");
            std::env::remove_var("CANGUARD_VEHICLE");
        }
    }
}

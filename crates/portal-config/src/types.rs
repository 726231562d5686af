//! Configuration types for the idea portal.

use serde::{Deserialize, Serialize};

/// Complete portal configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PortalConfig {
	#[serde(default)]
	pub portal: PortalSettings,
	/// Ledger backend.
	pub ledger: ImplementationConfig,
	/// Wallet backend. Without one the portal runs read-only.
	#[serde(default)]
	pub wallet: Option<ImplementationConfig>,
}

/// Client-wide settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PortalSettings {
	#[serde(default = "default_name")]
	pub name: String,
	#[serde(default = "default_log_level")]
	pub log_level: String,
	/// Seconds a Confirmed or Failed status stays visible.
	#[serde(default = "default_display_window_secs")]
	pub display_window_secs: u64,
	/// Gas limit attached to every idea submission.
	#[serde(default = "default_gas_limit")]
	pub gas_limit: u64,
	#[serde(default = "default_event_bus_capacity")]
	pub event_bus_capacity: usize,
}

impl Default for PortalSettings {
	fn default() -> Self {
		Self {
			name: default_name(),
			log_level: default_log_level(),
			display_window_secs: default_display_window_secs(),
			gas_limit: default_gas_limit(),
			event_bus_capacity: default_event_bus_capacity(),
		}
	}
}

/// Selects a backend by name and carries its free-form settings, which the
/// backend validates itself.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImplementationConfig {
	pub implementation: String,
	#[serde(default = "empty_table")]
	pub config: toml::Value,
}

fn default_name() -> String {
	"idea-portal".to_string()
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_display_window_secs() -> u64 {
	5
}

fn default_gas_limit() -> u64 {
	300_000
}

fn default_event_bus_capacity() -> usize {
	1000
}

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::Table::new())
}

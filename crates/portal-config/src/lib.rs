//! Configuration loading for the idea portal.
//!
//! Configuration is a TOML file. `${VAR}` references are substituted from the
//! environment before parsing, and a handful of settings can be overridden
//! through prefixed environment variables (`PORTAL_` by default).

use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

mod types;

pub use types::{ImplementationConfig, PortalConfig, PortalSettings};

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
	file_path: Option<PathBuf>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "PORTAL_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_path_buf());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<PortalConfig, ConfigError> {
		let file_path = self.file_path.as_ref().ok_or_else(|| {
			ConfigError::FileNotFound("No configuration file specified".to_string())
		})?;
		if !file_path.exists() {
			return Err(ConfigError::FileNotFound(file_path.display().to_string()));
		}

		info!("Loading configuration from {}", file_path.display());
		let content = tokio::fs::read_to_string(file_path).await?;
		self.load_str(&content)
	}

	/// Parses, overrides and validates configuration from a TOML string.
	pub fn load_str(&self, content: &str) -> Result<PortalConfig, ConfigError> {
		let substituted = self.substitute_env_vars(content)?;
		let mut config: PortalConfig =
			toml::from_str(&substituted).map_err(|e| ConfigError::ParseError(e.to_string()))?;

		self.apply_env_overrides(&mut config)?;
		inherit_wallet_rpc_url(&mut config);
		validate_config(&config)?;

		Ok(config)
	}

	fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
		// Find and replace ${VAR_NAME} patterns
		let re = regex::Regex::new(r"\$\{([^}]+)\}")
			.map_err(|e| ConfigError::ParseError(e.to_string()))?;

		let mut lines = Vec::new();
		for line in content.lines() {
			// Comment lines are left alone.
			if line.trim_start().starts_with('#') {
				lines.push(line.to_string());
				continue;
			}

			let mut result = line.to_string();
			for cap in re.captures_iter(line) {
				let full_match = &cap[0];
				let var_name = &cap[1];

				let env_value = env::var(var_name)
					.map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

				result = result.replace(full_match, &env_value);
			}
			lines.push(result);
		}

		Ok(lines.join("\n"))
	}

	fn env(&self, name: &str) -> Option<String> {
		env::var(format!("{}{}", self.env_prefix, name)).ok()
	}

	fn apply_env_overrides(&self, config: &mut PortalConfig) -> Result<(), ConfigError> {
		if let Some(name) = self.env("NAME") {
			config.portal.name = name;
		}

		if let Some(log_level) = self.env("LOG_LEVEL") {
			config.portal.log_level = log_level;
		}

		if let Some(window) = self.env("DISPLAY_WINDOW_SECS") {
			config.portal.display_window_secs = window.parse().map_err(|e| {
				ConfigError::ValidationError(format!("Invalid display window: {}", e))
			})?;
		}

		if let Some(gas_limit) = self.env("GAS_LIMIT") {
			config.portal.gas_limit = gas_limit
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid gas limit: {}", e)))?;
		}

		for (key, var) in [("rpc_url", "RPC_URL"), ("contract_address", "CONTRACT_ADDRESS")] {
			if let Some(value) = self.env(var) {
				debug!("Overriding ledger {} from environment", key);
				set_table_value(&mut config.ledger.config, key, value)?;
			}
		}

		Ok(())
	}
}

fn set_table_value(
	config: &mut toml::Value,
	key: &str,
	value: String,
) -> Result<(), ConfigError> {
	let table = config.as_table_mut().ok_or_else(|| {
		ConfigError::ValidationError("Implementation config must be a table".to_string())
	})?;
	table.insert(key.to_string(), toml::Value::String(value));
	Ok(())
}

/// A node-backed wallet talks to the ledger's node unless told otherwise.
fn inherit_wallet_rpc_url(config: &mut PortalConfig) {
	let Some(wallet) = config.wallet.as_mut() else {
		return;
	};
	if wallet.implementation != "rpc" {
		return;
	}

	let ledger_url = config.ledger.config.get("rpc_url").cloned();
	if let (Some(table), Some(url)) = (wallet.config.as_table_mut(), ledger_url) {
		if !table.contains_key("rpc_url") {
			debug!("Wallet inherits the ledger RPC URL");
			table.insert("rpc_url".to_string(), url);
		}
	}
}

fn validate_config(config: &PortalConfig) -> Result<(), ConfigError> {
	if config.portal.display_window_secs == 0 {
		return Err(ConfigError::ValidationError(
			"display_window_secs must be greater than zero".to_string(),
		));
	}

	if config.portal.gas_limit == 0 {
		return Err(ConfigError::ValidationError(
			"gas_limit must be greater than zero".to_string(),
		));
	}

	if config.portal.event_bus_capacity == 0 {
		return Err(ConfigError::ValidationError(
			"event_bus_capacity must be greater than zero".to_string(),
		));
	}

	let mut sections = vec![("ledger", &config.ledger)];
	if let Some(wallet) = &config.wallet {
		sections.push(("wallet", wallet));
	}
	for (section, implementation) in sections {
		if implementation.implementation.trim().is_empty() {
			return Err(ConfigError::ValidationError(format!(
				"{} implementation must be set",
				section
			)));
		}
		if !implementation.config.is_table() {
			return Err(ConfigError::ValidationError(format!(
				"{}.config must be a table",
				section
			)));
		}
	}

	Ok(())
}

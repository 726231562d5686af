//! Configuration validation for wallet and ledger implementations.
//!
//! Each implementation receives a free-form TOML table and describes what it
//! expects through a [`Schema`]. The helpers in [`validators`] cover the value
//! shapes that recur across implementations: RPC URLs, addresses and keys.

use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: &'static str,
		actual: String,
	},
}

/// Type of a configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
	String,
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
}

/// Validator run on a field after its type has been checked.
pub type FieldValidator = fn(&toml::Value) -> Result<(), String>;

/// A field definition with name, type and optional value check.
#[derive(Debug)]
pub struct Field {
	pub name: &'static str,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl Field {
	pub fn new(name: &'static str, field_type: FieldType) -> Self {
		Self {
			name,
			field_type,
			validator: None,
		}
	}

	pub fn with_validator(mut self, validator: FieldValidator) -> Self {
		self.validator = Some(validator);
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		check_type(self.name, value, self.field_type)?;
		if let Some(validator) = self.validator {
			validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.to_string(),
				message,
			})?;
		}
		Ok(())
	}
}

/// Schema definition with required and optional fields.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a TOML table against this schema.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::TypeMismatch {
				field: "root".to_string(),
				expected: "table",
				actual: config.type_str().to_string(),
			})?;

		for field in &self.required {
			let value = table
				.get(field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.to_string()))?;
			field.check(value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(field.name) {
				field.check(value)?;
			}
		}

		Ok(())
	}
}

fn check_type(name: &str, value: &toml::Value, expected: FieldType) -> Result<(), ValidationError> {
	let mismatch = |expected: &'static str| ValidationError::TypeMismatch {
		field: name.to_string(),
		expected,
		actual: value.type_str().to_string(),
	};

	match expected {
		FieldType::String if !value.is_str() => Err(mismatch("string")),
		FieldType::Boolean if !value.is_bool() => Err(mismatch("boolean")),
		FieldType::Integer { min, max } => {
			let int_val = value.as_integer().ok_or_else(|| mismatch("integer"))?;
			if let Some(min) = min.filter(|min| int_val < *min) {
				return Err(ValidationError::InvalidValue {
					field: name.to_string(),
					message: format!("Value {} is less than minimum {}", int_val, min),
				});
			}
			if let Some(max) = max.filter(|max| int_val > *max) {
				return Err(ValidationError::InvalidValue {
					field: name.to_string(),
					message: format!("Value {} is greater than maximum {}", int_val, max),
				});
			}
			Ok(())
		}
		_ => Ok(()),
	}
}

/// Implemented by every wallet and ledger backend to check its own table.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

/// Value checks shared by backend schemas. Types are checked before these run.
pub mod validators {
	pub fn http_url(value: &toml::Value) -> Result<(), String> {
		let url = value.as_str().unwrap_or_default();
		if url.starts_with("http://") || url.starts_with("https://") {
			Ok(())
		} else {
			Err("RPC URL must start with http:// or https://".to_string())
		}
	}

	pub fn address(value: &toml::Value) -> Result<(), String> {
		let addr = value.as_str().unwrap_or_default();
		addr.parse::<crate::Address>()
			.map(|_| ())
			.map_err(|e| format!("must be a valid Ethereum address: {}", e))
	}

	pub fn private_key(value: &toml::Value) -> Result<(), String> {
		let key = value.as_str().unwrap_or_default();
		let key_without_prefix = key.strip_prefix("0x").unwrap_or(key);

		if key_without_prefix.len() != 64 {
			return Err("Private key must be 64 hex characters (32 bytes)".to_string());
		}
		if hex::decode(key_without_prefix).is_err() {
			return Err("Private key must be valid hexadecimal".to_string());
		}
		Ok(())
	}
}

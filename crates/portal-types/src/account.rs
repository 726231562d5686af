//! Account-related types for the idea portal.
//!
//! Addresses identify both the connected wallet account and the author of
//! every idea recorded on the ledger.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length in bytes of an EVM account address.
pub const ADDRESS_LENGTH: usize = 20;

/// Errors produced when parsing an address from text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
	#[error("Address must be {ADDRESS_LENGTH} bytes, got {0}")]
	InvalidLength(usize),
	#[error("Address is not valid hex: {0}")]
	InvalidHex(String),
}

/// EVM account address.
///
/// Stored as raw bytes so that the wallet and ledger crates can convert to
/// and from their own primitive types without this crate depending on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub [u8; ADDRESS_LENGTH]);

impl Address {
	/// Shortened form used in log lines, e.g. `0xf39f..2266`.
	pub fn short(&self) -> String {
		let full = hex::encode(self.0);
		format!("0x{}..{}", &full[..4], &full[full.len() - 4..])
	}
}

impl TryFrom<&[u8]> for Address {
	type Error = AddressError;

	fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
		let array: [u8; ADDRESS_LENGTH] = bytes
			.try_into()
			.map_err(|_| AddressError::InvalidLength(bytes.len()))?;
		Ok(Self(array))
	}
}

impl FromStr for Address {
	type Err = AddressError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let trimmed = s.strip_prefix("0x").unwrap_or(s);
		let bytes = hex::decode(trimmed).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
		Self::try_from(bytes.as_slice())
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(self.0))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_and_display() {
		let addr: Address = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".parse().unwrap();
		assert_eq!(addr.to_string(), "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
		assert_eq!(addr.short(), "0xf39f..2266");

		let unprefixed: Address = "f39fd6e51aad88f6f4ce6ab8827279cfffb92266".parse().unwrap();
		assert_eq!(addr, unprefixed);
	}

	#[test]
	fn test_parse_rejects_bad_input() {
		assert_eq!(
			"0x1234".parse::<Address>(),
			Err(AddressError::InvalidLength(2))
		);
		assert!(matches!(
			"0xzz".parse::<Address>(),
			Err(AddressError::InvalidHex(_))
		));
	}
}

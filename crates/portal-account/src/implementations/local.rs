//! Local private-key wallet.
//!
//! The key holder is the user, so the only authorization step is the explicit
//! `request_accounts` call (or `authorized = true` in configuration, which
//! stands for a prior authorization).

use crate::{to_portal_address, WalletError, WalletInterface};
use alloy::network::EthereumWallet;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use async_trait::async_trait;
use portal_types::{validators, Address, ConfigSchema, Field, FieldType, Schema};
use std::sync::atomic::{AtomicBool, Ordering};

/// Wallet backed by an in-process Alloy signer.
pub struct LocalWallet {
	signer: PrivateKeySigner,
	authorized: AtomicBool,
}

impl LocalWallet {
	/// Creates a wallet from a hex-encoded private key (with or without 0x).
	pub fn new(private_key_hex: &str, authorized: bool) -> Result<Self, WalletError> {
		let signer = private_key_hex
			.parse::<PrivateKeySigner>()
			.map_err(|e| WalletError::InvalidKey(format!("Invalid private key: {}", e)))?;

		Ok(Self {
			signer,
			authorized: AtomicBool::new(authorized),
		})
	}

	fn address(&self) -> Address {
		to_portal_address(self.signer.address())
	}
}

pub struct LocalWalletSchema;

impl ConfigSchema for LocalWalletSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), portal_types::ValidationError> {
		Schema::new(
			vec![Field::new("private_key", FieldType::String).with_validator(validators::private_key)],
			vec![Field::new("authorized", FieldType::Boolean)],
		)
		.validate(config)
	}
}

#[async_trait]
impl WalletInterface for LocalWallet {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalWalletSchema)
	}

	async fn list_accounts(&self) -> Result<Vec<Address>, WalletError> {
		if self.authorized.load(Ordering::SeqCst) {
			Ok(vec![self.address()])
		} else {
			Ok(Vec::new())
		}
	}

	async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
		self.authorized.store(true, Ordering::SeqCst);
		Ok(vec![self.address()])
	}

	fn ethereum_wallet(&self) -> Option<EthereumWallet> {
		Some(EthereumWallet::from(self.signer.clone()))
	}
}

/// Factory for the `local` wallet.
///
/// Configuration parameters:
/// - `private_key`: hex-encoded signing key
/// - `authorized`: treat the key as already authorized (default: false)
pub fn create_wallet(config: &toml::Value) -> Result<Box<dyn WalletInterface>, WalletError> {
	LocalWalletSchema
		.validate(config)
		.map_err(|e| WalletError::InvalidConfig(e.to_string()))?;

	let private_key = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.ok_or_else(|| WalletError::InvalidConfig("private_key is required".to_string()))?;
	let authorized = config
		.get("authorized")
		.and_then(|v| v.as_bool())
		.unwrap_or(false);

	Ok(Box::new(LocalWallet::new(private_key, authorized)?))
}

#[cfg(test)]
mod tests {
	use super::*;

	const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	#[tokio::test]
	async fn test_request_authorizes_future_listing() {
		let wallet = LocalWallet::new(TEST_KEY, false).unwrap();
		assert!(wallet.list_accounts().await.unwrap().is_empty());

		let requested = wallet.request_accounts().await.unwrap();
		assert_eq!(
			requested[0].to_string(),
			"0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
		);
		assert_eq!(wallet.list_accounts().await.unwrap(), requested);
		assert!(wallet.ethereum_wallet().is_some());
	}

	#[test]
	fn test_invalid_key_rejected() {
		assert!(matches!(
			LocalWallet::new("not-a-key", false),
			Err(WalletError::InvalidKey(_))
		));
	}

	#[tokio::test]
	async fn test_factory_reads_config() {
		let mut table = toml::Table::new();
		table.insert("private_key".into(), toml::Value::String(TEST_KEY.into()));
		table.insert("authorized".into(), toml::Value::Boolean(true));

		let wallet = create_wallet(&toml::Value::Table(table)).unwrap();
		assert_eq!(wallet.list_accounts().await.unwrap().len(), 1);

		let missing = create_wallet(&toml::Value::Table(toml::Table::new()));
		assert!(matches!(missing, Err(WalletError::InvalidConfig(_))));
	}
}

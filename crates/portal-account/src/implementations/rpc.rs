//! Node-managed wallet over JSON-RPC.
//!
//! Accounts live in the node (or in a wallet bridge speaking JSON-RPC) and the
//! node signs submitted transactions itself, the same way an injected browser
//! provider does.

use crate::{to_portal_address, WalletError, WalletInterface};
use alloy::network::EthereumWallet;
use alloy::primitives::Address as AlloyAddress;
use alloy::providers::{Provider, RootProvider};
use alloy::transports::TransportError;
use async_trait::async_trait;
use portal_types::{validators, Address, ConfigSchema, Field, FieldType, Schema};
use tracing::debug;

/// EIP-1193 "user rejected request".
const USER_REJECTED_CODE: i64 = 4001;
/// JSON-RPC "method not found".
const METHOD_NOT_FOUND_CODE: i64 = -32601;

pub struct RpcWallet {
	provider: RootProvider,
}

impl RpcWallet {
	pub fn new(rpc_url: &str) -> Result<Self, WalletError> {
		let url = rpc_url
			.parse()
			.map_err(|e| WalletError::InvalidConfig(format!("Invalid RPC URL: {}", e)))?;

		Ok(Self {
			provider: RootProvider::new_http(url),
		})
	}
}

fn map_rpc_error(error: TransportError) -> WalletError {
	match error.as_error_resp() {
		Some(payload) if payload.code == USER_REJECTED_CODE => {
			WalletError::UserRejected(payload.message.to_string())
		}
		_ => WalletError::Provider(error.to_string()),
	}
}

pub struct RpcWalletSchema;

impl ConfigSchema for RpcWalletSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), portal_types::ValidationError> {
		Schema::new(
			vec![Field::new("rpc_url", FieldType::String).with_validator(validators::http_url)],
			vec![],
		)
		.validate(config)
	}
}

#[async_trait]
impl WalletInterface for RpcWallet {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(RpcWalletSchema)
	}

	async fn list_accounts(&self) -> Result<Vec<Address>, WalletError> {
		let accounts = self.provider.get_accounts().await.map_err(map_rpc_error)?;
		Ok(accounts.into_iter().map(to_portal_address).collect())
	}

	async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
		let result = self
			.provider
			.raw_request::<_, Vec<AlloyAddress>>(
				"eth_requestAccounts".into(),
				Vec::<serde_json::Value>::new(),
			)
			.await;

		match result {
			Ok(accounts) => Ok(accounts.into_iter().map(to_portal_address).collect()),
			// Plain nodes have no consent prompt; their unlocked accounts are the grant.
			Err(e)
				if e.as_error_resp()
					.is_some_and(|payload| payload.code == METHOD_NOT_FOUND_CODE) =>
			{
				debug!("eth_requestAccounts unsupported, falling back to eth_accounts");
				self.list_accounts().await
			}
			Err(e) => Err(map_rpc_error(e)),
		}
	}

	fn ethereum_wallet(&self) -> Option<EthereumWallet> {
		None
	}
}

/// Factory for the `rpc` wallet.
///
/// Configuration parameters:
/// - `rpc_url`: HTTP endpoint of the node holding the accounts
pub fn create_wallet(config: &toml::Value) -> Result<Box<dyn WalletInterface>, WalletError> {
	RpcWalletSchema
		.validate(config)
		.map_err(|e| WalletError::InvalidConfig(e.to_string()))?;

	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| WalletError::InvalidConfig("rpc_url is required".to_string()))?;

	Ok(Box::new(RpcWallet::new(rpc_url)?))
}

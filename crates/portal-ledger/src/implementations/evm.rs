//! EVM ledger backend.
//!
//! Talks to the deployed portal contract through an Alloy provider. Reads and
//! writes go through the generated contract binding; live notifications are
//! produced by polling `eth_getLogs` for `NewIdea` from the last seen block.

use crate::{IdeaStream, LedgerError, LedgerInterface, PendingSubmission};
use alloy::network::{Ethereum, EthereumWallet};
use alloy::primitives::{Address as AlloyAddress, U256};
use alloy::providers::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log};
use alloy::sol;
use alloy::sol_types::SolEvent;
use alloy::transports::TransportError;
use async_trait::async_trait;
use portal_types::{
	validators, Address, ConfigSchema, Field, FieldType, LedgerIdea, Schema, TransactionHash,
	TransactionReceipt,
};
use std::time::Duration;
use tracing::{debug, warn};

/// EIP-1193 "user rejected request".
const USER_REJECTED_CODE: i64 = 4001;
/// Geth-style execution reverted.
const EXECUTION_REVERTED_CODE: i64 = 3;

const DEFAULT_POLL_INTERVAL_MS: u64 = 4_000;
const DEFAULT_MAX_POLL_FAILURES: u32 = 5;

sol! {
	#[sol(rpc)]
	contract StartupPortal {
		struct Idea {
			address entrepeneur;
			string message;
			uint256 timestamp;
			bool winner;
		}

		event NewIdea(address indexed from, uint256 timestamp, string message, bool winner);

		function idea(string memory _message) public;
		function getAllIdeas() public view returns (Idea[] memory);
		function getTotalIdeas() public view returns (uint256);
	}
}

pub struct EvmLedger {
	provider: DynProvider,
	contract: AlloyAddress,
	poll_interval: Duration,
	max_poll_failures: u32,
}

impl EvmLedger {
	pub fn new(
		rpc_url: &str,
		contract_address: &str,
		wallet: Option<EthereumWallet>,
	) -> Result<Self, LedgerError> {
		let url = rpc_url
			.parse()
			.map_err(|e| LedgerError::InvalidConfig(format!("Invalid RPC URL: {}", e)))?;
		let contract = contract_address
			.parse()
			.map_err(|e| LedgerError::InvalidConfig(format!("Invalid contract address: {}", e)))?;

		// Without a local signer the node signs for the `from` account.
		let provider = match wallet {
			Some(wallet) => ProviderBuilder::new().wallet(wallet).connect_http(url).erased(),
			None => ProviderBuilder::new().connect_http(url).erased(),
		};

		Ok(Self {
			provider,
			contract,
			poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
			max_poll_failures: DEFAULT_MAX_POLL_FAILURES,
		})
	}

	pub fn with_polling(mut self, interval: Duration, max_failures: u32) -> Self {
		self.poll_interval = interval;
		self.max_poll_failures = max_failures.max(1);
		self
	}
}

fn to_portal_address(address: AlloyAddress) -> Address {
	Address(address.0 .0)
}

fn to_seconds(timestamp: U256) -> Result<u64, LedgerError> {
	u64::try_from(timestamp)
		.map_err(|_| LedgerError::Decode(format!("timestamp {} does not fit u64", timestamp)))
}

fn classify_transport_error(error: &TransportError) -> LedgerError {
	match error.as_error_resp() {
		Some(payload) if payload.code == USER_REJECTED_CODE => {
			LedgerError::UserRejected(payload.message.to_string())
		}
		Some(payload)
			if payload.code == EXECUTION_REVERTED_CODE || payload.message.contains("revert") =>
		{
			LedgerError::Reverted(payload.message.to_string())
		}
		_ => LedgerError::Network(error.to_string()),
	}
}

fn classify_contract_error(error: alloy::contract::Error) -> LedgerError {
	match &error {
		alloy::contract::Error::TransportError(e) => classify_transport_error(e),
		alloy::contract::Error::AbiError(e) => LedgerError::Decode(e.to_string()),
		_ => LedgerError::Network(error.to_string()),
	}
}

fn decode_new_idea(log: &Log) -> Result<LedgerIdea, LedgerError> {
	let decoded = log
		.log_decode::<StartupPortal::NewIdea>()
		.map_err(|e| LedgerError::Decode(format!("Failed to decode NewIdea: {}", e)))?;
	let event = decoded.inner.data;

	Ok(LedgerIdea {
		author: to_portal_address(event.from),
		timestamp: to_seconds(event.timestamp)?,
		message: event.message,
		won: event.winner,
	})
}

/// Broadcast `idea(string)` call awaiting its receipt.
struct EvmSubmission {
	hash: TransactionHash,
	pending: PendingTransactionBuilder<Ethereum>,
}

#[async_trait]
impl PendingSubmission for EvmSubmission {
	fn tx_hash(&self) -> &TransactionHash {
		&self.hash
	}

	async fn await_receipt(self: Box<Self>) -> Result<TransactionReceipt, LedgerError> {
		let receipt = self
			.pending
			.get_receipt()
			.await
			.map_err(|e| LedgerError::Network(format!("Failed to get receipt: {}", e)))?;

		Ok(TransactionReceipt {
			hash: TransactionHash(receipt.transaction_hash.0.to_vec()),
			block_number: receipt.block_number.unwrap_or(0),
			success: receipt.status(),
		})
	}
}

/// Configuration schema for the EVM ledger.
pub struct EvmLedgerSchema;

impl ConfigSchema for EvmLedgerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), portal_types::ValidationError> {
		Schema::new(
			vec![
				Field::new("rpc_url", FieldType::String).with_validator(validators::http_url),
				Field::new("contract_address", FieldType::String)
					.with_validator(validators::address),
			],
			vec![
				Field::new(
					"poll_interval_ms",
					FieldType::Integer {
						min: Some(100),
						max: None,
					},
				),
				Field::new(
					"max_poll_failures",
					FieldType::Integer {
						min: Some(1),
						max: Some(1_000),
					},
				),
			],
		)
		.validate(config)
	}
}

#[async_trait]
impl LedgerInterface for EvmLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(EvmLedgerSchema)
	}

	async fn read_total_idea_count(&self) -> Result<u64, LedgerError> {
		let portal = StartupPortal::new(self.contract, &self.provider);
		let count = portal
			.getTotalIdeas()
			.call()
			.await
			.map_err(classify_contract_error)?;

		u64::try_from(count)
			.map_err(|_| LedgerError::Decode(format!("idea count {} does not fit u64", count)))
	}

	async fn read_all_ideas(&self) -> Result<Vec<LedgerIdea>, LedgerError> {
		let portal = StartupPortal::new(self.contract, &self.provider);
		let ideas = portal
			.getAllIdeas()
			.call()
			.await
			.map_err(classify_contract_error)?;

		ideas
			.into_iter()
			.map(|idea| {
				Ok(LedgerIdea {
					author: to_portal_address(idea.entrepeneur),
					timestamp: to_seconds(idea.timestamp)?,
					message: idea.message,
					won: idea.winner,
				})
			})
			.collect()
	}

	async fn submit_idea(
		&self,
		from: &Address,
		message: &str,
		gas_limit: u64,
	) -> Result<Box<dyn PendingSubmission>, LedgerError> {
		let portal = StartupPortal::new(self.contract, &self.provider);
		let pending = portal
			.idea(message.to_string())
			.from(AlloyAddress::from(from.0))
			.gas(gas_limit)
			.send()
			.await
			.map_err(classify_contract_error)?;

		Ok(Box::new(EvmSubmission {
			hash: TransactionHash(pending.tx_hash().0.to_vec()),
			pending,
		}))
	}

	async fn subscribe_new_ideas(&self) -> Result<IdeaStream, LedgerError> {
		let start_block = self
			.provider
			.get_block_number()
			.await
			.map_err(|e| classify_transport_error(&e))?;

		let provider = self.provider.clone();
		let base_filter = Filter::new()
			.address(self.contract)
			.event_signature(StartupPortal::NewIdea::SIGNATURE_HASH);
		let poll_interval = self.poll_interval;
		let max_failures = self.max_poll_failures;

		let stream = async_stream::stream! {
			let mut last_block = start_block;
			let mut failures = 0u32;
			let mut interval = tokio::time::interval(poll_interval);

			loop {
				interval.tick().await;

				let polled: Result<(u64, Vec<Log>), TransportError> = async {
					let current_block = provider.get_block_number().await?;
					if current_block <= last_block {
						return Ok((last_block, Vec::new()));
					}
					let filter = base_filter
						.clone()
						.from_block(last_block + 1)
						.to_block(current_block);
					let logs = provider.get_logs(&filter).await?;
					Ok((current_block, logs))
				}
				.await;

				match polled {
					Ok((current_block, logs)) => {
						failures = 0;
						for log in logs {
							match decode_new_idea(&log) {
								Ok(idea) => yield Ok(idea),
								Err(e) => warn!("Skipping undecodable NewIdea log: {}", e),
							}
						}
						last_block = current_block;
					}
					Err(e) => {
						failures += 1;
						warn!(failures, "Failed to poll NewIdea logs: {}", e);
						if failures >= max_failures {
							yield Err(LedgerError::Network(format!(
								"Live channel lost after {} failed polls: {}",
								failures, e
							)));
							break;
						}
					}
				}
			}
			debug!("NewIdea polling stopped");
		};

		Ok(Box::pin(stream))
	}
}

/// Factory function to create the EVM ledger from configuration.
///
/// Configuration parameters:
/// - `rpc_url`: HTTP RPC endpoint
/// - `contract_address`: deployed portal contract
/// - `poll_interval_ms`: live notification poll interval (default: 4000)
/// - `max_poll_failures`: consecutive failed polls before the live channel is
///   reported lost (default: 5)
pub fn create_ledger(
	config: &toml::Value,
	wallet: Option<EthereumWallet>,
) -> Result<Box<dyn crate::LedgerInterface>, LedgerError> {
	EvmLedgerSchema
		.validate(config)
		.map_err(|e| LedgerError::InvalidConfig(e.to_string()))?;

	let field = |name: &str| {
		config
			.get(name)
			.and_then(|v| v.as_str())
			.ok_or_else(|| LedgerError::InvalidConfig(format!("{} is required", name)))
	};
	let rpc_url = field("rpc_url")?;
	let contract_address = field("contract_address")?;

	let poll_interval = config
		.get("poll_interval_ms")
		.and_then(|v| v.as_integer())
		.map(|ms| ms as u64)
		.unwrap_or(DEFAULT_POLL_INTERVAL_MS);
	let max_failures = config
		.get("max_poll_failures")
		.and_then(|v| v.as_integer())
		.map(|n| n as u32)
		.unwrap_or(DEFAULT_MAX_POLL_FAILURES);

	let ledger = EvmLedger::new(rpc_url, contract_address, wallet)?
		.with_polling(Duration::from_millis(poll_interval), max_failures);
	Ok(Box::new(ledger))
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::primitives::{Bytes, LogData, B256};

	fn config(entries: &[(&str, toml::Value)]) -> toml::Value {
		let mut table = toml::Table::new();
		for (key, value) in entries {
			table.insert(key.to_string(), value.clone());
		}
		toml::Value::Table(table)
	}

	#[test]
	fn test_decode_new_idea_log() {
		let author: AlloyAddress = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".parse().unwrap();
		let event = StartupPortal::NewIdea {
			from: author,
			timestamp: U256::from(1_634_567_890u64),
			message: "rent-a-goat".to_string(),
			winner: true,
		};

		let topics: Vec<B256> = event.encode_topics().into_iter().map(|topic| topic.0).collect();
		let data = Bytes::from(event.encode_data());
		let log = Log {
			inner: alloy::primitives::Log {
				address: AlloyAddress::ZERO,
				data: LogData::new_unchecked(topics, data),
			},
			..Default::default()
		};

		let idea = decode_new_idea(&log).unwrap();
		assert_eq!(idea.author, to_portal_address(author));
		assert_eq!(idea.timestamp, 1_634_567_890);
		assert_eq!(idea.message, "rent-a-goat");
		assert!(idea.won);
	}

	#[test]
	fn test_timestamp_overflow_is_decode_error() {
		assert!(matches!(to_seconds(U256::MAX), Err(LedgerError::Decode(_))));
		assert_eq!(to_seconds(U256::from(100u64)), Ok(100));
	}

	#[test]
	fn test_schema() {
		let valid = config(&[
			("rpc_url", toml::Value::String("http://localhost:8545".into())),
			(
				"contract_address",
				toml::Value::String("0xe8Bc8A5Db18237442e28cec941C9037ac81863b8".into()),
			),
			("poll_interval_ms", toml::Value::Integer(1_000)),
		]);
		assert!(EvmLedgerSchema.validate(&valid).is_ok());
		assert!(create_ledger(&valid, None).is_ok());

		let bad_address = config(&[
			("rpc_url", toml::Value::String("http://localhost:8545".into())),
			("contract_address", toml::Value::String("0x1234".into())),
		]);
		assert!(matches!(
			create_ledger(&bad_address, None),
			Err(LedgerError::InvalidConfig(_))
		));
	}
}

//! # Portal Ledger
//!
//! Access to the idea ledger contract: the read calls, the write that records
//! a new idea, and the live stream of `NewIdea` notifications.
//!
//! Backends implement [`LedgerInterface`]; [`LedgerService`] wraps one backend
//! and is what the transaction controller and the feed synchronizer hold.
//!
//! Available backends:
//! - `evm`: Alloy contract binding over HTTP JSON-RPC
//! - `memory`: in-process ledger for offline use and tests

use alloy::network::EthereumWallet;
use async_trait::async_trait;
use futures::Stream;
use portal_types::{Address, ConfigSchema, LedgerIdea, TransactionHash, TransactionReceipt};
use std::pin::Pin;
use thiserror::Error;
use tracing::{debug, info};

pub mod implementations {
	pub mod evm;
	pub mod memory;
}

/// Gas limit the portal has always attached to `idea(string)`.
pub const DEFAULT_GAS_LIMIT: u64 = 300_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
	#[error("User rejected the transaction: {0}")]
	UserRejected(String),
	#[error("Transaction reverted: {0}")]
	Reverted(String),
	#[error("Network error: {0}")]
	Network(String),
	#[error("Failed to decode ledger data: {0}")]
	Decode(String),
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),
}

/// Live notifications of newly recorded ideas.
///
/// Lazy, infinite and non-restartable. Dropping the stream unsubscribes; the
/// stream ending means the provider channel was lost.
pub type IdeaStream = Pin<Box<dyn Stream<Item = Result<LedgerIdea, LedgerError>> + Send>>;

/// A broadcast write awaiting inclusion.
#[async_trait]
pub trait PendingSubmission: Send {
	fn tx_hash(&self) -> &TransactionHash;

	/// Resolves once the write is settled. A receipt with `success == false`
	/// means the write was included but reverted.
	async fn await_receipt(self: Box<Self>) -> Result<TransactionReceipt, LedgerError>;
}

/// Contract-shaped capability over the idea ledger.
#[async_trait]
pub trait LedgerInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	async fn read_total_idea_count(&self) -> Result<u64, LedgerError>;

	/// Historical snapshot in ledger order.
	async fn read_all_ideas(&self) -> Result<Vec<LedgerIdea>, LedgerError>;

	async fn submit_idea(
		&self,
		from: &Address,
		message: &str,
		gas_limit: u64,
	) -> Result<Box<dyn PendingSubmission>, LedgerError>;

	async fn subscribe_new_ideas(&self) -> Result<IdeaStream, LedgerError>;
}

/// Builds a ledger backend from its configuration table and, when the wallet
/// signs locally, the signing capability of the connected wallet.
pub type LedgerFactory = Box<
	dyn Fn(&toml::Value, Option<EthereumWallet>) -> Result<Box<dyn LedgerInterface>, LedgerError>
		+ Send,
>;

pub struct LedgerService {
	backend: Box<dyn LedgerInterface>,
}

impl LedgerService {
	pub fn new(backend: Box<dyn LedgerInterface>) -> Self {
		Self { backend }
	}

	pub async fn total_idea_count(&self) -> Result<u64, LedgerError> {
		let count = self.backend.read_total_idea_count().await?;
		debug!("Retrieved total idea count: {}", count);
		Ok(count)
	}

	pub async fn all_ideas(&self) -> Result<Vec<LedgerIdea>, LedgerError> {
		let ideas = self.backend.read_all_ideas().await?;
		debug!("Retrieved {} historical ideas", ideas.len());
		Ok(ideas)
	}

	pub async fn submit_idea(
		&self,
		from: &Address,
		message: &str,
		gas_limit: u64,
	) -> Result<Box<dyn PendingSubmission>, LedgerError> {
		let pending = self.backend.submit_idea(from, message, gas_limit).await?;
		info!(tx_hash = %pending.tx_hash().short(), from = %from.short(), "Mining...");
		Ok(pending)
	}

	pub async fn subscribe_new_ideas(&self) -> Result<IdeaStream, LedgerError> {
		self.backend.subscribe_new_ideas().await
	}
}

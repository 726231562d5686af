//! In-process ledger.
//!
//! Behaves like the deployed contract as seen from a client: writes are mined
//! when their receipt is awaited, each author is rate limited by a cooldown,
//! and every recorded idea is announced on the live channel. The extra hooks
//! (`script`, `pause_receipts`, `fail_reads`, `close_live`, ...) let callers
//! stage the failure modes of a real provider.

use crate::{IdeaStream, LedgerError, LedgerInterface, PendingSubmission};
use alloy::network::EthereumWallet;
use async_trait::async_trait;
use portal_types::{
	Address, ConfigSchema, Field, FieldType, LedgerIdea, Schema, TransactionHash,
	TransactionReceipt,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::debug;

const DEFAULT_COOLDOWN_SECS: u64 = 600;
const LIVE_CHANNEL_CAPACITY: usize = 256;

/// Staged result for the next submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
	/// Mine normally, subject to the cooldown.
	Confirm,
	/// Include the write but revert it with the given reason.
	Revert(String),
	/// Refuse at the wallet prompt; nothing is broadcast.
	RejectInWallet(String),
	/// Broadcast, then lose the connection while waiting for the receipt.
	DropReceipt(String),
}

#[derive(Default)]
struct LedgerState {
	ideas: Vec<LedgerIdea>,
	block_number: u64,
	nonce: u64,
	last_submission: HashMap<Address, u64>,
	script: VecDeque<SubmitOutcome>,
	clock: Option<u64>,
	read_failure: Option<String>,
}

impl LedgerState {
	fn now(&self) -> u64 {
		self.clock
			.unwrap_or_else(|| chrono::Utc::now().timestamp().max(0) as u64)
	}
}

struct Shared {
	state: Mutex<LedgerState>,
	live: Mutex<broadcast::Sender<LedgerIdea>>,
	receipts_open: watch::Sender<bool>,
	cooldown_secs: u64,
}

impl Shared {
	async fn announce(&self, idea: LedgerIdea) {
		// No receivers simply means nobody is subscribed.
		let _ = self.live.lock().await.send(idea);
	}
}

#[derive(Clone)]
pub struct InMemoryLedger {
	shared: Arc<Shared>,
}

impl InMemoryLedger {
	pub fn new() -> Self {
		Self::with_cooldown(0)
	}

	/// Ledger enforcing `cooldown_secs` between two ideas of the same author.
	pub fn with_cooldown(cooldown_secs: u64) -> Self {
		let (live, _) = broadcast::channel(LIVE_CHANNEL_CAPACITY);
		Self {
			shared: Arc::new(Shared {
				state: Mutex::new(LedgerState::default()),
				live: Mutex::new(live),
				receipts_open: watch::Sender::new(true),
				cooldown_secs,
			}),
		}
	}

	/// Appends history without announcing it.
	pub async fn seed(&self, ideas: impl IntoIterator<Item = LedgerIdea>) {
		self.shared.state.lock().await.ideas.extend(ideas);
	}

	/// Records an idea from another client and announces it.
	pub async fn record(&self, idea: LedgerIdea) {
		self.shared.state.lock().await.ideas.push(idea.clone());
		self.shared.announce(idea).await;
	}

	/// Announces an idea again without recording it, like a provider replay.
	pub async fn replay(&self, idea: LedgerIdea) {
		self.shared.announce(idea).await;
	}

	/// Ends every open live stream. Later subscriptions get a fresh channel.
	pub async fn close_live(&self) {
		let (live, _) = broadcast::channel(LIVE_CHANNEL_CAPACITY);
		*self.shared.live.lock().await = live;
	}

	pub async fn script(&self, outcome: SubmitOutcome) {
		self.shared.state.lock().await.script.push_back(outcome);
	}

	/// Pins the ledger clock to `secs`.
	pub async fn set_clock(&self, secs: u64) {
		self.shared.state.lock().await.clock = Some(secs);
	}

	/// Makes read calls fail with a network error until cleared with `None`.
	pub async fn fail_reads(&self, reason: Option<String>) {
		self.shared.state.lock().await.read_failure = reason;
	}

	/// Holds every receipt until `resume_receipts`.
	pub fn pause_receipts(&self) {
		self.shared.receipts_open.send_replace(false);
	}

	pub fn resume_receipts(&self) {
		self.shared.receipts_open.send_replace(true);
	}

	pub async fn ideas(&self) -> Vec<LedgerIdea> {
		self.shared.state.lock().await.ideas.clone()
	}
}

impl Default for InMemoryLedger {
	fn default() -> Self {
		Self::new()
	}
}

struct MemorySubmission {
	shared: Arc<Shared>,
	hash: TransactionHash,
	from: Address,
	message: String,
	outcome: SubmitOutcome,
}

#[async_trait]
impl PendingSubmission for MemorySubmission {
	fn tx_hash(&self) -> &TransactionHash {
		&self.hash
	}

	async fn await_receipt(self: Box<Self>) -> Result<TransactionReceipt, LedgerError> {
		let MemorySubmission {
			shared,
			hash,
			from,
			message,
			outcome,
		} = *self;

		let mut gate = shared.receipts_open.subscribe();
		gate.wait_for(|open| *open)
			.await
			.map_err(|_| LedgerError::Network("Ledger shut down".to_string()))?;

		if let SubmitOutcome::DropReceipt(reason) = &outcome {
			return Err(LedgerError::Network(reason.clone()));
		}

		let mut state = shared.state.lock().await;
		state.block_number += 1;
		let block_number = state.block_number;
		let now = state.now();

		let cooled_down = state
			.last_submission
			.get(&from)
			.map_or(true, |last| now >= last + shared.cooldown_secs);
		let success = outcome == SubmitOutcome::Confirm && cooled_down;

		let receipt = TransactionReceipt {
			hash,
			block_number,
			success,
		};
		if !success {
			debug!(tx_hash = %receipt.hash.short(), "Reverted in block {}", block_number);
			return Ok(receipt);
		}

		let idea = LedgerIdea {
			author: from,
			timestamp: now,
			message,
			won: (block_number + now) % 2 == 0,
		};
		state.ideas.push(idea.clone());
		state.last_submission.insert(from, now);
		drop(state);

		shared.announce(idea).await;
		Ok(receipt)
	}
}

pub struct InMemoryLedgerSchema;

impl ConfigSchema for InMemoryLedgerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), portal_types::ValidationError> {
		Schema::new(
			vec![],
			vec![Field::new(
				"cooldown_secs",
				FieldType::Integer {
					min: Some(0),
					max: None,
				},
			)],
		)
		.validate(config)
	}
}

#[async_trait]
impl LedgerInterface for InMemoryLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(InMemoryLedgerSchema)
	}

	async fn read_total_idea_count(&self) -> Result<u64, LedgerError> {
		let state = self.shared.state.lock().await;
		if let Some(reason) = &state.read_failure {
			return Err(LedgerError::Network(reason.clone()));
		}
		Ok(state.ideas.len() as u64)
	}

	async fn read_all_ideas(&self) -> Result<Vec<LedgerIdea>, LedgerError> {
		let state = self.shared.state.lock().await;
		if let Some(reason) = &state.read_failure {
			return Err(LedgerError::Network(reason.clone()));
		}
		Ok(state.ideas.clone())
	}

	async fn submit_idea(
		&self,
		from: &Address,
		message: &str,
		_gas_limit: u64,
	) -> Result<Box<dyn PendingSubmission>, LedgerError> {
		let mut state = self.shared.state.lock().await;
		let outcome = state.script.pop_front().unwrap_or(SubmitOutcome::Confirm);
		if let SubmitOutcome::RejectInWallet(reason) = &outcome {
			return Err(LedgerError::UserRejected(reason.clone()));
		}

		state.nonce += 1;
		let mut hash = vec![0u8; 24];
		hash.extend_from_slice(&state.nonce.to_be_bytes());

		Ok(Box::new(MemorySubmission {
			shared: Arc::clone(&self.shared),
			hash: TransactionHash(hash),
			from: *from,
			message: message.to_string(),
			outcome,
		}))
	}

	async fn subscribe_new_ideas(&self) -> Result<IdeaStream, LedgerError> {
		let mut receiver = self.shared.live.lock().await.subscribe();

		let stream = async_stream::stream! {
			loop {
				match receiver.recv().await {
					Ok(idea) => yield Ok(idea),
					Err(broadcast::error::RecvError::Lagged(skipped)) => {
						yield Err(LedgerError::Network(format!(
							"Live channel lagged by {} notifications",
							skipped
						)));
						break;
					}
					Err(broadcast::error::RecvError::Closed) => break,
				}
			}
		};

		Ok(Box::pin(stream))
	}
}

/// Factory function to create the in-memory ledger from configuration.
///
/// Configuration parameters:
/// - `cooldown_secs`: seconds an author must wait between ideas (default: 600)
pub fn create_ledger(
	config: &toml::Value,
	_wallet: Option<EthereumWallet>,
) -> Result<Box<dyn LedgerInterface>, LedgerError> {
	InMemoryLedgerSchema
		.validate(config)
		.map_err(|e| LedgerError::InvalidConfig(e.to_string()))?;

	let cooldown_secs = config
		.get("cooldown_secs")
		.and_then(|v| v.as_integer())
		.map(|secs| secs as u64)
		.unwrap_or(DEFAULT_COOLDOWN_SECS);

	Ok(Box::new(InMemoryLedger::with_cooldown(cooldown_secs)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures::StreamExt;

	fn author(byte: u8) -> Address {
		Address([byte; 20])
	}

	#[tokio::test]
	async fn test_confirmed_submission_is_recorded_and_announced() {
		let ledger = InMemoryLedger::new();
		ledger.set_clock(1_000).await;
		let mut live = ledger.subscribe_new_ideas().await.unwrap();

		let pending = ledger.submit_idea(&author(1), "hello", 300_000).await.unwrap();
		let receipt = pending.await_receipt().await.unwrap();

		assert!(receipt.success);
		assert_eq!(receipt.block_number, 1);
		assert_eq!(ledger.read_total_idea_count().await.unwrap(), 1);

		let announced = live.next().await.unwrap().unwrap();
		assert_eq!(announced.author, author(1));
		assert_eq!(announced.timestamp, 1_000);
		assert_eq!(announced.message, "hello");
		assert!(!announced.won);
	}

	#[tokio::test]
	async fn test_cooldown_reverts_second_idea() {
		let ledger = InMemoryLedger::with_cooldown(600);
		ledger.set_clock(1_000).await;

		let first = ledger.submit_idea(&author(1), "one", 0).await.unwrap();
		assert!(first.await_receipt().await.unwrap().success);

		let second = ledger.submit_idea(&author(1), "two", 0).await.unwrap();
		assert!(!second.await_receipt().await.unwrap().success);

		let other = ledger.submit_idea(&author(2), "three", 0).await.unwrap();
		assert!(other.await_receipt().await.unwrap().success);

		ledger.set_clock(1_600).await;
		let later = ledger.submit_idea(&author(1), "four", 0).await.unwrap();
		assert!(later.await_receipt().await.unwrap().success);
		assert_eq!(ledger.ideas().await.len(), 3);
	}

	#[tokio::test]
	async fn test_scripted_outcomes() {
		let ledger = InMemoryLedger::new();
		ledger
			.script(SubmitOutcome::RejectInWallet("denied".into()))
			.await;
		ledger.script(SubmitOutcome::DropReceipt("reset".into())).await;
		ledger.script(SubmitOutcome::Revert("nope".into())).await;

		assert!(matches!(
			ledger.submit_idea(&author(1), "a", 0).await,
			Err(LedgerError::UserRejected(reason)) if reason == "denied"
		));

		let dropped = ledger.submit_idea(&author(1), "b", 0).await.unwrap();
		assert_eq!(
			dropped.await_receipt().await,
			Err(LedgerError::Network("reset".into()))
		);

		let reverted = ledger.submit_idea(&author(1), "c", 0).await.unwrap();
		assert!(!reverted.await_receipt().await.unwrap().success);
		assert!(ledger.ideas().await.is_empty());
	}

	#[tokio::test]
	async fn test_paused_receipts_hold_until_resumed() {
		let ledger = InMemoryLedger::new();
		ledger.pause_receipts();

		let pending = ledger.submit_idea(&author(1), "wait", 0).await.unwrap();
		let handle = tokio::spawn(pending.await_receipt());
		tokio::task::yield_now().await;
		assert!(!handle.is_finished());
		assert!(ledger.ideas().await.is_empty());

		ledger.resume_receipts();
		assert!(handle.await.unwrap().unwrap().success);
	}

	#[tokio::test]
	async fn test_close_live_ends_stream() {
		let ledger = InMemoryLedger::new();
		let mut live = ledger.subscribe_new_ideas().await.unwrap();

		let idea = LedgerIdea {
			author: author(3),
			timestamp: 5,
			message: "other client".into(),
			won: true,
		};
		ledger.replay(idea.clone()).await;
		ledger.close_live().await;

		assert_eq!(live.next().await, Some(Ok(idea)));
		assert_eq!(live.next().await, None);
		assert!(ledger.ideas().await.is_empty());
	}

	#[tokio::test]
	async fn test_read_failures() {
		let ledger = InMemoryLedger::new();
		ledger.fail_reads(Some("offline".into())).await;
		assert!(matches!(
			ledger.read_all_ideas().await,
			Err(LedgerError::Network(_))
		));
		ledger.fail_reads(None).await;
		assert_eq!(ledger.read_total_idea_count().await.unwrap(), 0);
	}

	#[test]
	fn test_factory_rejects_negative_cooldown() {
		let mut table = toml::Table::new();
		table.insert("cooldown_secs".into(), toml::Value::Integer(-1));
		assert!(matches!(
			create_ledger(&toml::Value::Table(table), None),
			Err(LedgerError::InvalidConfig(_))
		));
		assert!(create_ledger(&toml::Value::Table(toml::Table::new()), None).is_ok());
	}
}

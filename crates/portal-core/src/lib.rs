//! # Portal Core
//!
//! Wires the provider session, the transaction controller and the feed
//! synchronizer together and exposes what a presentation layer needs: one
//! [`PortalView`] snapshot, the `submit` and `connect_wallet` actions, and the
//! event bus.

use portal_account::{ProviderSession, WalletError};
use portal_config::PortalConfig;
use portal_delivery::{SubmissionHandle, TransactionController, TransactionError};
use portal_discovery::{FeedError, FeedSubscription, FeedSynchronizer};
use portal_ledger::LedgerError;
use portal_types::{
	Address, ColorHint, EventBus, FeedStatus, Idea, PortalEvent, TransactionStatus,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

mod builder;

pub use builder::PortalBuilder;

#[derive(Debug, Error)]
pub enum PortalError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Unknown {kind} implementation: {name}")]
	UnknownImplementation { kind: &'static str, name: String },
	#[error(transparent)]
	Wallet(#[from] WalletError),
	#[error(transparent)]
	Ledger(#[from] LedgerError),
	#[error(transparent)]
	Transaction(#[from] TransactionError),
	#[error(transparent)]
	Feed(#[from] FeedError),
}

/// Everything the presentation layer renders, taken at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct PortalView {
	pub account: Option<Address>,
	pub transaction: TransactionStatus,
	pub status_text: Option<&'static str>,
	pub color: ColorHint,
	pub ideas: Vec<Idea>,
	pub feed: FeedStatus,
	pub total_count: Option<u64>,
}

pub struct PortalEngine {
	config: PortalConfig,
	session: Arc<ProviderSession>,
	feed: Arc<FeedSynchronizer>,
	controller: TransactionController,
	event_bus: EventBus,
	live: Mutex<Option<FeedSubscription>>,
}

impl PortalEngine {
	pub(crate) fn new(
		config: PortalConfig,
		session: Arc<ProviderSession>,
		feed: Arc<FeedSynchronizer>,
		controller: TransactionController,
		event_bus: EventBus,
	) -> Self {
		Self {
			config,
			session,
			feed,
			controller,
			event_bus,
			live: Mutex::new(None),
		}
	}

	/// Restores a prior wallet authorization and brings the feed up.
	///
	/// Never fails: a missing wallet or an unreachable ledger leaves the
	/// portal in an inspectable state instead.
	pub async fn start(&self) -> PortalView {
		info!("Starting {}", self.config.portal.name);

		match self.session.restore().await {
			Ok(Some(_)) => {}
			Ok(None) => info!("Connect a wallet to submit ideas"),
			Err(WalletError::NotAvailable) => info!("No wallet configured, running read-only"),
			Err(e) => warn!("Failed to restore wallet session: {}", e),
		}

		self.sync_feed().await;
		self.view().await
	}

	/// Asks the wallet for authorization, then brings the feed up if needed.
	pub async fn connect_wallet(&self) -> Result<Address, PortalError> {
		let account = self.session.connect().await?;
		self.sync_feed().await;
		Ok(account)
	}

	pub fn submit(&self, message: &str) -> Result<SubmissionHandle, PortalError> {
		Ok(self.controller.submit(message)?)
	}

	pub async fn view(&self) -> PortalView {
		let transaction = self.controller.status();
		PortalView {
			account: self.session.current_account(),
			status_text: transaction.status_text(),
			color: transaction.color(),
			transaction,
			ideas: self.feed.ideas().await,
			feed: self.feed.status(),
			total_count: self.feed.total_count(),
		}
	}

	pub fn events(&self) -> broadcast::Receiver<PortalEvent> {
		self.event_bus.subscribe()
	}

	pub fn config(&self) -> &PortalConfig {
		&self.config
	}

	pub fn session(&self) -> &Arc<ProviderSession> {
		&self.session
	}

	pub fn feed(&self) -> &Arc<FeedSynchronizer> {
		&self.feed
	}

	pub fn controller(&self) -> &TransactionController {
		&self.controller
	}

	/// Stops the live feed and any scheduled status reset.
	pub async fn shutdown(&self) {
		if let Some(subscription) = self.live.lock().await.take() {
			subscription.unsubscribe().await;
		}
		self.controller.shutdown();
		info!("Portal stopped");
	}

	/// Refreshes the count, loads history once and keeps one live
	/// subscription open. Failures are logged and left in the feed status.
	async fn sync_feed(&self) {
		if let Err(e) = self.feed.refresh_total_count().await {
			warn!("{}", e);
		}

		// Subscribe first so nothing recorded during the history fetch is lost;
		// the bootstrap holds the feed until the history is in.
		let mut live = self.live.lock().await;
		if !live.as_ref().is_some_and(FeedSubscription::is_active) {
			match self.feed.subscribe().await {
				Ok(subscription) => *live = Some(subscription),
				Err(e) => warn!("{}", e),
			}
		}
		drop(live);

		match self.feed.bootstrap().await {
			Ok(_) | Err(FeedError::AlreadyBootstrapped) => {}
			Err(e) => warn!("{}", e),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use portal_account::implementations::local::LocalWallet;
	use portal_ledger::implementations::memory::InMemoryLedger;
	use portal_types::{FeedEvent, HistoryStatus, LedgerIdea, LiveStatus, TransactionState};
	use std::time::Duration;

	const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	fn config(wallet: Option<&str>) -> PortalConfig {
		let wallet_section = match wallet {
			Some(authorized) => format!(
				"[wallet]\nimplementation = \"local\"\n\n[wallet.config]\nprivate_key = \"{}\"\nauthorized = {}\n",
				TEST_KEY, authorized
			),
			None => String::new(),
		};
		let source = format!("[ledger]\nimplementation = \"memory\"\n\n{}", wallet_section);
		toml::from_str(&source).unwrap()
	}

	fn engine(config: PortalConfig, ledger: &InMemoryLedger) -> PortalEngine {
		let ledger = ledger.clone();
		PortalBuilder::new(config)
			.with_wallet_factory("local", portal_account::implementations::local::create_wallet)
			.with_ledger_factory("memory", move |_, _| Ok(Box::new(ledger.clone())))
			.build()
			.unwrap()
	}

	fn earlier_idea() -> LedgerIdea {
		LedgerIdea {
			author: Address([9; 20]),
			timestamp: 1_634_000_000,
			message: "uber for dog walking".into(),
			won: true,
		}
	}

	async fn wait_for_append(events: &mut broadcast::Receiver<PortalEvent>) {
		tokio::time::timeout(Duration::from_secs(5), async {
			loop {
				if let Ok(PortalEvent::Feed(FeedEvent::IdeaAppended { .. })) = events.recv().await {
					return;
				}
			}
		})
		.await
		.expect("idea never appended");
	}

	#[tokio::test]
	async fn test_start_with_prior_authorization() {
		let ledger = InMemoryLedger::new();
		ledger.seed(vec![earlier_idea()]).await;
		let engine = engine(config(Some("true")), &ledger);

		let view = engine.start().await;
		assert!(view.account.is_some());
		assert_eq!(view.ideas.len(), 1);
		assert_eq!(view.total_count, Some(1));
		assert_eq!(view.feed.history, HistoryStatus::Loaded { count: 1 });
		assert_eq!(view.feed.live, LiveStatus::Subscribed);
		assert_eq!(view.status_text, None);

		engine.shutdown().await;
		assert_eq!(engine.view().await.feed.live, LiveStatus::Unsubscribed);
	}

	#[tokio::test]
	async fn test_submission_reaches_feed_through_live_path() {
		let ledger = InMemoryLedger::new();
		ledger.seed(vec![earlier_idea()]).await;
		let engine = engine(config(Some("true")), &ledger);
		let mut events = engine.events();
		engine.start().await;

		let status = engine
			.submit("a portal for startup ideas")
			.unwrap()
			.finished()
			.await
			.unwrap();
		assert_eq!(status.state, TransactionState::Confirmed);

		wait_for_append(&mut events).await;
		let view = engine.view().await;
		assert_eq!(view.ideas.len(), 2);
		assert_eq!(view.ideas[1].message, "a portal for startup ideas");
		assert_eq!(view.total_count, Some(2));
		assert_eq!(view.status_text, Some(portal_types::CONFIRMED_TEXT));
		assert_eq!(view.color, ColorHint::Green);

		engine.shutdown().await;
	}

	#[tokio::test]
	async fn test_read_only_without_wallet() {
		let ledger = InMemoryLedger::new();
		ledger.seed(vec![earlier_idea()]).await;
		let engine = engine(config(None), &ledger);

		let view = engine.start().await;
		assert_eq!(view.account, None);
		assert_eq!(view.ideas.len(), 1);

		assert!(matches!(
			engine.submit("idea"),
			Err(PortalError::Transaction(TransactionError::NoWalletConnected))
		));
		assert!(matches!(
			engine.connect_wallet().await,
			Err(PortalError::Wallet(WalletError::NotAvailable))
		));

		engine.shutdown().await;
	}

	#[tokio::test]
	async fn test_connect_wallet_after_start() {
		let ledger = InMemoryLedger::new();
		let engine = engine(config(Some("false")), &ledger);

		assert_eq!(engine.start().await.account, None);
		let account = engine.connect_wallet().await.unwrap();
		assert_eq!(engine.view().await.account, Some(account));

		engine.shutdown().await;
	}

	#[tokio::test]
	async fn test_start_tolerates_unreachable_ledger() {
		let ledger = InMemoryLedger::new();
		ledger.fail_reads(Some("rpc down".into())).await;
		let engine = engine(config(Some("true")), &ledger);

		let view = engine.start().await;
		assert!(matches!(view.feed.history, HistoryStatus::Unavailable(_)));
		assert_eq!(view.total_count, None);
		assert_eq!(view.feed.live, LiveStatus::Subscribed);

		// A later connect retries the history.
		ledger.fail_reads(None).await;
		engine.connect_wallet().await.unwrap();
		assert_eq!(
			engine.view().await.feed.history,
			HistoryStatus::Loaded { count: 0 }
		);

		engine.shutdown().await;
	}

	#[test]
	fn test_unknown_implementation() {
		let result = PortalBuilder::new(config(None)).build();
		assert!(matches!(
			result,
			Err(PortalError::UnknownImplementation { kind: "ledger", .. })
		));
	}
}

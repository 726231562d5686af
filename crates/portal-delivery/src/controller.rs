use crate::TransactionError;
use portal_account::ProviderSession;
use portal_ledger::{LedgerError, LedgerService};
use portal_types::{
	Address, CountRefresh, EventBus, PortalEvent, TransactionEvent, TransactionReceipt,
	TransactionState, TransactionStatus,
};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// How long a terminal state stays visible before the controller returns to idle.
pub const DEFAULT_DISPLAY_WINDOW: Duration = Duration::from_secs(5);

struct ControllerInner {
	session: Arc<ProviderSession>,
	ledger: Arc<LedgerService>,
	count_refresh: Arc<dyn CountRefresh>,
	event_bus: EventBus,
	status: watch::Sender<TransactionStatus>,
	reset: Mutex<Option<JoinHandle<()>>>,
	display_window: Duration,
	gas_limit: u64,
}

/// Tracks exactly one in-flight submission at a time.
pub struct TransactionController {
	inner: Arc<ControllerInner>,
}

/// Handle to a started submission.
///
/// Dropping the handle does not cancel the submission.
pub struct SubmissionHandle {
	submission: u64,
	task: JoinHandle<TransactionStatus>,
}

impl SubmissionHandle {
	pub fn submission(&self) -> u64 {
		self.submission
	}

	/// Waits for the submission to settle and returns its terminal status.
	pub async fn finished(self) -> Result<TransactionStatus, TransactionError> {
		self.task
			.await
			.map_err(|e| TransactionError::Network(format!("Submission task failed: {}", e)))
	}
}

impl TransactionController {
	pub fn new(
		session: Arc<ProviderSession>,
		ledger: Arc<LedgerService>,
		count_refresh: Arc<dyn CountRefresh>,
		event_bus: EventBus,
	) -> Self {
		Self {
			inner: Arc::new(ControllerInner {
				session,
				ledger,
				count_refresh,
				event_bus,
				status: watch::Sender::new(TransactionStatus::default()),
				reset: Mutex::new(None),
				display_window: DEFAULT_DISPLAY_WINDOW,
				gas_limit: portal_ledger::DEFAULT_GAS_LIMIT,
			}),
		}
	}

	pub fn with_display_window(mut self, display_window: Duration) -> Self {
		if let Some(inner) = Arc::get_mut(&mut self.inner) {
			inner.display_window = display_window;
		}
		self
	}

	pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
		if let Some(inner) = Arc::get_mut(&mut self.inner) {
			inner.gas_limit = gas_limit;
		}
		self
	}

	pub fn status(&self) -> TransactionStatus {
		self.inner.status.borrow().clone()
	}

	pub fn watch_status(&self) -> watch::Receiver<TransactionStatus> {
		self.inner.status.subscribe()
	}

	/// Starts submitting `message` on behalf of the connected account.
	///
	/// The controller is `Pending` when this returns `Ok`; broadcast, receipt
	/// and the count refresh continue in the background. Local rejections
	/// leave the state untouched.
	pub fn submit(&self, message: &str) -> Result<SubmissionHandle, TransactionError> {
		if message.trim().is_empty() {
			return Err(TransactionError::InvalidInput(
				"idea message is empty".to_string(),
			));
		}
		let account = self
			.inner
			.session
			.current_account()
			.ok_or(TransactionError::NoWalletConnected)?;

		let mut started = None;
		self.inner.status.send_if_modified(|status| {
			if status.state == TransactionState::Pending {
				return false;
			}
			let next = status.submission + 1;
			*status = TransactionStatus::pending(next);
			started = Some(next);
			true
		});
		let submission = started.ok_or(TransactionError::TransactionInProgress)?;

		// A reset still scheduled for the previous submission must not fire.
		self.inner.cancel_reset();
		self.inner.publish_status();
		info!(submission, from = %account.short(), "Submitting idea");

		let inner = Arc::clone(&self.inner);
		let message = message.to_string();
		let task = tokio::spawn(async move { inner.run(submission, account, message).await });

		Ok(SubmissionHandle { submission, task })
	}

	/// Cancels a scheduled auto-reset. In-flight submissions keep running.
	pub fn shutdown(&self) {
		self.inner.cancel_reset();
	}
}

impl ControllerInner {
	async fn run(
		self: Arc<Self>,
		submission: u64,
		account: Address,
		message: String,
	) -> TransactionStatus {
		let outcome = self.deliver(submission, &account, &message).await;

		let status = match outcome {
			Ok(receipt) => {
				info!(
					submission,
					tx_hash = %receipt.hash.short(),
					block = receipt.block_number,
					"Confirmed"
				);
				let status = self.transition(submission, |status| {
					status.state = TransactionState::Confirmed;
				});
				self.event_bus
					.publish(PortalEvent::Transaction(TransactionEvent::Confirmed {
						submission,
						receipt,
					}));
				status
			}
			Err(error) => {
				warn!(submission, "Submission failed: {}", error);
				let status = self.transition(submission, |status| {
					status.state = TransactionState::Failed;
					status.failure = Some(error.failure_kind());
					status.detail = Some(error.to_string());
				});
				self.event_bus
					.publish(PortalEvent::Transaction(TransactionEvent::Failed {
						submission,
						error: error.to_string(),
					}));
				status
			}
		};

		self.schedule_reset(submission);

		if status.state == TransactionState::Confirmed {
			match self.count_refresh.refresh_total_count().await {
				Ok(total) => debug!(submission, total, "Refreshed idea count"),
				Err(e) => warn!(submission, "Failed to refresh idea count: {}", e),
			}
		}

		status
	}

	/// Broadcast then wait for the receipt. Strictly sequential.
	async fn deliver(
		&self,
		submission: u64,
		account: &Address,
		message: &str,
	) -> Result<TransactionReceipt, TransactionError> {
		let pending = self
			.ledger
			.submit_idea(account, message, self.gas_limit)
			.await?;

		let tx_hash = pending.tx_hash().clone();
		self.transition(submission, |status| status.tx_hash = Some(tx_hash.clone()));
		self.event_bus
			.publish(PortalEvent::Transaction(TransactionEvent::Broadcast {
				submission,
				tx_hash,
			}));

		let receipt = pending.await_receipt().await?;
		if !receipt.success {
			return Err(LedgerError::Reverted(format!(
				"transaction {} reverted in block {}",
				receipt.hash, receipt.block_number
			))
			.into());
		}

		Ok(receipt)
	}

	/// Applies `update` when `submission` is still the tracked one, publishes
	/// the result and returns the current status.
	fn transition(
		&self,
		submission: u64,
		update: impl FnOnce(&mut TransactionStatus),
	) -> TransactionStatus {
		let changed = self.status.send_if_modified(|status| {
			if status.submission != submission {
				return false;
			}
			update(status);
			true
		});

		if changed {
			self.publish_status();
		} else {
			error!(submission, "Dropped transition for a stale submission");
		}
		self.status.borrow().clone()
	}

	fn publish_status(&self) {
		let status = self.status.borrow().clone();
		self.event_bus
			.publish(PortalEvent::Transaction(TransactionEvent::StatusChanged {
				status,
			}));
	}

	fn schedule_reset(self: &Arc<Self>, submission: u64) {
		let deadline = Instant::now() + self.display_window;
		let inner = Arc::clone(self);
		let task = tokio::spawn(async move {
			tokio::time::sleep_until(deadline).await;

			let reset = inner.status.send_if_modified(|status| {
				if status.submission != submission || !status.state.is_terminal() {
					return false;
				}
				*status = TransactionStatus::idle(submission);
				true
			});
			if reset {
				debug!(submission, "Display window elapsed, back to idle");
				inner.publish_status();
			}
		});

		let previous = self
			.reset
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.replace(task);
		if let Some(previous) = previous {
			previous.abort();
		}
	}

	fn cancel_reset(&self) {
		let scheduled = self
			.reset
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.take();
		if let Some(task) = scheduled {
			task.abort();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use portal_account::implementations::local::LocalWallet;
	use portal_ledger::implementations::memory::{InMemoryLedger, SubmitOutcome};
	use portal_types::{FailureKind, LedgerIdea, CONFIRMED_TEXT, PENDING_TEXT, REVERTED_TEXT};
	use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

	const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	/// Count refresher that reads straight from the ledger.
	struct LedgerCount {
		ledger: Arc<LedgerService>,
		total: AtomicU64,
		calls: AtomicUsize,
	}

	#[async_trait]
	impl CountRefresh for LedgerCount {
		async fn refresh_total_count(&self) -> Result<u64, String> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			let total = self
				.ledger
				.total_idea_count()
				.await
				.map_err(|e| e.to_string())?;
			self.total.store(total, Ordering::SeqCst);
			Ok(total)
		}
	}

	struct Fixture {
		ledger: InMemoryLedger,
		count: Arc<LedgerCount>,
		controller: TransactionController,
	}

	async fn fixture(connected: bool) -> Fixture {
		let bus = EventBus::new(64);
		let wallet = LocalWallet::new(TEST_KEY, connected).unwrap();
		let session = Arc::new(ProviderSession::new(Arc::new(wallet), bus.clone()));
		session.restore().await.unwrap();

		let ledger = InMemoryLedger::new();
		let service = Arc::new(LedgerService::new(Box::new(ledger.clone())));
		let count = Arc::new(LedgerCount {
			ledger: Arc::clone(&service),
			total: AtomicU64::new(0),
			calls: AtomicUsize::new(0),
		});
		let controller = TransactionController::new(session, service, count.clone(), bus);

		Fixture {
			ledger,
			count,
			controller,
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_submit_is_pending_before_network_resolves() {
		let f = fixture(true).await;
		f.ledger.pause_receipts();

		let handle = f.controller.submit("a marketplace for goats").unwrap();
		let status = f.controller.status();
		assert_eq!(status.state, TransactionState::Pending);
		assert_eq!(status.status_text(), Some(PENDING_TEXT));
		assert_eq!(handle.submission(), 1);

		f.ledger.resume_receipts();
		let terminal = handle.finished().await.unwrap();
		assert_eq!(terminal.state, TransactionState::Confirmed);
		assert!(terminal.tx_hash.is_some());
	}

	#[tokio::test(start_paused = true)]
	async fn test_local_rejections_never_reach_pending() {
		let f = fixture(true).await;
		assert!(matches!(
			f.controller.submit(""),
			Err(TransactionError::InvalidInput(_))
		));
		assert!(matches!(
			f.controller.submit("   "),
			Err(TransactionError::InvalidInput(_))
		));
		assert_eq!(f.controller.status(), TransactionStatus::idle(0));

		let disconnected = fixture(false).await;
		assert_eq!(
			disconnected.controller.submit("idea").err(),
			Some(TransactionError::NoWalletConnected)
		);
		assert_eq!(disconnected.controller.status().state, TransactionState::Idle);

		// Input is checked before the session.
		assert!(matches!(
			disconnected.controller.submit(" "),
			Err(TransactionError::InvalidInput(_))
		));
	}

	#[tokio::test(start_paused = true)]
	async fn test_confirmed_resets_after_display_window_and_refreshes_count() {
		let f = fixture(true).await;
		f.ledger
			.seed(vec![LedgerIdea {
				author: Address([7; 20]),
				timestamp: 1,
				message: "earlier".into(),
				won: false,
			}])
			.await;

		let status = f.controller.submit("idea").unwrap().finished().await.unwrap();
		assert_eq!(status.state, TransactionState::Confirmed);
		assert_eq!(status.status_text(), Some(CONFIRMED_TEXT));
		assert_eq!(f.count.calls.load(Ordering::SeqCst), 1);
		assert_eq!(f.count.total.load(Ordering::SeqCst), 2);

		tokio::time::sleep(DEFAULT_DISPLAY_WINDOW - Duration::from_millis(1)).await;
		assert_eq!(f.controller.status().state, TransactionState::Confirmed);

		tokio::time::sleep(Duration::from_millis(2)).await;
		assert_eq!(f.controller.status(), TransactionStatus::idle(1));
	}

	#[tokio::test(start_paused = true)]
	async fn test_failures_collapse_to_failed_then_idle() {
		let f = fixture(true).await;
		f.ledger
			.script(SubmitOutcome::Revert("Wait 15m".into()))
			.await;
		f.ledger
			.script(SubmitOutcome::RejectInWallet("denied".into()))
			.await;
		f.ledger
			.script(SubmitOutcome::DropReceipt("connection reset".into()))
			.await;

		let expected = [
			FailureKind::Reverted,
			FailureKind::UserRejected,
			FailureKind::Network,
		];
		for kind in expected {
			let status = f.controller.submit("idea").unwrap().finished().await.unwrap();
			assert_eq!(status.state, TransactionState::Failed);
			assert_eq!(status.failure, Some(kind));
			assert!(status.detail.is_some());

			tokio::time::sleep(DEFAULT_DISPLAY_WINDOW - Duration::from_millis(1)).await;
			assert_eq!(f.controller.status().state, TransactionState::Failed);

			tokio::time::sleep(Duration::from_millis(2)).await;
			assert_eq!(f.controller.status().state, TransactionState::Idle);
		}

		assert_eq!(f.count.calls.load(Ordering::SeqCst), 0);
		assert!(f.ledger.ideas().await.is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn test_reverted_status_uses_generic_text() {
		let f = fixture(true).await;
		f.ledger.script(SubmitOutcome::Revert("Wait 15m".into())).await;

		let status = f.controller.submit("idea").unwrap().finished().await.unwrap();
		assert_eq!(status.status_text(), Some(REVERTED_TEXT));
		assert!(status.detail.unwrap().contains("reverted"));
	}

	#[tokio::test(start_paused = true)]
	async fn test_submit_while_pending_is_rejected() {
		let f = fixture(true).await;
		f.ledger.pause_receipts();

		let first = f.controller.submit("first").unwrap();
		assert_eq!(
			f.controller.submit("second").err(),
			Some(TransactionError::TransactionInProgress)
		);
		assert_eq!(f.controller.status().submission, 1);

		f.ledger.resume_receipts();
		first.finished().await.unwrap();
		assert_eq!(f.ledger.ideas().await.len(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_new_submit_cancels_pending_reset() {
		let f = fixture(true).await;
		f.controller.submit("first").unwrap().finished().await.unwrap();

		tokio::time::sleep(Duration::from_secs(3)).await;
		f.ledger.pause_receipts();
		let second = f.controller.submit("second").unwrap();

		// Past the first submission's window.
		tokio::time::sleep(Duration::from_secs(3)).await;
		let status = f.controller.status();
		assert_eq!(status.state, TransactionState::Pending);
		assert_eq!(status.submission, 2);

		f.ledger.resume_receipts();
		assert_eq!(
			second.finished().await.unwrap().state,
			TransactionState::Confirmed
		);
	}
}

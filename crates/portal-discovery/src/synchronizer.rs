use crate::FeedError;
use async_trait::async_trait;
use futures::StreamExt;
use portal_ledger::{IdeaStream, LedgerService};
use portal_types::{
	CountRefresh, EventBus, FeedEvent, FeedStatus, HistoryStatus, Idea, IdeaKey, LedgerIdea,
	LiveStatus, PortalEvent,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{oneshot, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Default)]
struct Feed {
	ideas: Vec<Idea>,
	seen: HashSet<IdeaKey>,
	bootstrapped: bool,
}

struct FeedInner {
	ledger: Arc<LedgerService>,
	event_bus: EventBus,
	feed: RwLock<Feed>,
	status: watch::Sender<FeedStatus>,
	total_count: watch::Sender<Option<u64>>,
}

/// Sole writer of the feed.
pub struct FeedSynchronizer {
	inner: Arc<FeedInner>,
}

/// Live subscription returned by [`FeedSynchronizer::subscribe`].
///
/// Dropping the handle also stops the subscription, without waiting for it.
pub struct FeedSubscription {
	stop: Option<oneshot::Sender<()>>,
	task: JoinHandle<()>,
}

impl FeedSubscription {
	/// Stops future appends. Once this returns no further live idea reaches the
	/// feed through this subscription.
	pub async fn unsubscribe(mut self) {
		if let Some(stop) = self.stop.take() {
			let _ = stop.send(());
		}
		if let Err(e) = (&mut self.task).await {
			warn!("Live feed task ended abnormally: {}", e);
		}
	}

	pub fn is_active(&self) -> bool {
		!self.task.is_finished()
	}
}

impl Drop for FeedSubscription {
	fn drop(&mut self) {
		if let Some(stop) = self.stop.take() {
			let _ = stop.send(());
		}
	}
}

impl FeedSynchronizer {
	pub fn new(ledger: Arc<LedgerService>, event_bus: EventBus) -> Self {
		Self {
			inner: Arc::new(FeedInner {
				ledger,
				event_bus,
				feed: RwLock::new(Feed::default()),
				status: watch::Sender::new(FeedStatus::default()),
				total_count: watch::Sender::new(None),
			}),
		}
	}

	/// Loads the historical ideas, in ledger order, ahead of any live arrival.
	///
	/// Can succeed once per session; call [`clear`](Self::clear) to load again.
	pub async fn bootstrap(&self) -> Result<usize, FeedError> {
		// Held across the fetch so live arrivals queue up behind the history.
		let mut feed = self.inner.feed.write().await;
		if feed.bootstrapped {
			return Err(FeedError::AlreadyBootstrapped);
		}

		let history = match self.fetch_history().await {
			Ok(history) => history,
			Err(error) => {
				warn!("Failed to load idea history: {}", error);
				self.inner.status.send_modify(|status| {
					status.history = HistoryStatus::Unavailable(error.clone());
				});
				self.inner
					.event_bus
					.publish(PortalEvent::Feed(FeedEvent::BootstrapFailed {
						error: error.clone(),
					}));
				return Err(FeedError::FeedUnavailable(error));
			}
		};

		// Keys seen so far came from live arrivals that beat the history.
		let already_live = feed.seen.clone();
		let mut loaded = 0;
		for idea in history {
			let key = idea.key();
			if already_live.contains(&key) {
				debug!(author = %idea.author.short(), "History entry already received live");
				continue;
			}
			feed.seen.insert(key);
			feed.ideas.push(idea);
			loaded += 1;
		}
		feed.bootstrapped = true;
		drop(feed);

		info!("Loaded {} historical ideas", loaded);
		self.inner.status.send_modify(|status| {
			status.history = HistoryStatus::Loaded { count: loaded };
		});
		self.inner
			.event_bus
			.publish(PortalEvent::Feed(FeedEvent::Bootstrapped { count: loaded }));

		Ok(loaded)
	}

	async fn fetch_history(&self) -> Result<Vec<Idea>, String> {
		let raw = self
			.inner
			.ledger
			.all_ideas()
			.await
			.map_err(|e| e.to_string())?;

		raw.into_iter()
			.map(|idea| Idea::try_from(idea).map_err(|e| e.to_string()))
			.collect()
	}

	/// Empties the feed so that it can be bootstrapped again.
	///
	/// An open live subscription keeps appending.
	pub async fn clear(&self) {
		*self.inner.feed.write().await = Feed::default();
		self.inner.status.send_modify(|status| {
			status.history = HistoryStatus::NotLoaded;
		});
		debug!("Feed cleared");
	}

	/// Opens the live channel and appends every new idea as it arrives.
	///
	/// A dropped channel is recorded in [`status`](Self::status) and is not
	/// reopened; the caller decides whether to subscribe again.
	pub async fn subscribe(&self) -> Result<FeedSubscription, FeedError> {
		// Claim the live slot before opening the channel.
		let claimed = self.inner.status.send_if_modified(|status| {
			if status.live == LiveStatus::Subscribed {
				return false;
			}
			status.live = LiveStatus::Subscribed;
			true
		});
		if !claimed {
			return Err(FeedError::AlreadySubscribed);
		}

		let stream = match self.inner.ledger.subscribe_new_ideas().await {
			Ok(stream) => stream,
			Err(e) => {
				warn!("Failed to subscribe to new ideas: {}", e);
				self.inner.status.send_modify(|status| {
					status.live = LiveStatus::Dropped(e.to_string());
				});
				return Err(FeedError::SubscriptionFailed(e.to_string()));
			}
		};

		info!("Subscribed to new ideas");

		let (stop, stopped) = oneshot::channel();
		let inner = Arc::clone(&self.inner);
		let task = tokio::spawn(async move { inner.follow(stream, stopped).await });

		Ok(FeedSubscription {
			stop: Some(stop),
			task,
		})
	}

	/// Snapshot of the feed in display order.
	pub async fn ideas(&self) -> Vec<Idea> {
		self.inner.feed.read().await.ideas.clone()
	}

	pub async fn len(&self) -> usize {
		self.inner.feed.read().await.ideas.len()
	}

	pub fn status(&self) -> FeedStatus {
		self.inner.status.borrow().clone()
	}

	pub fn watch_status(&self) -> watch::Receiver<FeedStatus> {
		self.inner.status.subscribe()
	}

	/// Last total idea count read from the ledger, if any.
	pub fn total_count(&self) -> Option<u64> {
		*self.inner.total_count.borrow()
	}

	/// Re-reads the authoritative idea count.
	pub async fn refresh_total_count(&self) -> Result<u64, FeedError> {
		let total = self
			.inner
			.ledger
			.total_idea_count()
			.await
			.map_err(|e| FeedError::CountUnavailable(e.to_string()))?;

		self.inner.total_count.send_replace(Some(total));
		self.inner
			.event_bus
			.publish(PortalEvent::Feed(FeedEvent::CountRefreshed { total }));
		Ok(total)
	}
}

#[async_trait]
impl CountRefresh for FeedSynchronizer {
	async fn refresh_total_count(&self) -> Result<u64, String> {
		FeedSynchronizer::refresh_total_count(self)
			.await
			.map_err(|e| e.to_string())
	}
}

impl FeedInner {
	async fn follow(&self, mut stream: IdeaStream, mut stopped: oneshot::Receiver<()>) {
		loop {
			tokio::select! {
				biased;

				_ = &mut stopped => {
					info!("Unsubscribed from new ideas");
					self.status.send_modify(|status| {
						status.live = LiveStatus::Unsubscribed;
					});
					return;
				}
				next = stream.next() => match next {
					Some(Ok(raw)) => self.append(raw).await,
					Some(Err(e)) => {
						self.dropped(e.to_string());
						return;
					}
					None => {
						self.dropped("live channel closed".to_string());
						return;
					}
				}
			}
		}
	}

	async fn append(&self, raw: LedgerIdea) {
		let idea = match Idea::try_from(raw) {
			Ok(idea) => idea,
			Err(e) => {
				warn!("Skipping live idea: {}", e);
				return;
			}
		};

		let mut feed = self.feed.write().await;
		if !feed.seen.insert(idea.key()) {
			drop(feed);
			debug!(
				author = %idea.author.short(),
				submitted_at = %idea.submitted_at,
				"Dropping duplicate idea"
			);
			self.event_bus
				.publish(PortalEvent::Feed(FeedEvent::DuplicateDropped { idea }));
			return;
		}

		let index = feed.ideas.len();
		feed.ideas.push(idea.clone());
		drop(feed);

		info!(author = %idea.author.short(), won = idea.won, "New idea");
		self.event_bus
			.publish(PortalEvent::Feed(FeedEvent::IdeaAppended { index, idea }));
	}

	fn dropped(&self, error: String) {
		warn!("Live feed dropped: {}", error);
		self.status.send_modify(|status| {
			status.live = LiveStatus::Dropped(error.clone());
		});
		self.event_bus
			.publish(PortalEvent::Feed(FeedEvent::LiveDropped { error }));
	}
}

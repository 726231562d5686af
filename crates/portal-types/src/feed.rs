//! Feed-side types shared between the synchronizer and its callers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Capability to re-read the ledger's authoritative idea count.
///
/// Implemented by the feed synchronizer and invoked by the transaction
/// controller once a submission is confirmed.
#[async_trait]
pub trait CountRefresh: Send + Sync {
	/// Re-reads the count. Returns the new value, or the failure text.
	async fn refresh_total_count(&self) -> Result<u64, String>;
}

/// State of the historical half of the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryStatus {
	NotLoaded,
	Loaded { count: usize },
	/// The bulk fetch failed; a later `bootstrap` retries it.
	Unavailable(String),
}

/// State of the live half of the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiveStatus {
	Inactive,
	Subscribed,
	Unsubscribed,
	/// The provider channel ended. Not retried automatically.
	Dropped(String),
}

/// Combined feed status for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedStatus {
	pub history: HistoryStatus,
	pub live: LiveStatus,
}

impl Default for FeedStatus {
	fn default() -> Self {
		Self {
			history: HistoryStatus::NotLoaded,
			live: LiveStatus::Inactive,
		}
	}
}

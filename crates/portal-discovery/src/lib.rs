//! # Portal Discovery
//!
//! Discovery of ideas recorded on the ledger. The [`FeedSynchronizer`] merges a
//! one-shot historical fetch with the live stream of new-idea notifications
//! into a single ordered, deduplicated feed, and keeps the authoritative total
//! idea count.

use thiserror::Error;

mod synchronizer;

pub use synchronizer::{FeedSubscription, FeedSynchronizer};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedError {
	/// The historical fetch failed. `bootstrap` can simply be called again.
	#[error("Feed unavailable: {0}")]
	FeedUnavailable(String),
	#[error("Feed already bootstrapped")]
	AlreadyBootstrapped,
	#[error("Live feed already subscribed")]
	AlreadySubscribed,
	#[error("Failed to subscribe to new ideas: {0}")]
	SubscriptionFailed(String),
	#[error("Total idea count unavailable: {0}")]
	CountUnavailable(String),
}

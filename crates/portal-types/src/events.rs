use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{Address, Idea, TransactionHash, TransactionReceipt, TransactionStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PortalEvent {
	Session(SessionEvent),
	Transaction(TransactionEvent),
	Feed(FeedEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
	Connected { account: Address },
	Disconnected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TransactionEvent {
	StatusChanged {
		status: TransactionStatus,
	},
	Broadcast {
		submission: u64,
		tx_hash: TransactionHash,
	},
	Confirmed {
		submission: u64,
		receipt: TransactionReceipt,
	},
	Failed {
		submission: u64,
		error: String,
	},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FeedEvent {
	Bootstrapped { count: usize },
	BootstrapFailed { error: String },
	IdeaAppended { index: usize, idea: Idea },
	DuplicateDropped { idea: Idea },
	CountRefreshed { total: u64 },
	LiveDropped { error: String },
}

/// Broadcast bus for portal events.
///
/// Publishing never fails the publisher: events sent while nobody listens are
/// discarded.
pub struct EventBus {
	sender: broadcast::Sender<PortalEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<PortalEvent> {
		self.sender.subscribe()
	}

	pub fn publish(&self, event: PortalEvent) {
		let _ = self.sender.send(event);
	}
}

impl Clone for EventBus {
	fn clone(&self) -> Self {
		Self {
			sender: self.sender.clone(),
		}
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(1000)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_publish_reaches_subscribers() {
		let bus = EventBus::new(8);
		let mut rx = bus.subscribe();

		bus.publish(PortalEvent::Feed(FeedEvent::CountRefreshed { total: 7 }));

		match rx.recv().await.unwrap() {
			PortalEvent::Feed(FeedEvent::CountRefreshed { total }) => assert_eq!(total, 7),
			other => panic!("unexpected event: {:?}", other),
		}
	}

	#[test]
	fn test_publish_without_subscribers_is_silent() {
		let bus = EventBus::new(8);
		bus.publish(PortalEvent::Session(SessionEvent::Disconnected));
	}
}

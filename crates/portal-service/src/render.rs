//! Plain-text rendering for the terminal.

use portal_core::PortalView;
use portal_types::{
	FeedEvent, HistoryStatus, Idea, LiveStatus, PortalEvent, SessionEvent, TransactionEvent,
	TransactionStatus,
};

pub fn idea_line(idea: &Idea) -> String {
	format!(
		"[{}] {}: {} (won {})",
		idea.submitted_at.format("%Y-%m-%d %H:%M:%S UTC"),
		idea.author,
		idea.message,
		idea.prize()
	)
}

/// Status line with its color hint, or `None` while idle.
pub fn status_line(status: &TransactionStatus) -> Option<String> {
	let text = status.status_text()?;
	let mut line = format!("[{}] {}", status.color(), text);
	if let Some(hash) = &status.tx_hash {
		line.push_str(&format!(" ({})", hash));
	}
	Some(line)
}

pub fn feed_summary(view: &PortalView) -> String {
	let history = match &view.feed.history {
		HistoryStatus::NotLoaded => "history not loaded".to_string(),
		HistoryStatus::Loaded { count } => format!("{} from history", count),
		HistoryStatus::Unavailable(error) => format!("history unavailable: {}", error),
	};
	let live = match &view.feed.live {
		LiveStatus::Inactive => "live off".to_string(),
		LiveStatus::Subscribed => "live".to_string(),
		LiveStatus::Unsubscribed => "live stopped".to_string(),
		LiveStatus::Dropped(error) => format!("live dropped: {}", error),
	};
	let total = view
		.total_count
		.map(|total| total.to_string())
		.unwrap_or_else(|| "?".to_string());
	let account = view
		.account
		.map(|account| account.to_string())
		.unwrap_or_else(|| "not connected".to_string());

	format!(
		"{} ideas shown, {} on the ledger ({}, {}); account: {}",
		view.ideas.len(),
		total,
		history,
		live,
		account
	)
}

/// What the interactive mode prints for an event, if anything.
pub fn event_line(event: &PortalEvent) -> Option<String> {
	match event {
		PortalEvent::Session(SessionEvent::Connected { account }) => {
			Some(format!("Connected {}", account))
		}
		PortalEvent::Session(SessionEvent::Disconnected) => Some("Wallet disconnected".to_string()),
		PortalEvent::Transaction(TransactionEvent::StatusChanged { status }) => status_line(status),
		PortalEvent::Feed(FeedEvent::IdeaAppended { idea, .. }) => Some(idea_line(idea)),
		PortalEvent::Feed(FeedEvent::CountRefreshed { total }) => {
			Some(format!("Total ideas: {}", total))
		}
		PortalEvent::Feed(FeedEvent::LiveDropped { error }) => {
			Some(format!("Live feed lost: {}", error))
		}
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::DateTime;
	use portal_types::{Address, TransactionHash, TransactionState};

	fn idea(won: bool) -> Idea {
		Idea {
			author: Address([0x11; 20]),
			submitted_at: DateTime::from_timestamp(1_634_567_890, 0).unwrap(),
			message: "compost delivery".to_string(),
			won,
		}
	}

	#[test]
	fn test_idea_line() {
		assert_eq!(
			idea_line(&idea(true)),
			"[2021-10-18 14:38:10 UTC] 0x1111111111111111111111111111111111111111: compost delivery (won 0.0001 ETH)"
		);
		assert!(idea_line(&idea(false)).ends_with("(won 0 ETH)"));
	}

	#[test]
	fn test_status_line() {
		assert_eq!(status_line(&TransactionStatus::idle(0)), None);

		let mut status = TransactionStatus::pending(1);
		assert_eq!(
			status_line(&status).unwrap(),
			"[orange] Mining in progress....."
		);

		status.state = TransactionState::Confirmed;
		status.tx_hash = Some(TransactionHash(vec![0xab, 0xcd]));
		assert_eq!(status_line(&status).unwrap(), "[green] Confirmed (0xabcd)");
	}

	#[test]
	fn test_event_line_skips_internal_events() {
		let appended = PortalEvent::Feed(FeedEvent::IdeaAppended {
			index: 0,
			idea: idea(false),
		});
		assert!(event_line(&appended).unwrap().contains("compost delivery"));

		let dropped = PortalEvent::Feed(FeedEvent::DuplicateDropped { idea: idea(false) });
		assert_eq!(event_line(&dropped), None);
	}
}

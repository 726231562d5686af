//! Transaction delivery types for the idea portal.
//!
//! This module defines the hash and receipt of a submitted write together with
//! the observable lifecycle state the transaction controller exposes upward.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status text shown while a submission is in flight.
pub const PENDING_TEXT: &str = "Mining in progress.....";
/// Status text shown once a submission has been confirmed.
pub const CONFIRMED_TEXT: &str = "Confirmed";
/// User-facing text for a write the ledger refused.
pub const REVERTED_TEXT: &str = "You have too many ideas, please wait for 10 mins";
pub const USER_REJECTED_TEXT: &str = "Transaction rejected in wallet";
pub const NETWORK_TEXT: &str = "Network error, please try again";

/// Blockchain transaction hash representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionHash(pub Vec<u8>);

impl TransactionHash {
	/// Truncated hex form for log lines.
	pub fn short(&self) -> String {
		let hash_str = hex::encode(&self.0);
		if hash_str.len() <= 8 {
			hash_str
		} else {
			format!("{}..", &hash_str[..8])
		}
	}
}

impl fmt::Display for TransactionHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(&self.0))
	}
}

/// Transaction receipt containing execution details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
	/// The hash of the transaction.
	pub hash: TransactionHash,
	/// The block number where the transaction was included.
	pub block_number: u64,
	/// Whether the transaction executed successfully.
	pub success: bool,
}

/// Lifecycle state of the single tracked submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionState {
	Idle,
	Pending,
	Confirmed,
	Failed,
}

impl TransactionState {
	pub fn is_terminal(&self) -> bool {
		matches!(self, TransactionState::Confirmed | TransactionState::Failed)
	}
}

/// Why a submission ended in `Failed`. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
	UserRejected,
	Reverted,
	Network,
}

/// Display color hint for the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorHint {
	Orange,
	Green,
	Red,
}

impl fmt::Display for ColorHint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			ColorHint::Orange => "orange",
			ColorHint::Green => "green",
			ColorHint::Red => "red",
		};
		f.write_str(name)
	}
}

/// Snapshot of the transaction controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatus {
	pub state: TransactionState,
	/// Monotonic submission counter; zero before the first submission.
	pub submission: u64,
	pub tx_hash: Option<TransactionHash>,
	pub failure: Option<FailureKind>,
	/// Technical detail of the last failure, kept apart from the status text.
	pub detail: Option<String>,
}

impl Default for TransactionStatus {
	fn default() -> Self {
		Self::idle(0)
	}
}

impl TransactionStatus {
	pub fn idle(submission: u64) -> Self {
		Self {
			state: TransactionState::Idle,
			submission,
			tx_hash: None,
			failure: None,
			detail: None,
		}
	}

	pub fn pending(submission: u64) -> Self {
		Self {
			state: TransactionState::Pending,
			..Self::idle(submission)
		}
	}

	/// Human readable status line. `None` while idle.
	pub fn status_text(&self) -> Option<&'static str> {
		match self.state {
			TransactionState::Idle => None,
			TransactionState::Pending => Some(PENDING_TEXT),
			TransactionState::Confirmed => Some(CONFIRMED_TEXT),
			TransactionState::Failed => Some(match self.failure {
				Some(FailureKind::UserRejected) => USER_REJECTED_TEXT,
				Some(FailureKind::Network) => NETWORK_TEXT,
				Some(FailureKind::Reverted) | None => REVERTED_TEXT,
			}),
		}
	}

	pub fn color(&self) -> ColorHint {
		match self.state {
			TransactionState::Idle | TransactionState::Pending => ColorHint::Orange,
			TransactionState::Confirmed => ColorHint::Green,
			TransactionState::Failed => ColorHint::Red,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_presentation() {
		let mut status = TransactionStatus::pending(1);
		assert_eq!(status.status_text(), Some(PENDING_TEXT));
		assert_eq!(status.color(), ColorHint::Orange);

		status.state = TransactionState::Confirmed;
		assert_eq!(status.status_text(), Some(CONFIRMED_TEXT));
		assert_eq!(status.color(), ColorHint::Green);

		status.state = TransactionState::Failed;
		status.failure = Some(FailureKind::Reverted);
		assert_eq!(status.status_text(), Some(REVERTED_TEXT));
		assert_eq!(status.color(), ColorHint::Red);

		assert_eq!(TransactionStatus::idle(3).status_text(), None);
	}

	#[test]
	fn test_hash_truncation() {
		let hash = TransactionHash(vec![0xab; 32]);
		assert_eq!(hash.short(), "abababab..");
		assert_eq!(TransactionHash(vec![0x01, 0x02]).short(), "0102");
	}
}

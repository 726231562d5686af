//! Delivery of idea submissions.
//!
//! The [`TransactionController`] drives a single outbound `idea(string)` write
//! from request through broadcast and receipt to a terminal state, and exposes
//! the progress as a small state machine with a timed auto-reset.

use portal_ledger::LedgerError;
use portal_types::FailureKind;
use thiserror::Error;

mod controller;

pub use controller::{SubmissionHandle, TransactionController, DEFAULT_DISPLAY_WINDOW};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionError {
	#[error("No wallet connected")]
	NoWalletConnected,
	#[error("Invalid input: {0}")]
	InvalidInput(String),
	#[error("A transaction is already in progress")]
	TransactionInProgress,
	#[error("User rejected the transaction: {0}")]
	UserRejected(String),
	#[error("Transaction reverted: {0}")]
	TransactionReverted(String),
	#[error("Network error: {0}")]
	Network(String),
}

impl TransactionError {
	/// Failure kind recorded on the `Failed` status, for errors that can reach it.
	pub fn failure_kind(&self) -> FailureKind {
		match self {
			TransactionError::UserRejected(_) => FailureKind::UserRejected,
			TransactionError::TransactionReverted(_) => FailureKind::Reverted,
			_ => FailureKind::Network,
		}
	}
}

impl From<LedgerError> for TransactionError {
	fn from(error: LedgerError) -> Self {
		match error {
			LedgerError::UserRejected(reason) => TransactionError::UserRejected(reason),
			LedgerError::Reverted(reason) => TransactionError::TransactionReverted(reason),
			LedgerError::Network(reason) => TransactionError::Network(reason),
			other => TransactionError::Network(other.to_string()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_ledger_errors_collapse_to_failure_kinds() {
		let cases = [
			(LedgerError::UserRejected("no".into()), FailureKind::UserRejected),
			(LedgerError::Reverted("Wait 15m".into()), FailureKind::Reverted),
			(LedgerError::Network("timeout".into()), FailureKind::Network),
			(LedgerError::Decode("bad log".into()), FailureKind::Network),
		];

		for (ledger_error, kind) in cases {
			assert_eq!(TransactionError::from(ledger_error).failure_kind(), kind);
		}
	}
}

//! Idea records as observed on the ledger.

use crate::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prize paid out by the portal contract to a winning idea.
pub const PRIZE_TEXT: &str = "0.0001 ETH";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdeaError {
	/// The ledger timestamp does not fit a calendar timestamp.
	#[error("Ledger timestamp out of range: {0}")]
	TimestampOutOfRange(u64),
}

/// A record exactly as the ledger returns it, before unit conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerIdea {
	pub author: Address,
	/// Seconds since the Unix epoch, assigned by the ledger.
	pub timestamp: u64,
	pub message: String,
	pub won: bool,
}

/// One submitted idea. Immutable once observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Idea {
	pub author: Address,
	pub submitted_at: DateTime<Utc>,
	pub message: String,
	pub won: bool,
}

/// Deduplication identity of an idea.
///
/// The ledger issues no sequence id, so two ideas by the same author within
/// the same second share a key and are treated as one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdeaKey {
	pub author: Address,
	pub submitted_at: i64,
}

impl Idea {
	pub fn key(&self) -> IdeaKey {
		IdeaKey {
			author: self.author,
			submitted_at: self.submitted_at.timestamp(),
		}
	}

	/// Human readable prize line for this idea.
	pub fn prize(&self) -> &'static str {
		if self.won {
			PRIZE_TEXT
		} else {
			"0 ETH"
		}
	}
}

impl TryFrom<LedgerIdea> for Idea {
	type Error = IdeaError;

	fn try_from(raw: LedgerIdea) -> Result<Self, Self::Error> {
		let seconds =
			i64::try_from(raw.timestamp).map_err(|_| IdeaError::TimestampOutOfRange(raw.timestamp))?;
		let submitted_at = DateTime::<Utc>::from_timestamp(seconds, 0)
			.ok_or(IdeaError::TimestampOutOfRange(raw.timestamp))?;

		Ok(Idea {
			author: raw.author,
			submitted_at,
			message: raw.message,
			won: raw.won,
		})
	}
}

//! Wallet access and the provider session for the idea portal.
//!
//! A [`WalletInterface`] brokers account access and signing. The
//! [`ProviderSession`] wraps one wallet and tracks the single authorized
//! account; it is built once at startup and handed to every component that
//! needs to know who is connected.

use alloy::network::EthereumWallet;
use async_trait::async_trait;
use portal_types::{Address, ConfigSchema, EventBus, PortalEvent, SessionEvent};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

pub mod implementations {
	pub mod local;
	pub mod rpc;
}

#[derive(Debug, Error)]
pub enum WalletError {
	/// No wallet capability is configured or reachable.
	#[error("No wallet available")]
	NotAvailable,
	#[error("User rejected the request: {0}")]
	UserRejected(String),
	#[error("Wallet returned no accounts")]
	NoAccounts,
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),
	#[error("Provider error: {0}")]
	Provider(String),
}

/// Capability-shaped access to a wallet.
#[async_trait]
pub trait WalletInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Accounts already authorized for this client. Never prompts.
	async fn list_accounts(&self) -> Result<Vec<Address>, WalletError>;

	/// Asks the user to authorize accounts. May prompt.
	async fn request_accounts(&self) -> Result<Vec<Address>, WalletError>;

	/// Local signing capability, when this wallet signs in-process.
	///
	/// Wallets that delegate signing to the node return `None`.
	fn ethereum_wallet(&self) -> Option<EthereumWallet>;
}

/// Account and connectivity shared by the transaction controller and the feed.
pub struct ProviderSession {
	wallet: Option<Arc<dyn WalletInterface>>,
	account: watch::Sender<Option<Address>>,
	event_bus: EventBus,
}

impl ProviderSession {
	pub fn new(wallet: Arc<dyn WalletInterface>, event_bus: EventBus) -> Self {
		Self {
			wallet: Some(wallet),
			account: watch::Sender::new(None),
			event_bus,
		}
	}

	/// Session for a host without any wallet capability. Read-only use.
	pub fn detached(event_bus: EventBus) -> Self {
		Self {
			wallet: None,
			account: watch::Sender::new(None),
			event_bus,
		}
	}

	pub fn wallet(&self) -> Option<&Arc<dyn WalletInterface>> {
		self.wallet.as_ref()
	}

	pub fn current_account(&self) -> Option<Address> {
		*self.account.borrow()
	}

	/// Picks up a prior authorization without prompting.
	pub async fn restore(&self) -> Result<Option<Address>, WalletError> {
		let wallet = self.wallet.as_ref().ok_or(WalletError::NotAvailable)?;

		match wallet.list_accounts().await?.first().copied() {
			Some(account) => {
				info!(account = %account, "Found authorized account");
				self.set_account(account);
				Ok(Some(account))
			}
			None => {
				info!("No authorized account found");
				Ok(None)
			}
		}
	}

	/// Requests authorization from the user and connects the first account.
	pub async fn connect(&self) -> Result<Address, WalletError> {
		let wallet = self.wallet.as_ref().ok_or(WalletError::NotAvailable)?;

		let accounts = wallet.request_accounts().await.map_err(|e| {
			warn!("Wallet connection failed: {}", e);
			e
		})?;
		let account = accounts.first().copied().ok_or(WalletError::NoAccounts)?;

		info!(account = %account, "Connected");
		self.set_account(account);
		Ok(account)
	}

	pub fn disconnect(&self) {
		if self.account.send_replace(None).is_some() {
			info!("Wallet disconnected");
			self.event_bus
				.publish(PortalEvent::Session(SessionEvent::Disconnected));
		}
	}

	fn set_account(&self, account: Address) {
		let previous = self.account.send_replace(Some(account));
		if previous != Some(account) {
			self.event_bus
				.publish(PortalEvent::Session(SessionEvent::Connected { account }));
		}
	}
}

pub(crate) fn to_portal_address(address: alloy::primitives::Address) -> Address {
	Address(address.0 .0)
}

#[cfg(test)]
mod tests {
	use super::implementations::local::LocalWallet;
	use super::*;

	const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	fn test_account() -> Address {
		"0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".parse().unwrap()
	}

	#[tokio::test]
	async fn test_restore_without_prior_authorization() {
		let wallet = LocalWallet::new(TEST_KEY, false).unwrap();
		let session = ProviderSession::new(Arc::new(wallet), EventBus::new(8));

		assert_eq!(session.restore().await.unwrap(), None);
		assert_eq!(session.current_account(), None);
	}

	#[tokio::test]
	async fn test_restore_with_prior_authorization() {
		let wallet = LocalWallet::new(TEST_KEY, true).unwrap();
		let session = ProviderSession::new(Arc::new(wallet), EventBus::new(8));

		assert_eq!(session.restore().await.unwrap(), Some(test_account()));
		assert_eq!(session.current_account(), Some(test_account()));
	}

	#[tokio::test]
	async fn test_connect_and_disconnect_publish_events() {
		let bus = EventBus::new(8);
		let mut events = bus.subscribe();
		let wallet = LocalWallet::new(TEST_KEY, false).unwrap();
		let session = ProviderSession::new(Arc::new(wallet), bus);

		assert_eq!(session.connect().await.unwrap(), test_account());
		session.disconnect();
		assert_eq!(session.current_account(), None);

		assert!(matches!(
			events.recv().await.unwrap(),
			PortalEvent::Session(SessionEvent::Connected { account }) if account == test_account()
		));
		assert!(matches!(
			events.recv().await.unwrap(),
			PortalEvent::Session(SessionEvent::Disconnected)
		));
	}

	#[tokio::test]
	async fn test_detached_session_has_no_wallet() {
		let session = ProviderSession::detached(EventBus::new(8));
		assert!(matches!(session.restore().await, Err(WalletError::NotAvailable)));
		assert!(matches!(session.connect().await, Err(WalletError::NotAvailable)));
	}
}

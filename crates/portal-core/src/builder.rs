//! Assembles a [`PortalEngine`] from configuration and registered backends.

use crate::{PortalEngine, PortalError};
use alloy::network::EthereumWallet;
use portal_account::{ProviderSession, WalletError, WalletInterface};
use portal_config::PortalConfig;
use portal_delivery::TransactionController;
use portal_discovery::FeedSynchronizer;
use portal_ledger::{LedgerError, LedgerFactory, LedgerInterface, LedgerService};
use portal_types::EventBus;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

type WalletFactory =
	Box<dyn Fn(&toml::Value) -> Result<Box<dyn WalletInterface>, WalletError> + Send>;

pub struct PortalBuilder {
	config: PortalConfig,
	wallet_factories: HashMap<String, WalletFactory>,
	ledger_factories: HashMap<String, LedgerFactory>,
}

impl PortalBuilder {
	pub fn new(config: PortalConfig) -> Self {
		Self {
			config,
			wallet_factories: HashMap::new(),
			ledger_factories: HashMap::new(),
		}
	}

	pub fn with_wallet_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn WalletInterface>, WalletError> + Send + 'static,
	{
		self.wallet_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_ledger_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value, Option<EthereumWallet>) -> Result<Box<dyn LedgerInterface>, LedgerError>
			+ Send
			+ 'static,
	{
		self.ledger_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn build(self) -> Result<PortalEngine, PortalError> {
		let config = self.config;
		let event_bus = EventBus::new(config.portal.event_bus_capacity);

		// Create wallet, if any
		let wallet: Option<Arc<dyn WalletInterface>> = match &config.wallet {
			Some(section) => {
				let factory = self
					.wallet_factories
					.get(&section.implementation)
					.ok_or_else(|| PortalError::UnknownImplementation {
						kind: "wallet",
						name: section.implementation.clone(),
					})?;
				Some(Arc::from(factory(&section.config)?))
			}
			None => None,
		};

		let session = Arc::new(match &wallet {
			Some(wallet) => ProviderSession::new(Arc::clone(wallet), event_bus.clone()),
			None => ProviderSession::detached(event_bus.clone()),
		});

		// Create ledger, signing with the wallet when it signs locally
		let factory = self
			.ledger_factories
			.get(&config.ledger.implementation)
			.ok_or_else(|| PortalError::UnknownImplementation {
				kind: "ledger",
				name: config.ledger.implementation.clone(),
			})?;
		let signer = wallet.as_ref().and_then(|wallet| wallet.ethereum_wallet());
		let ledger = Arc::new(LedgerService::new(factory(&config.ledger.config, signer)?));

		let feed = Arc::new(FeedSynchronizer::new(
			Arc::clone(&ledger),
			event_bus.clone(),
		));
		let controller = TransactionController::new(
			Arc::clone(&session),
			Arc::clone(&ledger),
			feed.clone(),
			event_bus.clone(),
		)
		.with_display_window(Duration::from_secs(config.portal.display_window_secs))
		.with_gas_limit(config.portal.gas_limit);

		info!(
			name = %config.portal.name,
			ledger = %config.ledger.implementation,
			wallet = config.wallet.as_ref().map(|w| w.implementation.as_str()).unwrap_or("none"),
			"Portal assembled"
		);

		Ok(PortalEngine::new(
			config, session, feed, controller, event_bus,
		))
	}
}

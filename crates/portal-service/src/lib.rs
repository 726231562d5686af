//! Command-line front end for the idea portal.
//!
//! # Components
//!
//! - `cli`: command-line arguments
//! - `render`: plain-text rendering of ideas, statuses and events
//!
//! [`builder`] registers every wallet and ledger backend shipped with the
//! portal, so a configuration can select any of them by name.

use portal_config::PortalConfig;
use portal_core::PortalBuilder;

pub mod cli;
pub mod render;

pub fn builder(config: PortalConfig) -> PortalBuilder {
	PortalBuilder::new(config)
		.with_wallet_factory("local", portal_account::implementations::local::create_wallet)
		.with_wallet_factory("rpc", portal_account::implementations::rpc::create_wallet)
		.with_ledger_factory("evm", portal_ledger::implementations::evm::create_ledger)
		.with_ledger_factory("memory", portal_ledger::implementations::memory::create_ledger)
}

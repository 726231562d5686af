//! Shared types for the idea portal.
//!
//! Everything that more than one portal crate needs to agree on lives here:
//! addresses, ideas, transaction status, the event bus and the configuration
//! schema helpers used by wallet and ledger implementations.

pub mod account;
pub mod delivery;
pub mod events;
pub mod feed;
pub mod idea;
pub mod validation;

pub use account::*;
pub use delivery::*;
pub use events::*;
pub use feed::*;
pub use idea::*;
pub use validation::*;

//! Command-line interface definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "idea-portal")]
#[command(about = "Submit startup ideas to the portal contract and follow the feed", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
	/// Path to configuration file
	#[arg(short, long, value_name = "FILE", env = "PORTAL_CONFIG", default_value = "config/portal.toml")]
	pub config: PathBuf,

	/// Log level override (trace, debug, info, warn, error); RUST_LOG takes precedence
	#[arg(short, long, env = "PORTAL_LOG_LEVEL")]
	pub log_level: Option<String>,

	#[command(subcommand)]
	pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Follow the feed and submit every line read from stdin as an idea
	Run,

	/// Submit one idea and wait for it to settle
	Submit {
		/// The idea
		message: String,
	},

	/// Print the feed
	Feed {
		/// Keep printing new ideas until interrupted
		#[arg(short, long)]
		follow: bool,

		/// Print the full portal view as JSON
		#[arg(long)]
		json: bool,
	},

	/// Print the total number of ideas on the ledger
	Count,

	/// Ask the wallet to authorize an account
	Connect,

	/// Validate the configuration file and the backends it selects
	Validate,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_submit() {
		let cli = Cli::try_parse_from(["idea-portal", "-c", "portal.toml", "submit", "goats as a service"])
			.unwrap();
		assert_eq!(cli.config, PathBuf::from("portal.toml"));
		assert!(matches!(
			cli.command,
			Some(Command::Submit { message }) if message == "goats as a service"
		));
	}

	#[test]
	fn test_parse_feed_flags() {
		let cli = Cli::try_parse_from(["idea-portal", "feed", "--follow"]).unwrap();
		assert!(matches!(
			cli.command,
			Some(Command::Feed {
				follow: true,
				json: false
			})
		));
	}
}

use anyhow::{bail, Context, Result};
use clap::Parser;
use portal_config::{ConfigLoader, PortalConfig};
use portal_core::PortalEngine;
use portal_service::cli::{Cli, Command};
use portal_service::render;
use portal_types::TransactionState;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	let config = load_config(&cli).await?;

	// Initialize tracing; the command line wins over the configuration file
	let log_level = cli.log_level.as_deref().unwrap_or(&config.portal.log_level);
	setup_tracing(log_level)?;
	info!("Loaded configuration from {:?}", cli.config);

	match cli.command.unwrap_or(Command::Run) {
		Command::Run => run(config).await,
		Command::Submit { message } => submit(config, &message).await,
		Command::Feed { follow, json } => feed(config, follow, json).await,
		Command::Count => count(config).await,
		Command::Connect => connect(config).await,
		Command::Validate => validate(config),
	}
}

async fn load_config(cli: &Cli) -> Result<PortalConfig> {
	ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")
}

fn build(config: PortalConfig) -> Result<PortalEngine> {
	portal_service::builder(config)
		.build()
		.context("Failed to build portal")
}

async fn run(config: PortalConfig) -> Result<()> {
	let engine = build(config)?;
	let mut events = engine.events();
	let view = engine.start().await;

	for idea in &view.ideas {
		println!("{}", render::idea_line(idea));
	}
	println!("{}", render::feed_summary(&view));
	println!("Type an idea and press enter to submit it, or :connect to connect a wallet.");

	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	let shutdown_signal = setup_shutdown_signal();
	tokio::pin!(shutdown_signal);

	loop {
		tokio::select! {
			_ = &mut shutdown_signal => {
				info!("Shutdown signal received");
				break;
			}
			event = events.recv() => match event {
				Ok(event) => {
					if let Some(line) = render::event_line(&event) {
						println!("{}", line);
					}
				}
				Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
					warn!("Skipped {} portal events", skipped);
				}
				Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
			},
			line = lines.next_line() => match line.context("Failed to read stdin")? {
				Some(line) if line.trim() == ":connect" => {
					if let Err(e) = engine.connect_wallet().await {
						println!("Wallet connection failed: {}", e);
					}
				}
				Some(line) => {
					// Progress is reported through the event stream.
					if let Err(e) = engine.submit(&line) {
						println!("{}", e);
					}
				}
				None => break,
			},
		}
	}

	engine.shutdown().await;
	Ok(())
}

async fn submit(config: PortalConfig, message: &str) -> Result<()> {
	let engine = build(config)?;
	engine.start().await;

	let handle = engine.submit(message).context("Submission rejected")?;
	if let Some(line) = render::status_line(&engine.controller().status()) {
		println!("{}", line);
	}

	let status = handle.finished().await?;
	if let Some(line) = render::status_line(&status) {
		println!("{}", line);
	}
	engine.shutdown().await;

	if status.state == TransactionState::Failed {
		bail!(
			"Submission failed: {}",
			status.detail.unwrap_or_else(|| "unknown error".to_string())
		);
	}
	Ok(())
}

async fn feed(config: PortalConfig, follow: bool, json: bool) -> Result<()> {
	let engine = build(config)?;
	let mut events = engine.events();
	let view = engine.start().await;

	if json {
		println!("{}", serde_json::to_string_pretty(&view)?);
	} else {
		for idea in &view.ideas {
			println!("{}", render::idea_line(idea));
		}
		println!("{}", render::feed_summary(&view));
	}

	if follow {
		let shutdown_signal = setup_shutdown_signal();
		tokio::pin!(shutdown_signal);
		loop {
			tokio::select! {
				_ = &mut shutdown_signal => break,
				event = events.recv() => match event {
					Ok(event @ portal_types::PortalEvent::Feed(_)) => {
						if let Some(line) = render::event_line(&event) {
							println!("{}", line);
						}
					}
					Ok(_) => {}
					Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
						warn!("Skipped {} portal events", skipped);
					}
					Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
				},
			}
		}
	}

	engine.shutdown().await;
	Ok(())
}

async fn count(config: PortalConfig) -> Result<()> {
	let engine = build(config)?;
	let total = engine
		.feed()
		.refresh_total_count()
		.await
		.context("Failed to read idea count")?;
	println!("{}", total);
	Ok(())
}

async fn connect(config: PortalConfig) -> Result<()> {
	let engine = build(config)?;
	let account = engine
		.connect_wallet()
		.await
		.context("Failed to connect wallet")?;
	println!("Connected {}", account);
	engine.shutdown().await;
	Ok(())
}

fn validate(config: PortalConfig) -> Result<()> {
	let name = config.portal.name.clone();
	let ledger = config.ledger.implementation.clone();
	let wallet = config
		.wallet
		.as_ref()
		.map(|wallet| wallet.implementation.clone())
		.unwrap_or_else(|| "none".to_string());

	// Building runs every backend's own schema validation.
	build(config)?;

	info!("Configuration is valid");
	println!("Portal: {}", name);
	println!("Ledger: {}", ledger);
	println!("Wallet: {}", wallet);
	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
		.init();

	Ok(())
}

async fn setup_shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			warn!("Failed to listen for Ctrl+C: {}", e);
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			}
			Err(e) => {
				warn!("Failed to install SIGTERM handler: {}", e);
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}

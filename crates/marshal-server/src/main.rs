// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! marshal server binary.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use marshal_github_app::{GithubAppClient, InstallationDirectory};
use marshal_server::{create_router, github_app_config, warm_directory, AppState, CheckRegistry};
use marshal_server_config::{LogFormat, LoggingConfig, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// marshal - runs pull request checks as a GitHub App.
#[derive(Parser, Debug)]
#[command(name = "marshal-server", about = "GitHub App pull request checker", version)]
struct Args {
	/// Configuration file to read instead of /etc/marshal/server.toml
	#[arg(long, env = "MARSHAL_SERVER_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run the webhook server (default)
	Serve,
	/// Print the installation id covering a repository
	Installation {
		/// Repository as owner/name
		repository: String,
	},
	/// Show version information
	Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("marshal-server {}", env!("CARGO_PKG_VERSION"));
		return Ok(());
	}

	dotenvy::dotenv().ok();

	let config = match &args.config {
		Some(path) => marshal_server_config::load_config_with_file(path)?,
		None => marshal_server_config::load_config()?,
	};

	init_tracing(&config.logging);

	match args.command {
		Some(Command::Installation { repository }) => print_installation(&config, &repository).await,
		_ => serve(config).await,
	}
}

fn init_tracing(logging: &LoggingConfig) {
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
	let registry = tracing_subscriber::registry().with(filter);

	match logging.format {
		LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
		LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
	}
}

fn github_client(config: &ServerConfig) -> Result<GithubAppClient, Box<dyn std::error::Error>> {
	let section = config.github_app.as_ref().ok_or(
		"github_app is not configured: set MARSHAL_SERVER_GITHUB_APP_ID and \
		 MARSHAL_SERVER_GITHUB_APP_PRIVATE_KEY",
	)?;
	Ok(GithubAppClient::new(github_app_config(section)?)?)
}

/// Scheduled jobs only know repository names; this resolves one.
async fn print_installation(
	config: &ServerConfig,
	repository: &str,
) -> Result<(), Box<dyn std::error::Error>> {
	let directory = InstallationDirectory::new(github_client(config)?);
	let installation_id = directory.lookup(repository).await?;
	println!("{installation_id}");
	Ok(())
}

async fn serve(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
	let github = github_client(&config)?;

	if github.webhook_secret().is_none() {
		tracing::warn!("No webhook secret configured, GitHub deliveries are not authenticated");
	}

	// Business-rule checks and CI handlers are registered here.
	let registry = CheckRegistry::new();

	tracing::info!(
		app_id = github.app_id(),
		app_slug = %github.app_slug(),
		checks = registry.check_count(),
		ci_handlers = registry.ci_handlers().len(),
		"starting marshal-server"
	);

	let directory = Arc::new(InstallationDirectory::new(github.clone()));
	warm_directory(&directory).await;

	let app = create_router(AppState::new(
		github,
		directory,
		registry,
		config.checks.clone(),
	));

	let addr = config.socket_addr();
	tracing::info!("listening on {}", addr);
	let listener = tokio::net::TcpListener::bind(&addr).await?;

	tokio::select! {
		result = axum::serve(listener, app) => {
			if let Err(e) = result {
				tracing::error!(error = %e, "Server error");
			}
		}
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("Received shutdown signal");
		}
	}

	tracing::info!("Server shutdown complete");
	Ok(())
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered configuration for the marshal server.
//!
//! Sources, lowest to highest precedence: built-in defaults, a TOML file
//! (`/etc/marshal/server.toml` unless another path is given), then
//! `MARSHAL_SERVER_*` environment variables.
//!
//! ```ignore
//! let config = marshal_server_config::load_config()?;
//! println!("listening on {}", config.socket_addr());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub http: HttpConfig,
	pub github_app: Option<GitHubAppConfig>,
	pub logging: LoggingConfig,
	pub checks: ChecksConfig,
}

impl ServerConfig {
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}
}

/// Load configuration from the system config file and the environment.
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Same as [`load_config`] but reading `config_path` instead of the system file.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_from(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

/// Resolve a merged layer, applying defaults and validation.
pub fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let http = layer.http.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();
	let checks = layer.checks.unwrap_or_default().finalize();
	let github_app = match layer.github_app {
		Some(github_app) => github_app.finalize()?,
		None => None,
	};

	info!(
		host = %http.host,
		port = http.port,
		log_level = %logging.level,
		github_app_configured = github_app.is_some(),
		skip_labels = ?checks.skip_labels,
		skip_fails = checks.skip_fails,
		"Server configuration loaded"
	);

	Ok(ServerConfig {
		http,
		github_app,
		logging,
		checks,
	})
}

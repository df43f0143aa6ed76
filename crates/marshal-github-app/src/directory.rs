// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Repository → installation directory.
//!
//! Webhooks for CI systems only name a repository, so before we can act on
//! one we need the installation that covers it. The directory keeps a map of
//! `owner/name` to installation id and refreshes it lazily:
//!
//! 1. a full refresh whenever the last one is older than the TTL
//! 2. a plain map hit
//! 3. on a miss, an incremental refresh that only enumerates installations
//!    we have not seen before
//! 4. if that still misses, one forced full refresh
//! 5. otherwise [`GithubAppError::RepositoryNotFound`], listing what we know

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::client::GithubAppClient;
use crate::error::GithubAppError;

#[derive(Default)]
struct DirectoryState {
	repositories: HashMap<String, u64>,
	installations: HashSet<u64>,
	last_full_refresh: Option<Instant>,
}

impl DirectoryState {
	/// A directory that was never fully refreshed counts as stale.
	fn is_stale(&self, ttl: Duration) -> bool {
		self
			.last_full_refresh
			.map_or(true, |at| at.elapsed() >= ttl)
	}

	fn known(&self) -> Vec<String> {
		let mut known: Vec<String> = self.repositories.keys().cloned().collect();
		known.sort();
		known
	}
}

/// Lazily refreshed map from repository full name to installation id.
///
/// Lookups hold the directory lock across remote calls, so at most one
/// refresh runs at a time and concurrent lookups wait for its result.
pub struct InstallationDirectory {
	client: GithubAppClient,
	ttl: Duration,
	state: Mutex<DirectoryState>,
}

impl InstallationDirectory {
	/// Directory with the TTL from the client's configuration.
	pub fn new(client: GithubAppClient) -> Self {
		let ttl = client.config().directory_ttl();
		Self::with_ttl(client, ttl)
	}

	pub fn with_ttl(client: GithubAppClient, ttl: Duration) -> Self {
		Self {
			client,
			ttl,
			state: Mutex::new(DirectoryState::default()),
		}
	}

	/// Installation id covering `repository` (`owner/name`).
	#[instrument(skip(self))]
	pub async fn lookup(&self, repository: &str) -> Result<u64, GithubAppError> {
		let mut state = self.state.lock().await;

		if state.is_stale(self.ttl) {
			debug!("Installation directory is stale, running full refresh");
			self.full_refresh(&mut state).await?;
			return found_or_not(&state, repository);
		}

		if let Some(&id) = state.repositories.get(repository) {
			return Ok(id);
		}

		debug!("Repository not in directory, checking for new installations");
		self.incremental_refresh(&mut state).await?;
		if let Some(&id) = state.repositories.get(repository) {
			return Ok(id);
		}

		debug!("Still missing after incremental refresh, forcing full refresh");
		self.full_refresh(&mut state).await?;
		found_or_not(&state, repository)
	}

	/// Force a full refresh now.
	pub async fn refresh(&self) -> Result<(), GithubAppError> {
		let mut state = self.state.lock().await;
		self.full_refresh(&mut state).await
	}

	/// Every repository currently in the directory, sorted.
	pub async fn known_repositories(&self) -> Vec<String> {
		self.state.lock().await.known()
	}

	/// Rebuild from scratch. The previous map survives a failed refresh.
	async fn full_refresh(&self, state: &mut DirectoryState) -> Result<(), GithubAppError> {
		let installations = self.installation_ids().await?;

		let mut repositories = HashMap::new();
		for &installation_id in &installations {
			for name in self.installation_repositories(installation_id).await? {
				repositories.insert(name, installation_id);
			}
		}

		info!(
			installations = installations.len(),
			repositories = repositories.len(),
			"Installation directory refreshed"
		);

		state.repositories = repositories;
		state.installations = installations.into_iter().collect();
		state.last_full_refresh = Some(Instant::now());
		Ok(())
	}

	/// Enumerate only installations that appeared since we last looked.
	/// Installations that went away are left for the next full refresh.
	async fn incremental_refresh(&self, state: &mut DirectoryState) -> Result<(), GithubAppError> {
		let fresh: Vec<u64> = self
			.installation_ids()
			.await?
			.into_iter()
			.filter(|id| !state.installations.contains(id))
			.collect();

		for installation_id in fresh {
			for name in self.installation_repositories(installation_id).await? {
				state.repositories.insert(name, installation_id);
			}
			state.installations.insert(installation_id);
			debug!(installation_id, "Added new installation to directory");
		}
		Ok(())
	}

	async fn installation_ids(&self) -> Result<Vec<u64>, GithubAppError> {
		Ok(self
			.client
			.list_installations()
			.await?
			.into_iter()
			.map(|installation| installation.id)
			.collect())
	}

	async fn installation_repositories(
		&self,
		installation_id: u64,
	) -> Result<Vec<String>, GithubAppError> {
		Ok(self
			.client
			.installation(installation_id)
			.list_repositories()
			.await?
			.into_iter()
			.map(|repository| repository.full_name)
			.collect())
	}
}

fn found_or_not(state: &DirectoryState, repository: &str) -> Result<u64, GithubAppError> {
	state
		.repositories
		.get(repository)
		.copied()
		.ok_or_else(|| GithubAppError::repository_not_found(repository, state.known()))
}

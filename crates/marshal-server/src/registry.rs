// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Pull request checks and CI handlers known to the server.
//!
//! Everything is registered explicitly when the server is assembled;
//! nothing registers itself.

use std::sync::Arc;

use async_trait::async_trait;
use marshal_github_app::{DesiredChecks, GithubAppError, InstallationClient, PullRequestHandle};
use serde_json::Value;

use crate::routes::circleci::CircleCiPayload;

/// What a pull request check gets to look at.
pub struct CheckContext<'a> {
	pub pull_request: &'a PullRequestHandle,
	/// Webhook action that triggered the run, e.g. `opened` or `milestoned`.
	pub action: &'a str,
	pub payload: &'a Value,
}

/// A check producing results for a pull request's head commit.
#[async_trait]
pub trait PullRequestCheck: Send + Sync {
	fn name(&self) -> &str;

	/// Actions this check runs for. `None` runs it for every handled action.
	fn actions(&self) -> Option<&[&str]> {
		None
	}

	/// Results keyed by `external_id`. An empty map means "nothing to report",
	/// which retires anything this check reported earlier.
	async fn run(&self, ctx: &CheckContext<'_>) -> Result<DesiredChecks, GithubAppError>;
}

pub struct CiContext<'a> {
	pub installation: &'a InstallationClient,
	pub repository: &'a str,
	pub payload: &'a CircleCiPayload,
}

/// Reacts to a CircleCI build notification.
#[async_trait]
pub trait CiHandler: Send + Sync {
	fn name(&self) -> &str;

	async fn handle(&self, ctx: &CiContext<'_>) -> Result<(), GithubAppError>;
}

#[derive(Default)]
pub struct CheckRegistry {
	checks: Vec<Arc<dyn PullRequestCheck>>,
	ci_handlers: Vec<Arc<dyn CiHandler>>,
}

impl CheckRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Later registrations win when two checks report the same external id.
	pub fn register(&mut self, check: Arc<dyn PullRequestCheck>) -> &mut Self {
		self.checks.push(check);
		self
	}

	pub fn register_ci(&mut self, handler: Arc<dyn CiHandler>) -> &mut Self {
		self.ci_handlers.push(handler);
		self
	}

	/// Checks to run for `action`, in registration order.
	pub fn checks_for<'a>(
		&'a self,
		action: &'a str,
	) -> impl Iterator<Item = &'a Arc<dyn PullRequestCheck>> + 'a {
		self
			.checks
			.iter()
			.filter(move |check| {
				check
					.actions()
					.map_or(true, |actions| actions.iter().any(|wanted| *wanted == action))
			})
	}

	pub fn ci_handlers(&self) -> &[Arc<dyn CiHandler>] {
		&self.ci_handlers
	}

	pub fn check_count(&self) -> usize {
		self.checks.len()
	}
}

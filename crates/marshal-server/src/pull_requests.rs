// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Runs the registered checks against one pull request.

use marshal_github_app::{DesiredCheckResult, DesiredChecks, PullRequestHandle};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::error::ServerError;
use crate::registry::CheckContext;
use crate::AppState;

pub const ALREADY_CLOSED: &str = "Pull request already closed, no need to check";
pub const FINISHED: &str = "Finished pull requests checks";

/// A pull request event that passed the action filter.
#[derive(Debug, Clone, Copy)]
pub struct PullRequestEvent<'a> {
	pub repository: &'a str,
	pub number: u64,
	pub installation_id: u64,
	pub action: &'a str,
	pub payload: &'a Value,
}

#[instrument(
	skip(state, event),
	fields(repository = %event.repository, number = event.number, action = %event.action)
)]
pub async fn process_pull_request(
	state: &AppState,
	event: PullRequestEvent<'_>,
) -> Result<String, ServerError> {
	let pull_request = PullRequestHandle::new(
		state.github.installation(event.installation_id),
		event.repository,
		event.number,
	);

	if pull_request.is_closed().await? {
		return Ok(ALREADY_CLOSED.to_string());
	}

	let reconciler = state.github.reconciler();

	let labels = pull_request.issue().labels().await?;
	if let Some(label) = labels
		.iter()
		.find(|label| state.checks.skip_labels.contains(*label))
	{
		let title = format!("Skipping checks due to {label} label");
		if state.checks.skip_fails {
			let bot_name = reconciler.bot_name().to_string();
			let result = DesiredCheckResult::failure(bot_name.clone(), title.clone()).with_name(bot_name);
			pull_request.upsert_check(&reconciler, &result).await?;
		}
		info!(%label, "Skipping checks");
		return Ok(title);
	}

	let ctx = CheckContext {
		pull_request: &pull_request,
		action: event.action,
		payload: event.payload,
	};

	let mut desired = DesiredChecks::new();
	for check in state.registry.checks_for(event.action) {
		debug!(check = check.name(), "Running check");
		let produced = check.run(&ctx).await?;
		for external_id in desired.merge(produced) {
			warn!(
				check = check.name(),
				%external_id,
				"Check result replaces one reported by an earlier check"
			);
		}
	}

	let summary = pull_request.reconcile_checks(&reconciler, &desired).await?;
	debug!(
		created = ?summary.created,
		updated = ?summary.updated,
		retired = ?summary.retired,
		ignored = ?summary.ignored,
		"Pull request checks reconciled"
	);

	Ok(FINISHED.to_string())
}

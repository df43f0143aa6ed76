// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Check-run reconciliation.
//!
//! Given the results our checks want on a commit, bring the remote check
//! runs in line: update the ones we already own, create the ones that are
//! missing, and retire the ones no check produced any more (neutral,
//! titled "skipped"). Records from other apps are never touched.
//!
//! Every desired record is written on every run even when nothing changed,
//! writes go out in `external_id` order, and the first failing write aborts
//! the remainder.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, instrument};

use crate::checks::{
	CheckConclusion, CheckRunApi, CheckRunOutput, CheckRunRequest, DesiredCheckResult,
	DesiredChecks, ExistingCheckRecord, STATUS_COMPLETED,
};
use crate::error::GithubAppError;

/// Title given to check runs that no check reports any more.
pub const RETIRED_TITLE: &str = "skipped";

/// One remote write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckWrite {
	Create {
		request: CheckRunRequest,
	},
	Update {
		check_id: u64,
		request: CheckRunRequest,
	},
	Retire {
		check_id: u64,
		request: CheckRunRequest,
	},
}

impl CheckWrite {
	pub fn external_id(&self) -> &str {
		match self {
			Self::Create { request }
			| Self::Update { request, .. }
			| Self::Retire { request, .. } => &request.external_id,
		}
	}
}

/// Writes to perform, in order, plus desired results that were dropped
/// because they are `skip_if_missing` and nothing exists yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
	pub writes: Vec<CheckWrite>,
	pub ignored: Vec<String>,
}

/// External ids touched by a reconciliation, by outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
	pub created: Vec<String>,
	pub updated: Vec<String>,
	pub retired: Vec<String>,
	pub ignored: Vec<String>,
}

/// Reconciles check runs for one app.
#[derive(Debug, Clone)]
pub struct Reconciler {
	app_id: u64,
	bot_name: String,
}

impl Reconciler {
	pub fn new(app_id: u64, bot_name: impl Into<String>) -> Self {
		Self {
			app_id,
			bot_name: bot_name.into(),
		}
	}

	pub fn app_id(&self) -> u64 {
		self.app_id
	}

	pub fn bot_name(&self) -> &str {
		&self.bot_name
	}

	/// Name used when creating a check run that did not ask for one.
	pub fn default_name(&self, external_id: &str) -> String {
		format!("{}:{external_id}", self.bot_name)
	}

	/// Work out the writes without touching the remote.
	///
	/// Only records created by this app with a non-empty `external_id`
	/// count. When one external id has several records, the first listed
	/// (GitHub lists newest first) is the one kept in sync.
	pub fn plan(
		&self,
		head_sha: &str,
		existing: Vec<ExistingCheckRecord>,
		desired: &DesiredChecks,
	) -> ReconcilePlan {
		let mut ours: BTreeMap<String, ExistingCheckRecord> = BTreeMap::new();
		for record in existing {
			if record.app_id != Some(self.app_id) || record.external_id.is_empty() {
				continue;
			}
			if ours.contains_key(&record.external_id) {
				debug!(
					external_id = %record.external_id,
					check_id = record.check_id,
					"Ignoring duplicate check run"
				);
				continue;
			}
			ours.insert(record.external_id.clone(), record);
		}

		let keys: BTreeSet<&str> = desired
			.keys()
			.chain(ours.keys().map(String::as_str))
			.collect();

		let mut plan = ReconcilePlan::default();
		for key in keys {
			match (desired.get(key), ours.get(key)) {
				(Some(want), Some(have)) => plan.writes.push(CheckWrite::Update {
					check_id: have.check_id,
					request: merge_into(head_sha, have, want),
				}),
				(Some(want), None) if want.skip_if_missing => plan.ignored.push(key.to_string()),
				(Some(want), None) => plan.writes.push(CheckWrite::Create {
					request: self.new_request(head_sha, want),
				}),
				(None, Some(have)) => plan.writes.push(CheckWrite::Retire {
					check_id: have.check_id,
					request: retire(head_sha, have),
				}),
				(None, None) => {}
			}
		}
		plan
	}

	/// List, plan and write. Stops at the first failed write.
	#[instrument(skip(self, api, desired), fields(app_id = self.app_id, desired = desired.len()))]
	pub async fn reconcile<A: CheckRunApi + ?Sized>(
		&self,
		api: &A,
		repository: &str,
		head_sha: &str,
		desired: &DesiredChecks,
	) -> Result<ReconcileSummary, GithubAppError> {
		let existing = api.list_check_runs(repository, head_sha).await?;
		let plan = self.plan(head_sha, existing, desired);
		self.apply(api, repository, plan).await
	}

	/// Write a single result on `head_sha`, updating our existing record for
	/// its external id or creating one. Other records are left alone, so
	/// repeated calls never stack up duplicates.
	#[instrument(skip(self, api, want), fields(app_id = self.app_id, external_id = %want.external_id))]
	pub async fn upsert<A: CheckRunApi + ?Sized>(
		&self,
		api: &A,
		repository: &str,
		head_sha: &str,
		want: &DesiredCheckResult,
	) -> Result<ReconcileSummary, GithubAppError> {
		let existing = api.list_check_runs(repository, head_sha).await?;
		let mut desired = DesiredChecks::new();
		desired.insert(want.clone());

		let mut plan = self.plan(head_sha, existing, &desired);
		plan.writes
			.retain(|write| !matches!(write, CheckWrite::Retire { .. }));
		self.apply(api, repository, plan).await
	}

	async fn apply<A: CheckRunApi + ?Sized>(
		&self,
		api: &A,
		repository: &str,
		plan: ReconcilePlan,
	) -> Result<ReconcileSummary, GithubAppError> {
		let mut summary = ReconcileSummary {
			ignored: plan.ignored,
			..ReconcileSummary::default()
		};

		for write in plan.writes {
			match write {
				CheckWrite::Create { request } => {
					api.create_check_run(repository, &request).await?;
					summary.created.push(request.external_id);
				}
				CheckWrite::Update { check_id, request } => {
					api.update_check_run(repository, check_id, &request).await?;
					summary.updated.push(request.external_id);
				}
				CheckWrite::Retire { check_id, request } => {
					api.update_check_run(repository, check_id, &request).await?;
					summary.retired.push(request.external_id);
				}
			}
		}

		info!(
			created = summary.created.len(),
			updated = summary.updated.len(),
			retired = summary.retired.len(),
			"Check runs reconciled"
		);
		Ok(summary)
	}

	/// Request creating `want` on `head_sha` from scratch.
	pub fn new_request(&self, head_sha: &str, want: &DesiredCheckResult) -> CheckRunRequest {
		CheckRunRequest {
			name: want
				.name
				.clone()
				.unwrap_or_else(|| self.default_name(&want.external_id)),
			head_sha: head_sha.to_string(),
			external_id: want.external_id.clone(),
			status: STATUS_COMPLETED,
			conclusion: want.conclusion.writable(),
			details_url: want.details_url.clone(),
			output: CheckRunOutput {
				title: want.title.clone(),
				summary: want.summary.clone(),
				text: want.text.clone(),
			},
		}
	}
}

/// Desired fields win; fields the check left unset keep their remote value.
fn merge_into(head_sha: &str, have: &ExistingCheckRecord, want: &DesiredCheckResult) -> CheckRunRequest {
	CheckRunRequest {
		name: want.name.clone().unwrap_or_else(|| have.name.clone()),
		head_sha: head_sha.to_string(),
		external_id: have.external_id.clone(),
		status: STATUS_COMPLETED,
		conclusion: want.conclusion.writable(),
		details_url: want.details_url.clone().or_else(|| have.details_url.clone()),
		output: CheckRunOutput {
			title: want.title.clone(),
			summary: want.summary.clone(),
			text: want.text.clone().or_else(|| have.text.clone()),
		},
	}
}

fn retire(head_sha: &str, have: &ExistingCheckRecord) -> CheckRunRequest {
	CheckRunRequest {
		name: have.name.clone(),
		head_sha: head_sha.to_string(),
		external_id: have.external_id.clone(),
		status: STATUS_COMPLETED,
		conclusion: CheckConclusion::Neutral,
		details_url: have.details_url.clone(),
		output: CheckRunOutput {
			title: RETIRED_TITLE.to_string(),
			summary: have.summary.clone().unwrap_or_default(),
			text: have.text.clone(),
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use std::sync::Mutex;

	const APP_ID: u64 = 4242;
	const SHA: &str = "abc123";

	fn record(check_id: u64, external_id: &str, app_id: u64) -> ExistingCheckRecord {
		ExistingCheckRecord {
			check_id,
			external_id: external_id.to_string(),
			name: format!("marshal:{external_id}"),
			head_sha: SHA.to_string(),
			status: "completed".to_string(),
			conclusion: Some(CheckConclusion::Success),
			title: Some("old title".to_string()),
			summary: Some("old summary".to_string()),
			text: Some("old text".to_string()),
			details_url: Some("https://ci.example.com/1".to_string()),
			app_id: Some(app_id),
		}
	}

	fn reconciler() -> Reconciler {
		Reconciler::new(APP_ID, "marshal")
	}

	/// In-memory check runs that remember every write.
	#[derive(Default)]
	struct FakeChecks {
		records: Mutex<Vec<ExistingCheckRecord>>,
		log: Mutex<Vec<String>>,
		fail_on: Option<String>,
	}

	impl FakeChecks {
		fn with(records: Vec<ExistingCheckRecord>) -> Self {
			Self {
				records: Mutex::new(records),
				..Self::default()
			}
		}

		fn log(&self) -> Vec<String> {
			self.log.lock().unwrap().clone()
		}

		fn fail_if_asked(&self, external_id: &str) -> Result<(), GithubAppError> {
			if self.fail_on.as_deref() == Some(external_id) {
				return Err(GithubAppError::api_error(500, "boom"));
			}
			Ok(())
		}
	}

	#[async_trait]
	impl CheckRunApi for FakeChecks {
		async fn list_check_runs(
			&self,
			_repository: &str,
			_head_sha: &str,
		) -> Result<Vec<ExistingCheckRecord>, GithubAppError> {
			Ok(self.records.lock().unwrap().clone())
		}

		async fn create_check_run(
			&self,
			_repository: &str,
			request: &CheckRunRequest,
		) -> Result<u64, GithubAppError> {
			self.fail_if_asked(&request.external_id)?;
			let mut records = self.records.lock().unwrap();
			let check_id = 1000 + records.len() as u64;
			let mut created = record(check_id, &request.external_id, APP_ID);
			created.name = request.name.clone();
			created.conclusion = Some(request.conclusion);
			created.title = Some(request.output.title.clone());
			records.insert(0, created);
			self.log
				.lock()
				.unwrap()
				.push(format!("create:{}", request.external_id));
			Ok(check_id)
		}

		async fn update_check_run(
			&self,
			_repository: &str,
			check_id: u64,
			request: &CheckRunRequest,
		) -> Result<(), GithubAppError> {
			self.fail_if_asked(&request.external_id)?;
			let mut records = self.records.lock().unwrap();
			if let Some(existing) = records.iter_mut().find(|r| r.check_id == check_id) {
				existing.conclusion = Some(request.conclusion);
				existing.title = Some(request.output.title.clone());
			}
			self.log
				.lock()
				.unwrap()
				.push(format!("update:{check_id}:{}", request.external_id));
			Ok(())
		}
	}

	#[test]
	fn test_plan_creates_missing_with_default_name() {
		let desired: DesiredChecks = [DesiredCheckResult::success("lint", "clean")]
			.into_iter()
			.collect();
		let plan = reconciler().plan(SHA, vec![], &desired);

		assert_eq!(plan.writes.len(), 1);
		let CheckWrite::Create { request } = &plan.writes[0] else {
			panic!("expected create, got {:?}", plan.writes[0]);
		};
		assert_eq!(request.name, "marshal:lint");
		assert_eq!(request.status, "completed");
		assert_eq!(request.head_sha, SHA);
		assert_eq!(request.output.title, "clean");
	}

	#[test]
	fn test_plan_updates_by_check_id_and_merges() {
		let desired: DesiredChecks = [DesiredCheckResult::failure("lint", "3 errors")]
			.into_iter()
			.collect();
		let plan = reconciler().plan(SHA, vec![record(7, "lint", APP_ID)], &desired);

		let CheckWrite::Update { check_id, request } = &plan.writes[0] else {
			panic!("expected update, got {:?}", plan.writes[0]);
		};
		assert_eq!(*check_id, 7);
		assert_eq!(request.conclusion, CheckConclusion::Failure);
		assert_eq!(request.output.title, "3 errors");
		assert_eq!(request.name, "marshal:lint");
		assert_eq!(request.output.text.as_deref(), Some("old text"));
		assert_eq!(request.details_url.as_deref(), Some("https://ci.example.com/1"));
	}

	#[test]
	fn test_plan_retires_stale_as_neutral_skipped() {
		let plan = reconciler().plan(SHA, vec![record(8, "old", APP_ID)], &DesiredChecks::new());

		let CheckWrite::Retire { check_id, request } = &plan.writes[0] else {
			panic!("expected retire, got {:?}", plan.writes[0]);
		};
		assert_eq!(*check_id, 8);
		assert_eq!(request.conclusion, CheckConclusion::Neutral);
		assert_eq!(request.output.title, RETIRED_TITLE);
		assert_eq!(request.output.summary, "old summary");
	}

	#[test]
	fn test_plan_ignores_other_apps_and_blank_ids() {
		let plan = reconciler().plan(
			SHA,
			vec![record(1, "lint", 99), record(2, "", APP_ID)],
			&DesiredChecks::new(),
		);
		assert!(plan.writes.is_empty());
	}

	#[test]
	fn test_plan_skip_if_missing() {
		let desired: DesiredChecks = [DesiredCheckResult::success("deploy", "ok").skip_if_missing()]
			.into_iter()
			.collect();

		let plan = reconciler().plan(SHA, vec![], &desired);
		assert!(plan.writes.is_empty());
		assert_eq!(plan.ignored, vec!["deploy".to_string()]);

		let plan = reconciler().plan(SHA, vec![record(3, "deploy", APP_ID)], &desired);
		assert!(matches!(plan.writes[0], CheckWrite::Update { check_id: 3, .. }));
	}

	#[test]
	fn test_plan_is_sorted_by_external_id() {
		let desired: DesiredChecks = [
			DesiredCheckResult::success("zeta", "ok"),
			DesiredCheckResult::success("alpha", "ok"),
		]
		.into_iter()
		.collect();
		let plan = reconciler().plan(SHA, vec![record(5, "middle", APP_ID)], &desired);

		let order: Vec<&str> = plan.writes.iter().map(CheckWrite::external_id).collect();
		assert_eq!(order, vec!["alpha", "middle", "zeta"]);
	}

	#[test]
	fn test_plan_keeps_first_of_duplicates() {
		let desired: DesiredChecks = [DesiredCheckResult::success("lint", "ok")]
			.into_iter()
			.collect();
		let plan = reconciler().plan(
			SHA,
			vec![record(9, "lint", APP_ID), record(3, "lint", APP_ID)],
			&desired,
		);
		assert_eq!(plan.writes.len(), 1);
		assert!(matches!(plan.writes[0], CheckWrite::Update { check_id: 9, .. }));
	}

	#[tokio::test]
	async fn test_reconcile_creates_updates_and_retires() {
		let api = FakeChecks::with(vec![record(7, "build", APP_ID), record(8, "old", APP_ID)]);
		let desired: DesiredChecks = [
			DesiredCheckResult::success("build", "ok"),
			DesiredCheckResult::success("lint", "ok"),
		]
		.into_iter()
		.collect();

		let summary = reconciler()
			.reconcile(&api, "acme/widgets", SHA, &desired)
			.await
			.unwrap();

		assert_eq!(summary.created, vec!["lint".to_string()]);
		assert_eq!(summary.updated, vec!["build".to_string()]);
		assert_eq!(summary.retired, vec!["old".to_string()]);
		assert_eq!(
			api.log(),
			vec!["update:7:build", "create:lint", "update:8:old"]
		);
	}

	#[tokio::test]
	async fn test_reconcile_twice_rewrites_without_creating() {
		let api = FakeChecks::default();
		let desired: DesiredChecks = [
			DesiredCheckResult::success("lint", "ok"),
			DesiredCheckResult::failure("build", "broken"),
		]
		.into_iter()
		.collect();

		let first = reconciler()
			.reconcile(&api, "acme/widgets", SHA, &desired)
			.await
			.unwrap();
		assert_eq!(first.created.len(), 2);

		let second = reconciler()
			.reconcile(&api, "acme/widgets", SHA, &desired)
			.await
			.unwrap();
		assert!(second.created.is_empty());
		assert_eq!(second.updated, vec!["build".to_string(), "lint".to_string()]);
		assert!(second.retired.is_empty());
		assert_eq!(api.records.lock().unwrap().len(), 2);
	}

	#[test]
	fn test_unwritable_conclusion_goes_out_neutral() {
		let want = DesiredCheckResult::new("lint", CheckConclusion::Other, "odd");
		let desired: DesiredChecks = [want.clone()].into_iter().collect();

		assert_eq!(
			reconciler().new_request(SHA, &want).conclusion,
			CheckConclusion::Neutral
		);
		let plan = reconciler().plan(SHA, vec![record(7, "lint", APP_ID)], &desired);
		let CheckWrite::Update { request, .. } = &plan.writes[0] else {
			panic!("expected update, got {:?}", plan.writes[0]);
		};
		assert_eq!(request.conclusion, CheckConclusion::Neutral);
		assert_eq!(serde_json::to_value(request).unwrap()["conclusion"], "neutral");
	}

	#[tokio::test]
	async fn test_upsert_updates_own_record_and_retires_nothing() {
		let api = FakeChecks::with(vec![
			record(77, "marshal", APP_ID),
			record(8, "lint", APP_ID),
			record(5, "marshal", 99),
		]);
		let want = DesiredCheckResult::failure("marshal", "Skipping checks due to WIP label")
			.with_name("marshal");

		for _ in 0..2 {
			let summary = reconciler()
				.upsert(&api, "acme/widgets", SHA, &want)
				.await
				.unwrap();
			assert_eq!(summary.updated, vec!["marshal".to_string()]);
			assert!(summary.created.is_empty());
			assert!(summary.retired.is_empty());
		}
		assert_eq!(api.log(), vec!["update:77:marshal", "update:77:marshal"]);
	}

	#[tokio::test]
	async fn test_upsert_creates_once_then_updates() {
		let api = FakeChecks::default();
		let want = DesiredCheckResult::failure("marshal", "Skipping checks due to WIP label")
			.with_name("marshal");

		let first = reconciler()
			.upsert(&api, "acme/widgets", SHA, &want)
			.await
			.unwrap();
		assert_eq!(first.created, vec!["marshal".to_string()]);

		let second = reconciler()
			.upsert(&api, "acme/widgets", SHA, &want)
			.await
			.unwrap();
		assert_eq!(second.updated, vec!["marshal".to_string()]);
		assert_eq!(api.log(), vec!["create:marshal", "update:1000:marshal"]);
	}

	#[tokio::test]
	async fn test_reconcile_stops_at_first_failure() {
		let api = FakeChecks {
			fail_on: Some("beta".to_string()),
			..FakeChecks::default()
		};
		let desired: DesiredChecks = ["alpha", "beta", "gamma"]
			.into_iter()
			.map(|id| DesiredCheckResult::success(id, "ok"))
			.collect();

		let err = reconciler()
			.reconcile(&api, "acme/widgets", SHA, &desired)
			.await
			.unwrap_err();
		assert!(matches!(err, GithubAppError::Api { status: 500, .. }));
		assert_eq!(api.log(), vec!["create:alpha"]);
	}
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! GitHub App core for marshal.
//!
//! Authenticates as a GitHub App (signed JWT assertions, cached installation
//! tokens), maps repositories to installations, reads paginated listings and
//! keeps the app's check runs on a commit in line with what its checks
//! report.

pub mod checks;
pub mod client;
pub mod config;
pub mod directory;
pub mod error;
pub mod issue;
pub mod jwt;
pub mod pagination;
pub mod pull_request;
pub mod reconcile;
pub mod status;
pub mod types;
pub mod webhook;

#[cfg(test)]
mod test_support;

pub use checks::{
	CheckConclusion, CheckRunApi, CheckRunRequest, DesiredCheckResult, DesiredChecks,
	ExistingCheckRecord,
};
pub use client::{GithubAppClient, InstallationClient};
pub use config::GithubAppConfig;
pub use directory::InstallationDirectory;
pub use error::GithubAppError;
pub use issue::{CommentFilter, IssueComment, IssueHandle, KeepAll, RemoteObject};
pub use jwt::{generate_app_jwt, AppAssertion, AppTokenIssuer};
pub use pull_request::{PullRequestHandle, ReviewEvent};
pub use reconcile::{ReconcileSummary, Reconciler, RETIRED_TITLE};
pub use status::{CommitStatus, StatusRequest, StatusState};
pub use types::{AppInfo, Installation, InstallationAccount, InstallationRepository};
pub use webhook::{compute_webhook_signature, verify_webhook_signature};

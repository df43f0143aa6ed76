// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Wire types for the GitHub App endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A GitHub App installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Installation {
	/// Installation ID.
	pub id: u64,
	/// Account that owns the installation.
	#[serde(default)]
	pub account: Option<InstallationAccount>,
	/// Repository selection mode ("all" or "selected").
	#[serde(default)]
	pub repository_selection: Option<String>,
}

/// Account that owns a GitHub App installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationAccount {
	/// Account login name.
	pub login: String,
	/// Account type ("User" or "Organization").
	#[serde(rename = "type")]
	pub account_type: String,
}

/// A repository as listed by `GET /installation/repositories`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationRepository {
	pub id: u64,
	/// `owner/name`.
	pub full_name: String,
}

/// Access token response from GitHub.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessTokenResponse {
	pub token: String,
	pub expires_at: DateTime<Utc>,
}

/// Error body returned by most GitHub endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubErrorResponse {
	pub message: String,
	#[serde(default)]
	pub documentation_url: Option<String>,
}

/// The app itself, from `GET /app`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppInfo {
	pub id: u64,
	pub slug: String,
	pub name: String,
	#[serde(default)]
	pub html_url: Option<String>,
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

mod checks;
mod github_app;
mod http;
mod logging;

pub use checks::{ChecksConfig, ChecksConfigLayer};
pub use github_app::{GitHubAppConfig, GitHubAppConfigLayer};
pub use http::{HttpConfig, HttpConfigLayer};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};

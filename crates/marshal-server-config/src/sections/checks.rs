// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pull request check driver settings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksConfig {
	/// A pull request carrying any of these labels is not checked.
	pub skip_labels: Vec<String>,
	/// Whether a skipped pull request gets a failing check run saying so.
	pub skip_fails: bool,
}

impl Default for ChecksConfig {
	fn default() -> Self {
		Self {
			skip_labels: Vec::new(),
			skip_fails: true,
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChecksConfigLayer {
	#[serde(default)]
	pub skip_labels: Option<Vec<String>>,
	#[serde(default)]
	pub skip_fails: Option<bool>,
}

impl ChecksConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.skip_labels.is_some() {
			self.skip_labels = other.skip_labels;
		}
		if other.skip_fails.is_some() {
			self.skip_fails = other.skip_fails;
		}
	}

	pub fn finalize(self) -> ChecksConfig {
		ChecksConfig {
			skip_labels: self.skip_labels.unwrap_or_default(),
			skip_fails: self.skip_fails.unwrap_or(true),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = ChecksConfigLayer::default().finalize();
		assert!(config.skip_labels.is_empty());
		assert!(config.skip_fails);
	}

	#[test]
	fn test_toml_layer_overrides() {
		let mut base = ChecksConfigLayer::default();
		base.merge(toml::from_str("skip_labels = [\"Experimental\"]\nskip_fails = false").unwrap());
		let config = base.finalize();
		assert_eq!(config.skip_labels, vec!["Experimental".to_string()]);
		assert!(!config.skip_fails);
	}
}

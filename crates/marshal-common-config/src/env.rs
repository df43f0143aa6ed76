// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Loading secrets from the environment.
//!
//! A secret `VAR` may be given inline or, for mounted Docker/Kubernetes
//! secrets, as a path in `VAR_FILE`. The file form wins when both are set.

use std::path::PathBuf;
use std::{env, fs};

use thiserror::Error;

use crate::secret::Secret;

#[derive(Debug, Error)]
pub enum SecretEnvError {
	#[error("failed to read secret file at {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("secret file path in {var} is empty")]
	EmptyPath { var: String },
}

#[derive(Debug, Error)]
pub enum RequiredSecretError {
	#[error("required secret not found: set either {var} or {file_var}")]
	Missing { var: String, file_var: String },

	#[error(transparent)]
	Load(#[from] SecretEnvError),
}

/// Load `var` from the environment, preferring the file named by `{var}_FILE`.
///
/// One trailing newline is stripped from file contents. PEM keys keep their
/// inner line breaks.
pub fn load_secret_env(var: &str) -> Result<Option<Secret<String>>, SecretEnvError> {
	let file_var = format!("{var}_FILE");

	if let Ok(path_str) = env::var(&file_var) {
		if path_str.is_empty() {
			return Err(SecretEnvError::EmptyPath { var: file_var });
		}

		let path = PathBuf::from(path_str);
		let content = fs::read_to_string(&path).map_err(|source| SecretEnvError::Io {
			path: path.clone(),
			source,
		})?;
		let value = content.strip_suffix('\n').unwrap_or(&content).to_string();
		return Ok(Some(Secret::new(value)));
	}

	Ok(env::var(var).ok().map(Secret::new))
}

/// Like [`load_secret_env`] but absence is an error.
pub fn require_secret_env(var: &str) -> Result<Secret<String>, RequiredSecretError> {
	load_secret_env(var)?.ok_or_else(|| RequiredSecretError::Missing {
		var: var.to_string(),
		file_var: format!("{var}_FILE"),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;
	use tempfile::NamedTempFile;

	#[test]
	fn unset_returns_none() {
		let var = "MARSHAL_TEST_UNSET_SECRET";
		env::remove_var(var);
		env::remove_var(format!("{var}_FILE"));
		assert!(load_secret_env(var).unwrap().is_none());
	}

	#[test]
	fn reads_inline_value() {
		let var = "MARSHAL_TEST_INLINE_SECRET";
		env::remove_var(format!("{var}_FILE"));
		env::set_var(var, "inline-value");

		let secret = load_secret_env(var).unwrap().unwrap();
		assert_eq!(secret.expose(), "inline-value");

		env::remove_var(var);
	}

	#[test]
	fn file_wins_and_loses_one_trailing_newline() {
		let var = "MARSHAL_TEST_FILE_SECRET";
		let mut file = NamedTempFile::new().unwrap();
		write!(file, "-----BEGIN KEY-----\nbody\n-----END KEY-----\n").unwrap();

		env::set_var(var, "inline-value");
		env::set_var(format!("{var}_FILE"), file.path());

		let secret = load_secret_env(var).unwrap().unwrap();
		assert_eq!(secret.expose(), "-----BEGIN KEY-----\nbody\n-----END KEY-----");

		env::remove_var(var);
		env::remove_var(format!("{var}_FILE"));
	}

	#[test]
	fn missing_file_is_an_error() {
		let var = "MARSHAL_TEST_MISSING_FILE_SECRET";
		env::set_var(format!("{var}_FILE"), "/nonexistent/marshal/secret");

		assert!(matches!(
			load_secret_env(var),
			Err(SecretEnvError::Io { .. })
		));

		env::remove_var(format!("{var}_FILE"));
	}

	#[test]
	fn empty_file_path_is_an_error() {
		let var = "MARSHAL_TEST_EMPTY_PATH_SECRET";
		env::set_var(format!("{var}_FILE"), "");

		assert!(matches!(
			load_secret_env(var),
			Err(SecretEnvError::EmptyPath { .. })
		));

		env::remove_var(format!("{var}_FILE"));
	}

	#[test]
	fn require_reports_both_names() {
		let var = "MARSHAL_TEST_REQUIRED_SECRET";
		env::remove_var(var);
		env::remove_var(format!("{var}_FILE"));

		let err = require_secret_env(var).unwrap_err();
		assert_eq!(
			err.to_string(),
			"required secret not found: set either MARSHAL_TEST_REQUIRED_SECRET or MARSHAL_TEST_REQUIRED_SECRET_FILE"
		);
	}
}

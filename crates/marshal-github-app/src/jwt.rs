// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Signed app assertions (RS256 JWTs) for GitHub App authentication.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use marshal_common_config::SecretString;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, instrument, trace};

use crate::error::GithubAppError;

/// GitHub rejects assertions living longer than ten minutes.
const ASSERTION_LIFETIME_SECS: i64 = 9 * 60;
/// `iat` is backdated to tolerate clock drift on GitHub's side.
const CLOCK_SKEW_SECS: i64 = 60;
/// A cached assertion is re-minted once it has less than this left.
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Claims {
	/// Issued at timestamp (seconds since epoch).
	pub iat: i64,
	/// Expiration timestamp (seconds since epoch).
	pub exp: i64,
	/// Issuer (GitHub App ID).
	pub iss: String,
}

/// A signed assertion and the instant it stops being accepted.
#[derive(Clone)]
pub struct AppAssertion {
	token: String,
	expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for AppAssertion {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AppAssertion")
			.field("token", &marshal_common_config::REDACTED)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

impl AppAssertion {
	pub fn token(&self) -> &str {
		&self.token
	}

	pub fn expires_at(&self) -> DateTime<Utc> {
		self.expires_at
	}

	fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
		now + Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
	}
}

/// Sign a fresh app assertion.
///
/// `iss` is the app id, `iat` is backdated one minute and `exp` is nine
/// minutes out, keeping the lifetime inside GitHub's ten minute cap.
#[instrument(skip(private_key_pem))]
pub fn generate_app_jwt(app_id: u64, private_key_pem: &str) -> Result<AppAssertion, GithubAppError> {
	sign_assertion(app_id, private_key_pem, Utc::now())
}

fn sign_assertion(
	app_id: u64,
	private_key_pem: &str,
	now: DateTime<Utc>,
) -> Result<AppAssertion, GithubAppError> {
	let expires_at = now + Duration::seconds(ASSERTION_LIFETIME_SECS);
	let claims = Claims {
		iat: now.timestamp() - CLOCK_SKEW_SECS,
		exp: expires_at.timestamp(),
		iss: app_id.to_string(),
	};

	let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
		.map_err(|e| GithubAppError::Jwt(format!("Invalid RSA private key: {e}")))?;

	let token = encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
		.map_err(|e| GithubAppError::Jwt(format!("Failed to encode JWT: {e}")))?;

	debug!(app_id, exp = claims.exp, "Generated GitHub App JWT");

	Ok(AppAssertion { token, expires_at })
}

/// Hands out app assertions, re-signing only when the cached one is within a
/// minute of expiry.
///
/// The key is parsed on every mint, so a bad key surfaces on first use rather
/// than at construction.
pub struct AppTokenIssuer {
	app_id: u64,
	private_key_pem: SecretString,
	cached: Mutex<Option<AppAssertion>>,
}

impl AppTokenIssuer {
	pub fn new(app_id: u64, private_key_pem: SecretString) -> Self {
		Self {
			app_id,
			private_key_pem,
			cached: Mutex::new(None),
		}
	}

	pub fn app_id(&self) -> u64 {
		self.app_id
	}

	/// Return a valid assertion, minting one if needed.
	///
	/// The returned assertion always has more than a minute of life left.
	pub async fn assertion(&self) -> Result<AppAssertion, GithubAppError> {
		let mut cached = self.cached.lock().await;
		let now = Utc::now();

		if let Some(assertion) = cached.as_ref() {
			if assertion.is_fresh_at(now) {
				trace!("Using cached App JWT");
				return Ok(assertion.clone());
			}
		}

		let fresh = sign_assertion(self.app_id, self.private_key_pem.expose(), now)?;
		*cached = Some(fresh.clone());
		Ok(fresh)
	}

	/// Drop the cached assertion, e.g. after GitHub answered 401 to it.
	pub async fn invalidate(&self) {
		if self.cached.lock().await.take().is_some() {
			debug!("Invalidated App JWT cache");
		}
	}

	#[cfg(test)]
	async fn seed(&self, token: &str, expires_at: DateTime<Utc>) {
		*self.cached.lock().await = Some(AppAssertion {
			token: token.to_string(),
			expires_at,
		});
	}
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Shared fixtures for unit tests.

use std::sync::OnceLock;

use rsa::{pkcs1::EncodeRsaPublicKey, pkcs8::EncodePrivateKey, RsaPrivateKey};
use wiremock::MockServer;

use crate::client::GithubAppClient;
use crate::config::GithubAppConfig;

pub(crate) const TEST_APP_ID: u64 = 4242;

pub(crate) struct TestKeys {
	pub private_pem: String,
	pub public_pem: String,
}

/// One 2048-bit key per test binary; generation dominates test time otherwise.
pub(crate) fn test_keys() -> &'static TestKeys {
	static KEYS: OnceLock<TestKeys> = OnceLock::new();
	KEYS.get_or_init(|| {
		let mut rng = rand::thread_rng();
		let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("Failed to generate RSA key");
		let public_key = private_key.to_public_key();

		TestKeys {
			private_pem: private_key
				.to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
				.expect("Failed to convert private key to PEM")
				.as_str()
				.to_owned(),
			public_pem: public_key
				.to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
				.expect("Failed to convert public key to PEM"),
		}
	})
}

pub(crate) fn test_config(server: &MockServer) -> GithubAppConfig {
	GithubAppConfig::new(TEST_APP_ID, test_keys().private_pem.clone())
		.with_unchecked_base_url(&server.uri())
}

pub(crate) fn test_client(server: &MockServer) -> GithubAppClient {
	GithubAppClient::new(test_config(server)).expect("client builds")
}

/// Token response that stays valid for an hour.
pub(crate) fn token_body(token: &str) -> serde_json::Value {
	let expires_at = chrono::Utc::now() + chrono::Duration::hours(1);
	serde_json::json!({
		"token": token,
		"expires_at": expires_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
	})
}

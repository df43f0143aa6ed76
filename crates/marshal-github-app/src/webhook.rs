// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Webhook signature verification for GitHub App deliveries.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::error::GithubAppError;

type HmacSha256 = Hmac<Sha256>;

const PREFIX: &str = "sha256=";

/// Verify the `X-Hub-Signature-256` header of a delivery.
///
/// The header is `sha256=<hex>` where the hex is the HMAC-SHA256 of the raw
/// body keyed by the app's webhook secret. Comparison is constant time.
pub fn verify_webhook_signature(
	secret: &str,
	signature_header: &str,
	body: &[u8],
) -> Result<(), GithubAppError> {
	let Some(expected_hex) = signature_header.strip_prefix(PREFIX) else {
		warn!("Invalid webhook signature format: missing 'sha256=' prefix");
		return Err(GithubAppError::InvalidWebhookSignature);
	};

	let Ok(expected) = hex::decode(expected_hex) else {
		warn!("Invalid webhook signature format: not hex");
		return Err(GithubAppError::InvalidWebhookSignature);
	};

	let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
		.map_err(|_| GithubAppError::InvalidWebhookSignature)?;
	mac.update(body);

	if mac.verify_slice(&expected).is_ok() {
		debug!("Webhook signature verified successfully");
		Ok(())
	} else {
		warn!("Webhook signature verification failed");
		Err(GithubAppError::InvalidWebhookSignature)
	}
}

/// `sha256=<hex>` signature GitHub would send for `body`.
pub fn compute_webhook_signature(secret: &str, body: &[u8]) -> String {
	// HMAC accepts keys of any length.
	let mut mac =
		HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
	mac.update(body);
	format!("{PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	const TEST_SECRET: &str = "test-webhook-secret";
	const TEST_BODY: &[u8] = b"{\"action\": \"opened\"}";

	#[test]
	fn test_verify_valid_signature() {
		let signature = compute_webhook_signature(TEST_SECRET, TEST_BODY);
		assert!(verify_webhook_signature(TEST_SECRET, &signature, TEST_BODY).is_ok());
	}

	#[test]
	fn test_verify_rejects_bad_inputs() {
		let zeros = format!("sha256={}", "0".repeat(64));
		for header in [zeros.as_str(), "sha1=abc123", "sha256=not-valid-hex", ""] {
			assert!(
				matches!(
					verify_webhook_signature(TEST_SECRET, header, TEST_BODY),
					Err(GithubAppError::InvalidWebhookSignature)
				),
				"header {header:?} should be rejected"
			);
		}
	}

	#[test]
	fn test_verify_wrong_secret() {
		let signature = compute_webhook_signature(TEST_SECRET, TEST_BODY);
		assert!(verify_webhook_signature("wrong-secret", &signature, TEST_BODY).is_err());
	}

	proptest! {
		#[test]
		fn prop_valid_signature_always_verifies(
			secret in "[a-zA-Z0-9]{8,64}",
			body in proptest::collection::vec(proptest::num::u8::ANY, 1..1000)
		) {
			let signature = compute_webhook_signature(&secret, &body);
			prop_assert!(verify_webhook_signature(&secret, &signature, &body).is_ok());
		}

		#[test]
		fn prop_tampered_body_fails_verification(
			secret in "[a-zA-Z0-9]{8,64}",
			body in proptest::collection::vec(proptest::num::u8::ANY, 2..500),
			tamper_index in 0usize..500usize
		) {
			let signature = compute_webhook_signature(&secret, &body);
			let mut tampered = body.clone();
			let idx = tamper_index % tampered.len();
			tampered[idx] = tampered[idx].wrapping_add(1);
			prop_assert!(verify_webhook_signature(&secret, &signature, &tampered).is_err());
		}

		#[test]
		fn prop_signature_format(
			secret in "[a-zA-Z0-9]{1,100}",
			body in proptest::collection::vec(proptest::num::u8::ANY, 0..1000)
		) {
			let signature = compute_webhook_signature(&secret, &body);
			prop_assert!(signature.starts_with(PREFIX));
			prop_assert_eq!(signature.len(), PREFIX.len() + 64);
		}
	}
}

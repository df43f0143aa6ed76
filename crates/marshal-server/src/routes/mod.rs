// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

pub mod circleci;
pub mod github;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Answer for a request that carried no body at all.
pub(crate) const NO_PAYLOAD: &str = "No payload received";

pub fn create_router(state: AppState) -> Router {
	Router::new()
		.route("/", get(index))
		.route("/installation_authorized", get(installation_authorized))
		.route("/github", post(github::github_webhook))
		.route("/circleci", post(circleci::circleci_webhook))
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}

async fn index() -> &'static str {
	"Nothing to see here"
}

/// Where GitHub sends users after they install the app.
async fn installation_authorized() -> &'static str {
	"Installation authorized"
}

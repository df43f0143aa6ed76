// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Link-header pagination.
//!
//! GitHub advertises further pages as `<url?page=N>; rel="..."` entries in
//! the `Link` header. We read the highest `page` referenced anywhere in that
//! header and fetch pages 2..=N in order, so a response that only advertises
//! `rel="next"` still works.

use reqwest::header::{HeaderMap, LINK};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::client::send_checked;
use crate::error::GithubAppError;

/// Highest `page` query parameter across all URLs in a `Link` header.
pub fn last_page(link: &str) -> Option<u32> {
	let mut highest = None;
	let mut rest = link;

	while let Some(start) = rest.find('<') {
		let after = &rest[start + 1..];
		let Some(end) = after.find('>') else {
			break;
		};
		let candidate = &after[..end];
		rest = &after[end + 1..];

		let page = Url::parse(candidate).ok().and_then(|url| {
			url
				.query_pairs()
				.find(|(key, _)| key == "page")
				.and_then(|(_, value)| value.parse::<u32>().ok())
		});

		if let Some(page) = page {
			highest = highest.max(Some(page));
		}
	}

	highest
}

/// `url` with its `page` parameter set to `page`; other parameters are kept.
pub fn page_url(url: &Url, page: u32) -> Url {
	let kept: Vec<(String, String)> = url
		.query_pairs()
		.filter(|(key, _)| key != "page")
		.map(|(key, value)| (key.into_owned(), value.into_owned()))
		.collect();

	let mut next = url.clone();
	{
		let mut query = next.query_pairs_mut();
		query.clear();
		for (key, value) in &kept {
			query.append_pair(key, value);
		}
		query.append_pair("page", &page.to_string());
	}
	next
}

/// Fetch every page of `url` and concatenate the items.
///
/// With `field` unset each page must be a JSON array. With `field` set each
/// page is an object and the array lives under that key, as in
/// `{"total_count": 3, "repositories": [...]}`.
#[instrument(skip(http, headers), fields(url = %url))]
pub(crate) async fn fetch_all(
	http: &Client,
	url: Url,
	headers: &HeaderMap,
	field: Option<&str>,
) -> Result<Vec<Value>, GithubAppError> {
	let first = send_checked(http.get(url.clone()).headers(headers.clone())).await?;
	let last = first
		.headers()
		.get(LINK)
		.and_then(|value| value.to_str().ok())
		.and_then(last_page);

	let mut items = page_items(read_page(first).await?, field)?;

	if let Some(last) = last {
		debug!(last, "Following paginated response");
		for page in 2..=last {
			let response =
				send_checked(http.get(page_url(&url, page)).headers(headers.clone())).await?;
			items.extend(page_items(read_page(response).await?, field)?);
		}
	}

	Ok(items)
}

/// Deserialize collected items into a typed list.
pub(crate) fn decode_items<T: DeserializeOwned>(items: Vec<Value>) -> Result<Vec<T>, GithubAppError> {
	items
		.into_iter()
		.map(|item| {
			serde_json::from_value(item)
				.map_err(|e| GithubAppError::InvalidResponse(format!("JSON parse error: {e}")))
		})
		.collect()
}

async fn read_page(response: Response) -> Result<Value, GithubAppError> {
	response
		.json()
		.await
		.map_err(|e| GithubAppError::InvalidResponse(format!("JSON parse error: {e}")))
}

fn page_items(body: Value, field: Option<&str>) -> Result<Vec<Value>, GithubAppError> {
	let list = match field {
		None => body,
		Some(field) => match body {
			Value::Object(mut map) => map.remove(field).ok_or_else(|| {
				GithubAppError::InvalidResponse(format!("missing '{field}' in paged response"))
			})?,
			_ => {
				return Err(GithubAppError::InvalidResponse(format!(
					"expected an object holding '{field}'"
				)))
			}
		},
	};

	match list {
		Value::Array(items) => Ok(items),
		_ => Err(GithubAppError::InvalidResponse(
			"expected a JSON array in paged response".to_string(),
		)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use serde_json::json;
	use wiremock::matchers::{method, path, query_param};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	#[test]
	fn test_last_page_from_next_and_last() {
		let link = r#"<https://api.github.com/repositories/1/issues?page=2>; rel="next", <https://api.github.com/repositories/1/issues?page=5>; rel="last""#;
		assert_eq!(last_page(link), Some(5));
	}

	#[test]
	fn test_last_page_only_next() {
		let link = r#"<https://api.github.com/app/installations?per_page=100&page=2>; rel="next""#;
		assert_eq!(last_page(link), Some(2));
	}

	#[test]
	fn test_last_page_ignores_commas_inside_urls() {
		let link = r#"<https://api.github.com/search?q=a,b&page=3>; rel="last""#;
		assert_eq!(last_page(link), Some(3));
	}

	#[test]
	fn test_last_page_without_page_params() {
		assert_eq!(last_page(""), None);
		assert_eq!(
			last_page(r#"<https://api.github.com/issues?since=x>; rel="next""#),
			None
		);
		assert_eq!(last_page("<not a url>; rel=\"next\""), None);
	}

	#[test]
	fn test_page_url_keeps_other_params() {
		let url = Url::parse("https://api.github.com/repos/o/r/labels?per_page=100&page=1").unwrap();
		let next = page_url(&url, 3);
		assert_eq!(
			next.as_str(),
			"https://api.github.com/repos/o/r/labels?per_page=100&page=3"
		);
	}

	#[test]
	fn test_page_items_envelope_and_errors() {
		let items = page_items(json!({"total_count": 1, "repositories": [{"id": 1}]}), Some("repositories")).unwrap();
		assert_eq!(items.len(), 1);

		assert!(page_items(json!({"total_count": 0}), Some("repositories")).is_err());
		assert!(page_items(json!({"message": "nope"}), None).is_err());
	}

	proptest! {
		#[test]
		fn prop_last_page_is_max(pages in proptest::collection::vec(1u32..10_000, 1..6)) {
			let link = pages
				.iter()
				.map(|p| format!("<https://api.github.com/x?per_page=30&page={p}>; rel=\"r\""))
				.collect::<Vec<_>>()
				.join(", ");
			prop_assert_eq!(last_page(&link), pages.iter().copied().max());
		}
	}

	#[tokio::test]
	async fn test_fetch_all_follows_three_pages() {
		let server = MockServer::start().await;
		let base = format!("{}/items", server.uri());

		Mock::given(method("GET"))
			.and(path("/items"))
			.and(query_param("page", "2"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!([{"n": 2}])))
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/items"))
			.and(query_param("page", "3"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!([{"n": 3}])))
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/items"))
			.respond_with(
				ResponseTemplate::new(200)
					.insert_header(
						"link",
						format!(r#"<{base}?page=2>; rel="next", <{base}?page=3>; rel="last""#).as_str(),
					)
					.set_body_json(json!([{"n": 1}])),
			)
			.expect(1)
			.mount(&server)
			.await;

		let items = fetch_all(
			&Client::new(),
			Url::parse(&base).unwrap(),
			&HeaderMap::new(),
			None,
		)
		.await
		.unwrap();

		let numbers: Vec<i64> = items.iter().map(|v| v["n"].as_i64().unwrap()).collect();
		assert_eq!(numbers, vec![1, 2, 3]);
	}

	#[tokio::test]
	async fn test_fetch_all_single_page_without_link() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/installation/repositories"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"total_count": 2,
				"repositories": [{"full_name": "o/a"}, {"full_name": "o/b"}],
			})))
			.expect(1)
			.mount(&server)
			.await;

		let url = Url::parse(&format!("{}/installation/repositories", server.uri())).unwrap();
		let items = fetch_all(&Client::new(), url, &HeaderMap::new(), Some("repositories"))
			.await
			.unwrap();
		assert_eq!(items.len(), 2);
	}

	#[tokio::test]
	async fn test_fetch_all_fails_fast_on_page_error() {
		let server = MockServer::start().await;
		let base = format!("{}/items", server.uri());

		Mock::given(method("GET"))
			.and(path("/items"))
			.and(query_param("page", "2"))
			.respond_with(ResponseTemplate::new(502))
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/items"))
			.respond_with(
				ResponseTemplate::new(200)
					.insert_header("link", format!(r#"<{base}?page=4>; rel="last""#).as_str())
					.set_body_json(json!([])),
			)
			.expect(1)
			.mount(&server)
			.await;

		let err = fetch_all(
			&Client::new(),
			Url::parse(&base).unwrap(),
			&HeaderMap::new(),
			None,
		)
		.await
		.unwrap_err();
		assert!(matches!(err, GithubAppError::Api { status: 502, .. }));
	}
}

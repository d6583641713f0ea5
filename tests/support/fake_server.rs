//! Fake OpenAI-style completion server on top of `mockito`.
//!
//! Every route records the requests it serves, so tests can assert on paths, headers, and bodies.

use mockito::{Matcher, Mock, ServerGuard};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Header names captured on every request (lowercased).
const CAPTURED_HEADERS: [&str; 2] = ["authorization", "content-type"];

#[derive(Debug, Clone)]
pub struct CapturedRequest {
	pub method: String,
	pub path: String,
	/// Only `CAPTURED_HEADERS`, names lowercased.
	pub headers: HashMap<String, String>,
	pub body: String,
}

impl CapturedRequest {
	pub fn json_body(&self) -> Value {
		serde_json::from_str(&self.body).unwrap_or(Value::Null)
	}

	fn from_mockito(request: &mockito::Request) -> Self {
		let headers = CAPTURED_HEADERS
			.iter()
			.filter_map(|name| {
				let value = request.header(*name).first()?.to_str().ok()?.to_string();
				Some((name.to_string(), value))
			})
			.collect();
		let body = request
			.body()
			.map(|body| String::from_utf8_lossy(body).into_owned())
			.unwrap_or_default();

		Self {
			method: request.method().to_string(),
			path: request.path().to_string(),
			headers,
			body,
		}
	}
}

/// The body is written part by part (chunked), pausing between two parts.
#[derive(Debug, Clone)]
pub struct FakeResponse {
	pub status: usize,
	pub content_type: &'static str,
	pub parts: Vec<String>,
	pub pause_between_parts: Duration,
}

impl FakeResponse {
	pub fn json(body: Value) -> Self {
		Self {
			status: 200,
			content_type: "application/json",
			parts: vec![body.to_string()],
			pause_between_parts: Duration::ZERO,
		}
	}

	pub fn status(status: usize, body: &str) -> Self {
		Self {
			status,
			content_type: "text/plain",
			parts: vec![body.to_string()],
			pause_between_parts: Duration::ZERO,
		}
	}

	/// `text/event-stream` body sent in several chunks.
	pub fn event_stream(parts: Vec<String>, pause_between_parts: Duration) -> Self {
		Self {
			status: 200,
			content_type: "text/event-stream",
			parts,
			pause_between_parts,
		}
	}
}

pub struct FakeServer {
	server: ServerGuard,
	requests: Arc<Mutex<Vec<CapturedRequest>>>,
	mocks: Vec<Mock>,
}

impl FakeServer {
	/// A server without routes (unrouted requests get mockito's 501).
	pub async fn start() -> Self {
		Self {
			server: mockito::Server::new_async().await,
			requests: Arc::default(),
			mocks: Vec::new(),
		}
	}

	/// A server answering `response` to every GET and POST, whatever the path.
	pub async fn answering(response: FakeResponse) -> Self {
		let mut server = Self::start().await;
		server.route("GET", Matcher::Any, Matcher::Any, response.clone()).await;
		server.route("POST", Matcher::Any, Matcher::Any, response).await;
		server
	}

	/// The default server: answers the models listing, completions (streamed or not), and embeddings.
	pub async fn start_default() -> Self {
		let mut server = Self::start().await;
		server
			.route("GET", "/v1/models".into(), Matcher::Any, models_response())
			.await;
		server
			.route("POST", "/v1/embeddings".into(), Matcher::Any, embeddings_response())
			.await;
		server
			.route(
				"POST",
				"/v1/completions".into(),
				Matcher::PartialJson(json!({"stream": false})),
				completion_response(),
			)
			.await;
		server
			.route(
				"POST",
				"/v1/completions".into(),
				Matcher::PartialJson(json!({"stream": true})),
				FakeResponse::event_stream(completion_events(&FAKE_COMPLETION_PIECES), Duration::from_millis(10)),
			)
			.await;
		server
	}

	/// Serve `response` to the requests matching `method`, `path`, and `body`.
	/// Routes must not overlap.
	pub async fn route(&mut self, method: &str, path: Matcher, body: Matcher, response: FakeResponse) {
		let captured = self.requests.clone();
		let FakeResponse {
			status,
			content_type,
			parts,
			pause_between_parts,
		} = response;

		let mock = self
			.server
			.mock(method, path)
			.match_body(body)
			.match_request(move |request| {
				captured
					.lock()
					.unwrap_or_else(|poisoned| poisoned.into_inner())
					.push(CapturedRequest::from_mockito(request));
				true
			})
			.with_status(status)
			.with_header("content-type", content_type)
			.with_chunked_body(move |writer| {
				for (i, part) in parts.iter().enumerate() {
					if i > 0 && !pause_between_parts.is_zero() {
						std::thread::sleep(pause_between_parts);
					}
					writer.write_all(part.as_bytes())?;
					writer.flush()?;
				}
				Ok(())
			})
			.create_async()
			.await;

		self.mocks.push(mock);
	}

	/// With a trailing slash, as `Endpoint` expects.
	pub fn base_url(&self) -> String {
		format!("{}/", self.server.url())
	}

	pub fn requests(&self) -> Vec<CapturedRequest> {
		self.requests.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
	}

	pub fn last_request_to(&self, path: &str) -> Option<CapturedRequest> {
		self.requests().into_iter().rev().find(|request| request.path == path)
	}
}

// region:    --- Default Routes

pub const FAKE_MODEL_ID: &str = "npc-7b-merged";
pub const FAKE_COMPLETION_PIECES: [&str; 3] = ["The dragon", " sleeps", " tonight."];
pub const FAKE_EMBEDDING: [f32; 3] = [0.25, -0.5, 1.0];

fn models_response() -> FakeResponse {
	FakeResponse::json(json!({
		"object": "list",
		"data": [{"id": FAKE_MODEL_ID, "object": "model"}, {"id": "other-model", "object": "model"}]
	}))
}

fn embeddings_response() -> FakeResponse {
	FakeResponse::json(json!({
		"data": [{"embedding": FAKE_EMBEDDING, "index": 0}]
	}))
}

fn completion_response() -> FakeResponse {
	FakeResponse::json(json!({
		"choices": [{"text": FAKE_COMPLETION_PIECES.concat(), "index": 0}]
	}))
}

/// One `data:` record per piece, then the end sentinel.
pub fn completion_events(pieces: &[&str]) -> Vec<String> {
	let mut events: Vec<String> = pieces
		.iter()
		.map(|piece| format!("data: {}\n\n", json!({"choices": [{"text": piece}]})))
		.collect();
	events.push("data: [DONE]\n\n".to_string());
	events
}

// endregion: --- Default Routes

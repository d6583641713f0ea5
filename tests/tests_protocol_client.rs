mod support;

use crate::support::{
	CapturedRequest, FAKE_COMPLETION_PIECES, FAKE_EMBEDDING, FAKE_MODEL_ID, FakeResponse, FakeServer, Result,
	completion_events,
};
use futures::StreamExt;
use llmlink::protocol::{CompletionParams, CompletionStreamEvent, ProtocolClient, RemoteConfig};
use llmlink::resolver::{AuthData, Endpoint};
use serde_json::json;
use std::time::{Duration, Instant};

fn client_for(server: &FakeServer) -> ProtocolClient {
	ProtocolClient::new(RemoteConfig::default().with_base_url(server.base_url()))
}

/// A local port nothing listens on (bound then released).
async fn closed_port_url() -> Result<String> {
	let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
	let addr = listener.local_addr()?;
	drop(listener);
	Ok(format!("http://{addr}/"))
}

// region:    --- Health & Models

#[tokio::test]
async fn test_is_alive_unreachable_is_false_within_timeout() -> Result<()> {
	let client = ProtocolClient::new(RemoteConfig::default().with_base_url(closed_port_url().await?));

	let start = Instant::now();
	let alive = client.is_alive().await;

	assert!(!alive);
	assert!(start.elapsed() < Duration::from_secs(6));
	assert_eq!(client.health().await.models, Vec::<String>::new());

	Ok(())
}

#[tokio::test]
async fn test_is_alive_slow_server_times_out() -> Result<()> {
	// -- Setup & Fixtures
	let server = FakeServer::answering(FakeResponse::event_stream(
		vec!["{\"data\":".to_string(), "[]}".to_string()],
		Duration::from_secs(10),
	))
	.await;
	let client = ProtocolClient::new(
		RemoteConfig::default()
			.with_base_url(server.base_url())
			.with_health_timeout(Duration::from_millis(200)),
	);

	// -- Exec
	let start = Instant::now();
	let alive = client.is_alive().await;

	// -- Check
	assert!(!alive);
	assert!(start.elapsed() < Duration::from_secs(5));

	Ok(())
}

#[tokio::test]
async fn test_is_alive_and_models() -> Result<()> {
	let server = FakeServer::start_default().await;
	let client = client_for(&server);

	assert!(client.is_alive().await);
	assert_eq!(client.list_models().await, vec![FAKE_MODEL_ID, "other-model"]);
	assert_eq!(client.loaded_model().await, FAKE_MODEL_ID);

	let health = client.health().await;
	assert!(health.alive);
	assert_eq!(health.models.len(), 2);

	Ok(())
}

#[tokio::test]
async fn test_list_models_error_status_is_empty() -> Result<()> {
	let server = FakeServer::answering(FakeResponse::status(503, "loading model")).await;
	let client = client_for(&server);

	assert!(!client.is_alive().await);
	assert!(client.list_models().await.is_empty());
	assert_eq!(client.loaded_model().await, "");

	Ok(())
}

// endregion: --- Health & Models

// region:    --- Completions

#[tokio::test]
async fn test_completion_non_streaming() -> Result<()> {
	let server = FakeServer::start_default().await;
	let client = client_for(&server);

	let text = client.try_completion("Tell me about the dragon.", &CompletionParams::default()).await?;

	assert_eq!(text, FAKE_COMPLETION_PIECES.concat());
	let request = server.last_request_to("/v1/completions").ok_or("no completion request")?;
	let body = request.json_body();
	assert_eq!(body["prompt"], json!("Tell me about the dragon."));
	assert_eq!(body["stream"], json!(false));

	Ok(())
}

#[tokio::test]
async fn test_completion_streaming_matches_non_streaming() -> Result<()> {
	// -- Setup & Fixtures
	let server = FakeServer::start_default().await;
	let client = client_for(&server);
	let params = CompletionParams::default();
	let mut chunks: Vec<String> = Vec::new();

	// -- Exec
	let streamed = client
		.try_completion_with_chunks("Hi", &params, |chunk| chunks.push(chunk.to_string()))
		.await?;
	let whole = client.try_completion("Hi", &params).await?;

	// -- Check
	assert_eq!(chunks, FAKE_COMPLETION_PIECES);
	assert_eq!(chunks.concat(), streamed);
	assert_eq!(streamed, whole);
	let request = server.last_request_to("/v1/completions").ok_or("no completion request")?;
	assert_eq!(request.headers.get("content-type").map(String::as_str), Some("application/json"));

	Ok(())
}

#[tokio::test]
async fn test_completion_stream_skips_malformed_records() -> Result<()> {
	// -- Setup & Fixtures
	let mut parts = vec![
		": keep-alive comment\n\n".to_string(),
		"data: {not json}\n\n".to_string(),
		"data: {\"choices\":[]}\n\n".to_string(),
	];
	parts.extend(completion_events(&["one", " two"]));
	let server = FakeServer::answering(FakeResponse::event_stream(parts, Duration::from_millis(5))).await;
	let client = client_for(&server);

	// -- Exec
	let text = client
		.try_completion_with_chunks("Hi", &CompletionParams::default(), |_| {})
		.await?;

	// -- Check
	assert_eq!(text, "one two");

	Ok(())
}

#[tokio::test]
async fn test_completion_stream_events_end_last() -> Result<()> {
	let server = FakeServer::start_default().await;
	let client = client_for(&server);

	let mut stream = client.completion_stream("Hi", &CompletionParams::default());
	let mut events = Vec::new();
	while let Some(event) = stream.next().await {
		events.push(event?);
	}

	let Some(CompletionStreamEvent::End(end)) = events.last() else {
		return Err("the last event must be End".into());
	};
	assert_eq!(end.text, FAKE_COMPLETION_PIECES.concat());
	assert!(!end.cancelled);
	assert_eq!(events.len(), FAKE_COMPLETION_PIECES.len() + 1);

	Ok(())
}

#[tokio::test]
async fn test_completion_stream_cancel_closes_stream() -> Result<()> {
	// -- Setup & Fixtures
	let server = FakeServer::answering(FakeResponse::event_stream(completion_events(&["first", " never"]), Duration::from_secs(30))).await;
	let client = client_for(&server);

	// -- Exec
	let mut stream = client.completion_stream("Hi", &CompletionParams::default());
	let first = stream.next().await.ok_or("stream ended early")??;
	client.cancel();
	let last = tokio::time::timeout(Duration::from_secs(5), stream.next()).await?;

	// -- Check
	assert_eq!(first, CompletionStreamEvent::Chunk("first".to_string()));
	match last {
		Some(Ok(CompletionStreamEvent::End(end))) => {
			assert!(end.cancelled);
			assert_eq!(end.text, "first");
		}
		other => return Err(format!("expected a cancelled End, got {other:?}").into()),
	}

	Ok(())
}

#[tokio::test]
async fn test_completion_stream_cancel_before_first_poll() -> Result<()> {
	// -- Setup & Fixtures
	let server = FakeServer::start_default().await;
	let client = client_for(&server);

	// -- Exec
	let mut stream = client.completion_stream("Hi", &CompletionParams::default());
	client.cancel();
	let first = tokio::time::timeout(Duration::from_secs(5), stream.next()).await?;

	// -- Check
	match first {
		Some(Ok(CompletionStreamEvent::End(end))) => {
			assert!(end.cancelled);
			assert_eq!(end.text, "");
		}
		other => return Err(format!("expected a cancelled End, got {other:?}").into()),
	}
	assert!(stream.next().await.is_none());
	// Streams created after the cancel run normally.
	let text = client
		.try_completion_with_chunks("Hi", &CompletionParams::default(), |_| {})
		.await?;
	assert_eq!(text, FAKE_COMPLETION_PIECES.concat());

	Ok(())
}

#[tokio::test]
async fn test_completion_server_error_is_empty_sentinel() -> Result<()> {
	let server = FakeServer::answering(FakeResponse::status(500, "boom")).await;
	let client = client_for(&server);

	assert_eq!(client.completion("Hi", &CompletionParams::default()).await, "");
	assert!(client.try_completion("Hi", &CompletionParams::default()).await.is_err());
	assert_eq!(
		client
			.completion_with_chunks("Hi", &CompletionParams::default(), |_| {})
			.await,
		""
	);

	Ok(())
}

#[tokio::test]
async fn test_completion_deadline() -> Result<()> {
	let server = FakeServer::answering(FakeResponse::event_stream(completion_events(&["slow"]), Duration::from_secs(10))).await;
	let client = ProtocolClient::new(
		RemoteConfig::default()
			.with_base_url(server.base_url())
			.with_completion_timeout(Duration::from_millis(300)),
	);

	let start = Instant::now();
	let res = client
		.try_completion_with_chunks("Hi", &CompletionParams::default(), |_| {})
		.await;

	assert!(res.is_err(), "the deadline must cut the stream, got {res:?}");
	assert!(start.elapsed() < Duration::from_secs(5));

	Ok(())
}

// endregion: --- Completions

// region:    --- Parameters

#[tokio::test]
async fn test_completion_params_translated_in_body() -> Result<()> {
	// -- Setup & Fixtures
	let server = FakeServer::start_default().await;
	let client = ProtocolClient::new(
		RemoteConfig::default()
			.with_base_url(server.base_url())
			.with_model("npc-7b"),
	);
	let params = CompletionParams::default()
		.with_n_predict(48)
		.with_repeat_penalty(1.1)
		.with_n_probs(2)
		.with_temperature(0.3)
		.with("grammar_mode", "loose");

	// -- Exec
	client.try_completion("Hi", &params).await?;

	// -- Check
	let body = server
		.last_request_to("/v1/completions")
		.ok_or("no completion request")?
		.json_body();
	assert_eq!(body["max_tokens"], json!(48));
	assert_eq!(body["frequency_penalty"], json!(1.1));
	assert_eq!(body["logprobs"], json!(2));
	assert_eq!(body["temperature"], json!(0.3));
	assert_eq!(body["grammar_mode"], json!("loose"));
	assert_eq!(body["model"], json!("npc-7b"));
	assert!(body.get("n_predict").is_none());
	assert!(body.get("repeat_penalty").is_none());

	Ok(())
}

#[tokio::test]
async fn test_completion_default_max_tokens() -> Result<()> {
	let server = FakeServer::start_default().await;
	let client = ProtocolClient::new(
		RemoteConfig::default()
			.with_base_url(server.base_url())
			.with_default_max_tokens(64),
	);

	client.try_completion("Hi", &CompletionParams::default()).await?;

	let body = server
		.last_request_to("/v1/completions")
		.ok_or("no completion request")?
		.json_body();
	assert_eq!(body["max_tokens"], json!(64));
	assert!(body.get("model").is_none());

	Ok(())
}

#[tokio::test]
async fn test_bearer_header_when_keyed() -> Result<()> {
	let server = FakeServer::start_default().await;
	let client = ProtocolClient::new(
		RemoteConfig::default()
			.with_endpoint(Endpoint::from_owned(server.base_url()))
			.with_auth(AuthData::from_single("sk-test")),
	);

	client.try_list_models().await?;

	let request: CapturedRequest = server.last_request_to("/v1/models").ok_or("no models request")?;
	assert_eq!(
		request.headers.get("authorization").map(String::as_str),
		Some("Bearer sk-test")
	);

	Ok(())
}

// endregion: --- Parameters

// region:    --- Embeddings & Unsupported

#[tokio::test]
async fn test_embeddings() -> Result<()> {
	let server = FakeServer::start_default().await;
	let client = client_for(&server);

	let embedding = client.try_embeddings("a red door").await?;

	assert_eq!(embedding, FAKE_EMBEDDING);
	let body = server.last_request_to("/v1/embeddings").ok_or("no embeddings request")?.json_body();
	assert_eq!(body["input"], json!("a red door"));

	Ok(())
}

#[tokio::test]
async fn test_embeddings_unreachable_is_empty() -> Result<()> {
	let client = ProtocolClient::new(RemoteConfig::default().with_base_url(closed_port_url().await?));

	assert!(client.embeddings("a red door").await.is_empty());

	Ok(())
}

#[tokio::test]
async fn test_unsupported_operations_degrade() -> Result<()> {
	let client = ProtocolClient::default();

	assert_eq!(client.detokenize(&[1, 2, 3]), "");
	// Logged and ignored, no panic.
	client.set_grammar("root ::= \"yes\" | \"no\"");
	client.cancel();

	Ok(())
}

// endregion: --- Embeddings & Unsupported

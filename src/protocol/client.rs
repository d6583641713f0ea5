use crate::protocol::streamer::{CancelSignal, CompletionStreamer};
use crate::protocol::{CompletionParams, CompletionStream, PromptMessage, RemoteConfig, ServerHealth, translate_params};
use crate::webc::{WebClient, WebResponse, WebStream};
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::sync::Arc;
use value_ext::JsonValueExt;

const MODELS_PATH: &str = "v1/models";
const COMPLETIONS_PATH: &str = "v1/completions";
const EMBEDDINGS_PATH: &str = "v1/embeddings";

/// Average characters per token used by the `tokenize` estimate.
pub const CHARS_PER_TOKEN_ESTIMATE: usize = 4;

/// HTTP client of an OpenAI-style completion server.
///
/// Two flavors of each network operation:
/// - `try_*` returns a `Result` with the transport or protocol failure,
/// - the plain one logs the failure as a warning and returns an empty sentinel (`false`, `""`, `[]`).
///   An empty result from those may mean failure, not just "no content".
///
/// Cheap to clone (clones share the connection pool and the cancel signal).
#[derive(Debug, Clone)]
pub struct ProtocolClient {
	inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
	web_client: WebClient,
	config: RemoteConfig,
	cancel: Arc<CancelSignal>,
}

/// Constructors
impl ProtocolClient {
	pub fn new(config: RemoteConfig) -> Self {
		Self::with_reqwest_client(config, reqwest::Client::default())
	}

	pub fn with_reqwest_client(config: RemoteConfig, reqwest_client: reqwest::Client) -> Self {
		Self {
			inner: Arc::new(ClientInner {
				web_client: WebClient::from_reqwest_client(reqwest_client),
				config,
				cancel: Arc::default(),
			}),
		}
	}
}

impl Default for ProtocolClient {
	fn default() -> Self {
		Self::new(RemoteConfig::default())
	}
}

impl ProtocolClient {
	pub fn config(&self) -> &RemoteConfig {
		&self.inner.config
	}
}

// region:    --- Health & Models

impl ProtocolClient {
	/// True only if the model listing answers successfully within the health timeout.
	pub async fn is_alive(&self) -> bool {
		self.try_list_models().await.is_ok()
	}

	pub async fn health(&self) -> ServerHealth {
		match self.try_list_models().await {
			Ok(models) => ServerHealth { alive: true, models },
			Err(err) => {
				tracing::debug!("Server '{}' not alive: {err}", self.inner.config.endpoint.base_url());
				ServerHealth::default()
			}
		}
	}

	pub async fn try_list_models(&self) -> Result<Vec<String>> {
		let url = self.url(MODELS_PATH);
		let timeout = Some(self.inner.config.health_timeout);
		let mut web_response = self
			.inner
			.web_client
			.do_get(&url, &self.headers(), timeout)
			.await
			.map_err(|webc_error| {
				if webc_error.is_timeout() {
					tracing::debug!("Model listing timed out after {timeout:?}");
				}
				Error::Web { url, webc_error }
			})?;

		let entries = web_response.body.x_take::<Vec<Value>>("data")?;
		let models = entries
			.iter()
			.filter_map(|entry| entry.x_get::<String>("id").ok())
			.collect();

		Ok(models)
	}

	pub async fn list_models(&self) -> Vec<String> {
		self.try_list_models().await.unwrap_or_else(|err| {
			tracing::warn!("Listing models failed: {err}");
			Vec::new()
		})
	}

	/// Heuristic: the first listed model (servers usually serve one), or `""`.
	pub async fn loaded_model(&self) -> String {
		self.list_models().await.into_iter().next().unwrap_or_default()
	}
}

// endregion: --- Health & Models

// region:    --- Tokens & Templates

impl ProtocolClient {
	/// ESTIMATE ONLY. The protocol has no tokenizer endpoint, so this returns a synthetic sequence
	/// `0..n` with `n = chars / 4`. Use it for rough budgeting, never as real token ids.
	pub fn tokenize(&self, text: &str) -> Vec<i32> {
		let count = text.chars().count() / CHARS_PER_TOKEN_ESTIMATE;
		(0..count).map(|i| i32::try_from(i).unwrap_or(i32::MAX)).collect()
	}

	/// Not supported by the protocol: always `""`.
	pub fn detokenize(&self, tokens: &[i32]) -> String {
		tracing::warn!("detokenize is not supported by the remote server ({} tokens ignored)", tokens.len());
		String::new()
	}

	/// No server-side templating: returns the messages serialized as JSON.
	pub fn apply_template(&self, messages: &[PromptMessage]) -> String {
		serde_json::to_string(messages).unwrap_or_default()
	}

	/// Not supported by the protocol: logged and ignored.
	pub fn set_grammar(&self, grammar: &str) {
		tracing::warn!(
			"Grammars are not supported by the remote server, ignoring grammar ({} chars)",
			grammar.len()
		);
	}

	/// The server cannot cancel a generation. This closes the connection of the streamed completions
	/// of this client created so far, polled or not (they end with `cancelled: true`); the server may
	/// keep generating.
	pub fn cancel(&self) {
		tracing::warn!("Server-side cancellation is not supported, closing in-flight completion streams");
		self.inner.cancel.cancel();
	}
}

// endregion: --- Tokens & Templates

// region:    --- Embeddings

impl ProtocolClient {
	pub async fn try_embeddings(&self, text: &str) -> Result<Vec<f32>> {
		let url = self.url(EMBEDDINGS_PATH);
		let mut payload = Map::new();
		if let Some(model) = &self.inner.config.model {
			payload.insert("model".to_string(), Value::from(model.as_str()));
		}
		payload.insert("input".to_string(), Value::from(text));

		let mut web_response = self.post(&url, &Value::Object(payload)).await?;

		web_response
			.body
			.x_take::<Vec<f32>>("/data/0/embedding")
			.map_err(|_| Error::NoEmbeddingInResponse { endpoint: url })
	}

	pub async fn embeddings(&self, text: &str) -> Vec<f32> {
		self.try_embeddings(text).await.unwrap_or_else(|err| {
			tracing::warn!("Embeddings request failed: {err}");
			Vec::new()
		})
	}
}

// endregion: --- Embeddings

// region:    --- Completions

impl ProtocolClient {
	/// Non-streaming completion: the text of the first choice.
	pub async fn try_completion(&self, prompt: &str, params: &CompletionParams) -> Result<String> {
		let url = self.url(COMPLETIONS_PATH);
		let payload = self.completion_payload(prompt, params, false);

		let mut web_response = self.post(&url, &payload).await?;

		web_response
			.body
			.x_take::<String>("/choices/0/text")
			.map_err(|_| Error::NoChoiceInResponse { endpoint: url })
	}

	pub async fn completion(&self, prompt: &str, params: &CompletionParams) -> String {
		self.try_completion(prompt, params).await.unwrap_or_else(|err| {
			tracing::warn!("Completion request failed: {err}");
			String::new()
		})
	}

	/// Streaming completion (`stream: true`), parsed incrementally as the body arrives.
	///
	/// The request is sent on the first poll.
	pub fn completion_stream(&self, prompt: &str, params: &CompletionParams) -> CompletionStream {
		let url = self.url(COMPLETIONS_PATH);
		let payload = self.completion_payload(prompt, params, true);
		let reqwest_builder = self.inner.web_client.new_req_builder(
			&url,
			&self.headers(),
			&payload,
			self.inner.config.completion_timeout,
		);

		let web_stream = WebStream::new_with_delimiter(reqwest_builder, "\n");
		let streamer = CompletionStreamer::new(web_stream, url, self.inner.cancel.clone());
		CompletionStream::from_inner_stream(streamer)
	}

	/// Streaming completion calling `on_chunk` for each piece of text, returning the full text.
	pub async fn try_completion_with_chunks(
		&self,
		prompt: &str,
		params: &CompletionParams,
		on_chunk: impl FnMut(&str),
	) -> Result<String> {
		self.completion_stream(prompt, params).collect_with_chunks(on_chunk).await
	}

	pub async fn completion_with_chunks(
		&self,
		prompt: &str,
		params: &CompletionParams,
		on_chunk: impl FnMut(&str),
	) -> String {
		self.try_completion_with_chunks(prompt, params, on_chunk)
			.await
			.unwrap_or_else(|err| {
				tracing::warn!("Streaming completion failed: {err}");
				String::new()
			})
	}
}

// endregion: --- Completions

// region:    --- Support

impl ProtocolClient {
	fn url(&self, path: &str) -> String {
		self.inner.config.endpoint.join(path)
	}

	fn headers(&self) -> Vec<(String, String)> {
		self.inner.config.auth.to_headers()
	}

	async fn post(&self, url: &str, payload: &Value) -> Result<WebResponse> {
		self.inner
			.web_client
			.do_post(url, &self.headers(), payload, self.inner.config.completion_timeout)
			.await
			.map_err(|webc_error| Error::Web {
				url: url.to_string(),
				webc_error,
			})
	}

	/// `{ ...translated params, model?, prompt, stream }` (the protocol fields win over params).
	fn completion_payload(&self, prompt: &str, params: &CompletionParams, stream: bool) -> Value {
		let config = &self.inner.config;
		let mut payload = translate_params(params, config.default_max_tokens);
		if let Some(model) = &config.model {
			payload.insert("model".to_string(), Value::from(model.as_str()));
		}
		payload.insert("prompt".to_string(), Value::from(prompt));
		payload.insert("stream".to_string(), Value::from(stream));
		Value::Object(payload)
	}
}

// endregion: --- Support

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_tokenize_estimate() {
		let client = ProtocolClient::default();

		assert!(client.tokenize("").is_empty());
		assert!(client.tokenize("abc").is_empty());
		assert_eq!(client.tokenize("abcdefghi"), vec![0, 1]);
		// Counted in chars, not bytes
		assert_eq!(client.tokenize("éééé").len(), 1);
	}

	#[test]
	fn test_completion_payload() {
		let client = ProtocolClient::new(RemoteConfig::default().with_model("npc-7b"));
		let params = CompletionParams::default().with_n_predict(32).with("prompt", "ignored");

		let payload = client.completion_payload("Hi", &params, true);

		assert_eq!(
			payload,
			json!({"max_tokens": 32, "model": "npc-7b", "prompt": "Hi", "stream": true})
		);
	}

	#[test]
	fn test_apply_template_raw_json() {
		let client = ProtocolClient::default();
		let text = client.apply_template(&[PromptMessage::user("hi")]);
		assert_eq!(text, r#"[{"role":"user","content":"hi"}]"#);
	}
}

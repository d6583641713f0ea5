use crate::backend::{BackendConfig, BackendKind};
use crate::protocol::{CompletionParams, CompletionStream, ParamsSet, PromptMessage, ProtocolClient};
use crate::Result;
use std::sync::{PoisonError, RwLock};

#[cfg(feature = "llamacpp")]
use crate::{Error, backend::LlamaCppBackend};

/// The single entry point of the higher level (conversation) code into text generation.
///
/// Every operation is available whatever the backend:
/// - `is_alive`, `tokenize`, `detokenize`, `embeddings`,
/// - `set_cached_params` (defaults merged under each request's params),
/// - `set_grammar` (ignored with a warning on the remote backend),
/// - `cancel` (best effort),
/// - `apply_template`,
/// - `completion`, `completion_stream`, `completion_with_chunks`.
#[derive(Debug)]
pub struct BackendAdapter {
	inner: BackendInner,
	cached_params: RwLock<CompletionParams>,
}

#[derive(Debug)]
enum BackendInner {
	Remote(ProtocolClient),
	#[cfg(feature = "llamacpp")]
	LlamaCpp(LlamaCppBackend),
}

/// Constructors
impl BackendAdapter {
	/// Build the configured backend. The local backend loads its model here.
	pub async fn new(config: BackendConfig) -> Result<Self> {
		let inner = match config {
			BackendConfig::Remote(remote_config) => BackendInner::Remote(ProtocolClient::new(remote_config)),
			#[cfg(feature = "llamacpp")]
			BackendConfig::LlamaCpp(local_config) => BackendInner::LlamaCpp(LlamaCppBackend::new(local_config).await?),
		};
		Ok(Self::from_inner(inner))
	}

	pub fn from_protocol_client(client: ProtocolClient) -> Self {
		Self::from_inner(BackendInner::Remote(client))
	}

	fn from_inner(inner: BackendInner) -> Self {
		Self {
			inner,
			cached_params: RwLock::new(CompletionParams::default()),
		}
	}
}

/// Getters
impl BackendAdapter {
	pub fn kind(&self) -> BackendKind {
		match &self.inner {
			BackendInner::Remote(_) => BackendKind::Remote,
			#[cfg(feature = "llamacpp")]
			BackendInner::LlamaCpp(_) => BackendKind::LlamaCpp,
		}
	}

	/// The protocol client, when the backend is remote.
	pub fn protocol_client(&self) -> Option<&ProtocolClient> {
		match &self.inner {
			BackendInner::Remote(client) => Some(client),
			#[cfg(feature = "llamacpp")]
			BackendInner::LlamaCpp(_) => None,
		}
	}
}

// region:    --- Cached Params

impl BackendAdapter {
	/// Replace the backend-level defaults. Request params win over them.
	pub fn set_cached_params(&self, params: CompletionParams) {
		let mut cached = self.cached_params.write().unwrap_or_else(PoisonError::into_inner);
		*cached = params;
	}

	pub fn cached_params(&self) -> CompletionParams {
		self.cached_params.read().unwrap_or_else(PoisonError::into_inner).clone()
	}

	fn resolve_params(&self, request: &CompletionParams) -> CompletionParams {
		let cached = self.cached_params();
		ParamsSet::default()
			.with_cached_params(Some(&cached))
			.with_request_params(Some(request))
			.resolve()
	}
}

// endregion: --- Cached Params

// region:    --- Capabilities

impl BackendAdapter {
	pub async fn is_alive(&self) -> bool {
		match &self.inner {
			BackendInner::Remote(client) => client.is_alive().await,
			// The model is loaded at construction.
			#[cfg(feature = "llamacpp")]
			BackendInner::LlamaCpp(_) => true,
		}
	}

	/// Exact on the local backend, an estimate on the remote one (see `ProtocolClient::tokenize`).
	pub fn tokenize(&self, text: &str) -> Vec<i32> {
		match &self.inner {
			BackendInner::Remote(client) => client.tokenize(text),
			#[cfg(feature = "llamacpp")]
			BackendInner::LlamaCpp(local) => local.tokenize(text).unwrap_or_else(|err| {
				tracing::warn!("Tokenize failed: {err}");
				Vec::new()
			}),
		}
	}

	pub fn detokenize(&self, tokens: &[i32]) -> String {
		match &self.inner {
			BackendInner::Remote(client) => client.detokenize(tokens),
			#[cfg(feature = "llamacpp")]
			BackendInner::LlamaCpp(local) => local.detokenize(tokens).unwrap_or_else(|err| {
				tracing::warn!("Detokenize failed: {err}");
				String::new()
			}),
		}
	}

	pub async fn try_embeddings(&self, text: &str) -> Result<Vec<f32>> {
		match &self.inner {
			BackendInner::Remote(client) => client.try_embeddings(text).await,
			#[cfg(feature = "llamacpp")]
			BackendInner::LlamaCpp(_) => Err(Error::FeatureNotSupported {
				backend_kind: self.kind(),
				feature: "embeddings",
			}),
		}
	}

	pub async fn embeddings(&self, text: &str) -> Vec<f32> {
		self.try_embeddings(text).await.unwrap_or_else(|err| {
			tracing::warn!("Embeddings unavailable on {} backend: {err}", self.kind());
			Vec::new()
		})
	}

	pub fn set_grammar(&self, grammar: &str) {
		match &self.inner {
			BackendInner::Remote(client) => client.set_grammar(grammar),
			#[cfg(feature = "llamacpp")]
			BackendInner::LlamaCpp(local) => local.set_grammar(grammar),
		}
	}

	/// Best effort: stops the local generation at the next token, closes the remote streams.
	pub fn cancel(&self) {
		match &self.inner {
			BackendInner::Remote(client) => client.cancel(),
			#[cfg(feature = "llamacpp")]
			BackendInner::LlamaCpp(local) => local.cancel(),
		}
	}

	pub fn apply_template(&self, messages: &[PromptMessage]) -> String {
		match &self.inner {
			BackendInner::Remote(client) => client.apply_template(messages),
			#[cfg(feature = "llamacpp")]
			BackendInner::LlamaCpp(local) => local.apply_template(messages).unwrap_or_else(|err| {
				tracing::warn!("Applying the chat template failed: {err}");
				String::new()
			}),
		}
	}
}

// endregion: --- Capabilities

// region:    --- Completions

impl BackendAdapter {
	/// The generation events, params resolved over the cached ones.
	pub fn completion_stream(&self, prompt: &str, params: &CompletionParams) -> CompletionStream {
		let params = self.resolve_params(params);
		match &self.inner {
			BackendInner::Remote(client) => client.completion_stream(prompt, &params),
			#[cfg(feature = "llamacpp")]
			BackendInner::LlamaCpp(local) => local.completion_stream(prompt, &params),
		}
	}

	pub async fn try_completion(&self, prompt: &str, params: &CompletionParams) -> Result<String> {
		match &self.inner {
			BackendInner::Remote(client) => client.try_completion(prompt, &self.resolve_params(params)).await,
			#[cfg(feature = "llamacpp")]
			BackendInner::LlamaCpp(_) => self.completion_stream(prompt, params).collect_with_chunks(|_| {}).await,
		}
	}

	pub async fn completion(&self, prompt: &str, params: &CompletionParams) -> String {
		self.try_completion(prompt, params).await.unwrap_or_else(|err| {
			tracing::warn!("Completion failed on {} backend: {err}", self.kind());
			String::new()
		})
	}

	/// Streamed completion: `on_chunk` runs on the awaiting task, once per chunk, in order.
	/// Returns the full text.
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
				tracing::warn!("Streaming completion failed on {} backend: {err}", self.kind());
				String::new()
			})
	}
}

// endregion: --- Completions

#[cfg(test)]
mod tests {
	use super::*;
	use crate::protocol::RemoteConfig;

	#[tokio::test]
	async fn test_backend_adapter_remote_kind() -> Result<()> {
		let backend = BackendAdapter::new(BackendConfig::Remote(RemoteConfig::default())).await?;

		assert_eq!(backend.kind(), BackendKind::Remote);
		assert!(!backend.kind().is_local());
		assert!(backend.protocol_client().is_some());

		Ok(())
	}

	#[test]
	fn test_backend_adapter_cached_params_under_request() {
		let backend = BackendAdapter::from_protocol_client(ProtocolClient::default());
		backend.set_cached_params(CompletionParams::default().with_temperature(0.9).with_top_k(20));

		let resolved = backend.resolve_params(&CompletionParams::default().with_temperature(0.1));

		assert_eq!(resolved.temperature(), Some(0.1));
		assert_eq!(resolved.top_k(), Some(20));
	}
}

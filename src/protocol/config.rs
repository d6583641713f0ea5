use crate::resolver::{AuthData, Endpoint};
use std::time::Duration;

/// Configuration of a `ProtocolClient`.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
	/// Base URL of the server (the `/v1/...` paths are appended).
	pub endpoint: Endpoint,

	/// Optional bearer key.
	pub auth: AuthData,

	/// Sent as `model` in completion and embedding requests, when set.
	pub model: Option<String>,

	/// Deadline of the health check and model listing.
	pub health_timeout: Duration,

	/// Deadline of a whole completion or embedding request (including a streamed body).
	/// `None` means no deadline.
	pub completion_timeout: Option<Duration>,

	/// `max_tokens` sent when the request parameters set no generation length.
	pub default_max_tokens: u32,
}

impl Default for RemoteConfig {
	fn default() -> Self {
		Self {
			endpoint: Endpoint::default(),
			auth: AuthData::default(),
			model: None,
			health_timeout: Duration::from_secs(5),
			completion_timeout: None,
			default_max_tokens: crate::protocol::DEFAULT_MAX_TOKENS,
		}
	}
}

/// Chainable Setters
impl RemoteConfig {
	#[must_use]
	pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
		self.endpoint = endpoint;
		self
	}

	/// Convenience for `with_endpoint(Endpoint::from_owned(url))`.
	#[must_use]
	pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
		self.endpoint = Endpoint::from_owned(url.into());
		self
	}

	#[must_use]
	pub fn with_auth(mut self, auth: AuthData) -> Self {
		self.auth = auth;
		self
	}

	#[must_use]
	pub fn with_model(mut self, model: impl Into<String>) -> Self {
		self.model = Some(model.into());
		self
	}

	#[must_use]
	pub const fn with_health_timeout(mut self, timeout: Duration) -> Self {
		self.health_timeout = timeout;
		self
	}

	#[must_use]
	pub const fn with_completion_timeout(mut self, timeout: Duration) -> Self {
		self.completion_timeout = Some(timeout);
		self
	}

	#[must_use]
	pub const fn with_default_max_tokens(mut self, value: u32) -> Self {
		self.default_max_tokens = value;
		self
	}
}

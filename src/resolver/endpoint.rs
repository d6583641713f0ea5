use std::sync::Arc;

/// A construct to store the base URL of a remote inference server.
/// It is designed to be efficiently clonable.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Endpoint {
	inner: Arc<str>,
}

/// Constructors
impl Endpoint {
	#[must_use]
	pub fn from_static(url: &'static str) -> Self {
		Self { inner: Arc::from(url) }
	}

	pub fn from_owned(url: impl Into<Arc<str>>) -> Self {
		Self { inner: url.into() }
	}
}

/// The default listen address of llama.cpp's `llama-server`.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/";

impl Default for Endpoint {
	fn default() -> Self {
		Self::from_static(DEFAULT_BASE_URL)
	}
}

/// Getters
impl Endpoint {
	#[must_use]
	pub fn base_url(&self) -> &str {
		&self.inner
	}

	/// Join a service path (e.g., `v1/models`) to the base URL, tolerating
	/// a trailing `/` on the base and a leading `/` on the path.
	#[must_use]
	pub fn join(&self, path: &str) -> String {
		let base = self.inner.trim_end_matches('/');
		let path = path.trim_start_matches('/');
		format!("{base}/{path}")
	}
}

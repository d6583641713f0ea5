/// Where the API key sent as `Authorization: Bearer <key>` comes from.
///
/// Most local servers (llama.cpp server, LM Studio, ...) need no key, hence the `None` default.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub enum AuthData {
	/// No `Authorization` header is sent.
	#[default]
	None,
	/// The key is read from this environment variable at request time.
	FromEnv(String),
	/// The key itself.
	Key(String),
}

/// Constructors
impl AuthData {
	pub fn from_env(env_name: impl Into<String>) -> Self {
		Self::FromEnv(env_name.into())
	}

	pub fn from_single(value: impl Into<String>) -> Self {
		Self::Key(value.into())
	}
}

/// Resolvers
impl AuthData {
	/// Resolve the key, if any.
	///
	/// A missing or empty environment variable resolves to `None` rather than an error,
	/// as the server may simply not require authentication.
	#[must_use]
	pub fn single_key_value(&self) -> Option<String> {
		match self {
			Self::None => None,
			Self::FromEnv(env_name) => std::env::var(env_name).ok().filter(|v| !v.is_empty()),
			Self::Key(value) => Some(value.clone()),
		}
	}

	/// The headers to add to each request.
	#[must_use]
	pub fn to_headers(&self) -> Vec<(String, String)> {
		match self.single_key_value() {
			Some(key) => vec![("Authorization".to_string(), format!("Bearer {key}"))],
			None => Vec::new(),
		}
	}
}

use serde::{Deserialize, Serialize};

/// Result of a bounded-time probe of the remote server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerHealth {
	/// The model listing answered successfully within the health timeout.
	pub alive: bool,
	/// Identifiers of the models the server reported (empty when not alive).
	pub models: Vec<String>,
}

/// A role/content message, as passed to template application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
	pub role: String,
	pub content: String,
}

/// Constructors
impl PromptMessage {
	pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
		Self {
			role: role.into(),
			content: content.into(),
		}
	}

	pub fn system(content: impl Into<String>) -> Self {
		Self::new("system", content)
	}

	pub fn user(content: impl Into<String>) -> Self {
		Self::new("user", content)
	}

	pub fn assistant(content: impl Into<String>) -> Self {
		Self::new("assistant", content)
	}
}

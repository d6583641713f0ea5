use derive_more::Display;
use serde::{Deserialize, Serialize};

/// The backend behind a `BackendAdapter`.
#[derive(Debug, Clone, Copy, Display, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
	/// OpenAI-style HTTP server (`/v1/completions`).
	Remote,
	/// In-process llama.cpp engine.
	#[cfg(feature = "llamacpp")]
	LlamaCpp,
}

impl BackendKind {
	#[must_use]
	pub const fn as_str(&self) -> &'static str {
		match self {
			Self::Remote => "Remote",
			#[cfg(feature = "llamacpp")]
			Self::LlamaCpp => "LlamaCpp",
		}
	}

	#[must_use]
	pub const fn is_local(&self) -> bool {
		!matches!(self, Self::Remote)
	}
}

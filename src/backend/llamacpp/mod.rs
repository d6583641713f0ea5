//! In-process llama.cpp backend (feature `llamacpp`).
//!
//! Models are loaded once per process through `ModelManager`. Generation runs on a blocking task
//! and hands its pieces to the awaiting task over a channel.

// region:    --- Modules

mod local_impl;
mod model_manager;
mod streamer;

pub use local_impl::LlamaCppBackend;
pub use model_manager::{LoadedModel, ModelManager};

// endregion: --- Modules

use std::path::PathBuf;

pub const DEFAULT_CONTEXT_SIZE: u32 = 2048;

/// Configuration of the local backend.
#[derive(Debug, Clone)]
pub struct LocalConfig {
	/// The GGUF model file (e.g., the artifact of a `MergePipeline::merge`).
	pub model_path: PathBuf,

	/// Context window of each generation, in tokens.
	pub context_size: u32,

	/// Generation threads. `None` lets llama.cpp decide.
	pub threads: Option<i32>,
}

/// Constructors
impl LocalConfig {
	pub fn new(model_path: impl Into<PathBuf>) -> Self {
		Self {
			model_path: model_path.into(),
			context_size: DEFAULT_CONTEXT_SIZE,
			threads: None,
		}
	}
}

/// Chainable Setters
impl LocalConfig {
	#[must_use]
	pub fn with_context_size(mut self, context_size: u32) -> Self {
		self.context_size = context_size;
		self
	}

	#[must_use]
	pub fn with_threads(mut self, threads: i32) -> Self {
		self.threads = Some(threads);
		self
	}
}

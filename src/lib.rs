//! `llmlink` lets an application drive text generation through one of two interchangeable backends:
//! - a remote server speaking the OpenAI-style `/v1/completions` + `/v1/embeddings` protocol,
//! - an in-process llama.cpp engine (feature `llamacpp`).
//!
//! Because the remote server cannot apply LoRA adapters on the fly, the crate also provides a
//! merge pipeline that bakes adapters into a standalone model file, cached by a deterministic key.
//!
//! ```no_run
//! use llmlink::merge::{AdapterSpec, MergeConfig, MergePipeline};
//! use llmlink::protocol::{CompletionParams, RemoteConfig};
//! use llmlink::backend::{BackendAdapter, BackendConfig};
//!
//! # async fn run() -> llmlink::Result<()> {
//! let pipeline = MergePipeline::new(MergeConfig::default());
//! let outcome = pipeline
//! 	.merge("models/base.gguf", &[AdapterSpec::new("adapters/npc.gguf", 0.8)], |_| {})
//! 	.await?;
//! println!("prepared model: {}", outcome.path.display());
//!
//! let backend = BackendAdapter::new(BackendConfig::Remote(RemoteConfig::default())).await?;
//! let text = backend
//! 	.completion_with_chunks("Once upon a time", &CompletionParams::default(), |chunk| print!("{chunk}"))
//! 	.await;
//! # Ok(())
//! # }
//! ```

// region:    --- Modules

mod error;

pub mod backend;
pub mod merge;
pub mod protocol;
pub mod resolver;
pub mod webc;

pub use error::{Error, Result};

// endregion: --- Modules

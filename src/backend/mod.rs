//! One capability surface over the remote protocol client and the in-process llama.cpp engine.
//!
//! The backend is selected once, at construction, with `BackendConfig`. Capabilities a backend lacks
//! degrade the same way on every backend: a warning and an empty result (the `try_*` variants
//! return `Error::FeatureNotSupported` instead).

// region:    --- Modules

mod backend_adapter;
mod backend_config;
mod backend_kind;

#[cfg(feature = "llamacpp")]
mod llamacpp;

pub use backend_adapter::*;
pub use backend_config::*;
pub use backend_kind::*;

#[cfg(feature = "llamacpp")]
pub use llamacpp::{LlamaCppBackend, LocalConfig, ModelManager};

// endregion: --- Modules

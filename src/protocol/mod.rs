//! Client side of the OpenAI-style completion protocol (`/v1/models`, `/v1/completions`, `/v1/embeddings`).

// region:    --- Modules

mod client;
mod completion_params;
mod completion_stream;
mod config;
mod streamer;
mod types;

pub use client::*;
pub use completion_params::*;
pub use completion_stream::*;
pub use config::*;
pub use types::*;

// endregion: --- Modules

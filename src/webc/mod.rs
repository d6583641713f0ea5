//! Minimal web client layer over `reqwest`, private in spirit: the protocol client builds on it.

// region:    --- Modules

mod error;
mod web_client;
mod web_stream;

pub use error::Error;
pub use web_client::*;
pub use web_stream::*;

type Result<T> = core::result::Result<T, Error>;

// endregion: --- Modules

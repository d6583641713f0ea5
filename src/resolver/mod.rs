//! Resolution of where a remote backend lives and how it authenticates.

// region:    --- Modules

mod auth_data;
mod endpoint;

pub use auth_data::*;
pub use endpoint::*;

// endregion: --- Modules

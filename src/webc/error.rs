use derive_more::{Display, From};
use reqwest::StatusCode;

#[derive(Debug, Display, From)]
#[display("{self:?}")]
pub enum Error {
	ResponseFailedNotJson { body: String, cause: serde_json::Error },
	ResponseFailedStatus { status: StatusCode, body: String },

	// -- Externals
	#[from]
	Reqwest(reqwest::Error),
}

impl Error {
	/// True when the failure is the request deadline expiring (connect or read).
	#[must_use]
	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Reqwest(err) if err.is_timeout())
	}
}

// region:    --- Error Boilerplate

impl std::error::Error for Error {}

// endregion: --- Error Boilerplate

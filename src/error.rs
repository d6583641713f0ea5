use crate::backend::BackendKind;
use crate::webc;
use derive_more::{Display, From};
use std::path::PathBuf;
use value_ext::JsonValueExtError;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Display, From)]
#[display("{self:?}")]
pub enum Error {
	// -- Merge Input
	MissingBaseModel {
		path: PathBuf,
	},
	MissingAdapter {
		path: PathBuf,
	},

	// -- Merge Process
	MergeProcessSpawn {
		tool: PathBuf,
		cause: std::io::Error,
	},
	MergeProcessFailed {
		tool: PathBuf,
		exit_code: Option<i32>,
		stderr_tail: String,
	},
	MergeOutputMissing {
		path: PathBuf,
	},

	// -- Protocol
	NoChoiceInResponse {
		endpoint: String,
	},
	NoEmbeddingInResponse {
		endpoint: String,
	},
	StreamParse {
		record: String,
		serde_error: serde_json::Error,
	},
	WebStream {
		url: String,
		cause: String,
	},
	Web {
		url: String,
		webc_error: webc::Error,
	},

	// -- Backend
	FeatureNotSupported {
		backend_kind: BackendKind,
		feature: &'static str,
	},
	Backend(String),

	// -- Externals
	#[from]
	Io(std::io::Error),
	#[from]
	JsonValueExt(JsonValueExtError),
	#[from]
	SerdeJson(serde_json::Error),
}

// region:    --- Error Boilerplate

impl std::error::Error for Error {}

// endregion: --- Error Boilerplate

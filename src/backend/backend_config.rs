use crate::protocol::RemoteConfig;

#[cfg(feature = "llamacpp")]
use crate::backend::LocalConfig;

/// Selects and configures the backend of a `BackendAdapter`.
#[derive(Debug, Clone)]
pub enum BackendConfig {
	Remote(RemoteConfig),
	#[cfg(feature = "llamacpp")]
	LlamaCpp(LocalConfig),
}

impl Default for BackendConfig {
	fn default() -> Self {
		Self::Remote(RemoteConfig::default())
	}
}

impl From<RemoteConfig> for BackendConfig {
	fn from(config: RemoteConfig) -> Self {
		Self::Remote(config)
	}
}

#[cfg(feature = "llamacpp")]
impl From<LocalConfig> for BackendConfig {
	fn from(config: LocalConfig) -> Self {
		Self::LlamaCpp(config)
	}
}

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// Under the platform cache directory (e.g. `~/.cache`, `~/Library/Caches`, `%LOCALAPPDATA%`).
const CACHE_SUBDIR: &str = "llmlink/merged";
/// Used when the platform has no cache directory.
const FALLBACK_CACHE_ROOT: &str = "~/.llmlink/merged";
const DEFAULT_TOOL_NAME: &str = "llama-export-lora";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub(crate) const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration of the `MergePipeline`: where merged models are cached and where the merge tool is searched.
///
/// The cache root is always injected through this config (no process-wide location), so tests and
/// multiple applications can use isolated caches.
#[derive(Debug, Clone)]
pub struct MergeConfig {
	/// Directory holding the merged models. Created on the first cold merge.
	pub cache_root: PathBuf,

	/// Logical name of the merge executable (the platform suffix, e.g. `.exe`, is appended when needed).
	pub tool_name: String,

	/// First place searched: the application's bundled tool directory.
	pub bundled_dir: Option<PathBuf>,

	/// Second place searched: an alternate bundled location.
	pub secondary_dir: Option<PathBuf>,

	/// Executable search path, in `PATH` format. Defaults to the process `PATH`; `None` disables it.
	pub search_path: Option<OsString>,

	/// Last place searched: a common system install directory (`/usr/local/bin` on unix).
	pub system_dir: Option<PathBuf>,

	/// How often a running merge reports progress (at least 1 ms).
	pub poll_interval: Duration,
}

impl Default for MergeConfig {
	fn default() -> Self {
		Self {
			cache_root: default_cache_root(),
			tool_name: DEFAULT_TOOL_NAME.to_string(),
			bundled_dir: None,
			secondary_dir: None,
			search_path: std::env::var_os("PATH"),
			system_dir: default_system_dir(),
			poll_interval: DEFAULT_POLL_INTERVAL,
		}
	}
}

/// Chainable Setters
impl MergeConfig {
	/// Set the cache root. A leading `~` is expanded to the home directory.
	#[must_use]
	pub fn with_cache_root(mut self, cache_root: impl Into<PathBuf>) -> Self {
		self.cache_root = expand_tilde(cache_root.into());
		self
	}

	#[must_use]
	pub fn with_tool_name(mut self, tool_name: impl Into<String>) -> Self {
		self.tool_name = tool_name.into();
		self
	}

	#[must_use]
	pub fn with_bundled_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.bundled_dir = Some(expand_tilde(dir.into()));
		self
	}

	#[must_use]
	pub fn with_secondary_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.secondary_dir = Some(expand_tilde(dir.into()));
		self
	}

	#[must_use]
	pub fn with_search_path(mut self, search_path: Option<OsString>) -> Self {
		self.search_path = search_path;
		self
	}

	#[must_use]
	pub fn with_system_dir(mut self, dir: Option<PathBuf>) -> Self {
		self.system_dir = dir;
		self
	}

	/// Intervals under 1 ms are raised to 1 ms.
	#[must_use]
	pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
		self.poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
		self
	}
}

// region:    --- Support

fn default_cache_root() -> PathBuf {
	match dirs::cache_dir() {
		Some(cache_dir) => cache_dir.join(CACHE_SUBDIR),
		None => PathBuf::from(shellexpand::tilde(FALLBACK_CACHE_ROOT).as_ref()),
	}
}

fn default_system_dir() -> Option<PathBuf> {
	if cfg!(windows) {
		None
	} else {
		Some(PathBuf::from("/usr/local/bin"))
	}
}

fn expand_tilde(path: PathBuf) -> PathBuf {
	match path.to_str() {
		Some(path_str) if path_str.starts_with('~') => PathBuf::from(shellexpand::tilde(path_str).as_ref()),
		_ => path,
	}
}

// endregion: --- Support

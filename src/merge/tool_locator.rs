use crate::merge::MergeConfig;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Finds the external merge executable among ordered candidate locations:
/// 1. the bundled tool directory,
/// 2. the secondary bundled directory,
/// 3. each entry of the executable search path (`PATH`),
/// 4. the common system install directory.
///
/// The first existing file wins. Locating never fails, it just returns `None`.
#[derive(Debug, Clone)]
pub struct ToolLocator {
	tool_name: String,
	bundled_dir: Option<PathBuf>,
	secondary_dir: Option<PathBuf>,
	search_path: Option<OsString>,
	system_dir: Option<PathBuf>,
}

/// Constructors
impl ToolLocator {
	/// A locator searching only the process `PATH` and the system directory.
	pub fn new(tool_name: impl Into<String>) -> Self {
		let default_config = MergeConfig::default();
		Self {
			tool_name: tool_name.into(),
			bundled_dir: None,
			secondary_dir: None,
			search_path: default_config.search_path,
			system_dir: default_config.system_dir,
		}
	}

	pub fn from_config(config: &MergeConfig) -> Self {
		Self {
			tool_name: config.tool_name.clone(),
			bundled_dir: config.bundled_dir.clone(),
			secondary_dir: config.secondary_dir.clone(),
			search_path: config.search_path.clone(),
			system_dir: config.system_dir.clone(),
		}
	}
}

impl ToolLocator {
	pub fn tool_name(&self) -> &str {
		&self.tool_name
	}

	/// The file name searched for, with the platform executable suffix.
	pub fn executable_name(&self) -> String {
		executable_file_name(&self.tool_name)
	}

	/// All candidate paths, in search order (they may not exist).
	pub fn candidates(&self) -> Vec<PathBuf> {
		let file_name = self.executable_name();
		let mut dirs: Vec<PathBuf> = Vec::new();

		dirs.extend(self.bundled_dir.iter().cloned());
		dirs.extend(self.secondary_dir.iter().cloned());
		if let Some(search_path) = &self.search_path {
			dirs.extend(std::env::split_paths(search_path).filter(|dir| !dir.as_os_str().is_empty()));
		}
		dirs.extend(self.system_dir.iter().cloned());

		dirs.into_iter().map(|dir| dir.join(&file_name)).collect()
	}

	/// The first candidate that is an existing file.
	pub fn locate(&self) -> Option<PathBuf> {
		self.candidates().into_iter().find(|candidate| is_file(candidate))
	}
}

// region:    --- Support

fn executable_file_name(tool_name: &str) -> String {
	let suffix = std::env::consts::EXE_SUFFIX;
	if suffix.is_empty() || tool_name.ends_with(suffix) {
		tool_name.to_string()
	} else {
		format!("{tool_name}{suffix}")
	}
}

fn is_file(path: &Path) -> bool {
	std::fs::metadata(path).map(|meta| meta.is_file()).unwrap_or(false)
}

// endregion: --- Support

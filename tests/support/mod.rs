//! Some support utilities for the tests
//! Note: Must be imported in each test file

#![allow(unused)] // For test support

// region:    --- Modules

mod fake_server;
mod fake_tool;
mod log_capture;

pub use fake_server::*;
pub use fake_tool::*;
pub use log_capture::*;

pub type Result<T> = core::result::Result<T, Box<dyn std::error::Error + Send + Sync>>; // Send + Sync, for the mockito callbacks

// endregion: --- Modules

// region:    --- Merge Workspace

use llmlink::merge::{AdapterSpec, MergeConfig};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const BASE_MODEL_CONTENT: &[u8] = b"GGUF fake base model weights";

/// A scratch directory with a base model, two adapters, and an (initially absent) cache root.
pub struct MergeWorkspace {
	pub dir: TempDir,
	pub base: PathBuf,
	pub adapter_a: PathBuf,
	pub adapter_b: PathBuf,
	pub cache_root: PathBuf,
	pub tool_dir: PathBuf,
}

impl MergeWorkspace {
	pub fn new() -> Result<Self> {
		let dir = tempfile::tempdir()?;
		let base = dir.path().join("npc-base.gguf");
		let adapter_a = dir.path().join("style-a.gguf");
		let adapter_b = dir.path().join("style-b.gguf");
		std::fs::write(&base, BASE_MODEL_CONTENT)?;
		std::fs::write(&adapter_a, b"lora a")?;
		std::fs::write(&adapter_b, b"lora b")?;

		let tool_dir = dir.path().join("bin");
		std::fs::create_dir_all(&tool_dir)?;

		Ok(Self {
			cache_root: dir.path().join("cache"),
			base,
			adapter_a,
			adapter_b,
			tool_dir,
			dir,
		})
	}

	/// A config that only looks for `tool_name` in the workspace `bin/` (never the real `PATH`).
	pub fn merge_config(&self, tool_name: &str) -> MergeConfig {
		MergeConfig::default()
			.with_cache_root(&self.cache_root)
			.with_tool_name(tool_name)
			.with_bundled_dir(&self.tool_dir)
			.with_search_path(None)
			.with_system_dir(None)
			.with_poll_interval(std::time::Duration::from_millis(20))
	}

	pub fn adapters_ab(&self) -> Vec<AdapterSpec> {
		vec![
			AdapterSpec::new(&self.adapter_a, 0.8),
			AdapterSpec::new(&self.adapter_b, 0.5),
		]
	}

	pub fn adapters_ba(&self) -> Vec<AdapterSpec> {
		vec![
			AdapterSpec::new(&self.adapter_b, 0.5),
			AdapterSpec::new(&self.adapter_a, 0.8),
		]
	}
}

// endregion: --- Merge Workspace

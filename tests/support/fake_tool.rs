//! Shell-script stand-ins for the merge executable (unix only).
//! Each run appends its arguments as one line to `<tool>.calls`.

use super::Result;
use std::path::{Path, PathBuf};

pub const FAKE_TOOL_NAME: &str = "fake-export-lora";

/// How the fake tool behaves after logging its call.
#[derive(Debug, Clone, Copy)]
pub enum FakeToolBehavior {
	/// Prints step markers and copies the base model to the output.
	CopyBase,
	/// Same, after a pause (to overlap concurrent merges).
	SlowCopyBase,
	/// Writes to stderr and exits with code 3, leaving a half-written output.
	Fail,
	/// Exits successfully without writing the output.
	NoOutput,
}

#[cfg(unix)]
pub fn install_fake_tool(dir: &Path, behavior: FakeToolBehavior) -> Result<PathBuf> {
	use std::os::unix::fs::PermissionsExt;

	let tool_path = dir.join(FAKE_TOOL_NAME);
	let calls_path = calls_file(&tool_path);

	let body = match behavior {
		FakeToolBehavior::CopyBase => "echo \"[1/2] loading\"\ncp \"$1\" \"$2\"\necho \"[2/2] done\"\n",
		FakeToolBehavior::SlowCopyBase => "sleep 0.3\ncp \"$1\" \"$2\"\n",
		FakeToolBehavior::Fail => "echo partial > \"$2\"\necho \"error: bad adapter tensor\" >&2\nexit 3\n",
		FakeToolBehavior::NoOutput => "echo \"nothing to do\"\n",
	};
	let script = format!("#!/bin/sh\necho \"$*\" >> \"{}\"\n{body}", calls_path.display());

	std::fs::write(&tool_path, script)?;
	std::fs::set_permissions(&tool_path, std::fs::Permissions::from_mode(0o755))?;

	Ok(tool_path)
}

/// The argument lines of every run of the fake tool, in order.
pub fn fake_tool_calls(tool_path: &Path) -> Vec<String> {
	std::fs::read_to_string(calls_file(tool_path))
		.map(|content| content.lines().map(str::to_string).collect())
		.unwrap_or_default()
}

fn calls_file(tool_path: &Path) -> PathBuf {
	tool_path.with_extension("calls")
}

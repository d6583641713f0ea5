use regex::Regex;
use std::sync::LazyLock;

/// Progress of a merge, as reported to the `on_progress` callback.
///
/// Most merge tools do not report how far they are, so a running merge is reported as `Running`
/// on every poll tick. When the tool prints `[current/total]` markers (e.g., `[ 12/291] merging blk.3`),
/// they are reported as `Step`. `Done` is always the last value of a successful merge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MergeProgress {
	Running,
	Step { current: u32, total: u32 },
	Done,
}

impl MergeProgress {
	/// Coarse fraction for progress bars: `Running` is `0.5`, `Done` is `1.0`,
	/// and `Step` is its ratio (kept below `1.0` until `Done`).
	#[must_use]
	pub fn as_fraction(&self) -> f32 {
		match self {
			Self::Running => 0.5,
			Self::Step { current, total } => (*current as f32 / *total as f32).min(0.99),
			Self::Done => 1.0,
		}
	}

	#[must_use]
	pub fn is_done(&self) -> bool {
		matches!(self, Self::Done)
	}
}

static STEP_MARKER_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\[\s*(\d+)\s*/\s*(\d+)\s*\]").ok());

/// Extract a `[current/total]` marker from a line of merge tool output.
pub(crate) fn parse_progress_line(line: &str) -> Option<MergeProgress> {
	let re = STEP_MARKER_RE.as_ref()?;
	let caps = re.captures(line)?;
	let current: u32 = caps.get(1)?.as_str().parse().ok()?;
	let total: u32 = caps.get(2)?.as_str().parse().ok()?;

	if total == 0 || current > total {
		return None;
	}

	Some(MergeProgress::Step { current, total })
}

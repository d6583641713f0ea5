use crate::merge::config::MIN_POLL_INTERVAL;
use crate::merge::progress::parse_progress_line;
use crate::merge::{AdapterMergeCache, AdapterSpec, MergeConfig, MergeKey, MergeProgress, ToolLocator};
use crate::{Error, Result};
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::LinesStream;

const STDERR_TAIL_LINES: usize = 20;

// region:    --- MergeOutcome

/// How the returned model path was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStatus {
	/// No adapters: the base model path is returned as is.
	Passthrough,
	/// The merged model was already in the cache.
	Cached,
	/// The merge tool ran and produced the model.
	Merged,
	/// The merge tool was not found: the model is a byte copy of the base model,
	/// the adapters were NOT applied.
	Degraded,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
	pub path: PathBuf,
	pub status: MergeStatus,
	/// `None` for `Passthrough`.
	pub key: Option<MergeKey>,
}

// endregion: --- MergeOutcome

/// Bakes LoRA adapters into a standalone model file, once per (base, adapters) combination.
///
/// Concurrent merges of the same key within one `MergePipeline` are serialized (the second one
/// finds the first one's result in the cache). Across processes, each merge writes its own
/// temporary file and renames it into place, so the cache never exposes a half-written model.
#[derive(Debug)]
pub struct MergePipeline {
	config: MergeConfig,
	cache: AdapterMergeCache,
	tool_locator: ToolLocator,
	key_locks: Mutex<HashMap<MergeKey, Arc<tokio::sync::Mutex<()>>>>,
}

/// Constructors
impl MergePipeline {
	pub fn new(config: MergeConfig) -> Self {
		Self {
			cache: AdapterMergeCache::new(config.cache_root.clone()),
			tool_locator: ToolLocator::from_config(&config),
			config,
			key_locks: Mutex::new(HashMap::new()),
		}
	}
}

/// Cache access
impl MergePipeline {
	pub fn cache(&self) -> &AdapterMergeCache {
		&self.cache
	}

	pub fn cache_root(&self) -> &Path {
		self.cache.root()
	}

	pub async fn list_cached(&self) -> Result<Vec<PathBuf>> {
		self.cache.list().await
	}

	pub async fn clear_cache(&self) -> Result<()> {
		self.cache.clear().await
	}
}

impl MergePipeline {
	/// Return a model file with `adapters` applied to `base`, merging it if not cached yet.
	///
	/// - No adapters: `base` is returned unchanged (`MergeStatus::Passthrough`), nothing is touched.
	/// - A missing base or adapter file fails with `Error::MissingBaseModel` / `Error::MissingAdapter`.
	/// - Tool absent: a byte copy of `base` is returned (`MergeStatus::Degraded`) and a warning is logged.
	/// - Tool failure: `Error::MergeProcessFailed`, nothing is left in the cache.
	///
	/// `on_progress` receives `Running` (or `Step`) while the tool runs, and `Done` last on success.
	pub async fn merge(
		&self,
		base: impl AsRef<Path>,
		adapters: &[AdapterSpec],
		mut on_progress: impl FnMut(MergeProgress),
	) -> Result<MergeOutcome> {
		let base = base.as_ref();

		if adapters.is_empty() {
			return Ok(MergeOutcome {
				path: base.to_path_buf(),
				status: MergeStatus::Passthrough,
				key: None,
			});
		}

		// -- Validate inputs
		if !is_file(base) {
			return Err(Error::MissingBaseModel { path: base.to_path_buf() });
		}
		if let Some(missing) = adapters.iter().find(|adapter| !is_file(adapter.path())) {
			return Err(Error::MissingAdapter {
				path: missing.path().to_path_buf(),
			});
		}

		// -- Fast path
		let key = self.cache.key_for(base, adapters);
		if let Some(outcome) = self.cached_outcome(&key, &mut on_progress) {
			return Ok(outcome);
		}

		// -- Cold path (one merge per key at a time)
		let key_lock = self.key_lock(&key);
		let result = {
			let _guard = key_lock.lock().await;
			// The merge we waited on may have produced it.
			match self.cached_outcome(&key, &mut on_progress) {
				Some(outcome) => Ok(outcome),
				None => self.merge_cold(base, adapters, key.clone(), &mut on_progress).await,
			}
		};
		drop(key_lock);
		self.release_key_locks();

		result
	}

	fn cached_outcome(&self, key: &MergeKey, on_progress: &mut impl FnMut(MergeProgress)) -> Option<MergeOutcome> {
		let path = self.cache.lookup(key)?;
		tracing::debug!("Merge cache hit for '{key}': {}", path.display());
		on_progress(MergeProgress::Done);
		Some(MergeOutcome {
			path,
			status: MergeStatus::Cached,
			key: Some(key.clone()),
		})
	}

	async fn merge_cold(
		&self,
		base: &Path,
		adapters: &[AdapterSpec],
		key: MergeKey,
		on_progress: &mut impl FnMut(MergeProgress),
	) -> Result<MergeOutcome> {
		tokio::fs::create_dir_all(self.cache.root()).await?;
		let target = self.cache.path_for(&key);
		let partial = self.cache.partial_path_for(&key);

		let status = match self.tool_locator.locate() {
			None => {
				tracing::warn!(
					"Merge tool '{}' not found (searched {} locations). Copying base model '{}' unchanged, {} adapter(s) NOT applied.",
					self.tool_locator.executable_name(),
					self.tool_locator.candidates().len(),
					base.display(),
					adapters.len()
				);
				if let Err(err) = tokio::fs::copy(base, &partial).await {
					remove_partial(&partial).await;
					return Err(err.into());
				}
				MergeStatus::Degraded
			}
			Some(tool) => {
				tracing::info!(
					"Merging {} adapter(s) into '{}' with '{}'",
					adapters.len(),
					base.display(),
					tool.display()
				);
				if let Err(err) = self.run_tool(&tool, base, adapters, &partial, on_progress).await {
					remove_partial(&partial).await;
					return Err(err);
				}
				MergeStatus::Merged
			}
		};

		tokio::fs::rename(&partial, &target).await?;
		on_progress(MergeProgress::Done);

		Ok(MergeOutcome {
			path: target,
			status,
			key: Some(key),
		})
	}

	/// Run the merge tool writing to `output`, reporting progress until it exits.
	async fn run_tool(
		&self,
		tool: &Path,
		base: &Path,
		adapters: &[AdapterSpec],
		output: &Path,
		on_progress: &mut impl FnMut(MergeProgress),
	) -> Result<()> {
		let mut child = Command::new(tool)
			.args(merge_args(base, output, adapters))
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true)
			.spawn()
			.map_err(|cause| Error::MergeProcessSpawn {
				tool: tool.to_path_buf(),
				cause,
			})?;

		// -- Forward both output pipes as lines
		let (line_tx, mut line_rx) = mpsc::unbounded_channel::<ToolLine>();
		if let Some(stdout) = child.stdout.take() {
			tokio::spawn(forward_lines(stdout, ToolLine::Stdout, line_tx.clone()));
		}
		if let Some(stderr) = child.stderr.take() {
			tokio::spawn(forward_lines(stderr, ToolLine::Stderr, line_tx.clone()));
		}
		drop(line_tx);

		let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
		let mut last_step: Option<MergeProgress> = None;
		let mut handle_line = |line: ToolLine, last_step: &mut Option<MergeProgress>| -> Option<MergeProgress> {
			let text = match line {
				ToolLine::Stdout(text) => text,
				ToolLine::Stderr(text) => {
					if stderr_tail.len() == STDERR_TAIL_LINES {
						stderr_tail.pop_front();
					}
					stderr_tail.push_back(text.clone());
					text
				}
			};
			tracing::debug!("merge tool: {text}");
			let step = parse_progress_line(&text)?;
			*last_step = Some(step);
			Some(step)
		};

		// -- Poll until exit
		// The config field is public, so the floor is enforced here too.
		let mut ticker = tokio::time::interval(self.config.poll_interval.max(MIN_POLL_INTERVAL));
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		let mut lines_open = true;
		let exit_status = loop {
			tokio::select! {
				status = child.wait() => break status?,
				_ = ticker.tick() => on_progress(last_step.unwrap_or(MergeProgress::Running)),
				line = line_rx.recv(), if lines_open => match line {
					Some(line) => {
						if let Some(step) = handle_line(line, &mut last_step) {
							on_progress(step);
						}
					}
					None => lines_open = false,
				},
			}
		};

		// -- Drain what was printed right before exit
		while let Some(line) = line_rx.recv().await {
			if let Some(step) = handle_line(line, &mut last_step) {
				on_progress(step);
			}
		}

		if !exit_status.success() {
			return Err(Error::MergeProcessFailed {
				tool: tool.to_path_buf(),
				exit_code: exit_status.code(),
				stderr_tail: Vec::from(stderr_tail).join("\n"),
			});
		}

		if !is_file(output) {
			return Err(Error::MergeOutputMissing {
				path: output.to_path_buf(),
			});
		}

		Ok(())
	}

	fn key_lock(&self, key: &MergeKey) -> Arc<tokio::sync::Mutex<()>> {
		let mut locks = self.key_locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
		locks.entry(key.clone()).or_default().clone()
	}

	/// Forget the locks nobody holds or waits on anymore.
	fn release_key_locks(&self) {
		let mut locks = self.key_locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
		locks.retain(|_, lock| Arc::strong_count(lock) > 1);
	}
}

// region:    --- Support

enum ToolLine {
	Stdout(String),
	Stderr(String),
}

async fn forward_lines<R>(reader: R, wrap: fn(String) -> ToolLine, line_tx: mpsc::UnboundedSender<ToolLine>)
where
	R: AsyncRead + Unpin,
{
	let mut lines = LinesStream::new(BufReader::new(reader).lines());
	while let Some(Ok(line)) = lines.next().await {
		if line_tx.send(wrap(line)).is_err() {
			break;
		}
	}
}

/// `<base> <output> [--lora <path> --lora-scale <weight>]...`, adapters in list order.
fn merge_args(base: &Path, output: &Path, adapters: &[AdapterSpec]) -> Vec<OsString> {
	let mut args: Vec<OsString> = vec![base.as_os_str().to_owned(), output.as_os_str().to_owned()];
	for adapter in adapters {
		let weight_label = adapter.weight_label();
		if adapter.is_weight_rounded() {
			tracing::debug!(
				"Adapter '{}' weight {} is merged at {weight_label} (one decimal)",
				adapter.path().display(),
				adapter.weight()
			);
		}
		args.push("--lora".into());
		args.push(adapter.path().as_os_str().to_owned());
		args.push("--lora-scale".into());
		args.push(weight_label.into());
	}
	args
}

async fn remove_partial(partial: &Path) {
	if let Err(err) = tokio::fs::remove_file(partial).await
		&& err.kind() != std::io::ErrorKind::NotFound
	{
		tracing::warn!("Could not remove partial merge file '{}': {err}", partial.display());
	}
}

fn is_file(path: &Path) -> bool {
	std::fs::metadata(path).map(|meta| meta.is_file()).unwrap_or(false)
}

// endregion: --- Support

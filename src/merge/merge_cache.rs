use crate::Result;
use crate::merge::{AdapterSpec, MergeKey};
use std::path::{Path, PathBuf};

const PARTIAL_SUFFIX: &str = "partial";

/// The on-disk cache of merged models: `<cache-root>/<base>_merged_<hex>.<ext>`.
///
/// There is no manifest, the directory listing is the source of truth, and a file's existence
/// is its validity. Files are only ever made visible by an atomic rename of a finished file,
/// so a merge that fails or is interrupted never leaves a valid-looking artifact behind.
#[derive(Debug, Clone)]
pub struct AdapterMergeCache {
	root: PathBuf,
}

/// Constructors
impl AdapterMergeCache {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}
}

impl AdapterMergeCache {
	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn key_for(&self, base: &Path, adapters: &[AdapterSpec]) -> MergeKey {
		MergeKey::derive(base, adapters)
	}

	/// The artifact path for this key (it may not exist).
	pub fn path_for(&self, key: &MergeKey) -> PathBuf {
		self.root.join(key.file_name())
	}

	/// The artifact path for this key, if it was already merged.
	pub fn lookup(&self, key: &MergeKey) -> Option<PathBuf> {
		let path = self.path_for(key);
		std::fs::metadata(&path).ok().filter(|meta| meta.is_file()).map(|_| path)
	}

	/// All the finished artifacts of the cache (in-progress temporary files excluded), sorted.
	pub async fn list(&self) -> Result<Vec<PathBuf>> {
		let mut read_dir = match tokio::fs::read_dir(&self.root).await {
			Ok(read_dir) => read_dir,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(err) => return Err(err.into()),
		};

		let mut paths = Vec::new();
		while let Some(entry) = read_dir.next_entry().await? {
			if !entry.file_type().await?.is_file() {
				continue;
			}
			let path = entry.path();
			if is_artifact_file_name(&entry.file_name().to_string_lossy()) {
				paths.push(path);
			}
		}
		paths.sort();

		Ok(paths)
	}

	/// Delete the whole cache root.
	pub async fn clear(&self) -> Result<()> {
		match tokio::fs::remove_dir_all(&self.root).await {
			Ok(()) => Ok(()),
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(err) => Err(err.into()),
		}
	}

	/// Where a merge for `key` writes before being renamed into place.
	/// Unique per process, so two processes merging the same key do not write the same file.
	pub(crate) fn partial_path_for(&self, key: &MergeKey) -> PathBuf {
		self.root
			.join(format!("{}.{}.{PARTIAL_SUFFIX}", key.file_name(), std::process::id()))
	}
}

fn is_artifact_file_name(file_name: &str) -> bool {
	file_name.contains("_merged_") && !file_name.ends_with(PARTIAL_SUFFIX)
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A LoRA adapter file and the scale it is blended with, in `[0.0, 1.0]`.
///
/// Deserialization goes through `AdapterSpec::new`, so the weight is clamped there too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "AdapterSpecFields")]
pub struct AdapterSpec {
	path: PathBuf,
	weight: f32,
}

#[derive(Deserialize)]
struct AdapterSpecFields {
	path: PathBuf,
	weight: f32,
}

impl From<AdapterSpecFields> for AdapterSpec {
	fn from(fields: AdapterSpecFields) -> Self {
		Self::new(fields.path, fields.weight)
	}
}

/// Constructors
impl AdapterSpec {
	/// Out-of-range weights are clamped to `[0.0, 1.0]` (a non-finite weight becomes `0.0`),
	/// with a warning.
	pub fn new(path: impl Into<PathBuf>, weight: f32) -> Self {
		let path = path.into();
		let clamped = if weight.is_finite() { weight.clamp(0.0, 1.0) } else { 0.0 };
		if clamped != weight {
			tracing::warn!(
				"Adapter '{}' weight {weight} is outside [0, 1], using {clamped}",
				path.display()
			);
		}
		Self { path, weight: clamped }
	}
}

/// Getters
impl AdapterSpec {
	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn weight(&self) -> f32 {
		self.weight
	}

	/// The weight as it takes part in the merge key and in the merge tool arguments (one decimal).
	pub fn weight_label(&self) -> String {
		format!("{:.1}", self.weight)
	}

	/// True when `weight_label` is not exactly the requested weight (e.g. `0.75` merged at `0.8`).
	pub fn is_weight_rounded(&self) -> bool {
		self.weight_label()
			.parse::<f32>()
			.map(|label_weight| label_weight != self.weight)
			.unwrap_or(false)
	}
}

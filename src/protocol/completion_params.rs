//! `CompletionParams` is the open, string-keyed bag of sampling parameters of a completion request.
//! - Names follow the generic (llama.cpp-style) vocabulary, see `param_names`.
//! - Backends read them through typed accessors (local) or translate them to wire names (remote).
//! - Cached (backend-level) params and request params are combined with `ParamsSet`,
//!   the request value winning.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sent as `max_tokens` when no generation length is given.
pub const DEFAULT_MAX_TOKENS: u32 = 256;

/// The generic parameter names.
pub mod param_names {
	pub const TEMPERATURE: &str = "temperature";
	pub const TOP_K: &str = "top_k";
	pub const TOP_P: &str = "top_p";
	pub const MIN_P: &str = "min_p";
	pub const MIROSTAT: &str = "mirostat";
	pub const MIROSTAT_TAU: &str = "mirostat_tau";
	pub const MIROSTAT_ETA: &str = "mirostat_eta";
	pub const SEED: &str = "seed";
	pub const PRESENCE_PENALTY: &str = "presence_penalty";
	/// Generation length.
	pub const N_PREDICT: &str = "n_predict";
	/// Repetition penalty.
	pub const REPEAT_PENALTY: &str = "repeat_penalty";
	/// Number of candidate tokens reported with their probabilities.
	pub const N_PROBS: &str = "n_probs";
}

use param_names as names;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionParams {
	values: Map<String, Value>,
}

impl From<Map<String, Value>> for CompletionParams {
	fn from(values: Map<String, Value>) -> Self {
		Self { values }
	}
}

/// Generic accessors
impl CompletionParams {
	#[must_use]
	pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.values.insert(name.into(), value.into());
		self
	}

	pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
		self.values.insert(name.into(), value.into());
	}

	pub fn get(&self, name: &str) -> Option<&Value> {
		self.values.get(name)
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
		self.values.iter()
	}

	/// Overlay `other` on top of `self` (values of `other` win).
	///
	/// A name and its wire alias (e.g. `n_predict` and `max_tokens`) are one parameter:
	/// a value of `other` replaces the value of `self` under either name.
	#[must_use]
	pub fn merged_with(&self, other: &CompletionParams) -> CompletionParams {
		let mut values = self.values.clone();
		for (name, value) in other.values.iter() {
			let wire_name = wire_param_name(name);
			values.retain(|existing, _| wire_param_name(existing) != wire_name);
			values.insert(name.clone(), value.clone());
		}
		Self { values }
	}
}

/// Chainable Setters
impl CompletionParams {
	#[must_use]
	pub fn with_temperature(self, value: f64) -> Self {
		self.with(names::TEMPERATURE, value)
	}

	#[must_use]
	pub fn with_top_k(self, value: i64) -> Self {
		self.with(names::TOP_K, value)
	}

	#[must_use]
	pub fn with_top_p(self, value: f64) -> Self {
		self.with(names::TOP_P, value)
	}

	#[must_use]
	pub fn with_min_p(self, value: f64) -> Self {
		self.with(names::MIN_P, value)
	}

	#[must_use]
	pub fn with_seed(self, value: i64) -> Self {
		self.with(names::SEED, value)
	}

	#[must_use]
	pub fn with_presence_penalty(self, value: f64) -> Self {
		self.with(names::PRESENCE_PENALTY, value)
	}

	#[must_use]
	pub fn with_n_predict(self, value: i64) -> Self {
		self.with(names::N_PREDICT, value)
	}

	#[must_use]
	pub fn with_repeat_penalty(self, value: f64) -> Self {
		self.with(names::REPEAT_PENALTY, value)
	}

	#[must_use]
	pub fn with_n_probs(self, value: i64) -> Self {
		self.with(names::N_PROBS, value)
	}

	#[must_use]
	pub fn with_mirostat(self, mode: i64, tau: f64, eta: f64) -> Self {
		self.with(names::MIROSTAT, mode)
			.with(names::MIROSTAT_TAU, tau)
			.with(names::MIROSTAT_ETA, eta)
	}
}

/// Typed getters (used by the local backend)
impl CompletionParams {
	pub fn temperature(&self) -> Option<f64> {
		self.get(names::TEMPERATURE).and_then(Value::as_f64)
	}

	pub fn top_k(&self) -> Option<i64> {
		self.get(names::TOP_K).and_then(Value::as_i64)
	}

	pub fn top_p(&self) -> Option<f64> {
		self.get(names::TOP_P).and_then(Value::as_f64)
	}

	pub fn min_p(&self) -> Option<f64> {
		self.get(names::MIN_P).and_then(Value::as_f64)
	}

	pub fn seed(&self) -> Option<i64> {
		self.get(names::SEED).and_then(Value::as_i64)
	}

	pub fn repeat_penalty(&self) -> Option<f64> {
		self.get(names::REPEAT_PENALTY).and_then(Value::as_f64)
	}

	/// Generation length, from the generic name or the wire name.
	pub fn n_predict(&self) -> Option<i64> {
		self.get(names::N_PREDICT)
			.or_else(|| self.get("max_tokens"))
			.and_then(Value::as_i64)
	}
}

// region:    --- ParamsSet

/// Resolves the params of one request in a cascading manner: request params first,
/// then the cached params of the backend.
#[derive(Default, Clone, Debug)]
pub struct ParamsSet<'a, 'b> {
	cached: Option<&'a CompletionParams>,
	request: Option<&'b CompletionParams>,
}

impl<'a, 'b> ParamsSet<'a, 'b> {
	#[must_use]
	pub const fn with_cached_params(mut self, params: Option<&'a CompletionParams>) -> Self {
		self.cached = params;
		self
	}

	#[must_use]
	pub const fn with_request_params(mut self, params: Option<&'b CompletionParams>) -> Self {
		self.request = params;
		self
	}
}

impl ParamsSet<'_, '_> {
	#[must_use]
	pub fn resolve(&self) -> CompletionParams {
		match (self.cached, self.request) {
			(Some(cached), Some(request)) => cached.merged_with(request),
			(Some(params), None) | (None, Some(params)) => params.clone(),
			(None, None) => CompletionParams::default(),
		}
	}
}

// endregion: --- ParamsSet

// region:    --- Parameter Translation

/// The wire name of a generic parameter. Unknown names pass through unchanged.
#[must_use]
pub fn wire_param_name(name: &str) -> &str {
	match name {
		names::N_PREDICT => "max_tokens",
		names::REPEAT_PENALTY => "frequency_penalty",
		names::N_PROBS => "logprobs",
		other => other,
	}
}

/// Translate the params to the fields of a completion request body.
///
/// When no generation length is set, `max_tokens` is `default_max_tokens`.
/// When both a generic name and its wire name are set, the generic one wins.
#[must_use]
pub fn translate_params(params: &CompletionParams, default_max_tokens: u32) -> Map<String, Value> {
	let mut wire = Map::new();

	// Wire names first, so generic names override them.
	let (generic, passthrough): (Vec<_>, Vec<_>) = params.iter().partition(|(name, _)| wire_param_name(name) != name.as_str());
	for (name, value) in passthrough.into_iter().chain(generic) {
		wire.insert(wire_param_name(name).to_string(), value.clone());
	}

	if !wire.contains_key("max_tokens") {
		wire.insert("max_tokens".to_string(), Value::from(default_max_tokens));
	}

	wire
}

// endregion: --- Parameter Translation

//! Process-wide cache of loaded llama.cpp models, so backends on the same file share one copy.

use crate::{Error, Result};
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{LlamaChatTemplate, LlamaModel};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::OnceCell;

/// A loaded model with its chat template (when the model file carries one).
#[derive(Debug)]
pub struct LoadedModel {
	pub model: LlamaModel,
	pub chat_template: Option<LlamaChatTemplate>,
	pub model_path: PathBuf,
}

#[derive(Debug)]
pub struct ModelManager {
	backend: Arc<LlamaBackend>,
	models: RwLock<HashMap<PathBuf, Arc<LoadedModel>>>,
}

static MODEL_MANAGER: OnceCell<Arc<ModelManager>> = OnceCell::const_new();

impl ModelManager {
	/// The global instance. llama.cpp must be initialized once per process.
	pub async fn instance() -> Result<Arc<ModelManager>> {
		MODEL_MANAGER
			.get_or_try_init(|| async {
				let backend =
					LlamaBackend::init().map_err(|e| Error::Backend(format!("Failed to initialize llama backend: {e}")))?;

				Ok(Arc::new(ModelManager {
					backend: Arc::new(backend),
					models: RwLock::new(HashMap::new()),
				}))
			})
			.await
			.cloned()
	}

	pub fn backend(&self) -> Arc<LlamaBackend> {
		self.backend.clone()
	}

	/// Load the model at `model_path`, or return the already loaded one.
	pub async fn load_model(&self, model_path: &Path) -> Result<Arc<LoadedModel>> {
		let cached = self.models.read().unwrap_or_else(PoisonError::into_inner).get(model_path).cloned();
		if let Some(loaded) = cached {
			tracing::debug!("Model '{}' already loaded", model_path.display());
			return Ok(loaded);
		}

		if !model_path.is_file() {
			return Err(Error::Backend(format!("Model file not found: {}", model_path.display())));
		}

		let backend = self.backend.clone();
		let path = model_path.to_path_buf();
		let loaded = tokio::task::spawn_blocking(move || -> Result<LoadedModel> {
			let model = LlamaModel::load_from_file(&backend, &path, &LlamaModelParams::default())
				.map_err(|e| Error::Backend(format!("Failed to load model '{}': {e}", path.display())))?;
			let chat_template = model.chat_template(None).ok();
			Ok(LoadedModel {
				model,
				chat_template,
				model_path: path,
			})
		})
		.await
		.map_err(|e| Error::Backend(format!("Model loading task failed: {e}")))??;

		tracing::info!("Loaded model '{}'", model_path.display());

		// Two concurrent first loads of the same file keep the first one inserted.
		let mut models = self.models.write().unwrap_or_else(PoisonError::into_inner);
		let loaded = models
			.entry(model_path.to_path_buf())
			.or_insert_with(|| Arc::new(loaded))
			.clone();
		Ok(loaded)
	}

	/// Drop the cached models (the memory is freed once no backend uses them anymore).
	pub fn clear_cache(&self) {
		self.models.write().unwrap_or_else(PoisonError::into_inner).clear();
	}

	pub fn cache_size(&self) -> usize {
		self.models.read().unwrap_or_else(PoisonError::into_inner).len()
	}
}

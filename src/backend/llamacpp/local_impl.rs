use super::streamer::{LocalStreamer, StreamChunk};
use super::{LoadedModel, LocalConfig, ModelManager};
use crate::protocol::{CompletionParams, CompletionStream, PromptMessage, param_names};
use crate::{Error, Result};
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::{AddBos, LlamaChatMessage, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;
use llama_cpp_2::token::LlamaToken;
use serde_json::Value;
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tokio::sync::mpsc;

const STREAM_CHANNEL_CAPACITY: usize = 32;
const BATCH_MIN_CAPACITY: usize = 512;
const PENALTY_LAST_N: i32 = 64;
const DEFAULT_SEED: u32 = 1234;

/// Generation with an in-process llama.cpp model.
#[derive(Debug)]
pub struct LlamaCppBackend {
	config: LocalConfig,
	backend: Arc<LlamaBackend>,
	loaded: Arc<LoadedModel>,
	grammar: RwLock<Option<String>>,
	// Cancel flags of the generations started by this backend (dead ones pruned on register).
	generations: Mutex<Vec<Weak<AtomicBool>>>,
}

/// Constructors
impl LlamaCppBackend {
	pub async fn new(config: LocalConfig) -> Result<Self> {
		let manager = ModelManager::instance().await?;
		let loaded = manager.load_model(&config.model_path).await?;

		Ok(Self {
			config,
			backend: manager.backend(),
			loaded,
			grammar: RwLock::new(None),
			generations: Mutex::new(Vec::new()),
		})
	}
}

impl LlamaCppBackend {
	pub fn model_path(&self) -> &Path {
		&self.loaded.model_path
	}

	pub fn tokenize(&self, text: &str) -> Result<Vec<i32>> {
		let tokens = self
			.loaded
			.model
			.str_to_token(text, AddBos::Never)
			.map_err(|e| Error::Backend(format!("Failed to tokenize: {e}")))?;
		Ok(tokens.into_iter().map(|token| token.0).collect())
	}

	pub fn detokenize(&self, tokens: &[i32]) -> Result<String> {
		let mut decoder = encoding_rs::UTF_8.new_decoder();
		let mut text = String::new();
		for token in tokens {
			let bytes = self
				.loaded
				.model
				.token_to_bytes(LlamaToken::new(*token), Special::Tokenize)
				.map_err(|e| Error::Backend(format!("Failed to detokenize token {token}: {e}")))?;
			decode_piece(&mut decoder, &bytes, &mut text);
		}
		Ok(text)
	}

	/// GBNF grammar constraining the next generations. An empty grammar removes the constraint.
	pub fn set_grammar(&self, grammar: &str) {
		let mut current = self.grammar.write().unwrap_or_else(PoisonError::into_inner);
		*current = if grammar.trim().is_empty() {
			None
		} else {
			Some(grammar.to_string())
		};
	}

	/// Stop the in-flight generations at their next token.
	pub fn cancel(&self) {
		let generations = self.generations.lock().unwrap_or_else(PoisonError::into_inner);
		for flag in generations.iter().filter_map(Weak::upgrade) {
			flag.store(true, Ordering::Relaxed);
		}
	}

	/// Render the messages with the model's chat template (plain `role: content` lines when the
	/// model has none), ending with the assistant turn opener.
	pub fn apply_template(&self, messages: &[PromptMessage]) -> Result<String> {
		let Some(template) = &self.loaded.chat_template else {
			let mut prompt = String::new();
			for message in messages {
				prompt.push_str(&format!("{}: {}\n", message.role, message.content));
			}
			prompt.push_str("assistant: ");
			return Ok(prompt);
		};

		let chat = messages
			.iter()
			.map(|message| {
				LlamaChatMessage::new(message.role.clone(), message.content.clone())
					.map_err(|e| Error::Backend(format!("Invalid chat message: {e}")))
			})
			.collect::<Result<Vec<_>>>()?;

		self.loaded
			.model
			.apply_chat_template(template, &chat, true)
			.map_err(|e| Error::Backend(format!("Failed to apply chat template: {e}")))
	}

	/// Start a generation on a blocking task. Must be called within a tokio runtime.
	pub fn completion_stream(&self, prompt: &str, params: &CompletionParams) -> CompletionStream {
		let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

		let job = GenerationJob {
			backend: self.backend.clone(),
			loaded: self.loaded.clone(),
			context_size: self.config.context_size,
			threads: self.config.threads,
			prompt: prompt.to_string(),
			options: GenerationOptions::from_params(params),
			grammar: self.grammar.read().unwrap_or_else(PoisonError::into_inner).clone(),
			cancel_flag: self.register_generation(),
		};

		tokio::task::spawn_blocking(move || {
			let last_chunk = match job.run(&tx) {
				Ok(cancelled) => StreamChunk::Done { cancelled },
				Err(err) => StreamChunk::Error(err.to_string()),
			};
			// Receiver dropped means nobody is listening anymore.
			let _ = tx.blocking_send(last_chunk);
		});

		CompletionStream::from_inner_stream(LocalStreamer::new(rx))
	}

	fn register_generation(&self) -> Arc<AtomicBool> {
		let flag = Arc::new(AtomicBool::new(false));
		let mut generations = self.generations.lock().unwrap_or_else(PoisonError::into_inner);
		generations.retain(|weak| weak.strong_count() > 0);
		generations.push(Arc::downgrade(&flag));
		flag
	}
}

// region:    --- Generation

/// Sampling options read from the resolved `CompletionParams`.
#[derive(Debug, Clone, Default)]
struct GenerationOptions {
	max_tokens: usize,
	temperature: Option<f32>,
	top_k: Option<i32>,
	top_p: Option<f32>,
	min_p: Option<f32>,
	seed: Option<u32>,
	repeat_penalty: Option<f32>,
	presence_penalty: Option<f32>,
	/// (tau, eta) when mirostat v2 is requested.
	mirostat: Option<(f32, f32)>,
}

impl GenerationOptions {
	fn from_params(params: &CompletionParams) -> Self {
		let get_f32 = |name: &str| params.get(name).and_then(Value::as_f64).map(|v| v as f32);

		let mirostat = match params.get(param_names::MIROSTAT).and_then(Value::as_i64) {
			Some(mode) if mode > 0 => Some((
				get_f32(param_names::MIROSTAT_TAU).unwrap_or(5.0),
				get_f32(param_names::MIROSTAT_ETA).unwrap_or(0.1),
			)),
			_ => None,
		};

		Self {
			max_tokens: params
				.n_predict()
				.and_then(|n| usize::try_from(n).ok())
				.unwrap_or(crate::protocol::DEFAULT_MAX_TOKENS as usize),
			temperature: params.temperature().map(|v| v as f32),
			top_k: params.top_k().and_then(|v| i32::try_from(v).ok()),
			top_p: params.top_p().map(|v| v as f32),
			min_p: params.min_p().map(|v| v as f32),
			seed: params.seed().and_then(|v| u32::try_from(v).ok()),
			repeat_penalty: params.repeat_penalty().map(|v| v as f32),
			presence_penalty: get_f32(param_names::PRESENCE_PENALTY),
			mirostat,
		}
	}
}

struct GenerationJob {
	backend: Arc<LlamaBackend>,
	loaded: Arc<LoadedModel>,
	context_size: u32,
	threads: Option<i32>,
	prompt: String,
	options: GenerationOptions,
	grammar: Option<String>,
	cancel_flag: Arc<AtomicBool>,
}

impl GenerationJob {
	/// Blocking generation loop. Returns whether it was cancelled.
	fn run(self, tx: &mpsc::Sender<StreamChunk>) -> Result<bool> {
		let model = &self.loaded.model;

		let mut context_params = LlamaContextParams::default().with_n_ctx(NonZeroU32::new(self.context_size));
		if let Some(threads) = self.threads {
			context_params = context_params.with_n_threads(threads).with_n_threads_batch(threads);
		}

		// llama.cpp contexts are not Send, so the context lives and dies on this thread.
		let mut context = model
			.new_context(&self.backend, context_params)
			.map_err(|e| Error::Backend(format!("Failed to create context: {e}")))?;

		let tokens = model
			.str_to_token(&self.prompt, AddBos::Always)
			.map_err(|e| Error::Backend(format!("Failed to tokenize prompt: {e}")))?;
		let n_ctx = i32::try_from(context.n_ctx()).unwrap_or(i32::MAX);
		if tokens.is_empty() {
			return Ok(false);
		}
		if tokens.len() >= n_ctx as usize {
			return Err(Error::Backend(format!(
				"Prompt of {} tokens does not fit the context of {n_ctx} tokens",
				tokens.len()
			)));
		}

		let mut batch = LlamaBatch::new(tokens.len().max(BATCH_MIN_CAPACITY), 1);
		let last_index = tokens.len() as i32 - 1;
		for (i, token) in (0_i32..).zip(tokens) {
			batch
				.add(token, i, &[0], i == last_index)
				.map_err(|e| Error::Backend(format!("Failed to add token to batch: {e}")))?;
		}
		context
			.decode(&mut batch)
			.map_err(|e| Error::Backend(format!("Failed to decode prompt: {e}")))?;

		let mut sampler = create_sampler(model, &self.options, self.grammar.as_deref());
		let mut decoder = encoding_rs::UTF_8.new_decoder();
		let mut n_cur = batch.n_tokens();

		for _ in 0..self.options.max_tokens {
			if self.cancel_flag.load(Ordering::Relaxed) {
				tracing::debug!("Local generation cancelled");
				return Ok(true);
			}

			let token = sampler.sample(&context, batch.n_tokens() - 1);
			sampler.accept(token);

			if model.is_eog_token(token) {
				break;
			}

			let bytes = model
				.token_to_bytes(token, Special::Tokenize)
				.map_err(|e| Error::Backend(format!("Failed to convert token to bytes: {e}")))?;
			let mut piece = String::new();
			decode_piece(&mut decoder, &bytes, &mut piece);

			if !piece.is_empty() && tx.blocking_send(StreamChunk::Delta(piece)).is_err() {
				// The stream was dropped: nobody wants the rest.
				return Ok(true);
			}

			batch.clear();
			batch
				.add(token, n_cur, &[0], true)
				.map_err(|e| Error::Backend(format!("Failed to add token to batch: {e}")))?;
			context
				.decode(&mut batch)
				.map_err(|e| Error::Backend(format!("Failed to decode token: {e}")))?;

			n_cur += 1;
			if n_cur >= n_ctx {
				break;
			}
		}

		Ok(false)
	}
}

/// Sampler chain: grammar, penalties, filters, then mirostat or seeded distribution
/// (greedy at temperature 0).
fn create_sampler(model: &LlamaModel, options: &GenerationOptions, grammar: Option<&str>) -> LlamaSampler {
	let mut samplers = Vec::new();

	if let Some(grammar) = grammar {
		match LlamaSampler::grammar(model, grammar, "root") {
			Some(grammar_sampler) => samplers.push(grammar_sampler),
			None => tracing::warn!("Invalid grammar, generating without it"),
		}
	}

	if options.repeat_penalty.is_some() || options.presence_penalty.is_some() {
		samplers.push(LlamaSampler::penalties(
			PENALTY_LAST_N,
			options.repeat_penalty.unwrap_or(1.0),
			0.0,
			options.presence_penalty.unwrap_or(0.0),
		));
	}

	let seed = options.seed.unwrap_or(DEFAULT_SEED);

	if let Some((tau, eta)) = options.mirostat {
		if let Some(temperature) = options.temperature {
			samplers.push(LlamaSampler::temp(temperature));
		}
		samplers.push(LlamaSampler::mirostat_v2(seed, tau, eta));
		return LlamaSampler::chain(samplers, false);
	}

	if options.temperature.is_some_and(|t| t <= 0.0) {
		samplers.push(LlamaSampler::greedy());
		return LlamaSampler::chain(samplers, false);
	}

	if let Some(top_k) = options.top_k {
		samplers.push(LlamaSampler::top_k(top_k));
	}
	if let Some(top_p) = options.top_p {
		samplers.push(LlamaSampler::top_p(top_p, 1));
	}
	if let Some(min_p) = options.min_p {
		samplers.push(LlamaSampler::min_p(min_p, 1));
	}
	if let Some(temperature) = options.temperature {
		samplers.push(LlamaSampler::temp(temperature));
	}
	samplers.push(LlamaSampler::dist(seed));

	LlamaSampler::chain(samplers, false)
}

/// Decode token bytes, keeping an incomplete UTF-8 sequence in the decoder for the next token.
fn decode_piece(decoder: &mut encoding_rs::Decoder, bytes: &[u8], out: &mut String) {
	let capacity = decoder.max_utf8_buffer_length(bytes.len()).unwrap_or(bytes.len() * 3 + 4);
	out.reserve(capacity);
	let _ = decoder.decode_to_string(bytes, out, false);
}

// endregion: --- Generation

//! Prepare a model with LoRA adapters baked in, then stream a completion from a local
//! OpenAI-style server serving it.
//!
//! cargo run --example c00-prepare-and-complete -- <base.gguf> <adapter.gguf> [server-url]

use llmlink::backend::{BackendAdapter, BackendConfig};
use llmlink::merge::{AdapterSpec, MergeConfig, MergePipeline, MergeStatus};
use llmlink::protocol::{CompletionParams, PromptMessage, RemoteConfig};
use llmlink::resolver::DEFAULT_BASE_URL;
use std::io::Write;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::new("llmlink=info"))
		.init();

	let mut args = std::env::args().skip(1);
	let (Some(base), Some(adapter)) = (args.next(), args.next()) else {
		eprintln!("usage: c00-prepare-and-complete <base.gguf> <adapter.gguf> [server-url]");
		return Ok(());
	};
	let server_url = args.next().unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

	println!("\n--- Prepare model ---");
	let pipeline = MergePipeline::new(MergeConfig::default());
	let outcome = pipeline
		.merge(&base, &[AdapterSpec::new(&adapter, 0.8)], |progress| {
			print!("\rmerging... {:>3.0}%", progress.as_fraction() * 100.0);
			let _ = std::io::stdout().flush();
		})
		.await?;
	println!();
	if outcome.status == MergeStatus::Degraded {
		println!("merge tool not found, the adapters were NOT applied");
	}
	println!("Serve this model, then press enter: {}", outcome.path.display());
	let mut line = String::new();
	std::io::stdin().read_line(&mut line)?;

	println!("\n--- Complete ---");
	let backend = BackendAdapter::new(BackendConfig::Remote(RemoteConfig::default().with_base_url(server_url))).await?;
	if !backend.is_alive().await {
		println!("Server not reachable.");
		return Ok(());
	}
	backend.set_cached_params(CompletionParams::default().with_temperature(0.7).with_n_predict(128));

	let prompt = backend.apply_template(&[
		PromptMessage::system("You are a terse innkeeper."),
		PromptMessage::user("Any rooms left tonight?"),
	]);
	let text = backend
		.completion_with_chunks(&prompt, &CompletionParams::default(), |chunk| {
			print!("{chunk}");
			let _ = std::io::stdout().flush();
		})
		.await;
	println!("\n\n({} chars)", text.chars().count());

	Ok(())
}

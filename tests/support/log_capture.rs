//! Captures the formatted `tracing` output of the current thread.

use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;

#[derive(Clone, Default)]
pub struct LogCapture {
	buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
	/// Install a capturing subscriber for the current thread until the guard is dropped.
	/// Use it with the (default) current-thread `#[tokio::test]` runtime.
	pub fn install() -> (Self, DefaultGuard) {
		let capture = Self::default();
		let writer = capture.clone();
		let subscriber = tracing_subscriber::fmt()
			.with_env_filter(tracing_subscriber::EnvFilter::new("llmlink=debug"))
			.with_ansi(false)
			.with_writer(move || writer.clone())
			.finish();
		let guard = tracing::subscriber::set_default(subscriber);
		(capture, guard)
	}

	pub fn contents(&self) -> String {
		let buffer = self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
		String::from_utf8_lossy(&buffer).into_owned()
	}
}

impl Write for LogCapture {
	fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
		let mut buffer = self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
		buffer.extend_from_slice(buf);
		Ok(buf.len())
	}

	fn flush(&mut self) -> std::io::Result<()> {
		Ok(())
	}
}

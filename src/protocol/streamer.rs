use crate::protocol::{CompletionStreamEnd, CompletionStreamEvent};
use crate::webc::WebStream;
use crate::{Error, Result};
use futures::{Future, Stream};
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use tokio::sync::Notify;
use value_ext::JsonValueExt;

const DONE_SENTINEL: &str = "[DONE]";

// region:    --- CancelSignal

/// Cancellation shared by a client and its streams.
///
/// The epoch covers the streams created but not polled yet (their `Notified` future does not exist
/// before the first poll), the `Notify` wakes the streams already waiting.
#[derive(Debug, Default)]
pub(super) struct CancelSignal {
	epoch: AtomicU64,
	notify: Notify,
}

impl CancelSignal {
	pub fn cancel(&self) {
		self.epoch.fetch_add(1, Ordering::SeqCst);
		self.notify.notify_waiters();
	}

	pub fn epoch(&self) -> u64 {
		self.epoch.load(Ordering::SeqCst)
	}
}

// endregion: --- CancelSignal

/// Interprets the `data: <json>` lines of a streamed `/v1/completions` response.
///
/// - Each record's `choices[0].text` becomes a `Chunk` (empty texts are skipped).
/// - `data: [DONE]` ends the stream with `End` carrying the concatenated text.
/// - Malformed records and non-`data:` lines (comments, `event:` fields) are skipped, not fatal.
/// - A cancel notification drops the connection and ends the stream with `End { cancelled: true }`.
pub(super) struct CompletionStreamer {
	inner: Option<WebStream>,
	url: String,
	cancel: Arc<CancelSignal>,
	start_epoch: u64,
	cancelled: Pin<Box<dyn Future<Output = ()> + Send>>,

	// -- Set by the poll_next
	done: bool,
	captured_text: String,
}

impl CompletionStreamer {
	pub fn new(inner: WebStream, url: String, cancel: Arc<CancelSignal>) -> Self {
		let start_epoch = cancel.epoch();
		let signal = cancel.clone();
		Self {
			inner: Some(inner),
			url,
			cancel,
			start_epoch,
			cancelled: Box::pin(async move { signal.notify.notified().await }),
			done: false,
			captured_text: String::new(),
		}
	}

	fn end_event(&mut self, cancelled: bool) -> CompletionStreamEvent {
		self.done = true;
		self.inner = None;
		CompletionStreamEvent::End(CompletionStreamEnd {
			text: std::mem::take(&mut self.captured_text),
			cancelled,
		})
	}
}

impl Stream for CompletionStreamer {
	type Item = Result<CompletionStreamEvent>;

	fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		let this = self.get_mut();

		if this.done {
			return Poll::Ready(None);
		}

		// Poll (thus register) the notification before reading the epoch, so no cancel falls in between.
		let notified = this.cancelled.as_mut().poll(cx).is_ready();
		if notified || this.cancel.epoch() != this.start_epoch {
			tracing::debug!("Completion stream to '{}' cancelled, closing the connection", this.url);
			return Poll::Ready(Some(Ok(this.end_event(true))));
		}

		let Some(inner) = this.inner.as_mut() else {
			return Poll::Ready(None);
		};

		loop {
			match Pin::new(&mut *inner).poll_next(cx) {
				Poll::Ready(Some(Ok(line))) => match parse_stream_line(&line) {
					StreamLine::Done => return Poll::Ready(Some(Ok(this.end_event(false)))),
					StreamLine::Text(text) => {
						if text.is_empty() {
							continue;
						}
						this.captured_text.push_str(&text);
						return Poll::Ready(Some(Ok(CompletionStreamEvent::Chunk(text))));
					}
					StreamLine::Skip => continue,
				},
				Poll::Ready(Some(Err(err))) => {
					this.done = true;
					this.inner = None;
					return Poll::Ready(Some(Err(Error::WebStream {
						url: this.url.clone(),
						cause: err.to_string(),
					})));
				}
				// Server closed without the sentinel: still a normal end.
				Poll::Ready(None) => return Poll::Ready(Some(Ok(this.end_event(false)))),
				Poll::Pending => return Poll::Pending,
			}
		}
	}
}

// region:    --- Line Parsing

#[derive(Debug, PartialEq)]
enum StreamLine {
	Text(String),
	Done,
	Skip,
}

fn parse_stream_line(line: &str) -> StreamLine {
	let line = line.trim();
	let Some(data) = line.strip_prefix("data:") else {
		return StreamLine::Skip;
	};
	let data = data.trim_start();

	if data == DONE_SENTINEL {
		return StreamLine::Done;
	}

	let mut record: Value = match serde_json::from_str(data) {
		Ok(record) => record,
		Err(serde_error) => {
			let err = Error::StreamParse {
				record: data.to_string(),
				serde_error,
			};
			tracing::debug!("Skipping malformed stream record: {err}");
			return StreamLine::Skip;
		}
	};

	// OpenAI shape first, llama.cpp native `/completion` shape as fallback.
	match record.x_take::<String>("/choices/0/text") {
		Ok(text) => StreamLine::Text(text),
		Err(_) => match record.x_take::<String>("content") {
			Ok(text) => StreamLine::Text(text),
			Err(_) => {
				tracing::debug!("Skipping stream record without text: {data}");
				StreamLine::Skip
			}
		},
	}
}

// endregion: --- Line Parsing

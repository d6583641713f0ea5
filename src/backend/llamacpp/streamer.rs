//! Receiving side of a local generation: turns the pieces sent by the blocking generation task
//! into `CompletionStreamEvent`s.

use crate::protocol::{CompletionStreamEnd, CompletionStreamEvent};
use crate::{Error, Result};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Sent by the generation task.
#[derive(Debug, Clone)]
pub(super) enum StreamChunk {
	Delta(String),
	Done { cancelled: bool },
	Error(String),
}

pub(super) struct LocalStreamer {
	receiver: mpsc::Receiver<StreamChunk>,
	captured_text: String,
	finished: bool,
}

impl LocalStreamer {
	pub(super) fn new(receiver: mpsc::Receiver<StreamChunk>) -> Self {
		Self {
			receiver,
			captured_text: String::new(),
			finished: false,
		}
	}
}

impl Stream for LocalStreamer {
	type Item = Result<CompletionStreamEvent>;

	fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		let this = self.get_mut();

		if this.finished {
			return Poll::Ready(None);
		}

		match this.receiver.poll_recv(cx) {
			Poll::Ready(Some(StreamChunk::Delta(text))) => {
				this.captured_text.push_str(&text);
				Poll::Ready(Some(Ok(CompletionStreamEvent::Chunk(text))))
			}
			Poll::Ready(Some(StreamChunk::Done { cancelled })) => {
				this.finished = true;
				let end = CompletionStreamEnd {
					text: std::mem::take(&mut this.captured_text),
					cancelled,
				};
				Poll::Ready(Some(Ok(CompletionStreamEvent::End(end))))
			}
			Poll::Ready(Some(StreamChunk::Error(err))) => {
				this.finished = true;
				Poll::Ready(Some(Err(Error::Backend(err))))
			}
			// The generation task ended without `Done` (it panicked).
			Poll::Ready(None) => {
				this.finished = true;
				Poll::Ready(Some(Err(Error::Backend("Generation task ended unexpectedly".to_string()))))
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures::StreamExt;

	#[tokio::test]
	async fn test_local_streamer_events() -> Result<()> {
		let (tx, rx) = mpsc::channel(8);
		tx.send(StreamChunk::Delta("Hel".to_string())).await.ok();
		tx.send(StreamChunk::Delta("lo".to_string())).await.ok();
		tx.send(StreamChunk::Done { cancelled: false }).await.ok();

		let mut streamer = LocalStreamer::new(rx);
		let mut chunks = Vec::new();
		let mut end = None;
		while let Some(event) = streamer.next().await {
			match event? {
				CompletionStreamEvent::Chunk(chunk) => chunks.push(chunk),
				CompletionStreamEvent::End(stream_end) => end = Some(stream_end),
			}
		}

		assert_eq!(chunks, vec!["Hel", "lo"]);
		assert_eq!(end.map(|e| e.text).as_deref(), Some("Hello"));
		Ok(())
	}
}

use crate::Result;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};

/// An event of a streamed completion.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionStreamEvent {
	/// A piece of generated text, in order.
	Chunk(String),
	/// The generation ended (always the last event of a successful stream).
	End(CompletionStreamEnd),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionStreamEnd {
	/// All the chunks concatenated.
	pub text: String,
	/// The stream was closed by a cancel request before the server finished.
	pub cancelled: bool,
}

/// A backend-independent stream of `CompletionStreamEvent`.
pub struct CompletionStream {
	inner_stream: Pin<Box<dyn Stream<Item = Result<CompletionStreamEvent>> + Send>>,
}

impl CompletionStream {
	pub fn from_inner_stream<S>(inner_stream: S) -> Self
	where
		S: Stream<Item = Result<CompletionStreamEvent>> + Send + 'static,
	{
		Self {
			inner_stream: Box::pin(inner_stream),
		}
	}

	/// Drive the stream to its end on the current task, calling `on_chunk` for each chunk.
	///
	/// This is the hand-off point between the producer (network reader, or the blocking
	/// generation thread of the local backend) and the caller: `on_chunk` always runs on the
	/// task awaiting this future, never on the producer's thread.
	///
	/// Returns the full text.
	pub async fn collect_with_chunks(mut self, mut on_chunk: impl FnMut(&str)) -> Result<String> {
		let mut text = String::new();
		while let Some(event) = self.next().await {
			match event? {
				CompletionStreamEvent::Chunk(chunk) => {
					on_chunk(&chunk);
					text.push_str(&chunk);
				}
				CompletionStreamEvent::End(end) => {
					if text.is_empty() {
						text = end.text;
					}
					break;
				}
			}
		}
		Ok(text)
	}
}

impl Stream for CompletionStream {
	type Item = Result<CompletionStreamEvent>;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		self.inner_stream.as_mut().poll_next(cx)
	}
}

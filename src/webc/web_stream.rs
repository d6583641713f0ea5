use crate::webc::Error;
use bytes::Bytes;
use futures::stream::TryStreamExt;
use futures::{Future, Stream};
use reqwest::{RequestBuilder, Response};
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// WebStream is a simple web stream implementation that splits the response body by a given delimiter
/// as bytes arrive, without waiting for the full body.
/// - OpenAI-style servers frame streamed completions as `data: <json>` lines, so the completion
///   streamer uses `"\n"` as delimiter and interprets the lines itself.
/// - Splitting is done on raw bytes, so a multi-byte UTF-8 character cut between two network chunks
///   is reassembled before being decoded.
/// - Empty messages (e.g., the blank line between two server-sent events) are skipped.
/// - A non-success HTTP status is reported as the first (and only) item, as an error.
#[allow(clippy::type_complexity)]
pub struct WebStream {
	message_delimiter: &'static str,
	reqwest_builder: Option<RequestBuilder>,
	response_future: Option<Pin<Box<dyn Future<Output = Result<Response, BoxError>> + Send>>>,
	bytes_stream: Option<Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>>,
	// Bytes received after the last delimiter
	partial_message: Vec<u8>,
	// If a poll retrieved multiple messages, we keep them to be sent in the next poll
	remaining_messages: VecDeque<String>,
}

impl WebStream {
	pub fn new_with_delimiter(reqwest_builder: RequestBuilder, message_delimiter: &'static str) -> Self {
		Self {
			message_delimiter,
			reqwest_builder: Some(reqwest_builder),
			response_future: None,
			bytes_stream: None,
			partial_message: Vec::new(),
			remaining_messages: VecDeque::new(),
		}
	}
}

impl Stream for WebStream {
	type Item = Result<String, BoxError>;

	fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		let this = self.get_mut();

		// -- First, we check if we have any remaining messages to send.
		if let Some(msg) = this.remaining_messages.pop_front() {
			return Poll::Ready(Some(Ok(msg)));
		}

		// -- Then execute the web poll and processing loop
		loop {
			if let Some(ref mut fut) = this.response_future {
				match Pin::new(fut).poll(cx) {
					Poll::Ready(Ok(response)) => {
						let bytes_stream = response.bytes_stream().map_err(|e| Box::new(e) as BoxError);
						this.bytes_stream = Some(Box::pin(bytes_stream));
						this.response_future = None;
					}
					Poll::Ready(Err(e)) => {
						this.response_future = None;
						return Poll::Ready(Some(Err(e)));
					}
					Poll::Pending => return Poll::Pending,
				}
			}

			if let Some(ref mut stream) = this.bytes_stream {
				match stream.as_mut().poll_next(cx) {
					Poll::Ready(Some(Ok(bytes))) => {
						let messages = process_buff_delimited(
							&bytes,
							&mut this.partial_message,
							this.message_delimiter.as_bytes(),
						);
						this.remaining_messages.extend(messages);

						if let Some(first_message) = this.remaining_messages.pop_front() {
							return Poll::Ready(Some(Ok(first_message)));
						} else {
							continue;
						}
					}
					Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
					Poll::Ready(None) => {
						this.bytes_stream = None;
						let partial = std::mem::take(&mut this.partial_message);
						if !partial.is_empty() {
							return Poll::Ready(Some(Ok(String::from_utf8_lossy(&partial).into_owned())));
						}
					}
					Poll::Pending => return Poll::Pending,
				}
			}

			if let Some(reqwest_builder) = this.reqwest_builder.take() {
				let fut = async move {
					let response = reqwest_builder.send().await?;
					let status = response.status();
					if !status.is_success() {
						let body = response.text().await.unwrap_or_default();
						return Err(Box::new(Error::ResponseFailedStatus { status, body }) as BoxError);
					}
					Ok::<Response, BoxError>(response)
				};
				this.response_future = Some(Box::pin(fut));
				continue;
			}

			return Poll::Ready(None);
		}
	}
}

/// Append `bytes` to the pending partial message and drain every complete (delimited) message.
/// What follows the last delimiter stays in `partial_message` for the next call.
fn process_buff_delimited(bytes: &[u8], partial_message: &mut Vec<u8>, delimiter: &[u8]) -> Vec<String> {
	partial_message.extend_from_slice(bytes);

	let mut messages = Vec::new();
	let mut start = 0;
	while let Some(pos) = find_subslice(&partial_message[start..], delimiter) {
		let end = start + pos;
		let message = &partial_message[start..end];
		if !message.is_empty() {
			messages.push(String::from_utf8_lossy(message).into_owned());
		}
		start = end + delimiter.len();
	}
	partial_message.drain(..start);

	messages
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
	if needle.is_empty() || haystack.len() < needle.len() {
		return None;
	}
	haystack.windows(needle.len()).position(|window| window == needle)
}

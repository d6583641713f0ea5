use crate::webc::{Error, Result};
use reqwest::{RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct WebClient {
	reqwest_client: reqwest::Client,
}

/// Constructors
impl WebClient {
	pub fn from_reqwest_client(reqwest_client: reqwest::Client) -> Self {
		Self { reqwest_client }
	}
}

/// Web method implementations
impl WebClient {
	pub async fn do_get(
		&self,
		url: &str,
		headers: &[(String, String)],
		timeout: Option<Duration>,
	) -> Result<WebResponse> {
		let reqwest_builder = with_headers_and_timeout(self.reqwest_client.get(url), headers, timeout);
		let reqwest_res = reqwest_builder.send().await?;
		WebResponse::from_reqwest_response(reqwest_res).await
	}

	pub async fn do_post(
		&self,
		url: &str,
		headers: &[(String, String)],
		content: &Value,
		timeout: Option<Duration>,
	) -> Result<WebResponse> {
		let reqwest_builder = self.new_req_builder(url, headers, content, timeout);
		let reqwest_res = reqwest_builder.send().await?;
		WebResponse::from_reqwest_response(reqwest_res).await
	}

	/// Build the POST request without sending it (used for streams).
	pub fn new_req_builder(
		&self,
		url: &str,
		headers: &[(String, String)],
		content: &Value,
		timeout: Option<Duration>,
	) -> RequestBuilder {
		let reqwest_builder = self.reqwest_client.post(url).json(content);
		with_headers_and_timeout(reqwest_builder, headers, timeout)
	}
}

fn with_headers_and_timeout(
	mut reqwest_builder: RequestBuilder,
	headers: &[(String, String)],
	timeout: Option<Duration>,
) -> RequestBuilder {
	for (k, v) in headers {
		reqwest_builder = reqwest_builder.header(k, v);
	}
	if let Some(timeout) = timeout {
		reqwest_builder = reqwest_builder.timeout(timeout);
	}
	reqwest_builder
}

// region:    --- WebResponse

#[derive(Debug)]
pub struct WebResponse {
	pub status: StatusCode,
	pub body: Value,
}

impl WebResponse {
	/// Note: For now, assume only JSON response bodies.
	pub(crate) async fn from_reqwest_response(res: reqwest::Response) -> Result<WebResponse> {
		let status = res.status();
		let body = res.text().await?;

		if !status.is_success() {
			return Err(Error::ResponseFailedStatus { status, body });
		}

		let body: Value = match serde_json::from_str(&body) {
			Ok(value) => value,
			Err(cause) => return Err(Error::ResponseFailedNotJson { body, cause }),
		};

		Ok(WebResponse { status, body })
	}
}

// endregion: --- WebResponse

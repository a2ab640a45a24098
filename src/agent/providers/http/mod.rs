use std::collections::VecDeque;
use std::fmt::Display;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt, stream};
use log::{debug, warn};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};

use crate::agent::config::OpenAiSettings;
use crate::agent::error::ChatError;
use crate::agent::message::Message;

use super::{ChatCompletion, Fragment, FragmentStream};

mod models;
mod sse;

pub use sse::SseDecoder;

/// `ChatCompletion` 的 HTTP 實作，適用於任何 OpenAI 相容的 `/chat/completions` 端點。
pub struct OpenAiClient {
    /// `reqwest` 的非同步 HTTP 客戶端。
    client: Client,
    base_url: String,
    /// 未設定時不送出 Authorization 標頭（本地伺服器通常不需要）。
    api_key: Option<String>,
}

impl OpenAiClient {
    pub fn new(settings: &OpenAiSettings) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("failed to build HTTP client")?;
        let api_key = settings.resolved_api_key();
        if api_key.is_none() {
            warn!("No OpenAI API key configured, requests will be sent without Authorization");
        }
        Ok(Self {
            client,
            base_url: settings.base_url.trim().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ChatCompletion for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn request(&self, model: &str, messages: &[Message]) -> Result<FragmentStream, ChatError> {
        let payload = models::ChatCompletionPayload {
            model,
            messages,
            stream: true,
        };
        let headers = build_headers(self.api_key.as_deref())?;
        debug!(
            "POST {} model={} messages={}",
            self.endpoint(),
            model,
            messages.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .headers(headers)
            .json(&payload)
            .send()
            .await
            .map_err(|err| ChatError::request(format!("HTTP request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ChatError::RequestFailed(describe_status(status, &text)));
        }

        Ok(fragment_stream(Box::pin(response.bytes_stream())))
    }
}

fn build_headers(api_key: Option<&str>) -> Result<HeaderMap, ChatError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
    if let Some(api_key) = api_key {
        let value = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|err| ChatError::request(format!("invalid API key: {err}")))?;
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}

fn describe_status(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<models::ApiErrorBody>(body)
        .map(|parsed| parsed.error.describe())
        .unwrap_or_else(|_| body.trim().to_string());
    if detail.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {detail}")
    }
}

/// Turns a raw SSE byte stream into fragments, ending at `[DONE]`, at the end
/// of the body, or right after the first transport error.
pub fn fragment_stream<S, B, E>(bytes: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]>,
    E: Display,
{
    struct State<S> {
        bytes: S,
        decoder: SseDecoder,
        pending: VecDeque<Result<Fragment, ChatError>>,
        exhausted: bool,
    }

    let state = State {
        bytes,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        exhausted: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.exhausted || state.decoder.is_done() {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let decoded = state.decoder.push(chunk.as_ref());
                    state.pending.extend(decoded);
                }
                Some(Err(err)) => {
                    state.exhausted = true;
                    state.pending.push_back(Err(ChatError::request(format!(
                        "stream interrupted: {err}"
                    ))));
                }
                None => {
                    state.exhausted = true;
                    let rest = state.decoder.finish();
                    state.pending.extend(rest);
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stops_after_transport_error() {
        let chunks: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n".to_vec()),
            Err(String::from("connection reset")),
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\n".to_vec()),
        ];
        let items: Vec<_> = fragment_stream(stream::iter(chunks)).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok(Some("a".to_string())));
        assert_eq!(
            items[1],
            Err(ChatError::RequestFailed(
                "stream interrupted: connection reset".into()
            ))
        );
    }

    #[test]
    fn status_errors_use_api_message() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(
            describe_status(StatusCode::UNAUTHORIZED, body),
            "HTTP 401 Unauthorized: invalid_request_error: Incorrect API key provided"
        );
        assert_eq!(
            describe_status(StatusCode::BAD_GATEWAY, ""),
            "HTTP 502 Bad Gateway"
        );
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let settings = OpenAiSettings {
            api_key: String::from("sk-test"),
            base_url: String::from("http://localhost:8080/v1/"),
        };
        let client = OpenAiClient::new(&settings).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/chat/completions");
    }
}

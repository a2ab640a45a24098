//! Incremental server-sent-events decoding for streamed completions.

use serde_json::Value;

use super::models::{ApiErrorBody, ChatCompletionChunk};
use crate::agent::error::ChatError;
use crate::agent::providers::Fragment;

/// Splits a byte stream into SSE events and maps each event to a fragment.
///
/// Bytes may arrive cut at any position, including inside a UTF-8 sequence;
/// events are only decoded once their terminating blank line has arrived.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<Fragment, ChatError>> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();
        while !self.done {
            let Some((pos, delim_len)) = find_double_newline(&self.buffer) else {
                break;
            };
            let event = self.buffer.drain(..pos).collect::<Vec<u8>>();
            self.buffer.drain(..delim_len);
            if let Some(item) = self.decode_event(&String::from_utf8_lossy(&event)) {
                out.push(item);
            }
        }
        out
    }

    /// Decodes whatever is left once the body ends without a trailing blank line.
    pub fn finish(&mut self) -> Vec<Result<Fragment, ChatError>> {
        if self.done || self.buffer.iter().all(|b| b.is_ascii_whitespace()) {
            self.buffer.clear();
            return Vec::new();
        }
        let rest = std::mem::take(&mut self.buffer);
        self.decode_event(&String::from_utf8_lossy(&rest))
            .into_iter()
            .collect()
    }

    /// `true` once the `[DONE]` sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn decode_event(&mut self, event: &str) -> Option<Result<Fragment, ChatError>> {
        let data = event
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim)
            .collect::<Vec<_>>()
            .join("\n");
        let data = data.trim();
        if data.is_empty() {
            return None;
        }
        if data == "[DONE]" {
            self.done = true;
            return None;
        }

        let value: Value = match serde_json::from_str(data) {
            Ok(value) => value,
            Err(err) => {
                return Some(Err(ChatError::request(format!(
                    "failed to parse stream event: {err}"
                ))));
            }
        };
        if value.get("error").is_some() {
            let message = serde_json::from_value::<ApiErrorBody>(value)
                .map(|body| body.error.describe())
                .unwrap_or_else(|_| String::from("backend reported an error mid-stream"));
            return Some(Err(ChatError::RequestFailed(message)));
        }
        match serde_json::from_value::<ChatCompletionChunk>(value) {
            Ok(chunk) => Some(Ok(chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content))),
            Err(err) => Some(Err(ChatError::request(format!(
                "unexpected stream event: {err}"
            )))),
        }
    }
}

/// Position and length of the first blank-line delimiter, LF or CRLF.
fn find_double_newline(buffer: &[u8]) -> Option<(usize, usize)> {
    let crlf = buffer.windows(4).position(|w| w == b"\r\n\r\n");
    let lf = buffer.windows(2).position(|w| w == b"\n\n");
    match (crlf, lf) {
        (Some(c), Some(l)) if l <= c => Some((l, 2)),
        (Some(c), _) => Some((c, 4)),
        (None, Some(l)) => Some((l, 2)),
        (None, None) => None,
    }
}

//! Request and response bodies of the OpenAI-compatible chat completions API.
//! 此模組包含 OpenAI 相容 API 的請求與串流回應結構。

use serde::{Deserialize, Serialize};

use crate::agent::message::Message;

#[derive(Serialize)]
pub struct ChatCompletionPayload<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub stream: bool,
}

/// One `data:` event of a streamed completion.
#[derive(Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

/// Error envelope used both for non-2xx bodies and for errors sent mid-stream.
#[derive(Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl ApiErrorDetail {
    pub fn describe(&self) -> String {
        match &self.kind {
            Some(kind) if !kind.is_empty() => format!("{kind}: {}", self.message),
            _ => self.message.clone(),
        }
    }
}

//! Completion backends.
//!
//! Each backend implements [`ChatCompletion`] and hands back a pull-based
//! [`FragmentStream`]; the dispatcher never sees transport details.

/// `http` 模組：OpenAI 相容的串流 HTTP 後端。
pub mod http;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::agent::error::ChatError;
use crate::agent::message::Message;

/// One streamed piece of generated text. `None` marks an event that carried no
/// text (role headers, keep-alives) and is skipped by the consumer.
pub type Fragment = Option<String>;

/// A lazy, finite, non-restartable sequence of fragments. The stream ending is
/// the end-of-response marker.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment, ChatError>> + Send>>;

/// The model backend.
///
/// `request` resolves once the backend has accepted the request; the body is
/// pulled afterwards through the returned stream.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Name shown in logs and the status bar.
    fn name(&self) -> &str;

    async fn request(&self, model: &str, messages: &[Message]) -> Result<FragmentStream, ChatError>;
}

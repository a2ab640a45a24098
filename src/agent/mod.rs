//! 對話引擎：代理目錄、會話狀態、請求排程與串流彙整。
//!
//! The interactive loop owns the directory and the session; everything that
//! talks to the network runs on the dispatcher's worker lane and reports back
//! through the inbox.

/// `config` 模組：代理設定與 `quickchat.toml` 的讀寫。
pub mod config;

/// `directory` 模組：以暱稱為鍵的代理目錄，以及 `@nickname` 指令解析。
pub mod directory;

/// `dispatcher` 模組：單一工作通道，依序執行補全請求。
pub mod dispatcher;

pub mod error;

/// `message` 模組：送往模型的對話訊息格式。
pub mod message;

/// `providers` 模組：補全後端的抽象與 HTTP 實作。
pub mod providers;

pub mod session;

/// `stream` 模組：節流後的串流文字彙整。
pub mod stream;

pub use config::{
    Agent, AgentMap, AppConfig, ConfigStore, DEFAULT_AGENT, FileConfigStore, MemoryConfigStore,
};
pub use directory::{AgentDirectory, Directive};
pub use dispatcher::{DispatchEvent, JobHandle, JobId, JobOutcome, PendingJob, RequestDispatcher};
pub use error::{ChatError, ChatResult};
pub use message::{Message, Role};
pub use providers::ChatCompletion;
pub use session::Session;
pub use stream::{SnapshotSink, StreamAggregator, StreamFailure};

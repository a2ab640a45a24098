/// Errors raised by the conversation engine.
///
/// None of these are fatal: the interactive loop reports each one inline as a
/// system entry and keeps running.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// The completion backend failed (network, auth, rate limit, bad stream).
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("agent `{0}` already exists")]
    DuplicateKey(String),
    #[error("agent `{0}` cannot be removed")]
    ProtectedKey(String),
    #[error("agent `{0}` not found")]
    NotFound(String),
    #[error("please enter a message")]
    EmptyMessage,
    #[error("invalid agent: {0}")]
    InvalidAgent(String),
    /// The config store refused to persist a change.
    #[error("failed to save config: {0}")]
    Persist(String),
}

impl ChatError {
    pub fn request(err: impl std::fmt::Display) -> Self {
        Self::RequestFailed(err.to_string())
    }
}

pub type ChatResult<T> = Result<T, ChatError>;

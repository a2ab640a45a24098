//! Core state of the chat window.
//!
//! `App` is the interactive context: it alone owns the session, the agent
//! directory and the transcript. Background work reaches it only through the
//! inbox.

use std::collections::HashMap;
use std::sync::Arc;

use crate::agent::config::OpenAiSettings;
use crate::agent::{
    Agent, AgentDirectory, AppConfig, ChatCompletion, ConfigStore, JobId, RequestDispatcher,
    Session,
};
use crate::hotkey::HotkeyManager;
use crate::panels::chat::ChatTranscript;
use crate::visibility::VisibilityController;

/// Builds the completion backend from the current settings. Called at startup
/// and again whenever `/set api_key` or `/set base_url` changes them.
pub type ClientFactory =
    Box<dyn Fn(&OpenAiSettings) -> anyhow::Result<Arc<dyn ChatCompletion>> + Send + Sync>;

pub struct App {
    // --- Core State ---
    pub should_quit: bool,
    pub transcript: ChatTranscript,
    pub composer: ChatComposer,
    /// The message currently displayed in the status bar.
    pub status_message: String,

    // --- Conversation ---
    pub(crate) config: AppConfig,
    pub(crate) store: Arc<dyn ConfigStore>,
    pub(crate) directory: AgentDirectory,
    pub(crate) session: Session,
    pub(crate) dispatcher: RequestDispatcher,
    pub(crate) client_factory: ClientFactory,
    /// Jobs submitted but not finished yet.
    pub(crate) in_flight: HashMap<JobId, InFlight>,

    // --- Window ---
    pub(crate) visibility: VisibilityController,
    pub(crate) hotkeys: HotkeyManager,
}

/// What the interactive side remembers about a submitted job.
#[derive(Debug, Clone)]
pub(crate) struct InFlight {
    pub agent: String,
    pub generation: u64,
}

impl App {
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn directory(&self) -> &AgentDirectory {
        &self.directory
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn visibility(&self) -> &VisibilityController {
        &self.visibility
    }

    pub fn is_visible(&self) -> bool {
        self.visibility.is_visible()
    }

    /// Jobs waiting on or running in the worker lane.
    pub fn queued(&self) -> usize {
        self.dispatcher.queued()
    }

    /// Submitted jobs whose `Finished` event has not been applied yet.
    pub fn pending_replies(&self) -> usize {
        self.in_flight.len()
    }

    /// The agent the session is talking to. Falls back to `default` if the
    /// session names an agent that no longer exists.
    pub fn active_agent(&self) -> &Agent {
        self.directory
            .resolve(self.session.agent_id())
            .unwrap_or_else(|_| self.directory.default_agent())
    }

    pub fn hotkey_label(&self) -> String {
        self.visibility
            .registration()
            .map(|registration| registration.binding().to_string())
            .unwrap_or_else(|| String::from("none"))
    }
}

/// Multi-line input box with a recall history.
#[derive(Clone, Default)]
pub struct ChatComposer {
    buffer: String,
    cursor: usize,
    history: Vec<String>,
    history_index: Option<usize>,
}

impl ChatComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn is_browsing_history(&self) -> bool {
        self.history_index.is_some()
    }

    pub fn insert_char(&mut self, ch: char) {
        self.buffer.insert(self.cursor, ch);
        self.cursor += ch.len_utf8();
        self.history_index = None;
    }

    pub fn insert_newline(&mut self) {
        self.insert_char('\n');
    }

    pub fn backspace(&mut self) {
        if let Some((idx, _)) = self.buffer[..self.cursor].char_indices().next_back() {
            self.buffer.drain(idx..self.cursor);
            self.cursor = idx;
            self.history_index = None;
        }
    }

    pub fn delete(&mut self) {
        if let Some(ch) = self.buffer[self.cursor..].chars().next() {
            self.buffer.drain(self.cursor..self.cursor + ch.len_utf8());
            self.history_index = None;
        }
    }

    pub fn move_left(&mut self) {
        if let Some((idx, _)) = self.buffer[..self.cursor].char_indices().next_back() {
            self.cursor = idx;
        }
    }

    pub fn move_right(&mut self) {
        if let Some(ch) = self.buffer[self.cursor..].chars().next() {
            self.cursor += ch.len_utf8();
        }
    }

    pub fn move_to_line_start(&mut self) {
        self.cursor = self.buffer[..self.cursor]
            .rfind('\n')
            .map_or(0, |pos| pos + 1);
    }

    pub fn move_to_line_end(&mut self) {
        self.cursor = self.buffer[self.cursor..]
            .find('\n')
            .map_or(self.buffer.len(), |pos| self.cursor + pos);
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
        self.history_index = None;
    }

    /// Empties the buffer and returns its content, remembering non-blank input.
    pub fn take(&mut self) -> String {
        let content = std::mem::take(&mut self.buffer);
        if !content.trim().is_empty() && self.history.last() != Some(&content) {
            self.history.push(content.clone());
        }
        self.cursor = 0;
        self.history_index = None;
        content
    }

    pub fn history_previous(&mut self) -> bool {
        if self.history.is_empty() {
            return false;
        }
        let target = match self.history_index {
            Some(idx) => idx.saturating_sub(1),
            None => self.history.len() - 1,
        };
        self.load_history(target)
    }

    pub fn history_next(&mut self) -> bool {
        match self.history_index {
            Some(idx) if idx + 1 < self.history.len() => self.load_history(idx + 1),
            Some(_) => {
                self.clear();
                true
            }
            None => false,
        }
    }

    fn load_history(&mut self, index: usize) -> bool {
        let Some(entry) = self.history.get(index) else {
            return false;
        };
        self.buffer = entry.clone();
        self.cursor = self.buffer.len();
        self.history_index = Some(index);
        true
    }

    /// The (col, row) of the cursor once the buffer is wrapped at `width` cells.
    pub fn cursor_display_position(&self, width: usize) -> (u16, u16) {
        if width == 0 {
            return (0, 0);
        }
        let mut col = 0usize;
        let mut row = 0usize;
        for ch in self.buffer[..self.cursor].chars() {
            if ch == '\n' {
                row += 1;
                col = 0;
                continue;
            }
            let char_width = unicode_width::UnicodeWidthChar::width(ch)
                .unwrap_or(1)
                .max(1);
            if col + char_width > width {
                row += 1;
                col = 0;
            }
            col += char_width;
            if col >= width {
                row += 1;
                col = 0;
            }
        }
        (col as u16, row as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(text: &str) -> ChatComposer {
        let mut composer = ChatComposer::new();
        text.chars().for_each(|ch| composer.insert_char(ch));
        composer
    }

    #[test]
    fn editing_handles_multibyte_text() {
        let mut composer = typed("你好ab");
        composer.move_left();
        composer.move_left();
        composer.backspace();
        assert_eq!(composer.buffer(), "你ab");
        composer.move_to_line_start();
        composer.delete();
        assert_eq!(composer.buffer(), "ab");
        composer.move_to_line_end();
        composer.insert_newline();
        composer.insert_char('c');
        assert_eq!(composer.buffer(), "ab\nc");
        assert_eq!(composer.cursor_display_position(10), (1, 1));
    }

    #[test]
    fn history_recall_walks_back_and_forth() {
        let mut composer = typed("first");
        composer.take();
        "second".chars().for_each(|ch| composer.insert_char(ch));
        composer.take();
        composer.take();

        assert!(composer.history_previous());
        assert_eq!(composer.buffer(), "second");
        assert!(composer.history_previous());
        assert_eq!(composer.buffer(), "first");
        assert!(composer.history_previous());
        assert_eq!(composer.buffer(), "first");
        assert!(composer.history_next());
        assert_eq!(composer.buffer(), "second");
        assert!(composer.history_next());
        assert!(composer.is_empty());
        assert!(!composer.history_next());
    }

    #[test]
    fn wide_characters_wrap() {
        let composer = typed("你好世界");
        assert_eq!(composer.cursor_display_position(4), (0, 2));
    }
}

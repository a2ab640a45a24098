use crate::agent::JobId;

/// 對話面板中單一可顯示的條目。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEntry {
    /// 使用者送出的訊息，`agent` 為處理它的代理暱稱。
    User { agent: String, text: String },
    /// 模型的回覆。`job` 為 `Some` 時表示仍在串流中。
    Assistant {
        agent: String,
        text: String,
        job: Option<JobId>,
    },
    /// 系統產生的提示訊息。
    Info { title: String, detail: String },
    /// 系統產生的錯誤訊息。
    Error { title: String, detail: String },
}

impl TranscriptEntry {
    pub fn text(&self) -> &str {
        match self {
            TranscriptEntry::User { text, .. } | TranscriptEntry::Assistant { text, .. } => text,
            TranscriptEntry::Info { detail, .. } | TranscriptEntry::Error { detail, .. } => detail,
        }
    }
}

/// The scrollable transcript shown above the composer.
///
/// Selection doubles as the scroll position; pushing an entry follows the tail.
#[derive(Debug, Default)]
pub struct ChatTranscript {
    entries: Vec<TranscriptEntry>,
    selected: usize,
}

impl ChatTranscript {
    pub fn with_greeting(agent: &str, model: &str) -> Self {
        let mut transcript = Self::default();
        transcript.push_info("QuickChat", greeting(agent, model));
        transcript
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.selected = 0;
    }

    pub fn push_user(&mut self, agent: impl Into<String>, text: impl Into<String>) {
        self.push(TranscriptEntry::User {
            agent: agent.into(),
            text: text.into(),
        });
    }

    pub fn push_info(&mut self, title: impl Into<String>, detail: impl Into<String>) {
        self.push(TranscriptEntry::Info {
            title: title.into(),
            detail: detail.into(),
        });
    }

    pub fn push_error(&mut self, title: impl Into<String>, detail: impl Into<String>) {
        self.push(TranscriptEntry::Error {
            title: title.into(),
            detail: detail.into(),
        });
    }

    /// Opens an empty reply for `job`, filled in by later snapshots.
    pub fn open_reply(&mut self, job: JobId, agent: impl Into<String>) {
        self.push(TranscriptEntry::Assistant {
            agent: agent.into(),
            text: String::new(),
            job: Some(job),
        });
    }

    /// Replaces the text of `job`'s open reply. Returns `false` when the reply
    /// is gone, e.g. after the transcript was cleared.
    pub fn update_reply(&mut self, job: JobId, snapshot: &str) -> bool {
        match self.reply_mut(job) {
            Some(text) => {
                snapshot.clone_into(text);
                true
            }
            None => false,
        }
    }

    /// Finalizes `job`'s reply with `text`, or drops the entry when `text` is
    /// `None`.
    pub fn close_reply(&mut self, job: JobId, text: Option<&str>) {
        let Some(index) = self.reply_index(job) else {
            return;
        };
        match text {
            Some(final_text) => {
                if let TranscriptEntry::Assistant { text, job, .. } = &mut self.entries[index] {
                    final_text.clone_into(text);
                    *job = None;
                }
            }
            None => {
                self.entries.remove(index);
                self.clamp_selection();
            }
        }
    }

    pub fn has_open_reply(&self, job: JobId) -> bool {
        self.reply_index(job).is_some()
    }

    pub fn move_selection(&mut self, delta: isize) {
        if self.entries.is_empty() {
            return;
        }
        let last = self.entries.len() as isize - 1;
        self.selected = (self.selected as isize + delta).clamp(0, last) as usize;
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
        self.selected = self.entries.len() - 1;
    }

    fn reply_index(&self, job: JobId) -> Option<usize> {
        self.entries.iter().rposition(|entry| {
            matches!(entry, TranscriptEntry::Assistant { job: Some(open), .. } if *open == job)
        })
    }

    fn reply_mut(&mut self, job: JobId) -> Option<&mut String> {
        let index = self.reply_index(job)?;
        match &mut self.entries[index] {
            TranscriptEntry::Assistant { text, .. } => Some(text),
            _ => None,
        }
    }

    fn clamp_selection(&mut self) {
        self.selected = self.selected.min(self.entries.len().saturating_sub(1));
    }
}

pub fn greeting(agent: &str, model: &str) -> String {
    format!("Talking to @{agent} ({model}). Start a line with @nickname to switch agents, /help for commands.")
}

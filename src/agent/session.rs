use super::config::Agent;
use super::message::Message;

/// The conversation currently held with one agent.
///
/// `history[0]` is always the active agent's system prompt. Every reset bumps
/// `generation`, which lets late replies from an older conversation be told
/// apart from replies to the current one.
#[derive(Debug, Clone)]
pub struct Session {
    agent_id: String,
    history: Vec<Message>,
    generation: u64,
}

impl Session {
    pub fn new(agent: &Agent) -> Self {
        Self {
            agent_id: agent.nickname.clone(),
            history: vec![Message::system(agent.system_prompt.clone())],
            generation: 0,
        }
    }

    /// Starts over with `agent`, keeping only its system prompt.
    pub fn reset(&mut self, agent: &Agent) {
        self.agent_id = agent.nickname.clone();
        self.history = vec![Message::system(agent.system_prompt.clone())];
        self.generation += 1;
    }

    pub fn append_user(&mut self, content: impl Into<String>) {
        self.history.push(Message::user(content));
    }

    pub fn append_assistant(&mut self, content: impl Into<String>) {
        self.history.push(Message::assistant(content));
    }

    /// An owned copy of the history, detached from later resets.
    pub fn snapshot(&self) -> Vec<Message> {
        self.history.clone()
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

//! The persona table and the `@nickname` directive parser.

use std::sync::Arc;

use log::{debug, info, warn};

use super::config::{Agent, AgentMap, ConfigStore, DEFAULT_AGENT};
use super::error::{ChatError, ChatResult};

/// Result of scanning user input for a leading `@nickname`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// The agent that should answer this message.
    pub agent: Agent,
    /// The message body to send.
    pub remainder: String,
    /// `true` whenever the input started with `@`, even if the nickname was unknown.
    pub matched: bool,
}

/// All configured personas, keyed by nickname.
///
/// Every mutation is written through the config store before it returns, and
/// rolled back in memory if the write fails.
pub struct AgentDirectory {
    agents: AgentMap,
    store: Arc<dyn ConfigStore>,
}

impl AgentDirectory {
    pub fn new(mut agents: AgentMap, store: Arc<dyn ConfigStore>) -> Self {
        // The table key is what `@nickname` resolves, so it wins over the field.
        for (key, agent) in agents.iter_mut() {
            if agent.nickname != *key {
                warn!(
                    "Agent `{key}` declares nickname `{}`, using `{key}`",
                    agent.nickname
                );
                agent.nickname = key.clone();
            }
        }
        agents
            .entry(DEFAULT_AGENT.to_string())
            .or_insert_with(Agent::builtin_default);
        Self { agents, store }
    }

    pub fn resolve(&self, nickname: &str) -> ChatResult<&Agent> {
        self.agents
            .get(nickname)
            .ok_or_else(|| ChatError::NotFound(nickname.to_string()))
    }

    pub fn default_agent(&self) -> &Agent {
        // `new` and `delete` keep the default entry in place.
        &self.agents[DEFAULT_AGENT]
    }

    pub fn contains(&self, nickname: &str) -> bool {
        self.agents.contains_key(nickname)
    }

    /// Agents sorted by nickname.
    pub fn list(&self) -> Vec<&Agent> {
        self.agents.values().collect()
    }

    pub fn agents(&self) -> &AgentMap {
        &self.agents
    }

    /// Splits `@nickname rest` into the target agent and the message body.
    ///
    /// An unknown nickname falls back to the default agent and keeps the
    /// original input, `@token` included, as the body.
    pub fn parse_directive(&self, input: &str, current: &Agent) -> Directive {
        let Some(stripped) = input.strip_prefix('@') else {
            return Directive {
                agent: current.clone(),
                remainder: input.to_string(),
                matched: false,
            };
        };

        let (candidate, remainder) = match stripped.split_once(' ') {
            Some((candidate, rest)) => (candidate, rest),
            None => (stripped, ""),
        };

        match self.agents.get(candidate) {
            Some(agent) => {
                debug!("Directive selected agent `{}`", agent.nickname);
                Directive {
                    agent: agent.clone(),
                    remainder: remainder.to_string(),
                    matched: true,
                }
            }
            None => {
                debug!("Directive named unknown agent `{candidate}`, using default");
                Directive {
                    agent: self.default_agent().clone(),
                    remainder: input.to_string(),
                    matched: true,
                }
            }
        }
    }

    pub fn add(&mut self, agent: Agent) -> ChatResult<()> {
        validate(&agent)?;
        if self.agents.contains_key(&agent.nickname) {
            return Err(ChatError::DuplicateKey(agent.nickname));
        }
        let nickname = agent.nickname.clone();
        self.agents.insert(nickname.clone(), agent);
        if let Err(err) = self.persist() {
            self.agents.remove(&nickname);
            return Err(err);
        }
        info!("Added agent `{nickname}`");
        Ok(())
    }

    /// Replaces the prompt and model of an existing agent.
    pub fn update(&mut self, agent: Agent) -> ChatResult<()> {
        validate(&agent)?;
        let Some(slot) = self.agents.get_mut(&agent.nickname) else {
            return Err(ChatError::NotFound(agent.nickname));
        };
        let previous = std::mem::replace(slot, agent);
        let nickname = previous.nickname.clone();
        if let Err(err) = self.persist() {
            self.agents.insert(nickname, previous);
            return Err(err);
        }
        info!("Updated agent `{nickname}`");
        Ok(())
    }

    pub fn delete(&mut self, nickname: &str) -> ChatResult<Agent> {
        if nickname == DEFAULT_AGENT {
            return Err(ChatError::ProtectedKey(nickname.to_string()));
        }
        let removed = self
            .agents
            .remove(nickname)
            .ok_or_else(|| ChatError::NotFound(nickname.to_string()))?;
        if let Err(err) = self.persist() {
            self.agents.insert(removed.nickname.clone(), removed);
            return Err(err);
        }
        info!("Deleted agent `{nickname}`");
        Ok(removed)
    }

    fn persist(&self) -> ChatResult<()> {
        self.store
            .save_agents(&self.agents)
            .map_err(|err| ChatError::Persist(format!("{err:#}")))
    }
}

fn validate(agent: &Agent) -> ChatResult<()> {
    if agent.nickname.trim().is_empty()
        || agent.system_prompt.trim().is_empty()
        || agent.model.trim().is_empty()
    {
        return Err(ChatError::InvalidAgent(String::from(
            "nickname, prompt and model are all required",
        )));
    }
    if agent.nickname.contains(char::is_whitespace) || agent.nickname.starts_with('@') {
        return Err(ChatError::InvalidAgent(format!(
            "`{}` cannot be used as a nickname",
            agent.nickname
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::config::{AppConfig, MemoryConfigStore};

    fn directory_with_bob() -> (AgentDirectory, MemoryConfigStore) {
        let mut config = AppConfig::default();
        config
            .agents
            .insert("bob".into(), Agent::new("bob", "you are bob", "gpt-bob"));
        let store = MemoryConfigStore::new(config.clone());
        let directory = AgentDirectory::new(config.agents, Arc::new(store.clone()));
        (directory, store)
    }

    #[test]
    fn plain_input_keeps_current_agent() {
        let (directory, _) = directory_with_bob();
        let bob = directory.resolve("bob").unwrap().clone();
        let directive = directory.parse_directive("hello there", &bob);
        assert_eq!(directive.agent, bob);
        assert_eq!(directive.remainder, "hello there");
        assert!(!directive.matched);
    }

    #[test]
    fn known_nickname_is_stripped() {
        let (directory, _) = directory_with_bob();
        let current = directory.default_agent().clone();
        let directive = directory.parse_directive("@bob hello", &current);
        assert_eq!(directive.agent.nickname, "bob");
        assert_eq!(directive.remainder, "hello");
        assert!(directive.matched);
    }

    #[test]
    fn only_first_space_splits() {
        let (directory, _) = directory_with_bob();
        let current = directory.default_agent().clone();
        let directive = directory.parse_directive("@bob  two  spaces", &current);
        assert_eq!(directive.remainder, " two  spaces");
    }

    #[test]
    fn bare_nickname_has_empty_remainder() {
        let (directory, _) = directory_with_bob();
        let current = directory.default_agent().clone();
        let directive = directory.parse_directive("@bob", &current);
        assert_eq!(directive.agent.nickname, "bob");
        assert_eq!(directive.remainder, "");
        assert!(directive.matched);
    }

    #[test]
    fn unknown_nickname_falls_back_with_original_text() {
        let (directory, _) = directory_with_bob();
        let bob = directory.resolve("bob").unwrap().clone();
        let directive = directory.parse_directive("@unknown hi", &bob);
        assert_eq!(directive.agent.nickname, DEFAULT_AGENT);
        assert_eq!(directive.remainder, "@unknown hi");
        assert!(directive.matched);
    }

    #[test]
    fn default_is_protected() {
        let (mut directory, store) = directory_with_bob();
        assert_eq!(
            directory.add(Agent::new(DEFAULT_AGENT, "p", "m")),
            Err(ChatError::DuplicateKey(DEFAULT_AGENT.into()))
        );
        assert_eq!(
            directory.delete(DEFAULT_AGENT),
            Err(ChatError::ProtectedKey(DEFAULT_AGENT.into()))
        );
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn mutations_are_persisted_immediately() {
        let (mut directory, store) = directory_with_bob();
        directory.add(Agent::new("ann", "you are ann", "gpt-ann")).unwrap();
        assert!(store.snapshot().agents.contains_key("ann"));

        directory
            .update(Agent::new("ann", "you are ann v2", "gpt-ann-2"))
            .unwrap();
        assert_eq!(store.snapshot().agents["ann"].model, "gpt-ann-2");

        directory.delete("ann").unwrap();
        assert!(!store.snapshot().agents.contains_key("ann"));
        assert_eq!(store.save_count(), 3);
    }

    #[test]
    fn table_key_overrides_declared_nickname() {
        let mut agents = AgentMap::new();
        agents.insert("bob".into(), Agent::new("robert", "you are bob", "gpt-bob"));
        let store = MemoryConfigStore::new(AppConfig::default());
        let directory = AgentDirectory::new(agents, Arc::new(store));

        let current = directory.default_agent().clone();
        let directive = directory.parse_directive("@bob hi", &current);
        assert_eq!(directive.agent.nickname, "bob");
        assert_eq!(directory.resolve(&directive.agent.nickname).unwrap().model, "gpt-bob");
    }

    #[test]
    fn failed_persist_rolls_back() {
        let (mut directory, store) = directory_with_bob();
        store.fail_saves(true);

        let err = directory.add(Agent::new("ann", "p", "m")).unwrap_err();
        assert!(matches!(err, ChatError::Persist(_)));
        assert!(!directory.contains("ann"));

        directory
            .update(Agent::new("bob", "changed", "changed"))
            .unwrap_err();
        assert_eq!(directory.resolve("bob").unwrap().model, "gpt-bob");

        directory.delete("bob").unwrap_err();
        assert!(directory.contains("bob"));
    }

    #[test]
    fn rejects_incomplete_agents() {
        let (mut directory, _) = directory_with_bob();
        assert!(matches!(
            directory.add(Agent::new("ann", "  ", "m")),
            Err(ChatError::InvalidAgent(_))
        ));
        assert!(matches!(
            directory.add(Agent::new("two words", "p", "m")),
            Err(ChatError::InvalidAgent(_))
        ));
        assert_eq!(
            directory.update(Agent::new("ghost", "p", "m")),
            Err(ChatError::NotFound("ghost".into()))
        );
        assert_eq!(
            directory.delete("ghost"),
            Err(ChatError::NotFound("ghost".into()))
        );
    }

    #[test]
    fn missing_default_is_restored() {
        let store = MemoryConfigStore::default();
        let directory = AgentDirectory::new(AgentMap::new(), Arc::new(store));
        assert_eq!(directory.default_agent().nickname, DEFAULT_AGENT);
    }
}

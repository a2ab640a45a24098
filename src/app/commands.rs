//! Slash commands typed into the composer: agent management and settings.

use log::{info, warn};

use super::App;
use crate::agent::{Agent, ChatError};

pub const HELP: &str = "\
@nick message              send to another agent (starts a new conversation)
/new                       start a new conversation
/agents                    list agents
/agent add <nick> <model> <prompt...>
/agent update <nick> <model> <prompt...>
/agent delete <nick>
/set api_key <key>
/set base_url <url>
/set hotkey <combo>        e.g. alt+z, ctrl+shift+space
/hide                      hide the window (Esc does the same)
/quit                      exit (Ctrl+Q)
//text                     send a message that starts with /";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    New,
    Agents,
    AddAgent(Agent),
    UpdateAgent(Agent),
    DeleteAgent(String),
    Set(Setting, String),
    Hide,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    ApiKey,
    BaseUrl,
    Hotkey,
}

impl Command {
    /// Parses the text after the leading `/`. Errors carry a usage hint.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (name, rest) = split_word(line);
        match name {
            "help" | "?" => Ok(Command::Help),
            "new" => Ok(Command::New),
            "agents" => Ok(Command::Agents),
            "hide" => Ok(Command::Hide),
            "quit" | "exit" => Ok(Command::Quit),
            "agent" => parse_agent(rest),
            "set" => parse_set(rest),
            "" => Err(String::from("empty command, try /help")),
            other => Err(format!("unknown command `/{other}`, try /help")),
        }
    }
}

fn parse_agent(args: &str) -> Result<Command, String> {
    let (action, rest) = split_word(args);
    match action {
        "add" | "update" => {
            let (nickname, rest) = split_word(rest);
            let (model, prompt) = split_word(rest);
            if nickname.is_empty() || model.is_empty() || prompt.is_empty() {
                return Err(format!("usage: /agent {action} <nick> <model> <prompt...>"));
            }
            let agent = Agent::new(nickname.trim_start_matches('@'), prompt, model);
            Ok(if action == "add" {
                Command::AddAgent(agent)
            } else {
                Command::UpdateAgent(agent)
            })
        }
        "delete" | "remove" => {
            let (nickname, _) = split_word(rest);
            if nickname.is_empty() {
                return Err(String::from("usage: /agent delete <nick>"));
            }
            Ok(Command::DeleteAgent(
                nickname.trim_start_matches('@').to_string(),
            ))
        }
        _ => Err(String::from("usage: /agent add|update|delete ...")),
    }
}

fn parse_set(args: &str) -> Result<Command, String> {
    let (key, value) = split_word(args);
    let setting = match key {
        "api_key" => Setting::ApiKey,
        "base_url" => Setting::BaseUrl,
        "hotkey" => Setting::Hotkey,
        _ => return Err(String::from("usage: /set api_key|base_url|hotkey <value>")),
    };
    if value.is_empty() {
        return Err(format!("usage: /set {key} <value>"));
    }
    Ok(Command::Set(setting, value.to_string()))
}

/// First whitespace-separated word and the trimmed remainder.
fn split_word(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (text, ""),
    }
}

impl App {
    pub fn run_command(&mut self, line: &str) {
        match Command::parse(line) {
            Ok(command) => self.execute(command),
            Err(usage) => {
                self.status_message = usage.clone();
                self.transcript.push_error("Command", usage);
            }
        }
    }

    pub fn execute(&mut self, command: Command) {
        match command {
            Command::Help => {
                self.transcript.push_info("Commands", HELP);
                self.status_message = String::from("Commands listed");
            }
            Command::New => self.new_conversation(),
            Command::Agents => self.list_agents(),
            Command::AddAgent(agent) => {
                let nickname = agent.nickname.clone();
                match self.directory.add(agent) {
                    Ok(()) => self.announce("Agents", format!("Added @{nickname}")),
                    Err(err) => self.report(err),
                }
            }
            Command::UpdateAgent(agent) => self.update_agent(agent),
            Command::DeleteAgent(nickname) => self.delete_agent(&nickname),
            Command::Set(setting, value) => self.apply_setting(setting, &value),
            Command::Hide => self.hide_window(),
            Command::Quit => self.should_quit = true,
        }
    }

    fn list_agents(&mut self) {
        let active = self.session.agent_id().to_string();
        let listing = self
            .directory
            .list()
            .into_iter()
            .map(|agent| {
                let marker = if agent.nickname == active { "*" } else { " " };
                format!(
                    "{marker} @{} ({}): {}",
                    agent.nickname, agent.model, agent.system_prompt
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        self.transcript.push_info("Agents", listing);
        self.status_message = format!("{} agents", self.directory.agents().len());
    }

    fn update_agent(&mut self, agent: Agent) {
        let nickname = agent.nickname.clone();
        if let Err(err) = self.directory.update(agent) {
            self.report(err);
            return;
        }
        self.announce("Agents", format!("Updated @{nickname}"));
        if self.session.agent_id() == nickname {
            let updated = self.active_agent().clone();
            self.switch_agent(&updated);
        }
    }

    fn delete_agent(&mut self, nickname: &str) {
        if let Err(err) = self.directory.delete(nickname) {
            self.report(err);
            return;
        }
        self.announce("Agents", format!("Deleted @{nickname}"));
        if self.session.agent_id() == nickname {
            let fallback = self.directory.default_agent().clone();
            self.switch_agent(&fallback);
        }
    }

    fn apply_setting(&mut self, setting: Setting, value: &str) {
        let mut config = self.config.clone();
        match setting {
            Setting::ApiKey => config.openai.api_key = value.to_string(),
            Setting::BaseUrl => config.openai.base_url = value.to_string(),
            Setting::Hotkey => {
                let registration = match self.hotkeys.register(value) {
                    Ok(registration) => registration,
                    Err(err) => {
                        self.status_message = format!("Hotkey not changed: {err}");
                        self.transcript.push_error("Hotkey", format!("{err:#}"));
                        return;
                    }
                };
                config.hotkeys.show_window = registration.binding().to_string();
                self.visibility.rebind(registration);
            }
        }

        if matches!(setting, Setting::ApiKey | Setting::BaseUrl) {
            match (self.client_factory)(&config.openai) {
                Ok(client) => self.dispatcher.set_client(client),
                Err(err) => {
                    warn!("Keeping the old client: {err:#}");
                    self.status_message = format!("Setting not applied: {err}");
                    self.transcript.push_error("Settings", format!("{err:#}"));
                    return;
                }
            }
        }

        self.config = config;
        let mut persisted = self.config.clone();
        persisted.agents = self.directory.agents().clone();
        match self.store.save(&persisted) {
            Ok(()) => {
                let shown = match setting {
                    Setting::ApiKey => String::from("api_key updated"),
                    Setting::BaseUrl => format!("base_url = {}", self.config.openai.base_url),
                    Setting::Hotkey => format!("hotkey = {}", self.config.hotkeys.show_window),
                };
                info!("Setting changed: {shown}");
                self.announce("Settings", shown);
            }
            Err(err) => self.report(ChatError::Persist(format!("{err:#}"))),
        }
    }

    fn announce(&mut self, title: &str, text: String) {
        self.transcript.push_info(title, text.as_str());
        self.status_message = text;
    }
}

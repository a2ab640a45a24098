#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream;
use tokio::sync::Semaphore;

use quickchat::agent::config::OpenAiSettings;
use quickchat::agent::providers::FragmentStream;
use quickchat::agent::{
    Agent, AppConfig, ChatCompletion, ChatError, MemoryConfigStore, Message,
};
use quickchat::app::{App, ClientFactory};
use quickchat::event::{InboxReceiver, inbox};

pub const BOB_PROMPT: &str = "you are bob, answer in one line";

/// A backend driven by the model name:
/// `refuse` fails before streaming, `broken` fails halfway through,
/// anything else answers `reply-<n>` in two fragments.
#[derive(Default)]
pub struct ScriptedModel {
    calls: Mutex<Vec<(String, Vec<Message>)>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedModel {
    /// Every request waits for a permit from the returned semaphore.
    pub fn gated() -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let model = Self {
            calls: Mutex::default(),
            gate: Some(Arc::clone(&gate)),
        };
        (Arc::new(model), gate)
    }

    pub fn calls(&self) -> Vec<(String, Vec<Message>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatCompletion for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn request(&self, model: &str, messages: &[Message]) -> Result<FragmentStream, ChatError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((model.to_string(), messages.to_vec()));
            calls.len()
        };
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(ChatError::request)?
                .forget();
        }
        match model {
            "refuse" => Err(ChatError::RequestFailed(String::from("HTTP 401 Unauthorized"))),
            "broken" => Ok(Box::pin(stream::iter(vec![
                Ok(Some(String::from("half an "))),
                Err(ChatError::RequestFailed(String::from("stream interrupted"))),
            ]))),
            _ => Ok(Box::pin(stream::iter(vec![
                Ok(Some(String::from("reply-"))),
                Ok(None),
                Ok(Some(n.to_string())),
            ]))),
        }
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    for agent in [
        Agent::new("bob", BOB_PROMPT, "bob-model"),
        Agent::new("broken", "fails halfway", "broken"),
        Agent::new("locked", "fails at once", "refuse"),
    ] {
        config.agents.insert(agent.nickname.clone(), agent);
    }
    config
}

pub struct Harness {
    pub app: App,
    pub inbox: InboxReceiver,
    pub store: MemoryConfigStore,
    pub factory_calls: Arc<Mutex<Vec<OpenAiSettings>>>,
}

pub fn harness(model: Arc<ScriptedModel>) -> Harness {
    harness_with(test_config(), model)
}

pub fn harness_with(config: AppConfig, model: Arc<ScriptedModel>) -> Harness {
    let store = MemoryConfigStore::new(config.clone());
    let factory_calls = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&factory_calls);
    let factory: ClientFactory = Box::new(move |settings: &OpenAiSettings| {
        recorded.lock().unwrap().push(settings.clone());
        let client: Arc<dyn ChatCompletion> = model.clone();
        Ok(client)
    });
    let (tx, rx) = inbox();
    let app = App::new(config, Arc::new(store.clone()), factory, tx).unwrap();
    Harness {
        app,
        inbox: rx,
        store,
        factory_calls,
    }
}

impl Harness {
    /// Applies inbox traffic until every submitted job has finished.
    pub async fn settle(&mut self) {
        while self.app.pending_replies() > 0 {
            let inbound = self.inbox.recv().await.expect("inbox closed");
            self.app.handle_inbound(inbound);
        }
        self.app.drain_inbox(&mut self.inbox);
    }

    pub fn send(&mut self, text: &str) {
        self.app.composer.clear();
        text.chars().for_each(|ch| self.app.composer.insert_char(ch));
        self.app.submit_input();
    }
}

pub fn history(app: &App) -> Vec<(&'static str, String)> {
    app.session()
        .history()
        .iter()
        .map(|message| (message.role().as_str(), message.content().to_string()))
        .collect()
}

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, warn};

use super::{App, ChatComposer, ClientFactory};
use crate::agent::{AgentDirectory, AppConfig, ConfigStore, RequestDispatcher, Session};
use crate::event::InboxSender;
use crate::hotkey::HotkeyManager;
use crate::panels::chat::ChatTranscript;
use crate::visibility::{ToggleSignal, VisibilityController};

impl App {
    /// Creates the interactive state and starts the worker lane.
    ///
    /// Must be called inside a tokio runtime. `inbox` is the sender half of
    /// the queue the event loop drains into `handle_inbound`.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn ConfigStore>,
        client_factory: ClientFactory,
        inbox: InboxSender,
    ) -> Result<Self> {
        let client = client_factory(&config.openai).context("failed to build completion client")?;
        debug!("Initializing App with backend `{}`", client.name());

        let mut config = config;
        let directory = AgentDirectory::new(std::mem::take(&mut config.agents), store.clone());
        let session = Session::new(directory.default_agent());
        let transcript = ChatTranscript::with_greeting(
            &directory.default_agent().nickname,
            &directory.default_agent().model,
        );

        let signal = ToggleSignal::new(inbox.clone());
        let hotkeys = HotkeyManager::new(signal.clone());
        let mut visibility = VisibilityController::new(signal);
        let mut status_message = String::from("Enter to send, Shift+Enter for a new line, Ctrl+Q to quit");
        match hotkeys.register(&config.hotkeys.show_window) {
            Ok(registration) => visibility.rebind(registration),
            Err(err) => {
                warn!("Hotkey `{}` not registered: {err:#}", config.hotkeys.show_window);
                status_message = format!("Hotkey not registered: {err}");
            }
        }

        Ok(Self {
            should_quit: false,
            transcript,
            composer: ChatComposer::new(),
            status_message,
            config,
            store,
            directory,
            session,
            dispatcher: RequestDispatcher::spawn(client, inbox),
            client_factory,
            in_flight: HashMap::new(),
            visibility,
            hotkeys,
        })
    }
}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{Event as CrosstermEvent, EventStream};
use futures_util::StreamExt;
use log::{error, info};

use quickchat::agent::config::OpenAiSettings;
use quickchat::agent::providers::http::OpenAiClient;
use quickchat::agent::{ChatCompletion, ConfigStore, FileConfigStore};
use quickchat::app::{App, ClientFactory};
use quickchat::event::{Event, inbox};
use quickchat::tui::{init, restore};
use quickchat::ui::render;
use quickchat::logging;

const TICK_RATE: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> Result<()> {
    let root = workspace_root();
    logging::init(&root)?;

    let store = Arc::new(FileConfigStore::new(&root));
    let config = store.load()?;
    info!("Loaded config from {}", store.path().display());

    let client_factory: ClientFactory = Box::new(|settings: &OpenAiSettings| {
        let client: Arc<dyn ChatCompletion> = Arc::new(OpenAiClient::new(settings)?);
        Ok(client)
    });

    let (inbox_tx, mut inbox_rx) = inbox();
    let mut app = App::new(config, store, client_factory, inbox_tx)?;

    let mut tui = init().context("failed to set up the terminal")?;
    let mut stream = EventStream::new();
    let mut interval = tokio::time::interval(TICK_RATE);

    while !app.should_quit {
        tui.draw(|frame| render(frame, &app))?;

        let event = tokio::select! {
            _ = interval.tick() => Event::Tick,
            Some(inbound) = inbox_rx.recv() => Event::Inbound(inbound),
            maybe_event = stream.next() => {
                match maybe_event {
                    Some(Ok(CrosstermEvent::Key(key))) => Event::Key(key),
                    Some(Ok(CrosstermEvent::Resize(_, _))) => Event::Resize,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        error!("Terminal event stream failed: {err}");
                        break;
                    }
                    None => break,
                }
            }
        };

        match event {
            Event::Tick | Event::Resize => {}
            Event::Key(key) => app.handle_key(key),
            Event::Inbound(inbound) => {
                app.handle_inbound(inbound);
                app.drain_inbox(&mut inbox_rx);
            }
        }
    }

    restore()?;
    info!("QuickChat exited");
    Ok(())
}

/// `QUICKCHAT_HOME` if set, otherwise the current directory.
fn workspace_root() -> PathBuf {
    std::env::var_os("QUICKCHAT_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

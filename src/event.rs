use crossterm::event::KeyEvent;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::agent::DispatchEvent;

/// Events handled by the interactive loop.
#[derive(Debug)]
pub enum Event {
    /// A tick event, sent at a regular interval.
    Tick,
    /// A key press event.
    Key(KeyEvent),
    /// The terminal was resized.
    Resize,
    /// Work posted from another context.
    Inbound(Inbound),
}

/// Messages posted to the interactive loop from background tasks and signal
/// handlers. This queue is the only way other contexts reach app state.
#[derive(Debug)]
pub enum Inbound {
    Dispatch(DispatchEvent),
    ToggleVisibility,
}

pub type InboxSender = UnboundedSender<Inbound>;
pub type InboxReceiver = UnboundedReceiver<Inbound>;

pub fn inbox() -> (InboxSender, InboxReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

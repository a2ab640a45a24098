use log::warn;
use tokio::sync::mpsc::error::TryRecvError;

use super::App;
use crate::event::InboxReceiver;

impl App {
    /// Applies everything already waiting in the inbox without blocking.
    /// Returns how many messages were handled.
    pub fn drain_inbox(&mut self, inbox: &mut InboxReceiver) -> usize {
        let mut handled = 0;
        loop {
            match inbox.try_recv() {
                Ok(inbound) => {
                    self.handle_inbound(inbound);
                    handled += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!("Inbox closed, no more background events");
                    break;
                }
            }
        }
        handled
    }
}

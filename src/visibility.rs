//! Moves toggle requests from signal handlers onto the interactive loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};

use crate::event::{InboxSender, Inbound};
use crate::hotkey::HotkeyRegistration;

/// Cloneable handle that any thread may fire.
///
/// A burst of signals between two drains of the inbox enqueues a single
/// `ToggleVisibility`.
#[derive(Clone)]
pub struct ToggleSignal {
    pending: Arc<AtomicBool>,
    inbox: InboxSender,
}

impl ToggleSignal {
    pub fn new(inbox: InboxSender) -> Self {
        Self {
            pending: Arc::new(AtomicBool::new(false)),
            inbox,
        }
    }

    pub fn on_toggle_signal(&self) {
        if self.pending.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.inbox.send(Inbound::ToggleVisibility).is_err() {
            self.pending.store(false, Ordering::SeqCst);
            debug!("Toggle signal dropped, inbox closed");
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    fn take_pending(&self) -> bool {
        self.pending.swap(false, Ordering::SeqCst)
    }
}

/// Interactive-side owner of the window state and the hotkey registration.
pub struct VisibilityController {
    visible: bool,
    signal: ToggleSignal,
    registration: Option<HotkeyRegistration>,
}

impl VisibilityController {
    pub fn new(signal: ToggleSignal) -> Self {
        Self {
            visible: true,
            signal,
            registration: None,
        }
    }

    pub fn signal(&self) -> &ToggleSignal {
        &self.signal
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Handles a `ToggleVisibility` taken off the inbox. Returns the new state.
    pub fn apply_pending(&mut self) -> bool {
        if self.signal.take_pending() {
            self.visible = !self.visible;
            debug!("Window toggled, visible = {}", self.visible);
        }
        self.visible
    }

    pub fn show(&mut self) {
        self.visible = true;
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    /// Installs a new registration; the previous one is released first.
    pub fn rebind(&mut self, registration: HotkeyRegistration) {
        if let Some(mut previous) = self.registration.take() {
            previous.unregister();
        }
        info!("Toggle hotkey bound to {}", registration.binding());
        self.registration = Some(registration);
    }

    pub fn registration(&self) -> Option<&HotkeyRegistration> {
        self.registration.as_ref()
    }

    pub fn shutdown(&mut self) {
        if let Some(mut registration) = self.registration.take() {
            registration.unregister();
        }
    }
}

impl Drop for VisibilityController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

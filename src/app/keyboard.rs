use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use super::App;

impl App {
    /// The main entry point for handling keyboard events.
    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        // The toggle goes through the same single-slot signal as SIGUSR1.
        if self
            .visibility
            .registration()
            .is_some_and(|registration| registration.binding().matches(&key))
        {
            self.visibility.signal().on_toggle_signal();
            return;
        }

        if self.handle_global_shortcuts(key) {
            return;
        }

        // A hidden window only listens for the shortcuts above.
        if !self.visibility.is_visible() {
            return;
        }

        self.handle_composer_key(key);
    }

    /// Returns `true` if a shortcut was handled.
    fn handle_global_shortcuts(&mut self, key: KeyEvent) -> bool {
        match (key.code, key.modifiers) {
            (KeyCode::Char('q'), m) if m.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
            }
            (KeyCode::Char('c'), m) if m.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
            }
            (KeyCode::Char('n'), m) if m.contains(KeyModifiers::CONTROL) => {
                if !self.visibility.is_visible() {
                    return false;
                }
                self.new_conversation();
            }
            (KeyCode::Esc, _) => {
                if !self.visibility.is_visible() {
                    return false;
                }
                self.hide_window();
            }
            _ => return false,
        }
        true
    }

    fn handle_composer_key(&mut self, key: KeyEvent) {
        let modifiers = key.modifiers;
        match key.code {
            KeyCode::Enter => {
                if modifiers.intersects(KeyModifiers::SHIFT | KeyModifiers::ALT) {
                    self.composer.insert_newline();
                } else {
                    self.submit_input();
                }
            }
            KeyCode::Backspace => self.composer.backspace(),
            KeyCode::Delete => self.composer.delete(),
            KeyCode::Left => self.composer.move_left(),
            KeyCode::Right => self.composer.move_right(),
            KeyCode::Home => self.composer.move_to_line_start(),
            KeyCode::End => self.composer.move_to_line_end(),
            KeyCode::Up => self.handle_history_navigation(key, -1),
            KeyCode::Down => self.handle_history_navigation(key, 1),
            KeyCode::PageUp => self.transcript.move_selection(-5),
            KeyCode::PageDown => self.transcript.move_selection(5),
            KeyCode::Tab => self.composer.insert_char('\t'),
            KeyCode::Char(ch) => {
                if !modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) {
                    self.composer.insert_char(ch);
                }
            }
            _ => {}
        }
    }

    /// Up/Down recall earlier input while the composer is empty or already
    /// showing a recalled line; otherwise they scroll the transcript.
    fn handle_history_navigation(&mut self, key: KeyEvent, delta: isize) {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            self.transcript.move_selection(delta);
            return;
        }
        if !self.composer.is_empty() && !self.composer.is_browsing_history() {
            return;
        }
        let navigated = if delta < 0 {
            self.composer.history_previous()
        } else {
            self.composer.history_next()
        };
        if !navigated {
            self.transcript.move_selection(delta);
        }
    }

    pub fn hide_window(&mut self) {
        self.visibility.hide();
        self.status_message = format!("Hidden, press {} to show", self.hotkey_label());
    }

    pub fn show_window(&mut self) {
        self.visibility.show();
        self.status_message = String::from("Window shown");
    }
}

//! 全域顯示/隱藏快捷鍵：解析組合鍵字串，並註冊外部觸發來源。
//!
//! A terminal program cannot grab keys system-wide, so two sources feed the
//! same `ToggleSignal`: the configured combination pressed inside the window,
//! and `SIGUSR1` on unix (bind `pkill -USR1 quickchat` in your desktop).

use std::fmt;
use std::future::Future;
use std::time::Duration;

use anyhow::{Result, bail};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use log::{debug, error, info, warn};
use tokio::task::JoinHandle;

use crate::visibility::ToggleSignal;

pub const REGISTER_ATTEMPTS: u32 = 3;
pub const REGISTER_RETRY_DELAY: Duration = Duration::from_millis(500);

/// A parsed key combination such as `ctrl+shift+z`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeyBinding {
    modifiers: KeyModifiers,
    code: KeyCode,
    normalized: String,
}

impl HotkeyBinding {
    pub fn parse(combo: &str) -> Result<Self> {
        let mut modifiers = KeyModifiers::NONE;
        let mut code = None;
        let mut names = Vec::new();

        for token in combo.split('+').map(|token| token.trim().to_lowercase()) {
            if token.is_empty() {
                bail!("empty key in hotkey `{combo}`");
            }
            let modifier = match token.as_str() {
                "ctrl" | "control" => Some((KeyModifiers::CONTROL, "control")),
                "alt" | "option" => Some((KeyModifiers::ALT, "alt")),
                "shift" => Some((KeyModifiers::SHIFT, "shift")),
                "win" | "window" | "super" | "cmd" => Some((KeyModifiers::SUPER, "window")),
                _ => None,
            };
            if let Some((flag, name)) = modifier {
                if !modifiers.contains(flag) {
                    modifiers |= flag;
                    names.push(name.to_string());
                }
                continue;
            }
            if code.is_some() {
                bail!("hotkey `{combo}` names more than one key");
            }
            code = Some(parse_key(&token).ok_or_else(|| {
                anyhow::anyhow!("unknown key `{token}` in hotkey `{combo}`")
            })?);
            names.push(token);
        }

        let Some(code) = code else {
            bail!("hotkey `{combo}` has no key besides modifiers");
        };
        if is_reserved(modifiers, code) {
            bail!("hotkey `{combo}` is taken by a built-in shortcut");
        }
        Ok(Self {
            modifiers,
            code,
            normalized: names.join("+"),
        })
    }

    pub fn matches(&self, key: &KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        let code = match key.code {
            KeyCode::Char(ch) => KeyCode::Char(ch.to_ascii_lowercase()),
            other => other,
        };
        code == self.code && key.modifiers == self.modifiers
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }
}

impl fmt::Display for HotkeyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

/// Esc, Ctrl+Q, Ctrl+C and Ctrl+N are handled by the window itself.
fn is_reserved(modifiers: KeyModifiers, code: KeyCode) -> bool {
    match code {
        KeyCode::Esc => true,
        KeyCode::Char('q' | 'c' | 'n') => modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

fn parse_key(token: &str) -> Option<KeyCode> {
    let mut chars = token.chars();
    if let (Some(ch), None) = (chars.next(), chars.next()) {
        return Some(KeyCode::Char(ch));
    }
    let code = match token {
        "space" => KeyCode::Char(' '),
        "enter" | "return" => KeyCode::Enter,
        "tab" => KeyCode::Tab,
        "esc" | "escape" => KeyCode::Esc,
        "backspace" => KeyCode::Backspace,
        "delete" | "del" => KeyCode::Delete,
        "insert" => KeyCode::Insert,
        "home" => KeyCode::Home,
        "end" => KeyCode::End,
        "pageup" => KeyCode::PageUp,
        "pagedown" => KeyCode::PageDown,
        "up" => KeyCode::Up,
        "down" => KeyCode::Down,
        "left" => KeyCode::Left,
        "right" => KeyCode::Right,
        _ => {
            let number = token.strip_prefix('f')?.parse::<u8>().ok()?;
            if !(1..=24).contains(&number) {
                return None;
            }
            KeyCode::F(number)
        }
    };
    Some(code)
}

/// A live binding. Dropping it stops the external listener.
pub struct HotkeyRegistration {
    binding: HotkeyBinding,
    listener: Option<JoinHandle<()>>,
}

impl HotkeyRegistration {
    pub fn binding(&self) -> &HotkeyBinding {
        &self.binding
    }

    pub fn is_listening(&self) -> bool {
        self.listener
            .as_ref()
            .is_some_and(|listener| !listener.is_finished())
    }

    pub fn unregister(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
            debug!("Hotkey `{}` unregistered", self.binding);
        }
    }
}

impl Drop for HotkeyRegistration {
    fn drop(&mut self) {
        self.unregister();
    }
}

pub struct HotkeyManager {
    signal: ToggleSignal,
    attempts: u32,
    retry_delay: Duration,
}

impl HotkeyManager {
    pub fn new(signal: ToggleSignal) -> Self {
        Self {
            signal,
            attempts: REGISTER_ATTEMPTS,
            retry_delay: REGISTER_RETRY_DELAY,
        }
    }

    /// Parses `combo` and starts the external listener. Must run inside a
    /// tokio runtime. Listener failures are logged, not returned: the
    /// in-window combination keeps working without it.
    pub fn register(&self, combo: &str) -> Result<HotkeyRegistration> {
        let binding = HotkeyBinding::parse(combo)?;
        let listener = spawn_listener(self.signal.clone(), self.attempts, self.retry_delay);
        info!("Registered hotkey `{binding}`");
        Ok(HotkeyRegistration { binding, listener })
    }
}

/// Calls `attempt` up to `attempts` times, sleeping `delay` between failures.
pub async fn retry_registration<T, E, F, Fut>(attempts: u32, delay: Duration, mut attempt: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    for round in 1..=attempts {
        match attempt().await {
            Ok(value) => return Some(value),
            Err(err) => {
                warn!("Hotkey registration attempt {round}/{attempts} failed: {err}");
                if round < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    error!("Hotkey registration gave up after {attempts} attempts");
    None
}

#[cfg(unix)]
fn spawn_listener(signal: ToggleSignal, attempts: u32, delay: Duration) -> Option<JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal as unix_signal};

    Some(tokio::spawn(async move {
        let stream = retry_registration(attempts, delay, || async {
            unix_signal(SignalKind::user_defined1())
        })
        .await;
        let Some(mut stream) = stream else {
            return;
        };
        while stream.recv().await.is_some() {
            debug!("SIGUSR1 received");
            signal.on_toggle_signal();
        }
    }))
}

#[cfg(not(unix))]
fn spawn_listener(_signal: ToggleSignal, _attempts: u32, _delay: Duration) -> Option<JoinHandle<()>> {
    debug!("No external toggle source on this platform");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::inbox;
    use std::cell::Cell;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn aliases_normalize() {
        let binding = HotkeyBinding::parse("Ctrl+Win+Z").unwrap();
        assert_eq!(binding.normalized(), "control+window+z");
        assert_eq!(
            HotkeyBinding::parse("control+super+z").unwrap(),
            binding
        );
        assert_eq!(HotkeyBinding::parse("option+f5").unwrap().to_string(), "alt+f5");
    }

    #[test]
    fn matches_crossterm_events() {
        let binding = HotkeyBinding::parse("alt+z").unwrap();
        assert!(binding.matches(&press(KeyCode::Char('z'), KeyModifiers::ALT)));
        assert!(!binding.matches(&press(KeyCode::Char('z'), KeyModifiers::NONE)));
        assert!(!binding.matches(&press(KeyCode::Char('x'), KeyModifiers::ALT)));

        let shifted = HotkeyBinding::parse("ctrl+shift+z").unwrap();
        assert!(shifted.matches(&press(
            KeyCode::Char('Z'),
            KeyModifiers::CONTROL | KeyModifiers::SHIFT
        )));
    }

    #[test]
    fn rejects_malformed_combos() {
        assert!(HotkeyBinding::parse("").is_err());
        assert!(HotkeyBinding::parse("ctrl+").is_err());
        assert!(HotkeyBinding::parse("ctrl+shift").is_err());
        assert!(HotkeyBinding::parse("a+b").is_err());
        assert!(HotkeyBinding::parse("ctrl+banana").is_err());
        assert!(HotkeyBinding::parse("f99").is_err());
    }

    #[test]
    fn built_in_shortcuts_cannot_be_bound() {
        for combo in ["ctrl+q", "Control+C", "ctrl+shift+n", "esc", "alt+escape"] {
            assert!(HotkeyBinding::parse(combo).is_err(), "{combo} was accepted");
        }
        assert!(HotkeyBinding::parse("alt+q").is_ok());
        assert!(HotkeyBinding::parse("n").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = Cell::new(0);
        let started = tokio::time::Instant::now();
        let result = retry_registration(3, REGISTER_RETRY_DELAY, || {
            calls.set(calls.get() + 1);
            let round = calls.get();
            async move {
                if round < 3 { Err("busy") } else { Ok(round) }
            }
        })
        .await;
        assert_eq!(result, Some(3));
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_bounded_attempts() {
        let calls = Cell::new(0);
        let result: Option<()> = retry_registration(3, REGISTER_RETRY_DELAY, || {
            calls.set(calls.get() + 1);
            async { Err("taken") }
        })
        .await;
        assert_eq!(result, None);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn unregister_stops_listener() {
        let (tx, _rx) = inbox();
        let manager = HotkeyManager::new(ToggleSignal::new(tx));
        let mut registration = manager.register("alt+z").unwrap();
        assert_eq!(registration.binding().normalized(), "alt+z");
        registration.unregister();
        assert!(!registration.is_listening());
        assert!(manager.register("ctrl+").is_err());
    }
}

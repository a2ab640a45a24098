//! QuickChat: a hotkey-toggled terminal chat window for OpenAI-compatible
//! models, with named agents selected by `@nickname`.

pub mod agent;
pub mod app;
pub mod event;
pub mod hotkey;
pub mod logging;
pub mod panels;
pub mod tui;
pub mod ui;
pub mod visibility;

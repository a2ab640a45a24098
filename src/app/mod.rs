//! `app` 模組是 QuickChat 的互動核心。
//!
//! 它擁有會話、代理目錄與對話面板，處理鍵盤輸入，
//! 並套用由背景工作經收件匣送回的事件。

/// `chat` 模組：送出訊息、套用排程事件、開始新對話。
mod chat;
/// `commands` 模組：以 `/` 開頭的指令（代理管理與設定）。
pub mod commands;
/// `init` 模組：負責 `App` 結構的初始化。
mod init;
/// `keyboard` 模組：專門處理所有的鍵盤輸入事件。
mod keyboard;
/// `state` 模組：定義了 `App` 結構以及輸入框狀態。
mod state;
mod tick;

pub use commands::{Command, Setting};
pub use state::{App, ChatComposer, ClientFactory};

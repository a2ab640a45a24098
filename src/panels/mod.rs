//! 介面面板的狀態（不含繪製）。

pub mod chat;

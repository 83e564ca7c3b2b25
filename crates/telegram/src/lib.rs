//! Telegram Delivery Client
//!
//! Sends one `sendMessage` call per delivered quote, with legacy
//! Markdown styling. Exactly one outbound message per successful call;
//! the caller's retry policy only re-invokes after a confirmed failure.

pub mod client;

pub use client::TelegramClient;

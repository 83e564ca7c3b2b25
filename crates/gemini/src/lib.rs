//! Gemini Text Generator Client
//!
//! One call per quote: POST `generateContent` against the Gemini API,
//! extract the first candidate's text, trim it down to a clean quote.
//! Retry is the caller's concern (`peptalk_core::RetryPolicy`); this
//! crate never retries internally.

pub mod client;

pub use client::GeminiClient;

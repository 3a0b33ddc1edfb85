//! Vocabulary assistant for reading-comprehension passages.
//!
//! The server side is a thin proxy ([`proxy`]) that turns passages into
//! prompts for a chat-completion model ([`llm`]) and validates what comes
//! back ([`extract`]). The client side keeps its state in [`client`], talks
//! to the proxy through [`transport`] and an offline cache ([`offline`]),
//! persists preferences in [`storage`] and renders HTML with [`render`].

pub mod client;
pub mod extract;
pub mod llm;
pub mod offline;
pub mod prompt;
pub mod proxy;
pub mod render;
pub mod storage;
pub mod transport;
pub mod vocab;
#[cfg(feature = "web")]
pub mod web;

pub use client::{ClientController, ClientState};
pub use proxy::{Proxy, ProxyError};
pub use vocab::{Difficulty, Mode, QuizQuestion, Stats, Theme, VocabularyItem};

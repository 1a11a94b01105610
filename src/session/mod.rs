//! Dialog sessions and the session registry.
//!
//! A [`DialogSession`] keeps the conversation state for one multi-turn
//! dialog: a model-input log that is sent to the model on every turn and an
//! optional full-transcript log. Sessions are held in a [`SessionStore`]
//! that is injected into request handlers.
//!
//! # Architecture
//!
//! - [`MessageLog`]: ordered, append-only message sequence
//! - [`DialogSession`]: one conversation, serializing its turns
//! - [`SessionStore`]: thread-safe registry with idle expiry
//!
//! # Example
//!
//! ```rust
//! use dialog_gateway::llm::Message;
//! use dialog_gateway::session::{DialogOptions, LogKind, SessionStore};
//!
//! let store = SessionStore::new(DialogOptions::default(), None);
//! let session = store.create(Some(Message::system("You are terse.")));
//!
//! assert_eq!(session.log(LogKind::Input).len(), 1);
//! assert!(session.log(LogKind::Transcript).is_empty());
//! ```

mod dialog;
mod store;

pub use dialog::{BusyPolicy, DialogOptions, DialogSession, DialogState, LogKind, MessageLog};
pub use store::{DEFAULT_SESSION_ID, SessionStore};

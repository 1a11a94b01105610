//! Dialog sessions and their message logs.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

use crate::error::{DialogError, require_text};
use crate::llm::{Message, Orchestrator};

/// What a session does with an `ask` that arrives while a turn is in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    /// Fail immediately with [`DialogError::SessionBusy`].
    #[default]
    Reject,
    /// Wait until the in-flight turn has finished.
    Queue,
}

/// Per-session behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialogOptions {
    /// Append assistant replies to the model-input log, so the model sees its
    /// own previous answers. When `false` only user turns are fed back.
    pub include_replies: bool,
    /// Keep a separate full-transcript log.
    pub full_transcript: bool,
    /// Policy for overlapping `ask` calls.
    pub busy_policy: BusyPolicy,
}

impl Default for DialogOptions {
    fn default() -> Self {
        Self {
            include_replies: true,
            full_transcript: true,
            busy_policy: BusyPolicy::Reject,
        }
    }
}

/// Selects one of a session's logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogKind {
    /// The sequence sent to the model on every turn.
    #[default]
    #[serde(rename = "inputLog")]
    Input,
    /// Every user and assistant turn, independent of what the model sees.
    #[serde(rename = "fullTranscript")]
    Transcript,
}

/// Whether a turn is currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogState {
    /// No model call in flight.
    Idle,
    /// A model call has been issued; the input log already holds its user turn.
    AwaitingReply,
}

/// Ordered, append-only message sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    /// Create a log, optionally seeded with a first message.
    #[must_use]
    pub fn new(seed: Option<Message>) -> Self {
        Self {
            messages: seed.into_iter().collect(),
        }
    }

    /// Append a message at the tail.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Copy of the current contents, in append order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// A multi-turn conversation.
///
/// The session owns a model-input log and, optionally, a full-transcript
/// log. One `ask` at a time runs its append-call-append sequence; the turn
/// lock is held for the whole sequence, so replies can never be attached to
/// another call's user turn.
///
/// A failed model call leaves its user turn at the tail of the logs with no
/// reply. That turn is part of the context sent on the next call.
#[derive(Debug, Clone)]
pub struct DialogSession {
    inner: Arc<DialogInner>,
}

#[derive(Debug)]
struct DialogInner {
    id: String,
    options: DialogOptions,
    /// Held for the duration of one turn.
    turn: Mutex<()>,
    input_log: RwLock<MessageLog>,
    transcript: Option<RwLock<MessageLog>>,
    created_at: DateTime<Utc>,
    last_activity: RwLock<DateTime<Utc>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl DialogSession {
    /// Create a session. `seed` becomes the first entry of the model-input
    /// log only; the transcript starts empty.
    #[must_use]
    pub fn new(id: impl Into<String>, seed: Option<Message>, options: DialogOptions) -> Self {
        let now = Utc::now();
        Self {
            inner: Arc::new(DialogInner {
                id: id.into(),
                options,
                turn: Mutex::new(()),
                input_log: RwLock::new(MessageLog::new(seed)),
                transcript: options
                    .full_transcript
                    .then(|| RwLock::new(MessageLog::default())),
                created_at: now,
                last_activity: RwLock::new(now),
            }),
        }
    }

    /// Get the session ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Run one conversational turn.
    ///
    /// The user turn is appended before the model is called. The assistant
    /// reply is appended only if the call succeeds; on failure nothing else
    /// is recorded and the error is returned.
    ///
    /// # Errors
    ///
    /// - [`DialogError::Validation`] for blank text, before any log change
    /// - [`DialogError::SessionBusy`] under [`BusyPolicy::Reject`] when a turn is in flight
    /// - [`DialogError::Upstream`] when the model call fails or times out
    pub async fn ask(
        &self,
        orchestrator: &Orchestrator,
        text: Option<&str>,
    ) -> Result<String, DialogError> {
        let text = require_text(text, "Question is required")?;
        let _turn = self.begin_turn().await?;

        let user = Message::user(text);
        let context = {
            let mut log = write(&self.inner.input_log);
            log.append(user.clone());
            log.snapshot()
        };
        if let Some(transcript) = &self.inner.transcript {
            write(transcript).append(user);
        }
        self.touch();

        tracing::debug!(
            session_id = %self.inner.id,
            message_count = context.len(),
            "Issuing model call for session turn"
        );

        let reply = match orchestrator.chat(&context).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(
                    session_id = %self.inner.id,
                    error = %e,
                    "Turn failed, user message left unanswered"
                );
                self.touch();
                return Err(e);
            }
        };

        let answer = reply.content.clone();
        if let Some(transcript) = &self.inner.transcript {
            write(transcript).append(reply.clone());
        }
        if self.inner.options.include_replies {
            write(&self.inner.input_log).append(reply);
        }
        self.touch();

        tracing::debug!(
            session_id = %self.inner.id,
            input_log_len = self.log_len(LogKind::Input),
            "Session turn completed"
        );

        Ok(answer)
    }

    async fn begin_turn(&self) -> Result<MutexGuard<'_, ()>, DialogError> {
        match self.inner.options.busy_policy {
            BusyPolicy::Queue => Ok(self.inner.turn.lock().await),
            BusyPolicy::Reject => {
                let Ok(guard) = self.inner.turn.try_lock() else {
                    tracing::info!(session_id = %self.inner.id, "Rejected overlapping turn");
                    return Err(DialogError::SessionBusy(self.inner.id.clone()));
                };
                Ok(guard)
            }
        }
    }

    /// Snapshot of a log in append order. A disabled or unwritten log is empty.
    #[must_use]
    pub fn log(&self, which: LogKind) -> Vec<Message> {
        match which {
            LogKind::Input => read(&self.inner.input_log).snapshot(),
            LogKind::Transcript => self
                .inner
                .transcript
                .as_ref()
                .map(|t| read(t).snapshot())
                .unwrap_or_default(),
        }
    }

    /// Number of entries in a log.
    #[must_use]
    pub fn log_len(&self, which: LogKind) -> usize {
        match which {
            LogKind::Input => read(&self.inner.input_log).len(),
            LogKind::Transcript => self.inner.transcript.as_ref().map_or(0, |t| read(t).len()),
        }
    }

    /// Current turn state.
    #[must_use]
    pub fn state(&self) -> DialogState {
        if self.inner.turn.try_lock().is_ok() {
            DialogState::Idle
        } else {
            DialogState::AwaitingReply
        }
    }

    /// Mark the session as active now.
    pub(crate) fn touch(&self) {
        *write(&self.inner.last_activity) = Utc::now();
    }

    /// Check if the session has been inactive for longer than `timeout`.
    #[must_use]
    pub fn is_expired_with_timeout(&self, timeout: Duration) -> bool {
        let last = *read(&self.inner.last_activity);
        // Negative means clock skew; never expire in that case.
        (Utc::now() - last)
            .to_std()
            .is_ok_and(|idle| idle > timeout)
    }

    /// Get the session age.
    #[must_use]
    pub fn age(&self) -> Duration {
        (Utc::now() - self.inner.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

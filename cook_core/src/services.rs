//! Collaborator contracts used while cooking.
//!
//! The session never talks to these directly; it emits effects and the
//! [`crate::runner::CookRunner`] carries them out against implementations of
//! the traits below.

use crate::runner::RunnerEvent;
use crate::session::{Notice, SessionSnapshot};
use crate::{Feedback, LogId, NarrationTicket, Result, TranslationError};
use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload of the session-start log call
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StartLogRequest {
    pub user_id: Uuid,
    pub user_name: String,
    pub recipe_id: String,
    pub recipe_name: String,
    pub start_time: DateTime<Utc>,
    pub language: String,
}

/// Payload of the session-end log call
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EndLogRequest {
    pub log_id: LogId,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: i64,
    pub completed_all_steps: bool,
    pub feedback: Feedback,
}

/// Persists the start and end of every cooking session
pub trait PrepLogStore: Send {
    fn start_log(&mut self, request: &StartLogRequest) -> Result<LogId>;
    fn end_log(&mut self, request: &EndLogRequest) -> Result<()>;
}

/// Opaque text-to-text translation service
///
/// Runs on worker threads, hence `Send + Sync`.
pub trait Translator: Send + Sync {
    fn translate(
        &self,
        text: &str,
        target_language: &str,
    ) -> std::result::Result<String, TranslationError>;
}

/// Lifecycle of one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    Started,
    Ended,
    Failed(String),
}

/// Text to be spoken
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub ticket: NarrationTicket,
    pub text: String,
    pub speech_tag: String,
}

/// Reports speech lifecycle events back into the cooking event loop
#[derive(Clone, Debug)]
pub struct SpeechNotifier {
    ticket: NarrationTicket,
    events: Sender<RunnerEvent>,
}

impl SpeechNotifier {
    pub fn new(ticket: NarrationTicket, events: Sender<RunnerEvent>) -> Self {
        Self { ticket, events }
    }

    pub fn notify(&self, event: SpeechEvent) {
        // The loop may already be gone after teardown
        let _ = self.events.send(RunnerEvent::Speech {
            ticket: self.ticket,
            event,
        });
    }
}

/// Opaque text-to-audio engine; at most one utterance at a time
pub trait Speaker: Send {
    /// Speak `utterance`, replacing whatever is currently being spoken
    fn speak(&mut self, utterance: &Utterance, notifier: SpeechNotifier);

    /// Stop the current utterance immediately
    fn cancel(&mut self);
}

/// Audible timer alarm
pub trait AlarmBell: Send {
    /// One ring; called when the alarm starts and on every repeat
    fn ring(&mut self, label: &str);

    fn silence(&mut self) {}
}

/// Presents the session to the cook
pub trait SessionView: Send {
    fn render(&mut self, snapshot: &SessionSnapshot);
    fn notice(&mut self, notice: &Notice);
}

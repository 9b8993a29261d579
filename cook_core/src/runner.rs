//! Event loop that drives a [`CookSession`].
//!
//! The runner owns the session and processes one event at a time: user
//! actions, timer ticks, alarm repeats and answers from translation workers.
//! Effects returned by the session are executed here against the
//! collaborators in [`RunnerServices`]. Tick and alarm deadlines are handled
//! with `recv_deadline`, so nothing else runs between two events.

use crate::config::SessionConfig;
use crate::services::{
    AlarmBell, PrepLogStore, SessionView, SpeechEvent, SpeechNotifier, Speaker, Translator,
    Utterance,
};
use crate::session::{CookSession, Effect, SessionAction};
use crate::{Feedback, LogId, NarrationTicket, TranslationError};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Everything that can wake the event loop
#[derive(Debug)]
pub enum RunnerEvent {
    Action(SessionAction),
    SubmitFeedback(Feedback),
    Translated {
        ticket: NarrationTicket,
        result: Result<String, TranslationError>,
    },
    Speech {
        ticket: NarrationTicket,
        event: SpeechEvent,
    },
    Shutdown,
}

/// Timing knobs for the loop
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub tick_interval: Duration,
    pub alarm_repeat: Duration,
    /// Leave the loop as soon as feedback has been saved
    pub exit_when_complete: bool,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            alarm_repeat: Duration::from_secs(10),
            exit_when_complete: true,
        }
    }
}

impl From<&SessionConfig> for RunnerSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            tick_interval: Duration::from_millis(config.tick_interval_ms.max(1)),
            alarm_repeat: Duration::from_secs(config.alarm_repeat_secs.max(1)),
            exit_when_complete: true,
        }
    }
}

/// Collaborators the runner executes effects against
pub struct RunnerServices {
    pub translator: Arc<dyn Translator>,
    pub speaker: Box<dyn Speaker>,
    pub bell: Box<dyn AlarmBell>,
    pub log_store: Box<dyn PrepLogStore>,
    pub view: Box<dyn SessionView>,
}

/// How the loop ended
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub completed: bool,
    pub log_id: Option<LogId>,
    pub final_index: usize,
}

pub struct CookRunner {
    session: CookSession,
    initial_effects: Vec<Effect>,
    services: RunnerServices,
    settings: RunnerSettings,
    events_tx: Sender<RunnerEvent>,
    events_rx: Receiver<RunnerEvent>,
    next_tick: Option<Instant>,
    next_alarm: Option<Instant>,
    alarm_label: String,
}

impl CookRunner {
    /// `initial_effects` are the effects returned by [`CookSession::start`]
    pub fn new(
        session: CookSession,
        initial_effects: Vec<Effect>,
        services: RunnerServices,
        settings: RunnerSettings,
    ) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            session,
            initial_effects,
            services,
            settings,
            events_tx,
            events_rx,
            next_tick: None,
            next_alarm: None,
            alarm_label: String::new(),
        }
    }

    /// Handle for feeding user input into the loop from other threads
    pub fn sender(&self) -> Sender<RunnerEvent> {
        self.events_tx.clone()
    }

    /// Run until shutdown (or completion, if configured), then tear down
    pub fn run(mut self) -> RunSummary {
        let initial = std::mem::take(&mut self.initial_effects);
        self.execute(initial);
        self.render();

        loop {
            if self.settings.exit_when_complete && self.session.is_complete() {
                tracing::info!("Session complete, leaving event loop");
                break;
            }

            let event = match self.next_deadline() {
                Some(deadline) => match self.events_rx.recv_deadline(deadline) {
                    Ok(event) => Some(event),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match self.events_rx.recv() {
                    Ok(event) => Some(event),
                    Err(_) => break,
                },
            };

            let effects = match event {
                None => self.fire_due_timers(),
                Some(RunnerEvent::Shutdown) => break,
                Some(event) => self.dispatch(event),
            };
            self.execute(effects);
            self.render();
        }

        let effects = self.session.teardown();
        self.execute(effects);

        RunSummary {
            completed: self.session.is_complete(),
            log_id: self.session.log_id(),
            final_index: self.session.current_index(),
        }
    }

    fn render(&mut self) {
        let snapshot = self.session.snapshot();
        self.services.view.render(&snapshot);
    }

    fn next_deadline(&self) -> Option<Instant> {
        match (self.next_tick, self.next_alarm) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn dispatch(&mut self, event: RunnerEvent) -> Vec<Effect> {
        match event {
            RunnerEvent::Action(action) => self.session.apply(action),
            RunnerEvent::SubmitFeedback(feedback) => {
                self.session.submit_feedback(feedback, chrono::Utc::now())
            }
            RunnerEvent::Translated { ticket, result } => {
                self.session.on_translation(ticket, result)
            }
            RunnerEvent::Speech { ticket, event } => {
                self.session.on_speech_event(ticket, event);
                Vec::new()
            }
            RunnerEvent::Shutdown => Vec::new(),
        }
    }

    fn fire_due_timers(&mut self) -> Vec<Effect> {
        let now = Instant::now();
        let mut effects = Vec::new();

        if matches!(self.next_tick, Some(at) if at <= now) {
            // Next tick counts from this one, never earlier than one interval
            self.next_tick = Some(now + self.settings.tick_interval);
            effects.extend(self.session.tick());
        }

        if matches!(self.next_alarm, Some(at) if at <= now) {
            self.services.bell.ring(&self.alarm_label);
            self.next_alarm = Some(now + self.settings.alarm_repeat);
        }

        effects
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        let mut queue: VecDeque<Effect> = effects.into();

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::StartTicker => {
                    self.next_tick = Some(Instant::now() + self.settings.tick_interval);
                }
                Effect::StopTicker => self.next_tick = None,
                Effect::StartAlarm { label } => {
                    self.services.bell.ring(&label);
                    self.alarm_label = label;
                    self.next_alarm = Some(Instant::now() + self.settings.alarm_repeat);
                }
                Effect::StopAlarm => {
                    if self.next_alarm.take().is_some() {
                        self.services.bell.silence();
                    }
                }
                Effect::Translate {
                    ticket,
                    text,
                    target_language,
                } => self.spawn_translation(ticket, text, target_language),
                Effect::Speak {
                    ticket,
                    text,
                    speech_tag,
                } => {
                    let utterance = Utterance {
                        ticket,
                        text,
                        speech_tag,
                    };
                    let notifier = SpeechNotifier::new(ticket, self.events_tx.clone());
                    self.services.speaker.speak(&utterance, notifier);
                }
                Effect::CancelSpeech => self.services.speaker.cancel(),
                Effect::StartLog(request) => {
                    let result = self
                        .services
                        .log_store
                        .start_log(&request)
                        .map_err(|e| e.to_string());
                    queue.extend(self.session.on_start_log(result));
                }
                Effect::EndLog(request) => {
                    let result = self
                        .services
                        .log_store
                        .end_log(&request)
                        .map_err(|e| e.to_string());
                    queue.extend(self.session.on_end_log(result));
                }
                Effect::Notice(notice) => self.services.view.notice(&notice),
            }
        }
    }

    fn spawn_translation(&self, ticket: NarrationTicket, text: String, target_language: String) {
        let translator = Arc::clone(&self.services.translator);
        let events = self.events_tx.clone();
        let spawned = thread::Builder::new()
            .name("translate".into())
            .spawn(move || {
                let result = translator.translate(&text, &target_language);
                let _ = events.send(RunnerEvent::Translated { ticket, result });
            });

        if let Err(e) = spawned {
            tracing::warn!("Could not spawn translation worker: {}", e);
            let _ = self.events_tx.send(RunnerEvent::Translated {
                ticket,
                result: Err(TranslationError::Unavailable(e.to_string())),
            });
        }
    }
}

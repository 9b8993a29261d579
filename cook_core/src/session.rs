//! Guided cook-through session.
//!
//! `CookSession` walks one cook through one recipe: a step pointer that ends in
//! a feedback phase, a countdown timer per step, narration, and the two log
//! calls that bracket the session. Every transition is a plain method that
//! mutates the session and returns the [`Effect`]s the surrounding event loop
//! must carry out. Asynchronous answers (translations, speech callbacks, log
//! results) come back through the `on_*` methods, which drop anything that no
//! longer belongs to the current step.

use crate::narration::{compose_narration, plan_narration, NarrationPlan, NarrationTicket};
use crate::services::{EndLogRequest, SpeechEvent, StartLogRequest};
use crate::timer::{format_clock, StepTimer, TimerStatus, ToggleOutcome, TickOutcome};
use crate::{Error, Feedback, LogId, Recipe, Result, Step, TranslationError, UserPreferences};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Where the cook currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "index", rename_all = "snake_case")]
pub enum Phase {
    /// Looking at the step with this 0-based index
    Viewing(usize),
    /// Past the last step, entering post-cook feedback
    Feedback,
}

/// User-initiated actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Advance,
    Retreat,
    ToggleTimer,
    ResetTimer,
    ToggleMute,
    ReadAloud,
}

/// Work the event loop has to do on behalf of the session
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Deliver a tick every tick interval until stopped
    StartTicker,
    StopTicker,
    /// Ring now and then on a fixed repeat until stopped; replaces any running repeat
    StartAlarm { label: String },
    StopAlarm,
    Translate {
        ticket: NarrationTicket,
        text: String,
        target_language: String,
    },
    Speak {
        ticket: NarrationTicket,
        text: String,
        speech_tag: String,
    },
    CancelSpeech,
    StartLog(StartLogRequest),
    EndLog(EndLogRequest),
    Notice(Notice),
}

/// Messages surfaced to the cook
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Notice {
    TimerFinished { step_number: u32 },
    StartLogFailed(String),
    FeedbackUnavailable,
    FeedbackSaved,
    EndLogFailed(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::TimerFinished { step_number } => {
                write!(f, "Timer for step {} has finished!", step_number)
            }
            Notice::StartLogFailed(reason) => write!(
                f,
                "Could not start the preparation log ({}). Feedback cannot be saved for this session.",
                reason
            ),
            Notice::FeedbackUnavailable => {
                write!(f, "Feedback cannot be saved because the preparation log was never started.")
            }
            Notice::FeedbackSaved => write!(f, "Thanks! Your feedback has been saved."),
            Notice::EndLogFailed(reason) => {
                write!(f, "Saving feedback failed ({}). Submit again to retry.", reason)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum EndLogState {
    NotSubmitted,
    Pending,
    Failed(String),
    Saved,
}

#[derive(Debug, Clone)]
struct PendingTranslation {
    ticket: NarrationTicket,
    source_text: String,
    speech_tag: String,
}

pub struct CookSession {
    recipe: Recipe,
    user: UserPreferences,
    index: usize,
    timer: Option<StepTimer>,
    muted: bool,
    log_id: Option<LogId>,
    start_log_failed: bool,
    end_log: EndLogState,
    started_at: DateTime<Utc>,
    last_ticket: u64,
    active_ticket: Option<NarrationTicket>,
    pending_translation: Option<PendingTranslation>,
    speaking: bool,
    torn_down: bool,
}

impl CookSession {
    /// Open a session on the first step
    ///
    /// The returned effects contain the session-start log request and the
    /// narration of step 1. A recipe without steps cannot be cooked.
    pub fn start(
        recipe: Recipe,
        user: UserPreferences,
        started_at: DateTime<Utc>,
    ) -> Result<(Self, Vec<Effect>)> {
        if recipe.steps.is_empty() {
            return Err(Error::MissingStep(format!(
                "recipe '{}' has no steps to cook",
                recipe.id
            )));
        }

        let muted = user.voice_language.is_silent();
        let start_log = StartLogRequest {
            user_id: user.user_id,
            user_name: user.user_name.clone(),
            recipe_id: recipe.id.clone(),
            recipe_name: recipe.name.clone(),
            start_time: started_at,
            language: user.voice_language.code().to_string(),
        };

        let mut session = Self {
            recipe,
            user,
            index: 0,
            timer: None,
            muted,
            log_id: None,
            start_log_failed: false,
            end_log: EndLogState::NotSubmitted,
            started_at,
            last_ticket: 0,
            active_ticket: None,
            pending_translation: None,
            speaking: false,
            torn_down: false,
        };

        tracing::info!(
            "Starting cook session for recipe {} ({} steps)",
            session.recipe.id,
            session.step_count()
        );

        let mut effects = vec![Effect::StartLog(start_log)];
        effects.extend(session.enter_current());
        Ok((session, effects))
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    pub fn user(&self) -> &UserPreferences {
        &self.user
    }

    pub fn step_count(&self) -> usize {
        self.recipe.step_count()
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn phase(&self) -> Phase {
        if self.index >= self.step_count() {
            Phase::Feedback
        } else {
            Phase::Viewing(self.index)
        }
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.recipe.step(self.index)
    }

    pub fn timer(&self) -> Option<&StepTimer> {
        self.timer.as_ref()
    }

    pub fn timer_remaining(&self) -> Option<u32> {
        self.timer.as_ref().map(StepTimer::remaining)
    }

    pub fn timer_running(&self) -> bool {
        self.timer.as_ref().map(StepTimer::is_running).unwrap_or(false)
    }

    pub fn is_alarming(&self) -> bool {
        self.timer.as_ref().map(StepTimer::is_alarming).unwrap_or(false)
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn log_id(&self) -> Option<LogId> {
        self.log_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Feedback has been stored; the session is logically over
    pub fn is_complete(&self) -> bool {
        self.end_log == EndLogState::Saved
    }

    pub fn can_submit_feedback(&self) -> bool {
        self.phase() == Phase::Feedback
            && self.log_id.is_some()
            && matches!(
                self.end_log,
                EndLogState::NotSubmitted | EndLogState::Failed(_)
            )
    }

    /// `(index + 1) / (steps + 1)`; the last slice belongs to the feedback phase
    pub fn progress(&self) -> f64 {
        (self.index + 1) as f64 / (self.step_count() + 1) as f64
    }

    // ------------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------------

    pub fn apply(&mut self, action: SessionAction) -> Vec<Effect> {
        match action {
            SessionAction::Advance => self.advance(),
            SessionAction::Retreat => self.retreat(),
            SessionAction::ToggleTimer => self.toggle_timer(),
            SessionAction::ResetTimer => self.reset_timer(),
            SessionAction::ToggleMute => self.toggle_mute(),
            SessionAction::ReadAloud => self.read_aloud(),
        }
    }

    pub fn advance(&mut self) -> Vec<Effect> {
        if !self.accepts_navigation() {
            return Vec::new();
        }
        match self.phase() {
            Phase::Viewing(_) => {
                let mut effects = self.leave_current();
                self.index += 1;
                effects.extend(self.enter_current());
                effects
            }
            Phase::Feedback => {
                tracing::debug!("Ignoring advance past the feedback phase");
                Vec::new()
            }
        }
    }

    pub fn retreat(&mut self) -> Vec<Effect> {
        if !self.accepts_navigation() || self.index == 0 {
            return Vec::new();
        }
        let mut effects = self.leave_current();
        self.index -= 1;
        effects.extend(self.enter_current());
        effects
    }

    pub fn toggle_timer(&mut self) -> Vec<Effect> {
        if self.torn_down {
            return Vec::new();
        }
        let Some(timer) = self.timer.as_mut() else {
            return Vec::new();
        };
        match timer.toggle() {
            ToggleOutcome::Started => vec![Effect::StartTicker],
            ToggleOutcome::Paused => vec![Effect::StopTicker],
            ToggleOutcome::AlarmAcknowledged => vec![Effect::StopAlarm],
            ToggleOutcome::Finished => Vec::new(),
        }
    }

    pub fn reset_timer(&mut self) -> Vec<Effect> {
        if self.torn_down {
            return Vec::new();
        }
        let Some(timer) = self.timer.as_mut() else {
            return Vec::new();
        };
        timer.reset();
        vec![Effect::StopTicker, Effect::StopAlarm]
    }

    /// One second has passed on the ticker
    pub fn tick(&mut self) -> Vec<Effect> {
        if self.torn_down {
            return Vec::new();
        }
        let step_number = self.current_step().map(|s| s.step_number).unwrap_or_default();
        let Some(timer) = self.timer.as_mut() else {
            return Vec::new();
        };
        match timer.tick() {
            TickOutcome::Ignored | TickOutcome::Counted { .. } => Vec::new(),
            TickOutcome::Expired => {
                tracing::info!("Timer for step {} finished", step_number);
                vec![
                    Effect::StopTicker,
                    Effect::StartAlarm {
                        label: format!("Step {} timer finished", step_number),
                    },
                    Effect::Notice(Notice::TimerFinished { step_number }),
                ]
            }
        }
    }

    pub fn toggle_mute(&mut self) -> Vec<Effect> {
        if self.torn_down {
            return Vec::new();
        }
        self.muted = !self.muted;
        if self.muted {
            vec![self.cancel_narration()]
        } else {
            self.narrate_current()
        }
    }

    /// Narrate the current step again
    pub fn read_aloud(&mut self) -> Vec<Effect> {
        if self.torn_down || self.muted {
            return Vec::new();
        }
        let mut effects = vec![self.cancel_narration()];
        effects.extend(self.narrate_current());
        effects
    }

    /// Record the post-cook feedback; only valid in the feedback phase
    pub fn submit_feedback(&mut self, feedback: Feedback, ended_at: DateTime<Utc>) -> Vec<Effect> {
        if self.torn_down || self.phase() != Phase::Feedback {
            return Vec::new();
        }
        if matches!(self.end_log, EndLogState::Pending | EndLogState::Saved) {
            tracing::debug!("Feedback already submitted");
            return Vec::new();
        }
        let Some(log_id) = self.log_id else {
            tracing::warn!("Feedback submitted without a preparation log id");
            return vec![Effect::Notice(Notice::FeedbackUnavailable)];
        };

        let duration_seconds = (ended_at - self.started_at).num_seconds().max(0);
        self.end_log = EndLogState::Pending;
        vec![Effect::EndLog(EndLogRequest {
            log_id,
            end_time: ended_at,
            duration_seconds,
            completed_all_steps: true,
            feedback,
        })]
    }

    /// Cancel everything the session owns
    pub fn teardown(&mut self) -> Vec<Effect> {
        if self.torn_down {
            return Vec::new();
        }
        self.torn_down = true;
        if let Some(timer) = self.timer.as_mut() {
            timer.reset();
        }
        tracing::debug!("Cook session for {} torn down", self.recipe.id);
        vec![Effect::StopTicker, Effect::StopAlarm, self.cancel_narration()]
    }

    // ------------------------------------------------------------------------
    // Asynchronous completions
    // ------------------------------------------------------------------------

    pub fn on_start_log(&mut self, result: std::result::Result<LogId, String>) -> Vec<Effect> {
        if self.log_id.is_some() {
            tracing::warn!("Ignoring second start-log result");
            return Vec::new();
        }
        match result {
            Ok(log_id) => {
                tracing::info!("Preparation log {} started", log_id);
                self.log_id = Some(log_id);
                Vec::new()
            }
            Err(reason) => {
                tracing::warn!("Preparation log could not be started: {}", reason);
                self.start_log_failed = true;
                vec![Effect::Notice(Notice::StartLogFailed(reason))]
            }
        }
    }

    pub fn on_end_log(&mut self, result: std::result::Result<(), String>) -> Vec<Effect> {
        if self.end_log != EndLogState::Pending {
            return Vec::new();
        }
        match result {
            Ok(()) => {
                self.end_log = EndLogState::Saved;
                vec![Effect::Notice(Notice::FeedbackSaved)]
            }
            Err(reason) => {
                tracing::warn!("Saving feedback failed: {}", reason);
                self.end_log = EndLogState::Failed(reason.clone());
                vec![Effect::Notice(Notice::EndLogFailed(reason))]
            }
        }
    }

    /// A translation came back; speak it if it still belongs to the current narration
    pub fn on_translation(
        &mut self,
        ticket: NarrationTicket,
        result: std::result::Result<String, TranslationError>,
    ) -> Vec<Effect> {
        if self.torn_down || self.active_ticket != Some(ticket) {
            tracing::debug!("Dropping stale translation {:?}", ticket);
            return Vec::new();
        }
        let Some(pending) = self.pending_translation.take() else {
            return Vec::new();
        };
        if pending.ticket != ticket {
            return Vec::new();
        }

        let text = match result {
            Ok(translated) if !translated.trim().is_empty() => translated,
            Ok(_) => {
                tracing::warn!("Empty translation, speaking source text");
                pending.source_text
            }
            Err(e) => {
                tracing::warn!("Translation failed, speaking source text: {}", e);
                pending.source_text
            }
        };

        vec![Effect::Speak {
            ticket,
            text,
            speech_tag: pending.speech_tag,
        }]
    }

    pub fn on_speech_event(&mut self, ticket: NarrationTicket, event: SpeechEvent) {
        if self.active_ticket != Some(ticket) {
            return;
        }
        match event {
            SpeechEvent::Started => self.speaking = true,
            SpeechEvent::Ended => self.speaking = false,
            SpeechEvent::Failed(reason) => {
                tracing::warn!("Speech failed: {}", reason);
                self.speaking = false;
            }
        }
    }

    // ------------------------------------------------------------------------
    // Transition helpers
    // ------------------------------------------------------------------------

    fn accepts_navigation(&self) -> bool {
        !self.torn_down && !self.is_complete()
    }

    fn leave_current(&mut self) -> Vec<Effect> {
        self.timer = None;
        vec![Effect::StopTicker, Effect::StopAlarm, self.cancel_narration()]
    }

    fn enter_current(&mut self) -> Vec<Effect> {
        self.timer = self
            .current_step()
            .and_then(Step::timer_duration)
            .and_then(StepTimer::new);
        self.narrate_current()
    }

    fn cancel_narration(&mut self) -> Effect {
        self.active_ticket = None;
        self.pending_translation = None;
        self.speaking = false;
        Effect::CancelSpeech
    }

    fn issue_ticket(&mut self) -> NarrationTicket {
        self.last_ticket += 1;
        let ticket = NarrationTicket(self.last_ticket);
        self.active_ticket = Some(ticket);
        ticket
    }

    fn narrate_current(&mut self) -> Vec<Effect> {
        if self.muted {
            return Vec::new();
        }
        let Some(step) = self.current_step() else {
            return Vec::new();
        };
        let text = compose_narration(&self.recipe, step);
        let Some(plan) = plan_narration(text, self.user.voice_language) else {
            return Vec::new();
        };

        let ticket = self.issue_ticket();
        match plan {
            NarrationPlan::Speak { text, speech_tag } => vec![Effect::Speak {
                ticket,
                text,
                speech_tag,
            }],
            NarrationPlan::TranslateThenSpeak {
                text,
                target_language,
                speech_tag,
            } => {
                self.pending_translation = Some(PendingTranslation {
                    ticket,
                    source_text: text.clone(),
                    speech_tag,
                });
                vec![Effect::Translate {
                    ticket,
                    text,
                    target_language,
                }]
            }
        }
    }

    // ------------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------------

    pub fn snapshot(&self) -> SessionSnapshot {
        let step = self.current_step();
        SessionSnapshot {
            recipe_id: self.recipe.id.clone(),
            recipe_name: self.recipe.name.clone(),
            phase: self.phase(),
            step_number: step.map(|s| s.step_number),
            step_count: self.step_count(),
            instruction: step.map(|s| s.instruction.clone()),
            temperature: step.and_then(|s| s.temperature.clone()),
            ingredients: step
                .map(|s| {
                    self.recipe
                        .linked_ingredients(s)
                        .iter()
                        .map(|ing| ing.describe())
                        .collect()
                })
                .unwrap_or_default(),
            timer: self.timer.as_ref().map(TimerView::from),
            progress_percent: self.progress() * 100.0,
            muted: self.muted,
            voice_language: self.user.voice_language.code().to_string(),
            speaking: self.speaking,
            feedback_available: !self.start_log_failed,
            completed: self.is_complete(),
        }
    }
}

/// Everything a view needs to draw the session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub recipe_id: String,
    pub recipe_name: String,
    pub phase: Phase,
    pub step_number: Option<u32>,
    pub step_count: usize,
    pub instruction: Option<String>,
    pub temperature: Option<String>,
    pub ingredients: Vec<String>,
    pub timer: Option<TimerView>,
    pub progress_percent: f64,
    pub muted: bool,
    pub voice_language: String,
    pub speaking: bool,
    pub feedback_available: bool,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerView {
    pub clock: String,
    pub remaining: u32,
    pub duration: u32,
    pub status: TimerStatus,
    pub button_label: &'static str,
}

impl From<&StepTimer> for TimerView {
    fn from(timer: &StepTimer) -> Self {
        let status = timer.status();
        let button_label = match status {
            TimerStatus::Ready => "Start Timer",
            TimerStatus::Running => "Pause",
            TimerStatus::Paused => "Resume",
            TimerStatus::Alarming => "Stop Alarm",
            TimerStatus::Finished => "Finished",
        };
        TimerView {
            clock: format_clock(timer.remaining()),
            remaining: timer.remaining(),
            duration: timer.duration(),
            status,
            button_label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Ingredient, VoiceLanguage};
    use chrono::Duration;
    use uuid::Uuid;

    fn step(number: u32, instruction: &str, timer: Option<i64>, ingredients: &[&str]) -> Step {
        Step {
            id: format!("step-{}", number),
            step_number: number,
            instruction: instruction.into(),
            image_url: None,
            timer_seconds: timer,
            temperature: None,
            ingredient_ids: ingredients.iter().map(|i| i.to_string()).collect(),
        }
    }

    fn recipe(steps: Vec<Step>) -> Recipe {
        Recipe {
            id: "spaghetti".into(),
            name: "Spaghetti".into(),
            category: "Pasta".into(),
            description: None,
            image_url: None,
            visibility: true,
            prep_time: None,
            cook_time: None,
            total_time: None,
            servings: Some(2),
            nutrition_per_serving: None,
            ingredients: vec![Ingredient {
                id: "pasta".into(),
                name: "Spaghetti".into(),
                quantity: 200.0,
                unit: "g".into(),
                image_url: None,
            }],
            steps,
        }
    }

    fn user(language: VoiceLanguage) -> UserPreferences {
        UserPreferences::with_user_id(Uuid::nil(), "Asha", language).unwrap()
    }

    fn three_steps() -> Recipe {
        recipe(vec![
            step(1, "Boil water", None, &["pasta"]),
            step(2, "Cook pasta", Some(3), &[]),
            step(3, "Drain", None, &[]),
        ])
    }

    fn started(recipe: Recipe, language: VoiceLanguage) -> (CookSession, Vec<Effect>) {
        CookSession::start(recipe, user(language), Utc::now()).unwrap()
    }

    fn with_log(recipe: Recipe) -> CookSession {
        let (mut session, _) = started(recipe, VoiceLanguage::None);
        session.on_start_log(Ok(LogId::new()));
        session
    }

    fn speak_texts(effects: &[Effect]) -> Vec<String> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Speak { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_fresh_session_starts_on_first_step() {
        let (session, effects) = started(three_steps(), VoiceLanguage::English);
        assert_eq!(session.phase(), Phase::Viewing(0));
        assert!((session.progress() - 1.0 / 4.0).abs() < f64::EPSILON);
        assert!(matches!(effects[0], Effect::StartLog(ref req) if req.recipe_id == "spaghetti"));
        assert_eq!(session.log_id(), None);
    }

    #[test]
    fn test_recipe_without_steps_is_rejected() {
        let result = CookSession::start(recipe(vec![]), user(VoiceLanguage::English), Utc::now());
        assert!(matches!(result, Err(Error::MissingStep(_))));
    }

    #[test]
    fn test_advance_reaches_feedback_then_stops() {
        let (mut session, _) = started(three_steps(), VoiceLanguage::None);
        for expected in 1..=3 {
            session.advance();
            assert_eq!(session.current_index(), expected);
        }
        assert_eq!(session.phase(), Phase::Feedback);
        assert!((session.progress() - 1.0).abs() < f64::EPSILON);

        let effects = session.advance();
        assert!(effects.is_empty());
        assert_eq!(session.current_index(), 3);
    }

    #[test]
    fn test_retreat_from_first_step_is_noop() {
        let (mut session, _) = started(three_steps(), VoiceLanguage::English);
        assert!(session.retreat().is_empty());
        assert_eq!(session.phase(), Phase::Viewing(0));
    }

    #[test]
    fn test_retreat_from_feedback_returns_to_last_step() {
        let (mut session, _) = started(three_steps(), VoiceLanguage::None);
        session.advance();
        session.advance();
        session.advance();
        session.retreat();
        assert_eq!(session.phase(), Phase::Viewing(2));
    }

    #[test]
    fn test_timer_only_on_steps_with_duration() {
        let (mut session, _) = started(three_steps(), VoiceLanguage::None);
        assert_eq!(session.timer_remaining(), None);
        assert!(session.toggle_timer().is_empty());
        assert!(session.reset_timer().is_empty());

        session.advance();
        assert_eq!(session.timer_remaining(), Some(3));
        assert!(!session.timer_running());
    }

    #[test]
    fn test_timer_counts_down_to_alarm() {
        let (mut session, _) = started(three_steps(), VoiceLanguage::None);
        session.advance();

        assert_eq!(session.toggle_timer(), vec![Effect::StartTicker]);
        assert!(session.timer_running());

        assert!(session.tick().is_empty());
        assert!(session.tick().is_empty());
        let effects = session.tick();

        assert_eq!(session.timer_remaining(), Some(0));
        assert!(!session.timer_running());
        assert!(session.is_alarming());
        assert_eq!(effects[0], Effect::StopTicker);
        assert!(matches!(effects[1], Effect::StartAlarm { .. }));
        assert_eq!(
            effects[2],
            Effect::Notice(Notice::TimerFinished { step_number: 2 })
        );
    }

    #[test]
    fn test_toggle_while_alarming_acknowledges() {
        let (mut session, _) = started(three_steps(), VoiceLanguage::None);
        session.advance();
        session.toggle_timer();
        for _ in 0..3 {
            session.tick();
        }

        assert_eq!(session.toggle_timer(), vec![Effect::StopAlarm]);
        assert!(!session.is_alarming());
        assert!(!session.timer_running());
        assert_eq!(session.timer_remaining(), Some(0));

        // Needs an explicit reset before it counts again
        assert!(session.toggle_timer().is_empty());
        assert!(!session.timer_running());
    }

    #[test]
    fn test_reset_while_alarming_restores_duration() {
        let (mut session, _) = started(three_steps(), VoiceLanguage::None);
        session.advance();
        session.toggle_timer();
        for _ in 0..3 {
            session.tick();
        }
        assert!(session.is_alarming());

        let effects = session.reset_timer();
        assert!(effects.contains(&Effect::StopAlarm));
        assert!(!session.is_alarming());
        assert_eq!(session.timer_remaining(), Some(3));
        assert!(!session.timer_running());
    }

    #[test]
    fn test_pause_and_resume_preserve_remaining() {
        let (mut session, _) = started(three_steps(), VoiceLanguage::None);
        session.advance();
        session.toggle_timer();
        session.tick();
        assert_eq!(session.toggle_timer(), vec![Effect::StopTicker]);
        session.tick();
        assert_eq!(session.timer_remaining(), Some(2));
        assert_eq!(session.toggle_timer(), vec![Effect::StartTicker]);
    }

    #[test]
    fn test_changing_step_cancels_timer_and_alarm() {
        let (mut session, _) = started(three_steps(), VoiceLanguage::None);
        session.advance();
        session.toggle_timer();
        for _ in 0..3 {
            session.tick();
        }
        assert!(session.is_alarming());

        let effects = session.advance();
        assert!(effects.contains(&Effect::StopTicker));
        assert!(effects.contains(&Effect::StopAlarm));
        assert!(effects.contains(&Effect::CancelSpeech));
        assert!(!session.is_alarming());
        assert_eq!(session.timer_remaining(), None);

        // Coming back gives the full duration, not the old countdown
        let effects = session.retreat();
        assert!(effects.contains(&Effect::StopAlarm));
        assert_eq!(session.timer_remaining(), Some(3));
        assert!(!session.timer_running());
        assert!(!session.is_alarming());
    }

    #[test]
    fn test_running_timer_cancelled_on_retreat() {
        let (mut session, _) = started(three_steps(), VoiceLanguage::None);
        session.advance();
        session.toggle_timer();
        session.tick();

        let effects = session.retreat();
        assert_eq!(effects[0], Effect::StopTicker);
        assert!(!session.timer_running());
        assert!(session.tick().is_empty());
    }

    #[test]
    fn test_first_step_narration_in_english() {
        let (_, effects) = started(three_steps(), VoiceLanguage::English);
        assert_eq!(
            speak_texts(&effects),
            vec!["For this step, you will need: 200 g Spaghetti. Boil water".to_string()]
        );
    }

    #[test]
    fn test_no_sound_language_starts_muted() {
        let (session, effects) = started(three_steps(), VoiceLanguage::None);
        assert!(session.is_muted());
        assert!(speak_texts(&effects).is_empty());
    }

    #[test]
    fn test_muted_session_does_not_narrate_steps() {
        let (mut session, _) = started(three_steps(), VoiceLanguage::English);
        let effects = session.toggle_mute();
        assert_eq!(effects, vec![Effect::CancelSpeech]);

        let effects = session.advance();
        assert!(speak_texts(&effects).is_empty());

        let effects = session.toggle_mute();
        assert_eq!(speak_texts(&effects), vec!["Cook pasta".to_string()]);
    }

    #[test]
    fn test_translation_requested_for_other_languages() {
        let (session, effects) = started(three_steps(), VoiceLanguage::Hindi);
        assert!(speak_texts(&effects).is_empty());
        let translate = effects
            .iter()
            .find_map(|e| match e {
                Effect::Translate {
                    target_language, ..
                } => Some(target_language.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(translate, "Hindi");
        assert!(!session.is_speaking());
    }

    fn translate_ticket(effects: &[Effect]) -> NarrationTicket {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::Translate { ticket, .. } => Some(*ticket),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_translation_result_is_spoken() {
        let (mut session, effects) = started(three_steps(), VoiceLanguage::Hindi);
        let ticket = translate_ticket(&effects);

        let effects = session.on_translation(ticket, Ok("पानी उबालें".into()));
        assert_eq!(
            effects,
            vec![Effect::Speak {
                ticket,
                text: "पानी उबालें".into(),
                speech_tag: "hi-IN".into()
            }]
        );
    }

    #[test]
    fn test_translation_failure_falls_back_to_source_text() {
        let (mut session, effects) = started(three_steps(), VoiceLanguage::Kannada);
        let ticket = translate_ticket(&effects);

        let effects = session.on_translation(
            ticket,
            Err(TranslationError::Unavailable("offline".into())),
        );
        assert_eq!(
            speak_texts(&effects),
            vec!["For this step, you will need: 200 g Spaghetti. Boil water".to_string()]
        );
        assert_eq!(session.phase(), Phase::Viewing(0));
        assert_eq!(session.log_id(), None);
    }

    #[test]
    fn test_blank_translation_speaks_source_text() {
        let (mut session, effects) = started(three_steps(), VoiceLanguage::Hindi);
        let ticket = translate_ticket(&effects);

        let effects = session.on_translation(ticket, Ok("  ".into()));
        assert_eq!(
            effects,
            vec![Effect::Speak {
                ticket,
                text: "For this step, you will need: 200 g Spaghetti. Boil water".into(),
                speech_tag: "hi-IN".into()
            }]
        );
    }

    #[test]
    fn test_stale_translation_is_dropped() {
        let (mut session, effects) = started(three_steps(), VoiceLanguage::Hindi);
        let first = translate_ticket(&effects);

        let effects = session.advance();
        let second = translate_ticket(&effects);
        assert_ne!(first, second);

        assert!(session.on_translation(first, Ok("old".into())).is_empty());
        assert_eq!(
            speak_texts(&session.on_translation(second, Ok("new".into()))),
            vec!["new".to_string()]
        );
    }

    #[test]
    fn test_mute_drops_inflight_translation() {
        let (mut session, effects) = started(three_steps(), VoiceLanguage::Hindi);
        let ticket = translate_ticket(&effects);
        session.toggle_mute();
        assert!(session.on_translation(ticket, Ok("late".into())).is_empty());
    }

    #[test]
    fn test_teardown_cancels_everything() {
        let (mut session, effects) = started(three_steps(), VoiceLanguage::Hindi);
        let ticket = translate_ticket(&effects);
        session.advance();
        session.toggle_timer();

        let effects = session.teardown();
        assert_eq!(
            effects,
            vec![Effect::StopTicker, Effect::StopAlarm, Effect::CancelSpeech]
        );
        assert!(session.on_translation(ticket, Ok("late".into())).is_empty());
        assert!(session.tick().is_empty());
        assert!(session.advance().is_empty());
        assert!(session.teardown().is_empty());
    }

    #[test]
    fn test_speech_events_only_for_current_ticket() {
        let (mut session, effects) = started(three_steps(), VoiceLanguage::English);
        let ticket = effects
            .iter()
            .find_map(|e| match e {
                Effect::Speak { ticket, .. } => Some(*ticket),
                _ => None,
            })
            .unwrap();

        session.on_speech_event(ticket, SpeechEvent::Started);
        assert!(session.is_speaking());

        session.advance();
        assert!(!session.is_speaking());
        session.on_speech_event(ticket, SpeechEvent::Started);
        assert!(!session.is_speaking());
    }

    #[test]
    fn test_read_aloud_issues_fresh_narration() {
        let (mut session, first) = started(three_steps(), VoiceLanguage::English);
        let effects = session.read_aloud();
        assert_eq!(effects[0], Effect::CancelSpeech);
        assert_eq!(speak_texts(&effects), speak_texts(&first));
    }

    #[test]
    fn test_log_id_is_set_once() {
        let (mut session, _) = started(three_steps(), VoiceLanguage::None);
        let first = LogId::new();
        session.on_start_log(Ok(first));
        session.on_start_log(Ok(LogId::new()));
        assert_eq!(session.log_id(), Some(first));
    }

    #[test]
    fn test_submit_feedback_requires_log_id() {
        let (mut session, _) = started(three_steps(), VoiceLanguage::None);
        let notice = session.on_start_log(Err("database down".into()));
        assert!(matches!(notice[0], Effect::Notice(Notice::StartLogFailed(_))));

        for _ in 0..3 {
            session.advance();
        }
        let effects = session.submit_feedback(Feedback::default(), Utc::now());
        assert_eq!(effects, vec![Effect::Notice(Notice::FeedbackUnavailable)]);
        assert!(!effects.iter().any(|e| matches!(e, Effect::EndLog(_))));
        assert!(!session.snapshot().feedback_available);
    }

    #[test]
    fn test_submit_feedback_outside_feedback_phase_is_ignored() {
        let mut session = with_log(three_steps());
        assert!(session.submit_feedback(Feedback::default(), Utc::now()).is_empty());
    }

    #[test]
    fn test_submit_feedback_computes_duration() {
        let started_at = Utc::now();
        let (mut session, _) =
            CookSession::start(three_steps(), user(VoiceLanguage::None), started_at).unwrap();
        session.on_start_log(Ok(LogId::new()));
        for _ in 0..3 {
            session.advance();
        }

        let effects =
            session.submit_feedback(Feedback::default(), started_at + Duration::seconds(754));
        match &effects[0] {
            Effect::EndLog(req) => {
                assert_eq!(req.duration_seconds, 754);
                assert!(req.completed_all_steps);
                assert!(!req.feedback.is_wasted);
            }
            other => panic!("expected end log, got {:?}", other),
        }
    }

    #[test]
    fn test_end_log_sent_once_and_retry_after_failure() {
        let mut session = with_log(three_steps());
        for _ in 0..3 {
            session.advance();
        }

        assert_eq!(session.submit_feedback(Feedback::default(), Utc::now()).len(), 1);
        // While pending, a second submit does nothing
        assert!(session.submit_feedback(Feedback::default(), Utc::now()).is_empty());

        let effects = session.on_end_log(Err("disk full".into()));
        assert!(matches!(effects[0], Effect::Notice(Notice::EndLogFailed(_))));
        assert!(!session.is_complete());
        assert!(session.can_submit_feedback());

        assert_eq!(session.submit_feedback(Feedback::default(), Utc::now()).len(), 1);
        let effects = session.on_end_log(Ok(()));
        assert_eq!(effects, vec![Effect::Notice(Notice::FeedbackSaved)]);
        assert!(session.is_complete());
        assert!(session.submit_feedback(Feedback::default(), Utc::now()).is_empty());
        assert!(session.retreat().is_empty());
    }

    #[test]
    fn test_snapshot_reports_step_details() {
        let (mut session, _) = started(three_steps(), VoiceLanguage::English);
        let snap = session.snapshot();
        assert_eq!(snap.step_number, Some(1));
        assert_eq!(snap.step_count, 3);
        assert_eq!(snap.ingredients, vec!["200 g Spaghetti".to_string()]);
        assert!(snap.timer.is_none());

        session.advance();
        let timer = session.snapshot().timer.unwrap();
        assert_eq!(timer.clock, "00:03");
        assert_eq!(timer.button_label, "Start Timer");

        session.toggle_timer();
        session.tick();
        session.toggle_timer();
        assert_eq!(session.snapshot().timer.unwrap().button_label, "Resume");
    }

    #[test]
    fn test_two_step_scenario_end_to_end() {
        let recipe = recipe(vec![
            step(1, "Boil water", None, &[]),
            step(2, "Cook pasta", Some(5), &[]),
        ]);
        let (mut session, effects) = started(recipe, VoiceLanguage::English);
        let start = effects
            .iter()
            .filter(|e| matches!(e, Effect::StartLog(_)))
            .count();
        assert_eq!(start, 1);
        session.on_start_log(Ok(LogId::new()));

        session.advance();
        assert_eq!(session.phase(), Phase::Viewing(1));

        session.toggle_timer();
        for _ in 0..5 {
            session.tick();
        }
        assert!(session.is_alarming());

        session.toggle_timer();
        assert!(!session.is_alarming());

        session.advance();
        assert_eq!(session.phase(), Phase::Feedback);
        assert!((session.progress() - 1.0).abs() < f64::EPSILON);

        let effects = session.submit_feedback(
            Feedback {
                is_wasted: false,
                ..Feedback::default()
            },
            Utc::now(),
        );
        let end_logs: Vec<_> = effects
            .iter()
            .filter_map(|e| match e {
                Effect::EndLog(req) => Some(req),
                _ => None,
            })
            .collect();
        assert_eq!(end_logs.len(), 1);
        assert!(end_logs[0].completed_all_steps);
    }
}

//! Per-step countdown timer.
//!
//! The timer counts in whole seconds and is driven by external ticks; it never
//! reads the clock itself. Reaching zero while running raises the alarm, which
//! stays up until it is acknowledged, the timer is reset, or the step is left.

use serde::{Deserialize, Serialize};

/// Result of feeding one tick into the timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Timer was not running; nothing changed
    Ignored,
    /// One second was counted down
    Counted { remaining: u32 },
    /// This tick brought the countdown to zero and raised the alarm
    Expired,
}

/// What a toggle did to the timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Started,
    Paused,
    /// The toggle silenced a ringing alarm instead of restarting
    AlarmAcknowledged,
    /// Countdown already finished; only a reset can restart it
    Finished,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TimerStatus {
    Ready,
    Running,
    Paused,
    Alarming,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTimer {
    duration: u32,
    remaining: u32,
    running: bool,
    alarming: bool,
}

impl StepTimer {
    /// Timer for a step with a positive duration; `None` otherwise
    pub fn new(duration: u32) -> Option<Self> {
        if duration == 0 {
            return None;
        }
        Some(Self {
            duration,
            remaining: duration,
            running: false,
            alarming: false,
        })
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_alarming(&self) -> bool {
        self.alarming
    }

    pub fn status(&self) -> TimerStatus {
        match (self.running, self.alarming, self.remaining) {
            (_, true, _) => TimerStatus::Alarming,
            (true, false, _) => TimerStatus::Running,
            (false, false, 0) => TimerStatus::Finished,
            (false, false, r) if r == self.duration => TimerStatus::Ready,
            _ => TimerStatus::Paused,
        }
    }

    pub fn toggle(&mut self) -> ToggleOutcome {
        if self.alarming {
            self.alarming = false;
            return ToggleOutcome::AlarmAcknowledged;
        }
        if self.remaining == 0 {
            return ToggleOutcome::Finished;
        }
        self.running = !self.running;
        if self.running {
            ToggleOutcome::Started
        } else {
            ToggleOutcome::Paused
        }
    }

    pub fn tick(&mut self) -> TickOutcome {
        if !self.running || self.remaining == 0 {
            return TickOutcome::Ignored;
        }
        self.remaining -= 1;
        if self.remaining == 0 {
            self.running = false;
            self.alarming = true;
            TickOutcome::Expired
        } else {
            TickOutcome::Counted {
                remaining: self.remaining,
            }
        }
    }

    /// Back to the full duration, stopped and silent
    pub fn reset(&mut self) {
        self.remaining = self.duration;
        self.running = false;
        self.alarming = false;
    }
}

/// Render seconds as `MM:SS`
pub fn format_clock(total_seconds: u32) -> String {
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

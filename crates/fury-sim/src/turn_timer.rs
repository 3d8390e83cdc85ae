//! Turn countdowns driven by the calendar.
//!
//! A running [`TurnTimer`] owns one calendar event that keeps rescheduling
//! itself every `tick` until the deadline. Each firing before the deadline
//! emits the tick signal; the firing at the deadline emits the expired
//! signal and ends the chain.

use std::fmt;
use std::sync::Arc;

use fury_calendar::{Calendar, CalendarResult, EventId, EventOptions, Fired};
use fury_channel::{Channel, Payload, SignalKind};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

const TIMER_OWNER: &str = "turn_timer";

/// Countdown settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnTimerConfig {
    /// Length of a turn in calendar time units.
    pub duration: f64,
    /// Interval between tick signals. Non-positive disables ticks.
    pub tick: f64,
}

impl Default for TurnTimerConfig {
    fn default() -> Self {
        Self {
            duration: 10.0,
            tick: 1.0,
        }
    }
}

impl TurnTimerConfig {
    fn next_firing(&self, after: f64, deadline: f64) -> f64 {
        if self.tick > 0.0 {
            (after + self.tick).min(deadline)
        } else {
            deadline
        }
    }
}

/// Payload carried by tick and expired signals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Countdown {
    /// Time left when the signal was emitted.
    pub remaining: f64,
    /// Configured turn length.
    pub duration: f64,
}

struct TimerState {
    /// Bumped on every start and interrupt so stale firings can tell.
    run: u64,
    event: Option<EventId>,
    deadline: Option<f64>,
}

/// A restartable countdown publishing on a channel.
///
/// Cloning yields another handle to the same timer, which lets listeners
/// interrupt or restart it.
pub struct TurnTimer<T: SignalKind, P: Payload> {
    calendar: Calendar,
    channel: Channel<T, P>,
    tick_kind: T,
    expired_kind: T,
    config: TurnTimerConfig,
    state: Arc<Mutex<TimerState>>,
}

impl<T: SignalKind, P: Payload> Clone for TurnTimer<T, P> {
    fn clone(&self) -> Self {
        Self {
            calendar: self.calendar.clone(),
            channel: self.channel.clone(),
            tick_kind: self.tick_kind.clone(),
            expired_kind: self.expired_kind.clone(),
            config: self.config,
            state: Arc::clone(&self.state),
        }
    }
}

impl<T, P> TurnTimer<T, P>
where
    T: SignalKind,
    P: Payload + From<Countdown>,
{
    /// Create a stopped timer.
    #[must_use]
    pub fn new(
        calendar: &Calendar,
        channel: &Channel<T, P>,
        tick_kind: T,
        expired_kind: T,
        config: TurnTimerConfig,
    ) -> Self {
        Self {
            calendar: calendar.clone(),
            channel: channel.clone(),
            tick_kind,
            expired_kind,
            config,
            state: Arc::new(Mutex::new(TimerState {
                run: 0,
                event: None,
                deadline: None,
            })),
        }
    }

    /// Settings this timer was created with.
    #[must_use]
    pub const fn config(&self) -> TurnTimerConfig {
        self.config
    }

    /// Start a fresh countdown from the current calendar time.
    ///
    /// A running countdown is interrupted first.
    pub fn start(&self) -> CalendarResult<()> {
        self.interrupt();

        let now = self.calendar.time();
        let deadline = now + self.config.duration;
        let run = {
            let mut state = self.state.lock();
            state.run += 1;
            state.run
        };

        let id = self.calendar.schedule_at_with(
            self.config.next_firing(now, deadline),
            EventOptions::default().owner(TIMER_OWNER),
            self.firing(run, deadline),
        )?;

        let mut state = self.state.lock();
        state.event = Some(id);
        state.deadline = Some(deadline);
        debug!(deadline, "turn timer started");
        Ok(())
    }

    /// Stop the countdown without emitting anything.
    ///
    /// Returns `false` if the timer was not running.
    pub fn interrupt(&self) -> bool {
        let event = {
            let mut state = self.state.lock();
            state.run += 1;
            state.deadline = None;
            state.event.take()
        };
        let Some(id) = event else {
            return false;
        };
        self.calendar.discard(id);
        debug!(event = %id, "turn timer interrupted");
        true
    }

    /// Time left before expiry, or `None` when stopped.
    #[must_use]
    pub fn remaining(&self) -> Option<f64> {
        let deadline = self.state.lock().deadline?;
        Some((deadline - self.calendar.time()).max(0.0))
    }

    /// Check if a countdown is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.lock().deadline.is_some()
    }

    fn firing(&self, run: u64, deadline: f64) -> impl Fn(&mut Fired<'_>) + Send + Sync + 'static {
        let channel = self.channel.clone();
        let state = Arc::clone(&self.state);
        let tick_kind = self.tick_kind.clone();
        let expired_kind = self.expired_kind.clone();
        let config = self.config;

        move |fired: &mut Fired<'_>| {
            if state.lock().run != run {
                return;
            }

            let remaining = (deadline - fired.date()).max(0.0);
            let countdown = Countdown {
                remaining,
                duration: config.duration,
            };

            if remaining <= 0.0 {
                {
                    let mut state = state.lock();
                    state.event = None;
                    state.deadline = None;
                }
                debug!(date = fired.date(), "turn timer expired");
                if let Err(err) = channel.emit(expired_kind.clone(), P::from(countdown)) {
                    error!(%err, "failed to emit turn timer expiry");
                }
                return;
            }

            if let Err(err) = channel.emit(tick_kind.clone(), P::from(countdown)) {
                error!(%err, "failed to emit turn timer tick");
            }

            // A listener may have interrupted or restarted the timer
            if state.lock().run != run {
                return;
            }
            if let Err(err) = fired.reschedule_at(config.next_firing(fired.date(), deadline)) {
                error!(%err, "failed to reschedule turn timer");
                let mut state = state.lock();
                state.event = None;
                state.deadline = None;
            }
        }
    }
}

impl<T: SignalKind, P: Payload> fmt::Debug for TurnTimer<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TurnTimer")
            .field("config", &self.config)
            .field("tick_kind", &self.tick_kind)
            .field("expired_kind", &self.expired_kind)
            .field("deadline", &state.deadline)
            .finish_non_exhaustive()
    }
}

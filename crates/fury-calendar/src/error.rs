//! Calendar error types.

use thiserror::Error;

use crate::EventId;

/// Calendar error type.
///
/// Every variant aborts the triggering call before it mutates the calendar.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalendarError {
    /// Attempt to set the clock earlier than the current time.
    #[error("cannot move time backward from {from} to {to}")]
    BackwardTime { from: f64, to: f64 },

    /// Attempt to schedule or deploy an event dated before the current time.
    #[error("cannot schedule an event at {date}, calendar time is {time}")]
    PastScheduling { date: f64, time: f64 },

    /// Attempt to deploy an event that is already pending.
    #[error("event {0} is already deployed")]
    DuplicateDeploy(EventId),

    /// Attempt to remove an event that is not pending.
    #[error("event {0} is not deployed")]
    NotDeployed(EventId),

    /// Handle is stale or belongs to another calendar.
    #[error("unknown event {0}")]
    UnknownEvent(EventId),
}

/// Result type for calendar operations.
pub type CalendarResult<T> = Result<T, CalendarError>;

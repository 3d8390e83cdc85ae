//! Scheduled units of work.
//!
//! Events never point back at their calendar. The calendar owns every event
//! in an arena and hands out [`EventId`]s; all mutation goes through the
//! calendar so a deployed event can be pulled out of the pending order and
//! reinserted atomically.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use fury_collections::{Handle, Owner};

use crate::calendar::Calendar;
use crate::error::CalendarResult;

/// Stable identifier for an event owned by a [`Calendar`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(pub(crate) Handle);

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({:?})", self.0)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Optional settings for a scheduled event.
#[derive(Debug, Clone, Default)]
pub struct EventOptions {
    /// Tie-breaker among events sharing a date. Lower fires first.
    pub priority: f64,
    /// Debugging tag.
    pub owner: Option<Owner>,
}

impl EventOptions {
    /// Options with the given priority.
    #[must_use]
    pub fn priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    /// Options with the given owner tag.
    #[must_use]
    pub fn owner(mut self, owner: impl Into<Owner>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

/// Snapshot of an event's public state.
#[derive(Debug, Clone, PartialEq)]
pub struct EventInfo {
    pub id: EventId,
    pub date: f64,
    pub priority: f64,
    pub owner: Option<Owner>,
    pub deployed: bool,
}

impl fmt::Display for EventInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={} -> {}", self.date, self.id)?;
        if let Some(owner) = &self.owner {
            write!(f, " by {owner}")?;
        }
        write!(f, ", priority={}", self.priority)
    }
}

/// Event callback. Receives the firing context.
pub(crate) type Callback = Arc<dyn Fn(&mut Fired<'_>) + Send + Sync>;

/// Position of a deployed event in the pending order.
///
/// `seq` is assigned on every deployment, which makes events sharing
/// `(date, priority)` fire in deployment order.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EventKey {
    pub(crate) date: f64,
    pub(crate) priority: f64,
    pub(crate) seq: u64,
}

impl PartialEq for EventKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EventKey {}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.date
            .total_cmp(&other.date)
            .then_with(|| self.priority.total_cmp(&other.priority))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Arena entry for one event.
pub(crate) struct EventSlot {
    pub(crate) date: f64,
    pub(crate) priority: f64,
    pub(crate) owner: Option<Owner>,
    /// `Some` while the event sits in the pending order.
    pub(crate) deployed: Option<EventKey>,
    /// Cloned out while the event fires.
    pub(crate) callback: Callback,
}

impl EventSlot {
    pub(crate) fn new(date: f64, options: EventOptions, callback: Callback) -> Self {
        Self {
            date,
            priority: options.priority,
            owner: options.owner,
            deployed: None,
            callback,
        }
    }

    pub(crate) fn info(&self, id: EventId) -> EventInfo {
        EventInfo {
            id,
            date: self.date,
            priority: self.priority,
            owner: self.owner.clone(),
            deployed: self.deployed.is_some(),
        }
    }
}

/// Context handed to an event callback while it fires.
///
/// The event is already out of the pending order. It is destroyed once the
/// callback returns unless the callback re-deploys it through
/// [`Fired::reschedule_at`] or [`Fired::reschedule_after`].
pub struct Fired<'a> {
    pub(crate) calendar: &'a Calendar,
    pub(crate) id: EventId,
    pub(crate) date: f64,
}

impl Fired<'_> {
    /// The calendar firing this event.
    #[must_use]
    pub fn calendar(&self) -> &Calendar {
        self.calendar
    }

    /// The firing event.
    #[must_use]
    pub const fn id(&self) -> EventId {
        self.id
    }

    /// The date the event was scheduled for.
    #[must_use]
    pub const fn date(&self) -> f64 {
        self.date
    }

    /// Deploy this event again at `date`.
    pub fn reschedule_at(&mut self, date: f64) -> CalendarResult<()> {
        self.calendar.set_date(self.id, date)?;
        self.calendar.deploy(self.id)
    }

    /// Deploy this event again `delta` after its firing date.
    pub fn reschedule_after(&mut self, delta: f64) -> CalendarResult<()> {
        self.reschedule_at(self.date + delta)
    }
}

impl fmt::Debug for Fired<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fired")
            .field("id", &self.id)
            .field("date", &self.date)
            .finish_non_exhaustive()
    }
}

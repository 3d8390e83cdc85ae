//! The calendar: logical clock plus the pending event order.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use fury_collections::{Arena, Owner};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{CalendarError, CalendarResult};
use crate::event::{Callback, EventId, EventInfo, EventKey, EventOptions, EventSlot, Fired};

/// Inner calendar state (behind `Arc<Mutex>`).
struct CalendarState {
    /// Current logical time.
    time: f64,
    /// Every live event, deployed or not.
    events: Arena<EventSlot>,
    /// Deployed events in firing order.
    pending: BTreeMap<EventKey, EventId>,
    /// Deployment counter used for insertion-order tie breaks.
    next_seq: u64,
}

impl CalendarState {
    fn new(time: f64) -> Self {
        Self {
            time,
            events: Arena::new(),
            pending: BTreeMap::new(),
            next_seq: 0,
        }
    }

    fn slot(&self, id: EventId) -> CalendarResult<&EventSlot> {
        self.events.get(id.0).ok_or(CalendarError::UnknownEvent(id))
    }

    fn slot_mut(&mut self, id: EventId) -> CalendarResult<&mut EventSlot> {
        self.events
            .get_mut(id.0)
            .ok_or(CalendarError::UnknownEvent(id))
    }

    fn check_date(&self, date: f64) -> CalendarResult<()> {
        // Negated so that NaN is rejected too
        if !(date >= self.time) {
            return Err(CalendarError::PastScheduling {
                date,
                time: self.time,
            });
        }
        Ok(())
    }

    /// Put an undeployed event into the pending order.
    fn insert(&mut self, id: EventId) -> CalendarResult<()> {
        let time = self.time;
        let seq = self.next_seq;
        let slot = self.slot_mut(id)?;
        if slot.deployed.is_some() {
            return Err(CalendarError::DuplicateDeploy(id));
        }
        if !(slot.date >= time) {
            return Err(CalendarError::PastScheduling {
                date: slot.date,
                time,
            });
        }

        let key = EventKey {
            date: slot.date,
            priority: slot.priority,
            seq,
        };
        slot.deployed = Some(key);
        self.next_seq += 1;
        self.pending.insert(key, id);
        Ok(())
    }

    /// Pull a deployed event out of the pending order, keeping its slot.
    fn detach(&mut self, id: EventId) -> CalendarResult<()> {
        let key = self
            .events
            .get_mut(id.0)
            .and_then(|slot| slot.deployed.take())
            .ok_or(CalendarError::NotDeployed(id))?;
        self.pending.remove(&key);
        Ok(())
    }

    /// Pop the earliest pending event if it is due by `limit`.
    ///
    /// Moves the clock to the event's date and clones its callback out of
    /// the slot so it can run without the lock held.
    fn pop_due(&mut self, limit: Option<f64>) -> Option<(EventId, f64, Callback)> {
        let (key, _) = self.pending.first_key_value()?;
        if limit.is_some_and(|limit| key.date > limit) {
            return None;
        }
        let (key, id) = self.pending.pop_first()?;
        self.time = self.time.max(key.date);

        let slot = self.events.get_mut(id.0)?;
        slot.deployed = None;
        Some((id, key.date, Arc::clone(&slot.callback)))
    }

    /// Destroy a fired event unless it was re-deployed meanwhile.
    fn settle(&mut self, id: EventId) {
        if self
            .events
            .get(id.0)
            .is_some_and(|slot| slot.deployed.is_none())
        {
            self.events.remove(id.0);
        }
    }

    fn pending_infos(&self) -> Vec<EventInfo> {
        self.pending
            .values()
            .filter_map(|&id| self.events.get(id.0).map(|slot| slot.info(id)))
            .collect()
    }
}

/// Discrete-event calendar.
///
/// Cloning yields another handle to the same calendar. Callbacks run with no
/// lock held, so they may freely schedule, cancel or advance the calendar
/// that is firing them.
///
/// # Example
///
/// ```ignore
/// let calendar = Calendar::new(0.0);
/// calendar.schedule_at(5.0, |fired| println!("t={}", fired.date()))?;
/// calendar.set_time(10.0)?;
/// ```
#[derive(Clone)]
pub struct Calendar {
    inner: Arc<Mutex<CalendarState>>,
}

/// Non-owning calendar handle, for callbacks that must not keep their
/// calendar alive.
#[derive(Clone)]
pub struct WeakCalendar {
    inner: Weak<Mutex<CalendarState>>,
}

impl WeakCalendar {
    /// Recover a strong handle if the calendar is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Calendar> {
        self.inner.upgrade().map(|inner| Calendar { inner })
    }
}

impl fmt::Debug for WeakCalendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakCalendar")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl Default for Calendar {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Calendar {
    /// Create an empty calendar starting at `start`.
    #[must_use]
    pub fn new(start: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CalendarState::new(start))),
        }
    }

    /// Create a non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakCalendar {
        WeakCalendar {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Check if two handles refer to the same calendar.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ==================== Clock ====================

    /// Current logical time.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.inner.lock().time
    }

    /// Move the clock to `time`, firing every event dated at or before it.
    ///
    /// Events fire in `(date, priority, deployment)` order and the clock
    /// reads each event's date while it fires. Events scheduled by callbacks
    /// are picked up by the same pass if they fall due. Returns the number of
    /// fired events.
    pub fn set_time(&self, time: f64) -> CalendarResult<usize> {
        {
            let state = self.inner.lock();
            if !(time >= state.time) {
                return Err(CalendarError::BackwardTime {
                    from: state.time,
                    to: time,
                });
            }
        }

        let mut fired = 0;
        loop {
            let next = self.inner.lock().pop_due(Some(time));
            let Some((id, date, callback)) = next else {
                break;
            };
            self.fire(id, date, callback);
            fired += 1;
        }

        let mut state = self.inner.lock();
        // A callback may have advanced past `time` already
        state.time = state.time.max(time);
        Ok(fired)
    }

    /// Advance the clock by `delta`.
    pub fn advance(&self, delta: f64) -> CalendarResult<usize> {
        let time = self.time();
        self.set_time(time + delta)
    }

    /// Fire up to `n` pending events regardless of their dates.
    ///
    /// The clock follows each fired event. Returns the number of events
    /// actually fired.
    pub fn step(&self, n: usize) -> usize {
        let mut fired = 0;
        while fired < n {
            let next = self.inner.lock().pop_due(None);
            let Some((id, date, callback)) = next else {
                break;
            };
            self.fire(id, date, callback);
            fired += 1;
        }
        fired
    }

    /// Advance the clock to each of the next `n` pending dates in turn,
    /// firing everything due on the way.
    ///
    /// Returns the number of instants advanced.
    pub fn jump(&self, n: usize) -> CalendarResult<usize> {
        let mut jumped = 0;
        while jumped < n {
            let Some(date) = self.next_date() else {
                break;
            };
            self.set_time(date)?;
            jumped += 1;
        }
        Ok(jumped)
    }

    /// Reset the clock to `date` and discard every pending event without
    /// firing it.
    pub fn clear(&self, date: f64) {
        let mut state = self.inner.lock();
        let pending = std::mem::take(&mut state.pending);
        for id in pending.into_values() {
            state.events.remove(id.0);
        }
        state.time = date;
        debug!(date, "calendar cleared");
    }

    fn fire(&self, id: EventId, date: f64, callback: Callback) {
        trace!(event = %id, date, "firing event");
        let mut fired = Fired {
            calendar: self,
            id,
            date,
        };
        callback(&mut fired);
        self.inner.lock().settle(id);
    }

    // ==================== Scheduling ====================

    /// Schedule `callback` at `date` with default options.
    pub fn schedule_at<F>(&self, date: f64, callback: F) -> CalendarResult<EventId>
    where
        F: Fn(&mut Fired<'_>) + Send + Sync + 'static,
    {
        self.schedule_at_with(date, EventOptions::default(), callback)
    }

    /// Schedule `callback` at `date`.
    pub fn schedule_at_with<F>(
        &self,
        date: f64,
        options: EventOptions,
        callback: F,
    ) -> CalendarResult<EventId>
    where
        F: Fn(&mut Fired<'_>) + Send + Sync + 'static,
    {
        let mut state = self.inner.lock();
        state.check_date(date)?;

        let priority = options.priority;
        let id = EventId(
            state
                .events
                .insert(EventSlot::new(date, options, Arc::new(callback))),
        );
        state.insert(id)?;
        debug!(event = %id, date, priority, "event scheduled");
        Ok(id)
    }

    /// Schedule `callback` `delta` after the current time.
    pub fn schedule_after<F>(&self, delta: f64, callback: F) -> CalendarResult<EventId>
    where
        F: Fn(&mut Fired<'_>) + Send + Sync + 'static,
    {
        self.schedule_after_with(delta, EventOptions::default(), callback)
    }

    /// Schedule `callback` `delta` after the current time.
    pub fn schedule_after_with<F>(
        &self,
        delta: f64,
        options: EventOptions,
        callback: F,
    ) -> CalendarResult<EventId>
    where
        F: Fn(&mut Fired<'_>) + Send + Sync + 'static,
    {
        let date = self.time() + delta;
        self.schedule_at_with(date, options, callback)
    }

    /// Create an event without deploying it.
    pub fn create_event<F>(&self, date: f64, options: EventOptions, callback: F) -> EventId
    where
        F: Fn(&mut Fired<'_>) + Send + Sync + 'static,
    {
        let mut state = self.inner.lock();
        EventId(
            state
                .events
                .insert(EventSlot::new(date, options, Arc::new(callback))),
        )
    }

    /// Put an undeployed event into the pending order.
    pub fn deploy(&self, id: EventId) -> CalendarResult<()> {
        self.inner.lock().insert(id)?;
        debug!(event = %id, "event deployed");
        Ok(())
    }

    /// Take a deployed event out of the pending order without destroying it.
    pub fn undeploy(&self, id: EventId) -> CalendarResult<()> {
        self.inner.lock().detach(id)?;
        debug!(event = %id, "event undeployed");
        Ok(())
    }

    /// Deploy or undeploy, doing nothing when already in the requested state.
    pub fn set_deployed(&self, id: EventId, deployed: bool) -> CalendarResult<()> {
        let mut state = self.inner.lock();
        let current = state.slot(id)?.deployed.is_some();
        match (current, deployed) {
            (false, true) => state.insert(id),
            (true, false) => state.detach(id),
            _ => Ok(()),
        }
    }

    /// Remove a deployed event from future firing and destroy it.
    pub fn cancel(&self, id: EventId) -> CalendarResult<()> {
        let mut state = self.inner.lock();
        state.detach(id)?;
        state.events.remove(id.0);
        debug!(event = %id, "event cancelled");
        Ok(())
    }

    /// Destroy an event whether or not it is deployed.
    ///
    /// Returns `false` if the handle was already stale.
    pub fn discard(&self, id: EventId) -> bool {
        let mut state = self.inner.lock();
        // Stale or undeployed handles have nothing to detach
        let _ = state.detach(id);
        state.events.remove(id.0).is_some()
    }

    // ==================== Event state ====================

    /// Check if an event is pending. Stale handles report `false`.
    #[must_use]
    pub fn is_deployed(&self, id: EventId) -> bool {
        self.inner
            .lock()
            .events
            .get(id.0)
            .is_some_and(|slot| slot.deployed.is_some())
    }

    /// Snapshot of an event.
    #[must_use]
    pub fn event(&self, id: EventId) -> Option<EventInfo> {
        self.inner.lock().events.get(id.0).map(|slot| slot.info(id))
    }

    /// Firing date of an event.
    pub fn date(&self, id: EventId) -> CalendarResult<f64> {
        Ok(self.inner.lock().slot(id)?.date)
    }

    /// Priority of an event.
    pub fn priority(&self, id: EventId) -> CalendarResult<f64> {
        Ok(self.inner.lock().slot(id)?.priority)
    }

    /// Owner tag of an event.
    pub fn owner(&self, id: EventId) -> CalendarResult<Option<Owner>> {
        Ok(self.inner.lock().slot(id)?.owner.clone())
    }

    /// Change an event's date, re-sorting it if deployed.
    pub fn set_date(&self, id: EventId, date: f64) -> CalendarResult<()> {
        let mut state = self.inner.lock();
        if state.slot(id)?.deployed.is_none() {
            state.slot_mut(id)?.date = date;
            return Ok(());
        }

        state.check_date(date)?;
        state.detach(id)?;
        state.slot_mut(id)?.date = date;
        state.insert(id)
    }

    /// Change an event's priority, re-sorting it if deployed.
    pub fn set_priority(&self, id: EventId, priority: f64) -> CalendarResult<()> {
        let mut state = self.inner.lock();
        if state.slot(id)?.deployed.is_none() {
            state.slot_mut(id)?.priority = priority;
            return Ok(());
        }

        state.detach(id)?;
        state.slot_mut(id)?.priority = priority;
        state.insert(id)
    }

    // ==================== Introspection ====================

    /// Date of the earliest pending event.
    #[must_use]
    pub fn next_date(&self) -> Option<f64> {
        self.inner
            .lock()
            .pending
            .first_key_value()
            .map(|(key, _)| key.date)
    }

    /// Dates of every pending event, in firing order.
    #[must_use]
    pub fn dates(&self) -> Vec<f64> {
        self.inner.lock().pending.keys().map(|key| key.date).collect()
    }

    /// Snapshots of every pending event, in firing order.
    #[must_use]
    pub fn events(&self) -> Vec<EventInfo> {
        self.inner.lock().pending_infos()
    }

    /// Number of pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Check if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().pending.is_empty()
    }
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        write!(f, "time={}, events={}", state.time, state.pending.len())
    }
}

impl fmt::Debug for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("Calendar")
            .field("time", &state.time)
            .field("pending", &state.pending.len())
            .field("events", &state.events.len())
            .finish()
    }
}

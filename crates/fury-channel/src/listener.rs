//! Standing subscriptions to signal types.
//!
//! A listener is owned by the channel it was created on and addressed by a
//! [`ListenerId`]. When a broadcast matches its type (and its optional
//! condition) the channel activates it: the callback runs with an
//! [`Activation`] exposing the matched signal.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use fury_collections::{Handle, Owner};

use crate::channel::Channel;
use crate::error::ChannelResult;
use crate::signal::{Payload, Signal, SignalKind, SignalType};

/// Stable identifier for a listener owned by a [`Channel`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) Handle);

impl fmt::Debug for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListenerId({:?})", self.0)
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Predicate narrowing which signals activate a listener.
pub(crate) type Condition<T, P> = Arc<dyn Fn(&Signal<T, P>) -> bool + Send + Sync>;

/// Listener callback. Receives the activation context.
pub(crate) type ListenerCallback<T, P> = Arc<dyn Fn(&mut Activation<'_, T, P>) + Send + Sync>;

/// Optional settings for a listener.
pub struct ListenOptions<T, P> {
    pub(crate) condition: Option<Condition<T, P>>,
    /// Activation order among listeners of one type. Lower activates first.
    pub priority: f64,
    /// Debugging tag.
    pub owner: Option<Owner>,
}

impl<T, P> Default for ListenOptions<T, P> {
    fn default() -> Self {
        Self {
            condition: None,
            priority: 0.0,
            owner: None,
        }
    }
}

impl<T, P> ListenOptions<T, P> {
    /// Only activate for signals satisfying `condition`.
    #[must_use]
    pub fn when<F>(mut self, condition: F) -> Self
    where
        F: Fn(&Signal<T, P>) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

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

impl<T, P> fmt::Debug for ListenOptions<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenOptions")
            .field("conditional", &self.condition.is_some())
            .field("priority", &self.priority)
            .field("owner", &self.owner)
            .finish()
    }
}

/// Snapshot of a listener's public state.
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerInfo<T> {
    pub id: ListenerId,
    pub kind: SignalType<T>,
    pub priority: f64,
    pub owner: Option<Owner>,
    pub conditional: bool,
    pub deployed: bool,
}

impl<T: fmt::Debug> fmt::Display for ListenerInfo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "|{}|", self.kind)?;
        if self.conditional {
            f.write_str(" if condition")?;
        }
        write!(f, " -> {}", self.id)?;
        if let Some(owner) = &self.owner {
            write!(f, " by {owner}")?;
        }
        write!(f, ", priority={}", self.priority)
    }
}

/// Position of a deployed listener inside its type bucket.
///
/// `seq` is assigned on every deployment, which keeps equal-priority
/// listeners in deployment order.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ListenerEntry {
    pub(crate) priority: f64,
    pub(crate) seq: u64,
    pub(crate) id: ListenerId,
}

impl PartialEq for ListenerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ListenerEntry {}

impl PartialOrd for ListenerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ListenerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Arena entry for one listener.
pub(crate) struct ListenerSlot<T, P> {
    pub(crate) kind: SignalType<T>,
    pub(crate) priority: f64,
    pub(crate) owner: Option<Owner>,
    pub(crate) condition: Option<Condition<T, P>>,
    /// Cloned out while the listener activates.
    pub(crate) callback: ListenerCallback<T, P>,
    /// `Some` while indexed under `kind`.
    pub(crate) deployed: Option<ListenerEntry>,
    /// The signal being handled, only during activation. Nested
    /// activations save the outer match and restore it on return.
    pub(crate) current_match: Option<Signal<T, P>>,
}

impl<T: SignalKind, P: Payload> ListenerSlot<T, P> {
    pub(crate) fn new(
        kind: SignalType<T>,
        options: ListenOptions<T, P>,
        callback: ListenerCallback<T, P>,
    ) -> Self {
        Self {
            kind,
            priority: options.priority,
            owner: options.owner,
            condition: options.condition,
            callback,
            deployed: None,
            current_match: None,
        }
    }

    pub(crate) fn info(&self, id: ListenerId) -> ListenerInfo<T> {
        ListenerInfo {
            id,
            kind: self.kind.clone(),
            priority: self.priority,
            owner: self.owner.clone(),
            conditional: self.condition.is_some(),
            deployed: self.deployed.is_some(),
        }
    }
}

/// Context handed to a listener callback.
pub struct Activation<'a, T, P> {
    pub(crate) channel: &'a Channel<T, P>,
    pub(crate) id: ListenerId,
    pub(crate) signal: &'a Signal<T, P>,
}

impl<T: SignalKind, P: Payload> Activation<'_, T, P> {
    /// The signal that matched.
    #[must_use]
    pub const fn signal(&self) -> &Signal<T, P> {
        self.signal
    }

    /// Payload of the matched signal.
    #[must_use]
    pub fn payload(&self) -> Option<&P> {
        self.signal.payload()
    }

    /// The channel owning this listener.
    #[must_use]
    pub const fn channel(&self) -> &Channel<T, P> {
        self.channel
    }

    /// The activated listener.
    #[must_use]
    pub const fn listener(&self) -> ListenerId {
        self.id
    }

    /// Undeploy this listener. Safe while the current broadcast is running.
    pub fn stop(&mut self) -> ChannelResult<()> {
        self.channel.stop(self.id)
    }
}

impl<T: fmt::Debug, P: fmt::Debug> fmt::Debug for Activation<'_, T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Activation")
            .field("listener", &self.id)
            .field("signal", self.signal)
            .finish_non_exhaustive()
    }
}

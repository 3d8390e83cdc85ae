//! Signals: instantaneous typed messages.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use fury_collections::Owner;

use crate::channel::{Channel, WeakChannel};

/// Marker trait for signal type keys.
///
/// Any cloneable, hashable, debuggable value works: enums, interned
/// strings, small integers.
pub trait SignalKind: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

// Blanket implementation: any suitable type can key signals
impl<T: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static> SignalKind for T {}

/// Marker trait for signal payloads.
pub trait Payload: Send + Sync + 'static {}

impl<P: Send + Sync + 'static> Payload for P {}

/// Signal type as seen by listeners: a concrete key or the wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalType<T> {
    /// Matches every signal.
    Any,
    /// Matches signals of exactly this type.
    Is(T),
}

impl<T> SignalType<T> {
    /// Check if this is the wildcard.
    #[must_use]
    pub const fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }

    /// The concrete key, if any.
    #[must_use]
    pub const fn concrete(&self) -> Option<&T> {
        match self {
            Self::Any => None,
            Self::Is(kind) => Some(kind),
        }
    }
}

impl<T> From<T> for SignalType<T> {
    fn from(kind: T) -> Self {
        Self::Is(kind)
    }
}

impl<T: fmt::Debug> fmt::Display for SignalType<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Is(kind) => write!(f, "{kind:?}"),
        }
    }
}

/// A typed message broadcast on a channel.
///
/// Signals are immutable. Re-emitting one through
/// [`Channel::emit_copy`] builds a new signal.
pub struct Signal<T, P> {
    pub(crate) origin: WeakChannel<T, P>,
    pub(crate) kind: T,
    pub(crate) payload: Option<Arc<P>>,
    pub(crate) owner: Option<Owner>,
}

impl<T: SignalKind, P: Payload> Signal<T, P> {
    /// The signal type.
    #[must_use]
    pub const fn kind(&self) -> &T {
        &self.kind
    }

    /// The attached payload.
    #[must_use]
    pub fn payload(&self) -> Option<&P> {
        self.payload.as_deref()
    }

    /// The attached payload, shared.
    #[must_use]
    pub fn shared_payload(&self) -> Option<Arc<P>> {
        self.payload.clone()
    }

    /// The owner tag.
    #[must_use]
    pub const fn owner(&self) -> Option<&Owner> {
        self.owner.as_ref()
    }

    /// The channel the signal was emitted on, if it still exists.
    #[must_use]
    pub fn origin(&self) -> Option<Channel<T, P>> {
        self.origin.upgrade()
    }
}

impl<T: Clone, P> Clone for Signal<T, P> {
    fn clone(&self) -> Self {
        Self {
            origin: self.origin.clone(),
            kind: self.kind.clone(),
            payload: self.payload.clone(),
            owner: self.owner.clone(),
        }
    }
}

impl<T: fmt::Debug, P: fmt::Debug> fmt::Debug for Signal<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("kind", &self.kind)
            .field("payload", &self.payload)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

impl<T: fmt::Debug, P: fmt::Debug> fmt::Display for Signal<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "|{:?}|", self.kind)?;
        if let Some(owner) = &self.owner {
            write!(f, "{owner}")?;
        }
        if let Some(payload) = &self.payload {
            write!(f, "{payload:?}")?;
        }
        Ok(())
    }
}

/// How a copied signal treats one of the original's fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Override<T> {
    /// Keep the original value.
    #[default]
    Keep,
    /// Drop the value.
    Clear,
    /// Replace the value.
    Set(T),
}

impl<T> Override<T> {
    pub(crate) fn resolve<U>(self, current: Option<U>, wrap: impl FnOnce(T) -> U) -> Option<U> {
        match self {
            Self::Keep => current,
            Self::Clear => None,
            Self::Set(value) => Some(wrap(value)),
        }
    }
}

/// A signal waiting to be emitted: type, payload and owner.
///
/// Used for the opening and closing signals of
/// [`Channel::emit_disposable`].
#[derive(Debug, Clone)]
pub struct Emission<T, P> {
    pub kind: SignalType<T>,
    pub payload: Option<P>,
    pub owner: Option<Owner>,
}

impl<T, P> Emission<T, P> {
    /// An emission of `kind` with no payload and no owner.
    #[must_use]
    pub fn new(kind: impl Into<SignalType<T>>) -> Self {
        Self {
            kind: kind.into(),
            payload: None,
            owner: None,
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn payload(mut self, payload: P) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Attach an owner tag.
    #[must_use]
    pub fn owner(mut self, owner: impl Into<Owner>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

impl<T, P> From<T> for Emission<T, P> {
    fn from(kind: T) -> Self {
        Self::new(kind)
    }
}

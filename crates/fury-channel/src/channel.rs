//! Channels: named nodes of the signal routing tree.

use std::fmt;
use std::sync::{Arc, Weak};

use fury_collections::{Arena, Multiset, Owner, SortedMultimap};
use hashbrown::HashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::NAME_SEPARATOR;
use crate::error::{ChannelError, ChannelResult};
use crate::listener::{
    Activation, ListenOptions, ListenerEntry, ListenerId, ListenerInfo, ListenerSlot,
};
use crate::scope::SignalScope;
use crate::signal::{Emission, Override, Payload, Signal, SignalKind, SignalType};

/// Inner channel state (behind `Arc<Mutex>`).
struct ChannelState<T, P> {
    name: String,
    /// Dotted path from the root, kept in sync on rename and reparent.
    full_name: String,
    parent: Option<WeakChannel<T, P>>,
    children: HashMap<String, Channel<T, P>>,
    type_validation: bool,
    /// Registrations made here or anywhere below.
    registered: Multiset<T>,
    /// Deployed listeners per type, ascending priority.
    index: SortedMultimap<SignalType<T>, ListenerEntry>,
    /// Every listener created on this channel, deployed or not.
    listeners: Arena<ListenerSlot<T, P>>,
    /// Deployment counter used for insertion-order tie breaks.
    next_seq: u64,
}

impl<T: SignalKind, P: Payload> ChannelState<T, P> {
    fn new(name: String, type_validation: bool) -> Self {
        Self {
            full_name: name.clone(),
            name,
            parent: None,
            children: HashMap::new(),
            type_validation,
            registered: Multiset::new(),
            index: SortedMultimap::new(),
            listeners: Arena::new(),
            next_seq: 0,
        }
    }

    fn parent(&self) -> Option<Channel<T, P>> {
        self.parent.as_ref().and_then(WeakChannel::upgrade)
    }

    fn slot(&self, id: ListenerId) -> ChannelResult<&ListenerSlot<T, P>> {
        self.listeners
            .get(id.0)
            .ok_or(ChannelError::UnknownListener(id))
    }

    fn slot_mut(&mut self, id: ListenerId) -> ChannelResult<&mut ListenerSlot<T, P>> {
        self.listeners
            .get_mut(id.0)
            .ok_or(ChannelError::UnknownListener(id))
    }

    fn check_registered(&self, kind: &T) -> ChannelResult<()> {
        if self.type_validation && !self.registered.contains(kind) {
            return Err(ChannelError::UnregisteredType {
                kind: format!("{kind:?}"),
                channel: self.full_name.clone(),
            });
        }
        Ok(())
    }

    /// Listening is legal for the wildcard or any registered type.
    fn check_listenable(&self, kind: &SignalType<T>) -> ChannelResult<()> {
        match kind {
            SignalType::Any => Ok(()),
            SignalType::Is(kind) => self.check_registered(kind),
        }
    }

    /// Validate and index an undeployed listener.
    fn insert(&mut self, id: ListenerId) -> ChannelResult<()> {
        let slot = self.slot(id)?;
        if slot.deployed.is_some() {
            return Err(ChannelError::DuplicateDeploy(id));
        }
        self.check_listenable(&slot.kind)?;
        self.index_insert(id)
    }

    /// Index an undeployed listener without validating its type.
    fn index_insert(&mut self, id: ListenerId) -> ChannelResult<()> {
        let seq = self.next_seq;
        let slot = self.slot_mut(id)?;
        let entry = ListenerEntry {
            priority: slot.priority,
            seq,
            id,
        };
        slot.deployed = Some(entry);
        let kind = slot.kind.clone();
        self.next_seq += 1;
        self.index.insert(kind, entry);
        Ok(())
    }

    /// Pull a deployed listener out of the index, keeping its slot.
    fn detach(&mut self, id: ListenerId) -> ChannelResult<()> {
        let slot = self.slot_mut(id)?;
        let entry = slot.deployed.take().ok_or(ChannelError::NotDeployed(id))?;
        let kind = slot.kind.clone();
        self.index.remove_where(&kind, |existing| existing.id == entry.id);
        Ok(())
    }
}

impl<T, P> Drop for ChannelState<T, P> {
    fn drop(&mut self) {
        // Children outliving this node become roots
        for child in self.children.values() {
            child.inner.lock().parent = None;
            rename_subtree(child, None);
        }
    }
}

fn join_full_name(parent_full_name: Option<&str>, name: &str) -> String {
    match parent_full_name {
        Some(prefix) => format!("{prefix}{NAME_SEPARATOR}{name}"),
        None => name.to_owned(),
    }
}

/// Recompute the full names of `channel` and its descendants.
fn rename_subtree<T, P>(channel: &Channel<T, P>, parent_full_name: Option<&str>) {
    let (full_name, children) = {
        let mut guard = channel.inner.lock();
        let state = &mut *guard;
        state.full_name = join_full_name(parent_full_name, &state.name);
        let children: Vec<Channel<T, P>> = state.children.values().cloned().collect();
        (state.full_name.clone(), children)
    };
    for child in &children {
        rename_subtree(child, Some(&full_name));
    }
}

fn check_name(name: &str) -> ChannelResult<()> {
    if name.contains(NAME_SEPARATOR) {
        return Err(ChannelError::InvalidName {
            name: name.to_owned(),
        });
    }
    Ok(())
}

/// A named node in the signal routing tree.
///
/// Cloning yields another handle to the same channel. Parents own their
/// children; children refer to their parent weakly.
///
/// Emitting a signal activates matching local listeners, then forwards the
/// same signal to the parent, up to the root. Siblings and children never
/// see it.
pub struct Channel<T, P = ()> {
    inner: Arc<Mutex<ChannelState<T, P>>>,
}

/// Non-owning channel handle.
pub struct WeakChannel<T, P = ()> {
    inner: Weak<Mutex<ChannelState<T, P>>>,
}

impl<T, P> Clone for Channel<T, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, P> Clone for WeakChannel<T, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T, P> WeakChannel<T, P> {
    /// Recover a strong handle if the channel is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Channel<T, P>> {
        self.inner.upgrade().map(|inner| Channel { inner })
    }
}

impl<T, P> fmt::Debug for WeakChannel<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakChannel")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl<T: SignalKind, P: Payload> Channel<T, P> {
    /// Create a root channel with type validation enabled.
    pub fn new(name: impl Into<String>) -> ChannelResult<Self> {
        Self::with_validation(name, true)
    }

    /// Create a root channel accepting any signal type.
    pub fn unvalidated(name: impl Into<String>) -> ChannelResult<Self> {
        Self::with_validation(name, false)
    }

    /// Create a root channel with explicit type validation.
    pub fn with_validation(name: impl Into<String>, type_validation: bool) -> ChannelResult<Self> {
        let name = name.into();
        check_name(&name)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(ChannelState::new(name, type_validation))),
        })
    }

    /// Create a type-validating channel under `parent`.
    pub fn with_parent(name: impl Into<String>, parent: &Self) -> ChannelResult<Self> {
        let channel = Self::new(name)?;
        channel.set_parent(Some(parent))?;
        Ok(channel)
    }

    /// Create a type-validating child of this channel.
    pub fn child(&self, name: impl Into<String>) -> ChannelResult<Self> {
        Self::with_parent(name, self)
    }

    /// Create a non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakChannel<T, P> {
        WeakChannel {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Check if two handles refer to the same channel.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ==================== Naming ====================

    /// Local name.
    #[must_use]
    pub fn name(&self) -> String {
        self.inner.lock().name.clone()
    }

    /// Dotted path from the root.
    #[must_use]
    pub fn full_name(&self) -> String {
        self.inner.lock().full_name.clone()
    }

    /// Rename this channel, updating every descendant's full name.
    pub fn set_name(&self, name: impl Into<String>) -> ChannelResult<()> {
        let name = name.into();
        check_name(&name)?;

        let (old_name, parent) = {
            let state = self.inner.lock();
            (state.name.clone(), state.parent())
        };
        if old_name == name {
            return Ok(());
        }

        if let Some(parent) = parent {
            let mut parent_state = parent.inner.lock();
            if parent_state.children.contains_key(&name) {
                return Err(ChannelError::DuplicateName {
                    name,
                    parent: parent_state.full_name.clone(),
                });
            }
            if let Some(me) = parent_state.children.remove(&old_name) {
                parent_state.children.insert(name.clone(), me);
            }
        }

        self.inner.lock().name = name;
        self.refresh_full_name();
        Ok(())
    }

    fn refresh_full_name(&self) {
        let parent_full_name = self.parent().map(|parent| parent.full_name());
        rename_subtree(self, parent_full_name.as_deref());
    }

    // ==================== Tree ====================

    /// The parent channel, if any.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.inner.lock().parent()
    }

    /// Move this channel under `parent`, or detach it with `None`.
    ///
    /// Registered types move with the channel: the old ancestors lose this
    /// subtree's registration counts and the new ones gain them.
    pub fn set_parent(&self, parent: Option<&Self>) -> ChannelResult<()> {
        let (name, old_parent) = {
            let state = self.inner.lock();
            (state.name.clone(), state.parent())
        };

        match (&old_parent, parent) {
            (Some(old), Some(new)) if old.ptr_eq(new) => return Ok(()),
            (None, None) => return Ok(()),
            _ => {}
        }

        if let Some(new) = parent {
            let mut cursor = Some(new.clone());
            while let Some(ancestor) = cursor {
                if ancestor.ptr_eq(self) {
                    return Err(ChannelError::CyclicParent {
                        channel: self.full_name(),
                        parent: new.full_name(),
                    });
                }
                cursor = ancestor.parent();
            }

            let new_state = new.inner.lock();
            if new_state.children.contains_key(&name) {
                return Err(ChannelError::DuplicateName {
                    name,
                    parent: new_state.full_name.clone(),
                });
            }
        }

        let registered = self.inner.lock().registered.clone();

        if let Some(old) = old_parent {
            old.inner.lock().children.remove(&name);
            old.propagate(|set| set.difference_update(&registered));
        }

        match parent {
            Some(new) => {
                new.inner
                    .lock()
                    .children
                    .insert(name, self.clone());
                self.inner.lock().parent = Some(new.downgrade());
                new.propagate(|set| set.update(&registered));
            }
            None => self.inner.lock().parent = None,
        }

        self.refresh_full_name();
        debug!(channel = %self.full_name(), "channel reparented");
        Ok(())
    }

    /// Attach `child` under this channel.
    ///
    /// Fails if a child with the same name is already attached, including
    /// `child` itself.
    pub fn add(&self, child: &Self) -> ChannelResult<()> {
        let name = child.name();
        {
            let state = self.inner.lock();
            if state.children.contains_key(&name) {
                return Err(ChannelError::DuplicateName {
                    name,
                    parent: state.full_name.clone(),
                });
            }
        }
        child.set_parent(Some(self))
    }

    /// Detach `child` from this channel.
    ///
    /// Returns `false` if `child` is not a child of this channel.
    pub fn remove(&self, child: &Self) -> ChannelResult<bool> {
        if !self.contains(child) {
            return Ok(false);
        }
        child.set_parent(None)?;
        Ok(true)
    }

    /// Check if `child` is attached directly under this channel.
    #[must_use]
    pub fn contains(&self, child: &Self) -> bool {
        let name = child.name();
        self.inner
            .lock()
            .children
            .get(&name)
            .is_some_and(|existing| existing.ptr_eq(child))
    }

    /// Check if a child with this name is attached.
    #[must_use]
    pub fn contains_name(&self, name: &str) -> bool {
        self.inner.lock().children.contains_key(name)
    }

    /// Look up a direct child by name.
    #[must_use]
    pub fn child_named(&self, name: &str) -> Option<Self> {
        self.inner.lock().children.get(name).cloned()
    }

    /// Direct children, sorted by name.
    #[must_use]
    pub fn children(&self) -> Vec<Self> {
        let mut children: Vec<(String, Self)> = self
            .inner
            .lock()
            .children
            .iter()
            .map(|(name, child)| (name.clone(), child.clone()))
            .collect();
        children.sort_by(|a, b| a.0.cmp(&b.0));
        children.into_iter().map(|(_, child)| child).collect()
    }

    /// The topmost ancestor (this channel if it has no parent).
    #[must_use]
    pub fn root(&self) -> Self {
        let mut channel = self.clone();
        while let Some(parent) = channel.parent() {
            channel = parent;
        }
        channel
    }

    /// Apply `update` to the registration counts of this channel and every
    /// ancestor.
    fn propagate(&self, update: impl Fn(&mut Multiset<T>)) {
        let mut cursor = Some(self.clone());
        while let Some(channel) = cursor {
            let mut state = channel.inner.lock();
            update(&mut state.registered);
            cursor = state.parent();
        }
    }

    // ==================== Types ====================

    /// Register signal types here and on every ancestor.
    pub fn register<I: IntoIterator<Item = T>>(&self, kinds: I) {
        let kinds: SmallVec<[T; 4]> = kinds.into_iter().collect();
        self.propagate(|set| set.add_all(kinds.iter().cloned()));
        debug!(channel = %self.full_name(), ?kinds, "signal types registered");
    }

    /// Drop one registration of each type here and on every ancestor.
    pub fn unregister<I: IntoIterator<Item = T>>(&self, kinds: I) {
        let kinds: SmallVec<[T; 4]> = kinds.into_iter().collect();
        self.propagate(|set| set.remove_all(kinds.iter()));
        debug!(channel = %self.full_name(), ?kinds, "signal types unregistered");
    }

    /// Check if a type is registered here.
    #[must_use]
    pub fn is_registered(&self, kind: &T) -> bool {
        self.inner.lock().registered.contains(kind)
    }

    /// Check if every type is registered here.
    pub fn are_registered<'a, I>(&self, kinds: I) -> bool
    where
        I: IntoIterator<Item = &'a T>,
    {
        let state = self.inner.lock();
        kinds.into_iter().all(|kind| state.registered.contains(kind))
    }

    /// Number of registrations of a type here, counting descendants.
    #[must_use]
    pub fn registered_count(&self, kind: &T) -> usize {
        self.inner.lock().registered.count(kind)
    }

    /// Every type registered here.
    #[must_use]
    pub fn registered_types(&self) -> Vec<T> {
        self.inner.lock().registered.keys().cloned().collect()
    }

    /// Whether only registered types may be emitted or listened to.
    #[must_use]
    pub fn type_validation(&self) -> bool {
        self.inner.lock().type_validation
    }

    /// Enable or disable type validation.
    pub fn set_type_validation(&self, enabled: bool) {
        self.inner.lock().type_validation = enabled;
    }

    // ==================== Listeners ====================

    /// Create and deploy a listener with default options.
    pub fn listen<F>(&self, kind: impl Into<SignalType<T>>, callback: F) -> ChannelResult<ListenerId>
    where
        F: Fn(&mut Activation<'_, T, P>) + Send + Sync + 'static,
    {
        self.listen_with(kind, ListenOptions::default(), callback)
    }

    /// Create and deploy a listener.
    pub fn listen_with<F>(
        &self,
        kind: impl Into<SignalType<T>>,
        options: ListenOptions<T, P>,
        callback: F,
    ) -> ChannelResult<ListenerId>
    where
        F: Fn(&mut Activation<'_, T, P>) + Send + Sync + 'static,
    {
        let kind = kind.into();
        let mut state = self.inner.lock();
        state.check_listenable(&kind)?;

        let id = ListenerId(state.listeners.insert(ListenerSlot::new(
            kind,
            options,
            Arc::new(callback),
        )));
        state.index_insert(id)?;
        debug!(channel = %state.full_name, listener = %id, "listener deployed");
        Ok(id)
    }

    /// Create a listener without deploying it.
    pub fn create_listener<F>(
        &self,
        kind: impl Into<SignalType<T>>,
        options: ListenOptions<T, P>,
        callback: F,
    ) -> ListenerId
    where
        F: Fn(&mut Activation<'_, T, P>) + Send + Sync + 'static,
    {
        let mut state = self.inner.lock();
        ListenerId(state.listeners.insert(ListenerSlot::new(
            kind.into(),
            options,
            Arc::new(callback),
        )))
    }

    /// Deploy a listener unless it already is.
    pub fn start(&self, id: ListenerId) -> ChannelResult<()> {
        let mut state = self.inner.lock();
        if state.slot(id)?.deployed.is_some() {
            return Ok(());
        }
        state.insert(id)
    }

    /// Undeploy a listener unless it already is.
    pub fn stop(&self, id: ListenerId) -> ChannelResult<()> {
        let mut state = self.inner.lock();
        if state.slot(id)?.deployed.is_none() {
            return Ok(());
        }
        state.detach(id)
    }

    /// Deploy a listener, failing if it already is.
    pub fn deploy(&self, id: ListenerId) -> ChannelResult<()> {
        self.inner.lock().insert(id)
    }

    /// Undeploy a listener, failing if it is not deployed.
    pub fn undeploy(&self, id: ListenerId) -> ChannelResult<()> {
        self.inner.lock().detach(id)
    }

    /// Destroy a listener whether or not it is deployed.
    ///
    /// Returns `false` if the handle was already stale.
    pub fn discard(&self, id: ListenerId) -> bool {
        let mut state = self.inner.lock();
        // Undeployed listeners have nothing to detach
        let _ = state.detach(id);
        state.listeners.remove(id.0).is_some()
    }

    /// Check if a listener is deployed. Stale handles report `false`.
    #[must_use]
    pub fn is_deployed(&self, id: ListenerId) -> bool {
        self.inner
            .lock()
            .listeners
            .get(id.0)
            .is_some_and(|slot| slot.deployed.is_some())
    }

    /// The signal a listener is currently handling.
    ///
    /// Only `Some` while the listener's callback runs. A nested activation
    /// of the same listener reports its own signal until it returns.
    #[must_use]
    pub fn current_match(&self, id: ListenerId) -> Option<Signal<T, P>> {
        self.inner
            .lock()
            .listeners
            .get(id.0)
            .and_then(|slot| slot.current_match.clone())
    }

    /// Snapshot of a listener.
    #[must_use]
    pub fn listener(&self, id: ListenerId) -> Option<ListenerInfo<T>> {
        self.inner.lock().listeners.get(id.0).map(|slot| slot.info(id))
    }

    /// The type a listener waits for.
    pub fn listener_kind(&self, id: ListenerId) -> ChannelResult<SignalType<T>> {
        Ok(self.inner.lock().slot(id)?.kind.clone())
    }

    /// Change the type a listener waits for, re-indexing it if deployed.
    pub fn set_listener_kind(
        &self,
        id: ListenerId,
        kind: impl Into<SignalType<T>>,
    ) -> ChannelResult<()> {
        let kind = kind.into();
        let mut state = self.inner.lock();
        if state.slot(id)?.deployed.is_none() {
            state.slot_mut(id)?.kind = kind;
            return Ok(());
        }

        state.check_listenable(&kind)?;
        state.detach(id)?;
        state.slot_mut(id)?.kind = kind;
        state.index_insert(id)
    }

    /// Activation priority of a listener.
    pub fn listener_priority(&self, id: ListenerId) -> ChannelResult<f64> {
        Ok(self.inner.lock().slot(id)?.priority)
    }

    /// Change a listener's priority, re-indexing it if deployed.
    pub fn set_listener_priority(&self, id: ListenerId, priority: f64) -> ChannelResult<()> {
        let mut state = self.inner.lock();
        if state.slot(id)?.deployed.is_none() {
            state.slot_mut(id)?.priority = priority;
            return Ok(());
        }

        state.detach(id)?;
        state.slot_mut(id)?.priority = priority;
        state.index_insert(id)
    }

    /// Number of deployed listeners on this channel.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.lock().index.len()
    }

    // ==================== Emission ====================

    /// Emit a new signal with no owner.
    pub fn emit(
        &self,
        kind: impl Into<SignalType<T>>,
        payload: impl Into<Option<P>>,
    ) -> ChannelResult<Signal<T, P>> {
        self.emit_as(kind, payload, None)
    }

    /// Emit a new signal.
    ///
    /// Fails with [`ChannelError::WildcardEmit`] for [`SignalType::Any`].
    /// The wildcard is deliberately rejected before any registration check,
    /// so it never reports [`ChannelError::UnregisteredType`], even on
    /// channels without type validation.
    pub fn emit_as(
        &self,
        kind: impl Into<SignalType<T>>,
        payload: impl Into<Option<P>>,
        owner: impl Into<Option<Owner>>,
    ) -> ChannelResult<Signal<T, P>> {
        let SignalType::Is(kind) = kind.into() else {
            return Err(ChannelError::WildcardEmit);
        };
        let signal = Signal {
            origin: self.downgrade(),
            kind,
            payload: payload.into().map(Arc::new),
            owner: owner.into(),
        };
        self.broadcast(&signal)?;
        Ok(signal)
    }

    /// Emit a copy of `signal` from this channel.
    ///
    /// Payload and owner are kept, cleared or replaced per the overrides.
    pub fn emit_copy(
        &self,
        signal: &Signal<T, P>,
        payload: Override<P>,
        owner: Override<Owner>,
    ) -> ChannelResult<Signal<T, P>> {
        let copy = Signal {
            origin: self.downgrade(),
            kind: signal.kind.clone(),
            payload: payload.resolve(signal.payload.clone(), Arc::new),
            owner: owner.resolve(signal.owner.clone(), |owner| owner),
        };
        self.broadcast(&copy)?;
        Ok(copy)
    }

    /// Emit `opening` now and `closing` when the returned scope is released.
    ///
    /// Both types must be concrete.
    pub fn emit_disposable(
        &self,
        opening: impl Into<Emission<T, P>>,
        closing: impl Into<Emission<T, P>>,
    ) -> ChannelResult<SignalScope<T, P>> {
        let opening = opening.into();
        let closing = closing.into();
        if opening.kind.is_any() || closing.kind.is_any() {
            return Err(ChannelError::WildcardEmit);
        }

        self.emit_emission(opening)?;
        Ok(SignalScope::new(self.clone(), closing))
    }

    pub(crate) fn emit_emission(&self, emission: Emission<T, P>) -> ChannelResult<Signal<T, P>> {
        self.emit_as(emission.kind, emission.payload, emission.owner)
    }

    /// Activate matching listeners here, then forward to the parent.
    ///
    /// The listener lists are snapshotted first, so listeners deployed or
    /// stopped by a callback only affect later broadcasts.
    fn broadcast(&self, signal: &Signal<T, P>) -> ChannelResult<()> {
        let snapshot: SmallVec<[ListenerId; 8]> = {
            let state = self.inner.lock();
            state.check_registered(&signal.kind)?;
            let typed = state.index.get(&SignalType::Is(signal.kind.clone()));
            let wildcard = state.index.get(&SignalType::Any);
            typed
                .iter()
                .chain(wildcard)
                .map(|entry| entry.id)
                .collect()
        };

        for id in snapshot {
            self.activate(id, signal);
        }

        if let Some(parent) = self.parent() {
            parent.broadcast(signal)?;
        }
        Ok(())
    }

    fn activate(&self, id: ListenerId, signal: &Signal<T, P>) {
        let condition = {
            let state = self.inner.lock();
            let Some(slot) = state.listeners.get(id.0) else {
                // Discarded earlier in this broadcast
                return;
            };
            slot.condition.clone()
        };
        if condition.is_some_and(|condition| !condition(signal)) {
            return;
        }

        let (callback, previous) = {
            let mut state = self.inner.lock();
            let Some(slot) = state.listeners.get_mut(id.0) else {
                return;
            };
            let previous = slot.current_match.replace(signal.clone());
            (Arc::clone(&slot.callback), previous)
        };

        trace!(listener = %id, kind = ?signal.kind, "activating listener");
        let mut activation = Activation {
            channel: self,
            id,
            signal,
        };
        callback(&mut activation);

        // Nested activations of this listener have already restored theirs
        if let Some(slot) = self.inner.lock().listeners.get_mut(id.0) {
            slot.current_match = previous;
        }
    }
}

impl<T: SignalKind, P: Payload> fmt::Display for Channel<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        let kinds: Vec<SignalType<T>> = if state.type_validation {
            state.registered.keys().cloned().map(SignalType::Is).collect()
        } else {
            state.index.keys().cloned().collect()
        };
        let mut entries: Vec<String> = kinds
            .iter()
            .map(|kind| format!("{kind} ({})", state.index.get(kind).len()))
            .collect();
        entries.sort();
        write!(
            f,
            "{}, typeValidation={}, [{}]",
            state.full_name,
            state.type_validation,
            entries.join(", ")
        )
    }
}

impl<T: SignalKind, P: Payload> fmt::Debug for Channel<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("Channel")
            .field("full_name", &state.full_name)
            .field("type_validation", &state.type_validation)
            .field("registered", &state.registered)
            .field("listeners", &state.index.len())
            .field("children", &state.children.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    type Log = Arc<Mutex<Vec<String>>>;

    fn log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn record(
        log: &Log,
        name: &'static str,
    ) -> impl Fn(&mut Activation<'_, &'static str, ()>) + Send + Sync + 'static {
        let log = Arc::clone(log);
        move |_| log.lock().push(name.to_owned())
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().clone()
    }

    #[test]
    fn test_name_with_separator_rejected() {
        assert_eq!(
            Channel::<&str>::new("a.b").unwrap_err(),
            ChannelError::InvalidName {
                name: "a.b".to_owned()
            }
        );

        let channel = Channel::<&str>::new("arena").unwrap();
        assert!(matches!(
            channel.set_name("bad.name"),
            Err(ChannelError::InvalidName { .. })
        ));
        assert_eq!(channel.name(), "arena");
    }

    #[test]
    fn test_full_names_follow_tree() {
        let root = Channel::<&str>::new("game").unwrap();
        let arena = root.child("arena").unwrap();
        let goal = arena.child("goal").unwrap();

        assert_eq!(root.full_name(), "game");
        assert_eq!(arena.full_name(), "game.arena");
        assert_eq!(goal.full_name(), "game.arena.goal");

        arena.set_name("field").unwrap();
        assert_eq!(goal.full_name(), "game.field.goal");
        assert!(root.contains_name("field"));
        assert!(!root.contains_name("arena"));

        arena.set_parent(None).unwrap();
        assert_eq!(arena.full_name(), "field");
        assert_eq!(goal.full_name(), "field.goal");
        assert!(root.children().is_empty());
    }

    #[test]
    fn test_orphaned_child_becomes_root() {
        let root = Channel::<&str>::new("game").unwrap();
        let arena = root.child("arena").unwrap();
        let goal = arena.child("goal").unwrap();
        let weak_root = root.downgrade();

        drop(root);
        assert!(weak_root.upgrade().is_none());
        assert!(arena.parent().is_none());
        assert!(goal.root().ptr_eq(&arena));
        assert_eq!(arena.full_name(), "arena");
        assert_eq!(goal.full_name(), "arena.goal");
    }

    #[test]
    fn test_duplicate_child_names_rejected() {
        let root = Channel::<&str>::new("root").unwrap();
        let first = root.child("arena").unwrap();
        let second = Channel::new("arena").unwrap();

        assert!(matches!(
            root.add(&second),
            Err(ChannelError::DuplicateName { .. })
        ));
        assert!(matches!(
            root.add(&first),
            Err(ChannelError::DuplicateName { .. })
        ));
        assert!(second.parent().is_none());

        let other = root.child("lobby").unwrap();
        assert!(matches!(
            other.set_name("arena"),
            Err(ChannelError::DuplicateName { .. })
        ));
        assert_eq!(other.full_name(), "root.lobby");
    }

    #[test]
    fn test_cyclic_parent_rejected() {
        let root = Channel::<&str>::new("root").unwrap();
        let child = root.child("child").unwrap();
        let grandchild = child.child("grandchild").unwrap();

        assert!(matches!(
            root.set_parent(Some(&grandchild)),
            Err(ChannelError::CyclicParent { .. })
        ));
        assert!(matches!(
            root.set_parent(Some(&root)),
            Err(ChannelError::CyclicParent { .. })
        ));
        assert!(root.parent().is_none());
        assert!(grandchild.root().ptr_eq(&root));
    }

    #[test]
    fn test_registration_propagates_to_ancestors() {
        let root = Channel::<&str>::new("root").unwrap();
        let arena = root.child("arena").unwrap();
        let goal = arena.child("goal").unwrap();
        let lobby = root.child("lobby").unwrap();

        goal.register(["score"]);
        lobby.register(["score"]);

        assert!(goal.is_registered(&"score"));
        assert!(arena.is_registered(&"score"));
        assert_eq!(root.registered_count(&"score"), 2);
        assert!(!lobby.is_registered(&"other"));

        goal.unregister(["score"]);
        assert!(!arena.is_registered(&"score"));
        // Still referenced through the lobby
        assert!(root.is_registered(&"score"));

        lobby.unregister(["score"]);
        assert!(!root.is_registered(&"score"));
    }

    #[test]
    fn test_reparenting_moves_registrations() {
        let left = Channel::<&str>::new("left").unwrap();
        let right = Channel::<&str>::new("right").unwrap();
        let leaf = Channel::<&str>::new("leaf").unwrap();
        leaf.register(["goal", "goal", "turn"]);

        left.add(&leaf).unwrap();
        assert_eq!(left.registered_count(&"goal"), 2);
        assert!(left.are_registered(&["goal", "turn"]));

        leaf.set_parent(Some(&right)).unwrap();
        assert!(left.registered_types().is_empty());
        assert_eq!(right.registered_count(&"goal"), 2);
        assert!(!left.contains(&leaf));
        assert!(right.contains(&leaf));

        assert!(right.remove(&leaf).unwrap());
        assert!(!right.remove(&leaf).unwrap());
        assert!(right.registered_types().is_empty());
        assert_eq!(leaf.registered_count(&"goal"), 2);
    }

    #[test]
    fn test_listen_requires_registration() {
        let channel = Channel::<&str>::new("root").unwrap();
        let result = channel.listen("goal", |_| {});
        assert_eq!(
            result.unwrap_err(),
            ChannelError::UnregisteredType {
                kind: "\"goal\"".to_owned(),
                channel: "root".to_owned()
            }
        );
        assert_eq!(channel.listener_count(), 0);

        // The wildcard is always listenable
        channel.listen(SignalType::Any, |_| {}).unwrap();

        channel.register(["goal"]);
        channel.listen("goal", |_| {}).unwrap();
        assert_eq!(channel.listener_count(), 2);
    }

    #[test]
    fn test_emit_requires_registration() {
        let channel = Channel::<&str>::new("root").unwrap();
        assert!(matches!(
            channel.emit("goal", None),
            Err(ChannelError::UnregisteredType { .. })
        ));

        channel.set_type_validation(false);
        let seen = log();
        channel.listen("goal", record(&seen, "goal")).unwrap();
        channel.emit("goal", None).unwrap();
        assert_eq!(entries(&seen), vec!["goal"]);
    }

    #[test]
    fn test_wildcard_emit_rejected() {
        let channel = Channel::<&str>::unvalidated("root").unwrap();
        assert_eq!(
            channel.emit(SignalType::Any, None).unwrap_err(),
            ChannelError::WildcardEmit
        );
        assert!(matches!(
            channel.emit_disposable(Emission::new(SignalType::Any), "end"),
            Err(ChannelError::WildcardEmit)
        ));

        // Not reported as an unregistered type on a validating channel either
        let validating = Channel::<&str>::new("root").unwrap();
        assert_eq!(
            validating.emit(SignalType::Any, None).unwrap_err(),
            ChannelError::WildcardEmit
        );
    }

    #[test]
    fn test_listeners_activate_by_priority_then_deployment() {
        let channel = Channel::<&str>::new("root").unwrap();
        channel.register(["goal"]);
        let seen = log();

        channel
            .listen_with(
                "goal",
                ListenOptions::default().priority(2.0),
                record(&seen, "late"),
            )
            .unwrap();
        channel.listen("goal", record(&seen, "first")).unwrap();
        channel.listen(SignalType::Any, record(&seen, "wildcard")).unwrap();
        channel.listen("goal", record(&seen, "second")).unwrap();
        channel
            .listen_with(
                "goal",
                ListenOptions::default().priority(-1.0),
                record(&seen, "early"),
            )
            .unwrap();

        channel.emit("goal", None).unwrap();
        assert_eq!(
            entries(&seen),
            vec!["early", "first", "second", "late", "wildcard"]
        );
    }

    #[test]
    fn test_condition_filters_single_listener() {
        let channel = Channel::<&str, u32>::new("root").unwrap();
        channel.register(["score"]);
        let seen = log();

        channel
            .listen_with(
                "score",
                ListenOptions::default().when(|signal: &Signal<&str, u32>| {
                    signal.payload() == Some(&3)
                }),
                {
                    let seen = Arc::clone(&seen);
                    move |_: &mut Activation<'_, &str, u32>| seen.lock().push("three".to_owned())
                },
            )
            .unwrap();
        let sink = Arc::clone(&seen);
        channel
            .listen("score", move |_: &mut Activation<'_, &str, u32>| {
                sink.lock().push("any score".to_owned());
            })
            .unwrap();

        channel.emit("score", 1).unwrap();
        channel.emit("score", 3).unwrap();
        assert_eq!(entries(&seen), vec!["any score", "three", "any score"]);
    }

    #[test]
    fn test_propagation_is_upward_only() {
        let root = Channel::<&str>::new("root").unwrap();
        root.register(["goal"]);
        let arena = Channel::unvalidated("arena").unwrap();
        root.add(&arena).unwrap();
        let lobby = root.child("lobby").unwrap();
        let seen = log();

        arena.listen("goal", record(&seen, "arena")).unwrap();
        root.listen("goal", record(&seen, "root")).unwrap();
        lobby.listen(SignalType::Any, record(&seen, "lobby")).unwrap();

        arena.emit("goal", None).unwrap();
        assert_eq!(entries(&seen), vec!["arena", "root"]);

        seen.lock().clear();
        root.emit("goal", None).unwrap();
        assert_eq!(entries(&seen), vec!["root"]);
    }

    #[test]
    fn test_signal_carries_origin() {
        let root = Channel::<&str, &str>::new("root").unwrap();
        let arena = root.child("arena").unwrap();
        arena.register(["goal"]);
        let origins = log();
        let sink = Arc::clone(&origins);

        root.listen("goal", move |activation: &mut Activation<'_, &str, &str>| {
            let origin = activation.signal().origin().map(|c| c.full_name());
            sink.lock().push(origin.unwrap_or_default());
        })
        .unwrap();

        let signal = arena.emit("goal", "red").unwrap();
        assert_eq!(signal.payload(), Some(&"red"));
        assert_eq!(entries(&origins), vec!["root.arena"]);
    }

    #[test]
    fn test_stop_during_activation() {
        let channel = Channel::<&str>::new("root").unwrap();
        channel.register(["tick"]);
        let seen = log();
        let sink = Arc::clone(&seen);

        let id = channel
            .listen("tick", move |activation: &mut Activation<'_, &str, ()>| {
                sink.lock().push("once".to_owned());
                activation.stop().unwrap();
            })
            .unwrap();

        channel.emit("tick", None).unwrap();
        channel.emit("tick", None).unwrap();
        assert_eq!(entries(&seen), vec!["once"]);
        assert!(!channel.is_deployed(id));

        channel.start(id).unwrap();
        channel.emit("tick", None).unwrap();
        assert_eq!(entries(&seen), vec!["once", "once"]);
    }

    #[test]
    fn test_snapshot_isolates_running_broadcast() {
        let channel = Channel::<&str>::new("root").unwrap();
        channel.register(["tick"]);
        let seen = log();

        let late = channel.create_listener("tick", ListenOptions::default(), record(&seen, "late"));
        let victim = channel
            .listen_with(
                "tick",
                ListenOptions::default().priority(1.0),
                record(&seen, "victim"),
            )
            .unwrap();

        let sink = Arc::clone(&seen);
        channel
            .listen_with(
                "tick",
                ListenOptions::default().priority(-1.0),
                move |activation: &mut Activation<'_, &str, ()>| {
                    sink.lock().push("starter".to_owned());
                    let channel = activation.channel();
                    channel.start(late).unwrap();
                    channel.stop(victim).unwrap();
                },
            )
            .unwrap();

        channel.emit("tick", None).unwrap();
        // Deployments made mid-broadcast wait for the next one
        assert_eq!(entries(&seen), vec!["starter", "victim"]);

        seen.lock().clear();
        channel.emit("tick", None).unwrap();
        assert_eq!(entries(&seen), vec!["starter", "late"]);
    }

    #[test]
    fn test_current_match_only_during_activation() {
        let channel = Channel::<&str, u8>::new("root").unwrap();
        channel.register(["goal"]);
        let observed = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&observed);

        let id = channel
            .listen("goal", move |activation: &mut Activation<'_, &str, u8>| {
                let current = activation.channel().current_match(activation.listener());
                *sink.lock() = current.and_then(|signal| signal.payload().copied());
            })
            .unwrap();

        channel.emit("goal", 9).unwrap();
        assert_eq!(*observed.lock(), Some(9));
        assert!(channel.current_match(id).is_none());
    }

    #[test]
    fn test_strict_deploy_and_undeploy() {
        let channel = Channel::<&str>::new("root").unwrap();
        channel.register(["goal"]);
        let id = channel.listen("goal", |_| {}).unwrap();

        assert_eq!(channel.deploy(id), Err(ChannelError::DuplicateDeploy(id)));
        channel.start(id).unwrap();

        channel.undeploy(id).unwrap();
        assert_eq!(channel.undeploy(id), Err(ChannelError::NotDeployed(id)));
        channel.stop(id).unwrap();

        assert!(channel.discard(id));
        assert_eq!(channel.start(id), Err(ChannelError::UnknownListener(id)));
        assert!(!channel.discard(id));
    }

    #[test]
    fn test_listener_ids_are_channel_scoped() {
        let first = Channel::<&str>::unvalidated("first").unwrap();
        let second = Channel::<&str>::unvalidated("second").unwrap();
        let id = first.listen("goal", |_| {}).unwrap();
        second.listen("goal", |_| {}).unwrap();

        assert_eq!(second.stop(id), Err(ChannelError::UnknownListener(id)));
        assert!(first.is_deployed(id));
    }

    #[test]
    fn test_priority_and_kind_changes_reindex() {
        let channel = Channel::<&str>::new("root").unwrap();
        channel.register(["goal", "turn"]);
        let seen = log();

        let a = channel.listen("goal", record(&seen, "a")).unwrap();
        channel.listen("goal", record(&seen, "b")).unwrap();
        channel.set_listener_priority(a, 5.0).unwrap();
        assert_eq!(channel.listener_priority(a).unwrap(), 5.0);

        channel.emit("goal", None).unwrap();
        assert_eq!(entries(&seen), vec!["b", "a"]);

        channel.set_listener_kind(a, "turn").unwrap();
        assert_eq!(channel.listener_kind(a).unwrap(), SignalType::Is("turn"));
        assert!(matches!(
            channel.set_listener_kind(a, "unknown"),
            Err(ChannelError::UnregisteredType { .. })
        ));
        assert!(channel.is_deployed(a));

        seen.lock().clear();
        channel.emit("turn", None).unwrap();
        assert_eq!(entries(&seen), vec!["a"]);
    }

    #[test]
    fn test_emit_copy_overrides() {
        let root = Channel::<&str, u32>::new("root").unwrap();
        let arena = root.child("arena").unwrap();
        arena.register(["score"]);

        let original = arena
            .emit_as("score", 7, Owner::from("player1"))
            .unwrap();

        let kept = root
            .emit_copy(&original, Override::Keep, Override::Keep)
            .unwrap();
        assert_eq!(kept.payload(), Some(&7));
        assert_eq!(kept.owner().map(Owner::as_str), Some("player1"));
        assert!(kept.origin().is_some_and(|origin| origin.ptr_eq(&root)));

        let replaced = root
            .emit_copy(&original, Override::Set(9), Override::Clear)
            .unwrap();
        assert_eq!(replaced.payload(), Some(&9));
        assert!(replaced.owner().is_none());

        let cleared = root
            .emit_copy(&original, Override::Clear, Override::Keep)
            .unwrap();
        assert!(cleared.payload().is_none());
    }

    #[test]
    fn test_reentrant_emit_from_listener() {
        let channel = Channel::<&str>::new("root").unwrap();
        channel.register(["ping", "pong"]);
        let seen = log();

        let sink = Arc::clone(&seen);
        channel
            .listen("ping", move |activation: &mut Activation<'_, &str, ()>| {
                sink.lock().push("ping".to_owned());
                activation.channel().emit("pong", None).unwrap();
            })
            .unwrap();
        channel.listen("pong", record(&seen, "pong")).unwrap();

        channel.emit("ping", None).unwrap();
        assert_eq!(entries(&seen), vec!["ping", "pong"]);
    }

    #[test]
    fn test_self_triggering_listener_recurses() {
        let channel = Channel::<&str, u8>::new("root").unwrap();
        channel.register(["echo"]);
        let entered = Arc::new(Mutex::new(Vec::new()));
        let restored = Arc::new(Mutex::new(Vec::new()));
        let (enter_sink, restore_sink) = (Arc::clone(&entered), Arc::clone(&restored));

        let id = channel
            .listen("echo", move |activation: &mut Activation<'_, &str, u8>| {
                let depth = activation.payload().copied().unwrap_or_default();
                enter_sink.lock().push(depth);
                if depth < 3 {
                    activation.channel().emit("echo", depth + 1).unwrap();
                }
                let current = activation.channel().current_match(activation.listener());
                restore_sink
                    .lock()
                    .push(current.and_then(|signal| signal.payload().copied()));
            })
            .unwrap();

        channel.emit("echo", 0).unwrap();
        assert_eq!(*entered.lock(), vec![0, 1, 2, 3]);
        // Each level sees its own signal again once the nested one returns
        assert_eq!(*restored.lock(), vec![Some(3), Some(2), Some(1), Some(0)]);
        assert!(channel.current_match(id).is_none());
    }

    #[test]
    fn test_wildcard_listener_sees_its_own_emission() {
        let game = Channel::<&str>::new("game").unwrap();
        game.register(["turn_start", "log"]);
        let seen = log();
        let sink = Arc::clone(&seen);

        game.listen(SignalType::Any, move |activation: &mut Activation<'_, &str, ()>| {
            let kind = *activation.signal().kind();
            sink.lock().push(kind.to_owned());
            if kind == "turn_start" {
                activation.channel().emit("log", None).unwrap();
            }
        })
        .unwrap();

        game.emit("turn_start", None).unwrap();
        assert_eq!(entries(&seen), vec!["turn_start", "log"]);
    }

    #[test]
    fn test_display() {
        let root = Channel::<&str>::new("root").unwrap();
        root.register(["goal", "turn"]);
        root.listen("goal", |_| {}).unwrap();
        root.listen("goal", |_| {}).unwrap();
        assert_eq!(
            root.to_string(),
            "root, typeValidation=true, [\"goal\" (2), \"turn\" (0)]"
        );

        let loose = Channel::<&str>::unvalidated("loose").unwrap();
        loose.listen(SignalType::Any, |_| {}).unwrap();
        assert_eq!(loose.to_string(), "loose, typeValidation=false, [* (1)]");
    }

    #[test]
    fn test_listener_info_display() {
        let channel = Channel::<&str>::new("root").unwrap();
        channel.register(["goal"]);
        let id = channel
            .listen_with(
                "goal",
                ListenOptions::default()
                    .priority(1.5)
                    .owner("keeper")
                    .when(|_: &Signal<&str, ()>| true),
                |_| {},
            )
            .unwrap();

        let info = channel.listener(id).unwrap();
        assert!(info.deployed);
        assert_eq!(
            info.to_string(),
            format!("|\"goal\"| if condition -> {id} by keeper, priority=1.5")
        );
    }
}

//! Channel error types.

use thiserror::Error;

use crate::ListenerId;

/// Channel error type.
///
/// Every variant aborts the triggering call before it mutates any channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Channel name contains the path separator.
    #[error("channel name {name:?} contains the separator '{}'", crate::NAME_SEPARATOR)]
    InvalidName { name: String },

    /// A sibling already uses this name.
    #[error("name {name:?} already in use under {parent:?}")]
    DuplicateName { name: String, parent: String },

    /// Type validation is on and the signal type is not registered.
    #[error("signal type {kind} is not registered on {channel:?}")]
    UnregisteredType { kind: String, channel: String },

    /// The wildcard type cannot be emitted as a concrete signal.
    #[error("cannot emit a signal of type ANY")]
    WildcardEmit,

    /// Attempt to deploy a listener that is already deployed.
    #[error("listener {0} is already deployed")]
    DuplicateDeploy(ListenerId),

    /// Attempt to remove a listener that is not deployed.
    #[error("listener {0} is not deployed")]
    NotDeployed(ListenerId),

    /// Handle is stale or belongs to another channel.
    #[error("unknown listener {0}")]
    UnknownListener(ListenerId),

    /// Reparenting would make a channel its own ancestor.
    #[error("cannot place {channel:?} under its descendant {parent:?}")]
    CyclicParent { channel: String, parent: String },
}

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

#![allow(clippy::float_cmp)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::redundant_pub_crate)]

//! Hierarchical signal channels.
//!
//! Channels form a tree of named nodes. Each node keeps a reference count of
//! the signal types registered on it or below it, and an index of deployed
//! listeners per type.
//!
//! Emitting a [`Signal`] on a channel:
//!
//! 1. checks the type is registered (when type validation is on),
//! 2. snapshots the listeners for the exact type, then for [`SignalType::Any`],
//! 3. activates each listener whose condition holds, lowest priority first,
//! 4. forwards the same signal to the parent, up to the root.
//!
//! Siblings and children never see a signal.
//!
//! # Example
//!
//! ```ignore
//! use fury_channel::prelude::*;
//!
//! let root: Channel<&str, u32> = Channel::new("game")?;
//! let arena = root.child("arena")?;
//! arena.register(["goal"]);
//!
//! root.listen("goal", |activation| {
//!     println!("goal scored: {:?}", activation.payload());
//! })?;
//!
//! arena.emit("goal", 3)?;
//! ```

mod channel;
mod config;
mod error;
mod listener;
mod scope;
mod signal;

pub use channel::{Channel, WeakChannel};
pub use config::ChannelConfig;
pub use error::{ChannelError, ChannelResult};
pub use listener::{Activation, ListenOptions, ListenerId, ListenerInfo};
pub use scope::SignalScope;
pub use signal::{Emission, Override, Payload, Signal, SignalKind, SignalType};

/// Separator between channel names in a full name.
pub const NAME_SEPARATOR: char = '.';

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Activation, Channel, ChannelError, ChannelResult, Emission, ListenOptions, ListenerId,
        Override, Signal, SignalScope, SignalType,
    };
}

#![allow(clippy::float_cmp)]

//! Discrete-event simulation core.
//!
//! Re-exports the [`Calendar`] (logical time and scheduled events) and the
//! [`Channel`] tree (typed signals propagating toward the root), plus
//! [`TurnTimer`], a countdown built from both.
//!
//! The two halves meet in callbacks: an event's callback typically emits a
//! signal, and a listener's callback may schedule further events.
//!
//! ```ignore
//! use fury_sim::prelude::*;
//!
//! let calendar = Calendar::new(0.0);
//! let game: Channel<&str> = Channel::new("game")?;
//! game.register(["kickoff"]);
//!
//! let channel = game.clone();
//! calendar.schedule_at(5.0, move |_| {
//!     channel.emit("kickoff", None).unwrap();
//! })?;
//!
//! calendar.set_time(10.0)?;
//! ```

mod turn_timer;

pub use fury_calendar::{
    Calendar, CalendarError, CalendarResult, EventId, EventInfo, EventOptions, Fired,
    WeakCalendar,
};
pub use fury_channel::{
    Activation, Channel, ChannelConfig, ChannelError, ChannelResult, Emission, ListenOptions,
    ListenerId, ListenerInfo, NAME_SEPARATOR, Override, Payload, Signal, SignalKind, SignalScope,
    SignalType, WeakChannel,
};
pub use fury_collections::Owner;
pub use turn_timer::{Countdown, TurnTimer, TurnTimerConfig};

/// Prelude for convenient imports
pub mod prelude {
    pub use fury_calendar::prelude::*;
    pub use fury_channel::prelude::*;

    pub use crate::{Countdown, Owner, TurnTimer, TurnTimerConfig};
}

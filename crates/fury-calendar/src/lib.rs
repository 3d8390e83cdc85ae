#![allow(clippy::float_cmp)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::redundant_pub_crate)]

//! Discrete-event calendar.
//!
//! A [`Calendar`] owns a logical clock and the ordered set of events that
//! have not fired yet. Time only moves when the owner says so:
//!
//! - [`Calendar::set_time`] / [`Calendar::advance`] fire everything due on
//!   the way, in `(date, priority)` order with ties broken by deployment
//!   order.
//! - [`Calendar::step`] fires the next `n` events whatever their dates.
//! - [`Calendar::jump`] hops to the next `n` distinct pending dates.
//!
//! # Reentrancy
//!
//! An event leaves the pending order before its callback runs, and no lock
//! is held during the callback. Callbacks may therefore schedule, cancel or
//! reschedule events (including themselves) on the calendar that fired them,
//! and the firing loop always re-reads the live pending order.
//!
//! # Example
//!
//! ```ignore
//! use fury_calendar::{Calendar, EventOptions};
//!
//! let calendar = Calendar::new(0.0);
//! calendar.schedule_at_with(5.0, EventOptions::default().priority(1.0), |_| println!("A"))?;
//! calendar.schedule_at(5.0, |_| println!("B"))?;
//! calendar.schedule_at(3.0, |_| println!("C"))?;
//!
//! // Prints C, B, A
//! calendar.set_time(10.0)?;
//! assert_eq!(calendar.time(), 10.0);
//! ```

mod calendar;
mod error;
mod event;

pub use calendar::{Calendar, WeakCalendar};
pub use error::{CalendarError, CalendarResult};
pub use event::{EventId, EventInfo, EventOptions, Fired};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{Calendar, CalendarError, CalendarResult, EventId, EventOptions, Fired};
}

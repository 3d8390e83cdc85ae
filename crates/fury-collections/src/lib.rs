//! Supporting collections for the fury simulation core.
//!
//! - [`Multiset`]: reference count per key. Channels use it to track how many
//!   registrations exist for a signal type across a subtree.
//! - [`SortedMultimap`]: per-key sequence kept ordered on every insertion.
//!   Channels keep their per-type listener buckets in one.
//! - [`Arena`]: generational slot storage addressed by [`Handle`]. Calendars
//!   and channels own their events and listeners through it, so callers hold
//!   plain `Copy` handles instead of back-references.
//! - [`Owner`]: cheap debugging tag attached to events, listeners and signals.

mod arena;
mod multiset;
mod owner;
mod sorted_multimap;

pub use arena::{Arena, ArenaId, Generation, Handle};
pub use multiset::Multiset;
pub use owner::Owner;
pub use sorted_multimap::SortedMultimap;

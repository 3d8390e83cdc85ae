//! Bracketed signal pairs.

use std::fmt;

use tracing::error;

use crate::channel::Channel;
use crate::error::ChannelResult;
use crate::signal::{Emission, Payload, Signal, SignalKind};

/// Guard returned by [`Channel::emit_disposable`].
///
/// The closing signal is emitted exactly once: by [`SignalScope::finish`],
/// or when the guard is dropped (early return, `?`, or unwinding).
#[must_use = "dropping the scope immediately emits the closing signal"]
pub struct SignalScope<T: SignalKind, P: Payload> {
    channel: Channel<T, P>,
    closing: Option<Emission<T, P>>,
}

impl<T: SignalKind, P: Payload> SignalScope<T, P> {
    pub(crate) const fn new(channel: Channel<T, P>, closing: Emission<T, P>) -> Self {
        Self {
            channel,
            closing: Some(closing),
        }
    }

    /// Emit the closing signal now and report the outcome.
    pub fn finish(mut self) -> ChannelResult<Option<Signal<T, P>>> {
        self.close()
    }

    /// Check if the closing signal is still pending.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.closing.is_some()
    }

    /// The channel both signals are emitted on.
    #[must_use]
    pub const fn channel(&self) -> &Channel<T, P> {
        &self.channel
    }

    fn close(&mut self) -> ChannelResult<Option<Signal<T, P>>> {
        let Some(closing) = self.closing.take() else {
            return Ok(None);
        };
        self.channel.emit_emission(closing).map(Some)
    }
}

impl<T: SignalKind, P: Payload> Drop for SignalScope<T, P> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            error!(channel = %self.channel.full_name(), %err, "failed to emit closing signal");
        }
    }
}

impl<T: SignalKind, P: Payload> fmt::Debug for SignalScope<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalScope")
            .field("channel", &self.channel.full_name())
            .field("closing", &self.closing.as_ref().map(|closing| &closing.kind))
            .finish()
    }
}

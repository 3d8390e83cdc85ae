//! Declarative channel trees.
//!
//! ```json
//! {
//!   "name": "game",
//!   "types": ["turn_start", "turn_end"],
//!   "children": [{ "name": "arena", "types": ["goal"] }]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::channel::Channel;
use crate::error::ChannelResult;
use crate::signal::{Payload, SignalKind};

const fn default_type_validation() -> bool {
    true
}

/// Description of a channel and its subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig<T> {
    pub name: String,
    #[serde(default = "default_type_validation")]
    pub type_validation: bool,
    /// Types registered on this node (and therefore on every ancestor).
    #[serde(default = "Vec::new", skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<T>,
    #[serde(default = "Vec::new", skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ChannelConfig<T>>,
}

impl<T> ChannelConfig<T> {
    /// A validating leaf with no registered types.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_validation: true,
            types: Vec::new(),
            children: Vec::new(),
        }
    }
}

impl<T: SignalKind> ChannelConfig<T> {
    /// Build the described tree, returning its root.
    pub fn build<P: Payload>(&self) -> ChannelResult<Channel<T, P>> {
        Channel::from_config(self)
    }
}

impl<T: SignalKind, P: Payload> Channel<T, P> {
    /// Build a channel tree from its description.
    pub fn from_config(config: &ChannelConfig<T>) -> ChannelResult<Self> {
        let channel = Self::with_validation(config.name.clone(), config.type_validation)?;
        channel.register(config.types.iter().cloned());
        for child in &config.children {
            channel.add(&Self::from_config(child)?)?;
        }
        Ok(channel)
    }
}

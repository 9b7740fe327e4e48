//! Engine configuration
//!
//! Mailbox sizing and the policy used to build a vertex's input when it has
//! more than one dependency.

use serde::{Deserialize, Serialize};

/// How the input of a vertex with several dependencies is assembled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMerge {
    /// The content of the message that satisfied the last pending dependency
    /// becomes the input. Earlier messages are not accumulated and the
    /// computation receives an empty message list.
    #[default]
    LastMessage,

    /// The input is a JSON object keyed by sender vertex id holding every
    /// inbound message content, and the computation also receives all inbound
    /// messages.
    ByDependency,
}

impl std::str::FromStr for InputMerge {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last_message" | "last" => Ok(InputMerge::LastMessage),
            "by_dependency" | "by-dependency" => Ok(InputMerge::ByDependency),
            other => Err(format!("unknown input merge policy: {}", other)),
        }
    }
}

/// Actor engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Mailbox capacity per actor (None = unbounded)
    #[serde(default)]
    pub mailbox_capacity: Option<usize>,

    /// Input assembly policy for multi-dependency vertices
    #[serde(default)]
    pub input_merge: InputMerge,
}

impl EngineConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound every mailbox to `capacity` messages (minimum 1)
    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = Some(capacity.max(1));
        self
    }

    /// Use unbounded mailboxes
    pub fn with_unbounded_mailboxes(mut self) -> Self {
        self.mailbox_capacity = None;
        self
    }

    /// Set the input merge policy
    pub fn with_input_merge(mut self, merge: InputMerge) -> Self {
        self.input_merge = merge;
        self
    }
}

//! Triggering events
//!
//! Every run is bound to the in-game event that caused it. Lines may be
//! restricted to one event; unrestricted lines run for all of them.

use crate::error::{Result, ScriptError};
use housing_core::PlayerId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// In-game event types a script can react to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventType {
    /// Player entered the house
    PlayerJoin,

    /// Player left the house
    PlayerQuit,

    /// Player right-clicked a scripted block or entity
    PlayerInteract,

    /// Player said something in chat
    PlayerChat,

    /// Player broke a block
    BlockBreak,

    /// Player placed a block
    BlockPlace,

    /// Recurring timer
    Timer { seconds: f64 },

    /// Named event fired by another script or the host
    Custom { name: String },
}

impl EventType {
    pub fn name(&self) -> &str {
        match self {
            EventType::PlayerJoin => "playerjoin",
            EventType::PlayerQuit => "playerquit",
            EventType::PlayerInteract => "playerinteract",
            EventType::PlayerChat => "playerchat",
            EventType::BlockBreak => "blockbreak",
            EventType::BlockPlace => "blockplace",
            EventType::Timer { .. } => "timer",
            EventType::Custom { name } => name,
        }
    }
}

impl FromStr for EventType {
    type Err = ScriptError;

    /// Parse event type from string (`"playerjoin"`, `"timer 5"`, `"event doorbell"`)
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        let keyword = parts.first().map(|k| k.to_lowercase());

        match keyword.as_deref() {
            Some("timer") => {
                let seconds = parts
                    .get(1)
                    .and_then(|s| s.parse::<f64>().ok())
                    .filter(|s| *s > 0.0)
                    .ok_or_else(|| ScriptError::Validation(format!("Invalid timer interval: {}", s)))?;
                Ok(EventType::Timer { seconds })
            }
            Some("event") => match parts.get(1) {
                Some(name) => Ok(EventType::Custom { name: name.to_string() }),
                None => Err(ScriptError::Validation("Custom event requires a name".into())),
            },
            Some("playerjoin") => Ok(EventType::PlayerJoin),
            Some("playerquit") => Ok(EventType::PlayerQuit),
            Some("playerinteract") => Ok(EventType::PlayerInteract),
            Some("playerchat") => Ok(EventType::PlayerChat),
            Some("blockbreak") => Ok(EventType::BlockBreak),
            Some("blockplace") => Ok(EventType::BlockPlace),
            _ => Err(ScriptError::Validation(format!("Unknown event type: {}", s))),
        }
    }
}

/// What started a run: the event and the player behind it, if any
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub event: Option<EventType>,
    pub player: Option<PlayerId>,
}

impl Trigger {
    pub fn new(event: EventType) -> Self {
        Self {
            event: Some(event),
            player: None,
        }
    }

    /// Run every enabled line regardless of its event
    pub fn manual() -> Self {
        Self {
            event: None,
            player: None,
        }
    }

    pub fn by(mut self, player: impl Into<PlayerId>) -> Self {
        self.player = Some(player.into());
        self
    }
}

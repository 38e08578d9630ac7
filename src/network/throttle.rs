//! Player Action Throttle
//!
//! Suppresses re-sending an identical player action within one tick. Two
//! peers sampling the same input at slightly different times must still
//! issue the action exactly once per tick.

use crate::protocol::Command;

/// Last player action sent this tick.
#[derive(Debug, Default)]
pub struct ActionThrottle {
    last: Option<Vec<u8>>,
}

impl ActionThrottle {
    /// Create an empty throttle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if `command` (encoded as `bytes`) should go out.
    ///
    /// Only the player-action set is throttled. The key is the full encoded
    /// record, so any differing parameter lets the command through.
    pub fn should_send(&mut self, command: &Command, bytes: &[u8]) -> bool {
        if !command.tag().is_player_action() {
            return true;
        }
        if self.last.as_deref() == Some(bytes) {
            return false;
        }
        self.last = Some(bytes.to_vec());
        true
    }

    /// Forget the last action at a tick boundary.
    pub fn clear(&mut self) {
        self.last = None;
    }
}

// ABOUTME: Deployment state types for the type state pattern.
// ABOUTME: States carry the data that must exist once they are reached.

use crate::types::ContainerId;

/// Initial state: release spec prepared, nothing touched yet.
/// Available actions: `stop_old()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Initialized;

/// Old container stopped (or absent): the host port is free.
/// Available actions: `start_container()`, `rollback()`
#[derive(Debug, Clone, Copy, Default)]
pub struct OldStopped;

/// New container created and started.
/// Available actions: `health_check()`, `rollback()`
#[derive(Debug, Clone)]
pub struct Started {
    pub(crate) container: ContainerId,
}

/// Health checks passed (or none configured).
/// Available actions: `complete()`, `rollback()`
#[derive(Debug, Clone)]
pub struct HealthChecked {
    pub(crate) container: ContainerId,
}

/// Terminal state: new container serving, old kept stopped for rollback.
#[derive(Debug, Clone)]
pub struct Completed {
    pub(crate) container: ContainerId,
}

/// Deployment slot for alternating container names.
///
/// Consecutive releases ping-pong between the two slots, so the previous
/// release's container survives (stopped) as the rollback target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Blue,
    Green,
}

impl Slot {
    /// The slot a fresh service starts in.
    pub fn first() -> Self {
        Slot::Blue
    }

    /// The opposite slot.
    pub fn other(self) -> Self {
        match self {
            Slot::Blue => Slot::Green,
            Slot::Green => Slot::Blue,
        }
    }

    /// Parse a slot from its label value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "blue" => Some(Slot::Blue),
            "green" => Some(Slot::Green),
            _ => None,
        }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Blue => write!(f, "blue"),
            Slot::Green => write!(f, "green"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_alternate() {
        assert_eq!(Slot::Blue.other(), Slot::Green);
        assert_eq!(Slot::Green.other(), Slot::Blue);
        assert_eq!(Slot::Blue.other().other(), Slot::Blue);
    }

    #[test]
    fn slot_round_trips_through_label_value() {
        assert_eq!(Slot::parse(&Slot::Blue.to_string()), Some(Slot::Blue));
        assert_eq!(Slot::parse(&Slot::Green.to_string()), Some(Slot::Green));
        assert_eq!(Slot::parse("purple"), None);
    }
}

use std::fmt;

use crate::{bitmask_flags::BitmaskFlags, define_bitmask_flags};

define_bitmask_flags!(
    /// Priority of whoever locks a follower. Higher variants win.
    RequestPriority, u8, {
        Lowest,
        Logic,
        HardScript,
        Reaction,
        Ultimate,
    }
);

impl RequestPriority {
    pub const ALL: [RequestPriority; 5] = [
        RequestPriority::Lowest,
        RequestPriority::Logic,
        RequestPriority::HardScript,
        RequestPriority::Reaction,
        RequestPriority::Ultimate,
    ];

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }
}

impl fmt::Display for RequestPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestPriority::Lowest => "Lowest",
            RequestPriority::Logic => "Logic",
            RequestPriority::HardScript => "HardScript",
            RequestPriority::Reaction => "Reaction",
            RequestPriority::Ultimate => "Ultimate",
        };
        f.write_str(name)
    }
}

/// Set of priorities currently holding a follower.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceLock {
    locks: BitmaskFlags<u8>,
}

impl ResourceLock {
    /// Adds `priority`. Returns true if the resource was unlocked before.
    pub fn set(&mut self, priority: RequestPriority) -> bool {
        let was_locked = self.is_locked();
        self.locks.add(priority);
        !was_locked
    }

    /// Removes `priority`. Returns true if this released the last lock.
    pub fn clear(&mut self, priority: RequestPriority) -> bool {
        let was_locked = self.is_locked();
        self.locks.remove(priority);
        was_locked && !self.is_locked()
    }

    /// Drops every lock. Returns true if anything was held.
    pub fn clear_all(&mut self) -> bool {
        let was_locked = self.is_locked();
        self.locks.clear();
        was_locked
    }

    pub fn is_locked(&self) -> bool {
        !self.locks.is_empty()
    }

    pub fn is_locked_by(&self, priority: RequestPriority) -> bool {
        self.locks.has(priority)
    }

    /// Strongest priority holding the lock.
    pub fn highest_priority(&self) -> Option<RequestPriority> {
        self.locks.highest_bit().and_then(RequestPriority::from_index)
    }
}

impl fmt::Display for ResourceLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_locked() {
            return f.write_str("unlocked");
        }
        let held: Vec<String> = RequestPriority::ALL
            .iter()
            .filter(|p| self.locks.has(**p))
            .map(|p| p.to_string())
            .collect();
        write!(f, "locked[{}]", held.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_set_and_last_clear_report_transitions() {
        let mut lock = ResourceLock::default();
        assert!(lock.set(RequestPriority::Logic));
        assert!(!lock.set(RequestPriority::Reaction));

        assert!(!lock.clear(RequestPriority::Logic));
        assert!(lock.is_locked());
        assert!(lock.clear(RequestPriority::Reaction));
        assert!(!lock.is_locked());
    }

    #[test]
    fn clearing_an_unheld_priority_is_a_no_op() {
        let mut lock = ResourceLock::default();
        assert!(!lock.clear(RequestPriority::Ultimate));
        assert!(!lock.clear_all());
    }

    #[test]
    fn highest_priority_wins() {
        let mut lock = ResourceLock::default();
        lock.set(RequestPriority::Lowest);
        lock.set(RequestPriority::HardScript);
        assert_eq!(lock.highest_priority(), Some(RequestPriority::HardScript));
        assert_eq!(lock.to_string(), "locked[Lowest,HardScript]");
    }
}

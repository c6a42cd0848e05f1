/// Work unit state definitions for tracking queue progress
///
/// A unit moves `Pending -> Processing -> Completed`. Startup reconciliation
/// is the only path back from `Processing` to `Pending`, and an explicit queue
/// reset is the only path back from `Completed`.
use std::fmt;

/// Represents the current state of a work unit in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitState {
    /// Unit is waiting to be claimed by a worker
    Pending,

    /// Unit is held by exactly one worker
    Processing,

    /// Unit has been fully processed and its counters recorded
    Completed,
}

impl UnitState {
    /// Returns true if no further processing is needed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns true if a worker may claim a unit in this state
    pub fn is_claimable(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Converts the unit state to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
        }
    }

    /// Parses a unit state from a database string representation
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Returns all possible unit states
    pub fn all_states() -> [Self; 3] {
        [Self::Pending, Self::Processing, Self::Completed]
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_terminal() {
        assert!(!UnitState::Pending.is_terminal());
        assert!(!UnitState::Processing.is_terminal());
        assert!(UnitState::Completed.is_terminal());
    }

    #[test]
    fn test_only_pending_is_claimable() {
        assert!(UnitState::Pending.is_claimable());
        assert!(!UnitState::Processing.is_claimable());
        assert!(!UnitState::Completed.is_claimable());
    }

    #[test]
    fn test_from_db_string() {
        assert_eq!(
            UnitState::from_db_string("pending"),
            Some(UnitState::Pending)
        );
        assert_eq!(
            UnitState::from_db_string("processing"),
            Some(UnitState::Processing)
        );
        assert_eq!(
            UnitState::from_db_string("completed"),
            Some(UnitState::Completed)
        );
        assert_eq!(UnitState::from_db_string("fetching"), None);
    }

    #[test]
    fn test_roundtrip_db_string() {
        for state in UnitState::all_states() {
            let parsed = UnitState::from_db_string(state.to_db_string());
            assert_eq!(Some(state), parsed, "Failed roundtrip for {:?}", state);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", UnitState::Processing), "processing");
    }
}

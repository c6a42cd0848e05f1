use std::fmt;
use std::time::Duration;

/// Consecutive block indicators after which the crawl is treated as blocked
pub const BLOCK_THRESHOLD: u32 = 3;

/// Health of the crawl as seen by the ban detector
///
/// This is a circuit breaker: `Healthy` is closed, `Suspected` and `Blocked`
/// are open, and the recovery delay is the half-open retry interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BanState {
    /// No block indicators since the last clean success
    Healthy,

    /// Some block indicators, below the blocking threshold
    Suspected,

    /// At or above the blocking threshold; workers must pause
    Blocked,
}

impl BanState {
    /// Classifies a consecutive-failure count
    pub fn from_failures(consecutive_failures: u32) -> Self {
        match consecutive_failures {
            0 => Self::Healthy,
            n if n < BLOCK_THRESHOLD => Self::Suspected,
            _ => Self::Blocked,
        }
    }

    /// Returns the pause required before the next fetch for a failure count
    ///
    /// Step function: up to 3 failures -> 30s, 4 to 6 -> 5 minutes,
    /// more than 6 -> 30 minutes.
    pub fn recovery_delay(consecutive_failures: u32) -> Duration {
        match consecutive_failures {
            0..=3 => Duration::from_secs(30),
            4..=6 => Duration::from_secs(300),
            _ => Duration::from_secs(1800),
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked)
    }
}

impl fmt::Display for BanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Healthy => "healthy",
            Self::Suspected => "suspected",
            Self::Blocked => "blocked",
        };
        write!(f, "{}", label)
    }
}

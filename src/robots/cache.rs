//! Per-host robots.txt cache entries

use crate::robots::RobotRules;
use chrono::{DateTime, Duration, Utc};

/// Robots.txt rules for one host, stamped with the time they were fetched
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub rules: RobotRules,
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    pub fn new(rules: RobotRules) -> Self {
        Self {
            rules,
            fetched_at: Utc::now(),
        }
    }

    /// Whether the entry is older than `max_age` and must be fetched again
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.age() > max_age
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_is_fresh() {
        let entry = CachedRobots::new(RobotRules::allow_all());
        assert!(!entry.is_stale(Duration::hours(24)));
    }

    #[test]
    fn test_entry_goes_stale_after_max_age() {
        let mut entry = CachedRobots::new(RobotRules::allow_all());
        entry.fetched_at = Utc::now() - Duration::hours(25);

        assert!(entry.is_stale(Duration::hours(24)));
        assert!(!entry.is_stale(Duration::hours(48)));
    }

    #[test]
    fn test_age() {
        let mut entry = CachedRobots::new(RobotRules::allow_all());
        entry.fetched_at = Utc::now() - Duration::hours(12);

        let age = entry.age();
        assert!(age.num_hours() >= 11 && age.num_hours() <= 13);
    }
}

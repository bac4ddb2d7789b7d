//! End-of-session crawl summary
//!
//! Built from the local data of every `HttpWorker` plus the frontier counters,
//! and printed by the CLI when a session ends.

use crate::crawler::WorkerStats;
use std::fmt;
use std::time::Duration;

/// Summary of a finished crawl session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    /// Per-slot statistics, in slot order
    pub workers: Vec<WorkerStats>,

    pub pages_visited: u64,
    pub pages_failed: u64,
    pub links_scheduled: u64,

    /// URLs ever accepted by the frontier (this and earlier sessions)
    pub urls_scheduled: u64,

    /// URLs ever marked processed (this and earlier sessions)
    pub urls_processed: u64,

    /// Wall-clock time of the session, when known
    pub elapsed: Option<Duration>,
}

impl CrawlSummary {
    /// Builds a summary from worker results and frontier counters
    pub fn from_workers(workers: &[WorkerStats], urls_scheduled: u64, urls_processed: u64) -> Self {
        Self {
            workers: workers.to_vec(),
            pages_visited: workers.iter().map(|w| w.pages_visited).sum(),
            pages_failed: workers.iter().map(|w| w.pages_failed).sum(),
            links_scheduled: workers.iter().map(|w| w.links_scheduled).sum(),
            urls_scheduled,
            urls_processed,
            elapsed: None,
        }
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }

    /// Share of fetched pages that failed, in percent
    pub fn failure_rate(&self) -> f64 {
        let attempted = self.pages_visited + self.pages_failed;
        if attempted == 0 {
            0.0
        } else {
            (self.pages_failed as f64 / attempted as f64) * 100.0
        }
    }
}

impl fmt::Display for CrawlSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Crawl Summary ===")?;
        writeln!(f)?;

        writeln!(f, "Overview:")?;
        writeln!(f, "  Pages visited: {}", self.pages_visited)?;
        writeln!(
            f,
            "  Pages failed: {} ({:.1}%)",
            self.pages_failed,
            self.failure_rate()
        )?;
        writeln!(f, "  Links scheduled: {}", self.links_scheduled)?;
        writeln!(f, "  Frontier: {} scheduled, {} processed", self.urls_scheduled, self.urls_processed)?;
        if let Some(elapsed) = self.elapsed {
            writeln!(f, "  Duration: {}s", elapsed.as_secs())?;
        }

        if !self.workers.is_empty() {
            writeln!(f)?;
            writeln!(f, "Crawlers:")?;
            for worker in &self.workers {
                writeln!(
                    f,
                    "  Crawler {}: {} visited, {} failed, {} links scheduled",
                    worker.slot, worker.pages_visited, worker.pages_failed, worker.links_scheduled
                )?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(slot: usize, visited: u64, failed: u64, links: u64) -> WorkerStats {
        WorkerStats {
            slot,
            pages_visited: visited,
            pages_failed: failed,
            links_scheduled: links,
        }
    }

    #[test]
    fn test_totals_are_summed() {
        let summary = CrawlSummary::from_workers(&[stats(1, 10, 2, 30), stats(2, 5, 0, 7)], 40, 17);

        assert_eq!(summary.pages_visited, 15);
        assert_eq!(summary.pages_failed, 2);
        assert_eq!(summary.links_scheduled, 37);
        assert_eq!(summary.urls_processed, 17);
    }

    #[test]
    fn test_failure_rate() {
        assert_eq!(CrawlSummary::default().failure_rate(), 0.0);

        let summary = CrawlSummary::from_workers(&[stats(1, 3, 1, 0)], 4, 4);
        assert!((summary.failure_rate() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_display_lists_every_crawler() {
        let summary = CrawlSummary::from_workers(&[stats(1, 1, 0, 0), stats(2, 2, 0, 0)], 3, 3)
            .with_elapsed(Duration::from_secs(90));
        let text = summary.to_string();

        assert!(text.contains("Pages visited: 3"));
        assert!(text.contains("Crawler 1: 1 visited"));
        assert!(text.contains("Crawler 2: 2 visited"));
        assert!(text.contains("Duration: 90s"));
    }
}

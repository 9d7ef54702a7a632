//! Termination Controller
//!
//! Two independent layers:
//! - adaptive-phase stopping from the ability estimate (`should_continue`)
//! - task-level stopping from the raw correctness stream (`IncorrectTracker`)

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::{CatConfig, TaskStopPolicy};

/// Why a phase or the whole task stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    /// Standard error fell below the threshold
    SemThreshold,
    MaxItems,
    /// No eligible item left to select
    PoolExhausted,
    MaxIncorrectInRow,
    RecentIncorrect,
    /// Adaptive pool was empty on entry
    EmptyPool,
}

/// Continue while SE is at or above the threshold and the item cap is not hit
pub fn should_continue(
    standard_error: f64,
    sem_threshold: f64,
    items_administered: usize,
    max_items: usize,
) -> bool {
    standard_error >= sem_threshold && items_administered < max_items
}

#[derive(Debug, Clone, Copy)]
pub struct TerminationController {
    sem_threshold: f64,
    max_items: usize,
}

impl TerminationController {
    pub fn new(sem_threshold: f64, max_items: usize) -> Self {
        Self {
            sem_threshold,
            max_items,
        }
    }

    pub fn from_config(config: &CatConfig) -> Self {
        Self::new(config.sem_threshold, config.max_items)
    }

    /// `None` to keep going, otherwise the reason the adaptive phase ends
    pub fn check(&self, standard_error: f64, items_administered: usize) -> Option<StopReason> {
        if should_continue(
            standard_error,
            self.sem_threshold,
            items_administered,
            self.max_items,
        ) {
            None
        } else if standard_error < self.sem_threshold {
            Some(StopReason::SemThreshold)
        } else {
            Some(StopReason::MaxItems)
        }
    }
}

// ==================== Task-level rules ====================

/// Tracks incorrect responses across scored trials for task-level stopping
#[derive(Debug, Clone, Default)]
pub struct IncorrectTracker {
    policy: TaskStopPolicy,
    in_row: u32,
    recent: VecDeque<bool>,
}

impl IncorrectTracker {
    pub fn new(policy: TaskStopPolicy) -> Self {
        Self {
            policy,
            in_row: 0,
            recent: VecDeque::new(),
        }
    }

    pub fn incorrect_in_row(&self) -> u32 {
        self.in_row
    }

    /// Instruction trials break a run of incorrect answers
    pub fn reset_run(&mut self) {
        self.in_row = 0;
    }

    /// Record one scored response and report whether the task should end
    pub fn record(&mut self, correct: bool) -> Option<StopReason> {
        if correct {
            self.in_row = 0;
        } else {
            self.in_row += 1;
        }

        if let Some(rule) = self.policy.recent_incorrect {
            self.recent.push_back(correct);
            while self.recent.len() > rule.window {
                self.recent.pop_front();
            }
            let incorrect = self.recent.iter().filter(|&&c| !c).count();
            if incorrect >= rule.max_incorrect {
                return Some(StopReason::RecentIncorrect);
            }
        }

        match self.policy.max_incorrect_in_row {
            Some(limit) if self.in_row >= limit => Some(StopReason::MaxIncorrectInRow),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecentIncorrectRule;

    #[test]
    fn test_should_continue() {
        assert!(should_continue(10.0, 0.3, 0, 50));
        assert!(should_continue(0.3, 0.3, 10, 50));
        assert!(!should_continue(0.29, 0.3, 10, 50));
        assert!(!should_continue(1.0, 0.3, 50, 50));
    }

    #[test]
    fn test_unreachable_threshold_still_ends_at_max_items() {
        let controller = TerminationController::new(0.0, 5);
        for n in 0..5 {
            assert_eq!(controller.check(0.01, n), None);
        }
        assert_eq!(controller.check(0.01, 5), Some(StopReason::MaxItems));
    }

    #[test]
    fn test_controller_reports_threshold() {
        let controller = TerminationController::new(0.3, 50);
        assert_eq!(controller.check(0.25, 12), Some(StopReason::SemThreshold));
    }

    #[test]
    fn test_tracker_disabled_by_default() {
        let mut tracker = IncorrectTracker::default();
        for _ in 0..20 {
            assert_eq!(tracker.record(false), None);
        }
        assert_eq!(tracker.incorrect_in_row(), 20);
    }

    #[test]
    fn test_tracker_in_row_limit_and_reset() {
        let mut tracker = IncorrectTracker::new(TaskStopPolicy {
            max_incorrect_in_row: Some(3),
            recent_incorrect: None,
        });
        assert_eq!(tracker.record(false), None);
        assert_eq!(tracker.record(false), None);
        tracker.reset_run();
        assert_eq!(tracker.record(false), None);
        assert_eq!(tracker.record(true), None);
        assert_eq!(tracker.record(false), None);
        assert_eq!(tracker.record(false), None);
        assert_eq!(tracker.record(false), Some(StopReason::MaxIncorrectInRow));
    }

    #[test]
    fn test_tracker_recent_window() {
        let mut tracker = IncorrectTracker::new(TaskStopPolicy {
            max_incorrect_in_row: None,
            recent_incorrect: Some(RecentIncorrectRule::default()),
        });
        // 3 wrong in the first 10, then they slide out
        for correct in [false, true, false, true, false, true, true, true, true, true] {
            assert_eq!(tracker.record(correct), None);
        }
        for _ in 0..3 {
            assert_eq!(tracker.record(true), None);
        }
        assert_eq!(tracker.record(false), None);
        assert_eq!(tracker.record(false), None);
        assert_eq!(tracker.record(false), None);
        assert_eq!(tracker.record(false), Some(StopReason::RecentIncorrect));
    }
}

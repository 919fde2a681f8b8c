use tracing::debug;

/// Where a single normalization attempt currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AwaitingResponse,
    Extracting,
    Validating,
    Normalized,
    Failed,
}

impl Stage {
    pub fn can_advance_to(self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, next),
            (AwaitingResponse, Extracting)
                | (Extracting, Validating)
                | (Extracting, Failed)
                | (Validating, Normalized)
                | (Validating, Failed)
                | (Failed, AwaitingResponse)
        )
    }
}

/// Follows one pipeline through its stages across retries.
#[derive(Debug)]
pub struct StageTracker {
    current: Stage,
    attempt: u32,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self {
            current: Stage::AwaitingResponse,
            attempt: 1,
        }
    }
}

impl StageTracker {
    #[cfg(test)]
    pub fn current(&self) -> Stage {
        self.current
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Moves to `next`. Returns false and stays put if the transition is not allowed.
    pub fn advance(&mut self, next: Stage) -> bool {
        if !self.current.can_advance_to(next) {
            debug!(
                "Rejected stage transition {:?} -> {:?} on attempt {}",
                self.current, next, self.attempt
            );
            return false;
        }
        if next == Stage::AwaitingResponse {
            self.attempt += 1;
        }
        debug!(
            "Normalization attempt {}: {:?} -> {:?}",
            self.attempt, self.current, next
        );
        self.current = next;
        true
    }

    /// Re-arms a failed pipeline for the next attempt. No-op otherwise.
    pub fn rearm(&mut self) {
        if self.current == Stage::Failed {
            self.advance(Stage::AwaitingResponse);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut tracker = StageTracker::default();
        assert!(tracker.advance(Stage::Extracting));
        assert!(tracker.advance(Stage::Validating));
        assert!(tracker.advance(Stage::Normalized));
        assert_eq!(tracker.current(), Stage::Normalized);
        assert_eq!(tracker.attempt(), 1);
    }

    #[test]
    fn test_failure_then_retry_counts_attempts() {
        let mut tracker = StageTracker::default();
        tracker.advance(Stage::Extracting);
        tracker.advance(Stage::Failed);
        tracker.rearm();
        assert_eq!(tracker.current(), Stage::AwaitingResponse);
        assert_eq!(tracker.attempt(), 2);
    }

    #[test]
    fn test_illegal_transitions_are_rejected() {
        let mut tracker = StageTracker::default();
        assert!(!tracker.advance(Stage::Normalized));
        assert!(!tracker.advance(Stage::Validating));
        assert_eq!(tracker.current(), Stage::AwaitingResponse);

        tracker.advance(Stage::Extracting);
        tracker.advance(Stage::Validating);
        tracker.advance(Stage::Normalized);
        assert!(!tracker.advance(Stage::AwaitingResponse));
        assert!(!tracker.advance(Stage::Failed));
    }

    #[test]
    fn test_rearm_ignores_non_failed_stage() {
        let mut tracker = StageTracker::default();
        tracker.rearm();
        assert_eq!(tracker.attempt(), 1);
        assert_eq!(tracker.current(), Stage::AwaitingResponse);
    }
}

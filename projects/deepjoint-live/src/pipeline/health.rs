use crate::run_artifacts::Termination;

/// Where the capture stream stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    /// At least one frame was skipped; processing continues.
    Degraded,
    Terminated(Termination),
}

/// Counts failed acquisitions against a budget.
///
/// The skip counter only ever grows, and once degraded the stream never
/// reports healthy again for the rest of the session.
#[derive(Debug, Clone)]
pub struct StreamHealth {
    skipped: usize,
    ceiling: usize,
    total_frames: Option<usize>,
    state: HealthState,
}

impl StreamHealth {
    pub fn new(ceiling: usize, total_frames: Option<usize>) -> Self {
        Self {
            skipped: 0,
            ceiling,
            total_frames: total_frames.filter(|&n| n > 0),
            state: HealthState::Healthy,
        }
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.state, HealthState::Terminated(_))
    }

    /// Records a failed acquisition after `processed` successful frames.
    pub fn record_failure(&mut self, processed: usize) -> HealthState {
        if self.is_terminated() {
            return self.state;
        }

        if let Some(total) = self.total_frames {
            if self.skipped + processed >= total {
                tracing::info!("Stream appears to have ended after {} frames", processed);
                self.state = HealthState::Terminated(Termination::EndOfStream);
                return self.state;
            }
        }

        self.skipped += 1;
        tracing::warn!(
            "Failed to grab frame {} from the source, skipped frames {}/{}",
            processed,
            self.skipped,
            processed
        );

        if self.skipped > self.ceiling {
            tracing::error!(
                "Encountered {} skipped frames (limit {}), giving up on the source",
                self.skipped,
                self.ceiling
            );
            self.state = HealthState::Terminated(Termination::BudgetExhausted);
        } else {
            self.state = HealthState::Degraded;
        }

        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_healthy() {
        let health = StreamHealth::new(10, None);
        assert_eq!(health.state(), HealthState::Healthy);
        assert_eq!(health.skipped(), 0);
    }

    #[test]
    fn test_ceiling_boundary() {
        let mut health = StreamHealth::new(10, None);
        for i in 1..=10 {
            assert_eq!(health.record_failure(0), HealthState::Degraded, "skip {}", i);
        }
        assert_eq!(
            health.record_failure(0),
            HealthState::Terminated(Termination::BudgetExhausted)
        );
        assert_eq!(health.skipped(), 11);
    }

    #[test]
    fn test_end_of_stream_exactly_at_total() {
        let mut health = StreamHealth::new(10_000, Some(100));
        assert_eq!(health.record_failure(99), HealthState::Degraded);
        assert_eq!(health.skipped(), 1);

        let mut health = StreamHealth::new(10_000, Some(100));
        assert_eq!(
            health.record_failure(100),
            HealthState::Terminated(Termination::EndOfStream)
        );
        assert_eq!(health.skipped(), 0);
    }

    #[test]
    fn test_skips_count_towards_end_of_stream() {
        let mut health = StreamHealth::new(10_000, Some(100));
        health.record_failure(50);
        health.record_failure(50);
        assert_eq!(health.record_failure(97), HealthState::Degraded);
        assert_eq!(
            health.record_failure(97),
            HealthState::Terminated(Termination::EndOfStream)
        );
    }

    #[test]
    fn test_unknown_or_zero_total_only_uses_budget() {
        let mut health = StreamHealth::new(0, Some(0));
        assert_eq!(
            health.record_failure(5000),
            HealthState::Terminated(Termination::BudgetExhausted)
        );
    }

    #[test]
    fn test_terminated_is_sticky() {
        let mut health = StreamHealth::new(0, None);
        health.record_failure(0);
        assert!(health.is_terminated());
        assert_eq!(
            health.record_failure(0),
            HealthState::Terminated(Termination::BudgetExhausted)
        );
        assert_eq!(health.skipped(), 1);
    }
}

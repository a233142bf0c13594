use thiserror::Error;

use super::job::{JobStatus, JobUpdate};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("illegal status transition {from} -> {to}")]
    IllegalTransition { from: JobStatus, to: JobStatus },

    #[error("progress may not go backwards ({from} -> {to})")]
    ProgressRegression { from: u8, to: u8 },
}

/// In-memory view of a job's status owned by its background task.
///
/// Every write to the store goes through here first, so ordering guarantees
/// hold regardless of the store's own semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobLifecycle {
    status: JobStatus,
    progress: u8,
}

impl Default for JobLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl JobLifecycle {
    pub fn new() -> Self {
        Self {
            status: JobStatus::Queued,
            progress: 0,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    fn transition(&mut self, to: JobStatus, progress: u8) -> Result<(), LifecycleError> {
        if !self.status.can_transition_to(to) {
            return Err(LifecycleError::IllegalTransition {
                from: self.status,
                to,
            });
        }
        if to == JobStatus::Processing && progress < self.progress {
            return Err(LifecycleError::ProgressRegression {
                from: self.progress,
                to: progress,
            });
        }
        self.status = to;
        self.progress = progress.min(100);
        Ok(())
    }

    /// A processing step with its progress and description.
    pub fn advance(
        &mut self,
        progress: u8,
        message: impl Into<String>,
    ) -> Result<JobUpdate, LifecycleError> {
        self.transition(JobStatus::Processing, progress)?;
        Ok(JobUpdate::default()
            .status(JobStatus::Processing)
            .progress(self.progress)
            .message(message))
    }

    pub fn complete(&mut self, message: impl Into<String>) -> Result<JobUpdate, LifecycleError> {
        self.transition(JobStatus::Completed, 100)?;
        Ok(JobUpdate::default()
            .status(JobStatus::Completed)
            .progress(100)
            .message(message))
    }

    /// Failure resets progress to 0.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<JobUpdate, LifecycleError> {
        self.transition(JobStatus::Failed, 0)?;
        Ok(JobUpdate::default()
            .status(JobStatus::Failed)
            .progress(0)
            .message(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_walks_all_states() {
        let mut lc = JobLifecycle::new();
        assert_eq!(lc.status(), JobStatus::Queued);

        let u = lc.advance(25, "Initializing").unwrap();
        assert_eq!(u.status, Some(JobStatus::Processing));
        assert_eq!(u.progress, Some(25));

        lc.advance(50, "Applying prompt settings").unwrap();
        let u = lc.complete("done").unwrap();
        assert_eq!(u.progress, Some(100));
        assert_eq!(lc.status(), JobStatus::Completed);
    }

    #[test]
    fn progress_cannot_regress_while_processing() {
        let mut lc = JobLifecycle::new();
        lc.advance(50, "half").unwrap();
        let err = lc.advance(25, "back").unwrap_err();
        assert_eq!(err, LifecycleError::ProgressRegression { from: 50, to: 25 });
        assert_eq!(lc.progress(), 50);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut lc = JobLifecycle::new();
        lc.advance(25, "go").unwrap();
        lc.fail("boom").unwrap();
        assert_eq!(lc.progress(), 0);
        assert!(lc.advance(50, "again").is_err());
        assert!(lc.complete("late").is_err());
        assert!(lc.fail("twice").is_err());
    }

    #[test]
    fn queued_job_can_fail_fast_but_not_complete() {
        let mut lc = JobLifecycle::new();
        let mut probe = lc;
        assert!(matches!(
            probe.complete("skip"),
            Err(LifecycleError::IllegalTransition { .. })
        ));
        let u = lc.fail("missing model").unwrap();
        assert_eq!(u.status, Some(JobStatus::Failed));
        assert_eq!(u.message.as_deref(), Some("missing model"));
    }
}

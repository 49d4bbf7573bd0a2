//! Progress reporting.
//!
//! Long-running operations report their progress through the [`Progress`]
//! contract: an indicator is initialized with a total step count, stepped up to
//! that count and finally closed. The sorters in this crate report their three
//! sequential phases (reading, sorting, writing) as equally weighted sub-ranges
//! of a single parent indicator using [`RunProgress`].

use log;

/// Progress indicator contract.
///
/// Implementations render progress however they see fit: a terminal bar, log
/// lines, a test counter. All calls are made from the thread executing the
/// reported operation.
pub trait Progress {
    /// Prepares the indicator for `steps` calls to [`step`](Progress::step).
    fn init(&mut self, steps: u64);

    /// Advances the indicator by one step.
    fn step(&mut self);

    /// Closes the indicator.
    fn done(&mut self);
}

/// Indicator that discards every event.
pub struct NoProgress;

impl Progress for NoProgress {
    fn init(&mut self, _steps: u64) {}

    fn step(&mut self) {}

    fn done(&mut self) {}
}

/// Splits one parent indicator into consecutive equally weighted phases.
///
/// The parent is initialized with the combined step count of all phases and
/// each phase steps it directly. [`Phase::done`] tops the phase up to its
/// planned step count, so a phase reporting at a coarser granularity still
/// covers exactly its sub-range by the time it closes.
pub struct RunProgress<'a> {
    indicator: Option<&'a mut dyn Progress>,
}

impl<'a> RunProgress<'a> {
    /// Creates a tracker spanning `phases` phases of `phase_steps` steps each.
    /// A `None` indicator turns all reporting into no-ops.
    pub fn new(indicator: Option<&'a mut dyn Progress>, phases: u64, phase_steps: u64) -> Self {
        let mut run = RunProgress { indicator };
        if let Some(indicator) = run.indicator.as_deref_mut() {
            indicator.init(phases * phase_steps);
        }
        return run;
    }

    /// Opens the next phase, spanning `steps` steps.
    pub fn phase(&mut self, name: &'static str, steps: u64) -> Phase<'_, 'a> {
        log::debug!("{} ({} items)", name, steps);
        Phase {
            run: self,
            steps,
            stepped: 0,
        }
    }

    /// Closes the parent indicator. Must be called after the last phase.
    pub fn done(&mut self) {
        if let Some(indicator) = self.indicator.as_deref_mut() {
            indicator.done();
        }
    }

    fn step(&mut self) {
        if let Some(indicator) = self.indicator.as_deref_mut() {
            indicator.step();
        }
    }
}

/// A single phase of a [`RunProgress`].
pub struct Phase<'r, 'a> {
    run: &'r mut RunProgress<'a>,
    steps: u64,
    stepped: u64,
}

impl Phase<'_, '_> {
    /// Advances the phase by one step. Steps beyond the planned count are
    /// ignored.
    pub fn step(&mut self) {
        if self.stepped < self.steps {
            self.stepped += 1;
            self.run.step();
        }
    }

    /// Closes the phase, advancing the parent past any unreported steps.
    pub fn done(mut self) {
        while self.stepped < self.steps {
            self.stepped += 1;
            self.run.step();
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Progress, RunProgress};

    #[derive(Default)]
    struct CountingProgress {
        total: u64,
        steps: u64,
        done_calls: u32,
    }

    impl Progress for CountingProgress {
        fn init(&mut self, steps: u64) {
            self.total = steps;
        }

        fn step(&mut self) {
            self.steps += 1;
        }

        fn done(&mut self) {
            self.done_calls += 1;
        }
    }

    #[test]
    fn test_run_progress_counts() {
        let mut progress = CountingProgress::default();

        let mut run = RunProgress::new(Some(&mut progress), 3, 10);
        for _ in 0..3 {
            let mut phase = run.phase("phase", 10);
            for _ in 0..10 {
                phase.step();
            }
            phase.done();
        }
        run.done();

        assert_eq!(progress.total, 30);
        assert_eq!(progress.steps, 30);
        assert_eq!(progress.done_calls, 1);
    }

    #[test]
    fn test_phase_tops_up_unreported_steps() {
        let mut progress = CountingProgress::default();

        let mut run = RunProgress::new(Some(&mut progress), 1, 10);
        let mut phase = run.phase("phase", 10);
        phase.step();
        phase.step();
        phase.done();
        run.done();

        assert_eq!(progress.steps, 10);
    }

    #[test]
    fn test_extra_steps_are_ignored() {
        let mut progress = CountingProgress::default();

        let mut run = RunProgress::new(Some(&mut progress), 1, 2);
        let mut phase = run.phase("phase", 2);
        for _ in 0..5 {
            phase.step();
        }
        phase.done();
        run.done();

        assert_eq!(progress.steps, 2);
    }

    #[test]
    fn test_missing_indicator_is_noop() {
        let mut run = RunProgress::new(None, 3, 10);
        let mut phase = run.phase("phase", 10);
        phase.step();
        phase.done();
        run.done();
    }
}

//! The outer sequential trial loop, driven as an explicit state machine.

use hs_study::{Objective, Study, TrialOutcome};
use hs_types::{HsError, ObjectiveError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::budget::{should_continue, WallBudget};
use crate::clock::{Clock, SystemClock};
use crate::estimate::DurationEstimator;

/// Fixed knobs of a worker's run.
#[derive(Debug, Clone, Copy)]
pub struct RunnerConfig {
    /// Stop cleanly after this many recorded trials.
    pub target_trials: u64,
    /// Total wall-clock allowance before the external scheduler kills us.
    pub wall_budget: Duration,
}

/// The single terminal reason a run ends with.
#[derive(Debug)]
pub enum StopReason {
    /// Reached the configured trial count.
    TargetReached,
    /// The estimated duration of the next trial exceeds the time left.
    BudgetExhausted,
    /// Operator interrupt; honored immediately, never retried.
    Interrupted,
    /// Unexpected backend/objective failure; not retried, since its
    /// recurrence probability is unknown.
    Error(HsError),
}

impl StopReason {
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::TargetReached | Self::BudgetExhausted)
    }
}

/// What the loop hands back to the caller for logging and exit codes.
#[derive(Debug)]
pub struct RunReport {
    pub reason: StopReason,
    /// Recorded trials: completions plus backend-reported failures.
    pub trials_run: u64,
    pub elapsed: Duration,
}

enum RunnerState {
    Starting,
    AwaitingTrial,
    RunningTrial { started: Instant, deadline: Instant },
    Recording {
        duration: Duration,
        outcome: TrialOutcome,
    },
    Deciding,
    Stopping(StopReason),
    Stopped(StopReason),
}

/// Sequential per-trial control loop: ask the backend for one trial under
/// a per-call timeout, record how long it took, and consult the budget
/// governor before launching another.
pub struct TrialRunner<C: Clock = SystemClock> {
    study: Study,
    objective: Box<dyn Objective>,
    config: RunnerConfig,
    estimator: DurationEstimator,
    interrupt: Arc<AtomicBool>,
    clock: C,
}

impl TrialRunner<SystemClock> {
    pub fn new(
        study: Study,
        objective: Box<dyn Objective>,
        config: RunnerConfig,
        interrupt: Arc<AtomicBool>,
    ) -> Self {
        Self::with_clock(study, objective, config, interrupt, SystemClock)
    }
}

impl<C: Clock> TrialRunner<C> {
    pub fn with_clock(
        study: Study,
        objective: Box<dyn Objective>,
        config: RunnerConfig,
        interrupt: Arc<AtomicBool>,
        clock: C,
    ) -> Self {
        Self {
            study,
            objective,
            config,
            estimator: DurationEstimator::new(),
            interrupt,
            clock,
        }
    }

    pub fn estimator(&self) -> &DurationEstimator {
        &self.estimator
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    /// Drive the loop to one of its terminal states.
    pub fn run(&mut self) -> RunReport {
        let budget = WallBudget::new(self.clock.now(), self.config.wall_budget);
        let mut trials_run: u64 = 0;
        let mut state = RunnerState::Starting;

        loop {
            state = match state {
                RunnerState::Starting => {
                    info!(
                        "Running up to {} trials within a wall budget of {}s, \
                         stopping early rather than being killed mid-trial",
                        self.config.target_trials,
                        self.config.wall_budget.as_secs()
                    );
                    RunnerState::AwaitingTrial
                }

                RunnerState::AwaitingTrial => {
                    if self.interrupted() {
                        RunnerState::Stopping(StopReason::Interrupted)
                    } else {
                        let now = self.clock.now();
                        // With fewer than two samples this is the whole
                        // remaining budget, so the first trial is bounded
                        // only by the wall budget itself.
                        let timeout = self.estimator.estimate(budget.remaining(now));
                        RunnerState::RunningTrial {
                            started: now,
                            deadline: now + timeout,
                        }
                    }
                }

                RunnerState::RunningTrial { started, deadline } => {
                    match self
                        .study
                        .run_one(self.objective.as_ref(), Some(deadline), &self.interrupt)
                    {
                        Ok(outcome) => RunnerState::Recording {
                            duration: self.clock.now().duration_since(started),
                            outcome,
                        },
                        Err(HsError::Objective(ObjectiveError::Interrupted)) => {
                            RunnerState::Stopping(StopReason::Interrupted)
                        }
                        Err(err) => RunnerState::Stopping(StopReason::Error(err)),
                    }
                }

                RunnerState::Recording { duration, outcome } => {
                    self.estimator.record(duration);
                    trials_run += 1;
                    match &outcome {
                        TrialOutcome::Completed { number, values } => {
                            info!(
                                "Trial {number} finished in {:.1}s with values {values:?}",
                                duration.as_secs_f64()
                            );
                        }
                        TrialOutcome::Failed { number, message } => {
                            warn!(
                                "Trial {number} failed after {:.1}s: {message}",
                                duration.as_secs_f64()
                            );
                        }
                    }
                    RunnerState::Deciding
                }

                RunnerState::Deciding => {
                    if trials_run >= self.config.target_trials {
                        RunnerState::Stopping(StopReason::TargetReached)
                    } else {
                        let now = self.clock.now();
                        let estimate = self.estimator.estimate(budget.remaining(now));
                        debug!(
                            "Next trial estimated at {:.1}s, {:.1}s of budget left",
                            estimate.as_secs_f64(),
                            budget.remaining(now).as_secs_f64()
                        );
                        if should_continue(now, budget.start, budget.total, estimate) {
                            RunnerState::AwaitingTrial
                        } else {
                            RunnerState::Stopping(StopReason::BudgetExhausted)
                        }
                    }
                }

                RunnerState::Stopping(reason) => {
                    match &reason {
                        StopReason::TargetReached => {
                            info!("Completed all {} trials", self.config.target_trials)
                        }
                        StopReason::BudgetExhausted => warn!(
                            "Stopping early: the estimated trial time exceeds the remaining wall budget"
                        ),
                        StopReason::Interrupted => {
                            warn!("Received interrupt from the operator. Exiting")
                        }
                        StopReason::Error(err) => error!("Halting run after unexpected failure: {err}"),
                    }
                    RunnerState::Stopped(reason)
                }

                RunnerState::Stopped(reason) => {
                    return RunReport {
                        reason,
                        trials_run,
                        elapsed: budget.elapsed(self.clock.now()),
                    };
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hs_search::{RandomSampler, SearchSpace};
    use hs_study::{MemoryStore, TrialContext};
    use hs_types::{Direction, StudyId, StudyMeta};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Clone)]
    struct ManualClock {
        base: Instant,
        offset: Arc<Mutex<Duration>>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                base: Instant::now(),
                offset: Arc::new(Mutex::new(Duration::ZERO)),
            }
        }

        fn advance(&self, d: Duration) {
            *self.offset.lock().unwrap() += d;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.base + *self.offset.lock().unwrap()
        }
    }

    /// Objective whose "execution time" is a scripted advance of the
    /// manual clock.
    struct TimedObjective {
        clock: ManualClock,
        durations: Mutex<VecDeque<u64>>,
    }

    impl TimedObjective {
        fn new(clock: ManualClock, durations: &[u64]) -> Self {
            Self {
                clock,
                durations: Mutex::new(durations.iter().copied().collect()),
            }
        }
    }

    impl Objective for TimedObjective {
        fn evaluate(&self, _trial: &mut TrialContext<'_>) -> Result<Vec<f64>, ObjectiveError> {
            let secs = self.durations.lock().unwrap().pop_front().unwrap_or(100);
            self.clock.advance(Duration::from_secs(secs));
            Ok(vec![0.5])
        }
    }

    struct ScriptedObjective {
        script: Mutex<VecDeque<Result<Vec<f64>, ObjectiveError>>>,
    }

    impl Objective for ScriptedObjective {
        fn evaluate(&self, _trial: &mut TrialContext<'_>) -> Result<Vec<f64>, ObjectiveError> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(vec![0.0]))
        }
    }

    fn fresh_study() -> Study {
        let store = Arc::new(MemoryStore::new());
        let meta = StudyMeta::new(
            StudyId::new("runner-test", "mem://test"),
            vec![Direction::Minimize],
            "random",
        );
        let space = SearchSpace::new().add_float("x", 0.0, 1.0);
        Study::create(store, meta, space, Box::new(RandomSampler::new())).unwrap()
    }

    fn runner_with<C: Clock>(
        objective: Box<dyn Objective>,
        target: u64,
        budget_secs: u64,
        clock: C,
    ) -> TrialRunner<C> {
        TrialRunner::with_clock(
            fresh_study(),
            objective,
            RunnerConfig {
                target_trials: target,
                wall_budget: Duration::from_secs(budget_secs),
            },
            Arc::new(AtomicBool::new(false)),
            clock,
        )
    }

    #[test]
    fn completes_target_with_a_generous_budget() {
        // Scenario: budget 3600s, target 5, trials around 100-120s each.
        let clock = ManualClock::new();
        let objective = TimedObjective::new(clock.clone(), &[100, 120, 100, 100, 100]);
        let mut runner = runner_with(Box::new(objective), 5, 3600, clock);

        let report = runner.run();
        assert!(matches!(report.reason, StopReason::TargetReached));
        assert_eq!(report.trials_run, 5);
        assert_eq!(runner.estimator().sample_count(), 5);
        assert_eq!(report.elapsed, Duration::from_secs(520));
    }

    #[test]
    fn budget_exhaustion_stops_before_the_target() {
        // Scenario: budget 300s, trials of 100s and 120s. After the second
        // trial the estimate is 110s against 80s left, so the run stops at
        // 2 of 5 trials.
        let clock = ManualClock::new();
        let objective = TimedObjective::new(clock.clone(), &[100, 120]);
        let mut runner = runner_with(Box::new(objective), 5, 300, clock);

        let report = runner.run();
        assert!(matches!(report.reason, StopReason::BudgetExhausted));
        assert_eq!(report.trials_run, 2);
        assert_eq!(report.elapsed, Duration::from_secs(220));
    }

    #[test]
    fn interrupt_mid_trial_is_clean_and_records_nothing() {
        let objective = ScriptedObjective {
            script: Mutex::new(VecDeque::from([Err(ObjectiveError::Interrupted)])),
        };
        let mut runner = runner_with(Box::new(objective), 5, 3600, SystemClock);

        let report = runner.run();
        assert!(matches!(report.reason, StopReason::Interrupted));
        assert_eq!(report.trials_run, 0);
        assert_eq!(runner.estimator().sample_count(), 0);
    }

    #[test]
    fn interrupt_before_launch_stops_without_a_trial() {
        let objective = ScriptedObjective {
            script: Mutex::new(VecDeque::new()),
        };
        let interrupt = Arc::new(AtomicBool::new(true));
        let mut runner = TrialRunner::with_clock(
            fresh_study(),
            Box::new(objective),
            RunnerConfig {
                target_trials: 5,
                wall_budget: Duration::from_secs(3600),
            },
            interrupt,
            SystemClock,
        );

        let report = runner.run();
        assert!(matches!(report.reason, StopReason::Interrupted));
        assert_eq!(report.trials_run, 0);
    }

    #[test]
    fn unexpected_failure_halts_without_retry() {
        let objective = ScriptedObjective {
            script: Mutex::new(VecDeque::from([Err(ObjectiveError::Fatal(
                "objective blew up".to_string(),
            ))])),
        };
        let mut runner = runner_with(Box::new(objective), 5, 3600, SystemClock);

        let report = runner.run();
        assert!(matches!(report.reason, StopReason::Error(_)));
        assert_eq!(report.trials_run, 0);
    }

    #[test]
    fn reported_trial_failures_count_toward_the_target() {
        let objective = ScriptedObjective {
            script: Mutex::new(VecDeque::from([
                Err(ObjectiveError::TrialFailed("diverged".to_string())),
                Ok(vec![0.1]),
                Err(ObjectiveError::TrialFailed("diverged".to_string())),
            ])),
        };
        let mut runner = runner_with(Box::new(objective), 3, 3600, SystemClock);

        let report = runner.run();
        assert!(matches!(report.reason, StopReason::TargetReached));
        assert_eq!(report.trials_run, 3);
        assert_eq!(runner.estimator().sample_count(), 3);
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use racesim_kernel::{
    CompareAggregate, CompareParams, Comparison, OrchestratorConfig, OrchestratorError,
    OrchestratorEvent, SkillCatalog, SkillExecutor, TrialError, TrialExecutor, TrialFailure,
    TrialSummary, derive_stream_seed, run_comparison, run_skill_batches, schedule, trial_seed,
};

#[derive(Debug, Clone, Copy)]
enum Fault {
    None,
    /// Panic on this index, but only under the original run seed.
    PanicAt(u64),
    PanicAlwaysAt(u64),
    StallAt(u64),
    FailAt(u64),
}

struct Stub {
    template: TrialSummary,
    run_seed: u64,
    fault: Fault,
}

fn template() -> TrialSummary {
    let catalog = SkillCatalog::load_from_static().unwrap();
    let params: CompareParams =
        serde_json::from_str(include_str!("../data/scenario.json")).unwrap();
    Comparison::new(params, &catalog)
        .unwrap()
        .run_trial(0, 0)
        .unwrap()
}

impl Stub {
    fn new(run_seed: u64, fault: Fault) -> Arc<Self> {
        Arc::new(Self {
            template: template(),
            run_seed,
            fault,
        })
    }
}

impl TrialExecutor for Stub {
    fn run_trial(&self, run_seed: u64, index: u64) -> Result<TrialSummary, TrialFailure> {
        let original = run_seed == self.run_seed;
        match self.fault {
            Fault::PanicAt(at) if at == index && original => panic!("injected worker crash"),
            Fault::PanicAlwaysAt(at) if at == index => panic!("injected worker crash"),
            Fault::StallAt(at) if at == index && original => {
                thread::sleep(Duration::from_secs(3));
            }
            Fault::FailAt(at) if at == index => {
                return Err(TrialFailure {
                    seed: trial_seed(run_seed, index),
                    params_fingerprint: 7,
                    source: TrialError::TickLimitExceeded { limit: 1 },
                });
            }
            _ => {}
        }
        let mut trial = self.template.clone();
        trial.index = index;
        trial.seed = trial_seed(run_seed, index);
        trial.bashin = f64::from(u32::try_from(index % 97).unwrap()) * 0.05 - 2.0;
        Ok(trial)
    }
}

fn config(workers: usize, retries: u32) -> OrchestratorConfig {
    OrchestratorConfig {
        workers,
        timeout_secs: 1,
        retries,
    }
}

fn indices(aggregate: &CompareAggregate) -> Vec<u64> {
    aggregate.trials().iter().map(|t| t.index).collect()
}

#[test]
fn progress_result_and_complete_arrive_in_order() {
    let mut events = Vec::new();
    let aggregate = run_comparison(Stub::new(9, Fault::None), 130, 9, &config(3, 0), |e| {
        events.push(e);
    })
    .unwrap();

    let checkpoints = schedule(130);
    assert_eq!(events.len(), checkpoints.len() + 2);
    for (event, expected) in events.iter().zip(&checkpoints) {
        assert_eq!(
            event,
            &OrchestratorEvent::Progress {
                samples_completed: *expected,
                samples_total: 130
            }
        );
    }
    assert_eq!(
        events[checkpoints.len()],
        OrchestratorEvent::Result {
            aggregate: aggregate.clone()
        }
    );
    assert_eq!(events.last(), Some(&OrchestratorEvent::Complete));
    assert_eq!(indices(&aggregate), (0..130).collect::<Vec<_>>());
}

#[test]
fn more_workers_than_samples_still_completes() {
    let aggregate = run_comparison(Stub::new(1, Fault::None), 3, 1, &config(8, 0), |_| {}).unwrap();
    assert_eq!(indices(&aggregate), vec![0, 1, 2]);
}

#[test]
fn crashed_worker_is_reported_not_ignored() {
    let err = run_comparison(Stub::new(4, Fault::PanicAt(45)), 60, 4, &config(2, 0), |_| {})
        .unwrap_err();
    match err {
        OrchestratorError::WorkerLost { range, .. } => assert!(range.contains(&45)),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn crashed_worker_range_is_resubmitted_under_fresh_seed() {
    let completes = AtomicUsize::new(0);
    let aggregate = run_comparison(Stub::new(4, Fault::PanicAt(45)), 60, 4, &config(2, 1), |e| {
        if e == OrchestratorEvent::Complete {
            completes.fetch_add(1, Ordering::SeqCst);
        }
    })
    .unwrap();
    assert_eq!(completes.load(Ordering::SeqCst), 1);
    assert_eq!(indices(&aggregate), (0..60).collect::<Vec<_>>());

    let fresh = derive_stream_seed(4, b"resubmit:1");
    let trials = aggregate.trials();
    assert_eq!(trials[45].seed, trial_seed(fresh, 45));
    assert_eq!(trials[15].seed, trial_seed(4, 15));
}

#[test]
fn silent_worker_times_out() {
    let err = run_comparison(Stub::new(2, Fault::StallAt(5)), 20, 2, &config(2, 0), |_| {})
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Timeout { .. }), "{err:?}");
}

#[test]
fn silent_worker_is_replaced_when_retries_allow() {
    let aggregate =
        run_comparison(Stub::new(2, Fault::StallAt(5)), 20, 2, &config(2, 1), |_| {}).unwrap();
    assert_eq!(aggregate.len(), 20);
}

#[test]
fn trial_failures_are_never_retried() {
    let err = run_comparison(Stub::new(3, Fault::FailAt(7)), 40, 3, &config(2, 3), |_| {})
        .unwrap_err();
    match err {
        OrchestratorError::Trial(failure) => {
            assert_eq!(failure.seed, trial_seed(3, 7));
            assert!(failure.to_string().contains("0000000000000007"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn repeated_crashes_exhaust_retries() {
    let err = run_comparison(Stub::new(5, Fault::PanicAlwaysAt(0)), 20, 5, &config(1, 1), |_| {})
        .unwrap_err();
    match err {
        OrchestratorError::RetriesExhausted { retries, last } => {
            assert_eq!(retries, 1);
            assert!(matches!(*last, OrchestratorError::WorkerLost { .. }));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

/// Fails the first trial and runs every other one slowly, counting them.
struct SlowAfterFailure {
    template: TrialSummary,
    ran: AtomicUsize,
}

impl TrialExecutor for SlowAfterFailure {
    fn run_trial(&self, run_seed: u64, index: u64) -> Result<TrialSummary, TrialFailure> {
        if index == 0 {
            return Err(TrialFailure {
                seed: trial_seed(run_seed, index),
                params_fingerprint: 7,
                source: TrialError::TickLimitExceeded { limit: 1 },
            });
        }
        thread::sleep(Duration::from_millis(5));
        self.ran.fetch_add(1, Ordering::SeqCst);
        let mut trial = self.template.clone();
        trial.index = index;
        Ok(trial)
    }
}

#[test]
fn workers_stop_once_the_run_fails() {
    let executor = Arc::new(SlowAfterFailure {
        template: template(),
        ran: AtomicUsize::new(0),
    });
    let err = run_comparison(Arc::clone(&executor), 400, 8, &config(2, 0), |_| {})
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Trial(_)), "{err:?}");
    thread::sleep(Duration::from_millis(100));
    let settled = executor.ran.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(500));
    assert_eq!(executor.ran.load(Ordering::SeqCst), settled);
    assert!(settled < 100, "{settled} trials ran after the failure");
}

struct CountingSkills;

impl SkillExecutor for CountingSkills {
    fn run_skill(
        &self,
        _skill_id: &str,
        _run_seed: u64,
        _samples: u64,
    ) -> Result<CompareAggregate, TrialFailure> {
        Ok(CompareAggregate::default())
    }
}

#[test]
fn every_activation_batch_lands_before_done() {
    let batches: Vec<Vec<String>> = (0..5)
        .map(|b| (0..3).map(|s| format!("{b}-{s}")).collect())
        .collect();
    let mut seen = Vec::new();
    let samples = run_skill_batches(
        Arc::new(CountingSkills),
        batches,
        10,
        1,
        &config(2, 0),
        |batch, results| {
            assert_eq!(results.len(), 3);
            seen.push(batch);
        },
    )
    .unwrap();
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    let ids: Vec<&str> = samples.iter().map(|s| s.skill_id.as_str()).collect();
    assert_eq!(ids.len(), 15);
    assert_eq!(ids[0], "0-0");
    assert_eq!(ids[14], "4-2");
}

#[cfg(feature = "async")]
#[tokio::test]
async fn async_wrapper_streams_events() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let aggregate = racesim_kernel::run_comparison_async(
        Stub::new(6, Fault::None),
        25,
        6,
        config(2, 0),
        Some(tx),
    )
    .await
    .unwrap();
    assert_eq!(aggregate.len(), 25);
    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event);
    }
    assert_eq!(kinds.len(), schedule(25).len() + 2);
    assert_eq!(kinds.last(), Some(&OrchestratorEvent::Complete));
}

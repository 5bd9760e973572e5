use racesim_kernel::{CompareParams, Comparison, SkillCatalog};

fn comparison() -> Comparison {
    let catalog = SkillCatalog::load_from_static().unwrap();
    let params: CompareParams =
        serde_json::from_str(include_str!("../data/scenario.json")).unwrap();
    Comparison::new(params, &catalog).unwrap()
}

#[test]
fn recorded_positions_never_regress() {
    let comparison = comparison();
    for index in 0..4 {
        let summary = comparison.run_trial(11, index).unwrap();
        let trace = comparison.trace(&summary).unwrap();
        for runner in [&trace.a, &trace.b] {
            assert!(!runner.position.is_empty());
            assert!(
                runner.position.windows(2).all(|w| w[1] >= w[0]),
                "trial {index} moved backwards"
            );
        }
    }
}

#[test]
fn stamina_never_goes_negative() {
    let catalog = SkillCatalog::load_from_static().unwrap();
    let mut params: CompareParams =
        serde_json::from_str(include_str!("../data/scenario.json")).unwrap();
    params.runner_a.stats.stamina = 300.0;
    params.runner_b.stats.stamina = 300.0;
    let comparison = Comparison::new(params, &catalog).unwrap();
    for index in 0..3 {
        let summary = comparison.run_trial(3, index).unwrap();
        assert!(summary.a.hp_remaining >= 0.0);
        assert!(summary.b.hp_remaining >= 0.0);
        let trace = comparison.trace(&summary).unwrap();
        assert!(trace.a.hp.iter().chain(&trace.b.hp).all(|hp| *hp >= 0.0));
    }
}

#[test]
fn every_runner_crosses_the_line() {
    let comparison = comparison();
    let distance = comparison.params().course.distance;
    let aggregate = comparison.run_range(8, 0..5).unwrap();
    for trial in aggregate.trials() {
        for outcome in [&trial.a, &trial.b] {
            let time = outcome.finish_time.unwrap();
            assert!(time.is_finite() && time > 0.0);
            assert!(outcome.position >= distance);
        }
        assert!(trial.bashin.is_finite());
    }
}

#[test]
fn summary_matches_its_trials() {
    let comparison = comparison();
    let aggregate = comparison.run_range(21, 0..25).unwrap();
    let summary = aggregate.summary();
    assert_eq!(summary.samples, 25);
    assert_eq!(summary.results.len(), 25);
    assert!(summary.min <= summary.median && summary.median <= summary.max);
    assert!(summary.min <= summary.mean + 1e-9 && summary.mean <= summary.max + 1e-9);
    for rate in [
        summary.stamina.a.survival_rate,
        summary.stamina.b.full_spurt_rate,
        summary.stamina.a.first_in_late_race_rate,
    ] {
        assert!((0.0..=100.0).contains(&rate));
    }
}

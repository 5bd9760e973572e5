//! Head-to-head comparison of two runners over many seeded trials.
use std::hash::Hasher;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

use crate::course::CourseData;
use crate::numbers::{floor_f64_to_usize, usize_to_f64};
use crate::params::{ParamsConfigError, RaceParameters, Side, SimulationOptions};
use crate::race::{Entrant, RaceMode, TICK_SECONDS, TrialError, TrialFailure, run_race};
use crate::rng::trial_seed;
use crate::runner::RunnerConfig;
use crate::sim::{RaceEnv, Runner, RunnerOutcome};
use crate::skills::SkillCatalog;

/// Horse lengths per metre gap.
pub const BASHIN_METRES: f64 = 2.5;

/// Everything one comparison run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareParams {
    #[serde(default = "CompareParams::default_samples")]
    pub samples: u32,
    #[serde(default)]
    pub seed: u64,
    pub course: CourseData,
    #[serde(default)]
    pub race: RaceParameters,
    pub runner_a: RunnerConfig,
    pub runner_b: RunnerConfig,
    #[serde(default)]
    pub pacemaker: Option<RunnerConfig>,
    #[serde(default)]
    pub options: SimulationOptions,
}

impl CompareParams {
    const fn default_samples() -> u32 {
        500
    }

    /// Check every input before the first trial runs.
    ///
    /// # Errors
    ///
    /// Returns `ParamsConfigError` naming the first offending field.
    pub fn validate(&self, catalog: &SkillCatalog) -> Result<(), ParamsConfigError> {
        if self.samples == 0 {
            return Err(ParamsConfigError::MinViolation {
                field: "samples",
                min: 1.0,
                value: 0.0,
            });
        }
        self.course.validate()?;
        self.options.validate()?;
        let seats = [
            (Side::A, Some(&self.runner_a)),
            (Side::B, Some(&self.runner_b)),
            (Side::Pacemaker, self.pacemaker.as_ref()),
        ];
        for (side, runner) in seats {
            let Some(runner) = runner else {
                continue;
            };
            runner
                .validate()
                .and_then(|()| catalog.check_runner(runner))
                .map_err(|source| ParamsConfigError::Runner { side, source })?;
        }
        Ok(())
    }

    /// Stable digest of the serialized parameters.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(&bytes);
        hasher.finish()
    }
}

/// Validated parameters with skills resolved, shared by every trial.
#[derive(Debug, Clone)]
pub struct Comparison {
    params: CompareParams,
    entrants: Vec<Entrant>,
    fingerprint: u64,
}

impl Comparison {
    /// Validate `params` and resolve each runner's skills.
    ///
    /// # Errors
    ///
    /// Returns `ParamsConfigError` when the parameters fail validation.
    pub fn new(params: CompareParams, catalog: &SkillCatalog) -> Result<Self, ParamsConfigError> {
        params.validate(catalog)?;
        let mut entrants = vec![
            Entrant {
                side: Side::A,
                skills: catalog.resolve(&params.runner_a),
                config: params.runner_a.clone(),
            },
            Entrant {
                side: Side::B,
                skills: catalog.resolve(&params.runner_b),
                config: params.runner_b.clone(),
            },
        ];
        if let Some(pacemaker) = &params.pacemaker {
            let skills = catalog.resolve(pacemaker);
            for _ in 0..params.options.pacemaker_count {
                entrants.push(Entrant {
                    side: Side::Pacemaker,
                    config: pacemaker.clone(),
                    skills: skills.clone(),
                });
            }
        }
        let fingerprint = params.fingerprint();
        Ok(Self {
            params,
            entrants,
            fingerprint,
        })
    }

    #[must_use]
    pub const fn params(&self) -> &CompareParams {
        &self.params
    }

    #[must_use]
    pub const fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    #[must_use]
    pub fn samples(&self) -> u64 {
        u64::from(self.params.samples)
    }

    fn env(&self) -> RaceEnv<'_> {
        RaceEnv {
            course: &self.params.course,
            params: &self.params.race,
            options: &self.params.options,
        }
    }

    fn race(
        &self,
        run_seed: u64,
        index: u64,
        record: bool,
    ) -> Result<(TrialSummary, [RunnerTrace; 2]), TrialFailure> {
        let seed = trial_seed(run_seed, index);
        let fail = |source| TrialFailure {
            seed,
            params_fingerprint: self.fingerprint,
            source,
        };
        let mut mode = CompareMode::new(&self.entrants, record);
        let outcome = run_race(&self.env(), seed, &mut mode).map_err(fail)?;
        let seated = outcome.runners.len();
        let mut runners = outcome.runners.into_iter();
        let (Some(a), Some(b)) = (runners.next(), runners.next()) else {
            return Err(fail(TrialError::MissingRunner { seated }));
        };
        let bashin = mode
            .gap
            .unwrap_or((b.position - a.position) / BASHIN_METRES);
        let summary = TrialSummary {
            index,
            seed,
            bashin,
            a,
            b,
        };
        Ok((summary, mode.traces))
    }

    /// Run the trial at `index` of the run seeded with `run_seed`.
    ///
    /// # Errors
    ///
    /// Returns `TrialFailure` when the trial breaks a numeric invariant.
    pub fn run_trial(&self, run_seed: u64, index: u64) -> Result<TrialSummary, TrialFailure> {
        self.race(run_seed, index, false).map(|(summary, _)| summary)
    }

    /// Run a contiguous range of trials into one aggregate.
    ///
    /// # Errors
    ///
    /// Returns the first `TrialFailure` encountered.
    pub fn run_range(
        &self,
        run_seed: u64,
        range: Range<u64>,
    ) -> Result<CompareAggregate, TrialFailure> {
        let mut aggregate = CompareAggregate::default();
        for index in range {
            aggregate.push(self.run_trial(run_seed, index)?);
        }
        Ok(aggregate)
    }

    /// Replay one trial recording per-tick traces of both runners.
    ///
    /// # Errors
    ///
    /// Returns `TrialFailure` when the trial breaks a numeric invariant.
    pub fn trace(&self, summary: &TrialSummary) -> Result<RunTrace, TrialFailure> {
        let seed_base = summary.seed.wrapping_sub(summary.index);
        let (_, [a, b]) = self.race(seed_base, summary.index, true)?;
        Ok(RunTrace {
            index: summary.index,
            seed: summary.seed,
            bashin: summary.bashin,
            a,
            b,
        })
    }

    /// Aggregate statistics plus traces of the representative runs.
    ///
    /// # Errors
    ///
    /// Returns `TrialFailure` if replaying a representative run fails.
    pub fn finalize(&self, aggregate: &CompareAggregate) -> Result<CompareResult, TrialFailure> {
        let summary = aggregate.summary();
        let runs = match summary.representative {
            Some(picks) => {
                let replay = |index: u64| -> Result<RunTrace, TrialFailure> {
                    match aggregate.trials.iter().find(|t| t.index == index) {
                        Some(trial) => self.trace(trial),
                        None => Ok(RunTrace::default()),
                    }
                };
                Some(Representative {
                    min: replay(picks.min)?,
                    max: replay(picks.max)?,
                    mean: replay(picks.mean)?,
                    median: replay(picks.median)?,
                })
            }
            None => None,
        };
        Ok(CompareResult { summary, runs })
    }
}

/// Per-tick samples of one runner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunnerTrace {
    pub time: Vec<f64>,
    pub position: Vec<f64>,
    pub speed: Vec<f64>,
    pub hp: Vec<f64>,
    pub lane: Vec<f64>,
}

impl RunnerTrace {
    fn record(&mut self, time: f64, runner: &Runner) {
        self.time.push(time);
        self.position.push(runner.position());
        self.speed.push(runner.speed());
        self.hp.push(runner.hp());
        self.lane.push(runner.lane());
    }
}

struct CompareMode<'a> {
    entrants: &'a [Entrant],
    record: bool,
    traces: [RunnerTrace; 2],
    done: [bool; 2],
    gap: Option<f64>,
}

impl<'a> CompareMode<'a> {
    fn new(entrants: &'a [Entrant], record: bool) -> Self {
        Self {
            entrants,
            record,
            traces: Default::default(),
            done: [false; 2],
            gap: None,
        }
    }
}

impl RaceMode for CompareMode<'_> {
    fn entrants(&self) -> &[Entrant] {
        self.entrants
    }

    fn on_tick(&mut self, tick: u32, runners: &[Runner]) {
        let [a, b, ..] = runners else {
            return;
        };
        if self.record {
            let time = f64::from(tick) * TICK_SECONDS;
            for (slot, runner) in [a, b].into_iter().enumerate() {
                if !self.done[slot] {
                    self.traces[slot].record(time, runner);
                }
            }
        }
        self.done = [a.is_finished(), b.is_finished()];
        if self.gap.is_none() && (a.is_finished() || b.is_finished()) {
            self.gap = Some((b.position() - a.position()) / BASHIN_METRES);
        }
    }
}

/// One finished trial, without traces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialSummary {
    pub index: u64,
    pub seed: u64,
    /// Positive when B finished ahead.
    pub bashin: f64,
    pub a: RunnerOutcome,
    pub b: RunnerOutcome,
}

impl TrialSummary {
    #[must_use]
    pub const fn side(&self, side: Side) -> Option<&RunnerOutcome> {
        match side {
            Side::A => Some(&self.a),
            Side::B => Some(&self.b),
            Side::Pacemaker => None,
        }
    }
}

/// Replayed trial with traces of both runners.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTrace {
    pub index: u64,
    pub seed: u64,
    pub bashin: f64,
    pub a: RunnerTrace,
    pub b: RunnerTrace,
}

/// Trials collected so far; merges exactly regardless of batching.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompareAggregate {
    trials: Vec<TrialSummary>,
}

impl CompareAggregate {
    pub fn push(&mut self, trial: TrialSummary) {
        let at = self.trials.partition_point(|t| t.index < trial.index);
        self.trials.insert(at, trial);
    }

    pub fn merge(&mut self, other: Self) {
        self.trials.extend(other.trials);
        self.trials.sort_by_key(|t| t.index);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.trials.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    /// Trials in index order.
    #[must_use]
    pub fn trials(&self) -> &[TrialSummary] {
        &self.trials
    }

    /// Bashin gaps, ascending.
    #[must_use]
    pub fn results(&self) -> Vec<f64> {
        let mut results: Vec<f64> = self.trials.iter().map(|t| t.bashin).collect();
        results.sort_by(f64::total_cmp);
        results
    }

    #[must_use]
    pub fn summary(&self) -> CompareSummary {
        let results = self.results();
        let n = results.len();
        let mean = if n == 0 {
            0.0
        } else {
            results.iter().sum::<f64>() / usize_to_f64(n)
        };
        CompareSummary {
            samples: n,
            min: results.first().copied().unwrap_or(0.0),
            max: results.last().copied().unwrap_or(0.0),
            mean,
            median: median(&results),
            representative: self.representative(),
            rushed: SideStats::collect(&self.trials, |o| o.rushed.map(|s| s.length())),
            spot_struggle: SideStats::collect(&self.trials, |o| {
                o.spot_struggle.map(|s| s.length())
            }),
            dueling: SideStats::collect(&self.trials, |o| o.dueling.map(|s| s.length())),
            stamina: SideStats::rates(&self.trials),
            results,
        }
    }

    /// Min, max and the runs closest to the mean and median, the latter two
    /// picked among the last fifth (at most 200) of the samples.
    fn representative(&self) -> Option<RepresentativeRuns> {
        let first = self.trials.first()?;
        let n = self.trials.len();
        let cutoff = floor_f64_to_usize(usize_to_f64(n) * 0.8).max(n.saturating_sub(200));
        let mut picks = RepresentativeRuns {
            min: first.index,
            max: first.index,
            mean: first.index,
            median: first.index,
        };
        let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut est_mean, mut est_median) = (0.0, 0.0);
        let (mut best_mean, mut best_median) = (f64::INFINITY, f64::INFINITY);
        let mut seen: Vec<f64> = Vec::with_capacity(n);
        for (i, trial) in self.trials.iter().enumerate() {
            let gap = trial.bashin;
            seen.push(gap);
            if gap < min {
                min = gap;
                picks.min = trial.index;
            }
            if gap > max {
                max = gap;
                picks.max = trial.index;
            }
            if i == cutoff {
                seen.sort_by(f64::total_cmp);
                est_mean = seen.iter().sum::<f64>() / usize_to_f64(seen.len());
                est_median = median(&seen);
            }
            if i >= cutoff {
                if (gap - est_mean).abs() < best_mean {
                    best_mean = (gap - est_mean).abs();
                    picks.mean = trial.index;
                }
                if (gap - est_median).abs() < best_median {
                    best_median = (gap - est_median).abs();
                    picks.median = trial.index;
                }
            }
        }
        Some(picks)
    }
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    let mid = n / 2;
    if mid > 0 && n % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Trial indices of the representative runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepresentativeRuns {
    pub min: u64,
    pub max: u64,
    pub mean: u64,
    pub median: u64,
}

/// Lengths of a per-trial behaviour (rushed, spot struggle, dueling).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LengthStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Percentage of trials in which it happened.
    pub frequency: f64,
}

impl LengthStats {
    fn from_lengths(lengths: &[f64], samples: usize) -> Self {
        if lengths.is_empty() {
            return Self::default();
        }
        Self {
            min: lengths.iter().copied().fold(f64::INFINITY, f64::min),
            max: lengths.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean: lengths.iter().sum::<f64>() / usize_to_f64(lengths.len()),
            frequency: if samples > 0 {
                usize_to_f64(lengths.len()) / usize_to_f64(samples) * 100.0
            } else {
                0.0
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StaminaStats {
    /// Percentage of trials finished without running out of stamina.
    pub survival_rate: f64,
    pub full_spurt_rate: f64,
    pub first_in_late_race_rate: f64,
}

/// A statistic for both compared runners.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SideStats<T> {
    pub a: T,
    pub b: T,
}

const fn side_a(trial: &TrialSummary) -> &RunnerOutcome {
    &trial.a
}

const fn side_b(trial: &TrialSummary) -> &RunnerOutcome {
    &trial.b
}

impl SideStats<LengthStats> {
    fn collect(trials: &[TrialSummary], length: impl Fn(&RunnerOutcome) -> Option<f64>) -> Self {
        let lengths = |pick: fn(&TrialSummary) -> &RunnerOutcome| -> Vec<f64> {
            trials.iter().filter_map(|t| length(pick(t))).collect()
        };
        Self {
            a: LengthStats::from_lengths(&lengths(side_a), trials.len()),
            b: LengthStats::from_lengths(&lengths(side_b), trials.len()),
        }
    }
}

impl SideStats<StaminaStats> {
    fn rates(trials: &[TrialSummary]) -> Self {
        let rate = |pick: fn(&TrialSummary) -> &RunnerOutcome| -> StaminaStats {
            if trials.is_empty() {
                return StaminaStats::default();
            }
            let n = usize_to_f64(trials.len());
            let count = |test: fn(&RunnerOutcome) -> bool| {
                usize_to_f64(trials.iter().filter(|t| test(pick(t))).count()) / n * 100.0
            };
            StaminaStats {
                survival_rate: count(|o| o.hp_depleted_remaining.is_none()),
                full_spurt_rate: count(|o| o.full_spurt),
                first_in_late_race_rate: count(|o| o.first_in_late_race),
            }
        };
        Self {
            a: rate(side_a),
            b: rate(side_b),
        }
    }
}

/// Statistics over every trial of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareSummary {
    pub samples: usize,
    /// Bashin gaps, ascending.
    pub results: Vec<f64>,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub representative: Option<RepresentativeRuns>,
    pub rushed: SideStats<LengthStats>,
    pub spot_struggle: SideStats<LengthStats>,
    pub dueling: SideStats<LengthStats>,
    pub stamina: SideStats<StaminaStats>,
}

/// Traces of the runs picked as representative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Representative {
    pub min: RunTrace,
    pub max: RunTrace,
    pub mean: RunTrace,
    pub median: RunTrace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareResult {
    pub summary: CompareSummary,
    pub runs: Option<Representative>,
}

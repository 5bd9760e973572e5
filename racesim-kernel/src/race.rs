//! Fixed-timestep race loop for a single trial.
//!
//! [`run_race`] seats the entrants a [`RaceMode`] supplies, steps every
//! unfinished runner once per tick against a snapshot of the field, and
//! hands the mode a look at the field after each tick. Modes differ only in
//! who they seat and what they record; the loop itself is shared.
use std::sync::Arc;

use rand::RngCore;
use thiserror::Error;

use crate::params::{PositionKeepMode, Side};
use crate::poskeep::analytical_pacer_position;
use crate::rng::{CountingRng, Prng, Stream};
use crate::runner::RunnerConfig;
use crate::sim::{
    Pacer, RaceEnv, Runner, RunnerOutcome, RunnerSeat, RunnerSnapshot, SpotStruggle, TickView,
};
use crate::skills::{CompiledSkill, EffectTarget, OutboundEffect};
use crate::strategy::Strategy;

/// Simulated seconds per tick.
pub const TICK_SECONDS: f64 = 1.0 / 15.0;
pub const GATE_COUNT: usize = 9;
/// Ten simulated minutes; no valid race gets close.
pub const MAX_TICKS: u32 = 15 * 600;

/// One competitor seated for a trial.
#[derive(Debug, Clone)]
pub struct Entrant {
    pub side: Side,
    pub config: RunnerConfig,
    pub skills: Vec<Arc<CompiledSkill>>,
}

/// What distinguishes one kind of race from another.
pub trait RaceMode {
    /// Competitors in seat order.
    fn entrants(&self) -> &[Entrant];

    /// Called once after every tick with the whole field.
    fn on_tick(&mut self, _tick: u32, _runners: &[Runner]) {}
}

/// Numeric invariant broken inside a trial.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrialError {
    #[error("runner {runner} has non-finite {field} at tick {tick}")]
    NonFinite {
        runner: usize,
        field: &'static str,
        tick: u32,
    },
    #[error("runner {runner} stamina fell to {hp} at tick {tick}")]
    NegativeStamina { runner: usize, hp: f64, tick: u32 },
    #[error("runner {runner} moved back from {from} to {to} at tick {tick}")]
    PositionRegressed {
        runner: usize,
        from: f64,
        to: f64,
        tick: u32,
    },
    #[error("race still running after {limit} ticks")]
    TickLimitExceeded { limit: u32 },
    #[error("race seated {seated} runners, too few to compare")]
    MissingRunner { seated: usize },
}

/// A failed trial with what is needed to reproduce it.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("trial seed {seed} failed (params {params_fingerprint:016x}): {source}")]
pub struct TrialFailure {
    pub seed: u64,
    pub params_fingerprint: u64,
    pub source: TrialError,
}

/// Everything left of a race once the last runner crosses the line.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceOutcome {
    pub seed: u64,
    pub ticks: u32,
    pub gates: Vec<usize>,
    pub runners: Vec<RunnerOutcome>,
}

/// Run one trial to completion.
///
/// # Errors
///
/// Returns `TrialError` when a runner's state stops being physical or the
/// race fails to finish within [`MAX_TICKS`].
pub fn run_race<M: RaceMode + ?Sized>(
    env: &RaceEnv<'_>,
    seed: u64,
    mode: &mut M,
) -> Result<RaceOutcome, TrialError> {
    let race = Race::new(*env, mode.entrants(), seed);
    race.run(mode)
}

struct Race<'a> {
    env: RaceEnv<'a>,
    seed: u64,
    rng: Stream,
    gates: Vec<usize>,
    runners: Vec<Runner>,
    tick: u32,
    pacer_override: Option<usize>,
    late_race_leader: Option<usize>,
}

impl<'a> Race<'a> {
    fn new(env: RaceEnv<'a>, entrants: &[Entrant], seed: u64) -> Self {
        let mut rng = CountingRng::new(seed);
        let mut pool: Vec<usize> = (0..GATE_COUNT).collect();
        for i in (1..pool.len()).rev() {
            let j = rng.uniform(u32::try_from(i + 1).unwrap_or(u32::MAX)) as usize;
            pool.swap(i, j);
        }
        let gates: Vec<usize> = entrants
            .iter()
            .enumerate()
            .map(|(index, _)| pool[index % GATE_COUNT])
            .collect();
        let runners = entrants
            .iter()
            .enumerate()
            .map(|(index, entrant)| {
                let seat = RunnerSeat {
                    index,
                    side: entrant.side,
                    config: &entrant.config,
                    skills: &entrant.skills,
                    gate: gates[index],
                    seed: u64::from(rng.next_u32()),
                };
                Runner::new(&seat, &env)
            })
            .collect();
        Self {
            env,
            seed,
            rng,
            gates,
            runners,
            tick: 0,
            pacer_override: None,
            late_race_leader: None,
        }
    }

    fn run<M: RaceMode + ?Sized>(mut self, mode: &mut M) -> Result<RaceOutcome, TrialError> {
        self.start();
        while self.runners.iter().any(|r| !r.is_finished()) {
            if self.tick >= MAX_TICKS {
                return Err(TrialError::TickLimitExceeded { limit: MAX_TICKS });
            }
            self.run_tick()?;
            mode.on_tick(self.tick, &self.runners);
        }
        log::debug!(
            "race seed {} finished after {} ticks ({} race draws)",
            self.seed,
            self.tick,
            self.rng.draws()
        );
        Ok(RaceOutcome {
            seed: self.seed,
            ticks: self.tick,
            gates: self.gates,
            runners: self.runners.into_iter().map(Runner::finish).collect(),
        })
    }

    fn start(&mut self) {
        let snapshots = self.snapshots();
        let view = TickView {
            tick: 0,
            runners: &snapshots,
            pacer: None,
        };
        for idx in 0..self.runners.len() {
            let outbound = self.runners[idx].prepare(&self.env, &view);
            self.deliver(idx, &outbound);
        }
    }

    fn run_tick(&mut self) -> Result<(), TrialError> {
        self.tick += 1;
        let snapshots = self.snapshots();
        let pacer = self.select_pacer(&snapshots);
        let view = TickView {
            tick: self.tick,
            runners: &snapshots,
            pacer,
        };
        for idx in 0..self.runners.len() {
            if self.runners[idx].is_finished() {
                continue;
            }
            let before = self.runners[idx].position();
            let outbound = self.runners[idx].step(&self.env, &view, TICK_SECONDS);
            self.check_runner(idx, before)?;
            self.deliver(idx, &outbound);
        }
        self.run_spot_struggle_check();
        self.run_late_race_check();
        Ok(())
    }

    fn snapshots(&self) -> Vec<RunnerSnapshot> {
        self.runners.iter().map(Runner::snapshot).collect()
    }

    fn select_pacer(&mut self, snapshots: &[RunnerSnapshot]) -> Option<Pacer> {
        match self.env.options.position_keep_mode {
            PositionKeepMode::None => None,
            PositionKeepMode::Virtual => Some(Pacer::Virtual(analytical_pacer_position(
                self.env.course.distance,
                self.env.course.base_speed(),
                f64::from(self.tick) * TICK_SECONDS,
            ))),
            PositionKeepMode::Approximate => {
                for strategy in [Strategy::Runaway, Strategy::FrontRunner] {
                    if let Some(lead) = furthest(snapshots, |s| s.keep_strategy == strategy) {
                        return Some(Pacer::Runner(lead));
                    }
                }
                if let Some(idx) = self.pacer_override {
                    return Some(Pacer::Runner(idx));
                }
                for strategy in [
                    Strategy::PaceChaser,
                    Strategy::LateSurger,
                    Strategy::EndCloser,
                ] {
                    if let Some(lead) = furthest(snapshots, |s| s.keep_strategy == strategy) {
                        log::trace!("runner {lead} takes the pace at tick {}", self.tick);
                        self.pacer_override = Some(lead);
                        self.runners[lead].take_pace();
                        return Some(Pacer::Runner(lead));
                    }
                }
                None
            }
        }
    }

    /// Hand effects aimed at others to the runners they reach.
    fn deliver(&mut self, emitter: usize, outbound: &[OutboundEffect]) {
        for effect in outbound {
            for idx in 0..self.runners.len() {
                if idx == emitter || !self.reaches(effect, idx) {
                    continue;
                }
                self.runners[idx].receive(effect, self.tick, &self.env);
            }
        }
    }

    fn reaches(&self, effect: &OutboundEffect, idx: usize) -> bool {
        let position = self.runners[idx].position();
        match effect.effect.target {
            EffectTarget::Own => false,
            EffectTarget::AheadOfSelf | EffectTarget::AheadOfPosition => {
                position > effect.source_position
            }
            EffectTarget::BehindSelf => position < effect.source_position,
            _ => true,
        }
    }

    fn check_runner(&self, idx: usize, before: f64) -> Result<(), TrialError> {
        let runner = &self.runners[idx];
        let tick = self.tick;
        for (field, value) in [("position", runner.position()), ("speed", runner.speed())] {
            if !value.is_finite() {
                return Err(TrialError::NonFinite {
                    runner: idx,
                    field,
                    tick,
                });
            }
        }
        let hp = runner.hp();
        if hp < 0.0 {
            return Err(TrialError::NegativeStamina {
                runner: idx,
                hp,
                tick,
            });
        }
        if runner.position() < before {
            return Err(TrialError::PositionRegressed {
                runner: idx,
                from: before,
                to: runner.position(),
                tick,
            });
        }
        Ok(())
    }

    /// Front runners bunched together early start fighting for the lead.
    fn run_spot_struggle_check(&mut self) {
        let course = self.env.course;
        for idx in 0..self.runners.len() {
            if !self.runners[idx].spot_struggle_eligible(course) {
                continue;
            }
            let me = self.runners[idx].snapshot();
            let (distance_gap, lane_gap) = SpotStruggle::gaps(me.keep_strategy);
            let group: Vec<usize> = self
                .runners
                .iter()
                .filter(|other| {
                    let s = other.snapshot();
                    s.keep_strategy == me.keep_strategy
                        && !other.has_spot_struggled()
                        && !s.finished
                        && (s.position - me.position).abs() <= distance_gap
                        && (s.lane - me.lane).abs() < lane_gap
                })
                .map(Runner::index)
                .collect();
            if group.len() >= 2 {
                log::trace!("spot struggle at tick {} among {group:?}", self.tick);
                for member in group {
                    self.runners[member].start_spot_struggle(course);
                }
            }
        }
    }

    fn run_late_race_check(&mut self) {
        if self.late_race_leader.is_some() {
            return;
        }
        let threshold = self.env.course.distance * 2.0 / 3.0;
        let Some(lead) = self
            .runners
            .iter()
            .map(Runner::position)
            .max_by(f64::total_cmp)
        else {
            return;
        };
        if lead < threshold {
            return;
        }
        let tied: Vec<usize> = self
            .runners
            .iter()
            .filter(|r| r.position().total_cmp(&lead).is_eq())
            .map(Runner::index)
            .collect();
        let pick = if tied.len() > 1 {
            let roll = self
                .rng
                .uniform(u32::try_from(tied.len()).unwrap_or(u32::MAX));
            tied[roll as usize]
        } else {
            tied[0]
        };
        self.late_race_leader = Some(pick);
        self.runners[pick].mark_first_in_late_race();
    }
}

/// Furthest-forward runner matching `filter`.
fn furthest(snapshots: &[RunnerSnapshot], filter: impl Fn(&RunnerSnapshot) -> bool) -> Option<usize> {
    snapshots
        .iter()
        .filter(|s| filter(s))
        .max_by(|a, b| a.position.total_cmp(&b.position))
        .map(|s| s.index)
}

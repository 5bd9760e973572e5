//! One competitor's per-tick update.
//!
//! A [`Runner`] owns every piece of mutable per-trial state for a single
//! competitor. The race hands it a read-only [`TickView`] of everybody's
//! positions each tick instead of a back-reference to itself, so a step is
//! a function of the runner's own state, the view and the timestep.
pub mod behaviours;
pub mod lane;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::course::{CourseData, HORSE_LANE, SECTION_COUNT};
use crate::health::{
    ConsumptionState, GameHealthPolicy, HealthPolicy, NoopHealthPolicy, SpurtPlan,
};
use crate::numbers::{CompensatedAccumulator, i64_to_f64, usize_to_f64};
use crate::params::{
    HealthSystem, PositionKeepMode, RaceParameters, RunnerToggles, Side, SimulationOptions,
};
use crate::poskeep::{
    KeepInput, PacerView, PositionKeepActivation, PositionKeepState, PositionKeeper,
    SpecialConditions, SpecialContext,
};
use crate::rng::{Prng, RngBundle};
use crate::runner::{Aptitudes, RunnerConfig, SpeedProfile, StatLine};
use crate::skills::conditions::lane_bucket;
use crate::skills::{
    ActivationContext, ActivationCounters, CompiledSkill, ConditionSource, ConditionVar,
    EffectCommand, OutboundEffect, SkillActivation, SkillBook, SkillStreams, StatKind,
};
use crate::strategy::Strategy;

pub use behaviours::{DuelCheck, Downhill, Dueling, Rushed, Span, SpotStruggle, rushed_chance};
pub use lane::{LaneInput, LaneState};

const START_SPEED: f64 = 3.0;
const START_DASH_ACCEL: f64 = 24.0;
const PHASE_DECELERATION: [f64; 3] = [-1.2, -0.8, -1.0];
const PACE_DOWN_DECELERATION: f64 = -0.5;
const NO_HP_DECELERATION: f64 = -1.2;
const BAD_START_DELAY: f64 = 0.08;
const BASHIN: f64 = 2.5;
/// Holding this skill makes a rushed start less likely.
const RUSHED_GUARD_SKILL: &str = "202161";

/// Shared, read-only inputs of one race.
#[derive(Debug, Clone, Copy)]
pub struct RaceEnv<'a> {
    pub course: &'a CourseData,
    pub params: &'a RaceParameters,
    pub options: &'a SimulationOptions,
}

/// What other runners may observe about one runner at the start of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunnerSnapshot {
    pub index: usize,
    pub position: f64,
    pub lane: f64,
    pub speed: f64,
    pub keep_strategy: Strategy,
    pub scoring: bool,
    pub finished: bool,
}

/// Who sets the pace this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacer {
    Runner(usize),
    Virtual(f64),
}

#[derive(Debug, Clone, Copy)]
pub struct TickView<'a> {
    pub tick: u32,
    pub runners: &'a [RunnerSnapshot],
    pub pacer: Option<Pacer>,
}

/// How a runner enters the race.
#[derive(Debug, Clone)]
pub struct RunnerSeat<'a> {
    pub index: usize,
    pub side: Side,
    pub config: &'a RunnerConfig,
    pub skills: &'a [Arc<CompiledSkill>],
    pub gate: usize,
    pub seed: u64,
}

/// Final state of one runner, kept after the trial ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerOutcome {
    pub index: usize,
    pub side: Side,
    pub name: String,
    pub finish_time: Option<f64>,
    pub position: f64,
    pub start_delay: f64,
    pub hp_remaining: f64,
    /// Distance left to run when stamina first hit zero.
    pub hp_depleted_remaining: Option<f64>,
    pub spurt: Option<SpurtPlan>,
    pub full_spurt: bool,
    pub first_in_late_race: bool,
    pub rushed: Option<Span>,
    pub spot_struggle: Option<Span>,
    pub dueling: Option<Span>,
    pub downhill: Vec<Span>,
    pub position_keep: Vec<PositionKeepActivation>,
    pub counters: ActivationCounters,
    pub activations: Vec<SkillActivation>,
    pub rng_draws: u64,
}

#[derive(Debug, Clone, Copy)]
struct StaticConditions {
    course_distance: f64,
    distance_type: f64,
    ground_type: f64,
    ground_condition: f64,
    weather: f64,
    season: f64,
    time: f64,
    track_id: f64,
    rotation: f64,
    grade: f64,
    running_style: f64,
    motivation: f64,
    base: StatLine,
    random_lot: f64,
}

/// Values the condition language reads, captured before skills run.
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
struct ConditionFrame {
    statics: StaticConditions,
    position: f64,
    /// Course phase under the runner, including the final leg (3).
    phase: usize,
    hp_ratio: f64,
    order: usize,
    field_size: usize,
    gap_ahead: Option<f64>,
    gap_behind: Option<f64>,
    lane_type: f64,
    slope: f64,
    corner: i64,
    final_corner: bool,
    last_straight: bool,
    last_spurt: bool,
    elapsed: f64,
    overtake: bool,
    blocked_side: bool,
    rushed: bool,
    hp_empty_once: bool,
    bad_start: bool,
    counters: ActivationCounters,
    used: SmallVec<[i64; 8]>,
}

const fn flag(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

impl ConditionSource for ConditionFrame {
    fn value(&self, var: ConditionVar) -> Option<f64> {
        let s = &self.statics;
        let distance = s.course_distance;
        let value = match var {
            ConditionVar::Always => 1.0,
            ConditionVar::CourseDistance => distance,
            ConditionVar::DistanceType => s.distance_type,
            ConditionVar::GroundType => s.ground_type,
            ConditionVar::GroundCondition => s.ground_condition,
            ConditionVar::Weather => s.weather,
            ConditionVar::Season => s.season,
            ConditionVar::Time => s.time,
            ConditionVar::TrackId => s.track_id,
            ConditionVar::Rotation => s.rotation,
            ConditionVar::Grade => s.grade,
            ConditionVar::RunningStyle => s.running_style,
            ConditionVar::Motivation => s.motivation,
            ConditionVar::BaseSpeed => s.base.speed,
            ConditionVar::BaseStamina => s.base.stamina,
            ConditionVar::BasePower => s.base.power,
            ConditionVar::BaseGuts => s.base.guts,
            ConditionVar::BaseWiz => s.base.wit,
            ConditionVar::RandomLot => s.random_lot,
            ConditionVar::Phase => usize_to_f64(self.phase),
            ConditionVar::DistanceRate => self.position / distance * 100.0,
            ConditionVar::RemainDistance => distance - self.position,
            ConditionVar::HpPer => self.hp_ratio * 100.0,
            ConditionVar::Order => usize_to_f64(self.order),
            ConditionVar::OrderRate => {
                usize_to_f64(self.order) / usize_to_f64(self.field_size.max(1)) * 100.0
            }
            ConditionVar::IsLastspurt => flag(self.last_spurt),
            ConditionVar::IsLastStraight => flag(self.last_straight),
            ConditionVar::IsFinalcorner => flag(self.final_corner),
            ConditionVar::Corner => i64_to_f64(self.corner),
            ConditionVar::Slope => self.slope,
            ConditionVar::Accumulatetime => self.elapsed,
            ConditionVar::IsOvertake => flag(self.overtake),
            ConditionVar::BlockedSide => flag(self.blocked_side),
            ConditionVar::IsTemptation => flag(self.rushed),
            ConditionVar::IsHpEmptyOnetime => flag(self.hp_empty_once),
            ConditionVar::BashinDiffInfront => self.gap_ahead? / BASHIN,
            ConditionVar::BashinDiffBehind => self.gap_behind? / BASHIN,
            ConditionVar::ActivateCountAll => f64::from(self.counters.all),
            ConditionVar::ActivateCountStart => f64::from(self.counters.start),
            ConditionVar::ActivateCountMiddle => f64::from(self.counters.middle),
            ConditionVar::ActivateCountEndAfter => f64::from(self.counters.end_after),
            ConditionVar::ActivateCountHeal => f64::from(self.counters.heal),
            ConditionVar::IsUsedSkillId => return None,
            ConditionVar::IsBadstart => flag(self.bad_start),
            ConditionVar::LaneType => self.lane_type,
        };
        Some(value)
    }

    fn used_skill(&self, id: i64) -> bool {
        self.used.contains(&id)
    }

    fn position(&self) -> f64 {
        self.position
    }
}

/// Section speed jitter: 24 sections plus a zero sentinel for the finish.
fn section_modifiers(
    enabled: bool,
    wit: f64,
    base_speed: f64,
    rng: &mut impl Prng,
) -> [f64; SECTION_COUNT + 1] {
    let mut out = [0.0; SECTION_COUNT + 1];
    if enabled {
        let max = wit / 5500.0 * (wit * 0.1).log10();
        for modifier in out.iter_mut().take(SECTION_COUNT) {
            *modifier = base_speed * (max - 0.65 + rng.random() * 0.65) / 100.0;
        }
    }
    out
}

/// One competitor for one trial.
#[derive(Debug)]
pub struct Runner {
    index: usize,
    side: Side,
    name: String,
    strategy: Strategy,
    aptitudes: Aptitudes,
    stats: StatLine,
    /// Stats with every skill delta applied but no floor.
    raw_stats: StatLine,
    profile: SpeedProfile,
    toggles: RunnerToggles,
    statics: StaticConditions,
    rng: RngBundle,
    skills: SkillBook,
    health: Box<dyn HealthPolicy>,
    keeper: PositionKeeper,
    special: SpecialConditions,
    lane: LaneState,
    rushed: Rushed,
    downhill: Downhill,
    dueling: Dueling,
    struggle: SpotStruggle,
    section_modifiers: [f64; SECTION_COUNT + 1],
    distance_run: CompensatedAccumulator,
    speed: f64,
    accel: f64,
    target_speed: f64,
    dash_accel: f64,
    start_dash: bool,
    start_delay: f64,
    delay_left: f64,
    started: bool,
    phase: usize,
    hill: Option<usize>,
    next_hill: usize,
    slope: f64,
    elapsed: f64,
    spurt: Option<SpurtPlan>,
    last_spurt: bool,
    hp_depleted_remaining: Option<f64>,
    first_in_late_race: bool,
    scoring: bool,
    finish_time: Option<f64>,
}

impl Runner {
    #[must_use]
    pub fn new(seat: &RunnerSeat<'_>, env: &RaceEnv<'_>) -> Self {
        let course = env.course;
        let config = seat.config;
        let toggles = env.options.toggles_for(seat.side);
        let mut rng = RngBundle::from_runner_seed(seat.seed);
        let stats = config.adjusted_stats(course, env.params);
        let start_delay = 0.1 * rng.master.random();
        let random_lot = f64::from(rng.master.uniform(100));

        let skills = SkillBook::new(seat.index, seat.skills, course, &mut rng.skill);
        let mut chance = rushed_chance(stats.wit);
        if config.has_skill(RUSHED_GUARD_SKILL) {
            chance -= 0.03;
        }
        let rushed = Rushed::roll(
            toggles.rushed,
            chance.max(0.0),
            course.section_length(),
            &mut rng.rushed,
        );
        let health: Box<dyn HealthPolicy> = match env.options.health_system {
            HealthSystem::Game => Box::new(GameHealthPolicy::new(
                course,
                env.params.ground,
                rng.health.clone(),
            )),
            HealthSystem::Noop => Box::new(NoopHealthPolicy),
        };
        let statics = StaticConditions {
            course_distance: course.distance,
            distance_type: i64_to_f64(course.distance_type().code()),
            ground_type: i64_to_f64(course.surface.code()),
            ground_condition: i64_to_f64(env.params.ground.code()),
            weather: i64_to_f64(env.params.weather.code()),
            season: i64_to_f64(env.params.season.code()),
            time: i64_to_f64(env.params.time_of_day.code()),
            track_id: f64::from(course.id),
            rotation: i64_to_f64(course.orientation.code()),
            grade: i64_to_f64(env.params.grade.code()),
            running_style: i64_to_f64(config.strategy.code()),
            motivation: i64_to_f64(config.motivation_code()),
            base: config.base_stats(),
            random_lot,
        };
        let keep_enabled = env.options.position_keep_mode != PositionKeepMode::None;

        Self {
            index: seat.index,
            side: seat.side,
            name: config.name.clone(),
            strategy: config.strategy,
            aptitudes: config.aptitudes,
            stats,
            raw_stats: stats,
            profile: SpeedProfile::derive(&stats, config.strategy, &config.aptitudes, course),
            toggles,
            statics,
            rng,
            skills,
            health,
            keeper: PositionKeeper::new(config.strategy, course, keep_enabled),
            special: SpecialConditions::default(),
            lane: LaneState::from_gate(seat.gate),
            rushed,
            downhill: Downhill::default(),
            dueling: Dueling::default(),
            struggle: SpotStruggle::default(),
            section_modifiers: [0.0; SECTION_COUNT + 1],
            distance_run: CompensatedAccumulator::default(),
            speed: START_SPEED,
            accel: 0.0,
            target_speed: 0.85 * course.base_speed(),
            dash_accel: START_DASH_ACCEL,
            start_dash: true,
            start_delay,
            delay_left: start_delay,
            started: false,
            phase: 0,
            hill: None,
            next_hill: 0,
            slope: 0.0,
            elapsed: 0.0,
            spurt: None,
            last_spurt: false,
            hp_depleted_remaining: None,
            first_in_late_race: false,
            scoring: seat.side != Side::Pacemaker,
            finish_time: None,
        }
    }

    /// Fire gate skills, then derive speeds and stamina from the final stats.
    pub fn prepare(&mut self, env: &RaceEnv<'_>, view: &TickView<'_>) -> Vec<OutboundEffect> {
        let frame = self.condition_frame(env.course, view);
        self.skills.drop_statically_false(&frame);
        let outbound = self.run_skills(env, view, 0.0);

        let course = env.course;
        self.profile = SpeedProfile::derive(&self.stats, self.strategy, &self.aptitudes, course);
        self.health
            .init(self.strategy, self.stats.stamina, self.stats.guts, self.stats.wit);
        self.section_modifiers = section_modifiers(
            self.toggles.section_modifier,
            self.stats.wit,
            course.base_speed(),
            &mut self.rng.wit,
        );
        log::trace!(
            "runner {} ready: delay {:.3}s, max hp {:.0}",
            self.index,
            self.start_delay,
            self.health.maximum()
        );
        outbound
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub const fn side(&self) -> Side {
        self.side
    }

    #[must_use]
    pub fn position(&self) -> f64 {
        self.distance_run.value()
    }

    #[must_use]
    pub const fn speed(&self) -> f64 {
        self.speed
    }

    #[must_use]
    pub const fn lane(&self) -> f64 {
        self.lane.lane()
    }

    #[must_use]
    pub fn hp(&self) -> f64 {
        self.health.current()
    }

    #[must_use]
    pub const fn phase(&self) -> usize {
        self.phase
    }

    #[must_use]
    pub const fn elapsed(&self) -> f64 {
        self.elapsed
    }

    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finish_time.is_some()
    }

    #[must_use]
    pub const fn is_scoring(&self) -> bool {
        self.scoring
    }

    #[must_use]
    pub const fn keep_state(&self) -> PositionKeepState {
        self.keeper.state()
    }

    #[must_use]
    pub const fn keep_strategy(&self) -> Strategy {
        self.keeper.strategy()
    }

    #[must_use]
    pub fn activations(&self) -> &[SkillActivation] {
        self.skills.activations()
    }

    pub fn mark_first_in_late_race(&mut self) {
        self.first_in_late_race = true;
    }

    #[must_use]
    pub fn snapshot(&self) -> RunnerSnapshot {
        RunnerSnapshot {
            index: self.index,
            position: self.position(),
            lane: self.lane.lane(),
            speed: self.speed,
            keep_strategy: self.keeper.strategy(),
            scoring: self.scoring,
            finished: self.is_finished(),
        }
    }

    /// Whether a lead competition could still pull this runner in.
    #[must_use]
    pub fn spot_struggle_eligible(&self, course: &CourseData) -> bool {
        self.toggles.spot_struggle
            && self.struggle.eligible(
                self.position(),
                course.section_length(),
                self.keeper.strategy(),
            )
    }

    #[must_use]
    pub const fn has_spot_struggled(&self) -> bool {
        self.struggle.span().is_some()
    }

    /// Become the pacer of a field without front runners.
    pub fn take_pace(&mut self) {
        self.keeper.set_strategy(Strategy::FrontRunner);
    }

    pub fn start_spot_struggle(&mut self, course: &CourseData) {
        self.struggle
            .start(self.position(), course.section_length());
    }

    /// Advance one tick; returns effects aimed at other runners.
    pub fn step(
        &mut self,
        env: &RaceEnv<'_>,
        view: &TickView<'_>,
        dt: f64,
    ) -> Vec<OutboundEffect> {
        let course = env.course;
        self.elapsed += dt;
        self.keeper.tick(dt);
        let special = SpecialContext {
            section: course.section_at(self.position()),
            lane: self.lane.lane(),
            horse_lane: HORSE_LANE,
            phase: self.phase,
            strategy: self.keeper.strategy(),
        };
        self.special.update(dt, &special, &mut self.rng.master);

        let mut move_dt = dt;
        if self.delay_left > 0.0 {
            self.delay_left -= dt;
            if self.delay_left > 0.0 {
                return Vec::new();
            }
            move_dt = -self.delay_left;
            self.delay_left = 0.0;
        }
        self.started = true;

        let position = self.position();
        self.update_hill(course, position);
        self.update_phase(course, position);
        if let Some(keep) = self.rushed.update(
            dt,
            position,
            self.strategy,
            self.keeper.strategy(),
            &mut self.rng.rushed,
        ) {
            self.keeper.set_strategy(keep);
        }
        self.downhill.update(
            self.toggles.downhill,
            self.slope,
            self.elapsed,
            self.stats.wit,
            position,
            &mut self.rng.downhill,
        );
        let outbound = self.run_skills(env, view, dt);
        self.keep_position(view, position);

        let duel = DuelCheck {
            enabled: self.toggles.dueling,
            keep_strategy: self.keeper.strategy(),
            hp_ratio: self.health.ratio(),
            on_final_straight: on_final_straight(course, position),
            rate: env
                .options
                .dueling_rates
                .rate_for(self.keeper.strategy()),
            position,
        };
        self.dueling.update(dt, &duel, &mut self.rng.dueling);
        self.struggle.update(dt, position, self.stats.guts);
        self.update_last_spurt(false);
        self.update_target_speed(position);
        self.apply_forces();

        let modifiers = self.skills.modifiers();
        let lane = LaneInput {
            position,
            phase: self.phase,
            power: self.stats.power,
            keep_state: self.keeper.state(),
            blocked_side: self.special.blocked_side(),
            overtake: self.special.overtake(),
            has_hp: self.health.has_remaining(),
            change_lane_skill: modifiers.change_lane_active(),
            lane_skill_bonus: modifiers.lane_movement.value(),
            late_stretch: course.is_after_final_corner_start(position)
                || on_final_straight(course, position),
        };
        self.lane.update(course, &lane, &mut self.rng.lane);

        self.integrate(course, dt, move_dt);
        outbound
    }

    /// Apply an effect another runner aimed at this one.
    pub fn receive(&mut self, effect: &OutboundEffect, tick: u32, env: &RaceEnv<'_>) {
        let ctx = self.activation_context(tick, env);
        for command in self.skills.receive(effect, &ctx) {
            self.apply_command(command);
        }
    }

    /// Close open records and hand back the final state.
    #[must_use]
    pub fn finish(mut self) -> RunnerOutcome {
        let position = self.position();
        self.keeper.close(position);
        self.skills.close(position);
        self.rushed.close(position);
        self.downhill.close(position);
        self.dueling.close(position);
        self.struggle.close(position);
        let rng_draws = self.rng.total_draws();
        RunnerOutcome {
            index: self.index,
            side: self.side,
            name: self.name,
            finish_time: self.finish_time,
            position,
            start_delay: self.start_delay,
            hp_remaining: self.health.current(),
            hp_depleted_remaining: self.hp_depleted_remaining,
            spurt: self.spurt,
            full_spurt: self.spurt.is_some_and(|plan| plan.full),
            first_in_late_race: self.first_in_late_race,
            rushed: self.rushed.span(),
            spot_struggle: self.struggle.span(),
            dueling: self.dueling.span(),
            downhill: self.downhill.spans().to_vec(),
            position_keep: self.keeper.into_activations(),
            counters: *self.skills.counters(),
            activations: self.skills.into_activations(),
            rng_draws,
        }
    }

    fn activation_context(&self, tick: u32, env: &RaceEnv<'_>) -> ActivationContext {
        ActivationContext {
            tick,
            position: self.position(),
            phase: self.phase,
            distance: env.course.distance,
            wit_checks: self.toggles.wit_checks,
            base_wit: self.statics.base.wit,
        }
    }

    fn run_skills(
        &mut self,
        env: &RaceEnv<'_>,
        view: &TickView<'_>,
        dt: f64,
    ) -> Vec<OutboundEffect> {
        for command in self.skills.expire(dt, self.position()) {
            self.apply_command(command);
        }
        let frame = self.condition_frame(env.course, view);
        let ctx = self.activation_context(view.tick, env);
        let mut streams = SkillStreams {
            wit: &mut self.rng.wit,
            gold: &mut self.rng.gold,
        };
        let effects = self.skills.evaluate(&frame, &ctx, &mut streams);
        for command in effects.commands {
            self.apply_command(command);
        }
        effects.outbound
    }

    fn apply_command(&mut self, command: EffectCommand) {
        match command {
            EffectCommand::StatUp { stat, amount } => {
                let value = match stat {
                    StatKind::Speed => &mut self.raw_stats.speed,
                    StatKind::Stamina => &mut self.raw_stats.stamina,
                    StatKind::Power => &mut self.raw_stats.power,
                    StatKind::Guts => &mut self.raw_stats.guts,
                    StatKind::Wit => &mut self.raw_stats.wit,
                };
                *value += amount;
                self.stats = self.raw_stats.map(|v| v.max(1.0));
            }
            EffectCommand::Recover(fraction) => {
                self.health.recover(fraction);
                if self.phase >= 2 && !self.last_spurt {
                    self.update_last_spurt(true);
                }
            }
            EffectCommand::MultiplyStartDelay(factor) => {
                self.start_delay *= factor;
                if !self.started {
                    self.delay_left = self.start_delay;
                }
            }
            EffectCommand::SetStartDelay(delay) => {
                self.start_delay = delay;
                if !self.started {
                    self.delay_left = self.start_delay;
                }
            }
        }
    }

    fn condition_frame(&self, course: &CourseData, view: &TickView<'_>) -> ConditionFrame {
        let position = self.position();
        let field: SmallVec<[&RunnerSnapshot; 4]> = view
            .runners
            .iter()
            .filter(|r| r.index != self.index && r.scoring)
            .collect();
        let ahead = field
            .iter()
            .filter(|r| r.position > position)
            .map(|r| r.position - position)
            .min_by(f64::total_cmp);
        let behind = field
            .iter()
            .filter(|r| r.position <= position)
            .map(|r| position - r.position)
            .min_by(f64::total_cmp);
        let order = 1 + field.iter().filter(|r| r.position > position).count();
        let slope = if self.slope > 0.0 {
            1.0
        } else if self.slope < 0.0 {
            2.0
        } else {
            0.0
        };
        ConditionFrame {
            statics: self.statics,
            position,
            phase: course.phase_at(position),
            hp_ratio: self.health.ratio(),
            order,
            field_size: field.len() + 1,
            gap_ahead: ahead,
            gap_behind: behind,
            lane_type: lane_bucket(self.lane.lane(), HORSE_LANE),
            slope,
            corner: course
                .corner_at(position)
                .map_or(0, |idx| course.corner_number(idx)),
            final_corner: course.is_after_final_corner_start(position),
            last_straight: course.is_in_last_straight(position),
            last_spurt: self.last_spurt,
            elapsed: self.elapsed,
            overtake: self.special.overtake(),
            blocked_side: self.special.blocked_side(),
            rushed: self.rushed.is_active(),
            hp_empty_once: self.hp_depleted_remaining.is_some(),
            bad_start: self.start_delay > BAD_START_DELAY,
            counters: *self.skills.counters(),
            used: self.skills.used_skills().iter().copied().collect(),
        }
    }

    fn pacer_view(&self, view: &TickView<'_>) -> Option<PacerView> {
        match view.pacer? {
            Pacer::Virtual(position) => Some(PacerView {
                position,
                is_self: false,
                lead: None,
            }),
            Pacer::Runner(index) => {
                if view.runners.len() < 2 {
                    return None;
                }
                let pacer = view.runners.iter().find(|r| r.index == index)?;
                let is_self = index == self.index;
                let lead = if is_self {
                    view.runners
                        .iter()
                        .filter(|r| r.index != index && !r.finished)
                        .map(|r| r.position)
                        .max_by(f64::total_cmp)
                        .map(|second| pacer.position - second)
                } else {
                    None
                };
                Some(PacerView {
                    position: pacer.position,
                    is_self,
                    lead,
                })
            }
        }
    }

    fn keep_position(&mut self, view: &TickView<'_>, position: f64) {
        let pacer = self.pacer_view(view);
        let input = KeepInput {
            position,
            rushed: self.rushed.is_active(),
            wit: self.stats.wit,
            speed_skills_active: self.skills.modifiers().speed_skills_active(),
        };
        self.keeper
            .update(&input, pacer.as_ref(), &mut self.rng.poskeep);
    }

    fn update_hill(&mut self, course: &CourseData, position: f64) {
        if let Some(current) = self.hill {
            if position > course.slopes[current].end() {
                self.hill = None;
                self.slope = 0.0;
            }
        }
        if self.hill.is_none() {
            if let Some(next) = course.slopes.get(self.next_hill) {
                if position >= next.start {
                    self.hill = Some(self.next_hill);
                    self.slope = next.slope;
                    self.next_hill += 1;
                }
            }
        }
    }

    fn update_phase(&mut self, course: &CourseData, position: f64) {
        if self.phase < 2 && position >= course.phase_start(self.phase + 1) {
            self.phase += 1;
        }
    }

    fn consumption_state(&self) -> ConsumptionState {
        ConsumptionState {
            phase: self.phase,
            position: self.position(),
            pace_down: self.keeper.state() == PositionKeepState::PaceDown,
            rushed: self.rushed.is_active(),
            downhill: self.downhill.is_active(),
            spot_struggle: self.struggle.is_active(),
            runaway: self.strategy == Strategy::Runaway,
        }
    }

    fn update_last_spurt(&mut self, replan: bool) {
        if self.last_spurt || self.phase < 2 {
            return;
        }
        if self.spurt.is_none() || replan {
            let state = self.consumption_state();
            let plan = self.health.last_spurt_plan(
                &state,
                self.profile.last_spurt_speed,
                self.profile.base_target_speed[2],
            );
            log::trace!("runner {} plans spurt {plan:?}", self.index);
            self.spurt = Some(plan);
        }
        let position = self.position();
        if let Some(plan) = self.spurt {
            if plan.transition.is_none_or(|start| position >= start) {
                self.last_spurt = true;
            }
        }
    }

    fn update_target_speed(&mut self, position: f64) {
        let modifiers = self.skills.modifiers();
        let mut target = if !self.health.has_remaining() {
            self.profile.min_speed
        } else if self.last_spurt {
            self.spurt
                .map_or(self.profile.last_spurt_speed, |plan| plan.speed)
        } else {
            let section = crate::numbers::floor_f64_to_usize(
                position / (self.statics.course_distance / usize_to_f64(SECTION_COUNT)),
            )
            .min(SECTION_COUNT);
            self.profile.base_target_speed[self.phase] * self.keeper.speed_coefficient()
                + self.section_modifiers[section]
        };
        target += modifiers.target_speed.value();

        if self.downhill.is_active() {
            target += 0.3 + self.slope.abs() / 100_000.0;
        } else if self.hill.is_some() && self.slope > 0.0 {
            target -= self.slope / 10_000.0 * 200.0 / self.stats.power;
            target = target.max(self.profile.min_speed);
        }
        if self.dueling.is_active() {
            target += (200.0 * self.stats.guts).powf(0.708) * 0.0001;
        }
        if self.struggle.is_active() {
            target += (500.0 * self.stats.guts).powf(0.6) * 0.0001;
        }
        if self.lane.change_speed() > 0.0 && modifiers.lane_movement_active() {
            target += (0.0002 * self.stats.power).sqrt();
        }
        self.target_speed = target;
    }

    fn apply_forces(&mut self) {
        self.accel = if !self.health.has_remaining() {
            NO_HP_DECELERATION
        } else if self.speed > self.target_speed {
            if self.keeper.state() == PositionKeepState::PaceDown {
                PACE_DOWN_DECELERATION
            } else {
                PHASE_DECELERATION[self.phase]
            }
        } else {
            let uphill = if self.slope > 0.0 { 3 } else { 0 };
            let mut accel = self.profile.accel[uphill + self.phase]
                + self.skills.modifiers().accel.value()
                + self.dash_accel;
            if self.dueling.is_active() {
                accel += (160.0 * self.stats.guts).powf(0.59) * 0.0001;
            }
            accel
        };
    }

    fn integrate(&mut self, course: &CourseData, dt: f64, move_dt: f64) {
        let target = self.target_speed;
        let raw = self.speed + self.accel * dt;
        let mut speed = if self.speed <= target {
            raw.min(target)
        } else {
            raw.max(target)
        };
        if self.start_dash {
            speed = speed.min(self.profile.start_dash_limit());
        }
        speed += self.skills.modifiers().one_frame_accel;
        if !self.start_dash && speed < self.profile.min_speed {
            speed = self.profile.min_speed;
        }
        self.speed = speed;

        let displacement = speed + self.skills.modifiers().current_speed.value();
        let before = self.position();
        self.distance_run.add(displacement * move_dt);

        let state = self.consumption_state();
        self.health.tick(&state, speed, dt);
        let position = self.position();
        if !self.health.has_remaining() && self.hp_depleted_remaining.is_none() {
            self.hp_depleted_remaining = Some(course.distance - position);
            log::trace!("runner {} out of stamina at {position:.1}", self.index);
        }
        if self.start_dash && speed >= self.profile.start_dash_limit() {
            self.start_dash = false;
            self.dash_accel = 0.0;
        }
        self.skills.clear_one_frame_accel();

        if position >= course.distance && self.finish_time.is_none() {
            let overshoot = if displacement > 0.0 {
                ((position - course.distance) / displacement).min(move_dt)
            } else {
                0.0
            };
            self.finish_time = Some(self.elapsed - overshoot);
            log::trace!(
                "runner {} finished in {:.3}s from {before:.1}",
                self.index,
                self.elapsed - overshoot
            );
        }
    }
}

/// On the last straight, between its start and end.
fn on_final_straight(course: &CourseData, position: f64) -> bool {
    course
        .straights
        .last()
        .is_some_and(|s| position >= s.start && position <= s.end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RunnerConfig;

    const DT: f64 = 1.0 / 15.0;

    fn runner_config(strategy: Strategy) -> RunnerConfig {
        RunnerConfig {
            name: "test".to_string(),
            strategy,
            aptitudes: Aptitudes::default(),
            mood: 0,
            stats: StatLine {
                speed: 1200.0,
                stamina: 1000.0,
                power: 900.0,
                guts: 500.0,
                wit: 700.0,
            },
            skills: Vec::new(),
        }
    }

    struct Fixture {
        course: CourseData,
        params: RaceParameters,
        options: SimulationOptions,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                course: CourseData::load_from_static().expect("course"),
                params: RaceParameters::default(),
                options: SimulationOptions::default(),
            }
        }

        fn env(&self) -> RaceEnv<'_> {
            RaceEnv {
                course: &self.course,
                params: &self.params,
                options: &self.options,
            }
        }
    }

    fn solo(fixture: &Fixture, config: &RunnerConfig, seed: u64) -> Runner {
        let env = fixture.env();
        let seat = RunnerSeat {
            index: 0,
            side: Side::A,
            config,
            skills: &[],
            gate: 2,
            seed,
        };
        let mut runner = Runner::new(&seat, &env);
        let snapshot = [runner.snapshot()];
        let view = TickView {
            tick: 0,
            runners: &snapshot,
            pacer: None,
        };
        runner.prepare(&env, &view);
        runner
    }

    fn run_to_finish(fixture: &Fixture, runner: &mut Runner) -> Vec<f64> {
        let env = fixture.env();
        let mut positions = Vec::new();
        let mut tick = 0;
        while !runner.is_finished() && tick < 15 * 600 {
            tick += 1;
            let snapshot = [runner.snapshot()];
            let view = TickView {
                tick,
                runners: &snapshot,
                pacer: None,
            };
            runner.step(&env, &view, DT);
            positions.push(runner.position());
        }
        positions
    }

    #[test]
    fn solo_runner_finishes_with_monotonic_position() {
        let fixture = Fixture::new();
        let config = runner_config(Strategy::PaceChaser);
        let mut runner = solo(&fixture, &config, 42);
        let positions = run_to_finish(&fixture, &mut runner);
        assert!(runner.is_finished());
        assert!(positions.windows(2).all(|w| w[1] >= w[0]));
        assert!(runner.hp() >= 0.0);
        let outcome = runner.finish();
        let time = outcome.finish_time.expect("finished");
        assert!(time > 100.0 && time < 200.0, "finish time {time}");
        assert!(outcome.position >= fixture.course.distance);
    }

    #[test]
    fn start_delay_holds_the_runner_at_the_gate() {
        let fixture = Fixture::new();
        let config = runner_config(Strategy::LateSurger);
        let mut runner = solo(&fixture, &config, 7);
        let delay = runner.start_delay;
        assert!((0.0..0.1).contains(&delay));
        let env = fixture.env();
        for tick in 1..=2 {
            let snapshot = [runner.snapshot()];
            let view = TickView {
                tick,
                runners: &snapshot,
                pacer: None,
            };
            runner.step(&env, &view, DT);
            if runner.elapsed() < delay {
                assert!(runner.position().abs() < f64::EPSILON);
            }
        }
        assert!(runner.position() > 0.0);
        assert!(runner.position() < 2.0 * DT * runner.profile.start_dash_limit());
    }

    #[test]
    fn same_seed_same_race() {
        let fixture = Fixture::new();
        let config = runner_config(Strategy::EndCloser);
        let mut a = solo(&fixture, &config, 99);
        let mut b = solo(&fixture, &config, 99);
        let pa = run_to_finish(&fixture, &mut a);
        let pb = run_to_finish(&fixture, &mut b);
        assert_eq!(pa, pb);
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn noop_health_never_runs_dry() {
        let mut fixture = Fixture::new();
        fixture.options.health_system = HealthSystem::Noop;
        let mut config = runner_config(Strategy::FrontRunner);
        config.stats.stamina = 1.0;
        let mut runner = solo(&fixture, &config, 3);
        run_to_finish(&fixture, &mut runner);
        let outcome = runner.finish();
        assert_eq!(outcome.hp_depleted_remaining, None);
        assert!(outcome.full_spurt);
    }

    #[test]
    fn exhausted_runner_still_reaches_the_line() {
        let fixture = Fixture::new();
        let mut config = runner_config(Strategy::FrontRunner);
        config.stats.stamina = 50.0;
        let mut runner = solo(&fixture, &config, 3);
        run_to_finish(&fixture, &mut runner);
        assert!(runner.is_finished());
        let outcome = runner.finish();
        assert!(outcome.hp_depleted_remaining.is_some());
        assert!(outcome.hp_remaining.abs() < f64::EPSILON);
    }

    #[test]
    fn condition_frame_reports_missing_neighbours_as_none() {
        let fixture = Fixture::new();
        let config = runner_config(Strategy::PaceChaser);
        let runner = solo(&fixture, &config, 1);
        let snapshot = [runner.snapshot()];
        let view = TickView {
            tick: 0,
            runners: &snapshot,
            pacer: None,
        };
        let frame = runner.condition_frame(&fixture.course, &view);
        assert_eq!(frame.value(ConditionVar::BashinDiffInfront), None);
        assert_eq!(frame.value(ConditionVar::Order), Some(1.0));
        assert_eq!(frame.value(ConditionVar::Phase), Some(0.0));
        assert_eq!(frame.value(ConditionVar::RunningStyle), Some(2.0));
    }

    #[test]
    fn condition_phase_reaches_the_final_leg() {
        let fixture = Fixture::new();
        let config = runner_config(Strategy::PaceChaser);
        let mut runner = solo(&fixture, &config, 5);
        let env = fixture.env();
        let final_leg = fixture.course.phase_start(3);
        let mut tick = 0;
        while runner.position() < final_leg && tick < 15 * 600 {
            tick += 1;
            let snapshot = [runner.snapshot()];
            let view = TickView {
                tick,
                runners: &snapshot,
                pacer: None,
            };
            runner.step(&env, &view, DT);
        }
        assert!(runner.position() >= final_leg);
        assert_eq!(runner.phase(), 2);
        let snapshot = [runner.snapshot()];
        let view = TickView {
            tick,
            runners: &snapshot,
            pacer: None,
        };
        let frame = runner.condition_frame(&fixture.course, &view);
        assert_eq!(frame.value(ConditionVar::Phase), Some(3.0));
    }

    #[test]
    fn floored_stat_debuff_reverses_exactly() {
        let fixture = Fixture::new();
        let config = runner_config(Strategy::PaceChaser);
        let mut runner = solo(&fixture, &config, 8);
        let before = runner.stats.power;
        runner.apply_command(EffectCommand::StatUp {
            stat: StatKind::Power,
            amount: -2000.0,
        });
        assert!((runner.stats.power - 1.0).abs() < f64::EPSILON);
        runner.apply_command(EffectCommand::StatUp {
            stat: StatKind::Power,
            amount: 2000.0,
        });
        assert!((runner.stats.power - before).abs() < 1e-9);
    }
}

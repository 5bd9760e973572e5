//! Position keeping: the pacing state machine, the approximate lane
//! conditions it reacts to and the analytical pacer used in virtual mode.
use serde::{Deserialize, Serialize};

use crate::course::CourseData;
use crate::numbers::Timer;
use crate::rng::{Prng, Stream};
use crate::strategy::Strategy;

/// Position keeping stops after this many sections.
const POSITION_KEEP_SECTIONS: f64 = 10.0;
const RECHECK_AFTER_IDLE: f64 = 2.0;
const RECHECK_AFTER_EXIT: f64 = 3.0;

const START_DASH_SPEED: f64 = 3.0;
const START_DASH_ACCEL: f64 = 24.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionKeepState {
    #[default]
    None,
    SpeedUp,
    Overtake,
    PaceUp,
    PaceDown,
}

impl PositionKeepState {
    /// Multiplier on the phase target speed.
    #[must_use]
    pub const fn speed_coefficient(self) -> f64 {
        match self {
            Self::None => 1.0,
            Self::SpeedUp | Self::PaceUp => 1.04,
            Self::Overtake => 1.05,
            Self::PaceDown => 0.915,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionKeepActivation {
    pub start: f64,
    pub end: f64,
    pub state: PositionKeepState,
}

/// The pacer as one runner sees it this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacerView {
    pub position: f64,
    pub is_self: bool,
    /// Gap from the leader back to second place.
    pub lead: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeepInput {
    pub position: f64,
    pub rushed: bool,
    pub wit: f64,
    pub speed_skills_active: bool,
}

#[must_use]
pub fn course_factor(distance: f64) -> f64 {
    0.0008 * (distance - 1000.0) + 1.0
}

/// Per-runner pacing state machine.
#[derive(Debug, Clone)]
pub struct PositionKeeper {
    strategy: Strategy,
    state: PositionKeepState,
    next_check: Timer,
    exit_distance: f64,
    exit_position: f64,
    min_threshold: f64,
    max_threshold: f64,
    end: f64,
    section_length: f64,
    enabled: bool,
    activations: Vec<PositionKeepActivation>,
}

impl PositionKeeper {
    #[must_use]
    pub fn new(strategy: Strategy, course: &CourseData, enabled: bool) -> Self {
        let factor = course_factor(course.distance);
        let min_factor = if strategy == Strategy::PaceChaser {
            1.0
        } else {
            factor
        };
        Self {
            strategy,
            state: PositionKeepState::None,
            next_check: Timer::default(),
            exit_distance: 0.0,
            exit_position: 0.0,
            min_threshold: strategy.position_keep_min() * min_factor,
            max_threshold: strategy.position_keep_max() * factor,
            end: course.section_length() * POSITION_KEEP_SECTIONS,
            section_length: course.section_length(),
            enabled,
            activations: Vec::new(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> PositionKeepState {
        self.state
    }

    /// Strategy the runner keeps position as; differs from its own when rushed.
    #[must_use]
    pub const fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn set_strategy(&mut self, strategy: Strategy) {
        self.strategy = strategy;
    }

    #[must_use]
    pub const fn speed_coefficient(&self) -> f64 {
        self.state.speed_coefficient()
    }

    #[must_use]
    pub fn activations(&self) -> &[PositionKeepActivation] {
        &self.activations
    }

    #[must_use]
    pub fn into_activations(self) -> Vec<PositionKeepActivation> {
        self.activations
    }

    pub fn tick(&mut self, dt: f64) {
        self.next_check.tick(dt);
    }

    /// Advance the state machine against the current pacer.
    pub fn update(&mut self, input: &KeepInput, pacer: Option<&PacerView>, rng: &mut Stream) {
        if !self.enabled || input.position >= self.end {
            self.exit(input.position, None);
            return;
        }
        let Some(pacer) = pacer else {
            return;
        };
        let behind = pacer.position - input.position;
        let runaway = self.strategy == Strategy::Runaway;

        match self.state {
            PositionKeepState::None => {
                if !self.next_check.is_expired() {
                    return;
                }
                if self.strategy.is_front() {
                    if pacer.is_self {
                        let Some(lead) = pacer.lead else {
                            return;
                        };
                        let threshold = if runaway { 17.5 } else { 4.5 };
                        if lead < threshold && Self::speed_up_check(input, rng) {
                            self.enter(PositionKeepState::SpeedUp, input.position);
                            let sections = if runaway { 3.0 } else { 1.0 };
                            self.exit_position =
                                input.position + self.section_length.floor() * sections;
                        }
                    } else if Self::speed_up_check(input, rng) {
                        self.enter(PositionKeepState::Overtake, input.position);
                        self.exit_position = input.position + self.section_length.floor();
                    }
                } else if behind > self.max_threshold {
                    if Self::pace_up_check(input, rng) {
                        self.enter(PositionKeepState::PaceUp, input.position);
                        self.exit_distance = self.roll_exit_distance(rng);
                        self.exit_position = input.position + self.section_length.floor();
                    }
                } else if behind < self.min_threshold && !input.speed_skills_active {
                    self.enter(PositionKeepState::PaceDown, input.position);
                    self.exit_distance = self.roll_exit_distance(rng);
                    self.exit_position = input.position + self.section_length.floor();
                }
                if self.state == PositionKeepState::None {
                    self.next_check = Timer::countdown(RECHECK_AFTER_IDLE);
                }
            }
            state => {
                let done = input.position >= self.exit_position
                    || match state {
                        PositionKeepState::SpeedUp => pacer.is_self
                            && pacer
                                .lead
                                .is_some_and(|lead| lead >= if runaway { 17.5 } else { 4.5 }),
                        PositionKeepState::Overtake => pacer.is_self
                            && pacer
                                .lead
                                .is_some_and(|lead| lead >= if runaway { 27.5 } else { 10.0 }),
                        PositionKeepState::PaceUp => behind < self.exit_distance,
                        PositionKeepState::PaceDown => {
                            behind > self.exit_distance || input.speed_skills_active
                        }
                        PositionKeepState::None => false,
                    };
                if done {
                    self.exit(input.position, Some(RECHECK_AFTER_EXIT));
                }
            }
        }
    }

    /// Close an open activation at the finish.
    pub fn close(&mut self, position: f64) {
        self.exit(position, None);
    }

    fn enter(&mut self, state: PositionKeepState, position: f64) {
        log::trace!("position keep {state:?} at {position:.1}");
        self.state = state;
        self.activations.push(PositionKeepActivation {
            start: position,
            end: position,
            state,
        });
    }

    fn exit(&mut self, position: f64, recheck: Option<f64>) {
        if self.state != PositionKeepState::None {
            if let Some(last) = self.activations.last_mut() {
                last.end = position;
            }
            self.state = PositionKeepState::None;
        }
        if let Some(delay) = recheck {
            self.next_check = Timer::countdown(delay);
        }
    }

    fn roll_exit_distance(&self, rng: &mut Stream) -> f64 {
        rng.random() * (self.max_threshold - self.min_threshold) + self.min_threshold
    }

    fn speed_up_check(input: &KeepInput, rng: &mut Stream) -> bool {
        input.rushed || rng.random() < 0.2 * (0.1 * input.wit).log10()
    }

    fn pace_up_check(input: &KeepInput, rng: &mut Stream) -> bool {
        input.rushed || rng.random() < 0.15 * (0.1 * input.wit).log10()
    }
}

#[derive(Debug, Clone, Copy)]
struct StartContinue {
    start: f64,
    keep: f64,
}

impl StartContinue {
    const fn new(start: f64, keep: f64) -> Self {
        Self { start, keep }
    }

    fn roll(self, current: bool, rng: &mut Stream) -> bool {
        let chance = if current { self.keep } else { self.start };
        rng.random() < chance
    }
}

/// Inputs for the once-per-second special condition rolls.
#[derive(Debug, Clone, Copy)]
pub struct SpecialContext {
    pub section: usize,
    pub lane: f64,
    pub horse_lane: f64,
    pub phase: usize,
    pub strategy: Strategy,
}

/// Approximate `blocked_side` / `overtake` state rolled once per second.
#[derive(Debug, Clone)]
pub struct SpecialConditions {
    blocked_side: bool,
    overtake: bool,
    timer: Timer,
}

impl Default for SpecialConditions {
    fn default() -> Self {
        Self {
            blocked_side: true,
            overtake: false,
            timer: Timer::countdown(1.0),
        }
    }
}

impl SpecialConditions {
    #[must_use]
    pub const fn blocked_side(&self) -> bool {
        self.blocked_side
    }

    #[must_use]
    pub const fn overtake(&self) -> bool {
        self.overtake
    }

    pub fn update(&mut self, dt: f64, ctx: &SpecialContext, rng: &mut Stream) {
        self.timer.tick(dt);
        if !self.timer.is_expired() {
            return;
        }
        self.timer = Timer::countdown(1.0);

        let outer = (1..=3).contains(&ctx.section) && ctx.lane > 3.0 * ctx.horse_lane;
        let blocked = if outer {
            StartContinue::new(0.0, 0.0)
        } else {
            match ctx.phase {
                0 => StartContinue::new(0.1, 0.85),
                1 => StartContinue::new(0.08, 0.75),
                _ => StartContinue::new(0.07, 0.5),
            }
        };
        self.blocked_side = blocked.roll(self.blocked_side, rng);

        let overtake = match ctx.strategy {
            Strategy::FrontRunner => StartContinue::new(0.05, 0.5),
            Strategy::PaceChaser => StartContinue::new(0.15, 0.55),
            _ => StartContinue::new(0.2, 0.6),
        };
        self.overtake = overtake.roll(self.overtake, rng);
    }
}

/// Position of an idealised front runner after `elapsed` seconds.
#[must_use]
pub fn analytical_pacer_position(distance: f64, base_speed: f64, elapsed: f64) -> f64 {
    if distance <= 0.0 || base_speed <= 0.0 || elapsed <= 0.0 {
        return 0.0;
    }
    let accel = START_DASH_ACCEL * Strategy::FrontRunner.accel_phase_coefficient(0);
    let dash_top = 0.85 * base_speed;
    let dash_time = ((dash_top - START_DASH_SPEED) / accel).max(0.0);
    if elapsed <= dash_time {
        return START_DASH_SPEED * elapsed + 0.5 * accel * elapsed * elapsed;
    }

    let mut position = START_DASH_SPEED * dash_time + 0.5 * accel * dash_time * dash_time;
    let mut remaining = elapsed - dash_time;
    let boundaries = [distance / 6.0, distance * 2.0 / 3.0, f64::INFINITY];
    for (phase, boundary) in boundaries.into_iter().enumerate() {
        if position >= boundary {
            continue;
        }
        let speed = base_speed * Strategy::FrontRunner.speed_phase_coefficient(phase);
        let to_boundary = (boundary - position) / speed;
        if !to_boundary.is_finite() || remaining < to_boundary {
            return position + speed * remaining;
        }
        position = boundary;
        remaining -= to_boundary;
    }
    position
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::CountingRng;

    fn course() -> CourseData {
        CourseData::load_from_static().expect("course")
    }

    fn input(position: f64) -> KeepInput {
        KeepInput {
            position,
            rushed: true,
            wit: 800.0,
            speed_skills_active: false,
        }
    }

    fn chaser(position: f64) -> PacerView {
        PacerView {
            position,
            is_self: false,
            lead: Some(1.0),
        }
    }

    #[test]
    fn thresholds_scale_with_distance_except_pace_chaser_minimum() {
        let c = course();
        let factor = course_factor(2400.0);
        let pc = PositionKeeper::new(Strategy::PaceChaser, &c, true);
        assert!((pc.min_threshold - 3.0).abs() < 1e-12);
        assert!((pc.max_threshold - 5.0 * factor).abs() < 1e-12);
        let ls = PositionKeeper::new(Strategy::LateSurger, &c, true);
        assert!((ls.min_threshold - 6.5 * factor).abs() < 1e-12);
    }

    #[test]
    fn falling_behind_triggers_pace_up_until_caught_up() {
        let mut keeper = PositionKeeper::new(Strategy::LateSurger, &course(), true);
        let mut rng = CountingRng::new(3);
        keeper.update(&input(100.0), Some(&chaser(200.0)), &mut rng);
        assert_eq!(keeper.state(), PositionKeepState::PaceUp);
        assert!((keeper.speed_coefficient() - 1.04).abs() < 1e-12);
        keeper.update(&input(150.0), Some(&chaser(151.0)), &mut rng);
        assert_eq!(keeper.state(), PositionKeepState::None);
        assert_eq!(keeper.activations().len(), 1);
        assert!((keeper.activations()[0].end - 150.0).abs() < 1e-12);
    }

    #[test]
    fn crowding_the_pacer_triggers_pace_down_unless_boosted() {
        let c = course();
        let mut rng = CountingRng::new(3);
        let mut keeper = PositionKeeper::new(Strategy::EndCloser, &c, true);
        let boosted = KeepInput {
            speed_skills_active: true,
            ..input(100.0)
        };
        keeper.update(&boosted, Some(&chaser(101.0)), &mut rng);
        assert_eq!(keeper.state(), PositionKeepState::None);

        let mut keeper = PositionKeeper::new(Strategy::EndCloser, &c, true);
        keeper.update(&input(100.0), Some(&chaser(101.0)), &mut rng);
        assert_eq!(keeper.state(), PositionKeepState::PaceDown);
        assert!((keeper.speed_coefficient() - 0.915).abs() < 1e-12);
    }

    #[test]
    fn idle_check_waits_two_seconds() {
        let mut keeper = PositionKeeper::new(Strategy::LateSurger, &course(), true);
        let mut rng = CountingRng::new(3);
        let comfortable = 6.5 * course_factor(2400.0) + 0.1;
        keeper.update(&input(100.0), Some(&chaser(100.0 + comfortable)), &mut rng);
        assert_eq!(keeper.state(), PositionKeepState::None);
        keeper.update(&input(100.0), Some(&chaser(400.0)), &mut rng);
        assert_eq!(keeper.state(), PositionKeepState::None);
        for _ in 0..31 {
            keeper.tick(1.0 / 15.0);
        }
        keeper.update(&input(100.0), Some(&chaser(400.0)), &mut rng);
        assert_eq!(keeper.state(), PositionKeepState::PaceUp);
    }

    #[test]
    fn leader_speeds_up_when_pressed_and_exits_after_a_section() {
        let c = course();
        let mut keeper = PositionKeeper::new(Strategy::FrontRunner, &c, true);
        let mut rng = CountingRng::new(9);
        let leader = PacerView {
            position: 300.0,
            is_self: true,
            lead: Some(2.0),
        };
        keeper.update(&input(300.0), Some(&leader), &mut rng);
        assert_eq!(keeper.state(), PositionKeepState::SpeedUp);
        let later = 300.0 + c.section_length().floor();
        keeper.update(&input(later), Some(&PacerView { position: later, ..leader }), &mut rng);
        assert_eq!(keeper.state(), PositionKeepState::None);
    }

    #[test]
    fn disabled_or_past_end_stays_idle() {
        let c = course();
        let mut rng = CountingRng::new(1);
        let mut keeper = PositionKeeper::new(Strategy::LateSurger, &c, false);
        keeper.update(&input(100.0), Some(&chaser(300.0)), &mut rng);
        assert_eq!(keeper.state(), PositionKeepState::None);

        let mut keeper = PositionKeeper::new(Strategy::LateSurger, &c, true);
        let past = c.section_length() * 10.0 + 1.0;
        keeper.update(&input(past), Some(&chaser(past + 200.0)), &mut rng);
        assert_eq!(keeper.state(), PositionKeepState::None);
    }

    #[test]
    fn special_conditions_roll_once_per_second() {
        let mut special = SpecialConditions::default();
        let mut rng = CountingRng::new(4);
        let ctx = SpecialContext {
            section: 5,
            lane: 0.5,
            horse_lane: crate::course::HORSE_LANE,
            phase: 1,
            strategy: Strategy::LateSurger,
        };
        for _ in 0..14 {
            special.update(1.0 / 15.0, &ctx, &mut rng);
        }
        assert_eq!(rng.draws(), 0);
        assert!(special.blocked_side());
        special.update(1.0 / 15.0, &ctx, &mut rng);
        special.update(1.0 / 15.0, &ctx, &mut rng);
        assert_eq!(rng.draws(), 2);
    }

    #[test]
    fn outer_lane_early_is_never_blocked() {
        let mut special = SpecialConditions::default();
        let mut rng = CountingRng::new(4);
        let ctx = SpecialContext {
            section: 2,
            lane: 4.0 * crate::course::HORSE_LANE,
            horse_lane: crate::course::HORSE_LANE,
            phase: 0,
            strategy: Strategy::FrontRunner,
        };
        special.update(1.0, &ctx, &mut rng);
        assert!(!special.blocked_side());
    }

    #[test]
    fn analytical_pacer_is_monotonic_and_settles_at_phase_speed() {
        let base = 19.6;
        let mut previous = 0.0;
        for step in 0..600 {
            let p = analytical_pacer_position(2400.0, base, f64::from(step) / 15.0);
            assert!(p >= previous);
            previous = p;
        }
        assert!(analytical_pacer_position(2400.0, base, 0.0).abs() < f64::EPSILON);
        let a = analytical_pacer_position(2400.0, base, 10.0);
        let b = analytical_pacer_position(2400.0, base, 11.0);
        assert!((b - a - base).abs() < 1e-9);
    }
}

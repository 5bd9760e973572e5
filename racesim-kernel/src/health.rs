//! Stamina models and last-spurt planning.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::course::{CourseData, ground_hp_modifier};
use crate::params::GroundCondition;
use crate::rng::{Prng, Stream};
use crate::strategy::Strategy;

/// Remaining-stamina ratio below which a runner counts as fatigued.
pub const FATIGUE_RATIO: f64 = 0.15;

/// Distance before the line the last spurt plan leaves in reserve.
const SPURT_RESERVE: f64 = 60.0;
const SPURT_STEP: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Nominal,
    Fatigued,
    Depleted,
}

/// The slice of runner state stamina consumption depends on.
#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(clippy::struct_excessive_bools)]
pub struct ConsumptionState {
    pub phase: usize,
    pub position: f64,
    pub pace_down: bool,
    pub rushed: bool,
    pub downhill: bool,
    pub spot_struggle: bool,
    pub runaway: bool,
}

/// Where the last spurt starts and how fast it runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpurtPlan {
    /// `None` spurts from the start of the late race.
    pub transition: Option<f64>,
    pub speed: f64,
    pub full: bool,
}

/// Swappable stamina model driven by the runner update.
pub trait HealthPolicy: fmt::Debug + Send {
    /// Reset for a runner with the given adjusted stamina, guts and wit.
    fn init(&mut self, strategy: Strategy, stamina: f64, guts: f64, wit: f64);

    /// Drain stamina for `dt` seconds at `speed`.
    fn tick(&mut self, state: &ConsumptionState, speed: f64, dt: f64) -> HealthStatus;

    /// Restore (or drain, when negative) a fraction of maximum stamina.
    fn recover(&mut self, fraction: f64);

    fn current(&self) -> f64;

    fn maximum(&self) -> f64;

    fn has_remaining(&self) -> bool {
        self.current() > 0.0
    }

    fn ratio(&self) -> f64 {
        let max = self.maximum();
        if max > 0.0 {
            (self.current() / max).max(0.0)
        } else {
            0.0
        }
    }

    fn status(&self) -> HealthStatus {
        if !self.has_remaining() {
            HealthStatus::Depleted
        } else if self.ratio() < FATIGUE_RATIO {
            HealthStatus::Fatigued
        } else {
            HealthStatus::Nominal
        }
    }

    /// Decide the last spurt from the current stamina.
    fn last_spurt_plan(
        &mut self,
        state: &ConsumptionState,
        max_speed: f64,
        late_target_speed: f64,
    ) -> SpurtPlan;
}

/// Stamina model matching the in-game consumption formula.
#[derive(Debug, Clone)]
pub struct GameHealthPolicy {
    distance: f64,
    late_race_start: f64,
    base_speed: f64,
    ground_modifier: f64,
    max_hp: f64,
    hp: f64,
    guts_modifier: f64,
    subpar_accept: u32,
    rng: Stream,
}

impl GameHealthPolicy {
    #[must_use]
    pub fn new(course: &CourseData, ground: GroundCondition, rng: Stream) -> Self {
        Self {
            distance: course.distance,
            late_race_start: course.phase_start(2),
            base_speed: course.base_speed(),
            ground_modifier: ground_hp_modifier(course.surface, ground),
            max_hp: 1.0,
            hp: 1.0,
            guts_modifier: 1.0,
            subpar_accept: 0,
            rng,
        }
    }

    fn status_modifier(state: &ConsumptionState) -> f64 {
        let mut modifier = 1.0;
        if state.downhill {
            modifier *= 0.4;
        }
        if state.spot_struggle {
            modifier *= match (state.rushed, state.runaway) {
                (true, true) => 7.7,
                (true, false) => 3.6,
                (false, true) => 3.5,
                (false, false) => 1.4,
            };
        } else if state.rushed {
            modifier *= 1.6;
        }
        if state.pace_down {
            modifier *= 0.6;
        }
        modifier
    }

    /// HP consumed per second at `speed`.
    #[must_use]
    pub fn hp_per_second(&self, state: &ConsumptionState, speed: f64) -> f64 {
        let guts = if state.phase >= 2 {
            self.guts_modifier
        } else {
            1.0
        };
        20.0 * (speed - self.base_speed + 12.0).powi(2) / 144.0
            * Self::status_modifier(state)
            * self.ground_modifier
            * guts
    }
}

impl HealthPolicy for GameHealthPolicy {
    fn init(&mut self, strategy: Strategy, stamina: f64, guts: f64, wit: f64) {
        self.max_hp = 0.8 * strategy.hp_coefficient() * stamina + self.distance;
        self.hp = self.max_hp;
        self.guts_modifier = 1.0 + 200.0 / (600.0 * guts).sqrt();
        let accept = ((15.0 + 0.05 * wit) * 1000.0).round().max(0.0);
        self.subpar_accept = num_traits::cast::cast(accept).unwrap_or(u32::MAX);
    }

    fn tick(&mut self, state: &ConsumptionState, speed: f64, dt: f64) -> HealthStatus {
        self.hp = (self.hp - self.hp_per_second(state, speed) * dt).max(0.0);
        self.status()
    }

    fn recover(&mut self, fraction: f64) {
        self.hp = (self.hp + self.max_hp * fraction).clamp(0.0, self.max_hp);
    }

    fn current(&self) -> f64 {
        self.hp
    }

    fn maximum(&self) -> f64 {
        self.max_hp
    }

    fn last_spurt_plan(
        &mut self,
        state: &ConsumptionState,
        max_speed: f64,
        late_target_speed: f64,
    ) -> SpurtPlan {
        let last_leg = ConsumptionState {
            phase: 2,
            pace_down: false,
            spot_struggle: false,
            ..*state
        };
        let full_duration = (self.distance - self.late_race_start - SPURT_RESERVE) / max_speed;
        if self.hp >= self.hp_per_second(&last_leg, max_speed) * full_duration {
            return SpurtPlan {
                transition: None,
                speed: max_speed,
                full: true,
            };
        }

        let remain = self.distance - SPURT_RESERVE - state.position;
        let cruise_cost = self.hp_per_second(&last_leg, late_target_speed);
        let mut candidates = Vec::new();
        let mut speed = max_speed - SPURT_STEP;
        while speed >= late_target_speed {
            let spurt_time = (remain / speed).min(
                ((late_target_speed * self.hp - cruise_cost * remain)
                    / (late_target_speed * self.hp_per_second(&last_leg, speed)
                        - cruise_cost * speed))
                    .max(0.0),
            );
            candidates.push((self.distance - spurt_time * speed - SPURT_RESERVE, speed));
            speed -= SPURT_STEP;
        }
        let finish_time = |&(start, speed): &(f64, f64)| {
            (start - state.position) / late_target_speed + (self.distance - start) / speed
        };
        candidates.sort_by(|a, b| finish_time(a).total_cmp(&finish_time(b)));

        let chosen = candidates
            .iter()
            .find(|_| self.rng.uniform(100_000) <= self.subpar_accept)
            .or_else(|| candidates.last())
            .copied();
        match chosen {
            Some((start, speed)) => SpurtPlan {
                transition: Some(start),
                speed,
                full: false,
            },
            None => SpurtPlan {
                transition: Some(self.distance),
                speed: late_target_speed,
                full: false,
            },
        }
    }
}

/// Unlimited stamina.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHealthPolicy;

impl HealthPolicy for NoopHealthPolicy {
    fn init(&mut self, _strategy: Strategy, _stamina: f64, _guts: f64, _wit: f64) {}

    fn tick(&mut self, _state: &ConsumptionState, _speed: f64, _dt: f64) -> HealthStatus {
        HealthStatus::Nominal
    }

    fn recover(&mut self, _fraction: f64) {}

    fn current(&self) -> f64 {
        1.0
    }

    fn maximum(&self) -> f64 {
        1.0
    }

    fn last_spurt_plan(
        &mut self,
        _state: &ConsumptionState,
        max_speed: f64,
        _late_target_speed: f64,
    ) -> SpurtPlan {
        SpurtPlan {
            transition: None,
            speed: max_speed,
            full: true,
        }
    }
}

//! Runner configuration and the stat-derived speed profile.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::course::{CourseData, ground_power_modifier, ground_speed_modifier};
use crate::params::RaceParameters;
use crate::strategy::{Aptitude, Strategy};

const STAT_MIN: f64 = 1.0;
const STAT_MAX: f64 = 2000.0;
const STAT_OVERCAP: f64 = 1200.0;

const BASE_ACCEL: f64 = 0.0006;
const UPHILL_BASE_ACCEL: f64 = 0.0004;

/// Five-stat line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatLine {
    pub speed: f64,
    pub stamina: f64,
    pub power: f64,
    pub guts: f64,
    pub wit: f64,
}

impl StatLine {
    pub(crate) fn map(self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            speed: f(self.speed),
            stamina: f(self.stamina),
            power: f(self.power),
            guts: f(self.guts),
            wit: f(self.wit),
        }
    }

    fn fields(&self) -> [(&'static str, f64); 5] {
        [
            ("stats.speed", self.speed),
            ("stats.stamina", self.stamina),
            ("stats.power", self.power),
            ("stats.guts", self.guts),
            ("stats.wit", self.wit),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Aptitudes {
    #[serde(default)]
    pub distance: Aptitude,
    #[serde(default)]
    pub surface: Aptitude,
    #[serde(default)]
    pub strategy: Aptitude,
}

/// One competitor as the user configured it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default)]
    pub name: String,
    pub strategy: Strategy,
    #[serde(default)]
    pub aptitudes: Aptitudes,
    #[serde(default)]
    pub mood: i8,
    pub stats: StatLine,
    #[serde(default)]
    pub skills: Vec<String>,
}

impl RunnerConfig {
    /// Validate stat and mood bounds.
    ///
    /// # Errors
    ///
    /// Returns `RunnerConfigError` naming the offending field.
    pub fn validate(&self) -> Result<(), RunnerConfigError> {
        if !(-2..=2).contains(&self.mood) {
            return Err(RunnerConfigError::RangeViolation {
                field: "mood",
                min: -2.0,
                max: 2.0,
                value: f64::from(self.mood),
            });
        }
        for (field, value) in self.stats.fields() {
            if !(STAT_MIN..=STAT_MAX).contains(&value) {
                return Err(RunnerConfigError::RangeViolation {
                    field,
                    min: STAT_MIN,
                    max: STAT_MAX,
                    value,
                });
            }
        }
        Ok(())
    }

    /// Copy of this runner with one more skill.
    #[must_use]
    pub fn with_skill(&self, skill_id: &str) -> Self {
        let mut runner = self.clone();
        if !runner.skills.iter().any(|s| s == skill_id) {
            runner.skills.push(skill_id.to_string());
        }
        runner
    }

    #[must_use]
    pub fn has_skill(&self, skill_id: &str) -> bool {
        self.skills.iter().any(|s| s == skill_id)
    }

    /// Stats after the overcap halving and the mood multiplier.
    #[must_use]
    pub fn base_stats(&self) -> StatLine {
        let mood = 1.0 + 0.02 * f64::from(self.mood);
        self.stats.map(|stat| {
            let capped = if stat > STAT_OVERCAP {
                STAT_OVERCAP + ((stat - STAT_OVERCAP) / 2.0).floor()
            } else {
                stat
            };
            capped * mood
        })
    }

    /// Base stats adjusted for the course, going and running-style aptitude.
    #[must_use]
    pub fn adjusted_stats(&self, course: &CourseData, race: &RaceParameters) -> StatLine {
        let base = self.base_stats();
        let course_modifier = course.course_speed_modifier(&base);
        StatLine {
            speed: (base.speed * course_modifier
                + ground_speed_modifier(course.surface, race.ground))
            .max(1.0),
            stamina: base.stamina,
            power: (base.power + ground_power_modifier(course.surface, race.ground)).max(1.0),
            guts: base.guts,
            wit: base.wit * self.aptitudes.strategy.strategy_wit_modifier(),
        }
    }

    #[must_use]
    pub fn motivation_code(&self) -> i64 {
        i64::from(self.mood) + 3
    }
}

/// Speeds and accelerations derived from a runner's current stats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedProfile {
    pub base_speed: f64,
    pub base_target_speed: [f64; 3],
    pub last_spurt_speed: f64,
    pub min_speed: f64,
    /// Flat phases 0..=2 then uphill phases 0..=2.
    pub accel: [f64; 6],
}

impl SpeedProfile {
    #[must_use]
    pub fn derive(
        stats: &StatLine,
        strategy: Strategy,
        aptitudes: &Aptitudes,
        course: &CourseData,
    ) -> Self {
        let base_speed = course.base_speed();
        let distance_bonus =
            (500.0 * stats.speed).sqrt() * aptitudes.distance.distance_speed_modifier() * 0.002;
        let base_target_speed = [0, 1, 2].map(|phase| {
            let speed = base_speed * strategy.speed_phase_coefficient(phase);
            if phase == 2 {
                speed + distance_bonus
            } else {
                speed
            }
        });
        let last_spurt_speed = (base_target_speed[2] + 0.01 * base_speed) * 1.05
            + distance_bonus
            + (450.0 * stats.guts).powf(0.597) * 0.0001;
        let min_speed = 0.85 * base_speed + (200.0 * stats.guts).sqrt() * 0.001;
        let power_term = (500.0 * stats.power).sqrt();
        let proficiency =
            aptitudes.surface.surface_accel_modifier() * aptitudes.distance.distance_accel_modifier();
        let accel = [0, 1, 2, 3, 4, 5].map(|slot| {
            let base = if slot >= 3 {
                UPHILL_BASE_ACCEL
            } else {
                BASE_ACCEL
            };
            base * power_term * strategy.accel_phase_coefficient(slot % 3) * proficiency
        });
        Self {
            base_speed,
            base_target_speed,
            last_spurt_speed,
            min_speed,
            accel,
        }
    }

    /// Speed cap during the start dash.
    #[must_use]
    pub fn start_dash_limit(&self) -> f64 {
        0.85 * self.base_speed
    }
}

/// Errors raised when a runner configuration is unusable.
#[derive(Debug, Error, PartialEq)]
pub enum RunnerConfigError {
    #[error("{field} must be between {min:.2} and {max:.2} (got {value:.2})")]
    RangeViolation {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("unknown skill `{skill_id}`")]
    UnknownSkill { skill_id: String },
}

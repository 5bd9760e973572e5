//! Race environment and simulation toggles copied into every trial.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::course::CourseConfigError;
use crate::runner::RunnerConfigError;
use crate::skills::CatalogError;
use crate::strategy::Strategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroundCondition {
    #[default]
    Good,
    Yielding,
    Soft,
    Heavy,
}

impl GroundCondition {
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Good => 1,
            Self::Yielding => 2,
            Self::Soft => 3,
            Self::Heavy => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weather {
    #[default]
    Sunny,
    Cloudy,
    Rainy,
    Snowy,
}

impl Weather {
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Sunny => 1,
            Self::Cloudy => 2,
            Self::Rainy => 3,
            Self::Snowy => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    #[default]
    Spring,
    Summer,
    Autumn,
    Winter,
    Sakura,
}

impl Season {
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Spring => 1,
            Self::Summer => 2,
            Self::Autumn => 3,
            Self::Winter => 4,
            Self::Sakura => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    NoTime,
    Morning,
    #[default]
    Midday,
    Evening,
    Night,
}

impl TimeOfDay {
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::NoTime => 0,
            Self::Morning => 1,
            Self::Midday => 2,
            Self::Evening => 3,
            Self::Night => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    #[default]
    G1,
    G2,
    G3,
    Open,
    PreOpen,
    Maiden,
    Debut,
    Daily,
}

impl Grade {
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::G1 => 100,
            Self::G2 => 200,
            Self::G3 => 300,
            Self::Open => 400,
            Self::PreOpen => 700,
            Self::Maiden => 800,
            Self::Debut => 900,
            Self::Daily => 999,
        }
    }
}

/// Environmental conditions of one race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RaceParameters {
    #[serde(default)]
    pub ground: GroundCondition,
    #[serde(default)]
    pub weather: Weather,
    #[serde(default)]
    pub season: Season,
    #[serde(default)]
    pub time_of_day: TimeOfDay,
    #[serde(default)]
    pub grade: Grade,
}

/// How runners find the pace they keep position against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionKeepMode {
    /// Position keeping disabled.
    None,
    /// Pacer chosen among live runners each tick.
    #[default]
    Approximate,
    /// Analytical front-runner that never races.
    Virtual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthSystem {
    #[default]
    Game,
    Noop,
}

/// Percent chance per strategy that a runner is eligible to duel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DuelingRates {
    #[serde(default = "DuelingRates::default_rate")]
    pub runaway: f64,
    #[serde(default = "DuelingRates::default_rate")]
    pub front_runner: f64,
    #[serde(default = "DuelingRates::default_rate")]
    pub pace_chaser: f64,
    #[serde(default = "DuelingRates::default_rate")]
    pub late_surger: f64,
    #[serde(default = "DuelingRates::default_rate")]
    pub end_closer: f64,
}

impl DuelingRates {
    const fn default_rate() -> f64 {
        10.0
    }

    /// Percent rate for a runner keeping position as `strategy`.
    #[must_use]
    pub const fn rate_for(&self, strategy: Strategy) -> f64 {
        match strategy {
            Strategy::Runaway => self.runaway,
            Strategy::FrontRunner => self.front_runner,
            Strategy::PaceChaser => self.pace_chaser,
            Strategy::LateSurger => self.late_surger,
            Strategy::EndCloser => self.end_closer,
        }
    }

    fn validate(&self) -> Result<(), ParamsConfigError> {
        for (field, value) in [
            ("dueling_rates.runaway", self.runaway),
            ("dueling_rates.front_runner", self.front_runner),
            ("dueling_rates.pace_chaser", self.pace_chaser),
            ("dueling_rates.late_surger", self.late_surger),
            ("dueling_rates.end_closer", self.end_closer),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ParamsConfigError::RangeViolation {
                    field,
                    min: 0.0,
                    max: 100.0,
                    value,
                });
            }
        }
        Ok(())
    }
}

impl Default for DuelingRates {
    fn default() -> Self {
        Self {
            runaway: Self::default_rate(),
            front_runner: Self::default_rate(),
            pace_chaser: Self::default_rate(),
            late_surger: Self::default_rate(),
            end_closer: Self::default_rate(),
        }
    }
}

/// Feature toggles for one comparison run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationOptions {
    #[serde(default)]
    pub health_system: HealthSystem,
    #[serde(default = "SimulationOptions::default_enabled")]
    pub section_modifier: bool,
    #[serde(default = "SimulationOptions::default_enabled")]
    pub rushed: bool,
    #[serde(default = "SimulationOptions::default_enabled")]
    pub downhill: bool,
    #[serde(default = "SimulationOptions::default_enabled")]
    pub spot_struggle: bool,
    #[serde(default = "SimulationOptions::default_enabled")]
    pub dueling: bool,
    #[serde(default = "SimulationOptions::default_enabled")]
    pub wit_checks: bool,
    #[serde(default)]
    pub position_keep_mode: PositionKeepMode,
    #[serde(default = "SimulationOptions::default_pacemaker_count")]
    pub pacemaker_count: u8,
    #[serde(default)]
    pub dueling_rates: DuelingRates,
    #[serde(default = "SimulationOptions::default_enabled")]
    pub allow_rushed_a: bool,
    #[serde(default = "SimulationOptions::default_enabled")]
    pub allow_rushed_b: bool,
    #[serde(default = "SimulationOptions::default_enabled")]
    pub allow_downhill_a: bool,
    #[serde(default = "SimulationOptions::default_enabled")]
    pub allow_downhill_b: bool,
    #[serde(default = "SimulationOptions::default_enabled")]
    pub allow_section_modifier_a: bool,
    #[serde(default = "SimulationOptions::default_enabled")]
    pub allow_section_modifier_b: bool,
    #[serde(default = "SimulationOptions::default_enabled")]
    pub skill_check_chance_a: bool,
    #[serde(default = "SimulationOptions::default_enabled")]
    pub skill_check_chance_b: bool,
}

impl SimulationOptions {
    const fn default_enabled() -> bool {
        true
    }

    const fn default_pacemaker_count() -> u8 {
        1
    }

    pub const MAX_PACEMAKERS: u8 = 3;

    /// Validate option bounds.
    ///
    /// # Errors
    ///
    /// Returns `ParamsConfigError` when a rate or count is out of range.
    pub fn validate(&self) -> Result<(), ParamsConfigError> {
        if self.pacemaker_count > Self::MAX_PACEMAKERS {
            return Err(ParamsConfigError::RangeViolation {
                field: "pacemaker_count",
                min: 0.0,
                max: f64::from(Self::MAX_PACEMAKERS),
                value: f64::from(self.pacemaker_count),
            });
        }
        self.dueling_rates.validate()
    }

    /// Effective toggles for one participant.
    #[must_use]
    pub const fn toggles_for(&self, side: Side) -> RunnerToggles {
        let (rushed, downhill, section, wit) = match side {
            Side::A => (
                self.allow_rushed_a,
                self.allow_downhill_a,
                self.allow_section_modifier_a,
                self.skill_check_chance_a,
            ),
            Side::B => (
                self.allow_rushed_b,
                self.allow_downhill_b,
                self.allow_section_modifier_b,
                self.skill_check_chance_b,
            ),
            Side::Pacemaker => (true, true, true, true),
        };
        RunnerToggles {
            rushed: self.rushed && rushed,
            downhill: self.downhill && downhill,
            section_modifier: self.section_modifier && section,
            wit_checks: self.wit_checks && wit,
            spot_struggle: self.spot_struggle,
            dueling: self.dueling,
        }
    }
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            health_system: HealthSystem::default(),
            section_modifier: true,
            rushed: true,
            downhill: true,
            spot_struggle: true,
            dueling: true,
            wit_checks: true,
            position_keep_mode: PositionKeepMode::default(),
            pacemaker_count: Self::default_pacemaker_count(),
            dueling_rates: DuelingRates::default(),
            allow_rushed_a: true,
            allow_rushed_b: true,
            allow_downhill_a: true,
            allow_downhill_b: true,
            allow_section_modifier_a: true,
            allow_section_modifier_b: true,
            skill_check_chance_a: true,
            skill_check_chance_b: true,
        }
    }
}

/// Which seat a participant occupies in a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    A,
    B,
    Pacemaker,
}

/// Behaviour switches resolved for a single runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct RunnerToggles {
    pub rushed: bool,
    pub downhill: bool,
    pub section_modifier: bool,
    pub wit_checks: bool,
    pub spot_struggle: bool,
    pub dueling: bool,
}

impl Default for RunnerToggles {
    fn default() -> Self {
        SimulationOptions::default().toggles_for(Side::Pacemaker)
    }
}

/// Errors raised when comparison inputs are inconsistent.
#[derive(Debug, Error, PartialEq)]
pub enum ParamsConfigError {
    #[error("{field} must be at least {min:.2} (got {value:.2})")]
    MinViolation {
        field: &'static str,
        min: f64,
        value: f64,
    },
    #[error("{field} must be between {min:.2} and {max:.2} (got {value:.2})")]
    RangeViolation {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("course: {0}")]
    Course(#[from] CourseConfigError),
    #[error("runner {side:?}: {source}")]
    Runner {
        side: Side,
        #[source]
        source: RunnerConfigError,
    },
    #[error("skill catalog: {0}")]
    Catalog(#[from] CatalogError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_everything() {
        let options: SimulationOptions = serde_json::from_str("{}").expect("empty options parse");
        assert_eq!(options, SimulationOptions::default());
        assert_eq!(options.position_keep_mode, PositionKeepMode::Approximate);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn per_runner_overrides_combine_with_globals() {
        let options = SimulationOptions {
            allow_rushed_b: false,
            downhill: false,
            ..SimulationOptions::default()
        };
        let a = options.toggles_for(Side::A);
        let b = options.toggles_for(Side::B);
        assert!(a.rushed);
        assert!(!b.rushed);
        assert!(!a.downhill && !b.downhill);
    }

    #[test]
    fn dueling_rates_are_percentages() {
        let options = SimulationOptions {
            dueling_rates: DuelingRates {
                late_surger: 140.0,
                ..DuelingRates::default()
            },
            ..SimulationOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ParamsConfigError::RangeViolation {
                field: "dueling_rates.late_surger",
                ..
            })
        ));
    }

    #[test]
    fn race_parameters_parse_snake_case() {
        let params: RaceParameters =
            serde_json::from_str(r#"{"ground":"heavy","weather":"rainy","grade":"pre_open"}"#)
                .expect("parameters parse");
        assert_eq!(params.ground.code(), 4);
        assert_eq!(params.weather.code(), 3);
        assert_eq!(params.grade.code(), 700);
        assert_eq!(params.time_of_day, TimeOfDay::Midday);
    }
}

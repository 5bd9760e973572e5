//! Running styles, aptitude grades and the coefficient tables keyed by them.
use serde::{Deserialize, Serialize};

const SPEED_PHASE_COEFFICIENT: [[f64; 3]; 5] = [
    [1.0, 0.98, 0.962],
    [0.978, 0.991, 0.975],
    [0.938, 0.998, 0.994],
    [0.931, 1.0, 1.0],
    [1.063, 0.962, 0.95],
];

const ACCEL_PHASE_COEFFICIENT: [[f64; 3]; 5] = [
    [1.0, 1.0, 0.996],
    [0.985, 1.0, 0.996],
    [0.975, 1.0, 1.0],
    [0.945, 1.0, 0.997],
    [1.17, 0.94, 0.956],
];

const HP_STRATEGY_COEFFICIENT: [f64; 5] = [0.95, 0.89, 1.0, 0.995, 0.86];

const POSITION_KEEP_MIN: [f64; 5] = [0.0, 3.0, 6.5, 7.5, 0.0];
const POSITION_KEEP_MAX: [f64; 5] = [0.0, 5.0, 7.0, 8.0, 0.0];

const DISTANCE_SPEED_PROFICIENCY: [f64; 8] = [1.05, 1.0, 0.9, 0.8, 0.6, 0.4, 0.2, 0.1];
const DISTANCE_ACCEL_PROFICIENCY: [f64; 8] = [1.0, 1.0, 1.0, 1.0, 1.0, 0.6, 0.5, 0.4];
const SURFACE_ACCEL_PROFICIENCY: [f64; 8] = [1.05, 1.0, 0.9, 0.8, 0.7, 0.5, 0.3, 0.1];
const STRATEGY_WIT_PROFICIENCY: [f64; 8] = [1.1, 1.0, 0.85, 0.75, 0.6, 0.4, 0.2, 0.1];

/// Running style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    FrontRunner,
    PaceChaser,
    LateSurger,
    EndCloser,
    Runaway,
}

impl Strategy {
    pub const ALL: [Self; 5] = [
        Self::FrontRunner,
        Self::PaceChaser,
        Self::LateSurger,
        Self::EndCloser,
        Self::Runaway,
    ];

    const fn index(self) -> usize {
        match self {
            Self::FrontRunner => 0,
            Self::PaceChaser => 1,
            Self::LateSurger => 2,
            Self::EndCloser => 3,
            Self::Runaway => 4,
        }
    }

    /// Identifier used by the condition language.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::FrontRunner => 1,
            Self::PaceChaser => 2,
            Self::LateSurger => 3,
            Self::EndCloser => 4,
            Self::Runaway => 5,
        }
    }

    /// Front runners and runaways lead rather than follow.
    #[must_use]
    pub const fn is_front(self) -> bool {
        matches!(self, Self::FrontRunner | Self::Runaway)
    }

    #[must_use]
    pub const fn speed_phase_coefficient(self, phase: usize) -> f64 {
        SPEED_PHASE_COEFFICIENT[self.index()][clamp_phase(phase)]
    }

    #[must_use]
    pub const fn accel_phase_coefficient(self, phase: usize) -> f64 {
        ACCEL_PHASE_COEFFICIENT[self.index()][clamp_phase(phase)]
    }

    #[must_use]
    pub const fn hp_coefficient(self) -> f64 {
        HP_STRATEGY_COEFFICIENT[self.index()]
    }

    /// Base lower bound of the distance kept behind the pacer.
    #[must_use]
    pub const fn position_keep_min(self) -> f64 {
        POSITION_KEEP_MIN[self.index()]
    }

    #[must_use]
    pub const fn position_keep_max(self) -> f64 {
        POSITION_KEEP_MAX[self.index()]
    }

    /// Strategy a rushed runner keeps position as, given a roll in `[0, 1)`.
    #[must_use]
    pub fn rushed_position_keep(self, roll: f64) -> Self {
        match self {
            Self::FrontRunner | Self::PaceChaser | Self::Runaway => Self::FrontRunner,
            Self::LateSurger => {
                if roll < 0.75 {
                    Self::FrontRunner
                } else {
                    Self::PaceChaser
                }
            }
            Self::EndCloser => {
                if roll < 0.7 {
                    Self::FrontRunner
                } else if roll < 0.9 {
                    Self::PaceChaser
                } else {
                    Self::LateSurger
                }
            }
        }
    }
}

const fn clamp_phase(phase: usize) -> usize {
    if phase > 2 { 2 } else { phase }
}

/// Aptitude grade, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Aptitude {
    S,
    #[default]
    A,
    B,
    C,
    D,
    E,
    F,
    G,
}

impl Aptitude {
    const fn index(self) -> usize {
        match self {
            Self::S => 0,
            Self::A => 1,
            Self::B => 2,
            Self::C => 3,
            Self::D => 4,
            Self::E => 5,
            Self::F => 6,
            Self::G => 7,
        }
    }

    #[must_use]
    pub const fn distance_speed_modifier(self) -> f64 {
        DISTANCE_SPEED_PROFICIENCY[self.index()]
    }

    #[must_use]
    pub const fn distance_accel_modifier(self) -> f64 {
        DISTANCE_ACCEL_PROFICIENCY[self.index()]
    }

    #[must_use]
    pub const fn surface_accel_modifier(self) -> f64 {
        SURFACE_ACCEL_PROFICIENCY[self.index()]
    }

    #[must_use]
    pub const fn strategy_wit_modifier(self) -> f64 {
        STRATEGY_WIT_PROFICIENCY[self.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_is_capped_for_coefficients() {
        let s = Strategy::EndCloser;
        assert!((s.speed_phase_coefficient(3) - s.speed_phase_coefficient(2)).abs() < f64::EPSILON);
        assert!((Strategy::Runaway.speed_phase_coefficient(0) - 1.063).abs() < f64::EPSILON);
        assert!((Strategy::PaceChaser.accel_phase_coefficient(0) - 0.985).abs() < f64::EPSILON);
    }

    #[test]
    fn rushed_runners_keep_position_further_forward() {
        assert_eq!(
            Strategy::PaceChaser.rushed_position_keep(0.99),
            Strategy::FrontRunner
        );
        assert_eq!(
            Strategy::LateSurger.rushed_position_keep(0.8),
            Strategy::PaceChaser
        );
        assert_eq!(
            Strategy::EndCloser.rushed_position_keep(0.95),
            Strategy::LateSurger
        );
        assert_eq!(
            Strategy::EndCloser.rushed_position_keep(0.1),
            Strategy::FrontRunner
        );
    }

    #[test]
    fn aptitude_tables_degrade() {
        assert!(Aptitude::S.distance_speed_modifier() > Aptitude::A.distance_speed_modifier());
        assert!((Aptitude::G.strategy_wit_modifier() - 0.1).abs() < f64::EPSILON);
        assert!((Aptitude::E.distance_accel_modifier() - 0.6).abs() < f64::EPSILON);
    }
}

//! Lateral movement across the track, one frame at a time.
use crate::course::{CourseData, HORSE_LANE, LANE_CHANGE_ACCEL_PER_FRAME};
use crate::poskeep::PositionKeepState;
use crate::rng::{Prng, Stream};

const MAX_LANE_SPEED: f64 = 0.6;
const PACE_DOWN_LANE: f64 = 0.18;
const CHANGE_LANE_TARGET: f64 = 9.5;
const LANE_EPSILON: f64 = 1e-5;

/// Everything lane choice depends on this frame.
#[derive(Debug, Clone, Copy)]
#[allow(clippy::struct_excessive_bools)]
pub struct LaneInput {
    pub position: f64,
    pub phase: usize,
    pub power: f64,
    pub keep_state: PositionKeepState,
    pub blocked_side: bool,
    pub overtake: bool,
    pub has_hp: bool,
    pub change_lane_skill: bool,
    pub lane_skill_bonus: f64,
    pub late_stretch: bool,
}

#[derive(Debug, Clone)]
pub struct LaneState {
    lane: f64,
    target: f64,
    change_speed: f64,
    extra_move: Option<f64>,
}

impl LaneState {
    #[must_use]
    pub fn from_gate(gate: usize) -> Self {
        let lane = crate::numbers::usize_to_f64(gate) * HORSE_LANE;
        Self {
            lane,
            target: lane,
            change_speed: 0.0,
            extra_move: None,
        }
    }

    #[must_use]
    pub const fn lane(&self) -> f64 {
        self.lane
    }

    /// Non-zero while the runner is drifting sideways.
    #[must_use]
    pub const fn change_speed(&self) -> f64 {
        self.change_speed
    }

    pub fn update(&mut self, course: &CourseData, input: &LaneInput, rng: &mut Stream) {
        let current = self.lane;
        let max_lane = course.max_lane_distance();
        if self.extra_move.is_none() && input.late_stretch {
            self.extra_move = Some((current / 0.1).min(max_lane) * 0.5 + rng.random() * 0.1);
        }
        let extra = self.extra_move.unwrap_or(-1.0);

        self.target = if input.change_lane_skill {
            CHANGE_LANE_TARGET * HORSE_LANE
        } else if input.overtake {
            self.target.max(HORSE_LANE).max(extra)
        } else if !input.has_hp {
            current
        } else if input.keep_state == PositionKeepState::PaceDown {
            PACE_DOWN_LANE
        } else if extra > current {
            extra
        } else if input.phase <= 1 && !input.blocked_side {
            (current - 0.05).max(0.0)
        } else {
            current
        };

        if (input.blocked_side && self.target < current)
            || (self.target - current).abs() < LANE_EPSILON
        {
            self.change_speed = 0.0;
            return;
        }

        let mut top = 0.02 * (0.3 + 0.001 * input.power);
        if input.position < course.move_lane_point() && max_lane > 0.0 {
            top *= 1.0 + current / max_lane * 0.05;
        }
        self.change_speed = (self.change_speed + LANE_CHANGE_ACCEL_PER_FRAME).min(top);
        let actual = (self.change_speed + input.lane_skill_bonus).min(MAX_LANE_SPEED);
        self.lane = if self.target > current {
            self.target.min(current + actual)
        } else {
            self.target.max(current - actual * (1.0 + current))
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::CountingRng;

    fn input() -> LaneInput {
        LaneInput {
            position: 500.0,
            phase: 1,
            power: 800.0,
            keep_state: PositionKeepState::None,
            blocked_side: false,
            overtake: false,
            has_hp: true,
            change_lane_skill: false,
            lane_skill_bonus: 0.0,
            late_stretch: false,
        }
    }

    fn course() -> CourseData {
        CourseData::load_from_static().expect("course")
    }

    #[test]
    fn early_race_drifts_toward_the_rail() {
        let c = course();
        let mut rng = CountingRng::new(1);
        let mut lane = LaneState::from_gate(6);
        let start = lane.lane();
        for _ in 0..60 {
            lane.update(&c, &input(), &mut rng);
        }
        assert!(lane.lane() < start);
        assert!(lane.lane() >= 0.0);
    }

    #[test]
    fn blocked_side_holds_the_lane() {
        let c = course();
        let mut rng = CountingRng::new(1);
        let mut lane = LaneState::from_gate(6);
        let start = lane.lane();
        let blocked = LaneInput {
            blocked_side: true,
            phase: 2,
            ..input()
        };
        for _ in 0..60 {
            lane.update(&c, &blocked, &mut rng);
        }
        assert!((lane.lane() - start).abs() < f64::EPSILON);
        assert!(lane.change_speed().abs() < f64::EPSILON);
    }

    #[test]
    fn change_lane_skill_moves_outward_within_speed_cap() {
        let c = course();
        let mut rng = CountingRng::new(1);
        let mut lane = LaneState::from_gate(0);
        let skill = LaneInput {
            change_lane_skill: true,
            lane_skill_bonus: 5.0,
            ..input()
        };
        let mut previous = lane.lane();
        for _ in 0..30 {
            lane.update(&c, &skill, &mut rng);
            assert!(lane.lane() - previous <= MAX_LANE_SPEED + 1e-12);
            previous = lane.lane();
        }
        assert!((lane.lane() - CHANGE_LANE_TARGET * HORSE_LANE).abs() < 1e-9);
    }

    #[test]
    fn late_stretch_rolls_extra_move_once() {
        let c = course();
        let mut rng = CountingRng::new(1);
        let mut lane = LaneState::from_gate(3);
        let late = LaneInput {
            late_stretch: true,
            phase: 2,
            ..input()
        };
        lane.update(&c, &late, &mut rng);
        lane.update(&c, &late, &mut rng);
        assert_eq!(rng.draws(), 1);
    }
}

//! Static course description, phase geometry and piecewise lookups.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::numbers::{floor_f64_to_usize, usize_to_f64};
use crate::params::GroundCondition;
use crate::runner::StatLine;

const DEFAULT_COURSE_DATA: &str = include_str!("../data/course.json");

/// Track width in metres.
pub const COURSE_WIDTH: f64 = 11.25;
/// Width of a single lane.
pub const HORSE_LANE: f64 = COURSE_WIDTH / 18.0;
/// Lateral acceleration applied per frame while changing lanes.
pub const LANE_CHANGE_ACCEL_PER_FRAME: f64 = 0.02 * 1.5 / 15.0;
/// Races are split into this many equal sections.
pub const SECTION_COUNT: usize = 24;

const MIN_DISTANCE: f64 = 1000.0;
const MAX_DISTANCE: f64 = 4000.0;
const DEFAULT_MOVE_LANE_POINT: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceType {
    Short,
    Mile,
    Middle,
    Long,
}

impl DistanceType {
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Short => 1,
            Self::Mile => 2,
            Self::Middle => 3,
            Self::Long => 4,
        }
    }

    /// Classification used when course data leaves the bucket implicit.
    #[must_use]
    pub fn from_distance(distance: f64) -> Self {
        if distance <= 1400.0 {
            Self::Short
        } else if distance <= 1800.0 {
            Self::Mile
        } else if distance <= 2400.0 {
            Self::Middle
        } else {
            Self::Long
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    Turf,
    Dirt,
}

impl Surface {
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Turf => 1,
            Self::Dirt => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Clockwise,
    Counterclockwise,
    Straight,
}

impl Orientation {
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Clockwise => 1,
            Self::Counterclockwise => 2,
            Self::Straight => 4,
        }
    }
}

/// Stat checked by the course speed bonus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdStat {
    Speed,
    Stamina,
    Power,
    Guts,
    Wit,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Corner {
    pub start: f64,
    pub length: f64,
}

impl Corner {
    #[must_use]
    pub fn end(&self) -> f64 {
        self.start + self.length
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Straight {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub front_type: i32,
}

/// Slope segment; `slope` is in hundredths of a percent, negative downhill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Slope {
    pub start: f64,
    pub length: f64,
    pub slope: f64,
}

impl Slope {
    #[must_use]
    pub fn end(&self) -> f64 {
        self.start + self.length
    }
}

/// Immutable course definition shared by every trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseData {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    pub distance: f64,
    #[serde(default)]
    pub distance_type: Option<DistanceType>,
    #[serde(default = "CourseData::default_surface")]
    pub surface: Surface,
    #[serde(default = "CourseData::default_orientation", alias = "turn")]
    pub orientation: Orientation,
    #[serde(default)]
    pub threshold_stats: Vec<ThresholdStat>,
    #[serde(default)]
    pub corners: Vec<Corner>,
    #[serde(default)]
    pub straights: Vec<Straight>,
    #[serde(default)]
    pub slopes: Vec<Slope>,
    #[serde(default = "CourseData::default_lane_max")]
    pub lane_max: f64,
}

impl CourseData {
    const fn default_surface() -> Surface {
        Surface::Turf
    }

    const fn default_orientation() -> Orientation {
        Orientation::Clockwise
    }

    const fn default_lane_max() -> f64 {
        13_500.0
    }

    /// Embedded default course.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled course JSON fails to parse.
    pub fn load_from_static() -> Result<Self, serde_json::Error> {
        Self::from_json(DEFAULT_COURSE_DATA)
    }

    /// Parse course data from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed into a course.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Validate distances and segment ordering.
    ///
    /// # Errors
    ///
    /// Returns `CourseConfigError` when the distance is out of range or a
    /// segment list is unsorted or runs past the finish.
    pub fn validate(&self) -> Result<(), CourseConfigError> {
        if !(MIN_DISTANCE..=MAX_DISTANCE).contains(&self.distance) {
            return Err(CourseConfigError::RangeViolation {
                field: "distance",
                min: MIN_DISTANCE,
                max: MAX_DISTANCE,
                value: self.distance,
            });
        }
        if self.lane_max < 0.0 {
            return Err(CourseConfigError::MinViolation {
                field: "lane_max",
                min: 0.0,
                value: self.lane_max,
            });
        }
        check_segments(
            "corners",
            self.distance,
            self.corners.iter().map(|c| (c.start, c.end())),
        )?;
        check_segments(
            "straights",
            self.distance,
            self.straights.iter().map(|s| (s.start, s.end)),
        )?;
        check_segments(
            "slopes",
            self.distance,
            self.slopes.iter().map(|s| (s.start, s.end())),
        )?;
        Ok(())
    }

    #[must_use]
    pub fn distance_type(&self) -> DistanceType {
        self.distance_type
            .unwrap_or_else(|| DistanceType::from_distance(self.distance))
    }

    /// `20 - (distance - 2000) / 1000` metres per second.
    #[must_use]
    pub fn base_speed(&self) -> f64 {
        20.0 - (self.distance - 2000.0) / 1000.0
    }

    #[must_use]
    pub fn section_length(&self) -> f64 {
        self.distance / usize_to_f64(SECTION_COUNT)
    }

    #[must_use]
    pub fn section_at(&self, position: f64) -> usize {
        floor_f64_to_usize(position / self.section_length()).min(SECTION_COUNT)
    }

    /// Start of `phase`: 0 at the gate, then 1/6, 2/3 and 5/6 of the distance.
    #[must_use]
    pub fn phase_start(&self, phase: usize) -> f64 {
        match phase {
            0 => 0.0,
            1 => self.distance / 6.0,
            2 => self.distance * 2.0 / 3.0,
            _ => self.distance * 5.0 / 6.0,
        }
    }

    #[must_use]
    pub fn phase_end(&self, phase: usize) -> f64 {
        match phase {
            0 => self.distance / 6.0,
            1 => self.distance * 2.0 / 3.0,
            2 => self.distance * 5.0 / 6.0,
            _ => self.distance,
        }
    }

    /// Phase containing `position` (0..=3).
    #[must_use]
    pub fn phase_at(&self, position: f64) -> usize {
        (1..=3)
            .rev()
            .find(|phase| position >= self.phase_start(*phase))
            .unwrap_or(0)
    }

    /// Index of the corner containing `position`.
    #[must_use]
    pub fn corner_at(&self, position: f64) -> Option<usize> {
        segment_containing(&self.corners, position, |c| c.start, Corner::end)
    }

    /// Corner number as the race counts it: the final corner is always 4.
    #[must_use]
    pub fn corner_number(&self, index: usize) -> i64 {
        let from_last = self.corners.len().saturating_sub(index + 1) % 4;
        4 - i64::try_from(from_last).unwrap_or(0)
    }

    #[must_use]
    pub fn straight_at(&self, position: f64) -> Option<usize> {
        segment_containing(&self.straights, position, |s| s.start, |s| s.end)
    }

    /// Slope at `position`, zero when flat.
    #[must_use]
    pub fn slope_at(&self, position: f64) -> f64 {
        segment_containing(&self.slopes, position, |s| s.start, Slope::end)
            .map_or(0.0, |idx| self.slopes[idx].slope)
    }

    #[must_use]
    pub fn final_corner_start(&self) -> Option<f64> {
        self.corners.last().map(|c| c.start)
    }

    #[must_use]
    pub fn is_after_final_corner_start(&self, position: f64) -> bool {
        self.final_corner_start()
            .is_some_and(|start| position >= start)
    }

    #[must_use]
    pub fn last_straight_start(&self) -> Option<f64> {
        self.straights.last().map(|s| s.start)
    }

    #[must_use]
    pub fn is_in_last_straight(&self, position: f64) -> bool {
        self.last_straight_start()
            .is_some_and(|start| position >= start)
    }

    #[must_use]
    pub fn max_lane_distance(&self) -> f64 {
        COURSE_WIDTH * self.lane_max / 10_000.0
    }

    /// Lane changes before this point get a small speed boost.
    #[must_use]
    pub fn move_lane_point(&self) -> f64 {
        self.corners
            .first()
            .map_or(DEFAULT_MOVE_LANE_POINT, |c| c.start)
    }

    /// Bonus multiplier on speed for runners clearing the course stat thresholds.
    #[must_use]
    pub fn course_speed_modifier(&self, stats: &StatLine) -> f64 {
        if self.threshold_stats.is_empty() {
            return 1.0;
        }
        let bonus: f64 = self
            .threshold_stats
            .iter()
            .map(|stat| {
                let value = match stat {
                    ThresholdStat::Speed => stats.speed,
                    ThresholdStat::Stamina => stats.stamina,
                    ThresholdStat::Power => stats.power,
                    ThresholdStat::Guts => stats.guts,
                    ThresholdStat::Wit => stats.wit,
                };
                (1.0 + (value.min(901.0) / 300.01).floor()) * 0.05
            })
            .sum();
        1.0 + bonus / usize_to_f64(self.threshold_stats.len().max(1))
    }
}

fn check_segments(
    field: &'static str,
    distance: f64,
    segments: impl Iterator<Item = (f64, f64)>,
) -> Result<(), CourseConfigError> {
    let mut previous_start = f64::NEG_INFINITY;
    for (index, (start, end)) in segments.enumerate() {
        if start < previous_start {
            return Err(CourseConfigError::Unsorted { field, index });
        }
        if start < 0.0 || end > distance || end < start {
            return Err(CourseConfigError::SegmentOutOfBounds {
                field,
                index,
                start,
                end,
                distance,
            });
        }
        previous_start = start;
    }
    Ok(())
}

fn segment_containing<T>(
    segments: &[T],
    position: f64,
    start: impl Fn(&T) -> f64,
    end: impl Fn(&T) -> f64,
) -> Option<usize> {
    let idx = segments.partition_point(|seg| start(seg) <= position);
    let candidate = idx.checked_sub(1)?;
    (position <= end(&segments[candidate])).then_some(candidate)
}

/// Flat speed adjustment applied for the surface and going.
#[must_use]
pub const fn ground_speed_modifier(_surface: Surface, ground: GroundCondition) -> f64 {
    match ground {
        GroundCondition::Heavy => -50.0,
        _ => 0.0,
    }
}

/// Flat power adjustment applied for the surface and going.
#[must_use]
pub const fn ground_power_modifier(surface: Surface, ground: GroundCondition) -> f64 {
    match (surface, ground) {
        (Surface::Turf, GroundCondition::Good | GroundCondition::Yielding) => 0.0,
        (Surface::Turf, _) => -50.0,
        (Surface::Dirt, GroundCondition::Good) => -100.0,
        (Surface::Dirt, GroundCondition::Yielding) => -50.0,
        (Surface::Dirt, _) => -100.0,
    }
}

/// Stamina consumption multiplier for the surface and going.
#[must_use]
pub const fn ground_hp_modifier(surface: Surface, ground: GroundCondition) -> f64 {
    match (surface, ground) {
        (_, GroundCondition::Good | GroundCondition::Yielding) => 1.0,
        (Surface::Turf, _) | (Surface::Dirt, GroundCondition::Heavy) => 1.02,
        (Surface::Dirt, GroundCondition::Soft) => 1.01,
    }
}

/// Errors raised when course data is unusable.
#[derive(Debug, Error, PartialEq)]
pub enum CourseConfigError {
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
    #[error("{field}[{index}] is not sorted by start")]
    Unsorted { field: &'static str, index: usize },
    #[error("{field}[{index}] spans {start:.1}..{end:.1} outside the {distance:.0} m course")]
    SegmentOutOfBounds {
        field: &'static str,
        index: usize,
        start: f64,
        end: f64,
        distance: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course() -> CourseData {
        CourseData {
            id: 1,
            name: "test".into(),
            distance: 2400.0,
            distance_type: None,
            surface: Surface::Turf,
            orientation: Orientation::Counterclockwise,
            threshold_stats: vec![ThresholdStat::Speed, ThresholdStat::Power],
            corners: vec![
                Corner {
                    start: 400.0,
                    length: 300.0,
                },
                Corner {
                    start: 1600.0,
                    length: 300.0,
                },
            ],
            straights: vec![
                Straight {
                    start: 0.0,
                    end: 400.0,
                    front_type: 1,
                },
                Straight {
                    start: 1900.0,
                    end: 2400.0,
                    front_type: 1,
                },
            ],
            slopes: vec![Slope {
                start: 1000.0,
                length: 200.0,
                slope: 150.0,
            }],
            lane_max: 13_500.0,
        }
    }

    #[test]
    fn embedded_course_is_valid() {
        let course = CourseData::load_from_static().expect("embedded course parses");
        course.validate().expect("embedded course validates");
    }

    #[test]
    fn base_speed_follows_distance() {
        let c = course();
        assert!((c.base_speed() - 19.6).abs() < 1e-12);
        assert!((c.section_length() - 100.0).abs() < 1e-12);
        assert_eq!(c.distance_type(), DistanceType::Middle);
    }

    #[test]
    fn phases_split_at_sixths() {
        let c = course();
        assert_eq!(c.phase_at(0.0), 0);
        assert_eq!(c.phase_at(399.9), 0);
        assert_eq!(c.phase_at(400.0), 1);
        assert_eq!(c.phase_at(1600.0), 2);
        assert_eq!(c.phase_at(2000.0), 3);
        assert!((c.phase_end(1) - 1600.0).abs() < 1e-9);
    }

    #[test]
    fn lookups_find_containing_segment() {
        let c = course();
        assert_eq!(c.corner_at(500.0), Some(0));
        assert_eq!(c.corner_at(800.0), None);
        assert_eq!(c.corner_number(1), 4);
        assert_eq!(c.corner_number(0), 3);
        assert!((c.slope_at(1100.0) - 150.0).abs() < f64::EPSILON);
        assert!(c.slope_at(1300.0).abs() < f64::EPSILON);
        assert!(c.is_in_last_straight(2000.0));
        assert!(c.is_after_final_corner_start(1600.0));
        assert!((c.move_lane_point() - 400.0).abs() < f64::EPSILON);
    }

    #[test]
    fn validation_rejects_bad_courses() {
        let mut c = course();
        c.distance = 500.0;
        assert!(matches!(
            c.validate(),
            Err(CourseConfigError::RangeViolation { field: "distance", .. })
        ));

        let mut c = course();
        c.corners.swap(0, 1);
        assert_eq!(
            c.validate(),
            Err(CourseConfigError::Unsorted {
                field: "corners",
                index: 1
            })
        );

        let mut c = course();
        c.slopes[0].length = 5000.0;
        assert!(matches!(
            c.validate(),
            Err(CourseConfigError::SegmentOutOfBounds { field: "slopes", .. })
        ));
    }

    #[test]
    fn course_speed_modifier_rewards_thresholds() {
        let c = course();
        let stats = StatLine {
            speed: 1200.0,
            stamina: 800.0,
            power: 650.0,
            guts: 400.0,
            wit: 400.0,
        };
        // speed caps at 901 -> 1 + 3 steps; power 650 -> 1 + 2 steps
        let expected = 1.0 + (0.20 + 0.15) / 2.0;
        assert!((c.course_speed_modifier(&stats) - expected).abs() < 1e-12);
    }

    #[test]
    fn ground_tables_match_going() {
        assert!(
            (ground_power_modifier(Surface::Dirt, GroundCondition::Good) + 100.0).abs()
                < f64::EPSILON
        );
        assert!(
            (ground_speed_modifier(Surface::Turf, GroundCondition::Heavy) + 50.0).abs()
                < f64::EPSILON
        );
        assert!(
            (ground_hp_modifier(Surface::Dirt, GroundCondition::Soft) - 1.01).abs() < f64::EPSILON
        );
    }
}

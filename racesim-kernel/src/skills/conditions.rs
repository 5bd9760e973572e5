//! Compiled condition predicates and their evaluation against race state.
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::course::CourseData;
use crate::numbers::{i64_to_f64, usize_to_f64};
use crate::rng::Prng;

/// Quantity a condition term reads from the race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionVar {
    Always,
    CourseDistance,
    DistanceType,
    GroundType,
    GroundCondition,
    Weather,
    Season,
    Time,
    TrackId,
    Rotation,
    Grade,
    RunningStyle,
    Motivation,
    BaseSpeed,
    BaseStamina,
    BasePower,
    BaseGuts,
    BaseWiz,
    RandomLot,
    Phase,
    DistanceRate,
    RemainDistance,
    HpPer,
    Order,
    OrderRate,
    IsLastspurt,
    IsLastStraight,
    IsFinalcorner,
    Corner,
    Slope,
    Accumulatetime,
    IsOvertake,
    BlockedSide,
    IsTemptation,
    IsHpEmptyOnetime,
    BashinDiffInfront,
    BashinDiffBehind,
    ActivateCountAll,
    ActivateCountStart,
    ActivateCountMiddle,
    ActivateCountEndAfter,
    ActivateCountHeal,
    IsUsedSkillId,
    IsBadstart,
    LaneType,
}

impl ConditionVar {
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let var = match name {
            "always" => Self::Always,
            "course_distance" => Self::CourseDistance,
            "distance_type" => Self::DistanceType,
            "ground_type" => Self::GroundType,
            "ground_condition" => Self::GroundCondition,
            "weather" => Self::Weather,
            "season" => Self::Season,
            "time" => Self::Time,
            "track_id" => Self::TrackId,
            "rotation" => Self::Rotation,
            "grade" => Self::Grade,
            "running_style" => Self::RunningStyle,
            "motivation" => Self::Motivation,
            "base_speed" => Self::BaseSpeed,
            "base_stamina" => Self::BaseStamina,
            "base_power" => Self::BasePower,
            "base_guts" => Self::BaseGuts,
            "base_wiz" => Self::BaseWiz,
            "random_lot" => Self::RandomLot,
            "phase" => Self::Phase,
            "distance_rate" => Self::DistanceRate,
            "remain_distance" => Self::RemainDistance,
            "hp_per" => Self::HpPer,
            "order" => Self::Order,
            "order_rate" => Self::OrderRate,
            "is_lastspurt" => Self::IsLastspurt,
            "is_last_straight" => Self::IsLastStraight,
            "is_finalcorner" => Self::IsFinalcorner,
            "corner" => Self::Corner,
            "slope" => Self::Slope,
            "accumulatetime" => Self::Accumulatetime,
            "is_overtake" => Self::IsOvertake,
            "blocked_side" => Self::BlockedSide,
            "is_temptation" => Self::IsTemptation,
            "is_hp_empty_onetime" => Self::IsHpEmptyOnetime,
            "bashin_diff_infront" => Self::BashinDiffInfront,
            "bashin_diff_behind" => Self::BashinDiffBehind,
            "activate_count_all" => Self::ActivateCountAll,
            "activate_count_start" => Self::ActivateCountStart,
            "activate_count_middle" => Self::ActivateCountMiddle,
            "activate_count_end_after" => Self::ActivateCountEndAfter,
            "activate_count_heal" => Self::ActivateCountHeal,
            "is_used_skill_id" => Self::IsUsedSkillId,
            "is_badstart" => Self::IsBadstart,
            "lane_type" => Self::LaneType,
            _ => return None,
        };
        Some(var)
    }

    /// Fixed for the whole race once the runner and course are known.
    #[must_use]
    pub const fn is_static(self) -> bool {
        matches!(
            self,
            Self::Always
                | Self::CourseDistance
                | Self::DistanceType
                | Self::GroundType
                | Self::GroundCondition
                | Self::Weather
                | Self::Season
                | Self::Time
                | Self::TrackId
                | Self::Rotation
                | Self::Grade
                | Self::RunningStyle
                | Self::Motivation
                | Self::BaseSpeed
                | Self::BaseStamina
                | Self::BasePower
                | Self::BaseGuts
                | Self::BaseWiz
                | Self::RandomLot
        )
    }
}

/// Course region in which a sampled trigger point is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampledRegion {
    Phase,
    PhaseFirstHalf,
    PhaseLaterHalf,
    Corner,
    Straight,
}

impl SampledRegion {
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "phase_random" => Some(Self::Phase),
            "phase_firsthalf_random" => Some(Self::PhaseFirstHalf),
            "phase_laterhalf_random" => Some(Self::PhaseLaterHalf),
            "corner_random" => Some(Self::Corner),
            "straight_random" => Some(Self::Straight),
            _ => None,
        }
    }

    fn candidates(self, value: i64, course: &CourseData) -> SmallVec<[(f64, f64); 4]> {
        let phase = usize::try_from(value).ok();
        match self {
            Self::Phase => phase
                .map(|p| (course.phase_start(p), course.phase_end(p)))
                .into_iter()
                .collect(),
            Self::PhaseFirstHalf | Self::PhaseLaterHalf => phase
                .map(|p| {
                    let (start, end) = (course.phase_start(p), course.phase_end(p));
                    let mid = (start + end) / 2.0;
                    if self == Self::PhaseFirstHalf {
                        (start, mid)
                    } else {
                        (mid, end)
                    }
                })
                .into_iter()
                .collect(),
            Self::Corner => course
                .corners
                .iter()
                .enumerate()
                .filter(|(idx, _)| course.corner_number(*idx) == value)
                .map(|(_, c)| (c.start, c.end()))
                .collect(),
            Self::Straight => course.straights.iter().map(|s| (s.start, s.end)).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Eq => (lhs - rhs).abs() < f64::EPSILON,
            Self::Ne => (lhs - rhs).abs() >= f64::EPSILON,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
        }
    }
}

/// Condition syntax tree; `@` is disjunction and `&` conjunction.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Always,
    Or(Vec<Expr>),
    And(Vec<Expr>),
    Compare {
        var: ConditionVar,
        op: CmpOp,
        value: i64,
    },
    /// Holds from a per-trial trigger point to the end of its region.
    Sampled {
        region: SampledRegion,
        value: i64,
        slot: usize,
    },
}

/// Read-only view of the race a condition is evaluated against.
pub trait ConditionSource {
    /// Current value of `var`; `None` when the state it needs is missing.
    fn value(&self, var: ConditionVar) -> Option<f64>;

    /// Whether the runner already used the skill with numeric id `id`.
    fn used_skill(&self, id: i64) -> bool;

    fn position(&self) -> f64;
}

impl Expr {
    fn evaluate(&self, src: &dyn ConditionSource, windows: &[Option<(f64, f64)>]) -> bool {
        match self {
            Self::Always => true,
            Self::Or(terms) => terms.iter().any(|t| t.evaluate(src, windows)),
            Self::And(terms) => terms.iter().all(|t| t.evaluate(src, windows)),
            Self::Compare {
                var: ConditionVar::IsUsedSkillId,
                op,
                value,
            } => match op {
                CmpOp::Eq => src.used_skill(*value),
                CmpOp::Ne => !src.used_skill(*value),
                _ => false,
            },
            Self::Compare { var, op, value } => src
                .value(*var)
                .is_some_and(|lhs| op.apply(lhs, i64_to_f64(*value))),
            Self::Sampled { slot, .. } => windows
                .get(*slot)
                .copied()
                .flatten()
                .is_some_and(|(start, end)| {
                    let pos = src.position();
                    pos >= start && pos <= end
                }),
        }
    }

    /// Three-valued evaluation over static terms only.
    fn evaluate_static(&self, src: &dyn ConditionSource) -> Option<bool> {
        match self {
            Self::Always => Some(true),
            Self::Or(terms) => {
                let mut unknown = false;
                for term in terms {
                    match term.evaluate_static(src) {
                        Some(true) => return Some(true),
                        None => unknown = true,
                        Some(false) => {}
                    }
                }
                if unknown { None } else { Some(false) }
            }
            Self::And(terms) => {
                let mut unknown = false;
                for term in terms {
                    match term.evaluate_static(src) {
                        Some(false) => return Some(false),
                        None => unknown = true,
                        Some(true) => {}
                    }
                }
                if unknown { None } else { Some(true) }
            }
            Self::Compare { var, op, value } if var.is_static() => Some(
                src.value(*var)
                    .is_some_and(|lhs| op.apply(lhs, i64_to_f64(*value))),
            ),
            Self::Compare { .. } | Self::Sampled { .. } => None,
        }
    }

    fn can_still_fire(&self, position: f64, windows: &[Option<(f64, f64)>]) -> bool {
        match self {
            Self::Always | Self::Compare { .. } => true,
            Self::Or(terms) => terms.iter().any(|t| t.can_still_fire(position, windows)),
            Self::And(terms) => terms.iter().all(|t| t.can_still_fire(position, windows)),
            Self::Sampled { slot, .. } => windows
                .get(*slot)
                .copied()
                .flatten()
                .is_some_and(|(_, end)| position <= end),
        }
    }

    fn collect_sampled(&self, out: &mut Vec<(SampledRegion, i64, usize)>) {
        match self {
            Self::Or(terms) | Self::And(terms) => {
                for term in terms {
                    term.collect_sampled(out);
                }
            }
            Self::Sampled {
                region,
                value,
                slot,
            } => out.push((*region, *value, *slot)),
            Self::Always | Self::Compare { .. } => {}
        }
    }
}

/// A compiled condition, parsed once per skill definition.
///
/// The tree is shared: every armed copy in every trial points at the same
/// allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    expr: Arc<Expr>,
    sampled_slots: usize,
}

impl Condition {
    #[must_use]
    pub fn new(expr: Expr, sampled_slots: usize) -> Self {
        Self {
            expr: Arc::new(expr),
            sampled_slots,
        }
    }

    #[must_use]
    pub fn always() -> Self {
        Self::new(Expr::Always, 0)
    }

    #[must_use]
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    #[must_use]
    pub fn is_always(&self) -> bool {
        matches!(*self.expr, Expr::Always)
    }

    /// Whether two handles share one compiled tree.
    #[must_use]
    pub fn shares_tree(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.expr, &other.expr)
    }

    /// Draw the trigger points of every sampled term for one trial.
    pub fn arm<R: Prng + ?Sized>(&self, course: &CourseData, rng: &mut R) -> ArmedCondition {
        let mut windows = smallvec::smallvec![None; self.sampled_slots];
        let mut sampled = Vec::new();
        self.expr.collect_sampled(&mut sampled);
        for (region, value, slot) in sampled {
            let candidates = region.candidates(value, course);
            if candidates.is_empty() {
                continue;
            }
            let upper = u32::try_from(candidates.len()).unwrap_or(u32::MAX);
            let pick = usize::try_from(rng.uniform(upper)).unwrap_or(0);
            let (start, end) = candidates[pick.min(candidates.len() - 1)];
            let trigger = start + rng.random() * (end - start);
            windows[slot] = Some((trigger, end));
        }
        ArmedCondition {
            condition: self.clone(),
            windows,
        }
    }
}

/// Condition with its sampled trigger points drawn for one trial.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmedCondition {
    condition: Condition,
    windows: SmallVec<[Option<(f64, f64)>; 2]>,
}

impl ArmedCondition {
    /// Condition with no sampled terms; used where no rng is at hand.
    #[must_use]
    pub fn unsampled(condition: &Condition) -> Self {
        Self {
            condition: condition.clone(),
            windows: smallvec::smallvec![None; condition.sampled_slots],
        }
    }

    #[must_use]
    pub fn evaluate(&self, src: &dyn ConditionSource) -> bool {
        self.condition.expr.evaluate(src, &self.windows)
    }

    /// `Some(false)` when static terms alone already rule the condition out.
    #[must_use]
    pub fn evaluate_static(&self, src: &dyn ConditionSource) -> Option<bool> {
        self.condition.expr.evaluate_static(src)
    }

    /// False once every path through the condition has passed its window.
    #[must_use]
    pub fn can_still_fire(&self, position: f64) -> bool {
        self.condition.expr.can_still_fire(position, &self.windows)
    }

    #[must_use]
    pub fn windows(&self) -> &[Option<(f64, f64)>] {
        &self.windows
    }

    #[must_use]
    pub const fn condition(&self) -> &Condition {
        &self.condition
    }
}

/// Bucketed lateral position reported as `lane_type`.
#[must_use]
pub fn lane_bucket(lane: f64, horse_lane: f64) -> f64 {
    let lanes = lane / horse_lane;
    let bucket: usize = if lanes < 2.0 {
        0
    } else if lanes < 4.0 {
        1
    } else if lanes < 7.0 {
        2
    } else {
        3
    };
    usize_to_f64(bucket)
}

//! Queries over the activation records collected by a comparison.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::compare::CompareAggregate;
use crate::numbers::usize_to_f64;
use crate::params::Side;
use crate::skills::{EffectType, Perspective, SkillActivation};

/// Filter over activation records. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectQuery {
    skill_id: Option<String>,
    effect_type: Option<EffectType>,
    side: Option<Side>,
    perspective: Option<Perspective>,
}

impl EffectQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn skill(mut self, skill_id: &str) -> Self {
        self.skill_id = Some(skill_id.to_string());
        self
    }

    #[must_use]
    pub const fn effect(mut self, effect_type: EffectType) -> Self {
        self.effect_type = Some(effect_type);
        self
    }

    #[must_use]
    pub const fn side(mut self, side: Side) -> Self {
        self.side = Some(side);
        self
    }

    #[must_use]
    pub const fn perspective(mut self, perspective: Perspective) -> Self {
        self.perspective = Some(perspective);
        self
    }

    #[must_use]
    pub fn matches(&self, side: Side, activation: &SkillActivation) -> bool {
        self.skill_id
            .as_deref()
            .is_none_or(|id| id == activation.skill_id)
            && self.effect_type.is_none_or(|t| t == activation.effect_type)
            && self.side.is_none_or(|s| s == side)
            && self.perspective.is_none_or(|p| p == activation.perspective)
    }

    /// Matching records across every trial, paired with the side that owns them.
    pub fn select<'a>(
        &'a self,
        aggregate: &'a CompareAggregate,
    ) -> impl Iterator<Item = (Side, &'a SkillActivation)> + 'a {
        aggregate
            .trials()
            .iter()
            .flat_map(|trial| [&trial.a, &trial.b])
            .flat_map(|outcome| outcome.activations.iter().map(move |a| (outcome.side, a)))
            .filter(|(side, activation)| self.matches(*side, activation))
    }

    /// Per-skill, per-side statistics of the matching records.
    #[must_use]
    pub fn summarize(&self, aggregate: &CompareAggregate) -> Vec<ActivationStats> {
        let mut grouped: BTreeMap<(String, u8), Accumulating> = BTreeMap::new();
        for trial in aggregate.trials() {
            for outcome in [&trial.a, &trial.b] {
                for activation in &outcome.activations {
                    if !self.matches(outcome.side, activation) {
                        continue;
                    }
                    let key = (activation.skill_id.clone(), side_rank(outcome.side));
                    let entry = grouped.entry(key).or_insert_with(|| Accumulating {
                        side: outcome.side,
                        ..Accumulating::default()
                    });
                    entry.add(trial.index, activation.start);
                }
            }
        }
        let trials = aggregate.len();
        grouped
            .into_iter()
            .map(|((skill_id, _), acc)| acc.finish(skill_id, trials))
            .collect()
    }
}

const fn side_rank(side: Side) -> u8 {
    match side {
        Side::A => 0,
        Side::B => 1,
        Side::Pacemaker => 2,
    }
}

/// Where and how often one skill took effect for one side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationStats {
    pub skill_id: String,
    pub side: Side,
    pub count: usize,
    /// Percentage of trials with at least one matching record.
    pub trial_rate: f64,
    pub mean_position: f64,
    pub min_position: f64,
    pub max_position: f64,
}

#[derive(Debug, Clone)]
struct Accumulating {
    side: Side,
    count: usize,
    trials: Vec<u64>,
    total: f64,
    min: f64,
    max: f64,
}

impl Default for Accumulating {
    fn default() -> Self {
        Self {
            side: Side::A,
            count: 0,
            trials: Vec::new(),
            total: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl Accumulating {
    fn add(&mut self, trial: u64, position: f64) {
        self.count += 1;
        if self.trials.last() != Some(&trial) {
            self.trials.push(trial);
        }
        self.total += position;
        self.min = self.min.min(position);
        self.max = self.max.max(position);
    }

    fn finish(self, skill_id: String, trials: usize) -> ActivationStats {
        let trial_rate = if trials == 0 {
            0.0
        } else {
            usize_to_f64(self.trials.len()) / usize_to_f64(trials) * 100.0
        };
        ActivationStats {
            skill_id,
            side: self.side,
            count: self.count,
            trial_rate,
            mean_position: self.total / usize_to_f64(self.count.max(1)),
            min_position: self.min,
            max_position: self.max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::{CompareParams, Comparison};
    use crate::skills::SkillCatalog;

    fn aggregate(samples: u64) -> CompareAggregate {
        let catalog = SkillCatalog::load_from_static().unwrap();
        let params: CompareParams =
            serde_json::from_str(include_str!("../data/scenario.json")).unwrap();
        let comparison = Comparison::new(params, &catalog).unwrap();
        comparison.run_range(7, 0..samples).unwrap()
    }

    #[test]
    fn empty_query_selects_every_record() {
        let aggregate = aggregate(3);
        let total: usize = aggregate
            .trials()
            .iter()
            .map(|t| t.a.activations.len() + t.b.activations.len())
            .sum();
        assert_eq!(EffectQuery::new().select(&aggregate).count(), total);
    }

    #[test]
    fn side_filter_keeps_only_that_side() {
        let aggregate = aggregate(3);
        let query = EffectQuery::new().side(Side::B);
        assert!(query.select(&aggregate).all(|(side, _)| side == Side::B));
        for stats in query.summarize(&aggregate) {
            assert_eq!(stats.side, Side::B);
            assert!(stats.count >= 1);
            assert!(stats.trial_rate > 0.0 && stats.trial_rate <= 100.0);
            assert!(stats.min_position <= stats.mean_position + 1e-9);
            assert!(stats.mean_position <= stats.max_position + 1e-9);
        }
    }

    #[test]
    fn skill_filter_only_sees_that_skill() {
        let aggregate = aggregate(3);
        let query = EffectQuery::new().skill("200331");
        assert!(query
            .select(&aggregate)
            .all(|(_, activation)| activation.skill_id == "200331"));
        assert!(query.select(&aggregate).all(|(side, _)| side == Side::B));
    }

    #[test]
    fn unknown_skill_summarizes_to_nothing() {
        let aggregate = aggregate(2);
        assert!(EffectQuery::new().skill("999999").summarize(&aggregate).is_empty());
    }
}

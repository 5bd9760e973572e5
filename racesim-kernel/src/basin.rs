//! Skill basin: how much each candidate skill is worth to one runner.
//!
//! Every candidate is compared as `runner` against `runner + skill` over a
//! staged schedule. Skills that never move the needle are dropped early so
//! the long stages only run for candidates that matter.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compare::{CompareAggregate, CompareParams, Comparison};
use crate::orchestrator::{
    OrchestratorConfig, OrchestratorError, SkillExecutor, SkillSample, run_skill_batches,
};
use crate::params::ParamsConfigError;
use crate::race::TrialFailure;
use crate::rng::derive_stream_seed;
use crate::skills::SkillCatalog;

/// Samples added for each surviving skill at each stage.
pub const BASIN_STAGES: [u64; 4] = [5, 20, 50, 200];
pub const DEFAULT_BATCH_SIZE: usize = 10;
const EFFECT_THRESHOLD: f64 = 0.1;

/// Why a skill stopped being sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterReason {
    NegligibleEffect,
    LowVariance,
}

/// One candidate's accumulated result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasinRow {
    pub skill_id: String,
    pub samples: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub filter: Option<FilterReason>,
    #[serde(skip)]
    aggregate: CompareAggregate,
}

impl BasinRow {
    fn new(skill_id: String) -> Self {
        Self {
            skill_id,
            samples: 0,
            min: 0.0,
            max: 0.0,
            mean: 0.0,
            median: 0.0,
            filter: None,
            aggregate: CompareAggregate::default(),
        }
    }

    fn absorb(&mut self, aggregate: CompareAggregate) {
        self.aggregate.merge(aggregate);
        let summary = self.aggregate.summary();
        self.samples = summary.samples;
        self.min = summary.min;
        self.max = summary.max;
        self.mean = summary.mean;
        self.median = summary.median;
    }

    /// Every trial merged into this row so far.
    #[must_use]
    pub const fn aggregate(&self) -> &CompareAggregate {
        &self.aggregate
    }

    fn screen(&mut self, stage: usize) {
        self.filter = match stage {
            0 if self.max <= EFFECT_THRESHOLD => Some(FilterReason::NegligibleEffect),
            1 if (self.max - self.min).abs() <= EFFECT_THRESHOLD => Some(FilterReason::LowVariance),
            _ => None,
        };
    }
}

/// Pre-built comparisons, one per candidate skill.
#[derive(Debug, Clone)]
pub struct SkillBasin {
    comparisons: BTreeMap<String, Comparison>,
}

impl SkillBasin {
    /// Candidates the runner already has, or the catalog does not know, are
    /// skipped. `runner_b` of `params` is ignored.
    ///
    /// # Errors
    ///
    /// Returns `ParamsConfigError` when the base parameters fail validation.
    pub fn new(
        params: &CompareParams,
        candidates: impl IntoIterator<Item = String>,
        catalog: &SkillCatalog,
    ) -> Result<Self, ParamsConfigError> {
        let mut comparisons = BTreeMap::new();
        for skill_id in candidates {
            if params.runner_a.has_skill(&skill_id) || !catalog.contains(&skill_id) {
                log::debug!("basin skips skill {skill_id}");
                continue;
            }
            let mut with_skill = params.clone();
            with_skill.runner_b = params.runner_a.with_skill(&skill_id);
            comparisons.insert(skill_id, Comparison::new(with_skill, catalog)?);
        }
        Ok(Self { comparisons })
    }

    /// Every catalog skill the runner lacks.
    ///
    /// # Errors
    ///
    /// Returns `ParamsConfigError` when the base parameters fail validation.
    pub fn for_catalog(
        params: &CompareParams,
        catalog: &SkillCatalog,
    ) -> Result<Self, ParamsConfigError> {
        let ids: Vec<String> = catalog.ids().map(str::to_string).collect();
        Self::new(params, ids, catalog)
    }

    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        self.comparisons.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.comparisons.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.comparisons.is_empty()
    }
}

impl SkillExecutor for SkillBasin {
    fn run_skill(
        &self,
        skill_id: &str,
        run_seed: u64,
        samples: u64,
    ) -> Result<CompareAggregate, TrialFailure> {
        match self.comparisons.get(skill_id) {
            Some(comparison) => comparison.run_range(run_seed, 0..samples),
            None => Ok(CompareAggregate::default()),
        }
    }
}

/// Run every stage, screening candidates after the first two. `on_stage`
/// sees all rows, best mean first, after each stage lands.
///
/// # Errors
///
/// Returns the first trial failure or a pool failure.
pub fn run_skill_basin(
    basin: Arc<SkillBasin>,
    seed: u64,
    batch_size: usize,
    config: &OrchestratorConfig,
    mut on_stage: impl FnMut(usize, &[BasinRow]),
) -> Result<Vec<BasinRow>, OrchestratorError> {
    let mut rows: BTreeMap<String, BasinRow> = basin
        .candidates()
        .map(|id| (id.to_string(), BasinRow::new(id.to_string())))
        .collect();
    let mut active: Vec<String> = rows.keys().cloned().collect();
    let batch_size = batch_size.max(1);

    for (stage, &samples) in BASIN_STAGES.iter().enumerate() {
        if active.is_empty() {
            break;
        }
        let batches: Vec<Vec<String>> = active.chunks(batch_size).map(<[String]>::to_vec).collect();
        let stage_seed = derive_stream_seed(seed, format!("basin-stage:{stage}").as_bytes());
        log::info!(
            "basin stage {}: {} skills x {samples} samples in {} batches",
            stage + 1,
            active.len(),
            batches.len()
        );
        let landed = run_skill_batches(
            Arc::clone(&basin),
            batches,
            samples,
            stage_seed,
            config,
            |batch, results| log::debug!("basin batch {batch} returned {} skills", results.len()),
        )?;
        for SkillSample {
            skill_id,
            aggregate,
        } in landed
        {
            if let Some(row) = rows.get_mut(&skill_id) {
                row.absorb(aggregate);
            }
        }
        active.retain(|id| {
            rows.get_mut(id).is_some_and(|row| {
                row.screen(stage);
                row.filter.is_none()
            })
        });
        on_stage(stage, &ranked(&rows));
    }
    Ok(ranked(&rows))
}

fn ranked(rows: &BTreeMap<String, BasinRow>) -> Vec<BasinRow> {
    let mut ranked: Vec<BasinRow> = rows.values().cloned().collect();
    ranked.sort_by(|a, b| b.mean.total_cmp(&a.mean));
    ranked
}

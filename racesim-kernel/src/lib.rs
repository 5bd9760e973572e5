//! Racesim Kernel
//!
//! Deterministic race simulation: course model, skill engine, position keep
//! and the Monte-Carlo comparison of two runners over many seeded trials.
//! This crate does no I/O; data arrives as JSON strings or parsed structs.

pub mod analytics;
pub mod bashin;
pub mod basin;
pub mod compare;
pub mod course;
pub mod health;
pub mod numbers;
pub mod orchestrator;
pub mod params;
pub mod poskeep;
pub mod race;
pub mod rng;
pub mod runner;
pub mod schedule;
pub mod sim;
pub mod skills;
pub mod strategy;

use std::sync::Arc;

use thiserror::Error;

// Re-export commonly used types
pub use analytics::{ActivationStats, EffectQuery};
pub use bashin::{format_bashin, format_bashin_with_raw};
pub use basin::{BASIN_STAGES, BasinRow, FilterReason, SkillBasin, run_skill_basin};
pub use compare::{
    BASHIN_METRES, CompareAggregate, CompareParams, CompareResult, CompareSummary, Comparison,
    RunTrace, TrialSummary,
};
pub use course::{CourseConfigError, CourseData};
pub use orchestrator::{
    CompletionBarrier, OrchestratorConfig, OrchestratorError, OrchestratorEvent, SkillExecutor,
    TrialExecutor, WorkerMessage, run_comparison, run_skill_batches,
};
pub use params::{
    ParamsConfigError, PositionKeepMode, RaceParameters, Side, SimulationOptions,
};
pub use race::{TrialError, TrialFailure};
pub use rng::{Prng, Rule30Rng, derive_stream_seed, trial_seed};
pub use runner::{RunnerConfig, RunnerConfigError};
pub use schedule::{Checkpoints, schedule};
pub use skills::{CatalogError, SkillCatalog};
pub use strategy::Strategy;

#[cfg(feature = "async")]
pub use orchestrator::run_comparison_async;

const DEFAULT_SCENARIO: &str = include_str!("../data/scenario.json");

/// Source of the skill catalog and scenario a run starts from.
pub trait CatalogLoader {
    type Error: std::error::Error + Send + Sync + 'static;

    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read or a condition fails to compile.
    fn load_skill_catalog(&self) -> Result<SkillCatalog, Self::Error>;

    /// # Errors
    ///
    /// Returns an error if the scenario cannot be read or parsed.
    fn load_scenario(&self) -> Result<CompareParams, Self::Error>;
}

#[derive(Debug, Error)]
pub enum EmbeddedDataError {
    #[error("embedded skill catalog: {0}")]
    Catalog(#[from] CatalogError),
    #[error("embedded scenario: {0}")]
    Scenario(#[from] serde_json::Error),
}

/// Loads the data compiled into this crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedLoader;

impl CatalogLoader for EmbeddedLoader {
    type Error = EmbeddedDataError;

    fn load_skill_catalog(&self) -> Result<SkillCatalog, Self::Error> {
        Ok(SkillCatalog::load_from_static()?)
    }

    fn load_scenario(&self) -> Result<CompareParams, Self::Error> {
        Ok(serde_json::from_str(DEFAULT_SCENARIO)?)
    }
}

/// Entry point tying a data source to the orchestrator.
pub struct RaceEngine<L>
where
    L: CatalogLoader,
{
    loader: L,
}

impl<L> RaceEngine<L>
where
    L: CatalogLoader,
{
    pub const fn new(loader: L) -> Self {
        Self { loader }
    }

    /// # Errors
    ///
    /// Returns an error if the loader cannot produce a scenario.
    pub fn scenario(&self) -> Result<CompareParams, L::Error> {
        self.loader.load_scenario()
    }

    /// Validate `params` against the loader's catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be loaded or the parameters are invalid.
    pub fn prepare(&self, params: CompareParams) -> Result<Comparison, anyhow::Error>
    where
        L::Error: Into<anyhow::Error>,
    {
        let catalog = self.loader.load_skill_catalog().map_err(Into::into)?;
        Ok(Comparison::new(params, &catalog)?)
    }

    /// Run a full comparison and replay its representative runs.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid input, a failed trial or a lost worker.
    pub fn compare(
        &self,
        params: CompareParams,
        config: &OrchestratorConfig,
        on_event: impl FnMut(OrchestratorEvent),
    ) -> Result<CompareResult, anyhow::Error>
    where
        L::Error: Into<anyhow::Error>,
    {
        let comparison = Arc::new(self.prepare(params)?);
        let samples = comparison.samples();
        let seed = comparison.params().seed;
        let aggregate = run_comparison(Arc::clone(&comparison), samples, seed, config, on_event)?;
        Ok(comparison.finalize(&aggregate)?)
    }

    /// Rank candidate skills for the scenario's first runner. `None` tries
    /// every catalog skill the runner lacks.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid input, a failed trial or a lost worker.
    pub fn skill_basin(
        &self,
        params: &CompareParams,
        candidates: Option<Vec<String>>,
        config: &OrchestratorConfig,
        on_stage: impl FnMut(usize, &[BasinRow]),
    ) -> Result<Vec<BasinRow>, anyhow::Error>
    where
        L::Error: Into<anyhow::Error>,
    {
        let catalog = self.loader.load_skill_catalog().map_err(Into::into)?;
        let sweep = match candidates {
            Some(candidates) => SkillBasin::new(params, candidates, &catalog)?,
            None => SkillBasin::for_catalog(params, &catalog)?,
        };
        Ok(run_skill_basin(
            Arc::new(sweep),
            params.seed,
            basin::DEFAULT_BATCH_SIZE,
            config,
            on_stage,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    #[derive(Clone, Default)]
    struct FixtureLoader {
        samples: u32,
    }

    impl CatalogLoader for FixtureLoader {
        type Error = Infallible;

        fn load_skill_catalog(&self) -> Result<SkillCatalog, Self::Error> {
            Ok(SkillCatalog::load_from_static().unwrap())
        }

        fn load_scenario(&self) -> Result<CompareParams, Self::Error> {
            let mut params: CompareParams = serde_json::from_str(DEFAULT_SCENARIO).unwrap();
            params.samples = self.samples;
            Ok(params)
        }
    }

    #[test]
    fn embedded_loader_reads_bundled_data() {
        let loader = EmbeddedLoader;
        assert!(!loader.load_skill_catalog().unwrap().is_empty());
        let scenario = loader.load_scenario().unwrap();
        assert_eq!(scenario.runner_a.name, "Baseline");
    }

    #[test]
    fn engine_compare_reports_every_checkpoint() {
        let engine = RaceEngine::new(FixtureLoader { samples: 30 });
        let params = engine.scenario().unwrap();
        let mut events = Vec::new();
        let result = engine
            .compare(params, &OrchestratorConfig::default(), |e| events.push(e))
            .unwrap();
        assert_eq!(result.summary.samples, 30);
        let progress: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                OrchestratorEvent::Progress {
                    samples_completed, ..
                } => Some(*samples_completed),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![20, 30]);
        assert_eq!(events.last(), Some(&OrchestratorEvent::Complete));
        assert!(result.runs.is_some());
    }

    #[test]
    fn engine_rejects_unknown_skill() {
        let engine = RaceEngine::new(FixtureLoader { samples: 10 });
        let mut params = engine.scenario().unwrap();
        params.runner_b.skills.push("no-such-skill".to_string());
        assert!(engine.prepare(params).is_err());
    }
}

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use colored::Colorize;
use racesim_kernel::{
    ActivationStats, BasinRow, CompareParams, CompareResult, EffectQuery, OrchestratorConfig,
    OrchestratorEvent, RaceEngine, format_bashin_with_raw, run_comparison,
};
use serde::Serialize;

use super::assets::FileLoader;

/// One seeded comparison as it ends up in a report.
#[derive(Debug, Clone, Serialize)]
pub struct CompareRun {
    pub seed: u64,
    pub fingerprint: String,
    pub duration: Duration,
    pub activations: Vec<ActivationStats>,
    pub result: CompareResult,
}

/// One seeded skill basin sweep.
#[derive(Debug, Clone, Serialize)]
pub struct BasinRun {
    pub seed: u64,
    pub duration: Duration,
    pub rows: Vec<BasinRow>,
}

/// Scenario with the CLI overrides applied.
pub struct RunPlan {
    pub base: CompareParams,
    pub samples: Option<u32>,
    pub skills: Vec<String>,
    pub config: OrchestratorConfig,
    pub verbose: bool,
}

impl RunPlan {
    fn params_for(&self, seed: u64) -> CompareParams {
        let mut params = self.base.clone();
        params.seed = seed;
        if let Some(samples) = self.samples {
            params.samples = samples;
        }
        params
    }
}

pub fn run_compare(engine: &RaceEngine<FileLoader>, plan: &RunPlan, seed: u64) -> Result<CompareRun> {
    let params = plan.params_for(seed);
    let fingerprint = format!("{:016x}", params.fingerprint());
    let started = Instant::now();
    let comparison = Arc::new(engine.prepare(params)?);
    let verbose = plan.verbose;
    let aggregate = run_comparison(
        Arc::clone(&comparison),
        comparison.samples(),
        seed,
        &plan.config,
        |event| report_progress(verbose, seed, &event),
    )
    .with_context(|| format!("comparison for seed {seed} failed"))?;
    let activations = EffectQuery::new().summarize(&aggregate);
    let result = comparison
        .finalize(&aggregate)
        .with_context(|| format!("replaying representative runs for seed {seed}"))?;
    Ok(CompareRun {
        seed,
        fingerprint,
        duration: started.elapsed(),
        activations,
        result,
    })
}

pub fn run_basin(engine: &RaceEngine<FileLoader>, plan: &RunPlan, seed: u64) -> Result<BasinRun> {
    let mut params = plan.params_for(seed);
    params.runner_b = params.runner_a.clone();
    let started = Instant::now();
    let verbose = plan.verbose;
    let on_stage = |stage: usize, rows: &[BasinRow]| {
        if verbose {
            let live = rows.iter().filter(|r| r.filter.is_none()).count();
            println!(
                "   {} stage {} done, {live}/{} skills still sampled",
                "↻".cyan(),
                stage + 1,
                rows.len()
            );
        }
    };
    let candidates = (!plan.skills.is_empty()).then(|| plan.skills.clone());
    let rows = engine
        .skill_basin(&params, candidates, &plan.config, on_stage)
        .with_context(|| format!("skill basin for seed {seed} failed"))?;
    Ok(BasinRun {
        seed,
        duration: started.elapsed(),
        rows,
    })
}

fn report_progress(verbose: bool, seed: u64, event: &OrchestratorEvent) {
    match event {
        OrchestratorEvent::Progress {
            samples_completed,
            samples_total,
        } => {
            log::debug!("seed {seed}: {samples_completed}/{samples_total} samples");
            if verbose {
                println!(
                    "   {} seed {seed}: {samples_completed}/{samples_total} samples",
                    "↻".cyan()
                );
            }
        }
        OrchestratorEvent::Result { aggregate } => {
            if verbose {
                let summary = aggregate.summary();
                println!(
                    "   {} seed {seed}: mean {}",
                    "✔".green(),
                    format_bashin_with_raw(summary.mean)
                );
            }
        }
        OrchestratorEvent::Complete => log::debug!("seed {seed}: complete"),
    }
}

mod logic;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use racesim_kernel::{OrchestratorConfig, RaceEngine};
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use logic::{
    FileLoader, RunPlan, RunReport, reports, resolve_seed_inputs, run_basin, run_compare,
    split_csv,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunMode {
    /// Head-to-head comparison of the scenario's two runners
    Compare,
    /// Rank candidate skills for the scenario's first runner
    Basin,
}

#[derive(Debug, Parser)]
#[command(name = "racesim-tester", version)]
#[command(about = "Monte-Carlo race comparisons and skill basin sweeps")]
struct Args {
    /// What to run
    #[arg(long, value_enum, default_value_t = RunMode::Compare)]
    mode: RunMode,

    /// Scenario JSON (defaults to the bundled scenario)
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Skill catalog JSON (defaults to the bundled catalog)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Override the scenario's sample count (compare mode)
    #[arg(long)]
    samples: Option<u32>,

    /// Seeds to run (comma-separated; `scenario` uses the scenario's own seed)
    #[arg(long, default_value = "scenario")]
    seeds: String,

    /// Candidate skills for basin mode (comma-separated; default is the whole catalog)
    #[arg(long, default_value = "")]
    skills: String,

    /// Worker threads
    #[arg(long, default_value_t = 2)]
    workers: usize,

    /// Seconds a worker may stay silent before it is considered lost
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Resubmissions allowed after a lost worker
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console", "csv"])]
    report: String,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Print progress for every checkpoint
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Machine-readable reports on stdout must not be interleaved with chatter.
    fn chatty(&self) -> bool {
        self.output.is_some() || matches!(self.report.as_str(), "console" | "markdown")
    }

    fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            workers: self.workers,
            timeout_secs: self.timeout_secs,
            retries: self.retries,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let chatty = args.chatty();
    if chatty {
        announce_banner();
    }

    let start_time = Instant::now();
    let loader = FileLoader::new(args.scenario.clone(), args.catalog.clone());
    let provenance = loader.provenance()?;
    let engine = RaceEngine::new(loader);
    let base = engine.scenario().context("loading scenario")?;
    let seeds = resolve_seed_inputs(&split_csv(&args.seeds), base.seed)?;
    let config = args.orchestrator_config();
    config.validate().context("invalid worker settings")?;
    let plan = RunPlan {
        base,
        samples: args.samples,
        skills: split_csv(&args.skills),
        config,
        verbose: args.verbose && chatty,
    };

    let report = match args.mode {
        RunMode::Compare => {
            let mut runs = Vec::with_capacity(seeds.len());
            for seed in seeds {
                announce_seed(chatty, "Comparing", seed);
                runs.push(run_compare(&engine, &plan, seed)?);
            }
            RunReport::compare(provenance, runs)
        }
        RunMode::Basin => {
            let mut runs = Vec::with_capacity(seeds.len());
            for seed in seeds {
                announce_seed(chatty, "Sweeping skills", seed);
                runs.push(run_basin(&engine, &plan, seed)?);
            }
            RunReport::basin(provenance, runs)
        }
    };

    write_report(&args, &report, start_time.elapsed())
}

fn announce_banner() {
    println!("{}", "🏇 Racesim Tester".bright_cyan().bold());
    println!("{}", "=================".cyan());
}

fn announce_seed(chatty: bool, action: &str, seed: u64) {
    if chatty {
        println!("{} {action} with seed {}", "▶".bright_yellow(), seed.to_string().bold());
    }
}

fn write_report(args: &Args, report: &RunReport, duration: Duration) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;
    match args.report.as_str() {
        "json" => reports::generate_json_report(&mut output_target, report)?,
        "markdown" => reports::generate_markdown_report(&mut output_target, report)?,
        "csv" => reports::generate_csv_report(&mut output_target, report)?,
        _ => reports::generate_console_report(&mut output_target, report, duration)?,
    }
    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn defaults_parse() {
        let args = Args::parse_from(["racesim-tester"]);
        assert_eq!(args.mode, RunMode::Compare);
        assert_eq!(args.seeds, "scenario");
        assert_eq!(args.orchestrator_config(), OrchestratorConfig::default());
        assert!(args.chatty());
    }

    #[test]
    fn json_to_stdout_is_quiet() {
        let args = Args::parse_from(["racesim-tester", "--report", "json"]);
        assert!(!args.chatty());
        let args = Args::parse_from(["racesim-tester", "--report", "json", "--output", "x.json"]);
        assert!(args.chatty());
    }

    #[test]
    fn unknown_report_is_rejected() {
        assert!(Args::try_parse_from(["racesim-tester", "--report", "yaml"]).is_err());
    }

    #[test]
    fn output_target_writes_file() {
        let path = std::env::temp_dir().join(format!(
            "racesim-output-target-{}",
            std::process::id()
        ));
        let mut target = OutputTarget::new(Some(path.clone())).unwrap();
        writeln!(target, "hello").unwrap();
        target.flush_inner().unwrap();
        drop(target);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
        let _ = std::fs::remove_file(path);
    }
}

use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use racesim_kernel::{FilterReason, format_bashin, format_bashin_with_raw};
use serde::Serialize;

use super::assets::Provenance;
use super::runs::{BasinRun, CompareRun};

/// Everything one CLI invocation produced.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RunReport {
    Compare {
        generated_at: String,
        provenance: Provenance,
        runs: Vec<CompareRun>,
    },
    Basin {
        generated_at: String,
        provenance: Provenance,
        runs: Vec<BasinRun>,
    },
}

impl RunReport {
    #[must_use]
    pub fn compare(provenance: Provenance, runs: Vec<CompareRun>) -> Self {
        Self::Compare {
            generated_at: timestamp(),
            provenance,
            runs,
        }
    }

    #[must_use]
    pub fn basin(provenance: Provenance, runs: Vec<BasinRun>) -> Self {
        Self::Basin {
            generated_at: timestamp(),
            provenance,
            runs,
        }
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

pub fn generate_json_report<W: Write + ?Sized>(writer: &mut W, report: &RunReport) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, report)?;
    writeln!(writer)?;
    Ok(())
}

pub fn generate_markdown_report<W: Write + ?Sized>(
    writer: &mut W,
    report: &RunReport,
) -> Result<()> {
    match report {
        RunReport::Compare { runs, .. } => {
            writeln!(writer, "# Racesim Comparison Results\n")?;
            writeln!(
                writer,
                "| Seed | Samples | Mean | Median | Min | Max | A survives | B survives |"
            )?;
            writeln!(
                writer,
                "|------|---------|------|--------|-----|-----|------------|------------|"
            )?;
            for run in runs {
                let s = &run.result.summary;
                writeln!(
                    writer,
                    "| {} | {} | {:.2} | {:.2} | {:.2} | {:.2} | {:.1}% | {:.1}% |",
                    run.seed,
                    s.samples,
                    s.mean,
                    s.median,
                    s.min,
                    s.max,
                    s.stamina.a.survival_rate,
                    s.stamina.b.survival_rate
                )?;
            }
            for run in runs.iter().filter(|r| !r.activations.is_empty()) {
                writeln!(writer, "\n## Activations, seed {}\n", run.seed)?;
                writeln!(writer, "| Skill | Side | Count | Trials | Mean position |")?;
                writeln!(writer, "|-------|------|-------|--------|---------------|")?;
                for stats in &run.activations {
                    writeln!(
                        writer,
                        "| {} | {:?} | {} | {:.1}% | {:.1} m |",
                        stats.skill_id,
                        stats.side,
                        stats.count,
                        stats.trial_rate,
                        stats.mean_position
                    )?;
                }
            }
        }
        RunReport::Basin { runs, .. } => {
            writeln!(writer, "# Racesim Skill Basin\n")?;
            for run in runs {
                writeln!(writer, "## Seed {}\n", run.seed)?;
                writeln!(writer, "| Skill | Samples | Mean | Median | Min | Max | Filter |")?;
                writeln!(writer, "|-------|---------|------|--------|-----|-----|--------|")?;
                for row in &run.rows {
                    writeln!(
                        writer,
                        "| {} | {} | {:.2} | {:.2} | {:.2} | {:.2} | {} |",
                        row.skill_id,
                        row.samples,
                        row.mean,
                        row.median,
                        row.min,
                        row.max,
                        filter_label(row.filter)
                    )?;
                }
                writeln!(writer)?;
            }
        }
    }
    Ok(())
}

pub fn generate_csv_report<W: Write + ?Sized>(writer: &mut W, report: &RunReport) -> Result<()> {
    match report {
        RunReport::Compare { runs, .. } => {
            writeln!(
                writer,
                "seed,samples,mean,median,min,max,a_survival,b_survival,a_full_spurt,b_full_spurt"
            )?;
            for run in runs {
                let s = &run.result.summary;
                writeln!(
                    writer,
                    "{},{},{:.4},{:.4},{:.4},{:.4},{:.2},{:.2},{:.2},{:.2}",
                    run.seed,
                    s.samples,
                    s.mean,
                    s.median,
                    s.min,
                    s.max,
                    s.stamina.a.survival_rate,
                    s.stamina.b.survival_rate,
                    s.stamina.a.full_spurt_rate,
                    s.stamina.b.full_spurt_rate
                )?;
            }
        }
        RunReport::Basin { runs, .. } => {
            writeln!(writer, "seed,skill_id,samples,mean,median,min,max,filter")?;
            for run in runs {
                for row in &run.rows {
                    writeln!(
                        writer,
                        "{},{},{},{:.4},{:.4},{:.4},{:.4},{}",
                        run.seed,
                        row.skill_id,
                        row.samples,
                        row.mean,
                        row.median,
                        row.min,
                        row.max,
                        filter_label(row.filter)
                    )?;
                }
            }
        }
    }
    Ok(())
}

pub fn generate_console_report<W: Write + ?Sized>(
    writer: &mut W,
    report: &RunReport,
    total_duration: Duration,
) -> Result<()> {
    match report {
        RunReport::Compare { runs, .. } => {
            writeln!(writer)?;
            writeln!(writer, "{}", "📊 Comparison Summary".bright_cyan().bold())?;
            writeln!(writer, "{}", "=====================".cyan())?;
            for run in runs {
                let s = &run.result.summary;
                let leader = if s.mean > 0.0 {
                    "B ahead".green()
                } else if s.mean < 0.0 {
                    "A ahead".yellow()
                } else {
                    "dead heat".normal()
                };
                writeln!(
                    writer,
                    "{} seed {} ({} samples, params {})",
                    "▶".bright_blue(),
                    run.seed.to_string().bold(),
                    s.samples,
                    run.fingerprint
                )?;
                writeln!(
                    writer,
                    "   Mean: {} ({leader})",
                    format_bashin_with_raw(s.mean)
                )?;
                writeln!(writer, "   Median: {}", format_bashin_with_raw(s.median))?;
                writeln!(
                    writer,
                    "   Range: {:.2} to {:.2} ({} to {})",
                    s.min,
                    s.max,
                    format_bashin(s.min),
                    format_bashin(s.max)
                )?;
                writeln!(
                    writer,
                    "   Stamina survival: A {:.1}% / B {:.1}%",
                    s.stamina.a.survival_rate, s.stamina.b.survival_rate
                )?;
                writeln!(
                    writer,
                    "   Leading late race: A {:.1}% / B {:.1}%",
                    s.stamina.a.first_in_late_race_rate, s.stamina.b.first_in_late_race_rate
                )?;
                writeln!(writer, "   Time: {:?}", run.duration)?;
            }
        }
        RunReport::Basin { runs, .. } => {
            writeln!(writer)?;
            writeln!(writer, "{}", "📈 Skill Basin".bright_cyan().bold())?;
            writeln!(writer, "{}", "==============".cyan())?;
            for run in runs {
                writeln!(writer, "{} seed {}", "▶".bright_blue(), run.seed.to_string().bold())?;
                for row in &run.rows {
                    let label = match row.filter {
                        None => format_bashin_with_raw(row.mean).green(),
                        Some(reason) => filter_label(Some(reason)).dimmed(),
                    };
                    writeln!(writer, "   {:>8} {label}", row.skill_id)?;
                }
                writeln!(writer, "   Time: {:?}", run.duration)?;
            }
        }
    }
    writeln!(writer, "Total time: {total_duration:?}")?;
    Ok(())
}

const fn filter_label(filter: Option<FilterReason>) -> &'static str {
    match filter {
        None => "",
        Some(FilterReason::NegligibleEffect) => "negligible-effect",
        Some(FilterReason::LowVariance) => "low-variance",
    }
}

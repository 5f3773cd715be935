use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use ttmwhatif::analysis::{compare, summary};
use ttmwhatif::classify;
use ttmwhatif::config::Config;
use ttmwhatif::whatif::{self, report, Percentile, WhatIfError};

#[derive(Parser)]
#[command(
    name = "ttmwhatif",
    about = "Time-to-Mitigate statistics and event-system what-if analysis",
    version,
    long_about = None
)]
struct Cli {
    /// Configuration file (TOML); otherwise $TTMWHATIF_CONFIG or ./ttmwhatif.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank event systems by their impact on the TTM percentile
    Whatif {
        /// Incident export (CSV)
        #[arg(long)]
        input: PathBuf,

        /// Percentile in (0, 1); overrides the config
        #[arg(long)]
        percentile: Option<f64>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,

        /// Write the report to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Descriptive TTM statistics, severities, services and quintiles
    Summary {
        /// Incident export (CSV)
        #[arg(long)]
        input: PathBuf,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Compare two periods (e.g. this month against last month)
    Compare {
        /// Current period export (CSV)
        #[arg(long)]
        current: PathBuf,

        /// Previous period export (CSV)
        #[arg(long)]
        previous: PathBuf,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Classify root-cause narratives into categories
    Classify {
        /// Incident export (CSV)
        #[arg(long)]
        input: PathBuf,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

fn env_filter(fallback: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback))
}

/// Load the config under a temporary stderr subscriber so its own events
/// (which file was loaded, broken files skipped) are not lost.
fn load_config(path: Option<&Path>, json: bool) -> Result<Config> {
    let load = || match path {
        Some(path) => Config::load(path),
        None => Ok(Config::load_or_default()),
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter("info"))
        .with_writer(std::io::stderr);
    if json {
        tracing::subscriber::with_default(builder.json().finish(), load)
    } else {
        tracing::subscriber::with_default(builder.finish(), load)
    }
}

fn init_tracing(config: &Config, json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(&config.logging.level))
        .with_writer(std::io::stderr);
    if json || config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn emit(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            tracing::info!(path = %path.display(), bytes = text.len(), "report written");
        }
        None => println!("{}", text),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref(), cli.log_json)?;
    init_tracing(&config, cli.log_json);

    match cli.command {
        Commands::Whatif {
            input,
            percentile,
            json,
            output,
        } => {
            let percentile = match percentile {
                Some(p) => Percentile::new(p)?,
                None => config.analysis.percentile()?,
            };
            let table = ttmwhatif::load_table(&input, &config)?;
            let result = whatif::analyze(&table, percentile)?;
            if result.fallbacks > 0 || result.rejected > 0 {
                tracing::warn!(
                    fallbacks = result.fallbacks,
                    rejected = result.rejected,
                    "some rows were excluded or regrouped"
                );
            }
            let text = if json {
                serde_json::to_string_pretty(&result)?
            } else {
                report::render_markdown(&result, &config.report)
            };
            emit(&text, output.as_deref())?;
        }
        Commands::Summary { input, json } => {
            let table = ttmwhatif::load_table(&input, &config)?;
            let s = summary::summarize(&table, &config.analysis, &config.columns).ok_or(WhatIfError::NoData)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&s)?);
            } else {
                println!("\n=== TTM Summary ===");
                println!("Incidents:  {} ({} rows excluded)", s.ttm.count, s.rejected);
                println!("Mean:       {:.0} min", s.ttm.mean);
                println!("Median:     {:.0} min", s.ttm.median);
                println!("P75:        {:.0} min", s.ttm.p75);
                println!("P90:        {:.0} min", s.ttm.p90);
                println!("P95:        {:.0} min", s.ttm.p95);
                println!("Range:      {:.0} - {:.0} min", s.ttm.min, s.ttm.max);

                println!("\n{:<15} | {:>6} | Share", "Severity", "Count");
                println!("{:-<15}-|-{:-<6}-|-{:-<7}", "", "", "");
                for sev in &s.severities {
                    println!("{:<15} | {:>6} | {:.1}%", sev.severity, sev.count, sev.share_pct);
                }

                println!("\n{:<30} | {:>6} | Avg TTM", "Service", "Count");
                println!("{:-<30}-|-{:-<6}-|-{:-<8}", "", "", "");
                for svc in &s.top_services {
                    println!("{:<30} | {:>6} | {:.0} min", svc.service, svc.count, svc.mean_ttm);
                }

                println!("\n{:<8} | {:>6} | {:<17} | Avg TTM", "Quintile", "Count", "Range (min)");
                println!("{:-<8}-|-{:-<6}-|-{:-<17}-|-{:-<8}", "", "", "", "");
                for q in &s.quintiles {
                    let range = format!("{:.0} - {:.0}", q.min, q.max);
                    println!("{:<8} | {:>6} | {:<17} | {:.0} min", q.label, q.count, range, q.mean);
                }

                let avg = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{:.0} min", v));
                println!("\n=== High-Impact Incidents ===");
                println!("Count:      {}", s.high_impact.count);
                println!("Mean TTM:   {}", avg(s.high_impact.mean_ttm));
                println!("Median TTM: {}", avg(s.high_impact.median_ttm));
                if let Some(pir) = &s.pir {
                    println!(
                        "PIRs:       {} of {} complete ({:.1}%)",
                        pir.completed, pir.required, pir.rate_pct
                    );
                }

                if !s.weeks.is_empty() {
                    println!(
                        "\n{:<20} | {:>6} | {:>8} | {:>10} | {:>4} | Top services",
                        "Week", "Count", "Avg TTM", "Median TTM", "High"
                    );
                    println!("{:-<20}-|-{:-<6}-|-{:-<8}-|-{:-<10}-|-{:-<4}-|-{:-<12}", "", "", "", "", "", "");
                    for w in &s.weeks {
                        let services: Vec<&str> = w.top_services.iter().map(|l| l.service.as_str()).collect();
                        println!(
                            "{:<20} | {:>6} | {:>4.0} min | {:>6.0} min | {:>4} | {}",
                            w.label,
                            w.count,
                            w.mean_ttm,
                            w.median_ttm,
                            w.high_severity,
                            services.join(", ")
                        );
                    }
                    if s.undated > 0 {
                        println!("({} incidents without a create date)", s.undated);
                    }
                }
                println!();
            }
        }
        Commands::Compare {
            current,
            previous,
            json,
        } => {
            let percentile = config.analysis.percentile()?;
            let now = ttmwhatif::load_table(&current, &config)?;
            let before = ttmwhatif::load_table(&previous, &config)?;
            let cmp = compare::compare(&now, &before, percentile)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&cmp)?);
            } else {
                let pct = |p: Option<f64>| p.map_or_else(|| "n/a".to_string(), |p| format!("{:+.1}%", p));
                println!("\n=== Period Comparison ===");
                println!(
                    "Incidents:  {:.0} vs {:.0} ({:+.0}, {})",
                    cmp.volume.current,
                    cmp.volume.previous,
                    cmp.volume.delta,
                    pct(cmp.volume.percent)
                );
                println!(
                    "{} TTM:    {:.0} vs {:.0} min ({:+.0} min, {})",
                    percentile.label(),
                    cmp.ttm.current,
                    cmp.ttm.previous,
                    cmp.ttm.delta,
                    pct(cmp.ttm.percent)
                );
                println!(
                    "Mean TTM:   {:.0} vs {:.0} min ({:+.0} min, {})",
                    cmp.mean_ttm.current,
                    cmp.mean_ttm.previous,
                    cmp.mean_ttm.delta,
                    pct(cmp.mean_ttm.percent)
                );
                println!("\n{:<15} | {:>7} | {:>8} | Change", "Severity", "Current", "Previous");
                println!("{:-<15}-|-{:-<7}-|-{:-<8}-|-{:-<6}", "", "", "", "");
                for sev in &cmp.severities {
                    println!(
                        "{:<15} | {:>7} | {:>8} | {:+}",
                        sev.severity, sev.current, sev.previous, sev.delta
                    );
                }
                println!();
            }
        }
        Commands::Classify { input, json } => {
            let table = ttmwhatif::load_table(&input, &config)?;
            if table.is_empty() {
                return Err(WhatIfError::NoData.into());
            }
            let loads = classify::category_breakdown(&table, &config.columns.narratives);
            if json {
                println!("{}", serde_json::to_string_pretty(&loads)?);
            } else {
                println!("\n{:<22} | {:>6} | Avg TTM", "Root Cause", "Count");
                println!("{:-<22}-|-{:-<6}-|-{:-<8}", "", "", "");
                for load in &loads {
                    println!("{:<22} | {:>6} | {:.0} min", load.category, load.count, load.mean_ttm);
                }
                println!();
            }
        }
    }

    Ok(())
}

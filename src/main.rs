use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tarantula::cli::{Cli, Command, OutputFormat};
use tarantula::{demo, IgnoreSet, Outcome, SpectrumEngine, SpectrumReport, TracerConfig};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(path: Option<&Path>) -> Result<TracerConfig> {
    match path {
        Some(path) => TracerConfig::from_toml(path)
            .with_context(|| format!("Failed to load config: {}", path.display())),
        None => Ok(TracerConfig::default()),
    }
}

/// Build an engine from the config file plus `-e` expressions
fn build_engine(cli: &Cli) -> Result<SpectrumEngine> {
    let config = load_config(cli.config.as_deref())?;
    let mut ignore = config
        .ignore_set()
        .context("Invalid [ignore] section in config")?;
    for expr in &cli.ignore {
        let extra = IgnoreSet::from_expr(expr)
            .with_context(|| format!("Invalid ignore expression: {}", expr))?;
        ignore.extend(extra.items().iter().cloned());
    }
    Ok(SpectrumEngine::from_config(&config)?.with_ignore(ignore))
}

fn load_report(path: &Path) -> Result<SpectrumEngine> {
    let report = SpectrumReport::load(path)
        .with_context(|| format!("Failed to read report: {}", path.display()))?;
    Ok(SpectrumEngine::from_report(&report))
}

#[derive(Serialize)]
struct RankedEvent<'a> {
    function: &'a str,
    line: u32,
    suspiciousness: f64,
}

fn print_ranking(engine: &SpectrumEngine, top: Option<usize>, format: OutputFormat) -> Result<()> {
    let ranked = engine.ranked();
    let limit = top.unwrap_or(ranked.len());

    match format {
        OutputFormat::Text => {
            for (event, score) in ranked.iter().take(limit) {
                println!("{:.3}  {}", score, event);
            }
        }
        OutputFormat::Json => {
            let entries: Vec<_> = ranked
                .iter()
                .take(limit)
                .map(|(event, score)| RankedEvent {
                    function: &event.function,
                    line: event.line,
                    suspiciousness: *score,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
    }
    Ok(())
}

fn run_demo(cli: &Cli, output: Option<&Path>, top: Option<usize>) -> Result<()> {
    let mut engine = build_engine(cli)?;

    // Traced faults are data; keep them out of the console
    std::panic::set_hook(Box::new(|info| {
        tracing::debug!("Traced fault: {}", info);
    }));
    let result = demo::run_demo(&mut engine);
    let _ = std::panic::take_hook();
    result.context("Demo run failed")?;

    if let Some(path) = output {
        engine
            .report()
            .save(path)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
    }
    print_ranking(&engine, top, OutputFormat::Text)
}

fn print_events(report: &Path, only: Option<Outcome>) -> Result<()> {
    let engine = load_report(report)?;
    let events = match only {
        Some(Outcome::Fail) => engine.only_fail_events(),
        Some(Outcome::Pass) => engine.only_pass_events(),
        None => engine.all_events(None),
    };
    for event in events {
        println!("{}", event);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match &cli.command {
        Command::Demo { output, top } => run_demo(&cli, output.as_deref(), *top),
        Command::Rank {
            report,
            top,
            format,
        } => {
            let engine = load_report(report)?;
            if engine.run_count(None) == 0 {
                anyhow::bail!("Report contains no runs: {}", report.display());
            }
            print_ranking(&engine, *top, *format)
        }
        Command::Events { report, only } => print_events(report, only.map(Outcome::from)),
    }
}

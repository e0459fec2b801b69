//! RuralReport - draft, review and revise rural development reports
//!
//! CLI entry point.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};

use ruralreport::cli::{Cli, Command, OutputFormat, RequestArgs, RunOverrides, generate_after_help, get_log_path};
use ruralreport::config::Config;
use ruralreport::orchestrator::{Orchestrator, RunReport, SectionOutcome, SectionsReport};
use ruralreport::workflow::Outcome;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Build command with dynamic after_help that shows provider keys and the log path
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(provider = %config.llm.provider, model = %config.llm.model, "RuralReport loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Run {
            request,
            overrides,
            format,
        }) => cmd_run(config, &request, &overrides, format).await,
        Some(Command::Sections {
            request,
            overrides,
            max_concurrent,
            fail_fast,
            max_sections,
            format,
        }) => {
            let mut config = config;
            if let Some(n) = max_concurrent {
                config.sections.max_concurrent = n;
            }
            if let Some(n) = max_sections {
                config.sections.max_sections = n;
            }
            config.sections.fail_fast |= fail_fast;
            cmd_sections(config, &request, &overrides, format).await
        }
        Some(Command::Config) => cmd_config(&config),
        Some(Command::Logs { lines }) => cmd_logs(lines),
        None => {
            Cli::command().after_help(generate_after_help()).print_help()?;
            Ok(())
        }
    }
}

fn build_orchestrator(mut config: Config, overrides: &RunOverrides) -> Result<Orchestrator> {
    overrides.apply(&mut config);
    let base = std::env::current_dir().context("Failed to read current directory")?;
    let orchestrator = Orchestrator::new(config, base);
    Ok(if overrides.no_export {
        orchestrator.with_exporter(None)
    } else {
        orchestrator
    })
}

/// Write one report
async fn cmd_run(config: Config, args: &RequestArgs, overrides: &RunOverrides, format: OutputFormat) -> Result<()> {
    debug!(?args, "cmd_run: called");
    let request = args.to_request()?;
    let orchestrator = build_orchestrator(config, overrides)?;

    let run = match orchestrator.run(&request).await {
        Ok(run) => run,
        Err(e) => {
            eprintln!("{} {:#}", "Report failed:".red().bold(), e);
            return Err(e);
        }
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&run_json(&run))?),
        OutputFormat::Text => print_run(&run),
    }
    Ok(())
}

/// Write every section of a report
async fn cmd_sections(
    config: Config,
    args: &RequestArgs,
    overrides: &RunOverrides,
    format: OutputFormat,
) -> Result<()> {
    debug!(?args, "cmd_sections: called");
    let request = args.to_request()?;
    let orchestrator = build_orchestrator(config, overrides)?;

    let report = match orchestrator.run_sections(&request).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{} {:#}", "Sections failed:".red().bold(), e);
            return Err(e);
        }
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&sections_json(&report))?),
        OutputFormat::Text => print_sections(&report),
    }

    if report.combined.is_none() {
        return Err(eyre::eyre!("No section of {} completed", request.subject_name));
    }
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    print!("{}", serde_yaml::to_string(config).context("Failed to serialize config")?);
    Ok(())
}

/// Show the last N log lines
fn cmd_logs(lines: usize) -> Result<()> {
    debug!(lines, "cmd_logs: called");
    let log_path = get_log_path();

    if !log_path.exists() {
        println!("No log file found at: {}", log_path.display());
        return Ok(());
    }

    let file = fs::File::open(&log_path).context("Failed to open log file")?;
    let all_lines: Vec<String> = BufReader::new(file).lines().map_while(Result::ok).collect();
    let start = all_lines.len().saturating_sub(lines);
    for line in &all_lines[start..] {
        println!("{}", line);
    }
    Ok(())
}

fn outcome_label(outcome: Outcome) -> colored::ColoredString {
    match outcome {
        Outcome::Accepted => "accepted".green().bold(),
        Outcome::LimitReached => "kept at revision limit".yellow().bold(),
    }
}

fn print_run(run: &RunReport) {
    let report = &run.report;
    println!(
        "Report {} after {} review round(s), {} version(s)",
        outcome_label(run.outcome),
        report.review_rounds,
        report.history.len()
    );
    println!("  {:<9} {}", "Subject:".dimmed(), report.subject_name);
    println!("  {:<9} {}", "Model:".dimmed(), report.model);
    println!("  {:<9} {}", "Research:".dimmed(), run.research_notes);
    println!("  {:<9} {}", "Tokens:".dimmed(), run.usage.total());
    if let Some(files) = &run.exported {
        println!("  {:<9} {}", "Report:".dimmed(), files.report.display());
        if let Some(history) = &files.history {
            println!("  {:<9} {}", "History:".dimmed(), history.display());
        }
    }
}

fn print_sections(report: &SectionsReport) {
    println!(
        "{} of {} {}section(s) completed",
        report.completed().to_string().bold(),
        report.sections.len(),
        if report.planned { "planned " } else { "" }
    );
    for section in &report.sections {
        match &section.outcome {
            SectionOutcome::Completed(run) => println!(
                "  {} {} ({}, {} version(s))",
                "\u{2705}",
                section.name,
                outcome_label(run.outcome),
                run.report.history.len()
            ),
            SectionOutcome::Failed(e) => println!("  {} {}: {}", "\u{274C}", section.name, e.red()),
            SectionOutcome::Cancelled => println!("  {} {}: {}", "\u{23F9}", section.name, "cancelled".dimmed()),
        }
    }
    if let Some(files) = &report.exported {
        println!("  {:<9} {}", "Report:".dimmed(), files.report.display());
    }
}

fn exported_path(path: Option<&PathBuf>) -> serde_json::Value {
    path.map(|p| serde_json::Value::String(p.display().to_string()))
        .unwrap_or(serde_json::Value::Null)
}

fn run_json(run: &RunReport) -> serde_json::Value {
    serde_json::json!({
        "run_id": run.report.run_id,
        "subject": run.report.subject_name,
        "model": run.report.model,
        "outcome": run.outcome,
        "accepted": run.report.accepted,
        "review_rounds": run.report.review_rounds,
        "versions": run.report.history.len(),
        "research_notes": run.research_notes,
        "references": run.report.references.len(),
        "usage": run.usage,
        "trace": run.trace,
        "report_path": exported_path(run.exported.as_ref().map(|f| &f.report)),
    })
}

fn sections_json(report: &SectionsReport) -> serde_json::Value {
    let sections: Vec<serde_json::Value> = report
        .sections
        .iter()
        .map(|s| match &s.outcome {
            SectionOutcome::Completed(run) => serde_json::json!({"name": s.name, "status": "completed", "run": run_json(run)}),
            SectionOutcome::Failed(e) => serde_json::json!({"name": s.name, "status": "failed", "error": e}),
            SectionOutcome::Cancelled => serde_json::json!({"name": s.name, "status": "cancelled"}),
        })
        .collect();
    serde_json::json!({
        "run_id": report.run_id,
        "completed": report.completed(),
        "planned": report.planned,
        "usage": report.usage(),
        "accepted": report.combined.as_ref().is_some_and(|c| c.accepted),
        "sections": sections,
        "report_path": exported_path(report.exported.as_ref().map(|f| &f.report)),
    })
}

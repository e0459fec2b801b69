//! CLI command definitions and subcommands

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use eyre::Result;
use tracing::debug;

use crate::config::Config;
use crate::llm::supported_providers;
use crate::orchestrator::ReportRequest;
use crate::retrieval::ReportSource;
use crate::workflow::{LimitPolicy, VerdictMode};

/// RuralReport - draft, review and revise rural development reports
#[derive(Parser)]
#[command(
    name = "rr",
    about = "Draft, review and revise rural development planning reports",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Write one report through the draft-review-revise loop
    Run {
        #[command(flatten)]
        request: RequestArgs,

        #[command(flatten)]
        overrides: RunOverrides,

        /// Output format for the summary
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Write every section of a request in parallel and combine them
    ///
    /// Sections are planned by the model when the request lists none.
    Sections {
        #[command(flatten)]
        request: RequestArgs,

        #[command(flatten)]
        overrides: RunOverrides,

        /// Maximum sections running at once
        #[arg(long)]
        max_concurrent: Option<usize>,

        /// Cancel remaining sections after the first failure
        #[arg(long)]
        fail_fast: bool,

        /// Most sections the model may plan
        #[arg(long)]
        max_sections: Option<usize>,

        /// Output format for the summary
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the effective configuration as YAML
    Config,

    /// Show the log file
    Logs {
        /// Number of lines to show
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,
    },
}

/// Where the report request comes from
#[derive(Debug, Clone, Default, Args)]
pub struct RequestArgs {
    /// Request file (YAML or JSON)
    #[arg(value_name = "REQUEST")]
    pub file: Option<PathBuf>,

    /// Subject of the report (village or township name)
    #[arg(short, long)]
    pub subject: Option<String>,

    /// Research question; derived from the subject when omitted
    #[arg(short, long)]
    pub query: Option<String>,

    /// Review guideline (repeatable; replaces the file's guidelines)
    #[arg(short, long = "guideline")]
    pub guidelines: Vec<String>,

    /// Model as provider:model or a bare model name
    #[arg(short, long)]
    pub model: Option<String>,

    /// Research source (web, docs, hybrid, none)
    #[arg(long)]
    pub source: Option<ReportSource>,

    /// Source page to scrape (repeatable)
    #[arg(short = 'u', long = "url")]
    pub urls: Vec<String>,
}

impl RequestArgs {
    /// Load the request file, if any, and apply the flags on top
    pub fn to_request(&self) -> Result<ReportRequest> {
        debug!(file = ?self.file, "RequestArgs::to_request: called");
        let mut request = match &self.file {
            Some(path) => ReportRequest::load(path)?,
            None => ReportRequest::default(),
        };

        if let Some(subject) = &self.subject {
            request.subject_name = subject.clone();
        }
        if let Some(query) = &self.query {
            request.query = Some(query.clone());
        }
        if !self.guidelines.is_empty() {
            request.guidelines = self.guidelines.clone();
        }
        if let Some(model) = &self.model {
            request.model = Some(model.clone());
        }
        if let Some(source) = self.source {
            request.source = Some(source);
        }
        request.source_urls.extend(self.urls.iter().cloned());
        Ok(request)
    }
}

/// Per-invocation config overrides
#[derive(Debug, Clone, Default, Args)]
pub struct RunOverrides {
    /// Maximum revisions before the limit policy applies
    #[arg(long)]
    pub max_revisions: Option<u32>,

    /// What to do at the revision limit (fail, accept-with-warning)
    #[arg(long, value_parser = parse_limit_policy)]
    pub on_limit: Option<LimitPolicy>,

    /// Reviewer verdict format (structured, marker)
    #[arg(long, value_parser = parse_verdict_mode)]
    pub verdict: Option<VerdictMode>,

    /// Attempts per stage for retryable generation errors
    #[arg(long)]
    pub stage_attempts: Option<u32>,

    /// Wall-clock limit for a run in seconds (0 = none)
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Directory for exported reports
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Skip writing report files
    #[arg(long)]
    pub no_export: bool,
}

impl RunOverrides {
    pub fn apply(&self, config: &mut Config) {
        debug!(?self, "RunOverrides::apply: called");
        if let Some(n) = self.max_revisions {
            config.workflow.max_revisions = n;
        }
        if let Some(policy) = self.on_limit {
            config.workflow.on_limit = policy;
        }
        if let Some(mode) = self.verdict {
            config.workflow.verdict = mode;
        }
        if let Some(n) = self.stage_attempts {
            config.workflow.stage_attempts = n;
        }
        if let Some(secs) = self.timeout_secs {
            config.workflow.run_timeout_secs = secs;
        }
        if let Some(dir) = &self.output_dir {
            config.export.output_dir = dir.clone();
        }
    }
}

fn parse_limit_policy(s: &str) -> Result<LimitPolicy, String> {
    serde_yaml::from_str(s).map_err(|_| format!("Unknown limit policy: {}. Use: fail, accept-with-warning", s))
}

fn parse_verdict_mode(s: &str) -> Result<VerdictMode, String> {
    serde_yaml::from_str(s).map_err(|_| format!("Unknown verdict mode: {}. Use: structured, marker", s))
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ruralreport")
        .join("logs")
        .join("ruralreport.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Generate the after_help text with provider key checks and the log path
pub fn generate_after_help() -> String {
    debug!("generate_after_help: called");
    let mut help = String::new();

    help.push_str("Providers:\n");
    for name in supported_providers() {
        let env = crate::llm::provider_defaults(name).map(|d| d.api_key_env).unwrap_or_default();
        let icon = if std::env::var(env).is_ok_and(|v| !v.trim().is_empty()) {
            "\u{2705}"
        } else {
            "\u{274C}"
        };
        help.push_str(&format!("  {} {:<10} {}\n", icon, name, env));
    }

    help.push('\n');
    help.push_str(&format!("Logs are written to: {}\n", get_log_path().display()));
    help
}

/// Output format for run summaries
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_command() {
        let cli = Cli::parse_from(["rr"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parse_run_flags() {
        let cli = Cli::parse_from([
            "rr",
            "-l",
            "debug",
            "run",
            "--subject",
            "Village X",
            "-g",
            "Covers roads",
            "-g",
            "Cites sources",
            "--model",
            "deepseek:deepseek-chat",
            "--source",
            "hybrid",
            "--max-revisions",
            "2",
            "--on-limit",
            "accept-with-warning",
            "--verdict",
            "marker",
            "--format",
            "json",
        ]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        let Some(Command::Run {
            request,
            overrides,
            format,
        }) = cli.command
        else {
            panic!("expected run command");
        };
        assert_eq!(request.subject.as_deref(), Some("Village X"));
        assert_eq!(request.guidelines.len(), 2);
        assert_eq!(request.source, Some(ReportSource::Hybrid));
        assert_eq!(overrides.max_revisions, Some(2));
        assert_eq!(overrides.on_limit, Some(LimitPolicy::AcceptWithWarning));
        assert_eq!(overrides.verdict, Some(VerdictMode::Marker));
        assert_eq!(format, OutputFormat::Json);
    }

    #[test]
    fn test_cli_parse_sections() {
        let cli = Cli::parse_from([
            "rr",
            "sections",
            "req.yml",
            "--fail-fast",
            "--max-concurrent",
            "3",
            "--max-sections",
            "4",
        ]);
        assert!(matches!(
            cli.command,
            Some(Command::Sections {
                fail_fast: true,
                max_concurrent: Some(3),
                max_sections: Some(4),
                ..
            })
        ));
    }

    #[test]
    fn test_cli_rejects_bad_policy() {
        assert!(Cli::try_parse_from(["rr", "run", "--on-limit", "maybe"]).is_err());
    }

    #[test]
    fn test_request_args_override_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("req.yml");
        std::fs::write(&path, "subject-name: From File\nguidelines: [a]\nsource-urls: [http://a]\n").unwrap();

        let args = RequestArgs {
            file: Some(path),
            subject: Some("From Flag".to_string()),
            urls: vec!["http://b".to_string()],
            ..Default::default()
        };
        let request = args.to_request().unwrap();
        assert_eq!(request.subject_name, "From Flag");
        assert_eq!(request.guidelines, vec!["a"]);
        assert_eq!(request.source_urls, vec!["http://a", "http://b"]);
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = Config::default();
        RunOverrides {
            max_revisions: Some(1),
            timeout_secs: Some(0),
            output_dir: Some(PathBuf::from("out")),
            ..Default::default()
        }
        .apply(&mut config);
        assert_eq!(config.workflow.max_revisions, 1);
        assert_eq!(config.workflow.run_timeout(), None);
        assert_eq!(config.export.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("table".parse::<OutputFormat>().is_err());
    }
}

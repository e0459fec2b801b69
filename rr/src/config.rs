//! RuralReport configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::{FrameworkCategory, default_framework};
use crate::llm::{DEFAULT_PROVIDER, ModelSelection, provider_defaults};
use crate::retrieval::ReportSource;
use crate::workflow::{EngineConfig, LimitPolicy, StageRetry, VerdictMode};

/// Local config file name, looked up in the working directory
pub const LOCAL_CONFIG: &str = ".ruralreport.yml";

/// Configuration errors surfaced before any run starts
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("API key not found. Set the {0} environment variable.")]
    MissingApiKey(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main RuralReport configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level used when `--log-level` is not given
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Text-generation provider
    pub llm: LlmConfig,

    /// Review loop limits and retry policy
    pub workflow: WorkflowConfig,

    /// Dimensions the first draft is structured by
    pub analysis: AnalysisConfig,

    /// Research backends
    pub retrieval: RetrievalConfig,

    /// Report output
    pub export: ExportConfig,

    /// Parallel section runs
    pub sections: SectionsConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .ruralreport.yml
        let local_config = PathBuf::from(LOCAL_CONFIG);
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/ruralreport/ruralreport.yml
        if let Some(user_config) = Self::user_config_path()
            && user_config.exists()
        {
            match Self::load_from_file(&user_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read just the log level, before logging is set up
    ///
    /// Errors are swallowed; the full load reports them once logging works.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates: Vec<PathBuf> = match config_path {
            Some(path) => vec![path.clone()],
            None => std::iter::once(PathBuf::from(LOCAL_CONFIG))
                .chain(Self::user_config_path())
                .collect(),
        };
        candidates
            .into_iter()
            .find(|p| p.exists())
            .and_then(|p| fs::read_to_string(p).ok())
            .and_then(|content| serde_yaml::from_str::<Self>(&content).ok())
            .and_then(|config| config.log_level)
    }

    /// `~/.config/ruralreport/ruralreport.yml`
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("ruralreport").join("ruralreport.yml"))
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (openai, deepseek, dashscope, zhipu)
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key (provider default when unset)
    #[serde(rename = "api-key-env", skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// API base URL (provider default when unset)
    #[serde(rename = "base-url", skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: None,
            base_url: None,
            max_tokens: 8192,
            timeout_ms: 300_000,
        }
    }
}

impl LlmConfig {
    /// The model selection this config describes
    pub fn selection(&self) -> ModelSelection {
        ModelSelection::new(&self.provider, &self.model)
    }

    /// Resolve endpoint and key variable for a run
    ///
    /// A per-request selection overrides the configured provider and model.
    /// Explicit `base-url`/`api-key-env` only apply to the configured provider;
    /// any other provider falls back to its built-in defaults.
    pub fn resolve(&self, selection: Option<&ModelSelection>) -> Result<ResolvedLlmConfig, ConfigError> {
        let selection = selection.cloned().unwrap_or_else(|| self.selection());
        debug!(%selection, "LlmConfig::resolve: called");

        let defaults = provider_defaults(&selection.provider)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown LLM provider '{}'", selection.provider)))?;
        let same_provider = selection.provider.eq_ignore_ascii_case(&self.provider);

        let base_url = self
            .base_url
            .clone()
            .filter(|_| same_provider)
            .unwrap_or_else(|| defaults.base_url.to_string());
        let api_key_env = self
            .api_key_env
            .clone()
            .filter(|_| same_provider)
            .unwrap_or_else(|| defaults.api_key_env.to_string());

        Ok(ResolvedLlmConfig {
            provider: selection.provider,
            model: selection.model,
            api_key_env,
            base_url,
            max_tokens: self.max_tokens,
            timeout_ms: self.timeout_ms,
        })
    }
}

/// Fully resolved settings for one client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

impl ResolvedLlmConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey(self.api_key_env.clone()))
    }
}

/// Review loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Maximum number of revisions before `on-limit` applies
    #[serde(rename = "max-revisions")]
    pub max_revisions: u32,

    /// `fail` or `accept-with-warning`
    #[serde(rename = "on-limit")]
    pub on_limit: LimitPolicy,

    /// `structured` or `marker`
    pub verdict: VerdictMode,

    /// Attempts per stage for retryable generation errors (1 = no retry)
    #[serde(rename = "stage-attempts")]
    pub stage_attempts: u32,

    /// Base backoff between stage attempts
    #[serde(rename = "retry-backoff-ms")]
    pub retry_backoff_ms: u64,

    /// Wall-clock limit for a whole run (0 = none)
    #[serde(rename = "run-timeout-secs")]
    pub run_timeout_secs: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_revisions: 5,
            on_limit: LimitPolicy::Fail,
            verdict: VerdictMode::Structured,
            stage_attempts: 1,
            retry_backoff_ms: 2000,
            run_timeout_secs: 1800,
        }
    }
}

impl WorkflowConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_revisions: self.max_revisions,
            on_limit: self.on_limit,
            retry: StageRetry::new(self.stage_attempts, Duration::from_millis(self.retry_backoff_ms)),
        }
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        (self.run_timeout_secs > 0).then(|| Duration::from_secs(self.run_timeout_secs))
    }
}

/// Research backends
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Default source when the request does not pick one
    pub source: ReportSource,

    pub tavily: TavilyConfig,

    #[serde(rename = "knowledge-base")]
    pub knowledge_base: KnowledgeBaseConfig,

    pub scrape: ScrapeConfig,
}

/// Tavily web search
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TavilyConfig {
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    #[serde(rename = "base-url")]
    pub base_url: String,

    #[serde(rename = "max-results")]
    pub max_results: u32,

    /// `basic` or `advanced`
    #[serde(rename = "search-depth")]
    pub search_depth: String,

    #[serde(rename = "include-domains")]
    pub include_domains: Vec<String>,

    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for TavilyConfig {
    fn default() -> Self {
        Self {
            api_key_env: "TAVILY_API_KEY".to_string(),
            base_url: "https://api.tavily.com".to_string(),
            max_results: 5,
            search_depth: "advanced".to_string(),
            include_domains: Vec::new(),
            timeout_ms: 30_000,
        }
    }
}

/// RAGFlow knowledge base
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeBaseConfig {
    #[serde(rename = "base-url")]
    pub base_url: String,

    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// Datasets to search; every dataset when empty
    #[serde(rename = "dataset-ids")]
    pub dataset_ids: Vec<String>,

    #[serde(rename = "document-ids")]
    pub document_ids: Vec<String>,

    #[serde(rename = "top-k")]
    pub top_k: u32,

    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9380".to_string(),
            api_key_env: "RAGFLOW_API_KEY".to_string(),
            dataset_ids: Vec::new(),
            document_ids: Vec::new(),
            top_k: 8,
            timeout_ms: 30_000,
        }
    }
}

/// Source URL scraping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Pages with fewer characters after conversion are dropped
    #[serde(rename = "min-chars")]
    pub min_chars: usize,

    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            min_chars: 100,
            timeout_ms: 15_000,
        }
    }
}

/// Analysis framework
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Categories and the points under each; a request's own framework wins
    pub framework: Vec<FrameworkCategory>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            framework: default_framework(),
        }
    }
}

/// Report output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    #[serde(rename = "output-dir")]
    pub output_dir: PathBuf,

    /// Also write `{stem}.history.json` with every version
    #[serde(rename = "write-history")]
    pub write_history: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("reports"),
            write_history: true,
        }
    }
}

/// Parallel section runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionsConfig {
    /// Maximum sections running at once
    #[serde(rename = "max-concurrent")]
    pub max_concurrent: usize,

    /// Abort the remaining sections after the first failure
    #[serde(rename = "fail-fast")]
    pub fail_fast: bool,

    /// Upper bound on sections when the model plans them
    #[serde(rename = "max-sections")]
    pub max_sections: usize,
}

impl Default for SectionsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            fail_fast: false,
            max_sections: 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.workflow.max_revisions, 5);
        assert_eq!(config.workflow.on_limit, LimitPolicy::Fail);
        assert_eq!(config.workflow.stage_attempts, 1);
        assert_eq!(config.retrieval.source, ReportSource::None);
        assert_eq!(config.sections.max_concurrent, 4);
        assert!(!config.sections.fail_fast);
        assert_eq!(config.sections.max_sections, 6);
        assert_eq!(config.analysis.framework, default_framework());
    }

    #[test]
    fn test_deserialize_analysis_framework() {
        let yaml = r#"
analysis:
  framework:
    - name: Agriculture
      items: [grain output, irrigation]
    - name: Tourism
sections:
  max-sections: 3
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.analysis.framework,
            vec![
                FrameworkCategory::new("Agriculture", &["grain output", "irrigation"]),
                FrameworkCategory::new("Tourism", &[]),
            ]
        );
        assert_eq!(config.sections.max_sections, 3);
        assert_eq!(config.sections.max_concurrent, 4);
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
log-level: debug
llm:
  provider: deepseek
  model: deepseek-chat
  max-tokens: 4096
workflow:
  max-revisions: 2
  on-limit: accept-with-warning
  verdict: marker
  stage-attempts: 3
  run-timeout-secs: 0
retrieval:
  source: hybrid
  tavily:
    max-results: 3
    include-domains: [gov.cn]
  knowledge-base:
    dataset-ids: [ds1]
export:
  output-dir: out
sections:
  max-concurrent: 2
  fail-fast: true
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.llm.provider, "deepseek");
        assert_eq!(config.llm.max_tokens, 4096);
        assert_eq!(config.workflow.max_revisions, 2);
        assert_eq!(config.workflow.on_limit, LimitPolicy::AcceptWithWarning);
        assert_eq!(config.workflow.verdict, VerdictMode::Marker);
        assert_eq!(config.workflow.run_timeout(), None);
        assert_eq!(config.retrieval.source, ReportSource::Hybrid);
        assert_eq!(config.retrieval.tavily.max_results, 3);
        assert_eq!(config.retrieval.tavily.include_domains, vec!["gov.cn"]);
        assert_eq!(config.retrieval.knowledge_base.dataset_ids, vec!["ds1"]);
        assert_eq!(config.export.output_dir, PathBuf::from("out"));
        assert!(config.sections.fail_fast);

        let engine = config.workflow.engine_config();
        assert_eq!(engine.retry.max_attempts, 3);
        assert_eq!(engine.max_revisions, 2);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
llm:
  model: gpt-4o-mini
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.workflow.verdict, VerdictMode::Structured);
        assert_eq!(config.export.output_dir, PathBuf::from("reports"));
    }

    #[test]
    fn test_resolve_uses_provider_defaults() {
        let resolved = LlmConfig::default().resolve(None).unwrap();
        assert_eq!(resolved.provider, "openai");
        assert_eq!(resolved.base_url, "https://api.openai.com/v1");
        assert_eq!(resolved.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn test_resolve_overrides_only_apply_to_configured_provider() {
        let config = LlmConfig {
            base_url: Some("http://proxy.local/v1".to_string()),
            api_key_env: Some("PROXY_KEY".to_string()),
            ..Default::default()
        };

        let same = config.resolve(None).unwrap();
        assert_eq!(same.base_url, "http://proxy.local/v1");
        assert_eq!(same.api_key_env, "PROXY_KEY");

        let other = config
            .resolve(Some(&ModelSelection::new("deepseek", "deepseek-chat")))
            .unwrap();
        assert_eq!(other.base_url, "https://api.deepseek.com/v1");
        assert_eq!(other.api_key_env, "DEEPSEEK_API_KEY");
        assert_eq!(other.model, "deepseek-chat");
    }

    #[test]
    fn test_resolve_unknown_provider() {
        let err = LlmConfig::default()
            .resolve(Some(&ModelSelection::new("nope", "m")))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    #[serial]
    fn test_get_api_key() {
        let resolved = ResolvedLlmConfig {
            provider: "openai".to_string(),
            model: "m".to_string(),
            api_key_env: "RR_TEST_CONFIG_KEY".to_string(),
            base_url: "http://x".to_string(),
            max_tokens: 1,
            timeout_ms: 1,
        };

        unsafe { std::env::remove_var("RR_TEST_CONFIG_KEY") };
        assert!(matches!(resolved.get_api_key(), Err(ConfigError::MissingApiKey(_))));

        unsafe { std::env::set_var("RR_TEST_CONFIG_KEY", "sk-test") };
        assert_eq!(resolved.get_api_key().unwrap(), "sk-test");
        unsafe { std::env::remove_var("RR_TEST_CONFIG_KEY") };
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rr.yml");
        std::fs::write(&path, "log-level: warn\nworkflow:\n  max-revisions: 7\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.workflow.max_revisions, 7);
        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("warn"));
    }

    #[test]
    fn test_load_explicit_path_missing_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing.yml");
        assert!(Config::load(Some(&path)).is_err());
        assert_eq!(Config::load_log_level(Some(&path)), None);
    }
}

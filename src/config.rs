use anyhow::{Context, Result};
use decision_twin_core::chunk::validate_window;
use decision_twin_core::judge::DEFAULT_PARSE_ATTEMPTS;
use decision_twin_core::spec::DecisionTwinSpec;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub twin: DecisionTwinSpec,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_collection() -> String {
    "decision_twin_kb".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Window size in characters.
    #[serde(default = "default_chunk_size")]
    pub size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: default_chunk_size(),
            overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1500
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embed_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Delay enforced between successful batches.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Override the provider's base URL.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_embed_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            pacing_ms: default_pacing_ms(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    10
}
fn default_embed_max_retries() -> u32 {
    8
}
fn default_initial_backoff_ms() -> u64 {
    4000
}
fn default_max_backoff_ms() -> u64 {
    120_000
}
fn default_pacing_ms() -> u64 {
    8000
}
fn default_timeout_secs() -> u64 {
    60
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_gen_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            max_retries: default_gen_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            timeout_secs: default_timeout_secs(),
            temperature: None,
            url: None,
        }
    }
}

fn default_gen_max_retries() -> u32 {
    6
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct JudgeConfig {
    /// Falls back to `generation.model`.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_judge_max_retries")]
    pub max_retries: u32,
    /// Judge requests per answer while replies fail to parse.
    #[serde(default = "default_judge_parse_attempts")]
    pub parse_attempts: u32,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_retries: default_judge_max_retries(),
            parse_attempts: default_judge_parse_attempts(),
        }
    }
}

fn default_judge_max_retries() -> u32 {
    3
}

fn default_judge_parse_attempts() -> u32 {
    DEFAULT_PARSE_ATTEMPTS
}

#[derive(Debug, Deserialize, Clone)]
pub struct EvaluationConfig {
    /// Delay between successive generation calls.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    #[serde(default = "default_queries")]
    pub queries: Vec<String>,
    #[serde(default = "default_results_path")]
    pub results_path: PathBuf,
    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            pacing_ms: default_pacing_ms(),
            queries: default_queries(),
            results_path: default_results_path(),
            report_path: default_report_path(),
        }
    }
}

fn default_results_path() -> PathBuf {
    PathBuf::from("./data/eval_results.json")
}
fn default_report_path() -> PathBuf {
    PathBuf::from("./data/eval_report.md")
}

fn default_queries() -> Vec<String> {
    [
        "A cohort has declining weekly engagement and a 10-day inactivity gap. Budget is limited. What should we do next?",
        "New users are dropping off after the first session. Onboarding completion rate is only 30%. What retention action should we take?",
        "Power users who previously logged in daily have reduced usage to once a week over the past month. What do you recommend?",
        "We're seeing high churn among users who signed up during a promotional campaign. Many never used the core feature. What should we do?",
        "A cohort of users hasn't opened the app in 30 days but they have high lifetime value. Budget is available. What's the best action?",
        "Users are engaging with content but not converting to paid plans. Trial-to-paid rate is 5%. What retention approach works here?",
        "A segment of users complains frequently in support tickets but keeps using the product. Engagement is stable. What should we do?",
        "First-week retention is 60% but drops to 20% by week four. We don't know which features correlate with retention. What's the move?",
        "Push notification open rates have dropped 40% over 3 months for our most active cohort. What should we change?",
        "Users in a specific geography are churning at 2x the global rate. We have localized content but limited local support. Recommendations?",
        "A B2B SaaS cohort has low feature adoption across 3 key modules. Account managers report confusion during onboarding. What action?",
        "Seasonal users return every December but churn by February. We want to extend their lifecycle. What's the strategy?",
        "Free tier users who hit usage limits either churn or upgrade. 70% churn. How should we intervene before they hit the wall?",
        "Our reactivation emails have a 2% conversion rate. A cohort of 50k lapsed users hasn't engaged in 60+ days. Worth re-engaging?",
        "We launched a new feature but adoption is only 8% after 2 weeks. Existing users seem unaware of it. What should we do?",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub web_urls: Vec<String>,
    /// YouTube video ids.
    #[serde(default)]
    pub video_ids: Vec<String>,
    #[serde(default)]
    pub local: Option<LocalSourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocalSourceConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Model used by the judge: `judge.model`, else `generation.model`.
    pub fn judge_model(&self) -> Option<&str> {
        self.judge
            .model
            .as_deref()
            .or(self.generation.model.as_deref())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    validate_window(config.chunking.size, config.chunking.overlap)?;

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.db.collection.trim().is_empty() {
        anyhow::bail!("db.collection must not be empty");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "gemini" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or gemini.",
            other
        ),
    }

    match config.generation.provider.as_str() {
        "disabled" | "openai" | "gemini" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled, openai, or gemini.",
            other
        ),
    }
    if config.generation.is_enabled() && config.generation.model.is_none() {
        anyhow::bail!(
            "generation.model must be specified when provider is '{}'",
            config.generation.provider
        );
    }

    for (name, retries) in [
        ("embedding", config.embedding.max_retries),
        ("generation", config.generation.max_retries),
        ("judge", config.judge.max_retries),
    ] {
        if retries == 0 {
            anyhow::bail!("{}.max_retries must be >= 1", name);
        }
    }

    config.twin.validate()?;

    if config.evaluation.queries.is_empty() {
        anyhow::bail!("evaluation.queries must not be empty");
    }

    crate::logging::parse_log_level(&config.logging.level)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let c = parse("[db]\npath = \"./data/twin.sqlite\"\n").unwrap();
        assert_eq!(c.chunking.size, 1500);
        assert_eq!(c.chunking.overlap, 200);
        assert_eq!(c.retrieval.top_k, 5);
        assert_eq!(c.embedding.batch_size, 10);
        assert_eq!(c.embedding.max_retries, 8);
        assert_eq!(c.generation.max_retries, 6);
        assert_eq!(c.judge.max_retries, 3);
        assert_eq!(c.evaluation.queries.len(), 15);
        assert_eq!(c.twin.inert_action, "Do nothing");
        assert_eq!(c.db.collection, "decision_twin_kb");
    }

    #[test]
    fn test_overlap_must_be_below_size() {
        let err = parse("[db]\npath = \"x\"\n[chunking]\nsize = 100\noverlap = 100\n").unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_enabled_embedding_needs_model_and_dims() {
        assert!(parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"gemini\"\n").is_err());
        let ok = parse(
            "[db]\npath = \"x\"\n[embedding]\nprovider = \"gemini\"\nmodel = \"text-embedding-004\"\ndims = 768\n",
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        assert!(parse("[db]\npath = \"x\"\n[generation]\nprovider = \"bard\"\nmodel = \"m\"\n").is_err());
    }

    #[test]
    fn test_judge_model_falls_back_to_generation() {
        let c = parse(
            "[db]\npath = \"x\"\n[generation]\nprovider = \"openai\"\nmodel = \"gpt-4o-mini\"\n",
        )
        .unwrap();
        assert_eq!(c.judge_model(), Some("gpt-4o-mini"));
    }

    #[test]
    fn test_twin_section_overrides_defaults() {
        let c = parse(
            "[db]\npath = \"x\"\n[twin]\nrole = \"Support Lead\"\nactions = [\"Wait\", \"Call\"]\ninert_action = \"Wait\"\n",
        )
        .unwrap();
        assert_eq!(c.twin.role, "Support Lead");
        assert_eq!(c.twin.actions.len(), 2);

        let bad = parse("[db]\npath = \"x\"\n[twin]\nactions = [\"Call\"]\n");
        assert!(bad.is_err());
    }
}

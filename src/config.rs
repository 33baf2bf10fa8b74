use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dimension::KeywordSets;
use crate::model::{default_companies, Company};

const DEFAULT_CONFIG: &str = "intel";
const ENV_PREFIX: &str = "INTEL";
const MAX_RETRIES: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub fetch: FetchSettings,
    pub scoring: ScoringSettings,
    pub llm: LlmSettings,
    pub report: ReportSettings,
    pub server: ServerSettings,
    pub companies: Vec<Company>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database: DatabaseSettings::default(),
            fetch: FetchSettings::default(),
            scoring: ScoringSettings::default(),
            llm: LlmSettings::default(),
            report: ReportSettings::default(),
            server: ServerSettings::default(),
            companies: default_companies(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: PathBuf::from("data/intel.sqlite"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub concurrency: usize,
    /// Pause after each request, per worker.
    pub delay_ms: u64,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        FetchSettings {
            user_agent: concat!(
                "Mozilla/5.0 (compatible; competitor_intel/",
                env!("CARGO_PKG_VERSION"),
                ")"
            )
            .to_string(),
            timeout_secs: 20,
            concurrency: 4,
            delay_ms: 1000,
            max_retries: 3,
            base_backoff_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    /// Items below this relevance (0..1) are not stored.
    pub min_relevance: f64,
    /// Stored `raw_text` is cut to this many characters.
    pub max_text_chars: usize,
    /// Whole-set keyword replacements, keyed by dimension name.
    pub keywords: HashMap<String, Vec<String>>,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        ScoringSettings {
            min_relevance: 0.0,
            max_text_chars: 4000,
            keywords: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    /// Empty means the provider's default model.
    pub model: String,
    /// Falls back to OPENAI_API_KEY / ANTHROPIC_API_KEY.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        LlmSettings {
            provider: LlmProvider::OpenAi,
            model: String::new(),
            api_key: None,
            base_url: None,
            max_tokens: 800,
            temperature: 0.3,
            timeout_secs: 30,
            max_retries: 2,
            base_backoff_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// Markdown copies of reports are written here when set.
    pub output_dir: Option<PathBuf>,
    pub top_sources: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        ReportSettings {
            output_dir: Some(PathBuf::from("reports")),
            top_sources: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Settings {
    /// Defaults, then `intel.toml` (or `path`), then `INTEL_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Settings> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG).required(false),
        };
        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        Ok(settings.normalized())
    }

    fn normalized(mut self) -> Self {
        if self.fetch.concurrency == 0 {
            warn!("fetch.concurrency must be at least 1; using 1");
            self.fetch.concurrency = 1;
        }
        if self.fetch.max_retries > MAX_RETRIES {
            warn!("fetch.max_retries {} too high; using {}", self.fetch.max_retries, MAX_RETRIES);
            self.fetch.max_retries = MAX_RETRIES;
        }
        if self.llm.max_retries > MAX_RETRIES {
            warn!("llm.max_retries {} too high; using {}", self.llm.max_retries, MAX_RETRIES);
            self.llm.max_retries = MAX_RETRIES;
        }
        if !(0.0..=1.0).contains(&self.scoring.min_relevance) {
            warn!(
                "scoring.min_relevance {} outside [0, 1]; clamping",
                self.scoring.min_relevance
            );
            self.scoring.min_relevance = self.scoring.min_relevance.clamp(0.0, 1.0);
        }
        self
    }

    pub fn keyword_sets(&self) -> KeywordSets {
        KeywordSets::with_overrides(&self.scoring.keywords)
    }

    /// Look up a company by slug or display name, ignoring case.
    pub fn company(&self, key: &str) -> Option<&Company> {
        self.companies
            .iter()
            .find(|c| c.slug.eq_ignore_ascii_case(key) || c.name.eq_ignore_ascii_case(key))
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_file() {
        let s = Settings::default();
        assert_eq!(s.fetch.concurrency, 4);
        assert_eq!(s.fetch.timeout_secs, 20);
        assert_eq!(s.llm.provider, LlmProvider::OpenAi);
        assert!(!s.companies.is_empty());
        assert!(s.company("AIRTABLE").is_some());
        assert!(s.company("Airtable").is_some());
        assert!(s.company("lotus-123").is_none());
    }

    #[test]
    fn file_overrides_and_normalizes() {
        let mut f = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            f,
            r#"
[fetch]
concurrency = 0
delay_ms = 0
max_retries = 64

[scoring]
min_relevance = 2.5

[scoring.keywords]
pricing_model = ["pricing", "seat"]

[llm]
provider = "anthropic"
model = "claude-test"
max_retries = 1

[[companies]]
name = "Grist"
slug = "grist"
sources = [{{ url = "https://www.getgrist.com/", kind = "page" }}]
"#
        )
        .unwrap();

        let s = Settings::load(Some(f.path())).unwrap();
        assert_eq!(s.fetch.concurrency, 1);
        assert_eq!(s.fetch.delay_ms, 0);
        assert_eq!(s.fetch.max_retries, MAX_RETRIES);
        assert_eq!(s.llm.max_retries, 1);
        assert_eq!(s.scoring.min_relevance, 1.0);
        assert_eq!(s.llm.provider, LlmProvider::Anthropic);
        assert_eq!(s.llm.model, "claude-test");
        assert_eq!(s.companies.len(), 1);
        assert_eq!(s.companies[0].sources[0].kind, crate::model::SourceKind::Page);

        let sets = s.keyword_sets();
        let pricing = sets.get(crate::dimension::Dimension::PricingModel).unwrap();
        assert_eq!(pricing.len(), 2);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(Settings::load(Some(Path::new("/nonexistent/intel.toml"))).is_err());
    }
}

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::HeraldError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub llm: LlmConfig,
    pub ollama: OllamaConfig,
    pub engine: EngineConfig,
    pub scheduler: SchedulerConfig,
    pub notify: NotifyConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `HERALD_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("HERALD_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        let storage = StorageConfig::from_env_profiled(p);
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            llm: LlmConfig::from_env_profiled(p),
            ollama: OllamaConfig::from_env_profiled(p),
            engine: EngineConfig::from_env_profiled(p, &storage),
            scheduler: SchedulerConfig::from_env_profiled(p),
            notify: NotifyConfig::from_env_profiled(p),
            storage,
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), HeraldError> {
        if self.scheduler.tick_secs == 0 {
            return Err(HeraldError::Config("HERALD_TICK_SECS must be at least 1".into()));
        }
        if self.scheduler.max_concurrency == 0 {
            return Err(HeraldError::Config(
                "HERALD_MAX_CONCURRENCY must be at least 1".into(),
            ));
        }
        if !matches!(self.engine.opt_level.as_str(), "0" | "1" | "2" | "3" | "s" | "z") {
            return Err(HeraldError::Config(format!(
                "invalid HERALD_RUSTC_OPT_LEVEL '{}'",
                self.engine.opt_level
            )));
        }
        Ok(())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:      {}:{}", self.server.host, self.server.port);
        tracing::info!("  storage:     rules_dir={}", self.storage.rules_dir.display());
        tracing::info!("  llm:         provider={}", self.llm.provider);
        tracing::info!("  engine:      rustc={}, opt-level={}", self.engine.rustc, self.engine.opt_level);
        tracing::info!(
            "  scheduler:   tick={}s, concurrency={}, per-rule schedules={}",
            self.scheduler.tick_secs,
            self.scheduler.max_concurrency,
            self.scheduler.honor_rule_schedules
        );
        tracing::info!(
            "  notify:      webhook={}, log_channel={}",
            self.notify.webhook_url.is_some(),
            self.notify.log_channel
        );
    }

    /// Return a redacted view safe for API responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "server": { "host": self.server.host, "port": self.server.port },
            "storage": { "data_dir": self.storage.data_dir, "rules_dir": self.storage.rules_dir },
            "llm": {
                "provider": self.llm.provider,
                "configured": self.llm.is_configured(),
            },
            "engine": { "rustc": self.engine.rustc, "opt_level": self.engine.opt_level },
            "scheduler": {
                "tick_secs": self.scheduler.tick_secs,
                "max_concurrency": self.scheduler.max_concurrency,
                "honor_rule_schedules": self.scheduler.honor_rule_schedules,
            },
            "notify": {
                "webhook": self.notify.webhook_url.is_some(),
                "log_channel": self.notify.log_channel,
            },
        })
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 8080),
        }
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// One JSON file per rule record.
    pub rules_dir: PathBuf,
    /// Where compiled rule libraries live between compile and load.
    pub artifact_dir: PathBuf,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        let data_dir = PathBuf::from(profiled_env_or(p, "DATA_DIR", "data"));
        let rules_dir = profiled_env_opt(p, "RULES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("rules"));
        let artifact_dir = profiled_env_opt(p, "ARTIFACT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(env::temp_dir);
        Self {
            data_dir,
            rules_dir,
            artifact_dir,
        }
    }
}

// ── LLM (Anthropic / OpenAI / Ollama) ─────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "anthropic", "openai", "ollama"
    pub provider: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub anthropic_base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            provider: profiled_env_or(p, "LLM_PROVIDER", "anthropic"),
            openai_api_key: profiled_env_opt(p, "OPENAI_API_KEY"),
            openai_model: profiled_env_or(p, "OPENAI_MODEL", "gpt-4o"),
            openai_base_url: profiled_env_opt(p, "OPENAI_BASE_URL"),
            anthropic_api_key: profiled_env_opt(p, "ANTHROPIC_API_KEY"),
            anthropic_model: profiled_env_or(p, "ANTHROPIC_MODEL", "claude-sonnet-4-5-20250929"),
            anthropic_base_url: profiled_env_opt(p, "ANTHROPIC_BASE_URL"),
            temperature: profiled_env_or(p, "LLM_TEMPERATURE", "0.0")
                .parse()
                .unwrap_or(0.0),
            max_tokens: profiled_env_u32(p, "LLM_MAX_TOKENS", 4096),
        }
    }

    pub fn is_configured(&self) -> bool {
        match self.provider.as_str() {
            "openai" => self.openai_api_key.is_some(),
            "anthropic" | "claude" => self.anthropic_api_key.is_some(),
            "ollama" => true,
            _ => false,
        }
    }
}

// ── Ollama (local models) ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub url: String,
    pub model: String,
}

impl OllamaConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_or(p, "OLLAMA_URL", "http://localhost:11434"),
            model: profiled_env_or(p, "OLLAMA_MODEL", "qwen2.5-coder"),
        }
    }
}

// ── Rule compilation engine ───────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Compiler executable, looked up on PATH when not absolute.
    pub rustc: String,
    /// `-C opt-level` passed to every rule build.
    pub opt_level: String,
    /// Extra arguments appended to every rustc invocation.
    pub extra_args: Vec<String>,
    /// Parent directory for per-build workspaces (system temp dir when unset).
    pub workspace_root: Option<PathBuf>,
    pub artifact_dir: PathBuf,
}

impl EngineConfig {
    fn from_env_profiled(p: &str, storage: &StorageConfig) -> Self {
        let rustc = profiled_env_opt(p, "HERALD_RUSTC")
            .or_else(|| env_opt("RUSTC"))
            .unwrap_or_else(|| "rustc".to_string());
        let extra_args = profiled_env_opt(p, "HERALD_RUSTC_ARGS")
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        Self {
            rustc,
            opt_level: profiled_env_or(p, "HERALD_RUSTC_OPT_LEVEL", "1"),
            extra_args,
            workspace_root: profiled_env_opt(p, "HERALD_WORKSPACE_ROOT").map(PathBuf::from),
            artifact_dir: storage.artifact_dir.clone(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rustc: env_opt("RUSTC").unwrap_or_else(|| "rustc".to_string()),
            opt_level: "1".to_string(),
            extra_args: Vec::new(),
            workspace_root: None,
            artifact_dir: env::temp_dir(),
        }
    }
}

// ── Scheduler ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between engine ticks.
    pub tick_secs: u64,
    /// Rules evaluated concurrently within one tick.
    pub max_concurrency: usize,
    /// When true a rule only runs on ticks where its own cron is due.
    pub honor_rule_schedules: bool,
    /// Upper bound on one context fetch (0 = unbounded).
    pub fetch_timeout_secs: u64,
    /// Upper bound on one evaluate or describe call (0 = unbounded).
    pub eval_timeout_secs: u64,
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            tick_secs: profiled_env_u64(p, "HERALD_TICK_SECS", 60),
            max_concurrency: profiled_env_u32(p, "HERALD_MAX_CONCURRENCY", 4) as usize,
            honor_rule_schedules: profiled_env_bool(p, "HERALD_HONOR_RULE_SCHEDULES", true),
            fetch_timeout_secs: profiled_env_u64(p, "HERALD_FETCH_TIMEOUT_SECS", 30),
            eval_timeout_secs: profiled_env_u64(p, "HERALD_EVAL_TIMEOUT_SECS", 10),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 60,
            max_concurrency: 4,
            honor_rule_schedules: true,
            fetch_timeout_secs: 30,
            eval_timeout_secs: 10,
        }
    }
}

// ── Notification transport ────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
    /// Also emit every notification as a tracing event.
    pub log_channel: bool,
}

impl NotifyConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            webhook_url: profiled_env_opt(p, "NOTIFY_WEBHOOK_URL"),
            log_channel: profiled_env_bool(p, "NOTIFY_LOG_CHANNEL", true),
        }
    }
}

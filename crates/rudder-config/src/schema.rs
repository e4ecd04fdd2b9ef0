// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// Serde default helper — returns `true`.
///
/// `#[serde(default)]` on a `bool` always falls back to `bool::default()`
/// (i.e. `false`), so fields that should be enabled unless explicitly
/// disabled need a named function.
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub runs: RunsConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub url: UrlPolicyConfig,
    /// Capability gate for templates that handle credentials or touch the
    /// local profile.  `local` unlocks everything; `remote` refuses the
    /// gated templates with TRUST_LEVEL_NOT_ALLOWED.
    #[serde(default)]
    pub trust_level: TrustLevel,
    /// Directory for durable state (knowledge cards, archives, index).
    /// Defaults to the platform data dir + "rudder" when unset.
    pub data_dir: Option<String>,
}

/// Coarse-grained capability gate advertised in the runtime profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    #[default]
    Local,
    Remote,
}

impl std::fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrustLevel::Local => write!(f, "local"),
            TrustLevel::Remote => write!(f, "remote"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions endpoint.
    pub base_url: String,
    /// Explicit API key; prefer `api_key_env` in version-controlled files.
    pub api_key: Option<String>,
    /// Environment variable that holds the API key (read at runtime).
    pub api_key_env: Option<String>,
    /// Model name forwarded to the provider API.
    pub model: String,
    /// Request timeout for one completion call.
    #[serde(default = "default_llm_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_llm_timeout_ms() -> u64 {
    120_000
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".into(),
            api_key: None,
            api_key_env: None,
            model: "gpt-4o-mini".into(),
            timeout_ms: default_llm_timeout_ms(),
        }
    }
}

fn default_max_iterations() -> u32 {
    20
}
fn default_max_consecutive_errors() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum reason-act iterations per agent goal before the run fails.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Consecutive tool errors tolerated before the recovery policy
    /// switches from retry to hint injection (and the loop aborts at the
    /// budget bound).
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_consecutive_errors: default_max_consecutive_errors(),
        }
    }
}

fn default_max_messages() -> usize {
    40
}
fn default_compress_threshold() -> usize {
    30
}
fn default_keep_recent() -> usize {
    20
}
fn default_chars_per_token() -> usize {
    4
}
fn default_max_prompt_tokens() -> usize {
    24_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Hard ceiling on stored messages; compression keeps the list below it.
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    /// Message count at which the middle of the history is collapsed.
    #[serde(default = "default_compress_threshold")]
    pub compress_threshold: usize,
    /// Recent messages preserved verbatim by compression.
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,
    /// Token estimate divisor for content length.
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,
    /// Estimated-token ceiling for the prompt; crossing it compresses the
    /// history even below the message-count threshold, so a handful of
    /// oversized tool results cannot blow the context window.
    #[serde(default = "default_max_prompt_tokens")]
    pub max_prompt_tokens: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            compress_threshold: default_compress_threshold(),
            keep_recent: default_keep_recent(),
            chars_per_token: default_chars_per_token(),
            max_prompt_tokens: default_max_prompt_tokens(),
        }
    }
}

fn default_max_concurrent_runs() -> usize {
    16
}
fn default_max_pending_runs() -> usize {
    256
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunsConfig {
    /// Semaphore capacity gating queued → running transitions.
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
    /// Upper bound on queued + running runs; submissions beyond it are
    /// rejected with RUN_BACKPRESSURE.
    #[serde(default = "default_max_pending_runs")]
    pub max_pending_runs: usize,
}

impl Default for RunsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: default_max_concurrent_runs(),
            max_pending_runs: default_max_pending_runs(),
        }
    }
}

fn default_artifact_max_entries() -> usize {
    512
}
fn default_artifact_max_bytes() -> usize {
    64 * 1024 * 1024
}
fn default_artifact_ttl_ms() -> u64 {
    30 * 60 * 1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default = "default_artifact_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_artifact_max_bytes")]
    pub max_bytes: usize,
    /// TTL applied when `put` is called without an explicit one.
    #[serde(default = "default_artifact_ttl_ms")]
    pub default_ttl_ms: u64,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            max_entries: default_artifact_max_entries(),
            max_bytes: default_artifact_max_bytes(),
            default_ttl_ms: default_artifact_ttl_ms(),
        }
    }
}

fn default_max_domains() -> usize {
    200
}
fn default_max_patterns_per_domain() -> usize {
    30
}
fn default_max_archives_per_domain() -> usize {
    5
}
fn default_card_cache() -> usize {
    10
}
fn default_flush_delay_ms() -> u64 {
    5000
}
fn default_archive_change_threshold() -> f64 {
    0.5
}
fn default_confidence_decay_base() -> f64 {
    0.95
}
fn default_min_confidence() -> f64 {
    0.1
}
fn default_inject_char_budget() -> usize {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default = "default_max_domains")]
    pub max_domains: usize,
    #[serde(default = "default_max_patterns_per_domain")]
    pub max_patterns_per_domain: usize,
    #[serde(default = "default_max_archives_per_domain")]
    pub max_archives_per_domain: usize,
    /// LRU size of fully-loaded cards kept in memory.
    #[serde(default = "default_card_cache")]
    pub card_cache: usize,
    /// Index writes are coalesced and flushed after this delay.
    #[serde(default = "default_flush_delay_ms")]
    pub flush_delay_ms: u64,
    /// Symmetric pattern-set divergence above which the previous card
    /// version is archived before overwrite.
    #[serde(default = "default_archive_change_threshold")]
    pub archive_change_threshold: f64,
    /// Per-day exponential decay base for effective confidence.
    #[serde(default = "default_confidence_decay_base")]
    pub confidence_decay_base: f64,
    /// Patterns below this effective confidence are purged by maintenance.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Character budget for the prompt fragment injected into agent runs.
    #[serde(default = "default_inject_char_budget")]
    pub inject_char_budget: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            max_domains: default_max_domains(),
            max_patterns_per_domain: default_max_patterns_per_domain(),
            max_archives_per_domain: default_max_archives_per_domain(),
            card_cache: default_card_cache(),
            flush_delay_ms: default_flush_delay_ms(),
            archive_change_threshold: default_archive_change_threshold(),
            confidence_decay_base: default_confidence_decay_base(),
            min_confidence: default_min_confidence(),
            inject_char_budget: default_inject_char_budget(),
        }
    }
}

/// Default verbosity of enriched tool results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Brief,
    #[default]
    Normal,
    Full,
}

impl DetailLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetailLevel::Brief => "brief",
            DetailLevel::Normal => "normal",
            DetailLevel::Full => "full",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default)]
    pub detail_level: DetailLevel,
    /// When enabled, polling a non-terminal run downgrades detail to brief
    /// and a failure-terminal run upgrades it to full.
    #[serde(default = "default_true")]
    pub adaptive_policy: bool,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            detail_level: DetailLevel::default(),
            adaptive_policy: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Consult the LLM classifier when the planning rules miss.  Off by
    /// default: rule-sourced plans stay a pure function of the spec.
    #[serde(default)]
    pub llm_fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlPolicyConfig {
    /// Accept file:// URLs.  Off by default; batch extraction of local
    /// fixtures is the only expected use.
    #[serde(default)]
    pub allow_file: bool,
    /// Reject URLs whose host is a private, loopback, or link-local
    /// address in any notation.
    #[serde(default = "default_true")]
    pub block_private: bool,
}

impl Default for UrlPolicyConfig {
    fn default() -> Self {
        Self {
            allow_file: false,
            block_private: true,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = Config::default();
        assert_eq!(c.agent.max_iterations, 20);
        assert_eq!(c.agent.max_consecutive_errors, 3);
        assert_eq!(c.conversation.max_messages, 40);
        assert_eq!(c.conversation.compress_threshold, 30);
        assert_eq!(c.conversation.keep_recent, 20);
        assert_eq!(c.conversation.chars_per_token, 4);
        assert_eq!(c.conversation.max_prompt_tokens, 24_000);
        assert_eq!(c.knowledge.max_domains, 200);
        assert_eq!(c.knowledge.max_patterns_per_domain, 30);
        assert_eq!(c.knowledge.card_cache, 10);
        assert_eq!(c.knowledge.flush_delay_ms, 5000);
    }

    #[test]
    fn trust_level_defaults_to_local() {
        assert_eq!(Config::default().trust_level, TrustLevel::Local);
    }

    #[test]
    fn url_policy_blocks_private_by_default() {
        let c = Config::default();
        assert!(c.url.block_private);
        assert!(!c.url.allow_file);
    }

    #[test]
    fn partial_yaml_fills_remaining_defaults() {
        let c: Config = serde_yaml::from_str("agent:\n  max_iterations: 5\n").unwrap();
        assert_eq!(c.agent.max_iterations, 5);
        assert_eq!(c.agent.max_consecutive_errors, 3);
        assert_eq!(c.conversation.keep_recent, 20);
    }

    #[test]
    fn detail_level_round_trips_lowercase() {
        let level: DetailLevel = serde_yaml::from_str("brief").unwrap();
        assert_eq!(level, DetailLevel::Brief);
        assert_eq!(level.as_str(), "brief");
    }

    #[test]
    fn trust_level_parses_remote() {
        let t: TrustLevel = serde_yaml::from_str("remote").unwrap();
        assert_eq!(t, TrustLevel::Remote);
        assert_eq!(t.to_string(), "remote");
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a pattern describes about a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Selector,
    NavigationPath,
    LoginRequired,
    SpaHint,
    PageStructure,
    TaskIntent,
}

impl PatternKind {
    /// Global patterns describe the whole site and bypass task-hint
    /// filtering during prompt injection.
    pub fn is_global(&self) -> bool {
        matches!(
            self,
            PatternKind::LoginRequired | PatternKind::SpaHint | PatternKind::PageStructure
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternSource {
    AgentAuto,
    HumanRecording,
    Manual,
}

/// One reusable, typed observation about a site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SitePattern {
    #[serde(rename = "type")]
    pub kind: PatternKind,
    pub description: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_pattern: Option<String>,
    /// Base confidence in [0, 1]; decays over time through
    /// [`SitePattern::effective_confidence`].
    pub confidence: f64,
    pub use_count: u64,
    pub last_used_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub source: PatternSource,
}

impl SitePattern {
    pub fn new(
        kind: PatternKind,
        description: impl Into<String>,
        value: impl Into<String>,
        confidence: f64,
        source: PatternSource,
    ) -> Self {
        let now = Utc::now();
        Self {
            kind,
            description: description.into(),
            value: value.into(),
            url_pattern: None,
            confidence: confidence.clamp(0.0, 1.0),
            use_count: 0,
            last_used_at: now,
            created_at: now,
            source,
        }
    }

    /// `confidence · decay_base^daysSinceLastUse`.
    pub fn effective_confidence(&self, decay_base: f64, now: DateTime<Utc>) -> f64 {
        let days = (now - self.last_used_at).num_seconds().max(0) as f64 / 86_400.0;
        self.confidence * decay_base.powf(days)
    }

    /// Bump usage: counts up, refreshes recency, boosts confidence by
    /// +0.05 capped at 1.0.
    pub fn record_use(&mut self, now: DateTime<Utc>) {
        self.use_count += 1;
        self.last_used_at = now;
        self.confidence = (self.confidence + 0.05).min(1.0);
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pattern() -> SitePattern {
        SitePattern::new(
            PatternKind::Selector,
            "login button",
            "#login",
            0.6,
            PatternSource::AgentAuto,
        )
    }

    #[test]
    fn fresh_pattern_has_full_effective_confidence() {
        let p = pattern();
        let eff = p.effective_confidence(0.95, p.last_used_at);
        assert!((eff - 0.6).abs() < 1e-9);
    }

    #[test]
    fn effective_confidence_decays_by_days() {
        let p = pattern();
        let later = p.last_used_at + Duration::days(10);
        let eff = p.effective_confidence(0.95, later);
        let expected = 0.6 * 0.95f64.powf(10.0);
        assert!((eff - expected).abs() < 1e-9);
    }

    #[test]
    fn record_use_boosts_and_caps_confidence() {
        let mut p = pattern();
        for _ in 0..20 {
            p.record_use(Utc::now());
        }
        assert!((p.confidence - 1.0).abs() < 1e-9);
        assert_eq!(p.use_count, 20);
    }

    #[test]
    fn global_kinds_are_classified() {
        assert!(PatternKind::LoginRequired.is_global());
        assert!(PatternKind::SpaHint.is_global());
        assert!(PatternKind::PageStructure.is_global());
        assert!(!PatternKind::Selector.is_global());
        assert!(!PatternKind::TaskIntent.is_global());
    }

    #[test]
    fn serde_uses_type_discriminator() {
        let v = serde_json::to_value(pattern()).unwrap();
        assert_eq!(v["type"], "selector");
        assert_eq!(v["source"], "agent_auto");
    }

    #[test]
    fn confidence_is_clamped_on_construction() {
        let p = SitePattern::new(
            PatternKind::SpaHint,
            "d",
            "v",
            7.0,
            PatternSource::Manual,
        );
        assert!((p.confidence - 1.0).abs() < 1e-9);
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pattern::SitePattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SiteType {
    Spa,
    Ssr,
    #[default]
    Unknown,
}

/// The per-domain bundle of patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeCard {
    pub domain: String,
    pub version: u32,
    pub patterns: Vec<SitePattern>,
    pub site_type: SiteType,
    pub requires_login: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeCard {
    pub fn new(domain: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            domain: domain.into(),
            version: 1,
            patterns: Vec::new(),
            site_type: SiteType::default(),
            requires_login: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Enforce the pattern cap: rank by effective confidence and keep the
    /// strongest `max_patterns`.
    pub fn cap_patterns(&mut self, max_patterns: usize, decay_base: f64, now: DateTime<Utc>) {
        if self.patterns.len() <= max_patterns {
            return;
        }
        self.patterns.sort_by(|a, b| {
            b.effective_confidence(decay_base, now)
                .partial_cmp(&a.effective_confidence(decay_base, now))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        self.patterns.truncate(max_patterns);
    }

    /// Most recent use across all patterns (falls back to updated_at).
    pub fn last_used_at(&self) -> DateTime<Utc> {
        self.patterns
            .iter()
            .map(|p| p.last_used_at)
            .max()
            .unwrap_or(self.updated_at)
    }

    /// Symmetric set divergence over pattern values:
    /// `|A △ B| / max(|A|, |B|)`, 0.0 when both are empty.
    pub fn divergence_from(&self, other: &KnowledgeCard) -> f64 {
        let a: std::collections::HashSet<&str> =
            self.patterns.iter().map(|p| p.value.as_str()).collect();
        let b: std::collections::HashSet<&str> =
            other.patterns.iter().map(|p| p.value.as_str()).collect();
        let max = a.len().max(b.len());
        if max == 0 {
            return 0.0;
        }
        let sym_diff = a.symmetric_difference(&b).count();
        sym_diff as f64 / max as f64
    }
}

/// Lightweight per-domain entry held in the in-memory index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardIndexEntry {
    pub domain: String,
    pub pattern_count: usize,
    pub site_type: SiteType,
    pub requires_login: bool,
    pub last_used_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CardIndexEntry {
    pub fn from_card(card: &KnowledgeCard) -> Self {
        Self {
            domain: card.domain.clone(),
            pattern_count: card.patterns.len(),
            site_type: card.site_type,
            requires_login: card.requires_login,
            last_used_at: card.last_used_at(),
            updated_at: card.updated_at,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{PatternKind, PatternSource};

    fn card_with_values(values: &[&str]) -> KnowledgeCard {
        let mut card = KnowledgeCard::new("example.com");
        for v in values {
            card.patterns.push(SitePattern::new(
                PatternKind::Selector,
                "p",
                *v,
                0.5,
                PatternSource::AgentAuto,
            ));
        }
        card
    }

    #[test]
    fn cap_keeps_strongest_patterns() {
        let mut card = card_with_values(&[]);
        for i in 0..40 {
            let mut p = SitePattern::new(
                PatternKind::Selector,
                "p",
                format!("v{i}"),
                (i as f64) / 40.0,
                PatternSource::AgentAuto,
            );
            p.last_used_at = Utc::now();
            card.patterns.push(p);
        }
        card.cap_patterns(30, 0.95, Utc::now());
        assert_eq!(card.patterns.len(), 30);
        // The weakest (lowest confidence) were dropped.
        assert!(card.patterns.iter().all(|p| p.confidence >= 10.0 / 40.0));
    }

    #[test]
    fn divergence_identical_is_zero() {
        let a = card_with_values(&["x", "y"]);
        let b = card_with_values(&["x", "y"]);
        assert_eq!(a.divergence_from(&b), 0.0);
    }

    #[test]
    fn divergence_disjoint_is_two() {
        // |A △ B| = 4, max(|A|,|B|) = 2.
        let a = card_with_values(&["x", "y"]);
        let b = card_with_values(&["p", "q"]);
        assert!((a.divergence_from(&b) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn divergence_half_overlap() {
        let a = card_with_values(&["x", "y"]);
        let b = card_with_values(&["x", "z"]);
        // sym diff {y, z} = 2 over max 2 = 1.0
        assert!((a.divergence_from(&b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn divergence_of_empty_cards_is_zero() {
        let a = card_with_values(&[]);
        let b = card_with_values(&[]);
        assert_eq!(a.divergence_from(&b), 0.0);
    }

    #[test]
    fn index_entry_mirrors_card() {
        let card = card_with_values(&["x"]);
        let entry = CardIndexEntry::from_card(&card);
        assert_eq!(entry.domain, "example.com");
        assert_eq!(entry.pattern_count, 1);
    }
}

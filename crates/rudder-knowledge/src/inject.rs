// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};

use rudder_config::KnowledgeConfig;

use crate::card::KnowledgeCard;
use crate::pattern::{PatternKind, SitePattern};

const CAUTION_LINE: &str = "(knowledge truncated; verify against the live page)";

/// Compose the compact prompt fragment injected before an agent run.
///
/// Up to three task-intent patterns lead, ranked by substring relevance to
/// the task goal; the remaining patterns follow ranked by effective
/// confidence.  Global patterns (login_required, spa_hint, page_structure)
/// bypass task filtering.  The fragment is cut at the character budget
/// with a trailing caution line.
pub fn compose_fragment(
    card: &KnowledgeCard,
    task_goal: Option<&str>,
    cfg: &KnowledgeConfig,
    now: DateTime<Utc>,
) -> String {
    let mut lines: Vec<String> = vec![format!("Known patterns for {}:", card.domain)];

    let mut task_patterns: Vec<&SitePattern> = card
        .patterns
        .iter()
        .filter(|p| p.kind == PatternKind::TaskIntent)
        .collect();
    if let Some(goal) = task_goal {
        task_patterns.sort_by(|a, b| {
            relevance(goal, b)
                .partial_cmp(&relevance(goal, a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
    for p in task_patterns.iter().take(3) {
        lines.push(render(p, cfg, now));
    }

    let mut rest: Vec<&SitePattern> = card
        .patterns
        .iter()
        .filter(|p| p.kind != PatternKind::TaskIntent)
        .collect();
    rest.sort_by(|a, b| {
        b.effective_confidence(cfg.confidence_decay_base, now)
            .partial_cmp(&a.effective_confidence(cfg.confidence_decay_base, now))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for p in rest {
        lines.push(render(p, cfg, now));
    }

    if card.requires_login {
        lines.push("- this site requires login before most content is reachable".to_string());
    }

    clamp_to_budget(lines, cfg.inject_char_budget)
}

fn render(p: &SitePattern, cfg: &KnowledgeConfig, now: DateTime<Utc>) -> String {
    let kind = match p.kind {
        PatternKind::Selector => "selector",
        PatternKind::NavigationPath => "navigation",
        PatternKind::LoginRequired => "login",
        PatternKind::SpaHint => "spa",
        PatternKind::PageStructure => "structure",
        PatternKind::TaskIntent => "task",
    };
    format!(
        "- [{kind}] {}: {} (confidence {:.2})",
        p.description,
        p.value,
        p.effective_confidence(cfg.confidence_decay_base, now)
    )
}

/// Character-bigram overlap between the goal and a pattern's text.
///
/// Bigrams over chars (not bytes or words) so relevance works for CJK
/// goals, which have no word separators.
fn relevance(goal: &str, p: &SitePattern) -> f64 {
    let hay: Vec<char> = format!("{} {}", p.description, p.value)
        .to_lowercase()
        .chars()
        .collect();
    let needle: Vec<char> = goal.to_lowercase().chars().collect();
    if needle.len() < 2 || hay.len() < 2 {
        return 0.0;
    }
    let hay_grams: std::collections::HashSet<(char, char)> =
        hay.windows(2).map(|w| (w[0], w[1])).collect();
    let mut hits = 0usize;
    let mut total = 0usize;
    for w in needle.windows(2) {
        total += 1;
        if hay_grams.contains(&(w[0], w[1])) {
            hits += 1;
        }
    }
    hits as f64 / total as f64
}

fn clamp_to_budget(lines: Vec<String>, budget: usize) -> String {
    let full = lines.join("\n");
    if full.len() <= budget {
        return full;
    }
    let reserve = CAUTION_LINE.len() + 1;
    let mut out = String::new();
    for line in lines {
        if out.len() + line.len() + 1 + reserve > budget {
            break;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&line);
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(CAUTION_LINE);
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

use crate::pattern::{PatternKind, PatternSource, SitePattern};

/// Confidence assigned to patterns learned from a human recording: higher
/// than agent-auto observations, below manual curation.
const RECORDING_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordedEventKind {
    Navigate,
    Click,
    Type,
    Select,
    Scroll,
}

/// The element a recorded event touched, as captured by the recorder.
/// Password values are never recorded; only the field's address is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedElement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub css_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
}

impl RecordedElement {
    /// Best stable address for the element: CSS path, aria-label, text.
    fn address(&self) -> Option<String> {
        self.css_path
            .clone()
            .or_else(|| self.aria_label.as_ref().map(|l| format!("[aria-label={l}]")))
            .or_else(|| self.text.clone())
    }

    fn label(&self) -> String {
        self.aria_label
            .clone()
            .or_else(|| self.text.clone())
            .unwrap_or_else(|| "element".to_string())
    }

    fn is_password(&self) -> bool {
        self.input_type.as_deref() == Some("password")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedEvent {
    pub kind: RecordedEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<RecordedElement>,
}

/// A human-recorded browsing session for one domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecording {
    pub domain: String,
    pub events: Vec<RecordedEvent>,
}

/// Convert a recording into site patterns: the navigation path (when at
/// least two distinct URLs were visited), click targets, and form fields.
pub fn patterns_from_recording(recording: &SessionRecording) -> Vec<SitePattern> {
    let mut patterns = Vec::new();

    // Navigation path over distinct URLs in visit order.
    let mut path: Vec<&str> = Vec::new();
    for event in &recording.events {
        if event.kind == RecordedEventKind::Navigate {
            if let Some(url) = event.url.as_deref() {
                if !path.contains(&url) {
                    path.push(url);
                }
            }
        }
    }
    if path.len() >= 2 {
        patterns.push(SitePattern::new(
            PatternKind::NavigationPath,
            format!("recorded navigation through {} pages", path.len()),
            path.join(" -> "),
            RECORDING_CONFIDENCE,
            PatternSource::HumanRecording,
        ));
    }

    for event in &recording.events {
        let Some(element) = &event.element else {
            continue;
        };
        let Some(address) = element.address() else {
            continue;
        };
        match event.kind {
            RecordedEventKind::Click => {
                patterns.push(SitePattern::new(
                    PatternKind::Selector,
                    format!("recorded click on {}", element.label()),
                    address,
                    RECORDING_CONFIDENCE,
                    PatternSource::HumanRecording,
                ));
            }
            RecordedEventKind::Type | RecordedEventKind::Select => {
                let description = if element.is_password() {
                    "recorded password field (value elided)".to_string()
                } else {
                    format!("recorded form field {}", element.label())
                };
                patterns.push(SitePattern::new(
                    PatternKind::Selector,
                    description,
                    address,
                    RECORDING_CONFIDENCE,
                    PatternSource::HumanRecording,
                ));
            }
            _ => {}
        }
    }

    // A value may be touched by several events; keep the first occurrence.
    let mut seen = std::collections::HashSet::new();
    patterns.retain(|p| seen.insert(p.value.clone()));
    patterns
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn nav(url: &str) -> RecordedEvent {
        RecordedEvent {
            kind: RecordedEventKind::Navigate,
            url: Some(url.into()),
            element: None,
        }
    }

    fn click(css: &str, text: &str) -> RecordedEvent {
        RecordedEvent {
            kind: RecordedEventKind::Click,
            url: None,
            element: Some(RecordedElement {
                css_path: Some(css.into()),
                text: Some(text.into()),
                ..RecordedElement::default()
            }),
        }
    }

    fn typed(css: &str, input_type: Option<&str>) -> RecordedEvent {
        RecordedEvent {
            kind: RecordedEventKind::Type,
            url: None,
            element: Some(RecordedElement {
                css_path: Some(css.into()),
                input_type: input_type.map(String::from),
                ..RecordedElement::default()
            }),
        }
    }

    #[test]
    fn navigation_path_needs_two_distinct_urls() {
        let rec = SessionRecording {
            domain: "shop.example".into(),
            events: vec![nav("https://shop.example/"), nav("https://shop.example/")],
        };
        assert!(patterns_from_recording(&rec)
            .iter()
            .all(|p| p.kind != PatternKind::NavigationPath));

        let rec = SessionRecording {
            domain: "shop.example".into(),
            events: vec![nav("https://shop.example/"), nav("https://shop.example/cart")],
        };
        let patterns = patterns_from_recording(&rec);
        let path = patterns
            .iter()
            .find(|p| p.kind == PatternKind::NavigationPath)
            .unwrap();
        assert_eq!(path.value, "https://shop.example/ -> https://shop.example/cart");
    }

    #[test]
    fn click_targets_become_selector_patterns() {
        let rec = SessionRecording {
            domain: "shop.example".into(),
            events: vec![click("#buy", "Buy now")],
        };
        let patterns = patterns_from_recording(&rec);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].kind, PatternKind::Selector);
        assert_eq!(patterns[0].value, "#buy");
        assert!(patterns[0].description.contains("Buy now"));
    }

    #[test]
    fn recording_confidence_and_source_are_fixed() {
        let rec = SessionRecording {
            domain: "shop.example".into(),
            events: vec![click("#a", "A")],
        };
        let p = &patterns_from_recording(&rec)[0];
        assert!((p.confidence - 0.8).abs() < 1e-9);
        assert_eq!(p.source, PatternSource::HumanRecording);
    }

    #[test]
    fn password_fields_are_elided() {
        let rec = SessionRecording {
            domain: "login.example".into(),
            events: vec![
                typed("#user", Some("text")),
                typed("#pass", Some("password")),
            ],
        };
        let patterns = patterns_from_recording(&rec);
        let pass = patterns.iter().find(|p| p.value == "#pass").unwrap();
        assert!(pass.description.contains("elided"));
        assert!(!pass.description.contains("secret"));
    }

    #[test]
    fn duplicate_targets_collapse() {
        let rec = SessionRecording {
            domain: "shop.example".into(),
            events: vec![click("#buy", "Buy"), click("#buy", "Buy")],
        };
        assert_eq!(patterns_from_recording(&rec).len(), 1);
    }

    #[test]
    fn aria_label_fallback_is_used() {
        let rec = SessionRecording {
            domain: "shop.example".into(),
            events: vec![RecordedEvent {
                kind: RecordedEventKind::Click,
                url: None,
                element: Some(RecordedElement {
                    aria_label: Some("Add to cart".into()),
                    ..RecordedElement::default()
                }),
            }],
        };
        let patterns = patterns_from_recording(&rec);
        assert_eq!(patterns[0].value, "[aria-label=Add to cart]");
    }
}

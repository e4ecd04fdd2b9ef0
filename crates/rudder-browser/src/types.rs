// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

/// Bounding rectangle of an element in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One entry of the flat element list produced from a DOM/accessibility
/// snapshot.
///
/// `id` is the semantic id the driver injects as a DOM attribute on the
/// collected node, so subsequent addressing stays stable across reflows
/// within the same page state.  A fresh snapshot may renumber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementInfo {
    pub id: u32,
    /// Accessibility role ("button", "textbox", "link", ...).
    pub role: String,
    /// Accessible name: label, aria-label, or trimmed text content.
    pub name: String,
    /// State flags such as "disabled", "checked", "focused".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<String>,
    /// CSS selector the driver derived for this node, when a stable one
    /// exists.  Exact-match lookups resolve against it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default)]
    pub rect: Rect,
}

/// Structural snapshot of the current page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageInfo {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<ElementInfo>,
    /// h1–h3 texts in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_url: Option<String>,
}

/// A modal dialog currently blocking the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogInfo {
    /// "alert" | "confirm" | "prompt" | "beforeunload".
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleEntry {
    /// "log" | "warn" | "error" | "info" | "debug".
    pub level: String,
    pub text: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkEntry {
    pub method: String,
    pub url: String,
    /// None while in flight or when the request failed before a response.
    pub status: Option<u16>,
    pub resource_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadEntry {
    pub url: String,
    pub path: String,
    /// "in_progress" | "completed" | "failed".
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: String,
    pub url: String,
    pub title: String,
    pub active: bool,
}

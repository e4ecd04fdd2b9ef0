// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::Value;

use crate::types::{
    ConsoleEntry, DialogInfo, DownloadEntry, ElementInfo, NetworkEntry, PageInfo, TabInfo,
};

/// Failures surfaced by a browser driver.
///
/// Variants mirror the conditions the control plane reacts to; anything the
/// driver cannot classify lands in `Execution`.
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("tab not found: {0}")]
    TabNotFound(String),
    #[error("page crashed")]
    PageCrashed,
    #[error("navigation timeout: {0}")]
    NavigationTimeout(String),
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("script execution failed: {0}")]
    Execution(String),
}

pub type BrowserResult<T> = Result<T, BrowserError>;

/// The consumed browser contract.
///
/// The control plane drives any implementation of this trait; the reference
/// deployment wraps a CDP client, tests use [`crate::FakeBrowser`].  All
/// operations act on the session's active tab unless they take a tab id.
/// Implementations must be safe to call concurrently for different sessions;
/// within one session calls are serialized by the caller.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn create_session(&self) -> BrowserResult<String>;
    async fn close_session(&self, session: &str) -> BrowserResult<()>;

    async fn navigate(&self, session: &str, url: &str) -> BrowserResult<PageInfo>;
    async fn go_back(&self, session: &str) -> BrowserResult<PageInfo>;

    async fn click(&self, session: &str, element_id: u32) -> BrowserResult<()>;
    async fn type_text(&self, session: &str, element_id: u32, text: &str) -> BrowserResult<()>;
    async fn press_key(&self, session: &str, key: &str) -> BrowserResult<()>;
    async fn scroll(&self, session: &str, dx: i64, dy: i64) -> BrowserResult<()>;
    async fn select_option(&self, session: &str, element_id: u32, value: &str)
        -> BrowserResult<()>;
    async fn hover(&self, session: &str, element_id: u32) -> BrowserResult<()>;
    async fn set_value(&self, session: &str, element_id: u32, value: &str) -> BrowserResult<()>;
    async fn upload_file(&self, session: &str, element_id: u32, path: &str) -> BrowserResult<()>;

    /// Wait until the DOM mutation rate settles or `timeout_ms` elapses.
    /// Returns `true` when stability was reached within the timeout.
    async fn wait_for_stable(&self, session: &str, timeout_ms: u64) -> BrowserResult<bool>;

    async fn screenshot(&self, session: &str) -> BrowserResult<Vec<u8>>;
    /// Evaluate a script in page context and return its JSON value.
    async fn evaluate(&self, session: &str, script: &str) -> BrowserResult<Value>;

    async fn page_info(&self, session: &str) -> BrowserResult<PageInfo>;
    /// Raw HTML of the active document (content extraction happens above
    /// the driver).
    async fn page_html(&self, session: &str) -> BrowserResult<String>;
    /// Semantic lookup: match `query` against element role, name, or text.
    async fn find_element(&self, session: &str, query: &str)
        -> BrowserResult<Option<ElementInfo>>;
    /// Exact selector lookup (`document.querySelector` semantics) against
    /// the driver's element metadata.
    async fn query_selector(
        &self,
        session: &str,
        selector: &str,
    ) -> BrowserResult<Option<ElementInfo>>;

    async fn dialog_info(&self, session: &str) -> BrowserResult<Option<DialogInfo>>;
    async fn handle_dialog(
        &self,
        session: &str,
        accept: bool,
        prompt_text: Option<&str>,
    ) -> BrowserResult<()>;

    async fn console_logs(&self, session: &str) -> BrowserResult<Vec<ConsoleEntry>>;
    async fn network_logs(&self, session: &str) -> BrowserResult<Vec<NetworkEntry>>;
    async fn downloads(&self, session: &str) -> BrowserResult<Vec<DownloadEntry>>;

    async fn list_tabs(&self, session: &str) -> BrowserResult<Vec<TabInfo>>;
    async fn create_tab(&self, session: &str, url: Option<&str>) -> BrowserResult<TabInfo>;
    async fn close_tab(&self, session: &str, tab_id: &str) -> BrowserResult<()>;
    async fn switch_tab(&self, session: &str, tab_id: &str) -> BrowserResult<()>;
}

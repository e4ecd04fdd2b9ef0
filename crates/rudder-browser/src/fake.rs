// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::driver::{BrowserDriver, BrowserError, BrowserResult};
use crate::types::{
    ConsoleEntry, DialogInfo, DownloadEntry, ElementInfo, NetworkEntry, PageInfo, Rect, TabInfo,
};

/// A scripted page served by [`FakeBrowser`].
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub title: String,
    pub html: String,
    pub elements: Vec<ElementInfo>,
    pub headings: Vec<String>,
    pub canonical_url: Option<String>,
    /// Clicking the keyed element navigates the tab to the given URL.
    pub click_navigates: HashMap<u32, String>,
    /// Results returned by `evaluate`, keyed by exact script text.
    pub eval_results: HashMap<String, Value>,
    /// Dialog that opens when the page is entered.
    pub dialog: Option<DialogInfo>,
    /// Console entries emitted when the page is entered.
    pub console: Vec<ConsoleEntry>,
    /// Downloads started when the page is entered.
    pub downloads: Vec<DownloadEntry>,
}

impl FakePage {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = html.into();
        self
    }

    pub fn with_element(mut self, id: u32, role: &str, name: &str) -> Self {
        self.elements.push(ElementInfo {
            id,
            role: role.into(),
            name: name.into(),
            states: Vec::new(),
            selector: None,
            rect: Rect::default(),
        });
        self
    }

    /// Element that also carries a stable CSS selector, resolvable via
    /// `query_selector`.
    pub fn with_element_selector(
        mut self,
        id: u32,
        role: &str,
        name: &str,
        selector: &str,
    ) -> Self {
        self.elements.push(ElementInfo {
            id,
            role: role.into(),
            name: name.into(),
            states: Vec::new(),
            selector: Some(selector.into()),
            rect: Rect::default(),
        });
        self
    }

    pub fn with_heading(mut self, h: impl Into<String>) -> Self {
        self.headings.push(h.into());
        self
    }

    pub fn with_canonical(mut self, url: impl Into<String>) -> Self {
        self.canonical_url = Some(url.into());
        self
    }

    pub fn with_click_nav(mut self, element_id: u32, target: impl Into<String>) -> Self {
        self.click_navigates.insert(element_id, target.into());
        self
    }

    pub fn with_eval(mut self, script: impl Into<String>, result: Value) -> Self {
        self.eval_results.insert(script.into(), result);
        self
    }

    pub fn with_dialog(mut self, kind: &str, message: &str) -> Self {
        self.dialog = Some(DialogInfo {
            kind: kind.into(),
            message: message.into(),
        });
        self
    }
}

#[derive(Debug, Default)]
struct TabState {
    id: String,
    /// Navigation history; the last entry is the current URL.
    history: Vec<String>,
}

impl TabState {
    fn current_url(&self) -> &str {
        self.history.last().map(String::as_str).unwrap_or("about:blank")
    }
}

#[derive(Debug, Default)]
struct SessionState {
    tabs: Vec<TabState>,
    active: usize,
    dialog: Option<DialogInfo>,
    console: Vec<ConsoleEntry>,
    network: Vec<NetworkEntry>,
    downloads: Vec<DownloadEntry>,
    /// Values typed or set per (tab index, element id).
    typed: HashMap<(usize, u32), String>,
}

/// In-memory scripted browser used by tests and offline demos.
///
/// Register pages with [`FakeBrowser::with_page`]; navigation to an
/// unregistered URL fails with [`BrowserError::NavigationTimeout`] unless
/// the URL was marked crashing.  All state is per session, so concurrent
/// runs see isolated tabs, logs, and dialogs.
#[derive(Default)]
pub struct FakeBrowser {
    pages: Mutex<HashMap<String, FakePage>>,
    crash_urls: Mutex<Vec<String>>,
    sessions: Mutex<HashMap<String, SessionState>>,
    closed: Mutex<Vec<String>>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: impl Into<String>, page: FakePage) -> Self {
        self.pages.lock().unwrap().insert(url.into(), page);
        self
    }

    /// Navigating to `url` reports a crashed page.
    pub fn with_crash(self, url: impl Into<String>) -> Self {
        self.crash_urls.lock().unwrap().push(url.into());
        self
    }

    /// True when `close_session` was called for `session`.
    pub fn was_closed(&self, session: &str) -> bool {
        self.closed.lock().unwrap().iter().any(|s| s == session)
    }

    pub fn open_session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Test helper: the last value typed into an element on the active tab.
    pub fn typed_value(&self, session: &str, element_id: u32) -> Option<String> {
        let sessions = self.sessions.lock().unwrap();
        let st = sessions.get(session)?;
        st.typed.get(&(st.active, element_id)).cloned()
    }

    fn page_for(&self, url: &str) -> Option<FakePage> {
        self.pages.lock().unwrap().get(url).cloned()
    }

    fn with_session<T>(
        &self,
        session: &str,
        f: impl FnOnce(&mut SessionState) -> BrowserResult<T>,
    ) -> BrowserResult<T> {
        let mut sessions = self.sessions.lock().unwrap();
        let st = sessions
            .get_mut(session)
            .ok_or_else(|| BrowserError::SessionNotFound(session.to_string()))?;
        f(st)
    }

    fn current_page(&self, st: &SessionState) -> BrowserResult<FakePage> {
        let url = st.tabs[st.active].current_url().to_string();
        self.page_for(&url)
            .ok_or_else(|| BrowserError::NavigationTimeout(url))
    }

    fn enter_page(&self, st: &mut SessionState, url: &str) -> BrowserResult<PageInfo> {
        if self.crash_urls.lock().unwrap().iter().any(|u| u == url) {
            return Err(BrowserError::PageCrashed);
        }
        let page = self
            .page_for(url)
            .ok_or_else(|| BrowserError::NavigationTimeout(url.to_string()))?;
        let active = st.active;
        st.tabs[active].history.push(url.to_string());
        // A fresh document starts with clean input state.
        st.typed.retain(|(tab, _), _| *tab != active);
        st.network.push(NetworkEntry {
            method: "GET".into(),
            url: url.to_string(),
            status: Some(200),
            resource_type: "document".into(),
        });
        st.dialog = page.dialog.clone();
        st.console.extend(page.console.iter().cloned());
        st.downloads.extend(page.downloads.iter().cloned());
        Ok(page_info(url, &page))
    }

    fn require_element(page: &FakePage, element_id: u32) -> BrowserResult<()> {
        if page.elements.iter().any(|e| e.id == element_id) {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound(format!(
                "element {element_id}"
            )))
        }
    }
}

fn page_info(url: &str, page: &FakePage) -> PageInfo {
    PageInfo {
        url: url.to_string(),
        title: page.title.clone(),
        elements: page.elements.clone(),
        headings: page.headings.clone(),
        canonical_url: page.canonical_url.clone(),
    }
}

#[async_trait]
impl BrowserDriver for FakeBrowser {
    async fn create_session(&self) -> BrowserResult<String> {
        let id = format!("sess_{}", Uuid::new_v4());
        let mut st = SessionState::default();
        st.tabs.push(TabState {
            id: format!("tab_{}", Uuid::new_v4()),
            history: Vec::new(),
        });
        self.sessions.lock().unwrap().insert(id.clone(), st);
        Ok(id)
    }

    async fn close_session(&self, session: &str) -> BrowserResult<()> {
        let removed = self.sessions.lock().unwrap().remove(session);
        if removed.is_none() {
            return Err(BrowserError::SessionNotFound(session.to_string()));
        }
        self.closed.lock().unwrap().push(session.to_string());
        Ok(())
    }

    async fn navigate(&self, session: &str, url: &str) -> BrowserResult<PageInfo> {
        self.with_session(session, |st| self.enter_page(st, url))
    }

    async fn go_back(&self, session: &str) -> BrowserResult<PageInfo> {
        self.with_session(session, |st| {
            let active = st.active;
            let tab = &mut st.tabs[active];
            if tab.history.len() < 2 {
                return Err(BrowserError::NavigationTimeout("no history".into()));
            }
            tab.history.pop();
            let url = tab.current_url().to_string();
            let page = self
                .page_for(&url)
                .ok_or_else(|| BrowserError::NavigationTimeout(url.clone()))?;
            Ok(page_info(&url, &page))
        })
    }

    async fn click(&self, session: &str, element_id: u32) -> BrowserResult<()> {
        let target = self.with_session(session, |st| {
            let page = self.current_page(st)?;
            Self::require_element(&page, element_id)?;
            Ok(page.click_navigates.get(&element_id).cloned())
        })?;
        if let Some(url) = target {
            self.with_session(session, |st| self.enter_page(st, &url))?;
        }
        Ok(())
    }

    async fn type_text(&self, session: &str, element_id: u32, text: &str) -> BrowserResult<()> {
        self.with_session(session, |st| {
            let page = self.current_page(st)?;
            Self::require_element(&page, element_id)?;
            st.typed.insert((st.active, element_id), text.to_string());
            Ok(())
        })
    }

    async fn press_key(&self, session: &str, _key: &str) -> BrowserResult<()> {
        self.with_session(session, |st| {
            self.current_page(st)?;
            Ok(())
        })
    }

    async fn scroll(&self, session: &str, _dx: i64, _dy: i64) -> BrowserResult<()> {
        self.with_session(session, |st| {
            self.current_page(st)?;
            Ok(())
        })
    }

    async fn select_option(
        &self,
        session: &str,
        element_id: u32,
        value: &str,
    ) -> BrowserResult<()> {
        self.set_value(session, element_id, value).await
    }

    async fn hover(&self, session: &str, element_id: u32) -> BrowserResult<()> {
        self.with_session(session, |st| {
            let page = self.current_page(st)?;
            Self::require_element(&page, element_id)
        })
    }

    async fn set_value(&self, session: &str, element_id: u32, value: &str) -> BrowserResult<()> {
        self.with_session(session, |st| {
            let page = self.current_page(st)?;
            Self::require_element(&page, element_id)?;
            st.typed.insert((st.active, element_id), value.to_string());
            Ok(())
        })
    }

    async fn upload_file(&self, session: &str, element_id: u32, path: &str) -> BrowserResult<()> {
        self.set_value(session, element_id, path).await
    }

    async fn wait_for_stable(&self, session: &str, _timeout_ms: u64) -> BrowserResult<bool> {
        self.with_session(session, |_| Ok(true))
    }

    async fn screenshot(&self, session: &str) -> BrowserResult<Vec<u8>> {
        self.with_session(session, |st| {
            let page = self.current_page(st)?;
            Ok(format!("PNG:{}", page.title).into_bytes())
        })
    }

    async fn evaluate(&self, session: &str, script: &str) -> BrowserResult<Value> {
        self.with_session(session, |st| {
            let page = self.current_page(st)?;
            Ok(page.eval_results.get(script).cloned().unwrap_or(Value::Null))
        })
    }

    async fn page_info(&self, session: &str) -> BrowserResult<PageInfo> {
        self.with_session(session, |st| {
            let url = st.tabs[st.active].current_url().to_string();
            let page = self.current_page(st)?;
            Ok(page_info(&url, &page))
        })
    }

    async fn page_html(&self, session: &str) -> BrowserResult<String> {
        self.with_session(session, |st| Ok(self.current_page(st)?.html))
    }

    async fn find_element(
        &self,
        session: &str,
        query: &str,
    ) -> BrowserResult<Option<ElementInfo>> {
        self.with_session(session, |st| {
            let page = self.current_page(st)?;
            let q = query.to_lowercase();
            Ok(page
                .elements
                .iter()
                .find(|e| e.name.to_lowercase().contains(&q) || e.role.to_lowercase() == q)
                .cloned())
        })
    }

    async fn query_selector(
        &self,
        session: &str,
        selector: &str,
    ) -> BrowserResult<Option<ElementInfo>> {
        self.with_session(session, |st| {
            let page = self.current_page(st)?;
            Ok(page
                .elements
                .iter()
                .find(|e| e.selector.as_deref() == Some(selector))
                .cloned())
        })
    }

    async fn dialog_info(&self, session: &str) -> BrowserResult<Option<DialogInfo>> {
        self.with_session(session, |st| Ok(st.dialog.clone()))
    }

    async fn handle_dialog(
        &self,
        session: &str,
        _accept: bool,
        _prompt_text: Option<&str>,
    ) -> BrowserResult<()> {
        self.with_session(session, |st| {
            if st.dialog.take().is_none() {
                return Err(BrowserError::Execution("no open dialog".into()));
            }
            Ok(())
        })
    }

    async fn console_logs(&self, session: &str) -> BrowserResult<Vec<ConsoleEntry>> {
        self.with_session(session, |st| Ok(st.console.clone()))
    }

    async fn network_logs(&self, session: &str) -> BrowserResult<Vec<NetworkEntry>> {
        self.with_session(session, |st| Ok(st.network.clone()))
    }

    async fn downloads(&self, session: &str) -> BrowserResult<Vec<DownloadEntry>> {
        self.with_session(session, |st| Ok(st.downloads.clone()))
    }

    async fn list_tabs(&self, session: &str) -> BrowserResult<Vec<TabInfo>> {
        self.with_session(session, |st| {
            Ok(st
                .tabs
                .iter()
                .enumerate()
                .map(|(i, tab)| {
                    let title = self
                        .page_for(tab.current_url())
                        .map(|p| p.title)
                        .unwrap_or_default();
                    TabInfo {
                        id: tab.id.clone(),
                        url: tab.current_url().to_string(),
                        title,
                        active: i == st.active,
                    }
                })
                .collect())
        })
    }

    async fn create_tab(&self, session: &str, url: Option<&str>) -> BrowserResult<TabInfo> {
        let tab_id = format!("tab_{}", Uuid::new_v4());
        self.with_session(session, |st| {
            st.tabs.push(TabState {
                id: tab_id.clone(),
                history: Vec::new(),
            });
            st.active = st.tabs.len() - 1;
            Ok(())
        })?;
        if let Some(u) = url {
            self.with_session(session, |st| self.enter_page(st, u))?;
        }
        self.with_session(session, |st| {
            let tab = &st.tabs[st.active];
            let title = self
                .page_for(tab.current_url())
                .map(|p| p.title)
                .unwrap_or_default();
            Ok(TabInfo {
                id: tab.id.clone(),
                url: tab.current_url().to_string(),
                title,
                active: true,
            })
        })
    }

    async fn close_tab(&self, session: &str, tab_id: &str) -> BrowserResult<()> {
        self.with_session(session, |st| {
            let idx = st
                .tabs
                .iter()
                .position(|t| t.id == tab_id)
                .ok_or_else(|| BrowserError::TabNotFound(tab_id.to_string()))?;
            st.tabs.remove(idx);
            if st.tabs.is_empty() {
                st.tabs.push(TabState {
                    id: format!("tab_{}", Uuid::new_v4()),
                    history: Vec::new(),
                });
            }
            if st.active >= st.tabs.len() {
                st.active = st.tabs.len() - 1;
            }
            Ok(())
        })
    }

    async fn switch_tab(&self, session: &str, tab_id: &str) -> BrowserResult<()> {
        self.with_session(session, |st| {
            let idx = st
                .tabs
                .iter()
                .position(|t| t.id == tab_id)
                .ok_or_else(|| BrowserError::TabNotFound(tab_id.to_string()))?;
            st.active = idx;
            Ok(())
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn browser() -> FakeBrowser {
        FakeBrowser::new()
            .with_page(
                "https://example.com/",
                FakePage::new("Example")
                    .with_html("<h1>Example</h1>")
                    .with_element(1, "link", "More information")
                    .with_heading("Example")
                    .with_click_nav(1, "https://example.com/more"),
            )
            .with_page("https://example.com/more", FakePage::new("More"))
    }

    #[tokio::test]
    async fn navigate_returns_page_info() {
        let b = browser();
        let s = b.create_session().await.unwrap();
        let info = b.navigate(&s, "https://example.com/").await.unwrap();
        assert_eq!(info.title, "Example");
        assert_eq!(info.elements.len(), 1);
    }

    #[tokio::test]
    async fn navigate_unknown_url_times_out() {
        let b = browser();
        let s = b.create_session().await.unwrap();
        let err = b.navigate(&s, "https://nowhere.test/").await.unwrap_err();
        assert!(matches!(err, BrowserError::NavigationTimeout(_)));
    }

    #[tokio::test]
    async fn click_follows_configured_navigation() {
        let b = browser();
        let s = b.create_session().await.unwrap();
        b.navigate(&s, "https://example.com/").await.unwrap();
        b.click(&s, 1).await.unwrap();
        let info = b.page_info(&s).await.unwrap();
        assert_eq!(info.title, "More");
    }

    #[tokio::test]
    async fn go_back_pops_history() {
        let b = browser();
        let s = b.create_session().await.unwrap();
        b.navigate(&s, "https://example.com/").await.unwrap();
        b.click(&s, 1).await.unwrap();
        let info = b.go_back(&s).await.unwrap();
        assert_eq!(info.title, "Example");
    }

    #[tokio::test]
    async fn click_missing_element_errors() {
        let b = browser();
        let s = b.create_session().await.unwrap();
        b.navigate(&s, "https://example.com/").await.unwrap();
        let err = b.click(&s, 99).await.unwrap_err();
        assert!(matches!(err, BrowserError::ElementNotFound(_)));
    }

    #[tokio::test]
    async fn type_text_recorded_per_element() {
        let b = FakeBrowser::new().with_page(
            "https://login.test/",
            FakePage::new("Login").with_element(10, "textbox", "Username"),
        );
        let s = b.create_session().await.unwrap();
        b.navigate(&s, "https://login.test/").await.unwrap();
        b.type_text(&s, 10, "alice").await.unwrap();
        assert_eq!(b.typed_value(&s, 10).as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn unknown_session_is_rejected() {
        let b = browser();
        let err = b.page_info("sess_missing").await.unwrap_err();
        assert!(matches!(err, BrowserError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn close_session_records_closure() {
        let b = browser();
        let s = b.create_session().await.unwrap();
        b.close_session(&s).await.unwrap();
        assert!(b.was_closed(&s));
        assert_eq!(b.open_session_count(), 0);
    }

    #[tokio::test]
    async fn crash_url_reports_page_crash() {
        let b = FakeBrowser::new().with_crash("https://broken.test/");
        let s = b.create_session().await.unwrap();
        let err = b.navigate(&s, "https://broken.test/").await.unwrap_err();
        assert!(matches!(err, BrowserError::PageCrashed));
    }

    #[tokio::test]
    async fn tabs_create_switch_close() {
        let b = browser();
        let s = b.create_session().await.unwrap();
        b.navigate(&s, "https://example.com/").await.unwrap();
        let tab = b
            .create_tab(&s, Some("https://example.com/more"))
            .await
            .unwrap();
        assert!(tab.active);
        let tabs = b.list_tabs(&s).await.unwrap();
        assert_eq!(tabs.len(), 2);
        b.close_tab(&s, &tab.id).await.unwrap();
        let tabs = b.list_tabs(&s).await.unwrap();
        assert_eq!(tabs.len(), 1);
    }

    #[tokio::test]
    async fn find_element_matches_name_substring() {
        let b = browser();
        let s = b.create_session().await.unwrap();
        b.navigate(&s, "https://example.com/").await.unwrap();
        let found = b.find_element(&s, "more info").await.unwrap();
        assert_eq!(found.unwrap().id, 1);
    }

    #[tokio::test]
    async fn query_selector_requires_exact_match() {
        let b = FakeBrowser::new().with_page(
            "https://sel.test/",
            FakePage::new("Sel")
                .with_element_selector(5, "textbox", "Username", "#user")
                .with_element(6, "button", "Submit"),
        );
        let s = b.create_session().await.unwrap();
        b.navigate(&s, "https://sel.test/").await.unwrap();
        assert_eq!(b.query_selector(&s, "#user").await.unwrap().unwrap().id, 5);
        // Accessible names are not selectors.
        assert!(b.query_selector(&s, "Username").await.unwrap().is_none());
        // Elements without a stable selector are not addressable this way.
        assert!(b.query_selector(&s, "Submit").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dialog_lifecycle() {
        let b = FakeBrowser::new().with_page(
            "https://dlg.test/",
            FakePage::new("Dlg").with_dialog("confirm", "Proceed?"),
        );
        let s = b.create_session().await.unwrap();
        b.navigate(&s, "https://dlg.test/").await.unwrap();
        let dlg = b.dialog_info(&s).await.unwrap().unwrap();
        assert_eq!(dlg.kind, "confirm");
        b.handle_dialog(&s, true, None).await.unwrap();
        assert!(b.dialog_info(&s).await.unwrap().is_none());
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Composite ops: each expands locally into sub-calls of the primitive
//! browser ops and aggregates their results into one payload.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use rudder_runs::{ErrorCode, RunError};

use super::{arg_str, do_navigate, do_page_content, map_err, page_info_value, Driver};
use crate::tool::{Tool, ToolCall};
use crate::urlcheck::UrlValidator;

/// Resolve a form target: explicit elementId wins, else a semantic query.
async fn resolve_element(driver: &Driver, session: &str, field: &Value) -> Result<u32, RunError> {
    if let Some(id) = field.get("elementId").and_then(Value::as_u64) {
        return Ok(id as u32);
    }
    let query = field
        .get("query")
        .and_then(Value::as_str)
        .ok_or_else(|| RunError::invalid_parameter("fields", "each field needs elementId or query"))?;
    let found = driver
        .find_element(session, query)
        .await
        .map_err(map_err)?;
    found.map(|e| e.id).ok_or_else(|| {
        RunError::new(
            ErrorCode::ElementNotFound,
            format!("no element matching '{query}'"),
        )
    })
}

pub struct FillFormTool {
    driver: Driver,
}

impl FillFormTool {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Tool for FillFormTool {
    fn name(&self) -> &str {
        "fill_form"
    }

    fn description(&self) -> &str {
        "Fill several form fields in one call and optionally click a submit \
         target. Fields address elements by id or by semantic query; each \
         field reports its own success so one bad selector does not lose \
         the rest."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sessionId": { "type": "string" },
                "fields": {
                    "type": "array",
                    "description": "[{elementId|query, value, typed?}] — typed=true uses keystrokes",
                },
                "submit": { "type": "object", "description": "{elementId|query} to click after filling" },
            },
            "required": ["sessionId", "fields"],
        })
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let session = arg_str(&call.args, "sessionId")?;
        let fields = call
            .args
            .get("fields")
            .and_then(Value::as_array)
            .ok_or_else(|| RunError::invalid_parameter("fields", "expected array"))?;

        let mut results = Vec::new();
        let mut failed = 0usize;
        for field in fields {
            let value = field.get("value").and_then(Value::as_str).unwrap_or("");
            let outcome = async {
                let element = resolve_element(&self.driver, session, field).await?;
                if field.get("typed").and_then(Value::as_bool) == Some(true) {
                    self.driver
                        .type_text(session, element, value)
                        .await
                        .map_err(map_err)?;
                } else {
                    self.driver
                        .set_value(session, element, value)
                        .await
                        .map_err(map_err)?;
                }
                Ok::<u32, RunError>(element)
            }
            .await;
            match outcome {
                Ok(element) => results.push(json!({ "elementId": element, "success": true })),
                Err(e) => {
                    failed += 1;
                    results.push(json!({ "success": false, "error": e.message }));
                }
            }
        }

        let mut submitted = false;
        if let Some(submit) = call.args.get("submit") {
            if failed == 0 {
                let element = resolve_element(&self.driver, session, submit).await?;
                self.driver.click(session, element).await.map_err(map_err)?;
                submitted = true;
            }
        }

        Ok(json!({
            "fields": results,
            "submitted": submitted,
            "summary": {
                "total": fields.len(),
                "succeeded": fields.len() - failed,
                "failed": failed,
            },
        }))
    }
}

pub struct ClickAndWaitTool {
    driver: Driver,
}

impl ClickAndWaitTool {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Tool for ClickAndWaitTool {
    fn name(&self) -> &str {
        "click_and_wait"
    }

    fn description(&self) -> &str {
        "Click an element, wait for the page to settle, and return the \
         fresh page snapshot — the common navigate-by-click sequence as \
         one call."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sessionId": { "type": "string" },
                "elementId": { "type": "integer" },
                "timeoutMs": { "type": "integer" },
            },
            "required": ["sessionId", "elementId"],
        })
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let session = arg_str(&call.args, "sessionId")?;
        let element = call
            .args
            .get("elementId")
            .and_then(Value::as_u64)
            .ok_or_else(|| RunError::invalid_parameter("elementId", "expected integer"))?
            as u32;
        let timeout = call
            .args
            .get("timeoutMs")
            .and_then(Value::as_u64)
            .unwrap_or(5000);

        self.driver.click(session, element).await.map_err(map_err)?;
        let stable = self
            .driver
            .wait_for_stable(session, timeout)
            .await
            .map_err(map_err)?;
        let info = self.driver.page_info(session).await.map_err(map_err)?;
        let mut out = page_info_value(&info);
        out["stable"] = json!(stable);
        Ok(out)
    }
}

pub struct NavigateAndExtractTool {
    driver: Driver,
    validator: Arc<UrlValidator>,
}

impl NavigateAndExtractTool {
    pub fn new(driver: Driver, validator: Arc<UrlValidator>) -> Self {
        Self { driver, validator }
    }
}

#[async_trait]
impl Tool for NavigateAndExtractTool {
    fn name(&self) -> &str {
        "navigate_and_extract"
    }

    fn description(&self) -> &str {
        "Navigate to a URL and extract in one call: page info (structure) \
         and/or readable content, selected via the extract object."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sessionId": { "type": "string" },
                "url": { "type": "string" },
                "extract": {
                    "type": "object",
                    "description": "{pageInfo?: bool, content?: bool} — both default true",
                },
                "maxChars": { "type": "integer" },
            },
            "required": ["sessionId", "url"],
        })
    }

    fn char_budget(&self) -> usize {
        12_000
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, RunError> {
        let session = arg_str(&call.args, "sessionId")?;
        let url = arg_str(&call.args, "url")?;
        let want_info = call.args["extract"]["pageInfo"].as_bool().unwrap_or(true);
        let want_content = call.args["extract"]["content"].as_bool().unwrap_or(true);
        let max_chars = call
            .args
            .get("maxChars")
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(50_000);

        let nav = do_navigate(&self.driver, &self.validator, session, url).await?;
        let mut out = json!({
            "url": nav["url"],
            "title": nav["title"],
        });
        if want_info {
            out["pageInfo"] = nav;
        }
        if want_content {
            let content = do_page_content(&self.driver, session, max_chars).await?;
            out["content"] = content["text"].clone();
        }
        Ok(out)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rudder_browser::{FakeBrowser, FakePage};
    use rudder_config::UrlPolicyConfig;
    use crate::urlcheck::StaticResolver;

    fn validator() -> Arc<UrlValidator> {
        let resolver = StaticResolver::new()
            .with_host("forms.test", vec!["93.184.216.34".parse().unwrap()]);
        Arc::new(UrlValidator::with_resolver(
            UrlPolicyConfig {
                allow_file: false,
                block_private: true,
            },
            Arc::new(resolver),
        ))
    }

    fn form_browser() -> Arc<FakeBrowser> {
        Arc::new(
            FakeBrowser::new().with_page(
                "https://forms.test/",
                FakePage::new("Form")
                    .with_html("<h1>Form</h1><p>Fill me in</p>")
                    .with_element(1, "textbox", "Username")
                    .with_element(2, "textbox", "Password")
                    .with_element(3, "button", "Sign in")
                    .with_click_nav(3, "https://forms.test/done"),
            )
            .with_page("https://forms.test/done", FakePage::new("Done")),
        )
    }

    async fn seeded_session(browser: &Arc<FakeBrowser>) -> String {
        use rudder_browser::BrowserDriver;
        let s = browser.create_session().await.unwrap();
        browser.navigate(&s, "https://forms.test/").await.unwrap();
        s
    }

    #[tokio::test]
    async fn fill_form_sets_fields_and_submits() {
        let browser = form_browser();
        let session = seeded_session(&browser).await;
        let tool = FillFormTool::new(browser.clone());
        let out = tool
            .execute(&ToolCall::new(
                "1",
                "fill_form",
                json!({
                    "sessionId": session,
                    "fields": [
                        { "query": "username", "value": "alice" },
                        { "elementId": 2, "value": "secret" },
                    ],
                    "submit": { "query": "sign in" },
                }),
            ))
            .await
            .unwrap();
        assert_eq!(out["summary"]["succeeded"], 2);
        assert_eq!(out["submitted"], true);
        assert_eq!(browser.typed_value(&session, 2), None); // navigated away
    }

    #[tokio::test]
    async fn fill_form_isolates_bad_fields() {
        let browser = form_browser();
        let session = seeded_session(&browser).await;
        let tool = FillFormTool::new(browser.clone());
        let out = tool
            .execute(&ToolCall::new(
                "1",
                "fill_form",
                json!({
                    "sessionId": session,
                    "fields": [
                        { "query": "username", "value": "alice" },
                        { "query": "no such field", "value": "x" },
                    ],
                }),
            ))
            .await
            .unwrap();
        assert_eq!(out["summary"]["succeeded"], 1);
        assert_eq!(out["summary"]["failed"], 1);
    }

    #[tokio::test]
    async fn click_and_wait_returns_new_page() {
        let browser = form_browser();
        let session = seeded_session(&browser).await;
        let tool = ClickAndWaitTool::new(browser.clone());
        let out = tool
            .execute(&ToolCall::new(
                "1",
                "click_and_wait",
                json!({ "sessionId": session, "elementId": 3 }),
            ))
            .await
            .unwrap();
        assert_eq!(out["title"], "Done");
        assert_eq!(out["stable"], true);
    }

    #[tokio::test]
    async fn navigate_and_extract_aggregates() {
        let browser = form_browser();
        use rudder_browser::BrowserDriver;
        let session = browser.create_session().await.unwrap();
        let tool = NavigateAndExtractTool::new(browser.clone(), validator());
        let out = tool
            .execute(&ToolCall::new(
                "1",
                "navigate_and_extract",
                json!({
                    "sessionId": session,
                    "url": "https://forms.test/",
                    "extract": { "pageInfo": true, "content": true },
                }),
            ))
            .await
            .unwrap();
        assert_eq!(out["title"], "Form");
        assert!(out["pageInfo"]["elements"].as_array().unwrap().len() >= 3);
        assert!(out["content"].as_str().unwrap().contains("Fill me in"));
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Browser-op tools: thin schema'd wrappers over the [`BrowserDriver`]
//! contract, plus the composite tools that expand into sub-calls.

mod composite;
mod diag;
mod input;
mod nav;
mod observe;
mod session;

use std::sync::Arc;

use serde_json::Value;

use rudder_browser::{BrowserDriver, BrowserError, PageInfo};
use rudder_runs::{ArtifactStore, ErrorCode, RunError};

use crate::registry::ToolRegistry;
use crate::urlcheck::UrlValidator;

pub use composite::{ClickAndWaitTool, FillFormTool, NavigateAndExtractTool};
pub use diag::{
    DialogInfoTool, DownloadsTool, GetConsoleLogsTool, GetNetworkLogsTool, HandleDialogTool,
};
pub use input::{
    ClickTool, HoverTool, PressKeyTool, ScrollTool, SelectOptionTool, SetValueTool, TypeTextTool,
    UploadFileTool,
};
pub use nav::{GoBackTool, NavigateTool, WaitForStableTool, WaitTool};
pub use observe::{
    ExecuteJavascriptTool, FindElementTool, GetPageContentTool, GetPageInfoTool, ScreenshotTool,
};
pub use session::{
    CloseSessionTool, CloseTabTool, CreateSessionTool, CreateTabTool, ListTabsTool, SwitchTabTool,
};

pub(crate) type Driver = Arc<dyn BrowserDriver>;

/// Register the full browser cluster (28 primitive ops + 3 composites).
pub fn register_browser_tools(
    registry: &mut ToolRegistry,
    driver: Driver,
    validator: Arc<UrlValidator>,
    artifacts: Arc<ArtifactStore>,
) {
    registry.register(CreateSessionTool::new(driver.clone()));
    registry.register(CloseSessionTool::new(driver.clone()));
    registry.register(ListTabsTool::new(driver.clone()));
    registry.register(CreateTabTool::new(driver.clone(), validator.clone()));
    registry.register(CloseTabTool::new(driver.clone()));
    registry.register(SwitchTabTool::new(driver.clone()));

    registry.register(NavigateTool::new(driver.clone(), validator.clone()));
    registry.register(GoBackTool::new(driver.clone()));
    registry.register(WaitTool::new());
    registry.register(WaitForStableTool::new(driver.clone()));

    registry.register(ClickTool::new(driver.clone()));
    registry.register(TypeTextTool::new(driver.clone()));
    registry.register(PressKeyTool::new(driver.clone()));
    registry.register(ScrollTool::new(driver.clone()));
    registry.register(SelectOptionTool::new(driver.clone()));
    registry.register(HoverTool::new(driver.clone()));
    registry.register(SetValueTool::new(driver.clone()));
    registry.register(UploadFileTool::new(driver.clone()));

    registry.register(GetPageInfoTool::new(driver.clone()));
    registry.register(GetPageContentTool::new(driver.clone()));
    registry.register(FindElementTool::new(driver.clone()));
    registry.register(ScreenshotTool::new(driver.clone(), artifacts));
    registry.register(ExecuteJavascriptTool::new(driver.clone()));

    registry.register(DialogInfoTool::new(driver.clone()));
    registry.register(HandleDialogTool::new(driver.clone()));
    registry.register(GetConsoleLogsTool::new(driver.clone()));
    registry.register(GetNetworkLogsTool::new(driver.clone()));
    registry.register(DownloadsTool::new(driver.clone()));

    registry.register(FillFormTool::new(driver.clone()));
    registry.register(ClickAndWaitTool::new(driver.clone()));
    registry.register(NavigateAndExtractTool::new(driver, validator));
}

/// Map driver failures to the wire taxonomy.
pub(crate) fn map_err(e: BrowserError) -> RunError {
    let code = match &e {
        BrowserError::SessionNotFound(_) => ErrorCode::SessionNotFound,
        BrowserError::TabNotFound(_) => ErrorCode::InvalidParameter,
        BrowserError::PageCrashed => ErrorCode::PageCrashed,
        BrowserError::NavigationTimeout(_) => ErrorCode::NavigationTimeout,
        BrowserError::ElementNotFound(_) => ErrorCode::ElementNotFound,
        BrowserError::Execution(_) => ErrorCode::ExecutionError,
    };
    RunError::new(code, e.to_string())
}

pub(crate) fn arg_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, RunError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| RunError::invalid_parameter(key, "expected string"))
}

pub(crate) fn arg_u32(args: &Value, key: &str) -> Result<u32, RunError> {
    args.get(key)
        .and_then(Value::as_u64)
        .map(|v| v as u32)
        .ok_or_else(|| RunError::invalid_parameter(key, "expected integer"))
}

pub(crate) fn page_info_value(info: &PageInfo) -> Value {
    serde_json::to_value(info).unwrap_or_else(|_| Value::Object(Default::default()))
}

/// Navigate with URL validation; shared by the primitive and composite
/// tools so the ingress check cannot be bypassed.
pub(crate) async fn do_navigate(
    driver: &Driver,
    validator: &UrlValidator,
    session: &str,
    url: &str,
) -> Result<Value, RunError> {
    validator.validate_resolved(url).await?;
    let info = driver.navigate(session, url).await.map_err(map_err)?;
    Ok(page_info_value(&info))
}

/// Extract readable text from the active document.
pub(crate) async fn do_page_content(
    driver: &Driver,
    session: &str,
    max_chars: usize,
) -> Result<Value, RunError> {
    let html = driver.page_html(session).await.map_err(map_err)?;
    let info = driver.page_info(session).await.map_err(map_err)?;
    let mut text = html2text::from_read(html.as_bytes(), 100);
    let mut truncated = false;
    if text.len() > max_chars {
        let mut cut = max_chars;
        while cut > 0 && !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        truncated = true;
    }
    Ok(serde_json::json!({
        "url": info.url,
        "title": info.title,
        "text": text,
        "truncated": truncated,
    }))
}

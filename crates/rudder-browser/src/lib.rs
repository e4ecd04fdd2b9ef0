// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod driver;
mod fake;
mod types;

pub use driver::{BrowserDriver, BrowserError, BrowserResult};
pub use fake::{FakeBrowser, FakePage};
pub use types::{
    ConsoleEntry, DialogInfo, DownloadEntry, ElementInfo, NetworkEntry, PageInfo, Rect, TabInfo,
};

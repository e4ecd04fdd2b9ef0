// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod browser;
mod budget;
mod enrich;
mod registry;
mod tool;
mod urlcheck;
mod validate;

pub use browser::register_browser_tools;
pub use budget::format_within_budget;
pub use enrich::{Enricher, AI_SCHEMA_VERSION};
pub use registry::ToolRegistry;
pub use tool::{Tool, ToolCall, ToolOutput, ToolSchema};
pub use urlcheck::{DnsResolver, StaticResolver, SystemResolver, UrlValidator};
pub use validate::validate_args;

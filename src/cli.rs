// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// LLM-facing browser automation server: task orchestration and agent
/// control plane.
#[derive(Parser, Debug)]
#[command(name = "rudder", version, about)]
pub struct Cli {
    /// Explicit config file (merged over the discovered layers).
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging to stderr (RUST_LOG still takes precedence).
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the control plane over a transport (default: http).
    Serve {
        #[command(subcommand)]
        transport: Option<ServeCommands>,
    },

    /// Print the merged configuration and exit.
    ShowConfig,

    /// Print the runtime profile (concurrency, trust level, modes).
    Profile,
}

#[derive(Subcommand, Debug)]
pub enum ServeCommands {
    /// REST + SSE surface on a TCP address.
    Http {
        #[arg(long, default_value = "127.0.0.1:8700")]
        addr: SocketAddr,
    },

    /// Tool protocol (MCP) over stdio, for editor and agent clients.
    Mcp,
}

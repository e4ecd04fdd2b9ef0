// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod agent;
mod conversation;
mod events;
mod progress;
mod recovery;
mod tracker;

pub use agent::{AgentGoal, AgentLoop, AgentOutcome};
pub use conversation::ConversationManager;
pub use events::AgentEvent;
pub use progress::{phase_for, progress_percent, AgentPhase};
pub use recovery::{backoff_ms, decide, RecoveryAction, RecoveryContext};
pub use tracker::{DetectedPattern, ToolCallRecord, ToolUsageTracker};

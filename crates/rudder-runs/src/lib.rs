// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod artifact;
mod cancel;
mod error;
mod manager;
mod run;

pub use artifact::{Artifact, ArtifactKind, ArtifactStore};
pub use cancel::CancelToken;
pub use error::{ErrorCode, RunError};
pub use manager::{
    ExecutorFuture, ListFilter, ListResult, ProgressHandle, RunContext, RunExecutor, RunManager,
    SubmitMode, SubmitOptions, SubmitOutcome, SubmitRequest, TerminalHook,
};
pub use run::{derive_status, Run, RunMetrics, RunProgress, RunStatus};

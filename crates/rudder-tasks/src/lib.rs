// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod events;
mod planner;
mod service;
mod spec;
pub mod templates;
mod tools;
mod verifier;

pub use events::TaskEvent;
pub use planner::Planner;
pub use service::{TaskRecord, TaskService};
pub use spec::{
    Constraints, OutputSchema, Plan, PlanSource, PlanStep, SchemaType, TaskBudget, TaskSpec,
};
pub use tools::register_task_tools;
pub use verifier::{repair_hints, verify, TypeMismatch, Verification};

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use tokio::sync::broadcast;

use rudder_tasks::{TaskEvent, TaskService};

/// Stream a task's events as SSE.
///
/// The stream always terminates with a `done` event: live tasks get it
/// from the orchestrator, and subscribers that arrive after the task
/// finished (or after the channel is gone) get a synthesized one built
/// from the stored record.
pub fn events_stream(
    service: TaskService,
    task_id: String,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = if already_terminal(&service, &task_id) {
        None
    } else {
        service.subscribe(&task_id)
    };

    let state = StreamState {
        service,
        task_id,
        rx,
        finished: false,
    };

    let stream = futures::stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        let Some(rx) = state.rx.as_mut() else {
            state.finished = true;
            let event = synth_done(&state.service, &state.task_id);
            return Some((Ok(event), state));
        };
        loop {
            match rx.recv().await {
                Ok(task_event) => {
                    if matches!(task_event, TaskEvent::Done { .. }) {
                        state.finished = true;
                    }
                    return Some((Ok(render(&task_event)), state));
                }
                // A slow consumer skips events rather than killing the stream.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    state.finished = true;
                    let event = synth_done(&state.service, &state.task_id);
                    return Some((Ok(event), state));
                }
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

struct StreamState {
    service: TaskService,
    task_id: String,
    rx: Option<broadcast::Receiver<TaskEvent>>,
    finished: bool,
}

fn already_terminal(service: &TaskService, task_id: &str) -> bool {
    service
        .get_task(task_id)
        .map(|r| r.last_event == "done")
        .unwrap_or(true)
}

fn render(event: &TaskEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Event::default().event(event.name()).data(data)
}

/// Synthesize the terminal event from the stored record when the live
/// channel is unavailable.
fn synth_done(service: &TaskService, task_id: &str) -> Event {
    let (success, trace_id) = service
        .get_task(task_id)
        .map(|r| {
            (
                matches!(r.status.as_str(), "succeeded" | "partial_success"),
                r.trace_id,
            )
        })
        .unwrap_or((false, String::new()));
    render(&TaskEvent::Done { success, trace_id })
}

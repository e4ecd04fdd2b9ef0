// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod routes;
mod sse;

pub use routes::router;

use rudder_tasks::TaskService;

/// Serve the REST surface until the process is shut down.
pub async fn serve(service: TaskService, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = router(service);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}

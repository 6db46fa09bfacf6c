//! Notification Worker - Entry Point
//!
//! Consumes notification events, serves the read API and WebSocket feed.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    core_config::tracing::install_color_eyre();
    notification_worker::run().await
}

//! lementor binary entry point

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = leserveur::ServeurConfig::from_env();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(
        host = %config.host,
        port = config.port,
        data_dir = %config.data_dir,
        media_dir = %config.media_dir,
        "LeMentor starting"
    );

    let server = leserveur::LeMentorServer::new(config)?;
    tracing::info!(url = %server.server_url(), live = %server.websocket_url(), "ready");

    server.start().await?;
    Ok(())
}

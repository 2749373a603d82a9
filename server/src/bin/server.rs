use callboard_core::telemetry::init_tracing;
use callboard_core::CallboardConfig;
use callboard_server::start_server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let config = CallboardConfig::load();
    init_tracing(config.log_format);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    start_server(config, shutdown).await.map_err(|e| e.into())
}

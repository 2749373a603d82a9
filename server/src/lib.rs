use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use callboard_core::{
    CallLogService, CallboardConfig, CallboardError, DashboardServer, EventBroadcaster,
    SqliteCallLogStore,
};

#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("startup failed: {0}")]
    Startup(#[from] CallboardError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// Open the store and build the HTTP server around it
pub fn build_server(config: &CallboardConfig) -> Result<DashboardServer> {
    let store = SqliteCallLogStore::open(&config.database_path)?;
    let broadcaster = EventBroadcaster::new(config.channel_capacity);
    let service = CallLogService::from_config(Arc::new(store), broadcaster, config);
    Ok(DashboardServer::new(config.clone(), service))
}

/// Run until `shutdown` resolves
pub async fn start_server<F>(config: CallboardConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let server = build_server(&config)?;
    let listener = TcpListener::bind(config.bind_addr()).await?;
    info!(
        addr = %listener.local_addr()?,
        db = %config.database_path.display(),
        office = %config.office_number,
        "Starting Callboard server"
    );
    server.serve_with_shutdown(listener, shutdown).await?;
    info!("Callboard server stopped");
    Ok(())
}

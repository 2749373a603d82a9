use std::time::Duration;

use callboard_core::CallboardConfig;
use callboard_server::{build_server, start_server};

fn test_config(dir: &tempfile::TempDir) -> CallboardConfig {
    CallboardConfig {
        host: "127.0.0.1".into(),
        port: 0,
        database_path: dir.path().join("nested/callboard.db"),
        ..CallboardConfig::default()
    }
}

#[tokio::test]
async fn build_server_creates_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);

    let server = build_server(&config).expect("server should build");
    assert_eq!(server.broadcaster().channel_count(), 0);
    assert!(config.database_path.exists());
}

#[tokio::test]
async fn start_server_stops_on_shutdown_signal() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let handle = tokio::spawn(start_server(test_config(&dir), async move {
        let _ = rx.await;
    }));

    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(()).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server should stop")
        .expect("task should not panic");
    assert!(result.is_ok());
}

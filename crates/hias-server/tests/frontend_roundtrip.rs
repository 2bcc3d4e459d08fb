//! Drive a live `HttpFrontend` with the xDNN HTTP test client.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use hias_channels::MockChannel;
use hias_config::HiasConfig;
use hias_model::{MockModel, ModelFacade, XdnnModel};
use hias_runtime::InferenceFrontend;
use hias_server::HttpFrontend;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_until_listening(addr: &str) {
    for _ in 0..100 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("server never started listening on {addr}");
}

#[tokio::test]
async fn test_classify_http_against_running_frontend() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(
        tmp.path().join("sample.json"),
        r#"[{"label": "ALL", "features": [1.0, 0.0]}, {"features": [0.0, 1.0]}]"#,
    )
    .unwrap();

    let mut config = HiasConfig::default();
    config.server.listen = format!("127.0.0.1:{}", free_port());
    config.model.test_dir = tmp.path().to_path_buf();
    let config = Arc::new(config);

    let token = CancellationToken::new();
    let channel = Arc::new(MockChannel::new());
    let server = {
        let config = config.clone();
        let token = token.clone();
        let channel = channel.clone();
        tokio::spawn(async move {
            HttpFrontend
                .start(
                    config,
                    Arc::new(MockModel::new().with_prediction("ALL", 0.8).ready()),
                    channel,
                    token,
                )
                .await
        })
    };
    wait_until_listening(&config.server.listen).await;

    let client = XdnnModel::new(config.model.clone(), &config.server);
    client.test_http().await.unwrap();

    token.cancel();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_bind_failure_is_server_error() {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = HiasConfig::default();
    config.server.listen = occupied.local_addr().unwrap().to_string();

    let err = HttpFrontend
        .start(
            Arc::new(config),
            Arc::new(MockModel::new()),
            Arc::new(MockChannel::new()),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, hias_core::HiasError::Server(_)));
}

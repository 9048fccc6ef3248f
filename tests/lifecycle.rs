//! Start/stop behaviour of the proxy controller.

use std::time::Duration;

use tokio::net::TcpListener;
use token_relay::config::{ConfigError, ValidationError};
use token_relay::{LifecycleError, ProxyConfig, ProxyController};

mod common;

#[tokio::test]
async fn test_start_then_stop() {
    let port = 28301;
    let backend = common::start_echo_backend().await;
    let mut controller = ProxyController::new();
    assert!(!controller.is_running());

    let report = controller
        .start(common::proxy_config(port, format!("http://{}", backend)))
        .await
        .unwrap();
    assert!(controller.is_running());
    assert_eq!(report.local_addr.port(), port);
    assert!(!report.auth_enabled);
    assert!(report.to_string().contains("28301"));

    let echoed = common::echoed(port, "/ping").await;
    assert_eq!(echoed["uri"], "/ping");

    let stopped = controller.stop().await.unwrap();
    assert!(stopped.drained);
    assert!(!controller.is_running());
    assert!(controller.local_addr().is_none());

    // The listener is gone: the port can be bound again and requests fail.
    let rebind = TcpListener::bind(("127.0.0.1", port)).await;
    assert!(rebind.is_ok(), "port still held after stop");
    drop(rebind);
}

#[tokio::test]
async fn test_requests_fail_after_stop() {
    let port = 28302;
    let backend = common::start_echo_backend().await;
    let mut controller = common::proxy_to(port, backend).await;
    controller.stop().await.unwrap();

    let result = common::client().get(common::proxy_url(port, "/")).send().await;
    assert!(result.is_err(), "request succeeded against a stopped proxy");
}

#[tokio::test]
async fn test_double_start_is_rejected() {
    let port = 28303;
    let backend = common::start_echo_backend().await;
    let config = common::proxy_config(port, format!("http://{}", backend));
    let mut controller = common::start_proxy(config.clone()).await;

    let err = controller.start(config).await.unwrap_err();
    assert!(matches!(err, LifecycleError::AlreadyRunning { port: 28303 }), "got {err:?}");

    // The first instance is untouched.
    assert!(controller.is_running());
    common::echoed(port, "/").await;
    controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_when_stopped() {
    let mut controller = ProxyController::new();
    assert!(matches!(controller.stop().await, Err(LifecycleError::NotRunning)));
}

#[tokio::test]
async fn test_missing_destination() {
    let mut controller = ProxyController::new();
    let mut config = ProxyConfig::default();
    config.proxy_port = 28304;

    match controller.start(config).await {
        Err(LifecycleError::Config(ConfigError::Validation(errors))) => {
            assert!(errors.contains(&ValidationError::MissingDestination));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert!(!controller.is_running());
}

#[tokio::test]
async fn test_port_in_use() {
    let port = 28305;
    let _occupied = TcpListener::bind(("127.0.0.1", port)).await.unwrap();

    let mut controller = ProxyController::new();
    let err = controller
        .start(common::proxy_config(port, "http://127.0.0.1:9"))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Listener(_)), "got {err:?}");
    assert!(err.to_string().contains("28305"));
    assert!(!controller.is_running());
}

#[tokio::test]
async fn test_restart_on_same_port() {
    let port = 28306;
    let first = common::start_echo_backend().await;
    let second = common::start_echo_backend().await;

    let mut controller = common::proxy_to(port, first).await;
    let echoed = common::echoed(port, "/").await;
    assert_eq!(echoed["headers"]["host"], first.to_string());
    controller.stop().await.unwrap();

    controller
        .start(common::proxy_config(port, format!("http://{}", second)))
        .await
        .unwrap();
    let echoed = common::echoed(port, "/").await;
    assert_eq!(echoed["headers"]["host"], second.to_string());
    controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_abandons_stuck_connection_after_drain() {
    let port = 28307;
    let (silent, _closed) = common::start_silent_backend().await;
    let mut config = common::proxy_config(port, format!("http://{}", silent));
    config.timeouts.drain_secs = 1;
    let mut controller = common::start_proxy(config).await;

    let request = tokio::spawn(common::client().get(common::proxy_url(port, "/hang")).send());
    tokio::time::sleep(Duration::from_millis(200)).await;

    let report = controller.stop().await.unwrap();
    assert!(!report.drained);
    assert_eq!(report.remaining_connections, 1);
    assert!(!controller.is_running());
    request.abort();
}

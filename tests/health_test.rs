//! Health checks through the conductor facade.
use service_conductor::config::{Config, ProbeConfig};
use service_conductor::runtime::InMemoryRuntime;
use service_conductor::{Conductor, HealthStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

fn conductor() -> Conductor {
    let mut config = Config::default();
    config.probe = ProbeConfig {
        tcp_connect_timeout: Duration::from_millis(200),
        http_timeout: Duration::from_millis(300),
        ..ProbeConfig::default()
    };
    Conductor::builder()
        .config(config)
        .runtime(Arc::new(InMemoryRuntime::new()))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_unreachable_endpoint_stays_unhealthy() {
    let conductor = conductor();
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let added = conductor
        .add_health_check("db", &format!("127.0.0.1:{}", port), None)
        .unwrap();
    assert_eq!(added.status, HealthStatus::Unknown);

    let first = conductor.get_service_health("db").await.unwrap();
    let second = conductor.get_service_health("db").await.unwrap();
    assert_eq!(first.status, HealthStatus::Unhealthy);
    assert_eq!(second.status, HealthStatus::Unhealthy);
    assert!(second.last_check.unwrap() >= first.last_check.unwrap());
}

#[tokio::test]
async fn test_http_endpoint_with_closed_port_is_unhealthy() {
    let conductor = conductor();
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    conductor
        .add_health_check("web", &format!("http://127.0.0.1:{}/health", port), None)
        .unwrap();
    let record = conductor.get_service_health("web").await.unwrap();
    assert_eq!(record.status, HealthStatus::Unhealthy);
}

#[tokio::test]
async fn test_list_reports_auto_restart_flag() {
    let conductor = conductor();
    // b's loop probes right away, so give it a live endpoint
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let live = listener.local_addr().unwrap();
    conductor
        .add_health_check("a", "127.0.0.1:1", Some(Duration::from_secs(60)))
        .unwrap();
    conductor
        .add_health_check("b", &live.to_string(), Some(Duration::from_secs(60)))
        .unwrap();
    conductor.enable_auto_restart("b").unwrap();

    let flags: Vec<(String, bool)> = conductor
        .list_health_checks()
        .into_iter()
        .map(|h| (h.container, h.auto_restart))
        .collect();
    assert_eq!(
        flags,
        vec![("a".to_string(), false), ("b".to_string(), true)]
    );

    conductor.remove_health_check("b").unwrap();
    assert_eq!(conductor.list_health_checks().len(), 1);
    conductor.shutdown().await;
}

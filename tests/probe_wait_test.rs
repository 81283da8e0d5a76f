//! Readiness waits against real loopback sockets.
use service_conductor::config::ProbeConfig;
use service_conductor::{Prober, ReadinessCondition};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

fn prober() -> Prober {
    Prober::new(ProbeConfig {
        poll_interval: Duration::from_millis(50),
        tcp_connect_timeout: Duration::from_millis(200),
        ..ProbeConfig::default()
    })
}

async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_wait_succeeds_once_listener_appears() {
    let port = free_port().await;
    let server = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        // keep accepting until the test ends
        loop {
            let _ = listener.accept().await;
        }
    });

    let ready = prober()
        .wait(&ReadinessCondition::tcp("127.0.0.1", port), Duration::from_secs(5))
        .await
        .unwrap();
    assert!(ready);
    server.abort();
}

#[tokio::test]
async fn test_delayed_listener_either_side_of_timeout() {
    let port = free_port().await;
    let server = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(600)).await;
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        loop {
            let _ = listener.accept().await;
        }
    });
    let condition = ReadinessCondition::tcp("127.0.0.1", port);
    let prober = prober();

    let started = Instant::now();
    assert!(!prober
        .wait(&condition, Duration::from_millis(300))
        .await
        .unwrap());
    assert!(started.elapsed() < Duration::from_millis(600));

    assert!(prober.wait(&condition, Duration::from_secs(2)).await.unwrap());
    server.abort();
}

#[tokio::test]
async fn test_wait_times_out_within_bound() {
    let port = free_port().await;
    let started = Instant::now();
    let ready = prober()
        .wait(
            &ReadinessCondition::tcp("127.0.0.1", port),
            Duration::from_millis(400),
        )
        .await
        .unwrap();
    assert!(!ready);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_malformed_condition_is_an_error() {
    let prober = prober();
    assert!(prober
        .wait(&ReadinessCondition::tcp("127.0.0.1", 0), Duration::from_secs(1))
        .await
        .is_err());
    assert!(prober
        .wait(&ReadinessCondition::http("not a url"), Duration::from_secs(1))
        .await
        .is_err());
    assert!(prober
        .wait(&ReadinessCondition::log("web", "(unclosed"), Duration::from_secs(1))
        .await
        .is_err());
}

#[test]
fn test_wait_blocking_without_runtime() {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = std_listener.local_addr().unwrap().port();
    let ready = prober()
        .wait_blocking(
            &ReadinessCondition::tcp("127.0.0.1", port),
            Duration::from_secs(2),
        )
        .unwrap();
    assert!(ready);
}

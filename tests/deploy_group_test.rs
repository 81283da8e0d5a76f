//! Group deployment against the in-memory runtime with real loopback probes.
use service_conductor::config::{Config, ProbeConfig};
use service_conductor::runtime::{InMemoryRuntime, RuntimeCall};
use service_conductor::{Conductor, Error, ErrorKind, Parser};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

fn conductor(runtime: Arc<InMemoryRuntime>) -> Conductor {
    let mut config = Config::default();
    config.probe = ProbeConfig {
        poll_interval: Duration::from_millis(25),
        tcp_connect_timeout: Duration::from_millis(100),
        ..ProbeConfig::default()
    };
    config.deploy.probe_timeout = Duration::from_millis(400);
    Conductor::builder()
        .config(config)
        .runtime(runtime)
        .build()
        .unwrap()
}

async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_unreachable_dependency_rolls_back_only_the_dependent() {
    let runtime = Arc::new(InMemoryRuntime::new());
    let conductor = conductor(runtime.clone());
    let port = unused_port().await;

    let group = Parser::new()
        .parse_group(&format!(
            r#"
services:
  - name: api
    image: acme/api:1.4
    ports: {{ "8080": 18080 }}
    depends_on: db
    wait_condition: {{ type: tcp, host: 127.0.0.1, port: {port} }}
  - name: db
    image: postgres:16
    env_vars:
      POSTGRES_PASSWORD: secret
"#
        ))
        .unwrap();

    let err = conductor.deploy_group(&group).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DependencyNotMet);
    assert_eq!(err.entity().as_deref(), Some("api"));
    assert!(err.to_string().contains(&format!("127.0.0.1:{}", port)));

    let db = runtime.container("db").expect("db keeps running");
    assert!(db.running);
    assert_eq!(db.env_vars["POSTGRES_PASSWORD"], "secret");
    assert!(runtime.container("api").is_none());

    let calls = runtime.calls();
    let api_created = calls.iter().position(|c| {
        matches!(c, RuntimeCall::CreateAndStart { name: Some(n), .. } if n == "api")
    });
    let api_removed = calls
        .iter()
        .position(|c| matches!(c, RuntimeCall::Remove(_)));
    assert!(api_created.unwrap() < api_removed.unwrap());
}

#[tokio::test]
async fn test_ready_dependencies_deploy_whole_group() {
    let runtime = Arc::new(InMemoryRuntime::new());
    let conductor = conductor(runtime.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    conductor
        .define_dependency(
            "worker",
            "queue",
            Some(service_conductor::ReadinessCondition::tcp("127.0.0.1", port)),
        )
        .unwrap();
    let group = Parser::new()
        .parse_group(
            r#"[
                {"name": "worker", "image": "acme/worker"},
                {"name": "queue", "image": "rabbitmq:3"}
            ]"#,
        )
        .unwrap();

    let deployment = conductor.deploy_group(&group).await.unwrap();
    assert_eq!(deployment.order, vec!["queue", "worker"]);
    assert_eq!(
        deployment.deployed_services["worker"],
        runtime.container("worker").unwrap().id
    );
    assert!(calls_pulled(&runtime, "rabbitmq:3"));

    let status = conductor.get_dependency_status("worker").await.unwrap();
    assert!(status.container_running);
    assert_eq!(status.depends_on[0].service, "queue");
}

#[tokio::test]
async fn test_cycle_is_rejected_before_any_container_starts() {
    let runtime = Arc::new(InMemoryRuntime::new());
    let conductor = conductor(runtime.clone());
    let group = Parser::new()
        .parse_group(
            r#"
- { name: a, image: x, depends_on: [c] }
- { name: b, image: x }
- { name: c, image: x, depends_on: a }
"#,
        )
        .unwrap();

    match conductor.deploy_group(&group).await {
        Err(Error::CycleOrMissingDependency(names)) => assert_eq!(names, vec!["a", "c"]),
        other => panic!("expected cycle error, got {:?}", other),
    }
    assert!(runtime.calls().is_empty());
}

fn calls_pulled(runtime: &InMemoryRuntime, image: &str) -> bool {
    runtime
        .calls()
        .iter()
        .any(|c| matches!(c, RuntimeCall::Pull(i) if i == image))
}

#[tokio::test]
async fn test_own_wait_condition_gates_service_without_dependencies() {
    let runtime = Arc::new(InMemoryRuntime::new());
    let conductor = conductor(runtime.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open = listener.local_addr().unwrap().port();
    let closed = unused_port().await;

    let group = Parser::new()
        .parse_group(&format!(
            r#"
- {{ name: cache, image: "redis:7", wait_condition: {{ type: tcp, host: 127.0.0.1, port: {open} }} }}
- {{ name: web, image: nginx, wait_condition: {{ type: http, url: "http://127.0.0.1:{closed}/health" }} }}
"#
        ))
        .unwrap();

    let err = conductor.deploy_group(&group).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DependencyNotMet);
    assert_eq!(err.entity().as_deref(), Some("web"));
    assert!(runtime.container("cache").unwrap().running);
    assert!(runtime.container("web").is_none());
}

//! Template runs through the conductor facade.
use service_conductor::runtime::{InMemoryRuntime, RuntimeCall};
use service_conductor::templates::TemplateHealthCheck;
use service_conductor::{Conductor, HealthEndpoint, TemplateOverrides, TemplateSpec};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

fn conductor(runtime: Arc<InMemoryRuntime>) -> Conductor {
    Conductor::builder().runtime(runtime).build().unwrap()
}

#[tokio::test]
async fn test_port_override_is_applied_per_run() {
    let runtime = Arc::new(InMemoryRuntime::new());
    let conductor = conductor(runtime.clone());
    conductor
        .create_template(TemplateSpec::new("web", "nginx:1.25").port("80", "8080"))
        .unwrap();

    let overrides = TemplateOverrides {
        ports: BTreeMap::from([("80".to_string(), "9090".to_string())]),
        ..TemplateOverrides::default()
    };
    let run = conductor.run_from_template("web", &overrides).await.unwrap();
    assert!(run.health_check.is_none());

    let container = runtime
        .containers()
        .into_iter()
        .find(|c| c.id == run.container_id)
        .unwrap();
    assert_eq!(container.port_bindings["80"][0].host_port, "9090");
    assert!(runtime
        .calls()
        .contains(&RuntimeCall::Pull("nginx:1.25".to_string())));

    // the next plain run still uses the template's own port
    let plain = conductor
        .run_from_template("web", &TemplateOverrides::default())
        .await
        .unwrap();
    assert_eq!(plain.ports["80"], "8080");
    assert_eq!(conductor.get_template("web").unwrap().ports["80"], "8080");
}

#[tokio::test]
async fn test_inferred_health_check_with_auto_restart() {
    let runtime = Arc::new(InMemoryRuntime::new());
    let conductor = conductor(runtime.clone());
    conductor
        .create_template(
            TemplateSpec::new("cache", "redis:7-alpine")
                .port("6379", "16379")
                .health_check(TemplateHealthCheck {
                    endpoint: None,
                    interval: Duration::from_secs(3600),
                    auto_restart: true,
                }),
        )
        .unwrap();

    let overrides = TemplateOverrides {
        name: Some("cache-1".into()),
        ..TemplateOverrides::default()
    };
    let run = conductor.run_from_template("cache", &overrides).await.unwrap();
    let record = run.health_check.unwrap();
    assert_eq!(record.container, "cache-1");
    assert_eq!(
        record.endpoint,
        HealthEndpoint::Tcp {
            host: "localhost".into(),
            port: 16379
        }
    );
    assert!(record.auto_restart);
    assert_eq!(record.interval, Duration::from_secs(3600));

    conductor.disable_auto_restart("cache-1").unwrap();
    conductor.shutdown().await;
}

#[tokio::test]
async fn test_template_lifecycle() {
    let conductor = conductor(Arc::new(InMemoryRuntime::new()));
    conductor
        .create_template(TemplateSpec::new("api", "acme/api:1").env("MODE", "prod"))
        .unwrap();
    conductor
        .update_template(TemplateSpec::new("api", "acme/api:2").env("MODE", "prod"))
        .unwrap();
    assert_eq!(conductor.get_template("api").unwrap().image, "acme/api:2");
    assert_eq!(conductor.list_templates().len(), 1);

    conductor.delete_template("api").unwrap();
    assert!(conductor.get_template("api").is_err());
    assert!(conductor.delete_template("api").is_err());
}

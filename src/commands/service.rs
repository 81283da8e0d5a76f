use super::print_json;
use service_conductor::{Conductor, ServiceDefinition};

pub async fn run_ps(conductor: &Conductor, all: bool) -> anyhow::Result<()> {
    print_json(&conductor.list_services(all).await?)
}

pub async fn run_service(conductor: &Conductor, definition: &ServiceDefinition) -> anyhow::Result<()> {
    let container_id = conductor.deploy_service(definition).await?;
    print_json(&serde_json::json!({
        "service": definition.name,
        "container_id": container_id,
        "status": "running",
    }))
}

/// Logs go out verbatim rather than as JSON.
pub async fn run_logs(conductor: &Conductor, container: &str, tail: usize) -> anyhow::Result<()> {
    let logs = conductor.get_service_logs(container, tail).await?;
    if !logs.is_empty() {
        println!("{}", logs.trim_end_matches('\n'));
    }
    Ok(())
}

pub async fn run_stop(conductor: &Conductor, container: &str) -> anyhow::Result<()> {
    let info = conductor.stop_service(container).await?;
    print_json(&serde_json::json!({
        "container": info.name,
        "id": info.id,
        "status": "removed",
    }))
}

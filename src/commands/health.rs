use super::print_json;
use crate::cli::HealthCommands;
use service_conductor::Conductor;

pub async fn run_health(conductor: &Conductor, command: HealthCommands) -> anyhow::Result<()> {
    match command {
        HealthCommands::Check {
            container,
            endpoint,
        } => {
            conductor.add_health_check(&container, &endpoint, None)?;
            let record = conductor.get_service_health(&container).await?;
            print_json(&record)
        }
        HealthCommands::Watch {
            container,
            endpoint,
            interval,
        } => {
            conductor.add_health_check(&container, &endpoint, interval)?;
            let record = conductor.enable_auto_restart(&container)?;
            tracing::info!(
                "Supervising {} every {:?}; press Ctrl-C to stop",
                container,
                record.interval
            );

            tokio::signal::ctrl_c().await?;
            println!();
            conductor.disable_auto_restart(&container)?;
            let record = conductor.remove_health_check(&container)?;
            conductor.shutdown().await;
            print_json(&record)
        }
    }
}

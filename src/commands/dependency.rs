use super::print_json;
use crate::cli::DependencyCommands;
use service_conductor::Conductor;

pub async fn run_dependency(
    conductor: &Conductor,
    command: DependencyCommands,
) -> anyhow::Result<()> {
    match command {
        DependencyCommands::Define {
            service,
            depends_on,
            condition,
        } => print_json(&conductor.define_dependency(&service, &depends_on, condition)?),
        DependencyCommands::Status { service } => {
            print_json(&conductor.get_dependency_status(&service).await?)
        }
        DependencyCommands::List => print_json(&conductor.list_dependencies()),
        DependencyCommands::Remove { service } => {
            conductor.remove_dependency(&service)?;
            print_json(&serde_json::json!({ "service": service, "status": "removed" }))
        }
    }
}

use super::print_json;
use crate::cli::SnapshotCommands;
use service_conductor::Conductor;

pub async fn run_snapshot(conductor: &Conductor, command: SnapshotCommands) -> anyhow::Result<()> {
    match command {
        SnapshotCommands::Create { name } => print_json(&conductor.snapshot_env(&name).await?),
        SnapshotCommands::Restore { name } => print_json(&conductor.restore_env(&name).await?),
        SnapshotCommands::List => print_json(&conductor.list_snapshots()),
        SnapshotCommands::Show { name } => print_json(&conductor.get_snapshot(&name)?),
        SnapshotCommands::Delete { name } => {
            conductor.delete_snapshot(&name)?;
            print_json(&serde_json::json!({ "snapshot": name, "status": "deleted" }))
        }
        SnapshotCommands::Diff { from, to } => {
            print_json(&conductor.compare_snapshots(&from, &to)?)
        }
    }
}

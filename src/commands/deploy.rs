use super::print_json;
use service_conductor::{Conductor, Parser};
use std::path::Path;

pub async fn run_deploy(conductor: &Conductor, file: &Path, dry_run: bool) -> anyhow::Result<()> {
    let services = Parser::new().load_group(file)?;

    if dry_run {
        let order = conductor.plan_group(&services)?;
        return print_json(&serde_json::json!({ "order": order }));
    }

    let deployment = conductor.deploy_group(&services).await?;
    print_json(&deployment)
}

use super::print_json;
use crate::cli::{TemplateArgs, TemplateCommands};
use service_conductor::templates::TemplateHealthCheck;
use service_conductor::{Conductor, TemplateOverrides, TemplateSpec};

pub async fn run_template(conductor: &Conductor, command: TemplateCommands) -> anyhow::Result<()> {
    match command {
        TemplateCommands::Create(args) => print_json(&conductor.create_template(spec_from(args))?),
        TemplateCommands::Update(args) => print_json(&conductor.update_template(spec_from(args))?),
        TemplateCommands::Run {
            template,
            name,
            image,
            ports,
            env,
        } => {
            let overrides = TemplateOverrides {
                image,
                ports: ports.into_iter().collect(),
                env_vars: env.into_iter().collect(),
                name,
            };
            print_json(&conductor.run_from_template(&template, &overrides).await?)
        }
        TemplateCommands::List => print_json(&conductor.list_templates()),
        TemplateCommands::Show { name } => print_json(&conductor.get_template(&name)?),
        TemplateCommands::Delete { name } => {
            conductor.delete_template(&name)?;
            print_json(&serde_json::json!({ "template": name, "status": "deleted" }))
        }
    }
}

fn spec_from(args: TemplateArgs) -> TemplateSpec {
    let wants_health = args.health
        || args.health_endpoint.is_some()
        || args.health_interval.is_some()
        || args.auto_restart;
    let health_check = wants_health.then(|| {
        let mut hc = TemplateHealthCheck {
            endpoint: args.health_endpoint,
            auto_restart: args.auto_restart,
            ..TemplateHealthCheck::default()
        };
        if let Some(interval) = args.health_interval {
            hc.interval = interval;
        }
        hc
    });

    TemplateSpec {
        name: args.name,
        image: args.image,
        ports: args.ports.into_iter().collect(),
        env_vars: args.env.into_iter().collect(),
        health_check,
    }
}

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use service_conductor::{
    Conductor, Error as ConductorError, ErrorReport, Parser as ConfigParser, ServiceDefinition,
};

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            if let Some(err) = e.downcast_ref::<ConductorError>() {
                if let Ok(report) = serde_json::to_string_pretty(&ErrorReport::from(err)) {
                    println!("{}", report);
                }
                eprintln!("Error: {}", err);
                if let Some(suggestion) = err.suggestion() {
                    eprintln!("\nHint: {}", suggestion);
                }
            } else {
                eprintln!("Error: {:#}", e);
            }
            std::process::exit(1);
        }
    }
}

async fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();

    let config = ConfigParser::new().load_or_default(cli.config.as_deref())?;
    init_tracing(config.log_level.as_deref())?;

    let base_dir = match &cli.command {
        Commands::Deploy { file, .. } => file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| std::path::PathBuf::from(".")),
        _ => std::path::PathBuf::from("."),
    };

    let mut builder = Conductor::builder()
        .config(config)
        .base_dir(base_dir)
        .persistent(!cli.no_persist);
    if let Some(dir) = cli.state_dir.clone() {
        if !cli.no_persist {
            builder = builder.state_dir(dir);
        }
    }
    let conductor = builder.build()?;

    match cli.command {
        Commands::Deploy { file, dry_run } => {
            commands::run_deploy(&conductor, &file, dry_run).await?;
        }
        Commands::Dependency(command) => commands::run_dependency(&conductor, command).await?,
        Commands::Ps { all } => commands::run_ps(&conductor, all).await?,
        Commands::Run {
            name,
            image,
            ports,
            env,
            readiness,
        } => {
            let mut definition = ServiceDefinition::new(name, image);
            definition.ports.extend(ports);
            definition.env_vars.extend(env);
            definition.readiness = readiness;
            commands::run_service(&conductor, &definition).await?;
        }
        Commands::Logs { container, tail } => {
            commands::run_logs(&conductor, &container, tail).await?
        }
        Commands::Stop { container } => commands::run_stop(&conductor, &container).await?,
        Commands::Wait(command) => return commands::run_wait(&conductor, command).await,
        Commands::Health(command) => commands::run_health(&conductor, command).await?,
        Commands::Snapshot(command) => commands::run_snapshot(&conductor, command).await?,
        Commands::Template(command) => commands::run_template(&conductor, command).await?,
    }

    conductor.shutdown().await;
    Ok(0)
}

fn init_tracing(default_level: Option<&str>) -> anyhow::Result<()> {
    let default_level = default_level.unwrap_or("info");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_level))?,
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

use super::print_json;
use crate::cli::WaitCommands;
use service_conductor::{Conductor, ReadinessCondition};

/// Exit status is 0 when the condition held and 2 when it timed out.
pub async fn run_wait(conductor: &Conductor, command: WaitCommands) -> anyhow::Result<i32> {
    let (condition, timeout) = match command {
        WaitCommands::Tcp {
            host,
            port,
            timeout,
        } => (ReadinessCondition::tcp(host, port), timeout.timeout),
        WaitCommands::Http { url, timeout } => (ReadinessCondition::http(url), timeout.timeout),
        WaitCommands::Log {
            container,
            pattern,
            timeout,
        } => (ReadinessCondition::log(container, pattern), timeout.timeout),
    };

    let ready = conductor.wait_for(&condition, timeout).await?;
    print_json(&serde_json::json!({
        "condition": condition,
        "ready": ready,
    }))?;
    Ok(if ready { 0 } else { 2 })
}

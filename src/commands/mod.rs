mod dependency;
mod deploy;
mod health;
mod service;
mod snapshot;
mod template;
mod wait;

pub use dependency::run_dependency;
pub use deploy::run_deploy;
pub use health::run_health;
pub use service::{run_logs, run_ps, run_service, run_stop};
pub use snapshot::run_snapshot;
pub use template::run_template;
pub use wait::run_wait;

use serde::Serialize;

/// Write `value` to stdout as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

//! Group deployment and the [`Conductor`] facade.

mod builder;
mod core;
pub mod deploy;

pub use builder::ConductorBuilder;
pub use core::*;
pub use deploy::{GroupDeployer, GroupDeployment};

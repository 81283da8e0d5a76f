mod definition;
mod registry;
pub mod resolver;

pub use definition::*;
pub use registry::*;
pub use resolver::order;

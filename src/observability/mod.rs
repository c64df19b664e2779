pub mod audit;
pub mod logging;

pub use audit::*;
pub use logging::init_tracing;

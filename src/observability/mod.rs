// Observability: structured logging and counters

pub mod logging;
pub mod metrics;

pub use logging::init_logging;

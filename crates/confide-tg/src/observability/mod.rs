pub(crate) mod logging;
mod metrics;

pub use self::metrics::init_metrics;
pub use logging::init_logging;

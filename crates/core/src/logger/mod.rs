mod setup;

pub use setup::setup_logging;

mod correlator;
mod driver;
mod driver_config;

pub use correlator::*;
pub use driver::*;
pub use driver_config::*;

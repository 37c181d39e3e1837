// chansync Core - Domain Logic & Ports
// NO infrastructure dependencies (hexagonal layout)

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{Result, SchedulingError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! CLI command implementations.

mod ask;
mod config;
mod doctor;
mod index;
mod serve;

pub use ask::run_ask;
pub use config::run_config;
pub use doctor::run_doctor;
pub use index::run_index;
pub use serve::run_serve;

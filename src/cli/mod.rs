mod config;
pub use self::config::{Config, DEFAULT_BUFFER_POOL_SIZE};

pub mod actions;
pub mod commands;
pub mod globals;
pub mod progressbar;

mod start;
pub use self::start::{get_config_path, start};

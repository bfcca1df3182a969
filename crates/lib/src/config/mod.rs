//! User configuration handling.
//!
//! - [`load`] - Reading a config file from disk
//! - [`expand`] - Normalizing a config into an ordered list of [`BuildConfig`]s
//!
//! [`BuildConfig`]: crate::options::BuildConfig

mod expand;
mod load;

pub use expand::expand;
pub use load::{ConfigError, DEFAULT_CONFIG_FILE, load_config};

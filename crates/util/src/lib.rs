pub mod config;

pub use config::{AppConfig, ConfigError, Environment, DEFAULT_BIND_ADDR};

/// Loads variables from a `.env` file into the process environment.
///
/// A missing file is not an error; deployed builds configure the real
/// environment instead.
pub fn load_env_file() {
    let _ = dotenvy::dotenv();
}

/// Serializes tests that mutate process environment variables.
#[cfg(test)]
pub(crate) static ENV_GUARD: std::sync::LazyLock<std::sync::Mutex<()>> =
    std::sync::LazyLock::new(|| std::sync::Mutex::new(()));

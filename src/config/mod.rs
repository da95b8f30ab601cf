// Configuration management module
// TOML settings for the model service, embedding, generation and chunking

pub mod interactive;
pub mod settings;

#[cfg(test)]
mod tests;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    API_KEY_ENV, ApiFlavor, CONFIG_FILE, Config, ConfigError, EmbeddingConfig, GenerationConfig,
    ServiceConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::default_dir()
}

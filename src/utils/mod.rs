/// TOML configuration file model.
pub mod toml_config;

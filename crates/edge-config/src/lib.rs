pub mod config;
pub mod static_config;

pub use config::{
    default_config_template, ConfigError, RewritePhase, RewriteSpec, SystemConfig,
    SystemConfigLoader,
};
pub use static_config::{
    StaticConfigItem, DEFAULT_REWRITE_DESTINATION, DEFAULT_REWRITE_SOURCE, STATIC_CONFIG_TABLE,
};

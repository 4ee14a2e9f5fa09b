use std::path::{Path, PathBuf};
use std::sync::Arc;

use edge_config::{default_config_template, SystemConfig, SystemConfigLoader};
use rewrite_kernel::{EdgeKernel, HttpForwarder, HttpForwarderConfig};

use crate::error::AppError;

pub struct AppState {
    pub config_path: PathBuf,
    pub config: SystemConfig,
    pub kernel: Arc<EdgeKernel>,
}

impl AppState {
    pub fn from_config(config_path: PathBuf, config: SystemConfig) -> Result<Self, AppError> {
        let forwarder = HttpForwarder::new(HttpForwarderConfig::from_config(&config))?;
        let kernel = EdgeKernel::from_config(&config, Arc::new(forwarder))?;
        Ok(Self {
            config_path,
            config,
            kernel: Arc::new(kernel),
        })
    }
}

pub fn load_config(path: &Path) -> Result<SystemConfig, AppError> {
    let raw = std::fs::read_to_string(path)?;
    let config = SystemConfigLoader::from_str(&raw)?;
    Ok(config)
}

pub fn create_default_config(path: &Path) -> Result<String, AppError> {
    let content = default_config_template();
    std::fs::write(path, content.as_bytes())?;
    Ok(content)
}

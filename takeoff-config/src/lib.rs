use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 指定配置文件路径的环境变量。
pub const CONFIG_ENV_VAR: &str = "TAKEOFF_CONFIG";

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub takeoff: TakeoffConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 自动发现配置文件：优先读取环境变量 `TAKEOFF_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        let current_dir = env::current_dir().map_err(|source| ConfigError::Context {
            message: "获取当前工作目录失败".to_string(),
            source,
        })?;
        Self::discover_from(env::var_os(CONFIG_ENV_VAR).map(PathBuf::from), &current_dir)
    }

    /// `discover` 的可测试形式：显式给出环境变量取值与工作目录。
    pub fn discover_from(explicit: Option<PathBuf>, working_dir: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let default_path = working_dir.join("config").join("default.toml");
        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 提取参数；命令行参数优先于此处的值。
#[derive(Debug, Clone, Deserialize)]
pub struct TakeoffConfig {
    #[serde(default = "TakeoffConfig::default_scale_factor")]
    pub scale_factor: f64,
    #[serde(default = "TakeoffConfig::default_wall_height")]
    pub wall_height_m: f64,
    #[serde(default = "TakeoffConfig::default_max_block_depth")]
    pub max_block_depth: usize,
    #[serde(default = "TakeoffConfig::default_arc_step")]
    pub arc_step_deg: f64,
}

impl TakeoffConfig {
    fn default_scale_factor() -> f64 {
        0.001
    }

    fn default_wall_height() -> f64 {
        2.8
    }

    fn default_max_block_depth() -> usize {
        2
    }

    fn default_arc_step() -> f64 {
        5.0
    }
}

impl Default for TakeoffConfig {
    fn default() -> Self {
        Self {
            scale_factor: Self::default_scale_factor(),
            wall_height_m: Self::default_wall_height(),
            max_block_depth: Self::default_max_block_depth(),
            arc_step_deg: Self::default_arc_step(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

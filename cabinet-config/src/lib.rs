use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `CABINET_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("CABINET_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

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

/// 未识别实体在几何计算中的处理方式。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnknownEntityPolicy {
    /// 不参与范围计算。
    #[default]
    Ignore,
    /// 视作原点处的零长度线段参与范围计算。
    LegacyOriginLine,
}

/// 提取阈值与兜底尺寸（毫米）。
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "ExtractionConfig::default_min_dimension")]
    pub min_dimension_mm: f64,
    #[serde(default = "ExtractionConfig::default_min_entities")]
    pub min_entities: usize,
    #[serde(default = "ExtractionConfig::default_width")]
    pub default_width_mm: f64,
    #[serde(default = "ExtractionConfig::default_height")]
    pub default_height_mm: f64,
    #[serde(default = "ExtractionConfig::default_depth")]
    pub default_depth_mm: f64,
    #[serde(default)]
    pub unknown_entities: UnknownEntityPolicy,
}

impl ExtractionConfig {
    fn default_min_dimension() -> f64 {
        100.0
    }

    fn default_min_entities() -> usize {
        3
    }

    fn default_width() -> f64 {
        600.0
    }

    fn default_height() -> f64 {
        870.0
    }

    fn default_depth() -> f64 {
        580.0
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_dimension_mm: Self::default_min_dimension(),
            min_entities: Self::default_min_entities(),
            default_width_mm: Self::default_width(),
            default_height_mm: Self::default_height(),
            default_depth_mm: Self::default_depth(),
            unknown_entities: UnknownEntityPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "ArchiveConfig::default_extensions")]
    pub extensions: Vec<String>,
}

impl ArchiveConfig {
    fn default_extensions() -> Vec<String> {
        vec!["dxf".to_string()]
    }

    /// 按扩展名（忽略大小写）判断压缩包成员是否为图纸。
    pub fn accepts(&self, member_name: &str) -> bool {
        let Some((_, extension)) = member_name.rsplit_once('.') else {
            return false;
        };
        self.extensions
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(extension))
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            extensions: Self::default_extensions(),
        }
    }
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

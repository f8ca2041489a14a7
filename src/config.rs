//! 配置模块，负责加载JSON配置文件

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件不存在: {}", .0.display())]
    NotFound(PathBuf),

    #[error("无法读取配置文件 {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("无法解析JSON配置文件 {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("配置项 `{key}` 无效: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// `in_the_last_days` 的生成方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalMode {
    /// `NOW() - INTERVAL '<n> days'`, 天数经过整数校验后写入SQL
    #[default]
    Literal,
    /// `NOW() - make_interval(days => $n)`, 天数作为参数绑定
    Parameterized,
}

/// 表名映射
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableNames {
    pub contacts: String,
    pub contact_lists: String,
    pub lists: String,
    pub contact_timeline: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            contacts: "contacts".to_string(),
            contact_lists: "contact_lists".to_string(),
            lists: "lists".to_string(),
            contact_timeline: "contact_timeline".to_string(),
        }
    }
}

/// 编译器配置, 所有字段都有默认值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub tables: TableNames,
    /// SELECT 输出的列
    pub projection: Vec<String>,
    /// 时间线表中存放事件 metadata 的 JSONB 列
    pub metadata_column: String,
    /// 过滤树最大深度
    pub max_depth: usize,
    /// 过滤树最大节点数
    pub max_nodes: usize,
    pub interval_mode: IntervalMode,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            tables: TableNames::default(),
            projection: vec!["email".to_string()],
            metadata_column: "metadata".to_string(),
            max_depth: 32,
            max_nodes: 1000,
            interval_mode: IntervalMode::Literal,
        }
    }
}

impl CompilerConfig {
    /// 从JSON文件加载配置并校验
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(ConfigError::NotFound(path_ref.to_path_buf()));
        }

        let content = fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_ref.to_path_buf(),
            source,
        })?;

        let config: CompilerConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path_ref.to_path_buf(),
                source,
            })?;

        config.validate()?;
        tracing::debug!(path = %path_ref.display(), "loaded compiler config");
        Ok(config)
    }

    /// 校验写入SQL的标识符和上限
    ///
    /// 表名和列名会直接出现在SQL里, 只接受 `[a-z_][a-z0-9_]*`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let identifiers = [
            ("tables.contacts", &self.tables.contacts),
            ("tables.contact_lists", &self.tables.contact_lists),
            ("tables.lists", &self.tables.lists),
            ("tables.contact_timeline", &self.tables.contact_timeline),
            ("metadata_column", &self.metadata_column),
        ];
        for (key, value) in identifiers {
            if !is_safe_identifier(value) {
                return Err(ConfigError::Invalid {
                    key,
                    reason: format!("`{}` 不是合法的标识符", value),
                });
            }
        }

        if self.projection.is_empty() {
            return Err(ConfigError::Invalid {
                key: "projection",
                reason: "至少需要一列".to_string(),
            });
        }
        if let Some(column) = self.projection.iter().find(|c| !is_safe_identifier(c)) {
            return Err(ConfigError::Invalid {
                key: "projection",
                reason: format!("`{}` 不是合法的标识符", column),
            });
        }

        if self.max_depth == 0 {
            return Err(ConfigError::Invalid {
                key: "max_depth",
                reason: "必须大于0".to_string(),
            });
        }
        if self.max_nodes == 0 {
            return Err(ConfigError::Invalid {
                key: "max_nodes",
                reason: "必须大于0".to_string(),
            });
        }
        Ok(())
    }
}

pub(crate) fn is_safe_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

//! 配置模块，负责加载JSON配置文件

use crate::attribute::{AttributeCatalog, AttributeMeta, AttributeOption, ValueType};
use crate::compiler::{CompilerConfig, DEFAULT_MAX_DEPTH};
use crate::sql_compiler::SqlDialect;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 默认实体表名
pub const DEFAULT_ENTITY_TABLE: &str = "smile_custom_entity";

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置文件不存在: {}", .0.display())]
    NotFound(PathBuf),
    #[error("无法读取配置文件 {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("无法解析JSON配置文件 {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// 应用配置结构
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// 实体所在的数据库表
    pub entity_table: String,
    /// 生成SQL使用的方言
    pub dialect: SqlDialect,
    /// 条件树允许的最大嵌套深度
    pub max_depth: usize,
    /// 组件未指定属性集时使用的属性集
    pub default_attribute_set_id: Option<i64>,
    /// 属性代码到属性元数据的映射
    pub attributes: AttributeCatalog,
}

impl AppConfig {
    /// 从JSON文件加载配置，缺省字段使用默认值
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        // 检查文件是否存在
        if !path_ref.exists() {
            return Err(ConfigError::NotFound(path_ref.to_path_buf()));
        }

        // 读取文件内容
        let content = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_ref.to_path_buf(),
            source,
        })?;

        // 解析JSON
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path_ref.to_path_buf(),
            source,
        })
    }

    /// 获取属性目录
    pub fn catalog(&self) -> &AttributeCatalog {
        &self.attributes
    }

    /// 编译器配置
    pub fn compiler_config(&self) -> CompilerConfig {
        CompilerConfig {
            max_depth: self.max_depth,
        }
    }

    /// 创建示例属性目录（用于演示或fallback）
    pub fn sample_catalog() -> AttributeCatalog {
        let mut catalog = AttributeCatalog::default();
        catalog.insert("name", AttributeMeta::new(ValueType::Scalar).with_label("Name"));
        catalog.insert("sku", AttributeMeta::new(ValueType::Scalar).with_label("SKU"));
        catalog.insert("price", AttributeMeta::new(ValueType::Scalar).with_label("Price"));
        catalog.insert("created_at", AttributeMeta::new(ValueType::Date).with_label("Created At"));
        catalog.insert(
            "status",
            AttributeMeta::new(ValueType::Coded)
                .with_label("Status")
                .with_options(vec![
                    AttributeOption::new(1, "Enabled"),
                    AttributeOption::new(2, "Disabled"),
                ]),
        );
        catalog.insert(
            "is_featured",
            AttributeMeta::new(ValueType::Boolean)
                .with_label("Featured")
                .with_options(vec![AttributeOption::new(0, "No"), AttributeOption::new(1, "Yes")]),
        );
        catalog.insert(
            "color",
            AttributeMeta::new(ValueType::MultiValueSet)
                .with_label("Color")
                .with_options(vec![
                    AttributeOption::new(12, "Red"),
                    AttributeOption::new(13, "Blue"),
                    AttributeOption::new(14, "Green"),
                ]),
        );
        catalog
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            entity_table: DEFAULT_ENTITY_TABLE.to_string(),
            dialect: SqlDialect::default(),
            max_depth: DEFAULT_MAX_DEPTH,
            default_attribute_set_id: None,
            attributes: AppConfig::sample_catalog(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeLookup;
    use std::io::Write;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("condition_compiler_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_load_valid_json_config() {
        // 创建临时配置文件
        let temp_file = temp_path("valid.json");
        let mut file = fs::File::create(&temp_file).unwrap();
        writeln!(
            file,
            r#"{{
                "entityTable": "entities",
                "dialect": "postgres",
                "maxDepth": 4,
                "defaultAttributeSetId": 7,
                "attributes": {{
                    "color": {{"valueType": "multiValueSet"}},
                    "legacy": {{"exists": false}}
                }}
            }}"#
        )
        .unwrap();

        // 测试加载
        let config = AppConfig::from_json_file(&temp_file).unwrap();
        assert_eq!(config.entity_table, "entities");
        assert_eq!(config.dialect, SqlDialect::Postgres);
        assert_eq!(config.compiler_config().max_depth, 4);
        assert_eq!(config.default_attribute_set_id, Some(7));
        assert_eq!(config.catalog().len(), 2);

        let color = config.catalog().resolve("color").unwrap();
        assert_eq!(color.value_type, ValueType::MultiValueSet);
        assert_eq!(color.storage_delimiter, ",");
        assert!(!config.catalog().resolve("legacy").unwrap().exists);
        assert!(!config.catalog().resolve("unknown").unwrap().exists);

        // 清理
        fs::remove_file(&temp_file).ok();
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let temp_file = temp_path("partial.json");
        fs::write(&temp_file, r#"{"entityTable": "entities"}"#).unwrap();

        let config = AppConfig::from_json_file(&temp_file).unwrap();
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(config.dialect, SqlDialect::Mysql);
        assert!(config.catalog().get("color").is_some());

        fs::remove_file(&temp_file).ok();
    }

    #[test]
    fn test_invalid_json_config() {
        let temp_file = temp_path("invalid.json");
        fs::write(&temp_file, "invalid json").unwrap();

        let result = AppConfig::from_json_file(&temp_file);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));

        // 清理
        fs::remove_file(&temp_file).ok();
    }

    #[test]
    fn test_missing_file() {
        let result = AppConfig::from_json_file("non_existent_file.json");
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.entity_table, DEFAULT_ENTITY_TABLE);
        assert_eq!(config.catalog().get("color").unwrap().value_type, ValueType::MultiValueSet);
        assert!(config.catalog().get("unknown").is_none());
    }
}

//! 引擎配置
//!
//! 定义引擎的配置结构和加载逻辑。配置文件同时承载静态模块描述表，
//! 因此宿主无需任何反射机制即可声明模块依赖。
//!
//! ```yaml
//! engine:
//!   manager_namespaces: ["manager."]
//! modules:
//!   - id: storage
//!   - id: economy
//!     dependencies: [storage]
//!   - id: permissions
//!     immutable: true
//! owners:
//!   - id: shop-plugin
//!     modules: [economy]
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::module::metadata::ModuleDescriptor;
use crate::utils::{CoreError, Result};

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件目录
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json_format: bool,

    /// 日志轮转策略
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
            log_dir: None,
            json_format: false,
            rotation: default_rotation(),
        }
    }
}

/// 编排引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 管理器/基础设施命名空间前缀
    ///
    /// 以这些前缀开头的模块类型在依赖展开时被忽略，由宿主自行管理。
    #[serde(default = "default_manager_namespaces")]
    pub manager_namespaces: Vec<String>,

    /// 严格校验：构建描述表时发现循环依赖或未声明的依赖即报错
    #[serde(default)]
    pub strict_validation: bool,
}

fn default_manager_namespaces() -> Vec<String> {
    vec!["manager.".to_string()]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            manager_namespaces: default_manager_namespaces(),
            strict_validation: false,
        }
    }
}

/// 所属者的自动注册计划
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnerConfig {
    /// 所属者 ID
    pub id: String,
    /// 请求的模块类型
    #[serde(default)]
    pub modules: Vec<String>,
}

/// 顶层配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    /// 配置文件路径
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// 日志配置
    #[serde(default)]
    pub logging: LogConfig,

    /// 引擎配置
    #[serde(default)]
    pub engine: EngineConfig,

    /// 静态模块描述表
    #[serde(default)]
    pub modules: Vec<ModuleDescriptor>,

    /// 所属者注册计划
    #[serde(default)]
    pub owners: Vec<OwnerConfig>,
}

impl CoreConfig {
    /// 创建配置构建器
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::new()
    }

    /// 从文件加载配置
    ///
    /// 扩展名为 `.json` 时按 JSON 解析，其余一律按 YAML 解析。
    pub async fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            CoreError::ConfigLoadFailed(format!("无法读取 {}: {}", path.display(), e))
        })?;

        let mut config = Self::from_str_with_format(&content, is_json(&path))?;
        config.config_path = Some(path);
        Ok(config)
    }

    /// 从字符串解析配置
    pub fn from_str_with_format(content: &str, json: bool) -> Result<Self> {
        let config: CoreConfig = if json {
            serde_json::from_str(content)?
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// 校验配置的基本一致性
    pub fn validate(&self) -> Result<()> {
        for (index, descriptor) in self.modules.iter().enumerate() {
            if descriptor.id.trim().is_empty() {
                return Err(CoreError::InvalidConfigValue {
                    key: format!("modules[{}].id", index),
                    reason: "模块类型不能为空".to_string(),
                });
            }
        }

        for (index, owner) in self.owners.iter().enumerate() {
            if owner.id.trim().is_empty() {
                return Err(CoreError::InvalidConfigValue {
                    key: format!("owners[{}].id", index),
                    reason: "所属者 ID 不能为空".to_string(),
                });
            }
        }

        Ok(())
    }

    /// 合并另一个配置（后者覆盖前者）
    ///
    /// 模块描述按 ID 覆盖，所属者计划按 ID 覆盖，其余非默认值覆盖。
    pub fn merge(&mut self, other: CoreConfig) {
        if other.logging.level != default_log_level() {
            self.logging.level = other.logging.level;
        }
        if other.logging.file_output {
            self.logging.file_output = true;
            self.logging.log_dir = other.logging.log_dir;
        }
        if other.logging.json_format {
            self.logging.json_format = true;
        }
        if other.engine.manager_namespaces != default_manager_namespaces() {
            self.engine.manager_namespaces = other.engine.manager_namespaces;
        }
        if other.engine.strict_validation {
            self.engine.strict_validation = true;
        }

        for descriptor in other.modules {
            match self.modules.iter_mut().find(|d| d.id == descriptor.id) {
                Some(existing) => *existing = descriptor,
                None => self.modules.push(descriptor),
            }
        }

        for owner in other.owners {
            match self.owners.iter_mut().find(|o| o.id == owner.id) {
                Some(existing) => *existing = owner,
                None => self.owners.push(owner),
            }
        }
    }
}

fn is_json(path: &std::path::Path) -> bool {
    path.extension().map(|e| e == "json").unwrap_or(false)
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    config: CoreConfig,
}

impl CoreConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            config: CoreConfig::default(),
        }
    }

    /// 设置日志级别
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// 启用 JSON 格式日志
    pub fn json_logging(mut self) -> Self {
        self.config.logging.json_format = true;
        self
    }

    /// 启用文件日志
    pub fn file_logging(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.config.logging.file_output = true;
        self.config.logging.log_dir = Some(log_dir.into());
        self
    }

    /// 追加一个管理器命名空间前缀
    pub fn manager_namespace(mut self, prefix: impl Into<String>) -> Self {
        self.config.engine.manager_namespaces.push(prefix.into());
        self
    }

    /// 启用严格校验
    pub fn strict_validation(mut self) -> Self {
        self.config.engine.strict_validation = true;
        self
    }

    /// 添加模块描述
    pub fn module(mut self, descriptor: ModuleDescriptor) -> Self {
        self.config.modules.push(descriptor);
        self
    }

    /// 添加所属者注册计划
    pub fn owner<I, S>(mut self, id: impl Into<String>, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.owners.push(OwnerConfig {
            id: id.into(),
            modules: modules.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// 构建配置
    pub fn build(self) -> CoreConfig {
        self.config
    }
}
